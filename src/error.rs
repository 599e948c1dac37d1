//! Error types for the Modbus engine
//!
//! Protocol exceptions (the codes a server puts on the wire) and
//! transport-local failures share one error enum. Use
//! [`ModbusError::exception_code`] to tell them apart.

use std::fmt;

use thiserror::Error;

use crate::constants;

/// Result type used throughout the crate
pub type ModbusResult<T> = Result<T, ModbusError>;

/// Error returned by user supplied route handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Modbus exception codes, MODBUS Application Protocol V1.1b3 chapter 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = constants::EXCEPTION_ILLEGAL_FUNCTION,
    IllegalDataAddress = constants::EXCEPTION_ILLEGAL_DATA_ADDRESS,
    IllegalDataValue = constants::EXCEPTION_ILLEGAL_DATA_VALUE,
    ServerDeviceFailure = constants::EXCEPTION_SERVER_DEVICE_FAILURE,
    Acknowledge = constants::EXCEPTION_ACKNOWLEDGE,
    ServerDeviceBusy = constants::EXCEPTION_SERVER_DEVICE_BUSY,
    MemoryParityError = constants::EXCEPTION_MEMORY_PARITY_ERROR,
    GatewayPathUnavailable = constants::EXCEPTION_GATEWAY_PATH_UNAVAILABLE,
    GatewayTargetDeviceFailedToRespond = constants::EXCEPTION_GATEWAY_TARGET_FAILED,
}

impl ExceptionCode {
    /// Numeric code as carried in an exception response.
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Look up an exception code, `None` if the value is not a known code.
    pub fn from_u8(code: u8) -> Option<Self> {
        let code = match code {
            constants::EXCEPTION_ILLEGAL_FUNCTION => Self::IllegalFunction,
            constants::EXCEPTION_ILLEGAL_DATA_ADDRESS => Self::IllegalDataAddress,
            constants::EXCEPTION_ILLEGAL_DATA_VALUE => Self::IllegalDataValue,
            constants::EXCEPTION_SERVER_DEVICE_FAILURE => Self::ServerDeviceFailure,
            constants::EXCEPTION_ACKNOWLEDGE => Self::Acknowledge,
            constants::EXCEPTION_SERVER_DEVICE_BUSY => Self::ServerDeviceBusy,
            constants::EXCEPTION_MEMORY_PARITY_ERROR => Self::MemoryParityError,
            constants::EXCEPTION_GATEWAY_PATH_UNAVAILABLE => Self::GatewayPathUnavailable,
            constants::EXCEPTION_GATEWAY_TARGET_FAILED => Self::GatewayTargetDeviceFailedToRespond,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::ServerDeviceFailure => "Server Device Failure",
            Self::Acknowledge => "Acknowledge",
            Self::ServerDeviceBusy => "Server Device Busy",
            Self::MemoryParityError => "Memory Parity Error",
            Self::GatewayPathUnavailable => "Gateway Path Unavailable",
            Self::GatewayTargetDeviceFailedToRespond => {
                "Gateway Target Device Failed To Respond"
            }
        };
        write!(f, "{} ({:#04x})", name, self.to_u8())
    }
}

/// Errors raised by the codec, the framing layers and the stream shells.
#[derive(Debug, Error)]
pub enum ModbusError {
    /// The function code is not an allowable action for the server.
    #[error("Function code {code:#04x} is not an allowable action for the server")]
    IllegalFunction { code: u8 },

    /// The data address is not an allowable address for the server.
    #[error("The data address received in the request is not an allowable address for the server")]
    IllegalDataAddress,

    /// A value in the request data field is not allowable.
    #[error("Illegal data value: {message}")]
    IllegalDataValue { message: String },

    /// An unrecoverable error occurred while the server handled the request.
    #[error("An unrecoverable error occurred")]
    ServerDeviceFailure,

    #[error("The server has accepted the request but needs a long duration to process it")]
    Acknowledge,

    #[error("The server is engaged in a long-duration program command")]
    ServerDeviceBusy,

    #[error("The server detected a parity error in memory")]
    MemoryParityError,

    #[error("The gateway is probably misconfigured or overloaded")]
    GatewayPathUnavailable,

    #[error("Didn't get a response from target device")]
    GatewayTargetDeviceFailedToRespond,

    /// CRC of a serial frame does not match its content. Not a protocol
    /// exception: the frame is dropped and nothing is sent back.
    #[error("CRC mismatch: expected {expected:#06x}, received {received:#06x}")]
    Crc { expected: u16, received: u16 },

    /// Malformed frame or response that can't be attributed to a protocol exception.
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Response carries a different function code than the request.
    #[error("Unexpected function code in response: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedFunction { expected: u8, actual: u8 },

    #[error("Operation timed out after {timeout_ms} ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModbusError {
    /// Create an illegal data value error
    pub fn illegal_data_value<S: Into<String>>(message: S) -> Self {
        Self::IllegalDataValue {
            message: message.into(),
        }
    }

    /// Create an illegal function error
    pub fn illegal_function(code: u8) -> Self {
        Self::IllegalFunction { code }
    }

    /// Create a frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Exception code to put on the wire, `None` for transport-local errors.
    pub fn exception_code(&self) -> Option<ExceptionCode> {
        let code = match self {
            Self::IllegalFunction { .. } => ExceptionCode::IllegalFunction,
            Self::IllegalDataAddress => ExceptionCode::IllegalDataAddress,
            Self::IllegalDataValue { .. } => ExceptionCode::IllegalDataValue,
            Self::ServerDeviceFailure => ExceptionCode::ServerDeviceFailure,
            Self::Acknowledge => ExceptionCode::Acknowledge,
            Self::ServerDeviceBusy => ExceptionCode::ServerDeviceBusy,
            Self::MemoryParityError => ExceptionCode::MemoryParityError,
            Self::GatewayPathUnavailable => ExceptionCode::GatewayPathUnavailable,
            Self::GatewayTargetDeviceFailedToRespond => {
                ExceptionCode::GatewayTargetDeviceFailedToRespond
            }
            Self::Crc { .. }
            | Self::Frame { .. }
            | Self::UnexpectedFunction { .. }
            | Self::Timeout { .. }
            | Self::Io(_) => return None,
        };
        Some(code)
    }

    /// Build the typed error for an exception response received from a server.
    pub fn from_exception_code(function_code: u8, code: u8) -> Self {
        match ExceptionCode::from_u8(code) {
            Some(ExceptionCode::IllegalFunction) => Self::IllegalFunction {
                code: function_code & 0x7F,
            },
            Some(ExceptionCode::IllegalDataAddress) => Self::IllegalDataAddress,
            Some(ExceptionCode::IllegalDataValue) => {
                Self::illegal_data_value("rejected by server")
            }
            Some(ExceptionCode::ServerDeviceFailure) => Self::ServerDeviceFailure,
            Some(ExceptionCode::Acknowledge) => Self::Acknowledge,
            Some(ExceptionCode::ServerDeviceBusy) => Self::ServerDeviceBusy,
            Some(ExceptionCode::MemoryParityError) => Self::MemoryParityError,
            Some(ExceptionCode::GatewayPathUnavailable) => Self::GatewayPathUnavailable,
            Some(ExceptionCode::GatewayTargetDeviceFailedToRespond) => {
                Self::GatewayTargetDeviceFailedToRespond
            }
            None => Self::frame(format!(
                "unknown exception code {:#04x} for function {:#04x}",
                code,
                function_code & 0x7F
            )),
        }
    }

    /// Whether this error is a Modbus protocol exception.
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.exception_code().is_some()
    }
}
