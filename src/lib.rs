//! # Voltage Modbus Engine - Modbus Application Layer
//!
//! A Modbus protocol engine usable from both sides of the wire:
//!
//! - **Server side**: decode request PDUs, look the addressed data up in a
//!   [`RouteMap`] of user handlers, and encode the response or exception PDU.
//! - **Client side**: build request PDUs/ADUs and decode the responses.
//!
//! Framing is provided for Modbus TCP (MBAP header) and Modbus RTU (unit id
//! and CRC-16). Thin async shells ([`Server`], [`ModbusClient`]) drive the
//! engine over any tokio byte stream; the engine itself is synchronous and
//! transport-free.
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Packing |
//! |------|----------|---------|
//! | 0x01 | Read Coils | bits |
//! | 0x02 | Read Discrete Inputs | bits |
//! | 0x03 | Read Holding Registers | words |
//! | 0x04 | Read Input Registers | words |
//! | 0x05 | Write Single Coil | `0xFF00` / `0x0000` |
//! | 0x06 | Write Single Register | word |
//! | 0x0F | Write Multiple Coils | bits |
//! | 0x10 | Write Multiple Registers | words |
//!
//! Register values are 16-bit unsigned unless [`Config::signed_values`] is
//! set, in which case they are two's complement in -32768..=32767.
//!
//! ## Quick Start
//!
//! ```rust
//! use voltage_modbus_engine::{Config, HandlerRequest, RouteMap, Rule, Server};
//!
//! let mut routes = RouteMap::new();
//! routes.add_rule(
//!     Rule::new(|req: &HandlerRequest| Ok(i32::from(req.address) * 10))
//!         .unit_ids([1])
//!         .function_codes([3]),
//! );
//! let server = Server::new(routes, Config::default());
//!
//! // Read 2 holding registers starting at 4
//! let response = server.respond(1, &[0x03, 0x00, 0x04, 0x00, 0x02]);
//! assert_eq!(response.as_slice(), &[0x03, 0x04, 0x00, 0x28, 0x00, 0x32]);
//!
//! // Unrouted address
//! let response = server.respond(2, &[0x03, 0x00, 0x04, 0x00, 0x02]);
//! assert_eq!(response.as_slice(), &[0x83, 0x02]);
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Error types and exception codes
pub mod error;

/// Modbus protocol constants
pub mod constants;

/// Value format configuration
pub mod config;

/// Stack-allocated PDU buffer
pub mod pdu;

/// Function codes and the PDU codec
pub mod function;

/// CRC-16 (Modbus)
pub mod crc;

/// Route table of data handlers
pub mod route;

/// Request pipeline and server shell
pub mod server;

/// Modbus TCP framing
pub mod tcp;

/// Modbus RTU framing
pub mod rtu;

/// Async client
pub mod client;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use voltage_modbus_engine::tokio) ===
pub use tokio;

// === Error handling ===
pub use error::{ExceptionCode, HandlerError, ModbusError, ModbusResult};

// === Configuration ===
pub use config::{Config, WordFormat};

// === Codec ===
pub use function::{Function, FunctionCode, Packing, ResponseData};
pub use pdu::{ModbusPdu, PduBuilder};

// === Server side ===
pub use route::{Handler, HandlerRequest, RouteMap, Rule};
pub use server::{FailureSink, HandlerFailure, Server};

// === Client side ===
pub use client::{Framing, ModbusClient, RtuClient, RtuFraming, TcpClient, TcpFraming};

// === Framing ===
pub use rtu::RtuTiming;
pub use tcp::{MbapHeader, TransactionIds};

// === Protocol limits (commonly needed constants) ===
pub use constants::{
    MAX_PDU_SIZE, MAX_READ_COILS, MAX_READ_REGISTERS, MAX_WRITE_COILS, MAX_WRITE_REGISTERS,
};

/// Modbus TCP default port
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
