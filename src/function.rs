//! # Modbus Function Model
//!
//! One [`Function`] variant per supported function code. Each variant owns
//! its request/response layout and validates its fields when constructed,
//! so an out-of-range quantity, illegal coil value or mismatched byte count
//! never yields a `Function`.
//!
//! | Code | Function | Packing | Max quantity |
//! |------|----------|---------|--------------|
//! | 0x01 | Read Coils | bits | 2000 |
//! | 0x02 | Read Discrete Inputs | bits | 2000 |
//! | 0x03 | Read Holding Registers | words | 125 |
//! | 0x04 | Read Input Registers | words | 125 |
//! | 0x05 | Write Single Coil | - | 1 |
//! | 0x06 | Write Single Register | words | 1 |
//! | 0x0F | Write Multiple Coils | bits | 1968 |
//! | 0x10 | Write Multiple Registers | words | 123 |
//!
//! ```rust
//! use voltage_modbus_engine::{Config, Function};
//!
//! let config = Config::default();
//! let request = Function::decode_request(&[0x01, 0x00, 0x64, 0x00, 0x03], &config).unwrap();
//! let response = request.encode_response(&[1, 1, 0], &config).unwrap();
//! assert_eq!(response.as_slice(), &[0x01, 0x01, 0x03]);
//! ```

use std::fmt;
use std::ops::Range;

use crate::config::Config;
use crate::constants::*;
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{ModbusPdu, PduBuilder};

/// Supported function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = FC_READ_COILS,
    ReadDiscreteInputs = FC_READ_DISCRETE_INPUTS,
    ReadHoldingRegisters = FC_READ_HOLDING_REGISTERS,
    ReadInputRegisters = FC_READ_INPUT_REGISTERS,
    WriteSingleCoil = FC_WRITE_SINGLE_COIL,
    WriteSingleRegister = FC_WRITE_SINGLE_REGISTER,
    WriteMultipleCoils = FC_WRITE_MULTIPLE_COILS,
    WriteMultipleRegisters = FC_WRITE_MULTIPLE_REGISTERS,
}

impl FunctionCode {
    /// Look up a function code, failing with `IllegalFunction` for
    /// anything this engine doesn't implement.
    pub fn from_u8(code: u8) -> ModbusResult<Self> {
        match code {
            FC_READ_COILS => Ok(Self::ReadCoils),
            FC_READ_DISCRETE_INPUTS => Ok(Self::ReadDiscreteInputs),
            FC_READ_HOLDING_REGISTERS => Ok(Self::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Ok(Self::ReadInputRegisters),
            FC_WRITE_SINGLE_COIL => Ok(Self::WriteSingleCoil),
            FC_WRITE_SINGLE_REGISTER => Ok(Self::WriteSingleRegister),
            FC_WRITE_MULTIPLE_COILS => Ok(Self::WriteMultipleCoils),
            FC_WRITE_MULTIPLE_REGISTERS => Ok(Self::WriteMultipleRegisters),
            _ => Err(ModbusError::illegal_function(code)),
        }
    }

    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// How values of this function are laid out on the wire.
    pub fn packing(self) -> Packing {
        match self {
            Self::ReadCoils
            | Self::ReadDiscreteInputs
            | Self::WriteSingleCoil
            | Self::WriteMultipleCoils => Packing::Bits,
            Self::ReadHoldingRegisters
            | Self::ReadInputRegisters
            | Self::WriteSingleRegister
            | Self::WriteMultipleRegisters => Packing::Words,
        }
    }

    /// Largest quantity a single request may carry.
    pub fn max_quantity(self) -> u16 {
        match self {
            Self::ReadCoils | Self::ReadDiscreteInputs => MAX_READ_COILS,
            Self::ReadHoldingRegisters | Self::ReadInputRegisters => MAX_READ_REGISTERS,
            Self::WriteSingleCoil | Self::WriteSingleRegister => 1,
            Self::WriteMultipleCoils => MAX_WRITE_COILS,
            Self::WriteMultipleRegisters => MAX_WRITE_REGISTERS,
        }
    }

    pub fn is_read(self) -> bool {
        matches!(
            self,
            Self::ReadCoils
                | Self::ReadDiscreteInputs
                | Self::ReadHoldingRegisters
                | Self::ReadInputRegisters
        )
    }

    pub fn name(self) -> &'static str {
        ModbusPdu::function_code_description(self.to_u8())
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = ModbusError;

    fn try_from(code: u8) -> ModbusResult<Self> {
        Self::from_u8(code)
    }
}

impl From<FunctionCode> for u8 {
    fn from(code: FunctionCode) -> u8 {
        code.to_u8()
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.to_u8())
    }
}

/// Value packing strategy: single-bit values (coils, discrete inputs) or
/// 16-bit words (registers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packing {
    /// 8 values per byte, LSB of the first byte holds the first value.
    Bits,
    /// One big-endian word per value, signedness from [`Config`].
    Words,
}

impl Packing {
    /// Bytes needed for `quantity` values.
    #[inline]
    pub fn byte_count(self, quantity: usize) -> usize {
        match self {
            Self::Bits => quantity.div_ceil(8),
            Self::Words => quantity * 2,
        }
    }

    /// Check that `value` is representable.
    pub fn validate(self, value: i32, config: &Config) -> ModbusResult<()> {
        match self {
            Self::Bits if value == 0 || value == 1 => Ok(()),
            Self::Bits => Err(ModbusError::illegal_data_value(format!(
                "bit value must be 0 or 1, got {}",
                value
            ))),
            Self::Words => config.word_format().validate(value),
        }
    }

    /// Pack `values` into their wire representation.
    pub fn pack(self, values: &[i32], config: &Config) -> ModbusResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.byte_count(values.len()));
        match self {
            Self::Bits => {
                for chunk in values.chunks(8) {
                    let mut byte = 0u8;
                    for (i, &bit) in chunk.iter().enumerate() {
                        self.validate(bit, config)?;
                        byte |= (bit as u8) << i;
                    }
                    out.push(byte);
                }
            }
            Self::Words => {
                let format = config.word_format();
                for &value in values {
                    out.extend_from_slice(&format.pack(value)?);
                }
            }
        }
        Ok(out)
    }

    /// Unpack exactly `quantity` values from `data`. Padding bits past
    /// `quantity` are ignored.
    pub fn unpack(self, data: &[u8], quantity: usize, config: &Config) -> ModbusResult<Vec<i32>> {
        if data.len() < self.byte_count(quantity) {
            return Err(ModbusError::illegal_data_value(format!(
                "{} bytes can't hold {} values",
                data.len(),
                quantity
            )));
        }

        let values = match self {
            Self::Bits => (0..quantity)
                .map(|i| ((data[i / 8] >> (i % 8)) & 0x01) as i32)
                .collect(),
            Self::Words => {
                let format = config.word_format();
                data.chunks_exact(2)
                    .take(quantity)
                    .map(|word| format.unpack([word[0], word[1]]))
                    .collect()
            }
        };
        Ok(values)
    }
}

/// Request of a read function (FC01-04).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    starting_address: u16,
    quantity: u16,
}

impl ReadRequest {
    pub fn starting_address(&self) -> u16 {
        self.starting_address
    }

    pub fn quantity(&self) -> u16 {
        self.quantity
    }
}

/// Request of a single-value write (FC05, FC06).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingle {
    address: u16,
    value: i32,
}

impl WriteSingle {
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Raw value. For FC05 this is `0x0000` or `0xFF00`.
    pub fn value(&self) -> i32 {
        self.value
    }
}

/// Request of a multi-value write (FC15, FC16). The quantity is always
/// the number of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteMultiple {
    starting_address: u16,
    values: Vec<i32>,
}

impl WriteMultiple {
    pub fn starting_address(&self) -> u16 {
        self.starting_address
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn quantity(&self) -> u16 {
        self.values.len() as u16
    }
}

/// A validated Modbus request, one variant per supported function code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Function {
    ReadCoils(ReadRequest),
    ReadDiscreteInputs(ReadRequest),
    ReadHoldingRegisters(ReadRequest),
    ReadInputRegisters(ReadRequest),
    WriteSingleCoil(WriteSingle),
    WriteSingleRegister(WriteSingle),
    WriteMultipleCoils(WriteMultiple),
    WriteMultipleRegisters(WriteMultiple),
}

/// Data carried by a successful response, as seen by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseData {
    /// Read functions: one value per requested address, in address order.
    Values(Vec<i32>),
    /// Single-value writes: the echoed value. Coils decode to 0 or 1.
    Value(i32),
    /// Multi-value writes: number of values written.
    Count(u16),
}

impl ResponseData {
    /// Values of a read response, `None` for write responses.
    pub fn into_values(self) -> Option<Vec<i32>> {
        match self {
            Self::Values(values) => Some(values),
            Self::Value(_) | Self::Count(_) => None,
        }
    }
}

fn check_quantity(code: FunctionCode, quantity: u16) -> ModbusResult<()> {
    let max = code.max_quantity();
    if !(1..=max).contains(&quantity) {
        return Err(ModbusError::illegal_data_value(format!(
            "quantity of {} must be between 1 and {}, got {}",
            code.name(),
            max,
            quantity
        )));
    }
    Ok(())
}

fn check_address_range(starting_address: u16, quantity: u16) -> ModbusResult<()> {
    if starting_address as u32 + quantity as u32 > 0x1_0000 {
        return Err(ModbusError::IllegalDataAddress);
    }
    Ok(())
}

fn be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn check_len(code: FunctionCode, pdu: &[u8], expected: usize) -> ModbusResult<()> {
    if pdu.len() != expected {
        return Err(ModbusError::illegal_data_value(format!(
            "{} request must be {} bytes, got {}",
            code.name(),
            expected,
            pdu.len()
        )));
    }
    Ok(())
}

impl Function {
    // ========================================================================
    // Constructors
    // ========================================================================

    /// Build a read request for FC01-04.
    pub fn read(code: FunctionCode, starting_address: u16, quantity: u16) -> ModbusResult<Self> {
        check_quantity(code, quantity)?;
        check_address_range(starting_address, quantity)?;
        let request = ReadRequest {
            starting_address,
            quantity,
        };
        match code {
            FunctionCode::ReadCoils => Ok(Self::ReadCoils(request)),
            FunctionCode::ReadDiscreteInputs => Ok(Self::ReadDiscreteInputs(request)),
            FunctionCode::ReadHoldingRegisters => Ok(Self::ReadHoldingRegisters(request)),
            FunctionCode::ReadInputRegisters => Ok(Self::ReadInputRegisters(request)),
            _ => Err(ModbusError::illegal_function(code.to_u8())),
        }
    }

    pub fn read_coils(starting_address: u16, quantity: u16) -> ModbusResult<Self> {
        Self::read(FunctionCode::ReadCoils, starting_address, quantity)
    }

    pub fn read_discrete_inputs(starting_address: u16, quantity: u16) -> ModbusResult<Self> {
        Self::read(FunctionCode::ReadDiscreteInputs, starting_address, quantity)
    }

    pub fn read_holding_registers(starting_address: u16, quantity: u16) -> ModbusResult<Self> {
        Self::read(FunctionCode::ReadHoldingRegisters, starting_address, quantity)
    }

    pub fn read_input_registers(starting_address: u16, quantity: u16) -> ModbusResult<Self> {
        Self::read(FunctionCode::ReadInputRegisters, starting_address, quantity)
    }

    /// FC05. `value` must be `0x0000` (OFF) or `0xFF00` (ON).
    pub fn write_single_coil(address: u16, value: u16) -> ModbusResult<Self> {
        if value != COIL_OFF && value != COIL_ON {
            return Err(ModbusError::illegal_data_value(format!(
                "coil value must be 0x0000 or 0xFF00, got {:#06x}",
                value
            )));
        }
        Ok(Self::WriteSingleCoil(WriteSingle {
            address,
            value: value as i32,
        }))
    }

    /// FC06. `value` must fit the configured word format.
    pub fn write_single_register(address: u16, value: i32, config: &Config) -> ModbusResult<Self> {
        config.word_format().validate(value)?;
        Ok(Self::WriteSingleRegister(WriteSingle { address, value }))
    }

    /// FC15. Every value must be 0 or 1.
    pub fn write_multiple_coils(starting_address: u16, values: Vec<i32>) -> ModbusResult<Self> {
        Self::write_multiple(
            FunctionCode::WriteMultipleCoils,
            starting_address,
            values,
            &Config::default(),
        )
    }

    /// FC16. Every value must fit the configured word format.
    pub fn write_multiple_registers(
        starting_address: u16,
        values: Vec<i32>,
        config: &Config,
    ) -> ModbusResult<Self> {
        Self::write_multiple(
            FunctionCode::WriteMultipleRegisters,
            starting_address,
            values,
            config,
        )
    }

    fn write_multiple(
        code: FunctionCode,
        starting_address: u16,
        values: Vec<i32>,
        config: &Config,
    ) -> ModbusResult<Self> {
        let quantity = u16::try_from(values.len()).map_err(|_| {
            ModbusError::illegal_data_value(format!("too many values: {}", values.len()))
        })?;
        check_quantity(code, quantity)?;
        check_address_range(starting_address, quantity)?;
        let packing = code.packing();
        for &value in &values {
            packing.validate(value, config)?;
        }

        let request = WriteMultiple {
            starting_address,
            values,
        };
        Ok(match code {
            FunctionCode::WriteMultipleCoils => Self::WriteMultipleCoils(request),
            _ => Self::WriteMultipleRegisters(request),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils(_) => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils(_) => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters(_) => FunctionCode::WriteMultipleRegisters,
        }
    }

    /// First address touched. For single writes this is the address itself.
    pub fn starting_address(&self) -> u16 {
        match self {
            Self::ReadCoils(r)
            | Self::ReadDiscreteInputs(r)
            | Self::ReadHoldingRegisters(r)
            | Self::ReadInputRegisters(r) => r.starting_address,
            Self::WriteSingleCoil(w) | Self::WriteSingleRegister(w) => w.address,
            Self::WriteMultipleCoils(w) | Self::WriteMultipleRegisters(w) => w.starting_address,
        }
    }

    /// Number of addresses touched.
    pub fn quantity(&self) -> u16 {
        match self {
            Self::ReadCoils(r)
            | Self::ReadDiscreteInputs(r)
            | Self::ReadHoldingRegisters(r)
            | Self::ReadInputRegisters(r) => r.quantity,
            Self::WriteSingleCoil(_) | Self::WriteSingleRegister(_) => 1,
            Self::WriteMultipleCoils(w) | Self::WriteMultipleRegisters(w) => w.quantity(),
        }
    }

    /// Addresses touched, ascending. Construction guarantees no overflow.
    pub fn addresses(&self) -> Range<u32> {
        let start = self.starting_address() as u32;
        start..start + self.quantity() as u32
    }

    // ========================================================================
    // Request PDU
    // ========================================================================

    /// Decode a request PDU.
    pub fn decode_request(pdu: &[u8], config: &Config) -> ModbusResult<Self> {
        let fc = *pdu.first().ok_or(ModbusError::IllegalFunction { code: 0 })?;
        let code = FunctionCode::from_u8(fc)?;

        match code {
            FunctionCode::ReadCoils
            | FunctionCode::ReadDiscreteInputs
            | FunctionCode::ReadHoldingRegisters
            | FunctionCode::ReadInputRegisters => {
                check_len(code, pdu, 5)?;
                Self::read(code, be_u16(pdu, 1), be_u16(pdu, 3))
            }
            FunctionCode::WriteSingleCoil => {
                check_len(code, pdu, 5)?;
                Self::write_single_coil(be_u16(pdu, 1), be_u16(pdu, 3))
            }
            FunctionCode::WriteSingleRegister => {
                check_len(code, pdu, 5)?;
                let value = config.word_format().unpack([pdu[3], pdu[4]]);
                Self::write_single_register(be_u16(pdu, 1), value, config)
            }
            FunctionCode::WriteMultipleCoils | FunctionCode::WriteMultipleRegisters => {
                if pdu.len() < 6 {
                    return Err(ModbusError::illegal_data_value(format!(
                        "{} request must be at least 6 bytes, got {}",
                        code.name(),
                        pdu.len()
                    )));
                }
                let starting_address = be_u16(pdu, 1);
                let quantity = be_u16(pdu, 3);
                let byte_count = pdu[5] as usize;
                check_quantity(code, quantity)?;

                let packing = code.packing();
                let expected = packing.byte_count(quantity as usize);
                if byte_count != expected {
                    return Err(ModbusError::illegal_data_value(format!(
                        "byte count is {}, but should be {}",
                        byte_count, expected
                    )));
                }
                check_len(code, pdu, 6 + byte_count)?;

                let values = packing.unpack(&pdu[6..], quantity as usize, config)?;
                Self::write_multiple(code, starting_address, values, config)
            }
        }
    }

    /// Encode this request as a PDU.
    pub fn encode_request(&self, config: &Config) -> ModbusResult<ModbusPdu> {
        let builder = PduBuilder::new().function_code(self.function_code().to_u8())?;
        let pdu = match self {
            Self::ReadCoils(r)
            | Self::ReadDiscreteInputs(r)
            | Self::ReadHoldingRegisters(r)
            | Self::ReadInputRegisters(r) => builder
                .address(r.starting_address)?
                .quantity(r.quantity)?
                .build(),
            Self::WriteSingleCoil(_) | Self::WriteSingleRegister(_) => {
                return self.encode_echo(config)
            }
            Self::WriteMultipleCoils(w) | Self::WriteMultipleRegisters(w) => {
                let data = self.function_code().packing().pack(&w.values, config)?;
                builder
                    .address(w.starting_address)?
                    .quantity(w.quantity())?
                    .byte(data.len() as u8)?
                    .data(&data)?
                    .build()
            }
        };
        Ok(pdu)
    }

    fn encode_echo(&self, config: &Config) -> ModbusResult<ModbusPdu> {
        let builder = PduBuilder::new()
            .function_code(self.function_code().to_u8())?
            .address(self.starting_address())?;
        let pdu = match self {
            Self::WriteSingleCoil(w) => builder.u16(w.value as u16)?.build(),
            Self::WriteSingleRegister(w) => builder.word(w.value, config.word_format())?.build(),
            _ => return Err(ModbusError::frame("echo only exists for single writes")),
        };
        Ok(pdu)
    }

    // ========================================================================
    // Response PDU
    // ========================================================================

    /// Build the success response PDU.
    ///
    /// Read functions take one value per requested address in address
    /// order. Write functions ignore `values`.
    pub fn encode_response(&self, values: &[i32], config: &Config) -> ModbusResult<ModbusPdu> {
        let fc = self.function_code();
        match self {
            Self::ReadCoils(r)
            | Self::ReadDiscreteInputs(r)
            | Self::ReadHoldingRegisters(r)
            | Self::ReadInputRegisters(r) => {
                if values.len() != r.quantity as usize {
                    return Err(ModbusError::frame(format!(
                        "{} expects {} values, got {}",
                        fc.name(),
                        r.quantity,
                        values.len()
                    )));
                }
                let data = fc.packing().pack(values, config)?;
                Ok(PduBuilder::new()
                    .function_code(fc.to_u8())?
                    .byte(data.len() as u8)?
                    .data(&data)?
                    .build())
            }
            Self::WriteSingleCoil(_) | Self::WriteSingleRegister(_) => self.encode_echo(config),
            Self::WriteMultipleCoils(w) | Self::WriteMultipleRegisters(w) => Ok(PduBuilder::new()
                .function_code(fc.to_u8())?
                .address(w.starting_address)?
                .quantity(w.quantity())?
                .build()),
        }
    }

    /// Length of the success response PDU for this request.
    pub fn expected_response_pdu_len(&self) -> usize {
        match self {
            Self::ReadCoils(r)
            | Self::ReadDiscreteInputs(r)
            | Self::ReadHoldingRegisters(r)
            | Self::ReadInputRegisters(r) => {
                2 + self.function_code().packing().byte_count(r.quantity as usize)
            }
            _ => 5,
        }
    }

    /// Decode a response PDU received for this request.
    ///
    /// An exception response becomes the matching typed error.
    pub fn decode_response(&self, pdu: &[u8], config: &Config) -> ModbusResult<ResponseData> {
        let expected_fc = self.function_code().to_u8();
        let (&fc, body) = pdu
            .split_first()
            .ok_or_else(|| ModbusError::frame("empty response PDU"))?;

        if fc & EXCEPTION_FLAG != 0 {
            if fc & !EXCEPTION_FLAG != expected_fc {
                return Err(ModbusError::UnexpectedFunction {
                    expected: expected_fc,
                    actual: fc,
                });
            }
            let code = *body
                .first()
                .ok_or_else(|| ModbusError::frame("exception response without code"))?;
            return Err(ModbusError::from_exception_code(fc, code));
        }
        if fc != expected_fc {
            return Err(ModbusError::UnexpectedFunction {
                expected: expected_fc,
                actual: fc,
            });
        }
        if pdu.len() != self.expected_response_pdu_len() {
            return Err(ModbusError::frame(format!(
                "{} response must be {} bytes, got {}",
                self.function_code().name(),
                self.expected_response_pdu_len(),
                pdu.len()
            )));
        }

        match self {
            Self::ReadCoils(r)
            | Self::ReadDiscreteInputs(r)
            | Self::ReadHoldingRegisters(r)
            | Self::ReadInputRegisters(r) => {
                let packing = self.function_code().packing();
                let byte_count = body[0] as usize;
                if byte_count != packing.byte_count(r.quantity as usize) {
                    return Err(ModbusError::frame(format!(
                        "byte count is {}, but should be {}",
                        byte_count,
                        packing.byte_count(r.quantity as usize)
                    )));
                }
                let values = packing
                    .unpack(&body[1..], r.quantity as usize, config)
                    .map_err(|e| ModbusError::frame(e.to_string()))?;
                Ok(ResponseData::Values(values))
            }
            Self::WriteSingleCoil(_) => match be_u16(body, 2) {
                COIL_ON => Ok(ResponseData::Value(1)),
                COIL_OFF => Ok(ResponseData::Value(0)),
                other => Err(ModbusError::frame(format!(
                    "illegal coil value in response: {:#06x}",
                    other
                ))),
            },
            Self::WriteSingleRegister(_) => Ok(ResponseData::Value(
                config.word_format().unpack([body[2], body[3]]),
            )),
            Self::WriteMultipleCoils(_) | Self::WriteMultipleRegisters(_) => {
                Ok(ResponseData::Count(be_u16(body, 2)))
            }
        }
    }
}
