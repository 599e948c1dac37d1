//! Modbus PDU buffer
//!
//! Use a fixed-size stack array to avoid heap allocation while building
//! request and response PDUs.

use std::fmt;

use tracing::debug;

use crate::config::WordFormat;
use crate::constants::{EXCEPTION_FLAG, MAX_PDU_SIZE};
use crate::error::{ExceptionCode, ModbusError, ModbusResult};

/// PDU with stack-allocated fixed array
#[derive(Clone)]
pub struct ModbusPdu {
    /// Fixed-size buffer (stack)
    data: [u8; MAX_PDU_SIZE],
    /// Actual data length
    len: usize,
}

impl ModbusPdu {
    /// Create an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from a byte slice
    pub fn from_slice(data: &[u8]) -> ModbusResult<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::frame(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }

        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();
        Ok(pdu)
    }

    /// Build an exception response PDU: `0x80 | function_code, exception_code`.
    pub fn exception(function_code: u8, code: ExceptionCode) -> Self {
        let mut pdu = Self::new();
        pdu.data[0] = function_code | EXCEPTION_FLAG;
        pdu.data[1] = code.to_u8();
        pdu.len = 2;
        debug!(
            "Exception PDU built: FC={:02X} ({}), code={}",
            function_code,
            Self::function_code_description(function_code),
            code
        );
        pdu
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> ModbusResult<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(ModbusError::frame("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> ModbusResult<()> {
        self.extend(&value.to_be_bytes())
    }

    /// Extend with a byte slice
    #[inline]
    pub fn extend(&mut self, data: &[u8]) -> ModbusResult<()> {
        if self.len + data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::frame(format!(
                "PDU would exceed max size: {} + {} > {}",
                self.len,
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// Get immutable data slice
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Copy the PDU into an owned vector
    #[inline]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Get current length
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get function code (first byte)
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// Check if exception response
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .map(|fc| fc & EXCEPTION_FLAG != 0)
            .unwrap_or(false)
    }

    /// Get exception code
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() && self.len > 1 {
            Some(self.data[1])
        } else {
            None
        }
    }

    /// Get human-readable function code description
    pub fn function_code_description(fc: u8) -> &'static str {
        match fc & 0x7F {
            0x01 => "Read Coils",
            0x02 => "Read Discrete Inputs",
            0x03 => "Read Holding Registers",
            0x04 => "Read Input Registers",
            0x05 => "Write Single Coil",
            0x06 => "Write Single Register",
            0x0F => "Write Multiple Coils",
            0x10 => "Write Multiple Registers",
            _ => "Unknown Function",
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ModbusPdu {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ModbusPdu {}

impl AsRef<[u8]> for ModbusPdu {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for ModbusPdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModbusPdu({})", hex(self.as_slice()))
    }
}

/// Lowercase hex rendering used by trace logging.
pub(crate) fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

/// PDU builder - fluent API
pub struct PduBuilder {
    pdu: ModbusPdu,
}

impl Default for PduBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PduBuilder {
    /// Create a new builder
    #[inline]
    pub fn new() -> Self {
        Self {
            pdu: ModbusPdu::new(),
        }
    }

    /// Set function code
    #[inline]
    pub fn function_code(mut self, fc: u8) -> ModbusResult<Self> {
        self.pdu.push(fc)?;
        Ok(self)
    }

    /// Add address
    #[inline]
    pub fn address(mut self, addr: u16) -> ModbusResult<Self> {
        self.pdu.push_u16(addr)?;
        Ok(self)
    }

    /// Add quantity
    #[inline]
    pub fn quantity(mut self, qty: u16) -> ModbusResult<Self> {
        self.pdu.push_u16(qty)?;
        Ok(self)
    }

    /// Add a raw u16
    #[inline]
    pub fn u16(mut self, value: u16) -> ModbusResult<Self> {
        self.pdu.push_u16(value)?;
        Ok(self)
    }

    /// Add a register value packed with `format`
    #[inline]
    pub fn word(mut self, value: i32, format: WordFormat) -> ModbusResult<Self> {
        self.pdu.extend(&format.pack(value)?)?;
        Ok(self)
    }

    /// Add a byte
    #[inline]
    pub fn byte(mut self, b: u8) -> ModbusResult<Self> {
        self.pdu.push(b)?;
        Ok(self)
    }

    /// Add data
    #[inline]
    pub fn data(mut self, data: &[u8]) -> ModbusResult<Self> {
        self.pdu.extend(data)?;
        Ok(self)
    }

    /// Build the PDU
    #[inline]
    pub fn build(self) -> ModbusPdu {
        if let Some(fc) = self.pdu.function_code() {
            debug!(
                "PDU built: FC={:02X} ({}), total_len={}",
                fc,
                ModbusPdu::function_code_description(fc),
                self.pdu.len()
            );
        }

        self.pdu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdu_basic_operations() {
        let mut pdu = ModbusPdu::new();
        assert_eq!(pdu.len(), 0);
        assert!(pdu.is_empty());

        pdu.push(0x03).unwrap();
        assert_eq!(pdu.function_code(), Some(0x03));
        assert!(!pdu.is_exception());

        pdu.push_u16(0x0100).unwrap();
        pdu.push_u16(0x000A).unwrap();

        assert_eq!(pdu.len(), 5);
        assert_eq!(pdu.as_slice(), &[0x03, 0x01, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn test_pdu_overflow() {
        let mut pdu = ModbusPdu::from_slice(&[0u8; MAX_PDU_SIZE]).unwrap();
        assert!(pdu.push(0x01).is_err());
        assert!(ModbusPdu::from_slice(&[0u8; MAX_PDU_SIZE + 1]).is_err());
    }

    #[test]
    fn test_pdu_builder() {
        let pdu = PduBuilder::new()
            .function_code(0x03)
            .unwrap()
            .address(0x0100)
            .unwrap()
            .quantity(0x000A)
            .unwrap()
            .build();

        assert_eq!(pdu.as_slice(), &[0x03, 0x01, 0x00, 0x00, 0x0A]);
    }

    #[test]
    fn test_builder_word_formats() {
        let pdu = PduBuilder::new()
            .word(-2, WordFormat::Signed16)
            .unwrap()
            .word(0xFFFE, WordFormat::Unsigned16)
            .unwrap()
            .build();
        assert_eq!(pdu.as_slice(), &[0xFF, 0xFE, 0xFF, 0xFE]);

        assert!(PduBuilder::new().word(-2, WordFormat::Unsigned16).is_err());
    }

    #[test]
    fn test_exception_response() {
        let pdu = ModbusPdu::exception(0x03, ExceptionCode::IllegalDataAddress);

        assert_eq!(pdu.as_slice(), &[0x83, 0x02]);
        assert!(pdu.is_exception());
        assert_eq!(pdu.exception_code(), Some(0x02));
    }

    #[test]
    fn test_debug_is_hex() {
        let pdu = ModbusPdu::from_slice(&[0x01, 0xAB]).unwrap();
        assert_eq!(format!("{:?}", pdu), "ModbusPdu(01ab)");
    }
}
