//! # Modbus TCP Framing
//!
//! A TCP ADU is the 7-byte MBAP header followed by the PDU. No CRC is used
//! on this transport.
//!
//! | Field | Size |
//! |-------|------|
//! | Transaction ID | 2 |
//! | Protocol ID (0) | 2 |
//! | Length (unit id + PDU) | 2 |
//! | Unit ID | 1 |

use std::sync::atomic::{AtomicU16, Ordering};

use crate::config::Config;
use crate::constants::{EXCEPTION_FLAG, MAX_MBAP_LENGTH, MBAP_HEADER_LEN, MODBUS_PROTOCOL_ID};
use crate::error::{ModbusError, ModbusResult};
use crate::function::{Function, ResponseData};

/// MBAP header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// Number of bytes following the length field: unit id + PDU.
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    /// Header for a PDU of `pdu_len` bytes.
    pub fn new(transaction_id: u16, unit_id: u8, pdu_len: usize) -> Self {
        Self {
            transaction_id,
            protocol_id: MODBUS_PROTOCOL_ID,
            length: (pdu_len + 1) as u16,
            unit_id,
        }
    }

    pub fn pack(&self) -> [u8; MBAP_HEADER_LEN] {
        pack_header(self.transaction_id, self.protocol_id, self.length, self.unit_id)
    }

    /// Parse the first 7 bytes of `bytes`.
    pub fn unpack(bytes: &[u8]) -> ModbusResult<Self> {
        let (transaction_id, protocol_id, length, unit_id) = unpack_header(bytes)?;
        Ok(Self {
            transaction_id,
            protocol_id,
            length,
            unit_id,
        })
    }

    /// Length of the PDU announced by this header.
    #[inline]
    pub fn pdu_len(&self) -> usize {
        (self.length as usize).saturating_sub(1)
    }

    /// Fail unless the length field is within 2..=254 (unit id plus a PDU
    /// of at least a function code and one data byte).
    pub fn validate_length(&self) -> ModbusResult<()> {
        let length = self.length as usize;
        if !(2..=MAX_MBAP_LENGTH).contains(&length) {
            return Err(ModbusError::frame(format!(
                "MBAP length {} out of range 2..={}",
                length, MAX_MBAP_LENGTH
            )));
        }
        Ok(())
    }
}

/// Pack an MBAP header, big-endian.
pub fn pack_header(
    transaction_id: u16,
    protocol_id: u16,
    length: u16,
    unit_id: u8,
) -> [u8; MBAP_HEADER_LEN] {
    let mut header = [0u8; MBAP_HEADER_LEN];
    header[0..2].copy_from_slice(&transaction_id.to_be_bytes());
    header[2..4].copy_from_slice(&protocol_id.to_be_bytes());
    header[4..6].copy_from_slice(&length.to_be_bytes());
    header[6] = unit_id;
    header
}

/// Unpack `(transaction_id, protocol_id, length, unit_id)` from the first
/// 7 bytes.
pub fn unpack_header(bytes: &[u8]) -> ModbusResult<(u16, u16, u16, u8)> {
    if bytes.len() < MBAP_HEADER_LEN {
        return Err(ModbusError::frame(format!(
            "MBAP header needs {} bytes, got {}",
            MBAP_HEADER_LEN,
            bytes.len()
        )));
    }
    Ok((
        u16::from_be_bytes([bytes[0], bytes[1]]),
        u16::from_be_bytes([bytes[2], bytes[3]]),
        u16::from_be_bytes([bytes[4], bytes[5]]),
        bytes[6],
    ))
}

fn assemble(header: MbapHeader, pdu: &[u8]) -> Vec<u8> {
    let mut adu = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    adu.extend_from_slice(&header.pack());
    adu.extend_from_slice(pdu);
    adu
}

/// Wrap a request PDU in an MBAP header.
pub fn create_request_adu(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    assemble(MbapHeader::new(transaction_id, unit_id, pdu.len()), pdu)
}

/// Wrap a response PDU, echoing transaction id, protocol id and unit id of
/// the request. Length is `pdu.len() + 1`.
pub fn create_response_adu(request: &MbapHeader, pdu: &[u8]) -> Vec<u8> {
    let header = MbapHeader {
        length: (pdu.len() + 1) as u16,
        ..*request
    };
    assemble(header, pdu)
}

/// Split a request ADU into header and PDU. The length field must match
/// the number of bytes received.
pub fn parse_request_adu(adu: &[u8]) -> ModbusResult<(MbapHeader, &[u8])> {
    let header = MbapHeader::unpack(adu)?;
    header.validate_length()?;
    let pdu = &adu[MBAP_HEADER_LEN..];
    if pdu.len() != header.pdu_len() {
        return Err(ModbusError::frame(format!(
            "MBAP length announces {} PDU bytes, got {}",
            header.pdu_len(),
            pdu.len()
        )));
    }
    Ok((header, pdu))
}

/// Raise the typed error if the first 9 bytes of a response are an
/// exception ADU answering `transaction_id` on `unit_id`.
///
/// An exception ADU for another transaction or unit is a frame error.
pub fn raise_for_exception_adu(adu: &[u8], transaction_id: u16, unit_id: u8) -> ModbusResult<()> {
    let (fc, code) = match adu.get(MBAP_HEADER_LEN..MBAP_HEADER_LEN + 2) {
        Some(&[fc, code]) => (fc, code),
        _ => {
            return Err(ModbusError::frame(format!(
                "response ADU too short: {} bytes",
                adu.len()
            )))
        }
    };
    if fc & EXCEPTION_FLAG == 0 {
        return Ok(());
    }

    let header = MbapHeader::unpack(adu)?;
    if header.transaction_id != transaction_id {
        return Err(ModbusError::frame(format!(
            "exception for transaction {}, expected {}",
            header.transaction_id, transaction_id
        )));
    }
    if header.unit_id != unit_id {
        return Err(ModbusError::frame(format!(
            "exception from unit {}, expected {}",
            header.unit_id, unit_id
        )));
    }
    Err(ModbusError::from_exception_code(fc, code))
}

/// Parse the response to `request`, sent with `transaction_id`.
pub fn parse_response_adu(
    adu: &[u8],
    transaction_id: u16,
    request: &Function,
    config: &Config,
) -> ModbusResult<ResponseData> {
    let (header, pdu) = parse_request_adu(adu)?;
    if header.transaction_id != transaction_id {
        return Err(ModbusError::frame(format!(
            "transaction id mismatch: sent {}, received {}",
            transaction_id, header.transaction_id
        )));
    }
    if header.protocol_id != MODBUS_PROTOCOL_ID {
        return Err(ModbusError::frame(format!(
            "unexpected protocol id {}",
            header.protocol_id
        )));
    }
    request.decode_response(pdu, config)
}

/// Size of the success response ADU for `request`.
pub fn expected_response_adu_len(request: &Function) -> usize {
    MBAP_HEADER_LEN + request.expected_response_pdu_len()
}

/// Wrapping transaction id generator.
#[derive(Debug, Default)]
pub struct TransactionIds {
    next: AtomicU16,
}

impl TransactionIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting at `first`.
    pub fn starting_at(first: u16) -> Self {
        Self {
            next: AtomicU16::new(first),
        }
    }

    pub fn next(&self) -> u16 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
