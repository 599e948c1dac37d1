//! # Modbus RTU Framing
//!
//! An RTU ADU is `unit id | PDU | CRC-16`, the CRC sent low byte first.
//! Frames are delimited on the line by a silent interval of 3.5 character
//! times, see [`RtuTiming`].

use std::time::Duration;

use crate::config::Config;
use crate::constants::{CRC_LEN, EXCEPTION_FLAG, MAX_RTU_ADU_SIZE, MIN_RTU_ADU_LEN};
use crate::crc::{crc16, validate_crc};
use crate::error::{ModbusError, ModbusResult};
use crate::function::{Function, ResponseData};

/// Above this baud rate the character time is fixed.
const FIXED_TIMING_BAUD_THRESHOLD: u32 = 19_200;

/// Character time used above 19200 baud: 1.75 ms frame gap / 3.5.
const FIXED_CHAR_TIME: Duration = Duration::from_micros(500);

/// Bits per character: start, 8 data, parity or second stop, stop.
const BITS_PER_CHAR: u64 = 11;

/// Silent intervals derived from the line speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtuTiming {
    /// Time to transmit one character.
    pub char_time: Duration,
    /// Minimum silence between frames (3.5 characters).
    pub frame_gap: Duration,
    /// Maximum silence between characters of one frame (1.5 characters).
    pub inter_char_timeout: Duration,
}

impl RtuTiming {
    pub fn from_baud_rate(baud_rate: u32) -> Self {
        let char_time = if baud_rate == 0 || baud_rate > FIXED_TIMING_BAUD_THRESHOLD {
            FIXED_CHAR_TIME
        } else {
            Duration::from_nanos(BITS_PER_CHAR * 1_000_000_000 / baud_rate as u64)
        };
        Self {
            char_time,
            frame_gap: char_time * 7 / 2,
            inter_char_timeout: char_time * 3 / 2,
        }
    }
}

/// Build `unit id | pdu | crc`.
pub fn create_request_adu(unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut adu = Vec::with_capacity(1 + pdu.len() + CRC_LEN);
    adu.push(unit_id);
    adu.extend_from_slice(pdu);
    let crc = crc16(&adu);
    adu.extend_from_slice(&crc);
    adu
}

/// Build a response ADU. Same layout as a request.
pub fn create_response_adu(unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    create_request_adu(unit_id, pdu)
}

/// Check length and CRC, then split into unit id and PDU.
pub fn parse_request_adu(adu: &[u8]) -> ModbusResult<(u8, &[u8])> {
    if adu.len() < MIN_RTU_ADU_LEN {
        return Err(ModbusError::frame(format!(
            "RTU frame too short: {} bytes (min {})",
            adu.len(),
            MIN_RTU_ADU_LEN
        )));
    }
    if adu.len() > MAX_RTU_ADU_SIZE {
        return Err(ModbusError::frame(format!(
            "RTU frame too long: {} bytes (max {})",
            adu.len(),
            MAX_RTU_ADU_SIZE
        )));
    }

    let (body, crc) = adu.split_at(adu.len() - CRC_LEN);
    validate_crc(body, crc)?;
    Ok((body[0], &body[1..]))
}

/// Raise the typed error if the first 5 bytes of a response form an
/// exception ADU from `unit_id` with a valid CRC.
pub fn raise_for_exception_adu(adu: &[u8], unit_id: u8) -> ModbusResult<()> {
    let head = adu.get(..MIN_RTU_ADU_LEN).ok_or_else(|| {
        ModbusError::frame(format!("RTU response too short: {} bytes", adu.len()))
    })?;
    if head[1] & EXCEPTION_FLAG == 0 {
        return Ok(());
    }
    validate_crc(&head[..3], &head[3..])?;
    if head[0] != unit_id {
        return Err(ModbusError::frame(format!(
            "exception from unit {}, expected {}",
            head[0], unit_id
        )));
    }
    Err(ModbusError::from_exception_code(head[1], head[2]))
}

/// Parse the response to `request` sent to `unit_id`.
pub fn parse_response_adu(
    adu: &[u8],
    unit_id: u8,
    request: &Function,
    config: &Config,
) -> ModbusResult<ResponseData> {
    let (received_unit, pdu) = parse_request_adu(adu)?;
    if received_unit != unit_id {
        return Err(ModbusError::frame(format!(
            "response from unit {}, expected {}",
            received_unit, unit_id
        )));
    }
    request.decode_response(pdu, config)
}

/// Size of the success response ADU for `request`.
pub fn expected_response_adu_len(request: &Function) -> usize {
    1 + request.expected_response_pdu_len() + CRC_LEN
}
