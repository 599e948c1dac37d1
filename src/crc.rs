//! CRC-16 (Modbus) generation and validation for RTU frames.
//!
//! Polynomial 0xA001 (reflected 0x8005), initial register 0xFFFF, bytes
//! processed LSB-first. On the wire the CRC is transmitted low byte first.

use crc::{Crc, CRC_16_MODBUS};

use crate::error::{ModbusError, ModbusResult};

const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// CRC register value over `data`.
#[inline]
pub fn checksum(data: &[u8]) -> u16 {
    MODBUS_CRC.checksum(data)
}

/// CRC over `data`, in wire order (little-endian).
#[inline]
pub fn crc16(data: &[u8]) -> [u8; 2] {
    checksum(data).to_le_bytes()
}

/// Recompute the CRC of `data` and compare it with the received `crc` bytes.
pub fn validate_crc(data: &[u8], crc: &[u8]) -> ModbusResult<()> {
    let expected = checksum(data);
    let received = match crc {
        [lo, hi] => u16::from_le_bytes([*lo, *hi]),
        _ => {
            return Err(ModbusError::frame(format!(
                "CRC must be 2 bytes, got {}",
                crc.len()
            )))
        }
    };

    if expected != received {
        return Err(ModbusError::Crc { expected, received });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_serial_line_guide_example() {
        // MODBUS over Serial Line V1.02, chapter 6.2.2
        assert_eq!(crc16(b"\x02\x07"), [0x41, 0x12]);
        assert_eq!(checksum(b"\x02\x07"), 0x1241);
    }

    #[test]
    fn test_crc_read_holding_request() {
        // 01 03 00 00 00 0A -> C5 CD
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), [0xC5, 0xCD]);
    }

    #[test]
    fn test_validate_valid_crc() {
        validate_crc(b"\x02\x07", b"\x41\x12").unwrap();
    }

    #[test]
    fn test_validate_invalid_crc() {
        let err = validate_crc(b"\x02\x07", b"\x41\x11").unwrap_err();
        assert!(matches!(
            err,
            ModbusError::Crc {
                expected: 0x1241,
                received: 0x1141
            }
        ));
    }

    #[test]
    fn test_any_single_bit_flip_is_rejected() {
        let data = b"\x02\x07";
        let good = crc16(data);
        for byte in 0..2 {
            for bit in 0..8 {
                let mut bad = good;
                bad[byte] ^= 1 << bit;
                assert!(validate_crc(data, &bad).is_err());
            }
        }
    }

    #[test]
    fn test_validate_wrong_length() {
        assert!(matches!(
            validate_crc(b"\x02\x07", b"\x41"),
            Err(ModbusError::Frame { .. })
        ));
    }
}
