//! # Register Value Configuration
//!
//! Controls whether register (multi-bit) values are packed as signed or
//! unsigned 16-bit words. A [`Config`] is passed explicitly to every
//! encode/decode call; there is no process-wide mutable state.
//!
//! ```rust
//! use voltage_modbus_engine::Config;
//!
//! let config = Config::new().with_signed_values(true);
//! assert_eq!(config.word_format().pack(-1).unwrap(), [0xFF, 0xFF]);
//! ```

use std::env;

use crate::error::{ModbusError, ModbusResult};

/// Environment variable consulted by [`Config::from_env`].
pub const SIGNED_VALUES_ENV: &str = "MODBUS_SIGNED_VALUES";

/// Packing rules shared by all encode/decode calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    /// Pack register values as `i16` instead of `u16`.
    pub signed_values: bool,
}

impl Config {
    /// Unsigned 16-bit registers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read signedness from `MODBUS_SIGNED_VALUES`. Unset or unrecognized
    /// values leave registers unsigned.
    pub fn from_env() -> Self {
        let signed_values = env::var(SIGNED_VALUES_ENV)
            .map(|raw| parse_flag(&raw))
            .unwrap_or(false);
        Self { signed_values }
    }

    /// Set signedness of register values.
    pub fn with_signed_values(mut self, signed: bool) -> Self {
        self.signed_values = signed;
        self
    }

    /// Word packing strategy selected by this config.
    #[inline]
    pub fn word_format(&self) -> WordFormat {
        if self.signed_values {
            WordFormat::Signed16
        } else {
            WordFormat::Unsigned16
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// How one register value maps to two big-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordFormat {
    /// 0..=65535
    Unsigned16,
    /// -32768..=32767
    Signed16,
}

impl WordFormat {
    /// Inclusive range of values representable in this format.
    pub fn range(self) -> (i32, i32) {
        match self {
            Self::Unsigned16 => (u16::MIN as i32, u16::MAX as i32),
            Self::Signed16 => (i16::MIN as i32, i16::MAX as i32),
        }
    }

    /// Fail with `IllegalDataValue` if `value` does not fit.
    pub fn validate(self, value: i32) -> ModbusResult<()> {
        let (min, max) = self.range();
        if value < min || value > max {
            return Err(ModbusError::illegal_data_value(format!(
                "register value {} out of range {}..={}",
                value, min, max
            )));
        }
        Ok(())
    }

    /// Pack `value` into a big-endian word.
    #[inline]
    pub fn pack(self, value: i32) -> ModbusResult<[u8; 2]> {
        self.validate(value)?;
        Ok(match self {
            Self::Unsigned16 => (value as u16).to_be_bytes(),
            Self::Signed16 => (value as i16).to_be_bytes(),
        })
    }

    /// Unpack a big-endian word.
    #[inline]
    pub fn unpack(self, word: [u8; 2]) -> i32 {
        match self {
            Self::Unsigned16 => u16::from_be_bytes(word) as i32,
            Self::Signed16 => i16::from_be_bytes(word) as i32,
        }
    }
}
