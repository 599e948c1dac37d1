//! Modbus protocol constants based on official specification
//!
//! These constants are derived from the MODBUS Application Protocol
//! Specification V1.1b3 and the MODBUS over Serial Line guide V1.02:
//! - Maximum PDU size: 253 bytes (inherited from RS485 ADU limit of 256 bytes)
//! - Register/coil limits are calculated to fit within the PDU size constraint

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Modbus MBAP header length for TCP
/// Format: Transaction ID(2) + Protocol ID(2) + Length(2) + Unit ID(1) = 7 bytes
pub const MBAP_HEADER_LEN: usize = 7;

/// Protocol identifier carried in every MBAP header (0 = Modbus)
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
/// RS485 ADU (256 bytes) - Slave Address (1 byte) - CRC (2 bytes) = 253 bytes
pub const MAX_PDU_SIZE: usize = 253;

/// Maximum MBAP length field value (Unit ID + PDU)
/// = 1 (Unit ID) + 253 (Max PDU) = 254 bytes
pub const MAX_MBAP_LENGTH: usize = 1 + MAX_PDU_SIZE;

/// Maximum RTU ADU size: Address(1) + PDU(253) + CRC(2)
pub const MAX_RTU_ADU_SIZE: usize = 256;

/// Length of the CRC trailer of an RTU ADU
pub const CRC_LEN: usize = 2;

/// Size of an exception response PDU: function code + exception code
pub const EXCEPTION_PDU_LEN: usize = 2;

/// Shortest valid RTU ADU: Address(1) + exception PDU(2) + CRC(2)
pub const MIN_RTU_ADU_LEN: usize = 1 + EXCEPTION_PDU_LEN + CRC_LEN;

/// Shortest valid TCP response ADU: MBAP(7) + exception PDU(2)
pub const MIN_TCP_RESPONSE_ADU_LEN: usize = MBAP_HEADER_LEN + EXCEPTION_PDU_LEN;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Response PDU: 1 (FC) + 1 (byte count) + N × 2 ≤ 253 → N ≤ 125
pub const MAX_READ_REGISTERS: u16 = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
///
/// Request PDU: 1 + 2 + 2 + 1 + N × 2 ≤ 253 → N ≤ 123 (0x7B)
pub const MAX_WRITE_REGISTERS: u16 = 0x7B;

// ============================================================================
// Coil Operation Limits
// ============================================================================

/// Maximum number of coils for FC01/FC02 (Read Coils/Discrete Inputs)
pub const MAX_READ_COILS: u16 = 2000;

/// Maximum number of coils for FC15 (Write Multiple Coils), 0x7B0
pub const MAX_WRITE_COILS: u16 = 0x7B0;

/// Value of a single coil written ON (FC05)
pub const COIL_ON: u16 = 0xFF00;

/// Value of a single coil written OFF (FC05)
pub const COIL_OFF: u16 = 0x0000;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Coils (FC01)
pub const FC_READ_COILS: u8 = 0x01;

/// Read Discrete Inputs (FC02)
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Coil (FC05)
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Coils (FC15)
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 1;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 2;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 3;

/// Server Device Failure
pub const EXCEPTION_SERVER_DEVICE_FAILURE: u8 = 4;

/// Acknowledge
pub const EXCEPTION_ACKNOWLEDGE: u8 = 5;

/// Server Device Busy
pub const EXCEPTION_SERVER_DEVICE_BUSY: u8 = 6;

/// Memory Parity Error
pub const EXCEPTION_MEMORY_PARITY_ERROR: u8 = 8;

/// Gateway Path Unavailable
pub const EXCEPTION_GATEWAY_PATH_UNAVAILABLE: u8 = 11;

/// Gateway Target Device Failed to Respond
pub const EXCEPTION_GATEWAY_TARGET_FAILED: u8 = 12;
