//! Async Modbus client over any tokio byte stream
//!
//! Modbus TCP and RTU share the same application layer (PDU) and differ only
//! in how it is framed:
//! - **TCP**: MBAP Header + PDU
//! - **RTU**: Unit ID + PDU + CRC
//!
//! [`ModbusClient`] implements the request/response exchange once and takes
//! the framing as a type parameter ([`TcpFraming`] or [`RtuFraming`]).
//!
//! A response is read in two steps: first as many bytes as an exception
//! response has (9 for TCP, 5 for RTU), which is raised as a typed error when
//! the exception bit is set, then the remainder of the expected success
//! response.
//!
//! # API Naming Convention
//!
//! | Function Code | Primary Name | Semantic Alias |
//! |---------------|--------------|----------------|
//! | 0x01 | `read_01()` | `read_coils()` |
//! | 0x02 | `read_02()` | `read_discrete_inputs()` |
//! | 0x03 | `read_03()` | `read_holding_registers()` |
//! | 0x04 | `read_04()` | `read_input_registers()` |
//! | 0x05 | `write_05()` | `write_single_coil()` |
//! | 0x06 | `write_06()` | `write_single_register()` |
//! | 0x0F | `write_0f()` | `write_multiple_coils()` |
//! | 0x10 | `write_10()` | `write_multiple_registers()` |
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voltage_modbus_engine::{Config, ModbusResult, TcpClient};
//!
//! #[tokio::main]
//! async fn main() -> ModbusResult<()> {
//!     let mut client = TcpClient::connect("127.0.0.1:502", Config::default()).await?;
//!
//!     let registers = client.read_03(1, 0, 10).await?;
//!     println!("Registers: {:?}", registers);
//!
//!     client.write_06(1, 100, 0x1234).await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::config::Config;
use crate::constants::{COIL_OFF, COIL_ON, MIN_RTU_ADU_LEN, MIN_TCP_RESPONSE_ADU_LEN};
use crate::error::{ModbusError, ModbusResult};
use crate::function::{Function, ResponseData};
use crate::pdu::hex;
use crate::tcp::{MbapHeader, TransactionIds};
use crate::{rtu, tcp};

/// Response timeout used unless [`ModbusClient::with_timeout`] says otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Framing
// ============================================================================

/// Transport specific ADU handling.
pub trait Framing {
    /// Size of an exception response ADU.
    const EXCEPTION_ADU_LEN: usize;

    /// Wrap a request PDU.
    fn encode_request(&mut self, unit_id: u8, pdu: &[u8]) -> Vec<u8>;

    /// Size of the success response ADU for `request`.
    fn expected_response_len(&self, request: &Function) -> usize;

    /// Fail with the typed error if `head` is an exception response to the
    /// last request sent to `unit_id`.
    fn raise_for_exception(&self, head: &[u8], unit_id: u8) -> ModbusResult<()>;

    /// Validate and decode a complete success response ADU.
    fn decode_response(
        &self,
        adu: &[u8],
        unit_id: u8,
        request: &Function,
        config: &Config,
    ) -> ModbusResult<ResponseData>;
}

/// MBAP framing with a rolling transaction id.
#[derive(Debug, Default)]
pub struct TcpFraming {
    transaction_ids: TransactionIds,
    last_transaction_id: u16,
}

impl TcpFraming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transaction id of the last request sent.
    pub fn last_transaction_id(&self) -> u16 {
        self.last_transaction_id
    }
}

impl Framing for TcpFraming {
    const EXCEPTION_ADU_LEN: usize = MIN_TCP_RESPONSE_ADU_LEN;

    fn encode_request(&mut self, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
        self.last_transaction_id = self.transaction_ids.next();
        tcp::create_request_adu(self.last_transaction_id, unit_id, pdu)
    }

    fn expected_response_len(&self, request: &Function) -> usize {
        tcp::expected_response_adu_len(request)
    }

    fn raise_for_exception(&self, head: &[u8], unit_id: u8) -> ModbusResult<()> {
        tcp::raise_for_exception_adu(head, self.last_transaction_id, unit_id)
    }

    fn decode_response(
        &self,
        adu: &[u8],
        unit_id: u8,
        request: &Function,
        config: &Config,
    ) -> ModbusResult<ResponseData> {
        let header = MbapHeader::unpack(adu)?;
        if header.unit_id != unit_id {
            return Err(ModbusError::frame(format!(
                "response from unit {}, expected {}",
                header.unit_id, unit_id
            )));
        }
        tcp::parse_response_adu(adu, self.last_transaction_id, request, config)
    }
}

/// RTU framing: unit id, PDU and CRC.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtuFraming;

impl Framing for RtuFraming {
    const EXCEPTION_ADU_LEN: usize = MIN_RTU_ADU_LEN;

    fn encode_request(&mut self, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
        rtu::create_request_adu(unit_id, pdu)
    }

    fn expected_response_len(&self, request: &Function) -> usize {
        rtu::expected_response_adu_len(request)
    }

    fn raise_for_exception(&self, head: &[u8], unit_id: u8) -> ModbusResult<()> {
        rtu::raise_for_exception_adu(head, unit_id)
    }

    fn decode_response(
        &self,
        adu: &[u8],
        unit_id: u8,
        request: &Function,
        config: &Config,
    ) -> ModbusResult<ResponseData> {
        rtu::parse_response_adu(adu, unit_id, request, config)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Request/response client over a byte stream.
pub struct ModbusClient<S, F> {
    stream: S,
    framing: F,
    config: Config,
    timeout: Duration,
}

/// Modbus TCP client.
pub type TcpClient<S> = ModbusClient<S, TcpFraming>;

/// Modbus RTU client. `S` is typically a serial port stream.
pub type RtuClient<S> = ModbusClient<S, RtuFraming>;

impl<S> ModbusClient<S, TcpFraming> {
    pub fn tcp(stream: S, config: Config) -> Self {
        Self::new(stream, TcpFraming::new(), config)
    }
}

impl ModbusClient<TcpStream, TcpFraming> {
    /// Open a TCP connection to `addr`.
    pub async fn connect<A: ToSocketAddrs>(addr: A, config: Config) -> ModbusResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::tcp(stream, config))
    }
}

impl<S> ModbusClient<S, RtuFraming> {
    pub fn rtu(stream: S, config: Config) -> Self {
        Self::new(stream, RtuFraming, config)
    }
}

impl<S, F> ModbusClient<S, F> {
    pub fn new(stream: S, framing: F, config: Config) -> Self {
        Self {
            stream,
            framing,
            config,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn framing(&self) -> &F {
        &self.framing
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S, F> ModbusClient<S, F>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Framing,
{
    /// Send `request` to `unit_id` and wait for its response.
    ///
    /// Exception responses come back as the matching [`ModbusError`]
    /// variant.
    pub async fn call(&mut self, unit_id: u8, request: &Function) -> ModbusResult<ResponseData> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.exchange(unit_id, request)).await {
            Ok(result) => result,
            Err(_) => Err(ModbusError::timeout(
                request.function_code().name(),
                timeout.as_millis() as u64,
            )),
        }
    }

    async fn exchange(&mut self, unit_id: u8, request: &Function) -> ModbusResult<ResponseData> {
        let pdu = request.encode_request(&self.config)?;
        let adu = self.framing.encode_request(unit_id, pdu.as_slice());
        debug!("--> {}", hex(&adu));
        self.stream.write_all(&adu).await?;
        self.stream.flush().await?;

        let mut response = BytesMut::zeroed(F::EXCEPTION_ADU_LEN);
        self.stream.read_exact(&mut response[..]).await?;
        if let Err(e) = self.framing.raise_for_exception(&response, unit_id) {
            debug!("<-- {} ({})", hex(&response), e);
            return Err(e);
        }

        let expected = self.framing.expected_response_len(request);
        response.resize(expected, 0);
        self.stream
            .read_exact(&mut response[F::EXCEPTION_ADU_LEN..])
            .await?;
        debug!("<-- {}", hex(&response));

        self.framing
            .decode_response(&response, unit_id, request, &self.config)
    }

    async fn read_values(&mut self, unit_id: u8, request: Function) -> ModbusResult<Vec<i32>> {
        self.call(unit_id, &request)
            .await?
            .into_values()
            .ok_or_else(|| ModbusError::frame("read response carried no values"))
    }

    async fn read_bits(&mut self, unit_id: u8, request: Function) -> ModbusResult<Vec<bool>> {
        let values = self.read_values(unit_id, request).await?;
        Ok(values.into_iter().map(|bit| bit != 0).collect())
    }

    /// Read coils (function code 0x01).
    pub async fn read_01(&mut self, unit_id: u8, address: u16, quantity: u16) -> ModbusResult<Vec<bool>> {
        self.read_bits(unit_id, Function::read_coils(address, quantity)?)
            .await
    }

    /// Read discrete inputs (function code 0x02).
    pub async fn read_02(&mut self, unit_id: u8, address: u16, quantity: u16) -> ModbusResult<Vec<bool>> {
        self.read_bits(unit_id, Function::read_discrete_inputs(address, quantity)?)
            .await
    }

    /// Read holding registers (function code 0x03).
    ///
    /// Values are signed when [`Config::signed_values`] is set.
    pub async fn read_03(&mut self, unit_id: u8, address: u16, quantity: u16) -> ModbusResult<Vec<i32>> {
        self.read_values(unit_id, Function::read_holding_registers(address, quantity)?)
            .await
    }

    /// Read input registers (function code 0x04).
    pub async fn read_04(&mut self, unit_id: u8, address: u16, quantity: u16) -> ModbusResult<Vec<i32>> {
        self.read_values(unit_id, Function::read_input_registers(address, quantity)?)
            .await
    }

    /// Write single coil (function code 0x05).
    pub async fn write_05(&mut self, unit_id: u8, address: u16, value: bool) -> ModbusResult<()> {
        let raw = if value { COIL_ON } else { COIL_OFF };
        self.call(unit_id, &Function::write_single_coil(address, raw)?)
            .await?;
        Ok(())
    }

    /// Write single register (function code 0x06).
    pub async fn write_06(&mut self, unit_id: u8, address: u16, value: i32) -> ModbusResult<()> {
        let request = Function::write_single_register(address, value, &self.config)?;
        self.call(unit_id, &request).await?;
        Ok(())
    }

    /// Write multiple coils (function code 0x0F).
    pub async fn write_0f(&mut self, unit_id: u8, address: u16, values: &[bool]) -> ModbusResult<()> {
        let bits = values.iter().map(|&v| i32::from(v)).collect();
        self.call(unit_id, &Function::write_multiple_coils(address, bits)?)
            .await?;
        Ok(())
    }

    /// Write multiple registers (function code 0x10).
    pub async fn write_10(&mut self, unit_id: u8, address: u16, values: &[i32]) -> ModbusResult<()> {
        let request = Function::write_multiple_registers(address, values.to_vec(), &self.config)?;
        self.call(unit_id, &request).await?;
        Ok(())
    }

    // ===== Semantic aliases =====

    #[inline]
    pub async fn read_coils(&mut self, unit_id: u8, address: u16, quantity: u16) -> ModbusResult<Vec<bool>> {
        self.read_01(unit_id, address, quantity).await
    }

    #[inline]
    pub async fn read_discrete_inputs(&mut self, unit_id: u8, address: u16, quantity: u16) -> ModbusResult<Vec<bool>> {
        self.read_02(unit_id, address, quantity).await
    }

    #[inline]
    pub async fn read_holding_registers(&mut self, unit_id: u8, address: u16, quantity: u16) -> ModbusResult<Vec<i32>> {
        self.read_03(unit_id, address, quantity).await
    }

    #[inline]
    pub async fn read_input_registers(&mut self, unit_id: u8, address: u16, quantity: u16) -> ModbusResult<Vec<i32>> {
        self.read_04(unit_id, address, quantity).await
    }

    #[inline]
    pub async fn write_single_coil(&mut self, unit_id: u8, address: u16, value: bool) -> ModbusResult<()> {
        self.write_05(unit_id, address, value).await
    }

    #[inline]
    pub async fn write_single_register(&mut self, unit_id: u8, address: u16, value: i32) -> ModbusResult<()> {
        self.write_06(unit_id, address, value).await
    }

    #[inline]
    pub async fn write_multiple_coils(&mut self, unit_id: u8, address: u16, values: &[bool]) -> ModbusResult<()> {
        self.write_0f(unit_id, address, values).await
    }

    #[inline]
    pub async fn write_multiple_registers(&mut self, unit_id: u8, address: u16, values: &[i32]) -> ModbusResult<()> {
        self.write_10(unit_id, address, values).await
    }
}
