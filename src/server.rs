//! # Request Pipeline
//!
//! Turns a decoded request into a response PDU by consulting the
//! [`RouteMap`] and invoking handlers:
//!
//! | Function | Handler calls |
//! |----------|---------------|
//! | Read (0x01-0x04) | one per address, ascending, no value |
//! | Write single (0x05, 0x06) | one, with the written value |
//! | Write multiple (0x0F, 0x10) | one per `(start + i, values[i])`, in order |
//!
//! Every error is answered with an exception PDU, the pipeline itself never
//! fails. A missing route gives Illegal Data Address. A handler that returns
//! an error or panics gives Server Device Failure, as does a read value that
//! cannot be encoded. Handler calls made before a failure are not rolled
//! back.
//!
//! Coil writes reach the handler as 0 or 1, whatever the wire encoding.
//!
//! [`Server`] also carries a small async shell that frames ADUs over any
//! tokio byte stream.

use std::any::Any;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::constants::{COIL_ON, MAX_RTU_ADU_SIZE, MBAP_HEADER_LEN};
use crate::error::{ExceptionCode, HandlerError, ModbusError, ModbusResult};
use crate::function::Function;
use crate::pdu::{hex, ModbusPdu};
use crate::route::{HandlerRequest, RouteMap};
use crate::{rtu, tcp};

// ============================================================================
// Handler failure reporting
// ============================================================================

/// A handler error, handler panic or unencodable read value that was
/// answered with Server Device Failure.
#[derive(Debug)]
pub struct HandlerFailure {
    pub unit_id: u8,
    pub function_code: u8,
    pub address: u16,
    pub error: HandlerError,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handler failed for unit {} FC={:02X} address {}: {}",
            self.unit_id, self.function_code, self.address, self.error
        )
    }
}

/// Receives every handler failure, in addition to the error log.
pub type FailureSink = Arc<dyn Fn(&HandlerFailure) + Send + Sync>;

fn report_failure(sink: Option<&FailureSink>, failure: &HandlerFailure) {
    error!("{}", failure);
    if let Some(sink) = sink {
        sink(failure);
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> HandlerError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("handler panicked: {}", message).into()
}

// ============================================================================
// Pipeline
// ============================================================================

/// Run handlers for `function` and collect read values.
///
/// Returns the values read (one per address) for reads and an empty vector
/// for writes.
pub fn execute(
    function: &Function,
    unit_id: u8,
    routes: &RouteMap,
    failure_sink: Option<&FailureSink>,
) -> ModbusResult<Vec<i32>> {
    let dispatcher = Dispatcher {
        unit_id,
        function_code: function.function_code().to_u8(),
        starting_address: function.starting_address(),
        routes,
        failure_sink,
    };

    match function {
        Function::ReadCoils(_)
        | Function::ReadDiscreteInputs(_)
        | Function::ReadHoldingRegisters(_)
        | Function::ReadInputRegisters(_) => function
            .addresses()
            .map(|address| dispatcher.call(address as u16, None))
            .collect(),
        Function::WriteSingleCoil(w) => {
            let bit = i32::from(w.value() == i32::from(COIL_ON));
            dispatcher.call(w.address(), Some(bit))?;
            Ok(Vec::new())
        }
        Function::WriteSingleRegister(w) => {
            dispatcher.call(w.address(), Some(w.value()))?;
            Ok(Vec::new())
        }
        Function::WriteMultipleCoils(w) | Function::WriteMultipleRegisters(w) => {
            for (address, &value) in function.addresses().zip(w.values()) {
                dispatcher.call(address as u16, Some(value))?;
            }
            Ok(Vec::new())
        }
    }
}

struct Dispatcher<'a> {
    unit_id: u8,
    function_code: u8,
    starting_address: u16,
    routes: &'a RouteMap,
    failure_sink: Option<&'a FailureSink>,
}

impl Dispatcher<'_> {
    fn call(&self, address: u16, value: Option<i32>) -> ModbusResult<i32> {
        let rule = self
            .routes
            .match_route(self.unit_id, self.function_code, address, self.starting_address)
            .ok_or_else(|| {
                debug!(
                    "No route for unit {} FC={:02X} address {}",
                    self.unit_id, self.function_code, address
                );
                ModbusError::IllegalDataAddress
            })?;

        let request = HandlerRequest {
            unit_id: self.unit_id,
            function_code: self.function_code,
            address,
            value,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| rule.handler().handle(&request)))
            .unwrap_or_else(|payload| Err(panic_error(payload)));
        outcome.map_err(|error| {
            let failure = HandlerFailure {
                unit_id: self.unit_id,
                function_code: self.function_code,
                address,
                error,
            };
            report_failure(self.failure_sink, &failure);
            ModbusError::ServerDeviceFailure
        })
    }
}

/// Exception PDU answering `function_code` with the code carried by `err`.
/// Errors without a protocol code become Server Device Failure.
pub fn exception_pdu(function_code: u8, err: &ModbusError) -> ModbusPdu {
    let code = err
        .exception_code()
        .unwrap_or(ExceptionCode::ServerDeviceFailure);
    ModbusPdu::exception(function_code, code)
}

/// Execute `function` and build the response PDU.
pub fn process(
    unit_id: u8,
    function: &Function,
    routes: &RouteMap,
    config: &Config,
    failure_sink: Option<&FailureSink>,
) -> ModbusPdu {
    let fc = function.function_code().to_u8();
    let result = execute(function, unit_id, routes, failure_sink).and_then(|values| {
        function.encode_response(&values, config).map_err(|e| {
            let failure = HandlerFailure {
                unit_id,
                function_code: fc,
                address: unencodable_address(function, &values, config),
                error: Box::new(e),
            };
            report_failure(failure_sink, &failure);
            ModbusError::ServerDeviceFailure
        })
    });

    match result {
        Ok(pdu) => pdu,
        Err(e) => {
            warn!("Unit {} FC={:02X} answered with exception: {}", unit_id, fc, e);
            exception_pdu(fc, &e)
        }
    }
}

/// Address of the first read value the response cannot carry.
fn unencodable_address(function: &Function, values: &[i32], config: &Config) -> u16 {
    let packing = function.function_code().packing();
    function
        .addresses()
        .zip(values)
        .find(|&(_, &value)| packing.validate(value, config).is_err())
        .map_or(function.starting_address(), |(address, _)| address as u16)
}

/// Decode a raw request PDU and build the response PDU.
///
/// A request that fails to decode is answered with an exception echoing its
/// first byte, or function code 0 for an empty PDU.
pub fn respond(
    unit_id: u8,
    request_pdu: &[u8],
    routes: &RouteMap,
    config: &Config,
    failure_sink: Option<&FailureSink>,
) -> ModbusPdu {
    match Function::decode_request(request_pdu, config) {
        Ok(function) => process(unit_id, &function, routes, config, failure_sink),
        Err(e) => {
            let fc = request_pdu.first().copied().unwrap_or(0);
            warn!("Rejected request PDU {} from unit {}: {}", hex(request_pdu), unit_id, e);
            exception_pdu(fc, &e)
        }
    }
}

// ============================================================================
// Server shell
// ============================================================================

/// Route table, configuration and failure sink bundled for serving.
#[derive(Clone)]
pub struct Server {
    routes: Arc<RouteMap>,
    config: Config,
    failure_sink: Option<FailureSink>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("routes", &self.routes.len())
            .field("config", &self.config)
            .field("failure_sink", &self.failure_sink.is_some())
            .finish()
    }
}

impl Server {
    pub fn new(routes: RouteMap, config: Config) -> Self {
        Self::from_shared(Arc::new(routes), config)
    }

    /// Server over a route table shared with other servers.
    pub fn from_shared(routes: Arc<RouteMap>, config: Config) -> Self {
        Self {
            routes,
            config,
            failure_sink: None,
        }
    }

    pub fn with_failure_sink(mut self, sink: FailureSink) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    pub fn routes(&self) -> &RouteMap {
        &self.routes
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn process(&self, unit_id: u8, function: &Function) -> ModbusPdu {
        process(unit_id, function, &self.routes, &self.config, self.failure_sink.as_ref())
    }

    pub fn respond(&self, unit_id: u8, request_pdu: &[u8]) -> ModbusPdu {
        respond(unit_id, request_pdu, &self.routes, &self.config, self.failure_sink.as_ref())
    }

    /// Answer a complete TCP request ADU.
    ///
    /// Fails only when the MBAP header is malformed.
    pub fn handle_tcp_adu(&self, adu: &[u8]) -> ModbusResult<Vec<u8>> {
        let (header, pdu) = tcp::parse_request_adu(adu)?;
        debug!("TCP <- {}", hex(adu));
        let response = self.respond(header.unit_id, pdu);
        let response = tcp::create_response_adu(&header, response.as_slice());
        debug!("TCP -> {}", hex(&response));
        Ok(response)
    }

    /// Answer a complete RTU request ADU.
    ///
    /// A frame that is too short or fails the CRC check is an error and must
    /// be dropped without reply.
    pub fn handle_rtu_adu(&self, adu: &[u8]) -> ModbusResult<Vec<u8>> {
        let (unit_id, pdu) = rtu::parse_request_adu(adu)?;
        debug!("RTU <- {}", hex(adu));
        let response = self.respond(unit_id, pdu);
        let response = rtu::create_response_adu(unit_id, response.as_slice());
        debug!("RTU -> {}", hex(&response));
        Ok(response)
    }

    /// Serve MBAP framed requests from `stream` until the peer closes it.
    ///
    /// A malformed header ends the session with an error.
    pub async fn serve_tcp<S>(&self, mut stream: S) -> ModbusResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + 256);
        loop {
            frame.clear();
            frame.resize(MBAP_HEADER_LEN, 0);
            match stream.read_exact(&mut frame[..]).await {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("TCP peer closed the connection");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let header = tcp::MbapHeader::unpack(&frame)?;
            header.validate_length()?;
            frame.resize(MBAP_HEADER_LEN + header.pdu_len(), 0);
            stream.read_exact(&mut frame[MBAP_HEADER_LEN..]).await?;

            let response = self.handle_tcp_adu(&frame)?;
            stream.write_all(&response).await?;
            stream.flush().await?;
        }
    }

    /// Read one RTU frame from `stream` and answer it.
    ///
    /// Returns `Ok(false)` when the frame was dropped (bad CRC, too short)
    /// and `Ok(true)` when a response was written. Each read is taken as one
    /// complete frame, so the stream must deliver frames whole.
    pub async fn serve_rtu_once<S>(&self, stream: &mut S) -> ModbusResult<bool>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut frame = BytesMut::zeroed(MAX_RTU_ADU_SIZE);
        let n = stream.read(&mut frame[..]).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "RTU stream closed").into());
        }
        frame.truncate(n);

        match self.handle_rtu_adu(&frame) {
            Ok(response) => {
                stream.write_all(&response).await?;
                stream.flush().await?;
                Ok(true)
            }
            Err(e) => {
                warn!("Dropped RTU frame {}: {}", hex(&frame), e);
                Ok(false)
            }
        }
    }

    /// Serve RTU frames until the stream is closed.
    pub async fn serve_rtu<S>(&self, mut stream: S) -> ModbusResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            match self.serve_rtu_once(&mut stream).await {
                Ok(_) => {}
                Err(ModbusError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("RTU stream closed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc16;
    use crate::route::Rule;
    use std::sync::Mutex;

    fn echo_address() -> RouteMap {
        let mut routes = RouteMap::new();
        routes.add_rule(
            Rule::new(|req: &HandlerRequest| Ok(i32::from(req.address)))
                .function_codes([3, 4]),
        );
        routes
    }

    fn failing() -> RouteMap {
        let mut routes = RouteMap::new();
        routes.add_rule(Rule::new(|_: &HandlerRequest| Err("sensor offline".into())));
        routes
    }

    #[test]
    fn test_read_calls_handler_per_address() {
        let routes = echo_address();
        let function = Function::read_holding_registers(10, 3).unwrap();
        let values = execute(&function, 1, &routes, None).unwrap();
        assert_eq!(values, vec![10, 11, 12]);
    }

    #[test]
    fn test_read_response_pdu() {
        let config = Config::default();
        let function = Function::read_holding_registers(1, 2).unwrap();
        let pdu = process(1, &function, &echo_address(), &config, None);
        assert_eq!(pdu.as_slice(), &[0x03, 0x04, 0x00, 0x01, 0x00, 0x02]);
    }

    #[test]
    fn test_no_route_is_illegal_data_address() {
        let config = Config::default();
        let function = Function::read_coils(0, 1).unwrap();
        let pdu = process(1, &function, &echo_address(), &config, None);
        assert_eq!(pdu.as_slice(), &[0x81, 0x02]);
    }

    #[test]
    fn test_partial_route_is_illegal_data_address() {
        let mut routes = RouteMap::new();
        routes.add_rule(Rule::new(|_: &HandlerRequest| Ok(0)).addresses(0..5));
        let function = Function::read_input_registers(3, 3).unwrap();
        assert!(matches!(
            execute(&function, 1, &routes, None),
            Err(ModbusError::IllegalDataAddress)
        ));
    }

    #[test]
    fn test_handler_error_is_server_device_failure() {
        let config = Config::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: FailureSink = Arc::new(move |failure: &HandlerFailure| {
            sink_seen
                .lock()
                .unwrap()
                .push((failure.address, failure.error.to_string()));
        });

        let function = Function::read_holding_registers(7, 1).unwrap();
        let pdu = process(1, &function, &failing(), &config, Some(&sink));
        assert_eq!(pdu.as_slice(), &[0x83, 0x04]);
        assert_eq!(*seen.lock().unwrap(), vec![(7, "sensor offline".to_string())]);
    }

    #[test]
    fn test_write_multiple_calls_in_order() {
        let config = Config::default();
        let writes = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&writes);
        let mut routes = RouteMap::new();
        routes.add_rule(Rule::new(move |req: &HandlerRequest| {
            recorded.lock().unwrap().push((req.address, req.value));
            Ok(0)
        }));

        let function = Function::write_multiple_registers(100, vec![7, 8, 9], &config).unwrap();
        let pdu = process(1, &function, &routes, &config, None);
        assert_eq!(pdu.as_slice(), &[0x10, 0x00, 0x64, 0x00, 0x03]);
        assert_eq!(
            *writes.lock().unwrap(),
            vec![(100, Some(7)), (101, Some(8)), (102, Some(9))]
        );
    }

    #[test]
    fn test_write_multiple_stops_at_failure() {
        let config = Config::default();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let mut routes = RouteMap::new();
        routes.add_rule(Rule::new(move |req: &HandlerRequest| {
            recorded.lock().unwrap().push(req.address);
            if req.address == 1 {
                Err("read-only".into())
            } else {
                Ok(0)
            }
        }));

        let function = Function::write_multiple_coils(0, vec![1, 0, 1]).unwrap();
        let pdu = process(1, &function, &routes, &config, None);
        assert_eq!(pdu.as_slice(), &[0x8F, 0x04]);
        assert_eq!(*calls.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_write_single_coil_handler_sees_bit() {
        let config = Config::default();
        let seen = Arc::new(Mutex::new(None));
        let recorded = Arc::clone(&seen);
        let mut routes = RouteMap::new();
        routes.add_rule(Rule::new(move |req: &HandlerRequest| {
            *recorded.lock().unwrap() = req.value;
            Ok(0)
        }));

        let request = [0x05, 0x00, 0x0A, 0xFF, 0x00];
        let pdu = respond(1, &request, &routes, &config, None);
        assert_eq!(pdu.as_slice(), &request);
        assert_eq!(*seen.lock().unwrap(), Some(1));
    }

    #[test]
    fn test_coil_handler_out_of_range_is_server_device_failure() {
        let config = Config::default();
        let mut routes = RouteMap::new();
        routes.add_rule(Rule::new(|_: &HandlerRequest| Ok(5)));
        let function = Function::read_coils(0, 1).unwrap();
        let pdu = process(1, &function, &routes, &config, None);
        assert_eq!(pdu.as_slice(), &[0x81, 0x04]);
    }

    #[test]
    fn test_handler_panic_is_server_device_failure() {
        let config = Config::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: FailureSink = Arc::new(move |failure: &HandlerFailure| {
            sink_seen
                .lock()
                .unwrap()
                .push((failure.address, failure.error.to_string()));
        });
        let mut routes = RouteMap::new();
        routes.add_rule(Rule::new(|req: &HandlerRequest| {
            let table: Vec<i32> = Vec::new();
            Ok(table[req.address as usize])
        }));

        let function = Function::read_holding_registers(2, 1).unwrap();
        let pdu = process(1, &function, &routes, &config, Some(&sink));
        assert_eq!(pdu.as_slice(), &[0x83, 0x04]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 2);
        assert!(seen[0].1.starts_with("handler panicked: "));
    }

    #[test]
    fn test_handler_panic_with_string_payload() {
        let mut routes = RouteMap::new();
        routes.add_rule(Rule::new(|req: &HandlerRequest| -> Result<i32, HandlerError> {
            panic!("register {} unmapped", req.address)
        }));

        let seen = Arc::new(Mutex::new(None));
        let sink_seen = Arc::clone(&seen);
        let sink: FailureSink = Arc::new(move |failure: &HandlerFailure| {
            *sink_seen.lock().unwrap() = Some(failure.error.to_string());
        });

        let pdu = respond(1, &[0x06, 0x00, 0x09, 0x00, 0x01], &routes, &Config::default(), Some(&sink));
        assert_eq!(pdu.as_slice(), &[0x86, 0x04]);
        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some("handler panicked: register 9 unmapped")
        );
    }

    #[test]
    fn test_read_coils_alternating_pattern() {
        let mut routes = RouteMap::new();
        routes.add_rule(
            Rule::new(|req: &HandlerRequest| Ok(i32::from(req.address % 2))).function_codes([1]),
        );
        let pdu = respond(1, &[0x01, 0x00, 0x00, 0x00, 0x0A], &routes, &Config::default(), None);
        assert_eq!(pdu.as_slice(), &[0x01, 0x02, 0xAA, 0x02]);
    }

    #[test]
    fn test_unencodable_value_reaches_failure_sink() {
        let config = Config::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink: FailureSink = Arc::new(move |failure: &HandlerFailure| {
            sink_seen
                .lock()
                .unwrap()
                .push((failure.function_code, failure.address));
        });
        let mut routes = RouteMap::new();
        routes.add_rule(Rule::new(|req: &HandlerRequest| {
            Ok(if req.address == 3 { 5 } else { 1 })
        }));

        let function = Function::read_coils(1, 4).unwrap();
        let pdu = process(1, &function, &routes, &config, Some(&sink));
        assert_eq!(pdu.as_slice(), &[0x81, 0x04]);
        assert_eq!(*seen.lock().unwrap(), vec![(0x01, 3)]);
    }

    #[test]
    fn test_respond_rejects_bad_requests() {
        let config = Config::default();
        let routes = echo_address();

        assert_eq!(respond(1, &[0x07], &routes, &config, None).as_slice(), &[0x87, 0x01]);
        assert_eq!(respond(1, &[], &routes, &config, None).as_slice(), &[0x80, 0x01]);
        // quantity 0
        assert_eq!(
            respond(1, &[0x03, 0x00, 0x00, 0x00, 0x00], &routes, &config, None).as_slice(),
            &[0x83, 0x03]
        );
        // truncated
        assert_eq!(
            respond(1, &[0x03, 0x00, 0x00], &routes, &config, None).as_slice(),
            &[0x83, 0x03]
        );
    }

    #[test]
    fn test_handle_tcp_adu() {
        let server = Server::new(echo_address(), Config::default());
        let request = tcp::create_request_adu(0x0102, 9, &[0x04, 0x00, 0x05, 0x00, 0x01]);
        let response = server.handle_tcp_adu(&request).unwrap();
        assert_eq!(
            response,
            vec![0x01, 0x02, 0x00, 0x00, 0x00, 0x05, 0x09, 0x04, 0x02, 0x00, 0x05]
        );
    }

    #[test]
    fn test_handle_rtu_adu() {
        let server = Server::new(echo_address(), Config::default());
        let request = rtu::create_request_adu(1, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        let response = server.handle_rtu_adu(&request).unwrap();

        let mut expected = vec![0x01, 0x03, 0x02, 0x00, 0x00];
        let crc = crc16(&expected);
        expected.extend_from_slice(&crc);
        assert_eq!(response, expected);
    }

    #[test]
    fn test_handle_rtu_adu_bad_crc_is_dropped() {
        let server = Server::new(echo_address(), Config::default());
        let mut request = rtu::create_request_adu(1, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        let last = request.len() - 1;
        request[last] ^= 0xFF;
        assert!(matches!(
            server.handle_rtu_adu(&request),
            Err(ModbusError::Crc { .. })
        ));
    }

    #[tokio::test]
    async fn test_serve_tcp_session() {
        let server = Server::new(echo_address(), Config::default());
        let request = tcp::create_request_adu(1, 1, &[0x03, 0x00, 0x02, 0x00, 0x01]);
        let response = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x02];

        let stream = tokio_test::io::Builder::new()
            .read(&request[..MBAP_HEADER_LEN])
            .read(&request[MBAP_HEADER_LEN..])
            .write(&response)
            .build();
        server.serve_tcp(stream).await.unwrap();
    }

    #[tokio::test]
    async fn test_serve_tcp_rejects_bad_length() {
        let server = Server::new(echo_address(), Config::default());
        let stream = tokio_test::io::Builder::new()
            .read(&[0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01])
            .build();
        assert!(matches!(
            server.serve_tcp(stream).await,
            Err(ModbusError::Frame { .. })
        ));
    }

    #[tokio::test]
    async fn test_serve_rtu_drops_corrupt_frame() {
        let server = Server::new(echo_address(), Config::default());
        let good = rtu::create_request_adu(1, &[0x04, 0x00, 0x03, 0x00, 0x01]);
        let mut bad = good.clone();
        bad[2] ^= 0x01;
        let response = server.handle_rtu_adu(&good).unwrap();

        let mut stream = tokio_test::io::Builder::new()
            .read(&bad)
            .read(&good)
            .write(&response)
            .build();
        assert!(!server.serve_rtu_once(&mut stream).await.unwrap());
        assert!(server.serve_rtu_once(&mut stream).await.unwrap());
    }
}
