#![no_main]

use libfuzzer_sys::fuzz_target;
use voltage_modbus_engine::{rtu, Config, HandlerRequest, RouteMap, Rule, Server};

fuzz_target!(|data: &[u8]| {
    if let Ok((_, pdu)) = rtu::parse_request_adu(data) {
        assert_eq!(pdu.len() + 3, data.len());
    }
    let _ = rtu::raise_for_exception_adu(data, data.first().copied().unwrap_or(0));

    let mut routes = RouteMap::new();
    routes.add_rule(Rule::new(|_: &HandlerRequest| Ok(0)));
    let server = Server::new(routes, Config::default());
    let _ = server.handle_rtu_adu(data);
});
