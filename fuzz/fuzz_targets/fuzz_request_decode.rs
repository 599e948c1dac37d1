#![no_main]

use libfuzzer_sys::fuzz_target;
use voltage_modbus_engine::{Config, HandlerRequest, RouteMap, Rule, Server};

fuzz_target!(|data: &[u8]| {
    let mut routes = RouteMap::new();
    routes.add_rule(Rule::new(|req: &HandlerRequest| Ok(i32::from(req.address & 1))));
    let server = Server::new(routes, Config::default());

    let response = server.respond(1, data);
    assert!(!response.is_empty());
    let _ = server.handle_tcp_adu(data);
});
