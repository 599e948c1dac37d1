#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use voltage_modbus_engine::{Config, Function};

#[derive(Debug, Arbitrary)]
struct Input {
    code: u8,
    start: u16,
    quantity: u16,
    signed: bool,
    response: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let config = Config::new().with_signed_values(input.signed);
    let request = match input.code % 4 {
        0 => Function::read_coils(input.start, input.quantity),
        1 => Function::read_discrete_inputs(input.start, input.quantity),
        2 => Function::read_holding_registers(input.start, input.quantity),
        _ => Function::read_input_registers(input.start, input.quantity),
    };
    if let Ok(request) = request {
        let _ = request.decode_response(&input.response, &config);
    }
});
