//! Request pipeline and codec throughput
//!
//! Run with `cargo bench --bench throughput`.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use voltage_modbus_engine::{rtu, tcp, Config, Function, HandlerRequest, RouteMap, Rule, Server};

fn server() -> Server {
    let mut routes = RouteMap::new();
    routes.add_rule(
        Rule::new(|req: &HandlerRequest| Ok(i32::from(req.address & 1))).function_codes([1, 2]),
    );
    routes.add_rule(Rule::new(|req: &HandlerRequest| Ok(i32::from(req.address))));
    Server::new(routes, Config::default())
}

fn bench_codec(c: &mut Criterion) {
    let config = Config::default();
    let mut group = c.benchmark_group("codec");

    let request = Function::read_holding_registers(0, 125).unwrap();
    let request_pdu = request.encode_request(&config).unwrap();
    group.bench_function("decode_read_request", |b| {
        b.iter(|| Function::decode_request(black_box(request_pdu.as_slice()), &config))
    });

    let values: Vec<i32> = (0..125).collect();
    group.bench_function("encode_125_registers", |b| {
        b.iter(|| request.encode_response(black_box(&values), &config))
    });

    let coils = Function::write_multiple_coils(0, (0..1968).map(|i| i & 1).collect()).unwrap();
    let coils_pdu = coils.encode_request(&config).unwrap();
    group.throughput(Throughput::Bytes(coils_pdu.len() as u64));
    group.bench_function("decode_1968_coils", |b| {
        b.iter(|| Function::decode_request(black_box(coils_pdu.as_slice()), &config))
    });

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let server = server();
    let config = Config::default();
    let mut group = c.benchmark_group("pipeline");

    for quantity in [1u16, 10, 125] {
        let pdu = Function::read_holding_registers(0, quantity)
            .unwrap()
            .encode_request(&config)
            .unwrap();
        let tcp_adu = tcp::create_request_adu(1, 1, pdu.as_slice());
        group.bench_function(format!("tcp_read_{}_registers", quantity), |b| {
            b.iter(|| server.handle_tcp_adu(black_box(&tcp_adu)))
        });

        let rtu_adu = rtu::create_request_adu(1, pdu.as_slice());
        group.bench_function(format!("rtu_read_{}_registers", quantity), |b| {
            b.iter(|| server.handle_rtu_adu(black_box(&rtu_adu)))
        });
    }

    let coils = Function::read_coils(0, 2000).unwrap().encode_request(&config).unwrap();
    group.bench_function("read_2000_coils", |b| {
        b.iter(|| server.respond(1, black_box(coils.as_slice())))
    });

    group.finish();
}

criterion_group!(benches, bench_codec, bench_pipeline);
criterion_main!(benches);
