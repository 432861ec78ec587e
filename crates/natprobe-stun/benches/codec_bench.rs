use criterion::{Criterion, black_box, criterion_group, criterion_main};
use natprobe_stun::{
    AttributeType, MappedAddress, TransactionId, decode_binding_response, encode_binding_request,
    encode_binding_response,
};
use std::net::{Ipv4Addr, SocketAddrV4};

fn bench_encode_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_binding_request");

    group.bench_function("response_address", |b| {
        b.iter(|| encode_binding_request(black_box(AttributeType::ResponseAddress), false, false))
    });
    group.bench_function("change_request", |b| {
        b.iter(|| encode_binding_request(black_box(AttributeType::ChangeRequest), true, true))
    });

    group.finish();
}

fn bench_decode_response(c: &mut Criterion) {
    let addr = SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 51820);
    let plain = encode_binding_response(
        TransactionId::random_legacy(),
        Some(MappedAddress::plain(addr)),
    );
    let xor = encode_binding_response(TransactionId::random_cookie(), Some(MappedAddress::xor(addr)));

    let mut group = c.benchmark_group("decode_binding_response");

    group.bench_function("mapped_address", |b| {
        b.iter(|| decode_binding_response(black_box(&plain)))
    });
    group.bench_function("xor_mapped_address", |b| {
        b.iter(|| decode_binding_response(black_box(&xor)))
    });
    group.bench_function("too_short", |b| {
        b.iter(|| decode_binding_response(black_box(&xor[..12])))
    });

    group.finish();
}

criterion_group!(benches, bench_encode_request, bench_decode_response);
criterion_main!(benches);
