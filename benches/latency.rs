//! Latency benchmarks for order-path operations.
//!
//! Run with: `cargo bench --bench latency`

use alloy_primitives::{Address, U256};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_decimal::Decimal;

use zeroex_core::amount::{from_base_units, to_base_units};
use zeroex_core::contracts::ContractCall;
use zeroex_core::hashing::order_hash;
use zeroex_core::order::{OrderBuilder, OrderRecord, SignedOrder};
use zeroex_core::signing::{verify_signature, LocalKeyring, SigningBackend};

const MAKER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn sample_order(maker: Address) -> OrderRecord {
    OrderBuilder::new(Address::repeat_byte(0x11))
        .maker(maker)
        .maker_asset(Address::repeat_byte(0x44), U256::from(200_000_000_000_000_000u64))
        .taker_asset(Address::repeat_byte(0x33), U256::from(300_000_000_000_000_000u64))
        .salt(U256::from(0x5eed_u64))
        .expires_at(4_102_444_800)
        .build()
        .unwrap()
}

fn sample_signed_order() -> SignedOrder {
    let mut keyring = LocalKeyring::default();
    let maker = keyring.add_private_key(MAKER_KEY).unwrap();
    let order = sample_order(maker);
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let signature = runtime
        .block_on(keyring.sign_payload(maker, order.hash()))
        .unwrap();
    SignedOrder::new(order, signature).unwrap()
}

/// Benchmark order hashing.
fn bench_order_hash(c: &mut Criterion) {
    let order = sample_order(Address::repeat_byte(0xaa));

    c.bench_function("order_hash", |b| b.iter(|| black_box(order_hash(black_box(&order)))));
}

/// Benchmark decimal to base-unit conversion across token precisions.
fn bench_amount_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("amount_conversion");
    let amount = Decimal::new(123_456_789, 4);

    for decimals in [0u8, 6, 18, 36].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("to_base_units", decimals),
            decimals,
            |b, &decimals| b.iter(|| black_box(to_base_units(black_box(amount), decimals))),
        );
    }

    let base = U256::from(133_333_333_333_333_333u64);
    group.bench_function("from_base_units_18", |b| {
        b.iter(|| black_box(from_base_units(black_box(base), 18)))
    });

    group.finish();
}

/// Benchmark exchange call encoding and decoding.
fn bench_call_encoding(c: &mut Criterion) {
    let signed = sample_signed_order();
    let exchange = signed.order().exchange_contract_address;
    let call = ContractCall::FillOrder {
        order: signed.order().clone(),
        fill_taker_token_amount: U256::from(200_000_000_000_000_000u64),
        should_throw_on_insufficient_balance_or_allowance: true,
        signature: *signed.signature(),
    };
    let encoded = call.encode();

    let mut group = c.benchmark_group("call_encoding");
    group.bench_function("encode_fill_order", |b| b.iter(|| black_box(call.encode())));
    group.bench_function("decode_fill_order", |b| {
        b.iter(|| black_box(ContractCall::decode(exchange, black_box(&encoded))))
    });
    group.finish();
}

/// Benchmark maker signature verification.
fn bench_signature_verification(c: &mut Criterion) {
    let signed = sample_signed_order();
    let hash = signed.order_hash();

    c.bench_function("verify_signature", |b| {
        b.iter(|| {
            black_box(verify_signature(
                black_box(hash),
                signed.signature(),
                signed.maker(),
            ))
        })
    });
}

/// Benchmark signed-order JSON wire round trip.
fn bench_wire_format(c: &mut Criterion) {
    let signed = sample_signed_order();
    let wire = signed.to_json().unwrap();

    let mut group = c.benchmark_group("wire_format");
    group.bench_function("to_json", |b| b.iter(|| black_box(signed.to_json())));
    group.bench_function("from_json", |b| {
        b.iter(|| black_box(SignedOrder::from_json(black_box(&wire))))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_order_hash,
    bench_amount_conversion,
    bench_call_encoding,
    bench_signature_verification,
    bench_wire_format,
);
criterion_main!(benches);
