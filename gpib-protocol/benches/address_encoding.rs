use criterion::{Criterion, criterion_group, criterion_main};
use gpib_protocol::{BusAddress, Eos, StatusWord, resolve};
use std::hint::black_box;

fn bench_resolve(c: &mut Criterion) {
    let addresses: Vec<BusAddress> = (0..=30)
        .map(|pad| BusAddress::new(pad).unwrap())
        .collect();

    c.bench_function("resolve 31 addresses", |b| {
        b.iter(|| resolve(black_box(&addresses)))
    });

    let list = resolve(&addresses);
    c.bench_function("listen sequence", |b| {
        b.iter(|| black_box(&list).listen_sequence())
    });
}

fn bench_packing(c: &mut Criterion) {
    c.bench_function("pack/unpack roundtrip", |b| {
        b.iter(|| {
            for pad in 0..=30u8 {
                let address = BusAddress::with_secondary(pad, 0x60 | (pad % 0x1F)).unwrap();
                black_box(BusAddress::unpack(black_box(address.pack())).unwrap());
            }
        })
    });

    c.bench_function("eos match", |b| {
        let eos = Eos::new(b'\n').terminate_read(true);
        b.iter(|| {
            for byte in 0..=255u8 {
                black_box(eos.matches(black_box(byte)));
            }
        })
    });

    c.bench_function("status word display", |b| {
        let status = StatusWord::empty()
            .with(StatusWord::CMPL)
            .with(StatusWord::END)
            .with(StatusWord::CIC);
        b.iter(|| black_box(status).to_string())
    });
}

criterion_group!(benches, bench_resolve, bench_packing);
criterion_main!(benches);
