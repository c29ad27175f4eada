use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use m2m_buffers::BufferChain;
use m2m_pipeline::{Base64Decoder, Base64Encoder, BufferAccepter, CaptureSink};

fn bench_codecs(c: &mut Criterion) {
    let payload: Vec<u8> = (0u8..=255).cycle().take(16 * 1024).collect();

    let mut group = c.benchmark_group("base64");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("encode_16k", |b| {
        b.iter(|| {
            let mut enc = Base64Encoder::new(CaptureSink::unbounded());
            let mut chain = BufferChain::new();
            chain.append(black_box(&payload));
            enc.push_buffer(&mut chain);
            enc.finish().unwrap();
            enc.downstream().len()
        })
    });

    group.bench_function("round_trip_16k", |b| {
        b.iter(|| {
            let dec = Base64Decoder::new(CaptureSink::unbounded());
            let mut enc = Base64Encoder::new(dec);
            let mut chain = BufferChain::new();
            chain.append(black_box(&payload));
            enc.push_buffer(&mut chain);
            enc.finish().unwrap();
            enc.downstream_mut().finish().unwrap();
            enc.into_inner().into_inner().len()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_codecs);
criterion_main!(benches);
