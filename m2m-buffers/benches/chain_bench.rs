use criterion::{black_box, criterion_group, criterion_main, Criterion};
use m2m_buffers::BufferChain;

fn bench_assembly(c: &mut Criterion) {
    c.bench_function("append_64_segments", |b| {
        b.iter(|| {
            let mut chain = BufferChain::new();
            for i in 0..64u8 {
                chain.append(black_box(&[i; 24]));
            }
            chain.len()
        })
    });

    c.bench_function("collapse_64_segments", |b| {
        let mut proto = BufferChain::new();
        for i in 0..64u8 {
            proto.append(&[i; 24]);
        }
        b.iter(|| {
            let mut chain = proto.clone();
            black_box(chain.collapse().len())
        })
    });

    c.bench_function("handoff_vs_copy", |b| {
        b.iter(|| {
            let mut src = BufferChain::new();
            for i in 0..32u8 {
                src.append(&[i; 48]);
            }
            let mut dst = BufferChain::new();
            dst.concat_handoff(&mut src);
            black_box(dst.len())
        })
    });
}

criterion_group!(benches, bench_assembly);
criterion_main!(benches);
