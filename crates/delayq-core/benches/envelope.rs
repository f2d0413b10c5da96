use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use delayq_core::envelope;

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");
    let payload = vec![0xabu8; 256];

    // Includes UUIDv7 generation
    group.bench_function("seal_256b", |b| {
        b.iter(|| black_box(envelope::seal(black_box(&payload))));
    });

    group.bench_function("open_256b", |b| {
        let member = envelope::seal(&payload);
        b.iter_batched(
            || member.clone(),
            |member| black_box(envelope::open(member)),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("classify_raw", |b| {
        let member = vec![b'z'; 64];
        b.iter(|| black_box(envelope::classify(black_box(&member))));
    });

    group.finish();
}

criterion_group!(benches, bench_envelope);
criterion_main!(benches);
