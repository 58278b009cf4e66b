use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rusket_mf::{FactorizationModel, Init, MemoryBackend, RatingData, TrainConfig};

/// Dense synthetic ratings with roughly 1 in 5 entries observed.
fn synthetic(n_users: usize, n_items: usize) -> RatingData {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };
    let mut y = Vec::with_capacity(n_users);
    let mut r = Vec::with_capacity(n_users);
    for _ in 0..n_users {
        let mut yr = vec![0.0f32; n_items];
        let mut rr = vec![0.0f32; n_items];
        for i in 0..n_items {
            if next() % 5 == 0 {
                yr[i] = (1 + next() % 5) as f32;
                rr[i] = 1.0;
            }
        }
        y.push(yr);
        r.push(rr);
    }
    RatingData::from_rows(y, r).expect("synthetic data is well formed")
}

fn model(n_users: usize, n_items: usize, k: usize) -> FactorizationModel {
    let config = TrainConfig::default()
        .with_features(k)
        .with_init(Init::Uniform { scale: 0.1, seed: 7 });
    FactorizationModel::new(
        synthetic(n_users, n_items),
        config,
        Box::new(MemoryBackend::new()),
    )
    .expect("valid config")
}

fn bench_gradients(c: &mut Criterion) {
    let mut group = c.benchmark_group("gradients");
    group.sample_size(20);

    for &(users, items) in &[(100, 50), (500, 444), (2_000, 444)] {
        let m = model(users, items, 10);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{users}x{items}")),
            &m,
            |b, m| b.iter(|| black_box(m.gradients())),
        );
    }

    group.finish();
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("step");
    group.sample_size(20);

    for &k in &[4usize, 10, 32] {
        let mut m = model(500, 444, k);
        group.bench_function(BenchmarkId::from_parameter(k), |b| {
            b.iter(|| black_box(m.step().expect("step")))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gradients, bench_step);
criterion_main!(benches);
