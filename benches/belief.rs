use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ngbandit::{Belief, RewardWindow};
use std::hint::black_box;

fn bench_update(c: &mut Criterion) {
    // Deterministic reward stream around 2.5 with a slow oscillation.
    let n = 4096usize;
    let rewards: Vec<f64> = (0..n)
        .map(|i| 2.5 + ((i % 37) as f64 - 18.0) * 0.1)
        .collect();

    let mut group = c.benchmark_group("belief_update");

    group.bench_function("sequential", |b| {
        b.iter(|| {
            let mut cur = Belief::UNINFORMATIVE;
            for &r in &rewards {
                cur = cur.update(r);
            }
            black_box(cur);
        })
    });

    group.bench_function("fields_round_trip", |b| {
        let belief = Belief::UNINFORMATIVE.update(2.0).update(3.0);
        b.iter(|| {
            let fields = black_box(belief).to_fields();
            black_box(Belief::from_fields("arm:0", &fields).ok());
        })
    });

    for cap in [50usize, 500] {
        group.bench_with_input(BenchmarkId::new("window/push_mean", cap), &cap, |b, &cap| {
            b.iter(|| {
                let mut w = RewardWindow::new(cap);
                for &r in &rewards {
                    w.push(r);
                }
                black_box(w.mean());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_update);
criterion_main!(benches);
