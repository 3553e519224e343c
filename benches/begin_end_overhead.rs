//! Hot path cost of one `begin_block!` / `end_block!` pair
//!
//! Each pair performs four thread CPU clock reads plus the per-interval
//! correction samples, so the result is dominated by clock reads. Compare
//! the `engine_manual_clock` group to see the bookkeeping cost alone.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench begin_end_overhead
//! ```

use blockprof::calibration::{Correction, CorrectionMode};
use blockprof::clock::{Clock, ManualClock, ThreadCpuClock};
use blockprof::{begin_block, end_block, ProfileConfig, ThreadProfile};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn bench_clock_read(c: &mut Criterion) {
    c.bench_function("thread_cpu_clock_read", |b| {
        b.iter(|| black_box(ThreadCpuClock.now().unwrap()))
    });
}

fn bench_macro_pair(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    blockprof::init_profile_with(ProfileConfig::quick().with_output_dir(dir.path()));

    begin_block!("main");

    c.bench_function("begin_end_flat", |b| {
        b.iter(|| {
            begin_block!("bench");
            end_block!();
        })
    });

    c.bench_function("begin_end_nested", |b| {
        b.iter(|| {
            begin_block!("outer");
            begin_block!("inner");
            end_block!();
            end_block!();
        })
    });

    end_block!();
}

fn bench_engine_manual_clock(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_manual_clock");

    for mode in [CorrectionMode::PerSample, CorrectionMode::Suspect] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", mode)),
            &mode,
            |b, &mode| {
                let clock = ManualClock::new(0, 20);
                let mut profile = ThreadProfile::new(0, Correction { mode, samples: 2 });
                profile.begin(0, "main", &clock).unwrap();
                b.iter(|| {
                    profile.begin(1, "child", &clock).unwrap();
                    clock.advance(black_box(100));
                    profile.end(&clock).unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_clock_read,
    bench_macro_pair,
    bench_engine_manual_clock
);
criterion_main!(benches);
