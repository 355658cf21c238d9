//! Benchmarks for ignore matching and transition lookups.

use std::path::Path;

use appix::packaging::IgnoreRules;
use appix::watch::{transition, WatchEvent, WatcherState};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn ignore_benchmark(c: &mut Criterion) {
    let rules = IgnoreRules::builtin()
        .with_ignore_file_contents("*.log\ncoverage\nbuild-?\n# comment\n");
    let paths = [
        "src/components/button/index.js",
        "web/node_modules/react/cjs/react.development.js",
        "logs/2024/today.log",
        "assets/images/Thumbs.db",
    ];

    c.bench_function("ignore_is_ignored", |b| {
        b.iter(|| {
            for path in &paths {
                black_box(rules.is_ignored(Path::new(black_box(path))));
            }
        });
    });
}

fn transition_benchmark(c: &mut Criterion) {
    c.bench_function("watch_transition_burst", |b| {
        b.iter(|| {
            let mut state = WatcherState::Pushing;
            for _ in 0..100 {
                state = transition(state, black_box(WatchEvent::FileChanged)).0;
            }
            black_box(transition(state, WatchEvent::PushCompleted))
        });
    });
}

criterion_group!(benches, ignore_benchmark, transition_benchmark);
criterion_main!(benches);
