//! Benchmarks for the session parser and stream runner.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fmt::Write;
use std::hint::black_box;

use qkd_telemetry::model::SourceMode;
use qkd_telemetry::parser::{CountingSink, SessionParser};
use qkd_telemetry::source::ReaderSource;
use qkd_telemetry::stream::run_to_end;

/// Measurement output for `sessions` sessions, every other one incomplete.
fn generate_measurement_log(sessions: usize) -> String {
    let mut out = String::new();
    for id in 0..sessions {
        let _ = writeln!(out, "SESSION_NUMBER:{id}");
        for (marker, base) in [("SPD1_VALUES:", 10_000), ("SPD2_VALUES:", 20_000)] {
            out.push_str(marker);
            out.push('\n');
            for i in 0..40 {
                let _ = writeln!(out, "{}", id * 1_000_000 + base + i * 125);
            }
        }
        out.push_str("NUMBER_OF_RX_KEY_BITS_AFTER_PRIVACY_AMPLIFICATION_IS:512\n");
        if id % 2 == 0 {
            let _ = writeln!(out, "DECOY_STATE_RANDOMNESS_AT_SPD1:0.{id}");
            out.push_str("VISIBILITY_RATIO_IS:0.95\n");
            out.push_str("SPD1_QBER_VALUE_IS:2.75\n");
            out.push_str("KEY_BITS:");
            out.extend((0..512).map(|i| if (i + id) % 3 == 0 { '1' } else { '0' }));
            out.push('\n');
        } else {
            out.push_str("KEY_RATE_PER_SECOND_IS:14.5\n");
        }
    }
    out
}

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    for size in [1, 10, 100, 1000].iter() {
        let data = generate_measurement_log(*size);
        group.throughput(Throughput::Bytes(data.len() as u64));

        group.bench_with_input(BenchmarkId::new("feed", size), &data, |b, data| {
            b.iter(|| {
                let mut parser = SessionParser::new(SourceMode::File);
                let mut sink = CountingSink::default();
                for line in data.lines() {
                    parser.feed(line, &mut sink);
                }
                black_box(sink.delivered)
            });
        });

        group.bench_with_input(BenchmarkId::new("parse_str", size), &data, |b, data| {
            b.iter(|| {
                let mut parser = SessionParser::new(SourceMode::Console);
                black_box(parser.parse_str(data))
            });
        });
    }

    group.finish();
}

fn bench_runner(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let data = generate_measurement_log(100);

    let mut group = c.benchmark_group("runner");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("run_to_end", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut source = ReaderSource::new(data.as_bytes());
            let mut parser = SessionParser::new(SourceMode::File);
            let mut sink = CountingSink::default();
            let summary = run_to_end(&mut source, &mut parser, &mut sink)
                .await
                .unwrap();
            black_box(summary.lines_read)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parser, bench_runner);
criterion_main!(benches);
