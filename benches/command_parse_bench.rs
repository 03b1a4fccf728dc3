/* Parse latency of ground command lines, including a sequence with a
malformed segment that has to be skipped. */
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rover_payload::component_b::command::CommandLine;

use std::hint::black_box;

fn bench_command_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_parse");
    let lines = [
        ("stop", "CMD|STOP"),
        ("sequence", "CMD|FORWARD 2.0, LEFT 90, FORWARD 1.5"),
        ("bad_segment", "CMD|FORWARD 2.0, LEFT abc, FORWARD 1.5"),
        ("not_a_command", "{\"altitude\":12.5}"),
    ];

    for (name, line) in lines {
        group.bench_with_input(BenchmarkId::from_parameter(name), &line, |b, line| {
            b.iter(|| black_box(CommandLine::parse(black_box(line))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_command_parse);
criterion_main!(benches);
