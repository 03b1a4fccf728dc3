/* This benchmark measures how long one RadioCodec drain takes to reassemble
command lines from a burst of fragmented UART reads. The scheduler drains once
per tick and between image chunks, so this cost is paid on every pass of the loop. */
use criterion::{
    criterion_group,
    criterion_main,
    BenchmarkId,
    Criterion,
};
use rover_payload::{
    advanced::sim::ScriptedRadio,
    component_b::radio::RadioCodec,
    utils::clock::ManualClock,
};

use std::hint::black_box;

const BURST: &[u8] = b"CMD|FORWARD 2.0, LEFT 90, FORWARD 1.5\nCMD|STOP\nCMD|RIGHT 45, BACKWARD 0.5\n";

fn bench_radio_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("radio_drain");

    for fragment in [1usize, 7, 32, BURST.len()] {
        group.bench_with_input(BenchmarkId::new("fragment_bytes", fragment), &fragment, |b, &fragment| {
            b.iter(|| {
                let (mut radio, handle) = ScriptedRadio::new(ManualClock::new());
                for chunk in BURST.chunks(fragment) {
                    handle.queue(chunk);
                }
                let mut codec = RadioCodec::new(1_024);
                let mut lines = 0;
                // one queued chunk per drain
                for _ in 0..BURST.len().div_ceil(fragment) {
                    lines += codec.drain(&mut radio).map(|v| v.len()).unwrap_or(0);
                }
                black_box(lines);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_radio_drain);
criterion_main!(benches);
