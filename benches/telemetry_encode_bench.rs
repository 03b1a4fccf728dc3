/* Telemetry JSON encoding and image base64 encoding: the two serialisation
costs inside the periodic slots. */
use criterion::{criterion_group, criterion_main, Criterion};
use rover_payload::{
    component_a::{
        imaging::encode_base64,
        phase::{DeviceState, FlightPhase},
        sensor::{Freshness, SensorSample},
        transmitter::TelemetryFrame,
    },
    hardware::GeoFix,
};

use std::{hint::black_box, time::Duration};

fn bench_telemetry(c: &mut Criterion) {
    let sample = SensorSample {
        altitude_ft: 123.456,
        accel_g: [0.012, -0.031, 0.998],
        gyro_dps: [0.1, 0.2, -0.1],
        temperature_c: 14.7,
        position: Some(GeoFix { latitude: 40.446117, longitude: -79.982217 }),
        voltage: 7.4,
        timestamp: Duration::from_secs(12),
        fresh: Freshness::default(),
    };

    c.bench_function("telemetry_json_encode", |b| {
        b.iter(|| {
            let frame = TelemetryFrame::new(black_box(&sample), FlightPhase::Descending, DeviceState::default());
            black_box(frame.to_frame().map(|f| f.to_line()))
        });
    });

    let image: Vec<u8> = (0..2_048u32).map(|i| (i * 31 % 251) as u8).collect();
    c.bench_function("image_base64_2k", |b| {
        b.iter(|| black_box(encode_base64(black_box(&image))));
    });
}

criterion_group!(benches, bench_telemetry);
criterion_main!(benches);
