//! Telemetry cadence under a jittery radio: every frame lands within one tick
//! of its slot, and the schedule does not drift.

use std::{io, time::Duration};

use rand::random_range;
use rover_payload::{
    advanced::{
        sim::{manual_context, RadioHandle, RecordingDrive, ScriptedRadio, SimulatedCamera},
        supervisor::Scheduler,
    },
    component_a::phase::FlightPhase,
    hardware::RadioPort,
    utils::{
        clock::{Clock, ManualClock},
        config::ControllerConfig,
        metrics::{lock, shared_metrics, EventRecorder},
    },
};

/// Every poll of the UART costs 0-5 ms of mission time.
struct JitterRadio {
    inner: ScriptedRadio,
    clock: ManualClock,
}

impl RadioPort for JitterRadio {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.clock.advance(Duration::from_micros(random_range(0..5_000)));
        self.inner.bytes_available()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.inner.write(bytes)
    }
}

fn telemetry_times(radio: &RadioHandle) -> Vec<Duration> {
    radio
        .sent()
        .into_iter()
        .filter(|(_, line)| line.starts_with('{'))
        .map(|(t, _)| t)
        .collect()
}

#[test]
fn test_thousand_frames_stay_on_schedule() {
    let period = Duration::from_millis(100);
    let mut config = ControllerConfig::default()
        .with_telemetry_period(period)
        .with_image_period(Duration::from_secs(3_600));
    config.phase.stable_count_target = u32::MAX;

    let clock = ManualClock::new();
    let (inner, handle) = ScriptedRadio::new(clock.clone());
    let radio = JitterRadio { inner, clock: clock.clone() };
    let mut ctx = manual_context(
        &clock,
        Box::new(radio),
        Box::new(RecordingDrive::new(clock.clone())),
        Box::new(SimulatedCamera::new("frame.jpg", 64, 64)),
        &config,
    );

    let metrics = shared_metrics();
    let mut scheduler = Scheduler::start(&config, &mut ctx, metrics.clone(), EventRecorder::new()).unwrap();
    let start = clock.now();
    // 8 samples, 100 ms apart
    assert_eq!(start, Duration::from_millis(700));

    while lock(&metrics).telemetry_sent < 1_000 {
        scheduler.tick(&mut ctx).unwrap();
    }

    let times = telemetry_times(&handle);
    assert_eq!(times.len(), 1_000);
    for (k, t) in times.iter().enumerate() {
        let slot = start + period * k as u32;
        assert!(*t >= slot, "frame {} at {:?} before its slot {:?}", k, t, slot);
        assert!(
            *t - slot < Duration::from_millis(15),
            "frame {} at {:?} is {:?} late",
            k,
            t,
            *t - slot
        );
    }
    assert_eq!(scheduler.phase().phase(), FlightPhase::Descending);
    assert_eq!(lock(&metrics).images_sent, 0);
}

#[test]
fn test_frames_carry_phase_and_flags() {
    let config = ControllerConfig::default();
    let clock = ManualClock::new();
    let (radio, handle) = ScriptedRadio::new(clock.clone());
    let mut ctx = manual_context(
        &clock,
        Box::new(radio),
        Box::new(RecordingDrive::new(clock.clone())),
        Box::new(SimulatedCamera::new("frame.jpg", 64, 64)),
        &config,
    );
    let mut scheduler = Scheduler::start(&config, &mut ctx, shared_metrics(), EventRecorder::new()).unwrap();
    scheduler.tick(&mut ctx).unwrap();

    let lines = handle.sent_lines();
    let frame: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(frame["phase"], "DESCENDING");
    assert_eq!(frame["latch_released"], false);
    assert!(frame["altitude"].as_f64().unwrap().abs() < 1.0);
    assert_eq!(frame["voltage"], 7.4);
    // no GPS fix yet on the simulated receiver
    assert!(frame.get("latitude").is_none());
}
