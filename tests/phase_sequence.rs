//! Whole simulated flight on mission time: climb, descent, touchdown, then the
//! latch/arm/instrument release sequence ending in Capturing.

use std::time::Duration;

use rover_payload::{
    advanced::{
        sim::{
            manual_context, manual_time, simulated_sensors, DriveSignal, FlightProfile, RecordingDrive,
            ScriptedRadio, SimulatedCamera,
        },
        supervisor::Scheduler,
    },
    component_a::phase::FlightPhase,
    hardware::{Mechanism, MotorDirection},
    utils::{
        clock::{Clock, ManualClock},
        config::ControllerConfig,
        metrics::{shared_metrics, Event, EventRecorder},
    },
};

#[test]
fn test_flight_reaches_capturing_with_ordered_releases() {
    let config = ControllerConfig::default();
    let clock = ManualClock::new();
    let (radio, handle) = ScriptedRadio::new(clock.clone());
    let drive = RecordingDrive::new(clock.clone());
    let drive_log = drive.log();
    let mut ctx = manual_context(
        &clock,
        Box::new(radio),
        Box::new(drive),
        Box::new(SimulatedCamera::new("frame.jpg", 64, 64)),
        &config,
    );
    let profile = FlightProfile::default();
    let touchdown = Duration::from_secs_f64(profile.touchdown_s());
    ctx.sensors = simulated_sensors(profile, manual_time(&clock));

    let recorder = EventRecorder::new();
    let mut scheduler = Scheduler::start(&config, &mut ctx, shared_metrics(), recorder.clone()).unwrap();
    while scheduler.phase().phase() != FlightPhase::Capturing {
        assert!(clock.now() < Duration::from_secs(120), "stuck in {:?}", scheduler.phase().phase());
        scheduler.tick(&mut ctx).unwrap();
    }

    let state = scheduler.phase().state();
    assert!(state.launched && state.target_altitude_reached);
    assert!(state.latch_released && state.arm_released && state.instrument_released);

    let phases: Vec<(&str, &str)> = recorder
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            Event::PhaseChanged { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    let order = [
        FlightPhase::Descending,
        FlightPhase::Landed,
        FlightPhase::LatchReleasing,
        FlightPhase::LatchReleased,
        FlightPhase::ArmActive,
        FlightPhase::InstrumentReleased,
        FlightPhase::Capturing,
    ];
    let expected: Vec<(&str, &str)> = order.windows(2).map(|w| (w[0].name(), w[1].name())).collect();
    assert_eq!(phases, expected);

    let log = drive_log.lock().clone();
    let engaged: Vec<(Duration, Mechanism)> = log
        .iter()
        .filter_map(|(t, s)| match s {
            DriveSignal::Mechanism(m, true) => Some((*t, *m)),
            _ => None,
        })
        .collect();
    let mechanisms: Vec<Mechanism> = engaged.iter().map(|(_, m)| *m).collect();
    assert_eq!(mechanisms, vec![Mechanism::Latch, Mechanism::Arm, Mechanism::Instrument]);
    // nothing fires before the payload is on the ground
    assert!(engaged[0].0 > touchdown);
    // arm waits out its settle window after the latch pulse
    assert!(engaged[1].0 - engaged[0].0 >= Duration::from_millis(500 + 3_000));

    // every pulse is released again after its length
    for (t, m) in &engaged {
        assert!(log.contains(&(*t + Duration::from_millis(500), DriveSignal::Mechanism(*m, false))));
    }
    // landing stopped the drive
    assert!(log.iter().any(|(t, s)| *t > touchdown
        && *s == DriveSignal::Motors(MotorDirection::Off, MotorDirection::Off)));

    // telemetry on the ground reports the last phase
    let last = handle.sent_lines().into_iter().filter(|l| l.starts_with('{')).last().unwrap();
    assert!(last.contains("\"instrument_released\":true"));
}
