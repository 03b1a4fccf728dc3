//! Ground commands executed end to end: radio bytes in, drive signals and
//! ACK/ERR lines out, all on simulated time.

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use rover_payload::{
    advanced::sim::{manual_context, DriveLog, DriveSignal, RadioHandle, RecordingDrive, ScriptedRadio, SimulatedCamera},
    component_a::phase::PhaseStateMachine,
    component_b::receiver::CommandService,
    hardware::{HardwareContext, MotorDirection::*, Watchdog},
    utils::{
        clock::ManualClock,
        config::ControllerConfig,
        metrics::{lock, shared_metrics, EventRecorder, SharedMetrics},
    },
};

struct Rig {
    ctx: HardwareContext,
    radio: RadioHandle,
    drive: DriveLog,
    phase: PhaseStateMachine,
    service: CommandService,
    metrics: SharedMetrics,
}

fn rig() -> Rig {
    let config = ControllerConfig::default();
    let clock = ManualClock::new();
    let (radio, handle) = ScriptedRadio::new(clock.clone());
    let drive = RecordingDrive::new(clock.clone());
    let log = drive.log();
    let ctx = manual_context(
        &clock,
        Box::new(radio),
        Box::new(drive),
        Box::new(SimulatedCamera::new("frame.jpg", 64, 64)),
        &config,
    );
    let metrics = shared_metrics();
    Rig {
        ctx,
        radio: handle,
        drive: log,
        phase: PhaseStateMachine::new(config.phase.clone(), Duration::ZERO),
        service: CommandService::new(&config, metrics.clone(), EventRecorder::new()),
        metrics,
    }
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

#[test]
fn test_sequence_timings_stops_and_pauses() {
    let mut r = rig();
    r.radio.queue(b"CMD|FORWARD 2.0, LEFT 90, FORWARD 1.5\n");

    let handled = r.service.service(&mut r.ctx, &mut r.phase).unwrap();
    assert_eq!(handled, 1);

    let log = r.drive.lock().clone();
    assert_eq!(
        log,
        vec![
            (ms(0), DriveSignal::Motors(Forward, Forward)),
            (ms(4_000), DriveSignal::Motors(Off, Off)),
            (ms(4_200), DriveSignal::Motors(Off, Forward)),
            (ms(5_200), DriveSignal::Motors(Off, Off)),
            (ms(5_400), DriveSignal::Motors(Forward, Forward)),
            (ms(8_400), DriveSignal::Motors(Off, Off)),
        ]
    );
    assert_eq!(
        r.radio.sent(),
        vec![(ms(8_600), "ACK|FORWARD 2.0, LEFT 90, FORWARD 1.5".to_string())]
    );
    assert_eq!(lock(&r.metrics).commands_acked, 1);
}

#[test]
fn test_malformed_middle_segment_is_skipped() {
    let mut r = rig();
    r.radio.queue(b"CMD|FORWARD 2.0, LEFT abc, FORWARD 1.5\n");
    r.service.service(&mut r.ctx, &mut r.phase).unwrap();

    let log = r.drive.lock().clone();
    assert_eq!(
        log,
        vec![
            (ms(0), DriveSignal::Motors(Forward, Forward)),
            (ms(4_000), DriveSignal::Motors(Off, Off)),
            (ms(4_200), DriveSignal::Motors(Forward, Forward)),
            (ms(7_200), DriveSignal::Motors(Off, Off)),
        ]
    );
    assert_eq!(r.radio.sent_lines(), vec!["ERR|bad_segment:LEFT abc".to_string()]);
    assert_eq!(lock(&r.metrics).commands_rejected, 1);
}

#[test]
fn test_rejected_lines_never_move() {
    let mut r = rig();
    r.radio.queue(b"CMD|\nCMD|SPIN 3\nhello ground\nCMD|stop\n");
    let handled = r.service.service(&mut r.ctx, &mut r.phase).unwrap();
    assert_eq!(handled, 4);

    assert_eq!(
        r.radio.sent_lines(),
        vec!["ERR|empty".to_string(), "ERR|bad_cmd".to_string(), "ACK|STOP".to_string()]
    );
    // only the STOP touched the motors
    assert_eq!(r.drive.lock().clone(), vec![(ms(0), DriveSignal::Motors(Off, Off))]);
    let m = lock(&r.metrics);
    assert_eq!(m.lines_unhandled, 1);
    assert_eq!(m.commands_rejected, 2);
    assert_eq!(m.commands_acked, 1);
}

#[test]
fn test_commands_answered_in_receive_order_across_fragments() {
    let mut r = rig();
    r.radio.queue(b"CMD|RIGHT 4");
    r.radio.queue(b"5\nCMD|ST");
    r.radio.queue(b"OP\n");
    for _ in 0..3 {
        r.service.service(&mut r.ctx, &mut r.phase).unwrap();
    }
    assert_eq!(r.radio.sent_lines(), vec!["ACK|RIGHT 45".to_string(), "ACK|STOP".to_string()]);
    let log = r.drive.lock().clone();
    assert_eq!(log[0], (ms(0), DriveSignal::Motors(Forward, Off)));
    assert_eq!(log[1], (ms(500), DriveSignal::Motors(Off, Off)));
}

#[test]
fn test_overflow_reported_and_stream_continues() {
    let mut r = rig();
    let mut junk = vec![b'Z'; 2_000];
    junk.extend_from_slice(b"\nCMD|STOP\n");
    r.radio.queue(&junk);
    r.service.service(&mut r.ctx, &mut r.phase).unwrap();
    assert_eq!(r.radio.sent_lines(), vec!["ERR|overflow".to_string(), "ACK|STOP".to_string()]);
    assert_eq!(lock(&r.metrics).buffer_overflows, 1);
}

struct CountingWatchdog(Arc<AtomicU32>);

impl Watchdog for CountingWatchdog {
    fn kick(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_long_drive_keeps_kicking_watchdog() {
    let mut r = rig();
    let kicks = Arc::new(AtomicU32::new(0));
    r.ctx.watchdog = Box::new(CountingWatchdog(kicks.clone()));
    // 10 m at 0.5 m/s = 20 s, kick slice is timeout/4 = 2 s
    r.radio.queue(b"CMD|FORWARD 10\n");
    r.service.service(&mut r.ctx, &mut r.phase).unwrap();
    assert!(kicks.load(Ordering::SeqCst) >= 10);
}

#[cfg(feature = "ground-test")]
#[test]
fn test_phase_override_runs_entry_release() {
    use rover_payload::{component_a::phase::FlightPhase, hardware::Mechanism};

    let mut r = rig();
    r.radio.queue(b"CMD|PHASE latch_releasing\n");
    r.service.service(&mut r.ctx, &mut r.phase).unwrap();

    assert_eq!(r.radio.sent_lines(), vec!["ACK|PHASE LATCH_RELEASING".to_string()]);
    // pulse fired and confirmed
    assert_eq!(r.phase.phase(), FlightPhase::LatchReleased);
    assert!(r.phase.state().latch_released);
    let log = r.drive.lock().clone();
    assert_eq!(
        log,
        vec![
            (ms(0), DriveSignal::Mechanism(Mechanism::Latch, true)),
            (ms(500), DriveSignal::Mechanism(Mechanism::Latch, false)),
        ]
    );

    r.radio.queue(b"CMD|PHASE SIDEWAYS\n");
    r.service.service(&mut r.ctx, &mut r.phase).unwrap();
    assert_eq!(r.radio.sent_lines().last().cloned(), Some("ERR|bad_phase".to_string()));
}
