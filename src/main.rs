//! # Rover payload flight binary
//!
//! Wires the controller to its hardware and runs the supervised loop.
//!
//! ## Wiring
//! - **Radio:** serial modem (`--port`) or stdin/stdout when no port is given.
//! - **Sensors / camera / drive:** simulated payload (drivers are external to this crate).
//! - **Watchdog:** software monitor thread; exits with code 86 if the loop stops kicking.
//!
//! ## Outputs
//! - `data/flight_events.csv`: flight event log (telemetry, phases, releases, commands, faults).
//! - `data/mission_summary.csv`: one summary row appended per run.

use std::{
    fs::create_dir_all,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use clap::Parser;
use log::info;

use rover_payload::{
    advanced::{
        links::{ConsoleRadio, SerialRadio},
        sim::{simulated_sensors, wall_time, FlightProfile, LoggingDrive, SimulatedCamera},
        supervisor::Supervisor,
        watchdog::{SoftwareWatchdog, WATCHDOG_EXIT_CODE},
    },
    component_b::actuator::Actuator,
    hardware::{HardwareContext, RadioPort},
    utils::{
        clock::MonotonicClock,
        config::ControllerConfig,
        export::export_summary_csv,
        metrics::{shared_metrics, EventRecorder},
    },
};

#[derive(Parser, Debug)]
#[command(name = "rover_payload")]
#[command(about = "Payload controller: descent, landing, release sequence and ground-commanded roving", long_about = None)]
struct Args {
    /// JSON mission config; missing fields keep their defaults
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Radio serial device (stdin/stdout when omitted)
    #[arg(long)]
    port: Option<String>,

    #[arg(long, default_value_t = 9_600)]
    baud: u32,

    /// Override the telemetry period
    #[arg(long, value_name = "MS")]
    telemetry_ms: Option<u64>,

    #[arg(long, default_value = "data/flight_events.csv")]
    event_log: PathBuf,

    #[arg(long, default_value = "data/mission_summary.csv")]
    summary_csv: PathBuf,

    /// Stop after this many seconds (0 = run until killed)
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    duration: u64,

    /// Keep the simulated payload on the ground
    #[arg(long, default_value_t = false)]
    grounded: bool,
}

fn load_config(args: &Args) -> anyhow::Result<ControllerConfig> {
    let mut config = match &args.config {
        Some(path) => ControllerConfig::from_json_file(path)?,
        None => ControllerConfig::default(),
    };
    if let Some(port) = &args.port {
        config = config.with_port(port.clone(), args.baud);
    }
    if let Some(ms) = args.telemetry_ms {
        config = config.with_telemetry_period(Duration::from_millis(ms));
    }
    config.validate()?;
    Ok(config)
}

/// Hands recovery to the service manager, which restarts the process.
fn exit_on_watchdog() {
    std::process::exit(WATCHDOG_EXIT_CODE)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;
    info!("=== ROVER PAYLOAD START ===");

    let radio: Box<dyn RadioPort> = match &config.link.port {
        Some(port) => Box::new(
            SerialRadio::open(port, config.link.baud).with_context(|| format!("opening radio on {}", port))?,
        ),
        None => {
            info!("No radio port configured, using the console link");
            Box::new(ConsoleRadio::spawn())
        }
    };

    let watchdog = SoftwareWatchdog::spawn(&config.watchdog, Box::new(exit_on_watchdog));

    let profile = if args.grounded { FlightProfile::grounded() } else { FlightProfile::default() };
    let mut ctx = HardwareContext {
        sensors: simulated_sensors(profile, wall_time()),
        radio,
        actuator: Actuator::new(
            Box::new(LoggingDrive),
            Duration::from_millis(config.motion.mechanism_pulse_ms),
        ),
        camera: Box::new(SimulatedCamera::new(config.imaging.frame_name.clone(), 600, 2_400).with_failures(10)),
        watchdog: Box::new(watchdog.kicker()),
        clock: Box::new(MonotonicClock::new()),
    };

    let metrics = shared_metrics();
    let recorder = EventRecorder::new();
    if let Some(parent) = args.event_log.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let exporter = recorder.start_exporter(args.event_log.clone());

    let running = Arc::new(AtomicBool::new(true));
    if args.duration > 0 {
        let flag = running.clone();
        let secs = args.duration;
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            flag.store(false, Ordering::SeqCst);
        });
    }

    let mut supervisor = Supervisor::new(config.clone(), metrics.clone(), recorder.clone());
    let restarts = supervisor.supervise(&mut ctx, &running);

    ctx.actuator.stop();
    watchdog.shutdown();
    recorder.stop_exporter();
    exporter.join().map_err(|_| anyhow!("flight log exporter panicked"))?;
    export_summary_csv(&metrics, &args.summary_csv)?;

    info!(
        "=== ROVER PAYLOAD FINISHED === restarts={} dropped_events={}",
        restarts,
        recorder.dropped()
    );
    Ok(())
}
