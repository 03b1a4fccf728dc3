//! config.rs
//! Mission parameters. Every section has flight defaults; a JSON file may
//! override any subset of fields and the CLI overrides a few more.

use anyhow::{ensure, Context};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ControllerConfig {
    pub sensors: SensorConfig,
    pub phase: PhaseConfig,
    pub link: LinkConfig,
    pub motion: MotionConfig,
    pub schedule: ScheduleConfig,
    pub imaging: ImagingConfig,
    pub watchdog: WatchdogConfig,
}

/// Baseline calibration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub calibration_samples: usize,
    pub calibration_interval_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            calibration_samples: 8,
            calibration_interval_ms: 100,
        }
    }
}

/// Landing detection and release sequencing. Altitudes in feet relative to baseline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    pub landing_alt_thresh_ft: f64,
    pub landing_delta_ft: f64,
    pub landing_accel_thresh_g: f64,
    pub stable_count_target: u32,
    /// Landing detection stays disarmed until `launched` is set.
    pub landing_requires_launch: bool,
    pub launch_alt_ft: f64,
    pub target_alt_ft: f64,
    /// Optional parachute stage; `None` skips it.
    pub parachute_deploy_alt_ft: Option<f64>,
    pub latch_settle_ms: u64,
    pub arm_settle_ms: u64,
    pub instrument_settle_ms: u64,
    pub capture_settle_ms: u64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            landing_alt_thresh_ft: 50.0,
            landing_delta_ft: 0.5,
            landing_accel_thresh_g: 2.0,
            stable_count_target: 3,
            landing_requires_launch: true,
            launch_alt_ft: 100.0,
            target_alt_ft: 400.0,
            parachute_deploy_alt_ft: None,
            latch_settle_ms: 2_000,
            arm_settle_ms: 3_000,
            instrument_settle_ms: 2_000,
            capture_settle_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial device of the radio; `None` runs the console link.
    pub port: Option<String>,
    pub baud: u32,
    /// Cap on a newline-less partial command before it is discarded.
    pub max_pending_bytes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 9_600,
            max_pending_bytes: 1_024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// m/s, converts FORWARD/BACKWARD distance into drive time.
    pub move_speed_mps: f64,
    /// deg/s, converts LEFT/RIGHT angle into drive time.
    pub turn_rate_dps: f64,
    pub inter_command_pause_ms: u64,
    pub mechanism_pulse_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            move_speed_mps: 0.5,
            turn_rate_dps: 90.0,
            inter_command_pause_ms: 200,
            mechanism_pulse_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub telemetry_period_ms: u64,
    pub image_period_ms: u64,
    pub yield_ms: u64,
    /// Ticks longer than this are counted as deadline misses.
    pub tick_budget_ms: u64,
    /// Pause between a fault report and the restart.
    pub restart_settle_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            telemetry_period_ms: 1_000,
            image_period_ms: 1_000,
            yield_ms: 10,
            tick_budget_ms: 50,
            restart_settle_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImagingConfig {
    pub chunk_size: usize,
    pub frame_name: String,
    /// Only stream images once the phase machine reaches Capturing.
    pub capturing_only: bool,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 90,
            frame_name: "frame.jpg".to_string(),
            capturing_only: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Pick it so a slow image frame still fits.
    pub timeout_ms: u64,
    /// Delay before the watchdog is armed.
    pub grace_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            grace_ms: 5_000,
        }
    }
}

impl ControllerConfig {
    /// Reads a JSON config file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        let config: ControllerConfig =
            serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?;
        config.validate().with_context(|| format!("rejected config {}", path.display()))?;
        Ok(config)
    }

    pub fn with_telemetry_period(mut self, period: Duration) -> Self {
        self.schedule.telemetry_period_ms = period.as_millis() as u64;
        self
    }

    pub fn with_image_period(mut self, period: Duration) -> Self {
        self.schedule.image_period_ms = period.as_millis() as u64;
        self
    }

    pub fn with_port(mut self, port: impl Into<String>, baud: u32) -> Self {
        self.link.port = Some(port.into());
        self.link.baud = baud;
        self
    }

    /// Rejects values that would stall or divide by zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.motion.move_speed_mps > 0.0, "motion.move_speed_mps must be > 0");
        ensure!(self.motion.turn_rate_dps > 0.0, "motion.turn_rate_dps must be > 0");
        ensure!(self.imaging.chunk_size > 0, "imaging.chunk_size must be > 0");
        ensure!(
            self.schedule.telemetry_period_ms > 0 && self.schedule.image_period_ms > 0,
            "schedule periods must be > 0"
        );
        ensure!(self.link.max_pending_bytes > 0, "link.max_pending_bytes must be > 0");
        ensure!(self.sensors.calibration_samples > 0, "sensors.calibration_samples must be > 0");
        ensure!(
            self.watchdog.timeout_ms > self.schedule.yield_ms,
            "watchdog.timeout_ms must exceed schedule.yield_ms"
        );
        Ok(())
    }
}

impl ScheduleConfig {
    pub fn telemetry_period(&self) -> Duration {
        Duration::from_millis(self.telemetry_period_ms)
    }

    pub fn image_period(&self) -> Duration {
        Duration::from_millis(self.image_period_ms)
    }

    pub fn yield_interval(&self) -> Duration {
        Duration::from_millis(self.yield_ms)
    }

    pub fn tick_budget(&self) -> Duration {
        Duration::from_millis(self.tick_budget_ms)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_ms)
    }
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Longest blocking slice allowed between kicks.
    pub fn kick_interval(&self) -> Duration {
        Duration::from_millis((self.timeout_ms / 4).max(1))
    }
}
