//! sensor.rs
//! One non-blocking poll over barometer, IMU, GPS and battery.
//! - Baseline calibration: average of N pressure altitudes taken before any phase logic runs
//! - Each poll returns a consistent `SensorSample`; failed or NaN reads reuse the last good
//!   value and are flagged stale so the phase machine ignores them

use std::time::Duration;
use log::{debug, info, warn};

use crate::hardware::{GeoFix, SensorBus, Watchdog};
use crate::utils::clock::Clock;
use crate::utils::config::SensorConfig;
use crate::utils::fault::Fault;

const SEA_LEVEL_PA: f64 = 101_325.0;
const BARO_EXPONENT: f64 = 5.25588;
const METERS_PER_UNIT: f64 = 2.25577e-5;
const FEET_PER_METER: f64 = 3.28084;

/// Pressure altitude in feet (international standard atmosphere).
pub fn altitude_from_pressure_ft(pressure_pa: f64) -> f64 {
    (1.0 - (pressure_pa / SEA_LEVEL_PA).powf(1.0 / BARO_EXPONENT)) / METERS_PER_UNIT * FEET_PER_METER
}

/// Inverse of `altitude_from_pressure_ft`.
pub fn pressure_from_altitude_ft(altitude_ft: f64) -> f64 {
    SEA_LEVEL_PA * (1.0 - altitude_ft / FEET_PER_METER * METERS_PER_UNIT).powf(BARO_EXPONENT)
}

/// GPS (degrees, minutes, hemisphere) to signed decimal degrees, 6 decimals.
/// Zero degrees means the receiver has no fix yet.
pub fn convert_coordinates(degrees: f64, minutes: f64, hemisphere: char) -> Option<f64> {
    if degrees == 0.0 || !degrees.is_finite() || !minutes.is_finite() {
        return None;
    }
    let mut value = degrees + minutes / 60.0;
    if matches!(hemisphere, 'S' | 'W') {
        value = -value;
    }
    Some((value * 1e6).round() / 1e6)
}

/// Which fields of a sample came from this poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Freshness {
    pub altitude: bool,
    pub accel: bool,
    pub gyro: bool,
    pub temperature: bool,
    pub position: bool,
    pub voltage: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    /// Feet above the calibration baseline.
    pub altitude_ft: f64,
    pub accel_g: [f64; 3],
    pub gyro_dps: [f64; 3],
    pub temperature_c: f64,
    pub position: Option<GeoFix>,
    pub voltage: f64,
    pub timestamp: Duration,
    pub fresh: Freshness,
}

impl SensorSample {
    pub fn accel_magnitude(&self) -> f64 {
        let [x, y, z] = self.accel_g;
        (x * x + y * y + z * z).sqrt()
    }
}

fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

fn finite3(v: Option<[f64; 3]>) -> Option<[f64; 3]> {
    v.filter(|a| a.iter().all(|x| x.is_finite()))
}

/// Owns the baseline and the last good value of every field.
#[derive(Debug, Clone)]
pub struct SensorSnapshot {
    baseline_ft: f64,
    last: SensorSample,
}

impl SensorSnapshot {
    /// Builds a snapshot around an already-known baseline (absolute feet).
    pub fn with_baseline(baseline_ft: f64) -> Self {
        Self {
            baseline_ft,
            last: SensorSample {
                altitude_ft: 0.0,
                accel_g: [0.0, 0.0, 1.0],
                gyro_dps: [0.0; 3],
                temperature_c: 0.0,
                position: None,
                voltage: 0.0,
                timestamp: Duration::ZERO,
                fresh: Freshness::default(),
            },
        }
    }

    /// Averages `calibration_samples` pressure altitudes, `calibration_interval_ms`
    /// apart, kicking the watchdog between samples. Invalid samples are skipped;
    /// if none is valid the calibration fails.
    pub fn calibrate(
        bus: &mut SensorBus,
        clock: &mut dyn Clock,
        watchdog: &mut dyn Watchdog,
        cfg: &SensorConfig,
    ) -> Result<Self, Fault> {
        let interval = Duration::from_millis(cfg.calibration_interval_ms);
        let mut sum = 0.0;
        let mut valid = 0usize;

        for i in 0..cfg.calibration_samples {
            watchdog.kick();
            match finite(bus.barometer.pressure_pa()) {
                Some(p) if p > 0.0 => {
                    sum += altitude_from_pressure_ft(p);
                    valid += 1;
                }
                _ => warn!("[Sensor] calibration sample {} unreadable", i),
            }
            if i + 1 < cfg.calibration_samples {
                clock.sleep(interval);
            }
        }

        if valid == 0 {
            return Err(Fault::Calibration(format!(
                "no valid barometer reading in {} samples",
                cfg.calibration_samples
            )));
        }

        let baseline_ft = sum / valid as f64;
        info!("[Sensor] baseline {:.2} ft from {}/{} samples", baseline_ft, valid, cfg.calibration_samples);
        Ok(Self::with_baseline(baseline_ft))
    }

    pub fn baseline_ft(&self) -> f64 {
        self.baseline_ft
    }

    /// Last sample returned by `poll`.
    pub fn last(&self) -> &SensorSample {
        &self.last
    }

    /// Reads every capability once. Never blocks.
    pub fn poll(&mut self, bus: &mut SensorBus, now: Duration) -> SensorSample {
        let mut sample = self.last.clone();
        sample.timestamp = now;
        sample.fresh = Freshness::default();

        if let Some(p) = finite(bus.barometer.pressure_pa()).filter(|p| *p > 0.0) {
            sample.altitude_ft = altitude_from_pressure_ft(p) - self.baseline_ft;
            sample.fresh.altitude = true;
        }
        if let Some(t) = finite(bus.barometer.temperature_c()) {
            sample.temperature_c = t;
            sample.fresh.temperature = true;
        }
        if let Some(a) = finite3(bus.inertial.accel_g()) {
            sample.accel_g = a;
            sample.fresh.accel = true;
        }
        if let Some(g) = finite3(bus.inertial.gyro_dps()) {
            sample.gyro_dps = g;
            sample.fresh.gyro = true;
        }
        if let Some(fix) = bus
            .position
            .poll_fix()
            .filter(|f| f.latitude.is_finite() && f.longitude.is_finite())
        {
            sample.position = Some(fix);
            sample.fresh.position = true;
        }
        if let Some(v) = finite(bus.battery.voltage()) {
            sample.voltage = v;
            sample.fresh.voltage = true;
        }

        if !sample.fresh.altitude || !sample.fresh.accel {
            debug!("[Sensor] stale fields at {:?}: {:?}", now, sample.fresh);
        }

        self.last = sample.clone();
        sample
    }
}
