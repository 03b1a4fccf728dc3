//! transmitter.rs
//! Telemetry frame: one JSON object per line, device → ground.

use serde::Serialize;

use crate::component_a::phase::{DeviceState, FlightPhase};
use crate::component_a::sensor::SensorSample;
use crate::component_b::radio::RadioFrame;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryFrame {
    /// Feet above the calibration baseline.
    pub altitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    pub acceleration: Vector3,
    pub temperature: f64,
    pub voltage: f64,
    pub phase: &'static str,
    #[serde(flatten)]
    pub state: DeviceState,
}

fn round_to(v: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (v * scale).round() / scale
}

impl TelemetryFrame {
    pub fn new(sample: &SensorSample, phase: FlightPhase, state: DeviceState) -> Self {
        let [x, y, z] = sample.accel_g;
        Self {
            altitude: round_to(sample.altitude_ft, 2),
            latitude: sample.position.map(|p| p.latitude),
            longitude: sample.position.map(|p| p.longitude),
            acceleration: Vector3 {
                x: round_to(x, 3),
                y: round_to(y, 3),
                z: round_to(z, 3),
            },
            temperature: round_to(sample.temperature_c, 2),
            voltage: round_to(sample.voltage, 2),
            phase: phase.name(),
            state,
        }
    }

    pub fn to_frame(&self) -> Result<RadioFrame, serde_json::Error> {
        serde_json::to_string(self).map(RadioFrame::Telemetry)
    }
}
