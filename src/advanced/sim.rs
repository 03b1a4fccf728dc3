//! sim.rs
//! Simulated payload hardware for bench runs and tests.
//!
//! - `FlightProfile`: pad → climb → descent → touchdown spike → rest
//! - Sensors read the profile at the current mission time, with `rand` noise
//! - `RecordingDrive` / `ScriptedRadio` log every output against a `ManualClock`

use std::{
    collections::VecDeque,
    io,
    sync::Arc,
    time::{Duration, Instant},
};
use parking_lot::Mutex;
use rand::random_range;
use log::info;

use crate::component_a::sensor::{convert_coordinates, pressure_from_altitude_ft};
use crate::component_b::actuator::Actuator;
use crate::hardware::{
    Barometer, Camera, CapturedImage, DriveOutputs, FixedBattery, GeoFix, HardwareContext, InertialSensor,
    Mechanism, MotorDirection, NoWatchdog, PositionSource, RadioPort, SensorBus,
};
use crate::utils::clock::{Clock, ManualClock};
use crate::utils::config::ControllerConfig;

/// Mission time as seen by the simulated sensors.
pub type TimeSource = Arc<dyn Fn() -> Duration + Send + Sync>;

pub fn wall_time() -> TimeSource {
    let start = Instant::now();
    Arc::new(move || start.elapsed())
}

pub fn manual_time(clock: &ManualClock) -> TimeSource {
    let clock = clock.clone();
    Arc::new(move || clock.now())
}

// ============================================================================
// Flight profile
// ============================================================================

#[derive(Debug, Clone)]
pub struct FlightProfile {
    pub field_elevation_ft: f64,
    /// Time on the pad before lift-off (covers calibration).
    pub pad_s: f64,
    /// Apex above the field; 0 keeps the payload on the ground.
    pub apex_ft: f64,
    pub climb_fps: f64,
    pub descent_fps: f64,
    pub impact_g: f64,
    /// Length of the touchdown spike.
    pub impact_s: f64,
}

impl Default for FlightProfile {
    fn default() -> Self {
        Self {
            field_elevation_ft: 600.0,
            pad_s: 3.0,
            apex_ft: 450.0,
            climb_fps: 25.0,
            descent_fps: 15.0,
            impact_g: 3.5,
            impact_s: 0.3,
        }
    }
}

impl FlightProfile {
    pub fn grounded() -> Self {
        Self { apex_ft: 0.0, ..Self::default() }
    }

    fn climb_end_s(&self) -> f64 {
        self.pad_s + self.apex_ft / self.climb_fps
    }

    pub fn touchdown_s(&self) -> f64 {
        self.climb_end_s() + self.apex_ft / self.descent_fps
    }

    /// Feet above the field at `t` seconds.
    pub fn relative_altitude_ft(&self, t: f64) -> f64 {
        if self.apex_ft <= 0.0 || t <= self.pad_s {
            0.0
        } else if t <= self.climb_end_s() {
            (t - self.pad_s) * self.climb_fps
        } else if t <= self.touchdown_s() {
            self.apex_ft - (t - self.climb_end_s()) * self.descent_fps
        } else {
            0.0
        }
    }

    pub fn accel_g(&self, t: f64) -> [f64; 3] {
        if self.apex_ft <= 0.0 {
            return [0.0, 0.0, 1.0];
        }
        if t > self.pad_s && t <= self.pad_s + 1.0 {
            return [0.0, 0.0, 1.4];
        }
        let touchdown = self.touchdown_s();
        if t >= touchdown && t < touchdown + self.impact_s {
            return [0.4, 0.2, self.impact_g];
        }
        [0.0, 0.0, 1.0]
    }
}

// ============================================================================
// Sensors
// ============================================================================

pub struct SimulatedBarometer {
    profile: FlightProfile,
    time: TimeSource,
}

impl Barometer for SimulatedBarometer {
    fn pressure_pa(&mut self) -> Option<f64> {
        let t = (self.time)().as_secs_f64();
        let alt = self.profile.field_elevation_ft + self.profile.relative_altitude_ft(t) + random_range(-0.05..0.05);
        Some(pressure_from_altitude_ft(alt))
    }

    fn temperature_c(&mut self) -> Option<f64> {
        let t = (self.time)().as_secs_f64();
        Some(15.0 - 0.00198 * self.profile.relative_altitude_ft(t) + random_range(-0.1..0.1))
    }
}

pub struct SimulatedImu {
    profile: FlightProfile,
    time: TimeSource,
}

impl InertialSensor for SimulatedImu {
    fn accel_g(&mut self) -> Option<[f64; 3]> {
        let t = (self.time)().as_secs_f64();
        let [x, y, z] = self.profile.accel_g(t);
        Some([
            x + random_range(-0.01..0.01),
            y + random_range(-0.01..0.01),
            z + random_range(-0.01..0.01),
        ])
    }

    fn gyro_dps(&mut self) -> Option<[f64; 3]> {
        Some([random_range(-0.5..0.5), random_range(-0.5..0.5), random_range(-0.5..0.5)])
    }
}

/// GPS that reports a fixed position (degrees/minutes sections) once it has a fix.
pub struct SimulatedGps {
    time: TimeSource,
    fix_after: Duration,
    latitude: (f64, f64, char),
    longitude: (f64, f64, char),
}

impl PositionSource for SimulatedGps {
    fn poll_fix(&mut self) -> Option<GeoFix> {
        if (self.time)() < self.fix_after {
            return None;
        }
        let (d, m, h) = self.latitude;
        let latitude = convert_coordinates(d, m, h)?;
        let (d, m, h) = self.longitude;
        let longitude = convert_coordinates(d, m, h)?;
        Some(GeoFix { latitude, longitude })
    }
}

pub fn simulated_sensors(profile: FlightProfile, time: TimeSource) -> SensorBus {
    SensorBus {
        barometer: Box::new(SimulatedBarometer { profile: profile.clone(), time: time.clone() }),
        inertial: Box::new(SimulatedImu { profile, time: time.clone() }),
        position: Box::new(SimulatedGps {
            time,
            fix_after: Duration::from_secs(2),
            latitude: (40.0, 26.767, 'N'),
            longitude: (79.0, 58.933, 'W'),
        }),
        battery: Box::new(FixedBattery(7.4)),
    }
}

// ============================================================================
// Camera
// ============================================================================

pub struct SimulatedCamera {
    name: String,
    min_bytes: usize,
    max_bytes: usize,
    /// Every n-th capture fails.
    fail_every: Option<u32>,
    captures: u32,
}

impl SimulatedCamera {
    pub fn new(name: impl Into<String>, min_bytes: usize, max_bytes: usize) -> Self {
        Self {
            name: name.into(),
            min_bytes: min_bytes.max(4),
            max_bytes: max_bytes.max(min_bytes.max(4)),
            fail_every: None,
            captures: 0,
        }
    }

    pub fn with_failures(mut self, every: u32) -> Self {
        self.fail_every = Some(every.max(1));
        self
    }
}

impl Camera for SimulatedCamera {
    fn capture(&mut self) -> Option<CapturedImage> {
        self.captures += 1;
        if let Some(every) = self.fail_every {
            if self.captures % every == 0 {
                return None;
            }
        }
        let len = random_range(self.min_bytes..=self.max_bytes);
        let mut bytes: Vec<u8> = (0..len).map(|_| rand::random::<u8>()).collect();
        // JPEG SOI / EOI markers
        bytes[0] = 0xff;
        bytes[1] = 0xd8;
        bytes[len - 2] = 0xff;
        bytes[len - 1] = 0xd9;
        Some(CapturedImage { name: self.name.clone(), bytes })
    }
}

// ============================================================================
// Drive outputs
// ============================================================================

/// Drive outputs that only log; used when no motor driver is attached.
pub struct LoggingDrive;

impl DriveOutputs for LoggingDrive {
    fn set_motors(&mut self, left: MotorDirection, right: MotorDirection) {
        info!("[Drive] motors left={:?} right={:?}", left, right);
    }

    fn set_mechanism(&mut self, mechanism: Mechanism, engaged: bool) {
        info!("[Drive] {} {}", mechanism.name(), if engaged { "engaged" } else { "released" });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveSignal {
    Motors(MotorDirection, MotorDirection),
    Mechanism(Mechanism, bool),
}

pub type DriveLog = Arc<Mutex<Vec<(Duration, DriveSignal)>>>;

/// Records every drive signal with its mission time.
pub struct RecordingDrive {
    clock: ManualClock,
    log: DriveLog,
}

impl RecordingDrive {
    pub fn new(clock: ManualClock) -> Self {
        Self { clock, log: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn log(&self) -> DriveLog {
        self.log.clone()
    }
}

impl DriveOutputs for RecordingDrive {
    fn set_motors(&mut self, left: MotorDirection, right: MotorDirection) {
        self.log.lock().push((self.clock.now(), DriveSignal::Motors(left, right)));
    }

    fn set_mechanism(&mut self, mechanism: Mechanism, engaged: bool) {
        self.log.lock().push((self.clock.now(), DriveSignal::Mechanism(mechanism, engaged)));
    }
}

// ============================================================================
// Scripted radio
// ============================================================================

#[derive(Default)]
struct RadioScript {
    /// (deliverable from this poll, bytes)
    inbound: VecDeque<(u64, Vec<u8>)>,
    polls: u64,
    sent: Vec<(Duration, String)>,
    /// bytes of a line not yet terminated
    tx: Vec<u8>,
}

/// Radio whose inbound bytes are queued by a test and whose outbound lines are
/// recorded with their mission time. Each queued chunk is delivered by one drain.
pub struct ScriptedRadio {
    clock: ManualClock,
    script: Arc<Mutex<RadioScript>>,
}

/// Test-side handle to a `ScriptedRadio`.
#[derive(Clone)]
pub struct RadioHandle {
    script: Arc<Mutex<RadioScript>>,
}

impl ScriptedRadio {
    pub fn new(clock: ManualClock) -> (Self, RadioHandle) {
        let script = Arc::new(Mutex::new(RadioScript::default()));
        (Self { clock, script: script.clone() }, RadioHandle { script })
    }
}

impl RadioHandle {
    pub fn queue(&self, bytes: &[u8]) {
        self.queue_after_polls(0, bytes);
    }

    /// Holds `bytes` back until the radio has been polled `polls` times.
    pub fn queue_after_polls(&self, polls: u64, bytes: &[u8]) {
        self.script.lock().inbound.push_back((polls, bytes.to_vec()));
    }

    pub fn polls(&self) -> u64 {
        self.script.lock().polls
    }

    pub fn sent(&self) -> Vec<(Duration, String)> {
        self.script.lock().sent.clone()
    }

    pub fn sent_lines(&self) -> Vec<String> {
        self.script.lock().sent.iter().map(|(_, l)| l.clone()).collect()
    }
}

impl RadioPort for ScriptedRadio {
    fn bytes_available(&mut self) -> io::Result<usize> {
        let mut script = self.script.lock();
        script.polls += 1;
        let polls = script.polls;
        Ok(match script.inbound.front() {
            Some((ready, bytes)) if polls >= *ready => bytes.len(),
            _ => 0,
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut script = self.script.lock();
        let polls = script.polls;
        let Some((ready, front)) = script.inbound.front_mut() else {
            return Ok(0);
        };
        if polls < *ready {
            return Ok(0);
        }
        let n = buf.len().min(front.len());
        buf[..n].copy_from_slice(&front[..n]);
        front.drain(..n);
        if front.is_empty() {
            script.inbound.pop_front();
        }
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let now = self.clock.now();
        let mut script = self.script.lock();
        script.tx.extend_from_slice(bytes);
        while let Some(end) = script.tx.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = script.tx.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line[..end]).into_owned();
            if !line.is_empty() {
                script.sent.push((now, line));
            }
        }
        Ok(bytes.len())
    }
}

/// Hardware context on simulated time: grounded sensors, no watchdog.
pub fn manual_context(
    clock: &ManualClock,
    radio: Box<dyn RadioPort>,
    drive: Box<dyn DriveOutputs>,
    camera: Box<dyn Camera>,
    config: &ControllerConfig,
) -> HardwareContext {
    HardwareContext {
        sensors: simulated_sensors(FlightProfile::grounded(), manual_time(clock)),
        radio,
        actuator: Actuator::new(drive, Duration::from_millis(config.motion.mechanism_pulse_ms)),
        camera,
        watchdog: Box::new(NoWatchdog),
        clock: Box::new(clock.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_shape() {
        let p = FlightProfile::default();
        assert_eq!(p.relative_altitude_ft(1.0), 0.0);
        assert_eq!(p.relative_altitude_ft(p.pad_s + 2.0), 50.0);
        let apex_t = p.pad_s + p.apex_ft / p.climb_fps;
        assert!((p.relative_altitude_ft(apex_t) - p.apex_ft).abs() < 1e-9);
        assert_eq!(p.relative_altitude_ft(p.touchdown_s() + 5.0), 0.0);
        assert_eq!(p.accel_g(p.touchdown_s())[2], p.impact_g);
        assert_eq!(FlightProfile::grounded().accel_g(10.0), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_gps_waits_for_fix() {
        let clock = ManualClock::new();
        let mut bus = simulated_sensors(FlightProfile::grounded(), manual_time(&clock));
        assert!(bus.position.poll_fix().is_none());
        clock.advance(Duration::from_secs(3));
        let fix = bus.position.poll_fix().unwrap();
        assert!(fix.latitude > 40.0 && fix.longitude < -79.0);
    }

    #[test]
    fn test_camera_failures_and_markers() {
        let mut camera = SimulatedCamera::new("frame.jpg", 64, 128).with_failures(3);
        let first = camera.capture().unwrap();
        assert!(first.bytes.len() >= 64 && first.bytes.len() <= 128);
        assert_eq!(&first.bytes[..2], &[0xff, 0xd8]);
        assert!(camera.capture().is_some());
        assert!(camera.capture().is_none());
    }

    #[test]
    fn test_scripted_radio_delivers_after_polls() {
        let clock = ManualClock::new();
        let (mut radio, handle) = ScriptedRadio::new(clock.clone());
        handle.queue_after_polls(2, b"CMD|STOP\n");
        assert_eq!(radio.bytes_available().unwrap(), 0);
        assert_eq!(radio.bytes_available().unwrap(), 9);
        let mut buf = [0u8; 16];
        assert_eq!(radio.read(&mut buf).unwrap(), 9);

        clock.advance(Duration::from_millis(5));
        radio.write(b"ACK|").unwrap();
        assert!(handle.sent().is_empty());
        radio.write(b"STOP\n").unwrap();
        assert_eq!(handle.sent(), vec![(Duration::from_millis(5), "ACK|STOP".to_string())]);
    }
}
