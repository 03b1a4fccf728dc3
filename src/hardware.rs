//! hardware.rs
//! Boundary between the controller core and the physical payload.
//!
//! Drivers (barometer, IMU, GPS parser, camera, UART, motor pins) live outside
//! the core and are reached only through these traits. Every handle is owned by
//! a single `HardwareContext`, built once at startup and lent to each component
//! for the duration of a call; it outlives Supervisor restarts.

use std::io;

use crate::component_b::actuator::Actuator;
use crate::utils::clock::Clock;

/// Decoded barometer readings.
pub trait Barometer: Send {
    /// Static pressure in pascals.
    fn pressure_pa(&mut self) -> Option<f64>;
    fn temperature_c(&mut self) -> Option<f64>;
}

/// Decoded inertial readings.
pub trait InertialSensor: Send {
    /// Acceleration in g, body frame.
    fn accel_g(&mut self) -> Option<[f64; 3]>;
    /// Angular rate in deg/s.
    fn gyro_dps(&mut self) -> Option<[f64; 3]>;
}

/// GPS fix in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// Position source. `poll_fix` consumes whatever bytes the receiver has
/// buffered and returns the latest fix; it must never block.
pub trait PositionSource: Send {
    fn poll_fix(&mut self) -> Option<GeoFix>;
}

pub trait BatteryMonitor: Send {
    fn voltage(&mut self) -> Option<f64>;
}

/// Fixed reading for boards without a voltage divider on an ADC pin.
pub struct FixedBattery(pub f64);

impl BatteryMonitor for FixedBattery {
    fn voltage(&mut self) -> Option<f64> {
        Some(self.0)
    }
}

/// Half-duplex radio UART.
pub trait RadioPort: Send {
    /// Bytes that can be read right now without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Writes a prefix of `bytes` and returns its length. A full transmit
    /// buffer shows up as `TimedOut`/`WouldBlock` or a short count.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorDirection {
    Off,
    Forward,
    Backward,
}

/// Release mechanisms, in the order they normally fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    Parachute,
    Latch,
    Arm,
    Instrument,
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::Parachute => "parachute",
            Mechanism::Latch => "latch",
            Mechanism::Arm => "arm",
            Mechanism::Instrument => "instrument",
        }
    }
}

/// Motor H-bridges and mechanism drivers.
pub trait DriveOutputs: Send {
    fn set_motors(&mut self, left: MotorDirection, right: MotorDirection);
    fn set_mechanism(&mut self, mechanism: Mechanism, engaged: bool);
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub trait Camera: Send {
    /// Returns `None` when no frame is available.
    fn capture(&mut self) -> Option<CapturedImage>;
}

/// Independent timer that restarts the device unless kicked in time.
pub trait Watchdog: Send {
    fn kick(&mut self);
}

/// Watchdog that never fires; for bench setups without one.
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn kick(&mut self) {}
}

/// The three sensor capabilities plus battery, polled together by `SensorSnapshot`.
pub struct SensorBus {
    pub barometer: Box<dyn Barometer>,
    pub inertial: Box<dyn InertialSensor>,
    pub position: Box<dyn PositionSource>,
    pub battery: Box<dyn BatteryMonitor>,
}

/// Every hardware handle the controller touches.
pub struct HardwareContext {
    pub sensors: SensorBus,
    pub radio: Box<dyn RadioPort>,
    pub actuator: Actuator,
    pub camera: Box<dyn Camera>,
    pub watchdog: Box<dyn Watchdog>,
    pub clock: Box<dyn Clock>,
}

impl HardwareContext {
    #[inline]
    pub fn kick(&mut self) {
        self.watchdog.kick();
    }
}
