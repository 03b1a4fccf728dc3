//! actuator.rs
//! Turns movement steps and release intents into drive signals.
//!
//! - Drive: two-motor skid steering (FORWARD/BACKWARD/LEFT/RIGHT).
//! - Release: one pulse per mechanism (engage, hold, disengage).
//! - `stop()` is idempotent: it always writes both motors off.

use std::time::Duration;
use log::{debug, info};

use crate::hardware::{DriveOutputs, Mechanism, MotorDirection, Watchdog};
use crate::utils::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Forward,
    Backward,
    Left,
    Right,
}

impl Motion {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "FORWARD" => Some(Motion::Forward),
            "BACKWARD" => Some(Motion::Backward),
            "LEFT" => Some(Motion::Left),
            "RIGHT" => Some(Motion::Right),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Motion::Forward => "FORWARD",
            Motion::Backward => "BACKWARD",
            Motion::Left => "LEFT",
            Motion::Right => "RIGHT",
        }
    }

    /// Distance moves (metres) vs. turns (degrees).
    pub fn is_turn(&self) -> bool {
        matches!(self, Motion::Left | Motion::Right)
    }

    /// (left, right) motor directions.
    pub fn wheels(&self) -> (MotorDirection, MotorDirection) {
        match self {
            Motion::Forward => (MotorDirection::Forward, MotorDirection::Forward),
            Motion::Backward => (MotorDirection::Backward, MotorDirection::Backward),
            Motion::Left => (MotorDirection::Off, MotorDirection::Forward),
            Motion::Right => (MotorDirection::Forward, MotorDirection::Off),
        }
    }
}

pub struct Actuator {
    outputs: Box<dyn DriveOutputs>,
    motion: Option<Motion>,
    pulse: Duration,
}

impl Actuator {
    pub fn new(outputs: Box<dyn DriveOutputs>, pulse: Duration) -> Self {
        Self {
            outputs,
            motion: None,
            pulse,
        }
    }

    pub fn drive(&mut self, motion: Motion) {
        let (left, right) = motion.wheels();
        self.outputs.set_motors(left, right);
        self.motion = Some(motion);
        debug!("[Actuator] drive {}", motion.name());
    }

    /// Both motors off. Returns whether anything was moving.
    pub fn stop(&mut self) -> bool {
        self.outputs.set_motors(MotorDirection::Off, MotorDirection::Off);
        let was_moving = self.motion.take().is_some();
        if was_moving {
            debug!("[Actuator] stop");
        }
        was_moving
    }

    pub fn motion(&self) -> Option<Motion> {
        self.motion
    }

    /// Fires one release pulse. Blocks for the pulse length, kicking the
    /// watchdog before and after.
    pub fn release(&mut self, mechanism: Mechanism, clock: &mut dyn Clock, watchdog: &mut dyn Watchdog) {
        info!("[Actuator] releasing {}", mechanism.name());
        watchdog.kick();
        self.outputs.set_mechanism(mechanism, true);
        clock.sleep(self.pulse);
        self.outputs.set_mechanism(mechanism, false);
        watchdog.kick();
    }
}

/// Blocks for `total`, in slices no longer than `slice`, kicking the watchdog
/// between slices so a long drive step cannot starve it.
pub fn hold(clock: &mut dyn Clock, watchdog: &mut dyn Watchdog, total: Duration, slice: Duration) {
    let slice = if slice.is_zero() { total } else { slice };
    let mut remaining = total;
    while !remaining.is_zero() {
        let step = remaining.min(slice);
        clock.sleep(step);
        watchdog.kick();
        remaining -= step;
    }
}
