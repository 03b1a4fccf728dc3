//! phase.rs
//! Flight/recovery phase machine.
//!
//! Descending → Landed → LatchReleasing → LatchReleased → ArmActive →
//! InstrumentReleased → Capturing
//!
//! - Landing: `stable_count_target` consecutive stable samples below the
//!   landing threshold, or at once on an acceleration spike.
//! - Each release waits for the previous mechanism's completion flag plus a
//!   settle delay measured from that completion.
//! - Stale sensor fields are never evidence for a transition.

use std::time::Duration;
use log::{info, warn};
use serde::Serialize;

use crate::component_a::sensor::SensorSample;
use crate::hardware::{HardwareContext, Mechanism};
use crate::utils::config::PhaseConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FlightPhase {
    Descending,
    Landed,
    LatchReleasing,
    LatchReleased,
    ArmActive,
    InstrumentReleased,
    Capturing,
}

impl FlightPhase {
    pub const ALL: [FlightPhase; 7] = [
        FlightPhase::Descending,
        FlightPhase::Landed,
        FlightPhase::LatchReleasing,
        FlightPhase::LatchReleased,
        FlightPhase::ArmActive,
        FlightPhase::InstrumentReleased,
        FlightPhase::Capturing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FlightPhase::Descending => "DESCENDING",
            FlightPhase::Landed => "LANDED",
            FlightPhase::LatchReleasing => "LATCH_RELEASING",
            FlightPhase::LatchReleased => "LATCH_RELEASED",
            FlightPhase::ArmActive => "ARM_ACTIVE",
            FlightPhase::InstrumentReleased => "INSTRUMENT_RELEASED",
            FlightPhase::Capturing => "CAPTURING",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        Self::ALL.iter().copied().find(|p| p.name() == upper)
    }
}

/// Mission flags mirrored into every telemetry line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub launched: bool,
    pub target_altitude_reached: bool,
    pub latch_released: bool,
    pub arm_released: bool,
    pub instrument_released: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationIntent {
    StopDrive,
    Release(Mechanism),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: FlightPhase,
    pub to: FlightPhase,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub transition: Option<Transition>,
    pub intents: Vec<ActuationIntent>,
}

pub struct PhaseStateMachine {
    cfg: PhaseConfig,
    phase: FlightPhase,
    state: DeviceState,
    /// Baseline-relative altitude of the last fresh sample.
    prev_altitude_ft: f64,
    stable_count: u32,
    /// Start of the current settle window.
    settle_from: Duration,
    parachute_fired: bool,
}

impl PhaseStateMachine {
    pub fn new(cfg: PhaseConfig, now: Duration) -> Self {
        Self {
            cfg,
            phase: FlightPhase::Descending,
            state: DeviceState::default(),
            prev_altitude_ft: 0.0,
            stable_count: 0,
            settle_from: now,
            parachute_fired: false,
        }
    }

    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn stable_count(&self) -> u32 {
        self.stable_count
    }

    fn enter(&mut self, to: FlightPhase, now: Duration) -> Transition {
        let from = self.phase;
        self.phase = to;
        self.settle_from = now;
        info!("[Phase] {} -> {}", from.name(), to.name());
        Transition { from, to }
    }

    fn settled(&self, now: Duration, settle_ms: u64) -> bool {
        now.saturating_sub(self.settle_from) >= Duration::from_millis(settle_ms)
    }

    /// Advances the machine with one sample. At most one transition per call.
    pub fn step(&mut self, sample: &SensorSample, now: Duration) -> StepOutcome {
        let mut out = StepOutcome::default();

        match self.phase {
            FlightPhase::Descending => {
                if sample.fresh.altitude {
                    let alt = sample.altitude_ft;
                    if alt >= self.cfg.launch_alt_ft && !self.state.launched {
                        self.state.launched = true;
                        info!("[Phase] launched at {:.1} ft", alt);
                    }
                    if alt >= self.cfg.target_alt_ft && !self.state.target_altitude_reached {
                        self.state.target_altitude_reached = true;
                        info!("[Phase] target altitude reached at {:.1} ft", alt);
                    }
                    if let Some(deploy_ft) = self.cfg.parachute_deploy_alt_ft {
                        if self.state.target_altitude_reached && !self.parachute_fired && alt < deploy_ft {
                            self.parachute_fired = true;
                            out.intents.push(ActuationIntent::Release(Mechanism::Parachute));
                        }
                    }
                }

                // on the pad the payload is low and still, which is not a landing
                let armed = self.state.launched || !self.cfg.landing_requires_launch;
                let impact = armed
                    && sample.fresh.accel
                    && sample.accel_magnitude() > self.cfg.landing_accel_thresh_g;

                if sample.fresh.altitude {
                    let alt = sample.altitude_ft;
                    let stable = armed
                        && (alt - self.prev_altitude_ft).abs() < self.cfg.landing_delta_ft
                        && alt < self.cfg.landing_alt_thresh_ft;
                    self.stable_count = if stable { self.stable_count + 1 } else { 0 };
                    self.prev_altitude_ft = alt;
                }

                if impact || self.stable_count >= self.cfg.stable_count_target {
                    if impact {
                        info!("[Phase] impact {:.2} g", sample.accel_magnitude());
                    }
                    out.transition = Some(self.enter(FlightPhase::Landed, now));
                    out.intents.push(ActuationIntent::StopDrive);
                }
            }
            FlightPhase::Landed => {
                if self.settled(now, self.cfg.latch_settle_ms) {
                    out.transition = Some(self.enter(FlightPhase::LatchReleasing, now));
                    out.intents.push(ActuationIntent::Release(Mechanism::Latch));
                }
            }
            FlightPhase::LatchReleasing => {}
            FlightPhase::LatchReleased => {
                if self.state.latch_released && self.settled(now, self.cfg.arm_settle_ms) {
                    out.transition = Some(self.enter(FlightPhase::ArmActive, now));
                    out.intents.push(ActuationIntent::Release(Mechanism::Arm));
                }
            }
            FlightPhase::ArmActive => {
                if self.state.arm_released && self.settled(now, self.cfg.instrument_settle_ms) {
                    out.transition = Some(self.enter(FlightPhase::InstrumentReleased, now));
                    out.intents.push(ActuationIntent::Release(Mechanism::Instrument));
                }
            }
            FlightPhase::InstrumentReleased => {
                if self.state.instrument_released && self.settled(now, self.cfg.capture_settle_ms) {
                    out.transition = Some(self.enter(FlightPhase::Capturing, now));
                }
            }
            FlightPhase::Capturing => {}
        }

        out
    }

    /// Completion report from the actuator after a release pulse.
    pub fn mechanism_released(&mut self, mechanism: Mechanism, now: Duration) -> Option<Transition> {
        match (mechanism, self.phase) {
            (Mechanism::Latch, FlightPhase::LatchReleasing) => {
                self.state.latch_released = true;
                Some(self.enter(FlightPhase::LatchReleased, now))
            }
            (Mechanism::Arm, FlightPhase::ArmActive) => {
                self.state.arm_released = true;
                self.settle_from = now;
                None
            }
            (Mechanism::Instrument, FlightPhase::InstrumentReleased) => {
                self.state.instrument_released = true;
                self.settle_from = now;
                None
            }
            (Mechanism::Parachute, _) => None,
            (m, phase) => {
                warn!("[Phase] {} release reported in {}", m.name(), phase.name());
                None
            }
        }
    }

    /// Executes intents against the hardware and feeds completions back.
    /// Returns the mechanisms that fired and any transition they caused.
    pub fn carry_out(
        &mut self,
        ctx: &mut HardwareContext,
        intents: &[ActuationIntent],
    ) -> (Vec<Mechanism>, Vec<Transition>) {
        let mut released = Vec::new();
        let mut transitions = Vec::new();
        for intent in intents {
            match *intent {
                ActuationIntent::StopDrive => {
                    ctx.actuator.stop();
                }
                ActuationIntent::Release(mechanism) => {
                    ctx.actuator.release(mechanism, ctx.clock.as_mut(), ctx.watchdog.as_mut());
                    released.push(mechanism);
                    let now = ctx.clock.now();
                    if let Some(t) = self.mechanism_released(mechanism, now) {
                        transitions.push(t);
                    }
                }
            }
        }
        (released, transitions)
    }

    /// Ground-test override: jumps straight to `target`. Flags of later stages
    /// are cleared; the entry intent of the target phase is re-issued.
    #[cfg(feature = "ground-test")]
    pub fn force_phase(&mut self, target: FlightPhase, now: Duration) -> StepOutcome {
        warn!("[Phase] forced {} -> {}", self.phase.name(), target.name());
        if target >= FlightPhase::Landed {
            self.state.launched = true;
            self.state.target_altitude_reached = true;
        }
        self.state.latch_released = target >= FlightPhase::LatchReleased;
        self.state.arm_released = target >= FlightPhase::InstrumentReleased;
        self.state.instrument_released = target >= FlightPhase::Capturing;
        self.stable_count = 0;
        self.prev_altitude_ft = 0.0;

        let transition = Some(self.enter(target, now));
        let intents = match target {
            FlightPhase::Landed => vec![ActuationIntent::StopDrive],
            FlightPhase::LatchReleasing => vec![ActuationIntent::Release(Mechanism::Latch)],
            FlightPhase::ArmActive => vec![ActuationIntent::Release(Mechanism::Arm)],
            FlightPhase::InstrumentReleased => vec![ActuationIntent::Release(Mechanism::Instrument)],
            _ => Vec::new(),
        };
        StepOutcome { transition, intents }
    }
}
