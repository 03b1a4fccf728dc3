//! command.rs
//! Ground command grammar and execution.
//!
//! ```text
//! CMD|STOP
//! CMD|FORWARD 2.0, LEFT 90, BACKWARD 0.5
//! CMD|PHASE CAPTURING          (ground-test builds)
//! ```
//!
//! A line is parsed completely before anything moves. Malformed movement
//! segments are skipped and reported; the others still run.

use std::time::Duration;
use log::{info, warn};

use crate::component_a::phase::PhaseStateMachine;
#[cfg(feature = "ground-test")]
use crate::component_a::phase::FlightPhase;
use crate::component_b::actuator::{hold, Motion};
use crate::component_b::feedback::Reply;
use crate::hardware::HardwareContext;
use crate::utils::config::MotionConfig;
use crate::utils::fault::ProtocolError;

pub const COMMAND_PREFIX: &str = "CMD|";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SystemCommand {
    Stop,
    #[cfg(feature = "ground-test")]
    ForcePhase(FlightPhase),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub motion: Motion,
    /// Metres for FORWARD/BACKWARD, degrees for LEFT/RIGHT.
    pub magnitude: f64,
}

impl Segment {
    /// Drive time at the configured speed/turn rate; `None` if it does not fit a `Duration`.
    pub fn duration(&self, cfg: &MotionConfig) -> Option<Duration> {
        let rate = if self.motion.is_turn() { cfg.turn_rate_dps } else { cfg.move_speed_mps };
        Duration::try_from_secs_f64(self.magnitude / rate).ok()
    }

    fn parse(text: &str) -> Option<Segment> {
        let mut tokens = text.split_whitespace();
        let (action, value) = (tokens.next()?, tokens.next()?);
        if tokens.next().is_some() {
            return None;
        }
        let motion = Motion::parse(action)?;
        let magnitude: f64 = value.parse().ok()?;
        if !magnitude.is_finite() || magnitude < 0.0 {
            return None;
        }
        Some(Segment { motion, magnitude })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovementSequence {
    /// Trimmed command body, echoed in the ACK.
    pub body: String,
    pub segments: Vec<Segment>,
    /// Raw text of every skipped segment.
    pub rejected: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandLine {
    System(SystemCommand),
    Movement(MovementSequence),
}

impl CommandLine {
    /// `Ok(None)` when the line is not a command at all.
    pub fn parse(line: &str) -> Result<Option<CommandLine>, ProtocolError> {
        let Some(rest) = line.trim_start().strip_prefix(COMMAND_PREFIX) else {
            return Ok(None);
        };
        let body = rest.trim();
        if body.is_empty() {
            return Err(ProtocolError::Empty);
        }
        if body.eq_ignore_ascii_case("STOP") {
            return Ok(Some(CommandLine::System(SystemCommand::Stop)));
        }

        #[cfg(feature = "ground-test")]
        {
            let mut tokens = body.split_whitespace();
            if tokens.next().is_some_and(|t| t.eq_ignore_ascii_case("PHASE")) {
                let name = tokens.collect::<Vec<_>>().join(" ");
                return FlightPhase::from_name(&name)
                    .map(|p| Some(CommandLine::System(SystemCommand::ForcePhase(p))))
                    .ok_or(ProtocolError::UnknownPhase(name));
            }
        }

        let mut segments = Vec::new();
        let mut rejected = Vec::new();
        for raw in body.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match Segment::parse(raw) {
                Some(seg) => segments.push(seg),
                None => rejected.push(raw.to_string()),
            }
        }

        if segments.is_empty() {
            return Err(ProtocolError::NoValidSegments);
        }
        Ok(Some(CommandLine::Movement(MovementSequence {
            body: body.to_string(),
            segments,
            rejected,
        })))
    }
}

/// Executes parsed commands against the actuator.
pub struct CommandProcessor {
    motion: MotionConfig,
    /// Longest blocking slice between watchdog kicks.
    kick_slice: Duration,
}

impl CommandProcessor {
    pub fn new(motion: MotionConfig, kick_slice: Duration) -> Self {
        Self { motion, kick_slice }
    }

    #[cfg_attr(not(feature = "ground-test"), allow(unused_variables))]
    pub fn handle(&mut self, line: &str, ctx: &mut HardwareContext, phase: &mut PhaseStateMachine) -> Reply {
        let command = match CommandLine::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Reply::Unhandled,
            Err(e) => {
                warn!("[Command] rejected '{}': {}", line, e);
                return Reply::Err(e.reason());
            }
        };

        match command {
            CommandLine::System(SystemCommand::Stop) => {
                ctx.actuator.stop();
                info!("[Command] STOP");
                Reply::Ack("STOP".to_string())
            }
            #[cfg(feature = "ground-test")]
            CommandLine::System(SystemCommand::ForcePhase(target)) => {
                let now = ctx.clock.now();
                let outcome = phase.force_phase(target, now);
                phase.carry_out(ctx, &outcome.intents);
                Reply::Ack(format!("PHASE {}", target.name()))
            }
            CommandLine::Movement(sequence) => self.run_sequence(sequence, ctx),
        }
    }

    fn run_sequence(&mut self, sequence: MovementSequence, ctx: &mut HardwareContext) -> Reply {
        let MovementSequence { body, segments, mut rejected } = sequence;
        let pause = Duration::from_millis(self.motion.inter_command_pause_ms);

        let mut plan = Vec::with_capacity(segments.len());
        for seg in segments {
            match seg.duration(&self.motion) {
                Some(d) => plan.push((seg, d)),
                None => rejected.push(format!("{} {}", seg.motion.name(), seg.magnitude)),
            }
        }
        for raw in &rejected {
            warn!("[Command] skipping segment '{}'", raw);
        }
        if plan.is_empty() {
            return Reply::Err(ProtocolError::NoValidSegments.reason());
        }

        for (seg, drive_time) in plan {
            info!("[Command] {} {} for {:?}", seg.motion.name(), seg.magnitude, drive_time);
            ctx.kick();
            ctx.actuator.drive(seg.motion);
            hold(ctx.clock.as_mut(), ctx.watchdog.as_mut(), drive_time, self.kick_slice);
            ctx.actuator.stop();
            hold(ctx.clock.as_mut(), ctx.watchdog.as_mut(), pause, self.kick_slice);
        }

        if rejected.is_empty() {
            Reply::Ack(body)
        } else {
            Reply::Err(format!("bad_segment:{}", rejected.join(";")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(line: &str) -> MovementSequence {
        match CommandLine::parse(line) {
            Ok(Some(CommandLine::Movement(m))) => m,
            other => panic!("expected movement, got {:?}", other),
        }
    }

    #[test]
    fn test_not_a_command() {
        assert_eq!(CommandLine::parse("hello"), Ok(None));
        assert_eq!(CommandLine::parse("ACK|STOP"), Ok(None));
    }

    #[test]
    fn test_empty_and_stop() {
        assert_eq!(CommandLine::parse("CMD|"), Err(ProtocolError::Empty));
        assert_eq!(CommandLine::parse("CMD|   "), Err(ProtocolError::Empty));
        assert_eq!(
            CommandLine::parse("CMD| stop "),
            Ok(Some(CommandLine::System(SystemCommand::Stop)))
        );
    }

    #[test]
    fn test_sequence_with_bad_middle_segment() {
        let m = movement("CMD|FORWARD 2.0, LEFT abc, forward 1.5");
        assert_eq!(m.body, "FORWARD 2.0, LEFT abc, forward 1.5");
        assert_eq!(
            m.segments,
            vec![
                Segment { motion: Motion::Forward, magnitude: 2.0 },
                Segment { motion: Motion::Forward, magnitude: 1.5 },
            ]
        );
        assert_eq!(m.rejected, vec!["LEFT abc".to_string()]);
    }

    #[test]
    fn test_segment_rules() {
        let m = movement("CMD|RIGHT 45,, JUMP 3, LEFT -1, BACKWARD inf, LEFT 1 2, LEFT");
        assert_eq!(m.segments, vec![Segment { motion: Motion::Right, magnitude: 45.0 }]);
        assert_eq!(m.rejected.len(), 5);
        assert_eq!(CommandLine::parse("CMD|SPIN 3"), Err(ProtocolError::NoValidSegments));
    }

    #[test]
    fn test_segment_duration() {
        let cfg = MotionConfig::default();
        let fwd = Segment { motion: Motion::Forward, magnitude: 2.0 };
        let left = Segment { motion: Motion::Left, magnitude: 90.0 };
        assert_eq!(fwd.duration(&cfg), Some(Duration::from_secs(4)));
        assert_eq!(left.duration(&cfg), Some(Duration::from_secs(1)));
        let huge = Segment { motion: Motion::Forward, magnitude: 1e300 };
        assert_eq!(huge.duration(&cfg), None);
    }

    #[cfg(feature = "ground-test")]
    #[test]
    fn test_phase_override_parse() {
        assert_eq!(
            CommandLine::parse("CMD|PHASE capturing"),
            Ok(Some(CommandLine::System(SystemCommand::ForcePhase(FlightPhase::Capturing))))
        );
        assert_eq!(
            CommandLine::parse("CMD|PHASE ORBIT"),
            Err(ProtocolError::UnknownPhase("ORBIT".into()))
        );
    }
}
