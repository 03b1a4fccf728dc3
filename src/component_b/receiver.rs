//! receiver.rs
//! Drain-and-dispatch bridge: radio → CommandProcessor → Actuator → reply.
//! - called once per scheduler tick and between image chunks
//! - lines are handled in receive order, each reply is sent before the next line runs
//! - owns the RadioCodec, so every outbound frame goes through here

use log::{debug, warn};

use crate::component_a::phase::PhaseStateMachine;
use crate::component_b::{
    command::CommandProcessor,
    feedback::Reply,
    radio::{Inbound, RadioCodec, RadioFrame},
};
use crate::hardware::HardwareContext;
use crate::utils::config::ControllerConfig;
use crate::utils::fault::{Fault, ProtocolError};
use crate::utils::metrics::{lock, Event, EventRecorder, SharedMetrics};

pub struct CommandService {
    codec: RadioCodec,
    processor: CommandProcessor,
    metrics: SharedMetrics,
    event_recorder: EventRecorder,
}

impl CommandService {
    pub fn new(config: &ControllerConfig, metrics: SharedMetrics, event_recorder: EventRecorder) -> Self {
        Self {
            codec: RadioCodec::new(config.link.max_pending_bytes),
            processor: CommandProcessor::new(config.motion.clone(), config.watchdog.kick_interval()),
            metrics,
            event_recorder,
        }
    }

    /// Handles every complete line received so far. Returns how many lines were handled.
    pub fn service(&mut self, ctx: &mut HardwareContext, phase: &mut PhaseStateMachine) -> Result<usize, Fault> {
        let inbound = self.codec.drain(ctx.radio.as_mut())?;
        let mut handled = 0;

        for item in inbound {
            match item {
                Inbound::Line(line) => {
                    debug!("[Receiver] RX line: {}", line);
                    let reply = self.processor.handle(&line, ctx, phase);
                    if let Some(frame) = reply.frame() {
                        self.codec.send(ctx.radio.as_mut(), ctx.watchdog.as_mut(), &frame)?;
                    }
                    {
                        let mut m = lock(&self.metrics);
                        match reply {
                            Reply::Ack(_) => m.commands_acked += 1,
                            Reply::Err(_) => m.commands_rejected += 1,
                            Reply::Unhandled => m.lines_unhandled += 1,
                        }
                    }
                    self.event_recorder.record(Event::CommandHandled {
                        ts_ms: ctx.clock.now().as_millis() as u64,
                        line,
                        outcome: reply.outcome(),
                    });
                    handled += 1;
                }
                Inbound::Overflow { discarded } => {
                    warn!("[Receiver] command buffer overflow, {} bytes discarded", discarded);
                    let reason = ProtocolError::Overflow { discarded }.reason();
                    self.codec.send(ctx.radio.as_mut(), ctx.watchdog.as_mut(), &RadioFrame::Err(reason))?;
                    lock(&self.metrics).buffer_overflows += 1;
                    self.event_recorder.record(Event::BufferOverflow {
                        ts_ms: ctx.clock.now().as_millis() as u64,
                        discarded,
                    });
                }
            }
        }

        Ok(handled)
    }

    pub fn send(&mut self, ctx: &mut HardwareContext, frame: &RadioFrame) -> Result<(), Fault> {
        self.codec.send(ctx.radio.as_mut(), ctx.watchdog.as_mut(), frame)
    }
}
