//! supervisor.rs
//! Cooperative control loop and its crash-recovery wrapper.
//!
//! Scheduler tick:
//! 1. kick watchdog
//! 2. drain + dispatch ground commands
//! 3. telemetry slot: sample → phase step → actuation → JSON line
//! 4. image slot: one framed image, commands serviced between chunks
//! 5. yield
//!
//! Supervisor: runs a freshly calibrated Scheduler until it faults (error or
//! panic), reports `ERR|fault:<desc>` best-effort, stops the drive, waits the
//! settle delay and starts over. Returns only when `running` is cleared.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use log::{error, info, warn};

use crate::component_a::{
    imaging::ImageStreamer,
    phase::{FlightPhase, PhaseStateMachine, Transition},
    sensor::SensorSnapshot,
    transmitter::TelemetryFrame,
};
use crate::component_b::{
    radio::{RadioCodec, RadioFrame},
    receiver::CommandService,
};
use crate::hardware::HardwareContext;
use crate::utils::{
    clock::PeriodicTimer,
    config::ControllerConfig,
    fault::Fault,
    metrics::{lock, push_capped, push_capped_u64, DeadlineComponent, Event, EventRecorder, SharedMetrics},
};

/// Inner loop state. Everything here is rebuilt on restart.
pub struct Scheduler {
    config: ControllerConfig,
    snapshot: SensorSnapshot,
    phase: PhaseStateMachine,
    service: CommandService,
    imaging: ImageStreamer,
    telemetry_timer: PeriodicTimer,
    image_timer: PeriodicTimer,
    last_phase: FlightPhase,
    metrics: SharedMetrics,
    event_recorder: EventRecorder,
}

fn ts_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl Scheduler {
    /// Calibrates the baseline and builds fresh mission state.
    pub fn start(
        config: &ControllerConfig,
        ctx: &mut HardwareContext,
        metrics: SharedMetrics,
        event_recorder: EventRecorder,
    ) -> Result<Self, Fault> {
        let snapshot = SensorSnapshot::calibrate(
            &mut ctx.sensors,
            ctx.clock.as_mut(),
            ctx.watchdog.as_mut(),
            &config.sensors,
        )?;
        let now = ctx.clock.now();
        let phase = PhaseStateMachine::new(config.phase.clone(), now);
        info!("[Scheduler] started at {:?}, phase {}", now, phase.phase().name());

        Ok(Self {
            config: config.clone(),
            snapshot,
            phase,
            service: CommandService::new(config, metrics.clone(), event_recorder.clone()),
            imaging: ImageStreamer::new(config.imaging.clone()),
            // first telemetry frame on the first tick
            telemetry_timer: PeriodicTimer::starting_at(config.schedule.telemetry_period(), now),
            image_timer: PeriodicTimer::starting_at(
                config.schedule.image_period(),
                now + config.schedule.image_period(),
            ),
            last_phase: FlightPhase::Descending,
            metrics,
            event_recorder,
        })
    }

    pub fn phase(&self) -> &PhaseStateMachine {
        &self.phase
    }

    pub fn snapshot(&self) -> &SensorSnapshot {
        &self.snapshot
    }

    fn note_transition(&mut self, t: Transition, now: Duration) {
        self.event_recorder.record(Event::PhaseChanged {
            ts_ms: ts_ms(now),
            from: t.from.name(),
            to: t.to.name(),
        });
        lock(&self.metrics).last_phase = Some(t.to.name());
        self.last_phase = t.to;
    }

    /// Picks up phase changes made outside `step`, e.g. a ground override.
    fn note_phase(&mut self, now: Duration) {
        let current = self.phase.phase();
        if current != self.last_phase {
            self.note_transition(Transition { from: self.last_phase, to: current }, now);
        }
    }

    fn telemetry_slot(&mut self, ctx: &mut HardwareContext, now: Duration) -> Result<(), Fault> {
        let sample = self.snapshot.poll(&mut ctx.sensors, now);
        let outcome = self.phase.step(&sample, now);
        if let Some(t) = outcome.transition {
            self.note_transition(t, now);
        }

        let (released, transitions) = self.phase.carry_out(ctx, &outcome.intents);
        let after = ctx.clock.now();
        for mechanism in released {
            self.event_recorder.record(Event::MechanismReleased {
                ts_ms: ts_ms(after),
                mechanism: mechanism.name(),
            });
        }
        for t in transitions {
            self.note_transition(t, after);
        }

        let frame = TelemetryFrame::new(&sample, self.phase.phase(), self.phase.state());
        match frame.to_frame() {
            Ok(line) => {
                self.service.send(ctx, &line)?;
                {
                    let mut m = lock(&self.metrics);
                    m.telemetry_sent += 1;
                    push_capped(&mut m.altitude_ft, sample.altitude_ft);
                }
                self.event_recorder.record(Event::TelemetrySent {
                    ts_ms: ts_ms(now),
                    altitude_ft: sample.altitude_ft,
                    phase: self.phase.phase().name(),
                });
            }
            Err(e) => warn!("[Scheduler] telemetry encode failed: {}", e),
        }
        Ok(())
    }

    fn image_slot(&mut self, ctx: &mut HardwareContext) -> Result<(), Fault> {
        if self.config.imaging.capturing_only && self.phase.phase() != FlightPhase::Capturing {
            return Ok(());
        }
        match self.imaging.send_frame(ctx, &mut self.service, &mut self.phase)? {
            Some(report) => {
                {
                    let mut m = lock(&self.metrics);
                    m.images_sent += 1;
                    m.image_chunks += report.chunks as u64;
                }
                self.event_recorder.record(Event::ImageSent {
                    ts_ms: ts_ms(ctx.clock.now()),
                    name: report.name,
                    encoded_len: report.encoded_len,
                    chunks: report.chunks,
                });
            }
            None => lock(&self.metrics).images_skipped += 1,
        }
        Ok(())
    }

    /// One pass of the loop.
    pub fn tick(&mut self, ctx: &mut HardwareContext) -> Result<(), Fault> {
        let tick_start = ctx.clock.now();
        ctx.kick();

        self.service.service(ctx, &mut self.phase)?;
        let after_commands = ctx.clock.now();
        self.note_phase(after_commands);

        if self.telemetry_timer.due(after_commands) {
            self.telemetry_slot(ctx, after_commands)?;
        }
        let after_telemetry = ctx.clock.now();

        if self.image_timer.due(after_telemetry) {
            self.image_slot(ctx)?;
        }
        let tick_end = ctx.clock.now();
        self.note_phase(tick_end);

        let sections = [
            (DeadlineComponent::Commands, after_commands - tick_start),
            (DeadlineComponent::Telemetry, after_telemetry - after_commands),
            (DeadlineComponent::Imaging, tick_end - after_telemetry),
        ];
        let elapsed = tick_end - tick_start;
        {
            let mut m = lock(&self.metrics);
            m.total_ticks += 1;
            m.telemetry_resyncs = self.telemetry_timer.missed();
            push_capped_u64(&mut m.tick_us, elapsed.as_micros() as u64);
            if elapsed > self.config.schedule.tick_budget() {
                if let Some((component, _)) = sections.iter().max_by_key(|(_, d)| *d) {
                    m.record_deadline_miss(*component);
                }
            }
        }

        ctx.clock.sleep(self.config.schedule.yield_interval());
        Ok(())
    }

    /// Ticks until `running` clears or a fault ends the run.
    pub fn run(&mut self, ctx: &mut HardwareContext, running: &AtomicBool) -> Result<(), Fault> {
        while running.load(Ordering::SeqCst) {
            self.tick(ctx)?;
        }
        info!("[Scheduler] stopped, phase {}", self.phase.phase().name());
        Ok(())
    }
}

/// Restart loop around the Scheduler.
pub struct Supervisor {
    config: ControllerConfig,
    metrics: SharedMetrics,
    event_recorder: EventRecorder,
    restarts: u32,
}

impl Supervisor {
    pub fn new(config: ControllerConfig, metrics: SharedMetrics, event_recorder: EventRecorder) -> Self {
        Self { config, metrics, event_recorder, restarts: 0 }
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Runs until `running` is cleared. Returns the number of restarts.
    pub fn supervise(&mut self, ctx: &mut HardwareContext, running: &AtomicBool) -> u32 {
        while running.load(Ordering::SeqCst) {
            let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<(), Fault> {
                let mut scheduler =
                    Scheduler::start(&self.config, ctx, self.metrics.clone(), self.event_recorder.clone())?;
                scheduler.run(ctx, running)
            }));

            let fault = match outcome {
                Ok(Ok(())) => break,
                Ok(Err(fault)) => fault,
                Err(payload) => Fault::from_panic(payload),
            };
            self.recover(ctx, &fault);
        }
        self.restarts
    }

    fn recover(&mut self, ctx: &mut HardwareContext, fault: &Fault) {
        error!("[Supervisor] loop fault: {}", fault);

        // fresh codec: the faulted one may hold a half-read line, and the
        // fault may have cut a frame short on the wire
        let mut codec = RadioCodec::resuming(self.config.link.max_pending_bytes);
        let report = RadioFrame::Err(format!("fault:{}", fault));
        if let Err(e) = codec.send(ctx.radio.as_mut(), ctx.watchdog.as_mut(), &report) {
            warn!("[Supervisor] fault report not sent: {}", e);
        }

        ctx.actuator.stop();
        ctx.kick();
        ctx.clock.sleep(self.config.schedule.restart_settle());

        self.restarts += 1;
        lock(&self.metrics).restarts = self.restarts;
        self.event_recorder.record(Event::FaultRecovered {
            ts_ms: ts_ms(ctx.clock.now()),
            fault: fault.to_string(),
            restart: self.restarts,
        });
        info!("[Supervisor] restart #{}", self.restarts);
    }
}
