//! Metrics collection and flight event recording.
//!
//! Two independent paths:
//! - **EventRecorder:** Lock-free queue (4K capacity) → background CSV flight log.
//! - **FlightMetrics:** Shared mutex counters + bounded histories for the mission summary.
//!
//! Event tracing captures: telemetry sent → phase changes → mechanism releases →
//! commands handled → images sent → faults recovered.

use std::{
    collections::VecDeque,
    fs::File,
    io::BufWriter,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread,
    time::Duration,
};
use crossbeam_queue::ArrayQueue;
use csv::Writer;
use log::{debug, error};
use serde::Serialize;

/// One entry of the onboard flight log. Timestamps are mission-clock milliseconds.
#[derive(Debug, Clone)]
pub enum Event {
    TelemetrySent {
        ts_ms: u64,
        altitude_ft: f64,
        phase: &'static str,
    },
    PhaseChanged {
        ts_ms: u64,
        from: &'static str,
        to: &'static str,
    },
    MechanismReleased {
        ts_ms: u64,
        mechanism: &'static str,
    },
    CommandHandled {
        ts_ms: u64,
        line: String,
        outcome: &'static str,
    },
    ImageSent {
        ts_ms: u64,
        name: String,
        encoded_len: usize,
        chunks: usize,
    },
    BufferOverflow {
        ts_ms: u64,
        discarded: usize,
    },
    FaultRecovered {
        ts_ms: u64,
        fault: String,
        restart: u32,
    },
}

#[derive(Debug, Serialize)]
struct EventRow<'a> {
    seq: u64,
    ts_ms: u64,
    event: &'static str,
    detail: &'a str,
    value: f64,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::TelemetrySent { .. } => "telemetry",
            Event::PhaseChanged { .. } => "phase",
            Event::MechanismReleased { .. } => "release",
            Event::CommandHandled { .. } => "command",
            Event::ImageSent { .. } => "image",
            Event::BufferOverflow { .. } => "overflow",
            Event::FaultRecovered { .. } => "fault",
        }
    }

    /// (ts_ms, detail, value) columns of the CSV row.
    fn columns(&self) -> (u64, String, f64) {
        match self {
            Event::TelemetrySent { ts_ms, altitude_ft, phase } => (*ts_ms, phase.to_string(), *altitude_ft),
            Event::PhaseChanged { ts_ms, from, to } => (*ts_ms, format!("{}->{}", from, to), 0.0),
            Event::MechanismReleased { ts_ms, mechanism } => (*ts_ms, mechanism.to_string(), 0.0),
            Event::CommandHandled { ts_ms, line, outcome } => (*ts_ms, format!("{} {}", outcome, line), 0.0),
            Event::ImageSent { ts_ms, name, encoded_len, chunks } => {
                (*ts_ms, format!("{} chunks={}", name, chunks), *encoded_len as f64)
            }
            Event::BufferOverflow { ts_ms, discarded } => (*ts_ms, String::new(), *discarded as f64),
            Event::FaultRecovered { ts_ms, fault, restart } => (*ts_ms, fault.clone(), *restart as f64),
        }
    }
}

const EVENT_QUEUE_CAPACITY: usize = 4_096;
const EXPORTER_POLL_MS: u64 = 20;

/// Non-blocking event recorder with background CSV export.
///
/// `record()` pushes onto a lock-free queue and returns immediately; when the
/// queue is full the event is dropped and counted, the control loop never waits
/// on the log writer.
#[derive(Clone)]
pub struct EventRecorder {
    queue: Arc<ArrayQueue<Event>>,
    dropped: Arc<AtomicU64>,
    exporter_running: Arc<AtomicBool>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity)),
            dropped: Arc::new(AtomicU64::new(0)),
            exporter_running: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn record(&self, event: Event) {
        if self.queue.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Pops everything queued so far (tests and in-process inspection).
    pub fn drain(&self) -> Vec<Event> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(event) = self.queue.pop() {
            out.push(event);
        }
        out
    }

    /// Spawns the thread that drains the queue into `output_csv`.
    /// Runs until `stop_exporter` is called, then writes out whatever is left.
    pub fn start_exporter(&self, output_csv: PathBuf) -> thread::JoinHandle<()> {
        let queue = self.queue.clone();
        let running = self.exporter_running.clone();
        running.store(true, Ordering::SeqCst);

        thread::spawn(move || {
            let file = match File::create(&output_csv) {
                Ok(f) => f,
                Err(e) => {
                    error!("Failed to create flight log {:?}: {}", output_csv, e);
                    return;
                }
            };
            let mut wtr = Writer::from_writer(BufWriter::new(file));
            let mut seq: u64 = 0;

            let mut write_event = |wtr: &mut Writer<BufWriter<File>>, event: Event| {
                seq += 1;
                let (ts_ms, detail, value) = event.columns();
                let row = EventRow {
                    seq,
                    ts_ms,
                    event: event.name(),
                    detail: &detail,
                    value,
                };
                wtr.serialize(&row).ok();
            };

            while running.load(Ordering::SeqCst) {
                let mut any = false;
                while let Some(event) = queue.pop() {
                    any = true;
                    write_event(&mut wtr, event);
                }
                if any {
                    wtr.flush().ok();
                } else {
                    thread::sleep(Duration::from_millis(EXPORTER_POLL_MS));
                }
            }

            // Final drain
            while let Some(event) = queue.pop() {
                write_event(&mut wtr, event);
            }
            wtr.flush().ok();
            debug!("[EventRecorder] exporter exiting");
        })
    }

    pub fn stop_exporter(&self) {
        self.exporter_running.store(false, Ordering::SeqCst);
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Which periodic obligation overran the tick budget.
#[derive(Debug, Clone, Copy)]
pub enum DeadlineComponent {
    Commands,
    Telemetry,
    Imaging,
}

/// Mission counters and bounded histories.
#[derive(Default, Clone, Debug)]
pub struct FlightMetrics {
    pub telemetry_sent: u64,
    pub images_sent: u64,
    pub image_chunks: u64,
    pub images_skipped: u64,
    pub commands_acked: u64,
    pub commands_rejected: u64,
    pub lines_unhandled: u64,
    pub buffer_overflows: u64,
    pub restarts: u32,
    pub total_ticks: u64,

    /// Altitude of each telemetry frame (last 1000)
    pub altitude_ft: VecDeque<f64>,
    /// Tick execution time in microseconds (last 1000)
    pub tick_us: VecDeque<u64>,

    pub miss_commands: u64,
    pub miss_telemetry: u64,
    pub miss_imaging: u64,
    pub deadline_miss: u64,
    /// Telemetry slots skipped after a stall longer than one period.
    pub telemetry_resyncs: u64,

    pub last_phase: Option<&'static str>,
}

impl FlightMetrics {
    pub fn record_deadline_miss(&mut self, component: DeadlineComponent) {
        match component {
            DeadlineComponent::Commands => self.miss_commands += 1,
            DeadlineComponent::Telemetry => self.miss_telemetry += 1,
            DeadlineComponent::Imaging => self.miss_imaging += 1,
        }
        self.deadline_miss += 1;
    }
}

pub type SharedMetrics = Arc<Mutex<FlightMetrics>>;

pub fn shared_metrics() -> SharedMetrics {
    Arc::new(Mutex::new(FlightMetrics::default()))
}

/// Locks the metrics, recovering from a poisoned mutex (a panic caught by the
/// Supervisor must not take the counters down with it).
pub fn lock(metrics: &SharedMetrics) -> MutexGuard<'_, FlightMetrics> {
    match metrics.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub const MAX_POINTS: usize = 1_000;

/// Appends value to metrics buffer; removes oldest if at capacity (FIFO).
#[inline]
pub fn push_capped(buf: &mut VecDeque<f64>, val: f64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

#[inline]
pub fn push_capped_u64(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Statistics summary for a dataset.
#[derive(Debug, Clone)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

pub fn calculate_stats(data: &VecDeque<f64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}

pub fn calculate_stats_u64(data: &VecDeque<u64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().map(|&x| x as f64).fold(f64::INFINITY, f64::min);
    let max = data.iter().map(|&x| x as f64).fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().map(|&x| x as f64).sum::<f64>() / count as f64;

    Some(Stats { min, max, mean, count })
}
