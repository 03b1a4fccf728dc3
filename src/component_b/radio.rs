//! radio.rs
//! Newline-framed line protocol over the half-duplex radio UART.
//! - RX: non-blocking drain into a capped pending buffer, split at `\n`, partial tail kept
//! - TX: a frame is written to completion, kicking the watchdog while the UART is full;
//!   a frame cut short is terminated before the next one goes out
//! - Timeouts/WouldBlock are absorbed; any other I/O error is a `Fault::Radio`

use std::{fmt, io};
use log::{debug, warn};

use crate::hardware::{RadioPort, Watchdog};
use crate::utils::fault::Fault;

const READ_CHUNK: usize = 256;
/// Consecutive stalled writes before a frame is abandoned (about 1 s on a 10 ms UART timeout).
const MAX_TX_STALLS: u32 = 100;

/// Every line that crosses the link, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioFrame {
    /// JSON telemetry object.
    Telemetry(String),
    ImageHeader { name: String, length: usize },
    ImageStart,
    ImageChunk(String),
    ImageEnd,
    Ack(String),
    Err(String),
    /// Body of a `CMD|` line.
    Command(String),
}

impl fmt::Display for RadioFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioFrame::Telemetry(json) => write!(f, "{}", json),
            RadioFrame::ImageHeader { name, length } => write!(f, "IMG|{}|{}", name, length),
            RadioFrame::ImageStart => write!(f, "IMG_START"),
            RadioFrame::ImageChunk(chunk) => write!(f, "{}", chunk),
            RadioFrame::ImageEnd => write!(f, "IMG_END"),
            RadioFrame::Ack(echo) => write!(f, "ACK|{}", echo),
            RadioFrame::Err(reason) => write!(f, "ERR|{}", reason),
            RadioFrame::Command(body) => write!(f, "CMD|{}", body),
        }
    }
}

impl RadioFrame {
    /// Parses a received line back into a frame. Anything unrecognised is
    /// treated as an image chunk, which is the only untagged line type.
    pub fn classify(line: &str) -> RadioFrame {
        let line = line.trim_end_matches(['\r', '\n']);
        match line {
            "IMG_START" => return RadioFrame::ImageStart,
            "IMG_END" => return RadioFrame::ImageEnd,
            _ => {}
        }
        if let Some(rest) = line.strip_prefix("IMG|") {
            if let Some((name, len)) = rest.rsplit_once('|') {
                if let Ok(length) = len.trim().parse::<usize>() {
                    return RadioFrame::ImageHeader { name: name.to_string(), length };
                }
            }
        }
        if let Some(echo) = line.strip_prefix("ACK|") {
            return RadioFrame::Ack(echo.to_string());
        }
        if let Some(reason) = line.strip_prefix("ERR|") {
            return RadioFrame::Err(reason.to_string());
        }
        if let Some(body) = line.strip_prefix("CMD|") {
            return RadioFrame::Command(body.to_string());
        }
        if line.starts_with('{') {
            return RadioFrame::Telemetry(line.to_string());
        }
        RadioFrame::ImageChunk(line.to_string())
    }

    /// Wire bytes: the rendered frame with embedded line breaks flattened, plus `\n`.
    pub fn to_line(&self) -> String {
        let mut line: String = self
            .to_string()
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        line.push('\n');
        line
    }
}

/// What one drain produced, in receive order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    /// A line outgrew the buffer cap and was dropped. Reported when its
    /// terminating `\n` arrives; `discarded` counts every byte of it.
    Overflow { discarded: usize },
}

/// Partial-line reassembly. Holds at most one newline-less tail.
#[derive(Debug)]
pub struct PendingCommandBuffer {
    pending: Vec<u8>,
    cap: usize,
    /// Dropping the rest of an oversized line.
    discarding: bool,
    discarded: usize,
}

impl PendingCommandBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            pending: Vec::with_capacity(cap.min(4_096)),
            cap,
            discarding: false,
            discarded: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Appends received bytes and returns every line they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Inbound> {
        let mut out = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    out.push(Inbound::Overflow { discarded: self.discarded });
                    self.discarded = 0;
                } else if let Some(line) = decode_line(&self.pending) {
                    out.push(Inbound::Line(line));
                }
                self.pending.clear();
                continue;
            }
            if self.discarding {
                self.discarded += 1;
                continue;
            }
            if self.pending.len() >= self.cap {
                self.discarded = self.pending.len() + 1;
                self.pending.clear();
                self.discarding = true;
                continue;
            }
            self.pending.push(b);
        }
        out
    }
}

/// Lossy line decode: invalid UTF-8 and `\r` are dropped, blank lines ignored.
fn decode_line(raw: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(raw)
        .chars()
        .filter(|&c| c != '\r' && c != char::REPLACEMENT_CHARACTER)
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Owns the inbound buffer; the only writer of the radio.
pub struct RadioCodec {
    buffer: PendingCommandBuffer,
    scratch: [u8; READ_CHUNK],
    /// The last frame was cut short; the wire is mid-line.
    line_open: bool,
}

impl RadioCodec {
    pub fn new(max_pending_bytes: usize) -> Self {
        Self {
            buffer: PendingCommandBuffer::new(max_pending_bytes),
            scratch: [0; READ_CHUNK],
            line_open: false,
        }
    }

    /// Codec taking over a link in an unknown state (after a loop fault):
    /// its first frame starts on a fresh line.
    pub fn resuming(max_pending_bytes: usize) -> Self {
        Self { line_open: true, ..Self::new(max_pending_bytes) }
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Reads what is available right now. Never waits for more.
    pub fn drain(&mut self, port: &mut dyn RadioPort) -> Result<Vec<Inbound>, Fault> {
        let mut remaining = match port.bytes_available() {
            Ok(n) => n,
            Err(e) if is_transient(&e) => 0,
            Err(e) => return Err(Fault::Radio(e)),
        };
        let mut out = Vec::new();

        while remaining > 0 {
            let want = remaining.min(READ_CHUNK);
            let n = match port.read(&mut self.scratch[..want]) {
                Ok(n) => n,
                Err(e) if is_transient(&e) => break,
                Err(e) => return Err(Fault::Radio(e)),
            };
            if n == 0 {
                break;
            }
            debug!("[Radio] RX {} bytes", n);
            out.extend(self.buffer.push(&self.scratch[..n]));
            remaining = remaining.saturating_sub(n);
        }

        Ok(out)
    }

    /// Writes one complete line, retrying while the UART is full.
    ///
    /// After `MAX_TX_STALLS` stalled writes in a row the frame is abandoned;
    /// if part of it already went out, the next frame is prefixed with `\n`.
    pub fn send(
        &mut self,
        port: &mut dyn RadioPort,
        watchdog: &mut dyn Watchdog,
        frame: &RadioFrame,
    ) -> Result<(), Fault> {
        let prefix = usize::from(self.line_open);
        let mut line = String::new();
        if self.line_open {
            line.push('\n');
        }
        line.push_str(&frame.to_line());
        let bytes = line.as_bytes();

        let mut written = 0;
        let mut stalls = 0;
        while written < bytes.len() && stalls < MAX_TX_STALLS {
            match port.write(&bytes[written..]) {
                Ok(0) => stalls += 1,
                Ok(n) => {
                    written += n;
                    stalls = 0;
                }
                Err(e) if is_transient(&e) => stalls += 1,
                Err(e) => {
                    self.line_open = Self::open_after(written, prefix);
                    return Err(Fault::Radio(e));
                }
            }
            if stalls > 0 {
                watchdog.kick();
            }
        }

        if written == bytes.len() {
            self.line_open = false;
        } else {
            self.line_open = Self::open_after(written, prefix);
            warn!(
                "[Radio] TX stalled, frame abandoned after {}/{} bytes: {}",
                written.saturating_sub(prefix),
                bytes.len() - prefix,
                line.trim()
            );
        }
        Ok(())
    }

    /// Wire state after an incomplete write of `prefix` terminator bytes plus a frame.
    fn open_after(written: usize, prefix: usize) -> bool {
        if written < prefix {
            // the earlier fragment is still unterminated
            true
        } else {
            written > prefix
        }
    }
}
