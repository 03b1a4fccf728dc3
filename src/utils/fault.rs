//! fault.rs
//! Typed failures for the control loop.
//!
//! - `Fault`: anything that ends one run of the inner loop (Supervisor restarts on it).
//! - `ProtocolError`: a bad command line; reported to ground as `ERR|`, never fatal.

use std::{fmt, io};

/// Terminates the current run of the inner loop. The Supervisor reports it
/// best-effort and restarts from freshly initialised state.
#[derive(Debug)]
pub enum Fault {
    /// Radio UART failed with something other than a timeout.
    Radio(io::Error),
    /// No usable barometer reading during baseline calibration.
    Calibration(String),
    /// A panic escaped the inner loop.
    Panicked(String),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Radio(e) => write!(f, "radio:{}", e),
            Fault::Calibration(reason) => write!(f, "calibration:{}", reason),
            Fault::Panicked(msg) => write!(f, "panic:{}", msg),
        }
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Fault::Radio(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Fault {
    fn from(e: io::Error) -> Self {
        Fault::Radio(e)
    }
}

impl Fault {
    /// Builds a `Panicked` fault from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown".to_string()
        };
        Fault::Panicked(msg)
    }
}

/// Rejection of a whole command line (before any motion starts).
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// `CMD|` with nothing after it.
    Empty,
    /// No segment of a movement sequence could be parsed.
    NoValidSegments,
    /// `PHASE <name>` named an unknown phase.
    UnknownPhase(String),
    /// A partial line grew past the pending-buffer cap.
    Overflow { discarded: usize },
}

impl ProtocolError {
    /// Reason text carried in the `ERR|<reason>` frame.
    pub fn reason(&self) -> String {
        match self {
            ProtocolError::Empty => "empty".to_string(),
            ProtocolError::NoValidSegments => "bad_cmd".to_string(),
            ProtocolError::UnknownPhase(_) => "bad_phase".to_string(),
            ProtocolError::Overflow { .. } => "overflow".to_string(),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Empty => write!(f, "empty command"),
            ProtocolError::NoValidSegments => write!(f, "no valid movement segment"),
            ProtocolError::UnknownPhase(name) => write!(f, "unknown phase '{}'", name),
            ProtocolError::Overflow { discarded } => {
                write!(f, "command buffer overflow ({} bytes discarded)", discarded)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}
