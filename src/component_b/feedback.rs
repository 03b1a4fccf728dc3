//! feedback.rs
//! Result of handling one received line, sent back to the ground station.

use crate::component_b::radio::RadioFrame;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `ACK|<echo>`
    Ack(String),
    /// `ERR|<reason>`
    Err(String),
    /// Not a command line; nothing is sent.
    Unhandled,
}

impl Reply {
    pub fn frame(&self) -> Option<RadioFrame> {
        match self {
            Reply::Ack(echo) => Some(RadioFrame::Ack(echo.clone())),
            Reply::Err(reason) => Some(RadioFrame::Err(reason.clone())),
            Reply::Unhandled => None,
        }
    }

    /// Short label for the flight log.
    pub fn outcome(&self) -> &'static str {
        match self {
            Reply::Ack(_) => "ack",
            Reply::Err(_) => "err",
            Reply::Unhandled => "unhandled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_frames() {
        assert_eq!(Reply::Ack("STOP".into()).frame().map(|f| f.to_string()), Some("ACK|STOP".into()));
        assert_eq!(Reply::Err("empty".into()).frame().map(|f| f.to_string()), Some("ERR|empty".into()));
        assert_eq!(Reply::Unhandled.frame(), None);
        assert_eq!(Reply::Unhandled.outcome(), "unhandled");
    }
}
