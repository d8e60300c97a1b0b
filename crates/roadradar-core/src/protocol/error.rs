//! Protocol errors

use thiserror::Error;

use super::Command;

/// Errors that can occur while talking to the radar
#[derive(Error, Debug)]
pub enum RadarError {
    /// No valid frame carrying the expected command arrived within the attempt budget
    #[error("No {expected:?} response within {attempts} attempts")]
    Timeout {
        /// Response command that never arrived
        expected: Command,
        /// Frame reads spent
        attempts: u32,
    },

    /// The device answered, but rejected the command
    #[error("Command {command:?} rejected by radar (status {status:#04x})")]
    DeviceFailure {
        /// Rejected request
        command: Command,
        /// Status byte returned by the device
        status: u8,
    },

    /// The response frame was valid but its payload could not be interpreted
    #[error("Malformed {command:?} response: {reason}")]
    MalformedResponse {
        /// Command word of the response
        command: Command,
        /// What was wrong with the payload
        reason: &'static str,
    },

    /// A caller-supplied value is out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(String),

    /// The channel lock was poisoned by a panicking thread
    #[error("Channel lock poisoned")]
    LockPoisoned,

    /// `start_streaming` was called while a reader is running
    #[error("Streaming is already running")]
    AlreadyStreaming,

    /// A configuration file could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O failure on the byte channel, read timeouts included
    #[error("Channel error: {0}")]
    Channel(#[from] std::io::Error),
}

impl RadarError {
    /// Whether this is a read timeout on the underlying transport.
    ///
    /// Serial ports report "no bytes yet" as `TimedOut` (or `WouldBlock` in
    /// non-blocking mode); neither means the port is gone.
    pub fn is_read_timeout(&self) -> bool {
        matches!(
            self,
            RadarError::Channel(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock
        )
    }

    /// Human readable reason for a failed capability call, used by front-ends.
    pub fn reason(&self) -> String {
        match self {
            RadarError::Timeout {
                expected: Command::ReadVersion,
                ..
            } => "no firmware version".to_string(),
            RadarError::Timeout {
                expected: Command::ReadParameters,
                ..
            } => "no parameters".to_string(),
            RadarError::Timeout {
                expected: Command::ReadTargetData,
                ..
            } => "no target data".to_string(),
            RadarError::Timeout { .. } => "no answer".to_string(),
            RadarError::DeviceFailure { .. } => "command rejected".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_read_timeout_detection() {
        let timed_out = RadarError::Channel(io::Error::new(io::ErrorKind::TimedOut, "t"));
        let would_block = RadarError::Channel(io::Error::new(io::ErrorKind::WouldBlock, "w"));
        let eof = RadarError::Channel(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));

        assert!(timed_out.is_read_timeout());
        assert!(would_block.is_read_timeout());
        assert!(!eof.is_read_timeout());
        assert!(!RadarError::LockPoisoned.is_read_timeout());
    }

    #[test]
    fn test_reasons() {
        let err = RadarError::Timeout {
            expected: Command::ReadVersion,
            attempts: 10,
        };
        assert_eq!(err.reason(), "no firmware version");

        let err = RadarError::Timeout {
            expected: Command::ReadParameters,
            attempts: 10,
        };
        assert_eq!(err.reason(), "no parameters");

        let err = RadarError::DeviceFailure {
            command: Command::EnableTransmit,
            status: 0xFF,
        };
        assert_eq!(err.reason(), "command rejected");
        assert!(err.to_string().contains("0xff"));
    }
}
