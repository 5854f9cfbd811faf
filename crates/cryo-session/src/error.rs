//! Error types for the device session

use cryo_protocol::{LoopId, ParseError};
use thiserror::Error;

/// Errors raised by a [`Transport`](crate::Transport)
#[derive(Debug, Error)]
pub enum TransportError {
    /// Query issued while the transport is closed
    #[error("transport is not open")]
    NotOpen,

    /// Failed to open the port
    #[error("failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// No complete reply before the deadline
    #[error("timeout after {timeout_ms}ms waiting for reply to {command:?}")]
    Timeout { command: String, timeout_ms: u64 },

    /// I/O error on the port
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}

/// Errors that can occur in a device session
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation attempted before connect or after disconnect
    #[error("session is not connected")]
    NotConnected,

    /// Name does not match any input or alias
    #[error("unknown channel: {0:?}")]
    UnknownChannel(String),

    /// No control loop is fed by the channel
    #[error("no control loop for channel {0:?}")]
    NoLoop(String),

    /// Requested set point exceeds the loop's maximum
    #[error("set point {value} is above the maximum {max} for loop {loop_id}")]
    AboveMaximum { loop_id: LoopId, value: f64, max: f64 },

    /// Set point is NaN or infinite
    #[error("invalid set point: {0}")]
    InvalidSetPoint(f64),

    /// A loop reports a source that is not a known input
    #[error("loop {loop_id} source {reported:?} is not a known input")]
    UnresolvedLoopSource { loop_id: LoopId, reported: String },

    /// Device reply could not be parsed
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Transport failure, passed through unmodified
    #[error("communication error: {0}")]
    Communication(#[from] TransportError),
}

/// Result alias for session operations
pub type Result<T, E = SessionError> = std::result::Result<T, E>;
