//! Error types for CryoCon reply parsing and command decoding

use thiserror::Error;

use crate::ChannelId;

/// Errors that can occur while parsing device text
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Reply did not contain a number once the unit was removed
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),

    /// No unit has been registered for the channel
    #[error("no unit registered for input {0}")]
    MissingUnit(ChannelId),

    /// Range reply is not one of low/mid/hi
    #[error("unknown range: {0:?}")]
    UnknownRange(String),

    /// Unknown or malformed command text
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),

    /// Channel token is not a known input
    #[error("invalid input channel: {0:?}")]
    InvalidChannel(String),

    /// Loop token is not one of 1-4
    #[error("invalid loop: {0:?}")]
    InvalidLoop(String),
}
