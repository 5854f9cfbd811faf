//! CryoCon Protocol Library
//!
//! This crate provides the command vocabulary and reply parsing for the
//! CryoCon 22C family of cryogenic temperature controllers.
//!
//! The controller speaks a SCPI-like ASCII dialect. Every command and every
//! reply is a single line terminated by CR+LF:
//!
//! - `input? a` reads the current temperature of input A
//! - `loop 1:source?` reports which input feeds control loop 1
//! - `loop 1:setpt 300.0` writes a set point
//!
//! # Topology
//!
//! The 22C has two sensor inputs ([`ChannelId::A`], [`ChannelId::B`]) and four
//! control loops ([`LoopId::Loop1`]..[`LoopId::Loop4`]). Only loops 1 and 2
//! drive heaters bound to an input.
//!
//! # Example
//!
//! ```rust
//! use cryo_protocol::{ChannelId, Command, LoopId, units};
//!
//! let cmd = Command::MaxSetPoint(LoopId::Loop1);
//! assert_eq!(cmd.encode(), "loop 1:maxset?");
//!
//! let max = units::parse_temperature("400.00K", "K").unwrap();
//! assert_eq!(max, 400.0);
//!
//! let cmd = Command::parse("input? b").unwrap();
//! assert_eq!(cmd, Command::Temperature(ChannelId::B));
//! ```

use std::fmt;
use std::str::FromStr;

pub mod command;
pub mod error;
pub mod units;

pub use command::Command;
pub use error::ParseError;

/// Line terminator used for both commands and replies
pub const TERMINATOR: &str = "\r\n";

/// A physical sensor input on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChannelId {
    /// Input A
    A,
    /// Input B
    B,
}

impl ChannelId {
    /// All inputs in canonical order
    pub const ALL: [ChannelId; 2] = [ChannelId::A, ChannelId::B];

    /// Canonical token used in commands (`a` / `b`)
    pub fn token(&self) -> &'static str {
        match self {
            ChannelId::A => "a",
            ChannelId::B => "b",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ChannelId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(ChannelId::A),
            "b" => Ok(ChannelId::B),
            _ => Err(ParseError::InvalidChannel(s.to_string())),
        }
    }
}

/// A control loop on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoopId {
    Loop1,
    Loop2,
    Loop3,
    Loop4,
}

impl LoopId {
    /// All loops in ascending order
    pub const ALL: [LoopId; 4] = [LoopId::Loop1, LoopId::Loop2, LoopId::Loop3, LoopId::Loop4];

    /// Loop number as used in commands (1-4)
    pub fn number(&self) -> u8 {
        match self {
            LoopId::Loop1 => 1,
            LoopId::Loop2 => 2,
            LoopId::Loop3 => 3,
            LoopId::Loop4 => 4,
        }
    }

    /// Look up a loop by its number
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(LoopId::Loop1),
            2 => Some(LoopId::Loop2),
            3 => Some(LoopId::Loop3),
            4 => Some(LoopId::Loop4),
            _ => None,
        }
    }
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for LoopId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(LoopId::from_number)
            .ok_or_else(|| ParseError::InvalidLoop(s.to_string()))
    }
}

/// Heater output range of a control loop, ordered from lowest to highest power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RangeLevel {
    Low,
    Mid,
    Hi,
}

impl RangeLevel {
    /// The range ladder, lowest first
    pub const LADDER: [RangeLevel; 3] = [RangeLevel::Low, RangeLevel::Mid, RangeLevel::Hi];

    /// Device spelling of the range
    pub fn as_str(&self) -> &'static str {
        match self {
            RangeLevel::Low => "low",
            RangeLevel::Mid => "mid",
            RangeLevel::Hi => "hi",
        }
    }

    fn index(&self) -> usize {
        match self {
            RangeLevel::Low => 0,
            RangeLevel::Mid => 1,
            RangeLevel::Hi => 2,
        }
    }

    /// The range `delta` steps away along the ladder.
    ///
    /// Returns `None` when the step would leave the ladder.
    pub fn step(&self, delta: i8) -> Option<RangeLevel> {
        let pos = self.index() as i16 + i16::from(delta);
        if pos < 0 {
            return None;
        }
        Self::LADDER.get(pos as usize).copied()
    }
}

impl fmt::Display for RangeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RangeLevel::Low),
            "mid" => Ok(RangeLevel::Mid),
            "hi" => Ok(RangeLevel::Hi),
            _ => Err(ParseError::UnknownRange(s.to_string())),
        }
    }
}
