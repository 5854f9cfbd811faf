//! Typed CryoCon command vocabulary
//!
//! Every command the session issues is a variant of [`Command`]. Encoding
//! produces the exact text the controller expects (without the line
//! terminator); parsing accepts the same text and is used by the simulator.
//!
//! # Format
//! - Input queries: `input? a`, `input a:units?`, `input a:name?`
//! - Loop queries: `loop 1:source?`, `loop 1:maxset?`, `loop 1:outpwr?`
//! - Loop settings: `loop 1:setpt 300.0`, `loop 1:range mid`
//! - Control: `control`, `control?`, `stop`, `system:lock on`

use crate::error::ParseError;
use crate::units::format_value;
use crate::{ChannelId, LoopId};

/// A single controller command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Current reading of an input: `input? a`
    Temperature(ChannelId),
    /// Unit symbol of an input: `input a:units?`
    InputUnits(ChannelId),
    /// User-assigned name of an input: `input a:name?`
    InputName(ChannelId),
    /// Input feeding a loop: `loop 1:source?`
    LoopSource(LoopId),
    /// Maximum allowed set point: `loop 1:maxset?`
    MaxSetPoint(LoopId),
    /// Query or write a set point: `loop 1:setpt?` / `loop 1:setpt 300.0`
    SetPoint(LoopId, Option<f64>),
    /// Query or write the heater range: `loop 1:range?` / `loop 1:range mid`
    Range(LoopId, Option<String>),
    /// Heater output in percent of full scale: `loop 1:outpwr?`
    OutputPower(LoopId),
    /// Engage control: `control`
    Control,
    /// Control status query: `control?`
    ControlStatus,
    /// Disengage control: `stop`
    Stop,
    /// Lock or unlock the front keypad: `system:lock on`
    Lock(bool),
}

impl Command {
    /// Encode to device text, without terminator
    pub fn encode(&self) -> String {
        match self {
            Command::Temperature(ch) => format!("input? {ch}"),
            Command::InputUnits(ch) => format!("input {ch}:units?"),
            Command::InputName(ch) => format!("input {ch}:name?"),
            Command::LoopSource(lp) => format!("loop {lp}:source?"),
            Command::MaxSetPoint(lp) => format!("loop {lp}:maxset?"),
            Command::SetPoint(lp, None) => format!("loop {lp}:setpt?"),
            Command::SetPoint(lp, Some(v)) => format!("loop {lp}:setpt {}", format_value(*v)),
            Command::Range(lp, None) => format!("loop {lp}:range?"),
            Command::Range(lp, Some(r)) => format!("loop {lp}:range {r}"),
            Command::OutputPower(lp) => format!("loop {lp}:outpwr?"),
            Command::Control => "control".to_string(),
            Command::ControlStatus => "control?".to_string(),
            Command::Stop => "stop".to_string(),
            Command::Lock(on) => format!("system:lock {}", if *on { "on" } else { "off" }),
        }
    }

    /// Whether the device answers this command with a value
    pub fn is_query(&self) -> bool {
        !matches!(
            self,
            Command::SetPoint(_, Some(_))
                | Command::Range(_, Some(_))
                | Command::Control
                | Command::Stop
                | Command::Lock(_)
        )
    }

    /// Parse command text (terminator optional, case-insensitive)
    pub fn parse(text: &str) -> Result<Command, ParseError> {
        let cmd = text.trim().to_ascii_lowercase();
        let invalid = || ParseError::InvalidCommand(text.trim().to_string());

        match cmd.as_str() {
            "control" => return Ok(Command::Control),
            "control?" => return Ok(Command::ControlStatus),
            "stop" => return Ok(Command::Stop),
            _ => {}
        }

        if let Some(arg) = cmd.strip_prefix("system:lock ") {
            return match arg.trim() {
                "on" => Ok(Command::Lock(true)),
                "off" => Ok(Command::Lock(false)),
                _ => Err(invalid()),
            };
        }

        if let Some(ch) = cmd.strip_prefix("input? ") {
            return Ok(Command::Temperature(ch.parse()?));
        }

        if let Some(rest) = cmd.strip_prefix("input ") {
            let (ch, field) = rest.split_once(':').ok_or_else(invalid)?;
            let ch: ChannelId = ch.parse()?;
            return match field.trim() {
                "units?" => Ok(Command::InputUnits(ch)),
                "name?" => Ok(Command::InputName(ch)),
                _ => Err(invalid()),
            };
        }

        if let Some(rest) = cmd.strip_prefix("loop ") {
            let (lp, field) = rest.split_once(':').ok_or_else(invalid)?;
            let lp: LoopId = lp.parse()?;
            let (verb, arg) = match field.split_once(' ') {
                Some((verb, arg)) => (verb, Some(arg.trim())),
                None => (field.trim(), None),
            };
            return match (verb, arg) {
                ("source?", None) => Ok(Command::LoopSource(lp)),
                ("maxset?", None) => Ok(Command::MaxSetPoint(lp)),
                ("outpwr?", None) => Ok(Command::OutputPower(lp)),
                ("setpt?", None) => Ok(Command::SetPoint(lp, None)),
                ("setpt", Some(v)) => {
                    let value = v
                        .parse::<f64>()
                        .map_err(|_| ParseError::InvalidNumber(v.to_string()))?;
                    Ok(Command::SetPoint(lp, Some(value)))
                }
                ("range?", None) => Ok(Command::Range(lp, None)),
                ("range", Some(r)) if !r.is_empty() => Ok(Command::Range(lp, Some(r.to_string()))),
                _ => Err(invalid()),
            };
        }

        Err(invalid())
    }
}
