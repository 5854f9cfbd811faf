//! Virtual temperature controller
//!
//! Provides an in-memory CryoCon 22C that answers commands the way the real
//! instrument does and records every line it receives.

use std::collections::BTreeMap;

use cryo_protocol::{units::format_value, ChannelId, Command, LoopId};
use cryo_session::{Transport, TransportError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Simulated sensor input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualInput {
    /// Display name configured on the front panel
    pub name: String,
    /// Unit symbol (`K`, `C`, `F`, `S`)
    pub units: String,
    /// Current reading
    pub temperature: f64,
}

/// Simulated control loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualLoop {
    /// Source as reported by `loop n:source?` (e.g. `ChA`)
    pub source: String,
    /// Current set point
    pub set_point: f64,
    /// Maximum set point
    pub max_set_point: f64,
    /// Heater range as stored by the device
    pub range: String,
    /// Heater output in percent of full scale
    pub output_percent: f64,
}

/// Configuration for creating a virtual controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualControllerConfig {
    /// Sensor inputs
    pub inputs: BTreeMap<ChannelId, VirtualInput>,
    /// Control loops
    pub loops: BTreeMap<LoopId, VirtualLoop>,
}

impl Default for VirtualControllerConfig {
    fn default() -> Self {
        let input = |name: &str, temperature| VirtualInput {
            name: name.to_string(),
            units: "K".to_string(),
            temperature,
        };
        let control_loop = |source: &str, set_point, range: &str, output_percent| VirtualLoop {
            source: source.to_string(),
            set_point,
            max_set_point: 400.0,
            range: range.to_string(),
            output_percent,
        };

        Self {
            inputs: BTreeMap::from([
                (ChannelId::A, input("Sample", 295.0)),
                (ChannelId::B, input("Shield", 77.0)),
            ]),
            loops: BTreeMap::from([
                (LoopId::Loop1, control_loop("ChA", 295.0, "mid", 45.0)),
                (LoopId::Loop2, control_loop("ChB", 77.0, "low", 20.0)),
                (LoopId::Loop3, control_loop("ChA", 0.0, "hi", 0.0)),
                (LoopId::Loop4, control_loop("ChB", 0.0, "hi", 0.0)),
            ]),
        }
    }
}

/// A simulated controller implementing [`Transport`]
#[derive(Debug)]
pub struct VirtualController {
    inputs: BTreeMap<ChannelId, VirtualInput>,
    loops: BTreeMap<LoopId, VirtualLoop>,
    open: bool,
    control: bool,
    locked: bool,
    unresponsive: bool,
    overrides: BTreeMap<String, String>,
    commands: Vec<String>,
}

impl Default for VirtualController {
    fn default() -> Self {
        Self::from_config(VirtualControllerConfig::default())
    }
}

impl VirtualController {
    /// Create a virtual controller with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a virtual controller from configuration
    pub fn from_config(config: VirtualControllerConfig) -> Self {
        Self {
            inputs: config.inputs,
            loops: config.loops,
            open: false,
            control: false,
            locked: false,
            unresponsive: false,
            overrides: BTreeMap::new(),
            commands: Vec::new(),
        }
    }

    /// Every command line received, in order
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Forget recorded commands
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Whether the front keypad is locked
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Whether control is engaged
    pub fn is_control_on(&self) -> bool {
        self.control
    }

    /// Simulated input state
    pub fn input(&self, channel: ChannelId) -> Option<&VirtualInput> {
        self.inputs.get(&channel)
    }

    /// Simulated loop state
    pub fn control_loop(&self, loop_id: LoopId) -> Option<&VirtualLoop> {
        self.loops.get(&loop_id)
    }

    /// Set the reading of an input
    pub fn set_temperature(&mut self, channel: ChannelId, temperature: f64) {
        if let Some(input) = self.inputs.get_mut(&channel) {
            input.temperature = temperature;
        }
    }

    /// Set the display name of an input
    pub fn set_input_name(&mut self, channel: ChannelId, name: &str) {
        if let Some(input) = self.inputs.get_mut(&channel) {
            input.name = name.to_string();
        }
    }

    /// Set the unit symbol of an input
    pub fn set_units(&mut self, channel: ChannelId, units: &str) {
        if let Some(input) = self.inputs.get_mut(&channel) {
            input.units = units.to_string();
        }
    }

    /// Set the source reported by a loop
    pub fn set_loop_source(&mut self, loop_id: LoopId, source: &str) {
        if let Some(lp) = self.loops.get_mut(&loop_id) {
            lp.source = source.to_string();
        }
    }

    /// Set the maximum set point of a loop
    pub fn set_max_set_point(&mut self, loop_id: LoopId, max: f64) {
        if let Some(lp) = self.loops.get_mut(&loop_id) {
            lp.max_set_point = max;
        }
    }

    /// Set the heater output of a loop, in percent
    pub fn set_output(&mut self, loop_id: LoopId, percent: f64) {
        if let Some(lp) = self.loops.get_mut(&loop_id) {
            lp.output_percent = percent;
        }
    }

    /// Set the heater range of a loop
    pub fn set_range(&mut self, loop_id: LoopId, range: &str) {
        if let Some(lp) = self.loops.get_mut(&loop_id) {
            lp.range = range.to_string();
        }
    }

    /// Stop answering queries, so every query times out
    pub fn set_unresponsive(&mut self, unresponsive: bool) {
        self.unresponsive = unresponsive;
    }

    /// Answer `command` with `reply` verbatim instead of the simulated state,
    /// e.g. `"......."` for a faulted sensor
    pub fn set_reply(&mut self, command: &str, reply: &str) {
        self.overrides
            .insert(command.trim().to_lowercase(), reply.to_string());
    }

    /// Input a loop source refers to, matched like the front panel does
    fn source_channel(&self, source: &str) -> Option<ChannelId> {
        let source = source.trim().to_lowercase();
        self.inputs.iter().find_map(|(&channel, input)| {
            let canonical = format!("ch{}", channel.token());
            (source == canonical || source == channel.token() || source == input.name.to_lowercase())
                .then_some(channel)
        })
    }

    fn loop_units(&self, lp: &VirtualLoop) -> String {
        self.source_channel(&lp.source)
            .and_then(|ch| self.inputs.get(&ch))
            .map(|input| input.units.clone())
            .unwrap_or_default()
    }

    /// Apply a command and return the reply, `None` when the device has nothing to say
    fn execute(&mut self, command: Command) -> Option<String> {
        match command {
            Command::Temperature(ch) => self
                .inputs
                .get(&ch)
                .map(|input| format!("{:.4}", input.temperature)),
            Command::InputUnits(ch) => self.inputs.get(&ch).map(|input| input.units.clone()),
            Command::InputName(ch) => self.inputs.get(&ch).map(|input| input.name.clone()),
            Command::LoopSource(lp) => self.loops.get(&lp).map(|l| l.source.clone()),
            Command::MaxSetPoint(lp) => {
                let l = self.loops.get(&lp)?;
                Some(format!("{:.2}{}", l.max_set_point, self.loop_units(l)))
            }
            Command::SetPoint(lp, None) => {
                let l = self.loops.get(&lp)?;
                Some(format!("{:.2}{}", l.set_point, self.loop_units(l)))
            }
            Command::SetPoint(lp, Some(value)) => {
                if let Some(l) = self.loops.get_mut(&lp) {
                    l.set_point = value;
                }
                None
            }
            Command::Range(lp, None) => self.loops.get(&lp).map(|l| l.range.to_uppercase()),
            Command::Range(lp, Some(range)) => {
                if let Some(l) = self.loops.get_mut(&lp) {
                    l.range = range;
                }
                None
            }
            Command::OutputPower(lp) => self
                .loops
                .get(&lp)
                .map(|l| format_value(l.output_percent)),
            Command::Control => {
                self.control = true;
                None
            }
            Command::ControlStatus => Some(if self.control { "ON" } else { "OFF" }.to_string()),
            Command::Stop => {
                self.control = false;
                None
            }
            Command::Lock(on) => {
                self.locked = on;
                None
            }
        }
    }
}

impl Transport for VirtualController {
    fn open(&mut self) -> Result<(), TransportError> {
        debug!("Virtual controller opened");
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        debug!("Virtual controller closed");
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.commands.push(command.to_string());

        let timeout = || TransportError::Timeout {
            command: command.to_string(),
            timeout_ms: 0,
        };
        if self.unresponsive {
            return Err(timeout());
        }
        if let Some(reply) = self.overrides.get(&command.trim().to_lowercase()) {
            trace!("Virtual controller {:?} -> {:?} (override)", command, reply);
            return Ok(reply.clone());
        }

        let parsed = match Command::parse(command) {
            Ok(parsed) => parsed,
            Err(e) => {
                // the instrument ignores lines it does not understand
                warn!("Virtual controller ignoring {:?}: {}", command, e);
                return Err(timeout());
            }
        };

        let reply = self.execute(parsed).unwrap_or_default();
        trace!("Virtual controller {:?} -> {:?}", command, reply);
        Ok(reply)
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        if self.open && self.unresponsive {
            // writes have no reply, so a dead device goes unnoticed
            self.commands.push(command.to_string());
            return Ok(());
        }
        self.query(command).map(|_| ())
    }
}
