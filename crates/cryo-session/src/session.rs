//! Device session controller
//!
//! [`DeviceSession`] owns the transport and every table learned from the
//! controller at connect time. All device operations go through it.
//!
//! # Lifecycle
//!
//! `connect` opens the transport and initializes, in order:
//! 1. channel aliases (canonical seeds plus device display names)
//! 2. loop sources
//! 3. input units
//! 4. loop set-point maxima (parsed with the source input's unit)
//!
//! and finally locks the front keypad. `disconnect` always unlocks the
//! keypad before closing, whatever its previous state.

use std::collections::BTreeMap;

use cryo_protocol::{units, ChannelId, Command, LoopId, ParseError};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::loops::LoopSources;
use crate::registry::ChannelRegistry;
use crate::topology::Topology;
use crate::transport::Transport;

/// Tables learned from the device while connected
#[derive(Debug, Clone)]
struct SessionState {
    registry: ChannelRegistry,
    channel_names: BTreeMap<ChannelId, String>,
    loops: LoopSources,
    units: BTreeMap<ChannelId, String>,
    max_temps: BTreeMap<LoopId, f64>,
}

impl SessionState {
    fn channel_loop(&self, controlled: &[LoopId], channel: &str) -> Option<LoopId> {
        self.loops
            .loop_for_channel(&self.registry, controlled, channel)
    }

    fn resolve(&self, channel: &str) -> Result<ChannelId> {
        self.registry
            .resolve(channel)
            .ok_or_else(|| SessionError::UnknownChannel(channel.to_string()))
    }
}

/// Parse a reading using the unit registered for `channel`
fn parse_reading(
    unit_map: &BTreeMap<ChannelId, String>,
    raw: &str,
    channel: ChannelId,
) -> Result<f64> {
    let unit = unit_map
        .get(&channel)
        .ok_or(ParseError::MissingUnit(channel))?;
    Ok(units::parse_temperature(raw, unit)?)
}

/// A session with one CryoCon controller
pub struct DeviceSession<T: Transport> {
    transport: T,
    topology: Topology,
    state: Option<SessionState>,
}

impl<T: Transport> DeviceSession<T> {
    /// Create a disconnected session over `transport`
    pub fn new(transport: T, topology: Topology) -> Self {
        Self {
            transport,
            topology,
            state: None,
        }
    }

    /// Channel/loop layout this session was created with
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the session and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Whether `connect` has completed and `disconnect` has not been called
    pub fn is_connected(&self) -> bool {
        self.state.is_some()
    }

    fn state(&self) -> Result<&SessionState> {
        self.state.as_ref().ok_or(SessionError::NotConnected)
    }

    /// Encode and send a command; queries return the reply, writes return ""
    fn send(&mut self, command: Command) -> Result<String> {
        let text = command.encode();
        if command.is_query() {
            let reply = self.transport.query(&text)?;
            debug!("{} -> {:?}", text, reply);
            Ok(reply)
        } else {
            debug!("{}", text);
            self.transport.write(&text)?;
            Ok(String::new())
        }
    }

    // --- lifecycle ---

    /// Open the transport, learn the device tables and lock the keypad.
    ///
    /// A connected session is disconnected first, unlocking the keypad.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("Already connected, disconnecting before reconnect");
            self.disconnect()?;
        }
        self.transport.open()?;

        let state = match self.initialize() {
            Ok(state) => state,
            Err(e) => {
                warn!("Initialization failed, closing transport: {}", e);
                if let Err(close_err) = self.transport.close() {
                    warn!("Failed to close transport: {}", close_err);
                }
                return Err(e);
            }
        };
        self.state = Some(state);

        // lock keypad, turns the remote LED on
        if let Err(e) = self.lock(true) {
            self.state = None;
            if let Err(close_err) = self.transport.close() {
                warn!("Failed to close transport: {}", close_err);
            }
            return Err(e);
        }

        info!("Connected to CryoCon controller");
        Ok(())
    }

    fn initialize(&mut self) -> Result<SessionState> {
        let mut registry = ChannelRegistry::seeded(&self.topology);
        let channels: Vec<ChannelId> = registry.channels().collect();

        let mut channel_names = BTreeMap::new();
        for &channel in &channels {
            let name = self.query_channel_name(channel)?;
            registry.add_alias(channel, &name);
            channel_names.insert(channel, name);
        }

        let mut loops = LoopSources::new();
        for loop_id in LoopId::ALL {
            let source = self.send(Command::LoopSource(loop_id))?;
            loops.insert(loop_id, &source);
        }

        let mut units = BTreeMap::new();
        for &channel in &channels {
            let unit = self.send(Command::InputUnits(channel))?;
            units.insert(channel, unit.trim().to_string());
        }

        let mut max_temps = BTreeMap::new();
        for loop_id in LoopId::ALL {
            let channel = loops.source_channel(&registry, loop_id).ok_or_else(|| {
                SessionError::UnresolvedLoopSource {
                    loop_id,
                    reported: loops.source(loop_id).unwrap_or_default().to_string(),
                }
            })?;
            let raw = self.send(Command::MaxSetPoint(loop_id))?;
            max_temps.insert(loop_id, parse_reading(&units, &raw, channel)?);
        }

        debug!(
            "Sources {:?}, units {:?}, maxima {:?}",
            loops.as_map(),
            units,
            max_temps
        );

        Ok(SessionState {
            registry,
            channel_names,
            loops,
            units,
            max_temps,
        })
    }

    /// Unlock the keypad and close the transport.
    ///
    /// The transport is closed even when the unlock fails; the unlock error
    /// is returned in that case.
    pub fn disconnect(&mut self) -> Result<()> {
        self.state()?;

        let unlocked = self.lock(false);
        self.state = None;
        let closed = self.transport.close();

        unlocked?;
        closed?;
        info!("Disconnected from CryoCon controller");
        Ok(())
    }

    // --- tables ---

    /// Aliases of every input
    pub fn channels(&self) -> Result<&BTreeMap<ChannelId, Vec<String>>> {
        Ok(self.state()?.registry.as_map())
    }

    /// Display names reported by the device
    pub fn channel_names(&self) -> Result<&BTreeMap<ChannelId, String>> {
        Ok(&self.state()?.channel_names)
    }

    /// Source reported by every loop
    pub fn loops(&self) -> Result<&BTreeMap<LoopId, String>> {
        Ok(self.state()?.loops.as_map())
    }

    /// Unit symbol of every input
    pub fn units(&self) -> Result<&BTreeMap<ChannelId, String>> {
        Ok(&self.state()?.units)
    }

    /// Maximum set point of every loop
    pub fn max_temps(&self) -> Result<&BTreeMap<LoopId, f64>> {
        Ok(&self.state()?.max_temps)
    }

    /// Resolve a channel name to its input
    pub fn resolve_channel(&self, channel: &str) -> Result<Option<ChannelId>> {
        Ok(self.state()?.registry.resolve(channel))
    }

    /// Loop regulating the named channel, if any
    pub fn channel_loop(&self, channel: &str) -> Result<Option<LoopId>> {
        Ok(self
            .state()?
            .channel_loop(&self.topology.controlled_loops, channel))
    }

    /// Convert a reading from the named channel to a number, removing its unit
    pub fn temperature_value(&self, raw: &str, channel: &str) -> Result<f64> {
        let state = self.state()?;
        let channel = state.resolve(channel)?;
        parse_reading(&state.units, raw, channel)
    }

    // --- inputs ---

    fn query_channel_name(&mut self, channel: ChannelId) -> Result<String> {
        let name = self.send(Command::InputName(channel))?;
        Ok(name.trim().to_string())
    }

    /// Query the display name configured for an input
    pub fn channel_name(&mut self, channel: ChannelId) -> Result<String> {
        self.state()?;
        self.query_channel_name(channel)
    }

    /// Current temperature of the named channel
    pub fn temperature(&mut self, channel: &str) -> Result<f64> {
        let channel = self.state()?.resolve(channel)?;
        let raw = self.send(Command::Temperature(channel))?;
        parse_reading(&self.state()?.units, &raw, channel)
    }

    // --- set points ---

    /// Set point of the loop regulating the named channel.
    ///
    /// Channels without a loop have no set point and return `None`.
    pub fn set_point(&mut self, channel: &str) -> Result<Option<f64>> {
        let state = self.state()?;
        let Some(loop_id) = state.channel_loop(&self.topology.controlled_loops, channel) else {
            return Ok(None);
        };
        let input = state.resolve(channel)?;

        let raw = self.send(Command::SetPoint(loop_id, None))?;
        Ok(Some(parse_reading(&self.state()?.units, &raw, input)?))
    }

    /// Write the set point of the loop regulating the named channel.
    ///
    /// The value is checked against the loop's cached maximum before
    /// anything is written.
    pub fn set_temperature(&mut self, channel: &str, value: f64) -> Result<()> {
        let state = self.state()?;
        let loop_id = state
            .channel_loop(&self.topology.controlled_loops, channel)
            .ok_or_else(|| SessionError::NoLoop(channel.to_string()))?;

        if !value.is_finite() {
            return Err(SessionError::InvalidSetPoint(value));
        }

        let max = state
            .max_temps
            .get(&loop_id)
            .copied()
            .ok_or_else(|| SessionError::NoLoop(channel.to_string()))?;
        if value > max {
            return Err(SessionError::AboveMaximum {
                loop_id,
                value,
                max,
            });
        }

        self.send(Command::SetPoint(loop_id, Some(value)))?;
        info!("Loop {} set point -> {}", loop_id, value);
        Ok(())
    }

    /// Raw maximum set point reply for a loop
    pub fn max_temperature(&mut self, loop_id: LoopId) -> Result<String> {
        self.state()?;
        self.send(Command::MaxSetPoint(loop_id))
    }

    /// Cached maximum set point of the loop regulating the named channel
    pub fn channel_max_temperature(&self, channel: &str) -> Result<Option<f64>> {
        let state = self.state()?;
        Ok(state
            .channel_loop(&self.topology.controlled_loops, channel)
            .and_then(|loop_id| state.max_temps.get(&loop_id).copied()))
    }

    // --- control ---

    /// Engage control
    pub fn enable(&mut self) -> Result<()> {
        self.state()?;
        self.send(Command::Control)?;
        Ok(())
    }

    /// Disengage control
    pub fn disable(&mut self) -> Result<()> {
        self.state()?;
        self.send(Command::Stop)?;
        Ok(())
    }

    /// Whether control is engaged
    pub fn is_enabled(&mut self) -> Result<bool> {
        self.state()?;
        let status = self.send(Command::ControlStatus)?;
        Ok(status.trim().eq_ignore_ascii_case("on"))
    }

    /// Heater range of a loop, lower-cased (`low`, `mid`, `hi`)
    pub fn range(&mut self, loop_id: LoopId) -> Result<String> {
        self.state()?;
        let range = self.send(Command::Range(loop_id, None))?;
        Ok(range.trim().to_lowercase())
    }

    /// Write the heater range of a loop; the value is passed through unchecked
    pub fn set_range(&mut self, loop_id: LoopId, range: &str) -> Result<()> {
        self.state()?;
        self.send(Command::Range(loop_id, Some(range.to_string())))?;
        Ok(())
    }

    /// Heater output of a loop as a fraction of full scale
    pub fn output(&mut self, loop_id: LoopId) -> Result<f64> {
        self.state()?;
        let raw = self.send(Command::OutputPower(loop_id))?;
        Ok(units::parse_percent(&raw)?)
    }

    /// Lock or unlock the front keypad
    pub fn lock(&mut self, lock: bool) -> Result<()> {
        self.state()?;
        self.send(Command::Lock(lock))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::TransportError;

    /// Scripted transport answering from a fixed table
    #[derive(Default)]
    struct FakeTransport {
        open: bool,
        replies: HashMap<String, String>,
        log: Vec<String>,
    }

    impl FakeTransport {
        fn cryocon() -> Self {
            let replies = [
                ("input a:name?", "Sample  "),
                ("input b:name?", "Shield"),
                ("loop 1:source?", "CHA"),
                ("loop 2:source?", "chb"),
                ("loop 3:source?", "cha"),
                ("loop 4:source?", "chb"),
                ("input a:units?", "K"),
                ("input b:units?", "C"),
                ("loop 1:maxset?", "400.00K"),
                ("loop 2:maxset?", "50.00C"),
                ("loop 3:maxset?", "300.00K"),
                ("loop 4:maxset?", "20.00C"),
                ("input? a", "295.10K"),
                ("loop 1:setpt?", "290.00K"),
                ("control?", "OFF"),
            ];
            Self {
                replies: replies
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl Transport for FakeTransport {
        fn open(&mut self) -> Result<(), TransportError> {
            self.open = true;
            Ok(())
        }

        fn close(&mut self) -> Result<(), TransportError> {
            self.open = false;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn query(&mut self, command: &str) -> Result<String, TransportError> {
            self.log.push(command.to_string());
            Ok(self.replies.get(command).cloned().unwrap_or_default())
        }
    }

    fn connected() -> DeviceSession<FakeTransport> {
        let mut session = DeviceSession::new(FakeTransport::cryocon(), Topology::cryocon_22c());
        session.connect().unwrap();
        session
    }

    #[test]
    fn test_connect_initializes_in_order() {
        let session = connected();
        let log = &session.transport().log;
        assert_eq!(
            log,
            &[
                "input a:name?",
                "input b:name?",
                "loop 1:source?",
                "loop 2:source?",
                "loop 3:source?",
                "loop 4:source?",
                "input a:units?",
                "input b:units?",
                "loop 1:maxset?",
                "loop 2:maxset?",
                "loop 3:maxset?",
                "loop 4:maxset?",
                "system:lock on",
            ]
        );
    }

    #[test]
    fn test_connect_tables() {
        let session = connected();
        assert!(session.is_connected());
        assert_eq!(session.channel_names().unwrap()[&ChannelId::A], "Sample");
        assert_eq!(session.channels().unwrap()[&ChannelId::A], ["cha", "sample"]);
        assert_eq!(session.loops().unwrap()[&LoopId::Loop1], "cha");
        assert_eq!(session.units().unwrap()[&ChannelId::B], "C");
        assert_eq!(session.max_temps().unwrap()[&LoopId::Loop2], 50.0);
    }

    #[test]
    fn test_operations_require_connection() {
        let mut session = DeviceSession::new(FakeTransport::cryocon(), Topology::default());
        assert!(matches!(
            session.temperature("a"),
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(session.enable(), Err(SessionError::NotConnected)));
        assert!(matches!(session.disconnect(), Err(SessionError::NotConnected)));
        assert!(matches!(session.units(), Err(SessionError::NotConnected)));
        assert!(session.transport().log.is_empty());
    }

    #[test]
    fn test_temperature_and_set_point() {
        let mut session = connected();
        assert_eq!(session.temperature("sample").unwrap(), 295.1);
        assert_eq!(session.set_point("a").unwrap(), Some(290.0));
    }

    #[test]
    fn test_temperature_unknown_channel() {
        let mut session = connected();
        assert!(matches!(
            session.temperature("c"),
            Err(SessionError::UnknownChannel(name)) if name == "c"
        ));
    }

    #[test]
    fn test_temperature_value_uses_channel_unit() {
        let session = connected();
        assert_eq!(session.temperature_value("C-12.5", "shield").unwrap(), -12.5);
        assert!(session.temperature_value("12.5K", "b").is_err());
    }

    #[test]
    fn test_is_enabled_case_insensitive() {
        let mut session = connected();
        assert!(!session.is_enabled().unwrap());
        session
            .transport_mut()
            .replies
            .insert("control?".into(), " On\r".into());
        assert!(session.is_enabled().unwrap());
    }

    #[test]
    fn test_non_finite_set_point_rejected() {
        let mut session = connected();
        assert!(matches!(
            session.set_temperature("a", f64::NAN),
            Err(SessionError::InvalidSetPoint(_))
        ));
        assert!(!session
            .transport()
            .log
            .iter()
            .any(|c| c.starts_with("loop 1:setpt ")));
    }

    #[test]
    fn test_disconnect_unlocks_then_closes() {
        let mut session = connected();
        session.disconnect().unwrap();
        assert!(!session.is_connected());
        assert!(!session.transport().open);
        assert_eq!(session.transport().log.last().unwrap(), "system:lock off");
    }

    #[test]
    fn test_connect_while_connected_unlocks_first() {
        let mut session = connected();
        session.transport_mut().log.clear();

        session.connect().unwrap();
        let log = &session.transport().log;
        assert_eq!(log.first().unwrap(), "system:lock off");
        assert_eq!(log[1], "input a:name?");
        assert_eq!(log.last().unwrap(), "system:lock on");
        assert!(session.is_connected());
    }

    #[test]
    fn test_unresolved_source_fails_connect() {
        let mut transport = FakeTransport::cryocon();
        transport
            .replies
            .insert("loop 3:source?".into(), "none".into());
        let mut session = DeviceSession::new(transport, Topology::default());

        let err = session.connect().unwrap_err();
        assert!(matches!(
            err,
            SessionError::UnresolvedLoopSource { loop_id: LoopId::Loop3, ref reported } if reported == "none"
        ));
        assert!(!session.is_connected());
        assert!(!session.transport().open);
        assert!(!session.transport().log.iter().any(|c| c == "system:lock on"));
    }
}
