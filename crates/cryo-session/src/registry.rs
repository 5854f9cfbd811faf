//! Channel name resolution
//!
//! Inputs can be addressed by their canonical token (`a`), a seeded alias
//! (`cha`) or the name the user configured on the device front panel. All
//! comparisons are made on trimmed, lower-cased text.

use std::collections::BTreeMap;

use cryo_protocol::ChannelId;

use crate::topology::Topology;

/// Trim and lower-case a channel name for comparison
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Alias table for the controller's inputs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelRegistry {
    aliases: BTreeMap<ChannelId, Vec<String>>,
}

impl ChannelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the topology's canonical aliases
    pub fn seeded(topology: &Topology) -> Self {
        let mut registry = Self::new();
        for (&channel, aliases) in &topology.channels {
            registry.aliases.entry(channel).or_default();
            for alias in aliases {
                registry.add_alias(channel, alias);
            }
        }
        registry
    }

    /// Registered inputs in canonical order
    pub fn channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.aliases.keys().copied()
    }

    /// Aliases registered for an input
    pub fn aliases(&self, channel: ChannelId) -> &[String] {
        self.aliases
            .get(&channel)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Full alias table
    pub fn as_map(&self) -> &BTreeMap<ChannelId, Vec<String>> {
        &self.aliases
    }

    /// Append a normalized alias to an input
    pub fn add_alias(&mut self, channel: ChannelId, name: &str) {
        self.aliases
            .entry(channel)
            .or_default()
            .push(normalize(name));
    }

    /// Resolve any channel name to its input.
    ///
    /// A miss is `None`; callers use it to detect names that are not inputs.
    pub fn resolve(&self, name: &str) -> Option<ChannelId> {
        let name = normalize(name);
        self.aliases
            .iter()
            .find(|(channel, aliases)| channel.token() == name || aliases.contains(&name))
            .map(|(&channel, _)| channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ChannelRegistry {
        let mut registry = ChannelRegistry::seeded(&Topology::cryocon_22c());
        registry.add_alias(ChannelId::A, "  Sample Stage ");
        registry.add_alias(ChannelId::B, "Cold Head");
        registry
    }

    #[test]
    fn test_resolve_canonical_tokens() {
        let registry = registry();
        assert_eq!(registry.resolve("a"), Some(ChannelId::A));
        assert_eq!(registry.resolve(" B "), Some(ChannelId::B));
    }

    #[test]
    fn test_resolve_seeded_aliases() {
        let registry = registry();
        assert_eq!(registry.resolve("cha"), Some(ChannelId::A));
        assert_eq!(registry.resolve("CHB"), Some(ChannelId::B));
    }

    #[test]
    fn test_resolve_display_names() {
        let registry = registry();
        assert_eq!(registry.resolve("sample stage"), Some(ChannelId::A));
        assert_eq!(registry.resolve("COLD HEAD\r\n"), Some(ChannelId::B));
    }

    #[test]
    fn test_resolve_miss() {
        let registry = registry();
        assert_eq!(registry.resolve("none"), None);
        assert_eq!(registry.resolve("c"), None);
        assert_eq!(registry.resolve(""), None);
        assert_eq!(registry.resolve("sample"), None);
    }

    #[test]
    fn test_empty_registry_resolves_nothing() {
        assert_eq!(ChannelRegistry::new().resolve("a"), None);
    }

    #[test]
    fn test_aliases_are_not_deduplicated() {
        let mut registry = ChannelRegistry::seeded(&Topology::cryocon_22c());
        registry.add_alias(ChannelId::A, "cha");
        registry.add_alias(ChannelId::A, "CHA ");
        assert_eq!(registry.aliases(ChannelId::A), ["cha", "cha", "cha"]);
    }

    #[test]
    fn test_channels_in_canonical_order() {
        let registry = registry();
        let channels: Vec<_> = registry.channels().collect();
        assert_eq!(channels, vec![ChannelId::A, ChannelId::B]);
    }
}
