//! Loop-to-input binding
//!
//! Each loop reports the input it regulates (`loop 1:source?` -> `cha`).
//! The reported text is kept as-is and resolved through the
//! [`ChannelRegistry`] on every lookup, so display names configured on the
//! device work as sources too.

use std::collections::BTreeMap;

use cryo_protocol::{ChannelId, LoopId};

use crate::registry::ChannelRegistry;

/// Source input reported by each loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopSources {
    sources: BTreeMap<LoopId, String>,
}

impl LoopSources {
    /// Create an empty source table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the source reported by a loop (stored lower-cased)
    pub fn insert(&mut self, loop_id: LoopId, source: &str) {
        self.sources.insert(loop_id, source.trim().to_lowercase());
    }

    /// Reported source of a loop
    pub fn source(&self, loop_id: LoopId) -> Option<&str> {
        self.sources.get(&loop_id).map(String::as_str)
    }

    /// Full source table
    pub fn as_map(&self) -> &BTreeMap<LoopId, String> {
        &self.sources
    }

    /// Input feeding a loop, if its source is a known input
    pub fn source_channel(&self, registry: &ChannelRegistry, loop_id: LoopId) -> Option<ChannelId> {
        self.source(loop_id).and_then(|s| registry.resolve(s))
    }

    /// Find the loop regulating the named channel.
    ///
    /// Only `controlled` loops are scanned, in the given order; the first
    /// loop whose source resolves to the channel wins.
    pub fn loop_for_channel(
        &self,
        registry: &ChannelRegistry,
        controlled: &[LoopId],
        channel: &str,
    ) -> Option<LoopId> {
        let channel = registry.resolve(channel)?;
        controlled
            .iter()
            .copied()
            .find(|&loop_id| self.source_channel(registry, loop_id) == Some(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Topology;

    const CONTROLLED: [LoopId; 2] = [LoopId::Loop1, LoopId::Loop2];

    fn registry() -> ChannelRegistry {
        let mut registry = ChannelRegistry::seeded(&Topology::cryocon_22c());
        registry.add_alias(ChannelId::A, "Sample");
        registry.add_alias(ChannelId::B, "Shield");
        registry
    }

    fn sources(pairs: &[(LoopId, &str)]) -> LoopSources {
        let mut sources = LoopSources::new();
        for (loop_id, source) in pairs {
            sources.insert(*loop_id, source);
        }
        sources
    }

    #[test]
    fn test_sources_stored_lowercase() {
        let sources = sources(&[(LoopId::Loop1, "ChA\r\n")]);
        assert_eq!(sources.source(LoopId::Loop1), Some("cha"));
        assert_eq!(sources.source(LoopId::Loop2), None);
    }

    #[test]
    fn test_loop_for_channel() {
        let registry = registry();
        let sources = sources(&[(LoopId::Loop1, "cha"), (LoopId::Loop2, "chb")]);

        assert_eq!(
            sources.loop_for_channel(&registry, &CONTROLLED, "a"),
            Some(LoopId::Loop1)
        );
        assert_eq!(
            sources.loop_for_channel(&registry, &CONTROLLED, "shield"),
            Some(LoopId::Loop2)
        );
    }

    #[test]
    fn test_first_loop_wins() {
        let registry = registry();
        let sources = sources(&[(LoopId::Loop1, "cha"), (LoopId::Loop2, "cha")]);

        assert_eq!(
            sources.loop_for_channel(&registry, &CONTROLLED, "cha"),
            Some(LoopId::Loop1)
        );
        assert_eq!(sources.loop_for_channel(&registry, &CONTROLLED, "b"), None);
    }

    #[test]
    fn test_uncontrolled_loops_ignored() {
        let registry = registry();
        let sources = sources(&[
            (LoopId::Loop1, "cha"),
            (LoopId::Loop2, "cha"),
            (LoopId::Loop3, "chb"),
            (LoopId::Loop4, "chb"),
        ]);

        assert_eq!(sources.loop_for_channel(&registry, &CONTROLLED, "b"), None);
    }

    #[test]
    fn test_unknown_channel_has_no_loop() {
        let registry = registry();
        let sources = sources(&[(LoopId::Loop1, "cha")]);
        assert_eq!(sources.loop_for_channel(&registry, &CONTROLLED, "c"), None);
    }

    #[test]
    fn test_unresolvable_source_has_no_channel() {
        let registry = registry();
        let sources = sources(&[(LoopId::Loop1, "none"), (LoopId::Loop2, "chb")]);

        assert_eq!(sources.source_channel(&registry, LoopId::Loop1), None);
        assert_eq!(sources.loop_for_channel(&registry, &CONTROLLED, "a"), None);
        assert_eq!(
            sources.loop_for_channel(&registry, &CONTROLLED, "b"),
            Some(LoopId::Loop2)
        );
    }

    #[test]
    fn test_source_by_display_name() {
        let registry = registry();
        let sources = sources(&[(LoopId::Loop1, "Sample")]);
        assert_eq!(
            sources.source_channel(&registry, LoopId::Loop1),
            Some(ChannelId::A)
        );
    }
}
