//! Fixed channel/loop layout of the controller family

use std::collections::BTreeMap;

use cryo_protocol::{ChannelId, LoopId};
use serde::{Deserialize, Serialize};

/// Canonical channel aliases and loop bindings supplied to a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    /// Inputs and the aliases they are seeded with at connect time
    pub channels: BTreeMap<ChannelId, Vec<String>>,
    /// Loops that are driven by an input, in lookup order
    pub controlled_loops: Vec<LoopId>,
}

impl Topology {
    /// Layout of the CryoCon 22C: inputs A/B (`cha`/`chb`), loops 1 and 2 controlled
    pub fn cryocon_22c() -> Self {
        let channels = BTreeMap::from([
            (ChannelId::A, vec!["cha".to_string()]),
            (ChannelId::B, vec!["chb".to_string()]),
        ]);

        Self {
            channels,
            controlled_loops: vec![LoopId::Loop1, LoopId::Loop2],
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Self::cryocon_22c()
    }
}
