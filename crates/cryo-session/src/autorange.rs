//! Heater range auto-adjustment
//!
//! One call to [`AutoRange::adjust`] is one discrete control step: for each
//! channel with a loop, read the heater output and move the range one notch
//! along `low < mid < hi` when the output leaves the threshold band. Steps
//! past either end of the ladder are dropped. Polling is up to the caller.

use cryo_protocol::{LoopId, RangeLevel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::session::DeviceSession;
use crate::transport::Transport;

/// Output thresholds for range switching, as fractions of full power
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AutoRange {
    /// Step the range down when output falls below this
    pub threshold_low: f64,
    /// Step the range up when output rises above this
    pub threshold_high: f64,
}

impl Default for AutoRange {
    fn default() -> Self {
        Self {
            threshold_low: 0.09,
            threshold_high: 0.95,
        }
    }
}

/// A range write issued by [`AutoRange::adjust`]
#[derive(Debug, Clone, PartialEq)]
pub struct RangeChange {
    /// Channel name the change was made for
    pub channel: String,
    /// Loop whose range changed
    pub loop_id: LoopId,
    /// Output fraction that triggered the change
    pub output: f64,
    /// Range before
    pub from: RangeLevel,
    /// Range after
    pub to: RangeLevel,
}

impl AutoRange {
    /// Create with custom thresholds
    pub fn new(threshold_low: f64, threshold_high: f64) -> Self {
        Self {
            threshold_low,
            threshold_high,
        }
    }

    /// Ladder step for an output fraction: -1, 0 or +1
    pub fn step_for(&self, output: f64) -> i8 {
        if output < self.threshold_low {
            -1
        } else if output > self.threshold_high {
            1
        } else {
            0
        }
    }

    /// Run one adjustment pass.
    ///
    /// `channels` defaults to every registered input. Channels without a
    /// loop are skipped. Returns the range writes that were issued.
    pub fn adjust<T: Transport>(
        &self,
        session: &mut DeviceSession<T>,
        channels: Option<&[&str]>,
    ) -> Result<Vec<RangeChange>> {
        let names: Vec<String> = match channels {
            Some(list) => list.iter().map(|c| c.to_string()).collect(),
            None => session
                .channels()?
                .keys()
                .map(|c| c.token().to_string())
                .collect(),
        };

        let mut changes = Vec::new();
        for name in names {
            let Some(loop_id) = session.channel_loop(&name)? else {
                debug!("Channel {:?} has no loop, skipping", name);
                continue;
            };

            let output = session.output(loop_id)?;
            let range = session.range(loop_id)?;

            let delta = self.step_for(output);
            if delta == 0 {
                continue;
            }

            let from: RangeLevel = range.parse()?;
            let Some(to) = from.step(delta) else {
                debug!(
                    "Loop {} output {:.3} but range already at {}",
                    loop_id, output, from
                );
                continue;
            };

            session.set_range(loop_id, to.as_str())?;
            info!(
                "Loop {} output {:.3}: range {} -> {}",
                loop_id, output, from, to
            );
            changes.push(RangeChange {
                channel: name,
                loop_id,
                output,
                from,
                to,
            });
        }

        Ok(changes)
    }
}
