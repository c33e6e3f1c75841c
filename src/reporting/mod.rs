//! Bus report handling
//!
//! - [`aggregator`]: reacts to one bus write by merging counters into the
//!   day's statistics record
//! - [`listener`]: delivers write notifications from the feed to the aggregator
//! - [`stats`]: reads today's statistics and the live bus collection

pub mod aggregator;
pub mod listener;
pub mod stats;

use serde::{Deserialize, Serialize};

pub use aggregator::{ReactionOutcome, WriteReactionHandler};
pub use listener::{ListenerHealthChecker, WriteReactionListener};
pub use stats::{StatsQueryService, StatsSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Queue size per feed subscriber; writers wait while it is full
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_feed_capacity() -> usize {
    1024
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            feed_capacity: default_feed_capacity(),
        }
    }
}
