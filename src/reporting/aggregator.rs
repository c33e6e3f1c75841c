use crate::{
    config::ServiceTimeZone,
    events::BusWriteEvent,
    metrics,
    storage::{BusRecord, DayKey, DocumentStore, StatsIncrement, StorageResult, StoreError},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};

/// Result of reacting to one bus write
///
/// Failures never propagate out of the handler: they end up as `Dropped`,
/// are logged and counted, and the increment for that write is lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// One merge was applied to the day's statistics
    Recorded { day: DayKey },
    /// The write was a deletion; nothing is counted
    IgnoredDeletion,
    /// The merge was not applied and will not be retried
    Dropped { reason: String },
}

impl ReactionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReactionOutcome::Recorded { .. } => "recorded",
            ReactionOutcome::IgnoredDeletion => "ignored_deletion",
            ReactionOutcome::Dropped { .. } => "dropped",
        }
    }
}

/// Turns bus writes into daily statistics increments
pub struct WriteReactionHandler {
    store: Arc<dyn DocumentStore>,
    time_zone: ServiceTimeZone,
}

impl WriteReactionHandler {
    pub fn new(store: Arc<dyn DocumentStore>, time_zone: ServiceTimeZone) -> Self {
        Self { store, time_zone }
    }

    pub async fn handle(&self, event: &BusWriteEvent) -> ReactionOutcome {
        self.handle_at(event, Utc::now()).await
    }

    /// React to `event` as if invoked at `now`
    pub async fn handle_at(&self, event: &BusWriteEvent, now: DateTime<Utc>) -> ReactionOutcome {
        let outcome = match &event.after {
            None => {
                info!("Bus {} document deleted", event.bus_id);
                ReactionOutcome::IgnoredDeletion
            }
            Some(record) => match self.record_report(&event.bus_id, record, now).await {
                Ok(day) => {
                    info!("Updated stats for bus {}", event.bus_id);
                    info!(
                        "Bus {} status: {} {}",
                        event.bus_id,
                        record.status,
                        record.status_text.as_deref().unwrap_or_default()
                    );
                    ReactionOutcome::Recorded { day }
                }
                Err(e) => {
                    error!("Error processing update for bus {}: {}", event.bus_id, e);
                    ReactionOutcome::Dropped {
                        reason: e.to_string(),
                    }
                }
            },
        };

        metrics::track_reaction(outcome.label());
        outcome
    }

    /// Build the merge payload for a report received at `now`.
    ///
    /// The day key is the UTC date of `now`; the hour is taken in the
    /// configured time zone. Both come from the invocation time, never from
    /// the record's own timestamp.
    pub fn increment_for(
        &self,
        bus_id: &str,
        record: &BusRecord,
        now: DateTime<Utc>,
    ) -> StorageResult<StatsIncrement> {
        let status_key = record.status_key().ok_or_else(|| {
            StoreError::InvalidData(format!("Bus {} report has no statusText", bus_id))
        })?;

        Ok(StatsIncrement {
            day: DayKey::for_instant(now),
            bus_id: bus_id.to_string(),
            status_key,
            hour: self.time_zone.hour_at(now),
        })
    }

    async fn record_report(
        &self,
        bus_id: &str,
        record: &BusRecord,
        now: DateTime<Utc>,
    ) -> StorageResult<DayKey> {
        let increment = self.increment_for(bus_id, record, now)?;
        self.store.merge_daily_stats(&increment).await?;
        Ok(increment.day)
    }
}
