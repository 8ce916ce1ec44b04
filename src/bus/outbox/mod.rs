//! Transactional outbox relay.
//!
//! The command store appends every event envelope to an outbox table inside
//! the same relational transaction as the entity change. This relay moves
//! envelopes from the outbox onto the bus:
//!
//! 1. Right after commit, the command path calls [`OutboxRelay::deliver`]
//! 2. Each envelope the bus accepts is deleted from the outbox
//! 3. Envelopes the bus rejects stay behind for [`OutboxRelay::recover_pending`]
//!
//! Delivery is at-least-once: a crash between publish and delete redelivers
//! the envelope, so consumers deduplicate by `event_id`.
//!
//! # Configuration
//!
//! ```yaml
//! outbox:
//!   max_retries: 10
//!   recovery_interval_secs: 5
//!   batch_size: 100
//!   min_age_secs: 30
//! ```

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::EventBus;
use crate::events::EventEnvelope;
use crate::storage::{self, OutboxStore};

// ============================================================================
// Configuration
// ============================================================================

/// Outbox configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Delivery attempts before a row is left for manual inspection. Default: 10.
    pub max_retries: u32,
    /// Interval in seconds for background recovery. Default: 5.
    pub recovery_interval_secs: u64,
    /// Rows fetched per recovery pass. Default: 100.
    pub batch_size: u32,
    /// Rows younger than this are left to the command path. Default: 30.
    pub min_age_secs: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            recovery_interval_secs: 5,
            batch_size: 100,
            min_age_secs: 30,
        }
    }
}

// ============================================================================
// Relay
// ============================================================================

/// Moves committed envelopes from the outbox onto the bus.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn EventBus>,
    config: OutboxConfig,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn OutboxStore>, bus: Arc<dyn EventBus>, config: OutboxConfig) -> Self {
        Self { store, bus, config }
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    /// Publish freshly committed envelopes.
    ///
    /// Never fails: a rejected publish is logged and the row stays in the
    /// outbox for recovery. Returns the number of envelopes the bus accepted.
    pub async fn deliver(&self, envelopes: &[EventEnvelope]) -> usize {
        let mut delivered = 0;

        for envelope in envelopes {
            let event_id = envelope.event_id;
            match self.bus.publish(Arc::new(envelope.clone())).await {
                Ok(()) => {
                    delivered += 1;
                    if let Err(e) = self.store.mark_delivered(event_id).await {
                        // The row will be redelivered; consumers dedup by id
                        warn!(event_id = %event_id, error = %e, "Failed to delete from outbox after successful publish");
                    }
                }
                Err(e) => {
                    warn!(
                        event = envelope.name(),
                        event_id = %event_id,
                        error = %e,
                        "Publish failed, event kept in outbox"
                    );
                }
            }
        }

        debug!(delivered = delivered, total = envelopes.len(), "Outbox delivery finished");
        delivered
    }

    /// Redeliver outbox rows left behind by failed or interrupted publishes.
    pub async fn recover_pending(&self) -> storage::Result<u32> {
        let rows = self
            .store
            .pending(self.config.batch_size, self.config.max_retries, self.config.min_age_secs)
            .await?;

        let mut recovered = 0u32;
        for row in rows {
            match EventEnvelope::from_json(&row.payload) {
                Ok(envelope) => match self.bus.publish(Arc::new(envelope)).await {
                    Ok(()) => {
                        if let Err(e) = self.store.mark_delivered(row.event_id).await {
                            error!(event_id = %row.event_id, error = %e, "Failed to delete recovered event from outbox");
                        } else {
                            recovered += 1;
                            debug!(event_id = %row.event_id, "Recovered pending event");
                        }
                    }
                    Err(e) => {
                        warn!(
                            event_id = %row.event_id,
                            retry_count = row.retry_count + 1,
                            error = %e,
                            "Failed to recover event"
                        );
                        self.store.mark_failed(row.event_id).await?;
                    }
                },
                Err(e) => {
                    error!(event_id = %row.event_id, error = %e, "Failed to decode outbox event, discarding");
                    self.store.discard(row.event_id).await?;
                }
            }
        }

        if recovered > 0 {
            info!(recovered = recovered, "Recovered pending events from outbox");
        }

        Ok(recovered)
    }
}

// ============================================================================
// Background Recovery Task
// ============================================================================

/// Handle to a running recovery task.
pub struct RecoveryTaskHandle {
    cancel: tokio::sync::watch::Sender<bool>,
}

impl RecoveryTaskHandle {
    /// Signal the recovery task to stop.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Spawn a background task that periodically recovers pending events.
///
/// Returns a handle that can be used to stop the task.
pub fn spawn_recovery_task(relay: Arc<OutboxRelay>, interval_secs: u64) -> RecoveryTaskHandle {
    let (cancel_tx, mut cancel_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        let interval = std::time::Duration::from_secs(interval_secs.max(1));
        info!(interval_secs = interval_secs, "Outbox recovery task started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = relay.recover_pending().await {
                        error!(error = %e, "Outbox recovery failed");
                    }
                }
                changed = cancel_rx.changed() => {
                    // A dropped handle stops the task too
                    if changed.is_err() || *cancel_rx.borrow() {
                        info!("Outbox recovery task stopped");
                        break;
                    }
                }
            }
        }
    });

    RecoveryTaskHandle { cancel: cancel_tx }
}

// ============================================================================
// Tests
// ============================================================================
