//! In-memory channel-based event bus.
//!
//! Uses a tokio broadcast channel for pub/sub within a single process.
//! Each subscription owns a receiver created at subscribe time, so it only
//! sees events published afterwards. Every matching delivery runs on its own
//! task: handlers execute concurrently with each other and with publishers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::dispatch::spawn_dispatch;
use super::{topic_matches, EventBus, EventHandler, Result, Subscription};
use crate::events::EventEnvelope;

/// Default channel capacity for broadcast.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// In-memory event bus using tokio broadcast channels.
///
/// Events are published to a broadcast channel and received by all current
/// subscribers. Topic filtering is done on the subscriber side.
#[derive(Clone)]
pub struct ChannelEventBus {
    sender: broadcast::Sender<Arc<EventEnvelope>>,
}

impl ChannelEventBus {
    /// Create a new channel event bus.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        info!(capacity = capacity, "Channel event bus initialized");

        Self { sender }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChannelEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(event = %envelope.name()))]
    async fn publish(&self, envelope: Arc<EventEnvelope>) -> Result<()> {
        let event_id = envelope.event_id;

        // Send to channel (ignore error if no receivers)
        match self.sender.send(envelope) {
            Ok(receiver_count) => {
                debug!(
                    event_id = %event_id,
                    receivers = receiver_count,
                    "Published event to channel"
                );
            }
            Err(_) => {
                // Nobody listening: the message is gone, as with any at-most-once bus
                debug!(event_id = %event_id, "Published event (no receivers)");
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        handler: Box<dyn EventHandler>,
    ) -> Result<Subscription> {
        let mut receiver = self.sender.subscribe();
        let active = Arc::new(AtomicBool::new(true));
        let task_active = Arc::clone(&active);
        let task_filter = filter.to_string();

        // Spawn consumer task
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        if !task_active.load(Ordering::SeqCst) {
                            break;
                        }
                        if !topic_matches(envelope.name(), &task_filter) {
                            continue;
                        }

                        debug!(
                            event = envelope.name(),
                            event_id = %envelope.event_id,
                            filter = %task_filter,
                            "Received event via channel"
                        );

                        spawn_dispatch(handler.as_ref(), envelope);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, filter = %task_filter, "Channel consumer lagged, skipped messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(filter = %task_filter, "Channel closed, stopping consumer");
                        break;
                    }
                }
            }
        });

        info!(filter = %filter, "Handler subscribed to channel bus");

        Ok(Subscription::with_task(filter, active, task))
    }
}
