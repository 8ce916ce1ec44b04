//! Event bus for async delivery.
//!
//! This module contains:
//! - `EventBus` trait: best-effort publish/subscribe of domain events
//! - `EventHandler` trait: for processing delivered events
//! - Bus configuration types
//! - Implementations: in-process channel, mock, lossy wrapper
//! - The transactional outbox relay that feeds the bus from the command store
//!
//! Delivery through a bus is at-most-once and non-durable: a subscriber that
//! is not subscribed when `publish` runs never sees the message. Durability
//! comes from the outbox, which redelivers until the bus accepts the event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::events::EventEnvelope;

// Implementation modules
pub mod channel;
pub mod dispatch;
#[cfg(feature = "lossy")]
pub mod lossy;
pub mod mock;
pub mod outbox;

// Re-exports
pub use channel::ChannelEventBus;
#[cfg(feature = "lossy")]
pub use lossy::{DropMode, LossyEventBus};
pub use mock::MockEventBus;
pub use outbox::{spawn_recovery_task, OutboxConfig, OutboxRelay, RecoveryTaskHandle};

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Handler '{name}' failed: {message}")]
    HandlerFailed { name: String, message: String },
}

/// Handler for processing events from the bus.
pub trait EventHandler: Send + Sync {
    /// Process one delivered event.
    fn handle(&self, envelope: Arc<EventEnvelope>)
        -> BoxFuture<'static, std::result::Result<(), BusError>>;
}

/// Interface for best-effort event delivery.
///
/// Implementations:
/// - `ChannelEventBus`: tokio broadcast channel, in-process
/// - `MockEventBus`: records publishes, dispatches inline (tests)
/// - `LossyEventBus`: loses a fraction of publishes (fault injection, `lossy` feature)
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to whoever is currently subscribed.
    ///
    /// Does not wait for handlers to finish.
    async fn publish(&self, envelope: Arc<EventEnvelope>) -> Result<()>;

    /// Subscribe a handler to events whose name matches `filter`.
    ///
    /// Delivery stops when the returned `Subscription` is cancelled or dropped.
    async fn subscribe(&self, filter: &str, handler: Box<dyn EventHandler>)
        -> Result<Subscription>;
}

/// Check if an event name matches a subscription filter.
///
/// Matching rules:
/// - "#" matches all events
/// - Exact match: "account.created" matches "account.created"
/// - Hierarchical: "account" matches "account.created" (prefix match with dot separator)
pub fn topic_matches(name: &str, filter: &str) -> bool {
    if filter == "#" {
        return true;
    }
    if name == filter {
        return true;
    }
    name.starts_with(filter) && name[filter.len()..].starts_with('.')
}

/// Handle for an active subscription.
pub struct Subscription {
    filter: String,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    cancel_on_drop: bool,
}

impl Subscription {
    /// Subscription driven by a consumer task.
    pub fn with_task(filter: impl Into<String>, active: Arc<AtomicBool>, task: JoinHandle<()>) -> Self {
        Self {
            filter: filter.into(),
            active,
            task: Some(task),
            cancel_on_drop: true,
        }
    }

    /// Subscription whose deliveries are driven by the bus itself.
    pub fn inline(filter: impl Into<String>, active: Arc<AtomicBool>) -> Self {
        Self {
            filter: filter.into(),
            active,
            task: None,
            cancel_on_drop: true,
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop receiving events.
    pub fn cancel(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Keep the subscription alive for the rest of the process.
    pub fn detach(mut self) {
        self.cancel_on_drop = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.cancel_on_drop {
            self.cancel();
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Broadcast buffer per subscriber. Slow subscribers lose messages beyond this.
    pub channel_capacity: usize,
    /// Fraction of publishes to lose (only honoured with the `lossy` feature).
    pub drop_rate: f64,
    /// Report lost publishes as failures so the outbox retries them.
    pub reject_drops: bool,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            channel_capacity: channel::DEFAULT_CHANNEL_CAPACITY,
            drop_rate: 0.0,
            reject_drops: true,
        }
    }
}

#[cfg(test)]
mod tests;
