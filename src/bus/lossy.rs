//! Fault injection for the event bus.
//!
//! `LossyEventBus` wraps another bus and loses a random fraction of
//! publishes. How a loss shows up to the publisher depends on `DropMode`:
//!
//! - `Reject`: the publish fails, the outbox keeps the row and the recovery
//!   task redelivers it later. The read model converges.
//! - `Silent`: the publish reports success and the event is gone. The
//!   outbox row is deleted and the read model diverges for good.
//!
//! Enabled by the `lossy` feature.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use super::{BusError, EventBus, EventHandler, Result, Subscription};
use crate::events::EventEnvelope;

/// How a lost publish is reported to the publisher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DropMode {
    /// Fail the publish so the outbox retries it.
    #[default]
    Reject,
    /// Report success and lose the event.
    Silent,
}

/// Bus wrapper that loses a fraction of publishes.
///
/// The drop rate can change while the bus is shared.
pub struct LossyEventBus<B: EventBus> {
    inner: B,
    mode: DropMode,
    // f64 bits
    drop_rate: AtomicU64,
    dropped: AtomicU64,
    forwarded: AtomicU64,
}

fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

impl<B: EventBus> LossyEventBus<B> {
    pub fn new(inner: B, drop_rate: f64, mode: DropMode) -> Self {
        let drop_rate = clamp_rate(drop_rate);
        if drop_rate > 0.0 {
            warn!(drop_rate = drop_rate, mode = ?mode, "Event bus loses a fraction of publishes");
        }
        Self {
            inner,
            mode,
            drop_rate: AtomicU64::new(drop_rate.to_bits()),
            dropped: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn mode(&self) -> DropMode {
        self.mode
    }

    pub fn drop_rate(&self) -> f64 {
        f64::from_bits(self.drop_rate.load(Ordering::Relaxed))
    }

    /// Change the drop rate, clamped to `[0, 1]`.
    pub fn set_drop_rate(&self, rate: f64) {
        self.drop_rate
            .store(clamp_rate(rate).to_bits(), Ordering::Relaxed);
    }

    /// Publishes lost so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Publishes handed to the inner bus so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    fn lose(&self) -> bool {
        match self.drop_rate() {
            rate if rate <= 0.0 => false,
            rate if rate >= 1.0 => true,
            rate => rand::rng().random::<f64>() < rate,
        }
    }
}

#[async_trait]
impl<B: EventBus> EventBus for LossyEventBus<B> {
    async fn publish(&self, envelope: Arc<EventEnvelope>) -> Result<()> {
        if !self.lose() {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
            return self.inner.publish(envelope).await;
        }

        self.dropped.fetch_add(1, Ordering::Relaxed);
        debug!(
            event = envelope.name(),
            event_id = %envelope.event_id,
            mode = ?self.mode,
            "Publish lost"
        );
        match self.mode {
            DropMode::Reject => Err(BusError::Publish(format!(
                "injected loss of {} {}",
                envelope.name(),
                envelope.event_id
            ))),
            DropMode::Silent => Ok(()),
        }
    }

    async fn subscribe(
        &self,
        filter: &str,
        handler: Box<dyn EventHandler>,
    ) -> Result<Subscription> {
        self.inner.subscribe(filter, handler).await
    }
}
