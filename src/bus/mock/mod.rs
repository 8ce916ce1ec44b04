//! Mock event bus implementation for testing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::dispatch::dispatch_to_handlers;
use super::{topic_matches, BusError, EventBus, EventHandler, Result, Subscription};
use crate::events::EventEnvelope;

struct MockSubscriber {
    filter: String,
    active: Arc<AtomicBool>,
    handler: Arc<dyn EventHandler>,
}

/// Mock event bus for testing.
///
/// Records every accepted publish. Subscribed handlers run inline before
/// `publish` returns, which keeps tests deterministic.
#[derive(Default)]
pub struct MockEventBus {
    published: RwLock<Vec<EventEnvelope>>,
    subscribers: RwLock<Vec<MockSubscriber>>,
    fail_on_publish: RwLock<bool>,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.fail_on_publish.write().await = fail;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn published_names(&self) -> Vec<&'static str> {
        self.published.read().await.iter().map(|e| e.name()).collect()
    }

    pub async fn take_published(&self) -> Vec<EventEnvelope> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl EventBus for MockEventBus {
    async fn publish(&self, envelope: Arc<EventEnvelope>) -> Result<()> {
        if *self.fail_on_publish.read().await {
            return Err(BusError::Connection("Mock publish failure".to_string()));
        }
        self.published.write().await.push((*envelope).clone());

        let handlers: Vec<Arc<dyn EventHandler>> = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.retain(|s| s.active.load(Ordering::SeqCst));
            subscribers
                .iter()
                .filter(|s| topic_matches(envelope.name(), &s.filter))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };
        dispatch_to_handlers(&handlers, &envelope).await;

        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        handler: Box<dyn EventHandler>,
    ) -> Result<Subscription> {
        let active = Arc::new(AtomicBool::new(true));
        self.subscribers.write().await.push(MockSubscriber {
            filter: filter.to_string(),
            active: Arc::clone(&active),
            handler: Arc::from(handler),
        });
        Ok(Subscription::inline(filter, active))
    }
}
