//! Push-channel registry.
//!
//! Maps a connected client id to an unbounded sender. Pushes take the read
//! lock; registration and removal take the write lock.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Thread-safe registry of live push channels.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<Uuid, mpsc::UnboundedSender<String>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel for `id`, replacing any previous one.
    pub async fn add(&self, id: Uuid) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.channels.write().await.insert(id, tx).is_some() {
            debug!(id = %id, "Replaced existing push channel");
        } else {
            info!(id = %id, "Push channel registered");
        }
        rx
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.channels.write().await.remove(&id).is_some();
        if removed {
            info!(id = %id, "Push channel removed");
        }
        removed
    }

    /// Push `message` to `id`. Returns false when no live channel exists.
    ///
    /// A channel whose receiver has gone away is pruned.
    pub async fn push(&self, id: Uuid, message: impl Into<String>) -> bool {
        let closed = {
            let channels = self.channels.read().await;
            match channels.get(&id) {
                None => return false,
                Some(tx) => tx.send(message.into()).is_err(),
            }
        };

        if closed {
            let mut channels = self.channels.write().await;
            // Re-check: a fresh channel may have been added meanwhile
            if channels.get(&id).is_some_and(|tx| tx.is_closed()) {
                channels.remove(&id);
                debug!(id = %id, "Pruned closed push channel");
            }
            return false;
        }
        true
    }

    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }
}
