//! Process wiring.
//!
//! Builds every component from a `Config`: SQLite command store, in-process
//! bus, outbox relay and its recovery task, the in-memory read model and its
//! projector, the command and query services, and the upload worker.
//!
//! The read model lives in memory only. Each start loads it from the command
//! store before any subscription exists.

use std::sync::Arc;

use tracing::info;

use crate::aggregation::SummaryService;
use crate::bus::{
    spawn_recovery_task, ChannelEventBus, EventBus, MessagingConfig, OutboxRelay,
    RecoveryTaskHandle, Subscription,
};
use crate::config::Config;
use crate::ingest::IngestionPipeline;
use crate::notify::{build_mailer, Mailer, NotificationDispatcher};
use crate::projector::{MemoryReadStore, ReadModelProjector};
use crate::registry::ChannelRegistry;
use crate::services::{CommandService, FileUploadService, UploadWorker};
use crate::storage::{init_storage, SqliteCommandStore};

/// Rows read per page when loading the read model at startup.
const REBUILD_PAGE_SIZE: u32 = 1000;

/// All long-lived components of a running process.
pub struct Runtime {
    store: Arc<SqliteCommandStore>,
    bus: Arc<dyn EventBus>,
    relay: Arc<OutboxRelay>,
    read: Arc<MemoryReadStore>,
    commands: Arc<CommandService>,
    ingestion: Arc<IngestionPipeline>,
    summaries: Arc<SummaryService>,
    notifier: Arc<NotificationDispatcher>,
    registry: Arc<ChannelRegistry>,
    uploads: Arc<FileUploadService>,
    recovery: RecoveryTaskHandle,
    subscriptions: Vec<Subscription>,
}

fn build_bus(config: &MessagingConfig) -> Arc<dyn EventBus> {
    let channel = ChannelEventBus::new(config.channel_capacity);

    #[cfg(feature = "lossy")]
    if config.drop_rate > 0.0 {
        use crate::bus::{DropMode, LossyEventBus};
        let mode = if config.reject_drops {
            DropMode::Reject
        } else {
            DropMode::Silent
        };
        return Arc::new(LossyEventBus::new(channel, config.drop_rate, mode));
    }

    #[cfg(not(feature = "lossy"))]
    if config.drop_rate > 0.0 {
        tracing::warn!(drop_rate = config.drop_rate, "drop_rate ignored: built without the lossy feature");
    }

    Arc::new(channel)
}

impl Runtime {
    /// Build with the mailer selected by `config.notification`.
    pub async fn build(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let mailer = build_mailer(&config.notification)?;
        Self::build_with_mailer(config, mailer).await
    }

    /// Build with an explicit mailer.
    pub async fn build_with_mailer(
        config: &Config,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let store = init_storage(&config.storage).await?;
        let bus = build_bus(&config.messaging);

        let relay = Arc::new(OutboxRelay::new(
            store.clone(),
            bus.clone(),
            config.outbox.clone(),
        ));

        // Load committed state, then subscribe, before anything can publish
        let read = Arc::new(MemoryReadStore::new());
        let projector = ReadModelProjector::new(read.clone());
        projector
            .rebuild(store.as_ref(), store.as_ref(), REBUILD_PAGE_SIZE)
            .await?;
        let mut subscriptions = projector.subscribe_all(bus.as_ref()).await?;
        let recovery = spawn_recovery_task(relay.clone(), config.outbox.recovery_interval_secs);

        let commands = Arc::new(CommandService::new(store.clone(), relay.clone()));
        let ingestion = Arc::new(IngestionPipeline::new(commands.clone()));
        let summaries = Arc::new(SummaryService::new(
            read.clone(),
            config.ingest.summary_page_size,
        ));
        let notifier = Arc::new(NotificationDispatcher::new(
            store.clone(),
            mailer,
            config.notification.sender.clone(),
        ));
        let registry = Arc::new(ChannelRegistry::new());

        let worker = UploadWorker::new(
            ingestion.clone(),
            summaries.clone(),
            read.clone(),
            notifier.clone(),
            registry.clone(),
            config.ingest.clone(),
        );
        subscriptions.push(worker.subscribe(bus.as_ref()).await?);
        let uploads = Arc::new(FileUploadService::new(bus.clone()));

        info!(
            storage = %config.storage.path,
            subscriptions = subscriptions.len(),
            "Runtime started"
        );

        Ok(Self {
            store,
            bus,
            relay,
            read,
            commands,
            ingestion,
            summaries,
            notifier,
            registry,
            uploads,
            recovery,
            subscriptions,
        })
    }

    pub fn store(&self) -> &Arc<SqliteCommandStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub fn relay(&self) -> &Arc<OutboxRelay> {
        &self.relay
    }

    /// The read projection.
    pub fn read(&self) -> &Arc<MemoryReadStore> {
        &self.read
    }

    pub fn commands(&self) -> &Arc<CommandService> {
        &self.commands
    }

    pub fn ingestion(&self) -> &Arc<IngestionPipeline> {
        &self.ingestion
    }

    pub fn summaries(&self) -> &Arc<SummaryService> {
        &self.summaries
    }

    pub fn notifier(&self) -> &Arc<NotificationDispatcher> {
        &self.notifier
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn uploads(&self) -> &Arc<FileUploadService> {
        &self.uploads
    }

    /// Stop background work. Events published afterwards reach no handler.
    pub fn shutdown(mut self) {
        self.recovery.stop();
        for subscription in &mut self.subscriptions {
            subscription.cancel();
        }
        info!("Runtime stopped");
    }
}
