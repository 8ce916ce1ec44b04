//! Out-of-band batch uploads.
//!
//! `FileUploadService` publishes a `transaction.file.uploaded` event carrying
//! the file bytes. `UploadWorker` consumes it: ingest, wait for the read side
//! to catch up, summarize, notify the account holder and push the summary to
//! any connected client.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::BoxFuture;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::aggregation::{SummaryError, SummaryService};
use crate::bus::{self, BusError, EventBus, EventHandler, Subscription};
use crate::domain::TransactionSummary;
use crate::events::{DomainEvent, EventEnvelope, FileUploaded, TRANSACTION_FILE_UPLOADED};
use crate::ingest::{IngestConfig, IngestError, IngestReport, IngestionPipeline};
use crate::notify::{NotificationDispatcher, NotifyError};
use crate::projector::ReadStore;
use crate::registry::ChannelRegistry;
use crate::utils::bootstrap::wait_until;

/// Push message type for summary updates.
pub const TRANSACTION_UPDATE: &str = "transaction_update";

/// Result type for upload processing.
pub type Result<T> = std::result::Result<T, UploadError>;

/// Errors from processing one uploaded file.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload carries neither content nor a path")]
    MissingContent,

    #[error("Invalid base64 content: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to read upload: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Summary failed: {0}")]
    Summary(#[from] SummaryError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Publishes uploaded files for asynchronous processing.
pub struct FileUploadService {
    bus: Arc<dyn EventBus>,
}

impl FileUploadService {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Publish `bytes` inline. Returns the event id, which doubles as the
    /// source file id of the resulting transactions.
    #[tracing::instrument(name = "upload", skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn upload(&self, file_name: &str, bytes: &[u8], user_id: Uuid) -> bus::Result<Uuid> {
        self.publish(FileUploaded {
            file_name: file_name.to_string(),
            file_path: None,
            file_content: Some(STANDARD.encode(bytes)),
            user_id,
        })
        .await
    }

    /// Publish a reference to a file the worker can read itself.
    pub async fn upload_path(&self, file_name: &str, path: &str, user_id: Uuid) -> bus::Result<Uuid> {
        self.publish(FileUploaded {
            file_name: file_name.to_string(),
            file_path: Some(path.to_string()),
            file_content: None,
            user_id,
        })
        .await
    }

    async fn publish(&self, upload: FileUploaded) -> bus::Result<Uuid> {
        let envelope = EventEnvelope::new(DomainEvent::FileUploaded(upload));
        let event_id = envelope.event_id;
        self.bus.publish(Arc::new(envelope)).await?;
        info!(event_id = %event_id, "File upload published");
        Ok(event_id)
    }
}

/// What the worker did with one upload.
#[derive(Debug)]
pub struct UploadOutcome {
    pub report: IngestReport,
    pub summary: TransactionSummary,
    /// False when the read model did not contain every accepted transaction
    /// before the timeout; the summary may then be incomplete.
    pub converged: bool,
    /// Whether a connected client received the summary.
    pub pushed: bool,
}

/// Consumes `transaction.file.uploaded` events.
#[derive(Clone)]
pub struct UploadWorker {
    pipeline: Arc<IngestionPipeline>,
    summaries: Arc<SummaryService>,
    read: Arc<dyn ReadStore>,
    notifier: Arc<NotificationDispatcher>,
    registry: Arc<ChannelRegistry>,
    config: IngestConfig,
}

impl UploadWorker {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        summaries: Arc<SummaryService>,
        read: Arc<dyn ReadStore>,
        notifier: Arc<NotificationDispatcher>,
        registry: Arc<ChannelRegistry>,
        config: IngestConfig,
    ) -> Self {
        Self {
            pipeline,
            summaries,
            read,
            notifier,
            registry,
            config,
        }
    }

    pub async fn subscribe(&self, bus: &dyn EventBus) -> bus::Result<Subscription> {
        bus.subscribe(TRANSACTION_FILE_UPLOADED, Box::new(self.clone()))
            .await
    }

    async fn load(upload: &FileUploaded) -> Result<Vec<u8>> {
        match (&upload.file_content, &upload.file_path) {
            (Some(content), _) => Ok(STANDARD.decode(content)?),
            (None, Some(path)) => Ok(tokio::fs::read(path).await?),
            (None, None) => Err(UploadError::MissingContent),
        }
    }

    async fn projected(&self, ids: &[Uuid]) -> bool {
        for id in ids {
            match self.read.get_transaction(*id).await {
                Ok(Some(_)) => {}
                _ => return false,
            }
        }
        true
    }

    /// Process one upload end to end.
    ///
    /// A notification failure is returned after the push has been attempted.
    #[tracing::instrument(
        name = "upload_worker.process",
        skip_all,
        fields(file_name = %upload.file_name, user_id = %upload.user_id)
    )]
    pub async fn process(&self, source_file_id: &str, upload: &FileUploaded) -> Result<UploadOutcome> {
        let contents = Self::load(upload).await?;
        let report = self
            .pipeline
            .ingest(&contents, upload.user_id, source_file_id)
            .await?;

        let converged = wait_until(
            "read model convergence",
            Duration::from_millis(self.config.projection_timeout_ms),
            Duration::from_millis(self.config.projection_poll_ms),
            || self.projected(&report.transaction_ids),
        )
        .await;
        if !converged {
            warn!(
                accepted = report.accepted,
                timeout_ms = self.config.projection_timeout_ms,
                "Read model did not converge, summary may be incomplete"
            );
        }

        let summary = self.summaries.summarize(upload.user_id).await?;
        let notified = self.notifier.notify(&summary, upload.user_id).await;

        let message = serde_json::json!({
            "type": TRANSACTION_UPDATE,
            "summary": &summary,
        })
        .to_string();
        let pushed = self.registry.push(upload.user_id, message).await;

        notified?;
        info!(accepted = report.accepted, pushed = pushed, "Upload processed");

        Ok(UploadOutcome {
            report,
            summary,
            converged,
            pushed,
        })
    }
}

impl EventHandler for UploadWorker {
    fn handle(&self, envelope: Arc<EventEnvelope>) -> BoxFuture<'static, std::result::Result<(), BusError>> {
        let worker = self.clone();
        let span = tracing::info_span!("upload_worker.handle", event_id = %envelope.event_id);

        Box::pin(
            async move {
                let DomainEvent::FileUploaded(upload) = &envelope.event else {
                    return Ok(());
                };
                worker
                    .process(&envelope.event_id.to_string(), upload)
                    .await
                    .map(|_| ())
                    .map_err(|e| BusError::HandlerFailed {
                        name: "upload-worker".to_string(),
                        message: e.to_string(),
                    })
            }
            .instrument(span),
        )
    }
}
