//! Domain events carried from the command side to subscribers.
//!
//! Payloads are a closed set of tagged variants, one per event name, wrapped
//! in a versioned [`EventEnvelope`]. The JSON form is what the outbox stores
//! and what an external broker would carry:
//!
//! ```json
//! { "event_id": "...", "schema_version": 1, "occurred_at": "...",
//!   "aggregate_id": "...", "event": "account.created", "data": { ... } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Account, Transaction};

pub const ACCOUNT_CREATED: &str = "account.created";
pub const ACCOUNT_UPDATED: &str = "account.updated";
pub const ACCOUNT_DELETED: &str = "account.deleted";
pub const TRANSACTION_CREATED: &str = "transaction.created";
pub const TRANSACTION_FILE_UPLOADED: &str = "transaction.file.uploaded";

/// Envelope schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors decoding an envelope from its wire form.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported schema version {found} (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },
}

/// Identifier-only payload for deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedAccount {
    pub id: Uuid,
}

/// A batch file handed to the ingestion worker out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploaded {
    pub file_name: String,
    /// Path readable by the worker. Used when `file_content` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Base64 (standard alphabet) file bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    pub user_id: Uuid,
}

/// Every event the system emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum DomainEvent {
    #[serde(rename = "account.created")]
    AccountCreated(Account),
    #[serde(rename = "account.updated")]
    AccountUpdated(Account),
    #[serde(rename = "account.deleted")]
    AccountDeleted(DeletedAccount),
    #[serde(rename = "transaction.created")]
    TransactionCreated(Transaction),
    #[serde(rename = "transaction.file.uploaded")]
    FileUploaded(FileUploaded),
}

impl DomainEvent {
    /// Bus topic of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccountCreated(_) => ACCOUNT_CREATED,
            Self::AccountUpdated(_) => ACCOUNT_UPDATED,
            Self::AccountDeleted(_) => ACCOUNT_DELETED,
            Self::TransactionCreated(_) => TRANSACTION_CREATED,
            Self::FileUploaded(_) => TRANSACTION_FILE_UPLOADED,
        }
    }

    /// Identifier of the entity the event is about.
    pub fn aggregate_id(&self) -> Uuid {
        match self {
            Self::AccountCreated(a) | Self::AccountUpdated(a) => a.id,
            Self::AccountDeleted(d) => d.id,
            Self::TransactionCreated(t) => t.id,
            Self::FileUploaded(f) => f.user_id,
        }
    }
}

/// Versioned wrapper with a unique id used for consumer-side deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub schema_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub aggregate_id: Uuid,
    #[serde(flatten)]
    pub event: DomainEvent,
}

impl EventEnvelope {
    pub fn new(event: DomainEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            schema_version: SCHEMA_VERSION,
            occurred_at: Utc::now(),
            aggregate_id: event.aggregate_id(),
            event,
        }
    }

    pub fn name(&self) -> &'static str {
        self.event.name()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode the wire form, rejecting envelopes from another schema version.
    pub fn from_json(bytes: &[u8]) -> Result<Self, EventDecodeError> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        if envelope.schema_version != SCHEMA_VERSION {
            return Err(EventDecodeError::UnsupportedSchema {
                found: envelope.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(envelope)
    }
}
