//! Application services.

pub mod command;
pub mod upload;

pub use command::{CommandError, CommandService};
pub use upload::{FileUploadService, UploadError, UploadOutcome, UploadWorker};
