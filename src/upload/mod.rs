//! Upload pipeline
//!
//! Incremental chunked multipart upload: incoming capture bytes are buffered
//! by [`ChunkAccumulator`], handed off as numbered parts through
//! [`UploadSession`] / [`PartUploader`], and assembled into the final object
//! by [`UploadCoordinator::finish`].
//!
//! Error policy:
//! - missing response attributes and transient store failures are retried
//!   during part upload (bounded), fatal during session creation
//! - expired credentials are terminal everywhere and notify the user once
//!   per failed call

use crate::config::ConfigError;
use crate::store::{StoreError, StoreOperation};
use thiserror::Error;

pub mod accumulator;
pub mod coordinator;
pub mod part;
pub mod session;

pub use accumulator::ChunkAccumulator;
pub use coordinator::{PipelineState, UploadCoordinator};
pub use part::PartUploader;
pub use session::UploadSession;

/// Upload pipeline errors
#[derive(Error, Debug)]
pub enum UploadError {
    /// The store answered successfully but omitted a required field
    #[error("{operation} response missing required `{field}`")]
    MissingAttribute {
        operation: StoreOperation,
        field: &'static str,
    },

    /// Temporary credentials have expired; retries cannot fix this
    #[error("storage credentials have expired; restart the recording session")]
    CredentialsExpired,

    /// Any other store failure (network, 5xx, timeout)
    #[error(transparent)]
    Transient(#[from] StoreError),

    /// A part upload exhausted its retry budget
    #[error("upload of part {part_number} failed after {attempts} attempts")]
    PartUploadFailed {
        part_number: u32,
        attempts: u32,
        #[source]
        source: Box<UploadError>,
    },

    /// The store client could not be built from the supplied configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An operation was called in a state that does not permit it
    #[error("invalid pipeline state: {0}")]
    InvalidState(&'static str),

    /// A spawned part-upload task failed to produce a result
    #[error("internal error: {0}")]
    Internal(String),
}

impl UploadError {
    /// Whether the retry loop may attempt this error again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::Transient(_)
                | UploadError::MissingAttribute {
                    operation: StoreOperation::UploadPart,
                    ..
                }
        )
    }
}

/// Hook for the user-facing credential-expiry notice
///
/// Expiry means the recording cannot be saved by retrying; the user must be
/// told to restart the session. The pipeline invokes this exactly once per
/// failed call, before the error is raised.
pub trait Notifier: Send + Sync {
    fn credentials_expired(&self);
}

/// Default notifier: logs an actionable error
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn credentials_expired(&self) {
        tracing::error!(
            "storage credentials have expired and the upload cannot continue; \
             restart the recording session to obtain fresh credentials"
        );
    }
}

/// Classify a store failure, emitting the user notice on expiry
///
/// The single conversion point from store errors to pipeline errors; keeps
/// the notify-exactly-once contract out of the retry loop.
pub(crate) fn classify_store_error(err: StoreError, notifier: &dyn Notifier) -> UploadError {
    if err.is_credentials_expired() {
        notifier.credentials_expired();
        UploadError::CredentialsExpired
    } else {
        UploadError::Transient(err)
    }
}
