//! Upload coordinator — the pipeline's public surface
//!
//! Composes the chunk accumulator and the upload session behind three
//! operations (`start`, `ingest`, `finish`) plus a progress readout. One
//! coordinator instance owns one recording; concurrent recordings are
//! independent instances with no shared state.

use super::{ChunkAccumulator, LogNotifier, Notifier, UploadError, UploadSession};
use crate::config::{StoreConfig, UploadConfig};
use crate::store::{ObjectStore, S3Store};
use std::sync::Arc;

/// Session lifecycle states
///
/// `Failed` and `Completed` are terminal; there is no transition out of
/// either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Created,
    Accumulating,
    PartUploading,
    Finalizing,
    Completed,
    Failed,
}

impl PipelineState {
    fn accepts_data(self) -> bool {
        matches!(
            self,
            PipelineState::Created | PipelineState::Accumulating | PipelineState::PartUploading
        )
    }
}

/// Orchestrates one chunked multipart upload
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    bucket: String,
    upload_config: UploadConfig,
    session: Option<UploadSession>,
    accumulator: ChunkAccumulator,
    state: PipelineState,
}

impl UploadCoordinator {
    /// Coordinator over an explicit store backend
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        upload_config: UploadConfig,
    ) -> Self {
        Self::with_notifier(store, Arc::new(LogNotifier), bucket, upload_config)
    }

    /// Coordinator with a custom expiry notifier
    pub fn with_notifier(
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        bucket: impl Into<String>,
        upload_config: UploadConfig,
    ) -> Self {
        let accumulator = ChunkAccumulator::new(upload_config.part_size_threshold);
        Self {
            store,
            notifier,
            bucket: bucket.into(),
            upload_config,
            session: None,
            accumulator,
            state: PipelineState::Uninitialized,
        }
    }

    /// Coordinator over the S3 backend built from configuration
    ///
    /// Client construction happens here, before any network call; malformed
    /// configuration fails with [`UploadError::Config`].
    pub fn from_store_config(
        store_config: &StoreConfig,
        upload_config: UploadConfig,
    ) -> Result<Self, UploadError> {
        upload_config.validate()?;
        let store = S3Store::from_config(store_config)?;
        let bucket = store_config.bucket.clone();
        Ok(Self::new(Arc::new(store), bucket, upload_config))
    }

    /// Create the multipart upload session for `key`
    ///
    /// Fails with whatever session creation fails with; a failure here is
    /// terminal for this coordinator.
    pub async fn start(&mut self, key: &str) -> Result<(), UploadError> {
        if self.state != PipelineState::Uninitialized {
            return Err(UploadError::InvalidState("session already started"));
        }

        let mut session = UploadSession::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            self.bucket.clone(),
            key,
            self.upload_config.content_type.clone(),
            self.upload_config.max_attempts,
        );

        match session.create().await {
            Ok(()) => {
                self.session = Some(session);
                self.state = PipelineState::Created;
                Ok(())
            }
            Err(err) => {
                self.state = PipelineState::Failed;
                Err(err)
            }
        }
    }

    /// Accept one capture chunk
    ///
    /// Synchronous and non-blocking: buffering and the threshold check never
    /// suspend, and a threshold-triggered part upload is fire-and-forget.
    pub fn ingest(&mut self, data: &[u8]) -> Result<(), UploadError> {
        if !self.state.accepts_data() {
            return Err(UploadError::InvalidState("session is not accepting data"));
        }

        match self.accumulator.push(data) {
            Some(chunk) => {
                let session = self
                    .session
                    .as_mut()
                    .ok_or(UploadError::InvalidState("session not created"))?;
                if let Err(err) = session.initiate_part(chunk) {
                    self.state = PipelineState::Failed;
                    return Err(err);
                }
                self.state = PipelineState::PartUploading;
            }
            None => {
                self.state = PipelineState::Accumulating;
            }
        }
        Ok(())
    }

    /// Flush the remainder, await every part, and complete the object
    ///
    /// The final flush is uploaded even when empty so that finalize never
    /// runs with zero parts. Returns the stored object's location.
    pub async fn finish(&mut self) -> Result<String, UploadError> {
        if !self.state.accepts_data() {
            return Err(UploadError::InvalidState("session is not accepting data"));
        }
        self.state = PipelineState::Finalizing;

        let session = self
            .session
            .as_mut()
            .ok_or(UploadError::InvalidState("session not created"))?;

        let tail = self.accumulator.flush();
        if let Err(err) = session.initiate_part(tail) {
            self.state = PipelineState::Failed;
            return Err(err);
        }

        match session.finalize().await {
            Ok(location) => {
                self.state = PipelineState::Completed;
                tracing::info!(key = %session.key(), location = %location, "upload finished");
                Ok(location)
            }
            Err(err) => {
                self.state = PipelineState::Failed;
                Err(err)
            }
        }
    }

    /// Percentage of initiated parts that have uploaded, floored
    ///
    /// `NaN` before any part has been initiated; callers treat that as "not
    /// yet meaningful", not as an error. Non-decreasing over the session's
    /// life and exactly 100 after a successful `finish`.
    pub fn progress_percent(&self) -> f64 {
        match &self.session {
            Some(session) => {
                let initiated = session.parts_initiated() as f64;
                let uploaded = session.parts_uploaded() as f64;
                (uploaded / initiated * 100.0).floor()
            }
            None => f64::NAN,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        self.state
    }
}
