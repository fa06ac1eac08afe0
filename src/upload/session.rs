//! Multipart upload session
//!
//! Owns the bucket/key/upload-id triple, the monotonically increasing part
//! counter, and the ordered collection of in-flight part tasks. Parts upload
//! concurrently; `finalize` is the single barrier and always assembles the
//! completion request in part-number (initiation) order, never completion
//! order.

use super::{classify_store_error, Notifier, PartUploader, UploadError};
use crate::store::{CompletedPart, ObjectStore, StoreOperation};
use bytes::Bytes;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One multipart upload session
///
/// Invariant: `pending_parts.len() == next_part_number - 1` at all times
/// after creation; part numbers are assigned 1, 2, 3, … with no gaps or
/// reuse.
pub struct UploadSession {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    bucket: String,
    key: String,
    content_type: String,
    max_attempts: u32,
    upload_id: Option<String>,
    uploader: Option<Arc<PartUploader>>,
    next_part_number: u32,
    parts_uploaded: Arc<AtomicU32>,
    pending_parts: Vec<JoinHandle<Result<CompletedPart, UploadError>>>,
}

impl UploadSession {
    /// Create a session for `bucket`/`key`; no network call happens here
    pub fn new(
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        content_type: impl Into<String>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            notifier,
            bucket: bucket.into(),
            key: key.into(),
            content_type: content_type.into(),
            max_attempts,
            upload_id: None,
            uploader: None,
            next_part_number: 1,
            parts_uploaded: Arc::new(AtomicU32::new(0)),
            pending_parts: Vec::new(),
        }
    }

    /// Issue the create-multipart-upload request
    ///
    /// Fatal, never retried: a missing upload id leaves nothing to attach
    /// parts to, and expired credentials cannot be fixed by retrying.
    pub async fn create(&mut self) -> Result<(), UploadError> {
        if self.upload_id.is_some() {
            return Err(UploadError::InvalidState("session already created"));
        }

        let output = self
            .store
            .create_multipart_upload(&self.bucket, &self.key, &self.content_type)
            .await
            .map_err(|err| classify_store_error(err, self.notifier.as_ref()))?;

        let upload_id = match output.upload_id {
            Some(id) if !id.is_empty() => id,
            _ => {
                return Err(UploadError::MissingAttribute {
                    operation: StoreOperation::CreateMultipartUpload,
                    field: "upload_id",
                })
            }
        };

        tracing::info!(
            bucket = %self.bucket,
            key = %self.key,
            upload_id = %upload_id,
            "created multipart upload"
        );

        self.uploader = Some(Arc::new(PartUploader::new(
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            self.bucket.clone(),
            self.key.clone(),
            upload_id.clone(),
            self.max_attempts,
            Arc::clone(&self.parts_uploaded),
        )));
        self.upload_id = Some(upload_id);
        Ok(())
    }

    /// Start uploading the next part without blocking the caller
    ///
    /// Assigns the next part number, spawns the upload task, and appends it
    /// to the pending list in assignment order. Multiple parts may be in
    /// flight concurrently; `finalize` collects them.
    pub fn initiate_part(&mut self, body: Bytes) -> Result<u32, UploadError> {
        let uploader = self
            .uploader
            .as_ref()
            .ok_or(UploadError::InvalidState("session not created"))?;

        let part_number = self.next_part_number;
        self.next_part_number += 1;

        tracing::debug!(
            key = %self.key,
            part_number,
            bytes = body.len(),
            "initiating part upload"
        );

        let uploader = Arc::clone(uploader);
        let handle = tokio::spawn(async move { uploader.upload_part(part_number, body).await });
        self.pending_parts.push(handle);

        Ok(part_number)
    }

    /// Await every initiated part, then complete the multipart upload
    ///
    /// Parts are collected in initiation order regardless of completion
    /// order. Any failed part aborts finalize; the store is left holding the
    /// incomplete multipart upload (cleanup is caller policy).
    pub async fn finalize(&mut self) -> Result<String, UploadError> {
        let upload_id = self
            .upload_id
            .clone()
            .ok_or(UploadError::InvalidState("session not created"))?;

        // join_all yields results in initiation order, whatever order the
        // tasks actually finished in.
        let results = futures::future::join_all(self.pending_parts.drain(..)).await;
        let mut parts = Vec::with_capacity(results.len());
        for result in results {
            let part = result
                .map_err(|err| UploadError::Internal(format!("part upload task failed: {err}")))??;
            parts.push(part);
        }

        if parts.is_empty() {
            return Err(UploadError::InvalidState("no parts to finalize"));
        }

        let output = self
            .store
            .complete_multipart_upload(&self.bucket, &self.key, &upload_id, &parts)
            .await
            .map_err(|err| classify_store_error(err, self.notifier.as_ref()))?;

        tracing::info!(
            bucket = %self.bucket,
            key = %self.key,
            upload_id = %upload_id,
            parts = parts.len(),
            "completed multipart upload"
        );

        // The store's identifier is discarded once the object exists.
        self.upload_id = None;
        self.uploader = None;

        Ok(output
            .location
            .unwrap_or_else(|| format!("s3://{}/{}", self.bucket, self.key)))
    }

    /// Number of parts handed off for upload so far
    pub fn parts_initiated(&self) -> u32 {
        self.next_part_number - 1
    }

    /// Number of parts whose upload has succeeded
    pub fn parts_uploaded(&self) -> u32 {
        self.parts_uploaded.load(Ordering::SeqCst)
    }

    /// Destination key
    pub fn key(&self) -> &str {
        &self.key
    }
}
