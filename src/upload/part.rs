//! Part uploader with bounded retry
//!
//! Uploads one numbered chunk of an open multipart upload. Missing entity
//! tags and transient store failures consume a retry attempt; expired
//! credentials short-circuit the loop without consuming one.

use super::{classify_store_error, Notifier, UploadError};
use crate::store::{CompletedPart, ObjectStore, StoreOperation};
use bytes::Bytes;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Uploads numbered parts for one open multipart upload
///
/// Cheap to clone behind an `Arc`; one instance is shared by all part tasks
/// of a session.
pub struct PartUploader {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    bucket: String,
    key: String,
    upload_id: String,
    max_attempts: u32,
    parts_uploaded: Arc<AtomicU32>,
}

impl PartUploader {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        bucket: String,
        key: String,
        upload_id: String,
        max_attempts: u32,
        parts_uploaded: Arc<AtomicU32>,
    ) -> Self {
        Self {
            store,
            notifier,
            bucket,
            key,
            upload_id,
            max_attempts,
            parts_uploaded,
        }
    }

    /// Upload one part, retrying retryable failures up to the attempt budget
    ///
    /// On success the session's completed-parts counter is incremented and
    /// the part's number and entity tag are returned. Fails with
    /// [`UploadError::CredentialsExpired`] (no retry, one user notice) or
    /// [`UploadError::PartUploadFailed`] wrapping the last attempt's error.
    #[tracing::instrument(
        name = "upload.part",
        skip(self, body),
        fields(s3.key = %self.key, part_number = part_number, upload.bytes = body.len()),
        err
    )]
    pub async fn upload_part(
        &self,
        part_number: u32,
        body: Bytes,
    ) -> Result<CompletedPart, UploadError> {
        let mut last_err = UploadError::Internal("no upload attempt was made".into());

        for attempt in 1..=self.max_attempts {
            let outcome = self
                .store
                .upload_part(&self.bucket, &self.key, &self.upload_id, part_number, body.clone())
                .await;

            match outcome {
                Ok(output) => match output.etag {
                    Some(etag) if !etag.is_empty() => {
                        self.parts_uploaded.fetch_add(1, Ordering::SeqCst);
                        tracing::info!(
                            part_number,
                            key = %self.key,
                            attempt,
                            etag = %etag,
                            "part uploaded"
                        );
                        return Ok(CompletedPart { part_number, etag });
                    }
                    _ => {
                        tracing::warn!(
                            part_number,
                            key = %self.key,
                            attempt,
                            "part upload response missing etag"
                        );
                        last_err = UploadError::MissingAttribute {
                            operation: StoreOperation::UploadPart,
                            field: "etag",
                        };
                    }
                },
                Err(err) => {
                    let classified = classify_store_error(err, self.notifier.as_ref());
                    if let UploadError::CredentialsExpired = classified {
                        tracing::error!(
                            part_number,
                            key = %self.key,
                            attempt,
                            "credentials expired during part upload"
                        );
                        return Err(classified);
                    }
                    tracing::warn!(
                        part_number,
                        key = %self.key,
                        attempt,
                        error = %classified,
                        "part upload attempt failed"
                    );
                    last_err = classified;
                }
            }
        }

        Err(UploadError::PartUploadFailed {
            part_number,
            attempts: self.max_attempts,
            source: Box::new(last_err),
        })
    }
}
