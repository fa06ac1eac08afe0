//! Object store boundary
//!
//! Defines the three wire operations the upload pipeline needs from an
//! object store (create multipart upload, upload part, complete multipart
//! upload) behind a trait, so the retry and finalize logic never touches a
//! concrete SDK. Response fields that a store is required to return are
//! modeled as `Option`s here; the pipeline converts absence into its own
//! missing-attribute error.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

pub mod s3;

pub use s3::S3Store;

/// Error codes that signal expired temporary credentials.
///
/// Expiry is terminal for the pipeline: retries cannot fix it, so the
/// classifier below is the single place the codes are recognized.
const EXPIRED_CREDENTIAL_CODES: &[&str] = &[
    "ExpiredToken",
    "ExpiredTokenException",
    "RequestExpired",
    "TokenRefreshRequired",
];

/// Store operation identifiers, used in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    CreateMultipartUpload,
    UploadPart,
    CompleteMultipartUpload,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOperation::CreateMultipartUpload => "CreateMultipartUpload",
            StoreOperation::UploadPart => "UploadPart",
            StoreOperation::CompleteMultipartUpload => "CompleteMultipartUpload",
        };
        f.write_str(name)
    }
}

/// Error returned by an object store backend
///
/// Carries the provider's error code (when one was returned) so the
/// pipeline can classify it without depending on SDK error types.
#[derive(Error, Debug, Clone)]
#[error("{operation} failed: {message}")]
pub struct StoreError {
    pub operation: StoreOperation,
    pub code: Option<String>,
    pub message: String,
}

impl StoreError {
    /// Create a store error with a provider error code
    pub fn new(
        operation: StoreOperation,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            code,
            message: message.into(),
        }
    }

    /// Whether this error signals expired temporary credentials
    pub fn is_credentials_expired(&self) -> bool {
        match &self.code {
            Some(code) => EXPIRED_CREDENTIAL_CODES.contains(&code.as_str()),
            None => false,
        }
    }
}

/// Response to a create-multipart-upload request
#[derive(Debug, Clone)]
pub struct CreateUploadOutput {
    /// Upload identifier; required by the pipeline, optional on the wire
    pub upload_id: Option<String>,
}

/// Response to an upload-part request
#[derive(Debug, Clone)]
pub struct UploadPartOutput {
    /// Integrity token for the part; required to finalize
    pub etag: Option<String>,
}

/// Response to a complete-multipart-upload request
#[derive(Debug, Clone)]
pub struct CompleteUploadOutput {
    pub location: Option<String>,
}

/// A successfully uploaded part, as referenced in the completion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Object store operations used by the upload pipeline
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Start a multipart upload for `key`
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<CreateUploadOutput, StoreError>;

    /// Upload one numbered part of an open multipart upload
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<UploadPartOutput, StoreError>;

    /// Assemble previously uploaded parts into the final object
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompleteUploadOutput, StoreError>;
}
