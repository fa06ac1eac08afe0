//! S3 object store backend
//!
//! Implements [`ObjectStore`] on top of `aws-sdk-s3`. The client is built
//! from a [`StoreConfig`] at session-construction time; malformed
//! configuration fails here, before any network call. SDK errors are mapped
//! into [`StoreError`] with the provider's error code preserved, so the
//! pipeline's classifier stays SDK-agnostic.

use super::{
    CompleteUploadOutput, CompletedPart, CreateUploadOutput, ObjectStore, StoreError,
    StoreOperation, UploadPartOutput,
};
use crate::config::{ConfigError, StoreConfig};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;

/// S3-backed object store
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Build an S3 client from configuration
    ///
    /// Validates the configuration first; errors here are raised before any
    /// network call is made.
    pub fn from_config(config: &StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let credentials = Credentials::from_keys(
            config.access_key.clone(),
            config.secret_key.clone(),
            config.session_token.clone(),
        );

        // Attempt bookkeeping lives in the pipeline's retry loop, so the
        // SDK's own retries are disabled.
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled());

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Wrap an existing SDK client (pooled or pre-configured)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Map an SDK error into a [`StoreError`], keeping the provider code
fn store_error<E, R>(operation: StoreOperation, err: SdkError<E, R>) -> StoreError
where
    SdkError<E, R>: ProvideErrorMetadata + std::fmt::Display,
{
    let code = err.code().map(str::to_string);
    let message = match err.message() {
        Some(msg) => msg.to_string(),
        None => err.to_string(),
    };
    StoreError::new(operation, code, message)
}

#[async_trait::async_trait]
impl ObjectStore for S3Store {
    #[tracing::instrument(
        name = "store.create_multipart_upload",
        skip(self),
        fields(s3.bucket = %bucket, s3.key = %key),
        err
    )]
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<CreateUploadOutput, StoreError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| store_error(StoreOperation::CreateMultipartUpload, err))?;

        Ok(CreateUploadOutput {
            upload_id: output.upload_id().map(str::to_string),
        })
    }

    #[tracing::instrument(
        name = "store.upload_part",
        skip(self, body),
        fields(
            s3.bucket = %bucket,
            s3.key = %key,
            s3.upload_id = %upload_id,
            s3.part_number = part_number,
            upload.bytes = body.len()
        ),
        err
    )]
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<UploadPartOutput, StoreError> {
        let output = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number as i32)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| store_error(StoreOperation::UploadPart, err))?;

        Ok(UploadPartOutput {
            etag: output.e_tag().map(str::to_string),
        })
    }

    #[tracing::instrument(
        name = "store.complete_multipart_upload",
        skip(self, parts),
        fields(
            s3.bucket = %bucket,
            s3.key = %key,
            s3.upload_id = %upload_id,
            parts_count = parts.len()
        ),
        err
    )]
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompleteUploadOutput, StoreError> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|part| {
                        S3CompletedPart::builder()
                            .part_number(part.part_number as i32)
                            .e_tag(part.etag.clone())
                            .build()
                    })
                    .collect(),
            ))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|err| store_error(StoreOperation::CompleteMultipartUpload, err))?;

        Ok(CompleteUploadOutput {
            location: output.location().map(str::to_string),
        })
    }
}
