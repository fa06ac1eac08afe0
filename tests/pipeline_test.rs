//! Upload Pipeline Integration Tests
//!
//! Drives the coordinator and session against a scripted in-memory object
//! store to verify the pipeline's ordering, retry, and failure contracts:
//!
//! - Monotonic part numbering regardless of completion order
//! - At-least-one-part guarantee on finish
//! - Retry bound (3 attempts) for retryable part failures
//! - No retry and a single user notice on credential expiry
//! - Threshold-triggered batching across ingest bursts
//! - Progress reporting

use bytes::Bytes;
use kiroku::config::UploadConfig;
use kiroku::store::{
    CompleteUploadOutput, CompletedPart, CreateUploadOutput, ObjectStore, StoreError,
    StoreOperation, UploadPartOutput,
};
use kiroku::upload::{Notifier, UploadCoordinator, UploadError, UploadSession};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Test doubles
// ============================================================================

/// Scripted in-memory object store
///
/// Behavior toggles select the failure mode; every call is recorded so the
/// tests can assert attempt counts and ordering.
#[derive(Default)]
struct FakeStore {
    /// Upload id returned by create; `None` omits the field
    upload_id: Option<String>,
    /// Omit the etag from every upload-part response
    omit_etags: bool,
    /// Fail every upload-part attempt with a transient error
    fail_parts: bool,
    /// Reject the named operations with an expired-token error
    expire_create: bool,
    expire_parts: bool,
    expire_complete: bool,
    /// Delay part uploads so higher numbers finish first
    reverse_completion: bool,

    create_calls: AtomicU32,
    /// Part number of every upload-part attempt, in arrival order
    part_attempts: Mutex<Vec<u32>>,
    /// (part_number, body length) of every successful part upload
    part_sizes: Mutex<Vec<(u32, usize)>>,
    /// Part number of each upload as it finished, in completion order
    completion_order: Mutex<Vec<u32>>,
    /// Parts listed in the completion request, if one was made
    completed: Mutex<Option<Vec<CompletedPart>>>,
}

impl FakeStore {
    fn accepting() -> Self {
        Self {
            upload_id: Some("upload-1".to_string()),
            ..Self::default()
        }
    }

    fn expired(operation: StoreOperation) -> StoreError {
        StoreError::new(
            operation,
            Some("ExpiredToken".to_string()),
            "the provided token has expired",
        )
    }

    fn attempts(&self) -> usize {
        self.part_attempts.lock().unwrap().len()
    }

    fn completed_parts(&self) -> Option<Vec<CompletedPart>> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ObjectStore for FakeStore {
    async fn create_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        _content_type: &str,
    ) -> Result<CreateUploadOutput, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.expire_create {
            return Err(Self::expired(StoreOperation::CreateMultipartUpload));
        }
        Ok(CreateUploadOutput {
            upload_id: self.upload_id.clone(),
        })
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        _upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<UploadPartOutput, StoreError> {
        self.part_attempts.lock().unwrap().push(part_number);

        if self.expire_parts {
            return Err(Self::expired(StoreOperation::UploadPart));
        }
        if self.fail_parts {
            return Err(StoreError::new(
                StoreOperation::UploadPart,
                Some("InternalError".to_string()),
                "we encountered an internal error",
            ));
        }

        if self.reverse_completion {
            // Later parts sleep less, so they finish first.
            let delay = 60u64.saturating_sub(u64::from(part_number) * 15);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.completion_order.lock().unwrap().push(part_number);

        if self.omit_etags {
            return Ok(UploadPartOutput { etag: None });
        }

        self.part_sizes.lock().unwrap().push((part_number, body.len()));
        Ok(UploadPartOutput {
            etag: Some(format!("\"etag-{part_number}\"")),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        _upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompleteUploadOutput, StoreError> {
        if self.expire_complete {
            return Err(Self::expired(StoreOperation::CompleteMultipartUpload));
        }
        *self.completed.lock().unwrap() = Some(parts.to_vec());
        Ok(CompleteUploadOutput {
            location: Some(format!("https://{bucket}.s3.amazonaws.com/{key}")),
        })
    }
}

/// Notifier that counts expiry notices
#[derive(Default)]
struct CountingNotifier {
    notices: AtomicU32,
}

impl Notifier for CountingNotifier {
    fn credentials_expired(&self) {
        self.notices.fetch_add(1, Ordering::SeqCst);
    }
}

fn session_over(store: &Arc<FakeStore>) -> UploadSession {
    UploadSession::new(
        Arc::clone(store) as Arc<dyn ObjectStore>,
        Arc::new(kiroku::upload::LogNotifier),
        "test-bucket",
        "sessions/abc/video.webm",
        "video/webm",
        3,
    )
}

fn coordinator_over(store: &Arc<FakeStore>, threshold: usize) -> UploadCoordinator {
    UploadCoordinator::new(
        Arc::clone(store) as Arc<dyn ObjectStore>,
        "test-bucket",
        UploadConfig {
            part_size_threshold: threshold,
            ..UploadConfig::default()
        },
    )
}

// ============================================================================
// TEST: Part numbering and ordering
// ============================================================================

#[tokio::test]
async fn test_part_numbers_are_monotonic_in_call_order() {
    let store = Arc::new(FakeStore::accepting());
    let mut session = session_over(&store);
    session.create().await.unwrap();

    let mut assigned = Vec::new();
    for _ in 0..5 {
        assigned.push(session.initiate_part(Bytes::from_static(b"chunk")).unwrap());
    }
    assert_eq!(assigned, vec![1, 2, 3, 4, 5]);
    assert_eq!(session.parts_initiated(), 5);

    session.finalize().await.unwrap();

    let completed = store.completed_parts().expect("completion request issued");
    let numbers: Vec<u32> = completed.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert!(completed.iter().all(|p| !p.etag.is_empty()));
}

#[tokio::test]
async fn test_out_of_order_completion_still_finalizes_in_part_order() {
    let store = Arc::new(FakeStore {
        reverse_completion: true,
        ..FakeStore::accepting()
    });
    let mut session = session_over(&store);
    session.create().await.unwrap();

    for _ in 0..3 {
        session.initiate_part(Bytes::from_static(b"chunk")).unwrap();
    }
    session.finalize().await.unwrap();

    let finished_order = store.completion_order.lock().unwrap().clone();
    assert_eq!(finished_order, vec![3, 2, 1], "parts should finish out of order");

    let completed = store.completed_parts().unwrap();
    let numbers: Vec<u32> = completed.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, vec![1, 2, 3], "completion list must follow part numbers");
}

// ============================================================================
// TEST: At-least-one-part guarantee
// ============================================================================

#[tokio::test]
async fn test_finish_with_zero_bytes_uploads_one_empty_part() {
    let store = Arc::new(FakeStore::accepting());
    let mut coordinator = coordinator_over(&store, 1024);

    coordinator.start("empty.webm").await.unwrap();
    let location = coordinator.finish().await.unwrap();

    assert!(location.contains("empty.webm"));
    let sizes = store.part_sizes.lock().unwrap().clone();
    assert_eq!(sizes, vec![(1, 0)], "exactly one empty part expected");
    assert_eq!(store.completed_parts().unwrap().len(), 1);
}

// ============================================================================
// TEST: Retry policy
// ============================================================================

#[tokio::test]
async fn test_transient_part_failure_retries_exactly_three_times() {
    let store = Arc::new(FakeStore {
        fail_parts: true,
        ..FakeStore::accepting()
    });
    let mut session = session_over(&store);
    session.create().await.unwrap();
    session.initiate_part(Bytes::from_static(b"chunk")).unwrap();

    let err = session.finalize().await.unwrap_err();
    match err {
        UploadError::PartUploadFailed {
            part_number,
            attempts,
            ..
        } => {
            assert_eq!(part_number, 1);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected PartUploadFailed, got {other:?}"),
    }

    assert_eq!(store.attempts(), 3, "never a 4th attempt");
    assert!(store.completed_parts().is_none(), "no completion request");
}

#[tokio::test]
async fn test_missing_etag_counts_as_retryable_and_exhausts() {
    let store = Arc::new(FakeStore {
        omit_etags: true,
        ..FakeStore::accepting()
    });
    let mut session = session_over(&store);
    session.create().await.unwrap();
    session.initiate_part(Bytes::from_static(b"chunk")).unwrap();

    let err = session.finalize().await.unwrap_err();
    match err {
        UploadError::PartUploadFailed { attempts, source, .. } => {
            assert_eq!(attempts, 3);
            assert!(
                matches!(
                    *source,
                    UploadError::MissingAttribute { field: "etag", .. }
                ),
                "cause should be the missing etag, got {source:?}"
            );
        }
        other => panic!("expected PartUploadFailed, got {other:?}"),
    }
    assert_eq!(store.attempts(), 3);
    assert!(store.completed_parts().is_none());
}

// ============================================================================
// TEST: Session creation failures
// ============================================================================

#[tokio::test]
async fn test_create_missing_upload_id_fails_without_parts() {
    let store = Arc::new(FakeStore {
        upload_id: None,
        ..FakeStore::default()
    });
    let mut coordinator = coordinator_over(&store, 1024);

    let err = coordinator.start("video.webm").await.unwrap_err();
    assert!(matches!(
        err,
        UploadError::MissingAttribute {
            operation: StoreOperation::CreateMultipartUpload,
            field: "upload_id",
        }
    ));
    assert_eq!(store.attempts(), 0, "zero part uploads attempted");
    assert_eq!(store.create_calls.load(Ordering::SeqCst), 1, "create is not retried");
}

// ============================================================================
// TEST: Credential expiry
// ============================================================================

#[tokio::test]
async fn test_expired_credentials_on_create_notify_once() {
    let store = Arc::new(FakeStore {
        expire_create: true,
        ..FakeStore::accepting()
    });
    let notifier = Arc::new(CountingNotifier::default());
    let mut coordinator = UploadCoordinator::with_notifier(
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        "test-bucket",
        UploadConfig::default(),
    );

    let err = coordinator.start("video.webm").await.unwrap_err();
    assert!(matches!(err, UploadError::CredentialsExpired));
    assert_eq!(notifier.notices.load(Ordering::SeqCst), 1);
    assert_eq!(store.attempts(), 0);
}

#[tokio::test]
async fn test_expired_credentials_on_part_upload_single_attempt() {
    let store = Arc::new(FakeStore {
        expire_parts: true,
        ..FakeStore::accepting()
    });
    let notifier = Arc::new(CountingNotifier::default());
    let mut session = UploadSession::new(
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        "test-bucket",
        "video.webm",
        "video/webm",
        3,
    );
    session.create().await.unwrap();
    session.initiate_part(Bytes::from_static(b"chunk")).unwrap();

    let err = session.finalize().await.unwrap_err();
    assert!(matches!(err, UploadError::CredentialsExpired));
    assert_eq!(store.attempts(), 1, "expiry must not consume retries");
    assert_eq!(notifier.notices.load(Ordering::SeqCst), 1);
    assert!(store.completed_parts().is_none());
}

#[tokio::test]
async fn test_expired_credentials_on_complete_notify_once() {
    let store = Arc::new(FakeStore {
        expire_complete: true,
        ..FakeStore::accepting()
    });
    let notifier = Arc::new(CountingNotifier::default());
    let mut session = UploadSession::new(
        Arc::clone(&store) as Arc<dyn ObjectStore>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        "test-bucket",
        "video.webm",
        "video/webm",
        3,
    );
    session.create().await.unwrap();
    session.initiate_part(Bytes::from_static(b"chunk")).unwrap();

    let err = session.finalize().await.unwrap_err();
    assert!(matches!(err, UploadError::CredentialsExpired));
    assert_eq!(notifier.notices.load(Ordering::SeqCst), 1);
}

// ============================================================================
// TEST: Accumulation and batching
// ============================================================================

#[tokio::test]
async fn test_two_bursts_produce_two_threshold_parts_and_a_flush() {
    let store = Arc::new(FakeStore::accepting());
    let mut coordinator = coordinator_over(&store, 4900);

    coordinator.start("bursty.webm").await.unwrap();
    let chunk = [7u8; 51];
    for _ in 0..100 {
        coordinator.ingest(&chunk).unwrap();
    }
    for _ in 0..100 {
        coordinator.ingest(&chunk).unwrap();
    }
    coordinator.finish().await.unwrap();

    let sizes = store.part_sizes.lock().unwrap().clone();
    // Buffer crosses 4900 at the 97th chunk of each run of 97, leaving six
    // 51-byte chunks for the final flush.
    assert_eq!(sizes, vec![(1, 4947), (2, 4947), (3, 306)]);
    assert_eq!(store.completed_parts().unwrap().len(), 3);
}

#[tokio::test]
async fn test_oversized_chunk_becomes_one_part_plus_empty_flush() {
    let store = Arc::new(FakeStore::accepting());
    let mut coordinator = coordinator_over(&store, 5 * 1024 * 1024);

    coordinator.start("big.webm").await.unwrap();
    coordinator.ingest(&vec![0u8; 6 * 1024 * 1024]).unwrap();
    coordinator.finish().await.unwrap();

    let sizes = store.part_sizes.lock().unwrap().clone();
    assert_eq!(sizes, vec![(1, 6 * 1024 * 1024), (2, 0)]);
}

// ============================================================================
// TEST: Progress and state machine
// ============================================================================

#[tokio::test]
async fn test_progress_is_nan_before_parts_and_100_after_finish() {
    let store = Arc::new(FakeStore::accepting());
    let mut coordinator = coordinator_over(&store, 10);

    assert!(coordinator.progress_percent().is_nan());

    coordinator.start("video.webm").await.unwrap();
    assert!(
        coordinator.progress_percent().is_nan(),
        "no part initiated yet"
    );

    coordinator.ingest(&[0u8; 32]).unwrap();
    coordinator.finish().await.unwrap();
    assert_eq!(coordinator.progress_percent(), 100.0);
}

#[tokio::test]
async fn test_state_guards_reject_out_of_order_calls() {
    let store = Arc::new(FakeStore::accepting());
    let mut coordinator = coordinator_over(&store, 1024);

    assert!(matches!(
        coordinator.ingest(b"early"),
        Err(UploadError::InvalidState(_))
    ));

    coordinator.start("video.webm").await.unwrap();
    assert!(matches!(
        coordinator.start("video.webm").await,
        Err(UploadError::InvalidState(_))
    ));

    coordinator.finish().await.unwrap();
    assert!(matches!(
        coordinator.ingest(b"late"),
        Err(UploadError::InvalidState(_))
    ));
    assert!(matches!(
        coordinator.finish().await,
        Err(UploadError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_failed_session_stays_failed() {
    let store = Arc::new(FakeStore {
        fail_parts: true,
        ..FakeStore::accepting()
    });
    let mut coordinator = coordinator_over(&store, 1024);

    coordinator.start("video.webm").await.unwrap();
    assert!(coordinator.finish().await.is_err());

    assert!(matches!(
        coordinator.ingest(b"more"),
        Err(UploadError::InvalidState(_))
    ));
    assert!(matches!(
        coordinator.finish().await,
        Err(UploadError::InvalidState(_))
    ));
}
