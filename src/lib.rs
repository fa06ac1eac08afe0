//! Kiroku
//!
//! Incremental chunked multipart upload pipeline for live capture streams.
//!
//! # Features
//!
//! - **Incremental**: capture chunks are buffered and shipped as numbered
//!   parts while recording continues
//! - **Concurrent**: parts upload in parallel; completion is assembled in
//!   part-number order regardless of arrival order
//! - **Bounded retry**: transient part failures retry up to 3 attempts;
//!   expired credentials fail fast with a user-facing notice
//! - **Swappable backend**: the object store sits behind a trait; an
//!   `aws-sdk-s3` implementation is included
//!
//! # Example
//!
//! ```no_run
//! use kiroku::config::{StoreConfig, UploadConfig};
//! use kiroku::upload::UploadCoordinator;
//!
//! # async fn example() -> Result<(), kiroku::upload::UploadError> {
//! let store_config = StoreConfig::from_env()?;
//! let mut coordinator =
//!     UploadCoordinator::from_store_config(&store_config, UploadConfig::default())?;
//!
//! coordinator.start("sessions/abc123/video.webm").await?;
//! coordinator.ingest(b"...capture chunk...")?;
//! let location = coordinator.finish().await?;
//! println!("stored at {location}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod store;
pub mod upload;

// Re-export commonly used types
pub use config::{Config, StoreConfig, UploadConfig};
pub use store::{ObjectStore, S3Store};
pub use upload::{UploadCoordinator, UploadError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
