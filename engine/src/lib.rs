//! # MultiDrive Engine - Resilient Cloud Transfer Library
//!
//! A headless engine that moves files between the local filesystem and cloud
//! storage providers (OneDrive, Google Drive), or from one provider to another.
//! Designed as the foundation for the `multidrive` CLI and other front ends.
//!
//! ## Overview
//!
//! The engine features:
//! - A retrying request executor with exponential backoff, Retry-After support
//!   and credential refresh on the first retry
//! - Chunked resumable uploads with a running content hash, verified against
//!   the provider's hash and replaced on mismatch
//! - Streaming ranged downloads into a partial file, verified before rename
//! - Slash-path resolution over id-addressed provider trees, with on-demand
//!   folder creation
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{connect, create_job, plan_upload, run_upload, Action, CancelToken};
//! use engine::{EngineConfig, JobOptions, ProviderKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let drive = connect(ProviderKind::OneDrive, &config, CancelToken::new())?;
//!
//! let options = JobOptions { create_folder: true, ..JobOptions::default() };
//! let mut job = create_job(Action::Upload, "/home/me/photos", "backup/photos", options)?;
//!
//! // Enumerate the local tree, then transfer it
//! plan_upload(&mut job)?;
//! run_upload(&mut job, &drive, None)?;
//! println!("{} bytes uploaded", job.bytes_transferred);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (RemoteNode, TransferJob, TransferItem)
//! - **error**: Error types and handling
//! - **retry**: RetryingExecutor, backoff policy and expected statuses
//! - **storage**: The RemoteStorage adapter trait and the Drive handle
//! - **paths**: PathResolver for slash paths
//! - **upload** / **download**: ChunkedUploader and StreamingDownloader
//! - **providers**: OneDrive and Google Drive adapters
//! - **job**: Job orchestration (create, plan, run)
//! - **checksums**: Streaming content hashes

pub mod auth;
pub mod cancel;
pub mod checksums;
pub mod config;
pub mod download;
pub mod error;
pub mod fs_ops;
pub mod http;
pub mod job;
pub mod model;
pub mod paths;
pub mod progress;
pub mod providers;
pub mod retry;
pub mod storage;
pub mod upload;

#[cfg(test)]
mod testing;

// Re-export main types and functions
pub use cancel::CancelToken;
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use config::EngineConfig;
pub use download::{DownloadOptions, StreamingDownloader};
pub use error::EngineError;
pub use job::{
    create_job, list_remote, plan_remote, plan_upload, run_copy, run_download, run_upload,
};
pub use model::{
    Action, ItemState, JobOptions, JobState, NodeKind, Quota, RemoteNode, TransferItem,
    TransferJob,
};
pub use paths::PathResolver;
pub use progress::ProgressCallback;
pub use providers::{connect, ProviderKind};
pub use retry::{Expect, RetryPolicy, RetryingExecutor};
pub use storage::{Drive, DriveSettings, RemoteStorage};
pub use upload::{ChunkedUploader, UploadOptions};
