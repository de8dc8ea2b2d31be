//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples the transfer
//! engine from any specific UI. The CLI implements it to draw a progress bar on
//! stderr; tests implement it to record events.

use crate::model::{TransferItem, TransferJob};

/// Trait for receiving progress updates.
///
/// Job-level events come from `job::run_*`. Byte-level and retry events come
/// from the uploader and downloader, which know nothing about jobs, so they only
/// carry the item name. All methods are called synchronously on the transfer
/// thread; every method except `on_bytes` has an empty default.
pub trait ProgressCallback: Send + Sync {
    /// Called when job execution starts.
    fn on_job_started(&self, _job: &TransferJob) {}

    /// Called when an item is about to be processed.
    fn on_item_started(&self, _job: &TransferJob, _index: usize, _item: &TransferItem) {}

    /// Called after every chunk sent or received.
    ///
    /// `done` restarts from zero when a whole-transfer attempt is retried.
    fn on_bytes(&self, name: &str, done: u64, total: u64);

    /// Called when a whole-transfer attempt failed and is about to be retried.
    fn on_attempt_failed(&self, _name: &str, _attempt: u32, _reason: &str) {}

    /// Called when an item is done or failed.
    fn on_item_completed(&self, _job: &TransferJob, _index: usize, _item: &TransferItem) {}

    /// Called when job execution is complete.
    fn on_job_completed(&self, _job: &TransferJob) {}
}
