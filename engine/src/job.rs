//! Job orchestration module.
//!
//! This module provides the job lifecycle functions:
//! - Creating a job from a source and a destination
//! - Planning a job (enumerating the local or remote source tree)
//! - Running a job (upload, download, or provider-to-provider copy)
//!
//! Items run strictly in plan order, parents before children. The first item
//! that fails is marked `Failed`, the job is completed and the error returned;
//! later items stay `Pending`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use uuid::Uuid;

use crate::download::{DownloadOptions, StreamingDownloader};
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{Action, ItemSource, ItemState, JobOptions, JobState, TransferItem, TransferJob};
use crate::paths::PathResolver;
use crate::progress::ProgressCallback;
use crate::storage::Drive;
use crate::upload::{ChunkedUploader, UploadOptions};

/// Create a new transfer job in Pending state.
///
/// # Arguments
/// * `action` - Upload, Download or Copy
/// * `source` - Local path (upload) or remote path (download, copy)
/// * `destination` - Remote folder (upload, copy) or local folder (download)
/// * `options` - Overwrite and folder-creation flags
///
/// # Errors
/// Returns EngineError::InvalidPath if the source is empty.
pub fn create_job(
    action: Action,
    source: &str,
    destination: &str,
    options: JobOptions,
) -> Result<TransferJob, EngineError> {
    if source.trim().is_empty() {
        return Err(EngineError::InvalidPath {
            path: source.to_string(),
            reason: "Source path is empty".to_string(),
        });
    }

    Ok(TransferJob {
        id: Uuid::new_v4(),
        action,
        source: source.to_string(),
        destination: destination.to_string(),
        options,
        items: Vec::new(),
        state: JobState::Pending,
        total_bytes: 0,
        bytes_transferred: 0,
        current_item_index: None,
        created_at: SystemTime::now(),
        start_time: None,
        end_time: None,
    })
}

fn require(job: &TransferJob, action: Action) -> Result<(), EngineError> {
    if job.state != JobState::Pending {
        return Err(EngineError::InvalidPath {
            path: job.source.clone(),
            reason: format!("Job must be in Pending state; current state: {:?}", job.state),
        });
    }
    if job.action != action {
        return Err(EngineError::InvalidPath {
            path: job.source.clone(),
            reason: format!("{} job cannot run as {action}", job.action),
        });
    }
    Ok(())
}

fn set_items(job: &mut TransferJob, items: Vec<TransferItem>) {
    job.total_bytes = items.iter().filter(|i| !i.is_dir).map(|i| i.size).sum();
    job.items = items;
}

/// Plan an upload by enumerating the local source.
///
/// A file becomes a single item; a directory contributes its contents (not
/// itself), so they land directly in the destination folder.
pub fn plan_upload(job: &mut TransferJob) -> Result<(), EngineError> {
    require(job, Action::Upload)?;
    let source = PathBuf::from(&job.source);
    let metadata = std::fs::metadata(&source).map_err(|e| EngineError::local_io(&source, e))?;

    let items = if metadata.is_dir() {
        fs_ops::enumerate_tree(&source, &[])?
    } else {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| EngineError::InvalidPath {
                path: job.source.clone(),
                reason: "no usable file name".to_string(),
            })?
            .to_string();
        vec![TransferItem::new(
            ItemSource::Local(source.clone()),
            vec![name],
            metadata.len(),
            false,
        )]
    };
    set_items(job, items);
    Ok(())
}

/// Plan a download or copy by listing the remote source on `drive`.
///
/// A file becomes a single item; a folder contributes its whole tree.
pub fn plan_remote(job: &mut TransferJob, drive: &Drive) -> Result<(), EngineError> {
    if job.action == Action::Upload {
        return Err(EngineError::InvalidPath {
            path: job.source.clone(),
            reason: "upload jobs are planned from the local filesystem".to_string(),
        });
    }
    require(job, job.action)?;

    let resolver = PathResolver::new(drive);
    let node = resolver.lookup(drive.root_id(), &job.source)?;
    let items = if node.is_folder() {
        resolver
            .list_tree(&node.id)?
            .into_iter()
            .map(|(path, node)| {
                let (size, is_dir) = (node.size, node.is_folder());
                TransferItem::new(ItemSource::Remote(node), path, size, is_dir)
            })
            .collect()
    } else {
        let (name, size) = (node.name.clone(), node.size);
        vec![TransferItem::new(ItemSource::Remote(node), vec![name], size, false)]
    };
    set_items(job, items);
    Ok(())
}

/// Drive every item through `transfer`, stopping at the first failure.
fn run_items<F>(
    job: &mut TransferJob,
    progress: Option<&dyn ProgressCallback>,
    mut transfer: F,
) -> Result<(), EngineError>
where
    F: FnMut(&TransferItem) -> Result<(), EngineError>,
{
    job.state = JobState::Running;
    job.start_time = Some(SystemTime::now());
    tracing::info!(job = %job.id, action = %job.action, items = job.items.len(), "job started");

    if let Some(callback) = progress {
        callback.on_job_started(job);
    }

    let mut outcome = Ok(());
    for index in 0..job.items.len() {
        job.current_item_index = Some(index);
        job.items[index].state = ItemState::Transferring;
        if let Some(callback) = progress {
            callback.on_item_started(job, index, &job.items[index]);
        }

        let result = transfer(&job.items[index]);

        let item = &mut job.items[index];
        match result {
            Ok(()) => {
                item.state = ItemState::Done;
                item.bytes_transferred = item.size;
                job.bytes_transferred += item.size;
            }
            Err(e) => {
                tracing::error!(item = %item.display_path(), error = %e, "item failed");
                item.state = ItemState::Failed;
                item.error_message = Some(e.to_string());
                outcome = Err(e);
            }
        }

        if let Some(callback) = progress {
            callback.on_item_completed(job, index, &job.items[index]);
        }
        if outcome.is_err() {
            break;
        }
    }

    job.state = JobState::Completed;
    job.end_time = Some(SystemTime::now());
    job.current_item_index = None;
    if let Some(callback) = progress {
        callback.on_job_completed(job);
    }
    outcome
}

/// Remote folder ids by destination-relative path, filled as folders are resolved.
struct FolderCache<'a> {
    resolver: PathResolver<'a>,
    root_id: String,
    ids: HashMap<Vec<String>, String>,
}

impl<'a> FolderCache<'a> {
    fn new(drive: &'a Drive, root_id: String) -> Self {
        FolderCache {
            resolver: PathResolver::new(drive),
            root_id,
            ids: HashMap::new(),
        }
    }

    /// Id of the folder at `segments`, creating missing folders.
    fn folder(&mut self, segments: &[String]) -> Result<String, EngineError> {
        if segments.is_empty() {
            return Ok(self.root_id.clone());
        }
        if let Some(id) = self.ids.get(segments) {
            return Ok(id.clone());
        }
        let id = self
            .resolver
            .resolve(&self.root_id, &segments.join("/"), true)?;
        self.ids.insert(segments.to_vec(), id.clone());
        Ok(id)
    }
}

fn local_source(item: &TransferItem) -> Result<&Path, EngineError> {
    match &item.source {
        ItemSource::Local(path) => Ok(path),
        ItemSource::Remote(node) => Err(EngineError::InvalidPath {
            path: node.name.clone(),
            reason: "expected a local item".to_string(),
        }),
    }
}

fn remote_source(item: &TransferItem) -> Result<&crate::model::RemoteNode, EngineError> {
    match &item.source {
        ItemSource::Remote(node) => Ok(node),
        ItemSource::Local(path) => Err(EngineError::InvalidPath {
            path: path.display().to_string(),
            reason: "expected a remote item".to_string(),
        }),
    }
}

/// Run a planned upload job against `drive`.
///
/// The destination folder must exist unless `create_folder` is set; folders of
/// an uploaded tree are always created.
pub fn run_upload(
    job: &mut TransferJob,
    drive: &Drive,
    progress: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    require(job, Action::Upload)?;
    let options = job.options;
    let dest_id = PathResolver::new(drive).resolve(
        drive.root_id(),
        &job.destination,
        options.create_folder,
    )?;
    let mut folders = FolderCache::new(drive, dest_id);
    let uploader = ChunkedUploader::new(drive);
    let upload_options = UploadOptions {
        overwrite: options.overwrite,
        create_folder: options.create_folder,
        max_attempts: options.max_attempts,
        modified_time: None,
        progress,
    };

    run_items(job, progress, |item| {
        if item.is_dir {
            folders.folder(&item.relative_path)?;
            return Ok(());
        }
        let parent_id = folders.folder(item.parent_segments())?;
        uploader.upload_into(&parent_id, local_source(item)?, &upload_options)?;
        Ok(())
    })
}

/// Run a planned download job from `drive` into the local destination folder.
///
/// Sub-folders of a downloaded tree need `create_folder`.
pub fn run_download(
    job: &mut TransferJob,
    drive: &Drive,
    progress: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    require(job, Action::Download)?;
    let dest_root = PathBuf::from(&job.destination);
    let downloader = StreamingDownloader::new(drive);
    let options = DownloadOptions {
        overwrite: job.options.overwrite,
        create_folder: job.options.create_folder,
        max_attempts: job.options.max_attempts,
        progress,
    };

    run_items(job, progress, |item| {
        let dir = item
            .parent_segments()
            .iter()
            .fold(dest_root.clone(), |dir, segment| dir.join(segment));
        downloader.download(remote_source(item)?, &dir, &options)?;
        Ok(())
    })
}

/// Run a planned copy job from `source` to `destination`.
///
/// Each file is downloaded into a private temporary directory, uploaded with
/// the source's modification time, and deleted before the next item starts.
pub fn run_copy(
    job: &mut TransferJob,
    source: &Drive,
    destination: &Drive,
    progress: Option<&dyn ProgressCallback>,
) -> Result<(), EngineError> {
    require(job, Action::Copy)?;
    let options = job.options;
    let temp_dir = tempfile::tempdir().map_err(|e| EngineError::local_io(std::env::temp_dir(), e))?;

    let dest_id = PathResolver::new(destination).resolve(
        destination.root_id(),
        &job.destination,
        options.create_folder,
    )?;
    let mut folders = FolderCache::new(destination, dest_id);
    let downloader = StreamingDownloader::new(source);
    let uploader = ChunkedUploader::new(destination);
    let download_options = DownloadOptions {
        overwrite: true,
        create_folder: false,
        max_attempts: options.max_attempts,
        progress,
    };

    run_items(job, progress, |item| {
        if item.is_dir {
            folders.folder(&item.relative_path)?;
            return Ok(());
        }
        let parent_id = folders.folder(item.parent_segments())?;
        let node = remote_source(item)?;
        let (local, modified) = downloader.download(node, temp_dir.path(), &download_options)?;

        let modified_time = modified
            .as_deref()
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&chrono::Utc));
        let upload_options = UploadOptions {
            overwrite: options.overwrite,
            create_folder: options.create_folder,
            max_attempts: options.max_attempts,
            modified_time,
            progress,
        };
        let uploaded = uploader.upload_into(&parent_id, &local, &upload_options);
        if let Err(e) = std::fs::remove_file(&local) {
            tracing::warn!(path = %local.display(), error = %e, "could not remove temporary file");
        }
        uploaded.map(|_| ())
    })
}

/// Every path below the remote folder `path`, parents first, slash-joined.
pub fn list_remote(drive: &Drive, path: &str) -> Result<Vec<String>, EngineError> {
    let resolver = PathResolver::new(drive);
    let node = resolver.lookup(drive.root_id(), path)?;
    if !node.is_folder() {
        return Err(EngineError::WrongType {
            path: path.to_string(),
            expected: "folder",
        });
    }
    Ok(resolver
        .list_tree(&node.id)?
        .into_iter()
        .map(|(segments, _)| segments.join("/"))
        .collect())
}
