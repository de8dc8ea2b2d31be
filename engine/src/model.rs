//! Core data model.
//!
//! This module defines the main data structures:
//! - RemoteNode, NodeKind: files and folders on a provider
//! - UploadTarget, WriteMode, ChildPage, ChunkOutcome, Quota: adapter vocabulary
//! - TransferJob, TransferItem: a whole upload/download/copy operation
//! - Action, ItemState, JobState, JobOptions: enums controlling behavior

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;

/// Whether a remote node is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Folder,
}

/// A file or folder on a remote provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    /// Provider-native identifier, stable for the node's lifetime
    pub id: String,

    /// Leaf name
    pub name: String,

    pub kind: NodeKind,

    /// Hex digest of the content, once the provider has computed it
    pub content_hash: Option<String>,

    /// Last modification time as reported by the provider (RFC 3339)
    pub modified_time: Option<String>,

    /// Content length in bytes (0 for folders)
    pub size: u64,
}

impl RemoteNode {
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Parsed modification time, if present and well-formed.
    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

/// How a content write treats an existing node of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with a conflict if the name is taken
    Create,
    /// Replace the existing content
    Replace,
}

/// Where an upload writes to.
#[derive(Debug, Clone)]
pub struct UploadTarget<'a> {
    pub parent_id: &'a str,
    pub name: &'a str,

    /// Node whose content slot is replaced (only in `Replace` mode)
    pub existing: Option<&'a RemoteNode>,

    pub mode: WriteMode,

    /// Modification time to record on the remote node
    pub modified_time: Option<DateTime<Utc>>,

    pub size: u64,
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct ChildPage {
    pub nodes: Vec<RemoteNode>,

    /// Continuation token or URL for the next page
    pub next: Option<String>,
}

/// Result of sending one chunk of a resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// More data expected; the provider may say where it wants the next byte
    Incomplete { next_offset: Option<u64> },
    /// Upload finished; carries the node if the provider returned one
    Complete(Option<RemoteNode>),
}

/// Storage usage reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quota {
    pub total: Option<u64>,
    pub used: u64,
    pub remaining: Option<u64>,
}

/// Represents a single transfer job (upload, download or copy).
///
/// A TransferJob encompasses:
/// - The source and destination as given by the user
/// - All files and folders to be transferred
/// - Current state and progress tracking
#[derive(Debug)]
pub struct TransferJob {
    /// Unique identifier for this job
    pub id: Uuid,

    pub action: Action,

    /// Local path (upload) or remote path (download, copy)
    pub source: String,

    /// Remote folder (upload, copy) or local folder (download)
    pub destination: String,

    pub options: JobOptions,

    /// All files and folders in this job, parents before children
    pub items: Vec<TransferItem>,

    /// Current job state (Pending, Running, Completed)
    pub state: JobState,

    /// Total bytes to transfer (sum of all file sizes)
    pub total_bytes: u64,

    /// Bytes transferred so far
    pub bytes_transferred: u64,

    /// Index of currently processing item (if Running)
    pub current_item_index: Option<usize>,

    /// When job was created
    pub created_at: SystemTime,

    /// When job execution started
    pub start_time: Option<SystemTime>,

    /// When job execution completed
    pub end_time: Option<SystemTime>,
}

/// Flags shared by every item of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    /// Replace existing files at the destination
    pub overwrite: bool,
    /// Create missing destination folders
    pub create_folder: bool,
    /// Whole-transfer attempts per file
    pub max_attempts: u32,
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions {
            overwrite: false,
            create_folder: false,
            max_attempts: crate::upload::WHOLE_TRANSFER_ATTEMPTS,
        }
    }
}

/// Where a job item's content comes from.
#[derive(Debug, Clone)]
pub enum ItemSource {
    Local(PathBuf),
    Remote(RemoteNode),
}

/// Represents a single file or folder within a transfer job.
#[derive(Debug, Clone)]
pub struct TransferItem {
    /// Unique identifier for this item within the job
    pub id: Uuid,

    pub source: ItemSource,

    /// Path segments relative to the job destination (the item's name is last)
    pub relative_path: Vec<String>,

    /// File size in bytes (0 for folders)
    pub size: u64,

    pub is_dir: bool,

    pub state: ItemState,

    /// Bytes transferred for this item (progress tracking)
    pub bytes_transferred: u64,

    /// Human-readable error message if state is Failed
    pub error_message: Option<String>,
}

impl TransferItem {
    pub fn new(source: ItemSource, relative_path: Vec<String>, size: u64, is_dir: bool) -> Self {
        TransferItem {
            id: Uuid::new_v4(),
            source,
            relative_path,
            size,
            is_dir,
            state: ItemState::Pending,
            bytes_transferred: 0,
            error_message: None,
        }
    }

    /// Leaf name of this item.
    pub fn name(&self) -> &str {
        self.relative_path.last().map(String::as_str).unwrap_or("")
    }

    /// Segments of the folder this item lives in, relative to the job destination.
    pub fn parent_segments(&self) -> &[String] {
        match self.relative_path.split_last() {
            Some((_, parents)) => parents,
            None => &[],
        }
    }

    /// Relative path rendered with slashes.
    pub fn display_path(&self) -> String {
        self.relative_path.join("/")
    }
}

/// The operation performed by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Local filesystem to a provider
    Upload,
    /// Provider to the local filesystem
    Download,
    /// One provider to another, through a temporary directory
    Copy,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Upload => write!(f, "Upload"),
            Action::Download => write!(f, "Download"),
            Action::Copy => write!(f, "Copy"),
        }
    }
}

/// The state of an individual item within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Not yet processed
    Pending,
    /// Currently transferring
    Transferring,
    /// Transferred and verified, or folder created
    Done,
    /// Error occurred; the job stops here
    Failed,
}

/// The state of an entire transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created, not yet started
    Pending,
    /// Currently executing
    Running,
    /// Finished, successfully or at the first failed item
    Completed,
}
