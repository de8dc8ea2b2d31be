//! Provider capability interface.
//!
//! A `RemoteStorage` adapter knows one vendor's REST dialect: it turns engine
//! operations into `RemoteRequest` descriptors and vendor payloads back into
//! engine types. It performs no I/O. `Drive` pairs an adapter with a
//! `RetryingExecutor` and exposes the typed operations the rest of the engine
//! uses.

use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::http::{RemoteRequest, RemoteResponse};
use crate::model::{ChildPage, ChunkOutcome, Quota, RemoteNode, UploadTarget};
use crate::retry::{Expect, RetryingExecutor, METADATA_ATTEMPTS, TRANSFER_ATTEMPTS};

/// Default size of one ranged download request.
pub const DEFAULT_DOWNLOAD_CHUNK: u64 = 4 * 1024 * 1024;

/// One vendor's storage API.
pub trait RemoteStorage: Send + Sync {
    /// Short provider name used in logs and token file names.
    fn name(&self) -> &str;

    /// Id of the root folder.
    fn root_id(&self) -> &str;

    /// Digest the provider publishes for file content.
    fn hash_algorithm(&self) -> ChecksumAlgorithm;

    /// Upload chunk size, aligned to the provider's granularity.
    fn upload_chunk_size(&self) -> usize;

    /// Every chunk but the last must be a multiple of this many bytes.
    fn chunk_alignment(&self) -> usize {
        1
    }

    /// Statuses a chunk PUT may answer with on success (complete or not).
    fn chunk_statuses(&self) -> Vec<u16> {
        vec![200, 201, 202]
    }

    /// List the children of `folder_id`, restricted to `name` when given.
    ///
    /// `page` is the continuation returned by the previous `parse_children`.
    fn list_children(&self, folder_id: &str, name: Option<&str>, page: Option<&str>)
        -> RemoteRequest;

    fn parse_children(&self, response: RemoteResponse) -> Result<ChildPage, EngineError>;

    fn get_node(&self, id: &str) -> RemoteRequest;

    /// Parse a single node; used for metadata, folder creation and empty writes.
    fn parse_node(&self, response: RemoteResponse) -> Result<RemoteNode, EngineError>;

    fn create_folder(&self, parent_id: &str, name: &str) -> RemoteRequest;

    /// Write a zero-byte file in one call.
    fn write_empty(&self, target: &UploadTarget<'_>) -> RemoteRequest;

    /// Open a resumable upload session sized to `target.size`.
    fn start_session(&self, target: &UploadTarget<'_>) -> RemoteRequest;

    /// Extract the session upload URL.
    fn parse_session(&self, response: RemoteResponse) -> Result<String, EngineError>;

    /// Send `data` at `offset` of a `total`-byte upload.
    fn upload_chunk(&self, session_url: &str, offset: u64, data: Vec<u8>, total: u64)
        -> RemoteRequest;

    fn parse_chunk(&self, response: RemoteResponse) -> Result<ChunkOutcome, EngineError>;

    /// Fetch `len` bytes of `node`'s content starting at `offset`.
    fn download_range(&self, node: &RemoteNode, offset: u64, len: u64) -> RemoteRequest;

    fn quota(&self) -> RemoteRequest;

    fn parse_quota(&self, response: RemoteResponse) -> Result<Quota, EngineError>;
}

/// Per-drive attempt budgets and chunk sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveSettings {
    pub metadata_attempts: u32,
    pub transfer_attempts: u32,
    /// Overrides the adapter's chunk size when set
    pub upload_chunk_size: Option<usize>,
    pub download_chunk_size: u64,
}

impl Default for DriveSettings {
    fn default() -> Self {
        DriveSettings {
            metadata_attempts: METADATA_ATTEMPTS,
            transfer_attempts: TRANSFER_ATTEMPTS,
            upload_chunk_size: None,
            download_chunk_size: DEFAULT_DOWNLOAD_CHUNK,
        }
    }
}

/// A provider adapter bound to an executor.
pub struct Drive {
    storage: Box<dyn RemoteStorage>,
    executor: RetryingExecutor,
    settings: DriveSettings,
}

impl Drive {
    pub fn new(storage: Box<dyn RemoteStorage>, executor: RetryingExecutor) -> Self {
        Drive {
            storage,
            executor,
            settings: DriveSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: DriveSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn storage(&self) -> &dyn RemoteStorage {
        self.storage.as_ref()
    }

    pub fn executor(&self) -> &RetryingExecutor {
        &self.executor
    }

    pub fn settings(&self) -> &DriveSettings {
        &self.settings
    }

    pub fn name(&self) -> &str {
        self.storage.name()
    }

    pub fn root_id(&self) -> &str {
        self.storage.root_id()
    }

    /// The configured chunk size rounded down to the provider's alignment,
    /// never below one aligned unit.
    pub fn upload_chunk_size(&self) -> usize {
        let align = self.storage.chunk_alignment().max(1);
        let size = self
            .settings
            .upload_chunk_size
            .unwrap_or_else(|| self.storage.upload_chunk_size());
        (size - size % align).max(align)
    }

    pub fn download_chunk_size(&self) -> u64 {
        self.settings.download_chunk_size.max(1)
    }

    /// All children of `folder_id` (or only those named `name`), following pagination.
    ///
    /// A folder the provider answers 404 for has no children.
    pub fn list_children(
        &self,
        folder_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<RemoteNode>, EngineError> {
        let action = match name {
            Some(name) => format!("look up \"{name}\" in {folder_id}"),
            None => format!("list children of {folder_id}"),
        };
        let expect = Expect::ok().or_passthrough(&[404]);

        let mut nodes = Vec::new();
        let mut page: Option<String> = None;
        loop {
            let request = self.storage.list_children(folder_id, name, page.as_deref());
            let response =
                self.executor
                    .execute(&action, &request, &expect, self.settings.metadata_attempts)?;
            if response.status == 404 {
                return Ok(nodes);
            }
            let parsed = self.storage.parse_children(response)?;
            nodes.extend(parsed.nodes);
            match parsed.next {
                Some(next) => page = Some(next),
                None => return Ok(nodes),
            }
        }
    }

    /// Current metadata of a node.
    pub fn node(&self, id: &str) -> Result<RemoteNode, EngineError> {
        let request = self.storage.get_node(id);
        let response = self.executor.execute(
            &format!("fetch metadata of {id}"),
            &request,
            &Expect::ok(),
            self.settings.metadata_attempts,
        )?;
        self.storage.parse_node(response)
    }

    /// Create a folder; a conflict is reported as `AlreadyExists`.
    pub fn create_folder(&self, parent_id: &str, name: &str) -> Result<RemoteNode, EngineError> {
        let request = self.storage.create_folder(parent_id, name);
        let response = self.executor.execute(
            &format!("create folder \"{name}\""),
            &request,
            &Expect::statuses(&[200, 201]).or_conflict(),
            self.settings.metadata_attempts,
        )?;
        if !(200..300).contains(&response.status) {
            return Err(EngineError::AlreadyExists {
                path: name.to_string(),
            });
        }
        let node = self.storage.parse_node(response)?;
        tracing::info!(provider = self.name(), name, id = %node.id, "created folder");
        Ok(node)
    }

    pub fn quota(&self) -> Result<Quota, EngineError> {
        let request = self.storage.quota();
        let response = self.executor.execute(
            "fetch quota",
            &request,
            &Expect::ok(),
            self.settings.metadata_attempts,
        )?;
        self.storage.parse_quota(response)
    }
}
