//! OneDrive (`api.onedrive.com/v1.0`) adapter.

use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::json;

use super::encode;
use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::http::{RemoteRequest, RemoteResponse};
use crate::model::{ChildPage, ChunkOutcome, NodeKind, Quota, RemoteNode, UploadTarget, WriteMode};
use crate::storage::RemoteStorage;

const API_ROOT: &str = "https://api.onedrive.com/v1.0";

/// OneDrive requires fragments in multiples of 320 KiB.
const CHUNK_ALIGNMENT: usize = 320 * 1024;

/// 32 x 320 KiB.
const CHUNK_SIZE: usize = 32 * CHUNK_ALIGNMENT;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    id: String,
    name: String,
    #[serde(default)]
    size: u64,
    folder: Option<serde_json::Value>,
    file: Option<FileFacet>,
    last_modified_date_time: Option<String>,
    file_system_info: Option<FileSystemInfo>,
}

#[derive(Debug, Deserialize)]
struct FileFacet {
    hashes: Option<Hashes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hashes {
    sha256_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileSystemInfo {
    last_modified_date_time: Option<String>,
}

impl Item {
    fn into_node(self) -> RemoteNode {
        let kind = if self.folder.is_some() {
            NodeKind::Folder
        } else {
            NodeKind::File
        };
        let content_hash = self
            .file
            .and_then(|f| f.hashes)
            .and_then(|h| h.sha256_hash);
        let modified_time = self
            .file_system_info
            .and_then(|info| info.last_modified_date_time)
            .or(self.last_modified_date_time);
        RemoteNode {
            id: self.id,
            name: self.name,
            size: if kind == NodeKind::Folder { 0 } else { self.size },
            kind,
            content_hash,
            modified_time,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Listing {
    value: Vec<Item>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkProgress {
    #[serde(default)]
    next_expected_ranges: Vec<String>,
}

fn conflict_behavior(mode: WriteMode) -> &'static str {
    match mode {
        WriteMode::Create => "fail",
        WriteMode::Replace => "replace",
    }
}

/// OneDrive personal storage.
#[derive(Debug, Clone)]
pub struct OneDrive {
    api_root: String,
}

impl Default for OneDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl OneDrive {
    pub fn new() -> Self {
        Self::with_api_root(API_ROOT)
    }

    pub fn with_api_root(api_root: impl Into<String>) -> Self {
        OneDrive {
            api_root: api_root.into(),
        }
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/drive/items/{}", self.api_root, encode(id))
    }

    /// Address of `name` inside `parent_id`.
    fn child_url(&self, parent_id: &str, name: &str) -> String {
        format!("{}:/{}:", self.item_url(parent_id), encode(name))
    }
}

impl RemoteStorage for OneDrive {
    fn name(&self) -> &str {
        "onedrive"
    }

    fn root_id(&self) -> &str {
        "root"
    }

    fn hash_algorithm(&self) -> ChecksumAlgorithm {
        ChecksumAlgorithm::Sha256
    }

    fn upload_chunk_size(&self) -> usize {
        CHUNK_SIZE
    }

    fn chunk_alignment(&self) -> usize {
        CHUNK_ALIGNMENT
    }

    fn list_children(&self, folder_id: &str, name: Option<&str>, page: Option<&str>) -> RemoteRequest {
        match (page, name) {
            (Some(next_link), _) => RemoteRequest::get(next_link),
            (None, Some(name)) => RemoteRequest::get(self.child_url(folder_id, name)),
            (None, None) => RemoteRequest::get(format!("{}/children", self.item_url(folder_id))),
        }
    }

    /// Accepts both a `children` collection and the single item a path lookup returns.
    fn parse_children(&self, response: RemoteResponse) -> Result<ChildPage, EngineError> {
        let value: serde_json::Value = response.json()?;
        if value.get("value").is_some() {
            let listing: Listing = serde_json::from_value(value)?;
            return Ok(ChildPage {
                nodes: listing.value.into_iter().map(Item::into_node).collect(),
                next: listing.next_link,
            });
        }
        let item: Item = serde_json::from_value(value)?;
        Ok(ChildPage {
            nodes: vec![item.into_node()],
            next: None,
        })
    }

    fn get_node(&self, id: &str) -> RemoteRequest {
        RemoteRequest::get(self.item_url(id))
    }

    fn parse_node(&self, response: RemoteResponse) -> Result<RemoteNode, EngineError> {
        Ok(response.json::<Item>()?.into_node())
    }

    fn create_folder(&self, parent_id: &str, name: &str) -> RemoteRequest {
        RemoteRequest::post(format!("{}/children", self.item_url(parent_id))).json(json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "fail",
        }))
    }

    fn write_empty(&self, target: &UploadTarget<'_>) -> RemoteRequest {
        let url = match (target.mode, target.existing) {
            (WriteMode::Replace, Some(existing)) => format!("{}/content", self.item_url(&existing.id)),
            (mode, _) => format!(
                "{}/content?@microsoft.graph.conflictBehavior={}",
                self.child_url(target.parent_id, target.name),
                conflict_behavior(mode)
            ),
        };
        RemoteRequest::put(url).bytes(Vec::new())
    }

    fn start_session(&self, target: &UploadTarget<'_>) -> RemoteRequest {
        let url = match (target.mode, target.existing) {
            (WriteMode::Replace, Some(existing)) => {
                format!("{}/createUploadSession", self.item_url(&existing.id))
            }
            _ => format!(
                "{}/createUploadSession",
                self.child_url(target.parent_id, target.name)
            ),
        };
        let mut item = json!({
            "@microsoft.graph.conflictBehavior": conflict_behavior(target.mode),
        });
        if let Some(modified) = target.modified_time {
            item["fileSystemInfo"] = json!({
                "lastModifiedDateTime": modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            });
        }
        RemoteRequest::post(url).json(json!({ "item": item }))
    }

    fn parse_session(&self, response: RemoteResponse) -> Result<String, EngineError> {
        Ok(response.json::<Session>()?.upload_url)
    }

    /// The upload URL is pre-authorized; sending a bearer token to it is rejected.
    fn upload_chunk(&self, session_url: &str, offset: u64, data: Vec<u8>, total: u64) -> RemoteRequest {
        let end = offset + data.len() as u64 - 1;
        RemoteRequest::put(session_url)
            .header("Content-Range", format!("bytes {offset}-{end}/{total}"))
            .bytes(data)
            .unauthenticated()
    }

    fn parse_chunk(&self, response: RemoteResponse) -> Result<ChunkOutcome, EngineError> {
        if response.status == 202 {
            let progress: ChunkProgress = response.json()?;
            let next_offset = progress
                .next_expected_ranges
                .first()
                .and_then(|range| range.split('-').next())
                .and_then(|start| start.parse().ok());
            return Ok(ChunkOutcome::Incomplete { next_offset });
        }
        Ok(ChunkOutcome::Complete(Some(self.parse_node(response)?)))
    }

    fn download_range(&self, node: &RemoteNode, offset: u64, len: u64) -> RemoteRequest {
        RemoteRequest::get(format!("{}/content", self.item_url(&node.id)))
            .header("Range", format!("bytes={}-{}", offset, offset + len - 1))
            .streaming()
    }

    fn quota(&self) -> RemoteRequest {
        RemoteRequest::get(format!("{}/drive", self.api_root))
    }

    fn parse_quota(&self, response: RemoteResponse) -> Result<Quota, EngineError> {
        #[derive(Deserialize)]
        struct DriveInfo {
            quota: QuotaFacet,
        }
        #[derive(Deserialize)]
        struct QuotaFacet {
            total: Option<u64>,
            #[serde(default)]
            used: u64,
            remaining: Option<u64>,
        }
        let info: DriveInfo = response.json()?;
        Ok(Quota {
            total: info.quota.total,
            used: info.quota.used,
            remaining: info.quota.remaining,
        })
    }
}
