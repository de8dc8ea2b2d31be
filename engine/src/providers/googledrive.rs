//! Google Drive v3 adapter.

use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::json;

use super::encode;
use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::http::{RemoteRequest, RemoteResponse};
use crate::model::{ChildPage, ChunkOutcome, NodeKind, Quota, RemoteNode, UploadTarget, WriteMode};
use crate::storage::RemoteStorage;

const API_ROOT: &str = "https://www.googleapis.com";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,mimeType,md5Checksum,modifiedTime,size";

/// Resumable chunks must be multiples of 256 KiB.
const CHUNK_ALIGNMENT: usize = 256 * 1024;

/// 32 x 256 KiB.
const CHUNK_SIZE: usize = 32 * CHUNK_ALIGNMENT;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct File {
    id: String,
    name: String,
    mime_type: Option<String>,
    md5_checksum: Option<String>,
    modified_time: Option<String>,
    /// Int64 values are JSON strings in v3
    size: Option<String>,
}

impl File {
    fn into_node(self) -> Result<RemoteNode, EngineError> {
        let kind = if self.mime_type.as_deref() == Some(FOLDER_MIME) {
            NodeKind::Folder
        } else {
            NodeKind::File
        };
        let size = match self.size.as_deref() {
            Some(size) => size
                .parse()
                .map_err(|_| EngineError::Protocol(format!("bad size '{size}' for {}", self.id)))?,
            None => 0,
        };
        Ok(RemoteNode {
            id: self.id,
            name: self.name,
            kind,
            content_hash: self.md5_checksum,
            modified_time: self.modified_time,
            size,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<File>,
    next_page_token: Option<String>,
}

/// Quote a value for a `q` filter.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Parse the last byte of a `Range: bytes=0-N` header into the next offset.
fn next_offset_from_range(range: Option<&str>) -> Option<u64> {
    match range {
        None => Some(0),
        Some(range) => range
            .trim()
            .strip_prefix("bytes=")
            .and_then(|r| r.split_once('-'))
            .and_then(|(_, end)| end.parse::<u64>().ok())
            .map(|end| end + 1),
    }
}

/// Google Drive "My Drive".
#[derive(Debug, Clone)]
pub struct GoogleDrive {
    api_root: String,
}

impl Default for GoogleDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleDrive {
    pub fn new() -> Self {
        Self::with_api_root(API_ROOT)
    }

    pub fn with_api_root(api_root: impl Into<String>) -> Self {
        GoogleDrive {
            api_root: api_root.into(),
        }
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.api_root)
    }

    fn file_url(&self, id: &str) -> String {
        format!("{}/{}", self.files_url(), encode(id))
    }

    fn upload_url(&self, existing: Option<&RemoteNode>, upload_type: &str) -> String {
        let base = format!("{}/upload/drive/v3/files", self.api_root);
        let base = match existing {
            Some(node) => format!("{base}/{}", encode(&node.id)),
            None => base,
        };
        format!("{base}?uploadType={upload_type}&fields={}", encode(FILE_FIELDS))
    }

    fn metadata(target: &UploadTarget<'_>, include_parent: bool) -> serde_json::Value {
        let mut body = json!({});
        if include_parent {
            body["name"] = json!(target.name);
            body["parents"] = json!([target.parent_id]);
        }
        if let Some(modified) = target.modified_time {
            body["modifiedTime"] = json!(modified.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        body
    }

    /// Replacement goes through `files.update` on the existing id.
    fn replacing<'t>(target: &UploadTarget<'t>) -> Option<&'t RemoteNode> {
        match target.mode {
            WriteMode::Replace => target.existing,
            WriteMode::Create => None,
        }
    }
}

impl RemoteStorage for GoogleDrive {
    fn name(&self) -> &str {
        "googledrive"
    }

    fn root_id(&self) -> &str {
        "root"
    }

    fn hash_algorithm(&self) -> ChecksumAlgorithm {
        ChecksumAlgorithm::Md5
    }

    fn upload_chunk_size(&self) -> usize {
        CHUNK_SIZE
    }

    fn chunk_alignment(&self) -> usize {
        CHUNK_ALIGNMENT
    }

    /// 308 Resume Incomplete marks a chunk accepted with more to come.
    fn chunk_statuses(&self) -> Vec<u16> {
        vec![200, 201, 308]
    }

    fn list_children(&self, folder_id: &str, name: Option<&str>, page: Option<&str>) -> RemoteRequest {
        let mut query = format!("{} in parents and trashed = false", quote(folder_id));
        if let Some(name) = name {
            query.push_str(&format!(" and name = {}", quote(name)));
        }
        let mut url = format!(
            "{}?q={}&pageSize=1000&fields={}",
            self.files_url(),
            encode(&query),
            encode(&format!("nextPageToken,files({FILE_FIELDS})"))
        );
        if let Some(token) = page {
            url.push_str(&format!("&pageToken={}", encode(token)));
        }
        RemoteRequest::get(url)
    }

    fn parse_children(&self, response: RemoteResponse) -> Result<ChildPage, EngineError> {
        let list: FileList = response.json()?;
        Ok(ChildPage {
            nodes: list
                .files
                .into_iter()
                .map(File::into_node)
                .collect::<Result<_, _>>()?,
            next: list.next_page_token,
        })
    }

    fn get_node(&self, id: &str) -> RemoteRequest {
        RemoteRequest::get(format!("{}?fields={}", self.file_url(id), encode(FILE_FIELDS)))
    }

    fn parse_node(&self, response: RemoteResponse) -> Result<RemoteNode, EngineError> {
        response.json::<File>()?.into_node()
    }

    fn create_folder(&self, parent_id: &str, name: &str) -> RemoteRequest {
        RemoteRequest::post(format!("{}?fields={}", self.files_url(), encode(FILE_FIELDS))).json(json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent_id],
        }))
    }

    fn write_empty(&self, target: &UploadTarget<'_>) -> RemoteRequest {
        match Self::replacing(target) {
            Some(existing) => RemoteRequest::patch(self.upload_url(Some(existing), "media")).bytes(Vec::new()),
            None => RemoteRequest::post(format!("{}?fields={}", self.files_url(), encode(FILE_FIELDS)))
                .json(Self::metadata(target, true)),
        }
    }

    fn start_session(&self, target: &UploadTarget<'_>) -> RemoteRequest {
        let existing = Self::replacing(target);
        let request = match existing {
            Some(_) => RemoteRequest::patch(self.upload_url(existing, "resumable")),
            None => RemoteRequest::post(self.upload_url(None, "resumable")),
        };
        request
            .header("X-Upload-Content-Length", target.size.to_string())
            .json(Self::metadata(target, existing.is_none()))
    }

    fn parse_session(&self, response: RemoteResponse) -> Result<String, EngineError> {
        response
            .header("location")
            .map(str::to_string)
            .ok_or_else(|| EngineError::Protocol("resumable session response has no Location header".to_string()))
    }

    /// The session URI identifies the upload on its own.
    fn upload_chunk(&self, session_url: &str, offset: u64, data: Vec<u8>, total: u64) -> RemoteRequest {
        let end = offset + data.len() as u64 - 1;
        RemoteRequest::put(session_url)
            .header("Content-Range", format!("bytes {offset}-{end}/{total}"))
            .bytes(data)
            .unauthenticated()
    }

    fn parse_chunk(&self, response: RemoteResponse) -> Result<ChunkOutcome, EngineError> {
        if response.status == 308 {
            return Ok(ChunkOutcome::Incomplete {
                next_offset: next_offset_from_range(response.header("range")),
            });
        }
        Ok(ChunkOutcome::Complete(Some(self.parse_node(response)?)))
    }

    fn download_range(&self, node: &RemoteNode, offset: u64, len: u64) -> RemoteRequest {
        RemoteRequest::get(format!("{}?alt=media", self.file_url(&node.id)))
            .header("Range", format!("bytes={}-{}", offset, offset + len - 1))
            .streaming()
    }

    fn quota(&self) -> RemoteRequest {
        RemoteRequest::get(format!("{}/drive/v3/about?fields=storageQuota", self.api_root))
    }

    fn parse_quota(&self, response: RemoteResponse) -> Result<Quota, EngineError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct About {
            storage_quota: StorageQuota,
        }
        #[derive(Deserialize)]
        struct StorageQuota {
            limit: Option<String>,
            usage: Option<String>,
        }
        let about: About = response.json()?;
        let parse = |value: Option<String>| -> Result<Option<u64>, EngineError> {
            value
                .map(|v| {
                    v.parse()
                        .map_err(|_| EngineError::Protocol(format!("bad quota value '{v}'")))
                })
                .transpose()
        };
        // No limit means unlimited storage.
        let total = parse(about.storage_quota.limit)?;
        let used = parse(about.storage_quota.usage)?.unwrap_or(0);
        Ok(Quota {
            total,
            used,
            remaining: total.map(|t| t.saturating_sub(used)),
        })
    }
}
