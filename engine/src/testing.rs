//! In-memory provider and scripted transports for unit tests.
//!
//! `MemoryCloud` is an `HttpTransport` that serves `MemoryStorage` requests from
//! an in-memory tree, with per-operation fault injection and call counters. It
//! behaves like a strict resumable-upload service: chunks must arrive in order,
//! names are unique per folder unless inserted directly, and ranged reads
//! answer 206.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::SecondsFormat;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::StaticToken;
use crate::cancel::CancelToken;
use crate::checksums::{checksum_bytes, ChecksumAlgorithm};
use crate::error::EngineError;
use crate::http::{HttpTransport, Method, RemoteRequest, RemoteResponse, RequestBody, TransportError};
use crate::model::{
    ChildPage, ChunkOutcome, NodeKind, Quota, RemoteNode, TransferItem, TransferJob, UploadTarget,
    WriteMode,
};
use crate::progress::ProgressCallback;
use crate::retry::{RetryingExecutor, Sleeper};
use crate::storage::{Drive, DriveSettings, RemoteStorage};

pub const MEMORY_CAPACITY: u64 = 1 << 30;
pub const MEMORY_CHUNK: usize = 64 * 1024;
pub const DEFAULT_MODIFIED: &str = "2024-01-02T03:04:05Z";

/// Operation classes for fault injection and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Node,
    CreateFolder,
    WriteEmpty,
    Session,
    Chunk,
    Download,
    Quota,
}

/// A failure served instead of (or on top of) the normal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Status(u16),
    Transport,
    /// Serve the normal response with the body cut in half
    ShortBody,
}

struct MemNode {
    node: RemoteNode,
    parent: Option<String>,
    content: Vec<u8>,
}

struct Session {
    write: WriteRequest,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WriteRequest {
    parent: String,
    name: String,
    existing: Option<String>,
    replace: bool,
    modified: Option<String>,
    size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireNode {
    id: String,
    name: String,
    folder: bool,
    hash: Option<String>,
    modified: Option<String>,
    size: u64,
}

impl WireNode {
    fn from_node(node: &RemoteNode) -> Self {
        WireNode {
            id: node.id.clone(),
            name: node.name.clone(),
            folder: node.is_folder(),
            hash: node.content_hash.clone(),
            modified: node.modified_time.clone(),
            size: node.size,
        }
    }

    fn into_node(self) -> RemoteNode {
        RemoteNode {
            id: self.id,
            name: self.name,
            kind: if self.folder {
                NodeKind::Folder
            } else {
                NodeKind::File
            },
            content_hash: self.hash,
            modified_time: self.modified,
            size: self.size,
        }
    }
}

#[derive(Default)]
struct CloudState {
    nodes: Vec<MemNode>,
    next_id: u64,
    sessions: HashMap<String, Session>,
    faults: HashMap<Op, VecDeque<Fault>>,
    calls: HashMap<Op, u32>,
    corrupt_completions: u32,
    omit_completion_hash: bool,
}

impl CloudState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn get(&self, id: &str) -> Option<&MemNode> {
        self.nodes.iter().find(|n| n.node.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut MemNode> {
        self.nodes.iter_mut().find(|n| n.node.id == id)
    }

    fn is_folder(&self, id: &str) -> bool {
        id == "root" || self.get(id).is_some_and(|n| n.node.is_folder())
    }

    fn children<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a MemNode> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.parent.as_deref() == Some(parent))
    }

    fn name_taken(&self, parent: &str, name: &str) -> bool {
        self.children(parent).any(|n| n.node.name == name)
    }

    fn insert(&mut self, parent: &str, name: &str, kind: NodeKind, content: Vec<u8>) -> String {
        let id = self.next_id(if kind == NodeKind::Folder { "d" } else { "f" });
        let content_hash = (kind == NodeKind::File)
            .then(|| checksum_bytes(ChecksumAlgorithm::Md5, &content).hex().to_string());
        self.nodes.push(MemNode {
            node: RemoteNode {
                id: id.clone(),
                name: name.to_string(),
                kind,
                content_hash,
                modified_time: Some(DEFAULT_MODIFIED.to_string()),
                size: content.len() as u64,
            },
            parent: Some(parent.to_string()),
            content,
        });
        id
    }

    /// Apply a completed write and return the node as reported to the client.
    fn commit(&mut self, write: &WriteRequest, content: Vec<u8>) -> Result<RemoteNode, u16> {
        let id = match &write.existing {
            Some(id) if write.replace => {
                let existing = self.get_mut(id).ok_or(404u16)?;
                existing.node.content_hash =
                    Some(checksum_bytes(ChecksumAlgorithm::Md5, &content).hex().to_string());
                existing.node.size = content.len() as u64;
                existing.content = content;
                id.clone()
            }
            _ => {
                if self.name_taken(&write.parent, &write.name) {
                    return Err(409);
                }
                self.insert(&write.parent, &write.name, NodeKind::File, content)
            }
        };
        let modified = write.modified.clone();
        let stored = self.get_mut(&id).ok_or(404u16)?;
        if modified.is_some() {
            stored.node.modified_time = modified;
        }
        let mut reported = stored.node.clone();

        if self.omit_completion_hash {
            reported.content_hash = None;
        } else if self.corrupt_completions > 0 {
            self.corrupt_completions -= 1;
            reported.content_hash = Some("0123456789abcdef0123456789abcdef".to_string());
        }
        Ok(reported)
    }
}

/// In-memory storage service.
pub struct MemoryCloud {
    state: Mutex<CloudState>,
    page_size: usize,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloud {
    pub fn new() -> Self {
        MemoryCloud {
            state: Mutex::new(CloudState::default()),
            page_size: 100,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap()
    }

    /// Insert a folder directly, bypassing name checks.
    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        self.lock().insert(parent, name, NodeKind::Folder, Vec::new())
    }

    /// Insert a file directly, bypassing name checks.
    pub fn add_file(&self, parent: &str, name: &str, content: &[u8]) -> String {
        self.lock().insert(parent, name, NodeKind::File, content.to_vec())
    }

    /// Overwrite the hash the service publishes for a node.
    pub fn set_hash(&self, id: &str, hash: Option<&str>) {
        if let Some(node) = self.lock().get_mut(id) {
            node.node.content_hash = hash.map(str::to_string);
        }
    }

    pub fn set_modified(&self, id: &str, modified: &str) {
        if let Some(node) = self.lock().get_mut(id) {
            node.node.modified_time = Some(modified.to_string());
        }
    }

    pub fn node(&self, id: &str) -> Option<RemoteNode> {
        self.lock().get(id).map(|n| n.node.clone())
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.lock().get(id).map(|n| n.content.clone())
    }

    pub fn children(&self, parent: &str) -> Vec<RemoteNode> {
        self.lock().children(parent).map(|n| n.node.clone()).collect()
    }

    pub fn child(&self, parent: &str, name: &str) -> Option<RemoteNode> {
        self.children(parent).into_iter().find(|n| n.name == name)
    }

    /// Queue faults for the next calls of `op`, served in order.
    pub fn inject(&self, op: Op, faults: Vec<Fault>) {
        self.lock().faults.entry(op).or_default().extend(faults);
    }

    /// Report a wrong hash for the next `count` completed writes.
    pub fn corrupt_completions(&self, count: u32) {
        self.lock().corrupt_completions = count;
    }

    /// Report completed writes without a hash.
    pub fn omit_completion_hash(&self) {
        self.lock().omit_completion_hash = true;
    }

    pub fn calls(&self, op: Op) -> u32 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn content_calls(&self) -> u32 {
        self.calls(Op::WriteEmpty) + self.calls(Op::Session) + self.calls(Op::Chunk)
    }

    fn route(request: &RemoteRequest) -> Option<(Op, Vec<String>, HashMap<String, String>)> {
        let rest = request.url.strip_prefix("mem://")?;
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let segments: Vec<String> = path
            .split('/')
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
            .collect();
        let params = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), percent_decode_str(v).decode_utf8_lossy().into_owned()))
            .collect();
        let op = match (request.method, segments.first()?.as_str()) {
            (Method::Get, "list") => Op::List,
            (Method::Get, "node") => Op::Node,
            (Method::Post, "folders") => Op::CreateFolder,
            (Method::Post, "empty") => Op::WriteEmpty,
            (Method::Post, "sessions") => Op::Session,
            (Method::Put, "upload") => Op::Chunk,
            (Method::Get, "content") => Op::Download,
            (Method::Get, "quota") => Op::Quota,
            _ => return None,
        };
        Some((op, segments, params))
    }

    fn json_body<T: serde::de::DeserializeOwned>(request: &RemoteRequest) -> Option<T> {
        match &request.body {
            RequestBody::Json(value) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    fn node_response(status: u16, node: &RemoteNode) -> RemoteResponse {
        RemoteResponse::buffered(status, serde_json::to_string(&WireNode::from_node(node)).unwrap())
    }

    fn handle(
        &self,
        state: &mut CloudState,
        op: Op,
        segments: &[String],
        params: &HashMap<String, String>,
        request: &RemoteRequest,
    ) -> RemoteResponse {
        let not_found = || RemoteResponse::buffered(404, "not found");
        let bad_request = || RemoteResponse::buffered(400, "bad request");

        match op {
            Op::List => {
                let Some(folder) = segments.get(1) else {
                    return bad_request();
                };
                if !state.is_folder(folder) {
                    return not_found();
                }
                let matching: Vec<&MemNode> = state
                    .children(folder)
                    .filter(|n| params.get("name").map_or(true, |name| &n.node.name == name))
                    .collect();
                let start: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(0);
                let end = (start + self.page_size).min(matching.len());
                let items: Vec<WireNode> = matching[start.min(end)..end]
                    .iter()
                    .map(|n| WireNode::from_node(&n.node))
                    .collect();
                let next = (end < matching.len()).then(|| end.to_string());
                RemoteResponse::buffered(200, json!({ "items": items, "next": next }).to_string())
            }
            Op::Node => match segments.get(1).map(String::as_str) {
                Some("root") => Self::node_response(
                    200,
                    &RemoteNode {
                        id: "root".to_string(),
                        name: String::new(),
                        kind: NodeKind::Folder,
                        content_hash: None,
                        modified_time: None,
                        size: 0,
                    },
                ),
                Some(id) => match state.get(id) {
                    Some(node) => Self::node_response(200, &node.node),
                    None => not_found(),
                },
                None => bad_request(),
            },
            Op::CreateFolder => {
                let Some(body) = Self::json_body::<serde_json::Value>(request) else {
                    return bad_request();
                };
                let (Some(parent), Some(name)) = (body["parent"].as_str(), body["name"].as_str())
                else {
                    return bad_request();
                };
                if !state.is_folder(parent) {
                    return not_found();
                }
                if state.name_taken(parent, name) {
                    return RemoteResponse::buffered(409, "name conflict");
                }
                let id = state.insert(parent, name, NodeKind::Folder, Vec::new());
                match state.get(&id) {
                    Some(node) => Self::node_response(201, &node.node),
                    None => not_found(),
                }
            }
            Op::WriteEmpty => {
                let Some(write) = Self::json_body::<WriteRequest>(request) else {
                    return bad_request();
                };
                if !state.is_folder(&write.parent) {
                    return not_found();
                }
                match state.commit(&write, Vec::new()) {
                    Ok(node) => Self::node_response(201, &node),
                    Err(status) => RemoteResponse::buffered(status, "write rejected"),
                }
            }
            Op::Session => {
                let Some(write) = Self::json_body::<WriteRequest>(request) else {
                    return bad_request();
                };
                if !state.is_folder(&write.parent) {
                    return not_found();
                }
                if !write.replace && state.name_taken(&write.parent, &write.name) {
                    return RemoteResponse::buffered(409, "name conflict");
                }
                let sid = state.next_id("s");
                state.sessions.insert(
                    sid.clone(),
                    Session {
                        write,
                        data: Vec::new(),
                    },
                );
                RemoteResponse::buffered(200, "{}").with_header("Location", format!("mem://upload/{sid}"))
            }
            Op::Chunk => {
                let Some(sid) = segments.get(1) else {
                    return bad_request();
                };
                let Some((start, _end, _total)) =
                    request.header_value("content-range").and_then(parse_content_range)
                else {
                    return bad_request();
                };
                let RequestBody::Bytes(data) = &request.body else {
                    return bad_request();
                };
                let Some(session) = state.sessions.get_mut(sid) else {
                    return not_found();
                };
                if start != session.data.len() as u64 {
                    let next = session.data.len();
                    return RemoteResponse::buffered(202, json!({ "next": next }).to_string());
                }
                session.data.extend_from_slice(data);
                if (session.data.len() as u64) < session.write.size {
                    let next = session.data.len();
                    return RemoteResponse::buffered(202, json!({ "next": next }).to_string());
                }
                let Some(session) = state.sessions.remove(sid) else {
                    return not_found();
                };
                match state.commit(&session.write, session.data) {
                    Ok(node) => Self::node_response(201, &node),
                    Err(status) => RemoteResponse::buffered(status, "write rejected"),
                }
            }
            Op::Download => {
                let Some(node) = segments.get(1).and_then(|id| state.get(id)) else {
                    return not_found();
                };
                let len = node.content.len() as u64;
                match request.header_value("range").and_then(parse_range) {
                    Some((start, end)) => {
                        if start >= len {
                            return RemoteResponse::buffered(416, "range not satisfiable");
                        }
                        let end = end.min(len - 1);
                        RemoteResponse::buffered(206, node.content[start as usize..=end as usize].to_vec())
                    }
                    None => RemoteResponse::buffered(200, node.content.clone()),
                }
            }
            Op::Quota => {
                let used: u64 = state.nodes.iter().map(|n| n.content.len() as u64).sum();
                RemoteResponse::buffered(
                    200,
                    json!({ "total": MEMORY_CAPACITY, "used": used }).to_string(),
                )
            }
        }
    }
}

fn parse_content_range(value: &str) -> Option<(u64, u64, u64)> {
    let rest = value.strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?, total.parse().ok()?))
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

impl HttpTransport for MemoryCloud {
    fn send(
        &self,
        request: &RemoteRequest,
        _token: Option<&str>,
    ) -> Result<RemoteResponse, TransportError> {
        let (op, segments, params) = Self::route(request)
            .ok_or_else(|| TransportError::new(format!("no route for {} {}", request.method, request.url)))?;

        let mut state = self.lock();
        *state.calls.entry(op).or_default() += 1;
        let fault = state.faults.get_mut(&op).and_then(VecDeque::pop_front);
        match fault {
            Some(Fault::Status(status)) => {
                return Ok(RemoteResponse::buffered(status, format!("injected status {status}")))
            }
            Some(Fault::Transport) => return Err(TransportError::new("injected connection reset")),
            _ => {}
        }

        let response = self.handle(&mut state, op, &segments, &params, request);
        if fault == Some(Fault::ShortBody) {
            let status = response.status;
            let mut body = response.into_bytes()?;
            body.truncate(body.len() / 2);
            return Ok(RemoteResponse::buffered(status, body));
        }
        Ok(response)
    }
}

/// Adapter speaking `MemoryCloud`'s dialect.
pub struct MemoryStorage;

fn write_payload(target: &UploadTarget<'_>) -> serde_json::Value {
    serde_json::to_value(WriteRequest {
        parent: target.parent_id.to_string(),
        name: target.name.to_string(),
        existing: target.existing.map(|n| n.id.clone()),
        replace: target.mode == WriteMode::Replace,
        modified: target
            .modified_time
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        size: target.size,
    })
    .unwrap()
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

impl RemoteStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn root_id(&self) -> &str {
        "root"
    }

    fn hash_algorithm(&self) -> ChecksumAlgorithm {
        ChecksumAlgorithm::Md5
    }

    fn upload_chunk_size(&self) -> usize {
        MEMORY_CHUNK
    }

    fn list_children(&self, folder_id: &str, name: Option<&str>, page: Option<&str>) -> RemoteRequest {
        let mut url = format!("mem://list/{}?", encode(folder_id));
        if let Some(name) = name {
            url.push_str(&format!("name={}&", encode(name)));
        }
        if let Some(page) = page {
            url.push_str(&format!("page={page}"));
        }
        RemoteRequest::get(url)
    }

    fn parse_children(&self, response: RemoteResponse) -> Result<ChildPage, EngineError> {
        #[derive(Deserialize)]
        struct Page {
            items: Vec<WireNode>,
            next: Option<String>,
        }
        let page: Page = response.json()?;
        Ok(ChildPage {
            nodes: page.items.into_iter().map(WireNode::into_node).collect(),
            next: page.next,
        })
    }

    fn get_node(&self, id: &str) -> RemoteRequest {
        RemoteRequest::get(format!("mem://node/{}", encode(id)))
    }

    fn parse_node(&self, response: RemoteResponse) -> Result<RemoteNode, EngineError> {
        Ok(response.json::<WireNode>()?.into_node())
    }

    fn create_folder(&self, parent_id: &str, name: &str) -> RemoteRequest {
        RemoteRequest::post("mem://folders").json(json!({ "parent": parent_id, "name": name }))
    }

    fn write_empty(&self, target: &UploadTarget<'_>) -> RemoteRequest {
        RemoteRequest::post("mem://empty").json(write_payload(target))
    }

    fn start_session(&self, target: &UploadTarget<'_>) -> RemoteRequest {
        RemoteRequest::post("mem://sessions").json(write_payload(target))
    }

    fn parse_session(&self, response: RemoteResponse) -> Result<String, EngineError> {
        response
            .header("location")
            .map(str::to_string)
            .ok_or_else(|| EngineError::Protocol("session response has no Location".to_string()))
    }

    fn upload_chunk(&self, session_url: &str, offset: u64, data: Vec<u8>, total: u64) -> RemoteRequest {
        let end = offset + data.len() as u64 - 1;
        RemoteRequest::put(session_url)
            .header("Content-Range", format!("bytes {offset}-{end}/{total}"))
            .bytes(data)
            .unauthenticated()
    }

    fn parse_chunk(&self, response: RemoteResponse) -> Result<ChunkOutcome, EngineError> {
        if response.status == 202 {
            let body: serde_json::Value = response.json()?;
            return Ok(ChunkOutcome::Incomplete {
                next_offset: body["next"].as_u64(),
            });
        }
        Ok(ChunkOutcome::Complete(Some(self.parse_node(response)?)))
    }

    fn download_range(&self, node: &RemoteNode, offset: u64, len: u64) -> RemoteRequest {
        RemoteRequest::get(format!("mem://content/{}", encode(&node.id)))
            .header("Range", format!("bytes={}-{}", offset, offset + len - 1))
            .streaming()
    }

    fn quota(&self) -> RemoteRequest {
        RemoteRequest::get("mem://quota")
    }

    fn parse_quota(&self, response: RemoteResponse) -> Result<Quota, EngineError> {
        let body: serde_json::Value = response.json()?;
        let total = body["total"].as_u64();
        let used = body["used"].as_u64().unwrap_or(0);
        Ok(Quota {
            total,
            used,
            remaining: total.map(|t| t.saturating_sub(used)),
        })
    }
}

/// Build a `Drive` over `cloud` with a recording sleeper.
pub fn memory_drive(cloud: &Arc<MemoryCloud>) -> (Drive, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let executor = RetryingExecutor::new(cloud.clone(), Arc::new(StaticToken::new("mem-token")))
        .with_sleeper(sleeper.clone());
    let drive = Drive::new(Box::new(MemoryStorage), executor).with_settings(DriveSettings::default());
    (drive, sleeper)
}

/// Records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<(), EngineError> {
        cancel.check()?;
        self.delays.lock().unwrap().push(duration);
        Ok(())
    }
}

/// Serves a fixed sequence of outcomes, one per call.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<RemoteResponse, TransportError>>>,
    tokens: Mutex<Vec<Option<String>>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<RemoteResponse, TransportError>>) -> Self {
        ScriptedTransport {
            script: Mutex::new(script.into()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    /// Token presented on each call so far.
    pub fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(
        &self,
        _request: &RemoteRequest,
        token: Option<&str>,
    ) -> Result<RemoteResponse, TransportError> {
        self.tokens.lock().unwrap().push(token.map(str::to_string));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("script exhausted")))
    }
}

/// Records progress events as strings.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressCallback for RecordingProgress {
    fn on_job_started(&self, job: &TransferJob) {
        self.push(format!("job started {}", job.items.len()));
    }

    fn on_item_started(&self, _job: &TransferJob, index: usize, item: &TransferItem) {
        self.push(format!("item {index} started {}", item.display_path()));
    }

    fn on_bytes(&self, name: &str, done: u64, total: u64) {
        self.push(format!("bytes {name} {done}/{total}"));
    }

    fn on_attempt_failed(&self, name: &str, attempt: u32, _reason: &str) {
        self.push(format!("attempt {attempt} failed {name}"));
    }

    fn on_item_completed(&self, _job: &TransferJob, index: usize, item: &TransferItem) {
        self.push(format!("item {index} {:?}", item.state));
    }

    fn on_job_completed(&self, job: &TransferJob) {
        self.push(format!("job completed {:?}", job.state));
    }
}
