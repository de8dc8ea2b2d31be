//! HTTP plumbing shared by every provider.
//!
//! Adapters describe calls as `RemoteRequest` values; the retrying executor hands
//! them to an `HttpTransport` as many times as needed. `ReqwestTransport` is the
//! production transport, built on the blocking reqwest client.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::EngineError;

/// HTTP method of a request descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
        };
        f.write_str(name)
    }
}

/// Request body. Kept in memory so the request can be re-issued on retry.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

/// A fully formed HTTP call.
///
/// The `Authorization` header is never stored here; the executor applies the
/// current token on every attempt when `authenticated` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub authenticated: bool,
    /// Hand the response body to the caller as a reader instead of buffering it
    pub stream: bool,
}

impl RemoteRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        RemoteRequest {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            authenticated: true,
            stream: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::Patch, url)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    pub fn bytes(mut self, data: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes(data);
        self
    }

    /// Session-scoped upload URLs carry their own credentials.
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response body, either fully buffered or still on the wire.
pub enum ResponseBody {
    Buffered(Vec<u8>),
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
            ResponseBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Status, headers and body of one HTTP exchange.
#[derive(Debug)]
pub struct RemoteResponse {
    pub status: u16,
    headers: Vec<(String, String)>,
    body: ResponseBody,
}

impl RemoteResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: ResponseBody) -> Self {
        RemoteResponse {
            status,
            headers,
            body,
        }
    }

    pub fn buffered(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, Vec::new(), ResponseBody::Buffered(body.into()))
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Read the whole body into memory.
    pub fn into_bytes(self) -> Result<Vec<u8>, TransportError> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Stream(mut reader) => {
                let mut bytes = Vec::new();
                reader
                    .read_to_end(&mut bytes)
                    .map_err(|e| TransportError::new(format!("reading response body: {e}")))?;
                Ok(bytes)
            }
        }
    }

    /// Body as a reader, whichever way it was received.
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self.body {
            ResponseBody::Buffered(bytes) => Box::new(std::io::Cursor::new(bytes)),
            ResponseBody::Stream(reader) => reader,
        }
    }

    /// Lossy text of the body, for diagnostics. Never fails.
    pub fn into_text_lossy(self, limit: usize) -> String {
        let bytes = match self.body {
            ResponseBody::Buffered(bytes) => bytes,
            ResponseBody::Stream(reader) => {
                let mut bytes = Vec::new();
                let _ = reader.take(limit as u64).read_to_end(&mut bytes);
                bytes
            }
        };
        let end = bytes.len().min(limit);
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, EngineError> {
        let bytes = self
            .into_bytes()
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// A failure below the HTTP status level (connection reset, timeout, bad framing).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError(message.into())
    }
}

/// Sends request descriptors over the wire.
pub trait HttpTransport: Send + Sync {
    /// Issue `request` once, with `token` as bearer credentials if given.
    fn send(&self, request: &RemoteRequest, token: Option<&str>)
        -> Result<RemoteResponse, TransportError>;
}

/// Production transport backed by `reqwest::blocking`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Build a transport; `timeout` bounds each individual call.
    pub fn new(timeout: Option<Duration>) -> Result<Self, EngineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("multidrive/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(
        &self,
        request: &RemoteRequest,
        token: Option<&str>,
    ) -> Result<RemoteResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder.header(reqwest::header::CONTENT_LENGTH, "0"),
            RequestBody::Bytes(data) => builder.body(data.clone()),
            RequestBody::Json(value) => builder.json(value),
        };

        let response = builder
            .send()
            .map_err(|e| TransportError::new(format!("{} {}: {e}", request.method, request.url)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();

        let body = if request.stream {
            ResponseBody::Stream(Box::new(response))
        } else {
            let bytes = response
                .bytes()
                .map_err(|e| TransportError::new(format!("reading response body: {e}")))?;
            ResponseBody::Buffered(bytes.to_vec())
        };

        Ok(RemoteResponse::new(status, headers, body))
    }
}
