//! Provider adapters and drive construction.

mod googledrive;
mod onedrive;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub use googledrive::GoogleDrive;
pub use onedrive::OneDrive;

use crate::auth::{CachedAuthorizer, TokenFile};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::http::ReqwestTransport;
use crate::retry::RetryingExecutor;
use crate::storage::{Drive, RemoteStorage};

/// Characters left unescaped in path segments and query values.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub(crate) fn encode(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OneDrive,
    GoogleDrive,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OneDrive => "onedrive",
            ProviderKind::GoogleDrive => "googledrive",
        }
    }

    pub fn storage(&self) -> Box<dyn RemoteStorage> {
        match self {
            ProviderKind::OneDrive => Box::new(OneDrive::new()),
            ProviderKind::GoogleDrive => Box::new(GoogleDrive::new()),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "onedrive" => Ok(ProviderKind::OneDrive),
            "googledrive" => Ok(ProviderKind::GoogleDrive),
            "clouddrive" => Err(EngineError::Config(
                "clouddrive is not supported; use onedrive or googledrive".to_string(),
            )),
            other => Err(EngineError::Config(format!(
                "unknown provider '{other}'; use onedrive or googledrive"
            ))),
        }
    }
}

/// Build a production drive: reqwest transport, token-file authorizer, and the
/// retry policy and limits from `config`.
pub fn connect(
    kind: ProviderKind,
    config: &EngineConfig,
    cancel: CancelToken,
) -> Result<Drive, EngineError> {
    let transport = ReqwestTransport::new(Some(config.request_timeout()))?;
    let token_path = config.token_path(kind.name());
    tracing::debug!(provider = %kind, token_file = %token_path.display(), "connecting");
    let authorizer = CachedAuthorizer::new(TokenFile::new(token_path));

    let executor = RetryingExecutor::new(Arc::new(transport), Arc::new(authorizer))
        .with_policy(config.retry_policy())
        .with_cancel_token(cancel);
    let drive = Drive::new(kind.storage(), executor).with_settings(config.drive_settings());
    if let Some(requested) = config.upload_chunk_size {
        if drive.upload_chunk_size() as u64 != requested {
            tracing::warn!(
                provider = %kind,
                requested,
                used = drive.upload_chunk_size(),
                "upload_chunk_size rounded to the provider's alignment"
            );
        }
    }
    Ok(drive)
}
