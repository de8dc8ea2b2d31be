//! Engine configuration.
//!
//! Loaded from an optional TOML file; every field has a default, so an empty
//! file (or no file) is a valid configuration.
//!
//! ```toml
//! download_chunk_size = 4194304
//! metadata_attempts = 6
//! transfer_attempts = 10
//! whole_transfer_attempts = 5
//! request_timeout_secs = 300
//! token_dir = "/home/me/.config/multidrive"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::retry::{RetryPolicy, METADATA_ATTEMPTS, TRANSFER_ATTEMPTS};
use crate::storage::{DriveSettings, DEFAULT_DOWNLOAD_CHUNK};
use crate::upload::WHOLE_TRANSFER_ATTEMPTS;

const MIN_CHUNK: u64 = 256 * 1024;
const MAX_UPLOAD_CHUNK: u64 = 60 * 1024 * 1024;
const MAX_DOWNLOAD_CHUNK: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upload chunk size in bytes; the provider's own size when unset
    pub upload_chunk_size: Option<u64>,

    /// Size of one ranged download request in bytes
    pub download_chunk_size: u64,

    pub metadata_attempts: u32,
    pub transfer_attempts: u32,
    pub whole_transfer_attempts: u32,

    /// Per-call timeout
    pub request_timeout_secs: u64,

    /// Backoff unit in milliseconds
    pub backoff_unit_ms: u64,

    /// Cap on a single retry delay
    pub max_delay_secs: Option<u64>,

    /// Cap on the total time one operation may spend waiting between retries
    pub max_retry_wait_secs: Option<u64>,

    /// Directory holding `<provider>_token.json` files
    pub token_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            upload_chunk_size: None,
            download_chunk_size: DEFAULT_DOWNLOAD_CHUNK,
            metadata_attempts: METADATA_ATTEMPTS,
            transfer_attempts: TRANSFER_ATTEMPTS,
            whole_transfer_attempts: WHOLE_TRANSFER_ATTEMPTS,
            request_timeout_secs: 300,
            backoff_unit_ms: 1000,
            max_delay_secs: None,
            max_retry_wait_secs: None,
            token_dir: PathBuf::from("."),
        }
    }
}

impl EngineConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("invalid {}: {e}", path.display())))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(size) = self.upload_chunk_size {
            if !(MIN_CHUNK..=MAX_UPLOAD_CHUNK).contains(&size) || size % MIN_CHUNK != 0 {
                return Err(EngineError::Config(format!(
                    "upload_chunk_size must be a multiple of {MIN_CHUNK} between {MIN_CHUNK} and {MAX_UPLOAD_CHUNK}, got {size}"
                )));
            }
        }
        if !(MIN_CHUNK..=MAX_DOWNLOAD_CHUNK).contains(&self.download_chunk_size) {
            return Err(EngineError::Config(format!(
                "download_chunk_size must be between {MIN_CHUNK} and {MAX_DOWNLOAD_CHUNK}, got {}",
                self.download_chunk_size
            )));
        }
        for (name, value) in [
            ("metadata_attempts", self.metadata_attempts),
            ("transfer_attempts", self.transfer_attempts),
            ("whole_transfer_attempts", self.whole_transfer_attempts),
        ] {
            if value == 0 {
                return Err(EngineError::Config(format!("{name} must be at least 1")));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(EngineError::Config("request_timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
            max_delay: self.max_delay_secs.map(Duration::from_secs),
            max_retry_wait: self.max_retry_wait_secs.map(Duration::from_secs),
        }
    }

    pub fn drive_settings(&self) -> DriveSettings {
        DriveSettings {
            metadata_attempts: self.metadata_attempts,
            transfer_attempts: self.transfer_attempts,
            upload_chunk_size: self.upload_chunk_size.map(|s| s as usize),
            download_chunk_size: self.download_chunk_size,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Token file for a provider.
    pub fn token_path(&self, provider: &str) -> PathBuf {
        self.token_dir.join(format!("{provider}_token.json"))
    }
}
