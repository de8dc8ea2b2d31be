//! Streaming, verified downloads.
//!
//! Content is fetched in fixed-size ranges and written to a hidden `.partial`
//! sibling of the destination through a `HashingWriter`. Only a file whose
//! digest matches the provider's published hash is renamed into place; failed
//! attempts restart from byte zero with a fresh digest.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::checksums::{ChecksumAlgorithm, ChecksumValue, HashingWriter};
use crate::error::EngineError;
use crate::http::TransportError;
use crate::model::RemoteNode;
use crate::paths::PathResolver;
use crate::progress::ProgressCallback;
use crate::retry::Expect;
use crate::storage::Drive;
use crate::upload::WHOLE_TRANSFER_ATTEMPTS;

/// Options for one download.
#[derive(Clone, Copy)]
pub struct DownloadOptions<'a> {
    /// Replace an existing local file
    pub overwrite: bool,
    /// Allow folder nodes (created locally) and a missing destination directory
    pub create_folder: bool,
    pub max_attempts: u32,
    pub progress: Option<&'a dyn ProgressCallback>,
}

impl Default for DownloadOptions<'_> {
    fn default() -> Self {
        DownloadOptions {
            overwrite: false,
            create_folder: false,
            max_attempts: WHOLE_TRANSFER_ATTEMPTS,
            progress: None,
        }
    }
}

/// Name of the in-progress file for `name`.
pub fn partial_name(name: &str) -> String {
    format!(".{name}.partial")
}

/// Downloads remote nodes from one drive.
pub struct StreamingDownloader<'a> {
    drive: &'a Drive,
}

impl<'a> StreamingDownloader<'a> {
    pub fn new(drive: &'a Drive) -> Self {
        StreamingDownloader { drive }
    }

    /// Download the node at `remote_path` into `dest_dir`.
    pub fn download_path(
        &self,
        remote_path: &str,
        dest_dir: &Path,
        options: &DownloadOptions<'_>,
    ) -> Result<(PathBuf, Option<String>), EngineError> {
        let node = PathResolver::new(self.drive).lookup(self.drive.root_id(), remote_path)?;
        self.download(&node, dest_dir, options)
    }

    /// Download `node` into `dest_dir`, returning the local path and the remote
    /// modification time.
    pub fn download(
        &self,
        node: &RemoteNode,
        dest_dir: &Path,
        options: &DownloadOptions<'_>,
    ) -> Result<(PathBuf, Option<String>), EngineError> {
        let dest = dest_dir.join(&node.name);

        if node.is_folder() {
            if !options.create_folder {
                return Err(EngineError::WrongType {
                    path: node.name.clone(),
                    expected: "file",
                });
            }
            fs::create_dir_all(&dest).map_err(|e| EngineError::local_io(&dest, e))?;
            return Ok((dest, node.modified_time.clone()));
        }

        match fs::metadata(&dest) {
            Ok(meta) if meta.is_dir() => {
                return Err(EngineError::local_io(
                    &dest,
                    io::Error::new(io::ErrorKind::AlreadyExists, "destination is a directory"),
                ))
            }
            Ok(_) if !options.overwrite => {
                return Err(EngineError::AlreadyExists {
                    path: dest.display().to_string(),
                })
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(EngineError::local_io(&dest, e)),
        }
        crate::fs_ops::ensure_dir(dest_dir, options.create_folder)?;

        let partial = dest_dir.join(partial_name(&node.name));
        if let Err(e) = self.fetch_verified(node, &partial, options) {
            if let Err(cleanup) = fs::remove_file(&partial) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %partial.display(), error = %cleanup, "could not remove partial file");
                }
            }
            return Err(e);
        }

        if dest.exists() {
            fs::remove_file(&dest).map_err(|e| EngineError::local_io(&dest, e))?;
        }
        fs::rename(&partial, &dest).map_err(|e| EngineError::local_io(&dest, e))?;

        if let Some(modified) = node.modified_at() {
            let mtime = FileTime::from_unix_time(modified.timestamp(), modified.timestamp_subsec_nanos());
            filetime::set_file_mtime(&dest, mtime).map_err(|e| EngineError::local_io(&dest, e))?;
        }
        tracing::info!(name = %node.name, path = %dest.display(), "download verified");
        Ok((dest, node.modified_time.clone()))
    }

    /// Run whole-transfer attempts until the partial file verifies.
    fn fetch_verified(
        &self,
        node: &RemoteNode,
        partial: &Path,
        options: &DownloadOptions<'_>,
    ) -> Result<(), EngineError> {
        let algorithm = self.drive.storage().hash_algorithm();
        let max_attempts = options.max_attempts.max(1);
        let mut published = node.content_hash.clone();
        let mut refetched = false;
        let mut local = None;

        for attempt in 1..=max_attempts {
            self.drive.executor().cancel_token().check()?;
            let digest = self.fetch_once(node, partial, algorithm, options)?;

            if published.is_none() {
                if node.size == 0 {
                    return Ok(());
                }
                if !refetched {
                    refetched = true;
                    published = self.drive.node(&node.id)?.content_hash;
                }
            }
            if digest.matches(published.as_deref()) {
                return Ok(());
            }

            let reason = format!(
                "hash mismatch (local {digest}, remote {})",
                published.as_deref().unwrap_or("missing")
            );
            tracing::warn!(name = %node.name, attempt, max_attempts, reason = %reason, "download attempt failed");
            if let Some(progress) = options.progress {
                progress.on_attempt_failed(&node.name, attempt, &reason);
            }
            local = Some(digest);
        }

        Err(EngineError::IntegrityMismatch {
            name: node.name.clone(),
            attempts: max_attempts,
            local: local.map(|d| d.hex().to_string()).unwrap_or_default(),
            remote: published,
        })
    }

    /// One pass over the content, returning the digest of what was written.
    fn fetch_once(
        &self,
        node: &RemoteNode,
        partial: &Path,
        algorithm: ChecksumAlgorithm,
        options: &DownloadOptions<'_>,
    ) -> Result<ChecksumValue, EngineError> {
        let storage = self.drive.storage();
        let executor = self.drive.executor();
        let chunk_size = self.drive.download_chunk_size();

        let file = File::create(partial).map_err(|e| EngineError::local_io(partial, e))?;
        let mut writer = HashingWriter::new(file, algorithm);
        let mut offset = 0u64;

        while offset < node.size {
            executor.cancel_token().check()?;
            let len = chunk_size.min(node.size - offset);
            let whole = offset == 0 && len == node.size;
            let expect = if whole {
                Expect::statuses(&[200, 206])
            } else {
                Expect::statuses(&[206])
            };

            let data = executor.execute_read(
                &format!("download bytes {}-{} of {}", offset, offset + len - 1, node.name),
                &storage.download_range(node, offset, len),
                &expect,
                self.drive.settings().transfer_attempts,
                |response| read_exact_body(response.into_reader(), len),
            )?;

            writer
                .write_all(&data)
                .and_then(|_| writer.flush())
                .map_err(|e| EngineError::local_io(partial, e))?;
            offset += len;
            if let Some(progress) = options.progress {
                progress.on_bytes(&node.name, offset, node.size);
            }
        }

        let (file, digest) = writer.finish();
        file.sync_all().map_err(|e| EngineError::local_io(partial, e))?;
        Ok(digest)
    }
}

/// Read exactly `len` bytes; a shorter or longer body is a transport failure.
fn read_exact_body(reader: Box<dyn Read + Send>, len: u64) -> Result<Vec<u8>, TransportError> {
    let mut data = Vec::with_capacity(len as usize);
    reader
        .take(len + 1)
        .read_to_end(&mut data)
        .map_err(|e| TransportError::new(format!("reading range body: {e}")))?;
    if data.len() as u64 != len {
        return Err(TransportError::new(format!(
            "expected {len} bytes, received {}",
            data.len()
        )));
    }
    Ok(data)
}
