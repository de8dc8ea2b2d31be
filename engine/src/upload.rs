//! Chunked, verified uploads.
//!
//! One upload is up to `max_attempts` whole-transfer attempts. Each attempt opens
//! a fresh resumable session, streams the file through a `HashingReader` in
//! provider-sized chunks, and compares the digest of what was sent with the hash
//! the provider reports. A mismatch (or a session that falls out of step with the
//! file) throws the attempt away and starts over in replace mode, so the node the
//! failed attempt produced is overwritten rather than duplicated.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::checksums::{ChecksumAlgorithm, ChecksumValue, HashingReader};
use crate::error::EngineError;
use crate::http::RemoteResponse;
use crate::model::{ChunkOutcome, RemoteNode, UploadTarget, WriteMode};
use crate::paths::PathResolver;
use crate::progress::ProgressCallback;
use crate::retry::{Expect, CONFLICT_STATUSES};
use crate::storage::Drive;

/// Whole-transfer attempts for uploads and downloads.
pub const WHOLE_TRANSFER_ATTEMPTS: u32 = 5;

/// Options for one upload.
#[derive(Clone, Copy)]
pub struct UploadOptions<'a> {
    /// Replace an existing file of the same name
    pub overwrite: bool,
    /// Create missing folders on the way to the destination
    pub create_folder: bool,
    pub max_attempts: u32,
    /// Modification time to record remotely; defaults to the local file's
    pub modified_time: Option<DateTime<Utc>>,
    pub progress: Option<&'a dyn ProgressCallback>,
}

impl Default for UploadOptions<'_> {
    fn default() -> Self {
        UploadOptions {
            overwrite: false,
            create_folder: false,
            max_attempts: WHOLE_TRANSFER_ATTEMPTS,
            modified_time: None,
            progress: None,
        }
    }
}

/// State of one whole-transfer attempt. Dropped when the attempt ends.
pub struct TransferSession {
    pub upload_url: String,
    pub total_size: u64,
    pub bytes_sent: u64,
    /// Local file, hashed as it is read
    pub running_hash: HashingReader<File>,
}

enum Attempt {
    Finished { node: RemoteNode, local: ChecksumValue },
    /// Session and file disagree; the attempt is void
    Desync(String),
}

/// Uploads local files to one drive.
pub struct ChunkedUploader<'a> {
    drive: &'a Drive,
}

impl<'a> ChunkedUploader<'a> {
    pub fn new(drive: &'a Drive) -> Self {
        ChunkedUploader { drive }
    }

    /// Upload `local` into the folder at `remote_folder` (a slash path from the root).
    pub fn upload(
        &self,
        local: &Path,
        remote_folder: &str,
        options: &UploadOptions<'_>,
    ) -> Result<RemoteNode, EngineError> {
        let folder_id = PathResolver::new(self.drive).resolve(
            self.drive.root_id(),
            remote_folder,
            options.create_folder,
        )?;
        self.upload_into(&folder_id, local, options)
    }

    /// Upload `local` into the folder with id `folder_id`.
    pub fn upload_into(
        &self,
        folder_id: &str,
        local: &Path,
        options: &UploadOptions<'_>,
    ) -> Result<RemoteNode, EngineError> {
        let name = local
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| EngineError::InvalidPath {
                path: local.display().to_string(),
                reason: "no usable file name".to_string(),
            })?;
        let metadata = std::fs::metadata(local).map_err(|e| EngineError::local_io(local, e))?;
        if metadata.is_dir() {
            return Err(EngineError::WrongType {
                path: local.display().to_string(),
                expected: "file",
            });
        }
        let size = metadata.len();
        let modified_time = options
            .modified_time
            .or_else(|| metadata.modified().ok().map(DateTime::<Utc>::from));

        let mut existing = match PathResolver::new(self.drive).find(folder_id, name)? {
            Some(node) if node.is_folder() => {
                return Err(EngineError::WrongType {
                    path: name.to_string(),
                    expected: "file",
                })
            }
            Some(_) if !options.overwrite => {
                return Err(EngineError::AlreadyExists {
                    path: name.to_string(),
                })
            }
            found => found,
        };

        let algorithm = self.drive.storage().hash_algorithm();
        let max_attempts = options.max_attempts.max(1);
        let mut failure = None;

        for attempt in 1..=max_attempts {
            self.drive.executor().cancel_token().check()?;
            let target = UploadTarget {
                parent_id: folder_id,
                name,
                existing: existing.as_ref(),
                mode: if existing.is_some() {
                    WriteMode::Replace
                } else {
                    WriteMode::Create
                },
                modified_time,
                size,
            };
            tracing::debug!(name, attempt, size, mode = ?target.mode, "upload attempt");

            let outcome = if size == 0 {
                let node = self.write_empty(&target)?;
                Attempt::Finished {
                    node,
                    local: crate::checksums::checksum_bytes(algorithm, &[]),
                }
            } else {
                self.send_file(&target, local, algorithm, options)?
            };

            let reason = match outcome {
                Attempt::Finished { node, local } => {
                    if size == 0 && node.content_hash.is_none() && node.size == 0 {
                        return Ok(node);
                    }
                    let node = if node.content_hash.is_none() {
                        self.drive.node(&node.id)?
                    } else {
                        node
                    };
                    if local.matches(node.content_hash.as_deref()) {
                        tracing::info!(name, id = %node.id, algorithm = %local.algorithm(), hash = %local, "upload verified");
                        return Ok(node);
                    }
                    let reason = format!(
                        "hash mismatch (local {local}, remote {})",
                        node.content_hash.as_deref().unwrap_or("missing")
                    );
                    failure = Some(EngineError::IntegrityMismatch {
                        name: name.to_string(),
                        attempts: attempt,
                        local: local.hex().to_string(),
                        remote: node.content_hash.clone(),
                    });
                    existing = Some(node);
                    reason
                }
                Attempt::Desync(reason) => {
                    failure = Some(EngineError::Protocol(format!("{name}: {reason}")));
                    reason
                }
            };

            tracing::warn!(name, attempt, max_attempts, reason = %reason, "upload attempt failed");
            if let Some(progress) = options.progress {
                progress.on_attempt_failed(name, attempt, &reason);
            }
        }

        Err(failure.unwrap_or_else(|| EngineError::Protocol(format!("no upload attempt made for {name}"))))
    }

    fn write_empty(&self, target: &UploadTarget<'_>) -> Result<RemoteNode, EngineError> {
        let storage = self.drive.storage();
        let response = self.drive.executor().execute(
            &format!("write empty file {}", target.name),
            &storage.write_empty(target),
            &Expect::statuses(&[200, 201]).or_conflict(),
            self.drive.settings().metadata_attempts,
        )?;
        let response = reject_conflict(response, target.name)?;
        storage.parse_node(response)
    }

    fn send_file(
        &self,
        target: &UploadTarget<'_>,
        local: &Path,
        algorithm: ChecksumAlgorithm,
        options: &UploadOptions<'_>,
    ) -> Result<Attempt, EngineError> {
        let storage = self.drive.storage();
        let executor = self.drive.executor();
        let name = target.name;

        let file = File::open(local).map_err(|e| EngineError::local_io(local, e))?;
        let response = executor.execute(
            &format!("open upload session for {name}"),
            &storage.start_session(target),
            &Expect::statuses(&[200, 201]).or_conflict(),
            self.drive.settings().metadata_attempts,
        )?;
        let response = reject_conflict(response, name)?;
        let mut session = TransferSession {
            upload_url: storage.parse_session(response)?,
            total_size: target.size,
            bytes_sent: 0,
            running_hash: HashingReader::new(file, algorithm),
        };

        let chunk_size = self.drive.upload_chunk_size();
        let mut buf = vec![0u8; chunk_size];
        let expect = Expect::statuses(&storage.chunk_statuses()).or_conflict();

        loop {
            executor.cancel_token().check()?;
            let remaining = session.total_size - session.bytes_sent;
            let want = remaining.min(chunk_size as u64) as usize;
            let read = session
                .running_hash
                .read_chunk(&mut buf[..want])
                .map_err(|e| EngineError::local_io(local, e))?;
            if read < want {
                return Ok(Attempt::Desync("local file shrank during upload".to_string()));
            }
            let is_last = read as u64 == remaining;
            if is_last {
                let mut probe = [0u8; 1];
                let extra = session
                    .running_hash
                    .read(&mut probe)
                    .map_err(|e| EngineError::local_io(local, e))?;
                if extra > 0 {
                    return Ok(Attempt::Desync("local file grew during upload".to_string()));
                }
            }

            let offset = session.bytes_sent;
            let request = storage.upload_chunk(
                &session.upload_url,
                offset,
                buf[..read].to_vec(),
                session.total_size,
            );
            let response = executor.execute(
                &format!("upload bytes {}-{} of {name}", offset, offset + read as u64 - 1),
                &request,
                &expect,
                self.drive.settings().transfer_attempts,
            )?;
            let response = reject_conflict(response, name)?;
            let outcome = storage.parse_chunk(response)?;

            session.bytes_sent += read as u64;
            if let Some(progress) = options.progress {
                progress.on_bytes(name, session.bytes_sent, session.total_size);
            }

            match outcome {
                ChunkOutcome::Complete(node) => {
                    if session.bytes_sent != session.total_size {
                        return Ok(Attempt::Desync(format!(
                            "provider completed the upload after {} of {} bytes",
                            session.bytes_sent, session.total_size
                        )));
                    }
                    let node = node.ok_or_else(|| {
                        EngineError::Protocol(format!("upload of {name} completed without an item"))
                    })?;
                    return Ok(Attempt::Finished {
                        node,
                        local: session.running_hash.finish(),
                    });
                }
                ChunkOutcome::Incomplete { .. } if is_last => {
                    return Ok(Attempt::Desync(
                        "provider expects more data after the final chunk".to_string(),
                    ));
                }
                ChunkOutcome::Incomplete {
                    next_offset: Some(next),
                } if next != session.bytes_sent => {
                    return Ok(Attempt::Desync(format!(
                        "provider expects offset {next}, sent {}",
                        session.bytes_sent
                    )));
                }
                ChunkOutcome::Incomplete { .. } => {}
            }
        }
    }
}

fn reject_conflict(response: RemoteResponse, name: &str) -> Result<RemoteResponse, EngineError> {
    if CONFLICT_STATUSES.contains(&response.status) {
        return Err(EngineError::AlreadyExists {
            path: name.to_string(),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DriveSettings;
    use crate::testing::{memory_drive, Fault, MemoryCloud, Op, RecordingProgress};
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::time::Duration;

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }

    fn small_chunks(drive: Drive) -> Drive {
        drive.with_settings(DriveSettings {
            upload_chunk_size: Some(1000),
            ..DriveSettings::default()
        })
    }

    #[test]
    fn test_upload_in_chunks() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let content: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        let path = write_file(temp_dir.path(), "data.bin", &content);

        let cloud = Arc::new(MemoryCloud::new());
        let (drive, _) = memory_drive(&cloud);
        let drive = small_chunks(drive);
        let progress = RecordingProgress::default();

        let options = UploadOptions {
            progress: Some(&progress),
            ..UploadOptions::default()
        };
        let node = ChunkedUploader::new(&drive)
            .upload(&path, "/", &options)
            .unwrap();

        assert_eq!(node.size, 2500);
        assert_eq!(cloud.content(&node.id).unwrap(), content);
        assert_eq!(cloud.calls(Op::Session), 1);
        assert_eq!(cloud.calls(Op::Chunk), 3);
        assert_eq!(
            progress.events(),
            vec![
                "bytes data.bin 1000/2500",
                "bytes data.bin 2000/2500",
                "bytes data.bin 2500/2500"
            ]
        );
    }

    #[test]
    fn test_existing_name_without_overwrite_sends_no_content() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.txt", b"new");

        let cloud = Arc::new(MemoryCloud::new());
        cloud.add_file("root", "a.txt", b"old");
        let (drive, _) = memory_drive(&cloud);

        let err = ChunkedUploader::new(&drive)
            .upload(&path, "", &UploadOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists { .. }));
        assert_eq!(cloud.content_calls(), 0);
    }

    #[test]
    fn test_overwrite_replaces_existing_node() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.txt", b"new content");

        let cloud = Arc::new(MemoryCloud::new());
        let id = cloud.add_file("root", "a.txt", b"old");
        let (drive, _) = memory_drive(&cloud);

        let options = UploadOptions {
            overwrite: true,
            ..UploadOptions::default()
        };
        let node = ChunkedUploader::new(&drive)
            .upload(&path, "", &options)
            .unwrap();
        assert_eq!(node.id, id);
        assert_eq!(cloud.content(&id).unwrap(), b"new content");
        assert_eq!(cloud.children("root").len(), 1);
    }

    #[test]
    fn test_folder_with_same_name_is_wrong_type() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.txt", b"x");

        let cloud = Arc::new(MemoryCloud::new());
        cloud.add_folder("root", "a.txt");
        let (drive, _) = memory_drive(&cloud);

        let options = UploadOptions {
            overwrite: true,
            ..UploadOptions::default()
        };
        let err = ChunkedUploader::new(&drive)
            .upload(&path, "", &options)
            .unwrap_err();
        assert!(matches!(err, EngineError::WrongType { expected: "file", .. }));
    }

    #[test]
    fn test_empty_file_into_new_folder_opens_no_session() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "empty.txt", b"");

        let cloud = Arc::new(MemoryCloud::new());
        let (drive, _) = memory_drive(&cloud);

        let options = UploadOptions {
            create_folder: true,
            ..UploadOptions::default()
        };
        let node = ChunkedUploader::new(&drive)
            .upload(&path, "backup/", &options)
            .unwrap();

        let backup = cloud.child("root", "backup").unwrap();
        assert!(backup.is_folder());
        assert_eq!(cloud.child(&backup.id, "empty.txt").unwrap().id, node.id);
        assert_eq!(node.size, 0);
        assert_eq!(cloud.calls(Op::Session), 0);
        assert_eq!(cloud.calls(Op::Chunk), 0);
        assert_eq!(cloud.calls(Op::WriteEmpty), 1);
    }

    #[test]
    fn test_missing_folder_without_create() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.txt", b"x");

        let cloud = Arc::new(MemoryCloud::new());
        let (drive, _) = memory_drive(&cloud);

        let err = ChunkedUploader::new(&drive)
            .upload(&path, "backup", &UploadOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::ItemNotFound { .. }));
        assert_eq!(cloud.content_calls(), 0);
    }

    #[test]
    fn test_transient_chunk_failure_is_retried_in_place() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.bin", &[7u8; 3000]);

        let cloud = Arc::new(MemoryCloud::new());
        cloud.inject(Op::Chunk, vec![Fault::Status(503)]);
        let (drive, sleeper) = memory_drive(&cloud);
        let drive = small_chunks(drive);

        ChunkedUploader::new(&drive)
            .upload(&path, "", &UploadOptions::default())
            .unwrap();
        assert_eq!(drive.executor().stats().retries(), 1);
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(20)]);
        assert_eq!(cloud.calls(Op::Session), 1);
        assert_eq!(cloud.calls(Op::Chunk), 4);
    }

    #[test]
    fn test_mismatch_restarts_in_replace_mode() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.bin", b"payload");

        let cloud = Arc::new(MemoryCloud::new());
        cloud.corrupt_completions(1);
        let (drive, _) = memory_drive(&cloud);
        let progress = RecordingProgress::default();

        let options = UploadOptions {
            progress: Some(&progress),
            ..UploadOptions::default()
        };
        let node = ChunkedUploader::new(&drive)
            .upload(&path, "", &options)
            .unwrap();

        assert_eq!(cloud.calls(Op::Session), 2);
        assert_eq!(cloud.children("root").len(), 1);
        assert_eq!(cloud.content(&node.id).unwrap(), b"payload");
        assert!(progress
            .events()
            .contains(&"attempt 1 failed a.bin".to_string()));
    }

    #[test]
    fn test_persistent_mismatch_is_integrity_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.bin", b"payload");

        let cloud = Arc::new(MemoryCloud::new());
        cloud.corrupt_completions(u32::MAX);
        let (drive, _) = memory_drive(&cloud);

        let err = ChunkedUploader::new(&drive)
            .upload(&path, "", &UploadOptions::default())
            .unwrap_err();
        match err {
            EngineError::IntegrityMismatch { attempts, remote, .. } => {
                assert_eq!(attempts, WHOLE_TRANSFER_ATTEMPTS);
                assert_eq!(remote.as_deref(), Some("0123456789abcdef0123456789abcdef"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cloud.calls(Op::Session), WHOLE_TRANSFER_ATTEMPTS);
    }

    #[test]
    fn test_missing_completion_hash_refetches_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.bin", b"payload");

        let cloud = Arc::new(MemoryCloud::new());
        cloud.omit_completion_hash();
        let (drive, _) = memory_drive(&cloud);

        let node = ChunkedUploader::new(&drive)
            .upload(&path, "", &UploadOptions::default())
            .unwrap();
        assert!(node.content_hash.is_some());
        assert_eq!(cloud.calls(Op::Node), 1);
    }

    #[test]
    fn test_conflict_on_session_is_already_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.bin", b"payload");

        let cloud = Arc::new(MemoryCloud::new());
        cloud.inject(Op::Session, vec![Fault::Status(409)]);
        let (drive, _) = memory_drive(&cloud);

        let err = ChunkedUploader::new(&drive)
            .upload(&path, "", &UploadOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists { .. }));
        assert_eq!(cloud.calls(Op::Session), 1);
        assert_eq!(cloud.calls(Op::Chunk), 0);
    }

    #[test]
    fn test_records_requested_modified_time() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.bin", b"payload");

        let cloud = Arc::new(MemoryCloud::new());
        let (drive, _) = memory_drive(&cloud);

        let options = UploadOptions {
            modified_time: Some(Utc.with_ymd_and_hms(2015, 3, 1, 10, 20, 30).unwrap()),
            ..UploadOptions::default()
        };
        let node = ChunkedUploader::new(&drive)
            .upload(&path, "", &options)
            .unwrap();
        assert_eq!(node.modified_time.as_deref(), Some("2015-03-01T10:20:30Z"));
    }

    #[test]
    fn test_exhausted_chunk_retries_surface_remote_connection() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = write_file(temp_dir.path(), "a.bin", b"payload");

        let cloud = Arc::new(MemoryCloud::new());
        cloud.inject(Op::Chunk, vec![Fault::Transport; 10]);
        let (drive, _) = memory_drive(&cloud);

        let err = ChunkedUploader::new(&drive)
            .upload(&path, "", &UploadOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::RemoteConnection { attempts: 10, .. }));
    }
}
