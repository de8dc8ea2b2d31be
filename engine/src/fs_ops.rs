//! Local filesystem operations.
//!
//! This module provides the local side of transfers:
//! - Enumerating a directory tree to upload
//! - Making sure a download destination directory exists

use std::fs;
use std::io;
use std::path::Path;

use crate::error::EngineError;
use crate::model::{ItemSource, TransferItem};

/// Enumerate the directory tree under `source`.
///
/// # Arguments
/// * `source` - Directory to enumerate
/// * `prefix` - Segments prepended to every item's relative path
///
/// # Returns
/// Vec<TransferItem> with all files and subdirectories, each directory listed
/// before its contents and siblings sorted by name.
///
/// # Errors
/// Returns EngineError::LocalIo if any directory cannot be read.
pub fn enumerate_tree(source: &Path, prefix: &[String]) -> Result<Vec<TransferItem>, EngineError> {
    let mut items = Vec::new();

    fn recurse(
        path: &Path,
        rel_path: &[String],
        items: &mut Vec<TransferItem>,
    ) -> Result<(), EngineError> {
        let mut entries = fs::read_dir(path)
            .and_then(|entries| entries.collect::<io::Result<Vec<_>>>())
            .map_err(|e| EngineError::local_io(path, e))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let entry_path = entry.path();
            let metadata = entry
                .metadata()
                .map_err(|e| EngineError::local_io(&entry_path, e))?;
            let name = entry.file_name().to_str().map(str::to_string).ok_or_else(|| {
                EngineError::InvalidPath {
                    path: entry_path.display().to_string(),
                    reason: "file name is not valid UTF-8".to_string(),
                }
            })?;

            let mut rel_full_path = rel_path.to_vec();
            rel_full_path.push(name);

            if metadata.is_dir() {
                items.push(TransferItem::new(
                    ItemSource::Local(entry_path.clone()),
                    rel_full_path.clone(),
                    0,
                    true,
                ));
                recurse(&entry_path, &rel_full_path, items)?;
            } else {
                items.push(TransferItem::new(
                    ItemSource::Local(entry_path),
                    rel_full_path,
                    metadata.len(),
                    false,
                ));
            }
        }
        Ok(())
    }

    recurse(source, prefix, &mut items)?;
    Ok(items)
}

/// Ensure `dir` exists as a directory, creating it (and its parents) when `create` is set.
///
/// # Errors
/// Returns EngineError::LocalIo if the path is a file, is missing and `create`
/// is false, or cannot be created.
pub fn ensure_dir(dir: &Path, create: bool) -> Result<(), EngineError> {
    // An empty path is the current directory.
    if dir.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(dir) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::local_io(
            dir,
            io::Error::new(io::ErrorKind::InvalidInput, "path exists but is not a directory"),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound && create => {
            fs::create_dir_all(dir).map_err(|e| EngineError::local_io(dir, e))
        }
        Err(e) => Err(EngineError::local_io(dir, e)),
    }
}
