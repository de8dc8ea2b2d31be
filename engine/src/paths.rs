//! Slash-path resolution against a provider's id-addressed tree.

use crate::error::EngineError;
use crate::model::RemoteNode;
use crate::storage::Drive;

/// Split a slash path into segments.
///
/// One leading and one trailing slash are ignored; an empty segment anywhere
/// else is rejected. `""` and `"/"` are the root and yield no segments.
pub fn split_path(path: &str) -> Result<Vec<&str>, EngineError> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(EngineError::InvalidPath {
            path: path.to_string(),
            reason: "empty path segment".to_string(),
        });
    }
    Ok(segments)
}

/// Resolves paths for one drive.
pub struct PathResolver<'a> {
    drive: &'a Drive,
}

impl<'a> PathResolver<'a> {
    pub fn new(drive: &'a Drive) -> Self {
        PathResolver { drive }
    }

    /// Id of the folder at `path` under `root_id`.
    ///
    /// With `create`, the first missing segment and everything below it are
    /// created in order, parent before child.
    pub fn resolve(&self, root_id: &str, path: &str, create: bool) -> Result<String, EngineError> {
        let segments = split_path(path)?;
        let mut current = root_id.to_string();

        for (index, segment) in segments.iter().enumerate() {
            let walked = segments[..=index].join("/");
            match self.find(&current, segment)? {
                Some(node) if node.is_folder() => current = node.id,
                Some(_) => {
                    return Err(EngineError::WrongType {
                        path: walked,
                        expected: "folder",
                    })
                }
                None if create => {
                    for missing in &segments[index..] {
                        current = self.create_child(&current, missing)?.id;
                    }
                    return Ok(current);
                }
                None => return Err(EngineError::ItemNotFound { path: walked }),
            }
        }
        Ok(current)
    }

    /// The single child of `folder_id` called `name`, if any.
    pub fn find(&self, folder_id: &str, name: &str) -> Result<Option<RemoteNode>, EngineError> {
        let mut matches = self.drive.list_children(folder_id, Some(name))?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            count => Err(EngineError::AmbiguousName {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// The file or folder at `path`.
    pub fn lookup(&self, root_id: &str, path: &str) -> Result<RemoteNode, EngineError> {
        let segments = split_path(path)?;
        let Some((leaf, parents)) = segments.split_last() else {
            return self.drive.node(root_id);
        };
        let parent_id = self.resolve(root_id, &parents.join("/"), false)?;
        self.find(&parent_id, leaf)?
            .ok_or_else(|| EngineError::ItemNotFound {
                path: segments.join("/"),
            })
    }

    /// True if `path` names an existing folder; a missing path is not a folder.
    pub fn is_folder(&self, root_id: &str, path: &str) -> Result<bool, EngineError> {
        match self.lookup(root_id, path) {
            Ok(node) => Ok(node.is_folder()),
            Err(EngineError::ItemNotFound { .. }) | Err(EngineError::WrongType { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Every node below `folder_id`, depth first, each folder before its contents.
    pub fn list_tree(&self, folder_id: &str) -> Result<Vec<(Vec<String>, RemoteNode)>, EngineError> {
        let mut out = Vec::new();
        self.walk(folder_id, &[], &mut out)?;
        Ok(out)
    }

    fn walk(
        &self,
        folder_id: &str,
        prefix: &[String],
        out: &mut Vec<(Vec<String>, RemoteNode)>,
    ) -> Result<(), EngineError> {
        for node in self.drive.list_children(folder_id, None)? {
            let mut path = prefix.to_vec();
            path.push(node.name.clone());
            let descend = node.is_folder().then(|| node.id.clone());
            out.push((path.clone(), node));
            if let Some(id) = descend {
                self.walk(&id, &path, out)?;
            }
        }
        Ok(())
    }

    fn create_child(&self, parent_id: &str, name: &str) -> Result<RemoteNode, EngineError> {
        match self.drive.create_folder(parent_id, name) {
            Ok(node) => Ok(node),
            Err(EngineError::AlreadyExists { path }) => {
                tracing::debug!(name, "folder appeared concurrently, re-querying");
                match self.find(parent_id, name)? {
                    Some(node) if node.is_folder() => Ok(node),
                    Some(_) => Err(EngineError::WrongType {
                        path,
                        expected: "folder",
                    }),
                    None => Err(EngineError::AlreadyExists { path }),
                }
            }
            Err(e) => Err(e),
        }
    }
}
