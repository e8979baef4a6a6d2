use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::SnapshotError;
use crate::ports::BlobStore;

/// Blob store rooted at a local or mounted directory
///
/// Keys map to relative paths below the root. A single leading `/` is
/// stripped, so `"/filters/a"` and `"filters/a"` name the same blob.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to its location below the root
    pub fn blob_path(&self, key: &str) -> Result<PathBuf, SnapshotError> {
        let relative = Path::new(normalize_key(key));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if relative.as_os_str().is_empty() || escapes {
            return Err(SnapshotError::Transport {
                path: key.to_string(),
                message: "key must be a relative path below the store root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

/// Strip one leading `/` from a blob key
pub fn normalize_key(key: &str) -> &str {
    key.strip_prefix('/').unwrap_or(key)
}

fn transport(key: &str, e: io::Error) -> SnapshotError {
    SnapshotError::Transport {
        path: key.to_string(),
        message: e.to_string(),
    }
}

impl BlobStore for FsBlobStore {
    fn put_file(&self, path: &str, local: &Path) -> Result<(), SnapshotError> {
        let target = self.blob_path(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| transport(path, e))?;
        }
        let bytes = std::fs::copy(local, &target).map_err(|e| transport(path, e))?;
        debug!(key = normalize_key(path), bytes, "Stored blob");
        Ok(())
    }

    fn fetch_to_file(&self, path: &str, local: &Path) -> Result<(), SnapshotError> {
        let source = self.blob_path(path)?;
        std::fs::copy(&source, local).map_err(|e| transport(path, e))?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), SnapshotError> {
        match std::fs::remove_file(self.blob_path(path)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(transport(path, e)),
        }
    }
}
