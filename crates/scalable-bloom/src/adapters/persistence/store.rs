//! Snapshot persistence over local files and blob stores
//!
//! Blob transfers go through a local staging file. The staging file is a
//! `NamedTempFile`, removed when it drops on every exit path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{Builder, NamedTempFile};
use tracing::{info, warn};

use super::snapshot::{decode_snapshot, encode_snapshot, snapshot_version};
use crate::domain::SCHEMA_V1;
use crate::error::{FilterError, SnapshotError};
use crate::ports::{BackendFactory, BlobStore, ScalableFilterApi};
use crate::service::ScalableFilter;

const STAGING_PREFIX: &str = "bloomfilter";

/// Encode a controller and write it to `path`
///
/// The file is replaced atomically: the snapshot is written to a temp file in
/// the same directory and renamed over `path`.
pub fn write_snapshot_file(path: &Path, filter: &ScalableFilter) -> Result<(), FilterError> {
    let bytes = encode_snapshot(&filter.to_state()?)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staging = Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(dir)
        .map_err(SnapshotError::Io)?;
    staging.write_all(&bytes).map_err(SnapshotError::Io)?;
    staging.as_file().sync_all().map_err(SnapshotError::Io)?;
    staging
        .persist(path)
        .map_err(|e| SnapshotError::Io(e.error))?;
    Ok(())
}

/// Read and decode a controller written by [`write_snapshot_file`]
pub fn read_snapshot_file(
    path: &Path,
    factory: Arc<dyn BackendFactory>,
) -> Result<ScalableFilter, FilterError> {
    let bytes = std::fs::read(path).map_err(SnapshotError::Io)?;
    restore(&path.display().to_string(), &bytes, factory)
}

fn restore(
    source: &str,
    bytes: &[u8],
    factory: Arc<dyn BackendFactory>,
) -> Result<ScalableFilter, FilterError> {
    if snapshot_version(bytes)? == SCHEMA_V1 {
        warn!(source, "Loading version 1 snapshot, weighted count unavailable");
    }
    let state = decode_snapshot(bytes)?;
    ScalableFilter::from_state(state, factory)
}

/// Stores and loads controller snapshots in a [`BlobStore`]
pub struct SnapshotStore<B: BlobStore> {
    blobs: B,
    staging_dir: PathBuf,
}

impl<B: BlobStore> SnapshotStore<B> {
    /// Stage through the system temp directory
    pub fn new(blobs: B) -> Self {
        Self {
            blobs,
            staging_dir: std::env::temp_dir(),
        }
    }

    /// Stage through `dir` instead of the system temp directory
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    fn staging_file(&self) -> Result<NamedTempFile, SnapshotError> {
        Ok(Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.staging_dir)?)
    }

    /// Upload a snapshot of `filter` under `path`
    pub fn store(&self, path: &str, filter: &ScalableFilter) -> Result<(), FilterError> {
        let bytes = encode_snapshot(&filter.to_state()?)?;

        let mut staging = self.staging_file()?;
        staging.write_all(&bytes).map_err(SnapshotError::Io)?;
        staging.flush().map_err(SnapshotError::Io)?;

        self.blobs.put_file(path, staging.path())?;
        info!(
            path,
            tiers = filter.size(),
            bytes = bytes.len(),
            "Stored filter snapshot"
        );
        Ok(())
    }

    /// Download the snapshot under `path` and rebuild its tiers via `factory`
    pub fn load(
        &self,
        path: &str,
        factory: Arc<dyn BackendFactory>,
    ) -> Result<ScalableFilter, FilterError> {
        let staging = self.staging_file()?;
        self.blobs.fetch_to_file(path, staging.path())?;
        let bytes = std::fs::read(staging.path()).map_err(SnapshotError::Io)?;

        let filter = restore(path, &bytes, factory)?;
        info!(
            path,
            tiers = filter.size(),
            schema_version = filter.schema_version(),
            "Loaded filter snapshot"
        );
        Ok(filter)
    }

    /// Remove the snapshot under `path`
    pub fn delete(&self, path: &str) -> Result<(), FilterError> {
        Ok(self.blobs.delete(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::backend::LocalBackendFactory;
    use crate::adapters::persistence::FsBlobStore;
    use crate::domain::ScalableConfig;
    use tempfile::TempDir;

    fn filled_filter() -> ScalableFilter {
        let mut filter = ScalableFilter::new(ScalableConfig::default()).unwrap();
        for i in 0..25u64 {
            filter
                .insert_weighted(format!("k{}", i).as_bytes(), i)
                .unwrap();
        }
        filter
    }

    fn staging_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("filter.sbf");
        let filter = filled_filter();

        write_snapshot_file(&path, &filter).unwrap();
        let restored = read_snapshot_file(&path, Arc::new(LocalBackendFactory)).unwrap();

        assert_eq!(restored.count(), filter.count());
        assert_eq!(restored.weighted_count(), filter.weighted_count());
        assert!(restored.include(b"k3").unwrap());
        assert_eq!(staging_entries(dir.path()), 1);
    }

    #[test]
    fn test_blob_round_trip_cleans_staging() {
        let root = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let store = SnapshotStore::new(FsBlobStore::new(root.path()))
            .with_staging_dir(staging.path());
        let filter = filled_filter();

        store.store("/filters/main", &filter).unwrap();
        assert!(root.path().join("filters/main").exists());

        let restored = store
            .load("filters/main", Arc::new(LocalBackendFactory))
            .unwrap();
        assert_eq!(restored.size(), filter.size());
        assert_eq!(staging_entries(staging.path()), 0);

        store.delete("filters/main").unwrap();
        assert!(!root.path().join("filters/main").exists());
    }

    #[test]
    fn test_missing_blob_surfaces_transport_error() {
        let root = TempDir::new().unwrap();
        let store = SnapshotStore::new(FsBlobStore::new(root.path()));

        let result = store.load("absent", Arc::new(LocalBackendFactory));
        assert!(matches!(
            result,
            Err(FilterError::Snapshot(SnapshotError::Transport { .. }))
        ));
    }

    #[test]
    fn test_corrupt_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage");
        std::fs::write(&path, b"not a snapshot").unwrap();

        assert!(matches!(
            read_snapshot_file(&path, Arc::new(LocalBackendFactory)),
            Err(FilterError::Snapshot(SnapshotError::DataFormat(_)))
        ));
    }
}
