//! Persistence Adapter
//!
//! Versioned snapshots of a whole controller, written to local files or
//! moved through a [`BlobStore`](crate::ports::BlobStore) via staging files.

mod blob;
mod snapshot;
mod store;

pub use blob::{normalize_key, FsBlobStore};
pub use snapshot::{decode_snapshot, encode_snapshot, snapshot_version, SNAPSHOT_MAGIC};
pub use store::{read_snapshot_file, write_snapshot_file, SnapshotStore};
