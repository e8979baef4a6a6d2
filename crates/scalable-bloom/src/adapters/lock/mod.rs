//! # Namespace Locking
//!
//! Serializes writers that share a tier namespace across processes, closing
//! the gap between the membership check and the write of an insert.

mod flock;

pub use flock::NamespaceLock;
