//! Seek-minimizing scan pipeline
//!
//! Two cooperating threads gather the physical layout of the tree, then the
//! traversal thread alone hashes every file along an ascending physical
//! block sweep.
//!
//! ```text
//! ┌──────────────────┐   directory queue    ┌─────────────────────┐
//! │    Traversal     │ ───────────────────► │    ExtentWorker     │
//! │  (producer)      │                      │  (consumer)         │
//! │  nearest-next    │ ◄─────────────────── │  filefrag -e ...    │
//! │  directory walk  │   directory extent   │  parse + deposit    │
//! └────────┬─────────┘   map inserts        └──────────┬──────────┘
//!          │                                           │
//!          │            file extent map inserts        │
//!          ▼                                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  file extent map: physical block → file entry               │
//! │  swept in ascending key order by the checksum scan          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod entry;
pub mod extent;
pub mod filefrag;
pub mod traversal;
pub mod worker;

pub use entry::{EntryKind, HashStep, ScanEntry, SharedEntry};
pub use extent::Extent;
pub use filefrag::{FileExtents, OutputParser};
pub use traversal::{ScanProgress, ScanStats, Shared, Traversal};
pub use worker::ExtentWorker;

use std::path::Path;

/// Path shortened for log output: relative to the scan root, except for the
/// root itself.
pub(crate) fn relative_to<'a>(path: &'a Path, root: &Path) -> &'a Path {
    if path == root {
        path
    } else {
        path.strip_prefix(root).unwrap_or(path)
    }
}
