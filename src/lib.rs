//! medialibchecker - Seek-Minimizing Media Library Checksummer
//!
//! A tool that checksums every file of a media library stored on a
//! rotational disk while keeping head seeks to a minimum. Instead of hashing
//! files in directory order, it first asks the filesystem where everything
//! physically lives and then sweeps the disk in block order.
//!
//! # How it works
//!
//! - **Extent-aware gathering**: a traversal thread descends into whichever
//!   unvisited directory is physically nearest to the last disk position,
//!   while a worker thread runs `filefrag -e` over each directory's children
//!   and records every file's extent map.
//!
//! - **Seek-minimizing hashing**: once the tree is mapped, the file extent
//!   map (keyed by physical block) is swept in ascending order; each file's
//!   streaming xxHash64 is fed extent by extent, in logical file order,
//!   across as many sweeps as its fragmentation requires.
//!
//! - **Best effort**: unreadable directories, malformed extent listings and
//!   failing files are logged and skipped; the scan never stops for them.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  directory queue   ┌──────────────────────┐
//! │   Traversal   │ ─────────────────► │     ExtentWorker     │
//! │ nearest-next  │                    │ filefrag -e <names…> │
//! │ directory walk│ ◄───────────────── │   parse + deposit    │
//! └───────┬───────┘  placement map     └──────────┬───────────┘
//!         │                                       │
//!         ▼                                       ▼
//!       ┌───────────────────────────────────────────┐
//!       │ file extent map: physical block → file    │
//!       │ ascending sweeps drive streaming xxHash64 │
//!       └───────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Checksum a library; hashes land in the log
//! medialibchecker /srv/media
//!
//! # With per-extent performance logging
//! medialibchecker -v /srv/media
//! ```

pub mod checksum;
pub mod config;
pub mod error;
pub mod progress;
pub mod scan;

pub use config::{CliArgs, ScanConfig};
pub use error::{ConfigError, ExtentError};
pub use scan::{ScanStats, Traversal};
