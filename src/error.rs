//! Error types for medialibchecker
//!
//! Design philosophy, carried over across the codebase:
//! - Use thiserror for structured error types in library code
//! - Errors are logged where they occur and never cross threads; the scan is
//!   best-effort and idempotent, so there is no higher-level recovery
//! - Only configuration problems abort the run

use std::path::PathBuf;
use thiserror::Error;

/// Configuration and CLI errors. These are the only fatal ones.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Media root path does not exist
    #[error("Media root '{path}' does not exist: {reason}")]
    RootMissing { path: PathBuf, reason: String },

    /// Media root is not a directory
    #[error("Media root '{path}' is not a directory")]
    RootNotADirectory { path: PathBuf },
}

/// Deviations while querying extent maps for one directory.
///
/// Any of these aborts ingestion of the offending directory only; its files
/// are skipped and the traversal carries on with the rest of the tree.
#[derive(Error, Debug)]
pub enum ExtentError {
    /// Size header line did not match the expected shape
    #[error("malformed file size header: '{line}'")]
    BadSizeHeader { line: String },

    /// The literal extents table header was not where it should be
    #[error("unexpected extents table header: '{line}'")]
    BadExtentsHeader { line: String },

    /// Extent row with too few columns
    #[error("too few fields in extent row: '{line}'")]
    ShortExtentRow { line: String },

    /// Extent row field that is not a number
    #[error("non-numeric field in extent row: '{line}'")]
    BadExtentNumber { line: String },

    /// Per-file summary line did not match the expected shape
    #[error("malformed extent summary line: '{line}'")]
    BadSummaryLine { line: String },

    /// The utility reported a file we never asked about
    #[error("unknown file '{name}' in extent listing")]
    UnknownFile { name: String },

    /// A directory file came back with an empty extent list, leaving it
    /// nowhere to be placed in the directory map
    #[error("directory '{name}' reported no extents")]
    EmptyDirectoryMap { name: String },

    /// The extent-query utility could not be launched
    #[error("failed to launch '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the utility's output failed mid-stream
    #[error("failed to read extent listing: {0}")]
    Read(#[from] std::io::Error),
}
