//! Configuration types for medialibchecker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Seek-minimizing checksum scanner for media libraries on rotational disks
#[derive(Parser, Debug, Clone)]
#[command(
    name = "medialibchecker",
    version,
    about = "Seek-minimizing checksum scanner for media libraries on rotational disks",
    long_about = "Walks a media library, asks filefrag for the physical extent map of every \
                  file, and checksums all regular files while sweeping the disk in physical \
                  block order to keep head seeks to a minimum.\n\n\
                  Checksums are emitted to the log; nothing is written back to the library.",
    after_help = "EXAMPLES:\n    \
        medialibchecker /srv/media\n    \
        medialibchecker -v /srv/media      # per-extent performance logging\n    \
        medialibchecker -q /srv/media      # no progress spinner"
)]
pub struct CliArgs {
    /// Root directory of the media library to scan
    #[arg(value_name = "MEDIA_ROOT")]
    pub root: PathBuf,

    /// Quiet mode - suppress the progress spinner
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug and performance logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Root directory of the scan
    pub root: PathBuf,

    /// Show progress spinner
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl ScanConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let metadata = std::fs::metadata(&args.root).map_err(|e| ConfigError::RootMissing {
            path: args.root.clone(),
            reason: e.to_string(),
        })?;

        if !metadata.is_dir() {
            return Err(ConfigError::RootNotADirectory { path: args.root });
        }

        Ok(Self {
            root: args.root,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(root: PathBuf) -> CliArgs {
        CliArgs {
            root,
            quiet: false,
            verbose: false,
        }
    }

    #[test]
    fn test_valid_root_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig::from_args(args(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.root, dir.path());
        assert!(config.show_progress);
    }

    #[test]
    fn test_missing_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = ScanConfig::from_args(args(missing)).unwrap_err();
        assert!(matches!(err, ConfigError::RootMissing { .. }));
    }

    #[test]
    fn test_file_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a-file");
        std::fs::write(&file, b"not a directory").unwrap();
        let err = ScanConfig::from_args(args(file)).unwrap_err();
        assert!(matches!(err, ConfigError::RootNotADirectory { .. }));
    }

    #[test]
    fn test_quiet_disables_progress() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(dir.path().to_path_buf());
        a.quiet = true;
        let config = ScanConfig::from_args(a).unwrap();
        assert!(!config.show_progress);
    }
}
