//! Per-file scan state: paths, extent lists and streaming checksums.
//!
//! Entries are created by the directory reader on the traversal thread,
//! filled in with extent data by the worker thread, and finally drained by
//! the single-threaded checksum scanner, so they live behind a mutex and are
//! shared by `Arc`.

use crate::checksum;
use humansize::{format_size, BINARY};
use memmap2::{Advice, MmapOptions};
use parking_lot::Mutex;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use xxhash_rust::xxh64::Xxh64;

use super::extent::Extent;

/// Shared handle to one entry of the scanned tree.
pub type SharedEntry = Arc<Mutex<ScanEntry>>;

/// What a directory entry is.
///
/// Symlinks and special files are treated as regular files: the extent
/// utility reports whatever extents they have, usually none, and files
/// without extents are simply never hashed.
pub enum EntryKind {
    File,
    Directory {
        /// Immediate children. `None` until `read_content` has run, or when
        /// the directory could not be read; empty when the directory is
        /// genuinely empty.
        children: Option<Vec<SharedEntry>>,
    },
}

/// Outcome of a single hashing step.
#[derive(Debug, Clone, Copy)]
pub struct HashStep {
    /// Bytes fed into the hash by this step.
    pub bytes_hashed: u64,
    /// True when this step consumed the last byte and finalized the hash.
    pub finished: bool,
}

/// Scan state of one file (or directory file) in the tree.
pub struct ScanEntry {
    path: PathBuf,
    /// Bare file name, as listed by and passed to the extent utility.
    name: OsString,
    /// Size in bytes as of enumeration time, for the summary report.
    size: u64,
    /// Bytes per filesystem block, reported by the extent utility.
    block_size: u32,
    /// Extents sorted by descending logical offset: the last logical
    /// segment first, the first one last.
    extents: Vec<Extent>,
    /// Index into `extents` of the next extent to hash. Starts at the tail
    /// (the smallest logical offset) and walks toward the head; `None` when
    /// there is nothing left to hash.
    cursor: Option<usize>,
    scan: Option<HashScanState>,
    final_hash: Option<u64>,
    /// Set when a read error dropped this file from the scan.
    failed: bool,
    kind: EntryKind,
}

/// Open-file state that only exists between the first and last hash step.
struct HashScanState {
    file: File,
    hasher: Xxh64,
    bytes_remaining: u64,
}

impl ScanEntry {
    /// The root of the scan: a directory whose content has not been read yet.
    pub fn new_root(path: PathBuf) -> SharedEntry {
        let name = path
            .file_name()
            .map(OsStr::to_os_string)
            .unwrap_or_else(|| path.clone().into_os_string());
        Arc::new(Mutex::new(Self::new(
            path,
            name,
            0,
            EntryKind::Directory { children: None },
        )))
    }

    fn new_child(path: PathBuf, name: OsString, size: u64, is_dir: bool) -> SharedEntry {
        let kind = if is_dir {
            EntryKind::Directory { children: None }
        } else {
            EntryKind::File
        };
        Arc::new(Mutex::new(Self::new(path, name, size, kind)))
    }

    fn new(path: PathBuf, name: OsString, size: u64, kind: EntryKind) -> Self {
        Self {
            path,
            name,
            size,
            block_size: 0,
            extents: Vec::new(),
            cursor: None,
            scan: None,
            final_hash: None,
            failed: false,
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Name as it will appear in the extent utility's output.
    pub fn lookup_name(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    pub fn final_hash(&self) -> Option<u64> {
        self.final_hash
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    /// Immediate children of a directory; `None` for files and for
    /// directories that have not been (or could not be) read.
    pub fn children(&self) -> Option<&[SharedEntry]> {
        match &self.kind {
            EntryKind::Directory { children } => children.as_deref(),
            EntryKind::File => None,
        }
    }

    /// Records the extent map reported for this file.
    ///
    /// Extents are kept in descending logical order so the checksum scanner
    /// can walk the cursor from the tail index toward zero while earlier
    /// passes pop processed entries off the physical map.
    pub fn set_extents(&mut self, block_size: u32, mut extents: Vec<Extent>) {
        extents.sort_by(|a, b| b.logical_offset.cmp(&a.logical_offset));
        self.cursor = extents.len().checked_sub(1);
        self.block_size = block_size;
        self.extents = extents;
    }

    /// Largest extent of this file in bytes; 0 when no extents are known.
    pub fn max_extent_bytes(&self) -> u64 {
        self.extents
            .iter()
            .map(|e| e.byte_len(self.block_size))
            .max()
            .unwrap_or(0)
    }

    fn next_extent(&self) -> Option<Extent> {
        self.cursor.and_then(|c| self.extents.get(c)).copied()
    }

    /// True when `physical_offset` is where the next not-yet-hashed extent
    /// of this file starts.
    ///
    /// The checksum scanner visits physical positions in ascending order but
    /// must consume each file's extents in logical order; a map entry is
    /// only hashed when both orders agree, everything else waits for a later
    /// pass.
    pub fn is_next_physical_extent(&self, physical_offset: i32) -> bool {
        self.next_extent()
            .is_some_and(|e| e.physical_offset == physical_offset)
    }

    /// Hashes exactly one extent's worth of data.
    ///
    /// The first call opens the file and sets up the streaming hash; the
    /// call that consumes the last byte closes the file and finalizes the
    /// checksum. Errors leave the entry in a state where the caller is
    /// expected to drop it from the scan.
    pub fn hash_step(&mut self) -> io::Result<HashStep> {
        let extent = self
            .next_extent()
            .ok_or_else(|| io::Error::other("extent cursor exhausted"))?;

        if self.scan.is_none() {
            let file = File::open(&self.path)?;
            let bytes_remaining = file.metadata()?.len();
            self.scan = Some(HashScanState {
                file,
                hasher: checksum::streaming(),
                bytes_remaining,
            });
        }
        let scan = self.scan.as_mut().expect("hash state just initialized");

        let to_read = scan.bytes_remaining.min(extent.byte_len(self.block_size));
        let started = Instant::now();
        let mapped = unsafe {
            MmapOptions::new()
                .offset(extent.logical_offset as u64)
                .len(to_read as usize)
                .map(&scan.file)?
        };
        // advisory prefetch; failure does not matter
        let _ = mapped.advise(Advice::WillNeed);
        scan.hasher.update(&mapped);
        scan.bytes_remaining -= to_read;
        let finished = scan.bytes_remaining == 0;

        self.cursor = self.cursor.and_then(|c| c.checked_sub(1));

        let elapsed = started.elapsed();
        debug!(
            target: "performance::file_entry",
            "Hashed {} blocks ({} at {}/s) of \"{}\" in {:.1?}",
            extent.block_count,
            format_size(to_read, BINARY),
            format_size((to_read as f64 / elapsed.as_secs_f64().max(1e-9)) as u64, BINARY),
            self.name.to_string_lossy(),
            elapsed,
        );

        if finished {
            let state = self.scan.take().expect("hash state present");
            let hash = state.hasher.digest();
            self.final_hash = Some(hash);
            info!("Checksum of \"{}\" is {:016x}", self.path.display(), hash);
        }

        Ok(HashStep {
            bytes_hashed: to_read,
            finished,
        })
    }

    /// Enumerates the immediate children of this directory, non-recursive.
    ///
    /// Each child becomes either a further directory entry or a regular file
    /// entry. A directory that cannot be read is logged and left with no
    /// children; that is not fatal to the scan. `root` is only used to
    /// shorten the path in the performance log.
    pub fn read_content(&mut self, root: Option<&Path>) {
        let started = Instant::now();
        trace!("Reading content of directory '{}'", self.path.display());

        let EntryKind::Directory { children } = &mut self.kind else {
            return;
        };

        let entries = match std::fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read directory '{}': {}", self.path.display(), e);
                return;
            }
        };

        let mut found = Vec::new();
        for dent in entries {
            let dent = match dent {
                Ok(d) => d,
                Err(e) => {
                    warn!("Failed to read entry of '{}': {}", self.path.display(), e);
                    continue;
                }
            };
            // does not follow symlinks; anything that is not a directory is
            // handled as a regular file
            let is_dir = dent.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let size = dent.metadata().map(|m| m.len()).unwrap_or(0);
            found.push(Self::new_child(dent.path(), dent.file_name(), size, is_dir));
        }

        let count = found.len();
        *children = Some(found);

        let shown = root
            .and_then(|r| self.path.strip_prefix(r).ok())
            .unwrap_or(&self.path);
        debug!(
            target: "performance::dir_entry",
            "Read {} entries of directory \"{}\" in {:.1?}",
            count,
            shown.display(),
            started.elapsed(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum_of;
    use std::io::Write;

    fn file_entry(path: PathBuf, size: u64) -> ScanEntry {
        let name = path.file_name().unwrap().to_os_string();
        ScanEntry::new(path, name, size, EntryKind::File)
    }

    #[test]
    fn test_set_extents_sorts_descending_by_logical_offset() {
        let mut entry = file_entry(PathBuf::from("/nowhere"), 0);
        entry.set_extents(
            4096,
            vec![
                Extent::new(0, 500, 1),
                Extent::new(8192, 90, 2),
                Extent::new(4096, 200, 1),
            ],
        );
        let logicals: Vec<i32> = entry.extents().iter().map(|e| e.logical_offset).collect();
        assert_eq!(logicals, vec![8192, 4096, 0]);
        // cursor starts at the smallest logical offset
        assert!(entry.is_next_physical_extent(500));
        assert!(!entry.is_next_physical_extent(200));
    }

    #[test]
    fn test_max_extent_bytes() {
        let mut entry = file_entry(PathBuf::from("/nowhere"), 0);
        assert_eq!(entry.max_extent_bytes(), 0);
        entry.set_extents(4096, vec![Extent::new(0, 10, 2), Extent::new(8192, 20, 5)]);
        assert_eq!(entry.max_extent_bytes(), 5 * 4096);
    }

    #[test]
    fn test_no_extents_never_matches() {
        let entry = file_entry(PathBuf::from("/nowhere"), 0);
        assert!(!entry.is_next_physical_extent(0));
    }

    #[test]
    fn test_hash_step_single_extent_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a");
        let content = vec![0xA5u8; 5120];
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&content)
            .unwrap();

        let mut entry = file_entry(path, 5120);
        entry.set_extents(4096, vec![Extent::new(0, 100, 2)]);

        let step = entry.hash_step().unwrap();
        assert_eq!(step.bytes_hashed, 5120);
        assert!(step.finished);
        assert_eq!(entry.final_hash(), Some(checksum_of(&content)));
        // cursor is spent
        assert!(!entry.is_next_physical_extent(100));
    }

    #[test]
    fn test_hash_step_fragmented_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b");
        let content: Vec<u8> = (0u32..8192).map(|i| (i % 253) as u8).collect();
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&content)
            .unwrap();

        let mut entry = file_entry(path, 8192);
        // physically reversed relative to logical order
        entry.set_extents(4096, vec![Extent::new(4096, 200, 1), Extent::new(0, 500, 1)]);

        assert!(entry.is_next_physical_extent(500));
        let first = entry.hash_step().unwrap();
        assert_eq!(first.bytes_hashed, 4096);
        assert!(!first.finished);

        assert!(entry.is_next_physical_extent(200));
        let second = entry.hash_step().unwrap();
        assert!(second.finished);
        assert_eq!(entry.final_hash(), Some(checksum_of(&content)));
    }

    #[test]
    fn test_hash_step_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut entry = file_entry(dir.path().join("gone"), 0);
        entry.set_extents(4096, vec![Extent::new(0, 100, 1)]);
        assert!(entry.hash_step().is_err());
    }

    #[test]
    fn test_read_content_classifies_children() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let root = ScanEntry::new_root(dir.path().to_path_buf());
        root.lock().read_content(None);

        let root = root.lock();
        let children = root.children().unwrap();
        assert_eq!(children.len(), 2);
        let dirs = children.iter().filter(|c| c.lock().is_directory()).count();
        assert_eq!(dirs, 1);
    }

    #[test]
    fn test_read_content_of_missing_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = ScanEntry::new_root(dir.path().join("vanished"));
        root.lock().read_content(None);
        assert!(root.lock().children().is_none());
    }
}
