//! The traversal producer: discovers directories in physical-nearest-next
//! order, then drives the seek-minimizing checksum scan.
//!
//! Phase A (gather) walks the directory placement map with a sweeping block
//! cursor, reading each chosen directory's content and feeding it back to
//! the extent worker. Phase B logs aggregate statistics. Phase C repeatedly
//! sweeps the file extent map in ascending physical order, hashing each map
//! entry only when it is also the owning file's next extent in logical
//! order.

use crate::config::ScanConfig;
use humansize::{format_size, BINARY};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use super::entry::{ScanEntry, SharedEntry};
use super::worker::ExtentWorker;

/// State shared between the traversal thread, the extent worker, the signal
/// handler and the progress reporter.
pub struct Shared {
    shutdown: AtomicBool,

    /// Directories enqueued on the worker and not yet fully processed.
    /// Zero means the worker has caught up with everything it was given.
    pub(crate) outstanding: AtomicUsize,

    /// Guards the idle handshake between the traversal and the worker.
    pub(crate) handshake: Mutex<()>,
    pub(crate) producer_wait: Condvar,

    /// Directory placement map: physical block where a directory file
    /// starts on disk → directory. Inserted by the worker, drained by the
    /// traversal in nearest-next order.
    pub(crate) directory_extent_map: Mutex<BTreeMap<i32, SharedEntry>>,

    /// One entry per extent of every regular file, keyed by the extent's
    /// physical block. Populated by the worker during gathering; consumed by
    /// the checksum scan alone once the worker has been joined.
    pub(crate) file_extent_map: Mutex<BTreeMap<i32, SharedEntry>>,

    directories: AtomicU64,
    files_hashed: AtomicU64,
    bytes_hashed: AtomicU64,
    pass: AtomicU64,
    errors: AtomicU64,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
            handshake: Mutex::new(()),
            producer_wait: Condvar::new(),
            directory_extent_map: Mutex::new(BTreeMap::new()),
            file_extent_map: Mutex::new(BTreeMap::new()),
            directories: AtomicU64::new(0),
            files_hashed: AtomicU64::new(0),
            bytes_hashed: AtomicU64::new(0),
            pass: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Requests a cooperative shutdown and wakes the traversal thread if it
    /// is waiting on the worker.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _guard = self.handshake.lock();
        self.producer_wait.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub(crate) fn worker_idle(&self) -> bool {
        self.outstanding.load(Ordering::Acquire) == 0
    }

    pub(crate) fn count_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a complete scan run.
#[derive(Debug, Clone, Default)]
pub struct ScanStats {
    pub directories: u64,
    pub files: u64,
    pub total_bytes: u64,
    pub max_extent_bytes: u64,
    pub files_hashed: u64,
    pub bytes_hashed: u64,
    pub passes: u64,
    pub errors: u64,
    pub duration: Duration,
    pub completed: bool,
}

/// Progress snapshot for display.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    pub directories: u64,
    pub files_hashed: u64,
    pub bytes_hashed: u64,
    pub pass: u64,
    pub elapsed: Duration,
}

/// The producer side of the pipeline; owns the worker and both extent maps.
pub struct Traversal {
    config: ScanConfig,
    shared: Arc<Shared>,
    /// Directories whose content has been read, in visit order. Only used
    /// for the statistics report.
    prepared: Vec<SharedEntry>,
}

impl Traversal {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::new()),
            prepared: Vec::new(),
        }
    }

    /// Shared state handle for signal handlers and progress reporters.
    pub fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    /// Runs the scan to completion or until a shutdown is requested.
    pub fn run(&mut self) -> ScanStats {
        let start = Instant::now();

        self.gather();

        let (files, total_bytes, max_extent_bytes) = if self.shared.is_shutdown() {
            // partial results are discarded
            (0, 0, 0)
        } else {
            self.report_stats()
        };

        let passes = self.scan_checksums();

        ScanStats {
            directories: self.prepared.len() as u64,
            files,
            total_bytes,
            max_extent_bytes,
            files_hashed: self.shared.files_hashed.load(Ordering::Relaxed),
            bytes_hashed: self.shared.bytes_hashed.load(Ordering::Relaxed),
            passes,
            errors: self.shared.errors.load(Ordering::Relaxed),
            duration: start.elapsed(),
            completed: !self.shared.is_shutdown(),
        }
    }

    /// Runs the scan while feeding periodic progress snapshots to `callback`
    /// from a helper thread.
    pub fn run_with_progress<F>(&mut self, callback: F) -> ScanStats
    where
        F: Fn(ScanProgress) + Send + 'static,
    {
        let start = Instant::now();
        let shared = Arc::clone(&self.shared);

        let progress_handle = thread::spawn(move || {
            while !shared.is_shutdown() {
                callback(ScanProgress {
                    directories: shared.directories.load(Ordering::Relaxed),
                    files_hashed: shared.files_hashed.load(Ordering::Relaxed),
                    bytes_hashed: shared.bytes_hashed.load(Ordering::Relaxed),
                    pass: shared.pass.load(Ordering::Relaxed),
                    elapsed: start.elapsed(),
                });
                thread::sleep(Duration::from_millis(100));
            }
        });

        let stats = self.run();

        // stop the progress thread; `stats.completed` was captured first
        self.shared.request_shutdown();
        let _ = progress_handle.join();

        stats
    }

    /// Phase A: discover every directory reachable from the root, visiting
    /// them in physical-nearest-next order, and feed each one's children to
    /// the extent worker.
    fn gather(&mut self) {
        let worker = ExtentWorker::spawn(Arc::clone(&self.shared), self.config.root.clone());

        let root = ScanEntry::new_root(self.config.root.clone());
        root.lock().read_content(None);
        worker.enqueue(Arc::clone(&root));
        self.prepared.push(root);
        self.shared.directories.store(1, Ordering::Relaxed);

        // The root's own physical position is unknown until the worker
        // reports on its children, so the sweep starts at block zero.
        let mut current_block: i32 = 0;

        'gather: while !self.shared.is_shutdown() {
            let Some((key, directory)) = self.take_nearest(current_block) else {
                trace!("Placement map is empty. Waiting for the worker");
                let mut guard = self.shared.handshake.lock();
                while self.shared.directory_extent_map.lock().is_empty() {
                    if self.shared.is_shutdown() {
                        break 'gather;
                    }
                    if self.shared.worker_idle() {
                        trace!("Worker has drained its queue. Gathering is complete");
                        break 'gather;
                    }
                    self.shared.producer_wait.wait(&mut guard);
                    trace!("Notify received");
                }
                continue;
            };

            {
                let mut entry = directory.lock();
                trace!(
                    "Nearest block is {} with directory \"{}\"",
                    key,
                    entry.name().to_string_lossy()
                );
                entry.read_content(Some(&self.config.root));
                // the sweep continues from the largest physical position
                // recorded for this directory file
                current_block = entry
                    .extents()
                    .first()
                    .map(|e| e.physical_offset)
                    .unwrap_or(current_block);
            }
            worker.enqueue(Arc::clone(&directory));
            self.prepared.push(directory);
            self.shared.directories.fetch_add(1, Ordering::Relaxed);
        }

        worker.shutdown();
    }

    /// Removes and returns the mapped directory whose key is physically
    /// nearest to `current_block`.
    fn take_nearest(&self, current_block: i32) -> Option<(i32, SharedEntry)> {
        let mut map = self.shared.directory_extent_map.lock();
        let key = nearest_key(&map, current_block)?;
        let directory = map.remove(&key).expect("key was just looked up");
        Some((key, directory))
    }

    /// Phase B: aggregate and log what the gather phase found.
    fn report_stats(&self) -> (u64, u64, u64) {
        let started = Instant::now();
        let mut total_files = 0u64;
        let mut total_size = 0u64;
        let mut max_extent = 0u64;

        for directory in &self.prepared {
            let entry = directory.lock();
            let Some(children) = entry.children() else {
                continue;
            };
            total_files += children.len() as u64;
            for child in children {
                let child = child.lock();
                total_size += child.size();
                max_extent = max_extent.max(child.max_extent_bytes());
            }
        }

        info!(
            "Found {} directories with {} files and total size {}. Max extent size is {}",
            self.prepared.len(),
            total_files,
            format_size(total_size, BINARY),
            format_size(max_extent, BINARY),
        );
        debug!(target: "performance::traversal", "File report done in {:.1?}", started.elapsed());

        (total_files, total_size, max_extent)
    }

    /// Phase C: sweep the file extent map in ascending physical order until
    /// every extent has been hashed. Returns the number of passes.
    ///
    /// Within one ascending sweep only the currently smallest remaining
    /// logical extent of each file can be consumed; later extents wait for
    /// the next pass, so the pass count is bounded by the largest per-file
    /// extent count.
    fn scan_checksums(&self) -> u64 {
        // the worker has been joined; this thread owns the map now
        let mut map = std::mem::take(&mut *self.shared.file_extent_map.lock());

        let mut pass = 0u64;
        while !self.shared.is_shutdown() && !map.is_empty() {
            info!("File map checksum scan #{}...", pass);
            self.shared.pass.store(pass, Ordering::Relaxed);
            let before = map.len();

            map.retain(|&physical_offset, entry| {
                if self.shared.is_shutdown() {
                    return true;
                }
                let mut file = entry.lock();
                if file.is_failed() {
                    return false;
                }
                if !file.is_next_physical_extent(physical_offset) {
                    return true;
                }
                match file.hash_step() {
                    Ok(step) => {
                        self.shared
                            .bytes_hashed
                            .fetch_add(step.bytes_hashed, Ordering::Relaxed);
                        if step.finished {
                            self.shared.files_hashed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => {
                        error!("Error while reading \"{}\": {}", file.path().display(), e);
                        file.mark_failed();
                        self.shared.count_error();
                    }
                }
                false
            });

            if self.shared.is_shutdown() {
                break;
            }
            if map.len() == before {
                // cursor state can no longer change, e.g. two extents
                // collided on one physical key; further passes would spin
                warn!(
                    "Checksum scan made no progress with {} extents left; stopping",
                    map.len()
                );
                break;
            }
            pass += 1;
        }
        pass
    }
}

/// Key in `map` nearest to `current_block`: the smaller of the floor and
/// ceiling distances, with ties going to the ceiling.
pub(crate) fn nearest_key<V>(map: &BTreeMap<i32, V>, current_block: i32) -> Option<i32> {
    let ceiling = map.range(current_block..).next().map(|(k, _)| *k);
    let floor = map.range(..=current_block).next_back().map(|(k, _)| *k);
    match (floor, ceiling) {
        (None, ceiling) => ceiling,
        (floor, None) => floor,
        (Some(floor), Some(ceiling)) => {
            let floor_distance = (current_block as i64 - floor as i64).abs();
            let ceiling_distance = (ceiling as i64 - current_block as i64).abs();
            if floor_distance < ceiling_distance {
                Some(floor)
            } else {
                Some(ceiling)
            }
        }
    }
}
