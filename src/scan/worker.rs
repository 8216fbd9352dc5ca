//! Extent-query worker: the consumer side of the gather pipeline.
//!
//! A single long-running thread takes directories off an unbounded queue,
//! runs the external extent-query utility over their children, parses its
//! output and deposits the results into the two shared extent maps. When the
//! queue runs dry it notifies the traversal thread before blocking, so the
//! traversal can decide under the shared lock whether gathering is finished.

use crate::error::ExtentError;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, trace, warn};

use super::entry::SharedEntry;
use super::filefrag::{FileExtents, OutputParser};
use super::relative_to;
use super::traversal::Shared;

/// The external utility and its flag; child names are appended per query.
const EXTENT_QUERY_COMMAND: [&str; 2] = ["filefrag", "-e"];

/// Where the utility's stderr is collected, in append mode, for the whole
/// scan.
const STDERR_LOG_PATH: &str = "logs/filefrag.error.log";

/// Handle owned by the traversal thread.
pub struct ExtentWorker {
    tx: Sender<SharedEntry>,
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

impl ExtentWorker {
    /// Spawns the worker thread.
    pub fn spawn(shared: Arc<Shared>, root: PathBuf) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();

        let error_log = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(STDERR_LOG_PATH)
        {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(
                    "Cannot open {}: {}; extent utility stderr will be discarded",
                    STDERR_LOG_PATH, e
                );
                None
            }
        };

        let inner = WorkerInner {
            shared: Arc::clone(&shared),
            root,
            error_log,
        };
        let handle = thread::Builder::new()
            .name("extent-query".to_string())
            .spawn(move || inner.run(rx))
            .expect("Failed to spawn extent worker thread");

        Self { tx, shared, handle }
    }

    /// Queues a directory whose children need extent maps. Never blocks.
    pub fn enqueue(&self, directory: SharedEntry) {
        self.shared.outstanding.fetch_add(1, Ordering::Release);
        // the receiver lives until the worker thread exits
        let _ = self.tx.send(directory);
    }

    /// Signals the worker to finish and waits for it to exit. Establishes
    /// the happens-before edge the checksum phase relies on.
    pub fn shutdown(self) {
        drop(self.tx);
        if self.handle.join().is_err() {
            error!("Extent worker thread panicked");
        }
    }
}

struct WorkerInner {
    shared: Arc<Shared>,
    root: PathBuf,
    error_log: Option<File>,
}

impl WorkerInner {
    fn run(&self, rx: Receiver<SharedEntry>) {
        debug!("Extent query worker started");
        loop {
            if self.shared.is_shutdown() {
                break;
            }
            let directory = match rx.try_recv() {
                Ok(directory) => directory,
                Err(TryRecvError::Empty) => {
                    // Tell the traversal thread we have caught up before
                    // blocking; it re-checks the termination condition under
                    // this lock.
                    trace!("No queued directories. Notifying the traversal thread");
                    {
                        let _guard = self.shared.handshake.lock();
                        self.shared.producer_wait.notify_all();
                    }
                    match rx.recv() {
                        Ok(directory) => directory,
                        Err(_) => break,
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            };

            if let Err(e) = self.query_directory(&directory) {
                let path = directory.lock().path().to_path_buf();
                error!(
                    "Extent query for directory \"{}\" failed: {}",
                    path.display(),
                    e
                );
                self.shared.count_error();
            }
            self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
        }
        debug!("Extent query worker finished");
    }

    /// Runs the utility over one directory's children and deposits every
    /// parsed listing. A parse deviation abandons this directory only.
    fn query_directory(&self, directory: &SharedEntry) -> Result<(), ExtentError> {
        let (dir_path, children) = {
            let entry = directory.lock();
            match entry.children() {
                Some(children) if !children.is_empty() => {
                    (entry.path().to_path_buf(), children.to_vec())
                }
                _ => {
                    trace!("'{}' has no children to map", entry.path().display());
                    return Ok(());
                }
            }
        };

        trace!("Querying extent map for '{}'", dir_path.display());
        let started = Instant::now();

        let mut by_name: HashMap<String, SharedEntry> = HashMap::with_capacity(children.len());
        let mut command = Command::new(EXTENT_QUERY_COMMAND[0]);
        command.arg(EXTENT_QUERY_COMMAND[1]);
        for child in &children {
            let entry = child.lock();
            command.arg(entry.name());
            by_name.insert(entry.lookup_name(), Arc::clone(child));
        }
        command
            .current_dir(&dir_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(match &self.error_log {
                Some(log) => log
                    .try_clone()
                    .map(Stdio::from)
                    .unwrap_or_else(|_| Stdio::null()),
                None => Stdio::null(),
            });

        let mut process = command.spawn().map_err(|source| ExtentError::Spawn {
            command: EXTENT_QUERY_COMMAND.join(" "),
            source,
        })?;
        let stdout = process.stdout.take().expect("stdout was piped");
        let outcome = self.ingest(stdout, &by_name);
        // No waiting for the utility after EOF; reap it if it already exited
        // and otherwise leave it to the OS.
        let _ = process.try_wait();
        outcome?;

        debug!(
            target: "performance::extent_worker",
            "Extent map for {} files in directory \"{}\" acquired in {:.1?}",
            children.len(),
            relative_to(&dir_path, &self.root).display(),
            started.elapsed(),
        );
        Ok(())
    }

    fn ingest<R: Read>(
        &self,
        output: R,
        children: &HashMap<String, SharedEntry>,
    ) -> Result<(), ExtentError> {
        let mut reader = BufReader::new(output);
        let mut parser = OutputParser::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
                buf.pop();
            }
            let line = String::from_utf8_lossy(&buf);
            if let Some(listing) = parser.feed(&line)? {
                self.deposit(listing, children)?;
            }
        }
        Ok(())
    }

    /// Attaches a parsed listing to the matching child and publishes it into
    /// the extent maps.
    fn deposit(
        &self,
        listing: FileExtents,
        children: &HashMap<String, SharedEntry>,
    ) -> Result<(), ExtentError> {
        let child = children
            .get(&listing.name)
            .ok_or_else(|| ExtentError::UnknownFile {
                name: listing.name.clone(),
            })?;

        let mut entry = child.lock();
        entry.set_extents(listing.block_size, listing.extents);

        if entry.is_directory() {
            // Keyed by the physical position of the lowest-logical extent,
            // the stand-in for where the directory file starts on disk.
            let Some(first) = entry.extents().last().copied() else {
                return Err(ExtentError::EmptyDirectoryMap { name: listing.name });
            };
            trace!(
                "Adding directory \"{}\" to the placement map at block {}",
                listing.name,
                first.physical_offset
            );
            self.shared
                .directory_extent_map
                .lock()
                .insert(first.physical_offset, Arc::clone(child));
        } else {
            trace!(
                "Adding file \"{}\" ({} extents) to the file map",
                listing.name,
                entry.extents().len()
            );
            let mut map = self.shared.file_extent_map.lock();
            for extent in entry.extents() {
                map.insert(extent.physical_offset, Arc::clone(child));
            }
        }
        Ok(())
    }
}
