//! The global snapshot and the slow-path epoch registry.

use crate::{File, FileId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// The file-table snapshot the incremental loop revolves around.
///
/// One `GlobalState` is owned by the coordinator and mutated only by the
/// edit committer on the coordinator thread. Slow-path runs get an isolated
/// [`deep_copy`](GlobalState::deep_copy); the copies share source text (via
/// `Arc<File>`) and the epoch registry, and nothing else.
///
/// The table never shrinks and `FileId`s are stable for a file's lifetime.
#[derive(Clone, Debug)]
pub struct GlobalState {
    files: Vec<Arc<File>>,
    files_by_path: FxHashMap<String, FileId>,
    epochs: Arc<EpochTracker>,
}

impl GlobalState {
    pub fn new() -> Self {
        GlobalState {
            files: Vec::new(),
            files_by_path: FxHashMap::default(),
            epochs: Arc::new(EpochTracker::default()),
        }
    }

    pub fn find_file_by_path(&self, path: &str) -> Option<FileId> {
        self.files_by_path.get(path).copied()
    }

    /// Enter a file seen for the first time, assigning the next dense id.
    ///
    /// # Panics
    /// Panics if the path is already present; use
    /// [`replace_file`](GlobalState::replace_file) for edits.
    pub fn enter_file(&mut self, file: impl Into<Arc<File>>) -> FileId {
        let file = file.into();
        assert!(
            !self.files_by_path.contains_key(&file.path),
            "file {} entered twice",
            file.path
        );
        let fid = FileId::from_raw(self.files.len() as u32);
        self.files_by_path.insert(file.path.clone(), fid);
        self.files.push(file);
        fid
    }

    /// Replace the contents of an existing entry.
    pub fn replace_file(&mut self, fid: FileId, file: impl Into<Arc<File>>) {
        let file = file.into();
        assert_eq!(
            self.files[fid.idx()].path, file.path,
            "replace_file must keep the path"
        );
        self.files[fid.idx()] = file;
    }

    pub fn file(&self, fid: FileId) -> &File {
        &self.files[fid.idx()]
    }

    pub fn file_arc(&self, fid: FileId) -> Arc<File> {
        Arc::clone(&self.files[fid.idx()])
    }

    pub fn files_len(&self) -> usize {
        self.files.len()
    }

    pub fn file_ids(&self) -> impl Iterator<Item = FileId> + '_ {
        (0..self.files.len() as u32).map(FileId::from_raw)
    }

    pub fn files(&self) -> &[Arc<File>] {
        &self.files
    }

    /// Structural deep copy for slow-path isolation.
    ///
    /// Immutable leaves (file contents, the epoch registry) are shared by
    /// reference; only the mutable spine (the table itself) is copied.
    pub fn deep_copy(&self) -> GlobalState {
        self.clone()
    }

    pub fn epochs(&self) -> &EpochTracker {
        &self.epochs
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct RunningSlowPath {
    epoch: u64,
    canceled: bool,
}

/// Registry of the (at most one) cancelable slow path in flight.
///
/// Shared between the coordinator's snapshot and every deep copy of it, so
/// the coordinator can cancel a run the typechecker thread owns. One mutex
/// makes the commit point atomic: a cancel attempt either lands before the
/// run commits (the run then observes it and discards everything) or fails
/// because the run already committed.
#[derive(Debug, Default)]
pub struct EpochTracker {
    running: Mutex<Option<RunningSlowPath>>,
}

impl EpochTracker {
    /// Register a slow path about to be handed to the typechecker thread.
    ///
    /// # Panics
    /// Panics if an uncanceled slow path is already registered; the
    /// committer must cancel or outwait it first.
    pub fn start_commit_epoch(&self, epoch: u64) {
        let mut running = self.running.lock();
        assert!(
            running.as_ref().map_or(true, |r| r.canceled),
            "slow path {epoch} started while another is still live"
        );
        *running = Some(RunningSlowPath {
            epoch,
            canceled: false,
        });
    }

    /// Epoch of the live (uncanceled) slow path, if any.
    pub fn running_slow_path(&self) -> Option<u64> {
        self.running
            .lock()
            .as_ref()
            .filter(|r| !r.canceled)
            .map(|r| r.epoch)
    }

    /// Single cancelation attempt on behalf of the newer edit `new_epoch`.
    ///
    /// Returns `true` if the in-flight run was marked canceled before its
    /// commit point (no observable effects will land). Returns `false` if
    /// there is nothing to cancel or the run already committed. After a
    /// successful cancel [`running_slow_path`](EpochTracker::running_slow_path)
    /// reports nothing, and the caller decides whether a replacement slow
    /// path starts.
    pub fn try_cancel_slow_path(&self, new_epoch: u64) -> bool {
        let mut running = self.running.lock();
        match running.as_mut() {
            Some(r) if !r.canceled && new_epoch > r.epoch => {
                r.canceled = true;
                true
            }
            _ => false,
        }
    }

    /// The slow path's commit point, called from the typechecker thread.
    ///
    /// Returns `true` exactly when this run is still the registered,
    /// uncanceled slow path; the registration is consumed either way (a
    /// superseded epoch leaves the newer registration alone).
    pub fn try_commit(&self, epoch: u64) -> bool {
        let mut running = self.running.lock();
        match running.as_ref() {
            Some(r) if r.epoch == epoch => {
                let committed = !r.canceled;
                *running = None;
                committed
            }
            _ => false,
        }
    }
}
