//! The live analysis state and the `Analysis` seam.

use crate::protocol::{Location, Position};
use crate::updates::LspFileUpdates;
use moss_pipeline::{FileHash, GlobalState, ParsedFile};
use std::sync::Arc;
use tracing::debug;

/// Name resolution, inference, and error emission — external to this
/// repository. The typechecker calls through this seam; diagnostics travel
/// through the implementation's own channels.
pub trait Analysis: Send + Sync {
    /// Check `files` against `gs`.
    fn typecheck(&self, gs: &GlobalState, files: &[ParsedFile]) {
        let _ = (gs, files);
    }

    /// Definitions/references/highlights relevant to a source position.
    fn query_by_loc(&self, gs: &GlobalState, path: &str, position: Position) -> Vec<Location> {
        let _ = (gs, path, position);
        Vec::new()
    }

    /// Markdown hover text for a source position.
    fn hover(&self, gs: &GlobalState, path: &str, position: Position) -> Option<String> {
        let _ = (gs, path, position);
        None
    }
}

/// Analysis that answers nothing. Useful until an analyzer is attached, and
/// in tests of the coordination machinery.
pub struct NoopAnalysis;

impl Analysis for NoopAnalysis {}

/// Owner of the live analysis state, confined to the typechecker thread.
///
/// Holds its own snapshot, indexed trees, and hash column, all deep-copied
/// from the coordinator at `initialize` and advanced by `typecheck`. Fast
/// -path edits mutate this state in place; slow-path edits work against the
/// isolated snapshot carried by the update and only land here at the commit
/// point.
pub struct Typechecker {
    gs: Option<GlobalState>,
    indexed: Vec<Option<ParsedFile>>,
    state_hashes: Vec<FileHash>,
    analysis: Arc<dyn Analysis>,
    typecheck_runs: u32,
}

impl Typechecker {
    pub fn new(analysis: Arc<dyn Analysis>) -> Self {
        Typechecker {
            gs: None,
            indexed: Vec::new(),
            state_hashes: Vec::new(),
            analysis,
            typecheck_runs: 0,
        }
    }

    /// Install the initial snapshot and run the first full check.
    pub fn initialize(
        &mut self,
        gs: GlobalState,
        indexed: Vec<ParsedFile>,
        state_hashes: Vec<FileHash>,
    ) {
        let mut slots: Vec<Option<ParsedFile>> = Vec::new();
        slots.resize_with(gs.files_len(), || None);
        let files: Vec<ParsedFile> = indexed.iter().cloned().collect();
        for parsed in indexed {
            let idx = parsed.file.idx();
            slots[idx] = Some(parsed);
        }
        self.analysis.typecheck(&gs, &files);
        self.gs = Some(gs);
        self.indexed = slots;
        self.state_hashes = state_hashes;
    }

    /// Apply one committed update. Returns `true` iff the edit was a slow
    /// path run that got canceled; canceled runs leave no observable state.
    pub fn typecheck(&mut self, update: LspFileUpdates) -> bool {
        update.assert_parallel();
        let canceled = if update.can_take_fast_path {
            self.run_fast_path(update);
            false
        } else {
            self.run_slow_path(update)
        };
        if !canceled {
            self.typecheck_runs += 1;
        }
        canceled
    }

    /// In-place incremental check: definition shapes are unchanged, so the
    /// existing state stays valid and only the edited files re-check.
    fn run_fast_path(&mut self, update: LspFileUpdates) {
        let gs = self
            .gs
            .as_mut()
            .expect("typechecker used before initialize");
        debug!(epoch = update.epoch, files = update.updated_files.len(), "fast path");

        for (file, hash) in update
            .updated_files
            .iter()
            .zip(update.updated_file_hashes.iter())
        {
            let fid = gs
                .find_file_by_path(&file.path)
                .expect("fast path edits only touch known files");
            gs.replace_file(fid, Arc::clone(file));
            self.state_hashes[fid.idx()] = hash.clone();
        }
        self.analysis.typecheck(gs, &update.updated_file_indexes);
        for parsed in update.updated_file_indexes {
            let idx = parsed.file.idx();
            if idx >= self.indexed.len() {
                self.indexed.resize_with(idx + 1, || None);
            }
            self.indexed[idx] = Some(parsed);
        }
    }

    /// Full re-check against the update's isolated snapshot. Nothing lands
    /// in the live state unless the run survives its commit point.
    fn run_slow_path(&mut self, mut update: LspFileUpdates) -> bool {
        let new_gs = update
            .updated_gs
            .take()
            .expect("slow-path update must carry a snapshot");
        debug!(epoch = update.epoch, files = update.updated_files.len(), "slow path");

        let mut indexed = self.indexed.clone();
        if indexed.len() < new_gs.files_len() {
            indexed.resize_with(new_gs.files_len(), || None);
        }
        for parsed in update.updated_file_indexes {
            let idx = parsed.file.idx();
            indexed[idx] = Some(parsed);
        }
        let files: Vec<ParsedFile> = indexed.iter().flatten().cloned().collect();
        self.analysis.typecheck(&new_gs, &files);

        if !new_gs.epochs().try_commit(update.epoch) {
            debug!(epoch = update.epoch, "slow path canceled before commit");
            return true;
        }

        let mut state_hashes = std::mem::take(&mut self.state_hashes);
        if state_hashes.len() < new_gs.files_len() {
            state_hashes.resize(new_gs.files_len(), FileHash::default());
        }
        for (file, hash) in update
            .updated_files
            .iter()
            .zip(update.updated_file_hashes.iter())
        {
            let fid = new_gs
                .find_file_by_path(&file.path)
                .expect("committed files are in the snapshot");
            state_hashes[fid.idx()] = hash.clone();
        }
        self.gs = Some(new_gs);
        self.indexed = indexed;
        self.state_hashes = state_hashes;
        false
    }

    /// Number of uncanceled typecheck runs, for tests and telemetry.
    pub fn typecheck_runs(&self) -> u32 {
        self.typecheck_runs
    }

    /// Source of a file in the live snapshot.
    pub fn read_file(&self, path: &str) -> Option<Arc<str>> {
        let gs = self.gs.as_ref()?;
        let fid = gs.find_file_by_path(path)?;
        Some(Arc::clone(&gs.file(fid).source))
    }

    pub fn query_by_loc(&self, path: &str, position: Position) -> Vec<Location> {
        match self.gs.as_ref() {
            Some(gs) => self.analysis.query_by_loc(gs, path, position),
            None => Vec::new(),
        }
    }

    pub fn hover(&self, path: &str, position: Position) -> Option<String> {
        self.analysis.hover(self.gs.as_ref()?, path, position)
    }

    /// True once `initialize` has run.
    pub fn is_initialized(&self) -> bool {
        self.gs.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moss_ir::{build, Loc};
    use moss_pipeline::File;
    use pretty_assertions::assert_eq;

    fn parsed(fid: moss_pipeline::FileId) -> ParsedFile {
        ParsedFile {
            file: fid,
            tree: build::empty(Loc::NONE),
            parse_failed: false,
        }
    }

    fn slow_update(epoch: u64, gs: &GlobalState, path: &str) -> LspFileUpdates {
        let fid = gs.find_file_by_path(path).expect("file entered");
        LspFileUpdates {
            epoch,
            edit_count: 1,
            has_new_files: true,
            updated_files: vec![gs.file_arc(fid)],
            updated_file_hashes: vec![FileHash::default()],
            updated_file_indexes: vec![parsed(fid)],
            can_take_fast_path: false,
            updated_gs: Some(gs.deep_copy()),
        }
    }

    #[test]
    fn committed_slow_path_installs_state() {
        let mut typechecker = Typechecker::new(Arc::new(NoopAnalysis));
        let mut gs = GlobalState::new();
        gs.enter_file(File::new("x.ms", "class A\n"));
        gs.epochs().start_commit_epoch(1);

        let canceled = typechecker.typecheck(slow_update(1, &gs, "x.ms"));
        assert!(!canceled);
        assert_eq!(typechecker.typecheck_runs(), 1);
        assert_eq!(typechecker.read_file("x.ms").as_deref(), Some("class A\n"));
    }

    #[test]
    fn canceled_slow_path_leaves_no_observable_state() {
        let mut typechecker = Typechecker::new(Arc::new(NoopAnalysis));
        typechecker.initialize(GlobalState::new(), vec![], vec![]);

        let mut gs = GlobalState::new();
        gs.enter_file(File::new("x.ms", "class A\n"));
        gs.epochs().start_commit_epoch(4);
        let update = slow_update(4, &gs, "x.ms");
        assert!(gs.epochs().try_cancel_slow_path(5));

        let canceled = typechecker.typecheck(update);
        assert!(canceled);
        assert_eq!(typechecker.typecheck_runs(), 0);
        assert_eq!(typechecker.read_file("x.ms"), None);
    }

    #[test]
    fn fast_path_mutates_the_live_snapshot_in_place() {
        let mut typechecker = Typechecker::new(Arc::new(NoopAnalysis));
        let mut gs = GlobalState::new();
        let fid = gs.enter_file(File::new("x.ms", "class A\n"));
        typechecker.initialize(gs.deep_copy(), vec![parsed(fid)], vec![FileHash::default()]);

        let update = LspFileUpdates {
            epoch: 2,
            edit_count: 1,
            has_new_files: false,
            updated_files: vec![Arc::new(File::new("x.ms", "class A # v2\n"))],
            updated_file_hashes: vec![FileHash::default()],
            updated_file_indexes: vec![parsed(fid)],
            can_take_fast_path: true,
            updated_gs: None,
        };
        assert!(!typechecker.typecheck(update));
        assert_eq!(typechecker.typecheck_runs(), 1);
        assert_eq!(
            typechecker.read_file("x.ms").as_deref(),
            Some("class A # v2\n")
        );
    }
}
