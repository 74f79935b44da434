//! Committed edit batches.

use moss_pipeline::{File, FileHash, GlobalState, ParsedFile};
use std::sync::Arc;

/// A committed edit, as handed to the typechecker.
///
/// The three `updated_*` vectors are parallel: entry `i` of each describes
/// the same file, in commit order. Only slow-path updates carry
/// `updated_gs`, a deep copy of the snapshot for the run to work against in
/// isolation.
#[derive(Clone, Debug, Default)]
pub struct LspFileUpdates {
    /// Monotonic id of the newest edit folded into this update.
    pub epoch: u64,
    /// How many client edits this update represents (merges included).
    pub edit_count: u32,
    pub has_new_files: bool,
    pub updated_files: Vec<Arc<File>>,
    pub updated_file_hashes: Vec<FileHash>,
    pub updated_file_indexes: Vec<ParsedFile>,
    pub can_take_fast_path: bool,
    pub updated_gs: Option<GlobalState>,
}

impl LspFileUpdates {
    /// Check the parallel-arrays invariant.
    pub fn assert_parallel(&self) {
        assert_eq!(self.updated_files.len(), self.updated_file_hashes.len());
        assert_eq!(self.updated_files.len(), self.updated_file_indexes.len());
    }

    /// Copy for merge bookkeeping: trees are deep-copied, the snapshot is
    /// not carried along.
    pub fn copy_without_gs(&self) -> LspFileUpdates {
        LspFileUpdates {
            epoch: self.epoch,
            edit_count: self.edit_count,
            has_new_files: self.has_new_files,
            updated_files: self.updated_files.clone(),
            updated_file_hashes: self.updated_file_hashes.clone(),
            updated_file_indexes: self.updated_file_indexes.clone(),
            can_take_fast_path: self.can_take_fast_path,
            updated_gs: None,
        }
    }
}
