//! The edit committer.
//!
//! Runs on the coordinator's calling thread, never inside the typechecker.
//! Applies an incoming edit to the shared snapshot, recomputes hashes,
//! classifies the update fast vs slow path, and — when a cancelable slow
//! path is in flight — decides whether to cancel and substitute a merged
//! update.

use crate::config::LspConfig;
use crate::protocol::WorkspaceEditParams;
use crate::server::{LspServer, SlowPathRetry};
use crate::updates::LspFileUpdates;
use moss_pipeline::{
    compute_state_hashes, index_batch, File, FileHash, FileId, GlobalState, ParsedFile,
    HASH_STATE_INVALID, HASH_STATE_NOT_COMPUTED,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::debug;

fn find_hash<'a>(
    fid: FileId,
    state_hashes: &'a [FileHash],
    overriding: Option<&'a FxHashMap<FileId, FileHash>>,
) -> &'a FileHash {
    overriding
        .and_then(|map| map.get(&fid))
        .unwrap_or(&state_hashes[fid.idx()])
}

/// Decide whether `updates` can re-check incrementally.
///
/// True iff the fast path is enabled, no file is new to the snapshot, and
/// every updated file parses with an unchanged definition fingerprint. The
/// `overriding` evictions let the merge logic ask the question against the
/// hashes as they stood before an in-flight slow path.
pub(crate) fn can_take_fast_path(
    gs: &GlobalState,
    config: &LspConfig,
    state_hashes: &[FileHash],
    updates: &LspFileUpdates,
    overriding: Option<&FxHashMap<FileId, FileHash>>,
) -> bool {
    if config.disable_fast_path {
        debug!("taking slow path because the fast path is disabled");
        return false;
    }
    if updates.has_new_files {
        debug!("taking slow path because the update has a new file");
        return false;
    }
    let hashes = &updates.updated_file_hashes;
    assert_eq!(updates.updated_files.len(), hashes.len());
    debug!(
        files = updates.updated_files.len(),
        "checking whether the fast path is available"
    );

    for (file, hash) in updates.updated_files.iter().zip(hashes.iter()) {
        let Some(fid) = gs.find_file_by_path(&file.path) else {
            debug!(path = %file.path, "taking slow path because of a new file");
            return false;
        };
        let old_hash = find_hash(fid, state_hashes, overriding);
        assert_ne!(
            old_hash.definitions.hierarchy_hash, HASH_STATE_NOT_COMPUTED,
            "snapshot hash for {} was never computed",
            file.path
        );
        if hash.definitions.hierarchy_hash == HASH_STATE_INVALID {
            debug!(path = %file.path, "taking slow path because of a syntax error");
            return false;
        }
        if hash.definitions.hierarchy_hash != old_hash.definitions.hierarchy_hash {
            debug!(path = %file.path, "taking slow path because definitions changed");
            return false;
        }
    }
    debug!("taking fast path");
    true
}

impl LspServer {
    /// Fold `older` (the in-flight slow path) and `newer` into one update,
    /// as if the client had sent a single edit. Returns the merged update
    /// and the combined evictions map.
    ///
    /// On a path collision the newer file wins. On an eviction collision
    /// the *older* hash wins: the combined map must record, per file, the
    /// hash displaced since the in-flight run's baseline, and that is the
    /// earliest one.
    pub(crate) fn merge_updates(
        &self,
        older: &LspFileUpdates,
        older_evictions: &FxHashMap<FileId, FileHash>,
        newer: &LspFileUpdates,
        newer_evictions: &FxHashMap<FileId, FileHash>,
    ) -> (LspFileUpdates, FxHashMap<FileId, FileHash>) {
        older.assert_parallel();
        newer.assert_parallel();

        let mut merged = LspFileUpdates {
            epoch: newer.epoch,
            edit_count: older.edit_count + newer.edit_count,
            has_new_files: older.has_new_files || newer.has_new_files,
            ..LspFileUpdates::default()
        };

        let mut encountered = FxHashSet::default();
        for source in [newer, older] {
            for (i, file) in source.updated_files.iter().enumerate() {
                if !encountered.insert(file.path.clone()) {
                    continue;
                }
                merged.updated_files.push(Arc::clone(file));
                merged
                    .updated_file_hashes
                    .push(source.updated_file_hashes[i].clone());
                let index: &ParsedFile = &source.updated_file_indexes[i];
                merged.updated_file_indexes.push(index.deep_copy());
            }
        }

        let mut combined = newer_evictions.clone();
        for (&fid, hash) in older_evictions {
            combined.insert(fid, hash.clone());
        }
        merged.can_take_fast_path = can_take_fast_path(
            &self.initial_gs,
            &self.config,
            &self.state_hashes,
            &merged,
            Some(&combined),
        );
        (merged, combined)
    }

    /// Commit one edit to the shared snapshot and classify it.
    ///
    /// Returns the update to dispatch: either the edit itself, or — when an
    /// in-flight slow path was successfully canceled — the edit merged with
    /// the canceled one.
    pub(crate) fn commit_edit(&mut self, edit: WorkspaceEditParams) -> LspFileUpdates {
        let files: Vec<Arc<File>> = edit
            .updates
            .into_iter()
            .map(|update| Arc::new(File::new(update.path, update.source)))
            .collect();
        let hash_input: Vec<Option<Arc<File>>> = files.iter().cloned().map(Some).collect();

        let mut update = LspFileUpdates {
            epoch: edit.epoch,
            edit_count: edit.merge_count + 1,
            updated_file_hashes: compute_state_hashes(
                &*self.indexer,
                self.config.workers,
                &hash_input,
            ),
            updated_files: files,
            ..LspFileUpdates::default()
        };
        update.can_take_fast_path = can_take_fast_path(
            &self.initial_gs,
            &self.config,
            &self.state_hashes,
            &update,
            None,
        );

        // Apply to the snapshot: replace known files, enter new ones, and
        // keep the displaced hashes for merge reasoning.
        let mut frefs = Vec::with_capacity(update.updated_files.len());
        let mut evicted = FxHashMap::default();
        for (i, file) in update.updated_files.iter().enumerate() {
            let fid = match self.initial_gs.find_file_by_path(&file.path) {
                Some(fid) => {
                    assert!(fid.idx() < self.state_hashes.len());
                    self.initial_gs.replace_file(fid, Arc::clone(file));
                    fid
                }
                None => {
                    update.has_new_files = true;
                    let fid = self.initial_gs.enter_file(Arc::clone(file));
                    if fid.idx() >= self.state_hashes.len() {
                        self.state_hashes.resize(fid.idx() + 1, FileHash::default());
                    }
                    fid
                }
            };
            evicted.insert(
                fid,
                std::mem::replace(
                    &mut self.state_hashes[fid.idx()],
                    update.updated_file_hashes[i].clone(),
                ),
            );
            frefs.push(fid);
        }

        // Index the affected files. Batch output is file-id ordered;
        // reorder it to match the other per-file arrays (commit order).
        let mut file_to_pos = FxHashMap::default();
        for (i, &fid) in frefs.iter().enumerate() {
            let prev = file_to_pos.insert(fid, i);
            assert!(prev.is_none(), "duplicate path within one edit");
        }
        let trees = index_batch(&*self.indexer, &self.initial_gs, &frefs);
        let mut by_commit_order: Vec<Option<ParsedFile>> = Vec::new();
        by_commit_order.resize_with(trees.len(), || None);
        for parsed in trees {
            let pos = file_to_pos[&parsed.file];
            by_commit_order[pos] = Some(parsed);
        }
        update.updated_file_indexes = by_commit_order
            .into_iter()
            .map(|parsed| parsed.expect("indexer must return every file"))
            .collect();
        update.assert_parallel();

        // A cancelable slow path may be in flight. Before deep-copying the
        // snapshot, see whether canceling pays off: either the combined
        // edit takes the fast path, or this edit forces a slow path anyway
        // and the in-flight one is wasted work.
        let mut canceled_in_flight = false;
        if let Some(running_epoch) = self.initial_gs.epochs().running_slow_path() {
            let retry = self
                .last_slow_path
                .as_ref()
                .expect("a running slow path implies a recorded update");
            assert_eq!(retry.update.epoch, running_epoch);
            let (merged, combined) =
                self.merge_updates(&retry.update, &retry.evictions, &update, &evicted);
            if (merged.can_take_fast_path || !update.can_take_fast_path)
                && self.initial_gs.epochs().try_cancel_slow_path(merged.epoch)
            {
                debug!(epoch = merged.epoch, "canceled the in-flight slow path");
                canceled_in_flight = true;
                update = merged;
                evicted = combined;
            }
        }

        if !update.can_take_fast_path {
            update.updated_gs = Some(self.initial_gs.deep_copy());
            self.last_slow_path = Some(SlowPathRetry {
                update: update.copy_without_gs(),
                evictions: evicted,
            });
        } else if canceled_in_flight {
            // The merged update replaces the canceled run synchronously;
            // nothing is left to retry against.
            self.last_slow_path = None;
        }
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BufferOutput;
    use crate::testing::{edit, OutlineIndexer};
    use crate::typechecker::NoopAnalysis;
    use pretty_assertions::assert_eq;

    fn server() -> LspServer {
        LspServer::new(
            LspConfig::default(),
            Arc::new(OutlineIndexer::new()),
            Arc::new(NoopAnalysis),
            Arc::new(BufferOutput::new()),
        )
    }

    /// Commit an edit and dispatch it the way the message loop would, so
    /// the typechecker state stays in sync for follow-up edits.
    fn commit_and_run(server: &mut LspServer, params: WorkspaceEditParams) -> LspFileUpdates {
        let update = server.commit_edit(params);
        let dispatched = update.copy_without_gs();
        if !update.can_take_fast_path {
            server.initial_gs.epochs().start_commit_epoch(update.epoch);
        }
        server.coordinator.sync_run(move |typechecker| {
            typechecker.typecheck(update);
        });
        dispatched
    }

    const BODY_A: &str = "class A\n  def foo\n  call log\nend\n";
    const BODY_A2: &str = "class A\n  def foo\n  call warn\nend\n";
    const RESHAPED_A: &str = "class A\n  def foo\n  def extra\nend\n";

    #[test]
    fn new_files_force_the_slow_path() {
        let mut server = server();
        let update = server.commit_edit(edit(1, &[("x.ms", BODY_A)]));
        assert!(!update.can_take_fast_path);
        assert!(update.has_new_files);
        assert!(update.updated_gs.is_some());
        assert_eq!(update.edit_count, 1);
        update.assert_parallel();
    }

    #[test]
    fn body_only_edits_take_the_fast_path() {
        let mut server = server();
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A)]));

        let update = server.commit_edit(edit(2, &[("x.ms", BODY_A2)]));
        assert!(update.can_take_fast_path);
        assert!(!update.has_new_files);
        assert!(update.updated_gs.is_none());
    }

    #[test]
    fn syntax_errors_force_the_slow_path() {
        let mut server = server();
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A)]));

        let update = server.commit_edit(edit(2, &[("x.ms", "class A\nsyntax-error\nend\n")]));
        assert!(!update.can_take_fast_path);
    }

    #[test]
    fn definition_changes_force_the_slow_path() {
        let mut server = server();
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A)]));

        let update = server.commit_edit(edit(2, &[("x.ms", RESHAPED_A)]));
        assert!(!update.can_take_fast_path);
    }

    #[test]
    fn disabling_the_fast_path_wins() {
        let mut server = LspServer::new(
            LspConfig {
                disable_fast_path: true,
                ..LspConfig::default()
            },
            Arc::new(OutlineIndexer::new()),
            Arc::new(NoopAnalysis),
            Arc::new(BufferOutput::new()),
        );
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A)]));
        let update = server.commit_edit(edit(2, &[("x.ms", BODY_A2)]));
        assert!(!update.can_take_fast_path);
    }

    #[test]
    fn snapshot_keeps_file_ids_stable_across_edits() {
        let mut server = server();
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A), ("y.ms", BODY_A)]));
        let x = server.initial_gs.find_file_by_path("x.ms").unwrap();
        commit_and_run(&mut server, edit(2, &[("x.ms", BODY_A2)]));
        assert_eq!(server.initial_gs.find_file_by_path("x.ms"), Some(x));
        assert_eq!(server.initial_gs.files_len(), 2);
    }

    #[test]
    fn eviction_map_records_the_displaced_hashes() {
        let mut server = server();
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A)]));
        let x = server.initial_gs.find_file_by_path("x.ms").unwrap();
        let old_hash = server.state_hashes[x.idx()].clone();

        // Definition change: slow path, so the retry bookkeeping survives.
        server.commit_edit(edit(2, &[("x.ms", RESHAPED_A)]));
        let retry = server.last_slow_path.as_ref().unwrap();
        assert_eq!(retry.update.epoch, 2);
        assert_eq!(retry.evictions.get(&x), Some(&old_hash));
        assert_ne!(server.state_hashes[x.idx()], old_hash);
    }

    #[test]
    fn reverting_edit_cancels_the_slow_path_and_merges_fast() {
        let mut server = server();
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A)]));

        // A hierarchy change goes out on the slow path. Register it as
        // running but keep it off the typechecker queue, exactly as if the
        // run were still in flight.
        let update2 = server.commit_edit(edit(2, &[("x.ms", RESHAPED_A)]));
        assert!(!update2.can_take_fast_path);
        server.initial_gs.epochs().start_commit_epoch(update2.epoch);

        // The next edit reverts the hierarchy. Merged with the in-flight
        // run it is body-only, so the committer cancels and substitutes
        // the merge.
        let update3 = server.commit_edit(edit(3, &[("x.ms", BODY_A2)]));
        assert!(update3.can_take_fast_path);
        assert_eq!(update3.epoch, 3);
        assert_eq!(update3.edit_count, 2);
        assert_eq!(update3.updated_files.len(), 1);
        assert_eq!(&*update3.updated_files[0].source, BODY_A2);
        assert_eq!(server.initial_gs.epochs().running_slow_path(), None);
        assert!(server.last_slow_path.is_none());
        // The canceled run must refuse to commit.
        assert!(!server.initial_gs.epochs().try_commit(2));
    }

    #[test]
    fn slow_edit_supersedes_the_running_slow_path() {
        let mut server = server();
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A), ("y.ms", BODY_A)]));

        let update2 = server.commit_edit(edit(2, &[("x.ms", RESHAPED_A)]));
        assert!(!update2.can_take_fast_path);
        server.initial_gs.epochs().start_commit_epoch(update2.epoch);

        // Another definition change, to a different file: still slow, so
        // the in-flight run is wasted work and gets canceled; the merged
        // update covers both files.
        let update3 = server.commit_edit(edit(3, &[("y.ms", RESHAPED_A)]));
        assert!(!update3.can_take_fast_path);
        assert_eq!(update3.epoch, 3);
        assert_eq!(update3.edit_count, 2);
        let mut paths: Vec<&str> = update3
            .updated_files
            .iter()
            .map(|f| f.path.as_str())
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["x.ms", "y.ms"]);
        assert!(update3.updated_gs.is_some());

        // The merged update is the new retry baseline, with the combined
        // evictions.
        let retry = server.last_slow_path.as_ref().unwrap();
        assert_eq!(retry.update.epoch, 3);
        assert_eq!(retry.evictions.len(), 2);
    }

    #[test]
    fn fast_edit_leaves_a_running_slow_path_alone() {
        let mut server = server();
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A), ("y.ms", BODY_A)]));

        let update2 = server.commit_edit(edit(2, &[("x.ms", RESHAPED_A)]));
        server.initial_gs.epochs().start_commit_epoch(update2.epoch);

        // A body-only edit to an unrelated file: no reason to cancel.
        let update3 = server.commit_edit(edit(3, &[("y.ms", BODY_A2)]));
        assert!(update3.can_take_fast_path);
        assert_eq!(update3.edit_count, 1);
        assert_eq!(server.initial_gs.epochs().running_slow_path(), Some(2));
        assert_eq!(server.last_slow_path.as_ref().unwrap().update.epoch, 2);
    }

    #[test]
    fn merge_of_two_fast_updates_is_fast() {
        let mut server = server();
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A), ("y.ms", BODY_A)]));

        let x = server.initial_gs.find_file_by_path("x.ms").unwrap();
        let y = server.initial_gs.find_file_by_path("y.ms").unwrap();

        let x_displaced = server.state_hashes[x.idx()].clone();
        let a = server.commit_edit(edit(2, &[("x.ms", BODY_A2)]));
        assert!(a.can_take_fast_path);
        let mut a_evictions = FxHashMap::default();
        a_evictions.insert(x, x_displaced);

        let y_displaced = server.state_hashes[y.idx()].clone();
        let b = server.commit_edit(edit(3, &[("y.ms", BODY_A2)]));
        assert!(b.can_take_fast_path);
        let mut b_evictions = FxHashMap::default();
        b_evictions.insert(y, y_displaced);

        let (merged, _) = server.merge_updates(&a, &a_evictions, &b, &b_evictions);
        assert!(merged.can_take_fast_path);
        assert_eq!(merged.epoch, 3);
        assert_eq!(merged.edit_count, 2);
        merged.assert_parallel();
    }

    #[test]
    fn merge_keeps_the_newer_file_on_path_collisions() {
        let mut server = server();
        commit_and_run(&mut server, edit(1, &[("x.ms", BODY_A)]));

        let older = server.commit_edit(edit(2, &[("x.ms", RESHAPED_A)]));
        server.initial_gs.epochs().start_commit_epoch(older.epoch);
        let newer = server.commit_edit(edit(3, &[("x.ms", BODY_A2)]));

        // commit_edit already merged on our behalf; verify the collision
        // outcome it produced.
        assert_eq!(newer.updated_files.len(), 1);
        assert_eq!(&*newer.updated_files[0].source, BODY_A2);
    }
}
