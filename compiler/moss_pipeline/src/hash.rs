//! File state hashes.
//!
//! A [`FileHash`] is a structural fingerprint of one file. Its
//! `definitions.hierarchy_hash` component covers the shape of the file's
//! top-level definitions (classes, ancestors, method names and static-ness)
//! and deliberately ignores method bodies: an edit that only touches bodies
//! keeps the hash, which is what lets the incremental loop take the fast
//! path. The usages component fingerprints call sites and is consumed
//! elsewhere.
//!
//! [`compute_state_hashes`] fans a batch out over a bounded work queue and a
//! scoped worker pool; workers push per-thread result batches into a bounded
//! result queue which the caller drains.

use crate::{File, IndexedSource, Indexer};
use crossbeam_channel::{bounded, RecvTimeoutError};
use moss_ir::ast::Expression;
use rustc_hash::FxHasher;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Sentinel: the hash was never computed for this entry.
pub const HASH_STATE_NOT_COMPUTED: u32 = u32::MAX;
/// Sentinel: the file failed to parse; its fingerprint cannot be trusted.
pub const HASH_STATE_INVALID: u32 = u32::MAX - 1;

/// Fingerprint of a file's definition shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinitionsHash {
    pub hierarchy_hash: u32,
}

impl Default for DefinitionsHash {
    fn default() -> Self {
        DefinitionsHash {
            hierarchy_hash: HASH_STATE_NOT_COMPUTED,
        }
    }
}

/// Fingerprint of a file's call sites. Opaque to the fast-path decision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsageHash {
    pub sends: u32,
}

/// Structural fingerprint of one file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileHash {
    pub definitions: DefinitionsHash,
    pub usages: UsageHash,
}

impl FileHash {
    /// The hash of a file with a syntax error.
    pub fn invalid() -> FileHash {
        FileHash {
            definitions: DefinitionsHash {
                hierarchy_hash: HASH_STATE_INVALID,
            },
            usages: UsageHash::default(),
        }
    }
}

/// Index one file and fingerprint the result.
pub fn compute_file_hash(indexer: &dyn Indexer, file: &File) -> FileHash {
    let IndexedSource { tree, parse_failed } = crate::index_source(indexer, file);
    if parse_failed {
        return FileHash::invalid();
    }
    fingerprint(&tree)
}

/// Fingerprint a parsed + desugared tree.
fn fingerprint(tree: &Expression) -> FileHash {
    let mut walk = FingerprintWalk::default();
    walk.visit(tree);
    let mut hierarchy_hash = walk.hierarchy.finish() as u32;
    // Keep computed hashes clear of the two sentinel values.
    if hierarchy_hash >= HASH_STATE_INVALID {
        hierarchy_hash = hierarchy_hash.wrapping_sub(2);
    }
    FileHash {
        definitions: DefinitionsHash { hierarchy_hash },
        usages: UsageHash {
            sends: walk.usages.finish() as u32,
        },
    }
}

#[derive(Default)]
struct FingerprintWalk {
    hierarchy: FxHasher,
    usages: FxHasher,
}

impl FingerprintWalk {
    fn visit(&mut self, expr: &Expression) {
        match expr {
            Expression::ClassDef(cd) => self.visit_class(cd),
            Expression::MethodDef(md) => {
                self.hierarchy.write_u8(3);
                self.hierarchy.write_u32(md.name.raw());
                self.hierarchy.write_u8(md.flags.is_self as u8);
                self.hierarchy.write_usize(md.params.len());
                // Bodies only feed the usage fingerprint.
                self.visit_usages(&md.rhs);
            }
            Expression::Send(send) => {
                self.usages.write_u32(send.method.raw());
                self.visit(&send.recv);
                for arg in &send.args {
                    self.visit(arg);
                }
            }
            Expression::InsSeq(seq) => {
                for stat in &seq.stats {
                    self.visit(stat);
                }
                self.visit(&seq.result);
            }
            Expression::Empty(_)
            | Expression::Local(_)
            | Expression::UnresolvedIdent(_)
            | Expression::Literal(_) => {}
        }
    }

    fn visit_class(&mut self, cd: &moss_ir::ClassDef) {
        self.hierarchy.write_u8(match cd.kind {
            moss_ir::ClassKind::Class => 1,
            moss_ir::ClassKind::Module => 2,
        });
        self.hash_name_expr(&cd.name);
        self.hierarchy.write_usize(cd.ancestors.len());
        for ancestor in &cd.ancestors {
            self.hash_name_expr(ancestor);
        }
        for child in &cd.rhs {
            self.visit(child);
        }
    }

    /// Collect call sites below `expr` without touching the hierarchy hash.
    fn visit_usages(&mut self, expr: &Expression) {
        match expr {
            Expression::Send(send) => {
                self.usages.write_u32(send.method.raw());
                self.visit_usages(&send.recv);
                for arg in &send.args {
                    self.visit_usages(arg);
                }
            }
            Expression::InsSeq(seq) => {
                for stat in &seq.stats {
                    self.visit_usages(stat);
                }
                self.visit_usages(&seq.result);
            }
            Expression::ClassDef(cd) => {
                // A class nested in a body still shapes the hierarchy.
                self.visit_class(cd);
            }
            Expression::MethodDef(md) => {
                self.visit_usages(&md.rhs);
            }
            Expression::Empty(_)
            | Expression::Local(_)
            | Expression::UnresolvedIdent(_)
            | Expression::Literal(_) => {}
        }
    }

    fn hash_name_expr(&mut self, expr: &Expression) {
        match expr {
            Expression::UnresolvedIdent(ident) => {
                self.hierarchy.write_u32(ident.name.raw());
            }
            // Anything else (error recovery, dynamic names) hashes as a
            // fixed tag so the shape still registers.
            _ => self.hierarchy.write_u8(0xff),
        }
    }
}

/// How long the caller waits on the result queue between progress checks.
const BLOCK_INTERVAL: Duration = Duration::from_millis(25);

/// Compute hashes for a batch of files in parallel.
///
/// The output is indexed like `files`. A missing (`None`) entry yields
/// `FileHash::default()`.
pub fn compute_state_hashes(
    indexer: &dyn Indexer,
    workers: usize,
    files: &[Option<Arc<File>>],
) -> Vec<FileHash> {
    let mut result = vec![FileHash::default(); files.len()];
    if files.is_empty() {
        return result;
    }
    debug!(files = files.len(), "computing state hashes");

    let workers = workers.max(1);
    let (file_tx, file_rx) = bounded::<usize>(files.len());
    for idx in 0..files.len() {
        file_tx.send(idx).expect("work queue sized for the batch");
    }
    drop(file_tx);

    let (result_tx, result_rx) = bounded::<Vec<(usize, FileHash)>>(workers);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let file_rx = file_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                let mut processed = Vec::new();
                while let Ok(idx) = file_rx.try_recv() {
                    let hash = match &files[idx] {
                        None => FileHash::default(),
                        Some(file) => compute_file_hash(indexer, file),
                    };
                    processed.push((idx, hash));
                }
                if !processed.is_empty() {
                    let _ = result_tx.send(processed);
                }
            });
        }
        drop(result_tx);

        loop {
            match result_rx.recv_timeout(BLOCK_INTERVAL) {
                Ok(batch) => {
                    for (idx, hash) in batch {
                        result[idx] = hash;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    trace!("state hashing still running");
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexedSource;
    use moss_ir::{build, Loc, NameTable};
    use pretty_assertions::assert_eq;

    /// Builds a one-class tree from a comma-separated list in the source:
    /// `"A:foo,bar"` is class A with methods foo and bar; a trailing `!`
    /// marks a method static; `@call:x` adds a body call site; `!!` anywhere
    /// fails the parse.
    struct OutlineIndexer {
        tbl: NameTable,
    }

    impl OutlineIndexer {
        fn new() -> Self {
            OutlineIndexer {
                tbl: NameTable::new(),
            }
        }
    }

    impl Indexer for OutlineIndexer {
        fn index(&self, file: &File) -> IndexedSource {
            if file.source.contains("!!") {
                return IndexedSource {
                    tree: build::empty(Loc::NONE),
                    parse_failed: true,
                };
            }
            let (class_name, rest) = file.source.trim().split_once(':').unwrap_or(("Main", ""));
            let mut rhs = vec![];
            for part in rest.split(',').filter(|p| !p.is_empty()) {
                if let Some(callee) = part.strip_prefix("@call:") {
                    rhs.push(build::send0(Loc::NONE, self.tbl.intern(callee)));
                } else {
                    let (name, is_self) = match part.strip_suffix('!') {
                        Some(name) => (name, true),
                        None => (part, false),
                    };
                    rhs.push(build::method_def(
                        Loc::NONE,
                        self.tbl.intern(name),
                        is_self,
                        vec![],
                        build::empty(Loc::NONE),
                    ));
                }
            }
            IndexedSource {
                tree: build::class_def(
                    Loc::NONE,
                    build::constant(Loc::NONE, self.tbl.intern(class_name)),
                    vec![],
                    rhs,
                ),
                parse_failed: false,
            }
        }
    }

    fn hash_of(indexer: &OutlineIndexer, source: &str) -> FileHash {
        compute_file_hash(indexer, &File::new("x.ms", source))
    }

    #[test]
    fn body_only_edits_keep_the_hierarchy_hash() {
        let indexer = OutlineIndexer::new();
        let before = hash_of(&indexer, "A:foo,@call:log");
        let after = hash_of(&indexer, "A:foo,@call:warn");
        assert_eq!(
            before.definitions.hierarchy_hash,
            after.definitions.hierarchy_hash
        );
        assert_ne!(before.usages.sends, after.usages.sends);
    }

    #[test]
    fn definition_edits_change_the_hierarchy_hash() {
        let indexer = OutlineIndexer::new();
        let base = hash_of(&indexer, "A:foo");
        assert_ne!(
            base.definitions.hierarchy_hash,
            hash_of(&indexer, "A:bar").definitions.hierarchy_hash
        );
        assert_ne!(
            base.definitions.hierarchy_hash,
            hash_of(&indexer, "A:foo!").definitions.hierarchy_hash
        );
        assert_ne!(
            base.definitions.hierarchy_hash,
            hash_of(&indexer, "B:foo").definitions.hierarchy_hash
        );
    }

    #[test]
    fn syntax_errors_hash_invalid() {
        let indexer = OutlineIndexer::new();
        let hash = hash_of(&indexer, "A:foo,!!");
        assert_eq!(hash.definitions.hierarchy_hash, HASH_STATE_INVALID);
    }

    #[test]
    fn computed_hashes_avoid_the_sentinels() {
        let indexer = OutlineIndexer::new();
        let hash = hash_of(&indexer, "A:foo,bar,baz!");
        assert!(hash.definitions.hierarchy_hash < HASH_STATE_INVALID);
        assert_ne!(hash.definitions.hierarchy_hash, HASH_STATE_NOT_COMPUTED);
    }

    #[test]
    fn batch_hashing_matches_sequential_and_handles_missing_files() {
        let indexer = OutlineIndexer::new();
        let sources = ["A:foo", "B:bar!", "C:@call:x", "D:foo,!!"];
        let mut files: Vec<Option<Arc<File>>> = sources
            .iter()
            .enumerate()
            .map(|(i, src)| Some(Arc::new(File::new(format!("f{i}.ms"), *src))))
            .collect();
        files.insert(2, None);

        let hashes = compute_state_hashes(&indexer, 4, &files);
        assert_eq!(hashes.len(), files.len());
        for (i, file) in files.iter().enumerate() {
            match file {
                None => assert_eq!(hashes[i], FileHash::default()),
                Some(file) => assert_eq!(hashes[i], compute_file_hash(&indexer, file)),
            }
        }
    }

    #[test]
    fn empty_batch_is_fine() {
        let indexer = OutlineIndexer::new();
        assert!(compute_state_hashes(&indexer, 4, &[]).is_empty());
    }

    #[test]
    fn class_name_feeds_the_fingerprint() {
        let tbl = NameTable::new();
        let tree_a = build::class_def(
            Loc::NONE,
            build::constant(Loc::NONE, tbl.intern("A")),
            vec![],
            vec![],
        );
        let tree_b = build::class_def(
            Loc::NONE,
            build::constant(Loc::NONE, tbl.intern("B")),
            vec![],
            vec![],
        );
        assert_ne!(fingerprint(&tree_a), fingerprint(&tree_b));
    }
}
