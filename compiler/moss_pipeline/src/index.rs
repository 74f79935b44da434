//! Indexing: parse (external) + desugar.
//!
//! The Moss parser lives outside this repository; implementations of
//! [`Indexer`] wrap it. Indexing runs the canonicalization passes (notably
//! definition flattening) over the parser's output, producing the trees
//! every later stage consumes.

use crate::{File, FileId, GlobalState};
use moss_ir::Expression;
use rayon::prelude::*;

/// Raw parser output for one file.
///
/// A file that failed to parse still carries a (possibly partial) tree;
/// `parse_failed` records that its definition fingerprint cannot be
/// trusted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedSource {
    pub tree: Expression,
    pub parse_failed: bool,
}

/// The parser seam, supplied by the embedder.
///
/// Must be cheap to call from worker threads; the state hasher and the
/// committer both fan out over it.
pub trait Indexer: Send + Sync {
    fn index(&self, file: &File) -> IndexedSource;
}

/// Parse and desugar one file.
pub fn index_source(indexer: &dyn Indexer, file: &File) -> IndexedSource {
    let IndexedSource { tree, parse_failed } = indexer.index(file);
    IndexedSource {
        tree: moss_canon::flatten(tree),
        parse_failed,
    }
}

/// An indexed file bound to its table slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedFile {
    pub file: FileId,
    pub tree: Expression,
    pub parse_failed: bool,
}

impl ParsedFile {
    /// Structural deep copy; see [`Expression::deep_copy`].
    pub fn deep_copy(&self) -> ParsedFile {
        self.clone()
    }
}

/// Index a batch of files in parallel.
///
/// Output is ordered by file id, not by the order of `files`; callers that
/// need another order reorder afterwards.
pub fn index_batch(indexer: &dyn Indexer, gs: &GlobalState, files: &[FileId]) -> Vec<ParsedFile> {
    let mut indexed: Vec<ParsedFile> = files
        .par_iter()
        .map(|&fid| {
            let IndexedSource { tree, parse_failed } = index_source(indexer, gs.file(fid));
            ParsedFile {
                file: fid,
                tree,
                parse_failed,
            }
        })
        .collect();
    indexed.sort_by_key(|parsed| parsed.file);
    indexed
}

#[cfg(test)]
mod tests {
    use super::*;
    use moss_ir::{build, Loc};

    /// Indexes every file to an empty tree; fails files containing `!!`.
    struct TrivialIndexer;

    impl Indexer for TrivialIndexer {
        fn index(&self, file: &File) -> IndexedSource {
            IndexedSource {
                tree: build::empty(Loc::NONE),
                parse_failed: file.source.contains("!!"),
            }
        }
    }

    #[test]
    fn batch_output_is_file_id_ordered() {
        let mut gs = GlobalState::new();
        let a = gs.enter_file(File::new("a.ms", "class A\n"));
        let b = gs.enter_file(File::new("b.ms", "class B\n"));
        let c = gs.enter_file(File::new("c.ms", "!!\n"));

        let indexed = index_batch(&TrivialIndexer, &gs, &[c, a, b]);
        assert_eq!(
            indexed.iter().map(|p| p.file).collect::<Vec<_>>(),
            vec![a, b, c]
        );
        assert!(indexed[2].parse_failed);
    }
}
