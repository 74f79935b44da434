//! Moss pipeline - file table, state hashing, and indexing
//!
//! This crate owns everything between raw file contents and the trees the
//! type checker consumes:
//! - `File` / `FileId` and the [`GlobalState`] snapshot (the file table)
//! - [`FileHash`] definition fingerprints with the parallel state hasher
//! - The [`Indexer`] seam (parse + desugar, parser external) and parallel
//!   batch indexing
//! - The [`EpochTracker`] slow-path epoch registry used for cancelation
//!
//! Parsing itself lives outside this repository; everything here works
//! against the [`Indexer`] trait.

mod file;
mod hash;
mod index;
mod state;

pub use file::{decide_strict_level, File, FileId, StrictLevel};
pub use hash::{
    compute_file_hash, compute_state_hashes, DefinitionsHash, FileHash, UsageHash,
    HASH_STATE_INVALID, HASH_STATE_NOT_COMPUTED,
};
pub use index::{index_batch, index_source, IndexedSource, Indexer, ParsedFile};
pub use state::{EpochTracker, GlobalState};
