//! Canonicalization passes for the Moss type checker.
//!
//! Passes in this crate are purely syntactic rewrites: they run after
//! parsing and before name resolution, and they neither resolve scopes nor
//! enforce visibility.
//!
//! # Pipeline Position
//!
//! ```text
//! Source → Parse → **Canonicalize (flatten)** → Resolve → Infer
//! ```

mod flatten;

pub use flatten::flatten;
