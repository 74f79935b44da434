//! Moss IR - AST model and traversal
//!
//! This crate contains the syntactic core of the Moss type checker:
//! - `Loc` byte-offset source locations
//! - `Name` interned identifiers and the `NameTable` interner
//! - The `Expression` tree with exclusive child ownership
//! - `treemap`, the transforming pre/post tree walker
//! - `build`, construction helpers for synthesized and test trees
//!
//! # Design Philosophy
//!
//! - **Own the spine, share the leaves**: every child node is exclusively
//!   owned by its parent (`Box` / `Vec`), so a subtree can be detached and
//!   re-attached elsewhere by moving it. Identifiers and source text are
//!   interned or `Arc`-shared, so a deep copy clones spines only.
//! - **No back-pointers**: passes that need parent context carry it on
//!   their own scope stacks, never on the nodes.

mod interner;
mod loc;
mod name;

pub mod ast;
pub mod build;
pub mod treemap;

pub use ast::{
    ClassDef, ClassKind, Expression, IdentScope, InsSeq, Literal, LiteralValue, Local, MethodDef,
    MethodFlags, Send, UnresolvedIdent,
};
pub use interner::{InternError, NameTable, SharedNameTable};
pub use loc::Loc;
pub use name::{names, Name};
