//! String interner for identifier storage.
//!
//! Thread-safe: a single `RwLock`-guarded table, shared across threads via
//! [`SharedNameTable`]. Lookup of an already-interned string takes the read
//! lock only.

use crate::name::{names, Name};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Error when interning a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternError {
    /// Table exceeded `u32::MAX` distinct strings.
    TableOverflow { count: usize },
}

impl std::fmt::Display for InternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InternError::TableOverflow { count } => {
                write!(f, "name table exceeded capacity: {} strings", count)
            }
        }
    }
}

impl std::error::Error for InternError {}

struct TableInner {
    map: FxHashMap<Arc<str>, Name>,
    strings: Vec<Arc<str>>,
}

/// Interner mapping strings to compact [`Name`] indices.
///
/// Well-known names ([`names`]) are pre-interned at construction so their
/// indices are stable.
pub struct NameTable {
    inner: RwLock<TableInner>,
}

impl NameTable {
    pub fn new() -> Self {
        let mut inner = TableInner {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(256),
        };
        for s in names::PRE_INTERNED {
            let idx = inner.strings.len() as u32;
            let s: Arc<str> = Arc::from(s);
            inner.map.insert(s.clone(), Name::from_raw(idx));
            inner.strings.push(s);
        }
        NameTable {
            inner: RwLock::new(inner),
        }
    }

    /// Try to intern a string, returning its [`Name`] or an error on overflow.
    pub fn try_intern(&self, s: &str) -> Result<Name, InternError> {
        if let Some(&name) = self.inner.read().map.get(s) {
            return Ok(name);
        }
        let mut inner = self.inner.write();
        // Re-check: another thread may have interned between the locks.
        if let Some(&name) = inner.map.get(s) {
            return Ok(name);
        }
        let count = inner.strings.len();
        if count > u32::MAX as usize {
            return Err(InternError::TableOverflow { count });
        }
        let name = Name::from_raw(count as u32);
        let s: Arc<str> = Arc::from(s);
        inner.map.insert(s.clone(), name);
        inner.strings.push(s);
        Ok(name)
    }

    /// Intern a string.
    ///
    /// # Panics
    /// Panics on table overflow. Use `try_intern` for fallible interning.
    pub fn intern(&self, s: &str) -> Name {
        self.try_intern(s).unwrap_or_else(|e| panic!("{}", e))
    }

    /// Look up a string without interning it.
    pub fn lookup(&self, s: &str) -> Option<Name> {
        self.inner.read().map.get(s).copied()
    }

    /// Resolve a name back to its string.
    ///
    /// # Panics
    /// Panics if `name` was not produced by this table.
    pub fn resolve(&self, name: Name) -> Arc<str> {
        self.inner.read().strings[name.idx()].clone()
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A `NameTable` behind an `Arc`, cloneable across threads.
#[derive(Clone, Default)]
pub struct SharedNameTable(Arc<NameTable>);

impl SharedNameTable {
    pub fn new() -> Self {
        SharedNameTable(Arc::new(NameTable::new()))
    }
}

impl std::ops::Deref for SharedNameTable {
    type Target = NameTable;

    fn deref(&self) -> &NameTable {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let table = NameTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        assert_eq!(a, b);
        assert_eq!(&*table.resolve(a), "foo");
    }

    #[test]
    fn well_known_names_have_fixed_indices() {
        let table = NameTable::new();
        assert_eq!(table.intern("private"), names::PRIVATE);
        assert_eq!(table.intern("protected"), names::PROTECTED);
        assert_eq!(table.intern("public"), names::PUBLIC);
        assert_eq!(
            table.intern("private_class_method"),
            names::PRIVATE_CLASS_METHOD
        );
        assert_eq!(table.intern("sig"), names::SIG);
        assert_eq!(table.intern("<singleton>"), names::SINGLETON);
        assert_eq!(table.intern(""), names::EMPTY);
    }

    #[test]
    fn shared_table_interns_across_clones() {
        let shared = SharedNameTable::new();
        let other = shared.clone();
        let a = shared.intern("widget");
        assert_eq!(other.lookup("widget"), Some(a));
    }
}
