//! Interned identifiers.

use std::fmt;

/// Interned identifier: an index into a [`NameTable`](crate::NameTable).
///
/// Comparison and hashing are O(1) on the raw index. Names are `Copy`, so
/// deep-copying a tree shares them by value.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Get raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Create from raw u32 value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Name(raw)
    }

    #[inline]
    pub const fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

impl Default for Name {
    fn default() -> Self {
        names::EMPTY
    }
}

/// Well-known names, pre-interned by [`NameTable::new`](crate::NameTable::new)
/// at fixed indices.
///
/// The method-visibility modifier set and the signature-annotation name live
/// here so that passes can compare against them without holding an interner.
pub mod names {
    use super::Name;

    pub const EMPTY: Name = Name::from_raw(0);
    pub const PRIVATE: Name = Name::from_raw(1);
    pub const PROTECTED: Name = Name::from_raw(2);
    pub const PUBLIC: Name = Name::from_raw(3);
    pub const PRIVATE_CLASS_METHOD: Name = Name::from_raw(4);
    pub const SIG: Name = Name::from_raw(5);
    /// Name of the synthesized singleton-class wrapper (`class << self`).
    pub const SINGLETON: Name = Name::from_raw(6);
    pub const SELF_: Name = Name::from_raw(7);

    /// Strings backing the constants above, in index order.
    pub(crate) const PRE_INTERNED: [&str; 8] = [
        "",
        "private",
        "protected",
        "public",
        "private_class_method",
        "sig",
        "<singleton>",
        "self",
    ];

    /// True for the four method-visibility modifier names.
    #[inline]
    pub fn is_visibility_modifier(name: Name) -> bool {
        matches!(name, PRIVATE | PROTECTED | PUBLIC | PRIVATE_CLASS_METHOD)
    }
}
