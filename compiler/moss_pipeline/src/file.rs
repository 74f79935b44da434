//! Workspace files.

use std::fmt;
use std::sync::Arc;

/// Dense index into the [`GlobalState`](crate::GlobalState) file table.
///
/// Stable for the lifetime of a file: the table never shrinks.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct FileId(u32);

impl FileId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        FileId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

/// How strictly a file opts into type checking, from its `# typed:` sigil.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum StrictLevel {
    /// Skip the file entirely.
    Ignore,
    /// Parse and resolve, report no type errors.
    False,
    /// Full type checking.
    True,
    /// Full type checking plus declaration completeness.
    Strict,
}

/// Read the `# typed:` sigil from the leading comment block.
///
/// Only blank lines and comments may precede the sigil; the first
/// non-comment line ends the search. An unrecognized value counts as
/// `false`.
pub fn decide_strict_level(source: &str) -> StrictLevel {
    for line in source.lines() {
        let line = line.trim_start();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('#') {
            break;
        }
        if let Some(value) = line.strip_prefix("# typed:") {
            return match value.trim() {
                "ignore" => StrictLevel::Ignore,
                "true" => StrictLevel::True,
                "strict" => StrictLevel::Strict,
                _ => StrictLevel::False,
            };
        }
    }
    StrictLevel::False
}

/// An immutable snapshot of one workspace file.
///
/// Edits never mutate a `File`; the committer replaces the whole entry in
/// the file table. Source text is `Arc`-shared so snapshot deep copies and
/// update lists share it by reference.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct File {
    pub path: String,
    pub source: Arc<str>,
    pub strict: StrictLevel,
}

impl File {
    pub fn new(path: impl Into<String>, source: impl Into<Arc<str>>) -> Self {
        let source = source.into();
        let strict = decide_strict_level(&source);
        File {
            path: path.into(),
            source,
            strict,
        }
    }
}
