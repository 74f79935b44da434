//! Server configuration.

use std::path::PathBuf;

/// Active configuration for one language-server instance.
///
/// Constructed once by the embedder and shared read-only afterwards.
pub struct LspConfig {
    /// Workspace root used for uri <-> path mapping.
    pub root_path: String,
    /// Files indexed when the client sends `initialized`.
    pub input_paths: Vec<PathBuf>,
    /// Worker threads for state hashing and batch indexing.
    pub workers: usize,
    /// Force every edit onto the slow path (debugging aid).
    pub disable_fast_path: bool,
    pub document_symbol_enabled: bool,
    pub document_highlight_enabled: bool,
    pub quick_fix_enabled: bool,
    pub signature_help_enabled: bool,
}

impl Default for LspConfig {
    fn default() -> Self {
        LspConfig {
            root_path: String::new(),
            input_paths: Vec::new(),
            workers: std::thread::available_parallelism().map_or(2, |n| n.get()),
            disable_fast_path: false,
            document_symbol_enabled: true,
            document_highlight_enabled: true,
            quick_fix_enabled: true,
            signature_help_enabled: true,
        }
    }
}

impl LspConfig {
    /// Map a `file://` uri onto a workspace-relative path.
    ///
    /// Returns `None` for non-file uris or files outside the root.
    pub fn path_from_uri<'a>(&self, uri: &'a str) -> Option<&'a str> {
        let path = uri.strip_prefix("file://")?;
        if self.root_path.is_empty() {
            return Some(path.trim_start_matches('/'));
        }
        let rest = path.strip_prefix(self.root_path.as_str())?;
        rest.strip_prefix('/').or(if rest.is_empty() {
            Some("")
        } else {
            // Shares a string prefix with the root but is not inside it.
            None
        })
    }

    /// Map a workspace-relative path onto a `file://` uri.
    pub fn uri_for_path(&self, path: &str) -> String {
        if self.root_path.is_empty() {
            format!("file:///{path}")
        } else {
            format!("file://{}/{path}", self.root_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_round_trip() {
        let config = LspConfig {
            root_path: "/work/project".to_string(),
            ..LspConfig::default()
        };
        let uri = config.uri_for_path("lib/a.ms");
        assert_eq!(uri, "file:///work/project/lib/a.ms");
        assert_eq!(config.path_from_uri(&uri), Some("lib/a.ms"));
        assert_eq!(config.path_from_uri("untitled:foo"), None);
        assert_eq!(config.path_from_uri("file:///elsewhere/a.ms"), None);
    }

    #[test]
    fn uri_round_trip_without_root() {
        let config = LspConfig::default();
        let uri = config.uri_for_path("a.ms");
        assert_eq!(config.path_from_uri(&uri), Some("a.ms"));
    }
}
