//! User whitelist: paths that must never be deleted
//!
//! Plain text, one absolute path per line. Blank lines and `#` comments are
//! ignored and a leading `~` expands to the home directory. A missing or
//! unreadable file yields an empty whitelist.

use path_clean::PathClean;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: Vec<PathBuf>,
    /// Canonical form of each entry that exists on disk, index-aligned
    resolved: Vec<Option<PathBuf>>,
}

impl Whitelist {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::with_resolved(
            entries
                .into_iter()
                .map(|p| Into::<PathBuf>::into(p).clean())
                .collect(),
        )
    }

    fn with_resolved(entries: Vec<PathBuf>) -> Self {
        let resolved = entries
            .iter()
            .map(|entry| entry.canonicalize().ok().filter(|real| real != entry))
            .collect();
        Self { entries, resolved }
    }

    /// Load from a file; never fails
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let whitelist = Self::parse(&content);
                debug!(
                    path = %path.display(),
                    entries = whitelist.entries.len(),
                    "loaded whitelist"
                );
                whitelist
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::empty(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read whitelist, using empty");
                Self::empty()
            }
        }
    }

    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let expanded = expand_tilde(line);
                if expanded.is_absolute() {
                    Some(expanded.clean())
                } else {
                    warn!(entry = line, "ignoring non-absolute whitelist entry");
                    None
                }
            })
            .collect();
        Self::with_resolved(entries)
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry that covers `path` (equal or ancestor), either as
    /// written or through the location it resolves to
    pub fn matches(&self, path: &Path) -> Option<&Path> {
        self.entries
            .iter()
            .zip(&self.resolved)
            .find(|(entry, real)| {
                path.starts_with(entry) || real.as_ref().is_some_and(|r| path.starts_with(r))
            })
            .map(|(entry, _)| entry.as_path())
    }
}

/// Expand tilde (~) prefix to the user's home directory
pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}
