//! Hard-coded protected locations
//!
//! A [`ProtectionRule`] is built once per process and shared read-only by
//! every component that validates paths.

use std::path::{Path, PathBuf};

/// How far a protected entry reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only the path itself
    Exact,
    /// The path and everything beneath it
    Subtree,
    /// Each immediate child of the path, but nothing deeper
    Children,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedEntry {
    pub path: PathBuf,
    pub scope: Scope,
}

/// Locations that can never be a deletion target, regardless of privilege
#[derive(Debug, Clone)]
pub struct ProtectionRule {
    entries: Vec<ProtectedEntry>,
}

/// `/` and the parents of user data are exact: their children hold caches.
const EXACT: &[&str] = &[
    "/",
    "/usr",
    "/usr/local",
    "/var",
    "/private",
    "/private/var",
    "/private/tmp",
    "/tmp",
    "/opt",
    "/Users",
    "/home",
    "/root",
    "/var/root",
    "/Library",
    "/Applications",
    "/Volumes",
];

const SUBTREE: &[&str] = &[
    "/System",
    "/bin",
    "/sbin",
    "/usr/bin",
    "/usr/sbin",
    "/usr/lib",
    "/usr/libexec",
    "/usr/share",
    "/etc",
    "/private/etc",
    "/Library/Extensions",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/lib",
    "/lib64",
];

/// Home directory parents: every account's home is protected, not only ours
const CHILDREN: &[&str] = &["/home", "/Users"];

impl ProtectionRule {
    /// Built-in system locations, every home directory, and the invoking
    /// user's home wherever it lives
    pub fn system() -> Self {
        let entry = |scope: Scope| {
            move |p: &&str| ProtectedEntry {
                path: PathBuf::from(p),
                scope,
            }
        };
        let mut entries: Vec<ProtectedEntry> = EXACT
            .iter()
            .map(entry(Scope::Exact))
            .chain(SUBTREE.iter().map(entry(Scope::Subtree)))
            .chain(CHILDREN.iter().map(entry(Scope::Children)))
            .collect();

        if let Some(home) = dirs::home_dir() {
            if home.is_absolute() && home != Path::new("/") {
                entries.push(ProtectedEntry {
                    path: home,
                    scope: Scope::Exact,
                });
            }
        }

        Self { entries }
    }

    /// Custom rule set (tests and embedders)
    pub fn new(entries: Vec<ProtectedEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ProtectedEntry] {
        &self.entries
    }

    /// Returns the entry that covers `path`, if any
    pub fn matches(&self, path: &Path) -> Option<&ProtectedEntry> {
        self.entries.iter().find(|entry| match entry.scope {
            Scope::Exact => path == entry.path,
            Scope::Subtree => path.starts_with(&entry.path),
            Scope::Children => path.parent() == Some(entry.path.as_path()),
        })
    }
}

impl Default for ProtectionRule {
    fn default() -> Self {
        Self::system()
    }
}
