//! Project artifact discovery
//!
//! A scan runs `enumerate -> depth filter -> nested de-duplication ->
//! recency filter -> protection filter` over one or more scan roots and
//! returns sized candidates. Nothing here deletes; callers hand eligible
//! candidates to the deletion engine.

use crate::config::Settings;
use crate::size::sizes_kb;
use crate::validator::PathValidator;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Never descended into while enumerating
const VCS_INTERNALS: &[&str] = &[".git", ".hg", ".svn", ".jj"];

/// Generic names that only count next to a project manifest
const NEEDS_CONTEXT: &[&str] = &["target", "build", "dist", "vendor", "coverage"];

const PROJECT_MARKERS: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "go.mod",
    "pyproject.toml",
    "setup.py",
    "composer.json",
    "CMakeLists.txt",
    "Gemfile",
    "pubspec.yaml",
];

/// A discovered artifact directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCandidate {
    pub path: PathBuf,
    /// Segments between the scan root and the candidate's parent
    pub depth: usize,
    pub size_kb: u64,
    /// Time since the newest modification inside the candidate
    pub age: Option<Duration>,
    pub recently_modified: bool,
}

/// Result of a scan pass, both lists sorted by path
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Safe to hand to the deletion engine
    pub eligible: Vec<ArtifactCandidate>,
    /// Touched inside the recency window; reported, not removed
    pub recent: Vec<ArtifactCandidate>,
}

impl ScanReport {
    pub fn eligible_kb(&self) -> u64 {
        self.eligible.iter().map(|c| c.size_kb).sum()
    }
}

/// Number of segments between `scan_root` and the candidate's parent, or
/// `None` when the candidate is not strictly below the root.
pub fn artifact_depth(candidate: &Path, scan_root: &Path) -> Option<usize> {
    if !candidate.is_absolute() || !scan_root.is_absolute() {
        return None;
    }
    let has_parent_ref = |p: &Path| p.components().any(|c| c == Component::ParentDir);
    if has_parent_ref(candidate) || has_parent_ref(scan_root) {
        return None;
    }
    let parent = candidate.parent()?;
    let between = parent.strip_prefix(scan_root).ok()?;
    Some(between.components().count())
}

/// Only artifacts nested at least one project directory below the root are
/// eligible: `root/proj/node_modules` is, `root/node_modules` is not.
pub fn is_safe_project_artifact(candidate: &Path, scan_root: &Path) -> bool {
    matches!(artifact_depth(candidate, scan_root), Some(depth) if depth >= 1)
}

/// Keep only topmost candidates. Output is sorted and free of duplicates,
/// so applying it twice gives the same result.
pub fn filter_nested_artifacts(mut candidates: Vec<PathBuf>) -> Vec<PathBuf> {
    // component-wise order puts every directory right before its descendants
    candidates.sort();
    candidates.dedup();

    let mut kept: Vec<PathBuf> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let nested = kept
            .last()
            .is_some_and(|parent| candidate.starts_with(parent));
        if !nested {
            kept.push(candidate);
        }
    }
    kept
}

/// Newest modification time of `path` or anything beneath it
pub fn newest_modification(path: &Path) -> Option<SystemTime> {
    WalkDir::new(path)
        .follow_links(false)
        .follow_root_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|entry| entry.metadata().ok())
        .filter_map(|meta| meta.modified().ok())
        .max()
}

/// True when `path` or anything inside it changed within `window`. A path
/// whose age cannot be read counts as recent.
pub fn is_recently_modified(path: &Path, window: Duration) -> bool {
    within_window(age_of(newest_modification(path)), window)
}

fn age_of(newest: Option<SystemTime>) -> Option<Duration> {
    newest.map(|t| SystemTime::now().duration_since(t).unwrap_or_default())
}

fn within_window(age: Option<Duration>, window: Duration) -> bool {
    age.map_or(true, |age| age < window)
}

pub struct ArtifactScanner {
    validator: PathValidator,
    settings: Arc<Settings>,
}

impl ArtifactScanner {
    pub fn new(validator: PathValidator, settings: Arc<Settings>) -> Self {
        Self {
            validator,
            settings,
        }
    }

    /// Raw artifact directories under `root`, not descending into matches
    pub fn enumerate(&self, root: &Path) -> Vec<PathBuf> {
        if !root.is_absolute() {
            warn!(root = %root.display(), "scan root must be absolute, skipping");
            return Vec::new();
        }

        let mut found = Vec::new();
        let mut walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(self.settings.max_scan_depth)
            .follow_links(false)
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if VCS_INTERNALS.contains(&name.as_str()) {
                walker.skip_current_dir();
                continue;
            }
            if self.is_artifact(entry.path(), &name) {
                found.push(entry.into_path());
                walker.skip_current_dir();
            }
        }
        found
    }

    fn is_artifact(&self, path: &Path, name: &str) -> bool {
        if !self.settings.artifact_names.iter().any(|n| n == name) {
            return false;
        }
        if !NEEDS_CONTEXT.contains(&name) {
            return true;
        }
        path.parent()
            .is_some_and(|parent| PROJECT_MARKERS.iter().any(|m| parent.join(m).is_file()))
    }

    /// Full pipeline over every root.
    ///
    /// Roots may overlap. A candidate's depth is the deepest placement any
    /// root gives it, so an artifact sitting directly at one root is still
    /// eligible when a broader root sees it inside a project directory.
    pub fn scan(&self, roots: &[PathBuf]) -> ScanReport {
        // enumerate + depth filter, remembering each candidate's depth
        let mut depths: HashMap<PathBuf, usize> = HashMap::new();
        for root in roots {
            for candidate in self.enumerate(root) {
                match artifact_depth(&candidate, root) {
                    Some(depth) if depth >= 1 => {
                        depths
                            .entry(candidate)
                            .and_modify(|d| *d = (*d).max(depth))
                            .or_insert(depth);
                    }
                    _ => debug!(path = %candidate.display(), "artifact at scan root, skipping"),
                }
            }
        }

        let topmost = filter_nested_artifacts(depths.keys().cloned().collect());

        let window = self.settings.recent_window;
        let mut staged: Vec<(PathBuf, Option<Duration>, bool)> = Vec::new();
        for path in topmost {
            // one walk yields both the reported age and the recency verdict
            let age = age_of(newest_modification(&path));
            let recent = within_window(age, window);
            if let Err(rejection) = self.validator.validate(&path) {
                debug!(path = %path.display(), reason = %rejection, "dropping protected candidate");
                continue;
            }
            staged.push((path, age, recent));
        }

        let paths: Vec<&Path> = staged.iter().map(|(p, _, _)| p.as_path()).collect();
        let sizes = sizes_kb(&paths);

        let mut report = ScanReport::default();
        for ((path, age, recent), size_kb) in staged.into_iter().zip(sizes) {
            let candidate = ArtifactCandidate {
                depth: depths.get(&path).copied().unwrap_or(1),
                path,
                size_kb,
                age,
                recently_modified: recent,
            };
            if recent {
                report.recent.push(candidate);
            } else {
                report.eligible.push(candidate);
            }
        }
        report
    }
}
