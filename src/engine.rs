//! Guarded deletion
//!
//! [`DeletionEngine`] is the only component that removes filesystem entries.
//! Every operation validates its target first, runs under the timeout
//! supervisor, and reports refusals, timeouts and I/O failures as structured
//! errors instead of aborting the caller. In-process removal checks its
//! cancel token between entries, so nothing is touched once a timeout has
//! been reported.

use crate::config::Settings;
use crate::error::{DeleteError, Rejection};
use crate::scanner::filter_nested_artifacts;
use crate::supervisor::{Bounded, CancelToken, TimeoutOutcome, TimeoutSupervisor};
use crate::validator::PathValidator;
use glob::Pattern;
use std::ffi::OsStr;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Entry type filter for pattern deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryType {
    File,
    Dir,
    /// Files, directories and symbolic links
    #[default]
    Any,
}

impl EntryType {
    fn matches(self, file_type: fs::FileType) -> bool {
        match self {
            Self::File => file_type.is_file(),
            Self::Dir => file_type.is_dir(),
            Self::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Privilege {
    #[default]
    User,
    /// The caller already holds administrative rights
    Elevated,
}

/// Name glob, minimum age and entry type for a pattern delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindSpec {
    pub pattern: String,
    /// 0 means any age
    pub min_age_days: u32,
    pub entry_type: EntryType,
}

impl FindSpec {
    pub fn new(pattern: impl Into<String>, min_age_days: u32, entry_type: EntryType) -> Self {
        Self {
            pattern: pattern.into(),
            min_age_days,
            entry_type,
        }
    }

    fn compile(&self) -> Result<Pattern, Rejection> {
        if self.pattern.is_empty() {
            return Err(Rejection::InvalidPattern {
                pattern: self.pattern.clone(),
                reason: "empty pattern".into(),
            });
        }
        if self.pattern.contains('/') {
            return Err(Rejection::InvalidPattern {
                pattern: self.pattern.clone(),
                reason: "pattern matches names, not paths".into(),
            });
        }
        Pattern::new(&self.pattern).map_err(|e| Rejection::InvalidPattern {
            pattern: self.pattern.clone(),
            reason: e.to_string(),
        })
    }

    /// Entries modified at or after this instant are too young
    fn cutoff(&self) -> Option<SystemTime> {
        if self.min_age_days == 0 {
            return None;
        }
        let age = Duration::from_secs(u64::from(self.min_age_days) * SECS_PER_DAY);
        SystemTime::now().checked_sub(age)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    PlainRemove,
    FindDelete(FindSpec),
}

/// A single request from a recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionRequest {
    pub target: PathBuf,
    pub mode: Mode,
    pub privilege: Privilege,
}

/// Outcome of a single-entry removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// Removed, or would have been in dry-run mode
    Removed,
    /// Nothing there; not an error
    Missing,
}

/// Per-match tallies of a pattern delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub removed: usize,
    pub failed: usize,
    pub refused: usize,
}

impl BatchReport {
    pub fn attempted(&self) -> usize {
        self.removed + self.failed + self.refused
    }
}

#[derive(Debug, Clone)]
pub struct DeletionEngine {
    validator: PathValidator,
    supervisor: TimeoutSupervisor,
    timeout: Duration,
    dry_run: bool,
}

impl DeletionEngine {
    pub fn new(validator: PathValidator, supervisor: TimeoutSupervisor, settings: &Settings) -> Self {
        Self {
            validator,
            supervisor: supervisor.with_kill_grace(settings.kill_grace),
            timeout: settings.delete_timeout,
            dry_run: settings.dry_run,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    /// Dispatch a request; returns the number of entries removed
    pub fn execute(&self, request: &DeletionRequest) -> Result<usize, DeleteError> {
        let removed = |d: Deletion| usize::from(d == Deletion::Removed);
        match (&request.mode, request.privilege) {
            (Mode::PlainRemove, Privilege::User) => self.remove(&request.target).map(removed),
            (Mode::PlainRemove, Privilege::Elevated) => {
                self.elevated_remove(&request.target).map(removed)
            }
            (Mode::FindDelete(spec), Privilege::User) => self.find_delete(&request.target, spec),
            (Mode::FindDelete(spec), Privilege::Elevated) => {
                self.elevated_find_delete(&request.target, spec)
            }
        }
    }

    /// Remove a file, symlink or directory tree. A missing path is a no-op.
    pub fn remove(&self, path: &Path) -> Result<Deletion, DeleteError> {
        let path = self.validate(path)?;
        let Some(meta) = lstat(&path)? else {
            return Ok(Deletion::Missing);
        };

        if self.dry_run {
            info!(path = %path.display(), "would remove");
            return Ok(Deletion::Removed);
        }

        let target = path.clone();
        match self
            .supervisor
            .run_bounded(self.timeout, move |cancel| remove_entry(&target, &meta, cancel))
        {
            Bounded::Finished(Ok(())) => {
                info!(path = %path.display(), "removed");
                Ok(Deletion::Removed)
            }
            Bounded::Finished(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                Ok(Deletion::Missing)
            }
            Bounded::Finished(Err(e)) => Err(DeleteError::io(path, e)),
            Bounded::TimedOut => Err(self.timed_out(path)),
            Bounded::SupervisorError(msg) => Err(DeleteError::Supervisor(msg)),
        }
    }

    /// Remove every entry under `root` matching `spec`; returns the count removed
    pub fn find_delete(&self, root: &Path, spec: &FindSpec) -> Result<usize, DeleteError> {
        self.find_delete_report(root, spec).map(|r| r.removed)
    }

    pub fn find_delete_report(&self, root: &Path, spec: &FindSpec) -> Result<BatchReport, DeleteError> {
        let root = self.validate(root)?;
        let pattern = spec.compile()?;
        if lstat(&root)?.is_none() {
            return Ok(BatchReport::default());
        }

        let validator = self.validator.clone();
        let dry_run = self.dry_run;
        let match_spec = spec.clone();
        let walk_root = root.clone();
        let bounded = self.supervisor.run_bounded(self.timeout, move |cancel| {
            let matches = collect_matches(&walk_root, &pattern, &match_spec, cancel);
            let mut report = BatchReport::default();
            for path in matches {
                if cancel.is_cancelled() {
                    break;
                }
                if let Err(rejection) = validator.validate(&path) {
                    warn!(path = %path.display(), reason = %rejection, "skipping match");
                    report.refused += 1;
                    continue;
                }
                if dry_run {
                    info!(
                        path = %path.display(),
                        pattern = %match_spec.pattern,
                        min_age_days = match_spec.min_age_days,
                        "would remove"
                    );
                    report.removed += 1;
                    continue;
                }
                let removal =
                    fs::symlink_metadata(&path).and_then(|meta| remove_entry(&path, &meta, cancel));
                match removal {
                    Ok(()) => {
                        debug!(path = %path.display(), "removed");
                        report.removed += 1;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => break,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "cannot remove match");
                        report.failed += 1;
                    }
                }
            }
            report
        });

        match bounded {
            Bounded::Finished(report) => {
                self.log_batch(&root, spec, &report);
                Ok(report)
            }
            Bounded::TimedOut => Err(self.timed_out(root)),
            Bounded::SupervisorError(msg) => Err(DeleteError::Supervisor(msg)),
        }
    }

    /// Privileged removal. Refuses symbolic links; directories are removed
    /// recursively only after that check.
    pub fn elevated_remove(&self, path: &Path) -> Result<Deletion, DeleteError> {
        let path = self.validate(path)?;
        let Some(meta) = lstat(&path)? else {
            return Ok(Deletion::Missing);
        };
        if meta.file_type().is_symlink() {
            warn!(path = %path.display(), "refusing elevated removal of symbolic link");
            return Err(DeleteError::SymlinkRefused(path));
        }

        if self.dry_run {
            info!(path = %path.display(), elevated = true, "would remove");
            return Ok(Deletion::Removed);
        }

        self.supervised_rm(&path)?;
        info!(path = %path.display(), elevated = true, "removed");
        Ok(Deletion::Removed)
    }

    /// Privileged pattern delete; the symlink failsafe applies to each match
    pub fn elevated_find_delete(&self, root: &Path, spec: &FindSpec) -> Result<usize, DeleteError> {
        self.elevated_find_delete_report(root, spec).map(|r| r.removed)
    }

    pub fn elevated_find_delete_report(
        &self,
        root: &Path,
        spec: &FindSpec,
    ) -> Result<BatchReport, DeleteError> {
        let root = self.validate(root)?;
        let pattern = spec.compile()?;
        if lstat(&root)?.is_none() {
            return Ok(BatchReport::default());
        }

        let walk_root = root.clone();
        let walk_spec = spec.clone();
        let matches = match self.supervisor.run_bounded(self.timeout, move |cancel| {
            collect_matches(&walk_root, &pattern, &walk_spec, cancel)
        }) {
            Bounded::Finished(matches) => matches,
            Bounded::TimedOut => return Err(self.timed_out(root)),
            Bounded::SupervisorError(msg) => return Err(DeleteError::Supervisor(msg)),
        };

        let mut report = BatchReport::default();
        for path in matches {
            match self.elevated_remove_match(&path, spec) {
                Ok(Deletion::Removed) => report.removed += 1,
                Ok(Deletion::Missing) => {}
                Err(e) if e.is_refusal() => {
                    warn!(path = %path.display(), reason = %e, "skipping match");
                    report.refused += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot remove match");
                    report.failed += 1;
                }
            }
        }

        self.log_batch(&root, spec, &report);
        Ok(report)
    }

    fn elevated_remove_match(&self, path: &Path, spec: &FindSpec) -> Result<Deletion, DeleteError> {
        let path = self.validator.validate(path)?;
        let Some(meta) = lstat(&path)? else {
            return Ok(Deletion::Missing);
        };
        if meta.file_type().is_symlink() {
            return Err(DeleteError::SymlinkRefused(path));
        }
        if self.dry_run {
            info!(
                path = %path.display(),
                pattern = %spec.pattern,
                min_age_days = spec.min_age_days,
                elevated = true,
                "would remove"
            );
            return Ok(Deletion::Removed);
        }
        self.supervised_rm(&path)?;
        Ok(Deletion::Removed)
    }

    fn supervised_rm(&self, path: &Path) -> Result<(), DeleteError> {
        let args = [OsStr::new("-rf"), OsStr::new("--"), path.as_os_str()];
        match self.supervisor.run_with_timeout(self.timeout, "rm", &args) {
            TimeoutOutcome::Completed(0) => Ok(()),
            TimeoutOutcome::Completed(code) => Err(DeleteError::CommandFailed {
                path: path.to_path_buf(),
                code,
            }),
            TimeoutOutcome::TimedOut => Err(self.timed_out(path.to_path_buf())),
            TimeoutOutcome::SupervisorError(msg) => Err(DeleteError::Supervisor(msg)),
        }
    }

    fn validate(&self, path: &Path) -> Result<PathBuf, DeleteError> {
        self.validator.validate(path).map_err(|rejection| {
            warn!(path = %path.display(), reason = %rejection, "refused");
            DeleteError::Rejected(rejection)
        })
    }

    fn timed_out(&self, path: PathBuf) -> DeleteError {
        warn!(path = %path.display(), timeout_secs = self.timeout.as_secs(), "deletion timed out");
        DeleteError::TimedOut {
            path,
            timeout: self.timeout,
        }
    }

    fn log_batch(&self, root: &Path, spec: &FindSpec, report: &BatchReport) {
        info!(
            root = %root.display(),
            pattern = %spec.pattern,
            min_age_days = spec.min_age_days,
            removed = report.removed,
            failed = report.failed,
            refused = report.refused,
            dry_run = self.dry_run,
            "pattern delete finished"
        );
    }
}

/// `symlink_metadata` with NotFound mapped to `None`
fn lstat(path: &Path) -> Result<Option<Metadata>, DeleteError> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DeleteError::io(path, e)),
    }
}

/// Directories go recursively, children first; files and symlinks are
/// unlinked. Stops with `Interrupted` once `cancel` fires.
fn remove_entry(path: &Path, meta: &Metadata, cancel: &CancelToken) -> io::Result<()> {
    if !meta.is_dir() {
        return fs::remove_file(path);
    }
    let walker = WalkDir::new(path)
        .contents_first(true)
        .follow_links(false)
        .follow_root_links(false);
    for entry in walker {
        if cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "removal cancelled"));
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().is_some_and(|err| err.kind() == io::ErrorKind::NotFound) => {
                continue
            }
            Err(e) => return Err(e.into()),
        };
        let removed = if entry.file_type().is_dir() {
            fs::remove_dir(entry.path())
        } else {
            fs::remove_file(entry.path())
        };
        match removed {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
    }
    Ok(())
}

/// Entries strictly below `root` matching name, type and age, without
/// descendants of other matches.
fn collect_matches(
    root: &Path,
    pattern: &Pattern,
    spec: &FindSpec,
    cancel: &CancelToken,
) -> Vec<PathBuf> {
    let cutoff = spec.cutoff();
    let matches = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .follow_root_links(false)
        .into_iter()
        .take_while(|_| !cancel.is_cancelled())
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| spec.entry_type.matches(entry.file_type()))
        .filter(|entry| pattern.matches(&entry.file_name().to_string_lossy()))
        .filter(|entry| match cutoff {
            None => true,
            Some(cutoff) => entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .is_some_and(|modified| modified < cutoff),
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    filter_nested_artifacts(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protection::ProtectionRule;
    use crate::size::size_kb;
    use crate::whitelist::Whitelist;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn engine_with(whitelist: Whitelist) -> DeletionEngine {
        let validator = PathValidator::new(Arc::new(ProtectionRule::system()), Arc::new(whitelist));
        DeletionEngine::new(validator, TimeoutSupervisor::fallback(), &Settings::default())
            .with_timeout(Duration::from_secs(10))
    }

    fn engine() -> DeletionEngine {
        engine_with(Whitelist::empty())
    }

    fn set_age_days(path: &Path, days: u64) {
        let when = SystemTime::now() - Duration::from_secs(days * SECS_PER_DAY);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(when).unwrap();
    }

    fn tree(root: &Path) {
        fs::create_dir_all(root.join("logs/nested")).unwrap();
        fs::write(root.join("logs/a.log"), "a").unwrap();
        fs::write(root.join("logs/b.txt"), "b").unwrap();
        fs::write(root.join("logs/nested/c.log"), "c").unwrap();
    }

    #[test]
    fn test_remove_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("cache.bin");
        fs::write(&file, "x").unwrap();
        assert_eq!(engine().remove(&file).unwrap(), Deletion::Removed);
        assert!(!file.exists());
    }

    #[test]
    fn test_remove_directory_tree() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Caches");
        tree(&dir);
        assert_eq!(engine().remove(&dir).unwrap(), Deletion::Removed);
        assert!(!dir.exists());
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            engine().remove(&tmp.path().join("gone")).unwrap(),
            Deletion::Missing
        );
    }

    #[test]
    fn test_remove_symlink_keeps_target() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("real");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), "k").unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert_eq!(engine().remove(&link).unwrap(), Deletion::Removed);
        assert!(fs::symlink_metadata(&link).is_err());
        assert!(target.join("keep").exists());
    }

    #[test]
    fn test_empty_and_relative_rejected_before_touching_fs() {
        let e = engine();
        for p in ["", "relative/cache", "."] {
            let err = e.remove(Path::new(p)).unwrap_err();
            assert!(err.is_refusal(), "{p:?}: {err}");
            let err = e.elevated_remove(Path::new(p)).unwrap_err();
            assert!(err.is_refusal(), "{p:?}: {err}");
            let spec = FindSpec::new("*", 0, EntryType::Any);
            assert!(e.find_delete(Path::new(p), &spec).unwrap_err().is_refusal());
            assert!(e.elevated_find_delete(Path::new(p), &spec).unwrap_err().is_refusal());
        }
    }

    #[test]
    fn test_protected_rejected_even_elevated() {
        let e = engine();
        for p in ["/", "/usr/bin", "/etc", "/System/Library"] {
            assert!(matches!(
                e.elevated_remove(Path::new(p)),
                Err(DeleteError::Rejected(Rejection::Protected { .. }))
            ));
        }
    }

    #[test]
    fn test_whitelist_wins() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("keep.db");
        fs::write(&file, "x").unwrap();
        let e = engine_with(Whitelist::from_entries([tmp.path()]));
        assert!(matches!(
            e.remove(&file),
            Err(DeleteError::Rejected(Rejection::Whitelisted { .. }))
        ));
        assert!(file.exists());
    }

    #[test]
    fn test_elevated_remove_refuses_symlink() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("real");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("data"), "d").unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let err = engine().elevated_remove(&link).unwrap_err();
        assert!(matches!(err, DeleteError::SymlinkRefused(_)));
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(target.join("data").exists());
    }

    #[test]
    fn test_elevated_remove_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("SystemCache");
        tree(&dir);
        assert_eq!(engine().elevated_remove(&dir).unwrap(), Deletion::Removed);
        assert!(!dir.exists());
    }

    #[test]
    fn test_find_delete_by_pattern() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        let spec = FindSpec::new("*.log", 0, EntryType::File);
        assert_eq!(engine().find_delete(tmp.path(), &spec).unwrap(), 2);
        assert!(!tmp.path().join("logs/a.log").exists());
        assert!(!tmp.path().join("logs/nested/c.log").exists());
        assert!(tmp.path().join("logs/b.txt").exists());
    }

    #[test]
    fn test_find_delete_respects_min_age() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        set_age_days(&tmp.path().join("logs/a.log"), 10);

        let spec = FindSpec::new("*.log", 7, EntryType::File);
        assert_eq!(engine().find_delete(tmp.path(), &spec).unwrap(), 1);
        assert!(!tmp.path().join("logs/a.log").exists());
        assert!(tmp.path().join("logs/nested/c.log").exists());
    }

    #[test]
    fn test_find_delete_dirs_only_removes_topmost() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a/cache/b/cache")).unwrap();
        fs::write(tmp.path().join("a/cache.txt"), "f").unwrap();

        let spec = FindSpec::new("cache*", 0, EntryType::Dir);
        let report = engine().find_delete_report(tmp.path(), &spec).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed, 0);
        assert!(!tmp.path().join("a/cache").exists());
        assert!(tmp.path().join("a/cache.txt").exists());
    }

    #[test]
    fn test_find_delete_skips_whitelisted_matches() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        let e = engine_with(Whitelist::from_entries([tmp.path().join("logs/nested")]));
        let report = e
            .find_delete_report(tmp.path(), &FindSpec::new("*.log", 0, EntryType::File))
            .unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.refused, 1);
        assert!(tmp.path().join("logs/nested/c.log").exists());
    }

    #[test]
    fn test_find_delete_missing_root_is_zero() {
        let tmp = TempDir::new().unwrap();
        let spec = FindSpec::new("*", 0, EntryType::Any);
        assert_eq!(engine().find_delete(&tmp.path().join("none"), &spec).unwrap(), 0);
    }

    #[test]
    fn test_find_delete_never_matches_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("logs");
        fs::create_dir(&root).unwrap();
        let spec = FindSpec::new("logs", 0, EntryType::Any);
        assert_eq!(engine().find_delete(&root, &spec).unwrap(), 0);
        assert!(root.exists());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let tmp = TempDir::new().unwrap();
        for pattern in ["", "a/*.log", "[unclosed"] {
            let err = engine()
                .find_delete(tmp.path(), &FindSpec::new(pattern, 0, EntryType::Any))
                .unwrap_err();
            assert!(
                matches!(err, DeleteError::Rejected(Rejection::InvalidPattern { .. })),
                "{pattern:?}"
            );
        }
    }

    #[test]
    fn test_elevated_find_delete_refuses_symlink_matches() {
        let tmp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("precious.log"), "p").unwrap();
        tree(tmp.path());
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("logs/evil.log")).unwrap();

        let report = engine()
            .elevated_find_delete_report(tmp.path(), &FindSpec::new("*.log", 0, EntryType::Any))
            .unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.refused, 1);
        assert!(outside.path().join("precious.log").exists());
        assert!(fs::symlink_metadata(tmp.path().join("logs/evil.log")).is_ok());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        fs::write(tmp.path().join("logs/big.log"), vec![1u8; 64 * 1024]).unwrap();
        let before = size_kb(tmp.path());

        let e = engine().with_dry_run(true);
        let spec = FindSpec::new("*.log", 0, EntryType::Any);
        assert_eq!(e.remove(&tmp.path().join("logs")).unwrap(), Deletion::Removed);
        assert_eq!(e.elevated_remove(&tmp.path().join("logs")).unwrap(), Deletion::Removed);
        assert_eq!(e.find_delete(tmp.path(), &spec).unwrap(), 3);
        assert_eq!(e.elevated_find_delete(tmp.path(), &spec).unwrap(), 3);
        assert_eq!(
            e.remove(&tmp.path().join("missing")).unwrap(),
            Deletion::Missing
        );

        assert_eq!(size_kb(tmp.path()), before);
        assert!(tmp.path().join("logs/big.log").exists());
    }

    #[test]
    fn test_execute_dispatches_by_mode_and_privilege() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        let e = engine();

        let find = DeletionRequest {
            target: tmp.path().to_path_buf(),
            mode: Mode::FindDelete(FindSpec::new("*.txt", 0, EntryType::File)),
            privilege: Privilege::Elevated,
        };
        assert_eq!(e.execute(&find).unwrap(), 1);

        let plain = DeletionRequest {
            target: tmp.path().join("logs"),
            mode: Mode::PlainRemove,
            privilege: Privilege::User,
        };
        assert_eq!(e.execute(&plain).unwrap(), 1);
        assert_eq!(e.execute(&plain).unwrap(), 0);
    }

    fn linked_keep(tmp: &Path) -> (PathBuf, PathBuf) {
        let keep = tmp.join("keep");
        fs::create_dir(&keep).unwrap();
        fs::write(keep.join("precious.db"), "p").unwrap();
        let link = tmp.join("link");
        std::os::unix::fs::symlink(&keep, &link).unwrap();
        (keep, link)
    }

    #[test]
    fn test_whitelist_holds_through_symlinked_parent() {
        let tmp = TempDir::new().unwrap();
        let (keep, link) = linked_keep(tmp.path());
        let e = engine_with(Whitelist::from_entries([keep.clone()]));

        for result in [
            e.remove(&link.join("precious.db")),
            e.elevated_remove(&link.join("precious.db")),
        ] {
            assert!(
                matches!(result, Err(DeleteError::Rejected(Rejection::Whitelisted { .. }))),
                "got {result:?}"
            );
        }
        assert!(keep.join("precious.db").exists());
    }

    #[test]
    fn test_find_delete_through_symlinked_root_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let (keep, link) = linked_keep(tmp.path());
        let e = engine_with(Whitelist::from_entries([keep.clone()]));
        let spec = FindSpec::new("*.db", 0, EntryType::Any);

        assert_eq!(e.find_delete(&link, &spec).unwrap(), 0);
        assert_eq!(e.elevated_find_delete(&link, &spec).unwrap(), 0);
        assert!(keep.join("precious.db").exists());
    }

    #[test]
    fn test_protected_tree_unreachable_through_symlinked_parent() {
        let tmp = TempDir::new().unwrap();
        let link = tmp.path().join("etc-link");
        std::os::unix::fs::symlink("/etc", &link).unwrap();

        let e = engine().with_dry_run(true);
        for result in [
            e.remove(&link.join("hosts")),
            e.elevated_remove(&link.join("hosts")),
        ] {
            assert!(
                matches!(result, Err(DeleteError::Rejected(Rejection::Protected { .. }))),
                "got {result:?}"
            );
        }
    }

    #[test]
    fn test_timed_out_find_delete_stops_removing() {
        let tmp = TempDir::new().unwrap();
        let logs = tmp.path().join("logs");
        fs::create_dir(&logs).unwrap();
        for i in 0..5000 {
            fs::write(logs.join(format!("{i}.log")), "x").unwrap();
        }
        let remaining = || fs::read_dir(&logs).unwrap().count();

        let e = engine().with_timeout(Duration::from_millis(1));
        let result = e.find_delete(tmp.path(), &FindSpec::new("*.log", 0, EntryType::File));
        assert!(matches!(result, Err(DeleteError::TimedOut { .. })), "got {result:?}");

        let at_return = remaining();
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(remaining(), at_return);
        assert!(at_return > 0);
    }

    #[test]
    fn test_timed_out_tree_removal_stops_removing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("Caches");
        for i in 0..50 {
            let sub = dir.join(format!("d{i}"));
            fs::create_dir_all(&sub).unwrap();
            for j in 0..100 {
                fs::write(sub.join(format!("{j}.bin")), "x").unwrap();
            }
        }
        let count = || walkdir::WalkDir::new(&dir).into_iter().count();

        let e = engine().with_timeout(Duration::from_millis(1));
        let result = e.remove(&dir);
        assert!(matches!(result, Err(DeleteError::TimedOut { .. })), "got {result:?}");

        let at_return = count();
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(count(), at_return);
        assert!(dir.exists());
    }
}
