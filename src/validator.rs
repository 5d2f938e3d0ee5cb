//! Path validation for safe-clean
//!
//! Every path that reaches a filesystem mutation goes through
//! [`PathValidator::validate`] first. Checks run in a fixed order and stop at
//! the first failure. Protection and whitelist checks see both the spelling
//! the caller gave and the location it reaches once symlinked parent
//! directories are resolved.

use crate::error::Rejection;
use crate::protection::ProtectionRule;
use crate::whitelist::Whitelist;
use path_clean::PathClean;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// パス検証器
#[derive(Debug, Clone)]
pub struct PathValidator {
    protection: Arc<ProtectionRule>,
    whitelist: Arc<Whitelist>,
}

impl PathValidator {
    pub fn new(protection: Arc<ProtectionRule>, whitelist: Arc<Whitelist>) -> Self {
        Self {
            protection,
            whitelist,
        }
    }

    /// All five checks: empty, control characters, absolute, protection,
    /// whitelist.
    ///
    /// # Returns
    /// * `Ok(PathBuf)` - the validated path
    /// * `Err(Rejection)` - the first failed check
    pub fn validate(&self, path: &Path) -> Result<PathBuf, Rejection> {
        let path = self.validate_relaxed(path, true)?;
        self.check_whitelist(&path)?;

        if let Some(resolved) = resolve_parents(&path.clean()) {
            if resolved != path.clean() {
                self.check_protection(&resolved)?;
                self.check_whitelist(&resolved)?;
            }
        }
        Ok(path)
    }

    /// Checks 1-4. `require_absolute = false` skips only the absolute check
    /// (and the protection check, which is meaningless for relative input).
    pub fn validate_relaxed(
        &self,
        path: &Path,
        require_absolute: bool,
    ) -> Result<PathBuf, Rejection> {
        let raw = path.as_os_str();
        if raw.is_empty() {
            return Err(Rejection::Empty);
        }

        let lossy = raw.to_string_lossy();
        if lossy.chars().any(|c| c.is_ascii_control()) {
            return Err(Rejection::ControlCharacter(lossy.into_owned()));
        }

        if !path.is_absolute() {
            if require_absolute {
                return Err(Rejection::Relative(path.to_path_buf()));
            }
            return Ok(path.to_path_buf());
        }

        if path.components().any(|c| c == Component::ParentDir) {
            return Err(Rejection::Traversal(path.to_path_buf()));
        }

        self.check_protection(path)?;
        Ok(path.to_path_buf())
    }

    /// Protected if either the given spelling or its cleaned form is covered
    pub fn check_protection(&self, path: &Path) -> Result<(), Rejection> {
        let cleaned = path.clean();
        for candidate in [path, cleaned.as_path()] {
            if let Some(entry) = self.protection.matches(candidate) {
                return Err(Rejection::Protected {
                    path: path.to_path_buf(),
                    rule: entry.path.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn check_whitelist(&self, path: &Path) -> Result<(), Rejection> {
        let cleaned = path.clean();
        match self.whitelist.matches(&cleaned) {
            Some(entry) => Err(Rejection::Whitelisted {
                path: path.to_path_buf(),
                entry: entry.to_path_buf(),
            }),
            None => Ok(()),
        }
    }

    pub fn protection(&self) -> &ProtectionRule {
        &self.protection
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }
}

/// `path` with every symbolic link above its final component resolved.
///
/// The final component is kept as given, so a link being deleted is never
/// followed. Missing trailing directories are carried over from the input
/// onto the nearest ancestor that exists.
pub fn resolve_parents(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let mut existing = path.parent()?;
    let mut missing: Vec<&OsStr> = Vec::new();
    let mut resolved = loop {
        match existing.canonicalize() {
            Ok(real) => break real,
            Err(_) => {
                missing.push(existing.file_name()?);
                existing = existing.parent()?;
            }
        }
    };
    for part in missing.iter().rev() {
        resolved.push(part);
    }
    resolved.push(name);
    Some(resolved)
}
