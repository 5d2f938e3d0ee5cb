//! Configuration for safe-clean
//!
//! Loads user configuration from `~/.config/safe-clean/config.toml`, applies
//! environment overrides once, and produces an immutable [`Settings`] value
//! that is shared by every component for the rest of the run.

use crate::whitelist::{expand_tilde, Whitelist};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_DELETE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_KILL_GRACE_SECS: u64 = 2;
/// Artifacts touched within this window are left alone
pub const DEFAULT_RECENT_WINDOW_HOURS: u64 = 24;
pub const DEFAULT_MAX_SCAN_DEPTH: usize = 6;

pub const DEFAULT_ARTIFACT_NAMES: &[&str] = &[
    "node_modules",
    "target",
    "build",
    "dist",
    ".next",
    ".nuxt",
    ".turbo",
    ".parcel-cache",
    ".svelte-kit",
    ".gradle",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".venv",
    "venv",
    ".tox",
    "Pods",
    "DerivedData",
    ".dart_tool",
    "coverage",
    "vendor",
];

/// Configuration structure
///
/// Example config.toml:
/// ```toml
/// dry_run = false
/// delete_timeout_secs = 120
/// recent_window_hours = 24
/// max_scan_depth = 6
/// whitelist_path = "~/.config/safe-clean/whitelist"
/// artifact_names = ["node_modules", "target", ".venv"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dry_run: bool,
    pub delete_timeout_secs: Option<u64>,
    pub kill_grace_secs: Option<u64>,
    pub recent_window_hours: Option<u64>,
    pub max_scan_depth: Option<usize>,
    pub whitelist_path: Option<String>,
    pub artifact_names: Option<Vec<String>>,
}

/// Validated, immutable runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub dry_run: bool,
    pub delete_timeout: Duration,
    pub kill_grace: Duration,
    pub recent_window: Duration,
    pub max_scan_depth: usize,
    pub whitelist_path: Option<PathBuf>,
    pub artifact_names: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dry_run: false,
            delete_timeout: Duration::from_secs(DEFAULT_DELETE_TIMEOUT_SECS),
            kill_grace: Duration::from_secs(DEFAULT_KILL_GRACE_SECS),
            recent_window: Duration::from_secs(DEFAULT_RECENT_WINDOW_HOURS * 3600),
            max_scan_depth: DEFAULT_MAX_SCAN_DEPTH,
            whitelist_path: default_whitelist_path(),
            artifact_names: DEFAULT_ARTIFACT_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Settings {
    /// Whitelist named by these settings; empty when unset or missing
    pub fn load_whitelist(&self) -> Whitelist {
        match &self.whitelist_path {
            Some(path) => Whitelist::load(path),
            None => Whitelist::empty(),
        }
    }
}

impl Config {
    /// Get the config file path: ~/.config/safe-clean/config.toml
    ///
    /// If SAFE_CLEAN_CONFIG environment variable is set, uses that path instead.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SAFE_CLEAN_CONFIG") {
            return Some(PathBuf::from(path));
        }
        config_dir().map(|d| d.join("config.toml"))
    }

    /// Load configuration from default path
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config parse error, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read config, using defaults");
                Self::default()
            }
        }
    }

    /// Validate into [`Settings`], applying `SAFE_CLEAN_*` overrides from the
    /// process environment.
    pub fn settings(&self) -> Settings {
        self.settings_with_env(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::settings`] with an injectable environment lookup.
    ///
    /// Out-of-range or unparseable values are replaced by the documented
    /// default.
    pub fn settings_with_env(&self, env: impl Fn(&str) -> Option<String>) -> Settings {
        let defaults = Settings::default();

        let dry_run = match env("SAFE_CLEAN_DRY_RUN") {
            Some(raw) => parse_flag("SAFE_CLEAN_DRY_RUN", &raw).unwrap_or(self.dry_run),
            None => self.dry_run,
        };

        let delete_timeout_secs = pick(
            "delete_timeout_secs",
            env("SAFE_CLEAN_DELETE_TIMEOUT"),
            self.delete_timeout_secs,
            DEFAULT_DELETE_TIMEOUT_SECS,
            1..=3600,
        );
        let kill_grace_secs = pick(
            "kill_grace_secs",
            None,
            self.kill_grace_secs,
            DEFAULT_KILL_GRACE_SECS,
            1..=60,
        );
        let recent_window_hours = pick(
            "recent_window_hours",
            env("SAFE_CLEAN_RECENT_HOURS"),
            self.recent_window_hours,
            DEFAULT_RECENT_WINDOW_HOURS,
            1..=24 * 365,
        );
        let max_scan_depth = pick(
            "max_scan_depth",
            env("SAFE_CLEAN_MAX_DEPTH"),
            self.max_scan_depth,
            DEFAULT_MAX_SCAN_DEPTH,
            1..=32,
        );

        let whitelist_path = match &self.whitelist_path {
            Some(raw) => {
                let expanded = expand_tilde(raw);
                if expanded.is_absolute() {
                    Some(expanded)
                } else {
                    warn!(whitelist_path = %raw, "whitelist_path must be absolute, using default");
                    defaults.whitelist_path.clone()
                }
            }
            None => defaults.whitelist_path.clone(),
        };

        let artifact_names = match &self.artifact_names {
            Some(names) => {
                let valid: Vec<String> = names
                    .iter()
                    .filter(|n| !matches!(n.as_str(), "" | "." | "..") && !n.contains('/'))
                    .cloned()
                    .collect();
                if valid.is_empty() {
                    warn!("artifact_names has no usable entries, using defaults");
                    defaults.artifact_names.clone()
                } else {
                    valid
                }
            }
            None => defaults.artifact_names.clone(),
        };

        Settings {
            dry_run,
            delete_timeout: Duration::from_secs(delete_timeout_secs),
            kill_grace: Duration::from_secs(kill_grace_secs),
            recent_window: Duration::from_secs(recent_window_hours * 3600),
            max_scan_depth,
            whitelist_path,
            artifact_names,
        }
    }
}

/// ~/.config/safe-clean
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|d| d.join(".config").join("safe-clean"))
}

fn default_whitelist_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("whitelist"))
}

/// Environment wins over the file; anything out of range falls back to the default
fn pick<T>(
    key: &str,
    env_raw: Option<String>,
    file: Option<T>,
    default: T,
    range: std::ops::RangeInclusive<T>,
) -> T
where
    T: std::str::FromStr + PartialOrd + Copy + std::fmt::Display,
{
    if let Some(raw) = env_raw {
        return match raw.trim().parse::<T>() {
            Ok(v) if range.contains(&v) => v,
            _ => {
                warn!(key, value = %raw, fallback = %default, "invalid override, using default");
                default
            }
        };
    }
    match file {
        Some(v) if range.contains(&v) => v,
        Some(v) => {
            warn!(key, value = %v, fallback = %default, "out of range, using default");
            default
        }
        None => default,
    }
}

fn parse_flag(key: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => {
            warn!(key, value = raw, "unrecognized flag value, ignoring");
            None
        }
    }
}
