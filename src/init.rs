//! Configuration initialization for safe-clean
//!
//! Generates a default config file and an empty whitelist under
//! ~/.config/safe-clean/

use crate::config::{config_dir, Config};
use std::fs;
use std::path::{Path, PathBuf};

/// Default config template; every key is optional
const CONFIG_TEMPLATE: &str = r#"# safe-clean configuration
# Location: ~/.config/safe-clean/config.toml
#
# Values outside their documented range fall back to the default.

# Log what would be removed without touching the filesystem
dry_run = false

# Wall-clock bound for each deletion, in seconds (1-3600)
delete_timeout_secs = 120

# Artifacts modified within this many hours are never auto-removed (1-8760)
recent_window_hours = 24

# How deep to look below each scan root (1-32)
max_scan_depth = 6

# Paths listed here are never deleted, one absolute path per line
# whitelist_path = "~/.config/safe-clean/whitelist"

# Directory names treated as regenerable artifacts
# artifact_names = ["node_modules", "target", ".venv", "__pycache__"]
"#;

const WHITELIST_TEMPLATE: &str = "# safe-clean whitelist\n\
# One absolute path per line. Anything at or below these paths is never deleted.\n\
# ~/Library/Caches/com.example.keep\n";

/// Files written by a single init run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InitReport {
    pub created: Vec<PathBuf>,
    pub existing: Vec<PathBuf>,
}

/// Run the init subcommand; `config_override` replaces the default config path
pub fn run_init(config_override: Option<PathBuf>) -> Result<InitReport, String> {
    let config_path = config_override
        .or_else(Config::config_path)
        .ok_or_else(|| "Cannot determine config directory".to_string())?;
    let whitelist_path = config_dir()
        .map(|d| d.join("whitelist"))
        .ok_or_else(|| "Cannot determine config directory".to_string())?;
    init_at(&config_path, &whitelist_path)
}

/// Write both templates, leaving existing files untouched
pub fn init_at(config_path: &Path, whitelist_path: &Path) -> Result<InitReport, String> {
    let mut report = InitReport::default();
    for (path, template) in [
        (config_path, CONFIG_TEMPLATE),
        (whitelist_path, WHITELIST_TEMPLATE),
    ] {
        if path.exists() {
            report.existing.push(path.to_path_buf());
            continue;
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Cannot create directory {}: {}", dir.display(), e))?;
        }
        fs::write(path, template)
            .map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;
        report.created.push(path.to_path_buf());
    }
    Ok(report)
}
