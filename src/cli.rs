//! CLI argument parser for safe-clean
//!
//! Provides type-safe argument parsing using clap derive.

use crate::engine::EntryType;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for safe-clean
#[derive(Parser, Debug)]
#[command(
    name = "safe-clean",
    version,
    about = "Guarded deletion of caches, logs and build artifacts",
    long_about = "Validates every target against protected system paths and a user whitelist,\n\
                  bounds each deletion with a timeout, and finds stale project artifacts."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    /// Dry run mode (show what would be deleted without actually deleting)
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Configuration file (default: ~/.config/safe-clean/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate paths without touching them
    Check {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
    /// Remove files or directory trees
    Rm {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
        /// Caller already holds elevated rights; refuses symbolic links
        #[arg(long)]
        elevated: bool,
    },
    /// Remove entries under ROOT matching a name pattern
    FindDelete {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
        /// Name glob, e.g. "*.log"
        #[arg(long, value_name = "GLOB")]
        name: String,
        /// Only entries modified more than DAYS days ago (0 = any age)
        #[arg(long, value_name = "DAYS", default_value_t = 0)]
        older_than: u32,
        #[arg(long = "type", value_enum, default_value_t = TypeArg::Any)]
        entry_type: TypeArg,
        #[arg(long)]
        elevated: bool,
    },
    /// Print on-disk size in kilobytes
    Size {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
    /// Find stale project artifacts under scan roots
    Scan {
        #[arg(required = true, value_name = "ROOT")]
        roots: Vec<PathBuf>,
        /// Remove eligible artifacts after listing them
        #[arg(long)]
        delete: bool,
    },
    /// Run a command under a wall-clock bound
    Timeout {
        /// Seconds (fractions allowed)
        #[arg(value_name = "SECS")]
        seconds: f64,
        /// Command and arguments; a single argument is split shell-style
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Initialize configuration files (~/.config/safe-clean/)
    Init,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TypeArg {
    File,
    Dir,
    Any,
}

impl From<TypeArg> for EntryType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::File => EntryType::File,
            TypeArg::Dir => EntryType::Dir,
            TypeArg::Any => EntryType::Any,
        }
    }
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Split a single command string shell-style; pass multiple words through
pub fn command_words(command: &[String]) -> Option<Vec<String>> {
    match command {
        [single] => shlex::split(single).filter(|words| !words.is_empty()),
        [] => None,
        words => Some(words.to_vec()),
    }
}
