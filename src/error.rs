//! Error types for safe-clean
//!
//! Defines the rejection reasons produced by path validation and the
//! structured errors returned by the deletion engine.

use std::path::PathBuf;
use std::time::Duration;

/// Reserved exit status for a supervised call that exceeded its bound.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Why a path was refused before any mutation was attempted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Empty or unset value
    #[error("empty path")]
    Empty,
    /// ASCII control character or embedded newline
    #[error("path contains control characters: {0:?}")]
    ControlCharacter(String),
    /// Not rooted at `/`
    #[error("path is not absolute: {0}")]
    Relative(PathBuf),
    /// Contains a `..` component
    #[error("path contains parent traversal: {0}")]
    Traversal(PathBuf),
    /// Equal to or beneath a protected system location
    #[error("protected system path: {path} (rule {rule})")]
    Protected { path: PathBuf, rule: PathBuf },
    /// Equal to or beneath a user whitelist entry
    #[error("whitelisted path: {path} (entry {entry})")]
    Whitelisted { path: PathBuf, entry: PathBuf },
    /// Empty or malformed name glob
    #[error("invalid name pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Errors surfaced at the deletion engine boundary
#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    // ブロック（Exit 2）
    #[error("refused: {0}")]
    Rejected(#[from] Rejection),

    #[error("refused: {0} is a symbolic link and cannot be removed with elevated privilege")]
    SymlinkRefused(PathBuf),

    // タイムアウト（Exit 124）
    #[error("timed out after {}s: {}", .timeout.as_secs_f64(), .path.display())]
    TimedOut { path: PathBuf, timeout: Duration },

    // システムエラー（Exit 1）
    #[error("supervisor error: {0}")]
    Supervisor(String),

    #[error("cannot remove '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed with exit code {code}: {}", .path.display())]
    CommandFailed { path: PathBuf, code: i32 },
}

impl DeleteError {
    /// 終了コードを取得
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Rejected(_) | Self::SymlinkRefused(_) => 2,
            Self::TimedOut { .. } => TIMEOUT_EXIT_CODE as u8,
            Self::Supervisor(_) | Self::Io { .. } | Self::CommandFailed { .. } => 1,
        }
    }

    /// True for refusals the caller is expected to report and skip
    pub fn is_refusal(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::SymlinkRefused(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
