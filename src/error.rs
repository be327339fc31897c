//! Error kinds surfaced by the upgrade stages.
//!
//! Every variant is fatal: the orchestrator stops at the first one and the
//! binary exits non-zero. "Already up to date" is not an error and lives in
//! [`crate::upgrade::UpgradeOutcome`] instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpgradeError {
    /// An external command could not be spawned or exited non-zero.
    ///
    /// `code` is `None` when the process never started or was killed by a signal.
    #[error("command failed: {command} (exit code {}){}", fmt_code(.code), fmt_stderr(.stderr))]
    CommandFailure {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The source tree for the selected kernel does not exist.
    #[error("kernel source tree not found: {}", .path.display())]
    PathNotFound { path: PathBuf },

    /// The requested pre-build backup could not be completed.
    #[error("backup of {} failed: {reason}", .source_tree.display())]
    BackupFailure { source_tree: PathBuf, reason: String },

    /// `eselect kernel list` produced a line we do not understand.
    #[error("unexpected kernel listing line '{line}': {reason}")]
    ListingParse { line: String, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl UpgradeError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        UpgradeError::Io {
            context: context.into(),
            source,
        }
    }

    /// Exit code of the failed command, if there was one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            UpgradeError::CommandFailure { code, .. } => *code,
            _ => None,
        }
    }
}

fn fmt_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

fn fmt_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n  stderr: {}", stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failure_message_includes_stderr() {
        let err = UpgradeError::CommandFailure {
            command: "eselect kernel set 9".into(),
            code: Some(1),
            stderr: "!!! Error: Target \"9\" doesn't appear to be valid!\n".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("eselect kernel set 9"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("doesn't appear to be valid"));
        assert_eq!(err.exit_code(), Some(1));
    }

    #[test]
    fn test_command_failure_without_code() {
        let err = UpgradeError::CommandFailure {
            command: "make".into(),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "command failed: make (exit code none)");
        assert_eq!(err.exit_code(), None);
    }
}
