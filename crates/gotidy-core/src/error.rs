use std::{
    fmt, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Serialize;
use serde_json::{json, Value};

use gotidy_domain::ModParseError;

use crate::process::StageTag;

/// How a file differs from its captured state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Modified,
    Missing,
    Appeared,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Modified => "modified",
            Self::Missing => "missing",
            Self::Appeared => "appeared",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub key: PathBuf,
    pub kind: ChangeKind,
}

/// The file set (or its content) no longer matches a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("detected changes in {} file(s): {}", .changes.len(), describe_changes(.changes))]
pub struct ChangeDetected {
    pub changes: Vec<FileChange>,
    /// Files present at capture time.
    pub captured: usize,
    /// Files present at verification time.
    pub current: usize,
}

impl ChangeDetected {
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        self.changes.iter().map(|change| change.key.as_path()).collect()
    }
}

fn describe_changes(changes: &[FileChange]) -> String {
    changes
        .iter()
        .map(|change| format!("{} ({})", change.key.display(), change.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug)]
pub struct RestoreFailure {
    pub path: PathBuf,
    pub source: io::Error,
}

/// Every file a rollback could not write back.
#[derive(Debug, thiserror::Error)]
#[error("failed to restore {} file(s): {}", .failures.len(), describe_failures(.failures))]
pub struct RestoreError {
    pub failures: Vec<RestoreFailure>,
}

fn describe_failures(failures: &[RestoreFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{} ({})", failure.path.display(), failure.source))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum FmtError {
    #[error("go.mod not found in {}", .dir.display())]
    MissingManifest { dir: PathBuf },
    #[error("failed to parse {}", .path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: ModParseError,
    },
    #[error("failed to launch {program}")]
    ToolLaunch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} failed during {stage} ({}){}", exit_label(.code), stderr_tail(.stderr))]
    ToolExit {
        stage: StageTag,
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{program} timed out after {}s during {stage}", .timeout.as_secs())]
    ToolTimeout {
        stage: StageTag,
        program: String,
        timeout: Duration,
    },
    #[error("cancelled during {stage}")]
    Cancelled { stage: StageTag },
    #[error("failed to {action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    ChangeDetected(#[from] ChangeDetected),
    #[error(transparent)]
    Restore(#[from] RestoreError),
    #[error("{cause}; rollback incomplete: {restore}")]
    RolledBack {
        cause: Box<FmtError>,
        restore: RestoreError,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

fn stderr_tail(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl FmtError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Attach rollback failures to the error that triggered the rollback.
    #[must_use]
    pub fn with_restore(self, restore: Option<RestoreError>) -> Self {
        match restore {
            Some(restore) => Self::RolledBack {
                cause: Box::new(self),
                restore,
            },
            None => self,
        }
    }

    /// Stable machine-readable reason.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingManifest { .. } => "missing_manifest",
            Self::ManifestParse { .. } => "parse_failure",
            Self::ToolLaunch { .. } => "tool_launch_failure",
            Self::ToolExit { .. } => "tool_exit_failure",
            Self::ToolTimeout { .. } => "tool_timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Io { .. } => "io_failure",
            Self::ChangeDetected(_) => "change_detected",
            Self::Restore(_) | Self::RolledBack { .. } => "restore_failure",
        }
    }

    /// Whether the failure stems from the user's tree or request rather than
    /// from a tool or the filesystem.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::MissingManifest { .. } | Self::ChangeDetected(_))
    }

    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingManifest { .. } => {
                Some("Run gotidy from a Go module root or pass --dir <module>.")
            }
            Self::ToolLaunch { .. } => {
                Some("Install the tool or point GOTIDY_GO / GOTIDY_GOIMPORTS at it.")
            }
            Self::ToolTimeout { .. } => Some("Raise GOTIDY_TOOL_TIMEOUT_SECS or unset it."),
            Self::ChangeDetected(_) => Some("Re-run with --write to apply the changes."),
            Self::Restore(_) | Self::RolledBack { .. } => {
                Some("Restore the listed files from version control.")
            }
            _ => None,
        }
    }

    /// Display text followed by every source in the chain.
    #[must_use]
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }

    #[must_use]
    pub fn details(&self) -> Value {
        let mut details = json!({
            "reason": self.kind(),
            "error": self.chain_message(),
        });
        let Value::Object(map) = &mut details else {
            return details;
        };
        if let Some(hint) = self.hint() {
            map.insert("hint".into(), json!(hint));
        }
        match self {
            Self::MissingManifest { dir } => {
                map.insert("dir".into(), json!(dir));
            }
            Self::ManifestParse { path, source } => {
                map.insert("path".into(), json!(path));
                map.insert("line".into(), json!(source.line));
            }
            Self::ToolLaunch { program, .. } => {
                map.insert("program".into(), json!(program));
            }
            Self::ToolExit {
                stage,
                program,
                code,
                stderr,
            } => {
                map.insert("stage".into(), json!(stage));
                map.insert("program".into(), json!(program));
                map.insert("code".into(), json!(code));
                map.insert("stderr".into(), json!(stderr));
            }
            Self::ToolTimeout {
                stage,
                program,
                timeout,
            } => {
                map.insert("stage".into(), json!(stage));
                map.insert("program".into(), json!(program));
                map.insert("timeout_secs".into(), json!(timeout.as_secs()));
            }
            Self::Cancelled { stage } => {
                map.insert("stage".into(), json!(stage));
            }
            Self::Io { action, path, .. } => {
                map.insert("action".into(), json!(action));
                map.insert("path".into(), json!(path));
            }
            Self::ChangeDetected(detected) => {
                map.insert("changes".into(), json!(detected.changes));
            }
            Self::Restore(restore) => {
                map.insert("unrestored".into(), json!(unrestored(restore)));
            }
            Self::RolledBack { cause, restore } => {
                map.insert("cause".into(), cause.details());
                map.insert("unrestored".into(), json!(unrestored(restore)));
            }
        }
        details
    }
}

fn unrestored(restore: &RestoreError) -> Vec<&Path> {
    restore
        .failures
        .iter()
        .map(|failure| failure.path.as_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_exit_message_carries_code_and_stderr() {
        let err = FmtError::ToolExit {
            stage: StageTag::Sort,
            program: "goimports".into(),
            code: Some(2),
            stderr: "invalid -local".into(),
        };
        assert_eq!(
            err.to_string(),
            "goimports failed during SORT (exit code 2): invalid -local"
        );
        assert_eq!(err.kind(), "tool_exit_failure");
        assert!(!err.is_user_error());
    }

    #[test]
    fn composite_error_keeps_cause_and_unrestored_paths() {
        let cause = FmtError::Cancelled {
            stage: StageTag::Tidy,
        };
        let restore = RestoreError {
            failures: vec![RestoreFailure {
                path: PathBuf::from("/tmp/mod/go.sum"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            }],
        };
        let err = cause.with_restore(Some(restore));
        assert_eq!(err.kind(), "restore_failure");
        let message = err.to_string();
        assert!(message.starts_with("cancelled during TIDY; rollback incomplete"));
        assert!(message.contains("go.sum (denied)"));
        let details = err.details();
        assert_eq!(details["cause"]["reason"], "cancelled");
        assert_eq!(details["unrestored"][0], "/tmp/mod/go.sum");
    }

    #[test]
    fn clean_rollback_keeps_original_error() {
        let err = FmtError::MissingManifest {
            dir: PathBuf::from("/tmp/mod"),
        }
        .with_restore(None);
        assert_eq!(err.kind(), "missing_manifest");
        assert!(err.is_user_error());
    }

    #[test]
    fn chain_message_includes_io_source() {
        let err = FmtError::io(
            "read",
            "/tmp/mod/go.mod",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.chain_message(), "failed to read /tmp/mod/go.mod: denied");
    }

    #[test]
    fn change_detected_lists_each_file() {
        let detected = ChangeDetected {
            changes: vec![
                FileChange {
                    key: PathBuf::from("go.sum"),
                    kind: ChangeKind::Missing,
                },
                FileChange {
                    key: PathBuf::from("go.mod"),
                    kind: ChangeKind::Modified,
                },
            ],
            captured: 2,
            current: 1,
        };
        assert_eq!(
            detected.to_string(),
            "detected changes in 2 file(s): go.sum (missing), go.mod (modified)"
        );
        let err = FmtError::from(detected);
        assert_eq!(err.details()["changes"][0]["kind"], "missing");
    }
}
