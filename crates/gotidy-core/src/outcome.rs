use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    config::{RequestError, RunRequest},
    coordinator::{RunOutcome, StageState},
    timings::millis,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.status {
            CommandStatus::Ok => 0,
            CommandStatus::UserError => 1,
            CommandStatus::Failure => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl From<&RequestError> for ExecutionOutcome {
    fn from(err: &RequestError) -> Self {
        let reason = match err {
            RequestError::NothingEnabled => "nothing_enabled",
            RequestError::EmptyPrefix => "empty_prefix",
        };
        ExecutionOutcome::user_error(err.to_string(), json!({ "reason": reason }))
    }
}

/// Summarize a finished run for display.
#[must_use]
pub fn outcome_from_run(request: &RunRequest, run: &RunOutcome) -> ExecutionOutcome {
    let mut details = json!({
        "dir": request.dir,
        "write": request.write,
        "elapsed_ms": millis(run.elapsed),
        "state": run.state,
        "stages": run.stages,
        "warnings": run.warnings,
    });

    let Some(error) = &run.error else {
        let changed: usize = run.stages.iter().map(|stage| stage.files.len()).sum();
        let message = match (run.state, request.write) {
            (StageState::Committed, _) => format!("updated {changed} file(s)"),
            (_, true) => "already tidy".to_string(),
            (_, false) => "no changes needed".to_string(),
        };
        return ExecutionOutcome::success(message, details);
    };

    if let (Value::Object(map), Value::Object(extra)) = (&mut details, error.details()) {
        map.extend(extra);
    }
    let message = error.to_string();
    if error.is_user_error() {
        ExecutionOutcome::user_error(message, details)
    } else {
        ExecutionOutcome::failure(message, details)
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use super::*;
    use crate::{
        coordinator::{Stage, StageReport},
        error::{ChangeDetected, ChangeKind, FileChange, FmtError},
    };

    fn run(state: StageState, error: Option<FmtError>) -> RunOutcome {
        RunOutcome {
            state,
            elapsed: Duration::from_millis(42),
            stages: vec![StageReport {
                stage: Stage::Tidy,
                state,
                files: vec![PathBuf::from("/m/go.mod")],
                elapsed_ms: 40,
            }],
            warnings: Vec::new(),
            error,
        }
    }

    #[test]
    fn committed_run_reports_changed_files() {
        let mut request = RunRequest::new("/m");
        request.write = true;
        let outcome = outcome_from_run(&request, &run(StageState::Committed, None));
        assert_eq!(outcome.status, CommandStatus::Ok);
        assert_eq!(outcome.message, "updated 1 file(s)");
        assert_eq!(outcome.details["elapsed_ms"], 42);
        assert_eq!(outcome.details["stages"][0]["stage"], "tidy");
        assert_eq!(outcome.details["stages"][0]["elapsed_ms"], 40);
        assert_eq!(outcome.details["state"], "committed");
    }

    #[test]
    fn detected_changes_are_user_errors() {
        let detected = ChangeDetected {
            changes: vec![FileChange {
                key: PathBuf::from("/m/go.mod"),
                kind: ChangeKind::Modified,
            }],
            captured: 1,
            current: 1,
        };
        let outcome = outcome_from_run(
            &RunRequest::new("/m"),
            &run(StageState::RolledBack, Some(FmtError::from(detected))),
        );
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.details["reason"], "change_detected");
        assert_eq!(outcome.details["changes"][0]["key"], "/m/go.mod");
    }

    #[test]
    fn tool_failures_are_failures() {
        let err = FmtError::ToolExit {
            stage: crate::process::StageTag::Sort,
            program: "goimports".into(),
            code: Some(2),
            stderr: String::new(),
        };
        let outcome = outcome_from_run(
            &RunRequest::new("/m"),
            &run(StageState::RolledBack, Some(err)),
        );
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(outcome.details["reason"], "tool_exit_failure");
        assert_eq!(outcome.details["stage"], "SORT");
    }

    #[test]
    fn request_errors_map_to_user_errors() {
        let outcome = ExecutionOutcome::from(&RequestError::NothingEnabled);
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["reason"], "nothing_enabled");
    }
}
