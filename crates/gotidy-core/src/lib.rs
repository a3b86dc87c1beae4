#![deny(clippy::all)]

mod config;
mod coordinator;
mod error;
mod imports;
mod outcome;
mod process;
mod snapshot;
mod tidy;
mod timings;
mod tools;

#[cfg(all(test, unix))]
mod test_support;

pub use crate::config::{Config, GlobalOptions, RequestError, RunRequest, ToolsConfig};
pub use crate::coordinator::{RunCoordinator, RunOutcome, Stage, StageReport, StageState};
pub use crate::error::{
    ChangeDetected, ChangeKind, FileChange, FmtError, RestoreError, RestoreFailure,
};
pub use crate::outcome::{outcome_from_run, CommandStatus, ExecutionOutcome};
pub use crate::process::{
    CancelToken, Message, ProcessRunner, StageTag, StreamKind, ToolInvocation, ToolOutput,
};
pub use crate::snapshot::{FileRecord, Snapshot};
pub use crate::tidy::normalize_requirements;
pub use crate::tools::{resolve_tool, ResolvedTools};
