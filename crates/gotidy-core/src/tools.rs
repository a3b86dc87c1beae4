use std::io;

use tracing::info;

use crate::{config::ToolsConfig, error::FmtError, RunRequest};

/// Absolute executable paths for the stages a request enables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTools {
    pub go: Option<String>,
    pub goimports: Option<String>,
}

/// Locate `program` on `PATH` (or validate it when it is already a path).
///
/// # Errors
/// Returns `FmtError::ToolLaunch` when the executable cannot be found.
pub fn resolve_tool(program: &str, purpose: &str) -> Result<String, FmtError> {
    let path = which::which(program).map_err(|err| FmtError::ToolLaunch {
        program: program.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, err.to_string()),
    })?;
    let path = path.to_string_lossy().into_owned();
    info!("using {path} for {purpose}");
    Ok(path)
}

pub(crate) fn resolve_for(tools: &ToolsConfig, request: &RunRequest) -> Result<ResolvedTools, FmtError> {
    let go = if request.tidy {
        Some(resolve_tool(&tools.go, "dependency tidy")?)
    } else {
        None
    };
    let goimports = if request.imports_enabled() {
        Some(resolve_tool(&tools.goimports, "import grouping")?)
    } else {
        None
    };
    Ok(ResolvedTools { go, goimports })
}
