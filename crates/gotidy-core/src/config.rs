use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub(crate) const GO_ENV: &str = "GOTIDY_GO";
pub(crate) const GOIMPORTS_ENV: &str = "GOTIDY_GOIMPORTS";
pub(crate) const TIMEOUT_ENV: &str = "GOTIDY_TOOL_TIMEOUT_SECS";
pub(crate) const TIMINGS_ENV: &str = "GOTIDY_TIMINGS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// A set variable counts as on unless it reads like a negative.
    pub(crate) fn flag(&self, key: &str) -> bool {
        self.var(key).is_some_and(|value| {
            !matches!(
                value.to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            )
        })
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Executables driven by the two stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolsConfig {
    pub go: String,
    pub goimports: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            go: "go".to_string(),
            goimports: "goimports".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub(crate) tools: ToolsConfig,
    pub(crate) tool_timeout: Option<Duration>,
    pub(crate) timings: bool,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Currently infallible; kept fallible so new settings can reject bad input.
    pub fn from_env() -> anyhow::Result<Self> {
        let snapshot = EnvSnapshot::capture();
        Self::from_snapshot(&snapshot)
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> anyhow::Result<Self> {
        let defaults = ToolsConfig::default();
        Ok(Self {
            tools: ToolsConfig {
                go: snapshot.var(GO_ENV).map_or(defaults.go, ToOwned::to_owned),
                goimports: snapshot
                    .var(GOIMPORTS_ENV)
                    .map_or(defaults.goimports, ToOwned::to_owned),
            },
            tool_timeout: snapshot
                .var(TIMEOUT_ENV)
                .and_then(|raw| raw.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            timings: snapshot.flag(TIMINGS_ENV),
        })
    }

    #[must_use]
    pub fn with_tools(mut self, tools: ToolsConfig) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_timings(mut self, timings: bool) -> Self {
        self.timings = timings;
        self
    }

    /// Whether per-stage durations are logged at info level.
    #[must_use]
    pub fn timings(&self) -> bool {
        self.timings
    }

    #[must_use]
    pub fn tools(&self) -> &ToolsConfig {
        &self.tools
    }

    #[must_use]
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("nothing to do: enable --tidy and/or --imports")]
    NothingEnabled,
    #[error("the import prefix must not be empty")]
    EmptyPrefix,
}

/// One orchestration run over a module directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRequest {
    pub dir: PathBuf,
    pub tidy: bool,
    pub imports: bool,
    pub local_prefix: Option<String>,
    /// Keep the tools' changes instead of restoring the tree afterwards.
    pub write: bool,
    pub pregroup: bool,
}

impl RunRequest {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tidy: false,
            imports: false,
            local_prefix: None,
            write: false,
            pregroup: false,
        }
    }

    /// A local prefix turns the import stage on by itself.
    #[must_use]
    pub fn imports_enabled(&self) -> bool {
        self.imports || self.local_prefix.is_some()
    }

    /// # Errors
    /// Returns a `RequestError` when no stage is enabled or the prefix is blank.
    pub fn validate(&self) -> Result<(), RequestError> {
        if matches!(&self.local_prefix, Some(prefix) if prefix.trim().is_empty()) {
            return Err(RequestError::EmptyPrefix);
        }
        if !self.tidy && !self.imports_enabled() {
            return Err(RequestError::NothingEnabled);
        }
        Ok(())
    }
}
