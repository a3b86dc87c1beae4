use std::{
    io,
    path::PathBuf,
    sync::{Arc, LazyLock},
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use gotidy_domain::ModuleLayout;

use crate::{
    config::{Config, RequestError, RunRequest},
    error::{ChangeDetected, FmtError},
    imports,
    process::{CancelToken, ProcessRunner},
    tidy,
    timings::{millis, StageTimer},
    tools,
};

/// Serializes every run in the process, whatever directory it targets.
static RUN_LOCK: LazyLock<Arc<Mutex<()>>> = LazyLock::new(|| Arc::new(Mutex::new(())));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Tidy,
    Imports,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Changes were written and kept.
    Committed,
    /// The stage's snapshot was written back.
    RolledBack,
    /// Nothing on disk differs from before the stage.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub state: StageState,
    pub files: Vec<PathBuf>,
    pub elapsed_ms: u64,
}

/// What one normalizer hands back to the coordinator.
#[derive(Debug)]
pub(crate) struct StageRun {
    pub(crate) report: StageReport,
    pub(crate) warning: Option<ChangeDetected>,
    pub(crate) error: Option<FmtError>,
}

impl StageRun {
    pub(crate) fn finished(
        stage: Stage,
        state: StageState,
        files: Vec<PathBuf>,
        warning: Option<ChangeDetected>,
    ) -> Self {
        Self {
            report: StageReport {
                stage,
                state,
                files,
                elapsed_ms: 0,
            },
            warning,
            error: None,
        }
    }

    pub(crate) fn failed(stage: Stage, state: StageState, error: FmtError) -> Self {
        Self {
            report: StageReport {
                stage,
                state,
                files: Vec::new(),
                elapsed_ms: 0,
            },
            warning: None,
            error: Some(error),
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub state: StageState,
    pub elapsed: Duration,
    pub stages: Vec<StageReport>,
    /// Informational change notices from write-mode runs.
    pub warnings: Vec<ChangeDetected>,
    pub error: Option<FmtError>,
}

impl RunOutcome {
    fn new() -> Self {
        Self {
            state: StageState::Unchanged,
            elapsed: Duration::ZERO,
            stages: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Record a stage; returns `false` once the run must stop.
    fn absorb(&mut self, run: StageRun) -> bool {
        self.state = match (self.state, run.report.state) {
            (StageState::RolledBack, _) | (_, StageState::RolledBack) => StageState::RolledBack,
            (StageState::Committed, _) | (_, StageState::Committed) => StageState::Committed,
            _ => StageState::Unchanged,
        };
        self.stages.push(run.report);
        self.warnings.extend(run.warning);
        match run.error {
            Some(error) => {
                self.error = Some(error);
                false
            }
            None => true,
        }
    }

    fn fail(&mut self, error: FmtError) {
        self.error = Some(error);
    }
}

/// Runs the dependency stage and then the import stage for one request.
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    config: Config,
    lock: Arc<Mutex<()>>,
}

impl RunCoordinator {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_lock(config, Arc::clone(&RUN_LOCK))
    }

    #[must_use]
    pub fn with_lock(config: Config, lock: Arc<Mutex<()>>) -> Self {
        Self { config, lock }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute `request` while holding the run lock.
    ///
    /// Tool and filesystem failures end up in [`RunOutcome::error`] after the
    /// failing stage has rolled back; the next stage is not started.
    ///
    /// # Errors
    /// Returns a `RequestError` when the request enables no stage.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, RequestError> {
        request.validate()?;
        let _guard = self.lock.lock().await;
        let started = Instant::now();
        let mut outcome = RunOutcome::new();
        self.run_stages(request, cancel, &mut outcome).await;
        outcome.elapsed = started.elapsed();
        match &outcome.error {
            None => info!(elapsed_ms = millis(outcome.elapsed), "done"),
            Some(err) => warn!(elapsed_ms = millis(outcome.elapsed), "failed: {err}"),
        }
        Ok(outcome)
    }

    async fn run_stages(
        &self,
        request: &RunRequest,
        cancel: &CancelToken,
        outcome: &mut RunOutcome,
    ) {
        let layout = match ModuleLayout::new(&request.dir) {
            Ok(layout) => layout,
            Err(err) => {
                outcome.fail(FmtError::io(
                    "resolve",
                    &request.dir,
                    io::Error::new(io::ErrorKind::NotFound, err.root_cause().to_string()),
                ));
                return;
            }
        };
        info!("processing {}", layout.root().display());

        let resolved = match tools::resolve_for(&self.config.tools, request) {
            Ok(resolved) => resolved,
            Err(err) => {
                outcome.fail(err);
                return;
            }
        };
        let runner = ProcessRunner::new(cancel.clone(), self.config.tool_timeout);

        if let Some(go) = &resolved.go {
            info!("tidying dependencies");
            let timer = StageTimer::start(Stage::Tidy, self.config.timings);
            let mut run = tidy::run(&runner, &layout, go, request.write).await;
            run.report.elapsed_ms = timer.stop();
            if !outcome.absorb(run) {
                return;
            }
        }
        if let Some(goimports) = &resolved.goimports {
            info!("grouping imports");
            let timer = StageTimer::start(Stage::Imports, self.config.timings);
            let mut run = imports::run(&runner, &layout, goimports, request).await;
            run.report.elapsed_ms = timer.stop();
            outcome.absorb(run);
        }
    }

    /// Blocking wrapper around [`RunCoordinator::run`] for synchronous callers.
    /// Ctrl-C cancels `cancel` while the run is in flight.
    ///
    /// # Errors
    /// Returns an error if the runtime cannot start or the request is invalid;
    /// the latter downcasts to [`RequestError`].
    pub fn run_blocking(
        &self,
        request: &RunRequest,
        cancel: &CancelToken,
    ) -> anyhow::Result<RunOutcome> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let outcome = runtime.block_on(async {
            let interrupt = cancel.cancel_on_interrupt();
            let outcome = self.run(request, cancel).await;
            interrupt.abort();
            outcome
        })?;
        Ok(outcome)
    }
}
