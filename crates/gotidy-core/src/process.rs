//! Running external tools while draining their output streams.
//!
//! Each invocation gets two reader tasks, one per pipe, forwarding chunks
//! into an unbounded queue so the child never stalls on a full pipe. The
//! coordinating task multiplexes that queue with the child's exit, the
//! cancellation token and an optional deadline.

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};

use serde::Serialize;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, warn};

use crate::error::FmtError;

const CHUNK_SIZE: usize = 1024;
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Label attached to every invocation and its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageTag {
    Tidy,
    List,
    Group,
    Sort,
}

impl StageTag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tidy => "TIDY",
            Self::List => "LIST",
            Self::Group => "GROUP",
            Self::Sort => "SORT",
        }
    }
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One chunk of tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub stage: StageTag,
    pub stream: StreamKind,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    stage: StageTag,
    program: String,
    args: Vec<OsString>,
    cwd: PathBuf,
}

impl ToolInvocation {
    pub fn new(stage: StageTag, program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            stage,
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stage(&self) -> StageTag {
        self.stage
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }
}

/// Accumulated output of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stage: StageTag,
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    fn new(stage: StageTag) -> Self {
        Self {
            stage,
            code: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    fn record(&mut self, message: &Message) {
        match message.stream {
            StreamKind::Stdout => self.stdout.extend_from_slice(&message.bytes),
            StreamKind::Stderr => self.stderr.extend_from_slice(&message.bytes),
        }
    }

    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Cloneable cooperative cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once `cancel` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Cancel on Ctrl-C. Spawns onto the current tokio runtime; abort the
    /// returned handle to stop listening.
    pub fn cancel_on_interrupt(&self) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, rolling back");
                token.cancel();
            }
        })
    }
}

enum Exit {
    Status(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    cancel: CancelToken,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    #[must_use]
    pub fn new(cancel: CancelToken, timeout: Option<Duration>) -> Self {
        Self { cancel, timeout }
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run a tool to completion and collect its output.
    ///
    /// # Errors
    ///
    /// Returns `ToolLaunch` when the program cannot be started, `ToolExit`
    /// on a non-zero exit, `ToolTimeout` or `Cancelled` when the child had to
    /// be killed.
    pub async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, FmtError> {
        self.run_with(invocation, |_| {}).await
    }

    /// Like [`ProcessRunner::run`], handing every chunk to `on_message` as it
    /// arrives. Chunks seen before a failing exit are not retracted.
    ///
    /// # Errors
    ///
    /// See [`ProcessRunner::run`].
    pub async fn run_with<F>(
        &self,
        invocation: &ToolInvocation,
        mut on_message: F,
    ) -> Result<ToolOutput, FmtError>
    where
        F: FnMut(&Message),
    {
        let stage = invocation.stage;
        if self.cancel.is_cancelled() {
            return Err(FmtError::Cancelled { stage });
        }
        debug!(
            stage = %stage,
            cwd = %invocation.cwd.display(),
            "running {}",
            invocation.display()
        );

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FmtError::ToolLaunch {
                program: invocation.program.clone(),
                source,
            })?;
        let launch_error = |pipe: &str| FmtError::ToolLaunch {
            program: invocation.program.clone(),
            source: std::io::Error::other(format!("{pipe} pipe unavailable")),
        };
        let stdout = child.stdout.take().ok_or_else(|| launch_error("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| launch_error("stderr"))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let readers = [
            spawn_reader(stage, StreamKind::Stdout, stdout, tx.clone(), stop_rx.clone()),
            spawn_reader(stage, StreamKind::Stderr, stderr, tx, stop_rx),
        ];

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let mut output = ToolOutput::new(stage);
        let exit = loop {
            tokio::select! {
                Some(message) = rx.recv() => {
                    log_message(&message);
                    output.record(&message);
                    on_message(&message);
                }
                status = child.wait() => break Exit::Status(status),
                () = self.cancel.cancelled() => break Exit::Cancelled,
                limit = &mut deadline => break Exit::TimedOut(limit),
            }
        };

        let status = match exit {
            Exit::Status(status) => status,
            Exit::Cancelled => {
                kill(&mut child, invocation).await;
                stop_tx.send_replace(true);
                return Err(FmtError::Cancelled { stage });
            }
            Exit::TimedOut(limit) => {
                kill(&mut child, invocation).await;
                stop_tx.send_replace(true);
                return Err(FmtError::ToolTimeout {
                    stage,
                    program: invocation.program.clone(),
                    timeout: limit,
                });
            }
        };

        stop_tx.send_replace(true);
        while let Some(message) = rx.recv().await {
            log_message(&message);
            output.record(&message);
            on_message(&message);
        }
        for reader in readers {
            if let Err(err) = reader.await {
                debug!(stage = %stage, "output reader ended abnormally: {err}");
            }
        }

        let status = status.map_err(|source| FmtError::Io {
            action: "wait for",
            path: PathBuf::from(&invocation.program),
            source,
        })?;
        output.code = status.code();
        if status.success() {
            return Ok(output);
        }
        Err(FmtError::ToolExit {
            stage,
            program: invocation.program.clone(),
            code: status.code(),
            stderr: output.stderr_lossy().trim().to_string(),
        })
    }
}

async fn kill(child: &mut tokio::process::Child, invocation: &ToolInvocation) {
    if let Err(err) = child.kill().await {
        debug!(stage = %invocation.stage, "failed to kill {}: {err}", invocation.program);
    }
}

fn log_message(message: &Message) {
    let text = String::from_utf8_lossy(&message.bytes);
    debug!(
        stage = %message.stage,
        stream = ?message.stream,
        "{}",
        text.trim_end()
    );
}

/// Forward `pipe` to `tx` in fixed-size chunks until EOF. Once `stop` fires
/// the reader keeps draining for at most `DRAIN_GRACE` in total, so a pipe
/// kept open (or kept busy) by a grandchild cannot hold the run.
fn spawn_reader<R>(
    stage: StageTag,
    stream: StreamKind,
    mut pipe: R,
    tx: mpsc::UnboundedSender<Message>,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0_u8; CHUNK_SIZE];
        let mut drain_until: Option<Instant> = None;
        loop {
            let read = if let Some(deadline) = drain_until {
                match tokio::time::timeout_at(deadline, pipe.read(&mut buf)).await {
                    Ok(read) => read,
                    Err(_) => break,
                }
            } else {
                tokio::select! {
                    biased;
                    read = pipe.read(&mut buf) => read,
                    _ = stop.changed() => {
                        drain_until = Some(Instant::now() + DRAIN_GRACE);
                        continue;
                    }
                }
            };
            match read {
                Ok(0) => break,
                Ok(len) => {
                    let message = Message {
                        stage,
                        stream,
                        bytes: buf[..len].to_vec(),
                    };
                    if tx.send(message).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(stage = %stage, stream = ?stream, "read failed: {err}");
                    break;
                }
            }
        }
    })
}
