//! Import stage: list the files goimports would touch, strip comments from
//! their import blocks and let goimports regroup them, rolling back on any
//! failure.

use std::{fs, path::PathBuf};

use tracing::{debug, info, warn};

use gotidy_domain::{has_import_block, strip_import_comments, ModuleLayout};

use crate::{
    config::RunRequest,
    coordinator::{Stage, StageRun, StageState},
    error::FmtError,
    process::{ProcessRunner, StageTag, ToolInvocation},
    snapshot::{self, Snapshot},
    tidy::changed_files,
};

const LIST_FLAG: &str = "-l";
const WRITE_FLAG: &str = "-w";
const LOCAL_FLAG: &str = "-local";
const FORMAT_ONLY_FLAG: &str = "--format-only";

pub(crate) async fn run(
    runner: &ProcessRunner,
    layout: &ModuleLayout,
    goimports: &str,
    request: &RunRequest,
) -> StageRun {
    match normalize(runner, layout, goimports, request).await {
        Ok(run) => run,
        Err((state, error)) => StageRun::failed(Stage::Imports, state, error),
    }
}

fn invocation(
    stage: StageTag,
    goimports: &str,
    layout: &ModuleLayout,
    request: &RunRequest,
) -> ToolInvocation {
    let mode = if stage == StageTag::List {
        LIST_FLAG
    } else {
        WRITE_FLAG
    };
    let mut invocation = ToolInvocation::new(stage, goimports, layout.root()).arg(mode);
    if let Some(prefix) = &request.local_prefix {
        invocation = invocation.args([LOCAL_FLAG, prefix.as_str()]);
    }
    invocation.arg(FORMAT_ONLY_FLAG)
}

/// Paths from list-mode output: one per line, resolved against the module
/// root, first occurrence wins. Lines are taken as raw bytes so non-UTF-8
/// file names survive on unix.
pub(crate) fn parse_candidates(stdout: &[u8], layout: &ModuleLayout) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    let lines = stdout
        .split(|byte| *byte == b'\n')
        .map(<[u8]>::trim_ascii)
        .filter(|line| !line.is_empty());
    for line in lines {
        let path = layout.resolve(reported_path(line));
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

#[cfg(unix)]
fn reported_path(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn reported_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

type Failure = (StageState, FmtError);

async fn normalize(
    runner: &ProcessRunner,
    layout: &ModuleLayout,
    goimports: &str,
    request: &RunRequest,
) -> Result<StageRun, Failure> {
    let list = invocation(StageTag::List, goimports, layout, request)
        .arg(layout.root());
    let listed = runner
        .run(&list)
        .await
        .map_err(|err| (StageState::Unchanged, err))?;
    let files = parse_candidates(&listed.stdout, layout);
    if files.is_empty() {
        info!("imports already grouped");
        return Ok(StageRun::finished(
            Stage::Imports,
            StageState::Unchanged,
            Vec::new(),
            None,
        ));
    }
    info!(files = files.len(), "regrouping imports");

    let before = Snapshot::capture(&files).map_err(|err| (StageState::Unchanged, err))?;
    let rollback = |cause: FmtError| (StageState::RolledBack, before.rollback(cause));
    let write = |stage: StageTag| {
        invocation(stage, goimports, layout, request)
            .args(files.iter().map(|f| f.as_os_str()))
    };

    if request.pregroup {
        runner
            .run(&write(StageTag::Group))
            .await
            .map_err(rollback)?;
    }

    for file in &files {
        let current = fs::read(file).map_err(|err| rollback(FmtError::io("read", file, err)))?;
        if !has_import_block(&current) {
            debug!(path = %file.display(), "no import block");
            continue;
        }
        let stripped = strip_import_comments(&current);
        if stripped == current {
            continue;
        }
        let Some(record) = before.get(file) else {
            return Err(rollback(FmtError::io(
                "read",
                file,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )));
        };
        snapshot::write_file(file, &stripped, record.permissions())
            .map_err(|err| rollback(FmtError::io("write", file, err)))?;
        debug!(path = %file.display(), "import comments stripped");
    }

    runner.run(&write(StageTag::Sort)).await.map_err(rollback)?;

    let after = before.recapture().map_err(rollback)?;
    let changed = changed_files(&before, &after);

    if request.write {
        info!(files = changed.len(), "imports regrouped");
        let state = if changed.is_empty() {
            StageState::Unchanged
        } else {
            StageState::Committed
        };
        return Ok(StageRun::finished(Stage::Imports, state, changed, None));
    }

    let verdict = before.verify(&after);
    if let Err(restore) = before.restore() {
        let cause = match verdict {
            Ok(()) => FmtError::Restore(restore),
            Err(detected) => FmtError::ChangeDetected(detected).with_restore(Some(restore)),
        };
        return Err((StageState::RolledBack, cause));
    }
    match verdict {
        Ok(()) => Ok(StageRun::finished(
            Stage::Imports,
            StageState::Unchanged,
            changed,
            None,
        )),
        Err(detected) => {
            warn!("import changes detected and reverted: {detected}");
            Err((StageState::RolledBack, FmtError::ChangeDetected(detected)))
        }
    }
}
