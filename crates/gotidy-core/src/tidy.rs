//! Dependency stage: canonicalize go.mod, run `go mod tidy`, verify the
//! module file set and roll back when anything goes wrong.

use std::{fs, io, path::PathBuf};

use tracing::{debug, info, warn};

use gotidy_domain::{ModFile, ModuleLayout};

use crate::{
    coordinator::{Stage, StageRun, StageState},
    error::FmtError,
    process::{ProcessRunner, StageTag, ToolInvocation},
    snapshot::{self, Snapshot},
};

/// Drop and re-add every requirement so all of them end up in one sorted
/// block, keeping `// indirect` markers.
pub fn normalize_requirements(manifest: &mut ModFile) {
    let requirements = manifest.requirements();
    for requirement in &requirements {
        manifest.drop_requirement(&requirement.path);
    }
    for requirement in &requirements {
        manifest.add_requirement(&requirement.path, &requirement.version);
        manifest.set_indirect(&requirement.path, requirement.indirect);
    }
    manifest.cleanup();
    manifest.sort_blocks();
}

pub(crate) async fn run(
    runner: &ProcessRunner,
    layout: &ModuleLayout,
    go: &str,
    write: bool,
) -> StageRun {
    match tidy(runner, layout, go, write).await {
        Ok(run) => run,
        Err((state, error)) => StageRun::failed(Stage::Tidy, state, error),
    }
}

type Failure = (StageState, FmtError);

async fn tidy(
    runner: &ProcessRunner,
    layout: &ModuleLayout,
    go: &str,
    write: bool,
) -> Result<StageRun, Failure> {
    let manifest_path = layout.manifest_path();
    let original = match fs::read(&manifest_path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err((
                StageState::Unchanged,
                FmtError::MissingManifest {
                    dir: layout.root().to_path_buf(),
                },
            ))
        }
        Err(err) => {
            return Err((
                StageState::Unchanged,
                FmtError::io("read", &manifest_path, err),
            ))
        }
    };
    let mut manifest = ModFile::parse(&manifest_path, &original).map_err(|source| {
        (
            StageState::Unchanged,
            FmtError::ManifestParse {
                path: manifest_path.clone(),
                source,
            },
        )
    })?;
    normalize_requirements(&mut manifest);
    let formatted = manifest.format();

    let before = Snapshot::capture(layout.module_files())
        .map_err(|err| (StageState::Unchanged, err))?;
    let rollback = |cause: FmtError| (StageState::RolledBack, before.rollback(cause));

    if formatted == original {
        debug!("go.mod already canonical");
    } else {
        let record = before.get(&manifest_path).ok_or_else(|| {
            (
                StageState::Unchanged,
                FmtError::MissingManifest {
                    dir: layout.root().to_path_buf(),
                },
            )
        })?;
        snapshot::write_file(&manifest_path, &formatted, record.permissions())
            .map_err(|err| rollback(FmtError::io("write", &manifest_path, err)))?;
        debug!("go.mod rewritten in canonical form");
    }

    let invocation = ToolInvocation::new(StageTag::Tidy, go, layout.root()).args(["mod", "tidy"]);
    runner.run(&invocation).await.map_err(rollback)?;

    let after = before.recapture().map_err(rollback)?;
    let files = changed_files(&before, &after);

    if write {
        let warning = before.verify_presence(&after).err();
        if let Some(detected) = &warning {
            warn!("go mod tidy changed the module file set: {detected}");
        }
        let state = if files.is_empty() {
            StageState::Unchanged
        } else {
            StageState::Committed
        };
        info!(files = files.len(), "dependencies tidied");
        return Ok(StageRun::finished(Stage::Tidy, state, files, warning));
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
        Ok(()) => {
            info!("dependencies already tidy");
            Ok(StageRun::finished(Stage::Tidy, StageState::Unchanged, files, None))
        }
        Err(detected) => {
            info!(files = files.len(), "dependency changes detected and reverted");
            Err((StageState::RolledBack, FmtError::ChangeDetected(detected)))
        }
    }
}

pub(crate) fn changed_files(before: &Snapshot, after: &Snapshot) -> Vec<PathBuf> {
    before
        .verify(after)
        .err()
        .map(|detected| detected.changes.into_iter().map(|change| change.key).collect())
        .unwrap_or_default()
}
