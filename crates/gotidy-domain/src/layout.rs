use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const GO_MOD: &str = "go.mod";
pub const GO_SUM: &str = "go.sum";
pub const GO_WORK: &str = "go.work";
pub const GO_WORK_SUM: &str = "go.work.sum";

/// Files protected by the dependency stage, manifest first.
pub const MODULE_FILES: [&str; 4] = [GO_MOD, GO_SUM, GO_WORK, GO_WORK_SUM];

/// Absolute location of a Go module root and its well-known files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLayout {
    root: PathBuf,
}

impl ModuleLayout {
    /// Resolve `root` to an absolute, canonical directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory does not exist or cannot be
    /// canonicalized.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let resolved = root
            .canonicalize()
            .with_context(|| format!("failed to resolve module directory {}", root.display()))?;
        if !resolved.is_dir() {
            anyhow::bail!("{} is not a directory", resolved.display());
        }
        Ok(Self { root: resolved })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(GO_MOD)
    }

    #[must_use]
    pub fn module_files(&self) -> Vec<PathBuf> {
        MODULE_FILES.iter().map(|name| self.root.join(name)).collect()
    }

    /// Resolve a path reported by a tool relative to the module root.
    #[must_use]
    pub fn resolve(&self, reported: impl AsRef<Path>) -> PathBuf {
        let path = reported.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
