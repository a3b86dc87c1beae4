//! Point-in-time captures of a file set, restorable byte for byte.

use std::{
    collections::BTreeMap,
    fs::{self, Permissions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::error::{
    ChangeDetected, ChangeKind, FileChange, FmtError, RestoreError, RestoreFailure,
};

/// Content and permissions of one file as captured. A key that was a
/// symlink remembers both the link text and the file it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    path: PathBuf,
    target: PathBuf,
    link: Option<PathBuf>,
    permissions: Permissions,
    contents: Vec<u8>,
}

impl FileRecord {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The regular file holding the contents; equals `path` unless the key
    /// was a symlink.
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn link(&self) -> Option<&Path> {
        self.link.as_deref()
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    #[cfg(unix)]
    pub fn mode(&self) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        self.permissions.mode() & 0o7777
    }
}

/// Captured files keyed by absolute path, in the order they were requested.
/// Keys that did not exist at capture time are remembered as absent.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    keys: Vec<PathBuf>,
    records: BTreeMap<PathBuf, FileRecord>,
}

impl Snapshot {
    /// Read every existing file in `keys`. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns `FmtError::Io` when an existing file cannot be read or stat'ed.
    pub fn capture<I, P>(keys: I) -> Result<Self, FmtError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut snapshot = Self::default();
        for key in keys {
            let path = std::path::absolute(key.as_ref())
                .map_err(|source| FmtError::io("resolve", key.as_ref(), source))?;
            if snapshot.keys.contains(&path) {
                continue;
            }
            if let Some(record) = read_record(&path)? {
                snapshot.records.insert(path.clone(), record);
            } else {
                debug!(path = %path.display(), "absent at capture");
            }
            snapshot.keys.push(path);
        }
        debug!(
            captured = snapshot.records.len(),
            absent = snapshot.keys.len() - snapshot.records.len(),
            "snapshot taken"
        );
        Ok(snapshot)
    }

    /// Capture the same keys again.
    ///
    /// # Errors
    ///
    /// See [`Snapshot::capture`].
    pub fn recapture(&self) -> Result<Self, FmtError> {
        Self::capture(&self.keys)
    }

    pub fn keys(&self) -> &[PathBuf] {
        &self.keys
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.keys.iter().filter_map(|key| self.records.get(key))
    }

    pub fn absent(&self) -> impl Iterator<Item = &Path> {
        self.keys
            .iter()
            .filter(|key| !self.records.contains_key(*key))
            .map(PathBuf::as_path)
    }

    /// Number of files that existed at capture time.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write every captured file back with its captured permissions and
    /// delete files that were absent at capture time. Keeps going after a
    /// failure and reports all of them together.
    ///
    /// # Errors
    ///
    /// Returns a `RestoreError` listing every path that could not be restored.
    pub fn restore(&self) -> Result<(), RestoreError> {
        let mut failures = Vec::new();
        for key in &self.keys {
            let result = match self.records.get(key) {
                Some(record) => restore_record(record),
                None => remove_if_present(key),
            };
            match result {
                Ok(()) => debug!(path = %key.display(), "restored"),
                Err(source) => {
                    warn!(path = %key.display(), "failed to restore: {source}");
                    failures.push(RestoreFailure {
                        path: key.clone(),
                        source,
                    });
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RestoreError { failures })
        }
    }

    /// Restore after `cause` and fold any restore failures into it.
    pub(crate) fn rollback(&self, cause: FmtError) -> FmtError {
        warn!(files = self.keys.len(), "rolling back: {cause}");
        cause.with_restore(self.restore().err())
    }

    /// Compare against `current`: cardinality, disappearance, appearance and
    /// byte content.
    ///
    /// # Errors
    ///
    /// Returns `ChangeDetected` listing every differing file.
    pub fn verify(&self, current: &Snapshot) -> Result<(), ChangeDetected> {
        self.compare(current, true)
    }

    /// Like [`Snapshot::verify`] but ignores content; only the set of
    /// present files matters.
    ///
    /// # Errors
    ///
    /// Returns `ChangeDetected` when a file appeared or disappeared.
    pub fn verify_presence(&self, current: &Snapshot) -> Result<(), ChangeDetected> {
        self.compare(current, false)
    }

    fn compare(&self, current: &Snapshot, content: bool) -> Result<(), ChangeDetected> {
        let mut changes = Vec::new();
        let keys = self
            .keys
            .iter()
            .chain(current.keys.iter().filter(|key| !self.keys.contains(*key)));
        for key in keys {
            let kind = match (self.records.get(key), current.records.get(key)) {
                (Some(before), Some(after)) if content && before.contents != after.contents => {
                    ChangeKind::Modified
                }
                (Some(_), None) => ChangeKind::Missing,
                (None, Some(_)) => ChangeKind::Appeared,
                _ => continue,
            };
            changes.push(FileChange {
                key: key.clone(),
                kind,
            });
        }
        if changes.is_empty() && self.len() == current.len() {
            return Ok(());
        }
        Err(ChangeDetected {
            changes,
            captured: self.len(),
            current: current.len(),
        })
    }
}

fn read_record(path: &Path) -> Result<Option<FileRecord>, FmtError> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(FmtError::io("read", path, err)),
    };
    let permissions = match fs::metadata(path) {
        Ok(meta) => meta.permissions(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(FmtError::io("stat", path, err)),
    };
    let is_link = fs::symlink_metadata(path)
        .map_err(|err| FmtError::io("stat", path, err))?
        .file_type()
        .is_symlink();
    let (target, link) = if is_link {
        let link = fs::read_link(path).map_err(|err| FmtError::io("read link", path, err))?;
        let target = fs::canonicalize(path).map_err(|err| FmtError::io("resolve", path, err))?;
        (target, Some(link))
    } else {
        (path.to_path_buf(), None)
    };
    Ok(Some(FileRecord {
        path: path.to_path_buf(),
        target,
        link,
        permissions,
        contents,
    }))
}

fn restore_record(record: &FileRecord) -> io::Result<()> {
    write_file(&record.target, &record.contents, &record.permissions)?;
    let Some(link) = &record.link else {
        return Ok(());
    };
    if fs::read_link(&record.path).ok().as_deref() == Some(link.as_path()) {
        return Ok(());
    }
    remove_if_present(&record.path)?;
    relink(link, &record.path)
}

#[cfg(unix)]
fn relink(link: &Path, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, path)
}

#[cfg(not(unix))]
fn relink(link: &Path, path: &Path) -> io::Result<()> {
    let target = path.parent().unwrap_or_else(|| Path::new(".")).join(link);
    fs::copy(target, path).map(|_| ())
}

/// Replace the file behind `path` with `contents` and `permissions`.
///
/// Symlinks are followed so the link itself survives. A regular file is
/// replaced atomically unless other hard links share it, in which case it is
/// rewritten in place.
pub(crate) fn write_file(
    path: &Path,
    contents: &[u8],
    permissions: &Permissions,
) -> io::Result<()> {
    let path = &resolve_target(path)?;
    if has_other_links(path) {
        return overwrite_in_place(path, contents, permissions);
    }
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    staged.as_file().set_permissions(permissions.clone())?;
    staged.persist(path)?;
    Ok(())
}

fn resolve_target(path: &Path) -> io::Result<PathBuf> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => fs::canonicalize(path),
        _ => Ok(path.to_path_buf()),
    }
}

#[cfg(unix)]
fn has_other_links(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.nlink() > 1)
}

#[cfg(not(unix))]
fn has_other_links(_path: &Path) -> bool {
    false
}

fn overwrite_in_place(path: &Path, contents: &[u8], permissions: &Permissions) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    file.set_permissions(permissions.clone())
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed file created during the run");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
