use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

/// Stand-in for goimports: `-l <dir>` lists .go files whose import block is
/// not sorted, `-w <files…>` sorts the lines of each import block and drops
/// blank ones. Writing fails for the prefix `example.com/does-not-exist`.
pub(crate) const FAKE_GOIMPORTS: &str = include_str!("../../../fixtures/tools/goimports.sh");

/// Write an executable `/bin/sh` script named `name` under `dir/bin`.
pub(crate) fn install_tool(dir: &Path, name: &str, body: &str) -> String {
    let bin = dir.join("bin");
    fs::create_dir_all(&bin).expect("bin dir");
    let path = bin.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write tool");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod tool");
    path.to_string_lossy().into_owned()
}

pub(crate) fn install_goimports(dir: &Path) -> String {
    install_tool(dir, "goimports", FAKE_GOIMPORTS)
}

pub(crate) fn write_files(root: &Path, files: &[(&str, &str)]) -> Vec<PathBuf> {
    files
        .iter()
        .map(|(name, contents)| {
            let path = root.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("parent dir");
            }
            fs::write(&path, contents).expect("write file");
            path
        })
        .collect()
}
