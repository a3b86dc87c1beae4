#![allow(dead_code)]

use std::{
    fs, io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use assert_cmd::{assert::Assert, cargo::cargo_bin_cmd, Command};
use serde_json::Value;
use tempfile::TempDir;

pub const SORTED_GO_MOD: &str = "module example.com/sample\n\ngo 1.21\n\nrequire (\n\tgithub.com/a/a v1.0.0\n\tgithub.com/b/b v2.0.0\n)\n";
pub const SORTED_MAIN_GO: &str =
    "package main\n\nimport (\n\t\"fmt\"\n\t\"os\"\n)\n\nfunc main() { fmt.Println(os.Args) }\n";

pub const FAKE_GO_OK: &str =
    r#"[ "$1 $2" = "mod tidy" ] || { echo "unexpected arguments: $*" >&2; exit 3; }"#;

/// Lists unsorted .go files for `-l <dir>` and sorts import blocks in place
/// for `-w <files…>`. Writing fails for the prefix `example.com/does-not-exist`.
pub const FAKE_GOIMPORTS: &str = include_str!("../../../fixtures/tools/goimports.sh");

/// A copy of the sample module plus stand-in tools living beside it.
pub struct Sandbox {
    pub temp: TempDir,
    pub module: PathBuf,
    pub go: PathBuf,
    pub goimports: PathBuf,
}

impl Sandbox {
    pub fn new(prefix: &str) -> Self {
        Self::with_go(prefix, FAKE_GO_OK)
    }

    pub fn with_go(prefix: &str, go_body: &str) -> Self {
        let (temp, module) = prepare_fixture(prefix);
        let go = install_tool(temp.path(), "go", go_body);
        let goimports = install_tool(temp.path(), "goimports", FAKE_GOIMPORTS);
        Self {
            temp,
            module,
            go,
            goimports,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("gotidy");
        cmd.env("GOTIDY_GO", &self.go)
            .env("GOTIDY_GOIMPORTS", &self.goimports)
            .env_remove("GOTIDY_TOOL_TIMEOUT_SECS")
            .env_remove("GOTIDY_TIMINGS")
            .arg("--dir")
            .arg(&self.module);
        cmd
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.module.join(name)).expect("read module file")
    }
}

pub fn prepare_fixture(prefix: &str) -> (TempDir, PathBuf) {
    let temp = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("tempdir");
    let dst = temp.path().join("sample_go_module");
    copy_dir_all(&fixture_source(), &dst).expect("copy fixture");
    (temp, dst)
}

pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

pub fn fixture_source() -> PathBuf {
    workspace_root().join("fixtures").join("sample_go_module")
}

pub fn fixture_file(name: &str) -> String {
    fs::read_to_string(fixture_source().join(name)).expect("read fixture")
}

fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

fn install_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let bin = dir.join("bin");
    fs::create_dir_all(&bin).expect("bin dir");
    let path = bin.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write tool");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod tool");
    path
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}
