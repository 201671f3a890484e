//! Shared test helpers for miniapp-merge integration tests.
//!
//! Every test builds its trees inside its own temp directory; nothing touches
//! the working directory.

#![allow(dead_code)]

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use miniapp_merge::{MergeConfig, MergeOptions};
use tempfile::TempDir;

/// Minimal entry script the patcher accepts.
pub const PRIMARY_APP_JS: &str = "App({\n  onLaunch() {\n    console.log('primary');\n  }\n});\n";

/// A project layout: `src/` (sources), `dist/` (primary output), `out/`
/// (merge target) and `secondary/` (overlay tree, only used when populated).
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn input(&self) -> PathBuf {
        self.root().join("src")
    }

    pub fn output(&self) -> PathBuf {
        self.root().join("dist")
    }

    pub fn target(&self) -> PathBuf {
        self.root().join("out")
    }

    pub fn secondary(&self) -> PathBuf {
        self.root().join("secondary")
    }

    /// Write `content` to `dist/<rel>`.
    pub fn write_output(&self, rel: &str, content: &str) -> PathBuf {
        write(&self.output().join(rel), content)
    }

    /// Write `content` to `secondary/<rel>`.
    pub fn write_secondary(&self, rel: &str, content: &str) -> PathBuf {
        write(&self.secondary().join(rel), content)
    }

    /// Write `content` to `out/<rel>`, e.g. to stage a secondary manifest.
    pub fn write_target(&self, rel: &str, content: &str) -> PathBuf {
        write(&self.target().join(rel), content)
    }

    /// Write an arbitrary file relative to the fixture root.
    pub fn write_root(&self, rel: &str, content: &str) -> PathBuf {
        write(&self.root().join(rel), content)
    }

    /// Read `out/<rel>`, or `None` if it does not exist.
    pub fn read_target(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.target().join(rel)).ok()
    }

    /// Parse `out/<rel>` as JSON.
    pub fn read_target_json(&self, rel: &str) -> serde_json::Value {
        let raw = self
            .read_target(rel)
            .unwrap_or_else(|| panic!("out/{rel} missing"));
        serde_json::from_str(&raw).expect("target manifest is not JSON")
    }

    /// Config pointing at this fixture's trees, without an overlay.
    pub fn config(&self) -> MergeConfig {
        MergeConfig {
            input: self.input(),
            output: self.output(),
            target: self.target(),
            ..MergeConfig::default()
        }
    }

    /// Config with the `secondary/` tree as overlay.
    pub fn config_with_overlay(&self) -> MergeConfig {
        MergeConfig {
            copy_dir: Some(self.secondary()),
            ..self.config()
        }
    }

    pub fn options(&self) -> MergeOptions {
        MergeOptions::new(self.config()).expect("fixture config is valid")
    }

    /// Write a `miniapp-merge.toml` for the CLI.
    pub fn write_config_file(&self, extra: &str) -> PathBuf {
        let toml = format!(
            "input = {:?}\noutput = {:?}\ntarget = {:?}\n{extra}",
            self.input(),
            self.output(),
            self.target(),
        );
        self.write_root(miniapp_merge::config::CONFIG_FILE, &toml)
    }

    /// Write a `miniapp-merge.toml` whose trees are relative to the root.
    pub fn write_relative_config_file(&self, extra: &str) -> PathBuf {
        let toml = format!("input = \"src\"\noutput = \"dist\"\ntarget = \"out\"\n{extra}");
        self.write_root(miniapp_merge::config::CONFIG_FILE, &toml)
    }

    /// A populated primary tree with a valid entry script.
    pub fn with_primary_build(self) -> Self {
        self.write_output("app.js", PRIMARY_APP_JS);
        self.write_output("app.json", r#"{"pages":["pages/index/index"]}"#);
        self.write_output("app.wxss", "page { color: red; }");
        self.write_output("pages/index/index.js", "Page({});");
        self.write_output("pages/index/index.wxml", "<view>index</view>");
        self
    }
}

fn write(path: &Path, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
    path.to_owned()
}

/// Run the `miniapp-merge` binary in `dir`.
pub fn merge_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_miniapp-merge"))
        .args(args)
        .current_dir(dir)
        .env("MINIAPP_MERGE_LOG", "off")
        .output()
        .expect("failed to execute miniapp-merge")
}

/// Run `miniapp-merge` and assert it succeeds; return stdout.
pub fn merge_ok(dir: &Path, args: &[&str]) -> String {
    let out = merge_in(dir, args);
    assert!(
        out.status.success(),
        "miniapp-merge {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

/// Run `miniapp-merge` and assert it fails; return stderr.
pub fn merge_fails(dir: &Path, args: &[&str]) -> String {
    let out = merge_in(dir, args);
    assert!(
        !out.status.success(),
        "miniapp-merge {} unexpectedly succeeded",
        args.join(" ")
    );
    String::from_utf8_lossy(&out.stderr).into_owned()
}

/// Run `miniapp-merge watch` in `dir`, feed it `lines` on stdin, close stdin
/// and wait for it to exit.
pub fn watch_in(dir: &Path, lines: &[String]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_miniapp-merge"))
        .arg("watch")
        .current_dir(dir)
        .env("MINIAPP_MERGE_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn miniapp-merge watch");
    {
        let mut stdin = child.stdin.take().expect("stdin is piped");
        for line in lines {
            writeln!(stdin, "{line}").expect("failed to write notification");
        }
    }
    child.wait_with_output().expect("failed to wait for miniapp-merge")
}
