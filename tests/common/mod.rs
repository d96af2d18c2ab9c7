//! Common test utilities for plancanvas integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch the
//! user's `~/.local/share/plancanvas/` directory or system config.

#![allow(dead_code)]

use assert_cmd::Command;
pub use tempfile::TempDir;

/// A test environment with isolated data storage.
///
/// Each `TestEnv` creates two temporary directories:
/// - `data_dir`: Holds the store, backups and config (via `PLANCANVAS_DATA_DIR`)
/// - `home_dir`: Stands in for `$HOME` so no real system config is read
///
/// Environment is set per-command, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub home_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            home_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the pc binary with no caller identity.
    pub fn pc(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_pc"));
        cmd.env("PLANCANVAS_DATA_DIR", self.data_dir.path());
        cmd.env("HOME", self.home_dir.path());
        cmd.env("XDG_CONFIG_HOME", self.home_dir.path().join(".config"));
        cmd.env_remove("PLANCANVAS_USER");
        cmd.env_remove("PLANCANVAS_EMAIL");
        cmd.env_remove("PLANCANVAS_CANVAS");
        cmd.env_remove("PLANCANVAS_LOG");
        cmd
    }

    /// Get a Command for the pc binary authenticated as `user`.
    ///
    /// The caller's email is `<user>@example.com`.
    pub fn pc_as(&self, user: &str) -> Command {
        let mut cmd = self.pc();
        cmd.env("PLANCANVAS_USER", user);
        cmd.env("PLANCANVAS_EMAIL", format!("{}@example.com", user));
        cmd
    }

    /// Get the path to the data directory.
    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a successful command's stdout as JSON.
pub fn parse_json(output: &std::process::Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("Invalid JSON output")
}

/// Run `args` as `user` and return the parsed JSON output.
pub fn run_json(env: &TestEnv, user: &str, args: &[&str]) -> serde_json::Value {
    let output = env.pc_as(user).args(args).output().expect("Failed to run pc");
    parse_json(&output)
}

/// Add a block as `user` with a fixed id.
pub fn add_node(env: &TestEnv, user: &str, id: &str, kind: &str, title: &str) {
    run_json(
        env,
        user,
        &["node", "add", "--id", id, "--kind", kind, "--title", title],
    );
}
