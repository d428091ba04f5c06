//! Command helpers for CLI integration tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// chunkstore invocation bound to one data directory
pub struct StoreCommand {
    data_dir: PathBuf,
    config: Option<PathBuf>,
}

/// Captured result of one invocation
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub raw_stdout: Vec<u8>,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl StoreCommand {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: impl AsRef<Path>) -> Self {
        self.config = Some(config.as_ref().to_path_buf());
        self
    }

    pub fn execute(&self, args: &[&str]) -> CommandResult {
        let mut command = Command::new(env!("CARGO_BIN_EXE_chunkstore"));
        command.arg("--data-dir").arg(&self.data_dir);
        if let Some(config) = &self.config {
            command.arg("--config").arg(config);
        }
        let output: Output = command.args(args).output().expect("failed to run chunkstore");

        CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            raw_stdout: output.stdout,
            exit_code: output.status.code().unwrap_or(-1),
        }
    }

    /// Execute and assert success
    pub fn assert_success(&self, args: &[&str]) -> CommandResult {
        let result = self.execute(args);
        assert!(
            result.success(),
            "chunkstore {:?} failed (exit code {}):\nstdout: {}\nstderr: {}",
            args,
            result.exit_code,
            result.stdout,
            result.stderr
        );
        result
    }

    /// Execute and expect failure
    pub fn assert_failure(&self, args: &[&str]) -> CommandResult {
        let result = self.execute(args);
        assert!(
            !result.success(),
            "chunkstore {:?} should have failed:\nstdout: {}",
            args,
            result.stdout
        );
        result
    }
}

/// Remove ANSI color sequences
pub fn strip_ansi(text: &str) -> String {
    let mut plain = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            // skip through the final byte of the sequence
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            plain.push(c);
        }
    }
    plain
}

/// First number printed on the stats line starting with `label`
pub fn stat(stdout: &str, label: &str) -> Option<i64> {
    strip_ansi(stdout)
        .lines()
        .find(|line| line.trim_start().starts_with(label))?
        .split_whitespace()
        .find_map(|word| word.parse().ok())
}
