//! Running external tools.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::errors::{ClusterStageError, Result};

/// One invocation of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to run.
    pub program: String,
    /// Its arguments.
    pub args: Vec<String>,
    /// Working directory, if not the current one.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Renders the command line for logs.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs a command to completion and returns its standard output.
///
/// A non-zero exit is reported as [`ClusterStageError::Command`] carrying
/// the trimmed standard error. Failing to spawn the program at all is an
/// IO error.
pub async fn run_command(spec: &CommandSpec) -> Result<String> {
    debug!(command = %spec.display(), "Running command");

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    let output = command.output().await.map_err(|e| {
        std::io::Error::new(e.kind(), format!("failed to execute {}: {e}", spec.program))
    })?;

    if !output.status.success() {
        return Err(ClusterStageError::Command {
            program: spec.program.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Splits command output into trimmed, non-empty lines.
#[must_use]
pub fn non_empty_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let spec = CommandSpec::new("terraform").args(["apply", "-auto-approve"]);
        assert_eq!(spec.display(), "terraform apply -auto-approve");
    }

    #[test]
    fn test_non_empty_lines() {
        assert_eq!(
            non_empty_lines("us-east1-b\n\n  us-east1-c \n"),
            vec!["us-east1-b".to_string(), "us-east1-c".to_string()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_captures_stdout() {
        let out = run_command(&CommandSpec::new("echo").arg("hello")).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_maps_failure() {
        let spec = CommandSpec::new("sh").args(["-c", "echo broken >&2; exit 3"]);
        match run_command(&spec).await.unwrap_err() {
            ClusterStageError::Command { program, stderr, .. } => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let err = run_command(&CommandSpec::new("definitely-not-a-real-program-4646"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "io");
    }
}
