//! Host namespace command execution.
//!
//! The agent runs in a container but diagnoses the physical host, so host
//! commands are spawned through `nsenter` against PID 1. This is an OS
//! process boundary on purpose: command, args, deadline, captured output.
//! Fallback policy (retry in-container, degrade) belongs to callers.

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Executes commands inside the host's mount/UTS/IPC/net/PID namespaces.
pub struct HostCommandRunner {
    nsenter: PathBuf,
    host_root: PathBuf,
}

impl HostCommandRunner {
    /// Resolve `nsenter` and verify the host root mount. Either missing is
    /// an immediate, descriptive failure; callers decide whether to fall
    /// back to in-container execution.
    pub fn new(host_root: impl Into<PathBuf>) -> Result<Self> {
        let host_root = host_root.into();
        let nsenter = resolve_binary("nsenter")
            .ok_or_else(|| anyhow!("nsenter not found in PATH; host namespace entry unavailable"))?;
        if !host_root.is_dir() {
            bail!(
                "host root mount {} does not exist; is the hostPath volume mounted?",
                host_root.display()
            );
        }
        Ok(Self { nsenter, host_root })
    }

    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    /// Run `command` through `sh -c` inside the host namespaces, bounded by
    /// `timeout`. Returns combined stdout+stderr; a non-zero exit or an
    /// elapsed deadline is an error carrying whatever output was captured.
    pub async fn run(&self, command: &str, timeout: Duration) -> Result<String> {
        let child = Command::new(&self.nsenter)
            .args(["-t", "1", "-m", "-u", "-i", "-n", "-p", "--", "sh", "-c", command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| anyhow!("host command timed out after {:?}: {}", timeout, command))?
            .with_context(|| format!("failed to spawn nsenter for: {}", command))?;

        let combined = combine_output(&output.stdout, &output.stderr);
        if output.status.success() {
            Ok(combined)
        } else {
            Err(anyhow!(
                "host command exited with {}: {}\n{}",
                output.status,
                command,
                combined.trim()
            ))
        }
    }
}

/// Run `command` through `sh -c` in the agent's own container, bounded by
/// `timeout`. Same output contract as [`HostCommandRunner::run`].
pub async fn run_container(command: &str, timeout: Duration) -> Result<String> {
    let child = Command::new("sh")
        .args(["-c", command])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| anyhow!("command timed out after {:?}: {}", timeout, command))?
        .with_context(|| format!("failed to spawn: {}", command))?;

    let combined = combine_output(&output.stdout, &output.stderr);
    if output.status.success() {
        Ok(combined)
    } else {
        Err(anyhow!(
            "command exited with {}: {}\n{}",
            output.status,
            command,
            combined.trim()
        ))
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&String::from_utf8_lossy(stderr));
    }
    combined
}

fn resolve_binary(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_host_root_is_a_descriptive_error() {
        // nsenter may or may not exist in the test environment; a bogus host
        // root must fail either way.
        let err = HostCommandRunner::new("/definitely/not/mounted")
            .err()
            .expect("construction must fail");
        let msg = err.to_string();
        assert!(msg.contains("does not exist") || msg.contains("nsenter"));
    }

    #[tokio::test]
    async fn container_command_captures_stdout_and_stderr() {
        let out = run_container("echo one; echo two >&2", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.contains("one"));
        assert!(out.contains("two"));
    }

    #[tokio::test]
    async fn container_command_failure_keeps_output() {
        let err = run_container("echo partial; exit 3", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("partial"));
    }

    #[tokio::test]
    async fn container_command_times_out() {
        let err = run_container("sleep 5", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn combine_output_joins_streams() {
        assert_eq!(combine_output(b"a\n", b"b\n"), "a\nb\n");
        assert_eq!(combine_output(b"a", b"b"), "a\nb");
        assert_eq!(combine_output(b"", b"err"), "err");
    }
}
