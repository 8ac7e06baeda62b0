//! Prioritized data gathering with host-to-container fallback.
//!
//! Every probe needs the same control flow: try the command on the host,
//! then in the container, then any alternate tool, and record which source
//! answered. The [`Gatherer`] owns that loop so probes stay declarative.

use crate::host::{run_container, HostCommandRunner};
use anyhow::Result;
use log::debug;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Where a probe's data actually came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Host,
    Container,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Host => "host",
            DataSource::Container => "container",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful gather: the output, the command that produced it, and the
/// source that served it.
#[derive(Debug, Clone)]
pub struct Gathered {
    pub output: String,
    pub command: String,
    pub source: DataSource,
}

/// All attempts failed. Keeps every error for the probe's degradation
/// message; probes turn this into Warning/Unknown, never a crash.
#[derive(Debug)]
pub struct GatherError {
    pub attempts: Vec<String>,
}

impl fmt::Display for GatherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all data sources failed: {}", self.attempts.join("; "))
    }
}

impl std::error::Error for GatherError {}

pub struct Gatherer {
    host: Option<HostCommandRunner>,
    timeout: Duration,
}

impl Gatherer {
    pub fn new(host: Option<HostCommandRunner>, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    pub fn has_host_access(&self) -> bool {
        self.host.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one command, host first, container second.
    pub async fn command(&self, command: &str) -> Result<Gathered, GatherError> {
        self.command_with_alternates(command, &[]).await
    }

    /// Run a prioritized command list: the primary on the host, the primary
    /// in the container, then each alternate on host and container in turn.
    /// The first success wins.
    pub async fn command_with_alternates(
        &self,
        primary: &str,
        alternates: &[&str],
    ) -> Result<Gathered, GatherError> {
        let mut attempts = Vec::new();

        for command in std::iter::once(primary).chain(alternates.iter().copied()) {
            if let Some(host) = &self.host {
                match host.run(command, self.timeout).await {
                    Ok(output) => {
                        return Ok(Gathered {
                            output,
                            command: command.to_string(),
                            source: DataSource::Host,
                        })
                    }
                    Err(e) => {
                        debug!("host attempt failed for {:?}: {:#}", command, e);
                        attempts.push(format!("host:{}: {}", command, e));
                    }
                }
            } else {
                attempts.push(format!("host:{}: namespace entry unavailable", command));
            }

            match run_container(command, self.timeout).await {
                Ok(output) => {
                    return Ok(Gathered {
                        output,
                        command: command.to_string(),
                        source: DataSource::Container,
                    })
                }
                Err(e) => {
                    debug!("container attempt failed for {:?}: {:#}", command, e);
                    attempts.push(format!("container:{}: {}", command, e));
                }
            }
        }

        Err(GatherError { attempts })
    }

    /// Read a file such as `proc/loadavg`, preferring the host's view
    /// through the host root mount, falling back to the container's own.
    pub async fn read_file(&self, relative: &str) -> Result<Gathered, GatherError> {
        let mut attempts = Vec::new();

        if let Some(host) = &self.host {
            let path = host.host_root().join(relative);
            match tokio::fs::read_to_string(&path).await {
                Ok(output) => {
                    return Ok(Gathered {
                        output,
                        command: path.display().to_string(),
                        source: DataSource::Host,
                    })
                }
                Err(e) => attempts.push(format!("host:{}: {}", path.display(), e)),
            }
        } else {
            attempts.push(format!("host:/{}: namespace entry unavailable", relative));
        }

        let path = PathBuf::from("/").join(relative);
        match tokio::fs::read_to_string(&path).await {
            Ok(output) => Ok(Gathered {
                output,
                command: path.display().to_string(),
                source: DataSource::Container,
            }),
            Err(e) => {
                attempts.push(format!("container:{}: {}", path.display(), e));
                Err(GatherError { attempts })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn container_only() -> Gatherer {
        Gatherer::new(None, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn falls_back_to_container_when_host_unavailable() {
        let gathered = container_only().command("echo hello").await.unwrap();
        assert_eq!(gathered.source, DataSource::Container);
        assert!(gathered.output.contains("hello"));
        assert_eq!(gathered.command, "echo hello");
    }

    #[tokio::test]
    async fn alternates_are_tried_in_order() {
        let gathered = container_only()
            .command_with_alternates("definitely-missing-tool-xyz", &["echo alternate"])
            .await
            .unwrap();
        assert_eq!(gathered.command, "echo alternate");
    }

    #[tokio::test]
    async fn exhaustion_reports_every_attempt() {
        let err = container_only()
            .command_with_alternates("missing-tool-a-xyz", &["missing-tool-b-xyz"])
            .await
            .unwrap_err();
        // host + container per command
        assert_eq!(err.attempts.len(), 4);
        assert!(err.to_string().contains("missing-tool-a-xyz"));
        assert!(err.to_string().contains("missing-tool-b-xyz"));
    }

    #[tokio::test]
    async fn read_file_prefers_host_root() {
        let dir = tempfile::tempdir().unwrap();
        let proc_dir = dir.path().join("proc");
        std::fs::create_dir_all(&proc_dir).unwrap();
        let mut f = std::fs::File::create(proc_dir.join("loadavg")).unwrap();
        writeln!(f, "0.10 0.20 0.30 1/100 12345").unwrap();

        // A HostCommandRunner needs nsenter; construct only if present so
        // the test passes in minimal environments.
        if let Ok(host) = HostCommandRunner::new(dir.path()) {
            let gatherer = Gatherer::new(Some(host), Duration::from_secs(5));
            let gathered = gatherer.read_file("proc/loadavg").await.unwrap();
            assert_eq!(gathered.source, DataSource::Host);
            assert!(gathered.output.starts_with("0.10"));
        }
    }

    #[tokio::test]
    async fn read_file_falls_back_to_container_view() {
        let gathered = container_only().read_file("proc/loadavg").await;
        // /proc/loadavg exists on any Linux test runner
        if let Ok(g) = gathered {
            assert_eq!(g.source, DataSource::Container);
        }
    }
}
