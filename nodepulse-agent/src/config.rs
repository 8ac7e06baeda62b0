//! Agent configuration from environment variables (set by the DaemonSet).

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_INTERVAL_SECS: u64 = 60;
const DEFAULT_HOST_ROOT: &str = "/host";
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Node this agent observes. Injected via the downward API.
    pub node_name: String,
    /// Pause between check cycles.
    pub interval: Duration,
    /// Where the host filesystem is mounted inside the container.
    pub host_root: PathBuf,
    /// Bound on concurrently running probes.
    pub workers: usize,
    /// Per-probe deadline.
    pub probe_timeout: Duration,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let node_name = match env::var("NODE_NAME") {
            Ok(name) if !name.is_empty() => name,
            _ => hostname::get()
                .context("NODE_NAME unset and hostname lookup failed")?
                .to_string_lossy()
                .into_owned(),
        };

        Ok(Self {
            node_name,
            interval: Duration::from_secs(parse_env("NODEPULSE_INTERVAL_SECS", DEFAULT_INTERVAL_SECS)?),
            host_root: PathBuf::from(
                env::var("HOST_ROOT").unwrap_or_else(|_| DEFAULT_HOST_ROOT.to_string()),
            ),
            workers: parse_env("NODEPULSE_WORKERS", DEFAULT_WORKERS)?,
            probe_timeout: Duration::from_secs(parse_env(
                "PROBE_TIMEOUT_SECS",
                DEFAULT_PROBE_TIMEOUT_SECS,
            )?),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parsing_uses_default_when_unset() {
        assert_eq!(parse_env("NODEPULSE_TEST_UNSET_VAR", 42u64).unwrap(), 42);
    }

    #[test]
    fn env_parsing_rejects_garbage() {
        std::env::set_var("NODEPULSE_TEST_GARBAGE_VAR", "not-a-number");
        assert!(parse_env("NODEPULSE_TEST_GARBAGE_VAR", 42u64).is_err());
        std::env::remove_var("NODEPULSE_TEST_GARBAGE_VAR");
    }
}
