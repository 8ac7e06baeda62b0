//! System-level probes: load, CPU, memory, uptime, services, kernel log,
//! time synchronization.

use crate::evidence::BoundedEvidence;
use crate::gather::Gatherer;
use async_trait::async_trait;
use nodepulse_common::parse;
use nodepulse_common::{CheckCategory, CheckResult, CheckStatus};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::Executor;

const PROBES: &[&str] = &[
    "cpu_load",
    "cpu_usage",
    "memory",
    "uptime",
    "failed_services",
    "kernel_events",
    "time_sync",
];

pub struct SystemExecutor {
    gatherer: Arc<Gatherer>,
}

impl SystemExecutor {
    pub fn new(gatherer: Arc<Gatherer>) -> Self {
        Self { gatherer }
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    fn category(&self) -> CheckCategory {
        CheckCategory::System
    }

    fn probe_names(&self) -> &'static [&'static str] {
        PROBES
    }

    async fn probe(&self, name: &str) -> CheckResult {
        match name {
            "cpu_load" => self.check_cpu_load().await,
            "cpu_usage" => self.check_cpu_usage().await,
            "memory" => self.check_memory().await,
            "uptime" => self.check_uptime().await,
            "failed_services" => self.check_failed_services().await,
            "kernel_events" => self.check_kernel_events().await,
            "time_sync" => self.check_time_sync().await,
            other => CheckResult::unknown(format!("no such probe: {}", other), other),
        }
    }
}

impl SystemExecutor {
    async fn check_cpu_load(&self) -> CheckResult {
        let loadavg = match self.gatherer.read_file("proc/loadavg").await {
            Ok(g) => g,
            Err(e) => {
                return CheckResult::unknown(
                    format!("could not read loadavg: {}", e),
                    "/proc/loadavg",
                )
            }
        };

        let Some((load1, load5, load15)) = parse_loadavg(&loadavg.output) else {
            return CheckResult::warning("unexpected loadavg format", &loadavg.command)
                .with_detail("raw", loadavg.output.trim());
        };

        let cores = match self.core_count().await {
            Some(cores) => cores,
            None => {
                return CheckResult::unknown(
                    "could not determine core count for load classification",
                    &loadavg.command,
                )
                .with_detail("load1", load1)
            }
        };

        let status = classify_load(load1, cores);
        let message = match status {
            CheckStatus::Healthy => format!("load {:.2} on {} cores", load1, cores),
            _ => format!(
                "load {:.2} exceeds {} for {} cores",
                load1,
                if status == CheckStatus::Critical { "1.5x cores" } else { "0.75x cores" },
                cores
            ),
        };

        CheckResult::new(status, message, &loadavg.command)
            .with_detail("load1", load1)
            .with_detail("load5", load5)
            .with_detail("load15", load15)
            .with_detail("cores", cores as u64)
            .with_detail("source", loadavg.source.as_str())
    }

    async fn check_cpu_usage(&self) -> CheckResult {
        let first = match self.gatherer.read_file("proc/stat").await {
            Ok(g) => g,
            Err(e) => {
                return CheckResult::unknown(format!("could not read /proc/stat: {}", e), "/proc/stat")
            }
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        let second = match self.gatherer.read_file("proc/stat").await {
            Ok(g) => g,
            Err(e) => {
                return CheckResult::unknown(format!("could not read /proc/stat: {}", e), "/proc/stat")
            }
        };

        let busy = match (parse_cpu_times(&first.output), parse_cpu_times(&second.output)) {
            (Some(a), Some(b)) => busy_percent(a, b),
            _ => {
                return CheckResult::warning("unexpected /proc/stat format", &first.command)
                    .with_detail("raw", first.output.lines().next().unwrap_or("").to_string())
            }
        };

        let Some(busy) = busy else {
            return CheckResult::unknown("no CPU time elapsed between samples", &first.command);
        };

        let status = if busy >= 90.0 {
            CheckStatus::Critical
        } else if busy >= 75.0 {
            CheckStatus::Warning
        } else {
            CheckStatus::Healthy
        };

        CheckResult::new(status, format!("cpu {:.1}% busy", busy), &first.command)
            .with_detail("busy_percent", (busy * 10.0).round() / 10.0)
            .with_detail("source", first.source.as_str())
    }

    async fn check_memory(&self) -> CheckResult {
        let meminfo = match self.gatherer.read_file("proc/meminfo").await {
            Ok(g) => g,
            Err(e) => {
                return CheckResult::unknown(
                    format!("could not read meminfo: {}", e),
                    "/proc/meminfo",
                )
            }
        };

        let Some((total_kb, available_kb)) = parse_meminfo(&meminfo.output) else {
            return CheckResult::warning("unexpected meminfo format", &meminfo.command)
                .with_detail("raw", meminfo.output.lines().take(3).collect::<Vec<_>>().join("\n"));
        };

        let used_percent = 100.0 * (1.0 - available_kb as f64 / total_kb as f64);
        let status = if used_percent >= 95.0 {
            CheckStatus::Critical
        } else if used_percent >= 85.0 {
            CheckStatus::Warning
        } else {
            CheckStatus::Healthy
        };

        CheckResult::new(
            status,
            format!("memory {:.1}% used", used_percent),
            &meminfo.command,
        )
        .with_detail("total_kb", total_kb)
        .with_detail("available_kb", available_kb)
        .with_detail("used_percent", (used_percent * 10.0).round() / 10.0)
        .with_detail("source", meminfo.source.as_str())
    }

    async fn check_uptime(&self) -> CheckResult {
        let uptime = match self.gatherer.read_file("proc/uptime").await {
            Ok(g) => g,
            Err(e) => {
                return CheckResult::unknown(format!("could not read uptime: {}", e), "/proc/uptime")
            }
        };

        let Some(seconds) = uptime
            .output
            .split_whitespace()
            .next()
            .and_then(parse::parse_float)
        else {
            return CheckResult::warning("unexpected uptime format", &uptime.command)
                .with_detail("raw", uptime.output.trim());
        };

        // A node that just rebooted deserves attention even if everything
        // else currently reads healthy.
        let status = if seconds < 600.0 {
            CheckStatus::Warning
        } else {
            CheckStatus::Healthy
        };
        let message = if status == CheckStatus::Warning {
            format!("node rebooted {:.0} minutes ago", seconds / 60.0)
        } else {
            format!("up {:.1} days", seconds / 86400.0)
        };

        CheckResult::new(status, message, &uptime.command)
            .with_detail("uptime_seconds", seconds as u64)
            .with_detail("source", uptime.source.as_str())
    }

    async fn check_failed_services(&self) -> CheckResult {
        let command = "systemctl --failed --plain --no-legend";
        let gathered = match self.gatherer.command(command).await {
            Ok(g) => g,
            Err(e) => {
                // Not every node image runs systemd.
                return CheckResult::unknown("systemd not available on this node", command)
                    .with_detail("note", e.to_string());
            }
        };

        let failed = parse_failed_units(&gathered.output);
        if failed.is_empty() {
            return CheckResult::healthy("no failed systemd units", &gathered.command)
                .with_detail("source", gathered.source.as_str());
        }

        let shown: Vec<&str> = failed.iter().take(10).map(String::as_str).collect();
        CheckResult::warning(
            format!("{} failed systemd unit(s)", failed.len()),
            &gathered.command,
        )
        .with_detail("failed_count", failed.len() as u64)
        .with_detail("failed_units", json!(shown))
        .with_detail("source", gathered.source.as_str())
    }

    async fn check_kernel_events(&self) -> CheckResult {
        let gathered = match self
            .gatherer
            .command_with_alternates("journalctl -k -q --no-pager --since -24h", &["dmesg"])
            .await
        {
            Ok(g) => g,
            Err(e) => {
                return CheckResult::unknown("kernel log not readable", "journalctl -k")
                    .with_detail("note", e.to_string())
            }
        };

        let events = scan_kernel_log(&gathered.output);
        let status = if events.panics.count() > 0 {
            CheckStatus::Critical
        } else if events.oom.count() > 0 || events.fs_errors.count() > 0 {
            CheckStatus::Warning
        } else {
            CheckStatus::Healthy
        };

        let message = match status {
            CheckStatus::Healthy => "no panic/OOM/filesystem events in kernel log".to_string(),
            CheckStatus::Critical => format!("{} kernel panic event(s)", events.panics.count()),
            _ => format!(
                "{} OOM event(s), {} filesystem error(s)",
                events.oom.count(),
                events.fs_errors.count()
            ),
        };

        CheckResult::new(status, message, &gathered.command)
            .with_detail("panic_count", events.panics.count())
            .with_detail("oom_count", events.oom.count())
            .with_detail("fs_error_count", events.fs_errors.count())
            .with_detail("panic_samples", json!(events.panics.samples()))
            .with_detail("oom_samples", json!(events.oom.samples()))
            .with_detail("fs_error_samples", json!(events.fs_errors.samples()))
            .with_detail("source", gathered.source.as_str())
    }

    async fn check_time_sync(&self) -> CheckResult {
        let gathered = match self
            .gatherer
            .command_with_alternates("chronyc tracking", &["ntpq -pn", "timedatectl"])
            .await
        {
            Ok(g) => g,
            Err(e) => {
                return CheckResult::unknown("no time synchronization tool available", "chronyc tracking")
                    .with_detail("note", e.to_string())
            }
        };

        let verdict = if gathered.command.starts_with("chronyc") {
            parse_chronyc_tracking(&gathered.output)
        } else if gathered.command.starts_with("ntpq") {
            parse_ntpq_peers(&gathered.output)
        } else {
            parse_timedatectl(&gathered.output)
        };

        let mut result = match verdict {
            TimeSyncVerdict::Synchronized { offset_seconds } => {
                let mut r = CheckResult::healthy("clock synchronized", &gathered.command);
                if let Some(offset) = offset_seconds {
                    if offset.abs() > 1.0 {
                        r = CheckResult::warning(
                            format!("clock offset {:.3}s exceeds 1s", offset),
                            &gathered.command,
                        );
                    }
                    r = r.with_detail("offset_seconds", offset);
                }
                r
            }
            TimeSyncVerdict::Unsynchronized => {
                CheckResult::warning("clock not synchronized", &gathered.command)
            }
            TimeSyncVerdict::Indeterminate => {
                CheckResult::unknown("could not determine clock sync state", &gathered.command)
                    .with_detail("raw", gathered.output.lines().take(5).collect::<Vec<_>>().join("\n"))
            }
        };
        result = result.with_detail("source", gathered.source.as_str());
        result
    }

    async fn core_count(&self) -> Option<usize> {
        let stat = self.gatherer.read_file("proc/stat").await.ok()?;
        let count = stat
            .output
            .lines()
            .filter(|line| {
                line.starts_with("cpu")
                    && line
                        .as_bytes()
                        .get(3)
                        .is_some_and(|b| b.is_ascii_digit())
            })
            .count();
        if count == 0 {
            None
        } else {
            Some(count)
        }
    }
}

/// Load classification scales with core count: transient load on a large
/// box is not the same signal as the same number on a small one.
pub fn classify_load(load1: f64, cores: usize) -> CheckStatus {
    let cores = cores as f64;
    if load1 <= 0.75 * cores {
        CheckStatus::Healthy
    } else if load1 <= 1.5 * cores {
        CheckStatus::Warning
    } else {
        CheckStatus::Critical
    }
}

pub fn parse_loadavg(output: &str) -> Option<(f64, f64, f64)> {
    let cols = parse::columns(output.trim(), 3)?;
    Some((
        parse::parse_float(cols[0])?,
        parse::parse_float(cols[1])?,
        parse::parse_float(cols[2])?,
    ))
}

/// (busy, total) jiffies from the aggregate `cpu` line of /proc/stat.
fn parse_cpu_times(output: &str) -> Option<(u64, u64)> {
    let line = output.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 5 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0); // idle + iowait
    Some((total - idle, total))
}

fn busy_percent(first: (u64, u64), second: (u64, u64)) -> Option<f64> {
    let busy_delta = second.0.saturating_sub(first.0);
    let total_delta = second.1.saturating_sub(first.1);
    if total_delta == 0 {
        None
    } else {
        Some(100.0 * busy_delta as f64 / total_delta as f64)
    }
}

fn parse_meminfo(output: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;
    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = rest.split_whitespace().next().and_then(|v| v.parse().ok());
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = rest.split_whitespace().next().and_then(|v| v.parse().ok());
        }
    }
    match (total, available) {
        (Some(t), Some(a)) if t > 0 => Some((t, a)),
        _ => None,
    }
}

fn parse_failed_units(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let cols = parse::columns(line, 2)?;
            let unit = cols[0];
            // `systemctl --failed` with no failures prints a summary line.
            if unit.contains('.') {
                Some(unit.to_string())
            } else {
                None
            }
        })
        .collect()
}

pub struct KernelEvents {
    pub panics: BoundedEvidence,
    pub oom: BoundedEvidence,
    pub fs_errors: BoundedEvidence,
}

pub fn scan_kernel_log(output: &str) -> KernelEvents {
    let mut panics = BoundedEvidence::new();
    let mut oom = BoundedEvidence::new();
    let mut fs_errors = BoundedEvidence::new();

    for line in output.lines() {
        let lower = line.to_ascii_lowercase();
        if lower.contains("kernel panic") {
            panics.record(line);
        } else if lower.contains("out of memory")
            || lower.contains("oom-kill")
            || lower.contains("invoked oom-killer")
        {
            oom.record(line);
        } else if line.contains("EXT4-fs error")
            || line.contains("XFS") && lower.contains("error")
            || lower.contains("i/o error")
        {
            fs_errors.record(line);
        }
    }

    KernelEvents {
        panics,
        oom,
        fs_errors,
    }
}

enum TimeSyncVerdict {
    Synchronized { offset_seconds: Option<f64> },
    Unsynchronized,
    Indeterminate,
}

fn parse_chronyc_tracking(output: &str) -> TimeSyncVerdict {
    let mut leap_normal = None;
    let mut offset = None;
    for line in output.lines() {
        if let Some(rest) = line.split_once(':').filter(|(k, _)| k.trim() == "Leap status") {
            leap_normal = Some(rest.1.trim() == "Normal");
        }
        if let Some((key, value)) = line.split_once(':') {
            if key.trim() == "System time" {
                // "0.000031415 seconds slow of NTP time"
                let cols: Vec<&str> = value.split_whitespace().collect();
                if cols.len() >= 3 {
                    let magnitude = parse::parse_float(cols[0]);
                    let sign = if cols[2] == "slow" { -1.0 } else { 1.0 };
                    offset = magnitude.map(|m| m * sign);
                }
            }
        }
    }
    match leap_normal {
        Some(true) => TimeSyncVerdict::Synchronized {
            offset_seconds: offset,
        },
        Some(false) => TimeSyncVerdict::Unsynchronized,
        None => TimeSyncVerdict::Indeterminate,
    }
}

fn parse_ntpq_peers(output: &str) -> TimeSyncVerdict {
    let mut saw_peers = false;
    for line in output.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('*') {
            // selected sync peer; offset column is milliseconds
            let offset = parse::columns(trimmed, 9)
                .and_then(|cols| parse::parse_float(cols[8]))
                .map(|ms| ms / 1000.0);
            return TimeSyncVerdict::Synchronized {
                offset_seconds: offset,
            };
        }
        if trimmed.starts_with('+') || trimmed.starts_with('-') || trimmed.starts_with('#') {
            saw_peers = true;
        }
    }
    if saw_peers {
        TimeSyncVerdict::Unsynchronized
    } else {
        TimeSyncVerdict::Indeterminate
    }
}

fn parse_timedatectl(output: &str) -> TimeSyncVerdict {
    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim() == "System clock synchronized" {
                return if value.trim() == "yes" {
                    TimeSyncVerdict::Synchronized {
                        offset_seconds: None,
                    }
                } else {
                    TimeSyncVerdict::Unsynchronized
                };
            }
        }
    }
    TimeSyncVerdict::Indeterminate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_classification_scales_with_cores() {
        // 4-core boundaries from the classification policy
        assert_eq!(classify_load(2.9, 4), CheckStatus::Healthy);
        assert_eq!(classify_load(3.0, 4), CheckStatus::Healthy);
        assert_eq!(classify_load(3.1, 4), CheckStatus::Warning);
        assert_eq!(classify_load(6.0, 4), CheckStatus::Warning);
        assert_eq!(classify_load(6.1, 4), CheckStatus::Critical);
        // single core
        assert_eq!(classify_load(0.7, 1), CheckStatus::Healthy);
        assert_eq!(classify_load(1.2, 1), CheckStatus::Warning);
        assert_eq!(classify_load(2.0, 1), CheckStatus::Critical);
    }

    #[test]
    fn loadavg_parses_and_rejects() {
        assert_eq!(
            parse_loadavg("0.52 0.58 0.59 1/467 1123\n"),
            Some((0.52, 0.58, 0.59))
        );
        assert!(parse_loadavg("garbage").is_none());
        assert!(parse_loadavg("0.5").is_none());
    }

    #[test]
    fn cpu_times_from_proc_stat() {
        let stat = "cpu  100 0 100 700 100 0 0 0 0 0\ncpu0 50 0 50 350 50 0 0 0 0 0\n";
        let (busy, total) = parse_cpu_times(stat).unwrap();
        assert_eq!(total, 1000);
        assert_eq!(busy, 200); // total - idle - iowait
    }

    #[test]
    fn busy_percent_between_samples() {
        let first = (200, 1000);
        let second = (500, 2000);
        assert_eq!(busy_percent(first, second), Some(30.0));
        assert_eq!(busy_percent(first, first), None);
    }

    #[test]
    fn meminfo_extracts_total_and_available() {
        let meminfo = "MemTotal:       16384000 kB\nMemFree:         1000000 kB\nMemAvailable:    8192000 kB\n";
        assert_eq!(parse_meminfo(meminfo), Some((16384000, 8192000)));
        assert!(parse_meminfo("MemFree: 12 kB\n").is_none());
    }

    #[test]
    fn failed_units_parse_and_skip_summaries() {
        let output = "nginx.service loaded failed failed nginx server\n\
                      kdump.service loaded failed failed Crash recovery\n\
                      0 loaded units listed.\n";
        let failed = parse_failed_units(output);
        assert_eq!(failed, vec!["nginx.service", "kdump.service"]);
        assert!(parse_failed_units("").is_empty());
    }

    #[test]
    fn kernel_log_scan_classifies_and_bounds() {
        let mut log = String::new();
        log.push_str("[1.0] Kernel panic - not syncing: fatal\n");
        for _ in 0..25 {
            log.push_str("[2.0] frob invoked oom-killer: gfp_mask=0x0\n");
        }
        log.push_str("[3.0] EXT4-fs error (device sda1): htree corrupt\n");
        let events = scan_kernel_log(&log);
        assert_eq!(events.panics.count(), 1);
        assert_eq!(events.oom.count(), 25);
        assert_eq!(events.oom.samples().len(), 1); // identical lines dedupe
        assert_eq!(events.fs_errors.count(), 1);
    }

    #[test]
    fn chronyc_tracking_normal() {
        let output = "Reference ID    : C0A80001 (gateway)\n\
                      Leap status     : Normal\n\
                      System time     : 0.000031415 seconds slow of NTP time\n";
        match parse_chronyc_tracking(output) {
            TimeSyncVerdict::Synchronized { offset_seconds } => {
                assert!(offset_seconds.unwrap() < 0.0);
            }
            _ => panic!("expected synchronized"),
        }
    }

    #[test]
    fn chronyc_tracking_unsynchronized() {
        let output = "Leap status     : Not synchronised\n";
        assert!(matches!(
            parse_chronyc_tracking(output),
            TimeSyncVerdict::Unsynchronized
        ));
    }

    #[test]
    fn ntpq_selected_peer_means_synced() {
        let output = "     remote           refid      st t when poll reach   delay   offset  jitter\n\
                      *10.0.0.1        .GPS.            1 u   33   64  377    0.321    0.512   0.100\n";
        assert!(matches!(
            parse_ntpq_peers(output),
            TimeSyncVerdict::Synchronized { .. }
        ));
    }

    #[test]
    fn timedatectl_fallback() {
        assert!(matches!(
            parse_timedatectl("System clock synchronized: yes\nNTP service: active\n"),
            TimeSyncVerdict::Synchronized { .. }
        ));
        assert!(matches!(
            parse_timedatectl("System clock synchronized: no\n"),
            TimeSyncVerdict::Unsynchronized
        ));
        assert!(matches!(
            parse_timedatectl("no such field"),
            TimeSyncVerdict::Indeterminate
        ));
    }
}
