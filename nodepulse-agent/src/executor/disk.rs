//! Storage probes: filesystem/inode usage, SMART health, I/O latency,
//! software RAID, LVM capacity.

use crate::gather::Gatherer;
use async_trait::async_trait;
use nodepulse_common::parse;
use nodepulse_common::{CheckCategory, CheckResult, CheckStatus};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use super::Executor;

const PROBES: &[&str] = &[
    "filesystem_usage",
    "inode_usage",
    "smart_health",
    "io_latency",
    "raid",
    "lvm",
];

/// Pseudo-filesystems excluded from usage scans.
const DF_EXCLUDES: &str = "-x tmpfs -x devtmpfs -x overlay -x squashfs";

/// Volume groups and physical volumes below this free fraction warn.
/// Empirically tuned; keep literal.
const LVM_FREE_WARN_FRACTION: f64 = 0.05;

pub struct DiskExecutor {
    gatherer: Arc<Gatherer>,
}

impl DiskExecutor {
    pub fn new(gatherer: Arc<Gatherer>) -> Self {
        Self { gatherer }
    }
}

#[async_trait]
impl Executor for DiskExecutor {
    fn category(&self) -> CheckCategory {
        CheckCategory::Disk
    }

    fn probe_names(&self) -> &'static [&'static str] {
        PROBES
    }

    async fn probe(&self, name: &str) -> CheckResult {
        match name {
            "filesystem_usage" => self.check_filesystem_usage().await,
            "inode_usage" => self.check_inode_usage().await,
            "smart_health" => self.check_smart_health().await,
            "io_latency" => self.check_io_latency().await,
            "raid" => self.check_raid().await,
            "lvm" => self.check_lvm().await,
            other => CheckResult::unknown(format!("no such probe: {}", other), other),
        }
    }
}

impl DiskExecutor {
    async fn check_filesystem_usage(&self) -> CheckResult {
        let command = format!("df -P {}", DF_EXCLUDES);
        let gathered = match self.gatherer.command(&command).await {
            Ok(g) => g,
            Err(e) => return CheckResult::unknown(format!("df unavailable: {}", e), command),
        };

        let mounts = parse_df(&gathered.output);
        if mounts.is_empty() {
            return CheckResult::warning("no mounts parsed from df output", &gathered.command)
                .with_detail("raw", truncate_raw(&gathered.output));
        }
        usage_result(&gathered.command, gathered.source.as_str(), &mounts, "use")
    }

    async fn check_inode_usage(&self) -> CheckResult {
        let command = format!("df -Pi {}", DF_EXCLUDES);
        let gathered = match self.gatherer.command(&command).await {
            Ok(g) => g,
            Err(e) => return CheckResult::unknown(format!("df unavailable: {}", e), command),
        };

        // Filesystems without inode accounting report "-" and are skipped.
        let mounts = parse_df(&gathered.output);
        if mounts.is_empty() {
            return CheckResult::healthy(
                "no filesystems report inode accounting",
                &gathered.command,
            )
            .with_detail("source", gathered.source.as_str());
        }
        usage_result(&gathered.command, gathered.source.as_str(), &mounts, "inode")
    }

    async fn check_smart_health(&self) -> CheckResult {
        let disks = match self.gatherer.command("lsblk -dno NAME,TYPE").await {
            Ok(g) => parse_lsblk_disks(&g.output),
            Err(e) => {
                return CheckResult::unknown(format!("lsblk unavailable: {}", e), "lsblk -dno NAME,TYPE")
            }
        };
        if disks.is_empty() {
            return CheckResult::unknown("no physical disks found", "lsblk -dno NAME,TYPE");
        }

        let mut failed = Vec::new();
        let mut passed = Vec::new();
        let mut unavailable = 0usize;
        for disk in &disks {
            let command = format!("smartctl -H /dev/{}", disk);
            match self.gatherer.command(&command).await {
                Ok(g) => match parse_smart_health(&g.output) {
                    Some(true) => passed.push(disk.clone()),
                    Some(false) => failed.push(disk.clone()),
                    None => unavailable += 1,
                },
                Err(_) => unavailable += 1,
            }
        }

        let command = "smartctl -H";
        if !failed.is_empty() {
            return CheckResult::critical(
                format!("SMART failure predicted on: {}", failed.join(", ")),
                command,
            )
            .with_detail("failed", json!(failed))
            .with_detail("passed", json!(passed));
        }
        if passed.is_empty() {
            return CheckResult::unknown(
                "smartctl not available or no disk reported SMART health",
                command,
            )
            .with_detail("disks", json!(disks))
            .with_detail("unavailable", unavailable as u64);
        }
        CheckResult::healthy(
            format!("SMART passed on {} disk(s)", passed.len()),
            command,
        )
        .with_detail("passed", json!(passed))
        .with_detail("unavailable", unavailable as u64)
    }

    async fn check_io_latency(&self) -> CheckResult {
        let command = "iostat -x 1 2";
        let gathered = match self.gatherer.command(command).await {
            Ok(g) => g,
            Err(e) => {
                return CheckResult::unknown("iostat not available on this node", command)
                    .with_detail("note", e.to_string())
            }
        };

        let devices = parse_iostat(&gathered.output);
        if devices.is_empty() {
            return CheckResult::warning("no devices parsed from iostat output", &gathered.command)
                .with_detail("raw", truncate_raw(&gathered.output));
        }

        // Device class from lsblk's rotational flag; name heuristic as
        // fallback when lsblk is missing.
        let rota = match self.gatherer.command("lsblk -dno NAME,ROTA").await {
            Ok(g) => parse_lsblk_rota(&g.output),
            Err(_) => HashMap::new(),
        };

        let mut status = CheckStatus::Healthy;
        let mut reasons = Vec::new();
        let mut detail_rows = Vec::new();
        for device in &devices {
            let class = device_class(&device.name, &rota);
            let (device_status, reason) = classify_device_io(device, class);
            if device_status.severity() > status.severity() {
                status = device_status;
            }
            if let Some(reason) = reason {
                reasons.push(reason);
            }
            detail_rows.push(json!({
                "device": device.name,
                "class": class.as_str(),
                "await_ms": device.worst_await(),
                "util_percent": device.util,
            }));
        }

        let message = if reasons.is_empty() {
            format!("I/O latency nominal on {} device(s)", devices.len())
        } else {
            reasons.join("; ")
        };

        CheckResult::new(status, message, &gathered.command)
            .with_detail("devices", json!(detail_rows))
            .with_detail("source", gathered.source.as_str())
    }

    async fn check_raid(&self) -> CheckResult {
        let gathered = match self.gatherer.read_file("proc/mdstat").await {
            Ok(g) => g,
            Err(e) => {
                // No md driver loaded is the common case, not a fault.
                return CheckResult::healthy("no software RAID (mdstat not present)", "/proc/mdstat")
                    .with_detail("note", e.to_string());
            }
        };

        let arrays = parse_mdstat(&gathered.output);
        if arrays.is_empty() {
            return CheckResult::healthy("no software RAID arrays", &gathered.command)
                .with_detail("source", gathered.source.as_str());
        }

        let degraded: Vec<&MdArray> = arrays.iter().filter(|a| a.degraded).collect();
        let rebuilding: Vec<&MdArray> = arrays.iter().filter(|a| a.rebuilding).collect();

        let result = if !degraded.is_empty() {
            CheckResult::critical(
                format!(
                    "degraded RAID array(s): {}",
                    degraded.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ")
                ),
                &gathered.command,
            )
        } else if !rebuilding.is_empty() {
            CheckResult::warning(
                format!(
                    "RAID resync in progress: {}",
                    rebuilding.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ")
                ),
                &gathered.command,
            )
        } else {
            CheckResult::healthy(
                format!("{} RAID array(s) clean", arrays.len()),
                &gathered.command,
            )
        };

        result
            .with_detail(
                "arrays",
                json!(arrays
                    .iter()
                    .map(|a| json!({
                        "name": a.name,
                        "degraded": a.degraded,
                        "rebuilding": a.rebuilding,
                    }))
                    .collect::<Vec<_>>()),
            )
            .with_detail("source", gathered.source.as_str())
    }

    async fn check_lvm(&self) -> CheckResult {
        let vgs_command = "vgs --noheadings --nosuffix --units b -o vg_name,vg_size,vg_free";
        let gathered = match self.gatherer.command(vgs_command).await {
            Ok(g) => g,
            Err(e) => {
                return CheckResult::unknown("LVM tools not available on this node", vgs_command)
                    .with_detail("note", e.to_string())
            }
        };

        let mut groups = parse_lvm_capacity(&gathered.output);
        let pvs_command = "pvs --noheadings --nosuffix --units b -o pv_name,pv_size,pv_free";
        if let Ok(pvs) = self.gatherer.command(pvs_command).await {
            groups.extend(parse_lvm_capacity(&pvs.output));
        }

        if groups.is_empty() {
            return CheckResult::healthy("no LVM volume groups", &gathered.command)
                .with_detail("source", gathered.source.as_str());
        }

        let low: Vec<&LvmCapacity> = groups
            .iter()
            .filter(|g| g.free_fraction() < LVM_FREE_WARN_FRACTION)
            .collect();

        let result = if low.is_empty() {
            CheckResult::healthy(
                format!("{} volume group(s)/PV(s) with adequate free space", groups.len()),
                &gathered.command,
            )
        } else {
            CheckResult::warning(
                format!(
                    "under 5% free space on: {}",
                    low.iter().map(|g| g.name.as_str()).collect::<Vec<_>>().join(", ")
                ),
                &gathered.command,
            )
        };

        result
            .with_detail(
                "capacity",
                json!(groups
                    .iter()
                    .map(|g| json!({
                        "name": g.name,
                        "size_bytes": g.size_bytes,
                        "free_bytes": g.free_bytes,
                    }))
                    .collect::<Vec<_>>()),
            )
            .with_detail("source", gathered.source.as_str())
    }
}

fn truncate_raw(output: &str) -> String {
    output.lines().take(5).collect::<Vec<_>>().join("\n")
}

/// Filesystem usage bands shared by block and inode accounting.
pub fn classify_usage(percent: f64) -> CheckStatus {
    if percent >= 95.0 {
        CheckStatus::Critical
    } else if percent >= 85.0 {
        CheckStatus::Warning
    } else {
        CheckStatus::Healthy
    }
}

#[derive(Debug, PartialEq)]
pub struct MountUsage {
    pub filesystem: String,
    pub mount: String,
    pub use_percent: f64,
}

/// Parse `df -P` / `df -Pi` output. Short lines and unparseable percentage
/// columns are skipped, not fatal.
pub fn parse_df(output: &str) -> Vec<MountUsage> {
    output
        .lines()
        .skip(1) // header
        .filter_map(|line| {
            let cols = parse::columns(line, 6)?;
            let use_percent = parse::parse_percent(cols[4])?;
            Some(MountUsage {
                filesystem: cols[0].to_string(),
                mount: cols[5].to_string(),
                use_percent,
            })
        })
        .collect()
}

fn usage_result(command: &str, source: &str, mounts: &[MountUsage], kind: &str) -> CheckResult {
    let mut status = CheckStatus::Healthy;
    let mut worst: Option<&MountUsage> = None;
    for mount in mounts {
        status = status.worse(classify_usage(mount.use_percent));
        if worst.map_or(true, |w| mount.use_percent > w.use_percent) {
            worst = Some(mount);
        }
    }

    let message = match (status, worst) {
        (CheckStatus::Healthy, _) => format!("all {} mounts under 85% {} usage", mounts.len(), kind),
        (_, Some(mount)) => format!(
            "{} at {:.0}% {} usage",
            mount.mount, mount.use_percent, kind
        ),
        _ => format!("{} usage threshold exceeded", kind),
    };

    CheckResult::new(status, message, command)
        .with_detail(
            "mounts",
            json!(mounts
                .iter()
                .map(|m| json!({
                    "filesystem": m.filesystem,
                    "mount": m.mount,
                    "use_percent": m.use_percent,
                }))
                .collect::<Vec<_>>()),
        )
        .with_detail("source", source)
}

fn parse_lsblk_disks(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let cols = parse::columns(line, 2)?;
            if cols[1] == "disk" {
                Some(cols[0].to_string())
            } else {
                None
            }
        })
        .collect()
}

fn parse_lsblk_rota(output: &str) -> HashMap<String, bool> {
    output
        .lines()
        .filter_map(|line| {
            let cols = parse::columns(line, 2)?;
            Some((cols[0].to_string(), cols[1] == "1"))
        })
        .collect()
}

/// `smartctl -H` verdict; `None` when no recognizable health line exists.
pub fn parse_smart_health(output: &str) -> Option<bool> {
    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("SMART overall-health self-assessment test result:") {
            return Some(rest.trim() == "PASSED");
        }
        if let Some(rest) = line.strip_prefix("SMART Health Status:") {
            return Some(rest.trim() == "OK");
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Nvme,
    Rotational,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Nvme => "nvme",
            DeviceClass::Rotational => "rotational",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtilBucket {
    Low,      // < 50%
    Moderate, // 50-80%
    Heavy,    // > 80%
}

pub fn util_bucket(util_percent: f64) -> UtilBucket {
    if util_percent < 50.0 {
        UtilBucket::Low
    } else if util_percent <= 80.0 {
        UtilBucket::Moderate
    } else {
        UtilBucket::Heavy
    }
}

#[derive(Debug, Clone)]
pub struct DeviceIo {
    pub name: String,
    pub reads_per_sec: f64,
    pub writes_per_sec: f64,
    pub r_await_ms: f64,
    pub w_await_ms: f64,
    pub util: f64,
}

impl DeviceIo {
    pub fn worst_await(&self) -> f64 {
        self.r_await_ms.max(self.w_await_ms)
    }

    pub fn iops(&self) -> f64 {
        self.reads_per_sec + self.writes_per_sec
    }

    /// Approximate per-request service time in milliseconds, derived from
    /// utilization and IOPS (iostat stopped reporting svctm directly).
    pub fn approx_service_time_ms(&self) -> Option<f64> {
        let iops = self.iops();
        if iops < 1.0 {
            return None;
        }
        Some(self.util * 10.0 / iops)
    }
}

/// Await thresholds (warn, crit) in milliseconds. Latency under heavy load
/// is expected; thresholds relax as utilization rises so transient pressure
/// is not over-classified. Empirically tuned; keep literal.
fn await_thresholds(class: DeviceClass, bucket: UtilBucket) -> (f64, f64) {
    match (class, bucket) {
        (DeviceClass::Nvme, UtilBucket::Low) => (5.0, 20.0),
        (DeviceClass::Nvme, UtilBucket::Moderate) => (10.0, 50.0),
        (DeviceClass::Nvme, UtilBucket::Heavy) => (20.0, 100.0),
        (DeviceClass::Rotational, UtilBucket::Low) => (20.0, 100.0),
        (DeviceClass::Rotational, UtilBucket::Moderate) => (40.0, 200.0),
        (DeviceClass::Rotational, UtilBucket::Heavy) => (80.0, 400.0),
    }
}

/// Approximate service-time thresholds (warn, crit) in milliseconds.
fn service_time_thresholds(class: DeviceClass, bucket: UtilBucket) -> (f64, f64) {
    match (class, bucket) {
        (DeviceClass::Nvme, UtilBucket::Low) => (1.0, 5.0),
        (DeviceClass::Nvme, UtilBucket::Moderate) => (2.0, 10.0),
        (DeviceClass::Nvme, UtilBucket::Heavy) => (5.0, 20.0),
        (DeviceClass::Rotational, UtilBucket::Low) => (10.0, 50.0),
        (DeviceClass::Rotational, UtilBucket::Moderate) => (20.0, 100.0),
        (DeviceClass::Rotational, UtilBucket::Heavy) => (40.0, 200.0),
    }
}

pub fn device_class(name: &str, rota: &HashMap<String, bool>) -> DeviceClass {
    match rota.get(name) {
        Some(true) => DeviceClass::Rotational,
        Some(false) => DeviceClass::Nvme,
        None if name.starts_with("nvme") => DeviceClass::Nvme,
        None => DeviceClass::Rotational,
    }
}

pub fn classify_device_io(device: &DeviceIo, class: DeviceClass) -> (CheckStatus, Option<String>) {
    let bucket = util_bucket(device.util);
    let (warn_await, crit_await) = await_thresholds(class, bucket);
    let awaited = device.worst_await();

    let mut status = if awaited >= crit_await {
        CheckStatus::Critical
    } else if awaited >= warn_await {
        CheckStatus::Warning
    } else {
        CheckStatus::Healthy
    };
    let mut reason = match status {
        CheckStatus::Healthy => None,
        _ => Some(format!(
            "{}: await {:.1}ms at {:.0}% util",
            device.name, awaited, device.util
        )),
    };

    if let Some(service_ms) = device.approx_service_time_ms() {
        let (warn_svc, crit_svc) = service_time_thresholds(class, bucket);
        let service_status = if service_ms >= crit_svc {
            CheckStatus::Critical
        } else if service_ms >= warn_svc {
            CheckStatus::Warning
        } else {
            CheckStatus::Healthy
        };
        if service_status.severity() > status.severity() {
            status = service_status;
            reason = Some(format!(
                "{}: ~{:.1}ms service time at {:.0}% util",
                device.name, service_ms, device.util
            ));
        }
    }

    (status, reason)
}

/// Parse `iostat -x 1 2`, using only the final report (the first is the
/// since-boot average). Column positions are resolved from the header
/// because they differ across sysstat versions.
pub fn parse_iostat(output: &str) -> Vec<DeviceIo> {
    let lines: Vec<&str> = output.lines().collect();
    let last_header = lines
        .iter()
        .rposition(|line| line.starts_with("Device"));
    let Some(header_idx) = last_header else {
        return Vec::new();
    };

    let header: Vec<&str> = lines[header_idx].split_whitespace().collect();
    let col = |name: &str| header.iter().position(|h| *h == name);
    let (Some(r_s), Some(w_s), Some(r_await), Some(w_await), Some(util)) = (
        col("r/s"),
        col("w/s"),
        col("r_await"),
        col("w_await"),
        col("%util"),
    ) else {
        return Vec::new();
    };

    lines[header_idx + 1..]
        .iter()
        .filter_map(|line| {
            let cols = parse::columns(line, header.len().min(util + 1))?;
            if cols[0].starts_with("loop") || cols[0].starts_with("zram") {
                return None;
            }
            Some(DeviceIo {
                name: cols[0].to_string(),
                reads_per_sec: parse::parse_float(cols.get(r_s)?)?,
                writes_per_sec: parse::parse_float(cols.get(w_s)?)?,
                r_await_ms: parse::parse_float(cols.get(r_await)?)?,
                w_await_ms: parse::parse_float(cols.get(w_await)?)?,
                util: parse::parse_float(cols.get(util)?)?,
            })
        })
        .collect()
}

#[derive(Debug)]
pub struct MdArray {
    pub name: String,
    pub degraded: bool,
    pub rebuilding: bool,
}

/// Parse /proc/mdstat. A `[U_]`-style bracket with an underscore marks a
/// missing member; resync/recovery lines mark a rebuild in progress.
pub fn parse_mdstat(output: &str) -> Vec<MdArray> {
    let mut arrays: Vec<MdArray> = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim_end();
        if let Some((name, _rest)) = trimmed.split_once(" : ") {
            if name.starts_with("md") {
                arrays.push(MdArray {
                    name: name.trim().to_string(),
                    degraded: false,
                    rebuilding: false,
                });
                continue;
            }
        }
        let Some(current) = arrays.last_mut() else {
            continue;
        };
        if let Some(start) = trimmed.rfind('[') {
            let bracket = &trimmed[start..];
            if bracket.starts_with("[U") || bracket.starts_with("[_") {
                current.degraded = bracket.contains('_');
            }
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.contains("resync") || lower.contains("recovery") || lower.contains("reshape") {
            current.rebuilding = true;
        }
    }
    arrays
}

#[derive(Debug)]
pub struct LvmCapacity {
    pub name: String,
    pub size_bytes: u64,
    pub free_bytes: u64,
}

impl LvmCapacity {
    pub fn free_fraction(&self) -> f64 {
        if self.size_bytes == 0 {
            return 1.0;
        }
        self.free_bytes as f64 / self.size_bytes as f64
    }
}

/// Parse `vgs`/`pvs` rows of `name size free` with byte units.
pub fn parse_lvm_capacity(output: &str) -> Vec<LvmCapacity> {
    output
        .lines()
        .filter_map(|line| {
            let cols = parse::columns(line, 3)?;
            Some(LvmCapacity {
                name: cols[0].to_string(),
                size_bytes: parse::parse_size(cols[1])?,
                free_bytes: parse::parse_size(cols[2])?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_bands_at_boundaries() {
        assert_eq!(classify_usage(84.0), CheckStatus::Healthy);
        assert_eq!(classify_usage(85.0), CheckStatus::Warning);
        assert_eq!(classify_usage(94.0), CheckStatus::Warning);
        assert_eq!(classify_usage(95.0), CheckStatus::Critical);
    }

    #[test]
    fn df_parse_skips_malformed_lines() {
        let output = "\
Filesystem     1024-blocks     Used Available Capacity Mounted on
/dev/sda1        102400000 87040000  15360000      85% /
/dev/sdb1        204800000 10240000 194560000       5% /data
garbage line
tmpfs short
";
        let mounts = parse_df(output);
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].mount, "/");
        assert_eq!(mounts[0].use_percent, 85.0);
    }

    #[test]
    fn df_inode_placeholder_is_skipped() {
        let output = "\
Filesystem        Inodes  IUsed     IFree IUse% Mounted on
/dev/sda1        6553600 350000   6203600    6% /
vfat_boot              0      0         0     - /boot/efi
";
        let mounts = parse_df(output);
        assert_eq!(mounts.len(), 1);
    }

    #[test]
    fn smart_verdicts() {
        assert_eq!(
            parse_smart_health("SMART overall-health self-assessment test result: PASSED\n"),
            Some(true)
        );
        assert_eq!(
            parse_smart_health("SMART overall-health self-assessment test result: FAILED!\n"),
            Some(false)
        );
        assert_eq!(parse_smart_health("SMART Health Status: OK\n"), Some(true));
        assert_eq!(parse_smart_health("no health line"), None);
    }

    #[test]
    fn util_buckets() {
        assert_eq!(util_bucket(10.0), UtilBucket::Low);
        assert_eq!(util_bucket(50.0), UtilBucket::Moderate);
        assert_eq!(util_bucket(80.0), UtilBucket::Moderate);
        assert_eq!(util_bucket(80.1), UtilBucket::Heavy);
    }

    fn device(name: &str, r_await: f64, w_await: f64, util: f64, iops: f64) -> DeviceIo {
        DeviceIo {
            name: name.to_string(),
            reads_per_sec: iops / 2.0,
            writes_per_sec: iops / 2.0,
            r_await_ms: r_await,
            w_await_ms: w_await,
            util,
        }
    }

    #[test]
    fn nvme_latency_is_judged_tighter_than_rotational() {
        // 15ms await at low utilization: warning territory for NVMe,
        // healthy for a spinning disk.
        let d = device("x", 15.0, 1.0, 10.0, 0.0);
        let (nvme_status, _) = classify_device_io(&d, DeviceClass::Nvme);
        let (rot_status, _) = classify_device_io(&d, DeviceClass::Rotational);
        assert_eq!(nvme_status, CheckStatus::Warning);
        assert_eq!(rot_status, CheckStatus::Healthy);
    }

    #[test]
    fn heavy_load_relaxes_thresholds() {
        // 15ms on NVMe: warning when idle, expected under heavy load
        let idle = device("x", 15.0, 1.0, 10.0, 0.0);
        let busy = device("x", 15.0, 1.0, 95.0, 0.0);
        assert_eq!(classify_device_io(&idle, DeviceClass::Nvme).0, CheckStatus::Warning);
        assert_eq!(classify_device_io(&busy, DeviceClass::Nvme).0, CheckStatus::Healthy);
    }

    #[test]
    fn service_time_escalates() {
        // 40% util at 2 IOPS -> ~200ms per request, critical on any class
        let d = device("sda", 1.0, 1.0, 40.0, 2.0);
        let (status, reason) = classify_device_io(&d, DeviceClass::Rotational);
        assert_eq!(status, CheckStatus::Critical);
        assert!(reason.unwrap().contains("service time"));
    }

    #[test]
    fn iostat_parse_uses_last_report_and_header_positions() {
        let output = "\
Linux 6.1.0 (worker-1)  01/01/26  _x86_64_  (8 CPU)

avg-cpu:  %user   %nice %system %iowait  %steal   %idle
           1.00    0.00    1.00    0.50    0.00   97.50

Device            r/s     w/s     rkB/s     wkB/s   rrqm/s   wrqm/s  %rrqm  %wrqm r_await w_await aqu-sz rareq-sz wareq-sz  svctm  %util
nvme0n1         100.00   50.00   4000.00   2000.00     0.00     0.00   0.00   0.00    0.20    0.30   0.05    40.00    40.00   0.10   5.00

avg-cpu:  %user   %nice %system %iowait  %steal   %idle
           2.00    0.00    2.00    1.00    0.00   95.00

Device            r/s     w/s     rkB/s     wkB/s   rrqm/s   wrqm/s  %rrqm  %wrqm r_await w_await aqu-sz rareq-sz wareq-sz  svctm  %util
nvme0n1         200.00  100.00   8000.00   4000.00     0.00     0.00   0.00   0.00    0.40    0.60   0.10    40.00    40.00   0.10  10.00
loop0             0.00    0.00      0.00      0.00     0.00     0.00   0.00   0.00    0.00    0.00   0.00     0.00     0.00   0.00   0.00
";
        let devices = parse_iostat(output);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "nvme0n1");
        assert_eq!(devices[0].reads_per_sec, 200.0);
        assert_eq!(devices[0].w_await_ms, 0.6);
        assert_eq!(devices[0].util, 10.0);
    }

    #[test]
    fn mdstat_degraded_and_rebuilding() {
        let output = "\
Personalities : [raid1] [raid6]
md0 : active raid1 sdb1[1] sda1[0]
      1953381376 blocks super 1.2 [2/2] [UU]

md1 : active raid1 sdd1[1]
      976690624 blocks super 1.2 [2/1] [U_]

md2 : active raid6 sde1[0] sdf1[1] sdg1[2] sdh1[3]
      3906764288 blocks super 1.2 [4/4] [UUUU]
      [=>...................]  recovery =  9.2% (89968/976690624)

unused devices: <none>
";
        let arrays = parse_mdstat(output);
        assert_eq!(arrays.len(), 3);
        assert!(!arrays[0].degraded && !arrays[0].rebuilding);
        assert!(arrays[1].degraded);
        assert!(arrays[2].rebuilding && !arrays[2].degraded);
    }

    #[test]
    fn lvm_capacity_and_cutoff() {
        let output = "  vg_data  1000000000000  30000000000\n  vg_root  100000000000  50000000000\n";
        let groups = parse_lvm_capacity(output);
        assert_eq!(groups.len(), 2);
        assert!(groups[0].free_fraction() < LVM_FREE_WARN_FRACTION);
        assert!(groups[1].free_fraction() > LVM_FREE_WARN_FRACTION);
    }

    #[test]
    fn device_class_resolution() {
        let mut rota = HashMap::new();
        rota.insert("sda".to_string(), true);
        rota.insert("nvme0n1".to_string(), false);
        assert_eq!(device_class("sda", &rota), DeviceClass::Rotational);
        assert_eq!(device_class("nvme0n1", &rota), DeviceClass::Nvme);
        // heuristic fallback
        assert_eq!(device_class("nvme1n1", &HashMap::new()), DeviceClass::Nvme);
        assert_eq!(device_class("sdb", &HashMap::new()), DeviceClass::Rotational);
    }
}
