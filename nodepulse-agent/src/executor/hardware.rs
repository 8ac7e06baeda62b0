//! Hardware probes: thermal sensors, IPMI, PCIe errors.
//!
//! Hardware visibility is the most environment-dependent category: VMs have
//! no IPMI, many images ship without lm-sensors. A legitimately absent
//! capability classifies as Warning/Unknown with a note, never Critical.

use crate::evidence::BoundedEvidence;
use crate::gather::Gatherer;
use async_trait::async_trait;
use nodepulse_common::parse;
use nodepulse_common::{CheckCategory, CheckResult, CheckStatus};
use serde_json::json;
use std::sync::Arc;

use super::Executor;

const PROBES: &[&str] = &["sensors", "ipmi", "pcie_errors"];

pub struct HardwareExecutor {
    gatherer: Arc<Gatherer>,
}

impl HardwareExecutor {
    pub fn new(gatherer: Arc<Gatherer>) -> Self {
        Self { gatherer }
    }
}

#[async_trait]
impl Executor for HardwareExecutor {
    fn category(&self) -> CheckCategory {
        CheckCategory::Hardware
    }

    fn probe_names(&self) -> &'static [&'static str] {
        PROBES
    }

    async fn probe(&self, name: &str) -> CheckResult {
        match name {
            "sensors" => self.check_sensors().await,
            "ipmi" => self.check_ipmi().await,
            "pcie_errors" => self.check_pcie_errors().await,
            other => CheckResult::unknown(format!("no such probe: {}", other), other),
        }
    }
}

impl HardwareExecutor {
    async fn check_sensors(&self) -> CheckResult {
        let gathered = match self.gatherer.command("sensors").await {
            Ok(g) => g,
            Err(e) => {
                return CheckResult::unknown("lm-sensors not available on this node", "sensors")
                    .with_detail("note", e.to_string())
            }
        };

        let readings = parse_sensors(&gathered.output);
        if readings.is_empty() {
            return CheckResult::unknown("no temperature readings found", &gathered.command)
                .with_detail("source", gathered.source.as_str());
        }

        let mut status = CheckStatus::Healthy;
        let mut worst: Option<&TempReading> = None;
        for reading in &readings {
            let this = classify_temperature(reading);
            if this.severity() > status.severity() {
                status = this;
                worst = Some(reading);
            }
        }
        let max_temp = readings
            .iter()
            .map(|r| r.celsius)
            .fold(f64::NEG_INFINITY, f64::max);

        let message = match (status, worst) {
            (CheckStatus::Healthy, _) => format!(
                "{} sensor(s), max {:.1}C",
                readings.len(),
                max_temp
            ),
            (_, Some(reading)) => format!(
                "{} at {:.1}C (high {}, crit {})",
                reading.label,
                reading.celsius,
                reading
                    .high
                    .map_or("n/a".to_string(), |v| format!("{:.1}C", v)),
                reading
                    .crit
                    .map_or("n/a".to_string(), |v| format!("{:.1}C", v)),
            ),
            _ => "temperature threshold exceeded".to_string(),
        };

        CheckResult::new(status, message, &gathered.command)
            .with_detail("temp_celsius", (max_temp * 10.0).round() / 10.0)
            .with_detail("sensor_count", readings.len() as u64)
            .with_detail(
                "sensors",
                json!(readings
                    .iter()
                    .map(|r| json!({"label": r.label, "celsius": r.celsius}))
                    .collect::<Vec<_>>()),
            )
            .with_detail("source", gathered.source.as_str())
    }

    async fn check_ipmi(&self) -> CheckResult {
        let command = "ipmitool sensor list";
        let gathered = match self.gatherer.command(command).await {
            Ok(g) => g,
            Err(e) => {
                let text = e.to_string();
                // "Could not open device" means no BMC, common on VMs; the
                // capability is absent rather than broken.
                let message = if text.contains("Could not open device") {
                    "IPMI hardware not available on this node"
                } else {
                    "ipmitool not available on this node"
                };
                return CheckResult::warning(message, command).with_detail("note", text);
            }
        };

        let readings = parse_ipmi_sensors(&gathered.output);
        let bad: Vec<&IpmiReading> = readings
            .iter()
            .filter(|r| r.state != IpmiState::Ok && r.state != IpmiState::NotPresent)
            .collect();

        if bad.is_empty() {
            return CheckResult::healthy(
                format!("{} IPMI sensor(s) nominal", readings.len()),
                &gathered.command,
            )
            .with_detail("sensor_count", readings.len() as u64)
            .with_detail("source", gathered.source.as_str());
        }

        let status = if bad.iter().any(|r| r.state == IpmiState::Critical) {
            CheckStatus::Critical
        } else {
            CheckStatus::Warning
        };
        let names: Vec<&str> = bad.iter().take(10).map(|r| r.name.as_str()).collect();

        CheckResult::new(
            status,
            format!("{} IPMI sensor(s) outside nominal range", bad.len()),
            &gathered.command,
        )
        .with_detail("bad_count", bad.len() as u64)
        .with_detail("bad_sensors", json!(names))
        .with_detail("source", gathered.source.as_str())
    }

    async fn check_pcie_errors(&self) -> CheckResult {
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

        let (corrected, uncorrected) = scan_pcie_errors(&gathered.output);
        let status = if uncorrected.count() > 0 {
            CheckStatus::Critical
        } else if corrected.count() > 0 {
            CheckStatus::Warning
        } else {
            CheckStatus::Healthy
        };

        let message = match status {
            CheckStatus::Healthy => "no PCIe AER events in kernel log".to_string(),
            CheckStatus::Critical => {
                format!("{} uncorrected PCIe error(s)", uncorrected.count())
            }
            _ => format!("{} corrected PCIe error(s)", corrected.count()),
        };

        CheckResult::new(status, message, &gathered.command)
            .with_detail("corrected_count", corrected.count())
            .with_detail("uncorrected_count", uncorrected.count())
            .with_detail("corrected_samples", json!(corrected.samples()))
            .with_detail("uncorrected_samples", json!(uncorrected.samples()))
            .with_detail("source", gathered.source.as_str())
    }
}

#[derive(Debug)]
pub struct TempReading {
    pub label: String,
    pub celsius: f64,
    pub high: Option<f64>,
    pub crit: Option<f64>,
}

/// Parse `sensors` default output. Lines look like:
/// `Core 0:       +45.0°C  (high = +80.0°C, crit = +95.0°C)`
pub fn parse_sensors(output: &str) -> Vec<TempReading> {
    let mut readings = Vec::new();
    for line in output.lines() {
        let Some((label, rest)) = line.split_once(':') else {
            continue;
        };
        let rest = rest.trim();
        let Some(celsius) = extract_celsius(rest.split_whitespace().next().unwrap_or("")) else {
            continue;
        };
        let high = extract_limit(rest, "high");
        let crit = extract_limit(rest, "crit");
        readings.push(TempReading {
            label: label.trim().to_string(),
            celsius,
            high,
            crit,
        });
    }
    readings
}

fn extract_celsius(token: &str) -> Option<f64> {
    let cleaned = token
        .trim_start_matches('+')
        .trim_end_matches("°C")
        .trim_end_matches('C');
    // reject non-temperature tokens like "1200" (fan RPM column) by
    // requiring the °C suffix on the original token
    if !token.contains('C') {
        return None;
    }
    parse::parse_float(cleaned)
}

fn extract_limit(rest: &str, name: &str) -> Option<f64> {
    let idx = rest.find(&format!("{} =", name))?;
    let after = &rest[idx + name.len() + 2..];
    let token = after
        .trim_start()
        .split(|c: char| c == ',' || c == ')')
        .next()?;
    extract_celsius(token.trim())
}

/// Sensor above its critical limit is Critical; within 10C of it (or above
/// the high limit) is Warning.
pub fn classify_temperature(reading: &TempReading) -> CheckStatus {
    if let Some(crit) = reading.crit {
        if reading.celsius >= crit {
            return CheckStatus::Critical;
        }
        if reading.celsius >= crit - 10.0 {
            return CheckStatus::Warning;
        }
    }
    if let Some(high) = reading.high {
        if reading.celsius >= high {
            return CheckStatus::Warning;
        }
    }
    CheckStatus::Healthy
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum IpmiState {
    Ok,
    Warning,
    Critical,
    NotPresent,
}

#[derive(Debug)]
pub struct IpmiReading {
    pub name: String,
    pub state: IpmiState,
}

/// Parse `ipmitool sensor list` pipe-separated rows:
/// `CPU Temp | 45.000 | degrees C | ok | ...`
pub fn parse_ipmi_sensors(output: &str) -> Vec<IpmiReading> {
    let mut readings = Vec::new();
    for line in output.lines() {
        let cols: Vec<&str> = line.split('|').map(str::trim).collect();
        if cols.len() < 4 {
            continue;
        }
        let state = match cols[3] {
            "ok" => IpmiState::Ok,
            "ns" | "na" => IpmiState::NotPresent,
            "cr" | "nr" => IpmiState::Critical,
            "nc" | "lnc" | "unc" => IpmiState::Warning,
            _ => continue,
        };
        readings.push(IpmiReading {
            name: cols[0].to_string(),
            state,
        });
    }
    readings
}

/// (corrected, uncorrected) AER events from kernel log text.
pub fn scan_pcie_errors(output: &str) -> (BoundedEvidence, BoundedEvidence) {
    let mut corrected = BoundedEvidence::new();
    let mut uncorrected = BoundedEvidence::new();
    for line in output.lines() {
        if !line.contains("AER:") && !line.contains("PCIe Bus Error") {
            continue;
        }
        let lower = line.to_ascii_lowercase();
        if lower.contains("uncorrected") || lower.contains("fatal") {
            uncorrected.record(line);
        } else if lower.contains("corrected") {
            corrected.record(line);
        }
    }
    (corrected, uncorrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENSORS_OUTPUT: &str = "\
coretemp-isa-0000
Adapter: ISA adapter
Package id 0:  +52.0\u{b0}C  (high = +80.0\u{b0}C, crit = +95.0\u{b0}C)
Core 0:        +45.0\u{b0}C  (high = +80.0\u{b0}C, crit = +95.0\u{b0}C)
Core 1:        +91.0\u{b0}C  (high = +80.0\u{b0}C, crit = +95.0\u{b0}C)

nct6775-isa-0290
Adapter: ISA adapter
fan1:         1200 RPM
";

    #[test]
    fn sensors_parse_skips_non_temperature_lines() {
        let readings = parse_sensors(SENSORS_OUTPUT);
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].label, "Package id 0");
        assert_eq!(readings[0].celsius, 52.0);
        assert_eq!(readings[0].high, Some(80.0));
        assert_eq!(readings[0].crit, Some(95.0));
    }

    #[test]
    fn temperature_classification_bands() {
        let mk = |celsius| TempReading {
            label: "Core".into(),
            celsius,
            high: Some(80.0),
            crit: Some(95.0),
        };
        assert_eq!(classify_temperature(&mk(45.0)), CheckStatus::Healthy);
        assert_eq!(classify_temperature(&mk(84.0)), CheckStatus::Warning); // above high
        assert_eq!(classify_temperature(&mk(86.0)), CheckStatus::Warning); // within 10 of crit
        assert_eq!(classify_temperature(&mk(95.0)), CheckStatus::Critical);
        // no limits reported: never escalate on guesswork
        let bare = TempReading {
            label: "x".into(),
            celsius: 99.0,
            high: None,
            crit: None,
        };
        assert_eq!(classify_temperature(&bare), CheckStatus::Healthy);
    }

    #[test]
    fn ipmi_rows_parse_states() {
        let output = "\
CPU Temp         | 45.000     | degrees C  | ok    | na | na | na | 85.000 | 90.000 | na
PSU1 Status      | 0x1        | discrete   | cr    | na | na | na | na | na | na
Fan3             | na         | RPM        | ns    | na | na | na | na | na | na
Voltage 12V      | 11.800     | Volts      | nc    | na | na | na | na | na | na
";
        let readings = parse_ipmi_sensors(output);
        assert_eq!(readings.len(), 4);
        assert_eq!(readings[0].state, IpmiState::Ok);
        assert_eq!(readings[1].state, IpmiState::Critical);
        assert_eq!(readings[2].state, IpmiState::NotPresent);
        assert_eq!(readings[3].state, IpmiState::Warning);
    }

    #[test]
    fn pcie_scan_separates_severity() {
        let log = "\
pcieport 0000:00:1c.0: AER: Corrected error received: 0000:01:00.0
pcieport 0000:00:1c.0: AER: Corrected error received: 0000:01:00.0
nvme 0000:01:00.0: AER: Uncorrected (Fatal) error received
unrelated line
";
        let (corrected, uncorrected) = scan_pcie_errors(log);
        assert_eq!(corrected.count(), 2);
        assert_eq!(corrected.samples().len(), 1);
        assert_eq!(uncorrected.count(), 1);
    }
}
