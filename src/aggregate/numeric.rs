//! Numeric signal extraction from probe details.
//!
//! Each gauge signal is pulled from a prioritized list of known field names
//! for its probe; the first present, parseable value wins. A missing field
//! yields no value, and the metric stays unpublished that cycle. A fabricated
//! zero would read as "0% CPU" or "0°C", which is a lie.

use nodepulse_common::{CheckCategory, NodeCheckStatus};
use serde_json::Value;
use std::collections::BTreeMap;

/// Scalar signals exported per node. All optional: absence means "not
/// parsed this cycle".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeSignals {
    pub temperature_celsius: Option<f64>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub load1: Option<f64>,
    pub load5: Option<f64>,
    pub load15: Option<f64>,
}

/// (category, probe, prioritized field names) per signal.
const TEMPERATURE_FIELDS: &[&str] = &["temp_celsius", "max_temp_celsius", "temperature"];
const CPU_FIELDS: &[&str] = &["busy_percent", "cpu_percent", "usage_percent"];
const MEMORY_FIELDS: &[&str] = &["used_percent", "memory_percent"];

pub fn extract_signals(status: &NodeCheckStatus) -> NodeSignals {
    let probe = |category: CheckCategory, name: &str| -> Option<BTreeMap<String, Value>> {
        status
            .iter_results()
            .find(|(c, n, _)| *c == category && n.as_str() == name)
            .map(|(_, _, flat)| flat.to_result().details)
    };

    let sensors = probe(CheckCategory::Hardware, "sensors");
    let cpu = probe(CheckCategory::System, "cpu_usage");
    let memory = probe(CheckCategory::System, "memory");
    let load = probe(CheckCategory::System, "cpu_load");

    NodeSignals {
        temperature_celsius: first_number(sensors.as_ref(), TEMPERATURE_FIELDS),
        cpu_percent: first_number(cpu.as_ref(), CPU_FIELDS),
        memory_percent: first_number(memory.as_ref(), MEMORY_FIELDS),
        load1: first_number(load.as_ref(), &["load1"]),
        load5: first_number(load.as_ref(), &["load5"]),
        load15: first_number(load.as_ref(), &["load15"]),
    }
}

fn first_number(details: Option<&BTreeMap<String, Value>>, fields: &[&str]) -> Option<f64> {
    let details = details?;
    fields.iter().find_map(|field| as_number(details.get(*field)?))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodepulse_common::{CheckCategory, CheckResult, ResultBundle};

    #[test]
    fn signals_come_from_their_probes() {
        let mut bundle = ResultBundle::new();
        bundle.insert(
            CheckCategory::Hardware,
            "sensors",
            CheckResult::healthy("ok", "sensors").with_detail("temp_celsius", 47.0),
        );
        bundle.insert(
            CheckCategory::System,
            "cpu_load",
            CheckResult::healthy("ok", "/proc/loadavg")
                .with_detail("load1", 0.42)
                .with_detail("load5", 0.36)
                .with_detail("load15", 0.31),
        );
        bundle.insert(
            CheckCategory::System,
            "memory",
            CheckResult::healthy("ok", "/proc/meminfo").with_detail("used_percent", 61.5),
        );

        let signals = extract_signals(&bundle.to_status("worker-1"));
        assert_eq!(signals.temperature_celsius, Some(47.0));
        assert_eq!(signals.load1, Some(0.42));
        assert_eq!(signals.load15, Some(0.31));
        assert_eq!(signals.memory_percent, Some(61.5));
        // cpu_usage probe not in bundle: no value, not zero
        assert_eq!(signals.cpu_percent, None);
    }

    #[test]
    fn stringified_numbers_survive_the_flatten_boundary() {
        let mut bundle = ResultBundle::new();
        bundle.insert(
            CheckCategory::System,
            "cpu_usage",
            CheckResult::healthy("ok", "/proc/stat").with_detail("busy_percent", "12.5"),
        );
        let signals = extract_signals(&bundle.to_status("worker-1"));
        assert_eq!(signals.cpu_percent, Some(12.5));
    }

    #[test]
    fn empty_status_yields_no_signals() {
        assert_eq!(
            extract_signals(&NodeCheckStatus::default()),
            NodeSignals::default()
        );
    }
}
