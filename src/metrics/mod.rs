//! Prometheus metrics for the fleet.
//!
//! Every update pass resets the vectors before setting fresh values, so a
//! (node, signal) pair with no parsed value this cycle is omitted from the
//! exposition rather than frozen at its last value or zeroed.

use prometheus::{Encoder, GaugeVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::aggregate::{extract_signals, fleet_summary};
use crate::error::{NodePulseError, Result};
use nodepulse_common::{CheckStatus, NodeCheck};

pub struct FleetMetrics {
    registry: Registry,
    requests: IntGaugeVec,
    probe_status: IntGaugeVec,
    temperature: GaugeVec,
    cpu_percent: GaugeVec,
    memory_percent: GaugeVec,
    load1: GaugeVec,
    load5: GaugeVec,
    load15: GaugeVec,
}

impl FleetMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests = IntGaugeVec::new(
            Opts::new("nodepulse_requests", "Active check requests per overall status"),
            &["status"],
        )
        .map_err(|e| NodePulseError::MetricsError(e.to_string()))?;
        let probe_status = IntGaugeVec::new(
            Opts::new(
                "nodepulse_probe_status",
                "Probe occurrences per (category, probe, status) across the fleet",
            ),
            &["category", "probe", "status"],
        )
        .map_err(|e| NodePulseError::MetricsError(e.to_string()))?;

        let node_gauge = |name: &str, help: &str| -> Result<GaugeVec> {
            GaugeVec::new(Opts::new(name, help), &["node"])
                .map_err(|e| NodePulseError::MetricsError(e.to_string()))
        };
        let temperature = node_gauge("nodepulse_node_temperature_celsius", "Hottest sensor reading per node")?;
        let cpu_percent = node_gauge("nodepulse_node_cpu_percent", "CPU busy percentage per node")?;
        let memory_percent = node_gauge("nodepulse_node_memory_percent", "Memory usage percentage per node")?;
        let load1 = node_gauge("nodepulse_node_load1", "1-minute load average per node")?;
        let load5 = node_gauge("nodepulse_node_load5", "5-minute load average per node")?;
        let load15 = node_gauge("nodepulse_node_load15", "15-minute load average per node")?;

        for collector in [&requests, &probe_status] {
            registry
                .register(Box::new(collector.clone()))
                .map_err(|e| NodePulseError::MetricsError(e.to_string()))?;
        }
        for gauge in [&temperature, &cpu_percent, &memory_percent, &load1, &load5, &load15] {
            registry
                .register(Box::new(gauge.clone()))
                .map_err(|e| NodePulseError::MetricsError(e.to_string()))?;
        }

        Ok(Self {
            registry,
            requests,
            probe_status,
            temperature,
            cpu_percent,
            memory_percent,
            load1,
            load5,
            load15,
        })
    }

    /// Recompute every gauge from the current request set.
    pub fn update(&self, checks: &[NodeCheck]) {
        self.requests.reset();
        self.probe_status.reset();
        self.temperature.reset();
        self.cpu_percent.reset();
        self.memory_percent.reset();
        self.load1.reset();
        self.load5.reset();
        self.load15.reset();

        let fleet = fleet_summary(checks);
        for status in CheckStatus::all() {
            self.requests
                .with_label_values(&[status.as_str()])
                .set(fleet.requests.get(status) as i64);
        }
        for probe in &fleet.probes {
            for status in CheckStatus::all() {
                let count = probe.counts.get(status);
                if count > 0 {
                    self.probe_status
                        .with_label_values(&[&probe.category, &probe.probe, status.as_str()])
                        .set(count as i64);
                }
            }
        }

        for check in checks.iter().filter(|c| !c.is_wildcard()) {
            let Some(node) = check.target_node() else { continue };
            let Some(status) = &check.status else { continue };
            let signals = extract_signals(status);

            let set = |gauge: &GaugeVec, value: Option<f64>| {
                if let Some(v) = value {
                    gauge.with_label_values(&[node]).set(v);
                }
            };
            set(&self.temperature, signals.temperature_celsius);
            set(&self.cpu_percent, signals.cpu_percent);
            set(&self.memory_percent, signals.memory_percent);
            set(&self.load1, signals.load1);
            set(&self.load5, signals.load5);
            set(&self.load15, signals.load15);
        }
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| NodePulseError::MetricsError(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| NodePulseError::MetricsError(e.to_string()))
    }
}
