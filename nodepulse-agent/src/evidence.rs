//! Bounded evidence collection for log-derived signals.
//!
//! Kernel-log scans can match thousands of repeated lines. Counts stay
//! exact; the retained samples are deduplicated and capped so a flapping
//! device cannot bloat a result bundle.

use std::collections::HashSet;

pub const MAX_SAMPLES: usize = 10;

/// Exact count plus a deduplicated, capped sample of matching lines.
#[derive(Debug, Default, Clone)]
pub struct BoundedEvidence {
    count: u64,
    samples: Vec<String>,
    seen: HashSet<String>,
}

impl BoundedEvidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: &str) {
        self.count += 1;
        let trimmed = line.trim();
        if self.samples.len() < MAX_SAMPLES && self.seen.insert(trimmed.to_string()) {
            self.samples.push(trimmed.to_string());
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<String> {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_stay_exact_past_the_cap() {
        let mut evidence = BoundedEvidence::new();
        for i in 0..50 {
            evidence.record(&format!("oom event {}", i));
        }
        assert_eq!(evidence.count(), 50);
        assert_eq!(evidence.samples().len(), MAX_SAMPLES);
    }

    #[test]
    fn duplicates_counted_but_sampled_once() {
        let mut evidence = BoundedEvidence::new();
        evidence.record("EXT4-fs error on sda1");
        evidence.record("EXT4-fs error on sda1");
        evidence.record("  EXT4-fs error on sda1  ");
        assert_eq!(evidence.count(), 3);
        assert_eq!(evidence.samples().len(), 1);
    }
}
