//! Defensive parsing helpers for CLI and /proc output.
//!
//! Probes never trust column counts or unit suffixes: short or malformed
//! lines are skipped, and values that fail to parse yield `None` so callers
//! can degrade instead of fabricating zeros.

/// Parse a size with an optional unit suffix into bytes.
///
/// Accepts decimal (K/M/G/T = powers of 1000) and binary (Ki/Mi/Gi/Ti =
/// powers of 1024) suffixes, with an optional trailing `B`, as printed by
/// `df -h`, `lsblk`, `free -h` and friends. Bare numbers parse as bytes.
pub fn parse_size(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    let lower = lower.strip_suffix('b').unwrap_or(&lower);

    let (multiplier, digits) = if let Some(rest) = lower.strip_suffix("ki") {
        (1024u64, rest)
    } else if let Some(rest) = lower.strip_suffix("mi") {
        (1024u64.pow(2), rest)
    } else if let Some(rest) = lower.strip_suffix("gi") {
        (1024u64.pow(3), rest)
    } else if let Some(rest) = lower.strip_suffix("ti") {
        (1024u64.pow(4), rest)
    } else if let Some(rest) = lower.strip_suffix('k') {
        (1000u64, rest)
    } else if let Some(rest) = lower.strip_suffix('m') {
        (1000u64.pow(2), rest)
    } else if let Some(rest) = lower.strip_suffix('g') {
        (1000u64.pow(3), rest)
    } else if let Some(rest) = lower.strip_suffix('t') {
        (1000u64.pow(4), rest)
    } else {
        (1u64, lower)
    };

    let value: f64 = digits.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier as f64).round() as u64)
}

/// Parse a percentage like `85%`, `85`, or `84.5%`. `-` (df's placeholder
/// for filesystems without inode accounting) yields `None`.
pub fn parse_percent(input: &str) -> Option<f64> {
    let trimmed = input.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }
    let value: f64 = trimmed.parse().ok()?;
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Tolerant float parse for tool output that may use a comma decimal
/// separator (iostat under some locales).
pub fn parse_float(input: &str) -> Option<f64> {
    let trimmed = input.trim().replace(',', ".");
    let value: f64 = trimmed.parse().ok()?;
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Split a line into whitespace-separated columns, requiring at least
/// `min_columns`. Returns `None` for short lines so callers skip them.
pub fn columns(line: &str, min_columns: usize) -> Option<Vec<&str>> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < min_columns {
        None
    } else {
        Some(cols)
    }
}
