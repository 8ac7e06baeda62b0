//! Network probes: interface state, default route, socket pressure.

use crate::gather::Gatherer;
use async_trait::async_trait;
use nodepulse_common::parse;
use nodepulse_common::{CheckCategory, CheckResult, CheckStatus};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::Executor;

const PROBES: &[&str] = &["interfaces", "routes", "sockets"];

/// Socket-table pressure cutoffs. Orphaned sockets signal an application
/// leaking connections; a timewait flood usually means connection churn.
const ORPHANED_WARN: u64 = 100;
const TIMEWAIT_WARN: u64 = 10_000;

pub struct NetworkExecutor {
    gatherer: Arc<Gatherer>,
}

impl NetworkExecutor {
    pub fn new(gatherer: Arc<Gatherer>) -> Self {
        Self { gatherer }
    }
}

#[async_trait]
impl Executor for NetworkExecutor {
    fn category(&self) -> CheckCategory {
        CheckCategory::Network
    }

    fn probe_names(&self) -> &'static [&'static str] {
        PROBES
    }

    async fn probe(&self, name: &str) -> CheckResult {
        match name {
            "interfaces" => self.check_interfaces().await,
            "routes" => self.check_routes().await,
            "sockets" => self.check_sockets().await,
            other => CheckResult::unknown(format!("no such probe: {}", other), other),
        }
    }
}

impl NetworkExecutor {
    async fn check_interfaces(&self) -> CheckResult {
        let command = "ip -o link show";
        let gathered = match self.gatherer.command(command).await {
            Ok(g) => g,
            Err(e) => return CheckResult::unknown(format!("ip not available: {}", e), command),
        };

        let interfaces = parse_ip_link(&gathered.output);
        if interfaces.is_empty() {
            return CheckResult::warning("no interfaces parsed", &gathered.command)
                .with_detail("raw", gathered.output.lines().take(3).collect::<Vec<_>>().join("\n"));
        }

        // Address and counter gathers refine the verdict; either failing
        // leaves the link-state judgement intact.
        let addresses = self
            .gatherer
            .command("ip -o a")
            .await
            .ok()
            .map(|g| parse_ip_addresses(&g.output));
        let stats = self
            .gatherer
            .command("ip -s link")
            .await
            .ok()
            .map(|g| parse_ip_stats(&g.output))
            .unwrap_or_default();

        let down = down_with_addresses(&interfaces, addresses.as_ref());

        let result = if down.is_empty() {
            CheckResult::healthy(
                format!("{} interface(s) up", interfaces.iter().filter(|i| i.state == LinkState::Up).count()),
                &gathered.command,
            )
        } else {
            CheckResult::warning(
                format!(
                    "configured interface(s) down: {}",
                    down.iter().map(|i| i.name.as_str()).collect::<Vec<_>>().join(", ")
                ),
                &gathered.command,
            )
        };

        result
            .with_detail(
                "interfaces",
                json!(interfaces
                    .iter()
                    .map(|i| {
                        let counters = stats.get(&i.name).copied().unwrap_or_default();
                        json!({
                            "name": i.name,
                            "state": i.state.as_str(),
                            "addresses": addresses
                                .as_ref()
                                .and_then(|m| m.get(&i.name))
                                .cloned()
                                .unwrap_or_default(),
                            "rx_errors": counters.rx_errors,
                            "tx_errors": counters.tx_errors,
                        })
                    })
                    .collect::<Vec<_>>()),
            )
            .with_detail("source", gathered.source.as_str())
    }

    async fn check_routes(&self) -> CheckResult {
        let command = "ip route show";
        let gathered = match self.gatherer.command(command).await {
            Ok(g) => g,
            Err(e) => return CheckResult::unknown(format!("ip not available: {}", e), command),
        };

        match parse_default_route(&gathered.output) {
            Some(route) => CheckResult::healthy(
                format!("default route via {}", route.via.as_deref().unwrap_or("direct")),
                &gathered.command,
            )
            .with_detail("gateway", route.via.unwrap_or_default())
            .with_detail("device", route.dev.unwrap_or_default())
            .with_detail("source", gathered.source.as_str()),
            // A node without a default route cannot reach the API server or
            // pull images; this is an outage, not a warning.
            None => CheckResult::critical("no default route configured", &gathered.command)
                .with_detail("source", gathered.source.as_str()),
        }
    }

    async fn check_sockets(&self) -> CheckResult {
        let command = "ss -s";
        let gathered = match self.gatherer.command(command).await {
            Ok(g) => g,
            Err(e) => return CheckResult::unknown(format!("ss not available: {}", e), command),
        };

        let Some(sockets) = parse_ss_summary(&gathered.output) else {
            return CheckResult::warning("unexpected ss -s output", &gathered.command)
                .with_detail("raw", gathered.output.lines().take(5).collect::<Vec<_>>().join("\n"));
        };

        let mut reasons = Vec::new();
        if sockets.orphaned > ORPHANED_WARN {
            reasons.push(format!("{} orphaned TCP sockets", sockets.orphaned));
        }
        if sockets.timewait > TIMEWAIT_WARN {
            reasons.push(format!("{} sockets in TIME-WAIT", sockets.timewait));
        }

        let result = if reasons.is_empty() {
            CheckResult::healthy(
                format!("{} TCP sockets ({} established)", sockets.total, sockets.established),
                &gathered.command,
            )
        } else {
            CheckResult::warning(reasons.join("; "), &gathered.command)
        };

        result
            .with_detail("tcp_total", sockets.total)
            .with_detail("established", sockets.established)
            .with_detail("orphaned", sockets.orphaned)
            .with_detail("timewait", sockets.timewait)
            .with_detail("source", gathered.source.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
    Unknown,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Up => "up",
            LinkState::Down => "down",
            LinkState::Unknown => "unknown",
        }
    }
}

#[derive(Debug)]
pub struct Interface {
    pub name: String,
    pub state: LinkState,
}

/// Parse `ip -o link show` lines:
/// `2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 ... state UP ...`
pub fn parse_ip_link(output: &str) -> Vec<Interface> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ':');
            let _index = parts.next()?;
            let name = parts.next()?.trim();
            let rest = parts.next()?;
            if name.is_empty() {
                return None;
            }
            let state = match rest
                .split_whitespace()
                .skip_while(|w| *w != "state")
                .nth(1)
            {
                Some("UP") => LinkState::Up,
                Some("DOWN") => LinkState::Down,
                // "UNKNOWN" is normal for lo and tunnels; judge by flags
                _ => {
                    if rest.contains("LOWER_UP") || rest.contains(",UP") || rest.contains("<UP") {
                        LinkState::Up
                    } else {
                        LinkState::Unknown
                    }
                }
            };
            // `ip -o` can suffix VLAN names with @parent
            let name = name.split('@').next().unwrap_or(name);
            Some(Interface {
                name: name.to_string(),
                state,
            })
        })
        .collect()
}

/// Down non-loopback interfaces that carry addresses. An unaddressed down
/// link is an unconfigured port, not a fault; with no address data at all
/// every down link counts.
pub fn down_with_addresses<'a>(
    interfaces: &'a [Interface],
    addresses: Option<&BTreeMap<String, Vec<String>>>,
) -> Vec<&'a Interface> {
    interfaces
        .iter()
        .filter(|i| i.state == LinkState::Down && i.name != "lo")
        .filter(|i| match addresses {
            Some(map) => map.get(&i.name).is_some_and(|a| !a.is_empty()),
            None => true,
        })
        .collect()
}

/// Parse `ip -o a` lines into interface → address list:
/// `2: eth0    inet 10.0.0.5/24 brd 10.0.0.255 scope global eth0\ ...`
pub fn parse_ip_addresses(output: &str) -> BTreeMap<String, Vec<String>> {
    let mut addresses: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in output.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.len() < 4 || !matches!(words[2], "inet" | "inet6") {
            continue;
        }
        let name = words[1].split('@').next().unwrap_or(words[1]);
        addresses
            .entry(name.to_string())
            .or_default()
            .push(words[3].to_string());
    }
    addresses
}

/// Per-interface error counters from `ip -s link`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub rx_errors: u64,
    pub tx_errors: u64,
}

/// Parse `ip -s link`: each interface block carries an `RX:`/`TX:` header
/// line naming the columns, followed by one line of counters.
pub fn parse_ip_stats(output: &str) -> BTreeMap<String, LinkStats> {
    let mut stats: BTreeMap<String, LinkStats> = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut pending: Option<(bool, usize)> = None;

    for line in output.lines() {
        let trimmed = line.trim_start();
        if !line.starts_with(char::is_whitespace) {
            if let Some((index, rest)) = line.split_once(':') {
                if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                    let name = rest.split(':').next().unwrap_or("").trim();
                    let name = name.split('@').next().unwrap_or(name);
                    current = Some(name.to_string());
                    pending = None;
                    continue;
                }
            }
        }
        if let Some((is_rx, column)) = pending.take() {
            let values: Vec<u64> = trimmed
                .split_whitespace()
                .filter_map(|v| v.parse().ok())
                .collect();
            if let (Some(name), Some(errors)) = (current.as_ref(), values.get(column)) {
                let entry = stats.entry(name.clone()).or_default();
                if is_rx {
                    entry.rx_errors = *errors;
                } else {
                    entry.tx_errors = *errors;
                }
            }
            continue;
        }
        let is_rx = trimmed.starts_with("RX:");
        if let Some(header) = trimmed.strip_prefix("RX:").or_else(|| trimmed.strip_prefix("TX:")) {
            if let Some(column) = header.split_whitespace().position(|w| w == "errors") {
                pending = Some((is_rx, column));
            }
        }
    }
    stats
}

#[derive(Debug, PartialEq)]
pub struct DefaultRoute {
    pub via: Option<String>,
    pub dev: Option<String>,
}

pub fn parse_default_route(output: &str) -> Option<DefaultRoute> {
    for line in output.lines() {
        if !line.starts_with("default") {
            continue;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        let value_after = |key: &str| {
            words
                .iter()
                .position(|w| *w == key)
                .and_then(|i| words.get(i + 1))
                .map(|s| s.to_string())
        };
        return Some(DefaultRoute {
            via: value_after("via"),
            dev: value_after("dev"),
        });
    }
    None
}

#[derive(Debug, Default, PartialEq)]
pub struct SocketSummary {
    pub total: u64,
    pub established: u64,
    pub orphaned: u64,
    pub timewait: u64,
}

/// Parse the TCP line of `ss -s`:
/// `TCP:   512 (estab 120, closed 350, orphaned 2, timewait 340)`
pub fn parse_ss_summary(output: &str) -> Option<SocketSummary> {
    let line = output.lines().find(|l| l.trim_start().starts_with("TCP:"))?;
    let total = parse::columns(line, 2)?
        .get(1)
        .and_then(|v| v.parse().ok())?;

    let field = |name: &str| -> u64 {
        line.split(['(', ',', ')'])
            .filter_map(|part| {
                let part = part.trim();
                let rest = part.strip_prefix(name)?;
                rest.trim().parse().ok()
            })
            .next()
            .unwrap_or(0)
    };

    Some(SocketSummary {
        total,
        established: field("estab"),
        orphaned: field("orphaned"),
        timewait: field("timewait"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const IP_LINK_OUTPUT: &str = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT group default qlen 1000\\    link/loopback 00:00:00:00:00:00
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP mode DEFAULT group default qlen 1000\\    link/ether aa:bb:cc:dd:ee:ff
3: eth1: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN mode DEFAULT group default qlen 1000\\    link/ether aa:bb:cc:dd:ee:00
4: vlan10@eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue state UP mode DEFAULT group default qlen 1000\\    link/ether aa:bb:cc:dd:ee:ff
";

    #[test]
    fn ip_link_parses_states_and_vlan_names() {
        let interfaces = parse_ip_link(IP_LINK_OUTPUT);
        assert_eq!(interfaces.len(), 4);
        assert_eq!(interfaces[0].name, "lo");
        assert_eq!(interfaces[0].state, LinkState::Up); // LOWER_UP flags
        assert_eq!(interfaces[1].state, LinkState::Up);
        assert_eq!(interfaces[2].state, LinkState::Down);
        assert_eq!(interfaces[3].name, "vlan10");
    }

    const IP_ADDR_OUTPUT: &str = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: eth0    inet 10.0.0.5/24 brd 10.0.0.255 scope global eth0\\       valid_lft forever preferred_lft forever
2: eth0    inet6 fe80::1/64 scope link\\       valid_lft forever preferred_lft forever
";

    #[test]
    fn ip_addresses_group_by_interface() {
        let addresses = parse_ip_addresses(IP_ADDR_OUTPUT);
        assert_eq!(addresses["lo"], vec!["127.0.0.1/8"]);
        assert_eq!(addresses["eth0"], vec!["10.0.0.5/24", "fe80::1/64"]);
        assert!(!addresses.contains_key("eth1"));
    }

    #[test]
    fn unaddressed_down_links_do_not_warn() {
        let interfaces = parse_ip_link(IP_LINK_OUTPUT);
        let addresses = parse_ip_addresses(IP_ADDR_OUTPUT);

        // eth1 is down but carries no addresses: an unconfigured port
        assert!(down_with_addresses(&interfaces, Some(&addresses)).is_empty());

        // same link with an address is a fault
        let mut addressed = addresses.clone();
        addressed.insert("eth1".to_string(), vec!["10.0.1.5/24".to_string()]);
        let down = down_with_addresses(&interfaces, Some(&addressed));
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].name, "eth1");

        // no address data at all: stay conservative
        assert_eq!(down_with_addresses(&interfaces, None).len(), 1);
    }

    #[test]
    fn ip_stats_pick_the_errors_column() {
        let output = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN mode DEFAULT group default qlen 1000
    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
    RX: bytes  packets  errors  dropped overrun mcast
    84219      842      0       0       0       0
    TX: bytes  packets  errors  dropped carrier collsns
    84219      842      0       0       0       0
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc mq state UP mode DEFAULT group default qlen 1000
    link/ether aa:bb:cc:dd:ee:ff brd ff:ff:ff:ff:ff:ff
    RX: bytes  packets  errors  dropped overrun mcast
    3800346516 2240149  7       12      0       0
    TX: bytes  packets  errors  dropped carrier collsns
    990124416  1160426  3       0       0       0
";
        let stats = parse_ip_stats(output);
        assert_eq!(stats["lo"], LinkStats { rx_errors: 0, tx_errors: 0 });
        assert_eq!(stats["eth0"], LinkStats { rx_errors: 7, tx_errors: 3 });
    }

    #[test]
    fn default_route_extraction() {
        let output = "default via 10.0.0.1 dev eth0 proto dhcp metric 100\n10.0.0.0/24 dev eth0 proto kernel scope link\n";
        let route = parse_default_route(output).unwrap();
        assert_eq!(route.via.as_deref(), Some("10.0.0.1"));
        assert_eq!(route.dev.as_deref(), Some("eth0"));
        assert!(parse_default_route("10.0.0.0/24 dev eth0\n").is_none());
    }

    #[test]
    fn ss_summary_fields() {
        let output = "\
Total: 1024
TCP:   512 (estab 120, closed 350, orphaned 2, timewait 340)

Transport Total     IP        IPv6
RAW       0         0         0
";
        let summary = parse_ss_summary(output).unwrap();
        assert_eq!(summary.total, 512);
        assert_eq!(summary.established, 120);
        assert_eq!(summary.orphaned, 2);
        assert_eq!(summary.timewait, 340);
    }

    #[test]
    fn ss_summary_rejects_garbage() {
        assert!(parse_ss_summary("no tcp line here").is_none());
    }
}
