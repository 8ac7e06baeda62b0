//! Merging scheduling constraints from many NodeChecks into the one agent
//! DaemonSet.
//!
//! Selectors union across requests; a key claimed by two requests with
//! different values keeps the value of the lexically-first request by name,
//! and the conflict is logged. Tolerations union with deduplication by
//! (key, operator, effect).

use k8s_openapi::api::core::v1::Toleration;
use nodepulse_common::{CheckToleration, NodeCheck};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// Union of node selectors across requests. Wildcard requests never
/// contribute selectors (a selector on "every node" would shrink the fleet
/// the wildcard is supposed to cover). Requests are processed in lexical
/// name order so conflicting keys resolve deterministically: first writer
/// wins.
pub fn merge_node_selectors(checks: &[NodeCheck]) -> BTreeMap<String, String> {
    let mut ordered: Vec<&NodeCheck> = checks.iter().filter(|c| !c.is_wildcard()).collect();
    ordered.sort_by_key(|c| c.metadata.name.clone().unwrap_or_default());

    let mut merged = BTreeMap::new();
    for check in ordered {
        let name = check.metadata.name.as_deref().unwrap_or("<unnamed>");
        for (key, value) in &check.spec.node_selector {
            match merged.get(key) {
                Some(existing) if existing != value => {
                    warn!(
                        "selector conflict on {:?}: keeping {:?}, ignoring {:?} from NodeCheck {}",
                        key, existing, value, name
                    );
                }
                Some(_) => {}
                None => {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
    }
    merged
}

/// Union of tolerations across all requests, wildcards included, deduplicated
/// by identity. Order of first appearance (lexical by request name) is kept
/// so the rendered DaemonSet is stable.
pub fn merge_tolerations(checks: &[NodeCheck]) -> Vec<CheckToleration> {
    let mut ordered: Vec<&NodeCheck> = checks.iter().collect();
    ordered.sort_by_key(|c| c.metadata.name.clone().unwrap_or_default());

    let mut seen: HashSet<(Option<String>, Option<String>, Option<String>)> = HashSet::new();
    let mut merged = Vec::new();
    for check in ordered {
        for toleration in &check.spec.tolerations {
            let (key, op, effect) = toleration.identity();
            let identity = (
                key.map(str::to_string),
                op.map(str::to_string),
                effect.map(str::to_string),
            );
            if seen.insert(identity) {
                merged.push(toleration.clone());
            }
        }
    }
    merged
}

/// Render to the core/v1 type carried on the pod spec.
pub fn to_core_tolerations(tolerations: &[CheckToleration]) -> Vec<Toleration> {
    tolerations
        .iter()
        .map(|t| Toleration {
            key: t.key.clone(),
            operator: t.operator.clone(),
            value: t.value.clone(),
            effect: t.effect.clone(),
            toleration_seconds: t.toleration_seconds,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;
    use nodepulse_common::NodeCheckSpec;

    fn check(name: &str, node: &str, selector: &[(&str, &str)], tolerations: Vec<CheckToleration>) -> NodeCheck {
        let mut nc = NodeCheck::new(
            name,
            NodeCheckSpec {
                node: node.to_string(),
                node_selector: selector
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                tolerations,
                ..NodeCheckSpec::default()
            },
        );
        nc.metadata = ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        };
        nc
    }

    fn toleration(key: &str, value: Option<&str>) -> CheckToleration {
        CheckToleration {
            key: Some(key.to_string()),
            operator: Some("Equal".to_string()),
            value: value.map(str::to_string),
            effect: Some("NoSchedule".to_string()),
            toleration_seconds: None,
        }
    }

    #[test]
    fn selectors_union_across_requests() {
        let checks = vec![
            check("a", "worker-1", &[("zone", "eu-1")], vec![]),
            check("b", "worker-2", &[("disk", "ssd")], vec![]),
        ];
        let merged = merge_node_selectors(&checks);
        assert_eq!(merged["zone"], "eu-1");
        assert_eq!(merged["disk"], "ssd");
    }

    #[test]
    fn selector_conflict_resolves_to_lexically_first_request() {
        let checks = vec![
            check("zz-late", "worker-1", &[("zone", "us-1")], vec![]),
            check("aa-early", "worker-2", &[("zone", "eu-1")], vec![]),
        ];
        let merged = merge_node_selectors(&checks);
        assert_eq!(merged["zone"], "eu-1");
    }

    #[test]
    fn wildcard_requests_contribute_no_selectors() {
        let checks = vec![check("all", "*", &[("zone", "eu-1")], vec![])];
        assert!(merge_node_selectors(&checks).is_empty());
    }

    #[test]
    fn tolerations_dedupe_by_identity() {
        let checks = vec![
            check("a", "worker-1", &[], vec![toleration("dedicated", Some("infra"))]),
            check("b", "worker-2", &[], vec![toleration("dedicated", Some("other"))]),
            check("c", "*", &[], vec![toleration("gpu", None)]),
        ];
        let merged = merge_tolerations(&checks);
        assert_eq!(merged.len(), 2);
        // first writer's value survives
        assert_eq!(merged[0].value.as_deref(), Some("infra"));
        assert_eq!(merged[1].key.as_deref(), Some("gpu"));
    }

    #[test]
    fn wildcard_tolerations_are_included() {
        let checks = vec![check("all", "*", &[], vec![toleration("master", None)])];
        assert_eq!(merge_tolerations(&checks).len(), 1);
    }
}
