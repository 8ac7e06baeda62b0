//! Desired-state computation for the agent DaemonSet.
//!
//! The desired workload is a pure function of the current set of non-wildcard
//! NodeChecks: merged selectors and tolerations plus a fixed image and mount
//! policy. Comparison against the live object looks only at the observable
//! fields we manage (image, node selector, tolerations) so defaulted
//! server-side fields never cause spurious updates.

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, HostPathVolumeSource, ObjectFieldSelector, PodSpec,
    PodTemplateSpec, SecurityContext, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::ObjectMeta;
use nodepulse_common::NodeCheck;
use std::collections::BTreeMap;

use super::merge::{merge_node_selectors, merge_tolerations, to_core_tolerations};

pub const AGENT_NAME: &str = "nodepulse-agent";
pub const DEFAULT_AGENT_IMAGE: &str = "ghcr.io/nodepulse/nodepulse-agent:0.1.0";
const APP_LABEL: &str = "app.kubernetes.io/name";

/// What reconciliation decided to do. `Nothing` is the idempotent steady
/// state: an unchanged world performs zero mutating calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementAction {
    Create,
    Update,
    Delete,
    Nothing,
}

/// The fields of the agent workload this controller manages.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredAgent {
    pub image: String,
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Vec<Toleration>,
}

impl DesiredAgent {
    /// Pure function of the active (non-wildcard) request set.
    pub fn from_requests(checks: &[NodeCheck], image: &str) -> Self {
        Self {
            image: image.to_string(),
            node_selector: merge_node_selectors(checks),
            tolerations: to_core_tolerations(&merge_tolerations(checks)),
        }
    }
}

/// Decide the reconcile action from active-request count and live state.
pub fn decide(active_requests: usize, live: Option<&DaemonSet>, desired: &DesiredAgent) -> PlacementAction {
    match (active_requests, live) {
        (0, None) => PlacementAction::Nothing,
        (0, Some(_)) => PlacementAction::Delete,
        (_, None) => PlacementAction::Create,
        (_, Some(live)) => {
            if needs_update(live, desired) {
                PlacementAction::Update
            } else {
                PlacementAction::Nothing
            }
        }
    }
}

/// Compare only observable managed fields of the live DaemonSet.
pub fn needs_update(live: &DaemonSet, desired: &DesiredAgent) -> bool {
    let Some(pod_spec) = live
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
    else {
        return true;
    };

    let live_image = pod_spec
        .containers
        .first()
        .and_then(|c| c.image.as_deref())
        .unwrap_or("");
    if live_image != desired.image {
        return true;
    }

    let live_selector = pod_spec.node_selector.clone().unwrap_or_default();
    if live_selector != desired.node_selector {
        return true;
    }

    let live_tolerations = pod_spec.tolerations.clone().unwrap_or_default();
    live_tolerations != desired.tolerations
}

/// Render the full DaemonSet object for create/update.
pub fn build_daemonset(desired: &DesiredAgent, namespace: &str) -> DaemonSet {
    let labels: BTreeMap<String, String> =
        [(APP_LABEL.to_string(), AGENT_NAME.to_string())].into();

    let container = Container {
        name: AGENT_NAME.to_string(),
        image: Some(desired.image.clone()),
        env: Some(vec![
            EnvVar {
                name: "NODE_NAME".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "spec.nodeName".to_string(),
                        ..ObjectFieldSelector::default()
                    }),
                    ..EnvVarSource::default()
                }),
                ..EnvVar::default()
            },
            EnvVar {
                name: "HOST_ROOT".to_string(),
                value: Some("/host".to_string()),
                ..EnvVar::default()
            },
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: "host-root".to_string(),
            mount_path: "/host".to_string(),
            read_only: Some(true),
            ..VolumeMount::default()
        }]),
        // Host PID namespace plus privilege is what lets nsenter reach the
        // host's mount/net/pid namespaces from inside the container.
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..SecurityContext::default()
        }),
        ..Container::default()
    };

    DaemonSet {
        metadata: ObjectMeta {
            name: Some(AGENT_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    host_pid: Some(true),
                    host_network: Some(true),
                    service_account_name: Some(AGENT_NAME.to_string()),
                    node_selector: if desired.node_selector.is_empty() {
                        None
                    } else {
                        Some(desired.node_selector.clone())
                    },
                    tolerations: if desired.tolerations.is_empty() {
                        None
                    } else {
                        Some(desired.tolerations.clone())
                    },
                    volumes: Some(vec![Volume {
                        name: "host-root".to_string(),
                        host_path: Some(HostPathVolumeSource {
                            path: "/".to_string(),
                            ..HostPathVolumeSource::default()
                        }),
                        ..Volume::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            ..DaemonSetSpec::default()
        }),
        ..DaemonSet::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired(image: &str, selector: &[(&str, &str)]) -> DesiredAgent {
        DesiredAgent {
            image: image.to_string(),
            node_selector: selector
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            tolerations: Vec::new(),
        }
    }

    #[test]
    fn decide_covers_all_level_transitions() {
        let d = desired(DEFAULT_AGENT_IMAGE, &[]);
        let live = build_daemonset(&d, "nodepulse");

        assert_eq!(decide(0, None, &d), PlacementAction::Nothing);
        assert_eq!(decide(0, Some(&live), &d), PlacementAction::Delete);
        assert_eq!(decide(2, None, &d), PlacementAction::Create);
        assert_eq!(decide(2, Some(&live), &d), PlacementAction::Nothing);
    }

    #[test]
    fn unchanged_world_requires_no_update() {
        let d = desired(DEFAULT_AGENT_IMAGE, &[("zone", "eu-1")]);
        let live = build_daemonset(&d, "nodepulse");
        assert!(!needs_update(&live, &d));
        assert_eq!(decide(1, Some(&live), &d), PlacementAction::Nothing);
    }

    #[test]
    fn observable_field_drift_triggers_update() {
        let d = desired(DEFAULT_AGENT_IMAGE, &[("zone", "eu-1")]);
        let live = build_daemonset(&d, "nodepulse");

        let new_image = desired("ghcr.io/nodepulse/nodepulse-agent:0.2.0", &[("zone", "eu-1")]);
        assert!(needs_update(&live, &new_image));

        let new_selector = desired(DEFAULT_AGENT_IMAGE, &[("zone", "us-1")]);
        assert!(needs_update(&live, &new_selector));
        assert_eq!(decide(1, Some(&live), &new_selector), PlacementAction::Update);
    }

    #[test]
    fn daemonset_mounts_host_root_read_only() {
        let ds = build_daemonset(&desired(DEFAULT_AGENT_IMAGE, &[]), "nodepulse");
        let pod = ds.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.host_pid, Some(true));
        let mount = &pod.containers[0].volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_path, "/host");
        assert_eq!(mount.read_only, Some(true));
    }
}
