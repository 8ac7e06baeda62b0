//! Check executors and the bounded check cycle.
//!
//! Each executor owns the probes of one category. Probe contract: a probe
//! returns a [`CheckResult`] and never an error; anything unexpected
//! degrades to Warning/Unknown with an explanatory message. One probe
//! failing (or hanging past its deadline) never blocks its siblings.

pub mod disk;
pub mod hardware;
pub mod kubernetes;
pub mod network;
pub mod system;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::warn;
use nodepulse_common::{CheckCategory, CheckResult, ResultBundle};
use std::sync::Arc;
use std::time::Duration;

/// One category's probe set.
#[async_trait]
pub trait Executor: Send + Sync {
    fn category(&self) -> CheckCategory;

    /// Names of the probes this executor can run.
    fn probe_names(&self) -> &'static [&'static str];

    /// Run one named probe. Must degrade, never fail.
    async fn probe(&self, name: &str) -> CheckResult;
}

/// Runs probes across executors through a bounded worker pool, with a
/// per-probe deadline. Probes share nothing; each writes only its own slot
/// in the bundle.
pub struct CheckRunner {
    executors: Vec<Arc<dyn Executor>>,
    workers: usize,
    probe_deadline: Duration,
}

impl CheckRunner {
    pub fn new(executors: Vec<Arc<dyn Executor>>, workers: usize, probe_deadline: Duration) -> Self {
        Self {
            executors,
            workers: workers.max(1),
            probe_deadline,
        }
    }

    /// Execute every probe of the enabled categories and collect the bundle.
    pub async fn run_cycle(&self, enabled: &[CheckCategory]) -> ResultBundle {
        let jobs: Vec<(Arc<dyn Executor>, CheckCategory, &'static str)> = self
            .executors
            .iter()
            .filter(|executor| enabled.contains(&executor.category()))
            .flat_map(|executor| {
                executor
                    .probe_names()
                    .iter()
                    .map(move |name| (executor.clone(), executor.category(), *name))
            })
            .collect();

        let deadline = self.probe_deadline;
        let outcomes = stream::iter(jobs)
            .map(|(executor, category, name)| async move {
                let result = match tokio::time::timeout(deadline, executor.probe(name)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("probe {}/{} exceeded {:?} deadline", category.as_str(), name, deadline);
                        CheckResult::warning(
                            format!("probe timed out after {:?}", deadline),
                            name,
                        )
                    }
                };
                (category, name, result)
            })
            .buffer_unordered(self.workers)
            .collect::<Vec<_>>()
            .await;

        let mut bundle = ResultBundle::new();
        for (category, name, result) in outcomes {
            bundle.insert(category, name, result);
        }
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodepulse_common::CheckStatus;

    struct FakeExecutor {
        category: CheckCategory,
    }

    #[async_trait]
    impl Executor for FakeExecutor {
        fn category(&self) -> CheckCategory {
            self.category
        }

        fn probe_names(&self) -> &'static [&'static str] {
            &["ok", "slow", "degraded"]
        }

        async fn probe(&self, name: &str) -> CheckResult {
            match name {
                "ok" => CheckResult::healthy("fine", "fake"),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    CheckResult::healthy("never returned", "fake")
                }
                _ => CheckResult::unknown("tool absent", "fake"),
            }
        }
    }

    #[tokio::test]
    async fn hung_probe_degrades_and_siblings_publish() {
        let runner = CheckRunner::new(
            vec![Arc::new(FakeExecutor {
                category: CheckCategory::System,
            })],
            4,
            Duration::from_millis(50),
        );
        let bundle = runner.run_cycle(&[CheckCategory::System]).await;
        assert_eq!(bundle.len(), 3);

        let results: std::collections::BTreeMap<_, _> = bundle
            .iter()
            .map(|(_, name, result)| (name.clone(), result.clone()))
            .collect();
        assert_eq!(results["ok"].status, CheckStatus::Healthy);
        assert_eq!(results["slow"].status, CheckStatus::Warning);
        assert!(results["slow"].message.contains("timed out"));
        assert_eq!(results["degraded"].status, CheckStatus::Unknown);
    }

    #[tokio::test]
    async fn disabled_categories_are_skipped() {
        let runner = CheckRunner::new(
            vec![Arc::new(FakeExecutor {
                category: CheckCategory::System,
            })],
            2,
            Duration::from_secs(1),
        );
        let bundle = runner.run_cycle(&[CheckCategory::Disk]).await;
        assert!(bundle.is_empty());
    }
}
