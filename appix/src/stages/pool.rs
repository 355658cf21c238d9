//! Concurrent execution of one stage phase.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error};

use super::{StageDefinition, StageResult, StageRunner};

/// Results of one pool run.
#[derive(Debug, Clone, Default)]
pub struct PoolOutcome {
    /// One result per stage, in declaration order.
    pub results: Vec<StageResult>,
}

impl PoolOutcome {
    /// Returns true if at least one stage failed or could not be started.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.results.iter().any(|r| !r.is_success())
    }

    /// Names of the failed stages, in declaration order.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.name.clone())
            .collect()
    }
}

/// Fan-out/fan-in executor for a list of stages.
///
/// Every stage runs as its own task. The pool waits for all of them, even
/// after a failure, so the outcome always covers every stage. Failed stages
/// are not retried.
#[derive(Clone)]
pub struct StagePool {
    runner: Arc<dyn StageRunner>,
}

impl StagePool {
    /// Creates a pool that runs stages with `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn StageRunner>) -> Self {
        Self { runner }
    }

    /// Runs all stages concurrently and waits for every one of them.
    pub async fn run(&self, stages: &[StageDefinition]) -> PoolOutcome {
        if stages.is_empty() {
            return PoolOutcome::default();
        }

        debug!(count = stages.len(), "Launching stage pool");

        let handles = stages.iter().cloned().map(|stage| {
            let runner = Arc::clone(&self.runner);
            tokio::spawn(async move { runner.run_stage(&stage).await })
        });

        let joined = join_all(handles).await;

        let results = joined
            .into_iter()
            .zip(stages)
            .map(|(joined, stage)| match joined {
                Ok(result) => result,
                Err(join_error) => {
                    error!(stage = %stage.name, error = %join_error, "Stage task aborted");
                    StageResult::launch_failed(
                        &stage.name,
                        Utc::now(),
                        format!("stage task aborted: {join_error}"),
                    )
                }
            })
            .collect();

        PoolOutcome { results }
    }
}

impl std::fmt::Debug for StagePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePool").finish_non_exhaustive()
    }
}
