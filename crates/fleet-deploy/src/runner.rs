//! Parallel runner for the executors of one stage
//!
//! Every executor gets its own task. Failures never cancel siblings; the
//! runner waits for all of them and reports every outcome.

use crate::{Error, Executor, Result};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One failed executor
#[derive(Debug)]
pub struct Failure {
    /// Display name of the executor
    pub executor: String,
    /// What went wrong
    pub error: Error,
}

impl Failure {
    /// Pair an error with the executor that produced it
    pub fn new(executor: impl Into<String>, error: Error) -> Self {
        Self {
            executor: executor.into(),
            error,
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.executor, self.error)
    }
}

/// Outcome of running a set of executors
#[derive(Debug, Default)]
pub struct RunReport {
    /// Executors that completed successfully
    pub succeeded: Vec<String>,
    /// Executors that failed
    pub failures: Vec<Failure>,
}

impl RunReport {
    /// Whether every executor succeeded
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Coalesce the failures into one stage error.
    ///
    /// Nested stage errors are flattened so each failure keeps the name of
    /// the executor that produced it.
    pub fn into_result(self, stage: &str) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let mut failures = Vec::with_capacity(self.failures.len());
        for failure in self.failures {
            match failure.error {
                Error::Stage { failures: inner, .. } => failures.extend(inner),
                error => failures.push(Failure::new(failure.executor, error)),
            }
        }
        Err(Error::Stage {
            stage: stage.to_string(),
            failures,
        })
    }
}

/// Run every executor concurrently and collect all outcomes
pub async fn run_all(executors: Vec<Arc<dyn Executor>>) -> RunReport {
    let mut report = RunReport::default();
    if executors.is_empty() {
        return report;
    }

    // Sized to the stage so no task ever blocks on send
    let (tx, rx) = async_channel::bounded(executors.len());
    let mut tasks = Vec::with_capacity(executors.len());

    for executor in executors {
        let tx = tx.clone();
        tasks.push(smol::spawn(async move {
            let name = executor.name().to_string();
            debug!("Executing {}", name);
            let outcome = AssertUnwindSafe(executor.execute())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(Error::Internal(format!(
                        "executor panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });
            // The receiver is alive until every task has been joined
            let _ = tx.send((name, outcome)).await;
        }));
    }
    drop(tx);

    futures::future::join_all(tasks).await;

    while let Ok((name, outcome)) = rx.try_recv() {
        match outcome {
            Ok(()) => report.succeeded.push(name),
            Err(error) => {
                warn!("{} failed: {}", name, error);
                report.failures.push(Failure::new(name, error));
            }
        }
    }
    report
}

/// Run one stage and fail with a coalesced error if any executor failed
pub async fn run_stage(stage: &str, executors: Vec<Arc<dyn Executor>>) -> Result<()> {
    if executors.is_empty() {
        debug!("Stage '{}' has nothing to do", stage);
        return Ok(());
    }
    info!("Running stage '{}' ({} executor(s))", stage, executors.len());
    let report = run_all(executors).await;
    if report.is_success() {
        info!("Stage '{}' completed", stage);
    }
    report.into_result(stage)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        name: String,
        fail: bool,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Executor for Probe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&self) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Conflict(format!("{} exists", self.name)));
            }
            Ok(())
        }
    }

    struct Panicking;

    #[async_trait]
    impl Executor for Panicking {
        fn name(&self) -> &str {
            "Panicking"
        }

        async fn execute(&self) -> Result<()> {
            panic!("boom");
        }
    }

    fn probe(name: &str, fail: bool, runs: &Arc<AtomicUsize>) -> Arc<dyn Executor> {
        Arc::new(Probe {
            name: name.to_string(),
            fail,
            runs: runs.clone(),
        })
    }

    #[smol_potat::test]
    async fn test_one_failure_does_not_abort_siblings() {
        let runs = Arc::new(AtomicUsize::new(0));
        let report = run_all(vec![
            probe("a", false, &runs),
            probe("b", true, &runs),
            probe("c", false, &runs),
        ])
        .await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].executor, "b");
        assert_eq!(report.succeeded.len(), 2);
    }

    #[smol_potat::test]
    async fn test_panic_becomes_internal_error() {
        let runs = Arc::new(AtomicUsize::new(0));
        let report = run_all(vec![Arc::new(Panicking), probe("ok", false, &runs)]).await;

        assert_eq!(report.succeeded, vec!["ok".to_string()]);
        assert_eq!(report.failures.len(), 1);
        let msg = report.failures[0].error.to_string();
        assert!(msg.contains("panicked") && msg.contains("boom"));
    }

    #[smol_potat::test]
    async fn test_empty_stage_succeeds() {
        run_stage("nothing", Vec::new()).await.unwrap();
    }

    #[test]
    fn test_nested_stage_errors_are_flattened() {
        let report = RunReport {
            succeeded: vec![],
            failures: vec![Failure::new(
                "partition edge",
                Error::Stage {
                    stage: "inner".to_string(),
                    failures: vec![Failure::new("AgentConfig r2", Error::NotFound("r9".into()))],
                },
            )],
        };
        match report.into_result("agent configuration").unwrap_err() {
            Error::Stage { stage, failures } => {
                assert_eq!(stage, "agent configuration");
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].executor, "AgentConfig r2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
