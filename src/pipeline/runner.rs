//! Host loop: one mailbox scan per iteration, then every instance.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::HostConfig;
use crate::error::PipelineError;
use crate::pipeline::instance::{InboxReport, Instance};
use crate::routing::{CycleReport, MessageRouter};

/// How the runner schedules iterations.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub iterations: u32,
    pub interval: Duration,
    /// One task per instance instead of one task for all of them.
    pub use_threads: bool,
    pub timeout_per_iteration: Duration,
    /// Stop once this file's modification time changes.
    pub watch_path: Option<PathBuf>,
}

impl From<&HostConfig> for RunnerSettings {
    fn from(host: &HostConfig) -> Self {
        Self {
            iterations: host.iterations,
            interval: host.interval,
            use_threads: host.use_threads,
            timeout_per_iteration: host.timeout_per_iteration,
            watch_path: Some(host.config_path.clone()),
        }
    }
}

/// Totals for one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub cycle: CycleReport,
    pub inbox: InboxReport,
    /// Instances whose cycle ended in an error.
    pub failed_instances: Vec<String>,
}

type SharedInstance = Arc<Mutex<Instance>>;
type InstanceResult = (String, Result<InboxReport, PipelineError>);

pub struct Runner {
    router: Arc<MessageRouter>,
    instances: Vec<SharedInstance>,
    settings: RunnerSettings,
}

impl Runner {
    pub fn new(router: Arc<MessageRouter>, instances: Vec<Instance>, settings: RunnerSettings) -> Self {
        Self {
            router,
            instances: instances
                .into_iter()
                .map(|i| Arc::new(Mutex::new(i)))
                .collect(),
            settings,
        }
    }

    /// Scan the mailbox once, then process every instance's queue.
    ///
    /// Instances that are still running at the deadline are left running and
    /// the iteration fails with [`PipelineError::Timeout`].
    pub async fn run_iteration(&self) -> Result<IterationReport, PipelineError> {
        let router = Arc::clone(&self.router);
        let cycle = tokio::task::spawn_blocking(move || router.process_cycle())
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))??;

        let handles = if self.settings.use_threads {
            self.instances
                .iter()
                .map(|instance| spawn_instances(vec![Arc::clone(instance)]))
                .collect()
        } else {
            vec![spawn_instances(self.instances.clone())]
        };

        let timeout = self.settings.timeout_per_iteration;
        let Ok(joined) = tokio::time::timeout(timeout, join_all(handles)).await else {
            error!(timeout = ?timeout, "Instances did not finish within the iteration timeout");
            return Err(PipelineError::Timeout { timeout });
        };

        let mut report = IterationReport {
            cycle,
            ..Default::default()
        };
        for task in joined {
            let results = task.map_err(|e| PipelineError::Join(e.to_string()))?;
            for (name, result) in results {
                match result {
                    Ok(inbox) => {
                        report.inbox.created += inbox.created;
                        report.inbox.updated += inbox.updated;
                        report.inbox.failed += inbox.failed;
                    }
                    Err(e) => {
                        error!(instance = %name, error = %e, "Instance cycle failed");
                        report.failed_instances.push(name);
                    }
                }
            }
        }

        Ok(report)
    }

    /// Run up to `iterations` iterations, pausing `interval` between them.
    ///
    /// Returns early when the watched configuration file changes. A timed-out
    /// iteration ends the run with its error; other iteration errors are logged.
    pub async fn run(&self) -> Result<(), PipelineError> {
        let initial_mtime = match &self.settings.watch_path {
            Some(path) => modified_time(path).await,
            None => None,
        };

        for iteration in 1..=self.settings.iterations {
            info!(iteration, total = self.settings.iterations, "Starting iteration");

            match self.run_iteration().await {
                Ok(report) => info!(
                    iteration,
                    fetched = report.cycle.fetched,
                    unmatched = report.cycle.unmatched,
                    processed = report.inbox.processed(),
                    failed = report.inbox.failed,
                    failed_instances = report.failed_instances.len(),
                    "Iteration complete"
                ),
                Err(e @ PipelineError::Timeout { .. }) => return Err(e),
                Err(e) => error!(iteration, error = %e, "Iteration failed"),
            }

            if let Some(path) = &self.settings.watch_path
                && modified_time(path).await != initial_mtime
            {
                warn!(path = %path.display(), "Configuration file changed, stopping");
                break;
            }

            if iteration < self.settings.iterations {
                tokio::time::sleep(self.settings.interval).await;
            }
        }

        Ok(())
    }
}

fn spawn_instances(instances: Vec<SharedInstance>) -> JoinHandle<Vec<InstanceResult>> {
    tokio::spawn(async move {
        let mut results = Vec::with_capacity(instances.len());
        for instance in instances {
            let mut instance = instance.lock().await;
            let result = instance.process_inbox().await;
            results.push((instance.name().to_string(), result));
        }
        results
    })
}

async fn modified_time(path: &std::path::Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
}
