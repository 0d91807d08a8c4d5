//! Fixed-size worker pool draining a queue of repositories.
//!
//! The queue is a bounded channel filled up front and then closed, so an
//! empty receive is the stop signal. Workers share the receiver behind a
//! mutex, which makes every pull atomic. A worker that hits an error stops;
//! the others keep draining, and the first error (by worker index) is
//! returned once everyone has finished.
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, instrument, warn};

use crate::error::ScanError;
use crate::model::{NotificationJob, RepositoryRef};
use crate::resolver::FreshnessResolver;

/// Where workers hand qualifying results.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn submit(&self, job: NotificationJob) -> Result<(), ScanError>;
}

/// Keeps jobs in memory keyed by repository id.
#[derive(Debug, Default)]
pub struct CollectingSink {
    jobs: Mutex<BTreeMap<u64, NotificationJob>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn jobs(&self) -> Vec<NotificationJob> {
        self.jobs.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl JobSink for CollectingSink {
    async fn submit(&self, job: NotificationJob) -> Result<(), ScanError> {
        let mut jobs = self.jobs.lock().await;
        match jobs.entry(job.repo.id) {
            Entry::Vacant(slot) => {
                slot.insert(job);
            }
            Entry::Occupied(existing) => {
                warn!(
                    repo = %job.repo.full_name,
                    kept = %existing.get().idempotency_key,
                    dropped = %job.idempotency_key,
                    "second job for the same repository"
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub processed: usize,
    pub emitted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub workers: Vec<WorkerReport>,
}

impl PoolReport {
    pub fn processed(&self) -> usize {
        self.workers.iter().map(|w| w.processed).sum()
    }

    pub fn emitted(&self) -> usize {
        self.workers.iter().map(|w| w.emitted).sum()
    }
}

type TaskQueue = Arc<Mutex<mpsc::Receiver<RepositoryRef>>>;

/// Resolves every repository with `workers` concurrent tasks.
#[instrument(skip_all, fields(tasks = repos.len(), workers = workers))]
pub async fn run_pool(
    repos: Vec<RepositoryRef>,
    workers: usize,
    resolver: Arc<FreshnessResolver>,
    sink: Arc<dyn JobSink>,
) -> Result<PoolReport, ScanError> {
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel(repos.len().max(1));
    for repo in repos {
        tx.try_send(repo).map_err(|e| ScanError::Worker {
            worker: 0,
            message: format!("failed to enqueue task: {}", e),
        })?;
    }
    drop(tx);

    let queue: TaskQueue = Arc::new(Mutex::new(rx));
    let handles: Vec<_> = (0..workers)
        .map(|id| {
            tokio::spawn(worker_loop(
                id,
                Arc::clone(&queue),
                Arc::clone(&resolver),
                Arc::clone(&sink),
            ))
        })
        .collect();
    drop(queue);

    let mut report = PoolReport::default();
    let mut first_error = None;
    for (id, outcome) in join_all(handles).await.into_iter().enumerate() {
        let err = match outcome {
            Ok(Ok(worker)) => {
                report.workers.push(worker);
                continue;
            }
            Ok(Err(err)) => err,
            Err(join_err) => ScanError::Worker {
                worker: id,
                message: join_err.to_string(),
            },
        };
        error!(worker = id, error = %err, "worker exited with error");
        first_error.get_or_insert(err);
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

async fn worker_loop(
    id: usize,
    queue: TaskQueue,
    resolver: Arc<FreshnessResolver>,
    sink: Arc<dyn JobSink>,
) -> Result<WorkerReport, ScanError> {
    info!(worker = id, "worker started");
    let mut report = WorkerReport {
        worker: id,
        ..Default::default()
    };

    loop {
        let next = queue.lock().await.recv().await;
        let Some(repo) = next else {
            break;
        };
        report.processed += 1;

        if let Some(event) = resolver.resolve(&repo).await? {
            info!(worker = id, repo = %repo.full_name, event = %event.name(), "fresh event found");
            sink.submit(NotificationJob::new(repo, event)).await?;
            report.emitted += 1;
        }
    }

    info!(worker = id, processed = report.processed, emitted = report.emitted, "worker exited");
    Ok(report)
}
