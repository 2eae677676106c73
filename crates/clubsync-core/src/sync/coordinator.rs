use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, RwLock};

use super::{JobOutcome, SyncFailure, SyncOutcome, SyncPhase, SyncPipeline};
use crate::reconcile::Strategy;

/// Snapshot of the queue as seen by callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub in_progress: bool,
    pub queue_length: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_outcome: Option<JobOutcome>,
}

/// Handle to a triggered job
#[derive(Debug)]
pub struct SyncJob {
    pub id: u64,
    pub strategy: Strategy,
    pub message: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    outcome: oneshot::Receiver<SyncOutcome>,
}

impl SyncJob {
    /// Wait for the worker to finish this job.
    pub async fn wait(self) -> SyncOutcome {
        let (id, strategy) = (self.id, self.strategy);
        self.outcome.await.unwrap_or_else(|_| {
            Err(SyncFailure::new(
                id,
                strategy,
                SyncPhase::Queue,
                "sync worker stopped before the job finished",
            ))
        })
    }
}

struct QueuedJob {
    id: u64,
    strategy: Strategy,
    message: Option<String>,
    reply: oneshot::Sender<SyncOutcome>,
}

#[derive(Default)]
struct CoordinatorState {
    running: AtomicBool,
    queued: AtomicUsize,
    next_job_id: AtomicU64,
    last_sync_time: RwLock<Option<DateTime<Utc>>>,
    last_outcome: RwLock<Option<JobOutcome>>,
}

/// Runs sync jobs one at a time, in trigger order.
///
/// Cloning yields another handle to the same queue and worker.
#[derive(Clone)]
pub struct SyncCoordinator {
    sender: mpsc::UnboundedSender<QueuedJob>,
    state: Arc<CoordinatorState>,
}

impl SyncCoordinator {
    /// Start the worker task. Must be called inside a Tokio runtime.
    pub fn spawn(pipeline: SyncPipeline) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(CoordinatorState::default());
        tokio::spawn(run_worker(pipeline, receiver, Arc::clone(&state)));
        Self { sender, state }
    }

    /// Queue a job behind any job already waiting.
    pub fn trigger(&self, strategy: Strategy, message: Option<String>) -> SyncJob {
        let id = self.state.next_job_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (reply, outcome) = oneshot::channel();
        let enqueued_at = Utc::now();

        self.state.queued.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedJob {
            id,
            strategy,
            message: message.clone(),
            reply,
        };
        if let Err(mpsc::error::SendError(job)) = self.sender.send(queued) {
            self.state.queued.fetch_sub(1, Ordering::SeqCst);
            let _ = job.reply.send(Err(SyncFailure::new(
                id,
                strategy,
                SyncPhase::Queue,
                "sync worker is not running",
            )));
        } else {
            tracing::info!(job_id = id, %strategy, "Queued sync job");
        }

        SyncJob {
            id,
            strategy,
            message,
            enqueued_at,
            outcome,
        }
    }

    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            in_progress: self.state.running.load(Ordering::SeqCst),
            queue_length: self.state.queued.load(Ordering::SeqCst),
            last_sync_time: *self.state.last_sync_time.read().await,
            last_outcome: self.state.last_outcome.read().await.clone(),
        }
    }

    /// Finish time of the last successful job since start-up
    pub async fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.state.last_sync_time.read().await
    }
}

async fn run_worker(
    pipeline: SyncPipeline,
    mut receiver: mpsc::UnboundedReceiver<QueuedJob>,
    state: Arc<CoordinatorState>,
) {
    while let Some(job) = receiver.recv().await {
        state.running.store(true, Ordering::SeqCst);
        state.queued.fetch_sub(1, Ordering::SeqCst);
        tracing::info!(job_id = job.id, strategy = %job.strategy, "Starting sync job");

        // A panicking job must not take the worker down with it
        let outcome = tokio::spawn(pipeline.clone().run(job.id, job.strategy, job.message))
            .await
            .unwrap_or_else(|error| {
                Err(SyncFailure::new(job.id, job.strategy, SyncPhase::Queue, error))
            });

        match &outcome {
            Ok(result) => {
                tracing::info!(
                    job_id = job.id,
                    committed = result.committed,
                    pushed = result.pushed,
                    "Sync job finished"
                );
                *state.last_sync_time.write().await = Some(result.finished_at);
            }
            Err(failure) => {
                tracing::error!(job_id = job.id, phase = %failure.phase, error = %failure.message, "Sync job failed");
            }
        }
        *state.last_outcome.write().await = Some(JobOutcome::from(&outcome));
        state.running.store(false, Ordering::SeqCst);

        if job.reply.send(outcome).is_err() {
            tracing::debug!(job_id = job.id, "Caller stopped waiting for sync job");
        }
    }
}
