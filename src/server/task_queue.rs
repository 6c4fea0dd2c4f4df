//! Bounded-concurrency task queue — FIFO admission, linear retry, and
//! cancel-before-start semantics (C5).
//!
//! Grounded on the semaphore-gated worker-pool pattern used for webhook
//! fan-out in [`notification_hub`](crate::server::notification_hub), applied
//! here to task execution instead of HTTP delivery: `enqueue` spawns one
//! task per job, each of which blocks on an owned semaphore permit before
//! calling into [`TaskProcessor`]. A task cancelled before it acquires its
//! permit never runs at all; a task cancelled after it starts running
//! relies on the worker's own cooperative cancellation check.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, warn};

use crate::server::skill_worker::CancelFlag;
use crate::server::task_processor::TaskProcessor;
use crate::types::TaskState;

#[derive(Debug, Clone, Copy)]
pub struct TaskQueueConfig {
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Observable lifecycle of a queued job, independent of the task's own
/// `TaskState` (a job can retry several times while the task itself cycles
/// between `working` and `failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

struct JobHandle {
    cancel: CancelFlag,
    status: RwLock<QueueStatus>,
    attempts: RwLock<u32>,
}

/// Bounded-concurrency queue of task ids awaiting processing.
pub struct TaskQueue {
    processor: Arc<TaskProcessor>,
    config: TaskQueueConfig,
    semaphore: Arc<Semaphore>,
    jobs: Mutex<HashMap<String, Arc<JobHandle>>>,
}

impl TaskQueue {
    pub fn new(processor: Arc<TaskProcessor>, config: TaskQueueConfig) -> Self {
        Self {
            processor,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a task for processing. Returns immediately; the task runs on a
    /// background task. At most one job runs per task id at a time: if a job
    /// for this id is already `Queued` or `Running`, the call is a no-op
    /// rather than spawning a second worker invocation. Re-enqueuing an id
    /// whose prior job reached a terminal `QueueStatus` starts a fresh job.
    pub async fn enqueue(&self, task_id: String) {
        let mut jobs = self.jobs.lock().await;
        if let Some(existing) = jobs.get(&task_id) {
            let status = *existing.status.read().await;
            if matches!(status, QueueStatus::Queued | QueueStatus::Running) {
                debug!(task_id, "enqueue ignored: a job for this task is already in flight");
                return;
            }
        }

        let handle = Arc::new(JobHandle {
            cancel: CancelFlag::new(),
            status: RwLock::new(QueueStatus::Queued),
            attempts: RwLock::new(0),
        });
        jobs.insert(task_id.clone(), handle.clone());
        drop(jobs);

        let processor = self.processor.clone();
        let semaphore = self.semaphore.clone();
        let config = self.config;
        tokio::spawn(async move {
            run_job(processor, semaphore, config, task_id, handle).await;
        });
    }

    /// Request cancellation. If the job hasn't started running yet, it is
    /// marked `Cancelled` immediately and never dequeues — this returns
    /// `true`. Otherwise the cancel flag is still set, so a running worker
    /// observes it cooperatively at its next suspension point, but the
    /// queue itself does not reach into the worker, so the call reports
    /// `false`: the task is not yet cancelled from the caller's point of
    /// view. Returns `false` if no such job is tracked at all.
    pub async fn cancel(&self, task_id: &str) -> bool {
        let jobs = self.jobs.lock().await;
        let Some(handle) = jobs.get(task_id) else {
            return false;
        };
        handle.cancel.set();
        let mut status = handle.status.write().await;
        if *status == QueueStatus::Queued {
            *status = QueueStatus::Cancelled;
            true
        } else {
            false
        }
    }

    /// Per-job lifecycle lookup, for callers (tests, the service layer) that
    /// care about one task's own job rather than the queue as a whole.
    pub async fn job_status(&self, task_id: &str) -> Option<QueueStatus> {
        let jobs = self.jobs.lock().await;
        let handle = jobs.get(task_id)?.clone();
        drop(jobs);
        let status = *handle.status.read().await;
        Some(status)
    }

    /// Aggregate cardinalities across every job the queue has ever tracked:
    /// how many are queued, currently processing, failed out, or completed.
    /// Cancelled jobs are counted in none of these, mirroring a cancelled
    /// task's removal from the FIFO without landing in any terminal set.
    pub async fn status(&self) -> QueueCounts {
        let jobs = self.jobs.lock().await;
        let mut counts = QueueCounts::default();
        for handle in jobs.values() {
            match *handle.status.read().await {
                QueueStatus::Queued => counts.queued += 1,
                QueueStatus::Running => counts.processing += 1,
                QueueStatus::Failed => counts.failed += 1,
                QueueStatus::Completed => counts.completed += 1,
                QueueStatus::Cancelled => {}
            }
        }
        counts
    }
}

/// Current cardinalities reported by [`TaskQueue::status`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub queued: usize,
    pub processing: usize,
    pub failed: usize,
    pub completed: usize,
}

async fn run_job(
    processor: Arc<TaskProcessor>,
    semaphore: Arc<Semaphore>,
    config: TaskQueueConfig,
    task_id: String,
    handle: Arc<JobHandle>,
) {
    loop {
        if *handle.status.read().await == QueueStatus::Cancelled {
            debug!(task_id, "job cancelled before start");
            return;
        }

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            return;
        };

        if *handle.status.read().await == QueueStatus::Cancelled {
            drop(permit);
            return;
        }
        *handle.status.write().await = QueueStatus::Running;

        let result = processor.process(&task_id, handle.cancel.clone()).await;
        drop(permit);

        match result {
            Ok(TaskState::Completed) => {
                *handle.status.write().await = QueueStatus::Completed;
                return;
            }
            Ok(TaskState::Cancelled) => {
                *handle.status.write().await = QueueStatus::Cancelled;
                return;
            }
            Ok(TaskState::InputRequired) => {
                // Terminal for this attempt but not a failure: the task
                // needs a new message, not a retry of this one.
                *handle.status.write().await = QueueStatus::Completed;
                return;
            }
            Ok(TaskState::Failed) => {
                let mut attempts = handle.attempts.write().await;
                if *attempts >= config.max_retries {
                    *handle.status.write().await = QueueStatus::Failed;
                    return;
                }
                *attempts += 1;
                let attempt = *attempts;
                drop(attempts);
                debug!(task_id, attempt, "retrying failed task");
                *handle.status.write().await = QueueStatus::Queued;
                tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
            }
            Ok(other) => {
                // input-required / submitted / working are not terminal —
                // the processor only returns once a terminal state is
                // reached, so this would indicate a processor bug.
                warn!(task_id, state = %other, "processor returned a non-terminal state");
                *handle.status.write().await = QueueStatus::Failed;
                return;
            }
            Err(e) => {
                warn!(task_id, error = %e, "task processing failed internally");
                *handle.status.write().await = QueueStatus::Failed;
                return;
            }
        }
    }
}
