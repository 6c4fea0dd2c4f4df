//! Task store — in-memory persistence + listener fan-out for tasks (C1).
//!
//! A `HashMap` plus an insertion-order `Vec` under separate `RwLock`s,
//! extended with a listener registry: every `create`/`update` notifies
//! registered listeners with the full task, after the write commits, with
//! failures logged but never surfaced to the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{A2AError, A2AResult};
use crate::types::Task;

/// A listener invoked whenever a task is created or updated.
///
/// Implementations must not panic; any error should be returned so the
/// store can log it and move on to the next listener.
#[async_trait]
pub trait TaskListener: Send + Sync {
    async fn on_task_event(&self, task: &Task) -> A2AResult<()>;
}

/// Opaque handle returned by [`TaskStore::add_listener`], usable with
/// [`TaskStore::remove_listener`].
pub type ListenerId = u64;

/// Trait for persisting A2A tasks and fanning out change notifications.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. Fails with `duplicate-id` if `task.id` already exists.
    async fn create(&self, task: Task) -> A2AResult<()>;

    /// Fetch a task by id.
    async fn get(&self, task_id: &str) -> Option<Task>;

    /// Replace an existing task record. Fails if no task with that id exists.
    /// Callers are responsible for appending to `history` and setting
    /// `status.timestamp` before calling this. Terminal task states are
    /// sticky: if the stored task has already reached a terminal state, the
    /// update is silently dropped rather than applied.
    async fn update(&self, task: Task) -> A2AResult<()>;

    /// Remove a task. Returns `true` if a task was actually removed.
    async fn delete(&self, task_id: &str) -> bool;

    /// List tasks, optionally filtered by session id. Order is stable for
    /// the lifetime of the returned snapshot but otherwise unspecified.
    async fn list(&self, session_id: Option<&str>) -> Vec<Task>;

    /// Register a listener; returns an id usable with `remove_listener`.
    async fn add_listener(&self, listener: Arc<dyn TaskListener>) -> ListenerId;

    /// Deregister a previously-added listener.
    async fn remove_listener(&self, id: ListenerId);
}

struct Listener {
    id: ListenerId,
    handler: Arc<dyn TaskListener>,
}

/// In-memory task store backed by a `HashMap`, guarded by a `RwLock`.
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    insertion_order: RwLock<Vec<String>>,
    listeners: RwLock<Vec<Listener>>,
    next_listener_id: AtomicU64,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            insertion_order: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Run every registered listener to completion, logging failures.
    /// Listener invocations are not ordered with respect to each other.
    async fn notify(&self, task: &Task) {
        let listeners = self.listeners.read().await;
        for listener in listeners.iter() {
            if let Err(e) = listener.handler.on_task_event(task).await {
                warn!(task_id = %task.id, error = %e, "task listener failed");
            }
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: Task) -> A2AResult<()> {
        let id = task.id.clone();
        {
            let mut tasks = self.tasks.write().await;
            if tasks.contains_key(&id) {
                return Err(A2AError::Internal(format!("duplicate task id: {id}")));
            }
            tasks.insert(id.clone(), task.clone());
        }
        self.insertion_order.write().await.push(id.clone());
        debug!(task_id = %id, "task created");
        self.notify(&task).await;
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    async fn update(&self, task: Task) -> A2AResult<()> {
        let id = task.id.clone();
        {
            let mut tasks = self.tasks.write().await;
            let existing = tasks.get(&id).ok_or_else(|| A2AError::TaskNotFound(id.clone()))?;
            if existing.status.state.is_terminal() {
                debug!(task_id = %id, state = %existing.status.state, "update dropped: task already terminal");
                return Ok(());
            }
            tasks.insert(id.clone(), task.clone());
        }
        debug!(task_id = %id, state = %task.status.state, "task updated");
        self.notify(&task).await;
        Ok(())
    }

    async fn delete(&self, task_id: &str) -> bool {
        let removed = self.tasks.write().await.remove(task_id).is_some();
        if removed {
            self.insertion_order.write().await.retain(|id| id != task_id);
        }
        removed
    }

    async fn list(&self, session_id: Option<&str>) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let order = self.insertion_order.read().await;
        order
            .iter()
            .filter_map(|id| tasks.get(id))
            .filter(|t| match session_id {
                Some(sid) => t.session_id.as_deref() == Some(sid),
                None => true,
            })
            .cloned()
            .collect()
    }

    async fn add_listener(&self, handler: Arc<dyn TaskListener>) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().await.push(Listener { id, handler });
        id
    }

    async fn remove_listener(&self, id: ListenerId) {
        self.listeners.write().await.retain(|l| l.id != id);
    }
}
