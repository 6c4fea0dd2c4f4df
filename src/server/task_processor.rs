//! Task processor — drives one task through its worker, projecting yields
//! onto the store with dedup and cancellation (C4).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{A2AError, A2AResult};
use crate::server::skill_worker::{drive, CancelFlag, SkillWorker, Update, WorkerContext};
use crate::server::task_store::TaskStore;
use crate::types::{Part, Task, TaskState, TaskStatus};

/// Drives tasks through their resolved worker. Holds no per-task state of
/// its own — all state lives in the `TaskStore`, so `process` can be called
/// concurrently for distinct task ids without additional synchronization.
pub struct TaskProcessor {
    store: Arc<dyn TaskStore>,
    workers: HashMap<String, Arc<dyn SkillWorker>>,
}

impl TaskProcessor {
    pub fn new(store: Arc<dyn TaskStore>, workers: HashMap<String, Arc<dyn SkillWorker>>) -> Self {
        Self { store, workers }
    }

    /// Run one task to completion. Returns the final `TaskState` reached —
    /// the caller (`TaskQueue`) uses this to decide whether a retry is
    /// warranted. An `Err` means the store itself is inconsistent (the task
    /// disappeared mid-flight), which is not retryable.
    pub async fn process(&self, task_id: &str, cancelled: CancelFlag) -> A2AResult<TaskState> {
        let task = self
            .store
            .get(task_id)
            .await
            .ok_or_else(|| A2AError::Internal(format!("task {task_id} vanished before processing")))?;

        // Structural check only: a text part must exist and carry at least
        // one character. Whitespace-only prompts pass this check and are
        // instead caught as `input-required` by the worker's own prompt
        // validation — the two checks guard different things.
        let has_text = task
            .message
            .parts
            .iter()
            .any(|p| matches!(p, Part::Text { text } if !text.is_empty()));
        if !has_text {
            return self
                .terminal_fail(task, "Task must contain a non-empty text prompt")
                .await;
        }

        let mut task = self.transition_to_working(task).await?;

        let worker = match self.workers.get(&task.task_type) {
            Some(w) => w.clone(),
            None => {
                let message = format!("invalid-taskType: {}", task.task_type);
                return self.terminal_fail(task, message).await;
            }
        };

        let ctx = WorkerContext {
            task: task.clone(),
            cancelled,
        };
        let mut rx = drive(worker, ctx);

        loop {
            match rx.recv().await {
                Some(update) => {
                    if !self.should_apply(&task, &update) {
                        debug!(task_id = %task.id, "duplicate progress update suppressed");
                        continue;
                    }
                    let ends_attempt =
                        update.state.is_terminal() || update.state == TaskState::InputRequired;
                    task = self.apply_update(task, update).await?;
                    if ends_attempt {
                        return Ok(task.status.state);
                    }
                }
                None => {
                    return self
                        .terminal_fail(task, "worker-did-not-complete")
                        .await;
                }
            }
        }
    }

    async fn transition_to_working(&self, mut task: Task) -> A2AResult<Task> {
        task.history.push(task.status.clone());
        task.status = TaskStatus::new(TaskState::Working, None);
        self.store.update(task.clone()).await?;
        Ok(task)
    }

    /// Dedup policy: apply only if the state differs from what's currently
    /// stored, or the new message text differs from the currently stored
    /// status's text.
    fn should_apply(&self, task: &Task, update: &Update) -> bool {
        let state_changed = task.status.state != update.state;
        let text_changed = task.status.message.as_deref() != Some(update.message.as_str());
        state_changed || text_changed
    }

    async fn apply_update(&self, mut task: Task, mut update: Update) -> A2AResult<Task> {
        task.history.push(task.status.clone());
        task.status = TaskStatus::new(update.state, Some(update.message.clone()));
        for mut artifact in update.artifacts.drain(..) {
            artifact.index = task.artifacts.len() as u32;
            task.artifacts.push(artifact);
        }
        self.store.update(task.clone()).await?;
        Ok(task)
    }

    async fn terminal_fail(&self, mut task: Task, message: impl Into<String>) -> A2AResult<TaskState> {
        let message = message.into();
        warn!(task_id = %task.id, %message, "task failed");
        task.history.push(task.status.clone());
        task.status = TaskStatus::new(TaskState::Failed, Some(message));
        self.store.update(task.clone()).await?;
        Ok(TaskState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::skill_worker::{ImageWorker, VideoWorker};
    use crate::server::task_store::InMemoryTaskStore;
    use crate::types::{Message, Part, Role};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    fn make_task(id: &str, task_type: &str, prompt: &str, metadata: Option<serde_json::Value>) -> Task {
        Task {
            id: id.into(),
            session_id: None,
            task_type: task_type.into(),
            prompt: prompt.into(),
            message: Message {
                role: Role::User,
                parts: vec![Part::text(prompt)],
            },
            metadata,
            status: TaskStatus::new(TaskState::Submitted, None),
            history: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    fn workers() -> HashMap<String, Arc<dyn SkillWorker>> {
        let mut m: HashMap<String, Arc<dyn SkillWorker>> = HashMap::new();
        m.insert("text2image".into(), Arc::new(ImageWorker::new()));
        m.insert("text2video".into(), Arc::new(VideoWorker::new()));
        m
    }

    #[tokio::test]
    async fn happy_path_image_task_completes_with_artifact() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        store
            .create(make_task(
                "t1",
                "text2image",
                "a futuristic cityscape at sunset, digital art",
                None,
            ))
            .await
            .unwrap();

        let processor = TaskProcessor::new(store.clone(), workers());
        let state = processor.process("t1", CancelFlag::new()).await.unwrap();
        assert_eq!(state, TaskState::Completed);

        let task = store.get("t1").await.unwrap();
        assert_eq!(task.status.state, TaskState::Completed);
        assert_eq!(task.artifacts.len(), 1);
        assert_eq!(task.artifacts[0].index, 0);
    }

    #[tokio::test]
    async fn empty_prompt_yields_input_required() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        store
            .create(make_task("t1", "text2image", "  ", None))
            .await
            .unwrap();

        let processor = TaskProcessor::new(store.clone(), workers());
        let state = processor.process("t1", CancelFlag::new()).await.unwrap();
        assert_eq!(state, TaskState::InputRequired);
    }

    #[tokio::test]
    async fn unknown_task_type_fails_immediately() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        store
            .create(make_task("t1", "text2audio", "a valid length prompt", None))
            .await
            .unwrap();

        let processor = TaskProcessor::new(store.clone(), workers());
        let state = processor.process("t1", CancelFlag::new()).await.unwrap();
        assert_eq!(state, TaskState::Failed);
        let task = store.get("t1").await.unwrap();
        assert!(task
            .status
            .message
            .as_ref()
            .unwrap()
            .contains("invalid-taskType"));
    }

    #[tokio::test]
    async fn history_grows_monotonically_and_status_matches_last_entry() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        store
            .create(make_task(
                "t1",
                "text2image",
                "a futuristic cityscape at sunset",
                None,
            ))
            .await
            .unwrap();

        let processor = TaskProcessor::new(store.clone(), workers());
        processor.process("t1", CancelFlag::new()).await.unwrap();

        let task = store.get("t1").await.unwrap();
        assert!(!task.history.is_empty());
        // status always equals the last appended history entry once an
        // update has occurred — history holds every status prior to the
        // current one, so the current status must differ from history.last().
        assert_ne!(
            task.status.timestamp,
            task.history.last().unwrap().timestamp
        );
    }

    struct DedupProbeWorker;

    #[async_trait]
    impl SkillWorker for DedupProbeWorker {
        async fn handle(&self, _ctx: WorkerContext, tx: mpsc::Sender<Update>) {
            let _ = tx.send(Update::working("progress: 10%")).await;
            let _ = tx.send(Update::working("progress: 10%")).await;
            let _ = tx.send(Update::working("progress: 50%")).await;
            let _ = tx
                .send(Update::completed(
                    "done",
                    crate::types::Artifact {
                        parts: vec![Part::text("ok")],
                        metadata: None,
                        index: 0,
                    },
                ))
                .await;
        }
    }

    #[tokio::test]
    async fn duplicate_consecutive_updates_grow_history_by_at_most_one() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        store
            .create(make_task("t1", "probe", "a valid prompt", None))
            .await
            .unwrap();

        let mut workers: HashMap<String, Arc<dyn SkillWorker>> = HashMap::new();
        workers.insert("probe".into(), Arc::new(DedupProbeWorker));
        let processor = TaskProcessor::new(store.clone(), workers);
        processor.process("t1", CancelFlag::new()).await.unwrap();

        let task = store.get("t1").await.unwrap();
        // submitted -> working -> "10%" -> "50%" -> completed == 5 history entries
        // (the duplicate "10%" must not add a second entry).
        assert_eq!(task.history.len(), 4);
    }
}
