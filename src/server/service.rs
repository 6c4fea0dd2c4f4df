//! A2A service — JSON-RPC method dispatcher that creates tasks and, for
//! `sendSubscribe`, binds notification transport atomically with task
//! creation (C6).
//!
//! This module is deliberately transport-agnostic: it validates params,
//! mints task ids, and drives C1/C2/C5, but leaves JSON-RPC envelope
//! framing and SSE/HTTP wiring to [`super::http`].

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::{A2AError, A2AResult};
use crate::server::notification_hub::NotificationHub;
use crate::server::task_queue::TaskQueue;
use crate::server::task_store::TaskStore;
use crate::types::{EventType, Message, Task, TaskState, TaskStatus};

/// `params.notification.mode` for `tasks/sendSubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMode {
    Sse,
    Webhook,
}

/// Parsed `params.notification` block for `tasks/sendSubscribe`.
#[derive(Debug)]
pub struct NotificationConfig {
    pub mode: NotificationMode,
    pub url: Option<String>,
    pub event_types: Option<HashSet<EventType>>,
}

/// JSON-RPC method dispatcher: validates params, mints task ids, and wires
/// task creation through to the queue and (for subscriptions) the
/// notification hub.
pub struct A2AService {
    store: Arc<dyn TaskStore>,
    queue: Arc<TaskQueue>,
    hub: Arc<NotificationHub>,
}

impl A2AService {
    pub fn new(store: Arc<dyn TaskStore>, queue: Arc<TaskQueue>, hub: Arc<NotificationHub>) -> Self {
        Self { store, queue, hub }
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// `tasks/send` — create the task, enqueue it, and return it immediately
    /// in `submitted` state. Fire-and-forget; the response carries no
    /// artifacts.
    pub async fn tasks_send(&self, params: &Value) -> A2AResult<Task> {
        let (message, session_id, metadata) = parse_message_params(params)?;
        let task = new_task(message, session_id, metadata);
        self.store.create(task.clone()).await?;
        self.queue.enqueue(task.id.clone()).await;
        Ok(task)
    }

    /// `tasks/sendSubscribe` — additionally requires `metadata.taskType`.
    /// Creates the task but does **not** enqueue it; the caller (C7) must
    /// bind the requested transport (webhook registration or SSE stream)
    /// before calling [`Self::start`], so that no update can be emitted
    /// before a subscriber is attached.
    pub async fn prepare_subscribe(&self, params: &Value) -> A2AResult<(Task, NotificationConfig)> {
        let (message, session_id, metadata) = parse_message_params(params)?;

        let has_task_type = metadata
            .as_ref()
            .and_then(|m| m.get("taskType"))
            .and_then(|v| v.as_str())
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if !has_task_type {
            return Err(A2AError::InvalidParams(
                "metadata.taskType is required for tasks/sendSubscribe".into(),
            ));
        }

        let notification = parse_notification_config(params)?;
        let task = new_task(message, session_id, metadata);
        self.store.create(task.clone()).await?;
        Ok((task, notification))
    }

    /// Admit a previously-created (and transport-bound) task into the queue.
    pub async fn start(&self, task_id: &str) {
        self.queue.enqueue(task_id.to_string()).await;
    }

    pub async fn get_task(&self, task_id: &str) -> A2AResult<Task> {
        self.store
            .get(task_id)
            .await
            .ok_or_else(|| A2AError::TaskNotFound(task_id.to_string()))
    }

    pub async fn get_history(&self, task_id: &str) -> A2AResult<Vec<TaskStatus>> {
        Ok(self.get_task(task_id).await?.history)
    }

    pub async fn list_tasks(&self, session_id: Option<&str>) -> Vec<Task> {
        self.store.list(session_id).await
    }

    /// `tasks/{id}/cancel` — delegates to [`TaskQueue::cancel`]; if it
    /// reports the job was queued (and is now guaranteed never to run),
    /// writes `cancelled` to the store. Otherwise the task is left as-is:
    /// either it's already terminal, or it's in flight and will reach
    /// `cancelled` once the worker observes the flag on its own.
    pub async fn cancel_task(&self, task_id: &str) -> A2AResult<Task> {
        let mut task = self.get_task(task_id).await?;
        let cancelled_before_start = self.queue.cancel(task_id).await;

        if cancelled_before_start && !task.status.state.is_terminal() {
            task.history.push(task.status.clone());
            task.status = TaskStatus::new(TaskState::Cancelled, Some("cancelled by client".into()));
            self.store.update(task.clone()).await?;
        }
        Ok(task)
    }

    /// Register a webhook target for a task's notifications (the standalone
    /// `POST /tasks/{id}/notifications` REST endpoint).
    pub async fn register_webhook(
        &self,
        task_id: &str,
        url: String,
        event_types: Option<HashSet<EventType>>,
    ) -> A2AResult<()> {
        self.get_task(task_id).await?;
        self.hub.subscribe_webhook(task_id, url, event_types).await;
        Ok(())
    }
}

fn new_task(message: Message, session_id: Option<String>, metadata: Option<Value>) -> Task {
    let task_type = metadata
        .as_ref()
        .and_then(|m| m.get("taskType"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let prompt = message.first_text().unwrap_or("").to_string();
    Task {
        id: Uuid::new_v4().to_string(),
        session_id,
        task_type,
        prompt,
        message,
        metadata,
        status: TaskStatus::new(TaskState::Submitted, None),
        history: Vec::new(),
        artifacts: Vec::new(),
    }
}

/// Parse and validate the shared `{message, sessionId?, metadata?}` shape
/// used by both `tasks/send` and `tasks/sendSubscribe`.
fn parse_message_params(
    params: &Value,
) -> A2AResult<(Message, Option<String>, Option<Value>)> {
    let obj = params
        .as_object()
        .ok_or_else(|| A2AError::InvalidParams("params must be an object".into()))?;

    let message_value = obj
        .get("message")
        .ok_or_else(|| A2AError::InvalidParams("missing params.message".into()))?;
    let message: Message = serde_json::from_value(message_value.clone())
        .map_err(|e| A2AError::InvalidParams(format!("invalid params.message: {e}")))?;

    if message.parts.is_empty() {
        return Err(A2AError::InvalidParams(
            "params.message.parts must be non-empty".into(),
        ));
    }

    let session_id = obj
        .get("sessionId")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let metadata = obj.get("metadata").cloned().filter(|v| !v.is_null());

    Ok((message, session_id, metadata))
}

/// Parse `params.notification` for `tasks/sendSubscribe`. Absent or
/// `mode: "sse"` both mean SSE; `mode: "webhook"` requires `url`.
fn parse_notification_config(params: &Value) -> A2AResult<NotificationConfig> {
    let notification = params.get("notification");

    let mode_str = notification
        .and_then(|n| n.get("mode"))
        .and_then(|v| v.as_str())
        .unwrap_or("sse");

    let event_types = notification
        .and_then(|n| n.get("eventTypes"))
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().and_then(EventType::parse))
                .collect::<HashSet<_>>()
        });

    match mode_str {
        "webhook" => {
            let url = notification
                .and_then(|n| n.get("url"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    A2AError::InvalidParams(
                        "notification.url is required when notification.mode is \"webhook\"".into(),
                    )
                })?
                .to_string();
            Ok(NotificationConfig {
                mode: NotificationMode::Webhook,
                url: Some(url),
                event_types,
            })
        }
        "sse" => Ok(NotificationConfig {
            mode: NotificationMode::Sse,
            url: None,
            event_types,
        }),
        other => {
            warn!(mode = other, "unknown notification.mode, defaulting to sse");
            Ok(NotificationConfig {
                mode: NotificationMode::Sse,
                url: None,
                event_types,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::notification_hub::NotificationHub;
    use crate::server::skill_worker::{ImageWorker, SkillWorker};
    use crate::server::task_processor::TaskProcessor;
    use crate::server::task_queue::TaskQueueConfig;
    use crate::server::task_store::InMemoryTaskStore;
    use std::collections::HashMap;

    fn make_service() -> A2AService {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let mut workers: HashMap<String, Arc<dyn SkillWorker>> = HashMap::new();
        workers.insert("text2image".into(), Arc::new(ImageWorker::new()));
        let processor = Arc::new(TaskProcessor::new(store.clone(), workers));
        let queue = Arc::new(TaskQueue::new(processor, TaskQueueConfig::default()));
        let hub = Arc::new(NotificationHub::new());
        A2AService::new(store, queue, hub)
    }

    #[tokio::test]
    async fn tasks_send_requires_non_empty_parts() {
        let service = make_service();
        let params = serde_json::json!({
            "message": {"role": "user", "parts": []},
            "metadata": {"taskType": "text2image"},
        });
        let err = service.tasks_send(&params).await.unwrap_err();
        assert!(matches!(err, A2AError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn tasks_send_returns_submitted_task() {
        let service = make_service();
        let params = serde_json::json!({
            "message": {"role": "user", "parts": [{"type": "text", "text": "a futuristic cityscape"}]},
            "metadata": {"taskType": "text2image"},
        });
        let task = service.tasks_send(&params).await.unwrap();
        assert_eq!(task.status.state, TaskState::Submitted);
        assert_eq!(task.task_type, "text2image");
    }

    #[tokio::test]
    async fn send_subscribe_requires_task_type() {
        let service = make_service();
        let params = serde_json::json!({
            "message": {"role": "user", "parts": [{"type": "text", "text": "a futuristic cityscape"}]},
        });
        let err = service.prepare_subscribe(&params).await.unwrap_err();
        assert!(matches!(err, A2AError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn send_subscribe_webhook_requires_url() {
        let service = make_service();
        let params = serde_json::json!({
            "message": {"role": "user", "parts": [{"type": "text", "text": "a futuristic cityscape"}]},
            "metadata": {"taskType": "text2image"},
            "notification": {"mode": "webhook"},
        });
        let err = service.prepare_subscribe(&params).await.unwrap_err();
        assert!(matches!(err, A2AError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn send_subscribe_defaults_to_sse_mode() {
        let service = make_service();
        let params = serde_json::json!({
            "message": {"role": "user", "parts": [{"type": "text", "text": "a futuristic cityscape"}]},
            "metadata": {"taskType": "text2image"},
        });
        let (task, config) = service.prepare_subscribe(&params).await.unwrap();
        assert_eq!(config.mode, NotificationMode::Sse);
        assert_eq!(task.status.state, TaskState::Submitted);
    }

    #[tokio::test]
    async fn cancel_unknown_task_is_task_not_found() {
        let service = make_service();
        let err = service.cancel_task("nope").await.unwrap_err();
        assert!(matches!(err, A2AError::TaskNotFound(_)));
    }
}
