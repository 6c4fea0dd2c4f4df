//! Notification hub — per-task SSE + webhook fan-out with event-type
//! filtering (C2).
//!
//! SSE delivery uses one `tokio::sync::mpsc` channel per subscriber (rather
//! than a single multi-consumer broadcast channel, which has no
//! per-subscriber filtering) so each subscriber's accepted event-type set
//! can gate what it receives independently. Webhook delivery is fanned out
//! through a shared `reqwest::Client`, with outstanding deliveries bounded
//! per task (`Arc<Semaphore>` on each task's [`TaskSubs`]) rather than
//! process-wide, so one slow endpoint backs up only its own task's queue and
//! never starves delivery to every other task.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, warn};

use crate::error::A2AResult;
use crate::server::task_store::TaskListener;
use crate::types::{EventType, NotificationEvent, Task};

/// Maximum number of webhook POSTs in flight at once, per task.
const MAX_CONCURRENT_WEBHOOK_DELIVERIES_PER_TASK: usize = 4;

pub type SseSubscriberId = u64;

/// One SSE frame body, already JSON-encoded. The HTTP layer wraps each of
/// these in an `axum::response::sse::Event` as `data: <json>\n\n`.
pub type SseFrame = String;

struct SseSubscriber {
    id: SseSubscriberId,
    event_types: Option<HashSet<EventType>>,
    tx: mpsc::UnboundedSender<SseFrame>,
}

#[derive(Clone)]
struct WebhookSubscription {
    url: String,
    event_types: Option<HashSet<EventType>>,
}

struct TaskSubs {
    sse: Vec<SseSubscriber>,
    webhook: Option<WebhookSubscription>,
    webhook_semaphore: Arc<Semaphore>,
}

impl Default for TaskSubs {
    fn default() -> Self {
        Self {
            sse: Vec::new(),
            webhook: None,
            webhook_semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_WEBHOOK_DELIVERIES_PER_TASK)),
        }
    }
}

impl TaskSubs {
    fn is_empty(&self) -> bool {
        self.sse.is_empty() && self.webhook.is_none()
    }
}

/// Per-task registry of SSE subscribers and webhook targets.
pub struct NotificationHub {
    per_task: Mutex<HashMap<String, TaskSubs>>,
    http: reqwest::Client,
    next_subscriber_id: AtomicU64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            per_task: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Open an SSE subscription for a task. Emits the "connected" preamble
    /// event immediately and returns the subscriber id (for `unsubscribe_sse`)
    /// plus the receiving half of its channel.
    pub async fn subscribe_sse(
        &self,
        task_id: &str,
        event_types: Option<HashSet<EventType>>,
    ) -> (SseSubscriberId, mpsc::UnboundedReceiver<SseFrame>) {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let connected = serde_json::json!({
            "type": "status_update",
            "taskId": task_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "data": { "status": "connected" },
        });
        let _ = tx.send(connected.to_string());

        let mut per_task = self.per_task.lock().await;
        per_task
            .entry(task_id.to_string())
            .or_default()
            .sse
            .push(SseSubscriber {
                id,
                event_types,
                tx,
            });

        debug!(task_id, subscriber_id = id, "SSE subscriber registered");
        (id, rx)
    }

    /// Remove one SSE subscriber (called on transport close or terminal event).
    pub async fn unsubscribe_sse(&self, task_id: &str, subscriber_id: SseSubscriberId) {
        let mut per_task = self.per_task.lock().await;
        if let Some(subs) = per_task.get_mut(task_id) {
            subs.sse.retain(|s| s.id != subscriber_id);
            if subs.is_empty() {
                per_task.remove(task_id);
            }
        }
    }

    /// Register a webhook target, replacing any prior registration for this task.
    pub async fn subscribe_webhook(
        &self,
        task_id: &str,
        url: String,
        event_types: Option<HashSet<EventType>>,
    ) {
        let mut per_task = self.per_task.lock().await;
        per_task.entry(task_id.to_string()).or_default().webhook = Some(WebhookSubscription {
            url,
            event_types,
        });
        debug!(task_id, "webhook subscription registered");
    }

    /// Deliver an event to every subscriber of `task_id` whose filter
    /// accepts `event_type`. SSE delivery happens in this call; webhook
    /// delivery is dispatched to the background worker pool.
    pub async fn notify(&self, task_id: &str, event_type: EventType, data: serde_json::Value) {
        let event = NotificationEvent {
            event_type,
            task_id: task_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        };

        let mut per_task = self.per_task.lock().await;
        let Some(subs) = per_task.get_mut(task_id) else {
            return;
        };

        let payload = serde_json::to_string(&event).unwrap_or_default();
        subs.sse.retain(|sub| {
            if !accepts(&sub.event_types, event_type) {
                return true;
            }
            sub.tx.send(payload.clone()).is_ok()
        });

        if let Some(webhook) = subs.webhook.clone() {
            if accepts(&webhook.event_types, event_type) {
                self.spawn_webhook_delivery(webhook.url, event, subs.webhook_semaphore.clone());
            }
        }

        if subs.is_empty() {
            per_task.remove(task_id);
        }
    }

    fn spawn_webhook_delivery(&self, url: String, event: NotificationEvent, semaphore: Arc<Semaphore>) {
        let client = self.http.clone();
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url, status = %resp.status(), "webhook delivered");
                }
                Ok(resp) => {
                    warn!(url, status = %resp.status(), "webhook endpoint returned non-2xx");
                }
                Err(e) => {
                    warn!(url, error = %e, "webhook delivery failed");
                }
            }
        });
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

fn accepts(filter: &Option<HashSet<EventType>>, event_type: EventType) -> bool {
    match filter {
        None => true,
        Some(set) => set.contains(&event_type),
    }
}

/// Projects [`TaskStore`](crate::server::task_store::TaskStore) updates onto
/// [`NotificationHub`] events, implementing the event-type mapping resolved
/// in `DESIGN.md`: non-terminal changes are `status_update`; reaching a
/// terminal state with artifacts attached emits `artifact_created` first
/// (satisfying invariant 6 — artifacts are already committed to the store by
/// the time this listener runs); `completed`/`cancelled` then emit
/// `completion`; `failed` emits `error` followed by `completion`, so a
/// `completion`-only subscriber still sees exactly one terminal event no
/// matter the outcome.
pub struct NotificationBridge {
    hub: Arc<NotificationHub>,
}

impl NotificationBridge {
    pub fn new(hub: Arc<NotificationHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl TaskListener for NotificationBridge {
    async fn on_task_event(&self, task: &Task) -> A2AResult<()> {
        let status_data = |with_artifacts: bool| {
            let mut data = serde_json::json!({ "status": task.status });
            if with_artifacts {
                data["artifacts"] = serde_json::to_value(&task.artifacts).unwrap_or_default();
            }
            data
        };

        if !task.status.state.is_terminal() {
            self.hub
                .notify(&task.id, EventType::StatusUpdate, status_data(false))
                .await;
            return Ok(());
        }

        if !task.artifacts.is_empty() {
            self.hub
                .notify(&task.id, EventType::ArtifactCreated, status_data(true))
                .await;
        }

        if task.status.state == crate::types::TaskState::Failed {
            self.hub
                .notify(&task.id, EventType::Error, status_data(true))
                .await;
        }

        self.hub
            .notify(&task.id, EventType::Completion, status_data(true))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod bridge_tests {
    use super::*;
    use crate::types::{Message, Part, Role, TaskState, TaskStatus};

    fn make_task(state: TaskState, artifacts: Vec<crate::types::Artifact>) -> Task {
        Task {
            id: "t1".into(),
            session_id: None,
            task_type: "text2image".into(),
            prompt: "p".into(),
            message: Message {
                role: Role::User,
                parts: vec![Part::text("p")],
            },
            metadata: None,
            status: TaskStatus::new(state, None),
            history: Vec::new(),
            artifacts,
        }
    }

    #[tokio::test]
    async fn terminal_success_emits_artifact_created_then_completion() {
        let hub = Arc::new(NotificationHub::new());
        let bridge = NotificationBridge::new(hub.clone());
        let (_id, mut rx) = hub.subscribe_sse("t1", None).await;
        rx.recv().await.unwrap(); // connected preamble

        let artifact = crate::types::Artifact {
            parts: vec![Part::text("ok")],
            metadata: None,
            index: 0,
        };
        bridge
            .on_task_event(&make_task(TaskState::Completed, vec![artifact]))
            .await
            .unwrap();

        let first: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "artifact_created");
        let second: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["type"], "completion");
    }

    #[tokio::test]
    async fn failure_emits_error_then_completion() {
        let hub = Arc::new(NotificationHub::new());
        let bridge = NotificationBridge::new(hub.clone());
        let (_id, mut rx) = hub.subscribe_sse("t1", None).await;
        rx.recv().await.unwrap(); // connected preamble

        bridge
            .on_task_event(&make_task(TaskState::Failed, vec![]))
            .await
            .unwrap();

        let first: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "error");
        let second: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["type"], "completion");
    }

    #[tokio::test]
    async fn completion_only_filter_receives_exactly_one_event_on_failure() {
        let hub = Arc::new(NotificationHub::new());
        let bridge = NotificationBridge::new(hub.clone());
        let mut filter = HashSet::new();
        filter.insert(EventType::Completion);
        let (_id, mut rx) = hub.subscribe_sse("t1", Some(filter)).await;
        rx.recv().await.unwrap(); // connected preamble

        bridge
            .on_task_event(&make_task(TaskState::Failed, vec![]))
            .await
            .unwrap();

        let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "completion");
        assert!(rx.try_recv().is_err());
    }
}
