//! HTTP surface — thin binding of [`A2AService`] (C6) to routes, and of
//! [`NotificationHub`] (C2) to the SSE/webhook endpoints (C7).
//!
//! Same `Router` + `State` + `Sse`/`async_stream` shape used throughout the
//! engine's HTTP layer, narrowed to this engine's two JSON-RPC methods and
//! five REST paths.

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::A2AError;
use crate::server::notification_hub::NotificationHub;
use crate::server::service::{A2AService, NotificationMode};
use crate::types::{EventType, JsonRpcRequest, JsonRpcResponse};

/// Shared router state.
pub struct AppState {
    pub service: Arc<A2AService>,
    pub agent_card: Value,
}

/// Build the full HTTP surface: health check, agent card, task CRUD, and
/// the JSON-RPC + notification endpoints.
pub fn router(service: Arc<A2AService>, agent_card: Value) -> Router {
    let state = Arc::new(AppState { service, agent_card });

    Router::new()
        .route("/health", get(handle_health))
        .route("/.well-known/agent.json", get(handle_agent_card))
        .route("/tasks", get(handle_list_tasks))
        .route("/tasks/send", post(handle_tasks_send))
        .route("/tasks/sendSubscribe", post(handle_tasks_send_subscribe))
        .route("/tasks/{id}", get(handle_get_task))
        .route("/tasks/{id}/history", get(handle_get_history))
        .route("/tasks/{id}/cancel", post(handle_cancel))
        .route(
            "/tasks/{id}/notifications",
            get(handle_notifications_sse).post(handle_notifications_webhook),
        )
        .with_state(state)
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn handle_agent_card(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.agent_card.clone())
}

#[derive(Deserialize)]
struct SessionFilter {
    session_id: Option<String>,
}

async fn handle_list_tasks(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SessionFilter>,
) -> impl IntoResponse {
    let tasks = state.service.list_tasks(filter.session_id.as_deref()).await;
    Json(tasks)
}

async fn handle_get_task(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.service.get_task(&id).await {
        Ok(task) => Json(task).into_response(),
        Err(_) => (axum::http::StatusCode::NOT_FOUND, "task not found").into_response(),
    }
}

async fn handle_get_history(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.service.get_history(&id).await {
        Ok(history) => Json(history).into_response(),
        Err(_) => (axum::http::StatusCode::NOT_FOUND, "task not found").into_response(),
    }
}

async fn handle_cancel(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.service.cancel_task(&id).await {
        Ok(task) => Json(task).into_response(),
        Err(_) => (axum::http::StatusCode::NOT_FOUND, "task not found").into_response(),
    }
}

/// Validate the JSON-RPC 2.0 envelope shape shared by both methods: a
/// missing `jsonrpc`/`id`/`method` field is `-32600`.
fn validate_envelope(req: &JsonRpcRequest) -> Result<&str, A2AError> {
    if req.jsonrpc.as_deref() != Some("2.0") {
        return Err(A2AError::InvalidRequest(
            "missing or invalid \"jsonrpc\" field; must be \"2.0\"".into(),
        ));
    }
    let method = req
        .method
        .as_deref()
        .ok_or_else(|| A2AError::InvalidRequest("missing \"method\" field".into()))?;
    if req.id.is_null() {
        return Err(A2AError::InvalidRequest("missing \"id\" field".into()));
    }
    Ok(method)
}

fn rpc_error_response(id: Value, err: A2AError) -> Response {
    Json(JsonRpcResponse::err(id, err.into())).into_response()
}

/// `POST /tasks/send` — JSON-RPC `tasks/send`.
async fn handle_tasks_send(State(state): State<Arc<AppState>>, Json(req): Json<JsonRpcRequest>) -> Response {
    let id = req.id.clone();
    let method = match validate_envelope(&req) {
        Ok(m) => m,
        Err(e) => return rpc_error_response(id, e),
    };
    if method != "tasks/send" {
        return rpc_error_response(
            id,
            A2AError::InvalidRequest(format!("unsupported method on this endpoint: {method}")),
        );
    }

    match state.service.tasks_send(&req.params).await {
        Ok(task) => {
            let result = serde_json::to_value(&task).unwrap_or_default();
            Json(JsonRpcResponse::ok(id, result)).into_response()
        }
        Err(e) => rpc_error_response(id, e),
    }
}

/// `POST /tasks/sendSubscribe` — JSON-RPC `tasks/sendSubscribe`. Responds
/// either with an SSE stream (`mode: "sse"`, the default) or a JSON-RPC
/// `{result: {taskId}}` envelope (`mode: "webhook"`).
async fn handle_tasks_send_subscribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<JsonRpcRequest>,
) -> Response {
    let id = req.id.clone();
    let method = match validate_envelope(&req) {
        Ok(m) => m,
        Err(e) => return rpc_error_response(id, e),
    };
    if method != "tasks/sendSubscribe" {
        return rpc_error_response(
            id,
            A2AError::InvalidRequest(format!("unsupported method on this endpoint: {method}")),
        );
    }

    let (task, notification) = match state.service.prepare_subscribe(&req.params).await {
        Ok(t) => t,
        Err(e) => return rpc_error_response(id, e),
    };

    match notification.mode {
        NotificationMode::Webhook => {
            let url = notification.url.expect("webhook mode always carries a url");
            state
                .service
                .hub()
                .subscribe_webhook(&task.id, url, notification.event_types)
                .await;
            state.service.start(&task.id).await;
            let result = serde_json::json!({ "taskId": task.id });
            Json(JsonRpcResponse::ok(id, result)).into_response()
        }
        NotificationMode::Sse => {
            let hub = state.service.hub().clone();
            let (subscriber_id, rx) = hub.subscribe_sse(&task.id, notification.event_types).await;
            state.service.start(&task.id).await;
            let task_id = task.id.clone();
            sse_response(hub, task_id, subscriber_id, rx)
        }
    }
}

#[derive(Deserialize)]
struct NotificationsQuery {
    #[serde(rename = "eventTypes")]
    event_types: Option<String>,
}

fn parse_event_types(raw: Option<&str>) -> Option<HashSet<EventType>> {
    let raw = raw?;
    let set: HashSet<EventType> = raw.split(',').filter_map(EventType::parse).collect();
    if set.is_empty() {
        None
    } else {
        Some(set)
    }
}

/// `GET /tasks/{id}/notifications` — upgrade to SSE.
async fn handle_notifications_sse(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<NotificationsQuery>,
) -> Response {
    if state.service.get_task(&id).await.is_err() {
        return (axum::http::StatusCode::NOT_FOUND, "task not found").into_response();
    }
    let event_types = parse_event_types(query.event_types.as_deref());
    let hub = state.service.hub().clone();
    let (subscriber_id, rx) = hub.subscribe_sse(&id, event_types).await;
    sse_response(hub, id, subscriber_id, rx)
}

#[derive(Deserialize)]
struct WebhookBody {
    #[serde(rename = "webhookUrl")]
    webhook_url: String,
    #[serde(default, rename = "eventTypes")]
    event_types: Vec<String>,
}

/// `POST /tasks/{id}/notifications` — register a webhook.
async fn handle_notifications_webhook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<WebhookBody>,
) -> Response {
    let event_types: HashSet<EventType> =
        body.event_types.iter().filter_map(|s| EventType::parse(s)).collect();
    let event_types = if event_types.is_empty() { None } else { Some(event_types) };

    match state
        .service
        .register_webhook(&id, body.webhook_url, event_types)
        .await
    {
        Ok(()) => axum::http::StatusCode::OK.into_response(),
        Err(_) => (axum::http::StatusCode::NOT_FOUND, "task not found").into_response(),
    }
}

/// Releases an SSE subscriber from the hub when the response stream is
/// dropped — client disconnect, terminal event consumed, or server
/// shutdown. `Drop` is the deterministic-release mechanism since the
/// stream has no async teardown hook of its own.
struct SseGuard {
    hub: Arc<NotificationHub>,
    task_id: String,
    subscriber_id: crate::server::notification_hub::SseSubscriberId,
}

impl Drop for SseGuard {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let task_id = std::mem::take(&mut self.task_id);
        let subscriber_id = self.subscriber_id;
        tokio::spawn(async move {
            hub.unsubscribe_sse(&task_id, subscriber_id).await;
        });
    }
}

fn sse_response(
    hub: Arc<NotificationHub>,
    task_id: String,
    subscriber_id: crate::server::notification_hub::SseSubscriberId,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<String>,
) -> Response {
    let guard = SseGuard {
        hub,
        task_id,
        subscriber_id,
    };
    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(frame) = rx.recv().await {
            yield Ok::<_, Infallible>(Event::default().data(frame));
        }
        debug!("SSE stream ended");
    };
    Sse::new(Box::pin(stream) as SseEventStream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

type SseEventStream = std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;
