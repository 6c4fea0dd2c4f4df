//! Core data types for the A2A generation engine.
//!
//! Covers the task/message/part/artifact model plus the JSON-RPC envelope
//! and SSE/webhook event wire format described in the engine's external
//! interfaces.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Task lifecycle
// ============================================================================

/// The lifecycle state of a task.
///
/// Serialized as kebab-case strings on the wire (`"input-required"`, etc).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Terminal states: no further transitions are accepted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::InputRequired => "input-required",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Who authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

// ============================================================================
// Parts
// ============================================================================

/// A typed fragment of a [`Message`] or [`Artifact`].
///
/// Discriminated on the wire by the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Part {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { url: String },
    #[serde(rename = "audio")]
    Audio { audio_url: String },
    #[serde(rename = "video")]
    Video { url: String },
    #[serde(rename = "file")]
    File {
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// The text content, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }
}

// ============================================================================
// Message
// ============================================================================

/// The single user utterance that seeds a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    /// The text of the first `text` part, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::as_text)
    }
}

// ============================================================================
// Artifact
// ============================================================================

/// Terminal output attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub index: u32,
}

// ============================================================================
// Task status + task
// ============================================================================

/// A point-in-time snapshot of a task's lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub state: TaskState,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TaskStatus {
    pub fn new(state: TaskState, message: Option<String>) -> Self {
        Self {
            state,
            timestamp: chrono::Utc::now().to_rfc3339(),
            message,
        }
    }
}

/// The primary unit of work: one prompt routed to one skill worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Discriminator selecting the worker (`text2image`, `text2video`, ...).
    pub task_type: String,

    /// Derived from the first text part of `message` at creation time.
    pub prompt: String,

    pub message: Message,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    pub status: TaskStatus,

    /// Ordered sequence of prior status snapshots, oldest first.
    pub history: Vec<TaskStatus>,

    /// Ordered sequence of artifacts attached upon completion.
    pub artifacts: Vec<Artifact>,
}

impl Task {
    /// `metadata.imageUrls`, if present and non-empty.
    pub fn image_urls(&self) -> Option<Vec<String>> {
        let urls = self.metadata.as_ref()?.get("imageUrls")?.as_array()?;
        let urls: Vec<String> = urls
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        if urls.is_empty() {
            None
        } else {
            Some(urls)
        }
    }

    /// `metadata.duration`, coerced to 5 or 10 (default 10).
    pub fn duration_seconds(&self) -> u64 {
        match self
            .metadata
            .as_ref()
            .and_then(|m| m.get("duration"))
            .and_then(|v| v.as_u64())
        {
            Some(5) => 5,
            Some(10) => 10,
            _ => 10,
        }
    }
}

// ============================================================================
// Notification event types
// ============================================================================

/// The filterable category of a notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StatusUpdate,
    ArtifactCreated,
    Completion,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StatusUpdate => "status_update",
            EventType::ArtifactCreated => "artifact_created",
            EventType::Completion => "completion",
            EventType::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status_update" => Some(EventType::StatusUpdate),
            "artifact_created" => Some(EventType::ArtifactCreated),
            "completion" => Some(EventType::Completion),
            "error" => Some(EventType::Error),
            _ => None,
        }
    }
}

/// The envelope delivered over SSE and via webhook POST.
///
/// Wire shape: `{"type", "taskId", "timestamp", "data"}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub task_id: String,
    pub timestamp: String,
    pub data: serde_json::Value,
}

// ============================================================================
// JSON-RPC envelope
// ============================================================================

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: serde_json::Value,
    pub method: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn ok(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_display_matches_wire_format() {
        assert_eq!(TaskState::InputRequired.to_string(), "input-required");
        assert_eq!(TaskState::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Working.is_terminal());
        assert!(!TaskState::Submitted.is_terminal());
        assert!(!TaskState::InputRequired.is_terminal());
    }

    #[test]
    fn part_text_round_trips() {
        let p = Part::text("hello");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "text": "hello"}));
    }

    #[test]
    fn part_image_wire_shape() {
        let p = Part::Image {
            url: "https://example.com/a.png".into(),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "image", "url": "https://example.com/a.png"})
        );
    }

    #[test]
    fn message_first_text_finds_leading_text_part() {
        let msg = Message {
            role: Role::User,
            parts: vec![Part::text("a cityscape")],
        };
        assert_eq!(msg.first_text(), Some("a cityscape"));
    }

    #[test]
    fn task_duration_coerces_invalid_to_ten() {
        let task = make_task(serde_json::json!({"duration": 7}));
        assert_eq!(task.duration_seconds(), 10);
    }

    #[test]
    fn task_duration_accepts_five() {
        let task = make_task(serde_json::json!({"duration": 5}));
        assert_eq!(task.duration_seconds(), 5);
    }

    #[test]
    fn task_image_urls_empty_array_is_none() {
        let task = make_task(serde_json::json!({"imageUrls": []}));
        assert!(task.image_urls().is_none());
    }

    fn make_task(metadata: serde_json::Value) -> Task {
        Task {
            id: "t1".into(),
            session_id: None,
            task_type: "text2video".into(),
            prompt: "a prompt".into(),
            message: Message {
                role: Role::User,
                parts: vec![Part::text("a prompt")],
            },
            metadata: Some(metadata),
            status: TaskStatus::new(TaskState::Submitted, None),
            history: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    #[test]
    fn event_type_round_trips_through_str() {
        for et in [
            EventType::StatusUpdate,
            EventType::ArtifactCreated,
            EventType::Completion,
            EventType::Error,
        ] {
            assert_eq!(EventType::parse(et.as_str()), Some(et));
        }
    }
}
