//! Skill workers — lazy, cooperatively-cancellable update sequences (C3).
//!
//! A worker is any type that can drive a task to a terminal state, yielding
//! `Update`s one at a time over a single-producer/single-consumer channel.
//! The channel has capacity 1 so the producer genuinely blocks on `send`
//! until the consumer (`TaskProcessor`) has pulled the previous value —
//! this is how a lazy update sequence is modeled without a language-level
//! generator: a producer-pushes-updates idiom narrowed to one channel per
//! in-flight task instead of a fan-out broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::types::{Artifact, Part, Task, TaskState};

/// Shared with the worker so the processor can request cancellation; checked
/// only at suspension points.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution context handed to a worker for one task.
pub struct WorkerContext {
    pub task: Task,
    pub cancelled: CancelFlag,
}

/// One step of a worker's progress sequence.
#[derive(Debug, Clone)]
pub struct Update {
    pub state: TaskState,
    pub message: String,
    pub artifacts: Vec<Artifact>,
}

impl Update {
    pub fn working(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::Working,
            message: message.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn input_required(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::InputRequired,
            message: message.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::Failed,
            message: message.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            state: TaskState::Cancelled,
            message: "cancelled".to_string(),
            artifacts: Vec::new(),
        }
    }

    pub fn completed(message: impl Into<String>, artifact: Artifact) -> Self {
        Self {
            state: TaskState::Completed,
            message: message.into(),
            artifacts: vec![artifact],
        }
    }
}

/// A polymorphic capability: anything that can drive a task's worker
/// sequence. `handle` owns the sending half of the channel and must close
/// it (by returning) only after pushing a terminal `Update`.
#[async_trait]
pub trait SkillWorker: Send + Sync {
    async fn handle(&self, ctx: WorkerContext, tx: mpsc::Sender<Update>);
}

/// Spawn a worker and return the receiving half of its update channel.
/// Capacity 1 enforces the "one update at a time" lazy-pull contract.
pub fn drive(worker: Arc<dyn SkillWorker>, ctx: WorkerContext) -> mpsc::Receiver<Update> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        worker.handle(ctx, tx).await;
    });
    rx
}

/// Validate a prompt against a worker's minimum length. Returns an
/// `input-required` update if invalid.
fn validate_prompt(prompt: &str, min_len: usize) -> Option<Update> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Some(Update::input_required(
            "A non-empty prompt is required to generate this asset.",
        ));
    }
    if trimmed.len() < min_len {
        return Some(Update::input_required(format!(
            "Prompt is too short; at least {min_len} characters are required."
        )));
    }
    None
}

/// Simulated upstream generation backend boundary. Real implementations
/// would own a private `task_id -> upstream job id` map and talk to a
/// provider API; the stub here sleeps to simulate latency and always
/// succeeds, so tests are deterministic.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str, ctx: &WorkerContext) -> Result<String, String>;
}

/// Deterministic stub backend — returns a synthetic asset URL after a short
/// simulated delay, honoring cancellation between "progress ticks".
pub struct StubBackend {
    asset_url_prefix: &'static str,
    ticks: u32,
    job_ids: Mutex<HashMap<String, String>>,
}

impl StubBackend {
    pub fn new(asset_url_prefix: &'static str, ticks: u32) -> Self {
        Self {
            asset_url_prefix,
            ticks,
            job_ids: Mutex::new(HashMap::new()),
        }
    }

    async fn run_ticks(&self, ctx: &WorkerContext, tx: &mpsc::Sender<Update>) -> Option<Update> {
        for i in 1..=self.ticks {
            if ctx.cancelled.is_set() {
                return Some(Update::cancelled());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            let pct = (i * 100) / self.ticks;
            if tx
                .send(Update::working(format!("generating... {pct}%")))
                .await
                .is_err()
            {
                return None;
            }
        }
        None
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    async fn generate(&self, prompt: &str, ctx: &WorkerContext) -> Result<String, String> {
        let job_id = uuid::Uuid::new_v4().to_string();
        self.job_ids
            .lock()
            .await
            .insert(ctx.task.id.clone(), job_id.clone());
        if ctx.cancelled.is_set() {
            return Err("cancelled".to_string());
        }
        Ok(format!(
            "{}/{}.bin?prompt={}",
            self.asset_url_prefix,
            job_id,
            urlencode(prompt)
        ))
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_string() } else { "_".to_string() })
        .collect()
}

/// `text2image` worker. Minimum prompt length 5.
pub struct ImageWorker {
    backend: Arc<StubBackend>,
}

impl ImageWorker {
    pub fn new() -> Self {
        Self {
            backend: Arc::new(StubBackend::new("https://assets.invalid/images", 3)),
        }
    }

    pub fn with_backend(backend: Arc<StubBackend>) -> Self {
        Self { backend }
    }
}

impl Default for ImageWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SkillWorker for ImageWorker {
    async fn handle(&self, ctx: WorkerContext, tx: mpsc::Sender<Update>) {
        if let Some(update) = validate_prompt(&ctx.task.prompt, 5) {
            let _ = tx.send(update).await;
            return;
        }

        if let Some(terminal) = self.backend.run_ticks(&ctx, &tx).await {
            let _ = tx.send(terminal).await;
            return;
        }

        match self.backend.generate(&ctx.task.prompt, &ctx).await {
            Ok(url) => {
                let artifact = Artifact {
                    parts: vec![
                        Part::Image { url: url.clone() },
                        Part::text(
                            serde_json::json!({"prompt": ctx.task.prompt, "url": url}).to_string(),
                        ),
                    ],
                    metadata: None,
                    index: 0,
                };
                let _ = tx.send(Update::completed("image generated", artifact)).await;
            }
            Err(e) => {
                let _ = tx.send(Update::failed(format!("image backend error: {e}"))).await;
            }
        }
    }
}

/// `text2video` worker. Minimum prompt length 5. Requires
/// `metadata.imageUrls` (non-empty) — its absence is a backend-level
/// invalid-request failure, not an input-required prompt issue.
pub struct VideoWorker {
    backend: Arc<StubBackend>,
}

impl VideoWorker {
    pub fn new() -> Self {
        Self {
            backend: Arc::new(StubBackend::new("https://assets.invalid/videos", 5)),
        }
    }

    pub fn with_backend(backend: Arc<StubBackend>) -> Self {
        Self { backend }
    }
}

impl Default for VideoWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SkillWorker for VideoWorker {
    async fn handle(&self, ctx: WorkerContext, tx: mpsc::Sender<Update>) {
        if let Some(update) = validate_prompt(&ctx.task.prompt, 5) {
            let _ = tx.send(update).await;
            return;
        }

        if ctx.task.image_urls().is_none() {
            let _ = tx
                .send(Update::failed(
                    "text2video requires metadata.imageUrls (non-empty)",
                ))
                .await;
            return;
        }

        if let Some(terminal) = self.backend.run_ticks(&ctx, &tx).await {
            let _ = tx.send(terminal).await;
            return;
        }

        match self.backend.generate(&ctx.task.prompt, &ctx).await {
            Ok(url) => {
                let duration = ctx.task.duration_seconds();
                let artifact = Artifact {
                    parts: vec![
                        Part::Video { url: url.clone() },
                        Part::text(
                            serde_json::json!({"prompt": ctx.task.prompt, "url": url, "durationSeconds": duration})
                                .to_string(),
                        ),
                    ],
                    metadata: None,
                    index: 0,
                };
                let _ = tx.send(Update::completed("video generated", artifact)).await;
            }
            Err(e) => {
                let _ = tx.send(Update::failed(format!("video backend error: {e}"))).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, Role, TaskStatus};

    fn make_task(task_type: &str, prompt: &str, metadata: Option<serde_json::Value>) -> Task {
        Task {
            id: "t1".into(),
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

    async fn collect(rx: &mut mpsc::Receiver<Update>) -> Vec<Update> {
        let mut out = Vec::new();
        while let Some(u) = rx.recv().await {
            let terminal = u.state.is_terminal();
            out.push(u);
            if terminal {
                break;
            }
        }
        out
    }

    #[tokio::test]
    async fn image_worker_rejects_empty_prompt() {
        let ctx = WorkerContext {
            task: make_task("text2image", "   ", None),
            cancelled: CancelFlag::new(),
        };
        let mut rx = drive(Arc::new(ImageWorker::new()), ctx);
        let updates = collect(&mut rx).await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, TaskState::InputRequired);
    }

    #[tokio::test]
    async fn image_worker_completes_with_one_artifact() {
        let ctx = WorkerContext {
            task: make_task("text2image", "a futuristic cityscape at sunset", None),
            cancelled: CancelFlag::new(),
        };
        let mut rx = drive(Arc::new(ImageWorker::new()), ctx);
        let updates = collect(&mut rx).await;
        let last = updates.last().unwrap();
        assert_eq!(last.state, TaskState::Completed);
        assert_eq!(last.artifacts.len(), 1);
        assert!(matches!(last.artifacts[0].parts[0], Part::Image { .. }));
    }

    #[tokio::test]
    async fn video_worker_fails_without_image_urls() {
        let ctx = WorkerContext {
            task: make_task("text2video", "a sweeping drone shot", None),
            cancelled: CancelFlag::new(),
        };
        let mut rx = drive(Arc::new(VideoWorker::new()), ctx);
        let updates = collect(&mut rx).await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].state, TaskState::Failed);
        assert!(updates[0].message.contains("imageUrls"));
    }

    #[tokio::test]
    async fn video_worker_completes_with_image_urls_present() {
        let metadata = serde_json::json!({"imageUrls": ["https://example.com/a.png"]});
        let ctx = WorkerContext {
            task: make_task("text2video", "a sweeping drone shot", Some(metadata)),
            cancelled: CancelFlag::new(),
        };
        let mut rx = drive(Arc::new(VideoWorker::new()), ctx);
        let updates = collect(&mut rx).await;
        let last = updates.last().unwrap();
        assert_eq!(last.state, TaskState::Completed);
        assert!(matches!(last.artifacts[0].parts[0], Part::Video { .. }));
    }

    #[tokio::test]
    async fn cancellation_is_observed_between_ticks() {
        let cancelled = CancelFlag::new();
        cancelled.set();
        let ctx = WorkerContext {
            task: make_task("text2image", "a valid prompt here", None),
            cancelled,
        };
        let mut rx = drive(Arc::new(ImageWorker::new()), ctx);
        let updates = collect(&mut rx).await;
        assert_eq!(updates.last().unwrap().state, TaskState::Cancelled);
    }
}
