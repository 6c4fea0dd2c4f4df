//! # a2a-engine — task orchestration and notification fabric for an
//! Agent-to-Agent (A2A) generation service.
//!
//! This crate implements the part of an A2A-protocol generation service
//! that is hard to get right under concurrency: a task store with ordered
//! history and listener fan-out, a bounded concurrent task queue with
//! retry and cancellation, a processor that drives a skill worker as a
//! lazy update stream, and a notification hub multiplexing SSE
//! connections and webhook POSTs per task.
//!
//! Concrete generation backends (image/video providers), authentication,
//! and clustering are explicitly out of scope — see `DESIGN.md`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use a2a_engine::server::{
//!     A2AService, ImageWorker, InMemoryTaskStore, NotificationBridge, NotificationHub,
//!     SkillWorker, TaskProcessor, TaskQueue, TaskQueueConfig, TaskStore, VideoWorker,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
//!     let hub = Arc::new(NotificationHub::new());
//!     store.add_listener(Arc::new(NotificationBridge::new(hub.clone()))).await;
//!
//!     let mut workers: HashMap<String, Arc<dyn SkillWorker>> = HashMap::new();
//!     workers.insert("text2image".into(), Arc::new(ImageWorker::new()));
//!     workers.insert("text2video".into(), Arc::new(VideoWorker::new()));
//!
//!     let processor = Arc::new(TaskProcessor::new(store.clone(), workers));
//!     let queue = Arc::new(TaskQueue::new(processor, TaskQueueConfig::default()));
//!     let _service = Arc::new(A2AService::new(store, queue, hub));
//! }
//! ```

pub mod config;
pub mod error;
pub mod server;
pub mod types;

pub mod prelude {
    pub use crate::error::{A2AError, A2AResult};
    pub use crate::server::{
        A2AService, CancelFlag, GenerationBackend, ImageWorker, InMemoryTaskStore,
        NotificationBridge, NotificationHub, QueueStatus, SkillWorker, StubBackend, TaskListener,
        TaskProcessor, TaskQueue, TaskQueueConfig, TaskStore, Update, VideoWorker, WorkerContext,
    };
    pub use crate::types::{
        Artifact, EventType, Message, Part, Role, Task, TaskState, TaskStatus,
    };
}

pub use error::{A2AError, A2AResult};
