//! A2A generation engine — task orchestration and notification fabric.
//!
//! - [`task_store`] — C1, in-memory task persistence with listener fan-out
//! - [`notification_hub`] — C2, per-task SSE/webhook fan-out with filtering
//! - [`skill_worker`] — C3, the lazy cooperatively-cancellable worker contract
//! - [`task_processor`] — C4, drives one task through its worker
//! - [`task_queue`] — C5, bounded-concurrency FIFO with retry and cancel
//! - [`service`] — C6, JSON-RPC method dispatch
//! - [`http`] — C7, axum routes binding C6/C2 to the wire

pub mod http;
pub mod notification_hub;
pub mod service;
pub mod skill_worker;
pub mod task_processor;
pub mod task_queue;
pub mod task_store;

pub use http::router;
pub use notification_hub::{NotificationBridge, NotificationHub, SseSubscriberId};
pub use service::{A2AService, NotificationConfig, NotificationMode};
pub use skill_worker::{
    CancelFlag, GenerationBackend, ImageWorker, SkillWorker, StubBackend, Update, VideoWorker,
    WorkerContext,
};
pub use task_processor::TaskProcessor;
pub use task_queue::{QueueStatus, TaskQueue, TaskQueueConfig};
pub use task_store::{InMemoryTaskStore, ListenerId, TaskListener, TaskStore};
