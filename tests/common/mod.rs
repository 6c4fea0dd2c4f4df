//! Shared test harness: spin up a real `axum::serve` instance on an
//! ephemeral port for integration tests to drive with `reqwest`.

use std::collections::HashMap;
use std::sync::Arc;

use a2a_engine::server::{
    A2AService, ImageWorker, InMemoryTaskStore, NotificationBridge, NotificationHub, SkillWorker,
    TaskProcessor, TaskQueue, TaskQueueConfig, TaskStore, VideoWorker,
};

pub async fn start_test_server() -> (String, tokio::task::JoinHandle<()>) {
    start_test_server_with_config(TaskQueueConfig::default()).await
}

pub async fn start_test_server_with_config(
    queue_config: TaskQueueConfig,
) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);

    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let hub = Arc::new(NotificationHub::new());
    store
        .add_listener(Arc::new(NotificationBridge::new(hub.clone())))
        .await;

    let mut workers: HashMap<String, Arc<dyn SkillWorker>> = HashMap::new();
    workers.insert("text2image".into(), Arc::new(ImageWorker::new()));
    workers.insert("text2video".into(), Arc::new(VideoWorker::new()));

    let processor = Arc::new(TaskProcessor::new(store.clone(), workers));
    let queue = Arc::new(TaskQueue::new(processor, queue_config));
    let service = Arc::new(A2AService::new(store, queue, hub));

    let agent_card = serde_json::json!({"name": "test-agent"});
    let app = a2a_engine::server::router(service, agent_card);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    (base_url, handle)
}

pub fn send_request(method: &str, params: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    })
}

pub async fn poll_until_terminal(
    client: &reqwest::Client,
    base_url: &str,
    task_id: &str,
) -> serde_json::Value {
    for _ in 0..200 {
        let resp = client
            .get(format!("{base_url}/tasks/{task_id}"))
            .send()
            .await
            .unwrap();
        let task: serde_json::Value = resp.json().await.unwrap();
        let state = task["status"]["state"].as_str().unwrap_or("");
        if matches!(state, "completed" | "failed" | "cancelled" | "input-required") {
            return task;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("task {task_id} did not reach a terminal state in time");
}
