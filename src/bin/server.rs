//! Process entry point — reads configuration from the environment, wires
//! the engine's components together, and serves the HTTP surface.
//!
//! Everything in this file is deliberately a thin adapter: `.env` loading,
//! CORS, and the agent-card document are external to the core engine and
//! live only here, keeping `main` thin and pushing logic into the library.

use std::collections::HashMap;
use std::sync::Arc;

use a2a_engine::config::Config;
use a2a_engine::server::{
    A2AService, ImageWorker, InMemoryTaskStore, NotificationBridge, NotificationHub, SkillWorker,
    TaskProcessor, TaskQueue, TaskStore, VideoWorker,
};
use tower_http::cors::CorsLayer;

fn agent_card(config: &Config) -> serde_json::Value {
    let mut skills = vec![serde_json::json!(
        {"id": "text2image", "name": "Text to Image", "tags": ["image", "generation"]}
    )];
    if config.demo_mode {
        skills.push(serde_json::json!(
            {"id": "text2video", "name": "Text to Video", "tags": ["video", "generation", "demo"]}
        ));
    }

    serde_json::json!({
        "name": "a2a-engine",
        "description": "Agent-to-Agent generation service: text2image, and (in demo mode) text2video",
        "version": env!("CARGO_PKG_VERSION"),
        "url": format!("http://{}", config.bind_addr()),
        "capabilities": {
            "streaming": true,
            "pushNotifications": true,
        },
        "skills": skills,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(
            |_| tracing_subscriber::EnvFilter::new("info"),
        ))
        .init();

    let config = Config::from_env();
    tracing::info!(addr = %config.bind_addr(), demo_mode = config.demo_mode, "starting a2a-engine");

    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let hub = Arc::new(NotificationHub::new());
    store
        .add_listener(Arc::new(NotificationBridge::new(hub.clone())))
        .await;

    let mut workers: HashMap<String, Arc<dyn SkillWorker>> = HashMap::new();
    workers.insert("text2image".to_string(), Arc::new(ImageWorker::new()));
    if config.demo_mode {
        // The video worker is a stub (no real upstream provider is wired
        // up), so it's only registered in demo mode; otherwise text2video
        // falls through to the processor's invalid-taskType terminal-fail.
        workers.insert("text2video".to_string(), Arc::new(VideoWorker::new()));
    }

    let processor = Arc::new(TaskProcessor::new(store.clone(), workers));
    let queue = Arc::new(TaskQueue::new(processor, config.queue));
    let service = Arc::new(A2AService::new(store, queue, hub));

    let app = a2a_engine::server::router(service, agent_card(&config)).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
