//! Process configuration — environment adapter for `src/bin/server.rs`.
//!
//! Intentionally a thin adapter with no engine logic: the core engine is
//! configured by plain Rust values (`TaskQueueConfig`, a port number);
//! reading them from the process environment, `.env` loading, and
//! CORS/agent-card setup are all external concerns layered on top in the
//! binary, keeping `main.rs` thin and pushing logic into the library.

use std::env;

use crate::server::task_queue::TaskQueueConfig;

/// Startup configuration read from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub queue: TaskQueueConfig,
    pub demo_mode: bool,
}

impl Config {
    /// Read configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parsed("PORT").unwrap_or(8080),
            queue: TaskQueueConfig {
                max_concurrent: env_parsed("MAX_CONCURRENT_TASKS").unwrap_or(5),
                max_retries: env_parsed("MAX_RETRIES").unwrap_or(3),
                retry_delay_ms: env_parsed("RETRY_DELAY_MS").unwrap_or(1000),
            },
            demo_mode: env::var("DEMO_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
