//! Test utilities and common setup.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agenthub::api::{self, AppState};
use agenthub::config::AppConfig;
use agenthub::scripts::{ScriptError, ScriptJobs, ScriptResult, ScriptRunner, ScriptService};
use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

/// Script runner that answers from its arguments instead of spawning.
///
/// A program named `fail.py` fails; every other program echoes
/// `{"program":..,"id":..,"config":<payload>}`.
pub struct FakeScriptRunner;

#[async_trait]
impl ScriptRunner for FakeScriptRunner {
    async fn run(&self, json_config: &str, program: &str, tracking_id: &str) -> ScriptResult<String> {
        if program.ends_with("fail.py") {
            return Err(ScriptError::Failed {
                program: program.to_string(),
                code: Some(1),
                stderr: "Traceback: boom".to_string(),
            });
        }
        Ok(format!(
            r#"{{"program":"{program}","id":"{tracking_id}","config":{json_config}}}"#
        ))
    }
}

/// Default configuration with a short agent reply timeout.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.hub.request_timeout_secs = 1;
    config
}

/// Application state with the fake script runner.
pub fn test_state(config: AppConfig) -> AppState {
    let scripts = ScriptService::new(Arc::new(FakeScriptRunner), ScriptJobs::new());
    AppState::with_scripts(config, scripts)
}

/// Create a test application with all services initialized.
pub fn test_app() -> Router {
    api::create_router(test_state(test_config()))
}

/// Serve `state` on an ephemeral local port.
pub async fn spawn_server(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}
