#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Mock WiiM/LinkPlay HTTP device for integration tests.
//!
//! Serves `GET /httpapi.asp?command=...` the way a real device does, as a
//! small axum router. Unrecognized commands fall back to a plausible
//! default status body so a
//! [`wiim_linkplay_core::Player`] can probe and refresh without every test
//! having to stub every command.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use wiim_linkplay_core::profile::Protocol;
use wiim_linkplay_core::PlayerOptions;

#[derive(Default)]
struct MockState {
    responses: HashMap<String, String>,
    commands: Vec<String>,
}

pub struct MockDevice {
    addr: SocketAddr,
    state: Arc<RwLock<MockState>>,
    handle: JoinHandle<()>,
}

impl MockDevice {
    pub async fn start() -> Self {
        let state = Arc::new(RwLock::new(MockState::default()));
        let app = Router::new()
            .route("/httpapi.asp", get(handle_httpapi))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, handle }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Connection options pointed at this mock over plain HTTP.
    pub fn player_options(&self) -> PlayerOptions {
        PlayerOptions {
            port: Some(self.addr.port()),
            protocol: Some(Protocol::Http),
            ..Default::default()
        }
    }

    /// Stub the exact (or prefix-matched) response body for one command.
    pub async fn set_response(&self, command: impl Into<String>, body: impl Into<String>) {
        self.state.write().await.responses.insert(command.into(), body.into());
    }

    pub async fn commands_received(&self) -> Vec<String> {
        self.state.read().await.commands.clone()
    }

    pub async fn stop(self) {
        self.handle.abort();
    }
}

async fn handle_httpapi(
    State(state): State<Arc<RwLock<MockState>>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let command = params.get("command").cloned().unwrap_or_default();
    let mut guard = state.write().await;
    guard.commands.push(command.clone());

    if let Some(body) = guard.responses.get(&command).cloned() {
        return body;
    }
    if let Some((_, body)) = guard
        .responses
        .iter()
        .find(|(prefix, _)| command.starts_with(prefix.as_str()))
    {
        return body.clone();
    }
    default_body_for(&command)
}

/// Plausible default bodies for commands a test hasn't explicitly stubbed,
/// keyed by prefix, covering the `*Ex` status probe and the two
/// role-resolution endpoints (spec.md §4.6).
fn default_body_for(command: &str) -> String {
    if command.starts_with("getPlayerStatusEx")
        || command.starts_with("getStatusEx")
        || command.starts_with("getPlayerStatus")
        || command.starts_with("getStatus")
    {
        serde_json::json!({
            "uuid": "MOCK-UUID-0001",
            "project": "WiiM_Pro_Plus",
            "firmware": "4.6.8020",
            "wmrm_version": "4.2",
            "group": "0",
            "status": "play",
            "vol": 30,
            "mute": 0,
            "Title": "",
            "curpos": 0,
            "totlen": 0,
            "loop": 0,
        })
        .to_string()
    } else if command.starts_with("multiroom:getSlaveList") {
        serde_json::json!({ "slaves": [] }).to_string()
    } else if wiim_linkplay_core::endpoint::allows_non_json(command) {
        "OK".to_string()
    } else {
        // Commands outside the non-JSON allow-list must return a parseable
        // body (spec.md §4.2); a bare status object is enough for tests
        // that only care the command round-tripped successfully.
        serde_json::json!({"status": "OK"}).to_string()
    }
}
