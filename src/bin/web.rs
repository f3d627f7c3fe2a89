//! CareCrew HTTP 接入
//!
//! 启动: cargo run --bin carecrew-web --features web
//! 端口取 CARECREW_WEB_PORT，否则用配置 [app] port（默认 8080）

#![cfg(feature = "web")]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use carecrew::agents::AgentKind;
use carecrew::config::load_config;
use carecrew::core::{ChatReply, ChatRequest, Orchestrator, OrchestratorBuilder, Shutdown};
use carecrew::memory::{EntityMap, Message, SessionMemory};

/// 演示场景的会话与消息
const DEMO_SESSION: &str = "demo-session";
const DEMO_MESSAGE: &str = "My laptop order #12345 won't turn on, I need help!";

struct AppState {
    orchestrator: Arc<Orchestrator>,
    memory: Arc<SessionMemory>,
}

#[derive(Deserialize)]
struct ResetRequest {
    session_id: Option<String>,
}

#[derive(Serialize)]
struct SessionView {
    session_id: String,
    messages: Vec<Message>,
    entities: EntityMap,
}

#[derive(Serialize)]
struct DemoView {
    session_id: &'static str,
    message: &'static str,
    result: ChatReply,
}

#[derive(Serialize)]
struct ClearedView {
    cleared: usize,
}

#[derive(Serialize)]
struct AgentInfo {
    id: AgentKind,
    description: &'static str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    carecrew::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let shutdown = Arc::new(Shutdown::new());
    shutdown.install_signal_handlers();

    let memory = Arc::new(SessionMemory::from_config(&cfg.session));
    let sweep_every = Duration::from_secs(cfg.session.sweep_interval_secs.unwrap_or(300).max(1));

    let port = std::env::var("CARECREW_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.app.port);

    let orchestrator = Arc::new(
        OrchestratorBuilder::new(cfg)
            .with_memory(Arc::clone(&memory))
            .build(),
    );
    let sweeper = orchestrator.spawn_sweeper(sweep_every, shutdown.token());
    let state = Arc::new(AppState { orchestrator, memory });

    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/chat", post(api_chat))
        .route("/api/demo", get(api_demo))
        .route("/api/reset", post(api_reset_all))
        .route("/api/session/reset", post(api_session_reset))
        .route("/api/session/:id", get(api_session_get).delete(api_session_delete))
        .route("/api/sessions", get(api_sessions_list))
        .route("/api/agents", get(api_agents_list))
        .with_state(Arc::clone(&state));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("CareCrew API: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let graceful = Arc::clone(&shutdown);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { graceful.wait().await })
        .await?;

    shutdown.join(sweeper, Duration::from_secs(2)).await;
    state.orchestrator.clear_all().await;
    Ok(())
}

/// POST /api/chat：{ "session_id": "...", "message": "..." } -> { reply, plan_trace, degraded, ... }
async fn api_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatReply>, (StatusCode, String)> {
    if req.session_id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "session_id is required".to_string()));
    }
    if req.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".to_string()));
    }
    let resp = state.orchestrator.handle(&req.session_id, &req.message).await;
    Ok(Json(resp.into()))
}

/// GET /api/demo：在固定会话上跑一遍订单 #12345 场景
async fn api_demo(State(state): State<Arc<AppState>>) -> Json<DemoView> {
    let resp = state.orchestrator.handle(DEMO_SESSION, DEMO_MESSAGE).await;
    Json(DemoView {
        session_id: DEMO_SESSION,
        message: DEMO_MESSAGE,
        result: resp.into(),
    })
}

/// POST /api/reset：删除全部会话
async fn api_reset_all(State(state): State<Arc<AppState>>) -> Json<ClearedView> {
    Json(ClearedView {
        cleared: state.orchestrator.clear_all().await,
    })
}

/// POST /api/session/reset：{ "session_id": "..." }
async fn api_session_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let session_id = match req.session_id.filter(|s| !s.is_empty()) {
        Some(s) => s,
        None => return Err((StatusCode::BAD_REQUEST, "session_id is required".to_string())),
    };
    if state.orchestrator.reset(&session_id).await {
        Ok(StatusCode::OK)
    } else {
        Err((StatusCode::NOT_FOUND, format!("session {} not found", session_id)))
    }
}

/// GET /api/session/:id：完整历史 + 已抽取实体
async fn api_session_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let messages = state.memory.history(&id, None).await;
    if messages.is_empty() && !state.memory.session_ids().await.contains(&id) {
        return Err((StatusCode::NOT_FOUND, format!("session {} not found", id)));
    }
    let entities = state.memory.context_for(&id).await.entities;
    Ok(Json(SessionView {
        session_id: id,
        messages,
        entities,
    }))
}

/// DELETE /api/session/:id：删除会话
async fn api_session_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.orchestrator.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("session {} not found", id)))
    }
}

/// GET /api/sessions：未过期会话 ID
async fn api_sessions_list(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.memory.session_ids().await)
}

/// GET /api/agents：可用专家
async fn api_agents_list() -> Json<Vec<AgentInfo>> {
    Json(
        AgentKind::ALL
            .iter()
            .map(|kind| AgentInfo {
                id: *kind,
                description: kind.description(),
            })
            .collect(),
    )
}
