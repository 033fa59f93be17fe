//! HTTP gateway: `POST /chat` runs one turn, `GET /health` reports status,
//! `POST /agents/sweep` deletes stale agent sessions held by this process.
//!
//! A turn always answers with the `{messages, need_more_info}` shape. Failures
//! inside the pipeline, including a turn timeout, become the apology message;
//! only a malformed request body is rejected at the HTTP level.

use crate::chat::{ChatService, TurnRequest, TurnResponse};
use crate::config::{ExecutionMode, GatewayConfig, RouterStrategy};
use crate::sessions::SweepReport;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub turn_timeout: Duration,
}

impl AppState {
    pub fn new(chat: Arc<ChatService>, config: &GatewayConfig) -> Self {
        Self {
            chat,
            turn_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub strategy: RouterStrategy,
    pub mode: ExecutionMode,
    pub pii_enabled: bool,
    pub live_sessions: usize,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    if request.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message must be non-empty".to_string()));
    }
    match tokio::time::timeout(state.turn_timeout, state.chat.handle(request)).await {
        Ok(response) => Ok(Json(response)),
        Err(_) => {
            tracing::error!(
                timeout_secs = state.turn_timeout.as_secs(),
                "turn timed out"
            );
            Ok(Json(TurnResponse::apology()))
        }
    }
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let router = state.chat.router();
    Json(HealthResponse {
        status: "ok",
        strategy: router.strategy(),
        mode: router.mode(),
        pii_enabled: state.chat.pii_enabled(),
        live_sessions: router.sessions().map_or(0, |s| s.live_sessions()),
    })
}

async fn handle_sweep(State(state): State<AppState>) -> Json<SweepReport> {
    let report = match state.chat.router().sessions() {
        Some(sessions) => sessions.sweep_stale().await,
        None => SweepReport::default(),
    };
    Json(report)
}

/// Build the axum router with body-size limiting.
pub fn app(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/agents/sweep", post(handle_sweep))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

/// Bind and serve until Ctrl+C.
pub async fn run_gateway(state: AppState, config: &GatewayConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind gateway on {addr}"))?;
    tracing::info!(
        %addr,
        strategy = %state.chat.router().strategy(),
        timeout_secs = config.request_timeout_secs,
        "gateway listening"
    );
    axum::serve(listener, app(state, config.max_body_bytes))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("gateway server failed")?;
    tracing::info!("gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::create_chat_service;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app(max_body_bytes: usize) -> Router {
        let chat = create_chat_service(&Config::default()).unwrap();
        let state = AppState {
            chat: Arc::new(chat),
            turn_timeout: Duration::from_secs(5),
        };
        app(state, max_body_bytes)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_strategy_and_mode() {
        let response = test_app(1024)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["strategy"], "BYPASS");
        assert_eq!(body["mode"], "direct");
        assert_eq!(body["pii_enabled"], false);
        assert_eq!(body["live_sessions"], 0);
    }

    #[tokio::test]
    async fn sweep_without_agent_mode_reports_nothing() {
        let response = test_app(1024)
            .oneshot(Request::post("/agents/sweep").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["deleted"], 0);
        assert_eq!(body["busy"], 0);
    }

    #[tokio::test]
    async fn sweep_reaches_the_serving_session_manager() {
        let mut config = Config::default();
        config.router.strategy = RouterStrategy::FunctionCalling;
        config.agent.mode = ExecutionMode::Agent;
        config.agent.stale_after_secs = 0;
        let chat = Arc::new(create_chat_service(&config).unwrap());
        let sessions = Arc::clone(chat.router().sessions().unwrap());
        sessions.get_or_create("c-1").await.unwrap();
        assert_eq!(sessions.live_sessions(), 1);

        let state = AppState {
            chat,
            turn_timeout: Duration::from_secs(5),
        };
        let response = app(state, 1024)
            .oneshot(Request::post("/agents/sweep").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["deleted"], 1);
        assert_eq!(sessions.live_sessions(), 0);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let response = test_app(1024)
            .oneshot(
                Request::post("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let message = "x".repeat(256);
        let response = test_app(64)
            .oneshot(
                Request::post("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(format!(r#"{{"message":"{message}"}}"#)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn failed_generation_still_returns_payload_shape() {
        // No API key is configured, so free-form generation fails and the
        // turn answers with the apology.
        let response = test_app(4096)
            .oneshot(
                Request::post("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"message":"hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["messages"][0], crate::chat::APOLOGY);
        assert_eq!(body["need_more_info"], false);
    }
}
