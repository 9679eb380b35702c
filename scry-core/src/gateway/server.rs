//! HTTP/WebSocket server built on axum.

use super::events::{ChatBody, ChatResponse, TurnMessage};
use super::session::{Session, SinkClosed, TurnSink};
use crate::collaborators::Collaborators;
use crate::config::{ScryConfig, ServerConfig};
use crate::types::Query;
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    collaborators: Arc<Collaborators>,
    config: Arc<ScryConfig>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ScryConfig, collaborators: Arc<Collaborators>) -> Self {
        Self {
            collaborators,
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }

    pub fn collaborators(&self) -> &Arc<Collaborators> {
        &self.collaborators
    }

    pub fn config(&self) -> &ScryConfig {
        &self.config
    }

    fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}

/// Build the axum Router with `/ws/chat`, `/chat`, and `/healthz` routes.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);
    Router::new()
        .route("/ws/chat", get(ws_handler))
        .route("/chat", post(chat_handler))
        .route("/healthz", get(healthz_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        // Development default: any origin.
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Liveness: process health plus per-collaborator availability.
async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "retriever": state.collaborators.has_retriever(),
        "generator": state.collaborators.has_generator(),
        "uptime_secs": state.uptime_secs(),
    }))
}

/// Non-streaming fallback: run the whole pipeline within one request.
async fn chat_handler(State(state): State<AppState>, Json(body): Json<ChatBody>) -> Response {
    let query = match Query::parse(&body.query) {
        Ok(query) => query,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"detail": e.to_string()})),
            )
                .into_response();
        }
    };

    let sources = state.collaborators.retrieve_and_rank(&query).await;
    match state.collaborators.answer(&query, &sources).await {
        Ok(answer) => Json(ChatResponse { answer, sources }).into_response(),
        Err(e) => {
            error!(error = %e, "non-streaming generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"detail": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Outbound half of a chat socket.
struct WsSink {
    tx: SplitSink<WebSocket, WsMessage>,
}

#[async_trait]
impl TurnSink for WsSink {
    async fn send(&mut self, msg: TurnMessage) -> Result<(), SinkClosed> {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound message");
                return Ok(());
            }
        };
        self.tx
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|_| SinkClosed)
    }
}

/// Drive one WebSocket connection until the client leaves.
///
/// Awaiting a new query is bounded by the idle-ping interval: on elapse a
/// `ping` goes out and the wait restarts. The interval never applies while
/// a turn is mid-processing. At most one query is processed at a time.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(%conn_id, "chat client connected");

    let (ws_tx, mut ws_rx) = socket.split();
    let mut sink = WsSink { tx: ws_tx };

    let session = Session::new(Arc::clone(&state.collaborators));
    let idle_ping = Duration::from_secs(state.config.server.idle_ping_secs);

    loop {
        match tokio::time::timeout(idle_ping, ws_rx.next()).await {
            // Idle: keep the connection alive and wait again.
            Err(_elapsed) => {
                if sink.send(TurnMessage::Ping).await.is_err() {
                    break;
                }
            }
            // Stream exhausted or transport error: the client is gone.
            Ok(None) | Ok(Some(Err(_))) => break,
            Ok(Some(Ok(ws_msg))) => {
                let text = match ws_msg {
                    WsMessage::Text(text) => text.to_string(),
                    WsMessage::Close(_) => break,
                    // Transport-level pings/pongs are handled by axum.
                    _ => continue,
                };

                match session.process_turn(&text, &mut sink).await {
                    Ok(outcome) => debug!(%conn_id, ?outcome, "turn finished"),
                    Err(SinkClosed) => break,
                }
            }
        }
    }

    info!(%conn_id, "chat client disconnected");
}

/// Bind the configured address and serve until cancelled.
pub async fn run(state: AppState) -> Result<(), std::io::Error> {
    let addr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    );
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = addr.as_str(), "scry server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
