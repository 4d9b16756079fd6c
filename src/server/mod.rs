mod error;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info};

pub use error::ApiError;

use crate::llm::Role;
use crate::relay::{OutboundEvent, Relay, Turn};

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub image_data: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    pub messages: Vec<IncomingMessage>,
}

impl From<IncomingMessage> for Turn {
    fn from(m: IncomingMessage) -> Self {
        Turn::new(m.role, m.content, m.image_data.unwrap_or_default())
    }
}

pub fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin: {o}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/chat", post(chat))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(listen: SocketAddr, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("bind {listen}"))?;
    info!(addr=%listen, "chat relay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    info!("chat relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(err=%e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "chat-relay API" }))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload.inspect_err(|e| {
        info!(status=%e.status().as_u16(), reason=%e.body_text(), "rejected chat request");
    })?;
    let turns: Vec<Turn> = payload.messages.into_iter().map(Turn::from).collect();
    info!(turns = turns.len(), "chat request");

    let mut events = state.relay.relay(turns);

    // Failures before anything was relayed become a plain error response
    let first = match events.next().await {
        Some(Err(e)) => {
            error!(err=%format!("{e:#}"), "chat request failed");
            return Err(ApiError::Upstream(e));
        }
        other => other,
    };

    let body = futures::stream::iter(first).chain(events).map(to_sse_event);
    Ok(Sse::new(body)
        .keep_alive(KeepAlive::default())
        .into_response())
}

fn to_sse_event(item: Result<OutboundEvent>) -> Result<Event, axum::Error> {
    let event = match item {
        Ok(event) => event,
        Err(e) => {
            let message = format!("{e:#}");
            error!(err=%message, "chat relay failed mid-stream");
            OutboundEvent::Error { message }
        }
    };
    Event::default().json_data(event)
}

#[cfg(test)]
mod tests;
