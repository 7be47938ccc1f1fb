//! Loopback OpenAI-compatible gateway for engine subprocesses.
//!
//! The document engine speaks the OpenAI chat-completions protocol and runs as
//! a separate process, so it cannot call [`Translator`](super::Translator)
//! directly. Each job starts a short-lived HTTP listener on a loopback port and
//! points the engine at it; every fragment the engine translates then flows
//! through the bridge's rate limiter, retry policy and error classification.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::ollama::{ChatMessage, ChatRequest, OllamaClient};
use crate::engine::CancelFlag;
use crate::error::Result;

#[derive(Clone)]
struct GatewayState {
    client: Arc<OllamaClient>,
    cancel: CancelFlag,
}

/// Chat-completions request in the OpenAI wire format.
///
/// Only the fields the bridge acts on are modeled; anything else the engine
/// sends (penalties, streaming flags) is ignored.
#[derive(Debug, Deserialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(default)]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct CompletionResponse {
    id: String,
    object: &'static str,
    created: u64,
    model: String,
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Serialize)]
struct CompletionChoice {
    index: u32,
    message: ChatMessage,
    finish_reason: &'static str,
}

/// A running per-job gateway listener.
pub struct TranslatorGateway {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl TranslatorGateway {
    /// Bind a loopback port and start serving.
    ///
    /// The listener stays up until [`shutdown`](Self::shutdown); requests
    /// arriving after `cancel` is set are rejected with 503 so the engine
    /// stops making progress quickly.
    pub async fn start(client: Arc<OllamaClient>, cancel: CancelFlag) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = GatewayState { client, cancel };
        let router = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/models", get(list_models))
            .with_state(state);

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = rx.await;
            });
            if let Err(e) = serve.await {
                error!("Gateway listener failed: {}", e);
            }
        });

        debug!("Translator gateway listening on {}", addr);
        Ok(Self {
            addr,
            shutdown: Some(tx),
            task,
        })
    }

    /// Base URL the engine should use as its OpenAI endpoint.
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Stop the listener and wait for in-flight requests to drain.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

async fn chat_completions(
    State(state): State<GatewayState>,
    Json(request): Json<CompletionRequest>,
) -> Response {
    if state.cancel.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "translation cancelled").into_response();
    }

    debug!(
        "Gateway chat request (engine asked for model {})",
        request.model
    );

    // The bridge's configured model wins; messages pass through verbatim.
    let mut upstream = ChatRequest::new(state.client.model(), request.messages);
    if let Some(temperature) = request.temperature {
        upstream = upstream.with_temperature(temperature);
    }

    match state.client.chat(&upstream).await {
        Ok(message) => Json(CompletionResponse {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: "chat.completion",
            created: unix_now(),
            model: state.client.model().to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message,
                finish_reason: "stop",
            }],
        })
        .into_response(),
        Err(e) => {
            warn!("Gateway upstream error: {}", e);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

async fn list_models(State(state): State<GatewayState>) -> Response {
    match state.client.list_models().await {
        Ok(models) => {
            let data: Vec<serde_json::Value> = models
                .iter()
                .map(|m| serde_json::json!({ "id": m.name, "object": "model" }))
                .collect();
            Json(serde_json::json!({ "object": "list", "data": data })).into_response()
        }
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;

    #[tokio::test]
    async fn test_cancelled_gateway_rejects_requests() {
        let config = BridgeConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = Arc::new(OllamaClient::new(&config));
        let cancel = CancelFlag::new();
        cancel.cancel();

        let gateway = TranslatorGateway::start(client, cancel).await.unwrap();
        let url = format!("{}/chat/completions", gateway.base_url());

        let response = reqwest::Client::new()
            .post(&url)
            .json(&serde_json::json!({
                "model": "anything",
                "messages": [{ "role": "user", "content": "hi" }]
            }))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 503);
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_base_url_includes_v1_prefix() {
        let client = Arc::new(OllamaClient::new(&BridgeConfig::default()));
        let gateway = TranslatorGateway::start(client, CancelFlag::new())
            .await
            .unwrap();
        assert!(gateway.base_url().starts_with("http://127.0.0.1:"));
        assert!(gateway.base_url().ends_with("/v1"));
        gateway.shutdown().await;
    }
}
