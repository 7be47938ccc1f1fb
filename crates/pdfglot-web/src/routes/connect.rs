//! Connection routes: probe the inference server and list its models.

use axum::extract::{Form, State};
use pdfglot_core::OllamaClient;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::helpers::{RouteResult, conflict};
use crate::state::{AppState, Connection, ShellPhase};
use crate::templates::{ConnectionTemplate, ConnectionView};

#[derive(Deserialize)]
pub struct ConnectForm {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Connect/test the inference server.
///
/// Updates the bridge config from the form, probes `/api/version` and
/// `/api/tags`, and renders the connection panel. A failed probe is a normal
/// response showing the error, phase back to Idle.
pub async fn connect(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ConnectForm>,
) -> RouteResult<ConnectionTemplate> {
    if state.phase().await.is_running() {
        return conflict("Cannot reconnect while a job is running");
    }

    let config = state
        .update_config(|config| {
            if let Some(base_url) = &form.base_url {
                let trimmed = base_url.trim();
                if !trimmed.is_empty() {
                    config.bridge.base_url = trimmed.to_string();
                }
            }
            if let Some(api_key) = &form.api_key {
                let trimmed = api_key.trim();
                config.bridge.api_key =
                    (!trimmed.is_empty()).then(|| trimmed.to_string());
            }
        })
        .await;
    state.save_config().await;

    state.set_phase(ShellPhase::Connecting).await;
    let client = OllamaClient::new(&config.bridge);

    let (phase, connection) = match probe(&client).await {
        Ok(connection) => {
            info!(
                "Connected to {} ({} models)",
                config.bridge.base_url,
                connection.models.len()
            );
            (ShellPhase::Ready, connection)
        }
        Err(message) => {
            state.push_log(format!("connect failed: {message}")).await;
            (
                ShellPhase::Idle,
                Connection {
                    error: Some(message),
                    ..Connection::default()
                },
            )
        }
    };

    state.set_connection(connection.clone()).await;
    state.set_phase(phase).await;

    let config = state.config().await;
    Ok(ConnectionTemplate::new(
        phase,
        ConnectionView::new(&config, &connection),
    ))
}

/// Re-query the model list without touching the connection config.
pub async fn refresh_models(
    State(state): State<Arc<AppState>>,
) -> RouteResult<ConnectionTemplate> {
    let config = state.config().await;
    let client = OllamaClient::new(&config.bridge);

    let mut connection = state.connection().await;
    match client.list_models().await {
        Ok(models) => {
            connection.models = models.into_iter().map(|m| m.name).collect();
            connection.error = None;
        }
        Err(e) => {
            connection.error = Some(e.to_string());
        }
    }
    state.set_connection(connection.clone()).await;

    let phase = state.phase().await;
    Ok(ConnectionTemplate::new(
        phase,
        ConnectionView::new(&config, &connection),
    ))
}

/// Full probe: server status plus model names.
async fn probe(client: &OllamaClient) -> Result<Connection, String> {
    let status = client
        .check_connection()
        .await
        .map_err(|e| e.to_string())?;
    let models = client.list_models().await.map_err(|e| e.to_string())?;
    Ok(Connection {
        status: Some(status),
        models: models.into_iter().map(|m| m.name).collect(),
        error: None,
    })
}
