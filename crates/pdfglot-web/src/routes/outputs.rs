//! Output artifact routes plus the log pane fragment.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::helpers::{OptionExt, ResultExt, RouteResult};
use crate::state::AppState;
use crate::templates::{LogTemplate, OutputsTemplate};

/// Artifacts produced by the last job.
pub async fn list_outputs(State(state): State<Arc<AppState>>) -> OutputsTemplate {
    OutputsTemplate {
        outputs: super::output_views(&state).await,
    }
}

/// Stream one artifact as a PDF download.
pub async fn download_output(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> RouteResult<Response> {
    let id = Uuid::parse_str(&id).or_bad_request()?;
    let job = state.active_job().await.or_not_found("No job has run yet")?;

    let entry = job
        .outputs
        .read()
        .await
        .iter()
        .find(|entry| entry.id == id)
        .cloned()
        .or_not_found("Unknown output")?;

    let data = tokio::fs::read(&entry.path).await.map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            format!("Output file no longer exists: {}", entry.path.display()),
        )
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", entry.name),
        )
        .body(Body::from(data))
        .or_internal_error()
}

/// The accumulated log pane.
pub async fn log_pane(State(state): State<Arc<AppState>>) -> LogTemplate {
    LogTemplate {
        log_lines: state.log_lines().await,
    }
}
