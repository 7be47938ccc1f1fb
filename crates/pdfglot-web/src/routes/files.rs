//! Staged input file routes: upload, remove, clear.

use axum::extract::{Path, State};
use axum_extra::extract::Multipart;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::helpers::{ResultExt, RouteResult, conflict};
use crate::state::AppState;
use crate::templates::{FileListTemplate, FileView};

/// Stage uploaded PDFs for the next job (multipart field `files`, repeatable).
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> RouteResult<FileListTemplate> {
    if state.phase().await.is_running() {
        return conflict("Cannot add files while a job is running");
    }

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or("document.pdf").to_string();
        let data = field.bytes().await.or_bad_request()?;
        if data.is_empty() {
            // An empty file input still submits one empty part
            continue;
        }

        let staged = state
            .stage_file(&filename, &data)
            .await
            .or_internal_error()?;
        info!("Staged {} ({} bytes)", staged.name, staged.size);
    }

    file_list(&state).await
}

/// Remove one staged file by id.
pub async fn remove_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> RouteResult<FileListTemplate> {
    if state.phase().await.is_running() {
        return conflict("Cannot remove files while a job is running");
    }

    let id = Uuid::parse_str(&id).or_bad_request()?;
    if !state.remove_file(id).await {
        warn!("Tried to remove unknown staged file {id}");
    }
    file_list(&state).await
}

/// Drop every staged file.
pub async fn clear_files(State(state): State<Arc<AppState>>) -> RouteResult<FileListTemplate> {
    if state.phase().await.is_running() {
        return conflict("Cannot clear files while a job is running");
    }

    state.clear_files().await;
    file_list(&state).await
}

async fn file_list(state: &AppState) -> RouteResult<FileListTemplate> {
    let files = state.staged_files().await;
    Ok(FileListTemplate {
        files: files.iter().map(FileView::from).collect(),
    })
}
