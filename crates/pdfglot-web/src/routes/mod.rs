//! HTTP route handlers for the translation shell.
//!
//! All routes return HTML fragments for HTMX consumption, except the output
//! download which streams a PDF. Fragments use Askama templates from the
//! `templates` module.

mod connect;
mod files;
mod job;
mod outputs;
mod settings;

pub use connect::{connect, refresh_models};
pub use files::{clear_files, remove_file, upload_files};
pub use job::{cancel_job, job_status, job_stream, start_job};
pub use outputs::{download_output, list_outputs, log_pane};
pub use settings::update_settings;

use axum::extract::State;
use std::sync::Arc;

use crate::state::AppState;
use crate::templates::{
    ConnectionView, FileView, IndexTemplate, OutputView, SettingsView,
};

/// The shell page.
pub async fn index(State(state): State<Arc<AppState>>) -> IndexTemplate {
    let config = state.config().await;
    let phase = state.phase().await;
    let connection = state.connection().await;
    let files = state.staged_files().await;

    IndexTemplate {
        phase_label: phase.label(),
        phase_class: phase.css_class(),
        conn: ConnectionView::new(&config, &connection),
        settings: SettingsView::new(&config),
        files: files.iter().map(FileView::from).collect(),
    }
}

/// Output rows for the last job, newest job only.
async fn output_views(state: &AppState) -> Vec<OutputView> {
    match state.active_job().await {
        Some(job) => job
            .outputs
            .read()
            .await
            .iter()
            .map(|entry| OutputView {
                id: entry.id.to_string(),
                name: entry.name.clone(),
            })
            .collect(),
        None => Vec::new(),
    }
}
