//! Settings route: update and persist the app configuration.

use axum::extract::{Form, State};
use pdfglot_core::Lang;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::helpers::{ResultExt, RouteResult, conflict};
use crate::state::AppState;
use crate::templates::SettingsSavedTemplate;

/// Settings form. Every field is optional so partial posts (the model
/// dropdown posts alone) work; checkboxes are presence-based.
#[derive(Deserialize, Default)]
pub struct SettingsForm {
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub model: Option<String>,
    pub qps: Option<u32>,
    pub output_dir: Option<String>,
    pub translated: Option<String>,
    pub dual: Option<String>,
}

impl SettingsForm {
    /// Whether this post came from the full settings form (which always
    /// carries the language selects) rather than the model dropdown.
    const fn is_full_form(&self) -> bool {
        self.source_lang.is_some() || self.target_lang.is_some()
    }
}

/// Update settings and persist them; 409 while a job is running.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SettingsForm>,
) -> RouteResult<SettingsSavedTemplate> {
    if state.phase().await.is_running() {
        return conflict("Cannot change settings while a job is running");
    }

    // Validate on a copy so a rejected edit never lands in live config
    let mut candidate = state.config().await;
    if let Some(source) = &form.source_lang {
        candidate.source_lang = Lang::new(source.clone());
    }
    if let Some(target) = &form.target_lang {
        candidate.target_lang = Lang::new(target.clone());
    }
    if let Some(model) = &form.model {
        let trimmed = model.trim();
        if !trimmed.is_empty() {
            candidate.bridge.model = trimmed.to_string();
        }
    }
    if let Some(qps) = form.qps {
        candidate.bridge.qps = qps;
    }
    if let Some(output_dir) = &form.output_dir {
        let trimmed = output_dir.trim();
        candidate.output_dir = (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
    }
    // Unchecked checkboxes are absent from the form body
    if form.is_full_form() {
        candidate.output.translated = form.translated.is_some();
        candidate.output.dual = form.dual.is_some();
    }
    candidate.validate().or_bad_request()?;

    state.update_config(|config| *config = candidate).await;
    state.save_config().await;

    Ok(SettingsSavedTemplate {
        message: "Saved".to_string(),
    })
}
