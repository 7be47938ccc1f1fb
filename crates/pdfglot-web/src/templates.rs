//! Askama templates for the shell page and its HTMX fragments.
//!
//! ## HTMX patterns used
//!
//! - **Lazy panels**: the shell page loads the progress, outputs, and log
//!   panels with `hx-trigger="load"` so one template renders each panel in
//!   exactly one place.
//! - **OOB swaps**: progress responses carry `hx-swap-oob` updates for the
//!   log pane (and, on completion, the outputs panel).
//! - **SSE**: while a job runs the progress area is an `sse-connect`
//!   element; the final event replaces it out-of-band, which closes the
//!   stream.
//!
//! ## Template structure
//!
//! - `base.html` - common layout with CSS/JS
//! - `index.html` - the single-page shell
//! - `partials/` - fragments swapped by HTMX responses

use askama::Template;
use askama_web::WebTemplate;
use pdfglot_core::{AppConfig, LanguageOption, source_languages, target_languages};

use crate::state::{Connection, ShellPhase, StagedFile};

// =============================================================================
// View models
// =============================================================================

/// Connection panel data: config inputs plus the last probe result.
pub struct ConnectionView {
    pub base_url: String,
    pub model: String,
    pub models: Vec<String>,
    pub connected: bool,
    pub version: String,
    pub model_count: usize,
    pub error: Option<String>,
}

impl ConnectionView {
    pub fn new(config: &AppConfig, connection: &Connection) -> Self {
        let (connected, version, model_count) = match &connection.status {
            Some(status) => (
                true,
                status.version.clone().unwrap_or_else(|| "unknown".to_string()),
                status.model_count,
            ),
            None => (false, String::new(), 0),
        };
        Self {
            base_url: config.bridge.base_url.clone(),
            model: config.bridge.model.clone(),
            models: connection.models.clone(),
            connected,
            version,
            model_count,
            error: connection.error.clone(),
        }
    }

    /// Whether the configured model is missing from the probe's model list.
    pub fn model_missing(&self) -> bool {
        self.connected && !self.models.is_empty() && !self.models.contains(&self.model)
    }
}

/// Settings panel data.
pub struct SettingsView {
    pub source_languages: Vec<LanguageOption>,
    pub target_languages: Vec<LanguageOption>,
    pub source_lang: String,
    pub target_lang: String,
    pub qps: u32,
    pub output_dir: String,
    pub translated: bool,
    pub dual: bool,
}

impl SettingsView {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            source_languages: source_languages(),
            target_languages: target_languages(),
            source_lang: config.source_lang.as_str().to_string(),
            target_lang: config.target_lang.as_str().to_string(),
            qps: config.bridge.qps,
            output_dir: config
                .output_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            translated: config.output.translated,
            dual: config.output.dual,
        }
    }
}

/// One staged input file row.
pub struct FileView {
    pub id: String,
    pub name: String,
    pub size_kb: u64,
}

impl From<&StagedFile> for FileView {
    fn from(file: &StagedFile) -> Self {
        Self {
            id: file.id.to_string(),
            name: file.name.clone(),
            size_kb: file.size.div_ceil(1024),
        }
    }
}

/// One downloadable artifact row.
pub struct OutputView {
    pub id: String,
    pub name: String,
}

// =============================================================================
// Full page
// =============================================================================

/// The shell page: connection, settings, files, job, outputs, log.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub phase_label: &'static str,
    pub phase_class: &'static str,
    pub conn: ConnectionView,
    pub settings: SettingsView,
    pub files: Vec<FileView>,
}

// =============================================================================
// Fragments
// =============================================================================

/// Connection panel fragment, returned by connect/refresh.
#[derive(Template, WebTemplate)]
#[template(path = "partials/connection.html")]
pub struct ConnectionTemplate {
    pub phase_label: &'static str,
    pub phase_class: &'static str,
    pub conn: ConnectionView,
}

impl ConnectionTemplate {
    pub fn new(phase: ShellPhase, conn: ConnectionView) -> Self {
        Self {
            phase_label: phase.label(),
            phase_class: phase.css_class(),
            conn,
        }
    }
}

/// Staged file list fragment.
#[derive(Template, WebTemplate)]
#[template(path = "partials/file_list.html")]
pub struct FileListTemplate {
    pub files: Vec<FileView>,
}

/// Small confirmation shown next to the settings form after a save.
#[derive(Template, WebTemplate)]
#[template(path = "partials/settings_saved.html")]
pub struct SettingsSavedTemplate {
    pub message: String,
}

/// Progress area fragment.
///
/// While a job runs this renders the SSE-connected progress body; otherwise
/// it renders the phase summary and the start button. With `oob` set the
/// root swaps itself out-of-band, which is how the final SSE event replaces
/// the connector and closes the stream.
#[derive(Template, WebTemplate)]
#[template(path = "partials/progress.html")]
pub struct ProgressTemplate {
    pub oob: bool,
    pub running: bool,
    pub phase_label: &'static str,
    pub phase_class: &'static str,
    pub has_job: bool,
    pub percent: u32,
    pub stage: String,
    pub current_file: String,
    pub files_done: usize,
    pub total_files: usize,
    pub error: Option<String>,
    pub log_lines: Vec<String>,
    pub outputs: Vec<OutputView>,
}

/// Inner progress markup pushed over SSE while the job runs.
///
/// Swapped into the connector's inner HTML; carries the log pane update
/// out-of-band.
#[derive(Template, WebTemplate)]
#[template(path = "partials/progress_body.html")]
pub struct ProgressBodyTemplate {
    pub phase_label: &'static str,
    pub phase_class: &'static str,
    pub percent: u32,
    pub stage: String,
    pub current_file: String,
    pub files_done: usize,
    pub total_files: usize,
    pub log_lines: Vec<String>,
}

/// Log pane lines fragment.
#[derive(Template, WebTemplate)]
#[template(path = "partials/log_lines.html")]
pub struct LogTemplate {
    pub log_lines: Vec<String>,
}

/// Outputs panel fragment: artifacts of the last job.
#[derive(Template, WebTemplate)]
#[template(path = "partials/output_list.html")]
pub struct OutputsTemplate {
    pub outputs: Vec<OutputView>,
}
