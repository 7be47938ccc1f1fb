//! Shared state for the web shell.
//!
//! One translation workspace per server process, mirroring the desktop
//! window this front end replaces. No session map, no expiry: the state is
//! the workspace.

use anyhow::Result;
use pdfglot_core::{AppConfig, CancelFlag, JobOutputs, JobStatus, ServerStatus};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log pane keeps this many most recent lines.
const LOG_CAPACITY: usize = 500;

/// Where the shell is in its workflow.
///
/// Idle → Connecting → Ready → Running → (Completed | Failed | Cancelled).
/// Terminal phases behave like Ready: the connection survives a finished
/// job, so the next one can start without reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellPhase {
    Idle,
    Connecting,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ShellPhase {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Not connected",
            Self::Connecting => "Connecting…",
            Self::Ready => "Ready",
            Self::Running => "Translating",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// CSS class for the phase badge.
    pub const fn css_class(self) -> &'static str {
        match self {
            Self::Idle | Self::Connecting => "phase-idle",
            Self::Ready | Self::Completed => "phase-ready",
            Self::Running => "phase-running",
            Self::Failed | Self::Cancelled => "phase-failed",
        }
    }

    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether a job may start from this phase.
    pub const fn can_start(self) -> bool {
        matches!(
            self,
            Self::Ready | Self::Completed | Self::Failed | Self::Cancelled
        )
    }

    /// Whether settings and the file list may change. Refused mid-job.
    pub const fn can_edit(self) -> bool {
        !self.is_running()
    }
}

/// Connection panel state: what the last probe reported.
#[derive(Debug, Clone, Default)]
pub struct Connection {
    pub status: Option<ServerStatus>,
    /// Model names from `/api/tags`
    pub models: Vec<String>,
    pub error: Option<String>,
}

/// An uploaded input PDF staged for the next job.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub id: Uuid,
    /// Original filename (deduplicated with a numeric suffix on collision)
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// An artifact produced by the last job, addressable for download.
#[derive(Debug, Clone)]
pub struct OutputEntry {
    pub id: Uuid,
    pub name: String,
    pub path: PathBuf,
}

/// Progress tracking for the running (or last finished) job.
///
/// Written by the job task, read by the status/SSE routes. Counters are
/// atomics so the SSE poll never takes the state write lock.
pub struct ActiveJob {
    pub total_files: usize,
    pub files_done: AtomicUsize,
    /// Overall percent × 100, so fractional progress fits an atomic
    percent_x100: AtomicU32,
    pub stage: RwLock<String>,
    pub current_file: RwLock<String>,
    pub done: AtomicBool,
    pub status: RwLock<Option<JobStatus>>,
    pub error: RwLock<Option<String>>,
    pub outputs: RwLock<Vec<OutputEntry>>,
    pub cancel: CancelFlag,
}

impl ActiveJob {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            files_done: AtomicUsize::new(0),
            percent_x100: AtomicU32::new(0),
            stage: RwLock::new(String::new()),
            current_file: RwLock::new(String::new()),
            done: AtomicBool::new(false),
            status: RwLock::new(None),
            error: RwLock::new(None),
            outputs: RwLock::new(Vec::new()),
            cancel: CancelFlag::new(),
        }
    }

    pub fn set_percent(&self, percent: f32) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let stored = (percent.clamp(0.0, 100.0) * 100.0) as u32;
        self.percent_x100.store(stored, Ordering::SeqCst);
    }

    /// Overall percent, rounded for display.
    pub fn percent(&self) -> u32 {
        self.percent_x100.load(Ordering::SeqCst).div_ceil(100).min(100)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub async fn record_outputs(&self, name: &str, outputs: &JobOutputs) {
        let mut entries = self.outputs.write().await;
        for path in outputs.paths() {
            let file_name = path.file_name().map_or_else(
                || name.to_string(),
                |n| n.to_string_lossy().into_owned(),
            );
            entries.push(OutputEntry {
                id: Uuid::new_v4(),
                name: file_name,
                path: path.to_path_buf(),
            });
        }
    }

    pub async fn mark_finished(&self, status: JobStatus, error: Option<String>) {
        *self.status.write().await = Some(status);
        if let Some(message) = error {
            *self.error.write().await = Some(message);
        }
        if status.is_success() {
            self.set_percent(100.0);
        }
        self.done.store(true, Ordering::SeqCst);
    }
}

/// Global application state: the single translation workspace.
pub struct AppState {
    config: RwLock<AppConfig>,
    /// Explicit config path from `--config`; the default location otherwise
    config_path: Option<PathBuf>,
    phase: RwLock<ShellPhase>,
    connection: RwLock<Connection>,
    files: RwLock<Vec<StagedFile>>,
    /// Uploads live here until the process exits
    staging: TempDir,
    job: RwLock<Option<Arc<ActiveJob>>>,
    log: RwLock<VecDeque<String>>,
}

impl AppState {
    pub fn new(config: AppConfig, config_path: Option<PathBuf>) -> Result<Self> {
        let staging = TempDir::new()?;
        Ok(Self {
            config: RwLock::new(config),
            config_path,
            phase: RwLock::new(ShellPhase::Idle),
            connection: RwLock::new(Connection::default()),
            files: RwLock::new(Vec::new()),
            staging,
            job: RwLock::new(None),
            log: RwLock::new(VecDeque::new()),
        })
    }

    pub async fn config(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Apply a config edit and return the result. Persisting is separate so
    /// a failed save never loses the in-memory change.
    pub async fn update_config<F>(&self, f: F) -> AppConfig
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.config.write().await;
        f(&mut config);
        config.clone()
    }

    /// Persist the current config. Failures are logged, not surfaced: the
    /// shell keeps working with the in-memory settings.
    pub async fn save_config(&self) {
        let config = self.config.read().await.clone();
        let result = match &self.config_path {
            Some(path) => config.save_to(path),
            None => config.save(),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to persist config: {e}");
        }
    }

    pub async fn phase(&self) -> ShellPhase {
        *self.phase.read().await
    }

    pub async fn set_phase(&self, phase: ShellPhase) {
        *self.phase.write().await = phase;
    }

    /// Transition into Running if a job may start from the current phase.
    ///
    /// Check and write happen under one lock so two concurrent start
    /// requests cannot both pass the guard. Returns the refusing phase on
    /// failure.
    pub async fn try_begin_job(&self) -> std::result::Result<(), ShellPhase> {
        let mut phase = self.phase.write().await;
        if phase.can_start() {
            *phase = ShellPhase::Running;
            Ok(())
        } else {
            Err(*phase)
        }
    }

    pub async fn connection(&self) -> Connection {
        self.connection.read().await.clone()
    }

    pub async fn set_connection(&self, connection: Connection) {
        *self.connection.write().await = connection;
    }

    // ------------------------------------------------------------------
    // Staged files
    // ------------------------------------------------------------------

    /// Stage an uploaded PDF for the next job.
    ///
    /// The file keeps its original name; a duplicate name gets a numeric
    /// suffix so both inputs survive.
    pub async fn stage_file(&self, name: &str, data: &[u8]) -> Result<StagedFile> {
        let mut files = self.files.write().await;

        let safe_name = sanitize_filename(name);
        let final_name = dedup_name(&safe_name, &files);
        let path = self.staging.path().join(&final_name);
        tokio::fs::write(&path, data).await?;

        let file = StagedFile {
            id: Uuid::new_v4(),
            name: final_name,
            path,
            size: data.len() as u64,
        };
        files.push(file.clone());
        Ok(file)
    }

    pub async fn staged_files(&self) -> Vec<StagedFile> {
        self.files.read().await.clone()
    }

    /// Remove one staged file. Returns false when the id is unknown.
    pub async fn remove_file(&self, id: Uuid) -> bool {
        let mut files = self.files.write().await;
        let before = files.len();
        files.retain(|f| {
            if f.id == id {
                let _ = std::fs::remove_file(&f.path);
                false
            } else {
                true
            }
        });
        files.len() != before
    }

    pub async fn clear_files(&self) {
        let mut files = self.files.write().await;
        for file in files.drain(..) {
            let _ = std::fs::remove_file(&file.path);
        }
    }

    // ------------------------------------------------------------------
    // Job
    // ------------------------------------------------------------------

    pub async fn active_job(&self) -> Option<Arc<ActiveJob>> {
        self.job.read().await.clone()
    }

    pub async fn set_active_job(&self, job: Arc<ActiveJob>) {
        *self.job.write().await = Some(job);
    }

    // ------------------------------------------------------------------
    // Log pane
    // ------------------------------------------------------------------

    pub async fn push_log(&self, line: impl Into<String>) {
        let mut log = self.log.write().await;
        if log.len() >= LOG_CAPACITY {
            log.pop_front();
        }
        log.push_back(line.into());
    }

    pub async fn log_lines(&self) -> Vec<String> {
        self.log.read().await.iter().cloned().collect()
    }
}

/// Strip path components from an uploaded filename.
fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim();
    if base.is_empty() {
        "document.pdf".to_string()
    } else {
        base.to_string()
    }
}

/// Resolve a name collision against already staged files: "a.pdf" → "a_2.pdf".
fn dedup_name(name: &str, staged: &[StagedFile]) -> String {
    let taken = |candidate: &str| staged.iter().any(|f| f.name == candidate);
    if !taken(name) {
        return name.to_string();
    }

    let (stem, ext) = name
        .rsplit_once('.')
        .map_or((name, ""), |(s, e)| (s, e));
    for n in 2.. {
        let candidate = if ext.is_empty() {
            format!("{stem}_{n}")
        } else {
            format!("{stem}_{n}.{ext}")
        };
        if !taken(&candidate) {
            return candidate;
        }
    }
    unreachable!("suffix space exhausted")
}
