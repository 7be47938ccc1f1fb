//! Job orchestration: translate a batch of documents through one engine run
//! per file, reporting progress over an event channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bridge::{OllamaClient, TranslatorGateway};
use crate::config::{AppConfig, BridgeConfig, Lang, OutputFormats};
use crate::engine::{
    BabelDocEngine, CancelFlag, DocumentEngine, DocumentJob, EngineEvent, JobOutputs,
};
use crate::error::{Error, Result};

/// A translation job: the files to translate plus the settings resolved at
/// submission time. Jobs are immutable once built; later config edits do not
/// affect a running job.
#[derive(Debug, Clone)]
pub struct TranslationJob {
    pub files: Vec<PathBuf>,
    pub source_lang: Lang,
    pub target_lang: Lang,
    /// Where outputs land; each input's parent directory when unset
    pub output_dir: Option<PathBuf>,
    pub model: String,
    pub qps: u32,
    pub formats: OutputFormats,
}

impl TranslationJob {
    /// Build a job from configuration and a file list.
    pub fn from_config(config: &AppConfig, files: Vec<PathBuf>) -> Self {
        Self {
            files,
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
            output_dir: config.output_dir.clone(),
            model: config.bridge.model.clone(),
            qps: config.bridge.qps,
            formats: config.output,
        }
    }

    /// Check the job would not fail trivially.
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(Error::ConfigInvalid {
                field: "files".to_string(),
                reason: "no input files selected".to_string(),
            });
        }
        for file in &self.files {
            if !file.exists() {
                return Err(Error::ConfigInvalid {
                    field: "files".to_string(),
                    reason: format!("input not found: {}", file.display()),
                });
            }
        }
        if !self.formats.any() {
            return Err(Error::ConfigInvalid {
                field: "formats".to_string(),
                reason: "at least one output format must be enabled".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "model".to_string(),
                reason: "model must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Output directory for one input file.
    pub fn output_dir_for(&self, input: &Path) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            input
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        })
    }
}

/// Terminal status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Events emitted while a job runs.
///
/// `Progress` carries the percentage across the whole job, with each file
/// weighted equally.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Started { total_files: usize },
    FileStarted { index: usize, total: usize, name: String },
    Progress { overall_percent: f32, stage: String },
    Log { line: String },
    FileCompleted { name: String, outputs: JobOutputs },
    Completed,
    Failed { message: String },
    Cancelled,
}

/// Outcome for one input file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub input: PathBuf,
    pub outputs: JobOutputs,
}

/// Final report for a job. Outputs of files finished before a failure or
/// cancellation are listed; they stay on disk.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub status: JobStatus,
    pub files: Vec<FileReport>,
    pub error: Option<String>,
}

impl JobReport {
    fn completed(files: Vec<FileReport>) -> Self {
        Self {
            status: JobStatus::Completed,
            files,
            error: None,
        }
    }

    fn failed(files: Vec<FileReport>, message: String) -> Self {
        Self {
            status: JobStatus::Failed,
            files,
            error: Some(message),
        }
    }

    fn cancelled(files: Vec<FileReport>) -> Self {
        Self {
            status: JobStatus::Cancelled,
            files,
            error: None,
        }
    }

    /// All output paths across completed files.
    pub fn output_paths(&self) -> Vec<&Path> {
        self.files.iter().flat_map(|f| f.outputs.paths()).collect()
    }
}

/// Job-level progress from a per-file percentage, all files weighted equally.
#[allow(clippy::cast_precision_loss)]
pub fn overall_percent(index: usize, total: usize, file_percent: f32) -> f32 {
    if total == 0 {
        return 0.0;
    }
    ((index as f32 + file_percent / 100.0) / total as f32) * 100.0
}

/// Drives an engine over a job's files, one at a time.
pub struct JobRunner {
    engine: Arc<dyn DocumentEngine>,
}

impl JobRunner {
    pub fn new(engine: Arc<dyn DocumentEngine>) -> Self {
        Self { engine }
    }

    /// Run the whole job. Never fails: problems terminate the job and land in
    /// the report. The first file that fails aborts the remainder.
    pub async fn run(
        &self,
        job: &TranslationJob,
        events: &mpsc::UnboundedSender<JobEvent>,
        cancel: &CancelFlag,
    ) -> JobReport {
        if let Err(e) = job.validate() {
            let message = e.to_string();
            let _ = events.send(JobEvent::Failed {
                message: message.clone(),
            });
            return JobReport::failed(Vec::new(), message);
        }

        let total = job.files.len();
        let _ = events.send(JobEvent::Started { total_files: total });
        let mut files = Vec::with_capacity(total);

        for (index, input) in job.files.iter().enumerate() {
            if cancel.is_cancelled() {
                let _ = events.send(JobEvent::Cancelled);
                return JobReport::cancelled(files);
            }

            let name = input
                .file_name()
                .map_or_else(|| input.display().to_string(), |n| n.to_string_lossy().into_owned());
            let _ = events.send(JobEvent::FileStarted {
                index,
                total,
                name: name.clone(),
            });
            let _ = events.send(JobEvent::Progress {
                overall_percent: overall_percent(index, total, 0.0),
                stage: "Starting".to_string(),
            });

            let document = DocumentJob {
                input: input.clone(),
                output_dir: job.output_dir_for(input),
                source_lang: job.source_lang.clone(),
                target_lang: job.target_lang.clone(),
                formats: job.formats,
            };

            // Translate per-file engine events into job-level ones.
            let (engine_tx, mut engine_rx) = mpsc::unbounded_channel::<EngineEvent>();
            let job_tx = events.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(event) = engine_rx.recv().await {
                    let forwarded = match event {
                        EngineEvent::Progress { percent, stage } => JobEvent::Progress {
                            overall_percent: overall_percent(index, total, percent),
                            stage,
                        },
                        EngineEvent::Log { line } => JobEvent::Log { line },
                    };
                    if job_tx.send(forwarded).is_err() {
                        break;
                    }
                }
            });

            let result = self.engine.translate_document(&document, &engine_tx, cancel).await;
            drop(engine_tx);
            let _ = forwarder.await;

            match result {
                Ok(outputs) => {
                    info!("Finished {} ({} of {})", name, index + 1, total);
                    let _ = events.send(JobEvent::FileCompleted {
                        name,
                        outputs: outputs.clone(),
                    });
                    files.push(FileReport {
                        input: input.clone(),
                        outputs,
                    });
                }
                Err(Error::Cancelled) => {
                    info!("Job cancelled during {}", name);
                    let _ = events.send(JobEvent::Cancelled);
                    return JobReport::cancelled(files);
                }
                Err(e) => {
                    warn!("{} failed: {}", name, e);
                    let message = format!("{name}: {e}");
                    let _ = events.send(JobEvent::Failed {
                        message: message.clone(),
                    });
                    return JobReport::failed(files, message);
                }
            }
        }

        let _ = events.send(JobEvent::Completed);
        JobReport::completed(files)
    }
}

/// Run a job end to end: connect the bridge, preflight the model, start the
/// translator gateway, drive the engine, and tear everything down.
///
/// This is the one entry point both frontends use.
pub async fn run_job(
    config: &AppConfig,
    job: &TranslationJob,
    events: &mpsc::UnboundedSender<JobEvent>,
    cancel: &CancelFlag,
) -> JobReport {
    let bridge = BridgeConfig {
        model: job.model.clone(),
        qps: job.qps,
        ..config.bridge.clone()
    };
    let client = Arc::new(OllamaClient::new(&bridge));

    // Catch a missing model before any engine work starts.
    match client.has_model(&bridge.model).await {
        Ok(true) => {}
        Ok(false) => {
            let message = Error::Model {
                model: bridge.model.clone(),
                reason: "not installed on server".to_string(),
            }
            .to_string();
            let _ = events.send(JobEvent::Failed {
                message: message.clone(),
            });
            return JobReport::failed(Vec::new(), message);
        }
        Err(e) => {
            let message = e.to_string();
            let _ = events.send(JobEvent::Failed {
                message: message.clone(),
            });
            return JobReport::failed(Vec::new(), message);
        }
    }

    let gateway = match TranslatorGateway::start(Arc::clone(&client), cancel.clone()).await {
        Ok(gateway) => gateway,
        Err(e) => {
            let message = format!("failed to start translator gateway: {e}");
            let _ = events.send(JobEvent::Failed {
                message: message.clone(),
            });
            return JobReport::failed(Vec::new(), message);
        }
    };

    let engine = BabelDocEngine::new(&config.engine, &bridge, gateway.base_url());
    let runner = JobRunner::new(Arc::new(engine));
    let report = runner.run(job, events, cancel).await;

    gateway.shutdown().await;
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_percent() {
        assert!((overall_percent(0, 4, 50.0) - 12.5).abs() < f32::EPSILON);
        assert!((overall_percent(1, 2, 0.0) - 50.0).abs() < f32::EPSILON);
        assert!((overall_percent(3, 4, 100.0) - 100.0).abs() < f32::EPSILON);
        assert!((overall_percent(0, 0, 50.0)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validate_rejects_empty_job() {
        let job = TranslationJob::from_config(&AppConfig::default(), Vec::new());
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_input() {
        let job = TranslationJob::from_config(
            &AppConfig::default(),
            vec![PathBuf::from("/nonexistent/input.pdf")],
        );
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_existing_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.pdf");
        std::fs::write(&input, b"%PDF-1.4\n").unwrap();

        let job = TranslationJob::from_config(&AppConfig::default(), vec![input]);
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_output_dir_resolution() {
        let mut job = TranslationJob::from_config(&AppConfig::default(), Vec::new());
        assert_eq!(
            job.output_dir_for(Path::new("/docs/paper.pdf")),
            PathBuf::from("/docs")
        );

        job.output_dir = Some(PathBuf::from("/out"));
        assert_eq!(
            job.output_dir_for(Path::new("/docs/paper.pdf")),
            PathBuf::from("/out")
        );
    }

    #[test]
    fn test_status_helpers() {
        assert!(JobStatus::Completed.is_success());
        assert!(!JobStatus::Failed.is_success());
        assert_eq!(JobStatus::Cancelled.label(), "cancelled");
    }
}
