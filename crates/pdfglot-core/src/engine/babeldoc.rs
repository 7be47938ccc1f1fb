//! BabelDOC subprocess adapter.
//!
//! BabelDOC is driven through its CLI: a per-job TOML config file plus
//! `--files` for the input document. Its OpenAI-compatible endpoint setting is
//! pointed at the per-job [`TranslatorGateway`](crate::bridge::TranslatorGateway),
//! so every fragment it translates flows through the bridge. Progress is
//! recovered from its stderr stream; finished artifacts are renamed to the
//! stable `{stem}_translated.pdf` / `{stem}_dual.pdf` names callers rely on.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    CancelFlag, DocumentEngine, DocumentJob, EngineEvent, JobOutputs, OutputKind, output_stem,
};
use crate::config::{BridgeConfig, EngineConfig};
use crate::error::{Error, Result};

/// How often the cancel flag is polled while the subprocess runs
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Diagnostic lines kept for the failure message when the engine exits non-zero
const STDERR_TAIL_LINES: usize = 20;

/// Engine backed by the BabelDOC command-line tool.
pub struct BabelDocEngine {
    command: PathBuf,
    max_pages_per_part: u32,
    /// Model name forwarded in the engine config; the gateway substitutes its
    /// own regardless, but BabelDOC refuses to start without one
    model: String,
    api_key: Option<String>,
    qps: u32,
    /// OpenAI-compatible base URL the subprocess sends fragments to
    endpoint: String,
}

/// Top-level structure of the per-job config file
#[derive(Debug, Serialize)]
struct EngineJobFile {
    babeldoc: EngineJobConfig,
}

/// The `[babeldoc]` table. Key names follow the tool's kebab-case CLI flags.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct EngineJobConfig {
    lang_in: String,
    lang_out: String,
    qps: u32,
    output: String,
    no_dual: bool,
    no_mono: bool,
    openai: bool,
    openai_model: String,
    openai_base_url: String,
    openai_api_key: String,
    pool_max_workers: u32,
    min_text_length: u32,
    report_interval: f32,
    watermark_output_mode: String,
    split_short_lines: bool,
    short_line_split_factor: f32,
    dual_translate_first: bool,
    max_pages_per_part: u32,
}

impl BabelDocEngine {
    pub fn new(engine: &EngineConfig, bridge: &BridgeConfig, endpoint: impl Into<String>) -> Self {
        Self {
            command: engine.command.clone(),
            max_pages_per_part: engine.max_pages_per_part,
            model: bridge.model.clone(),
            api_key: bridge.api_key.clone(),
            qps: bridge.qps,
            endpoint: endpoint.into(),
        }
    }

    /// Render the per-job TOML config handed to the subprocess.
    fn render_job_config(&self, job: &DocumentJob, work_dir: &Path) -> Result<String> {
        let config = EngineJobFile {
            babeldoc: EngineJobConfig {
                lang_in: job.source_lang.to_string(),
                lang_out: job.target_lang.to_string(),
                qps: self.qps,
                output: work_dir.to_string_lossy().into_owned(),
                no_dual: !job.formats.dual,
                no_mono: !job.formats.translated,
                openai: true,
                openai_model: self.model.clone(),
                openai_base_url: self.endpoint.clone(),
                // The OpenAI client refuses an empty key; the gateway ignores it
                openai_api_key: self
                    .api_key
                    .clone()
                    .unwrap_or_else(|| "ollama".to_string()),
                pool_max_workers: if self.qps == 0 { 8 } else { self.qps * 2 },
                min_text_length: 5,
                report_interval: 0.5,
                watermark_output_mode: "no_watermark".to_string(),
                split_short_lines: false,
                short_line_split_factor: 0.8,
                dual_translate_first: false,
                max_pages_per_part: self.max_pages_per_part,
            },
        };

        toml::to_string_pretty(&config)
            .map_err(|e| Error::Engine(format!("failed to render engine config: {e}")))
    }

    /// Move the engine's artifacts to the caller's output directory under the
    /// stable output names. A requested format the engine did not produce is
    /// an error; unclassifiable files are ignored.
    async fn collect_outputs(&self, work_dir: &Path, job: &DocumentJob) -> Result<JobOutputs> {
        let stem = output_stem(&job.input);
        let mut newest_translated: Option<(SystemTime, PathBuf)> = None;
        let mut newest_dual: Option<(SystemTime, PathBuf)> = None;

        for entry in std::fs::read_dir(work_dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(kind) = classify_artifact(name) else {
                continue;
            };

            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let slot = match kind {
                OutputKind::Translated => &mut newest_translated,
                OutputKind::Dual => &mut newest_dual,
            };
            if slot.as_ref().is_none_or(|(t, _)| modified >= *t) {
                *slot = Some((modified, path));
            }
        }

        let mut outputs = JobOutputs::default();
        if job.formats.translated {
            let (_, src) = newest_translated.ok_or_else(|| {
                Error::Engine(format!("no {} output produced", OutputKind::Translated.label()))
            })?;
            let dest = job.output_dir.join(OutputKind::Translated.file_name(&stem));
            tokio::fs::copy(&src, &dest).await?;
            outputs.translated = Some(dest);
        }
        if job.formats.dual {
            let (_, src) = newest_dual.ok_or_else(|| {
                Error::Engine(format!("no {} output produced", OutputKind::Dual.label()))
            })?;
            let dest = job.output_dir.join(OutputKind::Dual.file_name(&stem));
            tokio::fs::copy(&src, &dest).await?;
            outputs.dual = Some(dest);
        }
        Ok(outputs)
    }
}

#[async_trait]
impl DocumentEngine for BabelDocEngine {
    fn name(&self) -> &'static str {
        "babeldoc"
    }

    async fn translate_document(
        &self,
        job: &DocumentJob,
        events: &mpsc::UnboundedSender<EngineEvent>,
        cancel: &CancelFlag,
    ) -> Result<JobOutputs> {
        if !job.input.exists() {
            return Err(Error::Engine(format!(
                "input file not found: {}",
                job.input.display()
            )));
        }
        tokio::fs::create_dir_all(&job.output_dir).await?;

        let scratch = tempfile::tempdir()?;
        let work_dir = scratch.path().join("out");
        tokio::fs::create_dir_all(&work_dir).await?;

        let config_path = scratch.path().join("babeldoc.toml");
        let rendered = self.render_job_config(job, &work_dir)?;
        tokio::fs::write(&config_path, rendered).await?;

        info!(
            "Starting {} for {} ({} -> {})",
            self.command.display(),
            job.input.display(),
            job.source_lang,
            job.target_lang
        );

        let mut child = Command::new(&self.command)
            .arg("--config")
            .arg(&config_path)
            .arg("--files")
            .arg(&job.input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::Engine(format!(
                        "'{}' not found; install BabelDOC or set engine.command",
                        self.command.display()
                    ))
                } else {
                    Error::Engine(format!("failed to start '{}': {e}", self.command.display()))
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Engine("failed to capture engine stderr".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some((percent, stage)) = parse_progress(&line) {
                            let _ = events.send(EngineEvent::Progress { percent, stage });
                        }
                        if !line.trim().is_empty() {
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(line.clone());
                        }
                        let _ = events.send(EngineEvent::Log { line });
                    }
                    Ok(None) => break, // stderr closed; the process is exiting
                    Err(e) => {
                        warn!("Failed to read engine output: {}", e);
                        break;
                    }
                },
                _ = poll.tick() => {
                    if cancel.is_cancelled() {
                        debug!("Cancel requested, killing engine process");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        return Err(Error::Cancelled);
                    }
                }
            }
        }

        let status = child.wait().await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !status.success() {
            return Err(Error::Engine(failure_message(status, &tail)));
        }

        self.collect_outputs(&work_dir, job).await
    }
}

fn failure_message(status: std::process::ExitStatus, tail: &VecDeque<String>) -> String {
    let mut message = format!("babeldoc exited with {status}");
    if !tail.is_empty() {
        message.push_str("; last output:\n");
        for line in tail {
            message.push_str(line);
            message.push('\n');
        }
    }
    message
}

/// Map an artifact file name to the output kind it represents.
///
/// BabelDOC names its products with "dual" / "mono" markers; watermark and
/// part-splitting settings add further dotted infixes, so substring matching
/// is the stable contract.
fn classify_artifact(file_name: &str) -> Option<OutputKind> {
    let name = file_name.to_ascii_lowercase();
    if !name.ends_with(".pdf") {
        return None;
    }
    if name.contains("dual") {
        return Some(OutputKind::Dual);
    }
    if name.contains("mono") || name.contains("translated") {
        return Some(OutputKind::Translated);
    }
    None
}

/// Extract a progress report from a diagnostic line.
///
/// Accepts anything containing a percentage token between 0 and 100, e.g.
/// "Translate PDF: 42.5%" or "INFO - 8.0% - Parse layout". The surrounding
/// text becomes the stage label.
fn parse_progress(line: &str) -> Option<(f32, String)> {
    let percent_pos = line.find('%')?;
    let head = &line[..percent_pos];

    // Walk back over the trailing number by char, not byte: the preceding
    // character can be multibyte (CJK stage labels in the engine's stderr)
    let digits_start = head
        .char_indices()
        .rev()
        .find(|&(_, c)| !c.is_ascii_digit() && c != '.')
        .map_or(0, |(i, c)| i + c.len_utf8());
    let number = &head[digits_start..];
    if number.is_empty() {
        return None;
    }
    let percent: f32 = number.parse().ok()?;
    if !(0.0..=100.0).contains(&percent) {
        return None;
    }

    let stage = stage_label(&head[..digits_start], &line[percent_pos + 1..]);
    Some((percent, stage))
}

/// Derive a stage label from the text around a percentage token.
fn stage_label(before: &str, after: &str) -> String {
    let separators: &[char] = &[' ', ':', '-', ',', '(', '[', ']', ')'];

    let before = before.trim_end_matches(separators);
    if !before.is_empty() {
        // Strip any log prefix like "INFO - " or "2024-01-01 12:00:00 - "
        let label = before
            .rsplit(" - ")
            .next()
            .unwrap_or(before)
            .trim_start_matches(separators);
        if !label.is_empty() {
            return label.to_string();
        }
    }

    let after = after.trim_start_matches(separators).trim_end();
    if !after.is_empty() {
        return after.to_string();
    }

    "Processing".to_string()
}
