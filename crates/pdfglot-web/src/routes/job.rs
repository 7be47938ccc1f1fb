//! Job routes: start, cancel, status fragment, SSE progress stream.

use askama::Template;
use axum::{
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{
        Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::Stream;
use pdfglot_core::{JobEvent, JobStatus, TranslationJob, run_job};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use crate::helpers::{OptionExt, ResultExt, RouteResult, conflict};
use crate::state::{ActiveJob, AppState, ShellPhase};
use crate::templates::{ProgressBodyTemplate, ProgressTemplate};

/// Start a translation job over the staged files.
///
/// Snapshots the current settings into an immutable job, spawns the runner,
/// and returns 202 Accepted with the running progress fragment, which
/// connects to the SSE stream.
pub async fn start_job(State(state): State<Arc<AppState>>) -> RouteResult<Response> {
    // Claim the Running phase atomically so concurrent starts cannot both
    // pass the guard; roll back to Ready if validation refuses the job.
    if let Err(phase) = state.try_begin_job().await {
        return conflict(match phase {
            ShellPhase::Running => "A job is already running",
            _ => "Connect to the inference server first",
        });
    }

    let files = state.staged_files().await;
    if files.is_empty() {
        state.set_phase(ShellPhase::Ready).await;
        return Err((StatusCode::BAD_REQUEST, "No input files staged".to_string()));
    }

    let config = state.config().await;
    if let Err(e) = config.validate() {
        state.set_phase(ShellPhase::Ready).await;
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }
    let job = TranslationJob::from_config(
        &config,
        files.iter().map(|f| f.path.clone()).collect(),
    );
    if let Err(e) = job.validate() {
        state.set_phase(ShellPhase::Ready).await;
        return Err((StatusCode::BAD_REQUEST, e.to_string()));
    }

    let active = Arc::new(ActiveJob::new(files.len()));
    state.set_active_job(Arc::clone(&active)).await;
    state
        .push_log(format!(
            "job started: {} file(s), {} -> {}, model {}",
            job.files.len(),
            job.source_lang,
            job.target_lang,
            job.model
        ))
        .await;

    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        drive_job(task_state, active, config, job).await;
    });

    let template = progress_template(&state, false).await;
    let html = template.render().or_internal_error()?;

    // 202 Accepted: the job started, it has not completed
    Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Body::from(html))
        .or_internal_error()
}

/// Run the job pipeline and fold its event stream into shell state.
async fn drive_job(
    state: Arc<AppState>,
    active: Arc<ActiveJob>,
    config: pdfglot_core::AppConfig,
    job: TranslationJob,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let consumer_state = Arc::clone(&state);
    let consumer_job = Arc::clone(&active);
    let consumer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                JobEvent::Started { total_files } => {
                    consumer_state
                        .push_log(format!("translating {total_files} file(s)"))
                        .await;
                }
                JobEvent::FileStarted { index, total, name } => {
                    *consumer_job.current_file.write().await = name.clone();
                    consumer_state
                        .push_log(format!("[{}/{}] {}", index + 1, total, name))
                        .await;
                }
                JobEvent::Progress {
                    overall_percent,
                    stage,
                } => {
                    consumer_job.set_percent(overall_percent);
                    *consumer_job.stage.write().await = stage;
                }
                JobEvent::Log { line } => {
                    consumer_state.push_log(line).await;
                }
                JobEvent::FileCompleted { name, outputs } => {
                    consumer_job.files_done.fetch_add(1, Ordering::SeqCst);
                    for path in outputs.paths() {
                        consumer_state
                            .push_log(format!("wrote {}", path.display()))
                            .await;
                    }
                    consumer_job.record_outputs(&name, &outputs).await;
                }
                JobEvent::Failed { message } => {
                    consumer_state.push_log(format!("failed: {message}")).await;
                }
                JobEvent::Cancelled => {
                    consumer_state.push_log("job cancelled").await;
                }
                JobEvent::Completed => {
                    consumer_state.push_log("job completed").await;
                }
            }
        }
    });

    let report = run_job(&config, &job, &tx, &active.cancel).await;
    drop(tx); // close the channel so the consumer drains and exits
    let _ = consumer.await;

    let phase = match report.status {
        JobStatus::Completed => ShellPhase::Completed,
        JobStatus::Failed => ShellPhase::Failed,
        JobStatus::Cancelled => ShellPhase::Cancelled,
    };
    info!("Job finished: {}", report.status.label());

    // Phase first: the SSE loop renders its final fragment once `done` flips
    state.set_phase(phase).await;
    active.mark_finished(report.status, report.error).await;
}

/// Request cancellation of the running job; 409 when none is running.
pub async fn cancel_job(State(state): State<Arc<AppState>>) -> RouteResult<ProgressTemplate> {
    if !state.phase().await.is_running() {
        return conflict("No job is running");
    }

    let job = state.active_job().await.or_not_found("No active job")?;
    job.cancel.cancel();
    state.push_log("cancel requested").await;
    info!("Cancel requested");

    Ok(progress_template(&state, false).await)
}

/// Progress fragment for the initial render and as an SSE-less fallback.
pub async fn job_status(State(state): State<Arc<AppState>>) -> ProgressTemplate {
    progress_template(&state, false).await
}

/// SSE progress stream for the running job.
///
/// Pushes the progress body only when something changed (100 ms poll). The
/// final event carries the terminal fragment marked for an out-of-band swap
/// of the whole progress area, which tears down the client's EventSource.
#[allow(tail_expr_drop_order)] // drop order change in the async_stream macro is harmless here
pub async fn job_stream(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    let job = state.active_job().await.or_not_found("No active job")?;

    let stream = async_stream::stream! {
        let mut last: Option<(u32, usize, String)> = None;

        loop {
            let done = job.is_done();
            let percent = job.percent();
            let files_done = job.files_done.load(Ordering::SeqCst);
            let stage = job.stage.read().await.clone();
            let snapshot = (percent, files_done, stage);

            if done {
                let template = progress_template(&state, true).await;
                if let Ok(html) = template.render() {
                    yield Ok(Event::default().event("progress").data(html));
                }
                break;
            }

            if last.as_ref() != Some(&snapshot) {
                let phase = state.phase().await;
                let template = ProgressBodyTemplate {
                    phase_label: phase.label(),
                    phase_class: phase.css_class(),
                    percent,
                    stage: snapshot.2.clone(),
                    current_file: job.current_file.read().await.clone(),
                    files_done,
                    total_files: job.total_files,
                    log_lines: state.log_lines().await,
                };
                if let Ok(html) = template.render() {
                    yield Ok(Event::default().event("progress").data(html));
                }
                last = Some(snapshot);
            }

            let sleep = tokio::time::sleep(Duration::from_millis(100));
            sleep.await;
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Build the progress fragment from current shell state.
async fn progress_template(state: &AppState, oob: bool) -> ProgressTemplate {
    let phase = state.phase().await;
    let log_lines = state.log_lines().await;
    let outputs = super::output_views(state).await;

    match state.active_job().await {
        Some(job) => ProgressTemplate {
            oob,
            running: phase.is_running(),
            phase_label: phase.label(),
            phase_class: phase.css_class(),
            has_job: true,
            percent: job.percent(),
            stage: job.stage.read().await.clone(),
            current_file: job.current_file.read().await.clone(),
            files_done: job.files_done.load(Ordering::SeqCst),
            total_files: job.total_files,
            error: job.error.read().await.clone(),
            log_lines,
            outputs,
        },
        None => ProgressTemplate {
            oob,
            running: false,
            phase_label: phase.label(),
            phase_class: phase.css_class(),
            has_job: false,
            percent: 0,
            stage: String::new(),
            current_file: String::new(),
            files_done: 0,
            total_files: 0,
            error: None,
            log_lines,
            outputs,
        },
    }
}
