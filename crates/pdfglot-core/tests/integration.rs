//! Integration tests for pdfglot-core
//!
//! These tests verify the end-to-end workflow:
//! - Translation bridge against a fake inference server
//! - Rate limiting and error classification on the wire
//! - The OpenAI-compatible gateway engines talk to
//! - Job orchestration, failure handling and cancellation

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc, oneshot};

use pdfglot_core::{
    AppConfig, BridgeConfig, CancelFlag, ChatMessage, ChatRequest, DocumentEngine, DocumentJob,
    EngineEvent, Error, JobEvent, JobOutputs, JobRunner, JobStatus, OllamaClient, OllamaTranslator,
    OutputKind, Result, TranslationJob, Translator, TranslatorGateway, TranslatorInfo,
    output_stem, run_job,
};

// =============================================================================
// Fake Inference Server
// =============================================================================

#[derive(Clone)]
struct FakeState {
    models: Vec<String>,
    hits: Arc<AtomicUsize>,
}

/// A fake Ollama server. Chat replies echo the text inside the prompt's
/// `Text: "..."` section (or the whole message) with a " (translated)" suffix.
struct FakeServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
    hits: Arc<AtomicUsize>,
}

impl FakeServer {
    async fn start(models: &[&str]) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = FakeState {
            models: models.iter().map(|m| (*m).to_string()).collect(),
            hits: Arc::clone(&hits),
        };

        let router = Router::new()
            .route("/api/chat", post(fake_chat))
            .route("/api/tags", get(fake_tags))
            .route("/api/version", get(fake_version))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown: Some(tx),
            task,
            hits,
        }
    }

    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn chat_hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

async fn fake_chat(State(state): State<FakeState>, Json(body): Json<Value>) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let content = body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default();
    let text = content
        .rsplit_once("Text: \"")
        .map_or(content, |(_, rest)| rest.trim_end_matches('"'));

    Json(json!({
        "model": body["model"],
        "message": { "role": "assistant", "content": format!("{text} (translated)") },
        "done": true
    }))
}

async fn fake_tags(State(state): State<FakeState>) -> Json<Value> {
    let models: Vec<Value> = state
        .models
        .iter()
        .map(|name| json!({ "name": name }))
        .collect();
    Json(json!({ "models": models }))
}

async fn fake_version() -> Json<Value> {
    Json(json!({ "version": "0.0.0-test" }))
}

fn bridge_config(base_url: &str) -> BridgeConfig {
    BridgeConfig {
        base_url: base_url.to_string(),
        qps: 0,
        ..Default::default()
    }
}

/// Bridge config that fails fast: one attempt, no pacing.
fn fast_fail_config(base_url: &str) -> BridgeConfig {
    BridgeConfig {
        base_url: base_url.to_string(),
        qps: 0,
        retry_count: 1,
        ..Default::default()
    }
}

// =============================================================================
// Stub Engines
// =============================================================================

/// An engine that writes placeholder outputs without any subprocess.
/// Can be told to fail or report cancellation on the nth file.
struct StubEngine {
    calls: AtomicUsize,
    fail_on: Option<usize>,
    cancel_on: Option<usize>,
}

impl StubEngine {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: None,
            cancel_on: None,
        }
    }

    fn failing_on(call: usize) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::new()
        }
    }

    fn cancelling_on(call: usize) -> Self {
        Self {
            cancel_on: Some(call),
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn write_outputs(job: &DocumentJob, translated_body: &str) -> Result<JobOutputs> {
    std::fs::create_dir_all(&job.output_dir)?;
    let stem = output_stem(&job.input);
    let mut outputs = JobOutputs::default();
    if job.formats.translated {
        let path = job.output_dir.join(OutputKind::Translated.file_name(&stem));
        std::fs::write(&path, translated_body)?;
        outputs.translated = Some(path);
    }
    if job.formats.dual {
        let path = job.output_dir.join(OutputKind::Dual.file_name(&stem));
        std::fs::write(&path, translated_body)?;
        outputs.dual = Some(path);
    }
    Ok(outputs)
}

#[async_trait]
impl DocumentEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn translate_document(
        &self,
        job: &DocumentJob,
        events: &mpsc::UnboundedSender<EngineEvent>,
        _cancel: &CancelFlag,
    ) -> Result<JobOutputs> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.cancel_on == Some(call) {
            return Err(Error::Cancelled);
        }
        if self.fail_on == Some(call) {
            return Err(Error::Engine("stub engine failure".to_string()));
        }

        let _ = events.send(EngineEvent::Progress {
            percent: 50.0,
            stage: "Halfway".to_string(),
        });
        let _ = events.send(EngineEvent::Log {
            line: format!("processing {}", job.input.display()),
        });
        let _ = events.send(EngineEvent::Progress {
            percent: 100.0,
            stage: "Finishing".to_string(),
        });

        write_outputs(job, "stub output")
    }
}

/// An engine that translates each file's text content through a real
/// [`Translator`], gated so tests control when each file may start.
struct TranslatorEngine {
    translator: Arc<dyn Translator>,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl DocumentEngine for TranslatorEngine {
    fn name(&self) -> &'static str {
        "text-stub"
    }

    async fn translate_document(
        &self,
        job: &DocumentJob,
        events: &mpsc::UnboundedSender<EngineEvent>,
        _cancel: &CancelFlag,
    ) -> Result<JobOutputs> {
        self.gate.acquire().await.expect("gate closed").forget();

        let text = std::fs::read_to_string(&job.input)?;
        let translated = self
            .translator
            .translate(&text, &job.source_lang, &job.target_lang)
            .await?;

        let _ = events.send(EngineEvent::Progress {
            percent: 100.0,
            stage: "Done".to_string(),
        });
        write_outputs(job, &translated)
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================

fn write_input_files(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("doc{i}.pdf"));
            std::fs::write(&path, format!("Document {i}")).unwrap();
            path
        })
        .collect()
}

fn test_job(files: Vec<PathBuf>, output_dir: &Path) -> TranslationJob {
    let mut job = TranslationJob::from_config(&AppConfig::default(), files);
    job.output_dir = Some(output_dir.to_path_buf());
    job
}

fn drain(rx: &mut mpsc::UnboundedReceiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =============================================================================
// Bridge Tests
// =============================================================================

#[tokio::test]
async fn test_translator_round_trip() {
    let server = FakeServer::start(&["qwen2.5:14b"]).await;
    let client = Arc::new(OllamaClient::new(&bridge_config(&server.base_url())));
    let translator = OllamaTranslator::new(client);

    let result = translator
        .translate("Hello", &"en".into(), &"zh".into())
        .await
        .expect("translation should succeed");
    assert_eq!(result, "Hello (translated)");

    let info: TranslatorInfo = translator.info();
    assert_eq!(info.name, "Ollama");
    assert_eq!(info.model, "qwen2.5:14b");

    server.stop().await;
}

#[tokio::test]
async fn test_short_circuits_skip_the_server() {
    let server = FakeServer::start(&["qwen2.5:14b"]).await;
    let client = Arc::new(OllamaClient::new(&bridge_config(&server.base_url())));
    let translator = OllamaTranslator::new(client);

    let empty = translator.translate("   ", &"en".into(), &"zh".into()).await;
    assert_eq!(empty.unwrap(), "   ");

    let same = translator.translate("Hi", &"en".into(), &"en".into()).await;
    assert_eq!(same.unwrap(), "Hi");

    assert_eq!(server.chat_hits(), 0, "no request should reach the server");
    server.stop().await;
}

#[tokio::test]
async fn test_unreachable_server_classified_as_connectivity() {
    let client = Arc::new(OllamaClient::new(&fast_fail_config("http://127.0.0.1:1")));
    let translator = OllamaTranslator::new(client);

    let err = translator
        .translate("Hello", &"en".into(), &"zh".into())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TranslationUnavailable(_)));
    assert!(err.is_connectivity(), "got: {err}");
}

#[tokio::test]
async fn test_probe_and_model_listing() {
    let server = FakeServer::start(&["llama3:8b", "qwen2.5:14b"]).await;
    let client = OllamaClient::new(&bridge_config(&server.base_url()));

    let status = client.check_connection().await.unwrap();
    assert_eq!(status.version.as_deref(), Some("0.0.0-test"));
    assert_eq!(status.model_count, 2);

    let models = client.list_models().await.unwrap();
    assert_eq!(models[0].name, "llama3:8b"); // sorted

    assert!(client.has_model("qwen2.5:14b").await.unwrap());
    assert!(client.has_model("llama3").await.unwrap());
    assert!(!client.has_model("mistral:7b").await.unwrap());

    server.stop().await;
}

#[tokio::test]
async fn test_rate_limiter_paces_chat_requests() {
    let server = FakeServer::start(&["qwen2.5:14b"]).await;
    let config = BridgeConfig {
        base_url: server.base_url(),
        qps: 20,
        ..Default::default()
    };
    let client = OllamaClient::new(&config);

    let request = ChatRequest::new("qwen2.5:14b", vec![ChatMessage::user("ping")]);
    let start = Instant::now();
    for _ in 0..3 {
        client.chat(&request).await.expect("chat should succeed");
    }

    // 3 requests at 20 qps: at least 100ms between first and last
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert_eq!(server.chat_hits(), 3);
    server.stop().await;
}

// =============================================================================
// Gateway Tests
// =============================================================================

#[tokio::test]
async fn test_gateway_reshapes_chat_completions() {
    let server = FakeServer::start(&["qwen2.5:14b"]).await;
    let client = Arc::new(OllamaClient::new(&bridge_config(&server.base_url())));
    let gateway = TranslatorGateway::start(client, CancelFlag::new())
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .post(format!("{}/chat/completions", gateway.base_url()))
        .json(&json!({
            "model": "gpt-4",
            "messages": [{ "role": "user", "content": "Bonjour" }],
            "temperature": 0.3
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    // The configured model wins over whatever the engine asked for
    assert_eq!(body["model"], "qwen2.5:14b");
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "Bonjour (translated)"
    );
    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));

    let models: Value = reqwest::Client::new()
        .get(format!("{}/models", gateway.base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["data"][0]["id"], "qwen2.5:14b");

    gateway.shutdown().await;
    server.stop().await;
}

#[tokio::test]
async fn test_gateway_maps_upstream_failure_to_bad_gateway() {
    let client = Arc::new(OllamaClient::new(&fast_fail_config("http://127.0.0.1:1")));
    let gateway = TranslatorGateway::start(client, CancelFlag::new())
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .post(format!("{}/chat/completions", gateway.base_url()))
        .json(&json!({
            "model": "m",
            "messages": [{ "role": "user", "content": "hi" }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 502);

    gateway.shutdown().await;
}

// =============================================================================
// Job Runner Tests
// =============================================================================

#[tokio::test]
async fn test_job_completes_and_produces_contract_names() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let files = write_input_files(dir.path(), 2);
    let job = test_job(files, &out);

    let engine = Arc::new(StubEngine::new());
    let runner = JobRunner::new(engine.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = runner.run(&job, &tx, &CancelFlag::new()).await;

    assert_eq!(report.status, JobStatus::Completed);
    assert_eq!(report.files.len(), 2);
    assert_eq!(engine.calls(), 2);
    assert!(out.join("doc0_translated.pdf").exists());
    assert!(out.join("doc0_dual.pdf").exists());
    assert!(out.join("doc1_translated.pdf").exists());
    assert_eq!(report.output_paths().len(), 4);

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(JobEvent::Started { total_files: 2 })));
    assert!(events.iter().any(|e| matches!(e, JobEvent::Completed)));
    assert!(
        events
            .iter()
            .any(|e| matches!(e, JobEvent::FileStarted { index: 1, .. }))
    );
    // Second file's halfway point maps to 75% overall
    assert!(events.iter().any(
        |e| matches!(e, JobEvent::Progress { overall_percent, .. } if (*overall_percent - 75.0).abs() < 0.01)
    ));
}

#[tokio::test]
async fn test_first_failure_aborts_remaining_files() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let files = write_input_files(dir.path(), 3);
    let job = test_job(files, &out);

    let engine = Arc::new(StubEngine::failing_on(1));
    let runner = JobRunner::new(engine.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = runner.run(&job, &tx, &CancelFlag::new()).await;

    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(report.files.len(), 1, "only the first file finished");
    assert_eq!(engine.calls(), 2, "the third file is never attempted");
    let error = report.error.expect("failed report carries a message");
    assert!(error.contains("doc1.pdf"));
    assert!(error.contains("stub engine failure"));

    // Outputs from before the failure stay on disk
    assert!(out.join("doc0_translated.pdf").exists());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, JobEvent::Failed { .. })));
}

#[tokio::test]
async fn test_cancellation_retains_finished_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let files = write_input_files(dir.path(), 2);
    let job = test_job(files, &out);

    let engine = Arc::new(StubEngine::cancelling_on(1));
    let runner = JobRunner::new(engine.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = runner.run(&job, &tx, &CancelFlag::new()).await;

    assert_eq!(report.status, JobStatus::Cancelled);
    assert_eq!(report.files.len(), 1);
    assert!(out.join("doc0_translated.pdf").exists());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, JobEvent::Cancelled)));
    assert!(!events.iter().any(|e| matches!(e, JobEvent::Completed)));
}

#[tokio::test]
async fn test_empty_job_fails_without_starting() {
    let job = test_job(Vec::new(), Path::new("/tmp"));
    let runner = JobRunner::new(Arc::new(StubEngine::new()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = runner.run(&job, &tx, &CancelFlag::new()).await;

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.files.is_empty());
    assert!(report.error.unwrap().contains("no input files"));

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(JobEvent::Failed { .. })));
}

#[tokio::test]
async fn test_server_loss_mid_job_fails_but_keeps_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let files = write_input_files(dir.path(), 2);
    let job = test_job(files, &out);

    let server = FakeServer::start(&["qwen2.5:14b"]).await;
    let client = Arc::new(OllamaClient::new(&fast_fail_config(&server.base_url())));
    let gate = Arc::new(Semaphore::new(1));
    let engine = Arc::new(TranslatorEngine {
        translator: Arc::new(OllamaTranslator::new(client)),
        gate: Arc::clone(&gate),
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner_task = tokio::spawn({
        let job = job.clone();
        async move {
            let runner = JobRunner::new(engine);
            runner.run(&job, &tx, &CancelFlag::new()).await
        }
    });

    // Take the server down once the first file is done; the gate keeps the
    // second file from starting before that.
    let mut server = Some(server);
    while let Some(event) = rx.recv().await {
        if matches!(event, JobEvent::FileCompleted { .. })
            && let Some(s) = server.take()
        {
            s.stop().await;
            gate.add_permits(1);
        }
    }

    let report = runner_task.await.unwrap();
    assert_eq!(report.status, JobStatus::Failed);
    assert_eq!(report.files.len(), 1);
    assert!(report.error.unwrap().contains("unreachable"));
    assert!(out.join("doc0_translated.pdf").exists());
}

// =============================================================================
// run_job Preflight Tests
// =============================================================================

#[tokio::test]
async fn test_run_job_rejects_missing_model() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_input_files(dir.path(), 1);

    let server = FakeServer::start(&["llama3:8b"]).await;
    let mut config = AppConfig::default();
    config.bridge.base_url = server.base_url();
    // config model stays qwen2.5:14b, which the server does not have

    let job = TranslationJob::from_config(&config, files);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = run_job(&config, &job, &tx, &CancelFlag::new()).await;

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.error.unwrap().contains("not installed on server"));
    assert!(drain(&mut rx).iter().any(|e| matches!(e, JobEvent::Failed { .. })));

    server.stop().await;
}

#[tokio::test]
async fn test_run_job_rejects_unreachable_server() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_input_files(dir.path(), 1);

    let mut config = AppConfig::default();
    config.bridge.base_url = "http://127.0.0.1:1".to_string();

    let job = TranslationJob::from_config(&config, files);
    let (tx, _rx) = mpsc::unbounded_channel();
    let report = run_job(&config, &job, &tx, &CancelFlag::new()).await;

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.error.unwrap().contains("unreachable"));
}
