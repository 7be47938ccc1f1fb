//! pdfglot web shell - browser GUI for translating PDF documents.

mod helpers;
mod routes;
mod state;
mod templates;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    routing::{delete, get, post},
};
use clap::Parser;
use pdfglot_core::AppConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir,
    set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use state::AppState;

/// Resolve the static files directory.
///
/// Priority:
/// 1. Explicit path if provided
/// 2. ./static if it exists
/// 3. Crate's built-in static directory
fn resolve_static_dir(explicit_path: Option<&str>) -> PathBuf {
    if let Some(path) = explicit_path {
        return PathBuf::from(path);
    }

    let local_static = PathBuf::from("static");
    if local_static.exists() && local_static.is_dir() {
        return local_static;
    }

    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static"))
}

#[derive(Parser, Debug)]
#[command(name = "pdfglot-web")]
#[command(author, version, about = "pdfglot web shell", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Inference server base URL
    #[arg(long, env = "OLLAMA_BASE_URL")]
    base_url: Option<String>,

    /// API key for servers behind an authenticating proxy
    #[arg(long, env = "OLLAMA_API_KEY")]
    api_key: Option<String>,

    /// Model identifier
    #[arg(long, env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Static files directory (defaults to ./static or crate's static dir)
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<String>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config, then apply startup overrides
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };
    if let Some(base_url) = args.base_url {
        config.bridge.base_url = base_url;
    }
    if let Some(api_key) = args.api_key {
        config.bridge.api_key = Some(api_key);
    }
    if let Some(model) = args.model {
        config.bridge.model = model;
    }

    let state = Arc::new(
        AppState::new(config, args.config.clone())
            .context("Failed to initialize application state")?,
    );

    let app = Router::new()
        // The shell page
        .route("/", get(routes::index))
        // Connection
        .route("/api/connect", post(routes::connect))
        .route("/api/models/refresh", post(routes::refresh_models))
        // Settings
        .route("/api/settings", post(routes::update_settings))
        // Staged input files
        .route("/api/files", post(routes::upload_files))
        .route("/api/files/{id}", delete(routes::remove_file))
        .route("/api/files/clear", post(routes::clear_files))
        // Job lifecycle
        .route("/api/job/start", post(routes::start_job))
        .route("/api/job/cancel", post(routes::cancel_job))
        .route("/api/job/status", get(routes::job_status))
        .route("/api/job/stream", get(routes::job_stream))
        // Outputs and log
        .route("/api/outputs", get(routes::list_outputs))
        .route("/api/outputs/{id}/download", get(routes::download_output))
        .route("/api/log", get(routes::log_pane))
        // Static files with Cache-Control: no-cache (cache but always revalidate)
        .nest_service(
            "/static",
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-cache"),
                ))
                .service(ServeDir::new(resolve_static_dir(args.static_dir.as_deref()))),
        )
        // Cache-Control for HTML fragments - prevents bfcache issues with HTMX
        // (downloads set their own headers, so this only affects HTML)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, max-age=0"),
        ))
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(300 * 1024 * 1024)) // 300MB limit for uploads
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
