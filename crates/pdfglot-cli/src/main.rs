//! pdfglot CLI - translate PDF documents from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfglot_core::{
    AppConfig, CancelFlag, JobEvent, JobStatus, Lang, OllamaClient, OllamaTranslator,
    OutputFormats, TranslationJob, Translator, run_job,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "pdfglot")]
#[command(author, version, about = "Translate PDF documents with a local LLM", long_about = None)]
struct Args {
    /// Inference server base URL
    #[arg(long, env = "OLLAMA_BASE_URL")]
    base_url: Option<String>,

    /// API key for servers behind an authenticating proxy
    #[arg(long, env = "OLLAMA_API_KEY")]
    api_key: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate one or more PDF files
    Translate {
        /// Input PDF files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Source language code
        #[arg(short = 's', long)]
        source: Option<String>,

        /// Target language code
        #[arg(short = 't', long)]
        target: Option<String>,

        /// Output directory (default: next to each input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Model identifier
        #[arg(short, long, env = "OLLAMA_MODEL")]
        model: Option<String>,

        /// Requests-per-second cap for translation calls (0 disables)
        #[arg(long)]
        qps: Option<u32>,

        /// Produce only the translated document
        #[arg(long, conflicts_with = "dual_only")]
        translated_only: bool,

        /// Produce only the dual-layout document
        #[arg(long)]
        dual_only: bool,
    },

    /// List models installed on the inference server
    Models,

    /// Check connectivity to the inference server and the configured model
    Check {
        /// Also send the given text through the model as a test translation
        #[arg(long, value_name = "TEXT")]
        sample: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (before parsing args so env vars are available)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Load or create config
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path).context("Failed to load config file")?
    } else {
        AppConfig::load()
    };

    // Override config with CLI arguments
    if let Some(base_url) = args.base_url {
        config.bridge.base_url = base_url;
    }
    if let Some(api_key) = args.api_key {
        config.bridge.api_key = Some(api_key);
    }

    match args.command {
        Command::Translate {
            files,
            source,
            target,
            output_dir,
            model,
            qps,
            translated_only,
            dual_only,
        } => {
            if let Some(source) = source {
                config.source_lang = Lang::new(source);
            }
            if let Some(target) = target {
                config.target_lang = Lang::new(target);
            }
            if let Some(output_dir) = output_dir {
                config.output_dir = Some(output_dir);
            }
            if let Some(model) = model {
                config.bridge.model = model;
            }
            if let Some(qps) = qps {
                config.bridge.qps = qps;
            }
            if translated_only {
                config.output = OutputFormats::translated_only();
            }
            if dual_only {
                config.output = OutputFormats::dual_only();
            }

            translate(&config, files).await
        }
        Command::Models => models(&config).await,
        Command::Check { sample } => check(&config, sample.as_deref()).await,
    }
}

async fn translate(config: &AppConfig, files: Vec<PathBuf>) -> Result<ExitCode> {
    config.validate().context("Invalid configuration")?;

    let job = TranslationJob::from_config(config, files);
    job.validate().context("Invalid job")?;

    info!(
        "Translating {} file(s) {} -> {} with {}",
        job.files.len(),
        job.source_lang,
        job.target_lang,
        job.model
    );

    // Overall progress is percent-based, so the bar spans 0-100
    let pb = ProgressBar::new(100);
    // Template is hardcoded and valid, unwrap is safe
    #[allow(clippy::unwrap_used)]
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    // Ctrl-C requests cancellation; the engine process is killed and the job
    // winds down with whatever outputs already finished.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let job_future = async {
        let report = run_job(config, &job, &tx, &cancel).await;
        drop(tx); // close the channel so the progress loop ends
        report
    };
    let progress_future = async {
        while let Some(event) = rx.recv().await {
            match event {
                JobEvent::FileStarted { index, total, name } => {
                    pb.set_message(format!("{name} ({}/{total})", index + 1));
                }
                JobEvent::Progress {
                    overall_percent,
                    stage,
                } => {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let position = overall_percent.round().clamp(0.0, 100.0) as u64;
                    pb.set_position(position);
                    pb.set_message(stage);
                }
                JobEvent::FileCompleted { name, .. } => {
                    pb.println(format!("done: {name}"));
                }
                JobEvent::Failed { message } => {
                    pb.println(format!("failed: {message}"));
                }
                _ => {}
            }
        }
    };
    let (report, ()) = tokio::join!(job_future, progress_future);

    match report.status {
        JobStatus::Completed => {
            pb.finish_with_message("Translation complete");
            #[allow(clippy::print_stdout)]
            {
                for path in report.output_paths() {
                    println!("{}", path.display());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        JobStatus::Failed => {
            pb.abandon_with_message("Translation failed");
            anyhow::bail!(
                "{}",
                report
                    .error
                    .unwrap_or_else(|| "unknown failure".to_string())
            );
        }
        JobStatus::Cancelled => {
            pb.abandon_with_message("Cancelled");
            Ok(ExitCode::from(130))
        }
    }
}

async fn models(config: &AppConfig) -> Result<ExitCode> {
    let client = OllamaClient::new(&config.bridge);
    let models = client
        .list_models()
        .await
        .context("Failed to list models")?;

    #[allow(clippy::print_stdout)]
    {
        if models.is_empty() {
            println!("No models installed on {}", config.bridge.base_url);
        } else {
            println!("Models on {}:", config.bridge.base_url);
            for model in models {
                let marker = if model.name == config.bridge.model {
                    "*"
                } else {
                    " "
                };
                match model.size {
                    Some(size) => println!("{marker} {} ({})", model.name, format_size(size)),
                    None => println!("{marker} {}", model.name),
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn check(config: &AppConfig, sample: Option<&str>) -> Result<ExitCode> {
    let client = Arc::new(OllamaClient::new(&config.bridge));
    let status = client
        .check_connection()
        .await
        .with_context(|| format!("Cannot reach {}", config.bridge.base_url))?;

    #[allow(clippy::print_stdout)]
    {
        match &status.version {
            Some(version) => println!(
                "Server {} reachable (version {version})",
                config.bridge.base_url
            ),
            None => println!("Server {} reachable", config.bridge.base_url),
        }
        println!("{} model(s) installed", status.model_count);
    }

    if !client.has_model(&config.bridge.model).await? {
        anyhow::bail!(
            "model '{}' is not installed on the server",
            config.bridge.model
        );
    }
    #[allow(clippy::print_stdout)]
    {
        println!("Model '{}' available", config.bridge.model);
    }

    if let Some(text) = sample {
        let translator = OllamaTranslator::new(client);
        let translated = translator
            .translate(text, &config.source_lang, &config.target_lang)
            .await
            .context("Sample translation failed")?;
        #[allow(clippy::print_stdout)]
        {
            println!("Sample: {text} -> {translated}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let bytes = bytes as f64;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes / GIB)
    } else {
        format!("{:.0} MiB", bytes / MIB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_check_sample_takes_text() {
        let args = Args::try_parse_from(["pdfglot", "check", "--sample", "Bonjour"]).unwrap();
        match args.command {
            Command::Check { sample } => assert_eq!(sample.as_deref(), Some("Bonjour")),
            other => panic!("unexpected command: {other:?}"),
        }

        // The flag is optional; a bare check still parses
        let args = Args::try_parse_from(["pdfglot", "check"]).unwrap();
        match args.command {
            Command::Check { sample } => assert!(sample.is_none()),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(9_000_000_000), "8.4 GiB");
        assert_eq!(format_size(500 * 1024 * 1024), "500 MiB");
    }
}
