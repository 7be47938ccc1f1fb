//! pdfglot core library
//!
//! Layout-preserving PDF translation driven by a local LLM:
//! - Translation bridge for Ollama-compatible inference servers
//! - Per-job OpenAI-compatible gateway with rate limiting and retries
//! - BabelDOC engine adapter (subprocess, progress parsing, output naming)
//! - Batch job orchestration with progress events and cancellation

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod util;

pub use bridge::{
    ChatMessage, ChatRequest, ModelInfo, OllamaClient, OllamaTranslator, RateLimiter,
    ServerStatus, Translator, TranslatorGateway, TranslatorInfo, create_translator,
};
pub use config::{
    AppConfig, BridgeConfig, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_QPS, DEFAULT_SOURCE_LANG,
    DEFAULT_TARGET_LANG, EngineConfig, Lang, LanguageOption, OutputFormats, default_config_path,
    flag_for_lang, source_languages, target_languages,
};
pub use engine::{
    BabelDocEngine, CancelFlag, DocumentEngine, DocumentJob, EngineEvent, JobOutputs, OutputKind,
    output_stem,
};
pub use error::{Error, Result};
pub use job::{
    FileReport, JobEvent, JobReport, JobRunner, JobStatus, TranslationJob, overall_percent,
    run_job,
};
