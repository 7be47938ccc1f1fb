use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Language codes following ISO 639-1 with regional variants
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lang(pub String);

impl Lang {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Lang {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Lang {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// Serde default functions for common languages
fn default_source_lang() -> Lang {
    Lang::new(DEFAULT_SOURCE_LANG)
}

fn default_target_lang() -> Lang {
    Lang::new(DEFAULT_TARGET_LANG)
}

/// Which output documents a job produces.
///
/// `translated` is the target-language-only document; `dual` interleaves
/// original and translated pages for side-by-side reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormats {
    #[serde(default = "default_true")]
    pub translated: bool,
    #[serde(default = "default_true")]
    pub dual: bool,
}

impl OutputFormats {
    pub const fn both() -> Self {
        Self {
            translated: true,
            dual: true,
        }
    }

    pub const fn translated_only() -> Self {
        Self {
            translated: true,
            dual: false,
        }
    }

    pub const fn dual_only() -> Self {
        Self {
            translated: false,
            dual: true,
        }
    }

    /// Whether at least one format is enabled. Jobs with neither are invalid.
    pub const fn any(self) -> bool {
        self.translated || self.dual
    }
}

impl Default for OutputFormats {
    fn default() -> Self {
        Self::both()
    }
}

/// Translation bridge configuration for an Ollama-style inference server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Server base URL, e.g. "http://localhost:11434"
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Optional bearer token (servers behind an authenticating proxy)
    pub api_key: Option<String>,

    /// Model identifier, e.g. "qwen2.5:14b"
    #[serde(default = "default_model")]
    pub model: String,

    /// Requests-per-second cap for translation calls (0 = unlimited)
    #[serde(default = "default_qps")]
    pub qps: u32,

    /// Number of retry attempts per request
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Delay between retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl BridgeConfig {
    /// Create a bridge config with default retry and rate settings.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            qps: default_qps(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            qps: default_qps(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

const fn default_qps() -> u32 {
    DEFAULT_QPS
}

const fn default_retry_count() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

const fn default_true() -> bool {
    true
}

/// External document-translation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine executable (name on PATH or absolute path)
    #[serde(default = "default_engine_command")]
    pub command: PathBuf,

    /// Split large documents into parts of at most this many pages
    #[serde(default = "default_max_pages_per_part")]
    pub max_pages_per_part: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: default_engine_command(),
            max_pages_per_part: default_max_pages_per_part(),
        }
    }
}

fn default_engine_command() -> PathBuf {
    PathBuf::from("babeldoc")
}

const fn default_max_pages_per_part() -> u32 {
    50
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source language
    #[serde(default = "default_source_lang")]
    pub source_lang: Lang,

    /// Target language
    #[serde(default = "default_target_lang")]
    pub target_lang: Lang,

    /// Output directory; each input's parent directory is used when unset
    pub output_dir: Option<PathBuf>,

    /// Translation bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Document engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Output formats produced per document
    #[serde(default)]
    pub output: OutputFormats,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            output_dir: None,
            bridge: BridgeConfig::default(),
            engine: EngineConfig::default(),
            output: OutputFormats::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))
    }

    /// Load from default locations (~/.config/pdfglot/config.toml, ./pdfglot.toml)
    pub fn load() -> Self {
        if let Some(user_config) = default_config_path()
            && user_config.exists()
        {
            match Self::from_file(&user_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from {}", user_config.display());
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {}", user_config.display(), e);
                }
            }
        }

        let local_config = PathBuf::from("pdfglot.toml");
        if local_config.exists() {
            match Self::from_file(&local_config) {
                Ok(config) => {
                    tracing::debug!("Loaded config from ./pdfglot.toml");
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to load ./pdfglot.toml: {}", e);
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Self::default()
    }

    /// Persist to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigLoad(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Persist to the default user config location.
    pub fn save(&self) -> Result<()> {
        let path = default_config_path().ok_or_else(|| {
            Error::ConfigLoad("no config directory available (HOME unset)".to_string())
        })?;
        self.save_to(path)
    }

    /// Check the configuration for values that would make every job fail.
    pub fn validate(&self) -> Result<()> {
        if !self.output.any() {
            return Err(Error::ConfigInvalid {
                field: "output".to_string(),
                reason: "at least one output format must be enabled".to_string(),
            });
        }
        if self.bridge.model.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "bridge.model".to_string(),
                reason: "model must not be empty".to_string(),
            });
        }
        if !self.bridge.base_url.starts_with("http") {
            return Err(Error::ConfigInvalid {
                field: "bridge.base_url".to_string(),
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.bridge.qps > MAX_QPS {
            return Err(Error::ConfigInvalid {
                field: "bridge.qps".to_string(),
                reason: format!("must be between 0 and {MAX_QPS}"),
            });
        }
        if self.engine.command.as_os_str().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "engine.command".to_string(),
                reason: "engine command must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Default user config file path (`$XDG_CONFIG_HOME/pdfglot/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    crate::util::config_dir().map(|dir| dir.join("pdfglot").join("config.toml"))
}

/// A language option for UI dropdowns
#[derive(Debug, Clone)]
pub struct LanguageOption {
    /// ISO language code (e.g., "en", "zh-CN")
    pub code: &'static str,
    /// Display name (e.g., "English", "French")
    pub name: &'static str,
    /// Flag emoji
    pub flag: &'static str,
}

/// Languages available as translation source.
pub fn source_languages() -> Vec<LanguageOption> {
    vec![
        LanguageOption { code: "en", name: "English", flag: "🇬🇧" },
        LanguageOption { code: "fr", name: "French", flag: "🇫🇷" },
        LanguageOption { code: "de", name: "German", flag: "🇩🇪" },
        LanguageOption { code: "es", name: "Spanish", flag: "🇪🇸" },
        LanguageOption { code: "ja", name: "Japanese", flag: "🇯🇵" },
        LanguageOption { code: "ko", name: "Korean", flag: "🇰🇷" },
    ]
}

/// Languages available as translation target.
/// The bundled engine's layout models are tuned for Chinese output.
pub fn target_languages() -> Vec<LanguageOption> {
    vec![
        LanguageOption { code: "zh", name: "Chinese", flag: "🇨🇳" },
        LanguageOption { code: "zh-CN", name: "Chinese (Simplified)", flag: "🇨🇳" },
        LanguageOption { code: "zh-TW", name: "Chinese (Traditional)", flag: "🇹🇼" },
    ]
}

/// Get flag emoji for a language code.
///
/// Returns a globe emoji for unknown language codes.
pub fn flag_for_lang(code: &str) -> &'static str {
    match code {
        "en" => "🇬🇧",
        "fr" => "🇫🇷",
        "de" => "🇩🇪",
        "es" => "🇪🇸",
        "ja" => "🇯🇵",
        "ko" => "🇰🇷",
        "zh" | "zh-CN" => "🇨🇳",
        "zh-TW" => "🇹🇼",
        _ => "🌐",
    }
}

/// Default inference server base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Default model identifier
pub const DEFAULT_MODEL: &str = "qwen2.5:14b";
/// Default source language code
pub const DEFAULT_SOURCE_LANG: &str = "en";
/// Default target language code
pub const DEFAULT_TARGET_LANG: &str = "zh";
/// Default requests-per-second cap
pub const DEFAULT_QPS: u32 = 2;
/// Upper bound accepted for the requests-per-second cap
pub const MAX_QPS: u32 = 50;
