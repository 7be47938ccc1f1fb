use thiserror::Error;

/// Unified error type for pdfglot-core
///
/// This enum encompasses all error cases that can occur in the library:
/// - Translation bridge operations (connectivity, model selection, responses)
/// - Document engine runs (subprocess failures, missing artifacts)
/// - Configuration operations (loading, validation)
/// - General I/O operations
#[derive(Error, Debug)]
pub enum Error {
    // ==========================================================================
    // Translation Bridge Errors
    // ==========================================================================
    /// Inference server unreachable or the request timed out
    #[error("inference server unreachable: {0}")]
    Connectivity(String),

    /// Configured model is missing on the server or rejected the request
    #[error("model '{model}' unavailable: {reason}")]
    Model { model: String, reason: String },

    /// Unexpected reply from the inference server (error status, malformed
    /// or empty payload)
    #[error("invalid inference server response: {0}")]
    InvalidResponse(String),

    /// Rate limited by the inference server
    #[error("rate limited by server{}", retry_after.map(|s| format!(", retry after {s} seconds")).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    /// Maximum retry attempts exceeded for a bridge request
    #[error("request failed after maximum retries")]
    MaxRetriesExceeded,

    /// A translation call failed; carries the underlying cause.
    ///
    /// This is the only error the bridge's `translate` surfaces: whatever
    /// went wrong underneath (connection refused, timeout, bad payload)
    /// ends up wrapped here so engine callers handle a single class.
    #[error("translation unavailable: {0}")]
    TranslationUnavailable(#[source] Box<Error>),

    // ==========================================================================
    // Engine Errors
    // ==========================================================================
    /// Document-translation engine run failed
    #[error("engine error: {0}")]
    Engine(String),

    /// Run stopped because cancellation was requested
    #[error("translation cancelled")]
    Cancelled,

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Failed to load configuration file
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Invalid configuration value
    #[error("invalid config value for '{field}': {reason}")]
    ConfigInvalid { field: String, reason: String },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an error as the fragment-level `TranslationUnavailable` class.
    pub fn unavailable(cause: Self) -> Self {
        Self::TranslationUnavailable(Box::new(cause))
    }

    /// Whether this error (or the cause chain of a wrapped one) means the
    /// inference server could not be reached.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Connectivity(_) => true,
            Self::TranslationUnavailable(cause) => cause.is_connectivity(),
            _ => false,
        }
    }

    /// Short class name for user-facing summaries.
    pub const fn class(&self) -> &'static str {
        match self {
            Self::Connectivity(_) => "connectivity",
            Self::Model { .. } => "model",
            Self::InvalidResponse(_) | Self::RateLimited { .. } | Self::MaxRetriesExceeded => {
                "server response"
            }
            Self::TranslationUnavailable(_) => "translation",
            Self::Engine(_) => "engine",
            Self::Cancelled => "cancelled",
            Self::ConfigLoad(_) | Self::ConfigInvalid { .. } => "config",
            Self::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
