//! Translation bridge: the link between documents and a local LLM server.

mod gateway;
mod limiter;
mod ollama;
mod traits;

pub use gateway::TranslatorGateway;
pub use limiter::RateLimiter;
pub use ollama::{
    ChatMessage, ChatOptions, ChatRequest, ModelInfo, OllamaClient, OllamaTranslator, ServerStatus,
};
pub use traits::{Translator, TranslatorInfo};

use crate::config::BridgeConfig;
use crate::error::Result;
use std::sync::Arc;

/// Create a translator from configuration
pub fn create_translator(config: &BridgeConfig) -> Result<Arc<dyn Translator>> {
    let client = Arc::new(OllamaClient::new(config));
    Ok(Arc::new(OllamaTranslator::new(client)))
}
