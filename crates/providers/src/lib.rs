//! Model gateway implementations for handoff.
//!
//! Every provider implements `handoff_core::Provider`. The agent loop only
//! sees the trait; [`from_config`] picks the concrete backend.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use handoff_config::AppConfig;
use handoff_core::error::ProviderError;

/// Build the configured provider.
///
/// A missing API key is only an error for hosted endpoints; local servers
/// (Ollama, LM Studio) accept unauthenticated requests.
pub fn from_config(config: &AppConfig) -> Result<OpenAiCompatProvider, ProviderError> {
    let api_key = config.api_key.clone().unwrap_or_default();
    if api_key.is_empty() && !is_local(&config.api_url) {
        return Err(ProviderError::NotConfigured(format!(
            "no API key for {}; set HANDOFF_API_KEY or api_key in the config file",
            config.api_url
        )));
    }
    Ok(OpenAiCompatProvider::new(
        provider_name(&config.api_url),
        &config.api_url,
        api_key,
    )
    .with_timeout_secs(config.agent.model_timeout_secs))
}

fn is_local(url: &str) -> bool {
    ["localhost", "127.0.0.1", "[::1]"]
        .iter()
        .any(|host| url.contains(host))
}

/// A short name for the endpoint, used in logs.
fn provider_name(url: &str) -> &'static str {
    if url.contains("openrouter.ai") {
        "openrouter"
    } else if url.contains("api.openai.com") {
        "openai"
    } else if url.contains(":11434") {
        "ollama"
    } else if url.contains(":1234") {
        "lmstudio"
    } else {
        "openai_compat"
    }
}
