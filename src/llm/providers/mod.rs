pub mod ollama;
pub mod remote;

use crate::config::LlmConfig;
use crate::llm::LlmError;
use std::time::Duration;

/// HTTP client with explicit proxy settings; the ambient proxy environment is never consulted.
pub(crate) fn http_client(config: &LlmConfig) -> Result<reqwest::Client, LlmError> {
    let mut builder =
        reqwest::Client::builder().timeout(Duration::from_secs(config.request_timeout_secs));

    builder = match &config.proxy {
        Some(proxy) => builder.proxy(
            reqwest::Proxy::all(proxy)
                .map_err(|e| LlmError::ConfigError(format!("invalid proxy '{}': {}", proxy, e)))?,
        ),
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| LlmError::ConfigError(e.to_string()))
}

pub(crate) fn classify_send_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(e.to_string())
    } else {
        LlmError::Unknown(e.to_string())
    }
}
