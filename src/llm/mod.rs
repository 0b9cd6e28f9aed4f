pub mod models;
pub mod prompt;
pub mod providers;

use crate::config::LlmConfig;
use crate::util::retry::{retry, tokio_sleeper, RetryPolicy, Sleeper};
use async_trait::async_trait;
use prompt::Prompt;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// No API credential; never retried.
    Unconfigured,
    Timeout(String),
    RateLimited(Option<u64>),
    Unknown(String),
    /// Invalid client settings, surfaced at startup.
    ConfigError(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Unconfigured => write!(f, "LLM API key not configured"),
            LlmError::Timeout(msg) => write!(f, "LLM request timed out: {}", msg),
            LlmError::RateLimited(Some(secs)) => {
                write!(f, "LLM rate limited, retry after {}s", secs)
            }
            LlmError::RateLimited(None) => write!(f, "LLM rate limited"),
            LlmError::Unknown(msg) => write!(f, "LLM error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// A chat-completion style model endpoint.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError>;

    /// One-token round trip used by health checks.
    async fn ping(&self) -> Result<(), LlmError>;

    fn model(&self) -> &str;
}

enum Backend {
    Unconfigured,
    Ready(Box<dyn ChatClient>),
}

/// Sends prompts to the model with bounded retry.
pub struct LlmTranslator {
    backend: Backend,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl LlmTranslator {
    /// Builds the provider client once at startup.
    ///
    /// A remote backend without an API key yields an unconfigured translator rather
    /// than an error; invalid settings (unknown backend, bad proxy URL) are errors.
    pub fn connect(config: &LlmConfig) -> Result<Self, LlmError> {
        let backend: Backend = match config.backend.as_str() {
            "remote" => match config.credential() {
                Some(api_key) => Backend::Ready(Box::new(
                    providers::remote::RemoteLlmProvider::new(config, api_key)?,
                )),
                None => Backend::Unconfigured,
            },
            "ollama" => Backend::Ready(Box::new(providers::ollama::OllamaProvider::new(config)?)),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        match &backend {
            Backend::Ready(client) => info!("LLM translator ready with model: {}", client.model()),
            Backend::Unconfigured => info!("No LLM API key configured, fallback SQL will be used"),
        }

        Ok(Self {
            backend,
            retry: config.retry(),
            sleeper: tokio_sleeper(),
        })
    }

    pub fn with_client(client: Box<dyn ChatClient>, retry: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            backend: Backend::Ready(client),
            retry,
            sleeper,
        }
    }

    pub fn unconfigured(retry: RetryPolicy) -> Self {
        Self {
            backend: Backend::Unconfigured,
            retry,
            sleeper: tokio_sleeper(),
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.backend, Backend::Ready(_))
    }

    pub async fn translate(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let client = match &self.backend {
            Backend::Ready(client) => client,
            Backend::Unconfigured => return Err(LlmError::Unconfigured),
        };

        debug!("Sending prompt to model {}", client.model());
        retry(&self.retry, self.sleeper.as_ref(), "LLM call", |_| {
            client.complete(prompt)
        })
        .await
    }

    /// Single one-token round trip, no retry.
    pub async fn ping(&self) -> Result<(), LlmError> {
        match &self.backend {
            Backend::Ready(client) => client.ping().await,
            Backend::Unconfigured => Err(LlmError::Unconfigured),
        }
    }
}
