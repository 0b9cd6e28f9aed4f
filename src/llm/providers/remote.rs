use crate::config::LlmConfig;
use crate::llm::prompt::{Prompt, SYSTEM_PROMPT};
use crate::llm::providers::{classify_send_error, http_client};
use crate::llm::{ChatClient, LlmError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// OpenAI-compatible chat completions endpoint (Groq by default).
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            LlmError::ConfigError("API URL is required for remote LLM provider".to_string())
        })?;

        Ok(Self {
            client: http_client(config)?,
            endpoint: chat_endpoint(&api_url),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

/// Accepts either a base URL (`.../v1`) or the full completions URL.
fn chat_endpoint(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{}/chat/completions", trimmed)
    }
}

pub(crate) fn classify_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(retry_after),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            LlmError::Timeout(format!("API responded with status code: {}", status))
        }
        _ => LlmError::Unknown(format!(
            "API responded with status code: {} - {}",
            status, body
        )),
    }
}

impl RemoteLlmProvider {
    async fn chat(&self, prompt: &Prompt, max_tokens: usize) -> Result<String, LlmError> {
        let request = PromptRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            max_tokens,
        };

        debug!("Calling LLM API: {} with model {}", self.endpoint, self.model);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            error!("LLM API responded with status code: {}", status);
            return Err(classify_status(status, retry_after, &body));
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Unknown(format!("Failed to parse LLM response: {}", e)))?;

        prompt_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Unknown("No choices in response".to_string()))
    }
}

#[async_trait]
impl ChatClient for RemoteLlmProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.chat(prompt, self.max_tokens).await
    }

    async fn ping(&self) -> Result<(), LlmError> {
        let prompt = Prompt {
            system: SYSTEM_PROMPT.to_string(),
            user: "ping".to_string(),
        };
        self.chat(&prompt, 1).await.map(|_| ())
    }

    fn model(&self) -> &str {
        &self.model
    }
}
