use crate::config::LlmConfig;
use crate::llm::prompt::{Prompt, SYSTEM_PROMPT};
use crate::llm::providers::{classify_send_error, http_client};
use crate::llm::{ChatClient, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize, Debug)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize, Debug)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    message: OllamaReply,
}

#[derive(Deserialize, Debug)]
struct OllamaReply {
    content: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            client: http_client(config)?,
            endpoint: format!("{}/api/chat", api_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

impl OllamaProvider {
    async fn chat(&self, prompt: &Prompt, num_predict: Option<usize>) -> Result<String, LlmError> {
        info!("Sending request to Ollama with model: {}", self.model);
        debug!("API URL: {}", self.endpoint);

        let request = OllamaRequest {
            model: &self.model,
            messages: vec![
                OllamaMessage {
                    role: "system",
                    content: &prompt.system,
                },
                OllamaMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            // Explicitly disable streaming
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Ollama API responded with status code: {} - {}", status, body);
            return Err(super::remote::classify_status(status, None, &body));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::Unknown(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Ollama: {}", response_text);

        serde_json::from_str::<OllamaResponse>(&response_text)
            .map(|r| r.message.content)
            .map_err(|e| {
                LlmError::Unknown(format!(
                    "Failed to parse Ollama response: {} - Response was: {}",
                    e, response_text
                ))
            })
    }
}

#[async_trait]
impl ChatClient for OllamaProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.chat(prompt, None).await
    }

    async fn ping(&self) -> Result<(), LlmError> {
        let prompt = Prompt {
            system: SYSTEM_PROMPT.to_string(),
            user: "ping".to_string(),
        };
        self.chat(&prompt, Some(1)).await.map(|_| ())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn reads_message_content_from_chat_endpoint() {
        async fn chat(Json(body): Json<Value>) -> Json<Value> {
            let model = body["model"].as_str().unwrap_or_default().to_string();
            Json(json!({
                "model": model,
                "message": { "role": "assistant", "content": "SELECT 42" },
                "done": true
            }))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/api/chat", post(chat)))
                .await
                .unwrap();
        });

        let config = LlmConfig {
            backend: "ollama".to_string(),
            api_url: Some(format!("http://{}/", addr)),
            ..LlmConfig::default()
        };
        let provider = OllamaProvider::new(&config).unwrap();
        let prompt = Prompt {
            system: "s".to_string(),
            user: "u".to_string(),
        };

        assert_eq!(provider.complete(&prompt).await.unwrap(), "SELECT 42");
    }

    #[tokio::test]
    async fn ping_limits_prediction_to_one_token() {
        async fn chat(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            if body["options"]["num_predict"] != 1 {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": "unbounded" })));
            }
            (
                StatusCode::OK,
                Json(json!({ "message": { "role": "assistant", "content": "S" }, "done": true })),
            )
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/api/chat", post(chat)))
                .await
                .unwrap();
        });

        let config = LlmConfig {
            backend: "ollama".to_string(),
            api_url: Some(format!("http://{}", addr)),
            ..LlmConfig::default()
        };
        let provider = OllamaProvider::new(&config).unwrap();

        assert_eq!(provider.ping().await, Ok(()));
    }
}
