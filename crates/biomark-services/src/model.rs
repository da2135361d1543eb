//! Model invocation adapters.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use biomark_protocol::{ChatMessage, Completion, CompletionRequest, ModelProvider, ServiceError};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const API_VERSION: &str = "2023-06-01";
const SERVICE: &str = "model-endpoint";

/// Configuration for the HTTP messages endpoint.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    api_key: Secret<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ModelConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: "claude-sonnet-4-20250514".to_owned(),
            base_url: "https://api.anthropic.com".to_owned(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// Messages-endpoint client. One request per completion, no streaming.
pub struct HttpModelProvider {
    config: ModelConfig,
    client: reqwest::Client,
}

impl HttpModelProvider {
    pub fn new(config: ModelConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| ServiceError::request(SERVICE, error))?;
        Ok(Self { config, client })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

fn extract_text(response: MessagesResponse) -> Result<String, ServiceError> {
    response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .map(|block| block.text)
        .ok_or_else(|| ServiceError::response(SERVICE, "no text block in completion"))
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    #[instrument(skip(self, request), fields(model = %self.config.model, messages = request.messages.len()))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ServiceError> {
        let body = MessagesRequest {
            model: &self.config.model,
            system: request.system.as_deref(),
            messages: &request.messages,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", self.config.api_key())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|error| ServiceError::request(SERVICE, error))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ServiceError::response(
                SERVICE,
                format!("status {status}: {detail}"),
            ));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|error| ServiceError::response(SERVICE, error))?;
        let text = extract_text(parsed)?;
        debug!(chars = text.len(), "completion received");
        Ok(Completion { text })
    }
}

/// Canned provider for tests and offline gateway runs: pops responses in
/// order and records every request it saw.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModelProvider {
    responses: Arc<Mutex<VecDeque<String>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedModelProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedModelProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ServiceError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .map(|text| Completion { text })
            .ok_or_else(|| ServiceError::response(SERVICE, "no scripted response left"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_takes_first_text_block() {
        let response = MessagesResponse {
            content: vec![
                ContentBlock {
                    kind: "thinking".to_owned(),
                    text: String::new(),
                },
                ContentBlock {
                    kind: "text".to_owned(),
                    text: "SELECT 1".to_owned(),
                },
            ],
        };
        assert_eq!(extract_text(response).unwrap(), "SELECT 1");
    }

    #[test]
    fn extract_text_rejects_empty_content() {
        let response = MessagesResponse { content: vec![] };
        assert!(extract_text(response).is_err());
    }

    #[test]
    fn messages_response_parses_wire_shape() {
        let raw = r#"{"id":"msg_1","content":[{"type":"text","text":"no change needed"}],"model":"m"}"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_text(parsed).unwrap(), "no change needed");
    }

    #[tokio::test]
    async fn scripted_provider_pops_in_order() {
        let provider =
            ScriptedModelProvider::new(vec!["first".to_owned(), "second".to_owned()]);
        let request = CompletionRequest {
            system: None,
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 16,
        };

        assert_eq!(provider.complete(request.clone()).await.unwrap().text, "first");
        assert_eq!(provider.complete(request.clone()).await.unwrap().text, "second");
        assert!(provider.complete(request).await.is_err());
        assert_eq!(provider.requests().len(), 3);
    }
}
