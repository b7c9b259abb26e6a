//! OpenAI-compatible chat-completions client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use pipeline::{
    DelegateError, Generation, LanguageModel, LanguageModelConnector, LanguageModelCredentials,
    ModelParams, Prompt, TokenCount,
};

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

/// Per-request timeout. The run deadline usually fires first.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Endpoint settings shared by every client a [`connector`] opens.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL for the API; `/chat/completions` is appended.
    pub base_url: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Service name used in errors and logs.
    pub name: String,
}

impl OpenAiConfig {
    /// Configuration for api.openai.com.
    pub fn openai() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            name: "openai".to_string(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the service name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self::openai()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Chat-completions client bound to one API key.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    config: OpenAiConfig,
}

impl OpenAiClient {
    /// Creates a client for `api_key`.
    pub fn new(config: OpenAiConfig, api_key: impl Into<String>) -> Result<Self, DelegateError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DelegateError::Client {
                service: config.name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn to_request<'a>(prompt: &'a Prompt, params: &'a ModelParams) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &prompt.user,
        });

        ChatRequest {
            model: &params.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        }
    }

    fn service_name(&self) -> String {
        self.config.name.clone()
    }

    async fn handle_error_response(&self, response: Response) -> DelegateError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {status}: {body}"));

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DelegateError::Auth {
                service: self.service_name(),
                message,
            },
            StatusCode::TOO_MANY_REQUESTS => DelegateError::RateLimited {
                service: self.service_name(),
                message,
            },
            _ => DelegateError::Rejected {
                service: self.service_name(),
                status: status.as_u16(),
                message,
            },
        }
    }

    fn parse_generation(
        &self,
        response: ChatResponse,
        params: &ModelParams,
    ) -> Result<Generation, DelegateError> {
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| DelegateError::InvalidResponse {
                service: self.service_name(),
                message: "response contained no completion".to_string(),
            })?;

        Ok(Generation {
            text,
            model: response.model.unwrap_or_else(|| params.model.clone()),
            usage: response.usage.map(|u| TokenCount::new(u.total_tokens)),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn service(&self) -> &str {
        &self.config.name
    }

    async fn generate_text(
        &self,
        prompt: &Prompt,
        params: &ModelParams,
    ) -> Result<Generation, DelegateError> {
        let request = Self::to_request(prompt, params);

        tracing::debug!(
            backend = %self.config.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.completions_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| DelegateError::Transport {
                service: self.service_name(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let err = self.handle_error_response(response).await;
            tracing::warn!(backend = %self.config.name, error = %err, "Chat completion failed");
            return Err(err);
        }

        let body = response.text().await.map_err(|e| DelegateError::Transport {
            service: self.service_name(),
            message: e.to_string(),
        })?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| DelegateError::InvalidResponse {
                service: self.service_name(),
                message: e.to_string(),
            })?;

        self.parse_generation(parsed, params)
    }
}

/// Connector opening one [`OpenAiClient`] per credential bundle.
///
/// A bundle's `base_url` overrides the one in `config`.
pub fn connector(config: OpenAiConfig) -> LanguageModelConnector {
    Arc::new(
        move |credentials: &LanguageModelCredentials| -> Result<Arc<dyn LanguageModel>, DelegateError> {
            let mut config = config.clone();
            if let Some(base_url) = &credentials.base_url {
                config.base_url = base_url.clone();
            }
            Ok(Arc::new(OpenAiClient::new(config, credentials.api_key.clone())?))
        },
    )
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "sk-test-key-1234567890";

    fn client(server: &MockServer) -> Arc<dyn LanguageModel> {
        let connect = connector(OpenAiConfig::openai());
        connect(&LanguageModelCredentials {
            api_key: KEY.to_string(),
            base_url: Some(server.uri()),
        })
        .unwrap()
    }

    fn params() -> ModelParams {
        ModelParams::default()
    }

    #[test]
    fn test_config_builders() {
        let config = OpenAiConfig::openai()
            .with_base_url("http://localhost:11434/v1")
            .with_timeout(Duration::from_secs(5))
            .with_name("ollama");
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.name, "ollama");
        assert_eq!(OpenAiConfig::default().base_url, DEFAULT_OPENAI_BASE);
    }

    #[test]
    fn test_request_includes_system_message_when_present() {
        let prompt = Prompt::user("Write a quote").with_system("Be concise");
        let params = params();
        let request = OpenAiClient::to_request(&prompt, &params);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["max_tokens"], 300);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Write a quote");

        let prompt = Prompt::user("Only user");
        let request = OpenAiClient::to_request(&prompt, &params);
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header_eq("authorization", format!("Bearer {KEY}").as_str()))
            .and(body_partial_json(json!({"model": "gpt-3.5-turbo", "max_tokens": 300})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "model": "gpt-3.5-turbo-0125",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Keep moving forward."},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generation = client(&server)
            .generate_text(&Prompt::user("Motivate me"), &params())
            .await
            .unwrap();

        assert_eq!(generation.text, "Keep moving forward.");
        assert_eq!(generation.model, "gpt-3.5-turbo-0125");
        assert_eq!(generation.usage, Some(TokenCount::new(15)));
    }

    #[tokio::test]
    async fn test_status_codes_map_to_error_kinds() {
        let cases = [(401_u16, "auth"), (429, "rate"), (500, "rejected")];

        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                    "error": {"message": "nope", "type": "error"}
                })))
                .mount(&server)
                .await;

            let err = client(&server)
                .generate_text(&Prompt::user("hi"), &params())
                .await
                .unwrap_err();

            let matched = match (&err, expected) {
                (DelegateError::Auth { message, .. }, "auth") => message == "nope",
                (DelegateError::RateLimited { .. }, "rate") => true,
                (DelegateError::Rejected { status: 500, .. }, "rejected") => true,
                _ => false,
            };
            assert!(matched, "status {status} produced {err:?}");
        }
    }

    #[tokio::test]
    async fn test_non_json_error_body_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client(&server)
            .generate_text(&Prompt::user("hi"), &params())
            .await
            .unwrap_err();
        assert!(
            matches!(err, DelegateError::Rejected { status: 502, ref message, .. } if message.contains("bad gateway"))
        );
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client(&server)
            .generate_text(&Prompt::user("hi"), &params())
            .await
            .unwrap_err();
        assert!(matches!(err, DelegateError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let connect = connector(OpenAiConfig::openai());
        let model = connect(&LanguageModelCredentials {
            api_key: KEY.to_string(),
            base_url: Some("http://127.0.0.1:1".to_string()),
        })
        .unwrap();

        let err = model
            .generate_text(&Prompt::user("hi"), &params())
            .await
            .unwrap_err();
        assert!(matches!(err, DelegateError::Transport { ref service, .. } if service == "openai"));
    }
}
