use crate::error::GenerationError;
use crate::prompt::ChatPrompt;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Submits a prompt to a text-generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &ChatPrompt) -> Result<String, GenerationError>;

    /// Model identifier reported in logs and API responses.
    fn model(&self) -> &str;
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, GenerationError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &ChatPrompt) -> Result<String, GenerationError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };
        info!(model = %self.model, prompt_chars = prompt.user.chars().count(), "requesting generation");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "generation service rejected request");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| GenerationError::Decode(err.to_string()))?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Result of a generation attempt as shown to the user: either the model's
/// text or the error text that replaced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "lowercase")]
pub enum GenerationOutcome {
    Generated(String),
    Failed(String),
}

impl GenerationOutcome {
    pub fn from_result(result: Result<String, GenerationError>) -> Self {
        match result {
            Ok(text) => GenerationOutcome::Generated(text),
            Err(err) => {
                warn!(error = %err, "generation failed");
                GenerationOutcome::Failed(format!("⚠️ {err}"))
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, GenerationOutcome::Generated(_))
    }

    pub fn text(&self) -> &str {
        match self {
            GenerationOutcome::Generated(text) | GenerationOutcome::Failed(text) => text,
        }
    }
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, http::HeaderMap, http::StatusCode, routing::post};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct Captured {
        body: Arc<Mutex<Option<Value>>>,
        auth: Arc<Mutex<Option<String>>>,
    }

    async fn spawn_stub(status: StatusCode, reply: Value) -> (String, Captured) {
        let captured = Captured::default();
        let router = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    move |State(captured): State<Captured>,
                          headers: HeaderMap,
                          Json(body): Json<Value>| {
                        let reply = reply.clone();
                        async move {
                            *captured.body.lock().unwrap() = Some(body);
                            *captured.auth.lock().unwrap() = headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            (status, Json(reply))
                        }
                    },
                ),
            )
            .with_state(captured.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}/v1"), captured)
    }

    fn prompt() -> ChatPrompt {
        ChatPrompt {
            system: "system".to_string(),
            user: "user".to_string(),
        }
    }

    #[tokio::test]
    async fn posts_chat_completion_and_reads_content() {
        let reply = json!({
            "choices": [{ "message": { "role": "assistant", "content": "보고서 본문" } }]
        });
        let (base, captured) = spawn_stub(StatusCode::OK, reply).await;
        let generator = OpenAiGenerator::new("sk-test", format!("{base}/"), DEFAULT_MODEL, None).unwrap();
        let text = generator.generate(&prompt()).await.unwrap();
        assert_eq!(text, "보고서 본문");

        let body = captured.body.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(
            captured.auth.lock().unwrap().as_deref(),
            Some("Bearer sk-test")
        );
    }

    #[tokio::test]
    async fn http_errors_carry_status_and_body() {
        let reply = json!({ "error": { "message": "quota exceeded" } });
        let (base, _) = spawn_stub(StatusCode::TOO_MANY_REQUESTS, reply).await;
        let generator = OpenAiGenerator::new("sk-test", base, DEFAULT_MODEL, None).unwrap();
        match generator.generate(&prompt()).await {
            Err(GenerationError::Status { status, body }) => {
                assert_eq!(status, 429);
                assert!(body.contains("quota exceeded"));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_are_an_error() {
        let (base, _) = spawn_stub(StatusCode::OK, json!({ "choices": [] })).await;
        let generator = OpenAiGenerator::new("sk-test", base, DEFAULT_MODEL, None).unwrap();
        assert!(matches!(
            generator.generate(&prompt()).await,
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn failures_become_displayable_text() {
        let outcome = GenerationOutcome::from_result(Err(GenerationError::EmptyResponse));
        assert!(!outcome.is_ok());
        assert!(outcome.text().contains("no content"));
        let ok = GenerationOutcome::from_result(Ok("done".to_string()));
        assert_eq!(ok.text(), "done");
    }
}
