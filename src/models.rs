use crate::session::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Shown verbatim when the endpoint answers 400; in practice that status
/// means the prompt was rejected as too large.
pub const INVALID_REQUEST_DIAGNOSTIC: &str = "Error 400: The request was invalid or too large. \
Try reducing chat history or data context, or check server logs.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint rejected the request (HTTP 400)")]
    InvalidRequest,
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response from endpoint")]
    MalformedResponse,
}

impl ModelError {
    /// Displayable text appended to the conversation in place of a reply.
    pub fn user_message(&self) -> String {
        match self {
            ModelError::InvalidRequest => INVALID_REQUEST_DIAGNOSTIC.to_string(),
            other => format!("Error calling the model: {other}"),
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<String, ModelError>;
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAICompatible {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl OpenAICompatible {
    pub fn from_env() -> Self {
        let base_url = std::env::var("MODEL_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:1234/v1".into());
        let api_key = std::env::var("MODEL_API_KEY").ok();
        Self { base_url, api_key }
    }
}

impl Default for OpenAICompatible {
    fn default() -> Self { Self::from_env() }
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[async_trait]
impl LanguageModel for OpenAICompatible {
    async fn complete(&self, req: CompletionRequest) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatCompletionBody {
            model: &req.model,
            messages: &req.messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            stream: false,
        };
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let mut rb = client.post(url).json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }
        let resp = rb.send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            return Err(ModelError::InvalidRequest);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Status { status: status.as_u16(), body });
        }
        let text = resp.text().await?;
        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|_| ModelError::MalformedResponse)?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ModelError::MalformedResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    async fn spawn_endpoint(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".into(),
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            temperature: 0.6,
            max_tokens: 300,
        }
    }

    #[tokio::test]
    async fn complete_extracts_first_choice_content() {
        let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let cap = captured.clone();
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| {
                let cap = cap.clone();
                async move {
                    cap.lock().unwrap().replace(body);
                    Json(json!({"choices": [{"message": {"content": "two trends stand out"}}]}))
                }
            }),
        );
        let base_url = spawn_endpoint(router).await;
        let model = OpenAICompatible { base_url, api_key: None };

        let reply = model.complete(request()).await.unwrap();
        assert_eq!(reply, "two trends stand out");

        let body = captured.lock().unwrap().take().unwrap();
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 300);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[tokio::test]
    async fn status_400_maps_to_fixed_diagnostic() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::BAD_REQUEST, "context too long") }),
        );
        let base_url = spawn_endpoint(router).await;
        let model = OpenAICompatible { base_url, api_key: None };

        let err = model.complete(request()).await.unwrap_err();
        assert!(matches!(err, ModelError::InvalidRequest));
        assert_eq!(err.user_message(), INVALID_REQUEST_DIAGNOSTIC);
    }

    #[tokio::test]
    async fn other_statuses_carry_status_and_body() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
        );
        let base_url = spawn_endpoint(router).await;
        let model = OpenAICompatible { base_url, api_key: None };

        let err = model.complete(request()).await.unwrap_err();
        match &err {
            ModelError::Status { status, body } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "model crashed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.user_message().contains("500"));
        assert!(err.user_message().starts_with("Error calling the model"));
    }

    #[tokio::test]
    async fn missing_fields_map_to_malformed_response() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"unexpected": true})) }),
        );
        let base_url = spawn_endpoint(router).await;
        let model = OpenAICompatible { base_url, api_key: None };

        let err = model.complete(request()).await.unwrap_err();
        assert!(matches!(err, ModelError::MalformedResponse));

        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let base_url = spawn_endpoint(router).await;
        let model = OpenAICompatible { base_url, api_key: None };
        let err = model.complete(request()).await.unwrap_err();
        assert!(matches!(err, ModelError::MalformedResponse));
    }

    #[tokio::test]
    async fn unreachable_endpoint_maps_to_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let model = OpenAICompatible { base_url: format!("http://{addr}/v1"), api_key: None };
        let err = model.complete(request()).await.unwrap_err();
        assert!(matches!(err, ModelError::Transport(_)));
        assert!(err.user_message().starts_with("Error calling the model"));
        assert!(err.user_message().contains("request failed"));
    }
}
