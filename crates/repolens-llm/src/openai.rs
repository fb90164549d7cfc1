use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message, Role};

const PROVIDER_NAME: &str = "openai";

/// Client for OpenAI and OpenAI-compatible chat/embedding endpoints.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    embedding_model: Option<String>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        max_tokens: u32,
        embedding_model: Option<String>,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(Duration::from_secs(120)),
            api_key,
            base_url,
            model,
            max_tokens,
            embedding_model,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn embedding_model(&self) -> Result<&str, LlmError> {
        self.embedding_model
            .as_deref()
            .ok_or_else(|| LlmError::EmbedUnsupported {
                provider: PROVIDER_NAME.into(),
            })
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        crate::http::error_for_status(PROVIDER_NAME, status, endpoint, &text)?;
        Ok(text)
    }

    async fn request_embeddings(&self, input: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let model = self.embedding_model()?;
        let body = EmbeddingRequest { input, model };
        let text = self.post_json("embeddings", &body).await?;
        let resp: EmbeddingResponse = serde_json::from_str(&text)?;

        if resp.data.len() != input.len() {
            return Err(LlmError::EmptyResponse {
                provider: PROVIDER_NAME.into(),
            });
        }

        let mut data = resp.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn convert_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: role_str(m.role),
            content: &m.content,
        })
        .collect()
}

impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: convert_messages(messages),
            max_tokens: self.max_tokens,
        };
        let text = self.post_json("chat/completions", &body).await?;
        let resp: ChatResponse = serde_json::from_str(&text)?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: PROVIDER_NAME.into(),
            })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut vectors = self.request_embeddings(&[text.to_owned()]).await?;
        vectors.pop().ok_or_else(|| LlmError::EmptyResponse {
            provider: PROVIDER_NAME.into(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts).await
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(base_url: String, embedding_model: Option<&str>) -> OpenAiProvider {
        OpenAiProvider::new(
            "test-key".into(),
            base_url,
            "gpt-4o-mini".into(),
            256,
            embedding_model.map(str::to_owned),
        )
    }

    #[test]
    fn new_trims_trailing_slashes() {
        let p = provider("https://api.openai.com/v1//".into(), None);
        assert_eq!(p.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let p = provider("https://api.openai.com/v1".into(), None);
        let dbg = format!("{p:?}");
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("test-key"));
    }

    #[test]
    fn convert_messages_maps_roles() {
        let messages = vec![
            Message::system("system prompt"),
            Message::user("user msg"),
            Message::assistant("assistant reply"),
        ];
        let api_msgs = convert_messages(&messages);
        assert_eq!(api_msgs.len(), 3);
        assert_eq!(api_msgs[0].role, "system");
        assert_eq!(api_msgs[0].content, "system prompt");
        assert_eq!(api_msgs[1].role, "user");
        assert_eq!(api_msgs[2].role, "assistant");
    }

    #[tokio::test]
    async fn chat_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "The Memory class stores turns."}}]
            })))
            .mount(&server)
            .await;

        let p = provider(server.uri(), None);
        let answer = p.chat(&[Message::user("what?")]).await.unwrap();
        assert_eq!(answer, "The Memory class stores turns.");
    }

    #[tokio::test]
    async fn chat_without_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let p = provider(server.uri(), None);
        let err = p.chat(&[Message::user("what?")]).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }

    async fn chat_error_for_status(status: u16) -> LlmError {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        provider(server.uri(), None)
            .chat(&[Message::user("hi")])
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn too_many_requests_maps_to_rate_limited() {
        let err = chat_error_for_status(429).await;
        assert!(matches!(err, LlmError::RateLimited));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_maps_to_unavailable() {
        let err = chat_error_for_status(503).await;
        assert!(matches!(err, LlmError::Unavailable));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth() {
        let err = chat_error_for_status(401).await;
        assert!(matches!(err, LlmError::Auth { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn bad_request_maps_to_api_error() {
        let err = chat_error_for_status(400).await;
        assert!(matches!(err, LlmError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn embed_batch_orders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let p = provider(server.uri(), Some("text-embedding-3-small"));
        let vectors = p
            .embed_batch(&["first".to_owned(), "second".to_owned()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn embed_without_model_is_unsupported() {
        let p = provider("http://127.0.0.1:1".into(), None);
        assert!(!p.supports_embeddings());
        let err = p.embed("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::EmbedUnsupported { .. }));
    }

    #[tokio::test]
    async fn chat_unreachable_endpoint_errors() {
        let p = provider("http://127.0.0.1:1".into(), None);
        let err = p.chat(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Http(_)));
    }

    #[test]
    fn embedding_request_serialization() {
        let input = vec!["hello world".to_owned()];
        let body = EmbeddingRequest {
            input: &input,
            model: "text-embedding-3-small",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"input\":[\"hello world\"]"));
        assert!(json.contains("\"model\":\"text-embedding-3-small\""));
    }
}
