use crate::config::DEFAULT_OPENAI_BASE_URL;
use crate::story::{
    parse_story_response, system_prompt, user_prompt, GeneratedStory, StoryError, StoryGenerator,
    StoryRequest,
};
use crate::util::{retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o";
const TEMPERATURE: f32 = 0.8;
const MAX_TOKENS: u32 = 2000;
const LOG_TARGET: &str = "story::openai";

#[derive(Clone)]
pub struct OpenAiStoryGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl OpenAiStoryGenerator {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn complete(&self, body: &ChatRequest<'_>) -> Result<String, StoryError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| "Unknown error".to_owned());
            return Err(StoryError::Api { status, message });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| StoryError::InvalidResponse(format!("Failed to parse JSON: {e}")))?;

        Ok(chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

impl StoryGenerator for OpenAiStoryGenerator {
    fn generate(&self, request: StoryRequest) -> BoxFuture<'_, Result<GeneratedStory, StoryError>> {
        async move {
            let system = system_prompt(&request);
            let user = user_prompt(&request);
            let body = ChatRequest {
                model: &self.model,
                messages: [
                    ChatMessage {
                        role: "system",
                        content: &system,
                    },
                    ChatMessage {
                        role: "user",
                        content: &user,
                    },
                ],
                temperature: TEMPERATURE,
                max_tokens: MAX_TOKENS,
            };

            tracing::debug!(
                target: LOG_TARGET,
                model = %self.model,
                age_group = %request.age_group,
                "requesting story"
            );

            let raw = retry_with_backoff(&self.retry, || self.complete(&body), StoryError::is_retryable)
                .await?;

            let story = parse_story_response(&raw);
            if story.content.is_empty() {
                return Err(StoryError::EmptyStory);
            }

            tracing::info!(
                target: LOG_TARGET,
                title = %story.title,
                words = story.content.split_whitespace().count(),
                "story generated"
            );
            Ok(story)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::AgeGroup;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OpenAiStoryGenerator {
        OpenAiStoryGenerator::new("sk-test".to_owned())
            .with_base_url(server.uri())
            .with_retry(RetryConfig::new(2, Duration::from_millis(1)))
    }

    fn request() -> StoryRequest {
        StoryRequest::new("a hedgehog afraid of the dark", Some("Leo".to_owned()), AgeGroup::Preschool)
            .unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
    }

    #[tokio::test]
    async fn generates_and_parses_story() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 2000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "TITLE: Leo's Little Lantern\n---\nLeo the hedgehog found a lantern.",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let story = generator(&server).generate(request()).await.unwrap();
        assert_eq!(story.title, "Leo's Little Lantern");
        assert_eq!(story.content, "Leo the hedgehog found a lantern.");
    }

    #[tokio::test]
    async fn empty_completion_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = generator(&server).generate(request()).await.unwrap_err();
        assert!(matches!(err, StoryError::EmptyStory));
    }

    #[tokio::test]
    async fn api_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = generator(&server).generate(request()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "story api returned HTTP 401: Incorrect API key provided"
        );
    }

    #[tokio::test]
    async fn rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("TITLE: Two\n---\nSecond try.")),
            )
            .mount(&server)
            .await;

        let story = generator(&server).generate(request()).await.unwrap();
        assert_eq!(story.title, "Two");
    }
}
