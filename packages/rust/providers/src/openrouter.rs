//! OpenAI-compatible chat completions client (OpenRouter by default).

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use siteforge_core::StageFailure;
use siteforge_shared::{OpenRouterConfig, Result, read_api_key};

use crate::http::{build_client, check_status, failure_for_error};

const PROVIDER: &str = "openrouter";
const REFERER: &str = "https://github.com/siteforge/siteforge";
const TITLE: &str = "SiteForge";

/// Sampling parameters sent with every request.
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Client-side request timeout. The stage executor applies its own
    /// per-attempt budget on top of this.
    pub request_timeout: Duration,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.4,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Chat client bound to one endpoint, key, and model.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    params: ChatParams,
}

impl ChatClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        params: ChatParams,
    ) -> Result<Self> {
        Ok(Self {
            http: build_client(params.request_timeout)?,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            params,
        })
    }

    /// Build from `[openrouter]` config, reading the key from its env var.
    /// `model` overrides `default_model` when given.
    pub fn from_config(config: &OpenRouterConfig, model: Option<&str>) -> Result<Self> {
        let api_key = read_api_key(&config.api_key_env, "OpenRouter")?;
        Self::new(
            config.base_url.clone(),
            api_key,
            model.unwrap_or(&config.default_model),
            ChatParams::default(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one system + user exchange and return the assistant's text.
    pub async fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> std::result::Result<String, StageFailure> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            stream: false,
        };

        debug!(provider = PROVIDER, model = %self.model, "sending chat completion");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&body)
            .send()
            .await
            .map_err(|e| failure_for_error(PROVIDER, &e))?;
        let response = check_status(PROVIDER, response).await?;

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            StageFailure::transient(format!("{PROVIDER} response could not be decoded: {e}"))
        })?;

        if let Some(usage) = &parsed.usage {
            debug!(
                provider = PROVIDER,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion finished"
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| StageFailure::transient(format!("{PROVIDER} returned an empty answer")))
    }

    /// Like [`complete`](Self::complete), decoding the answer as JSON into `T`.
    /// Answers that are not valid JSON for `T` are transient failures.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> std::result::Result<T, StageFailure> {
        let text = self.complete(system, user).await?;
        serde_json::from_str(extract_json(&text)).map_err(|e| {
            StageFailure::transient(format!("model answer did not match the expected shape: {e}"))
        })
    }
}

/// Strip Markdown code fences or surrounding prose from a model answer.
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if trimmed.starts_with("```") {
        if let Some(start) = trimmed.find('\n') {
            let after_fence = &trimmed[start + 1..];
            if let Some(end) = after_fence.rfind("```") {
                return after_fence[..end].trim();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    trimmed
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
    response_format: ResponseFormat,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use siteforge_core::FailureClass;

    fn client(server: &wiremock::MockServer) -> ChatClient {
        ChatClient::new(
            format!("{}/chat/completions", server.uri()),
            "sk-test",
            "openai/gpt-4o",
            ChatParams::default(),
        )
        .unwrap()
    }

    fn answer(content: &str) -> serde_json::Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 34 }
        })
    }

    #[derive(Debug, Deserialize)]
    struct Palette {
        primary: String,
    }

    #[test]
    fn extract_json_handles_fences_and_prose() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(extract_json("Sure! {\"a\":1} Hope that helps."), "{\"a\":1}");
        assert_eq!(extract_json("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn complete_json_decodes_answer() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .and(wiremock::matchers::header("authorization", "Bearer sk-test"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(answer("```json\n{\"primary\": \"#112233\"}\n```")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let palette: Palette = client(&server).complete_json("sys", "user").await.unwrap();
        assert_eq!(palette.primary, "#112233");
    }

    #[tokio::test]
    async fn rate_limits_are_transient() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client(&server).complete("sys", "user").await.unwrap_err();
        assert_eq!(err.class, FailureClass::Transient);
        assert!(err.message.contains("slow down"));
    }

    #[tokio::test]
    async fn bad_credentials_are_rejected() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server).complete("sys", "user").await.unwrap_err();
        assert_eq!(err.class, FailureClass::Rejected);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_answers_are_transient() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(answer("not json")))
            .mount(&server)
            .await;

        let err = client(&server)
            .complete_json::<Palette>("sys", "user")
            .await
            .unwrap_err();
        assert_eq!(err.class, FailureClass::Transient);
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(answer("{}"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new(
            format!("{}/chat/completions", server.uri()),
            "sk-test",
            "m",
            ChatParams {
                request_timeout: Duration::from_millis(200),
                ..ChatParams::default()
            },
        )
        .unwrap();
        let err = client.complete("sys", "user").await.unwrap_err();
        assert_eq!(err.class, FailureClass::Timeout);
    }
}
