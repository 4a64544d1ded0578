//! OpenAI Chat Completions provider.
//!
//! Also works against OpenAI-compatible endpoints (vLLM, Ollama, Together)
//! by pointing [`ProviderConfig::base_url`] at them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::error::{AiError, Result};
use crate::llm::provider::Provider;
use crate::llm::streaming::{self, ChunkStream};
use crate::llm::transport::Transport;
use crate::llm::types::{ChatRequest, ChatResponse, Usage};

/// Registry name of this provider.
pub const PROVIDER_NAME: &str = "openai";

const CHAT_PATH: &str = "/chat/completions";
const MODELS_PATH: &str = "/models";

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireChatResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireModelList {
    #[serde(default)]
    data: Vec<WireModel>,
}

#[derive(Debug, Deserialize)]
struct WireModel {
    id: String,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// [`Provider`] implementation for the OpenAI API.
#[derive(Debug)]
pub struct OpenAiProvider {
    transport: Transport,
    default_model: String,
    stream_buffer: usize,
    extra_params: BTreeMap<String, Value>,
}

impl OpenAiProvider {
    /// Build a provider from its settings.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::MissingApiKey`] if no key is configured, or
    /// [`AiError::Config`] for other invalid settings.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate(PROVIDER_NAME)?;
        let transport = Transport::new(&config)?;

        tracing::debug!(
            base_url = %transport.base_url(),
            default_model = %config.default_model,
            "openai provider configured"
        );

        Ok(Self {
            transport,
            default_model: config.default_model,
            stream_buffer: config.stream_buffer,
            extra_params: config.extra_params,
        })
    }

    /// Build the JSON body for `/chat/completions`.
    ///
    /// Extra parameters go in first so the core fields always win.
    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body: Map<String, Value> = self
            .extra_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };
        body.insert("model".into(), json!(model));
        body.insert("messages".into(), json!(request.messages));

        if let Some(max_tokens) = request.max_tokens {
            body.insert("max_tokens".into(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            body.insert("temperature".into(), json!(temperature));
        }
        body.insert("stream".into(), json!(stream));

        Value::Object(body)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_request_body(request, false);
        let resp = self
            .transport
            .execute(Method::POST, CHAT_PATH, Some(&body), &CancellationToken::new())
            .await?;

        let text = resp.text().await.map_err(|e| AiError::Decode {
            reason: format!("failed to read response body: {e}"),
        })?;
        parse_chat_response(&text)
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        let body = self.build_request_body(request, true);
        let resp = self
            .transport
            .execute(Method::POST, CHAT_PATH, Some(&body), &cancel)
            .await?;

        Ok(streaming::decode(
            resp.bytes_stream(),
            cancel,
            self.stream_buffer,
        ))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let resp = self
            .transport
            .execute::<Value>(Method::GET, MODELS_PATH, None, &CancellationToken::new())
            .await?;

        let text = resp.text().await.map_err(|e| AiError::Decode {
            reason: format!("failed to read response body: {e}"),
        })?;
        let list: WireModelList = serde_json::from_str(&text).map_err(|e| AiError::Decode {
            reason: format!("failed to parse model list: {e}"),
        })?;

        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

/// Decode a `/chat/completions` body into a [`ChatResponse`].
fn parse_chat_response(text: &str) -> Result<ChatResponse> {
    let wire: WireChatResponse = serde_json::from_str(text).map_err(|e| AiError::Decode {
        reason: format!("failed to parse response: {e}"),
    })?;

    let choice = wire.choices.into_iter().next().ok_or_else(|| AiError::Decode {
        reason: "response contained no choices".into(),
    })?;

    let created = wire
        .created
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    Ok(ChatResponse {
        id: wire.id,
        model: wire.model,
        content: choice.message.content.unwrap_or_default(),
        usage: wire.usage.unwrap_or_default(),
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Message;

    fn provider(config: ProviderConfig) -> OpenAiProvider {
        OpenAiProvider::new(config).unwrap()
    }

    #[test]
    fn new_requires_api_key() {
        let err = OpenAiProvider::new(ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, AiError::MissingApiKey { .. }));
    }

    #[test]
    fn body_applies_default_model_and_stream_flag() {
        let p = provider(ProviderConfig::new("sk-test"));
        let request = ChatRequest::new(vec![Message::system("Be brief."), Message::user("Hi")]);

        let body = p.build_request_body(&request, false);
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["stream"], false);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "Hi");

        let streamed = p.build_request_body(&request, true);
        assert_eq!(streamed["stream"], true);
    }

    #[test]
    fn body_carries_optional_fields() {
        let p = provider(ProviderConfig::new("sk-test"));
        let request = ChatRequest::new(vec![Message::user("Hi")])
            .with_model("gpt-4")
            .with_max_tokens(50)
            .with_temperature(0.5);

        let body = p.build_request_body(&request, false);
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 50);
        let temp = body["temperature"].as_f64().unwrap();
        assert!((temp - 0.5).abs() < 1e-6);
    }

    #[test]
    fn extra_params_merged_below_core_fields() {
        let mut config = ProviderConfig::new("sk-test");
        config.extra_params.insert("user".into(), json!("alice"));
        config.extra_params.insert("model".into(), json!("ignored"));
        config.extra_params.insert("stream".into(), json!(true));
        let p = provider(config);

        let body = p.build_request_body(&ChatRequest::new(vec![Message::user("Hi")]), false);
        assert_eq!(body["user"], "alice");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn parse_response_takes_first_choice() {
        let resp = parse_chat_response(
            r#"{"id":"abc","model":"gpt-4","created":1700000000,
                "choices":[{"message":{"role":"assistant","content":"Hello!"}},
                           {"message":{"role":"assistant","content":"Other"}}],
                "usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
        )
        .unwrap();

        assert_eq!(resp.id, "abc");
        assert_eq!(resp.model, "gpt-4");
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.usage.total_tokens, 5);
        assert_eq!(resp.created.timestamp(), 1_700_000_000);
    }

    #[test]
    fn parse_response_without_choices_is_decode_error() {
        let err = parse_chat_response(r#"{"id":"abc","choices":[]}"#).unwrap_err();
        assert!(matches!(err, AiError::Decode { .. }));
    }

    #[test]
    fn parse_response_tolerates_missing_usage_and_null_content() {
        let resp =
            parse_chat_response(r#"{"id":"abc","choices":[{"message":{"content":null}}]}"#)
                .unwrap();
        assert_eq!(resp.content, "");
        assert_eq!(resp.usage, Usage::default());
    }

    #[test]
    fn parse_response_fills_partial_usage() {
        let resp = parse_chat_response(
            r#"{"id":"abc","choices":[{"message":{"content":"hello"}}],
                "usage":{"total_tokens":2}}"#,
        )
        .unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.usage.total_tokens, 2);
        assert_eq!(resp.usage.prompt_tokens, 0);
        assert_eq!(resp.usage.completion_tokens, 0);
    }

    #[test]
    fn parse_response_accepts_null_usage() {
        let resp = parse_chat_response(
            r#"{"id":"abc","choices":[{"message":{"content":"hello"}}],"usage":null}"#,
        )
        .unwrap();
        assert_eq!(resp.content, "hello");
        assert_eq!(resp.usage, Usage::default());
    }

    #[test]
    fn parse_malformed_body_is_decode_error() {
        assert!(matches!(
            parse_chat_response("not json"),
            Err(AiError::Decode { .. })
        ));
    }
}
