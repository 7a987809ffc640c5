//! Anthropic backend.
//!
//! Requests start on the legacy Text Completions protocol. Models that have
//! been retired from it answer with an error naming the Messages API, and the
//! request is re-issued there. Both protocols are consumed as SSE streams.

use super::sse::{for_each_event, SseEvent};
use super::wire::Message;
use super::{
    run_with_retry, Backend, BackendError, BackendErrorKind, ChatBackend, ChatRequest, ChatResult,
    ClientConfig, ErrorDetail, Sleeper, TruncationCause,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

const BACKEND: Backend = Backend::Anthropic;

/// Substring of the error returned when a model only speaks the Messages API.
pub const MESSAGES_API_HINT: &str = "Please use the Messages API instead";

const API_VERSION: &str = "2023-06-01";
const STOP_MAX_TOKENS: &str = "max_tokens";

/// Wire protocol currently in use for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Legacy,
    Messages,
}

impl Protocol {
    fn path(&self) -> &'static str {
        match self {
            Protocol::Legacy => "v1/complete",
            Protocol::Messages => "v1/messages",
        }
    }

    /// The protocol to retry on after `err`, if any.
    fn fallback(&self, err: &BackendError) -> Option<Protocol> {
        match self {
            Protocol::Legacy if err.message.contains(MESSAGES_API_HINT) => Some(Protocol::Messages),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    prompt: String,
    temperature: f32,
    max_tokens_to_sample: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Stream payloads, keyed by their `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    Completion {
        #[serde(default)]
        completion: String,
        #[serde(default)]
        stop_reason: Option<String>,
    },
    ContentBlockDelta {
        delta: BlockDelta,
    },
    MessageDelta {
        delta: MessageDeltaBody,
    },
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Collects text and the stop reason from one stream.
#[derive(Debug, Default)]
struct StreamAccumulator {
    text: String,
    stop_reason: Option<String>,
}

impl StreamAccumulator {
    fn handle(&mut self, event: &SseEvent, model: &str) -> Result<(), BackendError> {
        let parsed: StreamEvent =
            serde_json::from_str(&event.data).map_err(|e| BackendError::malformed(BACKEND, e))?;

        match parsed {
            StreamEvent::Completion {
                completion,
                stop_reason,
            } => {
                self.text.push_str(&completion);
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
            }
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::TextDelta { text },
            } => self.text.push_str(&text),
            StreamEvent::MessageDelta { delta } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
            }
            StreamEvent::Error { error } => return Err(stream_error(&error, model)),
            StreamEvent::ContentBlockDelta { .. } | StreamEvent::Other => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<ChatResult, BackendError> {
        match self.stop_reason.as_deref() {
            None => Err(BackendError::malformed(
                BACKEND,
                "stream ended without a stop reason",
            )),
            Some(STOP_MAX_TOKENS) => Ok(ChatResult::truncated_by(
                self.text,
                TruncationCause::OutputTokens,
            )),
            Some(reason) => {
                debug!("Stop reason: {}", reason);
                Ok(ChatResult::complete(self.text))
            }
        }
    }
}

/// Map an `error` event received mid-stream.
fn stream_error(error: &StreamError, model: &str) -> BackendError {
    let detail = format!("{} ({})", error.message, error.kind);
    match error.kind.as_str() {
        "authentication_error" | "permission_error" => BackendError::new(
            BackendErrorKind::Unauthenticated,
            format!("{} rejected the credential: {}", BACKEND.label(), detail),
        ),
        "rate_limit_error" => BackendError::new(
            BackendErrorKind::RateLimited,
            format!("{} rate limit or quota exceeded: {}", BACKEND.label(), detail),
        ),
        "not_found_error" => BackendError::new(
            BackendErrorKind::ModelNotFound,
            format!("Model '{}' not found on {}: {}", model, BACKEND.label(), detail),
        ),
        "invalid_request_error" => BackendError::new(
            BackendErrorKind::InvalidRequest,
            format!("{} rejected the request: {}", BACKEND.label(), detail),
        ),
        "overloaded_error" | "api_error" => BackendError::server(BACKEND, detail).transient(),
        _ => BackendError::server(BACKEND, detail),
    }
}

pub struct AnthropicBackend {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    sleeper: Arc<dyn Sleeper>,
}

impl AnthropicBackend {
    pub fn new(http: reqwest::Client, config: Arc<ClientConfig>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            http,
            config,
            sleeper,
        }
    }

    fn endpoint(&self, protocol: Protocol) -> String {
        format!(
            "{}/{}",
            self.config.anthropic_base_url.trim_end_matches('/'),
            protocol.path()
        )
    }

    async fn attempt(
        &self,
        protocol: Protocol,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<ChatResult, BackendError> {
        let builder = self
            .http
            .post(self.endpoint(protocol))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION);

        let builder = match protocol {
            Protocol::Legacy => builder.json(&CompletionBody {
                model: request.model(),
                prompt: format!("\n\nHuman: {}\n\nAssistant:", request.prompt()),
                temperature: request.temperature(),
                max_tokens_to_sample: request.max_output_tokens(),
                stream: true,
            }),
            Protocol::Messages => builder.json(&MessagesBody {
                model: request.model(),
                messages: vec![Message::user(request.prompt())],
                temperature: request.temperature(),
                max_tokens: request.max_output_tokens(),
                stream: true,
            }),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::from_transport(BACKEND, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = ErrorDetail::parse(&body);
            return Err(BackendError::from_status(
                BACKEND,
                status.as_u16(),
                &detail.message,
                request.model(),
            ));
        }

        let mut acc = StreamAccumulator::default();
        for_each_event(BACKEND, response, |event| acc.handle(&event, request.model())).await?;
        acc.finish()
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    #[instrument(skip(self, request))]
    async fn send(&self, request: &ChatRequest) -> Result<ChatResult, BackendError> {
        let api_key = self
            .config
            .anthropic_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| BackendError::credential_missing(BACKEND, "ANTHROPIC_API_KEY"))?;

        let mut protocol = Protocol::Legacy;
        loop {
            debug!("Using {:?} protocol", protocol);
            let outcome = run_with_retry(&self.config.anthropic_retry, self.sleeper.as_ref(), |_| {
                self.attempt(protocol, api_key, request)
            })
            .await;

            match outcome {
                Ok(result) => return Ok(result),
                Err(err) => match protocol.fallback(&err) {
                    Some(next) => {
                        info!(
                            "Model {} requires the Messages API, retrying with it",
                            request.model()
                        );
                        protocol = next;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event: None,
            data: data.to_string(),
        }
    }

    fn feed(events: &[&str]) -> Result<ChatResult, BackendError> {
        let mut acc = StreamAccumulator::default();
        for data in events {
            acc.handle(&event(data), "claude-test")?;
        }
        acc.finish()
    }

    #[test]
    fn test_legacy_stream_with_token_limit() {
        let result = feed(&[
            r#"{"type":"completion","completion":" Hello","stop_reason":null}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"completion","completion":" world","stop_reason":"max_tokens"}"#,
        ])
        .unwrap();
        assert_eq!(result.text(), " Hello world");
        assert!(result.truncated());
        assert_eq!(result.cause(), Some(TruncationCause::OutputTokens));
    }

    #[test]
    fn test_legacy_stream_natural_stop() {
        let result = feed(&[
            r#"{"type":"completion","completion":"Done.","stop_reason":"stop_sequence"}"#,
        ])
        .unwrap();
        assert!(!result.truncated());
    }

    #[test]
    fn test_messages_stream() {
        let result = feed(&[
            r#"{"type":"message_start","message":{"id":"msg_1","content":[]}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r##"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"# Sum"}}"##,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"mary"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":3}}"#,
            r#"{"type":"message_stop"}"#,
        ])
        .unwrap();
        assert_eq!(result.text(), "# Summary");
        assert!(!result.truncated());
    }

    #[test]
    fn test_messages_stream_truncated() {
        let result = feed(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"partial"}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"max_tokens"}}"#,
        ])
        .unwrap();
        assert!(result.truncated());
        assert_eq!(result.text(), "partial");
    }

    #[test]
    fn test_stream_without_stop_reason_is_malformed() {
        let err = feed(&[r#"{"type":"completion","completion":"cut"}"#]).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::MalformedResponse);
    }

    #[test]
    fn test_stream_error_events() {
        let err = feed(&[r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#])
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::ServerError);
        assert!(err.is_transient());

        let err = feed(&[r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#])
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::RateLimited);

        let err = feed(&[r#"{"type":"error","error":{"type":"not_found_error","message":"model"}}"#])
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::ModelNotFound);
        assert!(err.message.contains("claude-test"));
    }

    #[test]
    fn test_fallback_only_from_legacy_on_hint() {
        let hint = BackendError::from_status(
            BACKEND,
            400,
            "\"claude-3-opus\" is not supported on this API. Please use the Messages API instead.",
            "claude-3-opus",
        );
        assert_eq!(Protocol::Legacy.fallback(&hint), Some(Protocol::Messages));
        assert_eq!(Protocol::Messages.fallback(&hint), None);

        let other = BackendError::from_status(BACKEND, 400, "prompt too long", "m");
        assert_eq!(Protocol::Legacy.fallback(&other), None);
    }
}
