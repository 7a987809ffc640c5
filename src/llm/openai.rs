//! OpenAI backend: Responses API for the models that require it, Chat
//! Completions for everything else.

use super::wire::{ChatCompletion, ChatCompletionRequest, Message};
use super::{
    run_with_retry, Backend, BackendError, ChatBackend, ChatRequest, ChatResult, ClientConfig,
    ErrorDetail, Sleeper, TruncationCause,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const BACKEND: Backend = Backend::OpenAi;

const RESPONSES_PREFIXES: &[&str] = &["gpt-5", "o1-pro", "o3-pro", "codex-"];

/// Whether `model` is only served by the Responses API.
pub fn uses_responses_api(model: &str) -> bool {
    RESPONSES_PREFIXES.iter().any(|p| model.starts_with(p))
}

/// Whether `model` spends hidden reasoning tokens and rejects `temperature`.
///
/// Covers the `o<digit>` series plus the gpt-5 and codex families.
pub fn is_reasoning_model(model: &str) -> bool {
    let mut chars = model.chars();
    let o_series = chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit());
    o_series || model.starts_with("gpt-5") || model.starts_with("codex-")
}

fn truncation_cause(reasoning_tokens: u64) -> TruncationCause {
    if reasoning_tokens > 0 {
        TruncationCause::ReasoningTokens
    } else {
        TruncationCause::OutputTokens
    }
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    output_tokens_details: Option<OutputTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct OutputTokensDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

/// Build a result from a Chat Completions body.
fn parse_chat(body: &str) -> Result<ChatResult, BackendError> {
    let completion: ChatCompletion =
        serde_json::from_str(body).map_err(|e| BackendError::malformed(BACKEND, e))?;
    let reasoning_tokens = completion.reasoning_tokens();
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::malformed(BACKEND, "no choices in response"))?;
    let text = choice.message.content.unwrap_or_default();

    if choice.finish_reason.as_deref() == Some("length") {
        let cause = truncation_cause(reasoning_tokens);
        warn!(
            "Completion stopped at the token limit: {} ({} reasoning tokens)",
            cause, reasoning_tokens
        );
        Ok(ChatResult::truncated_by(text, cause))
    } else {
        Ok(ChatResult::complete(text))
    }
}

/// Build a result from a Responses API body.
fn parse_responses(body: &str) -> Result<ChatResult, BackendError> {
    let reply: ResponsesReply =
        serde_json::from_str(body).map_err(|e| BackendError::malformed(BACKEND, e))?;

    let text: String = reply
        .output
        .iter()
        .filter_map(|item| match item {
            OutputItem::Message { content } => Some(content),
            OutputItem::Other => None,
        })
        .flatten()
        .filter_map(|part| match part {
            ContentPart::OutputText { text } => Some(text.as_str()),
            ContentPart::Other => None,
        })
        .collect();

    let incomplete =
        reply.status.as_deref() == Some("incomplete") || reply.incomplete_details.is_some();
    if !incomplete {
        return Ok(ChatResult::complete(text));
    }

    let reasoning_tokens = reply
        .usage
        .as_ref()
        .and_then(|u| u.output_tokens_details.as_ref())
        .map(|d| d.reasoning_tokens)
        .unwrap_or(0);
    let cause = truncation_cause(reasoning_tokens);
    warn!(
        "Response incomplete ({}): {} ({} reasoning tokens)",
        reply
            .incomplete_details
            .and_then(|d| d.reason)
            .unwrap_or_else(|| "no reason given".to_string()),
        cause,
        reasoning_tokens
    );
    Ok(ChatResult::truncated_by(text, cause))
}

pub struct OpenAiBackend {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    sleeper: Arc<dyn Sleeper>,
}

impl OpenAiBackend {
    pub fn new(http: reqwest::Client, config: Arc<ClientConfig>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            http,
            config,
            sleeper,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.openai_base_url.trim_end_matches('/'), path)
    }

    /// Temperature to send, or `None` for models that reject it.
    fn temperature_for(request: &ChatRequest) -> Option<f32> {
        if !is_reasoning_model(request.model()) {
            return Some(request.temperature());
        }
        if request.temperature() > 0.0 {
            warn!(
                "Model {} does not accept a temperature; ignoring {}",
                request.model(),
                request.temperature()
            );
        }
        None
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        api_key: &str,
        body: &B,
        model: &str,
    ) -> Result<String, BackendError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(BACKEND, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::interrupted(BACKEND, e))?;

        if !status.is_success() {
            let detail = ErrorDetail::parse(&text);
            return Err(BackendError::from_status(
                BACKEND,
                status.as_u16(),
                &detail.message,
                model,
            ));
        }
        Ok(text)
    }

    async fn send_responses(
        &self,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<ChatResult, BackendError> {
        let body = ResponsesRequest {
            model: request.model(),
            input: request.prompt(),
            max_output_tokens: request.max_output_tokens(),
            temperature: Self::temperature_for(request),
        };
        let text = self
            .post("responses", api_key, &body, request.model())
            .await?;
        parse_responses(&text)
    }

    async fn send_chat(
        &self,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<ChatResult, BackendError> {
        let reasoning = is_reasoning_model(request.model());
        let body = ChatCompletionRequest {
            model: request.model(),
            messages: vec![Message::user(request.prompt())],
            temperature: Self::temperature_for(request),
            max_tokens: (!reasoning).then_some(request.max_output_tokens()),
            max_completion_tokens: reasoning.then_some(request.max_output_tokens()),
        };
        let text = self
            .post("chat/completions", api_key, &body, request.model())
            .await?;
        parse_chat(&text)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    #[instrument(skip(self, request))]
    async fn send(&self, request: &ChatRequest) -> Result<ChatResult, BackendError> {
        let api_key = self
            .config
            .openai_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| BackendError::credential_missing(BACKEND, "OPENAI_API_KEY"))?;

        let responses = uses_responses_api(request.model());
        if responses {
            info!("Using the Responses API for {}", request.model());
        } else {
            debug!("Using Chat Completions for {}", request.model());
        }

        run_with_retry(&self.config.openai_retry, self.sleeper.as_ref(), |_| async move {
            if responses {
                self.send_responses(api_key, request).await
            } else {
                self.send_chat(api_key, request).await
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::log_capture::CapturedLogs;
    use crate::llm::BackendErrorKind;

    fn logged_while<T>(f: impl FnOnce() -> T) -> (T, String) {
        let logs = CapturedLogs::default();
        let value = tracing::subscriber::with_default(logs.subscriber(), f);
        (value, logs.contents())
    }

    #[test]
    fn test_truncation_cause_is_logged() {
        let (result, logs) = logged_while(|| {
            parse_chat(
                r#"{"choices":[{"message":{"content":"x"},"finish_reason":"length"}],
                    "usage":{"completion_tokens_details":{"reasoning_tokens":0}}}"#,
            )
        });
        assert_eq!(result.unwrap().cause(), Some(TruncationCause::OutputTokens));
        assert!(logs.contains("WARN"), "{}", logs);
        assert!(logs.contains("output token limit reached"), "{}", logs);
        assert!(logs.contains("(0 reasoning tokens)"), "{}", logs);

        let (result, logs) = logged_while(|| {
            parse_chat(
                r#"{"choices":[{"message":{"content":null},"finish_reason":"length"}],
                    "usage":{"completion_tokens_details":{"reasoning_tokens":640}}}"#,
            )
        });
        assert_eq!(result.unwrap().cause(), Some(TruncationCause::ReasoningTokens));
        assert!(logs.contains("token budget exhausted by reasoning tokens"), "{}", logs);
        assert!(logs.contains("640 reasoning tokens"), "{}", logs);
    }

    #[test]
    fn test_incomplete_response_cause_is_logged() {
        let (result, logs) = logged_while(|| {
            parse_responses(
                r#"{"status":"incomplete","incomplete_details":{"reason":"max_output_tokens"},
                    "output":[],"usage":{"output_tokens_details":{"reasoning_tokens":12}}}"#,
            )
        });
        assert_eq!(result.unwrap().cause(), Some(TruncationCause::ReasoningTokens));
        assert!(logs.contains("max_output_tokens"), "{}", logs);
        assert!(logs.contains("token budget exhausted by reasoning tokens"), "{}", logs);
    }

    #[test]
    fn test_complete_reply_logs_no_truncation() {
        let (_, logs) = logged_while(|| {
            parse_chat(r#"{"choices":[{"message":{"content":"x"},"finish_reason":"stop"}]}"#)
        });
        assert!(!logs.contains("token limit"), "{}", logs);
    }

    #[test]
    fn test_model_routing() {
        assert!(uses_responses_api("gpt-5"));
        assert!(uses_responses_api("gpt-5-mini"));
        assert!(uses_responses_api("o3-pro"));
        assert!(uses_responses_api("codex-mini-latest"));
        assert!(!uses_responses_api("gpt-4o"));
        assert!(!uses_responses_api("o3-mini"));
    }

    #[test]
    fn test_reasoning_models() {
        for model in ["o1", "o3-mini", "o4-mini", "gpt-5", "codex-mini-latest"] {
            assert!(is_reasoning_model(model), "{}", model);
        }
        for model in ["gpt-4o", "gpt-4.1", "omni-moderation", "o"] {
            assert!(!is_reasoning_model(model), "{}", model);
        }
    }

    #[test]
    fn test_reasoning_request_omits_temperature() {
        let request = ChatRequest::new("p", "o3-mini", 0.7, 500, Backend::OpenAi).unwrap();
        assert_eq!(OpenAiBackend::temperature_for(&request), None);

        let body = ChatCompletionRequest {
            model: request.model(),
            messages: vec![Message::user(request.prompt())],
            temperature: OpenAiBackend::temperature_for(&request),
            max_tokens: None,
            max_completion_tokens: Some(500),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["max_completion_tokens"], 500);
    }

    #[test]
    fn test_chat_length_without_reasoning() {
        let body = r#"{"choices":[{"message":{"content":"partial"},"finish_reason":"length"}],
            "usage":{"completion_tokens":10,"completion_tokens_details":{"reasoning_tokens":0}}}"#;
        let result = parse_chat(body).unwrap();
        assert!(result.truncated());
        assert_eq!(result.cause(), Some(TruncationCause::OutputTokens));
    }

    #[test]
    fn test_chat_length_with_reasoning() {
        let body = r#"{"choices":[{"message":{"content":null},"finish_reason":"length"}],
            "usage":{"completion_tokens":10,"completion_tokens_details":{"reasoning_tokens":10}}}"#;
        let result = parse_chat(body).unwrap();
        assert_eq!(result.text(), "");
        assert_eq!(result.cause(), Some(TruncationCause::ReasoningTokens));
    }

    #[test]
    fn test_chat_natural_stop() {
        let body = r##"{"choices":[{"message":{"content":"# Summary"},"finish_reason":"stop"}]}"##;
        let result = parse_chat(body).unwrap();
        assert_eq!(result.text(), "# Summary");
        assert!(!result.truncated());
        assert!(result.truncation_signal());
    }

    #[test]
    fn test_responses_concatenates_output_text() {
        let body = r#"{"status":"completed","output":[
            {"type":"reasoning","summary":[]},
            {"type":"message","content":[{"type":"output_text","text":"Hello "},{"type":"refusal","refusal":"x"}]},
            {"type":"message","content":[{"type":"output_text","text":"world"}]}
        ]}"#;
        let result = parse_responses(body).unwrap();
        assert_eq!(result.text(), "Hello world");
        assert!(!result.truncated());
    }

    #[test]
    fn test_responses_incomplete_is_truncated() {
        let body = r#"{"status":"incomplete","incomplete_details":{"reason":"max_output_tokens"},
            "output":[{"type":"message","content":[{"type":"output_text","text":"some text"}]}],
            "usage":{"output_tokens_details":{"reasoning_tokens":0}}}"#;
        let result = parse_responses(body).unwrap();
        assert_eq!(result.text(), "some text");
        assert_eq!(result.cause(), Some(TruncationCause::OutputTokens));

        let body = r#"{"status":"incomplete","output":[],
            "usage":{"output_tokens_details":{"reasoning_tokens":128}}}"#;
        let result = parse_responses(body).unwrap();
        assert_eq!(result.cause(), Some(TruncationCause::ReasoningTokens));
    }

    #[test]
    fn test_malformed_responses() {
        assert_eq!(
            parse_chat("<html>").unwrap_err().kind,
            BackendErrorKind::MalformedResponse
        );
        assert_eq!(
            parse_chat(r#"{"choices":[]}"#).unwrap_err().kind,
            BackendErrorKind::MalformedResponse
        );
        assert_eq!(
            parse_responses("not json").unwrap_err().kind,
            BackendErrorKind::MalformedResponse
        );
    }
}
