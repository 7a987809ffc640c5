//! Local OpenAI-compatible server (Ollama).

use super::wire::{ChatCompletion, ChatCompletionRequest, Message};
use super::{
    run_with_retry, Backend, BackendError, BackendErrorKind, ChatBackend, ChatRequest, ChatResult,
    ClientConfig, ErrorDetail, Sleeper,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

const BACKEND: Backend = Backend::LocalServer;

pub struct LocalServerBackend {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    sleeper: Arc<dyn Sleeper>,
}

impl LocalServerBackend {
    pub fn new(http: reqwest::Client, config: Arc<ClientConfig>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            http,
            config,
            sleeper,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.local_url.trim_end_matches('/')
        )
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<ChatResult, BackendError> {
        let body = ChatCompletionRequest {
            model: request.model(),
            messages: vec![Message::user(request.prompt())],
            temperature: Some(request.temperature()),
            max_tokens: None,
            max_completion_tokens: None,
        };

        let response = self
            .http
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(BACKEND, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::interrupted(BACKEND, e))?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text, request.model()));
        }
        parse_completion(&text)
    }
}

#[async_trait]
impl ChatBackend for LocalServerBackend {
    #[instrument(skip(self, request), fields(url = %self.config.local_url))]
    async fn send(&self, request: &ChatRequest) -> Result<ChatResult, BackendError> {
        debug!("Sending {} chars to local server", request.prompt().len());
        run_with_retry(&self.config.local_retry, self.sleeper.as_ref(), |_| {
            self.attempt(request)
        })
        .await
    }
}

/// Map a failed response, adding the pull hint for missing models.
fn classify_failure(status: u16, body: &str, model: &str) -> BackendError {
    let detail = ErrorDetail::parse(body);
    if status == 404 || detail.is_model_not_found() {
        return BackendError::new(
            BackendErrorKind::ModelNotFound,
            format!(
                "Model '{}' not found on {}: {}\nPull it first:\n  ollama pull {}",
                model,
                BACKEND.label(),
                detail.message,
                model
            ),
        )
        .with_status(status);
    }
    BackendError::from_status(BACKEND, status, &detail.message, model)
}

/// Extract the text; the local server's finish reason is not trusted.
fn parse_completion(body: &str) -> Result<ChatResult, BackendError> {
    let completion: ChatCompletion =
        serde_json::from_str(body).map_err(|e| BackendError::malformed(BACKEND, e))?;
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::malformed(BACKEND, "no choices in response"))?;
    let content = choice
        .message
        .content
        .ok_or_else(|| BackendError::malformed(BACKEND, "missing message content"))?;
    Ok(ChatResult::unsignalled(content))
}
