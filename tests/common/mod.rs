//! In-process mock HTTP server and a sleeper that only counts.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::Router;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;
use video_processor::llm::{ChatClient, ClientConfig, Sleeper};

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    content_type: &'static str,
    body: String,
}

/// Serves scripted replies in order and records every request.
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    pub fn json(self, status: u16, body: &str) -> Self {
        self.push(status, "application/json", body)
    }

    pub fn sse(self, events: &[&str]) -> Self {
        let body: String = events
            .iter()
            .map(|data| format!("data: {}\n\n", data))
            .collect();
        self.push(200, "text/event-stream", &body)
    }

    fn push(self, status: u16, content_type: &'static str, body: &str) -> Self {
        self.replies.lock().unwrap().push_back(Reply {
            status,
            content_type,
            body: body.to_string(),
        });
        self
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    /// Start serving on an ephemeral port and return the base URL.
    pub async fn start(&self) -> String {
        let router = Router::new().fallback(respond).with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

async fn respond(
    State(mock): State<MockServer>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    mock.requests.lock().unwrap().push(Recorded {
        path: uri.path().to_string(),
        headers,
        body: serde_json::from_str(&body).unwrap_or(Value::Null),
    });

    let reply = mock.replies.lock().unwrap().pop_front().unwrap_or(Reply {
        status: 500,
        content_type: "text/plain",
        body: "no scripted reply left".to_string(),
    });
    (
        StatusCode::from_u16(reply.status).unwrap(),
        [(header::CONTENT_TYPE, reply.content_type)],
        reply.body,
    )
}

/// Records backoff waits without sleeping.
#[derive(Debug, Default)]
pub struct CountingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl CountingSleeper {
    pub fn waits(&self) -> usize {
        self.delays.lock().unwrap().len()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for CountingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}

/// Client config pointing every backend at `base`.
pub fn config_for(base: &str) -> ClientConfig {
    ClientConfig {
        local_url: base.to_string(),
        anthropic_api_key: Some("test-anthropic-key".to_string()),
        anthropic_base_url: base.to_string(),
        openai_api_key: Some("sk-test".to_string()),
        openai_base_url: format!("{}/v1", base),
        request_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    }
}

pub fn client(config: ClientConfig, sleeper: Arc<CountingSleeper>) -> ChatClient {
    ChatClient::with_sleeper(Arc::new(config), sleeper).unwrap()
}

/// Collects formatted log lines while installed as the default subscriber.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Install for the current thread until the guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
