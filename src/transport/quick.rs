//! Quick-chat transports.
//!
//! A quick chat is one request carrying the whole history and a streamed
//! plain-text reply. Two bindings exist:
//!
//! - [`ProviderQuickChat`] calls the provider API directly (Anthropic
//!   messages API for Claude, an OpenAI-compatible chat completions API for
//!   Codex) and publishes the reply on the global quick-chat bus topics.
//! - [`HttpQuickChat`] posts to a chat server that relays the reply as
//!   `data: <chunk>` frames ending with `data: [DONE]`.
//!
//! Both end every reply with exactly one [`QuickEvent::Done`].

use super::bus::{BusEvent, EventBus};
use super::credentials::ProviderCredentials;
use crate::model::{SourceCli, TransportError};
use crate::reducer::quick::{QuickMessage, QuickRequest};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// `anthropic-version` header sent with every Anthropic request.
pub(crate) const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 16_384;

const DONE_SENTINEL: &str = "[DONE]";
const ERROR_PREFIX: &str = "[ERROR]";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP client shared by the provider calls: bounded connect and overall
/// request time so an unreachable endpoint cannot hang a reply.
pub(crate) fn http_client() -> Result<reqwest::Client, TransportError> {
    client_with_timeouts(CONNECT_TIMEOUT, REQUEST_TIMEOUT)
}

fn client_with_timeouts(
    connect: Duration,
    request: Duration,
) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .connect_timeout(connect)
        .timeout(request)
        .build()
        .map_err(|err| TransportError::Http(format!("Failed to build HTTP client: {err}")))
}

// ===== QuickEvent =====

/// One event of a quick-chat reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickEvent {
    /// Next piece of reply text.
    Chunk(String),
    /// The request failed; a `Done { success: false }` follows.
    Error(String),
    /// Reply ended. Last event of a reply.
    Done {
        /// Whether the reply ran to completion.
        success: bool,
    },
}

// ===== QuickBinding =====

/// A reply in flight.
#[derive(Debug)]
pub struct QuickBinding {
    events: mpsc::UnboundedReceiver<QuickEvent>,
    cancel: CancellationToken,
}

impl QuickBinding {
    /// Wrap the event stream of one request and its cancel token.
    pub fn new(events: mpsc::UnboundedReceiver<QuickEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Next event, or `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<QuickEvent> {
        self.events.recv().await
    }

    /// Abort the request. The reply still ends with `Done { success: false }`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

// ===== QuickChatTransport =====

/// Sends a quick-chat request and streams back its reply.
#[async_trait]
pub trait QuickChatTransport: Send + Sync {
    /// Start a request. Errors here mean nothing was sent.
    async fn send(&self, request: QuickRequest) -> Result<QuickBinding, TransportError>;
}

// ===== SSE dialects =====

/// What one SSE `data` payload means for the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseOutcome {
    Text(String),
    Error(String),
    Done,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Anthropic,
    OpenAi,
    /// Chat server relay: raw text chunks, `[DONE]`, `[ERROR] text`.
    Relay,
}

impl Dialect {
    pub(crate) fn interpret(self, data: &str) -> SseOutcome {
        match self {
            Dialect::Anthropic => anthropic_outcome(data),
            Dialect::OpenAi => openai_outcome(data),
            Dialect::Relay => relay_outcome(data),
        }
    }
}

fn anthropic_outcome(data: &str) -> SseOutcome {
    let Some(value) = parse_payload(data) else {
        return SseOutcome::Skip;
    };
    match value.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => value
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(|text| SseOutcome::Text(text.to_string()))
            .unwrap_or(SseOutcome::Skip),
        Some("error") => SseOutcome::Error(api_error_message(&value)),
        Some("message_stop") => SseOutcome::Done,
        _ => SseOutcome::Skip,
    }
}

fn openai_outcome(data: &str) -> SseOutcome {
    if data.trim() == DONE_SENTINEL {
        return SseOutcome::Done;
    }
    let Some(value) = parse_payload(data) else {
        return SseOutcome::Skip;
    };
    if value.get("error").is_some() {
        return SseOutcome::Error(api_error_message(&value));
    }
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(|text| SseOutcome::Text(text.to_string()))
        .unwrap_or(SseOutcome::Skip)
}

fn relay_outcome(data: &str) -> SseOutcome {
    if data.trim() == DONE_SENTINEL {
        return SseOutcome::Done;
    }
    if let Some(error) = data.strip_prefix(ERROR_PREFIX) {
        return SseOutcome::Error(error.trim().to_string());
    }
    if data.is_empty() {
        SseOutcome::Skip
    } else {
        SseOutcome::Text(data.to_string())
    }
}

fn parse_payload(data: &str) -> Option<Value> {
    match serde_json::from_str(data.trim()) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(error = %err, "Skipping unparseable SSE payload");
            None
        }
    }
}

fn api_error_message(value: &Value) -> String {
    value
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

// ===== Streaming =====

/// Drive one HTTP request to its end, emitting reply events.
///
/// Exactly one `Done` is emitted, whatever happens.
async fn stream_reply<F>(
    request: reqwest::RequestBuilder,
    dialect: Dialect,
    cancel: CancellationToken,
    emit: F,
) where
    F: Fn(QuickEvent),
{
    let outcome = tokio::select! {
        _ = cancel.cancelled() => None,
        result = pump(request, dialect, &emit) => Some(result),
    };
    let success = match outcome {
        None => {
            info!("Quick chat request cancelled");
            false
        }
        Some(Ok(())) => true,
        Some(Err(error)) => {
            warn!(error = %error, "Quick chat request failed");
            emit(QuickEvent::Error(error));
            false
        }
    };
    emit(QuickEvent::Done { success });
}

async fn pump<F>(request: reqwest::RequestBuilder, dialect: Dialect, emit: &F) -> Result<(), String>
where
    F: Fn(QuickEvent),
{
    let response = request
        .send()
        .await
        .map_err(|err| TransportError::from(err).to_string())?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Api {
            status: status.as_u16(),
            body,
        }
        .to_string());
    }

    let mut events = response.bytes_stream().eventsource();
    while let Some(event) = events.next().await {
        let event = event.map_err(|err| format!("Stream error: {}", err))?;
        match dialect.interpret(&event.data) {
            SseOutcome::Text(text) => emit(QuickEvent::Chunk(text)),
            SseOutcome::Error(error) => return Err(error),
            SseOutcome::Done => return Ok(()),
            SseOutcome::Skip => {}
        }
    }
    Ok(())
}

// ===== ProviderQuickChat =====

#[derive(Serialize)]
struct AnthropicBody<'a> {
    model: &'a str,
    max_tokens: u32,
    stream: bool,
    messages: &'a [QuickMessage],
}

#[derive(Serialize)]
struct OpenAiBody<'a> {
    model: &'a str,
    stream: bool,
    messages: &'a [QuickMessage],
}

/// Quick chat straight against the provider API, relayed through the
/// global quick-chat topics of an [`EventBus`].
pub struct ProviderQuickChat {
    bus: Arc<EventBus>,
    client: reqwest::Client,
    credentials: ProviderCredentials,
}

impl ProviderQuickChat {
    /// Binding publishing on `bus` and authenticating with `credentials`.
    pub fn new(bus: Arc<EventBus>, credentials: ProviderCredentials) -> Result<Self, TransportError> {
        Ok(Self {
            bus,
            client: http_client()?,
            credentials,
        })
    }

    /// Build the provider request for `request.source`.
    fn build_request(
        &self,
        request: &QuickRequest,
    ) -> Result<(reqwest::RequestBuilder, Dialect), TransportError> {
        match request.source {
            SourceCli::Claude => {
                let key = self
                    .credentials
                    .anthropic_api_key
                    .as_deref()
                    .ok_or(TransportError::MissingCredentials("ANTHROPIC_API_KEY"))?;
                let url = format!(
                    "{}/v1/messages",
                    self.credentials.anthropic_base_url.trim_end_matches('/')
                );
                let body = AnthropicBody {
                    model: &request.model,
                    max_tokens: ANTHROPIC_MAX_TOKENS,
                    stream: true,
                    messages: &request.messages,
                };
                let builder = self
                    .client
                    .post(url)
                    .header("x-api-key", key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body);
                Ok((builder, Dialect::Anthropic))
            }
            SourceCli::Codex => {
                let key = self
                    .credentials
                    .openai_api_key
                    .as_deref()
                    .ok_or(TransportError::MissingCredentials("OPENAI_API_KEY"))?;
                let url = format!(
                    "{}/v1/chat/completions",
                    self.credentials.openai_base_url.trim_end_matches('/')
                );
                let body = OpenAiBody {
                    model: &request.model,
                    stream: true,
                    messages: &request.messages,
                };
                let builder = self.client.post(url).bearer_auth(key).json(&body);
                Ok((builder, Dialect::OpenAi))
            }
        }
    }
}

#[async_trait]
impl QuickChatTransport for ProviderQuickChat {
    async fn send(&self, request: QuickRequest) -> Result<QuickBinding, TransportError> {
        let (builder, dialect) = self.build_request(&request)?;
        info!(
            source = %request.source,
            model = %request.model,
            turns = request.messages.len(),
            "Starting provider quick chat"
        );

        // A fresh generation retires whatever an earlier, cancelled request
        // still publishes.
        let subscription = self.bus.subscribe_quick();
        let generation = subscription.generation;
        let cancel = CancellationToken::new();
        let bus = Arc::clone(&self.bus);
        let token = cancel.clone();
        tokio::spawn(async move {
            stream_reply(builder, dialect, token, |event| {
                bus.publish(BusEvent::Quick { generation, event });
            })
            .await;
        });

        Ok(QuickBinding::new(subscription.events, cancel))
    }
}

// ===== HttpQuickChat =====

/// Quick chat through a chat server's streaming endpoint.
pub struct HttpQuickChat {
    url: String,
    client: reqwest::Client,
}

impl HttpQuickChat {
    /// Binding posting to the chat server endpoint `url`.
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        Ok(Self {
            url: url.into(),
            client: http_client()?,
        })
    }

    /// The endpoint requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QuickChatTransport for HttpQuickChat {
    async fn send(&self, request: QuickRequest) -> Result<QuickBinding, TransportError> {
        info!(url = %self.url, model = %request.model, "Starting relayed quick chat");
        let builder = self.client.post(&self.url).json(&request);

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            stream_reply(builder, Dialect::Relay, token, |event| {
                let _ = tx.send(event);
            })
            .await;
        });

        Ok(QuickBinding::new(rx, cancel))
    }
}

// ===== Tests =====
