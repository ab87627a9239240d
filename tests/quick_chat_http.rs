//! Quick chat over HTTP server-sent events.
//!
//! A raw TCP listener plays the provider (or the chat server relay): it
//! captures each request and answers with a canned SSE body.

use asv::client::QuickChatClient;
use asv::model::SourceCli;
use asv::reducer::quick::{QuickChatReducer, QuickRole};
use asv::transport::bus::EventBus;
use asv::transport::credentials::ProviderCredentials;
use asv::transport::models::{builtin_models, list_models};
use asv::transport::quick::{HttpQuickChat, ProviderQuickChat, QuickEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// One captured HTTP request.
#[derive(Debug)]
struct Captured {
    head: String,
    body: serde_json::Value,
}

impl Captured {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

/// Read one request off `stream`.
async fn read_request(stream: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let (head, body) = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(split) = text.find("\r\n\r\n") {
            let head = text[..split].to_string();
            let length: usize = head
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length")
                        .then(|| v.trim().parse().ok())?
                })
                .unwrap_or(0);
            let body = &text[split + 4..];
            if body.len() >= length {
                break (head, body.to_string());
            }
        }
        if n == 0 {
            break (text, String::new());
        }
    };
    Captured {
        head,
        body: serde_json::from_str(&body).unwrap_or(serde_json::Value::Null),
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let content_type = if status.starts_with("200") {
        "text/event-stream"
    } else {
        "application/json"
    };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n{body}"
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.shutdown().await.ok();
}

/// Serve one request with `status` and `body`; returns the base URL and
/// the captured request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = tx.send(read_request(&mut stream).await);
        respond(&mut stream, status, body).await;
    });

    (format!("http://{addr}"), rx)
}

/// Leave the first request without an answer, then answer the second with
/// `body`. The receiver fires once the first request has arrived.
async fn serve_stalled_then(body: &'static str) -> (String, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stalled, _) = listener.accept().await.unwrap();
        let _ = tx.send(read_request(&mut stalled).await);

        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        respond(&mut stream, "200 OK", body).await;

        // Hold the first connection open until the test is over.
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(stalled);
    });

    (format!("http://{addr}"), rx)
}

async fn drain(client: &mut QuickChatClient) -> Vec<QuickEvent> {
    let mut events = Vec::new();
    while let Some(event) = client.next_update().await {
        events.push(event);
    }
    events
}

// ===== Chat server relay =====

#[tokio::test]
async fn relay_streams_chunks_into_history() {
    // GIVEN: A relay answering with two chunks and the done sentinel
    let (base, captured) = serve_once(
        "200 OK",
        "data: Hello\n\ndata: , world\n\ndata: [DONE]\n\n",
    )
    .await;
    let transport = Arc::new(HttpQuickChat::new(format!("{base}/api/quick-chat")).unwrap());
    let mut client = QuickChatClient::new(
        transport,
        QuickChatReducer::new(SourceCli::Claude, "claude-haiku-4-5"),
    );

    // WHEN: A prompt is sent and the reply drained
    client.send("greet me").await.unwrap();
    let events = drain(&mut client).await;

    // THEN: Chunks were applied in order and the reply committed
    assert_eq!(
        events,
        vec![
            QuickEvent::Chunk("Hello".to_string()),
            QuickEvent::Chunk(", world".to_string()),
            QuickEvent::Done { success: true },
        ]
    );
    let history = client.reducer().history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, QuickRole::Assistant);
    assert_eq!(history[1].content, "Hello, world");
    assert!(!client.reducer().is_streaming());
    assert_eq!(client.reducer().last_error(), None);

    // AND: The relay received the full request
    let request = captured.await.unwrap();
    assert_eq!(request.request_line(), "POST /api/quick-chat HTTP/1.1");
    assert_eq!(request.body["source"], "claude");
    assert_eq!(request.body["model"], "claude-haiku-4-5");
    assert_eq!(request.body["messages"][0]["content"], "greet me");
}

#[tokio::test]
async fn relay_error_frame_fails_reply_and_keeps_partial() {
    let (base, _captured) = serve_once(
        "200 OK",
        "data: partial\n\ndata: [ERROR] rate limited\n\n",
    )
    .await;
    let mut client = QuickChatClient::new(
        Arc::new(HttpQuickChat::new(base).unwrap()),
        QuickChatReducer::new(SourceCli::Codex, "gpt-5-mini"),
    );

    client.send("hi").await.unwrap();
    drain(&mut client).await;

    assert_eq!(client.reducer().last_error(), Some("rate limited"));
    let history = client.reducer().history();
    assert_eq!(history.last().map(|m| m.content.as_str()), Some("partial"));
}

// ===== Direct provider =====

#[tokio::test]
async fn anthropic_provider_stream() {
    let (base, captured) = serve_once(
        "200 OK",
        concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \"}}\n\n",
            "event: ping\n",
            "data: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"there\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        ),
    )
    .await;
    let credentials = ProviderCredentials {
        anthropic_api_key: Some("sk-ant-test".to_string()),
        anthropic_base_url: base,
        ..ProviderCredentials::default()
    };
    let transport = Arc::new(ProviderQuickChat::new(Arc::new(EventBus::new()), credentials).unwrap());
    let mut client = QuickChatClient::new(
        transport,
        QuickChatReducer::new(SourceCli::Claude, "claude-haiku-4-5"),
    );

    client.send("hello").await.unwrap();
    let reducer = client.wait_until_finished().await;

    assert_eq!(reducer.history()[1].content, "Hi there");
    assert_eq!(reducer.last_error(), None);

    let request = captured.await.unwrap();
    assert_eq!(request.request_line(), "POST /v1/messages HTTP/1.1");
    assert_eq!(request.header("x-api-key").as_deref(), Some("sk-ant-test"));
    assert_eq!(
        request.header("anthropic-version").as_deref(),
        Some("2023-06-01")
    );
    assert_eq!(request.body["stream"], true);
    assert_eq!(request.body["max_tokens"], 16384);
}

#[tokio::test]
async fn openai_provider_stream() {
    let (base, captured) = serve_once(
        "200 OK",
        concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Sure\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\".\"}}]}\n\n",
            "data: [DONE]\n\n",
        ),
    )
    .await;
    let credentials = ProviderCredentials {
        openai_api_key: Some("sk-test".to_string()),
        openai_base_url: base,
        ..ProviderCredentials::default()
    };
    let transport = Arc::new(ProviderQuickChat::new(Arc::new(EventBus::new()), credentials).unwrap());
    let mut client =
        QuickChatClient::new(transport, QuickChatReducer::new(SourceCli::Codex, "gpt-5-mini"));

    client.send("can you?").await.unwrap();
    let reducer = client.wait_until_finished().await;

    assert_eq!(reducer.history()[1].content, "Sure.");

    let request = captured.await.unwrap();
    assert_eq!(request.request_line(), "POST /v1/chat/completions HTTP/1.1");
    assert_eq!(
        request.header("authorization").as_deref(),
        Some("Bearer sk-test")
    );
    assert_eq!(request.body["model"], "gpt-5-mini");
}

#[tokio::test]
async fn provider_error_status_becomes_last_error() {
    let (base, _captured) = serve_once(
        "401 Unauthorized",
        r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
    )
    .await;
    let credentials = ProviderCredentials {
        anthropic_api_key: Some("bad".to_string()),
        anthropic_base_url: base,
        ..ProviderCredentials::default()
    };
    let transport = Arc::new(ProviderQuickChat::new(Arc::new(EventBus::new()), credentials).unwrap());
    let mut client = QuickChatClient::new(
        transport,
        QuickChatReducer::new(SourceCli::Claude, "claude-haiku-4-5"),
    );

    client.send("hello").await.unwrap();
    let reducer = client.wait_until_finished().await;

    let error = reducer.last_error().expect("error recorded");
    assert!(error.contains("401"), "got: {error}");
    assert!(error.contains("invalid x-api-key"), "got: {error}");
    // Only the prompt: no partial reply to keep
    assert_eq!(reducer.history().len(), 1);
}

#[tokio::test]
async fn missing_api_key_fails_before_any_request() {
    let transport = Arc::new(
        ProviderQuickChat::new(Arc::new(EventBus::new()), ProviderCredentials::default()).unwrap(),
    );
    let mut client = QuickChatClient::new(
        transport,
        QuickChatReducer::new(SourceCli::Codex, "gpt-5-mini"),
    );

    let result = client.send("hello").await;

    assert!(result.is_err());
    assert!(client
        .reducer()
        .last_error()
        .is_some_and(|e| e.contains("OPENAI_API_KEY")));
    assert!(!client.reducer().is_streaming());
}

#[tokio::test]
async fn cancelled_request_does_not_end_the_next_reply() {
    // GIVEN: A provider that never answers the first request and streams
    // "second" for the next one
    let (base, first_arrived) = serve_stalled_then(concat!(
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"second\"}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    ))
    .await;
    let credentials = ProviderCredentials {
        anthropic_api_key: Some("sk-ant-test".to_string()),
        anthropic_base_url: base,
        ..ProviderCredentials::default()
    };
    let transport = Arc::new(ProviderQuickChat::new(Arc::new(EventBus::new()), credentials).unwrap());
    let mut client = QuickChatClient::new(
        transport,
        QuickChatReducer::new(SourceCli::Claude, "claude-haiku-4-5"),
    );

    // WHEN: The first request is cancelled while in flight and a second
    // one is sent before the first request's task has wound down
    client.send("first").await.unwrap();
    first_arrived.await.unwrap();
    assert!(client.cancel());
    client.send("second").await.unwrap();
    let reducer = client.wait_until_finished().await;

    // THEN: The first request's late Done is not taken for the second
    // reply, which completes normally
    assert_eq!(reducer.last_error(), None);
    assert!(!reducer.is_streaming());
    let history = reducer.history();
    assert_eq!(history.last().map(|m| m.role), Some(QuickRole::Assistant));
    assert_eq!(history.last().map(|m| m.content.as_str()), Some("second"));
}

// ===== Model listing =====

#[tokio::test]
async fn provider_models_are_appended_to_builtin_list() {
    let (base, captured) = serve_once(
        "200 OK",
        r#"{"data":[{"type":"model","id":"claude-sonnet-9","display_name":"Claude Sonnet 9","created_at":"2026-09-01T00:00:00Z"},{"type":"model","id":"claude-opus-4-6","display_name":"Claude Opus 4.6","created_at":"2026-02-01T00:00:00Z"}],"has_more":false}"#,
    )
    .await;
    let credentials = ProviderCredentials {
        anthropic_api_key: Some("sk-ant-test".to_string()),
        anthropic_base_url: base,
        ..ProviderCredentials::default()
    };

    let models = list_models(SourceCli::Claude, &credentials).await;

    let builtin = builtin_models(SourceCli::Claude);
    assert_eq!(models.len(), builtin.len() + 1);
    let extra = models.last().unwrap();
    assert_eq!(extra.id, "claude-sonnet-9");
    assert_eq!(extra.name, "Claude Sonnet 9");
    assert_eq!(extra.group, "Claude Sonnet");
    assert!(extra.created.is_some());

    let request = captured.await.unwrap();
    assert_eq!(request.request_line(), "GET /v1/models HTTP/1.1");
    assert_eq!(request.header("x-api-key").as_deref(), Some("sk-ant-test"));
}

#[tokio::test]
async fn failed_model_listing_falls_back_to_builtin() {
    let (base, _captured) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
    let credentials = ProviderCredentials {
        openai_api_key: Some("sk-test".to_string()),
        openai_base_url: base,
        ..ProviderCredentials::default()
    };

    let models = list_models(SourceCli::Codex, &credentials).await;

    assert_eq!(models, builtin_models(SourceCli::Codex));
}
