//! End-to-end scenarios over recorded CLI output.
//!
//! Each scenario replays a fixture stream through the reducer or a
//! [`ChatClient`] and checks the resulting session, or loads a fixture
//! transcript page by page.

use asv::client::{ChatClient, Update};
use asv::loader::{load_all, load_page};
use asv::model::{
    ContentBlock, DisplayBlock, DisplayRole, LoadError, PersistedBlock, RouteId, Role, SourceCli,
    TransportError,
};
use asv::parser::LineEvent;
use asv::reducer::{ChatReducer, SessionState};
use asv::transport::{Binding, ChatTransport, LaunchRequest, StreamEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

const CLAUDE_STREAM: &str = include_str!("fixtures/claude_stream.jsonl");
const CODEX_STREAM: &str = include_str!("fixtures/codex_stream.jsonl");

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Replays a fixture as stdout lines, then reports process exit.
struct ReplayTransport {
    lines: Vec<String>,
    stderr: Vec<String>,
    success: bool,
    launches: Mutex<Vec<LaunchRequest>>,
}

impl ReplayTransport {
    fn new(stream: &str, success: bool) -> Self {
        Self {
            lines: stream.lines().map(str::to_string).collect(),
            stderr: Vec::new(),
            success,
            launches: Mutex::new(Vec::new()),
        }
    }

    fn with_stderr(mut self, lines: &[&str]) -> Self {
        self.stderr = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    fn replay(&self, request: LaunchRequest) -> Binding {
        self.launches.lock().push(request);
        let (tx, rx) = mpsc::unbounded_channel();
        for line in &self.stderr {
            let _ = tx.send(StreamEvent::Error(line.clone()));
        }
        for line in &self.lines {
            let _ = tx.send(StreamEvent::Output(line.clone()));
        }
        let _ = tx.send(StreamEvent::Complete {
            success: self.success,
        });
        Binding::new(RouteId::generate(), rx)
    }
}

#[async_trait]
impl ChatTransport for ReplayTransport {
    async fn send_start(&self, request: LaunchRequest) -> Result<Binding, TransportError> {
        Ok(self.replay(request))
    }

    async fn send_continue(&self, request: LaunchRequest) -> Result<Binding, TransportError> {
        Ok(self.replay(request))
    }

    async fn send_cancel(&self, _route: &RouteId) -> Result<(), TransportError> {
        Ok(())
    }
}

// ===== Live streams =====

#[test]
fn claude_stream_reduces_to_ordered_conversation() {
    // GIVEN: A reducer started on a Claude session
    let mut reducer = ChatReducer::new();
    reducer
        .start(SourceCli::Claude, "/work/demo", "list the files", "", false)
        .unwrap();

    // WHEN: The recorded stream is ingested line by line
    for line in CLAUDE_STREAM.lines() {
        reducer.ingest(line);
    }

    // THEN: Prompt, reasoning, tool call, tool result, answer, summary
    let session = reducer.session();
    let roles: Vec<Role> = session.messages().iter().map(|m| m.role()).collect();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Assistant,
            Role::Assistant,
            Role::User,
            Role::Assistant,
            Role::System,
        ]
    );
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(
        session.session_id().map(|id| id.as_str()),
        Some("3f1c2a9e-5b7d-4e21-9c0a-claude000001")
    );
    assert_eq!(session.last_error(), None);

    // The zero-output-token API error never becomes a message
    assert!(session
        .messages()
        .iter()
        .all(|m| !m.text().contains("Overloaded")));

    let summary = session.messages().last().unwrap();
    assert_eq!(
        summary.text(),
        "The project contains `Cargo.toml`, `README.md` and `src/`. (4.2s) (cost: $0.0123)"
    );
}

#[test]
fn claude_tool_result_links_to_invocation() {
    let mut reducer = ChatReducer::new();
    reducer
        .start(SourceCli::Claude, "/work/demo", "list the files", "", false)
        .unwrap();
    for line in CLAUDE_STREAM.lines() {
        reducer.ingest(line);
    }

    let messages = reducer.session().messages();
    let call = match &messages[2].content()[0] {
        ContentBlock::ToolInvocation(call) => call.clone(),
        other => panic!("expected tool invocation, got {other:?}"),
    };
    assert_eq!(call.name(), "Bash");
    assert_eq!(
        messages[3].content(),
        &[ContentBlock::tool_result(
            call.id(),
            "Cargo.toml\nREADME.md\nsrc",
            false
        )]
    );
}

#[test]
fn codex_stream_reduces_to_ordered_conversation() {
    let mut reducer = ChatReducer::new();
    reducer
        .start(SourceCli::Codex, "/work/demo", "list the files", "o4-mini", false)
        .unwrap();

    let events: Vec<LineEvent> = CODEX_STREAM.lines().map(|l| reducer.ingest(l)).collect();

    assert!(matches!(events[0], LineEvent::SessionInit(_)));
    assert!(events.last().unwrap().is_terminal());

    let session = reducer.session();
    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(session.messages().len(), 6);
    assert_eq!(
        session.messages()[1].content(),
        &[ContentBlock::reasoning("**Listing the workspace**")]
    );
    assert_eq!(
        session.messages()[4].text(),
        "The workspace has `Cargo.toml` and `src/`."
    );
    assert_eq!(
        session.messages()[5].text(),
        "Done (tokens: 1200 in, 85 out)"
    );
    assert_eq!(session.raw_output().len(), CODEX_STREAM.lines().count());
}

// ===== Client over a replayed transport =====

#[tokio::test]
async fn client_start_then_continue_reuses_latched_session() {
    // GIVEN: A client whose transport replays the Claude fixture
    let transport = Arc::new(ReplayTransport::new(CLAUDE_STREAM, true));
    let mut client = ChatClient::new(transport.clone());

    // WHEN: A session is started and run to completion
    client
        .start(SourceCli::Claude, "/work/demo", "list the files", "", true)
        .await
        .unwrap();
    let session_id = client
        .wait_until_finished()
        .await
        .session_id()
        .cloned()
        .expect("session id latched from init line");

    // AND: A follow-up prompt is sent on the same session
    client
        .continue_session(&session_id, "and the tests?", None)
        .await
        .unwrap();
    client.wait_until_finished().await;

    // THEN: The second launch resumes the latched id
    let launches = transport.launches.lock();
    assert_eq!(launches.len(), 2);
    assert_eq!(launches[0].resume, None);
    assert!(launches[0].skip_permissions);
    assert_eq!(launches[1].resume.as_ref(), Some(&session_id));
    assert_eq!(launches[1].prompt, "and the tests?");

    // Both turns are kept: 6 messages each
    assert_eq!(client.session().messages().len(), 12);
    assert_eq!(client.session().state(), SessionState::Completed);
}

#[tokio::test]
async fn client_surfaces_stderr_errors_and_ignores_noise() {
    let transport = Arc::new(
        ReplayTransport::new(CODEX_STREAM, true).with_stderr(&[
            "info: reading prompt from stdin",
            "Error: failed to refresh token",
        ]),
    );
    let mut client = ChatClient::new(transport);
    client
        .start(SourceCli::Codex, "/work/demo", "hi", "", false)
        .await
        .unwrap();

    let mut stderr = Vec::new();
    while let Some(update) = client.next_update().await {
        if let Update::Stderr { line, surfaced } = update {
            stderr.push((line, surfaced));
        }
    }

    assert_eq!(stderr.len(), 2);
    assert!(!stderr[0].1, "progress chatter is not an error");
    assert!(stderr[1].1);
    assert_eq!(
        client.session().last_error(),
        Some("Error: failed to refresh token")
    );
    // stderr alone never ends the session
    assert_eq!(client.session().state(), SessionState::Completed);
}

#[tokio::test]
async fn failed_exit_without_terminal_line_is_errored() {
    // GIVEN: Output that stops before any result line
    let truncated: String = CLAUDE_STREAM.lines().take(3).collect::<Vec<_>>().join("\n");
    let transport = Arc::new(ReplayTransport::new(&truncated, false));
    let mut client = ChatClient::new(transport);

    client
        .start(SourceCli::Claude, "/work/demo", "hi", "", false)
        .await
        .unwrap();
    let session = client.wait_until_finished().await;

    assert_eq!(session.state(), SessionState::Errored);
    assert_eq!(session.last_error(), Some("Process exited with an error"));
    // Messages ingested before the failure are kept
    assert_eq!(session.messages().len(), 3);
}

// ===== Transcripts =====

#[test]
fn claude_transcript_skips_non_message_records() {
    let messages = load_all(SourceCli::Claude, &fixture("claude_transcript.jsonl")).unwrap();

    let roles: Vec<DisplayRole> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            DisplayRole::User,
            DisplayRole::Assistant,
            DisplayRole::User,
            DisplayRole::Assistant,
            DisplayRole::User,
            DisplayRole::Assistant,
        ]
    );
    assert_eq!(messages[0].uuid.as_deref(), Some("u-1"));
    assert_eq!(
        messages[0].timestamp.as_deref(),
        Some("2025-10-01T09:00:00.000Z")
    );
    assert_eq!(messages[1].model.as_deref(), Some("claude-sonnet-4-5"));
}

#[test]
fn claude_transcript_pages_from_end() {
    let path = fixture("claude_transcript.jsonl");

    // GIVEN: 6 messages, pages of 4, newest first
    let newest = load_page(SourceCli::Claude, &path, 0, 4, true).unwrap();
    let older = load_page(SourceCli::Claude, &path, 1, 4, true).unwrap();

    // THEN: Page 0 is the last 4, page 1 the remaining 2
    assert_eq!(newest.total, 6);
    assert!(newest.has_more);
    let uuids: Vec<_> = newest.messages.iter().map(|m| m.uuid.clone().unwrap()).collect();
    assert_eq!(uuids, vec!["u-2", "a-2", "u-3", "a-3"]);

    assert!(!older.has_more);
    let uuids: Vec<_> = older.messages.iter().map(|m| m.uuid.clone().unwrap()).collect();
    assert_eq!(uuids, vec!["u-1", "a-1"]);
}

#[test]
fn codex_rollout_keeps_function_rows() {
    let messages = load_all(SourceCli::Codex, &fixture("codex_rollout.jsonl")).unwrap();

    let roles: Vec<DisplayRole> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            DisplayRole::User,
            DisplayRole::Assistant,
            DisplayRole::Assistant,
            DisplayRole::Tool,
            DisplayRole::Assistant,
        ]
    );
    match &messages[2].content[0] {
        DisplayBlock::Persisted(PersistedBlock::FunctionCall { name, call_id, .. }) => {
            assert_eq!(name, "shell");
            assert_eq!(call_id, "call_1");
        }
        other => panic!("expected function call, got {other:?}"),
    }
    match &messages[3].content[0] {
        DisplayBlock::Persisted(PersistedBlock::FunctionCallOutput { call_id, .. }) => {
            assert_eq!(call_id, "call_1");
        }
        other => panic!("expected function call output, got {other:?}"),
    }
}

#[test]
fn codex_rollout_first_page_forward() {
    let page = load_page(SourceCli::Codex, &fixture("codex_rollout.jsonl"), 0, 2, false).unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.messages.len(), 2);
    assert!(page.has_more);
    assert_eq!(page.messages[0].role, DisplayRole::User);
}

#[test]
fn missing_transcript_is_file_not_found() {
    let result = load_page(SourceCli::Claude, &fixture("does_not_exist.jsonl"), 0, 10, true);
    assert!(matches!(result, Err(LoadError::FileNotFound { .. })));
}
