//! Codex CLI `exec --json` lines.
//!
//! Codex reports progress as item lifecycle events (`item.started` /
//! `item.completed`) bracketed by thread and turn events. Rollout-style
//! `response_item` rows carry the same payloads the transcript files store.
//! Both are normalized to the block vocabulary Claude lines produce, with
//! tool output echoed back as a User-role turn.

use super::content::{display_json, error_text, non_empty, parse_timestamp, tool_result_text};
use super::{LineEvent, TerminalSummary, Turn};
use crate::model::{ContentBlock, Role, SessionId, TokenUsage, ToolCall};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

/// Tool name shown for shell command executions.
const SHELL_TOOL: &str = "shell";
const STATUS_FAILED: &str = "failed";
const ROLE_ASSISTANT: &str = "assistant";

// ===== Raw line schema =====

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum CodexLine {
    #[serde(rename = "thread.started")]
    ThreadStarted {
        #[serde(default)]
        thread_id: Option<String>,
    },
    #[serde(rename = "session_meta")]
    SessionMeta {
        #[serde(default)]
        payload: Option<SessionPayload>,
    },
    #[serde(rename = "session_configured")]
    SessionConfigured {
        #[serde(default)]
        session_id: Option<String>,
    },
    #[serde(rename = "item.started")]
    ItemStarted { item: CodexItem },
    #[serde(rename = "item.completed")]
    ItemCompleted { item: CodexItem },
    #[serde(rename = "response_item")]
    ResponseItem {
        payload: CodexItem,
        #[serde(default)]
        timestamp: Option<String>,
    },
    #[serde(rename = "turn.completed")]
    TurnCompleted {
        #[serde(default)]
        usage: Option<CodexUsage>,
    },
    #[serde(rename = "turn.failed")]
    TurnFailed {
        #[serde(default)]
        error: Option<Value>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct CodexUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

/// Item payloads shared by live events and persisted `response_item` rows.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum CodexItem {
    AgentMessage {
        #[serde(default)]
        text: Option<String>,
    },
    Reasoning {
        #[serde(default)]
        text: Option<Value>,
        #[serde(default)]
        summary: Option<Value>,
    },
    CommandExecution {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        command: Value,
        #[serde(default)]
        aggregated_output: Option<String>,
        #[serde(default)]
        exit_code: Option<i64>,
        #[serde(default)]
        status: Option<String>,
    },
    McpToolCall {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        server: Option<String>,
        #[serde(default)]
        tool: Option<String>,
        #[serde(default)]
        arguments: Value,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Value,
        #[serde(default)]
        status: Option<String>,
    },
    FunctionCall {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        arguments: Value,
        #[serde(default)]
        call_id: Option<String>,
    },
    FunctionCallOutput {
        #[serde(default)]
        call_id: Option<String>,
        #[serde(default)]
        output: Value,
    },
    Message {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        content: Value,
    },
    #[serde(other)]
    Unknown,
}

// ===== Payload helpers =====

/// Reasoning text from `text`, falling back to the `summary` entries.
pub(crate) fn reasoning_text(text: Option<&Value>, summary: Option<&Value>) -> String {
    let flatten = |value: &Value| match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                other => other.get("text").and_then(Value::as_str),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    text.map(flatten)
        .filter(|t| !t.is_empty())
        .or_else(|| summary.map(flatten))
        .unwrap_or_default()
}

/// Function-call arguments for display: JSON strings are re-indented,
/// anything else shown as-is.
pub(crate) fn function_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(s) => serde_json::from_str::<Value>(s)
            .map(|parsed| display_json(&parsed))
            .unwrap_or_else(|_| s.clone()),
        Value::Null => String::new(),
        other => display_json(other),
    }
}

/// Blocks of a `message` payload: `input_text` / `output_text` / `text`
/// items become Text, `reasoning` items Reasoning. Blank items are skipped.
pub(crate) fn message_blocks(content: &Value) -> Vec<ContentBlock> {
    match content {
        Value::String(s) if !s.trim().is_empty() => vec![ContentBlock::text(s.clone())],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let text = item.get("text").and_then(Value::as_str)?;
                if text.trim().is_empty() {
                    return None;
                }
                match item.get("type").and_then(Value::as_str)? {
                    "input_text" | "output_text" | "text" => Some(ContentBlock::text(text)),
                    "reasoning" => Some(ContentBlock::reasoning(text)),
                    _ => None,
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn command_text(command: &Value) -> String {
    match command {
        Value::Array(parts) if parts.iter().all(Value::is_string) => parts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        other => display_json(other),
    }
}

fn mcp_tool_name(server: Option<String>, tool: Option<String>) -> String {
    match (non_empty(server), non_empty(tool)) {
        (Some(server), Some(tool)) => format!("{}.{}", server, tool),
        (None, Some(tool)) => tool,
        (Some(server), None) => server,
        (None, None) => "mcp".to_string(),
    }
}

// ===== Item mapping =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Started,
    Completed,
}

fn single(role: Role, block: ContentBlock) -> LineEvent {
    LineEvent::Turn(Turn::new(role, vec![block]))
}

fn item_event(item: CodexItem, phase: Phase) -> LineEvent {
    match (phase, item) {
        (Phase::Started, CodexItem::CommandExecution { id, command, .. }) => single(
            Role::Assistant,
            ContentBlock::ToolInvocation(ToolCall::new(
                id.unwrap_or_default(),
                SHELL_TOOL,
                command_text(&command),
            )),
        ),
        (
            Phase::Started,
            CodexItem::McpToolCall {
                id,
                server,
                tool,
                arguments,
                ..
            },
        ) => single(
            Role::Assistant,
            ContentBlock::ToolInvocation(ToolCall::new(
                id.unwrap_or_default(),
                mcp_tool_name(server, tool),
                display_json(&arguments),
            )),
        ),
        (Phase::Started, _) => LineEvent::Noise,

        (_, CodexItem::AgentMessage { text }) => match non_empty(text) {
            Some(text) => single(Role::Assistant, ContentBlock::text(text)),
            None => LineEvent::Noise,
        },
        (_, CodexItem::Reasoning { text, summary }) => {
            let text = reasoning_text(text.as_ref(), summary.as_ref());
            if text.is_empty() {
                LineEvent::Noise
            } else {
                single(Role::Assistant, ContentBlock::reasoning(text))
            }
        }
        (
            _,
            CodexItem::CommandExecution {
                id,
                aggregated_output,
                exit_code,
                status,
                ..
            },
        ) => {
            let failed =
                exit_code.is_some_and(|code| code != 0) || status.as_deref() == Some(STATUS_FAILED);
            single(
                Role::User,
                ContentBlock::tool_result(
                    id.unwrap_or_default(),
                    aggregated_output.unwrap_or_default(),
                    failed,
                ),
            )
        }
        (
            _,
            CodexItem::McpToolCall {
                id,
                result,
                error,
                status,
                ..
            },
        ) => {
            let error = error_text(&error);
            let failed = error.is_some() || status.as_deref() == Some(STATUS_FAILED);
            let content = error.unwrap_or_else(|| tool_result_text(Some(&result)));
            single(
                Role::User,
                ContentBlock::tool_result(id.unwrap_or_default(), content, failed),
            )
        }
        (
            _,
            CodexItem::FunctionCall {
                name,
                arguments,
                call_id,
            },
        ) => single(
            Role::Assistant,
            ContentBlock::ToolInvocation(ToolCall::new(
                call_id.unwrap_or_default(),
                non_empty(name).unwrap_or_else(|| "unknown".to_string()),
                function_arguments(&arguments),
            )),
        ),
        (_, CodexItem::FunctionCallOutput { call_id, output }) => single(
            Role::User,
            ContentBlock::tool_result(
                call_id.unwrap_or_default(),
                tool_result_text(Some(&output)),
                false,
            ),
        ),
        // User-role messages echo the prompt already shown optimistically.
        (_, CodexItem::Message { role, content }) => {
            if role.as_deref() != Some(ROLE_ASSISTANT) {
                return LineEvent::Noise;
            }
            let blocks = message_blocks(&content);
            if blocks.is_empty() {
                LineEvent::Noise
            } else {
                LineEvent::Turn(Turn::new(Role::Assistant, blocks))
            }
        }
        (_, CodexItem::Unknown) => LineEvent::Noise,
    }
}

fn session_init(id: Option<String>) -> LineEvent {
    id.and_then(|id| SessionId::new(id).ok())
        .map(LineEvent::SessionInit)
        .unwrap_or(LineEvent::Noise)
}

fn failure(error: Option<String>) -> LineEvent {
    LineEvent::Terminal(TerminalSummary {
        text: error.clone().unwrap_or_else(|| "Error".to_string()),
        error: Some(error.unwrap_or_else(|| "Unknown error".to_string())),
        usage: None,
    })
}

// ===== Line parsing =====

pub(super) fn parse_line(line: &str) -> LineEvent {
    let decoded: CodexLine = match serde_json::from_str(line) {
        Ok(decoded) => decoded,
        Err(err) => {
            trace!(error = %err, "Codex line did not match any known shape");
            return LineEvent::Noise;
        }
    };

    match decoded {
        CodexLine::ThreadStarted { thread_id } => session_init(thread_id),
        CodexLine::SessionMeta { payload } => session_init(payload.and_then(|p| p.id)),
        CodexLine::SessionConfigured { session_id } => session_init(session_id),
        CodexLine::ItemStarted { item } => item_event(item, Phase::Started),
        CodexLine::ItemCompleted { item } => item_event(item, Phase::Completed),
        CodexLine::ResponseItem { payload, timestamp } => {
            match item_event(payload, Phase::Completed) {
                LineEvent::Turn(mut turn) => {
                    turn.timestamp = parse_timestamp(timestamp.as_deref());
                    LineEvent::Turn(turn)
                }
                other => other,
            }
        }
        CodexLine::TurnCompleted { usage } => {
            let usage = usage.map(|u| {
                TokenUsage::new(u.input_tokens.unwrap_or(0), u.output_tokens.unwrap_or(0))
            });
            let text = match usage {
                Some(u) => format!(
                    "Done (tokens: {} in, {} out)",
                    u.input_tokens, u.output_tokens
                ),
                None => "Done".to_string(),
            };
            LineEvent::Terminal(TerminalSummary {
                text,
                error: None,
                usage,
            })
        }
        CodexLine::TurnFailed { error } => failure(error.as_ref().and_then(error_text)),
        CodexLine::Error { message } => failure(non_empty(message)),
        CodexLine::Unknown => LineEvent::Noise,
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceCli;
    use serde_json::json;

    fn codex(line: &str) -> LineEvent {
        crate::parser::parse_line(line, SourceCli::Codex)
    }

    fn turn(event: LineEvent) -> Turn {
        match event {
            LineEvent::Turn(turn) => turn,
            other => panic!("Expected Turn, got {:?}", other),
        }
    }

    // ===== Init lines =====

    #[test]
    fn thread_started_reports_session_id() {
        let event = codex(r#"{"type":"thread.started","thread_id":"0199-abc"}"#);
        assert_eq!(event, LineEvent::SessionInit(SessionId::new("0199-abc").unwrap()));
    }

    #[test]
    fn session_meta_reports_payload_id() {
        let event = codex(r#"{"type":"session_meta","payload":{"id":"s-9","cwd":"/w"}}"#);
        assert_eq!(event, LineEvent::SessionInit(SessionId::new("s-9").unwrap()));
    }

    #[test]
    fn session_configured_reports_session_id() {
        let event = codex(r#"{"type":"session_configured","session_id":"s-2"}"#);
        assert_eq!(event, LineEvent::SessionInit(SessionId::new("s-2").unwrap()));
    }

    #[test]
    fn turn_started_is_noise() {
        assert_eq!(codex(r#"{"type":"turn.started"}"#), LineEvent::Noise);
    }

    // ===== Items =====

    #[test]
    fn agent_message_becomes_assistant_text() {
        let line = r#"{"type":"item.completed","item":{"id":"item_1","type":"agent_message","text":"All done."}}"#;
        let turn = turn(codex(line));
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content, vec![ContentBlock::text("All done.")]);
    }

    #[test]
    fn reasoning_item_becomes_reasoning_block() {
        let line = r#"{"type":"item.completed","item":{"id":"item_0","type":"reasoning","text":"**Planning**"}}"#;
        assert_eq!(
            turn(codex(line)).content,
            vec![ContentBlock::reasoning("**Planning**")]
        );
    }

    #[test]
    fn command_execution_started_then_completed() {
        // GIVEN: A command execution lifecycle
        let started = r#"{"type":"item.started","item":{"id":"item_2","type":"command_execution","command":"bash -lc ls","aggregated_output":"","exit_code":null,"status":"in_progress"}}"#;
        let completed = r#"{"type":"item.completed","item":{"id":"item_2","type":"command_execution","command":"bash -lc ls","aggregated_output":"Cargo.toml\nsrc\n","exit_code":0,"status":"completed"}}"#;

        // WHEN: Both lines are parsed
        let invocation = turn(codex(started));
        let result = turn(codex(completed));

        // THEN: Assistant invocation followed by a linked User result
        assert_eq!(
            invocation.content,
            vec![ContentBlock::ToolInvocation(ToolCall::new(
                "item_2",
                "shell",
                "bash -lc ls"
            ))]
        );
        assert_eq!(result.role, Role::User);
        assert_eq!(
            result.content,
            vec![ContentBlock::tool_result("item_2", "Cargo.toml\nsrc\n", false)]
        );
    }

    #[test]
    fn command_execution_nonzero_exit_is_error() {
        let line = r#"{"type":"item.completed","item":{"id":"c","type":"command_execution","command":["bash","-lc","false"],"aggregated_output":"","exit_code":1,"status":"failed"}}"#;
        assert_eq!(
            turn(codex(line)).content,
            vec![ContentBlock::tool_result("c", "", true)]
        );
    }

    #[test]
    fn command_array_is_joined_for_display() {
        assert_eq!(command_text(&json!(["bash", "-lc", "ls"])), "bash -lc ls");
    }

    #[test]
    fn mcp_tool_call_maps_to_invocation_and_result() {
        let started = r#"{"type":"item.started","item":{"id":"m1","type":"mcp_tool_call","server":"docs","tool":"search","arguments":{"q":"tokio"},"status":"in_progress"}}"#;
        let invocation = turn(codex(started));
        match &invocation.content[0] {
            ContentBlock::ToolInvocation(call) => assert_eq!(call.name(), "docs.search"),
            other => panic!("Expected ToolInvocation, got {:?}", other),
        }

        let failed = r#"{"type":"item.completed","item":{"id":"m1","type":"mcp_tool_call","server":"docs","tool":"search","error":{"message":"timeout"},"status":"failed"}}"#;
        assert_eq!(
            turn(codex(failed)).content,
            vec![ContentBlock::tool_result("m1", "timeout", true)]
        );
    }

    #[test]
    fn unknown_item_type_is_noise() {
        let line = r#"{"type":"item.completed","item":{"id":"t","type":"todo_list","items":[]}}"#;
        assert_eq!(codex(line), LineEvent::Noise);
    }

    #[test]
    fn started_agent_message_is_noise() {
        let line = r#"{"type":"item.started","item":{"id":"a","type":"agent_message","text":"partial"}}"#;
        assert_eq!(codex(line), LineEvent::Noise);
    }

    // ===== response_item rows =====

    #[test]
    fn response_item_function_call_pair() {
        let call = r#"{"timestamp":"2025-09-01T08:00:00Z","type":"response_item","payload":{"type":"function_call","name":"shell","arguments":"{\"command\":[\"ls\"]}","call_id":"call_1"}}"#;
        let output = r#"{"type":"response_item","payload":{"type":"function_call_output","call_id":"call_1","output":"a.txt"}}"#;

        let call_turn = turn(codex(call));
        assert_eq!(call_turn.role, Role::Assistant);
        assert!(call_turn.timestamp.is_some());
        match &call_turn.content[0] {
            ContentBlock::ToolInvocation(call) => {
                assert_eq!(call.id(), "call_1");
                assert_eq!(call.input_serialized(), "{\n  \"command\": [\n    \"ls\"\n  ]\n}");
            }
            other => panic!("Expected ToolInvocation, got {:?}", other),
        }

        assert_eq!(
            turn(codex(output)).content,
            vec![ContentBlock::tool_result("call_1", "a.txt", false)]
        );
    }

    #[test]
    fn response_item_assistant_message_is_text() {
        let line = r#"{"type":"response_item","payload":{"type":"message","role":"assistant","content":[{"type":"output_text","text":"hello"}]}}"#;
        assert_eq!(turn(codex(line)).content, vec![ContentBlock::text("hello")]);
    }

    #[test]
    fn response_item_user_message_is_noise() {
        let line = r#"{"type":"response_item","payload":{"type":"message","role":"user","content":[{"type":"input_text","text":"hi"}]}}"#;
        assert_eq!(codex(line), LineEvent::Noise);
    }

    #[test]
    fn reasoning_falls_back_to_summary() {
        let text = reasoning_text(
            None,
            Some(&json!([{"type":"summary_text","text":"step one"},{"type":"summary_text","text":"step two"}])),
        );
        assert_eq!(text, "step one\nstep two");
    }

    // ===== Terminal lines =====

    #[test]
    fn turn_completed_is_terminal_success_with_usage() {
        let line = r#"{"type":"turn.completed","usage":{"input_tokens":1200,"cached_input_tokens":800,"output_tokens":85}}"#;
        match codex(line) {
            LineEvent::Terminal(summary) => {
                assert_eq!(summary.text, "Done (tokens: 1200 in, 85 out)");
                assert_eq!(summary.error, None);
                assert_eq!(summary.usage, Some(TokenUsage::new(1200, 85)));
            }
            other => panic!("Expected Terminal, got {:?}", other),
        }
    }

    #[test]
    fn turn_failed_is_terminal_error() {
        let line = r#"{"type":"turn.failed","error":{"message":"stream disconnected"}}"#;
        match codex(line) {
            LineEvent::Terminal(summary) => {
                assert_eq!(summary.text, "stream disconnected");
                assert_eq!(summary.error.as_deref(), Some("stream disconnected"));
            }
            other => panic!("Expected Terminal, got {:?}", other),
        }
    }

    #[test]
    fn error_line_without_message_defaults() {
        match codex(r#"{"type":"error"}"#) {
            LineEvent::Terminal(summary) => {
                assert_eq!(summary.text, "Error");
                assert_eq!(summary.error.as_deref(), Some("Unknown error"));
            }
            other => panic!("Expected Terminal, got {:?}", other),
        }
    }
}
