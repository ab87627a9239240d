//! AI Session Viewer (asv)
//!
//! Parses the line-delimited JSON streams emitted by the Claude Code and
//! Codex CLIs into a uniform message model, drives live chat sessions over
//! a local child process or a remote WebSocket, and loads historical
//! transcripts page by page.
//!
//! The parser, reducers and loader are pure. Everything that touches a
//! process, a socket or an HTTP stream lives under [`transport`] and is
//! driven by the async clients in [`client`].

/// Async drivers tying a reducer to a transport.
pub mod client;
/// Layered configuration.
pub mod config;
/// Persisted transcripts and session stores.
pub mod loader;
/// File logging setup.
pub mod logging;
/// Domain types.
pub mod model;
/// Live stream line parser.
pub mod parser;
/// Session state machines.
pub mod reducer;
/// Process, socket and HTTP bindings.
pub mod transport;
