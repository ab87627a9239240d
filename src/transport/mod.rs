//! Transport bindings between a reducer and a source CLI.
//!
//! Two interchangeable bindings implement [`ChatTransport`]:
//!
//! - [`local::LocalTransport`] spawns the CLI as a child process and routes
//!   its stdout, stderr and exit status through the typed [`bus::EventBus`].
//! - [`remote::RemoteTransport`] talks to a chat server over one shared
//!   WebSocket that multiplexes every session.
//!
//! Both deliver a [`Binding`]: a route id plus an ordered stream of
//! [`StreamEvent`]s. Lines arrive in exactly the order the underlying
//! channel produced them, and a broken channel always ends with either a
//! `Complete` or a `Disconnected` event, or with the stream closing, so a
//! consumer never waits forever on a dead connection.

/// Shared event bus between transports and subscribers.
pub mod bus;
/// CLI command lines and installation discovery.
pub mod command;
/// Provider credentials and CLI settings discovery.
pub mod credentials;
/// Child-process transport on this machine.
pub mod local;
/// Model listing for quick chat.
pub mod models;
/// Registry of live child processes.
pub mod process;
/// One-shot HTTP quick-chat transports.
pub mod quick;
/// WebSocket transport to a chat server.
pub mod remote;
/// Stderr line classification.
pub mod stderr;

use crate::model::{RouteId, SessionId, SourceCli, TransportError};
use async_trait::async_trait;
use tokio::sync::mpsc;

// ===== LaunchRequest =====

/// Parameters for one CLI run, passed through to the launcher untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// CLI to run.
    pub source: SourceCli,
    /// Directory the CLI runs in.
    pub working_directory: String,
    /// User prompt for this turn.
    pub prompt: String,
    /// Empty means the CLI's default model.
    pub model: String,
    /// Pass the CLI flag that skips permission prompts.
    pub skip_permissions: bool,
    /// Session to resume; `None` starts a new one.
    pub resume: Option<SessionId>,
}

// ===== StreamEvent =====

/// One event on a bound route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One stdout line, verbatim.
    Output(String),
    /// One stderr line (local) or server error frame (remote), unfiltered.
    Error(String),
    /// The CLI process ended. Last event on the route.
    Complete {
        /// Whether the process exited successfully.
        success: bool,
    },
    /// The connection carrying the route was lost. Last event on the route.
    Disconnected(String),
}

impl StreamEvent {
    /// True for the last event a route can carry.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            StreamEvent::Complete { .. } | StreamEvent::Disconnected(_)
        )
    }
}

// ===== Binding =====

/// A launched run: its route and the ordered events addressed to it.
#[derive(Debug)]
pub struct Binding {
    /// Route the run was launched on.
    pub route: RouteId,
    /// Events for the route, in arrival order.
    pub events: mpsc::UnboundedReceiver<StreamEvent>,
}

impl Binding {
    /// Pair a route with its receiver.
    pub fn new(route: RouteId, events: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self { route, events }
    }

    /// Next event, or `None` once the route is closed.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }
}

// ===== ChatTransport =====

/// Launches CLI runs and forwards cancellation.
///
/// Implementations swallow low-level failures after launch and report
/// them as events; only launch itself returns an error.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Launch a new session.
    async fn send_start(&self, request: LaunchRequest) -> Result<Binding, TransportError>;

    /// Launch a continuation of `request.resume`.
    async fn send_continue(&self, request: LaunchRequest) -> Result<Binding, TransportError>;

    /// Ask the run on `route` to stop. Stopping a route that already
    /// finished is not an error.
    async fn send_cancel(&self, route: &RouteId) -> Result<(), TransportError>;
}
