//! Remote-socket binding.
//!
//! One WebSocket carries every session. Launches are JSON action frames;
//! the server answers each launch with a `session_id` frame naming the
//! route, then streams `output`, `error` and `complete` frames. Those frames
//! carry no route, so they belong to the most recently bound route.
//!
//! Launches are serialized: a second `send_start` waits until the first one
//! has its `session_id`. When the socket drops, every bound route receives
//! `Disconnected`, a pending launch fails with `Closed`, and the connection
//! is re-established after the reconnect delay.

use super::{Binding, ChatTransport, LaunchRequest, StreamEvent};
use crate::model::{RouteId, SourceCli, TransportError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a launch waits for its `session_id` frame.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

const SHUTDOWN_REASON: &str = "Transport shut down";

// ===== Wire frames =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Start,
    Continue,
    Cancel,
}

/// Client to server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionFrame<'a> {
    action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<SourceCli>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_permissions: Option<bool>,
}

impl<'a> ActionFrame<'a> {
    fn launch(action: Action, request: &'a LaunchRequest) -> Self {
        Self {
            action,
            source: Some(request.source),
            project_path: Some(&request.working_directory),
            prompt: Some(&request.prompt),
            model: Some(&request.model),
            session_id: request.resume.as_ref().map(|id| id.as_str()),
            skip_permissions: Some(request.skip_permissions),
        }
    }

    fn cancel(route: &'a RouteId) -> Self {
        Self {
            action: Action::Cancel,
            source: None,
            project_path: None,
            prompt: None,
            model: None,
            session_id: Some(route.as_str()),
            skip_permissions: None,
        }
    }

    fn to_message(&self) -> Result<Message, TransportError> {
        let text = serde_json::to_string(self)
            .map_err(|err| TransportError::Protocol(format!("Failed to encode frame: {}", err)))?;
        Ok(Message::Text(text.into()))
    }
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    SessionId { data: String },
    Output { data: String },
    Error { data: String },
    Complete { success: bool },
    #[serde(other)]
    Unknown,
}

// ===== Connection state =====

/// A launch waiting for its `session_id` frame.
struct Pending {
    reply: oneshot::Sender<Result<RouteId, TransportError>>,
    events: mpsc::UnboundedSender<StreamEvent>,
}

#[derive(Default)]
struct Connection {
    outbound: Option<mpsc::UnboundedSender<Message>>,
    routes: HashMap<RouteId, mpsc::UnboundedSender<StreamEvent>>,
    /// Route that receives untagged frames.
    current: Option<RouteId>,
    pending: Option<Pending>,
}

impl Connection {
    fn dispatch(&mut self, raw: &str) {
        let frame: ServerFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(error = %err, "Ignoring malformed server frame");
                return;
            }
        };

        match frame {
            ServerFrame::SessionId { data } => self.bind(data),
            ServerFrame::Output { data } => self.deliver(StreamEvent::Output(data)),
            ServerFrame::Error { data } => {
                // Rejections of a launch arrive before any route exists.
                if self.current.is_none() {
                    if let Some(pending) = self.pending.take() {
                        warn!(error = %data, "Server rejected launch");
                        let _ = pending.reply.send(Err(TransportError::Protocol(data)));
                        return;
                    }
                }
                self.deliver(StreamEvent::Error(data));
            }
            ServerFrame::Complete { success } => {
                self.deliver(StreamEvent::Complete { success });
                if let Some(route) = self.current.take() {
                    self.routes.remove(&route);
                }
            }
            ServerFrame::Unknown => trace!("Ignoring unknown server frame"),
        }
    }

    fn bind(&mut self, data: String) {
        let Some(pending) = self.pending.take() else {
            warn!(route = %data, "Unsolicited session_id frame");
            return;
        };
        match RouteId::new(data) {
            Ok(route) => {
                debug!(route = %route, "Route bound");
                self.routes.insert(route.clone(), pending.events);
                self.current = Some(route.clone());
                let _ = pending.reply.send(Ok(route));
            }
            Err(err) => {
                let _ = pending
                    .reply
                    .send(Err(TransportError::Protocol(err.to_string())));
            }
        }
    }

    fn deliver(&mut self, event: StreamEvent) {
        let Some(route) = self.current.clone() else {
            debug!(?event, "Frame with no bound route");
            return;
        };
        let delivered = self
            .routes
            .get(&route)
            .map(|tx| tx.send(event).is_ok())
            .unwrap_or(false);
        if !delivered {
            self.routes.remove(&route);
        }
    }

    fn disconnect_all(&mut self, reason: &str) {
        self.outbound = None;
        self.current = None;
        for (route, tx) in self.routes.drain() {
            debug!(route = %route, "Notifying route of disconnect");
            let _ = tx.send(StreamEvent::Disconnected(reason.to_string()));
        }
        if let Some(pending) = self.pending.take() {
            let _ = pending.reply.send(Err(TransportError::Closed));
        }
    }
}

// ===== RemoteTransport =====

/// Chat transport over one WebSocket connection to a remote server.
/// The connection is re-established in the background after a drop.
pub struct RemoteTransport {
    url: String,
    connection: Arc<Mutex<Connection>>,
    handshake: tokio::sync::Mutex<()>,
    handshake_timeout: Duration,
    shutdown: CancellationToken,
}

impl RemoteTransport {
    /// Open the socket at `url`. The initial connection must succeed; later
    /// drops are retried every `reconnect_delay`.
    pub async fn connect(url: &str, reconnect_delay: Duration) -> Result<Self, TransportError> {
        let stream = open(url).await?;
        info!(url = %url, "Connected to chat server");

        let connection = Arc::new(Mutex::new(Connection::default()));
        let shutdown = CancellationToken::new();
        // Outbound must be live before connect returns.
        let outbound = install_outbound(&connection);
        tokio::spawn(supervise(
            stream,
            outbound,
            url.to_string(),
            reconnect_delay,
            Arc::clone(&connection),
            shutdown.clone(),
        ));

        Ok(Self {
            url: url.to_string(),
            connection,
            handshake: tokio::sync::Mutex::new(()),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            shutdown,
        })
    }

    /// Override how long `start` waits for the server to assign a route.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Server URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the socket is currently up.
    pub fn is_connected(&self) -> bool {
        self.connection.lock().outbound.is_some()
    }

    /// Stop the connection task. Bound routes receive `Disconnected`.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn launch(&self, action: Action, request: LaunchRequest) -> Result<Binding, TransportError> {
        let _turn = self.handshake.lock().await;
        let message = ActionFrame::launch(action, &request).to_message()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        {
            let mut conn = self.connection.lock();
            let outbound = conn.outbound.clone().ok_or(TransportError::Closed)?;
            conn.pending = Some(Pending {
                reply: reply_tx,
                events: events_tx,
            });
            if outbound.send(message).is_err() {
                conn.pending = None;
                return Err(TransportError::Closed);
            }
        }
        debug!(?action, source = %request.source, "Sent launch frame");

        let route = match tokio::time::timeout(self.handshake_timeout, reply_rx).await {
            Err(_) => {
                self.connection.lock().pending = None;
                return Err(TransportError::Protocol(format!(
                    "No session id within {}s",
                    self.handshake_timeout.as_secs()
                )));
            }
            Ok(Err(_)) => return Err(TransportError::Closed),
            Ok(Ok(result)) => result?,
        };
        info!(route = %route, ?action, "Remote run bound");
        Ok(Binding::new(route, events_rx))
    }
}

impl Drop for RemoteTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl ChatTransport for RemoteTransport {
    async fn send_start(&self, request: LaunchRequest) -> Result<Binding, TransportError> {
        self.launch(Action::Start, request).await
    }

    async fn send_continue(&self, request: LaunchRequest) -> Result<Binding, TransportError> {
        self.launch(Action::Continue, request).await
    }

    async fn send_cancel(&self, route: &RouteId) -> Result<(), TransportError> {
        let message = ActionFrame::cancel(route).to_message()?;
        let outbound = self
            .connection
            .lock()
            .outbound
            .clone()
            .ok_or(TransportError::Closed)?;
        outbound.send(message).map_err(|_| TransportError::Closed)?;
        debug!(route = %route, "Sent cancel frame");
        Ok(())
    }
}

// ===== Connection task =====

async fn open(url: &str) -> Result<WsStream, TransportError> {
    connect_async(url)
        .await
        .map(|(stream, _response)| stream)
        .map_err(|err| TransportError::Connect {
            url: url.to_string(),
            reason: err.to_string(),
        })
}

fn install_outbound(connection: &Mutex<Connection>) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    connection.lock().outbound = Some(tx);
    rx
}

async fn supervise(
    mut stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    url: String,
    reconnect_delay: Duration,
    connection: Arc<Mutex<Connection>>,
    shutdown: CancellationToken,
) {
    loop {
        let reason = serve(stream, &mut outbound, &connection, &shutdown).await;
        connection.lock().disconnect_all(&reason);
        if shutdown.is_cancelled() {
            info!(url = %url, "Chat server connection shut down");
            return;
        }
        warn!(url = %url, reason = %reason, "Chat server connection lost");

        stream = loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(reconnect_delay) => {}
            }
            match open(&url).await {
                Ok(stream) => break stream,
                Err(err) => warn!(error = %err, "Reconnect failed"),
            }
        };
        outbound = install_outbound(&connection);
        info!(url = %url, "Reconnected to chat server");
    }
}

/// Pump one socket until it ends. Returns why it ended.
async fn serve(
    stream: WsStream,
    outbound: &mut mpsc::UnboundedReceiver<Message>,
    connection: &Mutex<Connection>,
    shutdown: &CancellationToken,
) -> String {
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return SHUTDOWN_REASON.to_string();
            }
            Some(message) = outbound.recv() => {
                if let Err(err) = write.send(message).await {
                    return TransportError::from(err).to_string();
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => connection.lock().dispatch(text.as_str()),
                Some(Ok(Message::Close(_))) | None => return TransportError::Closed.to_string(),
                Some(Ok(_)) => {}
                Some(Err(err)) => return TransportError::from(err).to_string(),
            }
        }
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionId;

    fn request() -> LaunchRequest {
        LaunchRequest {
            source: SourceCli::Claude,
            working_directory: "/work".to_string(),
            prompt: "hi".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            skip_permissions: false,
            resume: None,
        }
    }

    #[test]
    fn start_frame_shape() {
        let req = request();
        let json = serde_json::to_string(&ActionFrame::launch(Action::Start, &req)).unwrap();
        insta::assert_snapshot!(json, @r#"{"action":"start","source":"claude","projectPath":"/work","prompt":"hi","model":"claude-sonnet-4-5","skipPermissions":false}"#);
    }

    #[test]
    fn continue_frame_carries_session_id() {
        let mut req = request();
        req.resume = Some(SessionId::new("sess-1").unwrap());
        let json = serde_json::to_string(&ActionFrame::launch(Action::Continue, &req)).unwrap();
        insta::assert_snapshot!(json, @r#"{"action":"continue","source":"claude","projectPath":"/work","prompt":"hi","model":"claude-sonnet-4-5","sessionId":"sess-1","skipPermissions":false}"#);
    }

    #[test]
    fn cancel_frame_shape() {
        let route = RouteId::new("r-1").unwrap();
        let json = serde_json::to_string(&ActionFrame::cancel(&route)).unwrap();
        insta::assert_snapshot!(json, @r#"{"action":"cancel","sessionId":"r-1"}"#);
    }

    #[test]
    fn server_frames_decode() {
        let parse = |raw: &str| serde_json::from_str::<ServerFrame>(raw).unwrap();
        assert_eq!(
            parse(r#"{"type":"session_id","data":"abc"}"#),
            ServerFrame::SessionId { data: "abc".to_string() }
        );
        assert_eq!(
            parse(r#"{"type":"complete","success":false}"#),
            ServerFrame::Complete { success: false }
        );
        assert_eq!(parse(r#"{"type":"heartbeat"}"#), ServerFrame::Unknown);
    }

    fn pending_connection() -> (
        Connection,
        oneshot::Receiver<Result<RouteId, TransportError>>,
        mpsc::UnboundedReceiver<StreamEvent>,
    ) {
        let (reply, reply_rx) = oneshot::channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let conn = Connection {
            pending: Some(Pending { reply, events }),
            ..Connection::default()
        };
        (conn, reply_rx, events_rx)
    }

    #[test]
    fn session_id_binds_pending_launch_and_routes_frames() {
        // GIVEN: A launch waiting for its session id
        let (mut conn, mut reply, mut events) = pending_connection();

        // WHEN: The server binds it and streams
        conn.dispatch(r#"{"type":"session_id","data":"route-1"}"#);
        conn.dispatch(r#"{"type":"output","data":"{\"type\":\"system\"}"}"#);
        conn.dispatch(r#"{"type":"error","data":"warning: slow"}"#);
        conn.dispatch(r#"{"type":"complete","success":true}"#);

        // THEN: The launch resolves and frames arrive in order
        assert_eq!(reply.try_recv().unwrap().unwrap().as_str(), "route-1");
        assert_eq!(
            events.try_recv().unwrap(),
            StreamEvent::Output(r#"{"type":"system"}"#.to_string())
        );
        assert_eq!(
            events.try_recv().unwrap(),
            StreamEvent::Error("warning: slow".to_string())
        );
        assert_eq!(events.try_recv().unwrap(), StreamEvent::Complete { success: true });
        assert!(conn.routes.is_empty());
        assert!(conn.current.is_none());
    }

    #[test]
    fn error_before_binding_rejects_launch() {
        let (mut conn, mut reply, _events) = pending_connection();
        conn.dispatch(r#"{"type":"error","data":"Invalid request: missing field"}"#);
        match reply.try_recv().unwrap() {
            Err(TransportError::Protocol(msg)) => assert!(msg.contains("Invalid request")),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_notifies_routes_and_pending() {
        // GIVEN: One bound route and one pending launch
        let (mut conn, _reply, mut bound) = pending_connection();
        conn.dispatch(r#"{"type":"session_id","data":"route-1"}"#);
        let (reply, mut pending_reply) = oneshot::channel();
        let (events, _rx) = mpsc::unbounded_channel();
        conn.pending = Some(Pending { reply, events });

        // WHEN: The socket drops
        conn.disconnect_all("Connection closed");

        // THEN: The route gets Disconnected and the launch gets Closed
        assert_eq!(
            bound.try_recv().unwrap(),
            StreamEvent::Disconnected("Connection closed".to_string())
        );
        assert!(matches!(
            pending_reply.try_recv().unwrap(),
            Err(TransportError::Closed)
        ));
        assert!(conn.outbound.is_none());
    }

    #[test]
    fn malformed_and_unsolicited_frames_are_ignored() {
        let mut conn = Connection::default();
        conn.dispatch("not json");
        conn.dispatch(r#"{"type":"session_id","data":"x"}"#);
        conn.dispatch(r#"{"type":"output","data":"lost"}"#);
        assert!(conn.routes.is_empty());
    }
}
