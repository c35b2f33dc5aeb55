//! Subscription loop for step notifications.
//!
//! [`Subscription::spawn`] starts a long-lived task that connects to the
//! payments socket, performs the Socket.IO handshake, joins the agent's
//! rooms, and then:
//!
//! - answers Engine.IO pings,
//! - forwards every `step-updated` event as a [`StepRef`] notification,
//! - writes task logs queued through a [`TaskLogSender`] as `_task-log`
//!   events.
//!
//! When the connection drops it reconnects with exponential backoff.
//! Task logs queued while disconnected are flushed after the next
//! handshake.

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use imagen_core::{StepRef, TaskLog};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{PaymentsClientError, PaymentsSocketClient, SocketConnection, SocketStream};
use crate::reconnect::{reconnect_loop, ReconnectConfig};
use crate::socketio::{self, OpenHandshake, Packet, DEFAULT_NAMESPACE, PONG};

/// Event carrying step notifications.
pub const STEP_UPDATED_EVENT: &str = "step-updated";
/// Event the agent emits to join its rooms.
pub const JOIN_ROOMS_EVENT: &str = "_join-rooms";
/// Event the agent emits to record a task log.
pub const TASK_LOG_EVENT: &str = "_task-log";

/// Upper bound on the Socket.IO handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<SocketStream, Message>;
type WsSource = SplitStream<SocketStream>;

/// What to subscribe to once connected.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub join_account_room: bool,
    pub join_agent_rooms: Vec<String>,
    pub subscribe_event_types: Vec<String>,
    /// Ask the server to replay events emitted while disconnected.
    pub get_pending_events_on_subscribe: bool,
    pub reconnect: ReconnectConfig,
}

impl SubscriptionOptions {
    /// Join only the room of one agent, for `step-updated` events.
    pub fn for_agent(did: impl Into<String>) -> Self {
        Self {
            join_account_room: false,
            join_agent_rooms: vec![did.into()],
            subscribe_event_types: vec![STEP_UPDATED_EVENT.to_string()],
            get_pending_events_on_subscribe: false,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Payload of the `_join-rooms` event.
    pub fn join_rooms_payload(&self) -> Value {
        serde_json::json!({
            "joinAccountRoom": self.join_account_room,
            "joinAgentRooms": self.join_agent_rooms,
            "subscribeEventTypes": self.subscribe_event_types,
            "getPendingEventsOnSubscribe": self.get_pending_events_on_subscribe,
        })
    }
}

/// The subscription task has exited.
#[derive(Debug, thiserror::Error)]
#[error("Subscription is closed")]
pub struct SubscriptionClosed;

/// Cloneable handle for queuing task logs onto the socket.
#[derive(Debug, Clone)]
pub struct TaskLogSender {
    tx: mpsc::UnboundedSender<TaskLog>,
}

impl TaskLogSender {
    /// Queue a task log. Delivery happens on the subscription task.
    pub fn send(&self, log: TaskLog) -> Result<(), SubscriptionClosed> {
        self.tx.send(log).map_err(|_| SubscriptionClosed)
    }
}

/// A running subscription.
pub struct Subscription {
    notifications: mpsc::UnboundedReceiver<StepRef>,
    task_logs: TaskLogSender,
    handle: tokio::task::JoinHandle<()>,
}

impl Subscription {
    /// Spawn the subscription task. It runs until `cancel` is triggered
    /// or the notification receiver is dropped.
    pub fn spawn(
        client: PaymentsSocketClient,
        options: SubscriptionOptions,
        cancel: CancellationToken,
    ) -> Self {
        let (notify_tx, notifications) = mpsc::unbounded_channel();
        let (log_tx, log_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            tracing::info!(rooms = ?options.join_agent_rooms, "Starting subscription task");
            run_subscription(&client, &options, &notify_tx, log_rx, &cancel).await;
            tracing::info!("Subscription task exited");
        });

        Self {
            notifications,
            task_logs: TaskLogSender { tx: log_tx },
            handle,
        }
    }

    /// Handle for queuing task logs.
    pub fn task_logs(&self) -> TaskLogSender {
        self.task_logs.clone()
    }

    /// Wait for the next step notification. Returns `None` once the
    /// subscription task has exited.
    pub async fn next(&mut self) -> Option<StepRef> {
        self.notifications.recv().await
    }

    /// Split into the notification receiver, task log handle and task.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedReceiver<StepRef>,
        TaskLogSender,
        tokio::task::JoinHandle<()>,
    ) {
        (self.notifications, self.task_logs, self.handle)
    }
}

/// Why a single session ended.
#[derive(Debug)]
enum SessionEnd {
    Cancelled,
    /// Nobody listens for notifications any more.
    ReceiverDropped,
    Disconnected(String),
}

/// Core connection loop: connect -> session -> reconnect.
///
/// Runs until the cancellation token is triggered or the notification
/// receiver is dropped.
async fn run_subscription(
    client: &PaymentsSocketClient,
    options: &SubscriptionOptions,
    notify_tx: &mpsc::UnboundedSender<StepRef>,
    mut log_rx: mpsc::UnboundedReceiver<TaskLog>,
    cancel: &CancellationToken,
) {
    let mut backlog: VecDeque<TaskLog> = VecDeque::new();
    let mut next_conn: Option<SocketConnection> = None;

    loop {
        let conn = match next_conn.take() {
            Some(conn) => conn,
            None => {
                let attempt = tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = client.connect() => result,
                };
                match attempt {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Connection failed, entering reconnect loop");
                        match reconnect_loop(client, &options.reconnect, cancel).await {
                            Some(conn) => conn,
                            None => return,
                        }
                    }
                }
            }
        };

        let end = run_session(conn, options, notify_tx, &mut log_rx, &mut backlog, cancel).await;
        match end {
            SessionEnd::Cancelled => return,
            SessionEnd::ReceiverDropped => {
                tracing::info!("Notification receiver dropped, stopping subscription");
                return;
            }
            SessionEnd::Disconnected(reason) => {
                tracing::warn!(reason = %reason, "Payments socket session ended");
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        tracing::info!("Connection lost, entering reconnect loop");
        next_conn = match reconnect_loop(client, &options.reconnect, cancel).await {
            Some(conn) => Some(conn),
            None => return,
        };
    }
}

/// Drive one connected session until it ends.
async fn run_session(
    conn: SocketConnection,
    options: &SubscriptionOptions,
    notify_tx: &mpsc::UnboundedSender<StepRef>,
    log_rx: &mut mpsc::UnboundedReceiver<TaskLog>,
    backlog: &mut VecDeque<TaskLog>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = conn.ws_stream.split();

    let handshake = tokio::select! {
        _ = cancel.cancelled() => return SessionEnd::Cancelled,
        result = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut sink, &mut stream, options)) => result,
    };
    let open = match handshake {
        Ok(Ok(open)) => open,
        Ok(Err(e)) => return SessionEnd::Disconnected(e.to_string()),
        Err(_) => return SessionEnd::Disconnected("handshake timed out".into()),
    };

    tracing::info!(
        sid = %open.sid,
        ping_interval_ms = open.ping_interval,
        rooms = ?options.join_agent_rooms,
        "Subscribed to payments socket",
    );

    while let Some(log) = backlog.pop_front() {
        if let Err(e) = send_task_log(&mut sink, &log).await {
            backlog.push_front(log);
            return SessionEnd::Disconnected(e.to_string());
        }
    }

    let liveness = Duration::from_millis(open.ping_interval + open.ping_timeout);
    let mut deadline = Instant::now() + liveness;
    let mut logs_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            _ = tokio::time::sleep_until(deadline) => {
                return SessionEnd::Disconnected("no ping from server within liveness window".into());
            }
            log = log_rx.recv(), if logs_open => {
                match log {
                    Some(log) => {
                        if let Err(e) = send_task_log(&mut sink, &log).await {
                            backlog.push_back(log);
                            return SessionEnd::Disconnected(e.to_string());
                        }
                    }
                    None => logs_open = false,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match socketio::parse_packet(&text) {
                            Ok(Packet::Ping) => {
                                deadline = Instant::now() + liveness;
                                if let Err(e) = sink.send(Message::Text(PONG.into())).await {
                                    return SessionEnd::Disconnected(format!("failed to send pong: {e}"));
                                }
                            }
                            Ok(packet) => {
                                if let Some(end) = handle_packet(packet, notify_tx) {
                                    return end;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    raw_message = %text,
                                    "Failed to parse payments socket frame",
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::trace!("Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return SessionEnd::Disconnected(format!("server closed socket: {frame:?}"));
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        return SessionEnd::Disconnected(format!("receive error: {e}"));
                    }
                    None => {
                        return SessionEnd::Disconnected("stream exhausted".into());
                    }
                }
            }
        }
    }
}

/// Dispatch a parsed packet. Returns `Some` when the session must end.
fn handle_packet(packet: Packet, notify_tx: &mpsc::UnboundedSender<StepRef>) -> Option<SessionEnd> {
    match packet {
        Packet::Event { name, args, .. } if name == STEP_UPDATED_EVENT => {
            let Some(payload) = args.first() else {
                tracing::warn!("step-updated event without payload");
                return None;
            };
            match StepRef::from_payload(payload) {
                Ok(step) => {
                    tracing::info!(
                        did = %step.did,
                        task_id = %step.task_id,
                        step_id = %step.step_id,
                        "Received step notification",
                    );
                    if notify_tx.send(step).is_err() {
                        return Some(SessionEnd::ReceiverDropped);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, payload = %payload, "Invalid step notification");
                }
            }
            None
        }
        Packet::Event { name, .. } => {
            tracing::debug!(event = %name, "Ignoring payments socket event");
            None
        }
        Packet::Disconnect { namespace } => Some(SessionEnd::Disconnected(format!(
            "server disconnected namespace {namespace}"
        ))),
        Packet::Close => Some(SessionEnd::Disconnected("server closed session".into())),
        Packet::ConnectError { message, .. } => {
            Some(SessionEnd::Disconnected(format!("connect error: {message}")))
        }
        Packet::Ack { ack_id, .. } => {
            tracing::trace!(ack_id, "Ignoring ack");
            None
        }
        Packet::Open(_) | Packet::Connect { .. } | Packet::Ping | Packet::Pong | Packet::Noop => {
            None
        }
    }
}

/// Socket.IO handshake: wait for `open`, connect the default namespace,
/// then join the agent rooms.
async fn handshake(
    sink: &mut WsSink,
    stream: &mut WsSource,
    options: &SubscriptionOptions,
) -> Result<OpenHandshake, PaymentsClientError> {
    let open = match next_packet(stream).await? {
        Packet::Open(open) => open,
        other => {
            return Err(PaymentsClientError::Protocol(format!(
                "expected Engine.IO open, got {other:?}"
            )))
        }
    };

    send_text(sink, socketio::encode_connect(DEFAULT_NAMESPACE, None)).await?;

    loop {
        match next_packet(stream).await? {
            Packet::Connect { .. } => break,
            Packet::ConnectError { message, .. } => {
                return Err(PaymentsClientError::Protocol(format!(
                    "namespace connection refused: {message}"
                )))
            }
            Packet::Ping => send_text(sink, PONG.to_string()).await?,
            other => tracing::debug!(packet = ?other, "Ignoring packet during handshake"),
        }
    }

    let join = json_string_arg(&options.join_rooms_payload())?;
    send_text(sink, socketio::encode_event(JOIN_ROOMS_EVENT, &[join])).await?;

    Ok(open)
}

/// Read frames until one parses into a packet.
async fn next_packet(stream: &mut WsSource) -> Result<Packet, PaymentsClientError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return socketio::parse_packet(&text)
                    .map_err(|e| PaymentsClientError::Protocol(e.to_string()));
            }
            Some(Ok(Message::Close(frame))) => {
                return Err(PaymentsClientError::Protocol(format!(
                    "socket closed during handshake: {frame:?}"
                )))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(PaymentsClientError::Protocol(e.to_string())),
            None => {
                return Err(PaymentsClientError::Protocol(
                    "socket closed during handshake".into(),
                ))
            }
        }
    }
}

async fn send_task_log(sink: &mut WsSink, log: &TaskLog) -> Result<(), PaymentsClientError> {
    let payload = serde_json::to_value(log)
        .map_err(|e| PaymentsClientError::Protocol(e.to_string()))?;
    let arg = json_string_arg(&payload)?;
    send_text(sink, socketio::encode_event(TASK_LOG_EVENT, &[arg])).await?;
    tracing::debug!(task_id = %log.task_id, level = ?log.level, "Task log sent");
    Ok(())
}

/// Events emitted by the agent carry their payload JSON-encoded as a string.
fn json_string_arg(payload: &Value) -> Result<Value, PaymentsClientError> {
    serde_json::to_string(payload)
        .map(Value::String)
        .map_err(|e| PaymentsClientError::Protocol(e.to_string()))
}

async fn send_text(sink: &mut WsSink, text: String) -> Result<(), PaymentsClientError> {
    sink.send(Message::Text(text))
        .await
        .map_err(|e| PaymentsClientError::Protocol(e.to_string()))
}
