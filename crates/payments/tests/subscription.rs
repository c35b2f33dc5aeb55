//! Integration tests for the subscription loop against a scripted
//! Socket.IO server built on `tokio-tungstenite`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use imagen_core::TaskLog;
use imagen_payments::reconnect::ReconnectConfig;
use imagen_payments::{PaymentsSocketClient, Subscription, SubscriptionOptions};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

const OPEN: &str =
    r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

type ServerSocket = WebSocketStream<TcpStream>;

async fn accept(listener: &TcpListener, auth: Arc<Mutex<Option<String>>>) -> ServerSocket {
    let (tcp, _) = listener.accept().await.unwrap();
    let record_auth = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        *auth.lock().unwrap() = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(resp)
    };
    tokio_tungstenite::accept_hdr_async(tcp, record_auth)
        .await
        .unwrap()
}

async fn next_text(ws: &mut ServerSocket) -> String {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(_)) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

async fn send(ws: &mut ServerSocket, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

/// Decode the JSON string argument of an agent-emitted event frame.
fn event_arg(frame: &str) -> (String, Value) {
    let array: Vec<Value> = serde_json::from_str(frame.strip_prefix("42").unwrap()).unwrap();
    let name = array[0].as_str().unwrap().to_string();
    let arg = serde_json::from_str(array[1].as_str().unwrap()).unwrap();
    (name, arg)
}

fn fast_options(did: &str) -> SubscriptionOptions {
    SubscriptionOptions {
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
            multiplier: 2.0,
        },
        ..SubscriptionOptions::for_agent(did)
    }
}

// ---------------------------------------------------------------------------
// Full session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribes_forwards_steps_and_emits_task_logs() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth = Arc::new(Mutex::new(None));

    let server_auth = auth.clone();
    let server = tokio::spawn(async move {
        let mut ws = accept(&listener, server_auth).await;
        send(&mut ws, OPEN).await;
        assert_eq!(next_text(&mut ws).await, "40");
        send(&mut ws, r#"40{"sid":"sio-1"}"#).await;

        let join = event_arg(&next_text(&mut ws).await);

        send(&mut ws, "2").await;
        assert_eq!(next_text(&mut ws).await, "3");

        // One notification as an object, one as a JSON string.
        send(
            &mut ws,
            r#"42["step-updated",{"did":"did:nv:agent","task_id":"task-1","step_id":"step-1"}]"#,
        )
        .await;
        send(
            &mut ws,
            r#"42["step-updated","{\"did\":\"did:nv:agent\",\"task_id\":\"task-2\",\"step_id\":\"step-2\"}"]"#,
        )
        .await;

        let log = event_arg(&next_text(&mut ws).await);
        (join, log, ws)
    });

    let cancel = CancellationToken::new();
    let client = PaymentsSocketClient::new(format!("ws://{addr}"), "nvm-secret");
    let mut sub = Subscription::spawn(client, fast_options("did:nv:agent"), cancel.clone());

    let first = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.step_id, "step-1");
    assert_eq!(second.step_id, "step-2");
    assert_eq!(second.task_id, "task-2");

    sub.task_logs()
        .send(TaskLog::info("task-1", "Starting image generation..."))
        .unwrap();

    let ((join_name, join), (log_name, log), _ws) =
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();

    assert_eq!(auth.lock().unwrap().as_deref(), Some("Bearer nvm-secret"));
    assert_eq!(join_name, "_join-rooms");
    assert_eq!(join["joinAgentRooms"], serde_json::json!(["did:nv:agent"]));
    assert_eq!(join["subscribeEventTypes"], serde_json::json!(["step-updated"]));
    assert_eq!(log_name, "_task-log");
    assert_eq!(log["task_id"], "task-1");
    assert_eq!(log["message"], "Starting image generation...");
    assert_eq!(log["level"], "info");

    cancel.cancel();
    let (_rx, _logs, handle) = sub.into_parts();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

// ---------------------------------------------------------------------------
// Reconnection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnects_after_namespace_refusal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth = Arc::new(Mutex::new(None));

    let server_auth = auth.clone();
    let server = tokio::spawn(async move {
        // First session: refuse the namespace connection.
        let mut ws = accept(&listener, server_auth.clone()).await;
        send(&mut ws, OPEN).await;
        assert_eq!(next_text(&mut ws).await, "40");
        send(&mut ws, r#"44{"message":"Unauthorized"}"#).await;

        // Second session: accept and deliver a notification.
        let mut ws = accept(&listener, server_auth).await;
        send(&mut ws, OPEN).await;
        assert_eq!(next_text(&mut ws).await, "40");
        send(&mut ws, "40").await;
        let _join = next_text(&mut ws).await;
        send(
            &mut ws,
            r#"42["step-updated",{"did":"d","task_id":"t","step_id":"after-reconnect"}]"#,
        )
        .await;
        ws
    });

    let cancel = CancellationToken::new();
    let client = PaymentsSocketClient::new(format!("ws://{addr}"), "key");
    let mut sub = Subscription::spawn(client, fast_options("d"), cancel.clone());

    let step = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(step.step_id, "after-reconnect");

    let _ws = server.await.unwrap();
    cancel.cancel();
}

#[tokio::test]
async fn cancellation_stops_subscription_while_unreachable() {
    let cancel = CancellationToken::new();
    let client = PaymentsSocketClient::new("ws://127.0.0.1:9", "key");
    let mut sub = Subscription::spawn(client, fast_options("d"), cancel.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let next = tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .unwrap();
    assert!(next.is_none());
}
