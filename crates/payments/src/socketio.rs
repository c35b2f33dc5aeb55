//! Socket.IO v5 over Engine.IO v4 packet codec.
//!
//! The payments socket speaks Socket.IO on top of a raw WebSocket. Each
//! text frame is one Engine.IO packet (`<type><payload>`); Engine.IO
//! `message` packets (`4`) wrap a Socket.IO packet
//! (`<type>[/namespace,][ack id][json]`). This module parses inbound
//! frames into a typed [`Packet`] and encodes the few frames the agent
//! sends. Binary attachments are not supported.

use serde::Deserialize;
use serde_json::Value;

/// Engine.IO pong frame, sent in reply to every server ping.
pub const PONG: &str = "3";

/// The default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO `open` handshake payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO session opened.
    Open(OpenHandshake),
    /// Engine.IO session closed by the server.
    Close,
    Ping,
    Pong,
    Noop,
    /// Socket.IO namespace connection accepted.
    Connect {
        namespace: String,
        sid: Option<String>,
    },
    /// Socket.IO namespace disconnected by the server.
    Disconnect { namespace: String },
    /// A named event with its arguments.
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    /// Acknowledgement of an event the client emitted.
    Ack {
        namespace: String,
        ack_id: u64,
        args: Vec<Value>,
    },
    /// Socket.IO namespace connection refused.
    ConnectError { namespace: String, message: String },
}

/// Errors from the packet codec.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("Empty frame")]
    Empty,

    #[error("Unknown packet type '{0}'")]
    UnknownType(char),

    #[error("Malformed packet: {0}")]
    Malformed(String),

    #[error("Unsupported packet: {0}")]
    Unsupported(&'static str),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse one WebSocket text frame.
pub fn parse_packet(text: &str) -> Result<Packet, PacketError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(PacketError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => parse_socket_packet(rest),
        '5' => Err(PacketError::Unsupported("transport upgrade")),
        '6' => Ok(Packet::Noop),
        other => Err(PacketError::UnknownType(other)),
    }
}

/// Encode a namespace connect request, optionally carrying auth data.
pub fn encode_connect(namespace: &str, auth: Option<&Value>) -> String {
    let mut frame = String::from("40");
    push_namespace(&mut frame, namespace);
    if let Some(auth) = auth {
        frame.push_str(&auth.to_string());
    }
    frame
}

/// Encode an event on the default namespace.
pub fn encode_event(name: &str, args: &[Value]) -> String {
    let mut array = Vec::with_capacity(args.len() + 1);
    array.push(Value::String(name.to_string()));
    array.extend(args.iter().cloned());
    format!("42{}", Value::Array(array))
}

// ---- Socket.IO layer ----

fn parse_socket_packet(body: &str) -> Result<Packet, PacketError> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| PacketError::Malformed("empty Socket.IO packet".into()))?;
    let (namespace, rest) = split_namespace(chars.as_str());
    let (ack_id, payload) = split_ack_id(rest)?;

    match kind {
        '0' => {
            let sid = if payload.is_empty() {
                None
            } else {
                let value: Value = serde_json::from_str(payload)?;
                value.get("sid").and_then(Value::as_str).map(str::to_string)
            };
            Ok(Packet::Connect { namespace, sid })
        }
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            let mut args = parse_array(payload)?;
            if args.is_empty() {
                return Err(PacketError::Malformed("event without a name".into()));
            }
            let name = match args.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(PacketError::Malformed(format!(
                        "event name must be a string, got {other}"
                    )))
                }
            };
            Ok(Packet::Event {
                namespace,
                ack_id,
                name,
                args,
            })
        }
        '3' => {
            let ack_id =
                ack_id.ok_or_else(|| PacketError::Malformed("ack without an id".into()))?;
            Ok(Packet::Ack {
                namespace,
                ack_id,
                args: parse_array(payload)?,
            })
        }
        '4' => {
            let message = if payload.is_empty() {
                String::new()
            } else {
                match serde_json::from_str::<Value>(payload)? {
                    Value::String(message) => message,
                    other => other
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| other.to_string()),
                }
            };
            Ok(Packet::ConnectError { namespace, message })
        }
        '5' | '6' => Err(PacketError::Unsupported("binary attachments")),
        other => Err(PacketError::UnknownType(other)),
    }
}

/// Split an optional `/namespace,` prefix.
fn split_namespace(body: &str) -> (String, &str) {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => (body[..idx].to_string(), &body[idx + 1..]),
            None => (body.to_string(), ""),
        }
    } else {
        (DEFAULT_NAMESPACE.to_string(), body)
    }
}

/// Split an optional numeric ack id preceding the JSON payload.
fn split_ack_id(body: &str) -> Result<(Option<u64>, &str), PacketError> {
    let digits = body.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return Ok((None, body));
    }
    let id = body[..digits]
        .parse::<u64>()
        .map_err(|e| PacketError::Malformed(format!("invalid ack id: {e}")))?;
    Ok((Some(id), &body[digits..]))
}

fn parse_array(payload: &str) -> Result<Vec<Value>, PacketError> {
    match serde_json::from_str::<Value>(payload)? {
        Value::Array(items) => Ok(items),
        other => Err(PacketError::Malformed(format!(
            "expected a JSON array, got {other}"
        ))),
    }
}

fn push_namespace(frame: &mut String, namespace: &str) {
    if !namespace.is_empty() && namespace != DEFAULT_NAMESPACE {
        frame.push_str(namespace);
        frame.push(',');
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_open_handshake() {
        let frame = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        match parse_packet(frame).unwrap() {
            Packet::Open(open) => {
                assert_eq!(open.sid, "abc");
                assert_eq!(open.ping_interval, 25000);
                assert_eq!(open.ping_timeout, 20000);
                assert_eq!(open.max_payload, Some(1_000_000));
            }
            other => panic!("Expected Open, got {other:?}"),
        }
    }

    #[test]
    fn parse_engine_control_packets() {
        assert_eq!(parse_packet("1").unwrap(), Packet::Close);
        assert_eq!(parse_packet("2").unwrap(), Packet::Ping);
        assert_eq!(parse_packet("3").unwrap(), Packet::Pong);
        assert_eq!(parse_packet("6").unwrap(), Packet::Noop);
    }

    #[test]
    fn parse_connect_with_sid() {
        assert_eq!(
            parse_packet(r#"40{"sid":"xyz"}"#).unwrap(),
            Packet::Connect {
                namespace: "/".into(),
                sid: Some("xyz".into()),
            }
        );
    }

    #[test]
    fn parse_connect_on_namespace() {
        assert_eq!(
            parse_packet(r#"40/agents,{"sid":"xyz"}"#).unwrap(),
            Packet::Connect {
                namespace: "/agents".into(),
                sid: Some("xyz".into()),
            }
        );
    }

    #[test]
    fn parse_event_with_object_argument() {
        let frame = r#"42["step-updated",{"did":"d","task_id":"t","step_id":"s"}]"#;
        match parse_packet(frame).unwrap() {
            Packet::Event {
                namespace,
                ack_id,
                name,
                args,
            } => {
                assert_eq!(namespace, "/");
                assert!(ack_id.is_none());
                assert_eq!(name, "step-updated");
                assert_eq!(args, vec![json!({"did":"d","task_id":"t","step_id":"s"})]);
            }
            other => panic!("Expected Event, got {other:?}"),
        }
    }

    #[test]
    fn parse_event_with_ack_id() {
        match parse_packet(r#"4212["ping-me"]"#).unwrap() {
            Packet::Event { ack_id, name, args, .. } => {
                assert_eq!(ack_id, Some(12));
                assert_eq!(name, "ping-me");
                assert!(args.is_empty());
            }
            other => panic!("Expected Event, got {other:?}"),
        }
    }

    #[test]
    fn parse_ack() {
        assert_eq!(
            parse_packet(r#"437["ok"]"#).unwrap(),
            Packet::Ack {
                namespace: "/".into(),
                ack_id: 7,
                args: vec![json!("ok")],
            }
        );
    }

    #[test]
    fn parse_connect_error_object() {
        assert_eq!(
            parse_packet(r#"44{"message":"Unauthorized"}"#).unwrap(),
            Packet::ConnectError {
                namespace: "/".into(),
                message: "Unauthorized".into(),
            }
        );
    }

    #[test]
    fn parse_disconnect() {
        assert_eq!(
            parse_packet("41").unwrap(),
            Packet::Disconnect {
                namespace: "/".into()
            }
        );
    }

    #[test]
    fn event_without_name_is_malformed() {
        assert_matches!(parse_packet("42[]"), Err(PacketError::Malformed(_)));
        assert_matches!(parse_packet("42[1,2]"), Err(PacketError::Malformed(_)));
        assert_matches!(parse_packet(r#"42{"a":1}"#), Err(PacketError::Malformed(_)));
    }

    #[test]
    fn binary_packets_are_unsupported() {
        assert_matches!(
            parse_packet(r#"451-["img",{"_placeholder":true,"num":0}]"#),
            Err(PacketError::Unsupported(_))
        );
    }

    #[test]
    fn empty_and_unknown_frames() {
        assert_matches!(parse_packet(""), Err(PacketError::Empty));
        assert_matches!(parse_packet("9"), Err(PacketError::UnknownType('9')));
        assert_matches!(parse_packet("0not json"), Err(PacketError::Json(_)));
    }

    #[test]
    fn encode_connect_frames() {
        assert_eq!(encode_connect("/", None), "40");
        assert_eq!(
            encode_connect("/agents", Some(&json!({"token": "t"}))),
            r#"40/agents,{"token":"t"}"#
        );
    }

    #[test]
    fn encode_event_frame_parses_back() {
        let frame = encode_event("_task-log", &[json!("{\"task_id\":\"t\"}")]);
        assert!(frame.starts_with(r#"42["_task-log","#));
        match parse_packet(&frame).unwrap() {
            Packet::Event { name, args, .. } => {
                assert_eq!(name, "_task-log");
                assert_eq!(args, vec![json!("{\"task_id\":\"t\"}")]);
            }
            other => panic!("Expected Event, got {other:?}"),
        }
    }
}
