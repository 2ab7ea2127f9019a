//! Engine.IO v4 / Socket.IO v5 텍스트 패킷 코덱.
//!
//! WebSocket 텍스트 프레임 하나가 Engine.IO 패킷 하나다.
//! Engine.IO `message`(4) 패킷의 본문이 Socket.IO 패킷이다.
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,..}   open
//! 2 / 3                                    ping / pong
//! 40{"token":".."}                         connect (auth)
//! 42["event",{..}]                         event
//! 4213["join",{..}]                        event + ack id 13
//! 4313[{..}]                               ack 13
//! 44{"message":".."}                       connect_error
//! ```
//! 바이너리 첨부(5, 6)는 지원하지 않는다.

use serde::Deserialize;
use serde_json::Value;
use veil_core::error::CoreError;

/// 기본 네임스페이스
pub const DEFAULT_NAMESPACE: &str = "/";

/// Engine.IO open 핸드셰이크
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// 서버 ping 주기 (ms)
    #[serde(default)]
    pub ping_interval: u64,
    /// pong 대기 한도 (ms)
    #[serde(default)]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: u64,
}

/// Engine.IO 패킷
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    /// 텍스트 프레임 → 패킷
    pub fn decode(frame: &str) -> Result<Self, CoreError> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| CoreError::Protocol("빈 Engine.IO 프레임".to_string()))?;
        let body = chars.as_str();

        match kind {
            '0' => {
                let handshake: OpenHandshake = serde_json::from_str(body)
                    .map_err(|e| CoreError::Protocol(format!("open 패킷 파싱 실패: {e}")))?;
                Ok(Self::Open(handshake))
            }
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(body.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(CoreError::Protocol(format!(
                "알 수 없는 Engine.IO 패킷 타입: {other}"
            ))),
        }
    }

    /// 패킷 → 텍스트 프레임
    ///
    /// open 패킷은 서버 전용이라 클라이언트에서 인코딩하지 않는다.
    pub fn encode(&self) -> String {
        match self {
            Self::Open(_) => "0".to_string(),
            Self::Close => "1".to_string(),
            Self::Ping(data) => format!("2{data}"),
            Self::Pong(data) => format!("3{data}"),
            Self::Message(data) => format!("4{data}"),
            Self::Upgrade => "5".to_string(),
            Self::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO 패킷
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    /// 기본 네임스페이스 이벤트
    pub fn event(name: &str, payload: Value, id: Option<u64>) -> Self {
        Self::Event {
            namespace: DEFAULT_NAMESPACE.to_string(),
            id,
            name: name.to_string(),
            args: vec![payload],
        }
    }

    /// 기본 네임스페이스 연결 요청
    pub fn connect(auth: Option<Value>) -> Self {
        Self::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: auth,
        }
    }

    /// Engine.IO message 본문 → 패킷
    pub fn decode(body: &str) -> Result<Self, CoreError> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| CoreError::Protocol("빈 Socket.IO 패킷".to_string()))?;
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(CoreError::Protocol(
                "바이너리 Socket.IO 패킷은 지원하지 않음".to_string(),
            ));
        }

        // 네임스페이스: '/'로 시작하면 ','까지
        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(pos) => {
                    let ns = &rest[..pos];
                    rest = &rest[pos + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        // ack id: 선행 숫자
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let id = if digits > 0 {
            let parsed = rest[..digits]
                .parse::<u64>()
                .map_err(|e| CoreError::Protocol(format!("ack id 파싱 실패: {e}")))?;
            rest = &rest[digits..];
            Some(parsed)
        } else {
            None
        };

        let data = if rest.trim().is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(rest)
                    .map_err(|e| CoreError::Protocol(format!("패킷 데이터 파싱 실패: {e}")))?,
            )
        };

        match kind {
            '0' => Ok(Self::Connect { namespace, data }),
            '1' => Ok(Self::Disconnect { namespace }),
            '2' => {
                let mut args = match data {
                    Some(Value::Array(items)) => items,
                    _ => {
                        return Err(CoreError::Protocol(
                            "event 패킷 데이터는 배열이어야 함".to_string(),
                        ))
                    }
                };
                if args.is_empty() {
                    return Err(CoreError::Protocol("event 이름 누락".to_string()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => {
                        return Err(CoreError::Protocol(format!(
                            "event 이름이 문자열이 아님: {other}"
                        )))
                    }
                };
                Ok(Self::Event {
                    namespace,
                    id,
                    name,
                    args,
                })
            }
            '3' => {
                let id = id.ok_or_else(|| CoreError::Protocol("ack id 누락".to_string()))?;
                let args = match data {
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![other],
                    None => Vec::new(),
                };
                Ok(Self::Ack {
                    namespace,
                    id,
                    args,
                })
            }
            '4' => Ok(Self::ConnectError { namespace, data }),
            other => Err(CoreError::Protocol(format!(
                "알 수 없는 Socket.IO 패킷 타입: {other}"
            ))),
        }
    }

    /// 패킷 → Engine.IO message 본문
    pub fn encode(&self) -> String {
        fn ns_prefix(namespace: &str) -> String {
            if namespace == DEFAULT_NAMESPACE || namespace.is_empty() {
                String::new()
            } else {
                format!("{namespace},")
            }
        }

        match self {
            Self::Connect { namespace, data } => {
                let mut out = format!("0{}", ns_prefix(namespace));
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
                out
            }
            Self::Disconnect { namespace } => format!("1{}", ns_prefix(namespace)),
            Self::Event {
                namespace,
                id,
                name,
                args,
            } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!(
                    "2{}{}{}",
                    ns_prefix(namespace),
                    id.map(|i| i.to_string()).unwrap_or_default(),
                    Value::Array(items)
                )
            }
            Self::Ack {
                namespace,
                id,
                args,
            } => format!(
                "3{}{}{}",
                ns_prefix(namespace),
                id,
                Value::Array(args.clone())
            ),
            Self::ConnectError { namespace, data } => {
                let mut out = format!("4{}", ns_prefix(namespace));
                if let Some(data) = data {
                    out.push_str(&data.to_string());
                }
                out
            }
        }
    }

    /// Engine.IO message 프레임으로 감싼 텍스트
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

/// connect_error 데이터에서 사람이 읽을 메시지 추출
pub fn connect_error_message(data: Option<&Value>) -> String {
    match data {
        Some(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "connect_error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_open_handshake() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        match packet {
            EnginePacket::Open(hs) => {
                assert_eq!(hs.sid, "abc");
                assert_eq!(hs.ping_interval, 25000);
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn engine_ping_pong() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert!(EnginePacket::decode("").is_err());
        assert!(EnginePacket::decode("9").is_err());
    }

    #[test]
    fn encode_event_with_ack_id() {
        let packet = SocketPacket::event("join", json!({"userId": "u1"}), Some(7));
        assert_eq!(packet.to_frame(), r#"427["join",{"userId":"u1"}]"#);

        let plain = SocketPacket::event("heartbeat", json!({}), None);
        assert_eq!(plain.encode(), r#"2["heartbeat",{}]"#);
    }

    #[test]
    fn decode_event() {
        let packet =
            SocketPacket::decode(r#"2["hourly_scan_progress",{"progress":40}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/".to_string(),
                id: None,
                name: "hourly_scan_progress".to_string(),
                args: vec![json!({"progress": 40})],
            }
        );
    }

    #[test]
    fn decode_ack_with_namespace() {
        let packet = SocketPacket::decode(r#"3/admin,12[{"success":true}]"#).unwrap();
        assert_eq!(
            packet,
            SocketPacket::Ack {
                namespace: "/admin".to_string(),
                id: 12,
                args: vec![json!({"success": true})],
            }
        );
    }

    #[test]
    fn decode_connect_and_error() {
        let ok = SocketPacket::decode(r#"0{"sid":"s1"}"#).unwrap();
        assert!(matches!(ok, SocketPacket::Connect { data: Some(_), .. }));

        let err = SocketPacket::decode(r#"4{"message":"Authentication error"}"#).unwrap();
        match err {
            SocketPacket::ConnectError { data, .. } => {
                assert_eq!(connect_error_message(data.as_ref()), "Authentication error");
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }

    #[test]
    fn connect_with_auth_encodes_json() {
        let packet = SocketPacket::connect(Some(json!({"token": "t"})));
        assert_eq!(packet.to_frame(), r#"40{"token":"t"}"#);
    }

    #[test]
    fn binary_packets_rejected() {
        assert!(matches!(
            SocketPacket::decode(r#"51-["upload",{"_placeholder":true,"num":0}]"#),
            Err(CoreError::Protocol(_))
        ));
    }

    #[test]
    fn event_without_name_rejected() {
        assert!(SocketPacket::decode("2[]").is_err());
        assert!(SocketPacket::decode(r#"2[42]"#).is_err());
        assert!(SocketPacket::decode(r#"2{"a":1}"#).is_err());
    }
}
