//! WebSocket 실시간 채널 클라이언트.
//!
//! `tokio-tungstenite` 위에 Socket.IO(Engine.IO v4) 핸드셰이크를 올린
//! `ChannelConnector` 구현. 전송은 websocket만 사용한다.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use veil_core::config::SocketConfig;
use veil_core::error::CoreError;
use veil_core::ports::channel::{
    ChannelAuth, ChannelConnector, ChannelEvent, ChannelLink, ChannelSession, ChannelSignal,
};

use crate::protocol::{connect_error_message, EnginePacket, SocketPacket};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type PendingAcks = Arc<Mutex<HashMap<u64, oneshot::Sender<Vec<Value>>>>>;

/// 신호 채널 버퍼
const SIGNAL_BUFFER: usize = 256;

/// HTTP(S) 기본 URL → Engine.IO websocket URL
///
/// `http://host:5000` + `/socket.io` → `ws://host:5000/socket.io/?EIO=4&transport=websocket`
pub fn engine_url(endpoint: &str, path: &str) -> Result<Url, CoreError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| CoreError::Config(format!("잘못된 채널 URL '{endpoint}': {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CoreError::Config(format!(
                "지원하지 않는 채널 스킴: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| CoreError::Config(format!("스킴 변경 실패: {endpoint}")))?;

    let path = format!("/{}/", path.trim_matches('/'));
    url.set_path(&path);
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

/// Socket.IO websocket 연결기
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    /// 엔드포인트 + 채널 설정으로 생성
    pub fn new(endpoint: &str, config: &SocketConfig) -> Result<Self, CoreError> {
        for transport in config.transports.iter().filter(|t| t.as_str() != "websocket") {
            debug!("전송 방식 '{transport}' 무시: websocket만 사용");
        }
        Ok(Self {
            url: engine_url(endpoint, &config.path)?,
        })
    }

    /// 연결 URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// 핸드셰이크: open 수신 → connect(auth) 송신 → connect 확인
    async fn handshake(
        write: &mut WsWrite,
        read: &mut SplitStream<WsStream>,
        auth: &ChannelAuth,
    ) -> Result<(), CoreError> {
        let mut opened = false;
        while let Some(frame) = read.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Close(_)) => {
                    return Err(CoreError::Network("핸드셰이크 중 연결 종료".to_string()))
                }
                Ok(_) => continue,
                Err(e) => return Err(CoreError::Network(format!("핸드셰이크 수신 실패: {e}"))),
            };

            match EnginePacket::decode(&text)? {
                EnginePacket::Open(hs) if !opened => {
                    debug!("Engine.IO open: sid={}, ping={}ms", hs.sid, hs.ping_interval);
                    opened = true;
                    let connect = SocketPacket::connect(Some(serde_json::to_value(auth)?));
                    send_frame(write, connect.to_frame()).await?;
                }
                EnginePacket::Ping(data) => {
                    send_frame(write, EnginePacket::Pong(data).encode()).await?;
                }
                EnginePacket::Message(body) if opened => match SocketPacket::decode(&body)? {
                    SocketPacket::Connect { .. } => return Ok(()),
                    SocketPacket::ConnectError { data, .. } => {
                        return Err(CoreError::Auth(connect_error_message(data.as_ref())))
                    }
                    other => debug!("핸드셰이크 중 패킷 무시: {other:?}"),
                },
                EnginePacket::Close => {
                    return Err(CoreError::Network("서버가 핸드셰이크를 닫음".to_string()))
                }
                other => debug!("핸드셰이크 중 Engine.IO 패킷 무시: {other:?}"),
            }
        }
        Err(CoreError::Network("핸드셰이크 중 스트림 종료".to_string()))
    }

    /// 수신 루프: ping 응답, 이벤트/ack 분배, 종료 통지
    async fn read_loop(
        mut read: SplitStream<WsStream>,
        write: Arc<tokio::sync::Mutex<WsWrite>>,
        acks: PendingAcks,
        tx: mpsc::Sender<ChannelSignal>,
    ) {
        let reason = loop {
            let Some(frame) = read.next().await else {
                break "transport close".to_string();
            };
            let text = match frame {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Close(_)) => break "transport close".to_string(),
                Ok(_) => continue,
                Err(e) => {
                    warn!("WebSocket 수신 에러: {e}");
                    break "transport error".to_string();
                }
            };

            let packet = match EnginePacket::decode(&text) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Engine.IO 패킷 무시: {e}");
                    continue;
                }
            };

            match packet {
                EnginePacket::Ping(data) => {
                    let mut w = write.lock().await;
                    if let Err(e) = send_frame(&mut w, EnginePacket::Pong(data).encode()).await {
                        warn!("pong 전송 실패: {e}");
                        break "ping timeout".to_string();
                    }
                }
                EnginePacket::Close => break "transport close".to_string(),
                EnginePacket::Message(body) => match SocketPacket::decode(&body) {
                    Ok(SocketPacket::Event { name, args, .. }) => {
                        let payload = args.into_iter().next().unwrap_or(Value::Null);
                        let signal = ChannelSignal::Event(ChannelEvent::new(name, payload));
                        if tx.send(signal).await.is_err() {
                            debug!("신호 수신 측 종료: 수신 루프 종료");
                            return;
                        }
                    }
                    Ok(SocketPacket::Ack { id, args, .. }) => {
                        if let Some(waiter) = acks.lock().remove(&id) {
                            let _ = waiter.send(args);
                        } else {
                            debug!("대기자 없는 ack 무시: {id}");
                        }
                    }
                    Ok(SocketPacket::Disconnect { .. }) => {
                        break "io server disconnect".to_string()
                    }
                    Ok(other) => debug!("Socket.IO 패킷 무시: {other:?}"),
                    Err(e) => warn!("Socket.IO 패킷 무시: {e}"),
                },
                _ => {}
            }
        };

        acks.lock().clear();
        info!("실시간 채널 종료: {reason}");
        let _ = tx.send(ChannelSignal::Disconnected { reason }).await;
    }
}

async fn send_frame(write: &mut WsWrite, frame: String) -> Result<(), CoreError> {
    write
        .send(Message::Text(frame.into()))
        .await
        .map_err(|e| CoreError::Network(format!("WebSocket 전송 실패: {e}")))
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(&self, auth: ChannelAuth) -> Result<ChannelSession, CoreError> {
        info!("실시간 채널 연결: {}", self.url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 연결 실패: {e}")))?;

        let (mut write, mut read) = ws_stream.split();
        Self::handshake(&mut write, &mut read, &auth).await?;
        debug!("Socket.IO 연결 완료: user={}", auth.user_id);

        let write = Arc::new(tokio::sync::Mutex::new(write));
        let acks: PendingAcks = Arc::new(Mutex::new(HashMap::new()));
        let (tx, signals) = mpsc::channel(SIGNAL_BUFFER);

        tokio::spawn(Self::read_loop(read, write.clone(), acks.clone(), tx));

        Ok(ChannelSession {
            link: Arc::new(WsLink {
                write,
                acks,
                next_ack: AtomicU64::new(0),
            }),
            signals,
        })
    }
}

/// 열린 Socket.IO 채널의 송신 측
pub struct WsLink {
    write: Arc<tokio::sync::Mutex<WsWrite>>,
    acks: PendingAcks,
    next_ack: AtomicU64,
}

impl WsLink {
    async fn send_packet(&self, packet: SocketPacket) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        send_frame(&mut write, packet.to_frame()).await
    }
}

#[async_trait]
impl ChannelLink for WsLink {
    async fn emit(&self, event: &str, payload: Value) -> Result<(), CoreError> {
        debug!("emit: {event}");
        self.send_packet(SocketPacket::event(event, payload, None))
            .await
    }

    async fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, CoreError> {
        let id = self.next_ack.fetch_add(1, Ordering::Relaxed);
        let (ack_tx, ack_rx) = oneshot::channel();
        self.acks.lock().insert(id, ack_tx);

        debug!("emit (ack {id}): {event}");
        if let Err(e) = self
            .send_packet(SocketPacket::event(event, payload, Some(id)))
            .await
        {
            self.acks.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(Ok(args)) => Ok(args.into_iter().next().unwrap_or(Value::Null)),
            Ok(Err(_)) => Err(CoreError::NotConnected),
            Err(_) => {
                self.acks.lock().remove(&id);
                Err(CoreError::ExecutionTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn close(&self) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        // Socket.IO disconnect 후 WebSocket close
        let _ = send_frame(
            &mut write,
            SocketPacket::Disconnect {
                namespace: crate::protocol::DEFAULT_NAMESPACE.to_string(),
            }
            .to_frame(),
        )
        .await;
        write
            .send(Message::Close(None))
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 종료 실패: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_url_from_http_base() {
        let url = engine_url("http://localhost:5000", "/socket.io").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn engine_url_secure_and_trailing_slash() {
        let url = engine_url("https://api.example.com/", "socket.io/").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://api.example.com/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn engine_url_rejects_unknown_scheme() {
        assert!(matches!(
            engine_url("ftp://example.com", "/socket.io"),
            Err(CoreError::Config(_))
        ));
        assert!(engine_url("not a url", "/socket.io").is_err());
    }

    #[test]
    fn connector_ignores_polling_transport() {
        let connector = WsConnector::new("http://localhost:5000", &SocketConfig::default()).unwrap();
        assert_eq!(connector.url().scheme(), "ws");
    }

    #[tokio::test]
    async fn open_fails_when_server_unreachable() {
        let connector = WsConnector::new("http://127.0.0.1:1", &SocketConfig::default()).unwrap();
        let result = connector
            .open(ChannelAuth {
                token: None,
                user_id: "u1".to_string(),
            })
            .await;
        assert!(matches!(result, Err(CoreError::Network(_))));
    }
}
