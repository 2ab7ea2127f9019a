//! 실시간 채널 포트.
//!
//! 구현: `veil-network::ws_client` (Socket.IO over WebSocket).
//! `ConnectionManager`는 이 포트만 알고, 테스트는 가짜 커넥터를 주입한다.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::CoreError;

/// 채널 수신 이벤트 (이름 + JSON 페이로드)
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub name: String,
    pub payload: Value,
}

impl ChannelEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// 연결 수립 이후 전송 계층이 올려보내는 신호
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// 서버 이벤트
    Event(ChannelEvent),
    /// 연결 종료 (서버/전송 계층 사유)
    Disconnected { reason: String },
}

/// 핸드셰이크 인증 페이로드 (`{token, userId}`)
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAuth {
    /// `Bearer ` 접두사를 제거한 토큰
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub user_id: String,
}

/// 열린 채널의 송신 측
#[async_trait]
pub trait ChannelLink: Send + Sync {
    /// 이벤트 송신 (ack 없음)
    async fn emit(&self, event: &str, payload: Value) -> Result<(), CoreError>;

    /// 이벤트 송신 후 ack 대기
    async fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, CoreError>;

    /// 채널 닫기
    async fn close(&self) -> Result<(), CoreError>;
}

/// 새로 열린 채널
pub struct ChannelSession {
    pub link: Arc<dyn ChannelLink>,
    pub signals: mpsc::Receiver<ChannelSignal>,
}

/// 채널 연결기
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// 핸드셰이크까지 완료된 채널을 연다. 서버가 연결을 거부하면 `Err`.
    async fn open(&self, auth: ChannelAuth) -> Result<ChannelSession, CoreError>;
}
