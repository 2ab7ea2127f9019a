//! 실시간 채널 연결 상태 모델.

use serde::{Deserialize, Serialize};

/// 사용자 룸 이름 (`user_{userId}`)
pub fn room_name(user_id: &str) -> String {
    format!("user_{user_id}")
}

/// 사용자 세션별 채널 연결 상태
///
/// `current_room`은 `is_connected`가 true인 동안에만 Some이다.
/// 상태 전이는 아래 메서드로만 수행해 이 불변식을 지킨다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// 연결 소유 사용자 (없으면 연결을 열지 않는다)
    pub user_id: Option<String>,
    /// 채널 연결 여부
    pub is_connected: bool,
    /// 참여 중인 룸
    pub current_room: Option<String>,
    /// 마지막 연결 에러
    pub last_error: Option<String>,
    /// 연속 재연결 시도 횟수 (최대값으로 캡)
    pub reconnect_attempts: u32,
}

impl ConnectionState {
    /// 사용자용 초기 상태
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Self::default()
        }
    }

    /// `connect` 수신
    pub fn on_connected(&mut self) {
        self.is_connected = true;
        self.reconnect_attempts = 0;
        self.last_error = None;
    }

    /// `disconnect` 수신 또는 명시적 해제: 연결/룸을 함께 비운다
    pub fn on_disconnected(&mut self) {
        self.is_connected = false;
        self.current_room = None;
    }

    /// `connect_error` 수신
    pub fn on_connect_error(&mut self, error: impl Into<String>, max_attempts: u32) {
        self.on_disconnected();
        self.last_error = Some(error.into());
        self.reconnect_attempts = (self.reconnect_attempts + 1).min(max_attempts);
    }

    /// 룸 참여 ack 성공. 연결이 끊긴 뒤 도착한 ack는 무시한다.
    pub fn on_room_joined(&mut self, user_id: &str) -> bool {
        if !self.is_connected {
            return false;
        }
        self.current_room = Some(room_name(user_id));
        true
    }

    /// 명령 전송 가능 여부 (연결 + 룸 참여)
    pub fn is_ready(&self) -> bool {
        self.is_connected && self.current_room.is_some()
    }
}
