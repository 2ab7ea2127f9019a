//! Veil 핵심 에러 타입.
//!
//! 모든 어댑터 crate는 이 타입을 그대로 반환하거나 상태로 변환한다.

use thiserror::Error;

/// 코어 레이어 에러.
/// 직렬화, 설정, 네트워크, 채널 등 도메인 공통 에러를 정의한다.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패 ({field}): {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 인증 실패 (토큰 없음, 만료, 401 등)
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 리소스를 찾을 수 없음
    #[error("{resource_type} 미발견: {id}")]
    NotFound {
        /// 리소스 종류 (예: "Scan", "Plan")
        resource_type: String,
        /// 리소스 식별자
        id: String,
    },

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),

    /// 네트워크 에러 (연결 실패, 타임아웃)
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// Rate Limit 초과 (429)
    #[error("요청 한도 초과, {retry_after_secs}초 후 재시도")]
    RateLimit {
        /// 재시도 대기 시간 (초)
        retry_after_secs: u64,
    },

    /// 서비스 일시 불가 (503)
    #[error("서비스 일시 불가: {0}")]
    ServiceUnavailable(String),

    /// 서버가 `success: false` 또는 비정상 상태 코드로 응답
    #[error("API 에러 ({status}): {message}")]
    Api {
        /// HTTP 상태 코드 (envelope 실패는 200)
        status: u16,
        /// 서버 메시지
        message: String,
    },

    /// 실시간 채널 미연결
    #[error("Not connected to server")]
    NotConnected,

    /// 채널 프로토콜 위반 (잘못된 패킷 등)
    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    /// 실행 타임아웃
    #[error("실행 타임아웃: {timeout_ms}ms 초과")]
    ExecutionTimeout {
        /// 초과된 타임아웃 시간 (밀리초)
        timeout_ms: u64,
    },

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),
}
