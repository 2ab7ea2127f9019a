//! 애플리케이션 설정 구조체.
//!
//! 서버 URL, 실시간 채널(재연결/하트비트), 스캔 표시 타이밍, 자격증명 경로 등
//! 런타임 설정을 정의한다. 바이너리에서 `config` crate로 파일/환경변수를 겹쳐 로드한다.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 애플리케이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// REST 서버 연결 설정
    pub server: ServerConfig,
    /// 실시간 채널 설정
    #[serde(default)]
    pub socket: SocketConfig,
    /// 스캔 표시 설정
    #[serde(default)]
    pub scan: ScanConfig,
    /// 자격증명 저장소 설정
    #[serde(default)]
    pub credentials: CredentialConfig,
}

/// 실행 환경
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// 개발: 401 시 토큰 갱신/강제 로그아웃을 하지 않는다
    Development,
    /// 운영
    #[default]
    Production,
}

/// 서버 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// API 서버 기본 URL (예: "https://api.example.com")
    pub base_url: String,
    /// 사용자 API 접두사
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// 관리자 API 접두사
    #[serde(default = "default_admin_prefix")]
    pub admin_prefix: String,
    /// TCP 연결 수립 타임아웃 (초). 요청 자체에는 시간 제한을 두지 않는다.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 실행 환경
    #[serde(default)]
    pub environment: Environment,
}

/// 실시간 채널 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// 채널 엔드포인트 (없으면 `server.base_url`에서 유도)
    #[serde(default)]
    pub url: Option<String>,
    /// 핸드셰이크 경로
    #[serde(default = "default_socket_path")]
    pub path: String,
    /// 허용 전송 방식 (우선순위 순)
    #[serde(default = "default_transports")]
    pub transports: Vec<String>,
    /// 하트비트 주기 (초)
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// 최대 재연결 시도 횟수
    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,
    /// 재연결 시도 간 지연 (밀리초, 고정)
    #[serde(default = "default_reconnection_delay_ms")]
    pub reconnection_delay_ms: u64,
    /// 시도당 연결 타임아웃 (초)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 재연결 후 상태 재동기화 지연 (밀리초)
    #[serde(default = "default_resync_delay_ms")]
    pub resync_delay_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: None,
            path: default_socket_path(),
            transports: default_transports(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            reconnection_attempts: default_reconnection_attempts(),
            reconnection_delay_ms: default_reconnection_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            resync_delay_ms: default_resync_delay_ms(),
        }
    }
}

impl SocketConfig {
    /// 하트비트 주기
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// 재연결 지연
    pub fn reconnection_delay(&self) -> Duration {
        Duration::from_millis(self.reconnection_delay_ms)
    }

    /// 시도당 연결 타임아웃
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// 재동기화 지연
    pub fn resync_delay(&self) -> Duration {
        Duration::from_millis(self.resync_delay_ms)
    }
}

/// 스캔 표시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// 완료 후 100%를 유지하는 시간 (초)
    #[serde(default = "default_completion_display_secs")]
    pub completion_display_secs: u64,
    /// 최근 스캔 이력 보관 개수
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// 정기 스캔 기본 주기 (분)
    #[serde(default = "default_interval_minutes")]
    pub default_interval_minutes: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            completion_display_secs: default_completion_display_secs(),
            history_limit: default_history_limit(),
            default_interval_minutes: default_interval_minutes(),
        }
    }
}

impl ScanConfig {
    /// 완료 표시 지연
    pub fn completion_display(&self) -> Duration {
        Duration::from_secs(self.completion_display_secs)
    }
}

/// 자격증명 저장소 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// 토큰 파일 경로 (없으면 플랫폼 데이터 디렉토리)
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

impl AppConfig {
    /// 기본 설정값 반환
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:5000".to_string(),
                api_prefix: default_api_prefix(),
                admin_prefix: default_admin_prefix(),
                connect_timeout_secs: default_connect_timeout_secs(),
                environment: Environment::default(),
            },
            socket: SocketConfig::default(),
            scan: ScanConfig::default(),
            credentials: CredentialConfig::default(),
        }
    }

    /// 설정값 유효성 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.server.base_url.starts_with("http://")
            || self.server.base_url.starts_with("https://"))
        {
            return Err(CoreError::Validation {
                field: "server.base_url".to_string(),
                message: "http:// 또는 https:// 로 시작해야 합니다".to_string(),
            });
        }
        if self.socket.heartbeat_interval_secs == 0 {
            return Err(CoreError::Validation {
                field: "socket.heartbeat_interval_secs".to_string(),
                message: "0보다 커야 합니다".to_string(),
            });
        }
        if !self.socket.transports.iter().any(|t| t == "websocket") {
            return Err(CoreError::Validation {
                field: "socket.transports".to_string(),
                message: "websocket 전송이 포함되어야 합니다".to_string(),
            });
        }
        if self.scan.history_limit == 0 {
            return Err(CoreError::Validation {
                field: "scan.history_limit".to_string(),
                message: "0보다 커야 합니다".to_string(),
            });
        }
        if self.scan.default_interval_minutes == 0 {
            return Err(CoreError::Validation {
                field: "scan.default_interval_minutes".to_string(),
                message: "0보다 커야 합니다".to_string(),
            });
        }
        Ok(())
    }

    /// REST 연결 수립 타임아웃
    pub fn rest_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.server.connect_timeout_secs)
    }

    /// 실시간 채널 엔드포인트 (명시값 우선, 없으면 REST 기본 URL)
    pub fn socket_endpoint(&self) -> &str {
        self.socket
            .url
            .as_deref()
            .unwrap_or(self.server.base_url.as_str())
    }
}

// ============================================================
// 기본값 함수
// ============================================================

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}
fn default_admin_prefix() -> String {
    "/api".to_string()
}
fn default_socket_path() -> String {
    "/socket.io".to_string()
}
fn default_transports() -> Vec<String> {
    vec!["websocket".to_string(), "polling".to_string()]
}
fn default_heartbeat_interval_secs() -> u64 {
    25
}
fn default_reconnection_attempts() -> u32 {
    5
}
fn default_reconnection_delay_ms() -> u64 {
    1_000
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_resync_delay_ms() -> u64 {
    1_000
}
fn default_completion_display_secs() -> u64 {
    3
}
fn default_history_limit() -> usize {
    10
}
fn default_interval_minutes() -> u32 {
    60
}
