//! 실시간 채널 이벤트 어휘.
//!
//! 수신 이벤트 이름/페이로드와 송신 명령 이름/페이로드를 정의한다.
//! 페이로드 필드는 모두 선택적이며, 빠진 필드는 리듀서에서 "이전 값 유지"로 처리된다.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::models::settings::SettingsPatch;

/// 수신 이벤트 이름
pub mod inbound {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT_ERROR: &str = "connect_error";
    pub const HOURLY_SCAN_STARTED: &str = "hourly_scan_started";
    pub const HOURLY_SCAN_PROGRESS: &str = "hourly_scan_progress";
    pub const HOURLY_SCAN_STAGE_PROGRESS: &str = "hourly_scan_stage_progress";
    pub const HOURLY_SCAN_STAGE_COMPLETE: &str = "hourly_scan_stage_complete";
    pub const HOURLY_SCAN_COMPLETED: &str = "hourly_scan_completed";
    pub const HOURLY_SCAN_STOPPED: &str = "hourly_scan_stopped";
    pub const HOURLY_SCAN_ERROR: &str = "hourly_scan_error";
    pub const HOURLY_SCAN_STATUS: &str = "hourly_scan_status";
    pub const HOURLY_SCAN_SETTINGS_UPDATED: &str = "hourly_scan_settings_updated";

    /// hourly 스트림 리듀서가 구독하는 이벤트 전체
    pub const HOURLY_SCAN_EVENTS: [&str; 9] = [
        HOURLY_SCAN_STARTED,
        HOURLY_SCAN_PROGRESS,
        HOURLY_SCAN_STAGE_PROGRESS,
        HOURLY_SCAN_STAGE_COMPLETE,
        HOURLY_SCAN_COMPLETED,
        HOURLY_SCAN_STOPPED,
        HOURLY_SCAN_ERROR,
        HOURLY_SCAN_STATUS,
        HOURLY_SCAN_SETTINGS_UPDATED,
    ];
}

/// 송신 명령 이름
pub mod outbound {
    pub const JOIN: &str = "join";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const HOURLY_SCAN_START: &str = "hourly_scan:start";
    pub const HOURLY_SCAN_STOP: &str = "hourly_scan:stop";
    pub const HOURLY_SCAN_STATUS: &str = "hourly_scan:status";
    pub const HOURLY_SCAN_UPDATE_SETTINGS: &str = "hourly_scan:update_settings";
}

/// 서버 스캔 ID. 문자열과 숫자 모두 문자열로 받는다.
fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(id) => Some(id),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    })
}

/// 형식이 맞지 않는 필드는 누락으로 취급한다.
/// 생명주기 이벤트(started/completed)가 부가 필드 하나 때문에 버려지지 않게 한다.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// `hourly_scan_started`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedPayload {
    #[serde(default, alias = "isManual", deserialize_with = "lenient")]
    pub manual: Option<bool>,
    #[serde(default, alias = "id", deserialize_with = "opaque_id")]
    pub scan_id: Option<String>,
}

/// `hourly_scan_progress`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub progress: Option<f64>,
    pub current_site: Option<String>,
    pub current_stage: Option<String>,
    pub sites_scanned: Option<u32>,
    #[serde(alias = "potentialThreats")]
    pub threats_found: Option<u32>,
    pub total_matches: Option<u32>,
    pub stage_icon: Option<String>,
    pub stage_description: Option<String>,
    pub stage_duration: Option<f64>,
    pub time_remaining: Option<f64>,
    pub site_index: Option<u32>,
    pub total_sites: Option<u32>,
}

/// `hourly_scan_stage_progress`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageProgressPayload {
    pub stage_progress: Option<f64>,
    pub time_remaining: Option<f64>,
    pub stage_icon: Option<String>,
}

/// `hourly_scan_stage_complete`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCompletePayload {
    #[serde(alias = "completedStage")]
    pub stage: Option<String>,
}

/// `hourly_scan_completed`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPayload {
    #[serde(default, alias = "id", deserialize_with = "opaque_id")]
    pub scan_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub sites_scanned: Option<u32>,
    #[serde(default, alias = "potentialThreats", deserialize_with = "lenient")]
    pub threats_found: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_matches: Option<u32>,
    /// 소요 시간 (초)
    #[serde(default, deserialize_with = "lenient")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub next_scan_time: Option<DateTime<Utc>>,
    #[serde(default, alias = "isManual", deserialize_with = "lenient")]
    pub manual: Option<bool>,
}

/// `hourly_scan_error`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorPayload {
    pub error: Option<String>,
}

/// `hourly_scan_status` (상태 조회 응답)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    #[serde(default)]
    pub success: bool,
    #[serde(alias = "isRunning")]
    pub is_active: Option<bool>,
    pub progress: Option<f64>,
    pub current_site: Option<String>,
    pub current_stage: Option<String>,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub next_scan_time: Option<DateTime<Utc>>,
    pub settings: Option<SettingsPatch>,
}

/// `hourly_scan_settings_updated`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SettingsUpdatedPayload {
    #[serde(default)]
    pub success: bool,
    pub settings: Option<SettingsPatch>,
}

/// hourly 스트림 수신 이벤트
#[derive(Debug, Clone, PartialEq)]
pub enum HourlyScanEvent {
    Started(StartedPayload),
    Progress(ProgressPayload),
    StageProgress(StageProgressPayload),
    StageComplete(StageCompletePayload),
    Completed(CompletedPayload),
    Stopped,
    Error(ErrorPayload),
    Status(StatusPayload),
    SettingsUpdated(SettingsUpdatedPayload),
}

impl HourlyScanEvent {
    /// 이벤트 이름 + JSON 페이로드 → 타입 이벤트
    ///
    /// hourly 어휘가 아닌 이름은 `Ok(None)`. 페이로드 형식 오류는 `Err`.
    /// `null`/누락 페이로드는 빈 객체로 취급한다.
    pub fn parse(name: &str, payload: &Value) -> Result<Option<Self>, CoreError> {
        let payload = if payload.is_null() {
            Value::Object(Default::default())
        } else {
            payload.clone()
        };

        let event = match name {
            inbound::HOURLY_SCAN_STARTED => Self::Started(serde_json::from_value(payload)?),
            inbound::HOURLY_SCAN_PROGRESS => Self::Progress(serde_json::from_value(payload)?),
            inbound::HOURLY_SCAN_STAGE_PROGRESS => {
                Self::StageProgress(serde_json::from_value(payload)?)
            }
            inbound::HOURLY_SCAN_STAGE_COMPLETE => {
                Self::StageComplete(serde_json::from_value(payload)?)
            }
            inbound::HOURLY_SCAN_COMPLETED => Self::Completed(serde_json::from_value(payload)?),
            inbound::HOURLY_SCAN_STOPPED => Self::Stopped,
            inbound::HOURLY_SCAN_ERROR => Self::Error(serde_json::from_value(payload)?),
            inbound::HOURLY_SCAN_STATUS => Self::Status(serde_json::from_value(payload)?),
            inbound::HOURLY_SCAN_SETTINGS_UPDATED => {
                Self::SettingsUpdated(serde_json::from_value(payload)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// 로그용 이벤트 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started(_) => inbound::HOURLY_SCAN_STARTED,
            Self::Progress(_) => inbound::HOURLY_SCAN_PROGRESS,
            Self::StageProgress(_) => inbound::HOURLY_SCAN_STAGE_PROGRESS,
            Self::StageComplete(_) => inbound::HOURLY_SCAN_STAGE_COMPLETE,
            Self::Completed(_) => inbound::HOURLY_SCAN_COMPLETED,
            Self::Stopped => inbound::HOURLY_SCAN_STOPPED,
            Self::Error(_) => inbound::HOURLY_SCAN_ERROR,
            Self::Status(_) => inbound::HOURLY_SCAN_STATUS,
            Self::SettingsUpdated(_) => inbound::HOURLY_SCAN_SETTINGS_UPDATED,
        }
    }
}

/// `hourly_scan:start` 옵션. 생략 필드는 컨트롤러가 기본값으로 채운다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartScanOptions {
    /// 없으면 현재 확정 설정의 주기
    pub interval_minutes: Option<u32>,
    /// 기본 true
    pub run_immediately: Option<bool>,
    /// 기본 false
    pub manual: Option<bool>,
}

impl StartScanOptions {
    /// 수동 1회 스캔 옵션 (`runImmediately: true, manual: true, intervalMinutes: 0`)
    pub fn manual_run() -> Self {
        Self {
            interval_minutes: Some(0),
            run_immediately: Some(true),
            manual: Some(true),
        }
    }
}

/// `hourly_scan:start` 송신 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScanCommand {
    pub interval_minutes: u32,
    pub run_immediately: bool,
    pub manual: bool,
}

impl StartScanCommand {
    /// 옵션 + 현재 주기 → 송신 페이로드
    pub fn from_options(options: &StartScanOptions, current_interval: u32) -> Self {
        Self {
            interval_minutes: options.interval_minutes.unwrap_or(current_interval),
            run_immediately: options.run_immediately.unwrap_or(true),
            manual: options.manual.unwrap_or(false),
        }
    }
}

/// `join` 송신 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCommand {
    pub user_id: String,
}

/// `heartbeat` 송신 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatCommand {
    pub user_id: String,
    /// Unix epoch 밀리초
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_progress_with_alias() {
        let payload = json!({
            "progress": 42,
            "currentSite": "brokerA.com",
            "currentStage": "Searching",
            "sitesScanned": 3,
            "potentialThreats": 1
        });
        let event = HourlyScanEvent::parse(inbound::HOURLY_SCAN_PROGRESS, &payload)
            .unwrap()
            .unwrap();
        match event {
            HourlyScanEvent::Progress(p) => {
                assert_eq!(p.progress, Some(42.0));
                assert_eq!(p.current_site.as_deref(), Some("brokerA.com"));
                assert_eq!(p.threats_found, Some(1));
                assert!(p.total_matches.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_null_payload_as_empty() {
        let event = HourlyScanEvent::parse(inbound::HOURLY_SCAN_STARTED, &Value::Null)
            .unwrap()
            .unwrap();
        assert_eq!(event, HourlyScanEvent::Started(StartedPayload::default()));
    }

    #[test]
    fn parse_unknown_name_is_none() {
        assert!(HourlyScanEvent::parse("chat_message", &json!({}))
            .unwrap()
            .is_none());
    }

    #[test]
    fn parse_malformed_payload_is_error() {
        let result = HourlyScanEvent::parse(inbound::HOURLY_SCAN_PROGRESS, &json!({"progress": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn completed_accepts_numeric_scan_id() {
        let payload = json!({ "scanId": 1730000000123u64, "sitesScanned": 10, "duration": 4.2 });
        let event = HourlyScanEvent::parse(inbound::HOURLY_SCAN_COMPLETED, &payload)
            .unwrap()
            .unwrap();
        match event {
            HourlyScanEvent::Completed(p) => {
                assert_eq!(p.scan_id.as_deref(), Some("1730000000123"));
                assert_eq!(p.sites_scanned, Some(10));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn completed_tolerates_mistyped_field() {
        let payload = json!({
            "id": "scan-9",
            "sitesScanned": "ten",
            "nextScanTime": 0,
            "manual": true
        });
        let event = HourlyScanEvent::parse(inbound::HOURLY_SCAN_COMPLETED, &payload)
            .unwrap()
            .unwrap();
        let HourlyScanEvent::Completed(p) = event else {
            panic!("completed 이벤트가 아님");
        };
        assert_eq!(p.scan_id.as_deref(), Some("scan-9"));
        assert!(p.sites_scanned.is_none());
        assert!(p.next_scan_time.is_none());
        assert_eq!(p.manual, Some(true));
    }

    #[test]
    fn start_command_defaults() {
        let cmd = StartScanCommand::from_options(&StartScanOptions::default(), 60);
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({"intervalMinutes": 60, "runImmediately": true, "manual": false})
        );

        let manual = StartScanCommand::from_options(&StartScanOptions::manual_run(), 60);
        assert_eq!(manual.interval_minutes, 0);
        assert!(manual.manual);
    }

    #[test]
    fn every_hourly_event_name_round_trips() {
        for name in inbound::HOURLY_SCAN_EVENTS {
            let event = HourlyScanEvent::parse(name, &json!({})).unwrap().unwrap();
            assert_eq!(event.name(), name);
        }
    }
}
