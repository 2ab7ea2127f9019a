//! 스캔 세션/메트릭/이력 모델.
//!
//! 정기(hourly) 스트림과 데모(simulation) 스트림이 같은 모델을 공유한다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 스캔 스트림 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    /// 로컬 데모 스트림
    Simulation,
    /// 서버 정기 스캔 (수동 1회 실행 포함)
    Hourly,
}

/// 스캔 단계
///
/// 서버 파이프라인 순서: Initializing → Connecting → Searching → Analyzing → Verifying.
/// `Completed`/`Stopped`/`Error`는 클라이언트가 종료 상태 표시에 쓴다.
/// 알 수 없는 단계 문자열은 `Other`로 보존한다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScanStage {
    Initializing,
    Connecting,
    Searching,
    Analyzing,
    Verifying,
    Completed,
    Stopped,
    Error,
    Other(String),
}

impl ScanStage {
    /// 서버 파이프라인 단계 (순서대로)
    pub const PIPELINE: [ScanStage; 5] = [
        ScanStage::Initializing,
        ScanStage::Connecting,
        ScanStage::Searching,
        ScanStage::Analyzing,
        ScanStage::Verifying,
    ];

    /// 표시 문자열
    pub fn as_str(&self) -> &str {
        match self {
            ScanStage::Initializing => "Initializing",
            ScanStage::Connecting => "Connecting",
            ScanStage::Searching => "Searching",
            ScanStage::Analyzing => "Analyzing",
            ScanStage::Verifying => "Verifying",
            ScanStage::Completed => "Completed",
            ScanStage::Stopped => "Stopped",
            ScanStage::Error => "Error",
            ScanStage::Other(s) => s,
        }
    }

    /// 파이프라인 내 순번 (종료/미지 단계는 None)
    pub fn ordinal(&self) -> Option<usize> {
        Self::PIPELINE.iter().position(|s| s == self)
    }
}

impl From<&str> for ScanStage {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "initializing" => ScanStage::Initializing,
            "connecting" => ScanStage::Connecting,
            "searching" => ScanStage::Searching,
            "analyzing" => ScanStage::Analyzing,
            "verifying" => ScanStage::Verifying,
            "completed" => ScanStage::Completed,
            "stopped" => ScanStage::Stopped,
            "error" => ScanStage::Error,
            _ => ScanStage::Other(value.to_string()),
        }
    }
}

impl From<String> for ScanStage {
    fn from(value: String) -> Self {
        ScanStage::from(value.as_str())
    }
}

impl From<ScanStage> for String {
    fn from(stage: ScanStage) -> Self {
        stage.as_str().to_string()
    }
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 세션 누적 메트릭
///
/// 카운터는 서버 값을 그대로 덮어쓴다 (클라이언트가 증분하지 않음).
/// 단계 표시 필드는 서버 이벤트 패스스루.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanMetrics {
    pub sites_scanned: u32,
    pub threats_found: u32,
    pub total_matches: u32,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub next_scan_time: Option<DateTime<Utc>>,
    pub stage_icon: Option<String>,
    pub stage_description: Option<String>,
    /// 단계 소요 시간 (초)
    pub stage_duration: Option<f64>,
    /// 단계 진행률 (0-100)
    pub stage_progress: Option<u8>,
    /// 남은 시간 (초)
    pub time_remaining: Option<f64>,
    pub site_index: Option<u32>,
    pub total_sites: Option<u32>,
}

/// 진행 중이거나 마지막으로 끝난 스캔 세션
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    pub kind: ScanKind,
    pub is_active: bool,
    /// 진행률 (0-100)
    pub progress: u8,
    pub current_site: Option<String>,
    pub current_stage: Option<ScanStage>,
    /// hourly 전용: 사용자가 직접 실행한 1회 스캔
    pub is_manual: bool,
    pub error: Option<String>,
    pub metrics: ScanMetrics,
}

impl ScanSession {
    /// 유휴 세션
    pub fn idle(kind: ScanKind) -> Self {
        Self {
            kind,
            is_active: false,
            progress: 0,
            current_site: None,
            current_stage: None,
            is_manual: false,
            error: None,
            metrics: ScanMetrics::default(),
        }
    }
}

/// 진행률 값을 0-100 정수로 정규화
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// 이력 항목 스캔 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryScanType {
    Manual,
    Hourly,
}

/// 완료된 스캔 기록 (불변)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistoryEntry {
    /// 서버 스캔 ID 또는 수신 시각(ms) 대체값
    pub id: String,
    /// 클라이언트 수신 시각
    pub timestamp: DateTime<Utc>,
    /// 소요 시간 (초)
    pub duration: u64,
    pub sites_scanned: u32,
    pub threats_found: u32,
    pub total_matches: u32,
    #[serde(rename = "type")]
    pub scan_type: HistoryScanType,
}
