//! 대시보드 표시 모델 병합.
//!
//! 데모 스트림과 정기 스트림을 하나의 표시 모델로 합친다.
//! 정기 스트림이 활성이면 항상 정기 스트림이 우선한다. 순수 함수.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use veil_core::models::scan::{ScanSession, ScanStage};

/// 표시용 스캔 유형
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanTypeLabel {
    Manual,
    Hourly,
    #[default]
    Simulation,
}

impl ScanTypeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanTypeLabel::Manual => "Manual Scan",
            ScanTypeLabel::Hourly => "Hourly Scan",
            ScanTypeLabel::Simulation => "Simulation",
        }
    }
}

impl fmt::Display for ScanTypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ScanTypeLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// 병합된 대시보드 표시 모델
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub is_actively_scanning: bool,
    pub progress: u8,
    pub current_site: Option<String>,
    pub current_stage: Option<ScanStage>,
    pub scan_type_label: ScanTypeLabel,
    pub sites_scanned: u32,
    pub threats_found: u32,
    pub total_matches: u32,
    pub error: Option<String>,
    pub last_scan_time: Option<DateTime<Utc>>,
    pub next_scan_time: Option<DateTime<Utc>>,
}

/// 0은 "값 없음"으로 보고 이전 값을 유지
fn keep_counter(current: u32, previous: u32) -> u32 {
    if current == 0 {
        previous
    } else {
        current
    }
}

/// 두 스트림 + 이전 표시값 → 새 표시 모델
///
/// `hourly.is_manual`이 정기 스트림의 수동 실행 여부를 나타낸다.
pub fn merge_streams(
    simulation: &ScanSession,
    hourly: &ScanSession,
    previous: &DashboardView,
) -> DashboardView {
    let hourly_active = hourly.is_active;
    let active = if hourly_active { hourly } else { simulation };

    let scan_type_label = match (hourly_active, hourly.is_manual) {
        (true, true) => ScanTypeLabel::Manual,
        (true, false) => ScanTypeLabel::Hourly,
        (false, _) => ScanTypeLabel::Simulation,
    };

    let error = if hourly_active {
        hourly.error.clone()
    } else {
        simulation.error.clone().or_else(|| hourly.error.clone())
    };

    DashboardView {
        is_actively_scanning: simulation.is_active || hourly_active,
        progress: active.progress,
        current_site: active.current_site.clone(),
        current_stage: active.current_stage.clone(),
        scan_type_label,
        sites_scanned: keep_counter(active.metrics.sites_scanned, previous.sites_scanned),
        threats_found: keep_counter(active.metrics.threats_found, previous.threats_found),
        total_matches: keep_counter(active.metrics.total_matches, previous.total_matches),
        error,
        last_scan_time: hourly.metrics.last_scan_time.or(previous.last_scan_time),
        next_scan_time: hourly.metrics.next_scan_time.or(previous.next_scan_time),
    }
}
