//! 정기(hourly) 스캔 스트림 리듀서.
//!
//! 수신 이벤트를 세션/메트릭/이력/설정 변경으로 환원하는 순수 상태 머신.
//! 타이머와 전송은 컨트롤러 몫이고, 여기서는 `ReduceOutcome`으로 요청만 한다.
//!
//! ```text
//! Idle ──started──▶ Active ──completed──▶ Completing ──(3s)──▶ Idle
//!                     │  ▲                    │
//!                     │  └─progress/stage     │
//!                     ├──stopped──▶ Idle ◀────┘ (stopped)
//!                     └──error────▶ Idle (error 유지)
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use veil_core::models::events::{
    CompletedPayload, HourlyScanEvent, ProgressPayload, StageProgressPayload, StartedPayload,
    StatusPayload,
};
use veil_core::models::optimistic::Optimistic;
use veil_core::models::scan::{
    clamp_progress, HistoryScanType, ScanHistoryEntry, ScanKind, ScanSession, ScanStage,
};
use veil_core::models::settings::HourlyScanSettings;

use crate::history::ScanHistory;

/// 서버 에러 메시지가 비었을 때 표시 문자열
pub const DEFAULT_SCAN_ERROR: &str = "An error occurred during scanning";

/// 명령 전제 조건 실패 메시지
pub const NOT_CONNECTED_ERROR: &str = "Not connected to server";

/// 세션 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPhase {
    Idle,
    Active,
    /// 완료 직후 100% 표시 구간
    Completing,
}

/// 리듀서가 컨트롤러에 요청하는 후속 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOutcome {
    None,
    /// 완료 표시 지연 후 `finish_completion` 호출 필요
    ScheduleCompletionReset,
}

/// hourly 스트림 상태
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyScanState {
    session: ScanSession,
    settings: Optimistic<HourlyScanSettings>,
    history: ScanHistory,
    phase: ScanPhase,
}

impl Default for HourlyScanState {
    fn default() -> Self {
        Self::new(HourlyScanSettings::default(), ScanHistory::default())
    }
}

impl HourlyScanState {
    pub fn new(settings: HourlyScanSettings, history: ScanHistory) -> Self {
        Self {
            session: ScanSession::idle(ScanKind::Hourly),
            settings: Optimistic::new(settings),
            history,
            phase: ScanPhase::Idle,
        }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// 서버 확정 설정
    pub fn settings(&self) -> &HourlyScanSettings {
        self.settings.confirmed()
    }

    /// 확정값 + 응답 대기 중인 요청값
    pub fn settings_state(&self) -> &Optimistic<HourlyScanSettings> {
        &self.settings
    }

    /// 최신순 이력
    pub fn history(&self) -> Vec<ScanHistoryEntry> {
        self.history.recent()
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// 이벤트 적용
    pub fn apply(&mut self, event: HourlyScanEvent, now: DateTime<Utc>) -> ReduceOutcome {
        match event {
            HourlyScanEvent::Started(payload) => self.on_started(payload),
            HourlyScanEvent::Progress(payload) => self.on_progress(payload),
            HourlyScanEvent::StageProgress(payload) => self.on_stage_progress(payload),
            HourlyScanEvent::StageComplete(payload) => {
                debug!("단계 완료: {}", payload.stage.as_deref().unwrap_or("-"));
            }
            HourlyScanEvent::Completed(payload) => {
                self.on_completed(payload, now);
                return ReduceOutcome::ScheduleCompletionReset;
            }
            HourlyScanEvent::Stopped => self.on_stopped(),
            HourlyScanEvent::Error(payload) => {
                let message = payload
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SCAN_ERROR.to_string());
                self.on_error(message);
            }
            HourlyScanEvent::Status(payload) => self.on_status(payload),
            HourlyScanEvent::SettingsUpdated(payload) => {
                if payload.success {
                    let mut merged = self.settings.confirmed().clone();
                    match payload.settings.as_ref() {
                        Some(patch) => merged.merge(patch),
                        None => {
                            if let Some(pending) = self.settings.pending() {
                                merged = pending.clone();
                            }
                        }
                    }
                    self.settings.confirm(merged);
                } else if self.settings.rollback().is_some() {
                    warn!("설정 변경 거부: 요청값 폐기");
                }
            }
        }
        ReduceOutcome::None
    }

    fn on_started(&mut self, payload: StartedPayload) {
        let session = &mut self.session;
        session.is_active = true;
        session.progress = 0;
        session.current_site = None;
        session.current_stage = Some(ScanStage::Initializing);
        session.error = None;
        session.is_manual = payload.manual.unwrap_or(false);

        let metrics = &mut session.metrics;
        metrics.stage_icon = None;
        metrics.stage_description = None;
        metrics.stage_duration = None;
        metrics.stage_progress = None;
        metrics.time_remaining = None;
        metrics.site_index = None;
        metrics.total_sites = None;

        self.phase = ScanPhase::Active;
        debug!(
            "정기 스캔 시작 (manual={}, id={})",
            self.session.is_manual,
            payload.scan_id.as_deref().unwrap_or("-")
        );
    }

    fn on_progress(&mut self, payload: ProgressPayload) {
        if self.phase != ScanPhase::Active {
            debug!("비활성 세션의 progress 무시 ({:?})", self.phase);
            return;
        }

        let session = &mut self.session;
        if let Some(progress) = payload.progress {
            session.progress = session.progress.max(clamp_progress(progress));
        }
        if let Some(site) = payload.current_site {
            session.current_site = Some(site);
        }
        if let Some(stage) = payload.current_stage {
            session.current_stage = Some(ScanStage::from(stage));
        }

        let metrics = &mut session.metrics;
        if let Some(v) = payload.sites_scanned {
            metrics.sites_scanned = v;
        }
        if let Some(v) = payload.threats_found {
            metrics.threats_found = v;
        }
        if let Some(v) = payload.total_matches {
            metrics.total_matches = v;
        }
        if payload.stage_icon.is_some() {
            metrics.stage_icon = payload.stage_icon;
        }
        if payload.stage_description.is_some() {
            metrics.stage_description = payload.stage_description;
        }
        if payload.stage_duration.is_some() {
            metrics.stage_duration = payload.stage_duration;
        }
        if payload.time_remaining.is_some() {
            metrics.time_remaining = payload.time_remaining;
        }
        if payload.site_index.is_some() {
            metrics.site_index = payload.site_index;
        }
        if payload.total_sites.is_some() {
            metrics.total_sites = payload.total_sites;
        }
    }

    fn on_stage_progress(&mut self, payload: StageProgressPayload) {
        if self.phase != ScanPhase::Active {
            return;
        }
        let metrics = &mut self.session.metrics;
        if let Some(stage_progress) = payload.stage_progress {
            metrics.stage_progress = Some(clamp_progress(stage_progress));
        }
        if payload.time_remaining.is_some() {
            metrics.time_remaining = payload.time_remaining;
        }
        if payload.stage_icon.is_some() {
            metrics.stage_icon = payload.stage_icon;
        }
    }

    fn on_completed(&mut self, payload: CompletedPayload, now: DateTime<Utc>) {
        let scan_type = if payload.manual.unwrap_or(self.session.is_manual) {
            HistoryScanType::Manual
        } else {
            HistoryScanType::Hourly
        };
        let entry = ScanHistoryEntry {
            id: payload
                .scan_id
                .unwrap_or_else(|| now.timestamp_millis().to_string()),
            timestamp: now,
            duration: payload
                .duration
                .filter(|d| d.is_finite())
                .map(|d| d.max(0.0).round() as u64)
                .unwrap_or(0),
            sites_scanned: payload.sites_scanned.unwrap_or(0),
            threats_found: payload.threats_found.unwrap_or(0),
            total_matches: payload.total_matches.unwrap_or(0),
            scan_type,
        };

        let session = &mut self.session;
        session.is_active = false;
        session.progress = 100;
        session.current_site = None;
        session.current_stage = Some(ScanStage::Completed);
        session.is_manual = false;

        let metrics = &mut session.metrics;
        if let Some(v) = payload.sites_scanned {
            metrics.sites_scanned = v;
        }
        if let Some(v) = payload.threats_found {
            metrics.threats_found = v;
        }
        if let Some(v) = payload.total_matches {
            metrics.total_matches = v;
        }
        metrics.last_scan_time = Some(now);
        if payload.next_scan_time.is_some() {
            metrics.next_scan_time = payload.next_scan_time;
        }

        debug!(
            "정기 스캔 완료: id={}, sites={}, threats={}",
            entry.id, entry.sites_scanned, entry.threats_found
        );
        self.history.push(entry);
        self.phase = ScanPhase::Completing;
    }

    fn on_stopped(&mut self) {
        let session = &mut self.session;
        session.is_active = false;
        session.progress = 0;
        session.current_site = None;
        session.current_stage = Some(ScanStage::Stopped);
        session.is_manual = false;
        session.error = None;
        self.phase = ScanPhase::Idle;
    }

    fn on_error(&mut self, message: String) {
        warn!("정기 스캔 에러: {message}");
        let session = &mut self.session;
        session.is_active = false;
        session.progress = 0;
        session.current_site = None;
        session.current_stage = Some(ScanStage::Error);
        session.is_manual = false;
        session.error = Some(message);
        self.phase = ScanPhase::Idle;
    }

    fn on_status(&mut self, payload: StatusPayload) {
        if !payload.success {
            debug!("실패한 status 응답 무시");
            return;
        }

        let session = &mut self.session;
        session.is_active = payload.is_active.unwrap_or(false);
        session.progress = payload.progress.map(clamp_progress).unwrap_or(0);
        session.current_site = payload.current_site;
        session.current_stage = payload.current_stage.map(ScanStage::from);

        let metrics = &mut session.metrics;
        if payload.last_scan_time.is_some() {
            metrics.last_scan_time = payload.last_scan_time;
        }
        if payload.next_scan_time.is_some() {
            metrics.next_scan_time = payload.next_scan_time;
        }
        if let Some(patch) = payload.settings.as_ref() {
            self.settings.confirmed_mut().merge(patch);
        }

        self.phase = if self.session.is_active {
            ScanPhase::Active
        } else {
            ScanPhase::Idle
        };
    }

    /// 완료 표시 종료 (`Completing → Idle`)
    ///
    /// 그 사이 새 스캔이 시작됐거나 다른 이벤트로 단계가 바뀌었으면 아무것도 하지 않는다.
    pub fn finish_completion(&mut self) -> bool {
        if self.phase != ScanPhase::Completing || self.session.is_active {
            return false;
        }
        self.session.progress = 0;
        self.session.current_stage = None;
        self.phase = ScanPhase::Idle;
        true
    }

    /// 에러 표시 해제 (다른 필드는 유지)
    pub fn clear_error(&mut self) {
        self.session.error = None;
    }

    /// 명령 거부 등 로컬 에러 표시
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.session.error = Some(message.into());
    }

    /// 설정 변경 요청 시작 (확정값은 서버 응답까지 유지).
    /// 이전에 응답을 기다리던 요청값을 돌려준다.
    pub fn begin_settings_update(
        &mut self,
        settings: HourlyScanSettings,
    ) -> Option<HourlyScanSettings> {
        let previous = self.settings.rollback();
        self.settings.begin(settings);
        previous
    }

    /// 설정 변경 요청 송신 실패: 이 요청 이전의 대기 상태로 되돌린다
    pub fn abandon_settings_update(&mut self, previous: Option<HourlyScanSettings>) {
        self.settings.rollback();
        if let Some(previous) = previous {
            self.settings.begin(previous);
        }
    }
}
