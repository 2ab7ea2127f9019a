//! 대시보드 모델.
//!
//! 데모 스트림, 정기 스트림 최신 세션, 이전 표시값을 소유하고
//! 어느 쪽이 바뀌든 병합 결과를 다시 계산한다. 대시보드 뷰 하나당 하나씩 만든다.

use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;
use veil_core::models::api::DashboardStats;
use veil_core::models::scan::{ScanKind, ScanSession};

use crate::merger::{merge_streams, DashboardView};
use crate::reducer::HourlyScanState;
use crate::simulation::SimulationStream;

/// 대시보드 표시 모델 소유자
#[derive(Debug, Clone)]
pub struct DashboardModel {
    simulation: SimulationStream,
    hourly: ScanSession,
    view: DashboardView,
}

impl Default for DashboardModel {
    fn default() -> Self {
        Self::new(SimulationStream::default())
    }
}

impl DashboardModel {
    pub fn new(simulation: SimulationStream) -> Self {
        Self {
            simulation,
            hourly: ScanSession::idle(ScanKind::Hourly),
            view: DashboardView::default(),
        }
    }

    /// 현재 표시 모델
    pub fn view(&self) -> &DashboardView {
        &self.view
    }

    pub fn simulation(&self) -> &SimulationStream {
        &self.simulation
    }

    /// REST 통계로 카운터 초기값 설정 (이후 0 값 이벤트가 덮지 못한다)
    pub fn seed_from_stats(&mut self, stats: &DashboardStats) -> bool {
        self.view.sites_scanned = stats.sites_scanned;
        self.view.threats_found = stats.threats_found;
        self.view.total_matches = stats.total_matches;
        if stats.last_scan_time.is_some() {
            self.view.last_scan_time = stats.last_scan_time;
        }
        self.recompute()
    }

    /// 정기 스트림 세션 반영
    pub fn on_hourly(&mut self, hourly: &ScanSession) -> bool {
        self.hourly = hourly.clone();
        self.recompute()
    }

    /// 데모 재생 시작
    pub fn start_demo(&mut self) -> bool {
        self.simulation.start();
        self.recompute()
    }

    /// 데모 한 단계 진행. 재생이 끝났으면 false.
    pub fn advance_demo(&mut self) -> bool {
        let advanced = self.simulation.advance();
        self.recompute();
        advanced
    }

    pub fn stop_demo(&mut self) -> bool {
        self.simulation.stop();
        self.recompute()
    }

    /// 병합 재계산. 표시값이 바뀌었으면 true.
    fn recompute(&mut self) -> bool {
        let next = merge_streams(self.simulation.session(), &self.hourly, &self.view);
        if next == self.view {
            return false;
        }
        self.view = next;
        true
    }

    /// 정기 스트림 변경과 데모 틱을 받아 표시 모델을 `views`로 내보낸다
    ///
    /// `demo_tick`이 있으면 데모를 시작해 그 주기로 진행한다.
    /// 정기 스트림 송신 측이 닫히면 종료한다.
    pub async fn run(
        mut self,
        mut hourly: watch::Receiver<HourlyScanState>,
        demo_tick: Option<Duration>,
        views: watch::Sender<DashboardView>,
    ) {
        let session = hourly.borrow_and_update().session().clone();
        self.on_hourly(&session);

        let mut ticker = demo_tick.map(|period| {
            self.start_demo();
            tokio::time::interval_at(tokio::time::Instant::now() + period, period)
        });
        views.send_replace(self.view.clone());

        loop {
            let changed = tokio::select! {
                result = hourly.changed() => {
                    if result.is_err() {
                        debug!("정기 스트림 종료: 대시보드 루프 종료");
                        break;
                    }
                    let session = hourly.borrow_and_update().session().clone();
                    self.on_hourly(&session)
                }
                _ = async {
                    match ticker.as_mut() {
                        Some(t) => { t.tick().await; }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    let before = self.view.clone();
                    if !self.advance_demo() {
                        ticker = None;
                    }
                    before != self.view
                }
            };
            if changed {
                views.send_replace(self.view.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::ScanTypeLabel;
    use veil_core::models::scan::ScanStage;

    fn hourly_active(progress: u8, manual: bool) -> ScanSession {
        let mut s = ScanSession::idle(ScanKind::Hourly);
        s.is_active = true;
        s.progress = progress;
        s.is_manual = manual;
        s.current_stage = Some(ScanStage::Searching);
        s
    }

    #[test]
    fn hourly_preempts_running_demo() {
        let mut model = DashboardModel::default();
        model.start_demo();
        while model.view().progress < 30 {
            model.advance_demo();
        }
        assert_eq!(model.view().scan_type_label, ScanTypeLabel::Simulation);

        model.on_hourly(&hourly_active(5, false));
        assert_eq!(model.view().progress, 5);
        assert_eq!(model.view().scan_type_label.as_str(), "Hourly Scan");

        model.on_hourly(&hourly_active(6, true));
        assert_eq!(model.view().scan_type_label.as_str(), "Manual Scan");
    }

    #[test]
    fn seeded_counters_survive_zero_events() {
        let mut model = DashboardModel::default();
        model.seed_from_stats(&DashboardStats {
            sites_scanned: 40,
            threats_found: 3,
            total_matches: 7,
            ..DashboardStats::default()
        });

        model.on_hourly(&hourly_active(10, false));
        assert_eq!(model.view().total_matches, 7);
        assert_eq!(model.view().sites_scanned, 40);
    }

    #[test]
    fn unchanged_input_reports_no_change() {
        let mut model = DashboardModel::default();
        let idle = ScanSession::idle(ScanKind::Hourly);
        assert!(!model.on_hourly(&idle));
        assert!(model.on_hourly(&hourly_active(1, false)));
        assert!(!model.on_hourly(&hourly_active(1, false)));
    }

    #[tokio::test(start_paused = true)]
    async fn run_publishes_demo_and_hourly_changes() {
        let (hourly_tx, hourly_rx) = watch::channel(HourlyScanState::default());
        let (views_tx, mut views) = watch::channel(DashboardView::default());

        let task = tokio::spawn(DashboardModel::default().run(
            hourly_rx,
            Some(Duration::from_millis(100)),
            views_tx,
        ));

        let demo = views
            .wait_for(|v| v.progress >= 30 && v.is_actively_scanning)
            .await
            .unwrap()
            .clone();
        assert_eq!(demo.scan_type_label, ScanTypeLabel::Simulation);

        let mut state = HourlyScanState::default();
        state.apply(
            veil_core::models::events::HourlyScanEvent::Started(Default::default()),
            chrono::Utc::now(),
        );
        hourly_tx.send_replace(state);

        let merged = views
            .wait_for(|v| v.scan_type_label == ScanTypeLabel::Hourly)
            .await
            .unwrap()
            .clone();
        assert_eq!(merged.progress, 0);
        assert_eq!(merged.current_stage, Some(ScanStage::Initializing));

        drop(hourly_tx);
        task.await.unwrap();
    }
}
