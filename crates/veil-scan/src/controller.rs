//! 정기 스캔 컨트롤러.
//!
//! 연결 관리자의 이벤트 라우터를 구독해 리듀서를 구동하고, 송신 명령과
//! 타이머(완료 표시 3초, 재연결 후 상태 재동기화 1초)를 관리한다.
//! 상태는 `watch`로 내보내며 소비자는 읽기만 한다.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use veil_core::config::AppConfig;
use veil_core::models::connection::ConnectionState;
use veil_core::models::events::{
    inbound, outbound, HourlyScanEvent, StartScanCommand, StartScanOptions,
};
use veil_core::models::settings::HourlyScanSettings;
use veil_core::ports::channel::ChannelEvent;
use veil_network::connection::ConnectionManager;
use veil_network::router::Subscription;

use crate::history::ScanHistory;
use crate::reducer::{HourlyScanState, ReduceOutcome, NOT_CONNECTED_ERROR};

/// drop 시 태스크 중단
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Inner {
    connection: Arc<ConnectionManager>,
    state: Mutex<HourlyScanState>,
    snapshot_tx: watch::Sender<HourlyScanState>,
    completion_delay: Duration,
    resync_delay: Duration,
    completion_timer: Mutex<Option<AbortOnDrop>>,
    resync_timer: Mutex<Option<AbortOnDrop>>,
}

impl Inner {
    fn publish(&self, state: &HourlyScanState) {
        self.snapshot_tx.send_replace(state.clone());
    }

    fn mutate(&self, f: impl FnOnce(&mut HourlyScanState)) {
        let mut state = self.state.lock();
        f(&mut state);
        self.publish(&state);
    }

    fn is_connected(&self) -> bool {
        self.connection.snapshot().is_connected
    }

    fn handle_event(self: &Arc<Self>, event: ChannelEvent) {
        let parsed = match HourlyScanEvent::parse(&event.name, &event.payload) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => return,
            Err(e) => {
                warn!("{} 페이로드 파싱 실패: {e}", event.name);
                return;
            }
        };
        debug!("정기 스캔 이벤트: {}", parsed.name());

        let outcome = {
            let mut state = self.state.lock();
            let outcome = state.apply(parsed, Utc::now());
            self.publish(&state);
            outcome
        };
        if outcome == ReduceOutcome::ScheduleCompletionReset {
            self.arm_completion();
        }
    }

    /// 완료 표시 타이머 (이전 타이머는 교체)
    fn arm_completion(self: &Arc<Self>) {
        let inner = self.clone();
        let delay = self.completion_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = inner.state.lock();
            if state.finish_completion() {
                inner.publish(&state);
            }
        });
        *self.completion_timer.lock() = Some(AbortOnDrop(handle));
    }

    /// 재연결 후 상태 재동기화 타이머 (연결될 때마다 다시 건다)
    fn arm_resync(self: &Arc<Self>) {
        let inner = self.clone();
        let delay = self.resync_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.request_status().await;
        });
        *self.resync_timer.lock() = Some(AbortOnDrop(handle));
    }

    fn cancel_resync(&self) {
        self.resync_timer.lock().take();
    }

    /// 명령 송신 공통: 미연결이면 에러 표시 후 false
    async fn send_command(&self, event: &str, payload: Value) -> bool {
        if !self.is_connected() {
            self.mutate(|s| s.set_error(NOT_CONNECTED_ERROR));
            return false;
        }
        match self.connection.emit(event, payload).await {
            Ok(()) => {
                self.mutate(HourlyScanState::clear_error);
                true
            }
            Err(e) => {
                warn!("{event} 전송 실패: {e}");
                self.mutate(|s| s.set_error(NOT_CONNECTED_ERROR));
                false
            }
        }
    }

    async fn start_scan(&self, options: StartScanOptions) -> bool {
        let interval = self.state.lock().settings().interval_minutes;
        let command = StartScanCommand::from_options(&options, interval);
        let payload = match serde_json::to_value(&command) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("start 명령 직렬화 실패: {e}");
                return false;
            }
        };
        info!(
            "정기 스캔 시작 요청 (interval={}, manual={})",
            command.interval_minutes, command.manual
        );
        self.send_command(outbound::HOURLY_SCAN_START, payload).await
    }

    async fn request_status(&self) -> bool {
        if !self.is_connected() {
            debug!("미연결: status 요청 생략");
            return false;
        }
        match self
            .connection
            .emit(outbound::HOURLY_SCAN_STATUS, json!({}))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!("status 요청 실패: {e}");
                false
            }
        }
    }

    async fn update_settings(&self, settings: HourlyScanSettings) -> bool {
        let payload = match serde_json::to_value(&settings) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("설정 직렬화 실패: {e}");
                return false;
            }
        };
        // 미연결 호출은 대기 중인 이전 요청을 건드리지 않는다
        let began = self.is_connected();
        let mut previous = None;
        if began {
            self.mutate(|s| previous = s.begin_settings_update(settings));
        }
        let sent = self
            .send_command(outbound::HOURLY_SCAN_UPDATE_SETTINGS, payload)
            .await;
        if !sent && began {
            self.mutate(|s| s.abandon_settings_update(previous));
        }
        sent
    }
}

async fn event_loop(
    inner: Arc<Inner>,
    _subscription: Subscription,
    mut events: mpsc::UnboundedReceiver<ChannelEvent>,
) {
    while let Some(event) = events.recv().await {
        inner.handle_event(event);
    }
    debug!("정기 스캔 이벤트 루프 종료");
}

async fn watch_connectivity(inner: Arc<Inner>, mut state: watch::Receiver<ConnectionState>) {
    let mut was_ready = state.borrow_and_update().is_ready();
    if was_ready {
        inner.arm_resync();
    }
    while state.changed().await.is_ok() {
        let ready = state.borrow_and_update().is_ready();
        if ready && !was_ready {
            debug!("채널 준비됨: 상태 재동기화 예약");
            inner.arm_resync();
        } else if !ready && was_ready {
            inner.cancel_resync();
        }
        was_ready = ready;
    }
}

/// 정기 스캔 컨트롤러
pub struct HourlyScanController {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HourlyScanController {
    /// 컨트롤러 생성 + 이벤트 구독/연결 감시 시작 (런타임 안에서 호출)
    pub fn spawn(connection: Arc<ConnectionManager>, config: &AppConfig) -> Self {
        let settings = HourlyScanSettings::with_interval(config.scan.default_interval_minutes);
        let state = HourlyScanState::new(settings, ScanHistory::new(config.scan.history_limit));
        let (snapshot_tx, _) = watch::channel(state.clone());

        let inner = Arc::new(Inner {
            connection: connection.clone(),
            state: Mutex::new(state),
            snapshot_tx,
            completion_delay: config.scan.completion_display(),
            resync_delay: config.socket.resync_delay(),
            completion_timer: Mutex::new(None),
            resync_timer: Mutex::new(None),
        });

        let (subscription, events) = connection.router().subscribe(inbound::HOURLY_SCAN_EVENTS);
        let tasks = vec![
            tokio::spawn(event_loop(inner.clone(), subscription, events)),
            tokio::spawn(watch_connectivity(inner.clone(), connection.state())),
        ];

        Self {
            inner,
            tasks: Mutex::new(tasks),
        }
    }

    /// 정기 스캔 시작. 미연결이면 에러 표시 후 false.
    pub async fn start_scan(&self, options: StartScanOptions) -> bool {
        self.inner.start_scan(options).await
    }

    /// 수동 1회 스캔
    pub async fn run_manual_scan(&self) -> bool {
        self.inner.start_scan(StartScanOptions::manual_run()).await
    }

    /// 정기 스캔 중단
    pub async fn stop_scan(&self) -> bool {
        info!("정기 스캔 중단 요청");
        self.inner
            .send_command(outbound::HOURLY_SCAN_STOP, json!({}))
            .await
    }

    /// 상태 조회. 미연결이면 조용히 false.
    pub async fn request_status(&self) -> bool {
        self.inner.request_status().await
    }

    /// 설정 변경 요청. 확정 설정은 서버 응답(`settings_updated`)에서 바뀐다.
    pub async fn update_settings(&self, settings: HourlyScanSettings) -> bool {
        self.inner.update_settings(settings).await
    }

    /// 에러 표시 해제
    pub fn clear_error(&self) {
        self.inner.mutate(HourlyScanState::clear_error);
    }

    /// 현재 상태
    pub fn snapshot(&self) -> HourlyScanState {
        self.inner.state.lock().clone()
    }

    /// 상태 변경 구독
    pub fn subscribe(&self) -> watch::Receiver<HourlyScanState> {
        self.inner.snapshot_tx.subscribe()
    }

    /// 구독 해제 + 타이머 취소
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.inner.completion_timer.lock().take();
        self.inner.cancel_resync();
    }
}

impl Drop for HourlyScanController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use veil_core::error::CoreError;
    use veil_core::models::scan::ScanStage;
    use veil_core::ports::channel::{
        ChannelAuth, ChannelConnector, ChannelLink, ChannelSession, ChannelSignal,
    };
    use veil_network::auth::TokenManager;
    use veil_network::credential_store::MemoryCredentialStore;

    #[derive(Default)]
    struct RecordingLink {
        emitted: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingLink {
        fn names(&self) -> Vec<String> {
            self.emitted.lock().iter().map(|(n, _)| n.clone()).collect()
        }

        fn count(&self, name: &str) -> usize {
            self.emitted.lock().iter().filter(|(n, _)| n == name).count()
        }

        fn last(&self, name: &str) -> Option<Value> {
            self.emitted
                .lock()
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, p)| p.clone())
        }
    }

    #[async_trait]
    impl ChannelLink for RecordingLink {
        async fn emit(&self, event: &str, payload: Value) -> Result<(), CoreError> {
            self.emitted.lock().push((event.to_string(), payload));
            Ok(())
        }

        async fn emit_with_ack(
            &self,
            event: &str,
            payload: Value,
            _timeout: Duration,
        ) -> Result<Value, CoreError> {
            self.emitted.lock().push((event.to_string(), payload));
            Ok(json!({ "success": true }))
        }

        async fn close(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedConnector {
        opens: AtomicUsize,
        links: Mutex<Vec<Arc<RecordingLink>>>,
        senders: Mutex<Vec<mpsc::Sender<ChannelSignal>>>,
    }

    impl ScriptedConnector {
        fn link(&self) -> Arc<RecordingLink> {
            self.links.lock().last().cloned().unwrap()
        }

        async fn push(&self, name: &str, payload: Value) {
            let tx = self.senders.lock().last().cloned().unwrap();
            tx.send(ChannelSignal::Event(ChannelEvent::new(name, payload)))
                .await
                .unwrap();
        }

        async fn drop_connection(&self) {
            let tx = self.senders.lock().last().cloned().unwrap();
            tx.send(ChannelSignal::Disconnected {
                reason: "transport close".to_string(),
            })
            .await
            .unwrap();
        }
    }

    #[async_trait]
    impl ChannelConnector for ScriptedConnector {
        async fn open(&self, _auth: ChannelAuth) -> Result<ChannelSession, CoreError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let link = Arc::new(RecordingLink::default());
            let (tx, rx) = mpsc::channel(32);
            self.links.lock().push(link.clone());
            self.senders.lock().push(tx);
            Ok(ChannelSession { link, signals: rx })
        }
    }

    fn setup() -> (
        Arc<ScriptedConnector>,
        Arc<ConnectionManager>,
        HourlyScanController,
    ) {
        let config = AppConfig::default_config();
        let connector = Arc::new(ScriptedConnector::default());
        let store = Arc::new(MemoryCredentialStore::with_token("tok"));
        let tokens = Arc::new(TokenManager::new(
            &config.server.base_url,
            &config.server.api_prefix,
            store,
        ));
        let connection = Arc::new(ConnectionManager::new(
            connector.clone(),
            tokens,
            config.socket.clone(),
        ));
        let controller = HourlyScanController::spawn(connection.clone(), &config);
        (connector, connection, controller)
    }

    async fn connect_ready(connection: &ConnectionManager) {
        let mut state = connection.state();
        connection.connect("42");
        state.wait_for(|s| s.is_ready()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn commands_rejected_while_disconnected() {
        let (connector, _connection, controller) = setup();

        assert!(!controller.start_scan(StartScanOptions::default()).await);
        assert_eq!(
            controller.snapshot().session().error.as_deref(),
            Some("Not connected to server")
        );

        controller.clear_error();
        assert!(!controller.stop_scan().await);
        assert_eq!(
            controller.snapshot().session().error.as_deref(),
            Some("Not connected to server")
        );

        controller.clear_error();
        assert!(
            !controller
                .update_settings(HourlyScanSettings::with_interval(30))
                .await
        );
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.session().error.as_deref(), Some("Not connected to server"));
        assert!(!snapshot.settings_state().is_pending());
        assert_eq!(connector.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn request_status_silent_while_disconnected() {
        let (_connector, _connection, controller) = setup();
        assert!(!controller.request_status().await);
        assert!(controller.snapshot().session().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn start_then_started_event() {
        let (connector, connection, controller) = setup();
        connect_ready(&connection).await;

        controller.set_error_for_test("stale");
        assert!(controller.start_scan(StartScanOptions::default()).await);
        assert!(controller.snapshot().session().error.is_none());
        assert_eq!(
            connector.link().last(outbound::HOURLY_SCAN_START),
            Some(json!({ "intervalMinutes": 60, "runImmediately": true, "manual": false }))
        );

        let mut snapshots = controller.subscribe();
        connector
            .push(inbound::HOURLY_SCAN_STARTED, json!({ "manual": false }))
            .await;
        let state = snapshots
            .wait_for(|s| s.session().is_active)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.session().progress, 0);
        assert_eq!(state.session().current_stage, Some(ScanStage::Initializing));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_scan_payload() {
        let (connector, connection, controller) = setup();
        connect_ready(&connection).await;

        assert!(controller.run_manual_scan().await);
        assert_eq!(
            connector.link().last(outbound::HOURLY_SCAN_START),
            Some(json!({ "intervalMinutes": 0, "runImmediately": true, "manual": true }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completion_resets_after_display_delay() {
        let (connector, connection, controller) = setup();
        connect_ready(&connection).await;
        let mut snapshots = controller.subscribe();

        connector.push(inbound::HOURLY_SCAN_STARTED, json!({})).await;
        connector
            .push(
                inbound::HOURLY_SCAN_COMPLETED,
                json!({ "sitesScanned": 10, "threatsFound": 2, "totalMatches": 5, "duration": 120 }),
            )
            .await;
        let done = snapshots
            .wait_for(|s| s.session().progress == 100)
            .await
            .unwrap()
            .clone();
        assert_eq!(done.history().len(), 1);
        assert_eq!(done.history()[0].duration, 120);

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(controller.snapshot().session().progress, 100);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let reset = controller.snapshot();
        assert_eq!(reset.session().progress, 0);
        assert!(reset.session().current_stage.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn resync_rearmed_on_every_reconnect() {
        let (connector, connection, _controller) = setup();
        connect_ready(&connection).await;

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let first = connector.link();
        assert_eq!(first.count(outbound::HOURLY_SCAN_STATUS), 1);

        let mut state = connection.state();
        connector.drop_connection().await;
        state.wait_for(|s| !s.is_connected).await.unwrap();
        state.wait_for(|s| s.is_ready()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let second = connector.link();
        assert_eq!(connector.opens.load(Ordering::SeqCst), 2);
        assert_eq!(second.count(outbound::HOURLY_SCAN_STATUS), 1);
        assert_eq!(second.names()[0], outbound::JOIN);
    }

    #[tokio::test(start_paused = true)]
    async fn single_subscription_across_reconnects() {
        let (connector, connection, controller) = setup();
        connect_ready(&connection).await;
        assert_eq!(connection.router().subscriber_count(), 1);

        let mut state = connection.state();
        connector.drop_connection().await;
        state.wait_for(|s| !s.is_connected).await.unwrap();
        state.wait_for(|s| s.is_ready()).await.unwrap();
        assert_eq!(connection.router().subscriber_count(), 1);

        let mut snapshots = controller.subscribe();
        connector.push(inbound::HOURLY_SCAN_STARTED, json!({})).await;
        connector
            .push(inbound::HOURLY_SCAN_COMPLETED, json!({ "scanId": "once" }))
            .await;
        let done = snapshots
            .wait_for(|s| !s.history().is_empty())
            .await
            .unwrap()
            .clone();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(done.history().len(), 1);
        assert_eq!(controller.snapshot().history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_unsubscribes() {
        let (_connector, connection, controller) = setup();
        assert_eq!(connection.router().subscriber_count(), 1);
        controller.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connection.router().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settings_confirmed_by_server_event() {
        let (connector, connection, controller) = setup();
        connect_ready(&connection).await;

        let wanted = HourlyScanSettings::with_interval(15);
        assert!(controller.update_settings(wanted.clone()).await);
        let pending = controller.snapshot();
        assert_eq!(pending.settings().interval_minutes, 60);
        assert_eq!(pending.settings_state().pending(), Some(&wanted));
        assert_eq!(
            connector.link().last(outbound::HOURLY_SCAN_UPDATE_SETTINGS),
            Some(json!({ "intervalMinutes": 15, "enableNotifications": true, "runDuringOffHours": true }))
        );

        let mut snapshots = controller.subscribe();
        connector
            .push(
                inbound::HOURLY_SCAN_SETTINGS_UPDATED,
                json!({ "success": true, "settings": { "intervalMinutes": 15 } }),
            )
            .await;
        let confirmed = snapshots
            .wait_for(|s| !s.settings_state().is_pending())
            .await
            .unwrap()
            .clone();
        assert_eq!(confirmed.settings().interval_minutes, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_update_keeps_earlier_pending_request() {
        let (_connector, connection, controller) = setup();
        connect_ready(&connection).await;

        let wanted = HourlyScanSettings::with_interval(15);
        assert!(controller.update_settings(wanted.clone()).await);

        connection.disconnect();
        assert!(
            !controller
                .update_settings(HourlyScanSettings::with_interval(30))
                .await
        );

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.session().error.as_deref(), Some("Not connected to server"));
        assert_eq!(snapshot.settings_state().pending(), Some(&wanted));
        assert_eq!(snapshot.settings().interval_minutes, 60);
    }

    impl HourlyScanController {
        fn set_error_for_test(&self, message: &str) {
            self.inner.mutate(|s| s.set_error(message));
        }
    }
}
