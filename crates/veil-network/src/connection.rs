//! 실시간 채널 연결 관리자.
//!
//! 사용자당 채널 하나를 소유한다. 연결/재연결, 하트비트, 룸 참여를 담당하고
//! 연결 상태를 `watch`로 내보낸다. 전송 계층 에러는 상태(`last_error`)로만
//! 드러나며 호출자에게 전파되지 않는다.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use veil_core::config::SocketConfig;
use veil_core::error::CoreError;
use veil_core::models::connection::ConnectionState;
use veil_core::models::events::{inbound, outbound, HeartbeatCommand, JoinCommand};
use veil_core::ports::channel::{
    ChannelAuth, ChannelConnector, ChannelEvent, ChannelLink, ChannelSession, ChannelSignal,
};

use crate::auth::TokenManager;
use crate::router::EventRouter;

/// 클라이언트가 직접 끊었을 때의 사유
pub const CLIENT_DISCONNECT_REASON: &str = "io client disconnect";

/// drop 시 태스크 중단
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Shared {
    connector: Arc<dyn ChannelConnector>,
    tokens: Arc<TokenManager>,
    config: SocketConfig,
    router: EventRouter,
    state_tx: watch::Sender<ConnectionState>,
    link: Mutex<Option<Arc<dyn ChannelLink>>>,
    /// connect/disconnect마다 증가. 이전 세대 supervisor의 늦은 갱신을 무시한다.
    epoch: AtomicU64,
}

impl Shared {
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn update_state(&self, epoch: u64, f: impl FnOnce(&mut ConnectionState)) {
        if self.is_current(epoch) {
            self.state_tx.send_modify(f);
        }
    }

    fn dispatch(&self, epoch: u64, event: ChannelEvent) {
        if self.is_current(epoch) {
            self.router.dispatch(&event);
        }
    }

    /// 연결 감독 루프: 열기, 세션 유지, 재연결
    async fn supervise(self: Arc<Self>, epoch: u64, user_id: String) {
        let max_attempts = self.config.reconnection_attempts;
        let mut failures: u32 = 0;

        loop {
            let auth = ChannelAuth {
                token: self.tokens.bearer_token(),
                user_id: user_id.clone(),
            };
            let opened =
                match tokio::time::timeout(self.config.connect_timeout(), self.connector.open(auth))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::Network("timeout".to_string())),
                };

            match opened {
                Ok(session) => {
                    failures = 0;
                    let reason = self.run_session(epoch, &user_id, session).await;
                    if !self.is_current(epoch) {
                        return;
                    }
                    info!("실시간 채널 끊김 ({reason}), 재연결 대기");
                }
                Err(e) => {
                    failures += 1;
                    let message = match &e {
                        CoreError::Auth(msg) | CoreError::Network(msg) => msg.clone(),
                        other => other.to_string(),
                    };
                    warn!("실시간 채널 연결 실패 ({failures}/{}): {message}", max_attempts + 1);
                    self.update_state(epoch, |s| s.on_connect_error(message.clone(), max_attempts));
                    self.dispatch(
                        epoch,
                        ChannelEvent::new(inbound::CONNECT_ERROR, json!({ "message": message })),
                    );
                    if failures > max_attempts {
                        warn!("재연결 시도 {max_attempts}회 소진: 연결 중단");
                        return;
                    }
                }
            }

            tokio::time::sleep(self.config.reconnection_delay()).await;
        }
    }

    /// 열린 세션을 끊길 때까지 유지. 종료 사유를 반환한다.
    async fn run_session(
        self: &Arc<Self>,
        epoch: u64,
        user_id: &str,
        session: ChannelSession,
    ) -> String {
        let ChannelSession { link, mut signals } = session;

        *self.link.lock() = Some(link.clone());
        self.update_state(epoch, ConnectionState::on_connected);
        info!("실시간 채널 연결됨: user={user_id}");
        self.dispatch(epoch, ChannelEvent::new(inbound::CONNECT, Value::Null));

        let _heartbeat = AbortOnDrop(tokio::spawn(heartbeat_loop(
            link.clone(),
            user_id.to_string(),
            self.config.heartbeat_interval(),
        )));
        let _join = AbortOnDrop(tokio::spawn({
            let shared = self.clone();
            let user_id = user_id.to_string();
            async move { shared.join_room(epoch, &user_id).await }
        }));

        let reason = loop {
            match signals.recv().await {
                Some(ChannelSignal::Event(event)) => self.dispatch(epoch, event),
                Some(ChannelSignal::Disconnected { reason }) => break reason,
                None => break "transport close".to_string(),
            }
        };

        if self.is_current(epoch) {
            *self.link.lock() = None;
        }
        self.update_state(epoch, ConnectionState::on_disconnected);
        self.dispatch(
            epoch,
            ChannelEvent::new(inbound::DISCONNECT, json!({ "reason": reason })),
        );
        reason
    }

    /// 룸 참여 (ack 기반). 실패는 룸 미설정 상태로만 남는다.
    async fn join_room(&self, epoch: u64, user_id: &str) {
        let Some(link) = self.link.lock().clone() else {
            debug!("룸 참여 생략: 채널 없음");
            return;
        };
        let payload = match serde_json::to_value(JoinCommand {
            user_id: user_id.to_string(),
        }) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("join 페이로드 직렬화 실패: {e}");
                return;
            }
        };

        match link
            .emit_with_ack(outbound::JOIN, payload, self.config.connect_timeout())
            .await
        {
            Ok(ack) => {
                if let Some(error) = ack_error(&ack) {
                    warn!("룸 참여 거부: {error}");
                    return;
                }
                if self.is_current(epoch) {
                    self.state_tx.send_if_modified(|s| s.on_room_joined(user_id));
                    debug!("룸 참여 완료: user_{user_id}");
                }
            }
            Err(e) => warn!("룸 참여 실패: {e}"),
        }
    }
}

/// ack 페이로드의 에러 메시지 (`{error}` 또는 `{success: false}`)
fn ack_error(ack: &Value) -> Option<String> {
    match ack.get("error") {
        Some(Value::Null) | None => {}
        Some(Value::String(msg)) => return Some(msg.clone()),
        Some(other) => return Some(other.to_string()),
    }
    (ack.get("success") == Some(&Value::Bool(false))).then(|| "rejected".to_string())
}

/// 하트비트 루프: 첫 틱은 한 주기 뒤
async fn heartbeat_loop(link: Arc<dyn ChannelLink>, user_id: String, period: Duration) {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);
    loop {
        ticker.tick().await;
        let beat = HeartbeatCommand {
            user_id: user_id.clone(),
            timestamp: Utc::now().timestamp_millis(),
        };
        let payload = match serde_json::to_value(&beat) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("heartbeat 직렬화 실패: {e}");
                continue;
            }
        };
        if let Err(e) = link.emit(outbound::HEARTBEAT, payload).await {
            debug!("heartbeat 전송 실패: {e}");
        }
    }
}

/// 연결 관리자
pub struct ConnectionManager {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// 새 연결 관리자 생성 (연결은 `connect`에서 연다)
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        tokens: Arc<TokenManager>,
        config: SocketConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        Self {
            shared: Arc::new(Shared {
                connector,
                tokens,
                config,
                router: EventRouter::new(),
                state_tx,
                link: Mutex::new(None),
                epoch: AtomicU64::new(0),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// 사용자 채널 열기
    ///
    /// 빈 사용자 ID는 무시한다. 같은 사용자로 이미 동작 중이면 아무것도 하지 않는다.
    /// 다른 사용자면 이전 세션(하트비트 포함)을 먼저 정리한다.
    pub fn connect(&self, user_id: &str) {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            debug!("사용자 ID 없음: 연결 생략");
            return;
        }

        let mut supervisor = self.supervisor.lock();
        let same_user = self.shared.state_tx.borrow().user_id.as_deref() == Some(user_id);
        if same_user && supervisor.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("이미 연결 관리 중: user={user_id}");
            return;
        }

        self.teardown(supervisor.take());
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .state_tx
            .send_replace(ConnectionState::for_user(user_id));
        *supervisor = Some(tokio::spawn(
            self.shared.clone().supervise(epoch, user_id.to_string()),
        ));
    }

    /// 채널 닫기: supervisor/하트비트 중단, 연결/룸 해제
    pub fn disconnect(&self) {
        let handle = self.supervisor.lock().take();
        let was_connected = self.shared.state_tx.borrow().is_connected;
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.teardown(handle);
        self.shared.state_tx.send_replace(ConnectionState::default());

        if was_connected {
            info!("실시간 채널 해제");
            self.shared.router.dispatch(&ChannelEvent::new(
                inbound::DISCONNECT,
                json!({ "reason": CLIENT_DISCONNECT_REASON }),
            ));
        }
    }

    fn teardown(&self, handle: Option<JoinHandle<()>>) {
        if let Some(handle) = handle {
            handle.abort();
        }
        if let Some(link) = self.shared.link.lock().take() {
            match tokio::runtime::Handle::try_current() {
                Ok(rt) => {
                    rt.spawn(async move {
                        if let Err(e) = link.close().await {
                            debug!("채널 종료 실패: {e}");
                        }
                    });
                }
                Err(_) => debug!("런타임 없음: 채널 close 생략"),
            }
        }
    }

    /// 룸 참여 요청 (연결 후). 실패는 `current_room` 미설정으로만 드러난다.
    pub async fn join_room(&self, user_id: &str) {
        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        self.shared.join_room(epoch, user_id).await;
    }

    /// 이벤트 송신
    pub async fn emit(&self, event: &str, payload: Value) -> Result<(), CoreError> {
        let link = self
            .shared
            .link
            .lock()
            .clone()
            .ok_or(CoreError::NotConnected)?;
        link.emit(event, payload).await
    }

    /// 연결 상태 구독
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// 현재 연결 상태
    pub fn snapshot(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// 수신 이벤트 라우터
    pub fn router(&self) -> &EventRouter {
        &self.shared.router
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.lock().take() {
            handle.abort();
        }
    }
}
