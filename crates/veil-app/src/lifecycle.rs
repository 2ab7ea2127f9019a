//! 라이프사이클 관리.
//!
//! 종료 신호 전파와 OS 시그널 대기.

use tokio::sync::watch;
use tracing::{info, warn};

/// 라이프사이클 관리자
pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self { shutdown_tx }
    }

    /// 종료 수신기
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// 종료 신호 발송 (중복 호출 무시)
    pub fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("종료 신호 발송");
    }

    /// 종료 신호가 올 때까지 대기
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// OS 시그널 대기 (SIGINT, SIGTERM) 후 종료 신호 발송
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (
                signal(SignalKind::interrupt()),
                signal(SignalKind::terminate()),
            ) {
                (Ok(mut sigint), Ok(mut sigterm)) => {
                    tokio::select! {
                        _ = sigint.recv() => info!("SIGINT 수신"),
                        _ = sigterm.recv() => info!("SIGTERM 수신"),
                    }
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!("시그널 핸들러 등록 실패, Ctrl+C만 대기: {e}");
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Ctrl+C 대기 실패: {e}");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl+C 수신"),
                Err(e) => warn!("Ctrl+C 핸들러 등록 실패: {e}"),
            }
        }

        self.shutdown();
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
