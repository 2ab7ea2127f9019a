//! 채널 이벤트 라우터.
//!
//! 이벤트 이름별 구독자에게 수신 이벤트를 나눠준다.
//! 구독은 `Subscription` 핸들이 drop될 때 해제되므로
//! 같은 구독자가 중복 등록되지 않고, 해제 후에는 이벤트를 받지 않는다.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::trace;
use veil_core::ports::channel::ChannelEvent;

struct Entry {
    id: u64,
    names: HashSet<String>,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

/// 이름 기반 이벤트 라우터 (복제 시 같은 구독 목록 공유)
#[derive(Clone, Default)]
pub struct EventRouter {
    inner: Arc<Inner>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 지정 이벤트 이름들을 구독
    pub fn subscribe<I, S>(&self, names: I) -> (Subscription, mpsc::UnboundedReceiver<ChannelEvent>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.entries.lock().push(Entry {
            id,
            names: names.into_iter().map(Into::into).collect(),
            tx,
        });
        (
            Subscription {
                id,
                router: Arc::downgrade(&self.inner),
            },
            rx,
        )
    }

    /// 이벤트 배포. 전달된 구독자 수를 반환한다.
    ///
    /// 수신 측이 닫힌 구독은 이 시점에 정리한다.
    pub fn dispatch(&self, event: &ChannelEvent) -> usize {
        let mut entries = self.inner.entries.lock();
        let mut delivered = 0;
        entries.retain(|entry| {
            if !entry.names.contains(&event.name) {
                return !entry.tx.is_closed();
            }
            if entry.tx.send(event.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                false
            }
        });
        trace!("이벤트 배포: {} → {delivered}", event.name);
        delivered
    }

    /// 현재 구독자 수
    pub fn subscriber_count(&self) -> usize {
        self.inner.entries.lock().len()
    }
}

/// 구독 핸들: drop 시 해제
pub struct Subscription {
    id: u64,
    router: Weak<Inner>,
}

impl Subscription {
    /// 명시적 해제
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.router.upgrade() {
            inner.entries.lock().retain(|entry| entry.id != self.id);
        }
    }
}
