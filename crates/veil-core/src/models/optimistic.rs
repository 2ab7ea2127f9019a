//! 낙관적 업데이트 2단계 상태.
//!
//! `pending`(로컬 추정)과 `confirmed`(서버 확정값)을 분리해 보관하고
//! 실패 시 `rollback`으로 확정값 표시로 돌아간다.

use serde::{Deserialize, Serialize};

/// 낙관적 값 (pending + confirmed)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optimistic<T> {
    confirmed: T,
    pending: Option<T>,
}

impl<T: Clone> Optimistic<T> {
    /// 서버 확정값으로 생성
    pub fn new(confirmed: T) -> Self {
        Self {
            confirmed,
            pending: None,
        }
    }

    /// 서버 확정값
    pub fn confirmed(&self) -> &T {
        &self.confirmed
    }

    /// 진행 중인 로컬 추정값
    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    /// 화면 표시용 값 (pending 우선)
    pub fn display(&self) -> &T {
        self.pending.as_ref().unwrap_or(&self.confirmed)
    }

    /// 변경 요청 시작
    pub fn begin(&mut self, value: T) {
        self.pending = Some(value);
    }

    /// 서버 확정값 반영 (pending 해제)
    pub fn confirm(&mut self, value: T) {
        self.confirmed = value;
        self.pending = None;
    }

    /// 확정값만 수정 (pending 유지)
    pub fn confirmed_mut(&mut self) -> &mut T {
        &mut self.confirmed
    }

    /// 요청 실패: pending 폐기
    pub fn rollback(&mut self) -> Option<T> {
        self.pending.take()
    }

    /// 요청 진행 중 여부
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
