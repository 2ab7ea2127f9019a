//! 최근 스캔 이력.
//!
//! 완료된 스캔 기록을 고정 크기 링 버퍼로 보관한다 (메모리 전용).

use std::collections::VecDeque;
use veil_core::models::scan::ScanHistoryEntry;

/// 기본 보관 개수
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// 스캔 이력 (FIFO, 최대 크기 제한)
#[derive(Debug, Clone, PartialEq)]
pub struct ScanHistory {
    entries: VecDeque<ScanHistoryEntry>,
    max_size: usize,
}

impl Default for ScanHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ScanHistory {
    /// 새 이력 생성 (최소 1개)
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// 항목 추가: 가득 차면 가장 오래된 항목 제거
    pub fn push(&mut self, entry: ScanHistoryEntry) {
        if self.entries.len() >= self.max_size {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// 최신순 목록
    pub fn recent(&self) -> Vec<ScanHistoryEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    /// 가장 최근 항목
    pub fn latest(&self) -> Option<&ScanHistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}
