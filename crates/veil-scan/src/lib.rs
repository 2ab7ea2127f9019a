//! # veil-scan
//!
//! 스캔 상태 동기화.
//! 서버 정기(hourly) 스캔 이벤트를 세션/메트릭/이력으로 환원하고,
//! 로컬 데모(simulation) 스트림과 병합해 대시보드 표시 모델을 만든다.
//! 기능 토글은 낙관적 2단계 상태로 관리한다.

pub mod controller;
pub mod dashboard;
pub mod features;
pub mod history;
pub mod merger;
pub mod reducer;
pub mod simulation;
