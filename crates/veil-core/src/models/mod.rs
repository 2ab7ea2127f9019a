//! Veil 도메인 모델.
//!
//! 서버-클라이언트 간 공유하는 스캔/연결/설정 데이터 구조체를 정의한다.
//! 서버 페이로드는 camelCase JSON이므로 대부분 `rename_all = "camelCase"`를 사용한다.

pub mod api;
pub mod connection;
pub mod events;
pub mod optimistic;
pub mod scan;
pub mod settings;
