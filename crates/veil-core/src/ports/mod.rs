//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! `veil-network`가 구현하고, `veil-scan`/`veil-app`이 `Arc<dyn T>`로 와이어링한다.
//!
//! async trait은 `async_trait` 매크로로 object safety를 보장한다.

pub mod api_client;
pub mod channel;
pub mod credential;
