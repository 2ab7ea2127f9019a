//! # veil-network
//!
//! REST/WebSocket 네트워크 어댑터.
//! 백엔드와의 REST API, Socket.IO 실시간 채널 통신을 담당하며
//! 로컬 자격증명 기반 Bearer 인증, 401 시 토큰 갱신/강제 로그아웃,
//! 채널 재연결/하트비트/룸 참여를 지원한다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use veil_network::auth::TokenManager;
//! use veil_network::connection::ConnectionManager;
//! use veil_network::ws_client::WsConnector;
//!
//! let connector = Arc::new(WsConnector::new(config.socket_endpoint(), &config.socket)?);
//! let manager = ConnectionManager::new(connector, token_manager, config.socket.clone());
//! manager.connect("user_123");
//! ```

pub mod auth;
pub mod connection;
pub mod credential_store;
pub mod http_client;
pub mod protocol;
pub mod router;
pub mod ws_client;
