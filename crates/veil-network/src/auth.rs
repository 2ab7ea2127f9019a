//! 인증 토큰 관리.
//!
//! 로컬 자격증명 저장소에서 Bearer 토큰을 읽고, 401 발생 시 토큰 갱신과
//! 강제 로그아웃(로그인 화면 리다이렉트 신호)을 담당한다.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use veil_core::error::CoreError;
use veil_core::models::api::ApiEnvelope;
use veil_core::ports::credential::{CredentialStore, Credentials};

/// 강제 로그아웃 시 이동할 경로
pub const LOGIN_REDIRECT: &str = "/login";

/// 인증 상태 변경 알림
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// 토큰 갱신 성공
    TokenRefreshed,
    /// 갱신 실패: 자격증명 삭제됨, 로그인 화면으로 이동 필요
    SignOutRequired { redirect: String },
}

/// 갱신 응답 data
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshData {
    #[serde(alias = "access_token", alias = "token")]
    access_token: String,
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
}

/// `Bearer ` 접두사 제거
pub fn strip_bearer(token: &str) -> &str {
    let trimmed = token.trim();
    match (trimmed.get(..6), trimmed.get(6..)) {
        (Some(scheme), Some(rest))
            if scheme.eq_ignore_ascii_case("bearer")
                && (rest.is_empty() || rest.starts_with(char::is_whitespace)) =>
        {
            rest.trim()
        }
        _ => trimmed,
    }
}

/// 토큰 매니저: 저장소 조회/갱신/로그아웃
pub struct TokenManager {
    base_url: String,
    api_prefix: String,
    client: reqwest::Client,
    store: Arc<dyn CredentialStore>,
    events: broadcast::Sender<AuthEvent>,
    /// 동시 401에 대해 갱신 요청을 하나로 직렬화
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    /// 새 토큰 매니저 생성
    pub fn new(base_url: &str, api_prefix: &str, store: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix: api_prefix.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            store,
            events,
            refresh_lock: Mutex::new(()),
        }
    }

    /// 저장된 토큰 (`Bearer ` 제거). 없거나 읽기 실패 시 None.
    pub fn bearer_token(&self) -> Option<String> {
        match self.store.load() {
            Ok(Some(creds)) => {
                let token = strip_bearer(&creds.access_token);
                (!token.is_empty()).then(|| token.to_string())
            }
            Ok(None) => None,
            Err(e) => {
                warn!("자격증명 읽기 실패: {e}");
                None
            }
        }
    }

    /// 토큰 저장 (로그인 직후 호출)
    pub fn set_credentials(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), CoreError> {
        self.store.store(&Credentials {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
        })
    }

    /// 현재 인증 상태
    pub fn is_authenticated(&self) -> bool {
        self.bearer_token().is_some()
    }

    /// 인증 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// 토큰 갱신 (`POST {api_prefix}/auth/refresh`)
    ///
    /// 성공 시 새 액세스 토큰을 저장하고 반환한다.
    pub async fn refresh(&self) -> Result<String, CoreError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self
            .store
            .load()?
            .ok_or_else(|| CoreError::Auth("인증되지 않음".to_string()))?;
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| CoreError::Auth("리프레시 토큰 없음".to_string()))?;

        let url = format!("{}{}/auth/refresh", self.base_url, self.api_prefix);
        let body = serde_json::json!({ "refreshToken": refresh_token });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Auth(format!("토큰 갱신 요청 실패: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CoreError::Auth(format!(
                "토큰 갱신 실패 ({status}): {text}"
            )));
        }

        let envelope: ApiEnvelope<RefreshData> = resp
            .json()
            .await
            .map_err(|e| CoreError::Auth(format!("갱신 토큰 파싱 실패: {e}")))?;
        let data = envelope
            .into_result(status.as_u16())
            .map_err(|e| CoreError::Auth(e.to_string()))?
            .ok_or_else(|| CoreError::Auth("갱신 응답에 토큰 없음".to_string()))?;

        self.store.store(&Credentials {
            access_token: data.access_token.clone(),
            refresh_token: data.refresh_token.or(Some(refresh_token)),
        })?;

        debug!("토큰 갱신 성공");
        let _ = self.events.send(AuthEvent::TokenRefreshed);
        Ok(strip_bearer(&data.access_token).to_string())
    }

    /// 강제 로그아웃: 자격증명 삭제 후 리다이렉트 신호 발송
    pub fn sign_out(&self) -> Result<(), CoreError> {
        self.store.clear()?;
        info!("로그아웃: {LOGIN_REDIRECT} 이동 필요");
        let _ = self.events.send(AuthEvent::SignOutRequired {
            redirect: LOGIN_REDIRECT.to_string(),
        });
        Ok(())
    }
}
