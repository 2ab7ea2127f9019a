//! HTTP REST API 클라이언트.
//!
//! `ApiClient`/`AdminApiClient` 포트 구현. Bearer 헤더 자동 주입, envelope 해제,
//! 재시도 로직, 401 처리(운영 환경: 토큰 갱신 1회 → 실패 시 강제 로그아웃).

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use veil_core::config::{AppConfig, Environment};
use veil_core::error::CoreError;
use veil_core::models::api::{
    AdminSettings, AdminUser, ApiEnvelope, CheckoutRequest, CreateScanRequest, DashboardStats,
    FeatureAccess, FeatureToggle, Invoice, PaymentMethod, Plan, RedirectSession, ScanListQuery,
    ScanRecord,
};
use veil_core::ports::api_client::{AdminApiClient, ApiClient};

use crate::auth::TokenManager;

/// 기본 재시도 횟수
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry-After 헤더가 없을 때 기본 대기 (초)
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// 같은 요청을 여러 번 보내도 결과가 같은 메서드
fn is_idempotent(method: &Method) -> bool {
    *method == Method::GET
        || *method == Method::HEAD
        || *method == Method::PUT
        || *method == Method::DELETE
}

/// 재시도 가능한 실패인지 판별
///
/// 429/503은 서버가 처리하지 않았음을 알린 경우라 항상 재시도한다.
/// 네트워크 에러는 연결 전 실패이거나 멱등 메서드일 때만 재시도한다.
fn is_retryable(method: &Method, failure: &RequestFailure) -> bool {
    match &failure.error {
        CoreError::ServiceUnavailable(_) | CoreError::RateLimit { .. } => true,
        CoreError::Network(_) => !failure.reached_server || is_idempotent(method),
        _ => false,
    }
}

/// 요청 1회 실패
struct RequestFailure {
    error: CoreError,
    /// 요청이 서버까지 전달됐을 수 있는지 (연결 수립 실패면 false)
    reached_server: bool,
}

impl From<CoreError> for RequestFailure {
    fn from(error: CoreError) -> Self {
        Self {
            error,
            reached_server: true,
        }
    }
}

/// 단일 요청 명세
struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    query: Vec<(&'static str, String)>,
}

impl ApiRequest {
    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            body: None,
            query: Vec::new(),
        }
    }

    fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// REST API 클라이언트
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    api_prefix: String,
    admin_prefix: String,
    environment: Environment,
    token_manager: Arc<TokenManager>,
    max_retries: u32,
}

impl HttpApiClient {
    /// 새 HTTP API 클라이언트 생성
    pub fn new(config: &AppConfig, token_manager: Arc<TokenManager>) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.rest_connect_timeout())
            .build()
            .map_err(|e| CoreError::Network(format!("HTTP 클라이언트 빌드 실패: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.server.base_url.trim_end_matches('/').to_string(),
            api_prefix: config.server.api_prefix.trim_end_matches('/').to_string(),
            admin_prefix: config.server.admin_prefix.trim_end_matches('/').to_string(),
            environment: config.server.environment,
            token_manager,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// 재시도 횟수 설정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn api_path(&self, path: &str) -> String {
        format!("{}{}", self.api_prefix, path)
    }

    fn admin_path(&self, path: &str) -> String {
        format!("{}/admin{}", self.admin_prefix, path)
    }

    /// 응답 상태 코드 확인 및 에러 매핑
    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, CoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let status_code = status.as_u16();
        let text = resp.text().await.unwrap_or_else(|e| {
            warn!("응답 본문 읽기 실패: {e}");
            String::new()
        });
        let message = serde_json::from_str::<ApiEnvelope<Value>>(&text)
            .ok()
            .and_then(|env| env.error.or(env.message))
            .unwrap_or(text);

        match status_code {
            401 => Err(CoreError::Auth(format!("인증 실패: {message}"))),
            404 => Err(CoreError::NotFound {
                resource_type: "API".to_string(),
                id: message,
            }),
            429 => Err(CoreError::RateLimit {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            }),
            503 => Err(CoreError::ServiceUnavailable(message)),
            _ => Err(CoreError::Api {
                status: status_code,
                message,
            }),
        }
    }

    /// 요청 1회 실행 + envelope 해제
    async fn send_once<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<Option<T>, RequestFailure> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), &url);
        if let Some(token) = self.token_manager.bearer_token() {
            builder = builder.bearer_auth(token);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| RequestFailure {
            reached_server: !e.is_connect(),
            error: CoreError::Network(format!("{} {} 요청 실패: {e}", request.method, request.path)),
        })?;
        let resp = Self::check_response(resp).await?;
        let status = resp.status().as_u16();

        let envelope: ApiEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| CoreError::Internal(format!("응답 파싱 실패 ({}): {e}", request.path)))?;
        Ok(envelope.into_result(status)?)
    }

    /// 재시도가 포함된 요청 실행
    ///
    /// exponential backoff: 1s → 2s → 4s (429는 서버 지정 대기)
    async fn execute_with_retry<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<Option<T>, CoreError> {
        let mut delay = Duration::from_secs(1);
        let mut attempt = 0;

        loop {
            let failure = match self.send_once(request).await {
                Ok(result) => return Ok(result),
                Err(failure) => failure,
            };
            if attempt >= self.max_retries || !is_retryable(&request.method, &failure) {
                return Err(failure.error);
            }
            let e = failure.error;
            if let CoreError::RateLimit { retry_after_secs } = &e {
                delay = Duration::from_secs(*retry_after_secs);
            }
            warn!(
                "요청 실패 (시도 {}/{}): {e}, {delay:?} 후 재시도",
                attempt + 1,
                self.max_retries + 1
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(Duration::from_secs(30));
            attempt += 1;
        }
    }

    /// 요청 실행: 401이면 (운영 환경에서) 토큰 갱신 후 1회 재실행
    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Option<T>, CoreError> {
        match self.execute_with_retry(&request).await {
            Err(CoreError::Auth(msg)) if self.environment != Environment::Development => {
                debug!("401 수신, 토큰 갱신 시도: {}", request.path);
                match self.token_manager.refresh().await {
                    Ok(_) => self.execute_with_retry(&request).await,
                    Err(refresh_err) => {
                        warn!("토큰 갱신 실패, 강제 로그아웃: {refresh_err}");
                        if let Err(e) = self.token_manager.sign_out() {
                            warn!("자격증명 삭제 실패: {e}");
                        }
                        Err(CoreError::Auth(msg))
                    }
                }
            }
            other => other,
        }
    }

    /// data 필수 요청
    async fn call_required<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, CoreError> {
        let path = request.path.clone();
        self.call(request)
            .await?
            .ok_or_else(|| CoreError::Internal(format!("응답 data 누락: {path}")))
    }

    /// 목록 요청 (data 없으면 빈 목록)
    async fn call_list<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<Vec<T>, CoreError> {
        Ok(self.call::<Vec<T>>(request).await?.unwrap_or_default())
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn dashboard_stats(&self) -> Result<DashboardStats, CoreError> {
        self.call_required(ApiRequest::new(Method::GET, self.api_path("/users/stats")))
            .await
    }

    async fn create_scan(&self, request: &CreateScanRequest) -> Result<ScanRecord, CoreError> {
        debug!("스캔 생성 요청");
        let body = serde_json::to_value(request)?;
        self.call_required(ApiRequest::new(Method::POST, self.api_path("/scans")).json(body))
            .await
    }

    async fn list_scans(&self, query: &ScanListQuery) -> Result<Vec<ScanRecord>, CoreError> {
        let mut request = ApiRequest::new(Method::GET, self.api_path("/scans"));
        if let Some(page) = query.page {
            request.query.push(("page", page.to_string()));
        }
        if let Some(limit) = query.limit {
            request.query.push(("limit", limit.to_string()));
        }
        if let Some(status) = &query.status {
            request.query.push(("status", status.clone()));
        }
        self.call_list(request).await
    }

    async fn get_scan(&self, scan_id: &str) -> Result<ScanRecord, CoreError> {
        self.call_required(ApiRequest::new(
            Method::GET,
            self.api_path(&format!("/scans/{scan_id}")),
        ))
        .await
    }

    async fn cancel_scan(&self, scan_id: &str) -> Result<ScanRecord, CoreError> {
        debug!("스캔 취소: {scan_id}");
        self.call_required(ApiRequest::new(
            Method::PATCH,
            self.api_path(&format!("/scans/{scan_id}/cancel")),
        ))
        .await
    }

    async fn retry_scan(&self, scan_id: &str) -> Result<ScanRecord, CoreError> {
        debug!("스캔 재시도: {scan_id}");
        self.call_required(ApiRequest::new(
            Method::POST,
            self.api_path(&format!("/scans/{scan_id}/retry")),
        ))
        .await
    }

    async fn feature_toggles(&self) -> Result<Vec<FeatureToggle>, CoreError> {
        self.call_list(ApiRequest::new(
            Method::GET,
            self.api_path("/user-features/toggles"),
        ))
        .await
    }

    async fn create_feature_toggle(
        &self,
        toggle: &FeatureToggle,
    ) -> Result<FeatureToggle, CoreError> {
        let body = serde_json::to_value(toggle)?;
        self.call_required(
            ApiRequest::new(Method::POST, self.api_path("/user-features/toggles")).json(body),
        )
        .await
    }

    async fn update_feature_toggle(
        &self,
        toggle: &FeatureToggle,
    ) -> Result<FeatureToggle, CoreError> {
        let body = serde_json::to_value(toggle)?;
        self.call_required(
            ApiRequest::new(Method::PATCH, self.api_path("/user-features/toggles")).json(body),
        )
        .await
    }

    async fn current_plan(&self) -> Result<Plan, CoreError> {
        self.call_required(ApiRequest::new(Method::GET, self.api_path("/plans/current")))
            .await
    }

    async fn available_plans(&self) -> Result<Vec<Plan>, CoreError> {
        self.call_list(ApiRequest::new(Method::GET, self.api_path("/plans/available")))
            .await
    }

    async fn feature_access(&self, feature: &str) -> Result<FeatureAccess, CoreError> {
        self.call_required(ApiRequest::new(
            Method::GET,
            self.api_path(&format!("/plans/feature/{feature}/access")),
        ))
        .await
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<RedirectSession, CoreError> {
        let body = serde_json::to_value(request)?;
        self.call_required(
            ApiRequest::new(
                Method::POST,
                self.api_path("/payments/create-checkout-session"),
            )
            .json(body),
        )
        .await
    }

    async fn create_billing_portal(&self, return_url: &str) -> Result<RedirectSession, CoreError> {
        self.call_required(
            ApiRequest::new(Method::POST, self.api_path("/payments/create-billing-portal"))
                .json(serde_json::json!({ "returnUrl": return_url })),
        )
        .await
    }

    async fn payment_methods(&self) -> Result<Vec<PaymentMethod>, CoreError> {
        self.call_list(ApiRequest::new(
            Method::GET,
            self.api_path("/payments/payment-methods"),
        ))
        .await
    }

    async fn invoices(&self) -> Result<Vec<Invoice>, CoreError> {
        self.call_list(ApiRequest::new(Method::GET, self.api_path("/payments/invoices")))
            .await
    }

    async fn cancel_subscription(&self) -> Result<(), CoreError> {
        debug!("구독 해지 요청");
        self.call::<Value>(ApiRequest::new(
            Method::POST,
            self.api_path("/payments/cancel-subscription"),
        ))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AdminApiClient for HttpApiClient {
    async fn admin_users(&self) -> Result<Vec<AdminUser>, CoreError> {
        self.call_list(ApiRequest::new(Method::GET, self.admin_path("/users")))
            .await
    }

    async fn admin_update_user(
        &self,
        user_id: &str,
        changes: &Value,
    ) -> Result<AdminUser, CoreError> {
        self.call_required(
            ApiRequest::new(Method::PUT, self.admin_path(&format!("/users/{user_id}")))
                .json(changes.clone()),
        )
        .await
    }

    async fn admin_delete_user(&self, user_id: &str) -> Result<(), CoreError> {
        self.call::<Value>(ApiRequest::new(
            Method::DELETE,
            self.admin_path(&format!("/users/{user_id}")),
        ))
        .await?;
        Ok(())
    }

    async fn admin_settings(&self) -> Result<AdminSettings, CoreError> {
        Ok(self
            .call::<AdminSettings>(ApiRequest::new(Method::GET, self.admin_path("/settings")))
            .await?
            .unwrap_or_default())
    }

    async fn admin_update_settings(
        &self,
        settings: &AdminSettings,
    ) -> Result<AdminSettings, CoreError> {
        let body = serde_json::to_value(settings)?;
        Ok(self
            .call::<AdminSettings>(
                ApiRequest::new(Method::PUT, self.admin_path("/settings")).json(body),
            )
            .await?
            .unwrap_or_default())
    }

    async fn admin_toggle_auto_scan(&self, enabled: bool) -> Result<Value, CoreError> {
        Ok(self
            .call::<Value>(
                ApiRequest::new(Method::POST, self.admin_path("/auto-scan/toggle"))
                    .json(serde_json::json!({ "enabled": enabled })),
            )
            .await?
            .unwrap_or(Value::Null))
    }

    async fn admin_trigger_auto_scan(&self) -> Result<Value, CoreError> {
        Ok(self
            .call::<Value>(ApiRequest::new(
                Method::POST,
                self.admin_path("/auto-scan/trigger"),
            ))
            .await?
            .unwrap_or(Value::Null))
    }

    async fn admin_add_threats(&self, user_id: &str, threats: &Value) -> Result<Value, CoreError> {
        Ok(self
            .call::<Value>(
                ApiRequest::new(Method::POST, self.admin_path(&format!("/threats/{user_id}")))
                    .json(threats.clone()),
            )
            .await?
            .unwrap_or(Value::Null))
    }

    async fn admin_simulate_scan(&self, user_id: &str) -> Result<Value, CoreError> {
        Ok(self
            .call::<Value>(ApiRequest::new(
                Method::POST,
                self.admin_path(&format!("/simulate-scan/{user_id}")),
            ))
            .await?
            .unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthEvent;
    use crate::credential_store::MemoryCredentialStore;
    use veil_core::ports::credential::{CredentialStore, Credentials};

    fn config_for(url: &str, environment: Environment) -> AppConfig {
        let mut config = AppConfig::default_config();
        config.server.base_url = url.to_string();
        config.server.environment = environment;
        config
    }

    /// 토큰이 저장된 클라이언트를 생성하는 헬퍼
    fn setup_client(
        server: &mockito::ServerGuard,
        environment: Environment,
        refresh_token: Option<&str>,
    ) -> (HttpApiClient, Arc<MemoryCredentialStore>, Arc<TokenManager>) {
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .store(&Credentials {
                access_token: "Bearer old_jwt".to_string(),
                refresh_token: refresh_token.map(str::to_string),
            })
            .unwrap();
        let tm = Arc::new(TokenManager::new(&server.url(), "/api/v1", store.clone()));
        let client = HttpApiClient::new(&config_for(&server.url(), environment), tm.clone())
            .unwrap()
            .with_max_retries(0);
        (client, store, tm)
    }

    fn failure(error: CoreError, reached_server: bool) -> RequestFailure {
        RequestFailure {
            error,
            reached_server,
        }
    }

    #[test]
    fn is_retryable_errors() {
        let network = || CoreError::Network("test".to_string());
        assert!(is_retryable(&Method::GET, &failure(network(), true)));
        assert!(is_retryable(&Method::POST, &failure(network(), false)));
        assert!(!is_retryable(&Method::POST, &failure(network(), true)));
        assert!(!is_retryable(&Method::PATCH, &failure(network(), true)));
        assert!(is_retryable(
            &Method::POST,
            &failure(CoreError::ServiceUnavailable("test".to_string()), true)
        ));
        assert!(is_retryable(
            &Method::GET,
            &failure(CoreError::RateLimit { retry_after_secs: 60 }, true)
        ));
        assert!(!is_retryable(
            &Method::GET,
            &failure(CoreError::Auth("test".to_string()), true)
        ));
        assert!(!is_retryable(
            &Method::GET,
            &failure(
                CoreError::Api {
                    status: 500,
                    message: "x".to_string()
                },
                true
            )
        ));
    }

    #[tokio::test]
    async fn dashboard_stats_success() {
        let mut server = mockito::Server::new_async().await;
        let (client, _, _) = setup_client(&server, Environment::Production, None);

        let mock = server
            .mock("GET", "/api/v1/users/stats")
            .match_header("authorization", "Bearer old_jwt")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"data":{"sitesScanned":40,"threatsFound":4,"totalMatches":9}}"#)
            .create_async()
            .await;

        let stats = client.dashboard_stats().await.unwrap();
        assert_eq!(stats.sites_scanned, 40);
        assert_eq!(stats.total_matches, 9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn envelope_failure_surfaces_server_message() {
        let mut server = mockito::Server::new_async().await;
        let (client, _, _) = setup_client(&server, Environment::Production, None);

        let mock = server
            .mock("GET", "/api/v1/plans/feature/removal/access")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":false,"error":"Upgrade required"}"#)
            .create_async()
            .await;

        let err = client.feature_access("removal").await.unwrap_err();
        assert!(matches!(err, CoreError::Api { ref message, .. } if message == "Upgrade required"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn list_scans_with_query() {
        let mut server = mockito::Server::new_async().await;
        let (client, _, _) = setup_client(&server, Environment::Production, None);

        let mock = server
            .mock("GET", "/api/v1/scans")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("page".into(), "2".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "5".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"data":[{"id":"s1","status":"completed","sitesScanned":10}]}"#)
            .create_async()
            .await;

        let scans = client
            .list_scans(&ScanListQuery {
                page: Some(2),
                limit: Some(5),
                status: None,
            })
            .await
            .unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].sites_scanned, 10);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cancel_scan_uses_patch() {
        let mut server = mockito::Server::new_async().await;
        let (client, _, _) = setup_client(&server, Environment::Production, None);

        let mock = server
            .mock("PATCH", "/api/v1/scans/s9/cancel")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"data":{"id":"s9","status":"cancelled"}}"#)
            .create_async()
            .await;

        let record = client.cancel_scan("s9").await.unwrap();
        assert_eq!(record.status, veil_core::models::api::ScanStatus::Cancelled);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn not_found_404() {
        let mut server = mockito::Server::new_async().await;
        let (client, _, _) = setup_client(&server, Environment::Production, None);

        let mock = server
            .mock("GET", "/api/v1/scans/missing")
            .with_status(404)
            .with_body(r#"{"success":false,"error":"Scan not found"}"#)
            .create_async()
            .await;

        let err = client.get_scan("missing").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { ref id, .. } if id == "Scan not found"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_429_reads_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let (client, _, _) = setup_client(&server, Environment::Production, None);

        let mock = server
            .mock("GET", "/api/v1/payments/invoices")
            .with_status(429)
            .with_header("retry-after", "7")
            .with_body("Too Many Requests")
            .create_async()
            .await;

        let err = client.invoices().await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimit { retry_after_secs: 7 }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_refreshes_and_replays() {
        let mut server = mockito::Server::new_async().await;
        let (client, store, _) = setup_client(&server, Environment::Production, Some("ref_tok"));

        let rejected = server
            .mock("GET", "/api/v1/plans/current")
            .match_header("authorization", "Bearer old_jwt")
            .with_status(401)
            .with_body("expired")
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/api/v1/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"data":{"accessToken":"new_jwt"}}"#)
            .create_async()
            .await;
        let accepted = server
            .mock("GET", "/api/v1/plans/current")
            .match_header("authorization", "Bearer new_jwt")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"data":{"id":"p1","name":"Pro"}}"#)
            .create_async()
            .await;

        let plan = client.current_plan().await.unwrap();
        assert_eq!(plan.name, "Pro");
        rejected.assert_async().await;
        refresh.assert_async().await;
        accepted.assert_async().await;
        assert_eq!(store.load().unwrap().unwrap().access_token, "new_jwt");
    }

    #[tokio::test]
    async fn unauthorized_without_refresh_signs_out() {
        let mut server = mockito::Server::new_async().await;
        let (client, store, tm) = setup_client(&server, Environment::Production, None);
        let mut events = tm.subscribe();

        let mock = server
            .mock("GET", "/api/v1/users/stats")
            .with_status(401)
            .with_body("Unauthorized")
            .create_async()
            .await;

        let err = client.dashboard_stats().await.unwrap_err();
        assert!(matches!(err, CoreError::Auth(_)));
        assert!(store.load().unwrap().is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SignOutRequired {
                redirect: "/login".to_string()
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_in_development_keeps_credentials() {
        let mut server = mockito::Server::new_async().await;
        let (client, store, _) = setup_client(&server, Environment::Development, Some("ref"));

        let mock = server
            .mock("GET", "/api/v1/users/stats")
            .with_status(401)
            .with_body("Unauthorized")
            .create_async()
            .await;

        let err = client.dashboard_stats().await.unwrap_err();
        assert!(matches!(err, CoreError::Auth(_)));
        assert!(store.load().unwrap().is_some());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn admin_paths_use_admin_prefix() {
        let mut server = mockito::Server::new_async().await;
        let (client, _, _) = setup_client(&server, Environment::Production, None);

        let mock = server
            .mock("POST", "/api/admin/auto-scan/toggle")
            .match_body(mockito::Matcher::Json(serde_json::json!({"enabled": true})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true,"data":{"enabled":true}}"#)
            .create_async()
            .await;

        let result = client.admin_toggle_auto_scan(true).await.unwrap();
        assert_eq!(result["enabled"], true);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn cancel_subscription_without_data() {
        let mut server = mockito::Server::new_async().await;
        let (client, _, _) = setup_client(&server, Environment::Production, None);

        let mock = server
            .mock("POST", "/api/v1/payments/cancel-subscription")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        assert!(client.cancel_subscription().await.is_ok());
        mock.assert_async().await;
    }

    /// 요청을 읽고 응답 없이 연결을 끊는 서버. 수락한 연결 수를 센다.
    async fn hang_up_server() -> (String, Arc<std::sync::atomic::AtomicUsize>) {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                drop(stream);
            }
        });
        (url, accepted)
    }

    fn client_at(url: &str, max_retries: u32) -> HttpApiClient {
        let tm = Arc::new(TokenManager::new(
            url,
            "/api/v1",
            Arc::new(MemoryCredentialStore::new()),
        ));
        HttpApiClient::new(&config_for(url, Environment::Production), tm)
            .unwrap()
            .with_max_retries(max_retries)
    }

    #[tokio::test]
    async fn post_is_not_replayed_after_reaching_server() {
        let (url, accepted) = hang_up_server().await;
        let client = client_at(&url, 2);

        let result = client.cancel_subscription().await;
        assert!(matches!(result, Err(CoreError::Network(_))));
        assert_eq!(accepted.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_is_retried_after_network_failure() {
        let (url, accepted) = hang_up_server().await;
        let client = client_at(&url, 1);

        let result = client.dashboard_stats().await;
        assert!(matches!(result, Err(CoreError::Network(_))));
        assert_eq!(accepted.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn post_is_retried_on_service_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let (client, _, _) = setup_client(&server, Environment::Production, None);
        let client = client.with_max_retries(1);

        let unavailable = server
            .mock("POST", "/api/v1/payments/cancel-subscription")
            .with_status(503)
            .with_body("maintenance")
            .expect(2)
            .create_async()
            .await;

        assert!(matches!(
            client.cancel_subscription().await,
            Err(CoreError::ServiceUnavailable(_))
        ));
        unavailable.assert_async().await;
    }
}
