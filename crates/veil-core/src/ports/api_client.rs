//! REST API 클라이언트 포트.
//!
//! 구현: `veil-network::http_client` (reqwest)

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;
use crate::models::api::{
    AdminSettings, AdminUser, CheckoutRequest, CreateScanRequest, DashboardStats, FeatureAccess,
    FeatureToggle, Invoice, PaymentMethod, Plan, RedirectSession, ScanListQuery, ScanRecord,
};

/// 사용자 API (`/api/v1/...`)
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// 대시보드 통계
    async fn dashboard_stats(&self) -> Result<DashboardStats, CoreError>;

    /// 스캔 생성
    async fn create_scan(&self, request: &CreateScanRequest) -> Result<ScanRecord, CoreError>;

    /// 스캔 목록
    async fn list_scans(&self, query: &ScanListQuery) -> Result<Vec<ScanRecord>, CoreError>;

    /// 스캔 단건
    async fn get_scan(&self, scan_id: &str) -> Result<ScanRecord, CoreError>;

    /// 스캔 취소
    async fn cancel_scan(&self, scan_id: &str) -> Result<ScanRecord, CoreError>;

    /// 실패한 스캔 재시도
    async fn retry_scan(&self, scan_id: &str) -> Result<ScanRecord, CoreError>;

    /// 기능 토글 목록
    async fn feature_toggles(&self) -> Result<Vec<FeatureToggle>, CoreError>;

    /// 기능 토글 생성
    async fn create_feature_toggle(&self, toggle: &FeatureToggle)
        -> Result<FeatureToggle, CoreError>;

    /// 기능 토글 변경
    async fn update_feature_toggle(&self, toggle: &FeatureToggle)
        -> Result<FeatureToggle, CoreError>;

    /// 현재 요금제
    async fn current_plan(&self) -> Result<Plan, CoreError>;

    /// 구독 가능한 요금제
    async fn available_plans(&self) -> Result<Vec<Plan>, CoreError>;

    /// 기능 접근 권한
    async fn feature_access(&self, feature: &str) -> Result<FeatureAccess, CoreError>;

    /// 결제 체크아웃 세션 생성
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<RedirectSession, CoreError>;

    /// 결제 포털 세션 생성
    async fn create_billing_portal(&self, return_url: &str) -> Result<RedirectSession, CoreError>;

    /// 결제 수단 목록
    async fn payment_methods(&self) -> Result<Vec<PaymentMethod>, CoreError>;

    /// 청구서 목록
    async fn invoices(&self) -> Result<Vec<Invoice>, CoreError>;

    /// 구독 해지
    async fn cancel_subscription(&self) -> Result<(), CoreError>;
}

/// 관리자 API (`/api/admin/...`)
#[async_trait]
pub trait AdminApiClient: Send + Sync {
    async fn admin_users(&self) -> Result<Vec<AdminUser>, CoreError>;

    async fn admin_update_user(&self, user_id: &str, changes: &Value)
        -> Result<AdminUser, CoreError>;

    async fn admin_delete_user(&self, user_id: &str) -> Result<(), CoreError>;

    async fn admin_settings(&self) -> Result<AdminSettings, CoreError>;

    async fn admin_update_settings(&self, settings: &AdminSettings)
        -> Result<AdminSettings, CoreError>;

    /// 자동 스캔 전역 on/off
    async fn admin_toggle_auto_scan(&self, enabled: bool) -> Result<Value, CoreError>;

    /// 자동 스캔 즉시 실행
    async fn admin_trigger_auto_scan(&self) -> Result<Value, CoreError>;

    /// 사용자 위협 데이터 주입
    async fn admin_add_threats(&self, user_id: &str, threats: &Value) -> Result<Value, CoreError>;

    /// 사용자 스캔 시뮬레이션
    async fn admin_simulate_scan(&self, user_id: &str) -> Result<Value, CoreError>;
}
