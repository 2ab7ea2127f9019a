//! REST API 모델.
//!
//! 모든 응답은 `{success, data?, error?}` envelope을 따른다.
//! 서버가 추가하는 필드는 `extra`로 보존한다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::CoreError;

/// 공통 응답 envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// 성공이면 data, 실패면 `CoreError::Api`
    ///
    /// data가 없는 성공 응답은 `T`가 `Option`/`()`가 아니면 파싱 에러로 드러난다.
    pub fn into_result(self, status: u16) -> Result<Option<T>, CoreError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(CoreError::Api {
                status,
                message: self
                    .error
                    .or(self.message)
                    .unwrap_or_else(|| "Request failed".to_string()),
            })
        }
    }
}

/// 대시보드 통계 (`GET /users/stats`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    #[serde(default)]
    pub sites_scanned: u32,
    #[serde(default, alias = "potentialThreats")]
    pub threats_found: u32,
    #[serde(default)]
    pub total_matches: u32,
    #[serde(default)]
    pub removals_completed: u32,
    #[serde(default)]
    pub last_scan_time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// 스캔 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// 스캔 레코드 (`/scans`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub status: ScanStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub sites_scanned: u32,
    #[serde(default, alias = "potentialThreats")]
    pub threats_found: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// 스캔 생성 요청 (`POST /scans`)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScanRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sites: Vec<String>,
}

/// 스캔 목록 조회 조건 (`GET /scans`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// 기능 토글 (`/user-features/toggles`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureToggle {
    pub feature: String,
    pub enabled: bool,
}

/// 요금제 (`/plans/*`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub trial_ends_at: Option<DateTime<Utc>>,
}

/// 기능 접근 권한 (`GET /plans/feature/:feature/access`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureAccess {
    #[serde(alias = "hasAccess")]
    pub allowed: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// 결제 세션/포털 리다이렉트 URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectSession {
    pub url: String,
    #[serde(default, alias = "sessionId")]
    pub id: Option<String>,
}

/// 체크아웃 세션 생성 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// 결제 수단
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// 청구서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pdf_url: Option<String>,
}

/// 관리자 사용자 뷰
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// 관리자 설정 (서버 정의 키-값)
pub type AdminSettings = HashMap<String, Value>;
