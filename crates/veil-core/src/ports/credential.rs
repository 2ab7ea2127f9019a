//! 로컬 자격증명 저장소 포트.
//!
//! 구현: `veil-network::credential_store` (JSON 파일, 인메모리)

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// 저장된 자격증명
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// 액세스 토큰 (`Bearer ` 접두사가 붙어 저장될 수 있음)
    pub access_token: String,
    /// 리프레시 토큰
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// 자격증명 저장소
pub trait CredentialStore: Send + Sync {
    /// 저장된 자격증명 로드 (없으면 None)
    fn load(&self) -> Result<Option<Credentials>, CoreError>;

    /// 자격증명 저장 (덮어쓰기)
    fn store(&self, credentials: &Credentials) -> Result<(), CoreError>;

    /// 자격증명 삭제
    fn clear(&self) -> Result<(), CoreError>;
}
