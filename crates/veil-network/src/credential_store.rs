//! 로컬 자격증명 저장소.
//!
//! `CredentialStore` 포트 구현. JSON 파일과 인메모리 두 가지.

use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use veil_core::error::CoreError;
use veil_core::ports::credential::{CredentialStore, Credentials};

/// 토큰 파일 이름
pub const CREDENTIAL_FILE_NAME: &str = "credentials.json";

/// JSON 파일 기반 자격증명 저장소
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// 지정 경로에 저장소 생성 (파일은 첫 저장 시 생성)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 저장 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credentials>, CoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let credentials: Credentials = serde_json::from_str(&content)?;
        Ok(Some(credentials))
    }

    fn store(&self, credentials: &Credentials) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(credentials)?;
        fs::write(&self.path, content)?;
        debug!("자격증명 저장: {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), CoreError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            debug!("자격증명 삭제: {}", self.path.display());
        }
        Ok(())
    }
}

/// 인메모리 자격증명 저장소 (테스트, 일회성 실행)
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 액세스 토큰만으로 생성
    pub fn with_token(access_token: &str) -> Self {
        Self {
            inner: RwLock::new(Some(Credentials {
                access_token: access_token.to_string(),
                refresh_token: None,
            })),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credentials>, CoreError> {
        Ok(self.inner.read().clone())
    }

    fn store(&self, credentials: &Credentials) -> Result<(), CoreError> {
        *self.inner.write() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CoreError> {
        *self.inner.write() = None;
        Ok(())
    }
}
