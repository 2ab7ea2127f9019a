//! 설정 파일 위치와 기본 파일 부트스트랩.
//!
//! 실제 로드는 바이너리에서 파일/환경변수를 겹쳐 처리하고, 여기서는
//! 플랫폼 디렉토리 결정과 JSON 파일 읽기/쓰기만 담당한다.

use crate::config::AppConfig;
use crate::error::CoreError;
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 설정 파일 이름
pub const CONFIG_FILE_NAME: &str = "config.json";

/// 설정 파일 관리자
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// 플랫폼 설정 디렉토리의 `config.json`을 사용한다.
    /// 파일이 없으면 기본값으로 만든다.
    pub fn new() -> Result<Self, CoreError> {
        Self::with_path(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    pub fn with_path(config_path: PathBuf) -> Result<Self, CoreError> {
        let manager = Self { config_path };
        if !manager.config_path.exists() {
            manager.write(&AppConfig::default_config())?;
            info!("기본 설정 파일 생성: {}", manager.config_path.display());
        }
        Ok(manager)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 파일 내용을 그대로 읽는다 (환경변수 미적용)
    pub fn read(&self) -> Result<AppConfig, CoreError> {
        let path = &self.config_path;
        let raw = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{} 읽기 실패: {e}", path.display())))?;
        let config = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("{} 파싱 실패: {e}", path.display())))?;
        debug!("설정 파일 읽음: {}", path.display());
        Ok(config)
    }

    /// 검증을 통과한 설정만 기록한다
    pub fn write(&self, config: &AppConfig) -> Result<(), CoreError> {
        config.validate()?;
        let path = &self.config_path;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                CoreError::Config(format!("{} 디렉토리 생성 실패: {e}", dir.display()))
            })?;
        }
        let body = serde_json::to_string_pretty(config)?;
        fs::write(path, body)
            .map_err(|e| CoreError::Config(format!("{} 기록 실패: {e}", path.display())))
    }

    /// 읽고, 고치고, 다시 기록한다
    pub fn modify(&self, edit: impl FnOnce(&mut AppConfig)) -> Result<AppConfig, CoreError> {
        let mut config = self.read()?;
        edit(&mut config);
        self.write(&config)?;
        Ok(config)
    }

    /// 플랫폼 설정 디렉토리 (예: Linux `~/.config/veil-client/`)
    pub fn config_dir() -> Result<PathBuf, CoreError> {
        Ok(project_dirs()?.config_dir().to_path_buf())
    }

    /// 플랫폼 데이터 디렉토리 (자격증명 파일 위치)
    pub fn data_dir() -> Result<PathBuf, CoreError> {
        Ok(project_dirs()?.data_dir().to_path_buf())
    }
}

fn project_dirs() -> Result<ProjectDirs, CoreError> {
    ProjectDirs::from("io", "veil", "veil-client")
        .ok_or_else(|| CoreError::Config("홈 디렉토리를 찾을 수 없습니다".to_string()))
}
