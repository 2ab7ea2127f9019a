//! 설정 계층 로드.
//!
//! 기본값 → 설정 파일(JSON) → `VEIL_` 환경변수 순서로 겹친다.
//! 환경변수는 `VEIL_SERVER__BASE_URL`처럼 `__`로 중첩 키를 구분한다.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat, Map};
use std::path::Path;
use veil_core::config::AppConfig;

/// 환경변수 접두사
const ENV_PREFIX: &str = "VEIL";

/// 파일 + 프로세스 환경변수로 설정 로드
pub fn load(file: Option<&Path>) -> Result<AppConfig> {
    build(file, env_source(None))
}

fn env_source(vars: Option<Map<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .source(vars)
}

fn build(file: Option<&Path>, env: Environment) -> Result<AppConfig> {
    let defaults =
        Config::try_from(&AppConfig::default_config()).context("기본 설정 직렬화 실패")?;

    let mut builder = Config::builder().add_source(defaults);
    if let Some(path) = file {
        builder = builder.add_source(File::from(path).format(FileFormat::Json).required(false));
    }

    let config: AppConfig = builder
        .add_source(env)
        .build()
        .context("설정 로드 실패")?
        .try_deserialize()
        .context("설정 형식 오류")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use veil_core::config::Environment as RunEnvironment;

    fn vars(pairs: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_without_sources() {
        let config = build(None, env_source(vars(&[]))).unwrap();
        assert_eq!(config.server.base_url, "http://localhost:5000");
        assert_eq!(config.socket.heartbeat_interval_secs, 25);
        assert_eq!(config.scan.history_limit, 10);
    }

    #[test]
    fn file_then_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "server": { "base_url": "https://api.veil.test", "environment": "development" },
                "scan": { "completion_display_secs": 5 }
            }"#,
        )
        .unwrap();

        let config = build(
            Some(&path),
            env_source(vars(&[
                ("VEIL_SERVER__BASE_URL", "https://env.veil.test"),
                ("VEIL_SOCKET__RECONNECTION_ATTEMPTS", "2"),
            ])),
        )
        .unwrap();

        assert_eq!(config.server.base_url, "https://env.veil.test");
        assert_eq!(config.server.environment, RunEnvironment::Development);
        assert_eq!(config.scan.completion_display_secs, 5);
        assert_eq!(config.socket.reconnection_attempts, 2);
        // 파일에 없는 키는 기본값 유지
        assert_eq!(config.server.api_prefix, "/api/v1");
    }

    #[test]
    fn missing_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = build(Some(&dir.path().join("nope.json")), env_source(vars(&[]))).unwrap();
        assert_eq!(config.server.api_prefix, "/api/v1");
    }

    #[test]
    fn invalid_values_rejected() {
        let err = build(
            None,
            env_source(vars(&[("VEIL_SERVER__BASE_URL", "ftp://nope")])),
        )
        .unwrap_err();
        assert!(err.to_string().contains("server.base_url"));
    }
}
