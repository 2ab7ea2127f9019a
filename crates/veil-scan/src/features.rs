//! 사용자 기능 토글.
//!
//! 토글 변경은 요청 즉시 pending으로 표시하고, 서버 응답으로 확정하거나
//! 실패 시 되돌린다.

use std::collections::BTreeMap;
use tracing::{debug, warn};
use veil_core::error::CoreError;
use veil_core::models::api::FeatureToggle;
use veil_core::models::optimistic::Optimistic;
use veil_core::ports::api_client::ApiClient;

/// 기능별 토글 상태
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureToggles {
    toggles: BTreeMap<String, Optimistic<bool>>,
}

impl FeatureToggles {
    pub fn new() -> Self {
        Self::default()
    }

    /// 서버 목록으로 확정값 교체 (진행 중 요청은 폐기)
    pub fn load(&mut self, toggles: Vec<FeatureToggle>) {
        self.toggles = toggles
            .into_iter()
            .map(|t| (t.feature, Optimistic::new(t.enabled)))
            .collect();
    }

    /// 표시값 (pending 우선, 모르는 기능은 false)
    pub fn is_enabled(&self, feature: &str) -> bool {
        self.toggles
            .get(feature)
            .map(|t| *t.display())
            .unwrap_or(false)
    }

    /// 서버 확정값
    pub fn confirmed(&self, feature: &str) -> Option<bool> {
        self.toggles.get(feature).map(|t| *t.confirmed())
    }

    pub fn is_pending(&self, feature: &str) -> bool {
        self.toggles.get(feature).is_some_and(Optimistic::is_pending)
    }

    /// 변경 요청 시작
    pub fn begin_update(&mut self, feature: &str, enabled: bool) {
        self.toggles
            .entry(feature.to_string())
            .or_insert_with(|| Optimistic::new(false))
            .begin(enabled);
    }

    /// 서버 응답 반영
    pub fn confirm(&mut self, toggle: FeatureToggle) {
        self.toggles
            .entry(toggle.feature)
            .or_insert_with(|| Optimistic::new(toggle.enabled))
            .confirm(toggle.enabled);
    }

    /// 요청 실패: pending 폐기
    pub fn rollback(&mut self, feature: &str) {
        if let Some(toggle) = self.toggles.get_mut(feature) {
            toggle.rollback();
        }
    }

    /// 서버에서 목록 다시 읽기
    pub async fn refresh(&mut self, api: &dyn ApiClient) -> Result<(), CoreError> {
        let toggles = api.feature_toggles().await?;
        debug!("기능 토글 {}개 로드", toggles.len());
        self.load(toggles);
        Ok(())
    }

    /// 토글 변경: pending 표시 후 서버 확정, 실패 시 롤백
    pub async fn set(
        &mut self,
        api: &dyn ApiClient,
        feature: &str,
        enabled: bool,
    ) -> Result<bool, CoreError> {
        self.begin_update(feature, enabled);
        let request = FeatureToggle {
            feature: feature.to_string(),
            enabled,
        };
        match api.update_feature_toggle(&request).await {
            Ok(confirmed) => {
                let value = confirmed.enabled;
                self.confirm(confirmed);
                Ok(value)
            }
            Err(e) => {
                warn!("기능 토글 변경 실패 ({feature}): {e}");
                self.rollback(feature);
                Err(e)
            }
        }
    }
}
