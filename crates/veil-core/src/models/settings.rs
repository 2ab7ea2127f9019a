//! 정기 스캔 설정 모델.

use serde::{Deserialize, Serialize};

/// 사용자 정기 스캔 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyScanSettings {
    /// 스캔 주기 (분, 양수)
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    /// 스캔 알림 활성화
    #[serde(default)]
    pub enable_notifications: bool,
    /// 비업무 시간에도 실행
    #[serde(default)]
    pub run_during_off_hours: bool,
}

impl Default for HourlyScanSettings {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            enable_notifications: true,
            run_during_off_hours: true,
        }
    }
}

impl HourlyScanSettings {
    /// 지정 주기로 기본 설정 생성
    pub fn with_interval(interval_minutes: u32) -> Self {
        Self {
            interval_minutes,
            ..Self::default()
        }
    }

    /// 서버가 보낸 부분 설정을 덮어쓴다 (없는 필드는 유지)
    pub fn merge(&mut self, patch: &SettingsPatch) {
        if let Some(interval) = patch.interval_minutes.filter(|m| *m > 0) {
            self.interval_minutes = interval;
        }
        if let Some(enable) = patch.enable_notifications {
            self.enable_notifications = enable;
        }
        if let Some(off_hours) = patch.run_during_off_hours {
            self.run_during_off_hours = off_hours;
        }
    }
}

/// 부분 설정 (status / settings_updated 페이로드)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_during_off_hours: Option<bool>,
}

impl From<&HourlyScanSettings> for SettingsPatch {
    fn from(settings: &HourlyScanSettings) -> Self {
        Self {
            interval_minutes: Some(settings.interval_minutes),
            enable_notifications: Some(settings.enable_notifications),
            run_during_off_hours: Some(settings.run_during_off_hours),
        }
    }
}

fn default_interval_minutes() -> u32 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_absent_fields() {
        let mut settings = HourlyScanSettings::default();
        settings.merge(&SettingsPatch {
            interval_minutes: Some(30),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.interval_minutes, 30);
        assert!(settings.enable_notifications);
        assert!(settings.run_during_off_hours);
    }

    #[test]
    fn merge_ignores_zero_interval() {
        let mut settings = HourlyScanSettings::default();
        settings.merge(&SettingsPatch {
            interval_minutes: Some(0),
            enable_notifications: Some(false),
            run_during_off_hours: None,
        });
        assert_eq!(settings.interval_minutes, 60);
        assert!(!settings.enable_notifications);
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(HourlyScanSettings::with_interval(15)).unwrap();
        assert_eq!(json["intervalMinutes"], 15);
        assert_eq!(json["runDuringOffHours"], true);
    }
}
