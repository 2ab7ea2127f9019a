//! 데모(simulation) 스캔 스트림.
//!
//! 서버 없이 대시보드를 보여주기 위한 로컬 스트림. 고정 스크립트를 한 단계씩
//! 재생하며 난수나 메시지 파싱으로 수치를 만들지 않는다.

use serde::{Deserialize, Serialize};
use veil_core::models::scan::{ScanKind, ScanSession, ScanStage};

/// 스크립트 한 단계
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoStep {
    pub progress: u8,
    pub site: Option<String>,
    pub stage: ScanStage,
    /// 누적 값
    pub sites_scanned: u32,
    pub threats_found: u32,
    pub total_matches: u32,
}

/// 데모 재생 스크립트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoScript {
    steps: Vec<DemoStep>,
}

/// 기본 스크립트에 쓰는 사이트와 사이트별 (위협, 일치) 수
const DEMO_SITES: [(&str, u32, u32); 8] = [
    ("spokeo.com", 1, 3),
    ("whitepages.com", 0, 1),
    ("beenverified.com", 1, 2),
    ("intelius.com", 0, 0),
    ("peoplefinder.com", 1, 4),
    ("truepeoplesearch.com", 0, 2),
    ("radaris.com", 0, 1),
    ("mylife.com", 1, 2),
];

impl DemoScript {
    /// 단계 목록으로 생성. 진행률은 단조 증가하도록 보정한다.
    pub fn new(steps: Vec<DemoStep>) -> Self {
        let mut high = 0;
        let steps = steps
            .into_iter()
            .map(|mut step| {
                step.progress = step.progress.clamp(high, 100);
                high = step.progress;
                step
            })
            .collect();
        Self { steps }
    }

    /// 기본 데모: 파이프라인 단계를 거치며 8개 사이트를 훑는다
    pub fn standard() -> Self {
        let total = DEMO_SITES.len() as u32;
        let mut steps = vec![
            DemoStep {
                progress: 0,
                site: None,
                stage: ScanStage::Initializing,
                sites_scanned: 0,
                threats_found: 0,
                total_matches: 0,
            },
            DemoStep {
                progress: 5,
                site: None,
                stage: ScanStage::Connecting,
                sites_scanned: 0,
                threats_found: 0,
                total_matches: 0,
            },
        ];

        let (mut threats, mut matches) = (0, 0);
        for (i, (site, t, m)) in DEMO_SITES.iter().enumerate() {
            threats += t;
            matches += m;
            let done = i as u32 + 1;
            let stage = if done * 2 <= total {
                ScanStage::Searching
            } else {
                ScanStage::Analyzing
            };
            steps.push(DemoStep {
                progress: (5 + done * 85 / total) as u8,
                site: Some(site.to_string()),
                stage,
                sites_scanned: done,
                threats_found: threats,
                total_matches: matches,
            });
        }

        steps.push(DemoStep {
            progress: 95,
            site: None,
            stage: ScanStage::Verifying,
            sites_scanned: total,
            threats_found: threats,
            total_matches: matches,
        });
        steps.push(DemoStep {
            progress: 100,
            site: None,
            stage: ScanStage::Completed,
            sites_scanned: total,
            threats_found: threats,
            total_matches: matches,
        });
        Self::new(steps)
    }

    pub fn steps(&self) -> &[DemoStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 데모 스트림: 스크립트 재생 상태
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationStream {
    script: DemoScript,
    cursor: usize,
    session: ScanSession,
}

impl Default for SimulationStream {
    fn default() -> Self {
        Self::new(DemoScript::standard())
    }
}

impl SimulationStream {
    pub fn new(script: DemoScript) -> Self {
        Self {
            script,
            cursor: 0,
            session: ScanSession::idle(ScanKind::Simulation),
        }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// 재생 시작 (처음부터)
    pub fn start(&mut self) {
        self.cursor = 0;
        self.session = ScanSession::idle(ScanKind::Simulation);
        self.session.is_active = true;
        self.advance();
    }

    /// 다음 단계 적용. 재생 중이 아니거나 스크립트가 끝났으면 false.
    pub fn advance(&mut self) -> bool {
        if !self.session.is_active {
            return false;
        }
        let Some(step) = self.script.steps().get(self.cursor).cloned() else {
            self.session.is_active = false;
            return false;
        };
        self.cursor += 1;

        let session = &mut self.session;
        session.progress = step.progress;
        session.current_site = step.site;
        session.metrics.sites_scanned = step.sites_scanned;
        session.metrics.threats_found = step.threats_found;
        session.metrics.total_matches = step.total_matches;
        session.metrics.total_sites = Some(DEMO_SITES.len() as u32);
        session.metrics.site_index = Some(step.sites_scanned);
        if step.stage == ScanStage::Completed {
            session.is_active = false;
        }
        session.current_stage = Some(step.stage);
        true
    }

    /// 재생 중단: 진행 표시를 비운다
    pub fn stop(&mut self) {
        let session = &mut self.session;
        session.is_active = false;
        session.progress = 0;
        session.current_site = None;
        session.current_stage = Some(ScanStage::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.session.is_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_script_is_monotonic_and_ends_completed() {
        let script = DemoScript::standard();
        let progress: Vec<u8> = script.steps().iter().map(|s| s.progress).collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last(), Some(&100));
        assert_eq!(
            script.steps().last().map(|s| s.stage.clone()),
            Some(ScanStage::Completed)
        );
    }

    #[test]
    fn replay_is_deterministic() {
        let run = || {
            let mut stream = SimulationStream::default();
            stream.start();
            while stream.advance() {}
            stream.session().clone()
        };
        let first = run();
        assert_eq!(first, run());
        assert_eq!(first.progress, 100);
        assert_eq!(first.metrics.sites_scanned, 8);
        assert_eq!(first.metrics.threats_found, 4);
        assert_eq!(first.metrics.total_matches, 15);
        assert!(!first.is_active);
    }

    #[test]
    fn start_applies_first_step() {
        let mut stream = SimulationStream::default();
        assert!(!stream.advance());

        stream.start();
        assert!(stream.is_running());
        assert_eq!(stream.session().current_stage, Some(ScanStage::Initializing));

        stream.advance();
        stream.advance();
        assert_eq!(stream.session().current_site.as_deref(), Some("spokeo.com"));
    }

    #[test]
    fn new_clamps_regressing_progress() {
        let step = |progress| DemoStep {
            progress,
            site: None,
            stage: ScanStage::Searching,
            sites_scanned: 0,
            threats_found: 0,
            total_matches: 0,
        };
        let script = DemoScript::new(vec![step(30), step(10), step(200)]);
        let progress: Vec<u8> = script.steps().iter().map(|s| s.progress).collect();
        assert_eq!(progress, vec![30, 30, 100]);
    }

    #[test]
    fn stop_clears_progress() {
        let mut stream = SimulationStream::default();
        stream.start();
        stream.advance();
        stream.stop();
        assert!(!stream.is_running());
        assert_eq!(stream.session().progress, 0);
        assert_eq!(stream.session().current_stage, Some(ScanStage::Stopped));
    }
}
