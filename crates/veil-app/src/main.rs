//! # veil-app
//!
//! Veil 클라이언트 바이너리 진입점.
//! 어댑터 조립, 실시간 스캔 대시보드 구동, 종료 처리.

mod lifecycle;
mod settings;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use veil_core::config::AppConfig;
use veil_core::config_manager::ConfigManager;
use veil_core::models::connection::ConnectionState;
use veil_core::models::events::StartScanOptions;
use veil_core::models::settings::HourlyScanSettings;
use veil_core::ports::api_client::ApiClient;
use veil_network::auth::{AuthEvent, TokenManager};
use veil_network::connection::ConnectionManager;
use veil_network::credential_store::{FileCredentialStore, CREDENTIAL_FILE_NAME};
use veil_network::http_client::HttpApiClient;
use veil_network::ws_client::WsConnector;
use veil_scan::controller::HourlyScanController;
use veil_scan::dashboard::DashboardModel;
use veil_scan::merger::DashboardView;

use crate::lifecycle::LifecycleManager;

/// Veil 클라이언트
///
/// 개인정보 노출 스캔 진행 상황을 실시간으로 보여준다
#[derive(Parser, Debug)]
#[command(name = "veil")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 실시간 채널을 열 사용자 ID (없으면 연결하지 않는다)
    #[arg(long, short = 'u')]
    user_id: Option<String>,

    /// 서버 URL 지정 (기본: http://localhost:5000)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,

    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리의 config.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// 연결 후 수동 1회 스캔 실행
    #[arg(long, conflicts_with_all = ["start", "stop"])]
    manual: bool,

    /// 연결 후 정기 스캔 시작
    #[arg(long, conflicts_with = "stop")]
    start: bool,

    /// 연결 후 정기 스캔 중단
    #[arg(long)]
    stop: bool,

    /// 정기 스캔 주기 (분). 단독으로 주면 설정 변경을 요청한다.
    #[arg(long)]
    interval: Option<u32>,

    /// 데모 스캔 재생 (단계 간격, 밀리초)
    #[arg(long, value_name = "MILLIS", num_args = 0..=1, default_missing_value = "800")]
    demo: Option<u64>,

    /// 대시보드 변경을 JSON 한 줄씩 stdout으로 출력
    #[arg(long)]
    json: bool,
}

/// 설정 파일 경로 결정 (CLI 인자 또는 플랫폼 기본 경로, 없으면 기본 파일 생성)
fn resolve_config_path(arg: Option<PathBuf>) -> Option<PathBuf> {
    if arg.is_some() {
        return arg;
    }
    match ConfigManager::new() {
        Ok(manager) => Some(manager.config_path().to_path_buf()),
        Err(e) => {
            warn!("설정 디렉토리 사용 불가, 기본값 사용: {e}");
            None
        }
    }
}

/// 자격증명 파일 경로 (설정값 우선, 없으면 플랫폼 데이터 디렉토리)
fn resolve_token_path(config: &AppConfig) -> PathBuf {
    if let Some(path) = &config.credentials.token_path {
        return path.clone();
    }
    ConfigManager::data_dir()
        .map(|dir| dir.join(CREDENTIAL_FILE_NAME))
        .unwrap_or_else(|_| PathBuf::from(CREDENTIAL_FILE_NAME))
}

fn log_view(view: &DashboardView) {
    if let Some(error) = &view.error {
        warn!("[{}] {error}", view.scan_type_label);
    }
    if !view.is_actively_scanning {
        info!(
            "대기 중: 사이트 {} / 위협 {} / 일치 {}",
            view.sites_scanned, view.threats_found, view.total_matches
        );
        return;
    }
    info!(
        "[{}] {:>3}% {} {}",
        view.scan_type_label,
        view.progress,
        view.current_stage
            .as_ref()
            .map(|s| s.as_str())
            .unwrap_or("-"),
        view.current_site.as_deref().unwrap_or("")
    );
}

/// 표시 모델 변경을 로그(또는 JSON)로 내보낸다
async fn report_views(mut views: watch::Receiver<DashboardView>, json: bool) {
    loop {
        let view = views.borrow_and_update().clone();
        if json {
            match serde_json::to_string(&view) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("표시 모델 직렬화 실패: {e}"),
            }
        } else {
            log_view(&view);
        }
        if views.changed().await.is_err() {
            break;
        }
    }
}

/// 강제 로그아웃 감시: 로그인 화면 이동 대신 종료
async fn watch_auth(mut events: broadcast::Receiver<AuthEvent>, lifecycle: Arc<LifecycleManager>) {
    loop {
        match events.recv().await {
            Ok(AuthEvent::TokenRefreshed) => debug!("토큰 갱신됨"),
            Ok(AuthEvent::SignOutRequired { redirect }) => {
                warn!("인증 만료: 다시 로그인 필요 ({redirect})");
                lifecycle.shutdown();
                break;
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// 사용자 룸 참여까지 대기. 룸 이벤트를 놓치지 않도록 명령은 그 뒤에 보낸다.
async fn wait_for_room(mut state: watch::Receiver<ConnectionState>, wait: Duration) -> bool {
    match tokio::time::timeout(wait, state.wait_for(ConnectionState::is_ready)).await {
        Ok(Ok(_)) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            warn!("실시간 채널 룸 참여 대기 시간 초과 ({}초)", wait.as_secs());
            false
        }
    }
}

/// 룸 참여를 기다린 뒤 CLI로 요청한 스캔 명령 실행
async fn run_commands(
    args: &Args,
    controller: &HourlyScanController,
    connection: &ConnectionManager,
    config: &AppConfig,
) {
    let wait = config.socket.connect_timeout() * (config.socket.reconnection_attempts + 1);
    if !wait_for_room(connection.state(), wait).await {
        return;
    }

    if args.manual {
        controller.run_manual_scan().await;
    } else if args.start {
        controller
            .start_scan(StartScanOptions {
                interval_minutes: args.interval,
                ..StartScanOptions::default()
            })
            .await;
    } else if args.stop {
        controller.stop_scan().await;
    } else if let Some(interval_minutes) = args.interval {
        let current = controller.snapshot().settings().clone();
        controller
            .update_settings(HourlyScanSettings {
                interval_minutes,
                ..current
            })
            .await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "veil={lvl},veil_app={lvl},veil_core={lvl},veil_network={lvl},veil_scan={lvl}",
        lvl = args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    info!("Veil 클라이언트 시작");

    // 설정 로드 + CLI 오버라이드
    let config_path = resolve_config_path(args.config.clone());
    let mut config = settings::load(config_path.as_deref())?;
    if let Some(ref server_url) = args.server {
        config.server.base_url = server_url.clone();
    }
    if let Some(interval) = args.interval {
        config.scan.default_interval_minutes = interval;
    }
    config.validate()?;
    info!("서버: {}", config.server.base_url);

    // 어댑터 조립
    let store = Arc::new(FileCredentialStore::new(resolve_token_path(&config)));
    let tokens = Arc::new(TokenManager::new(
        &config.server.base_url,
        &config.server.api_prefix,
        store,
    ));
    let api = HttpApiClient::new(&config, tokens.clone())?;
    let connector = Arc::new(WsConnector::new(config.socket_endpoint(), &config.socket)?);
    let connection = Arc::new(ConnectionManager::new(
        connector,
        tokens.clone(),
        config.socket.clone(),
    ));
    let controller = HourlyScanController::spawn(connection.clone(), &config);
    let lifecycle = Arc::new(LifecycleManager::new());

    // 대시보드
    let mut model = DashboardModel::default();
    if tokens.is_authenticated() {
        match api.dashboard_stats().await {
            Ok(stats) => {
                model.seed_from_stats(&stats);
            }
            Err(e) => warn!("대시보드 통계 조회 실패: {e}"),
        }
    }
    let (views_tx, views_rx) = watch::channel(model.view().clone());
    let demo_tick = args.demo.map(Duration::from_millis);
    let background = [
        tokio::spawn(model.run(controller.subscribe(), demo_tick, views_tx)),
        tokio::spawn(report_views(views_rx, args.json)),
        tokio::spawn(watch_auth(tokens.subscribe(), lifecycle.clone())),
    ];

    match args.user_id.as_deref() {
        Some(user_id) => {
            connection.connect(user_id);
            run_commands(&args, &controller, &connection, &config).await;
        }
        None if args.demo.is_none() => {
            info!("사용자 ID 없음: 실시간 채널을 열지 않습니다 (--user-id 또는 --demo)");
        }
        None => {}
    }

    tokio::select! {
        _ = lifecycle.wait_for_signal() => {}
        _ = lifecycle.wait_for_shutdown() => {}
    }

    controller.shutdown();
    connection.disconnect();
    for task in background {
        task.abort();
    }

    info!("Veil 클라이언트 종료");
    Ok(())
}
