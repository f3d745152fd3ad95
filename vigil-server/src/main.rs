use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use vigil_core::VigilConfig;
use vigil_dispatch::AlertDispatcher;
use vigil_engine::{DecisionEngine, DecisionEngineConfig, DirectiveRegistry};
use vigil_reasoning::{ReasoningClient, ReasoningConfig};
use vigil_server::directive_parser::KeywordDirectiveParser;
use vigil_server::{http, websocket, AppState};
use vigil_vision::{FrameSource, FrameStore, HttpFrameSource, VisionClient, VisionConfig};
use vigil_worker::{CameraWorkerConfig, Supervisor};

/// Command-line overrides layered on top of the environment-driven
/// `VigilConfig` (spec External Interfaces). Most deployments only ever
/// need the environment variables; the flag exists for local runs.
#[derive(Parser, Debug)]
#[command(name = "vigil-server", about = "Vigil surveillance decision pipeline")]
struct Cli {
    #[arg(long)]
    http_addr: Option<String>,
}

const PUSH_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = VigilConfig::from_env();
    if let Some(addr) = cli.http_addr {
        config.http_addr = addr;
    }
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    info!(http_addr = %config.http_addr, "starting vigil-server");

    let registry = Arc::new(DirectiveRegistry::new());
    let dispatcher = Arc::new(AlertDispatcher::new(config.alert_ring_capacity));
    let decision_engine = Arc::new(DecisionEngine::new(DecisionEngineConfig {
        object_threshold: config.object_threshold,
        activity_threshold: config.activity_threshold,
        undirected_immediate_threshold: config.undirected_immediate_threshold,
        summary_collect_threshold: config.summary_collect_threshold,
        ..DecisionEngineConfig::default()
    }));
    let frame_store = Arc::new(FrameStore::new(config.frame_store_root.clone()));

    let vision_client = build_vision_client();
    let reasoning_client = build_reasoning_client();
    if vision_client.is_none() {
        warn!("no vision model credential configured; every camera will run in the degraded no-vision state");
    }
    if reasoning_client.is_none() {
        info!("no reasoning model credential configured; directives will be evaluated vision-only");
    }

    let vision_defaults = VisionConfig::default();
    let worker_config = CameraWorkerConfig {
        tick_interval: config.tick_interval(),
        retry_base_delay: std::time::Duration::from_secs(vision_defaults.retry_base_delay_secs),
        retry_cap: std::time::Duration::from_secs(vision_defaults.retry_cap_secs),
        retry_max_attempts: vision_defaults.retry_max_attempts,
        baseline_stability_frames: config.baseline_stability_frames,
        history_window: config.history_window,
        summary_interval: config.summary_interval(),
        consecutive_failure_threshold: 5,
    };

    let supervisor = Arc::new(Supervisor::new(registry.clone(), dispatcher.clone(), worker_config));
    let dispatcher_for_diagnostics = dispatcher.clone();

    let (live_feed_tx, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
    let (analysis_tx, _) = broadcast::channel(PUSH_CHANNEL_CAPACITY);

    for (camera_id, snapshot_url) in configured_cameras() {
        info!(camera_id = %camera_id, "registering camera");
        let factory_camera_id = camera_id.clone();
        let factory_url = snapshot_url.clone();
        let factory: vigil_worker::FrameSourceFactory = Arc::new(move || {
            Box::new(HttpFrameSource::new(factory_camera_id.clone(), factory_url.clone())) as Box<dyn FrameSource>
        });
        supervisor.register_camera(
            camera_id,
            factory,
            vision_client.clone(),
            reasoning_client.clone(),
            frame_store.clone(),
            decision_engine.clone(),
            live_feed_tx.clone(),
            analysis_tx.clone(),
        );
    }

    let state = AppState {
        registry,
        dispatcher,
        supervisor: supervisor.clone(),
        live_feed_tx,
        analysis_tx,
        parser: Arc::new(KeywordDirectiveParser),
    };

    let app = http::router()
        .route("/ws", axum::routing::get(websocket::websocket_handler))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(addr = %config.http_addr, "http server listening");

    let diagnostics_handle = tokio::spawn(run_diagnostics_timer(dispatcher_for_diagnostics));

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    info!("shutting down camera workers");
    diagnostics_handle.abort();
    supervisor.shutdown().await;
    info!("vigil-server stopped");
    Ok(())
}

/// Surfaces `AlertDispatcher`'s per-subscriber drop counters on the `system`
/// push channel (spec 6). Runs for the life of the process; only ever exits
/// via `abort()` at shutdown.
async fn run_diagnostics_timer(dispatcher: Arc<AlertDispatcher>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let counts = dispatcher.drop_counts();
        let total: u64 = counts.iter().map(|(_, n)| n).sum();
        if total == 0 {
            continue;
        }
        let message = counts
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(id, n)| format!("{id}={n}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut alert = vigil_core::Alert::new(
            "*",
            vigil_core::AlertSeverity::Info,
            vigil_core::AlertKind::System,
            "dispatcher_drop_counters",
            format!("subscribers dropped {total} alert(s) total: {message}"),
            vigil_core::AlertSource::Override,
        );
        alert.reasons = vec!["dispatcher_drop_counters".to_string()];
        dispatcher.dispatch(alert);
    }
}

/// `VISION_API_KEY` / `REASONING_API_KEY` are role-scoped, not provider-scoped
/// (spec External Interfaces): an operator names the credential for "the
/// vision model" without needing to know which provider it happens to be.
/// Falls back to the provider's own conventional variable name so a
/// deployment that already exports `OPENAI_API_KEY` etc. still works.
fn build_vision_client() -> Option<Arc<VisionClient>> {
    let config = VisionConfig::from_env();
    let api_key = std::env::var("VISION_API_KEY")
        .or_else(|_| std::env::var(config.provider.env_var_name()))
        .ok();
    VisionClient::new(&config, api_key).map(Arc::new)
}

fn build_reasoning_client() -> Option<Arc<ReasoningClient>> {
    let config = ReasoningConfig::from_env();
    let api_key = std::env::var("REASONING_API_KEY")
        .or_else(|_| std::env::var(config.provider.env_var_name()))
        .ok();
    ReasoningClient::new(&config, api_key).map(Arc::new)
}

/// Cameras are preconfigured via the environment: `CAMERA_IDS` is a
/// comma-separated list, and each id's snapshot URL is read from
/// `CAMERA_<ID>_SNAPSHOT_URL` (id upper-cased). There is no dynamic camera
/// registration endpoint (spec 6's surface lists only `/cameras/{id}/start`
/// and `/cameras/{id}/stop`, which act on already-registered cameras).
fn configured_cameras() -> Vec<(String, String)> {
    let ids = std::env::var("CAMERA_IDS").unwrap_or_default();
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .filter_map(|id| {
            let key = format!("CAMERA_{}_SNAPSHOT_URL", id.to_uppercase());
            match std::env::var(&key) {
                Ok(url) => Some((id.to_string(), url)),
                Err(_) => {
                    warn!(camera_id = %id, env_key = %key, "no snapshot url configured, skipping camera");
                    None
                }
            }
        })
        .collect()
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
