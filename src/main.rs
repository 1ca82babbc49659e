use std::sync::Arc;
use vol_regime::config::AppConfig;
use vol_regime::feeds::snapshot;
use vol_regime::runner::{self, Engine};

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries only the JSON report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("vol_regime starting");

    // Load config
    let cfg = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    let engine = match Engine::from_config(&cfg) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("engine setup error: {e}");
            std::process::exit(1);
        }
    };

    let snap = match snapshot::load_snapshot(&cfg.snapshot_path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("snapshot error: {e}");
            std::process::exit(1);
        }
    };

    let report = runner::run(engine, snap).await;

    match report.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!("report serialization error: {e}");
            std::process::exit(1);
        }
    }
}
