//! CHAINWATCH: multi-chain transaction graph and risk analysis core.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects the configured chain collectors and serves the monitoring
//! endpoints until Ctrl+C, then disconnects cleanly.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use chainwatch::collectors::manager::CollectorManager;
use chainwatch::config;
use chainwatch::dashboard::{self, routes::MonitorState};
use chainwatch::graph::known;

const BANNER: &str = r#"
  ____ _   _    _    ___ _   ___        ___  _____ ____ _   _
 / ___| | | |  / \  |_ _| \ | \ \      / / \|_   _/ ___| | | |
| |   | |_| | / _ \  | ||  \| |\ \ /\ / / _ \ | || |   | |_| |
| |___|  _  |/ ___ \ | || |\  | \ V  V / ___ \| || |___|  _  |
 \____|_| |_/_/   \_\___|_| \_|  \_/\_/_/   \_\_| \____|_| |_|

  Multi-chain graph & risk analysis core
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        service = %cfg.service.name,
        chains = cfg.collectors.chains.len(),
        probe_timeout_secs = cfg.collectors.probe_timeout_secs,
        "CHAINWATCH starting up"
    );

    // -- Known-address lists ---------------------------------------------

    let known = known::source_from_config(&cfg.graph);
    match known.load() {
        Ok(sets) => info!(
            source = %known.describe(),
            bridges = sets.bridge_count(),
            mixers = sets.mixer_count(),
            "Known-address lists ready"
        ),
        Err(e) => warn!(source = %known.describe(), error = %e, "Known-address lists unavailable"),
    }

    // -- Collectors ------------------------------------------------------

    let manager = Arc::new(CollectorManager::initialize(&cfg.collectors)?);

    let connected = manager.connect_all().await;
    let up = connected.values().filter(|ok| **ok).count();
    info!(connected = up, total = connected.len(), "Collectors connected");

    let status = manager.get_all_status().await;
    for (chain, entry) in &status.collectors {
        match entry.error() {
            Some(error) => warn!(chain = %chain, error = %error, "Collector unavailable"),
            None => info!(chain = %chain, running = entry.is_running(), "Collector status"),
        }
    }

    // -- Monitoring server -----------------------------------------------

    let server = if cfg.dashboard.enabled {
        let state = Arc::new(MonitorState::new(&cfg.service.name, manager.clone()));
        Some(dashboard::spawn_dashboard(state, cfg.dashboard.port).await?)
    } else {
        info!("Monitoring server disabled");
        None
    };

    info!("Running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    if let Some(server) = server {
        server.abort();
    }
    manager.disconnect_all().await;
    info!("CHAINWATCH shut down cleanly.");

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chainwatch=info"));

    if std::env::var("CHAINWATCH_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
