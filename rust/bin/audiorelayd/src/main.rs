//! `audiorelayd`: the audio relay server binary.
//!
//! Usage:
//!   audiorelayd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/audiorelay/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod bootstrap;
mod config;
mod routes;

use std::sync::Arc;

use audiorelay_core::Module;
use clap::Parser;
use media::{
    Backend, BackendSelector, BackendSet, Credential, HealthMonitor, HttpBackendConfig,
    HttpHealthProbe, LocalBackend, MediaModule, ProxyConfig, ProxyService, WebBackend,
};
use tracing::info;

use config::{BackendEndpoint, ProxySettings, ServerConfig};

/// Audio relay server.
#[derive(Parser, Debug)]
#[command(name = "audiorelayd", about = "Range-aware audio relay")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address (overrides default 0.0.0.0:8080).
    #[arg(long = "listen", default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Load server configuration.
    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;

    // Verify configuration is valid.
    bootstrap::verify_config(&server_config)?;

    // Initialize storage.
    std::fs::create_dir_all(&server_config.storage.data_dir)?;
    let kv: Arc<dyn audiorelay_kv::KVStore> = Arc::new(
        audiorelay_kv::RedbStore::open(&server_config.db_path())
            .map_err(|e| anyhow::anyhow!("failed to open KV store: {}", e))?,
    );

    // ── Backends ──

    let local_config = http_config(&server_config.backends.local, &server_config.proxy);
    let web_config = http_config(&server_config.backends.web, &server_config.proxy);
    let local_url = local_config.base_url.clone();
    let web_url = web_config.base_url.clone();

    let local: Arc<dyn Backend> = Arc::new(
        LocalBackend::new(local_config)
            .map_err(|e| anyhow::anyhow!("failed to build local backend: {}", e))?,
    );
    let web: Arc<dyn Backend> = Arc::new(
        WebBackend::new(web_config)
            .map_err(|e| anyhow::anyhow!("failed to build web backend: {}", e))?,
    );
    info!(local = %local_url, web = %web_url, "Backends configured");

    // ── Selection & health ──

    let probe = Arc::new(HttpHealthProbe::new(server_config.health.probe_timeout()));
    let monitor = Arc::new(HealthMonitor::new(local_url, web_url, probe));
    let selector = Arc::new(BackendSelector::new(kv, monitor));

    if server_config.health.auto_select_on_start {
        let mode = selector.auto_select_best_server().await?;
        info!(%mode, "Auto-selected backend at startup");
    }

    // ── Media module ──

    let proxy = Arc::new(ProxyService::new(
        selector,
        BackendSet::new(local, web),
        ProxyConfig {
            read_idle_timeout: server_config.proxy.read_idle_timeout(),
        },
    ));
    let media_module =
        MediaModule::new(proxy).with_health_refresh(server_config.health.interval());
    info!("Media module initialized");

    let module_routes = vec![(media_module.name(), media_module.routes())];
    let app = routes::build_router(module_routes);

    // Start server.
    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!("audiorelayd listening on {}", cli.listen);
    axum::serve(listener, app).await?;

    Ok(())
}

fn http_config(endpoint: &BackendEndpoint, proxy: &ProxySettings) -> HttpBackendConfig {
    let mut config = HttpBackendConfig::new(endpoint.base_url.clone());
    if !endpoint.token.is_empty() {
        config.service_token = Some(Credential::new(endpoint.token.clone()));
    }
    config.metadata_timeout = proxy.metadata_timeout();
    config.connect_timeout = proxy.connect_timeout();
    config
}
