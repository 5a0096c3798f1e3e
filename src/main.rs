use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use tokio::sync::mpsc;
use zentro::{
    adapters::{
        FileConfigProvider, GatewayHandler, HttpClientAdapter, HttpConfigProvider, router,
    },
    config::{GatewayConfigValidator, models::GatewayConfig},
    core::{GatewaySnapshot, SnapshotHolder},
    metrics::MetricsSink,
    ports::{config_provider::ConfigProvider, http_client::HttpClient},
    tracing_setup,
    utils::{GracefulShutdown, ShutdownToken},
};

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(200);
const METRICS_SUMMARY_INTERVAL: Duration = Duration::from_secs(60);
const REMOTE_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Route file (JSON, YAML or TOML) or an http(s) URL serving JSON
    #[clap(
        short,
        long,
        alias = "routefile",
        default_value = "config/routes.json",
        global = true
    )]
    config: String,

    /// Override the port of `listen_addr`
    #[clap(short, long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration file
    Validate,
    /// Write an example configuration file
    Init,
    /// Start the gateway server (default)
    Serve,
}

fn create_config_provider(config_path: &str) -> Result<Arc<dyn ConfigProvider>> {
    if config_path.starts_with("http://") || config_path.starts_with("https://") {
        Ok(Arc::new(HttpConfigProvider::new(
            config_path.to_string(),
            REMOTE_POLL_INTERVAL,
        )))
    } else {
        Ok(Arc::new(FileConfigProvider::new(config_path)?))
    }
}

fn apply_port_override(config: &mut GatewayConfig, port: Option<u16>) -> Result<()> {
    let Some(port) = port else {
        return Ok(());
    };
    let mut addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Failed to parse listen address {}", config.listen_addr))?;
    addr.set_port(port);
    config.listen_addr = addr.to_string();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => validate_config_command(&args.config).await,
        Commands::Init => init_config_command(&args.config).await,
        Commands::Serve => serve(&args.config, args.port).await,
    }
}

async fn serve(config_path: &str, port: Option<u16>) -> Result<()> {
    let config_provider =
        create_config_provider(config_path).context("Failed to create config provider")?;

    let mut initial_config = config_provider
        .load_config()
        .await
        .with_context(|| format!("Failed to load initial config from {config_path}"))?;
    GatewayConfigValidator::validate(&initial_config)
        .map_err(|e| eyre!("Invalid configuration in {config_path}: {e}"))?;
    apply_port_override(&mut initial_config, port)?;

    tracing_setup::init_tracing(&initial_config.logging.level, initial_config.logging.format)
        .context("Failed to initialize tracing")?;

    tracing::info!(
        source = %config_provider.describe(),
        routes = initial_config.routes.len(),
        name = %initial_config.settings.name,
        environment = %initial_config.settings.environment,
        "Loaded initial configuration"
    );

    let snapshots = Arc::new(SnapshotHolder::from_config(&initial_config));
    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);
    let metrics = Arc::new(MetricsSink::new());

    let graceful_shutdown = Arc::new(GracefulShutdown::new());

    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {e:#}");
        }
    });

    let notify_rx = config_provider
        .watch()
        .context("Failed to watch configuration")?;
    tokio::spawn(run_config_watcher(
        config_provider.clone(),
        notify_rx,
        snapshots.clone(),
        graceful_shutdown.shutdown_token(),
    ));

    tokio::spawn(run_metrics_summary(
        metrics.clone(),
        snapshots.clone(),
        graceful_shutdown.shutdown_token(),
    ));

    let handler = Arc::new(GatewayHandler::new(snapshots.clone(), http_client, metrics));
    let app = router(handler);

    let addr: SocketAddr = initial_config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    for route in snapshots.load().routes() {
        tracing::info!(
            id = %route.id(),
            prefix = %route.config.path_prefix,
            upstreams = ?route.config.upstreams,
            enabled = route.config.is_enabled(),
            "Configured route"
        );
    }
    tracing::info!("Zentro gateway listening on {addr}");

    let shutdown = graceful_shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let reason = shutdown.wait_for_shutdown_signal().await;
        tracing::info!(?reason, "Stopping listener, draining in-flight requests");
    })
    .await
    .context("Server error")?;

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Rebuild the snapshot whenever the provider reports a change.
///
/// Bursts of notifications inside [`RELOAD_DEBOUNCE`] collapse into one reload. A
/// configuration that fails to load or validate leaves the current snapshot in place.
async fn run_config_watcher(
    provider: Arc<dyn ConfigProvider>,
    mut notify_rx: mpsc::Receiver<()>,
    snapshots: Arc<SnapshotHolder>,
    mut shutdown: ShutdownToken,
) {
    tracing::info!(source = %provider.describe(), "Config watcher task started");

    loop {
        tokio::select! {
            changed = notify_rx.recv() => {
                if changed.is_none() {
                    break;
                }
            }
            _ = shutdown.wait_for_shutdown() => break,
        }

        tokio::time::sleep(RELOAD_DEBOUNCE).await;
        while notify_rx.try_recv().is_ok() {}

        match provider.load_config().await {
            Ok(config) => match GatewayConfigValidator::validate(&config) {
                Ok(()) => {
                    snapshots.store(GatewaySnapshot::from_config(&config));
                    tracing::info!(routes = config.routes.len(), "Configuration reloaded");
                }
                Err(e) => {
                    tracing::error!("Rejected new configuration, keeping the previous one: {e}");
                }
            },
            Err(e) => {
                tracing::error!("Failed to reload configuration, keeping the previous one: {e:#}");
            }
        }
    }

    tracing::info!("Config watcher task is shutting down");
}

/// Periodically log request totals and the upstream health of every route.
async fn run_metrics_summary(
    metrics: Arc<MetricsSink>,
    snapshots: Arc<SnapshotHolder>,
    mut shutdown: ShutdownToken,
) {
    let mut interval = tokio::time::interval(METRICS_SUMMARY_INTERVAL);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                metrics.log_summary();
                for route in snapshots.load().routes() {
                    let status = route.balancer.status();
                    tracing::debug!(
                        route = %route.id(),
                        healthy = route.balancer.healthy_count(),
                        total = status.len(),
                        upstreams = ?status,
                        "Upstream health"
                    );
                }
            }
            _ = shutdown.wait_for_shutdown() => break,
        }
    }
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    use zentro::config::loader::load_config;

    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        return Err(eyre!("Configuration file '{config_path}' not found"));
    }

    let config = load_config(config_path)
        .await
        .context("Configuration parsing failed")?;
    println!("✅ Configuration parsing: OK");

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Routes: {}", config.routes.len());
            println!(
                "   • Enabled Routes: {}",
                config.routes.iter().filter(|r| r.is_enabled()).count()
            );
            println!(
                "   • Global Rate Limit (informational): {} req/s",
                config.settings.global_rate_limiting
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all upstream URLs start with http:// or https://");
            println!("   • Path prefixes must start with '/'");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8787')");
            Err(eyre!("Invalid configuration: {config_path}"))
        }
    }
}

/// Write an example configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        return Err(eyre!("Configuration file '{config_path}' already exists"));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let example = serde_json::to_string_pretty(&GatewayConfig::example())
        .context("Failed to serialize example config")?;
    tokio::fs::write(path, example)
        .await
        .context("Failed to write config file")?;

    println!("✅ Created example configuration at: {config_path}");
    println!("   Run 'zentro serve --config {config_path}' to start the gateway");
    Ok(())
}
