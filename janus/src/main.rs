use clap::{Parser, Subcommand};
use gateway::Gateway;
use gateway::{api, cache};
use std::path::PathBuf;
use tokio::net::TcpListener;

mod config;
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};

#[derive(Parser)]
#[command(name = "janus", about = "API gateway fronting the data and payment services")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the gateway
    Serve,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[derive(thiserror::Error, Debug)]
enum JanusError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("cache error: {0}")]
    Cache(#[from] cache::CacheError),
    #[error("metrics exporter error: {0}")]
    Metrics(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("API error: {0}")]
    Api(#[from] api::ApiError),
}

fn main() -> Result<(), JanusError> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    if matches!(cli.command, CliCommand::CheckConfig) {
        println!("Config OK");
        return Ok(());
    }

    init_tracing();
    // Keep the guard alive for the lifetime of the process
    let _sentry_guard = init_sentry(config.common.logging.as_ref());
    init_metrics(config.common.metrics.as_ref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config.gateway))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn init_sentry(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    logging.map(|logging| {
        sentry::init((
            logging.sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    })
}

fn init_metrics(metrics_config: Option<&MetricsConfig>) -> Result<(), JanusError> {
    let Some(metrics_config) = metrics_config else {
        return Ok(());
    };

    let recorder = metrics_exporter_statsd::StatsdBuilder::from(
        metrics_config.statsd_host.as_str(),
        metrics_config.statsd_port,
    )
    .build(Some("janus"))
    .map_err(|e| JanusError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| JanusError::Metrics(e.to_string()))?;

    shared::metrics_defs::register_all(gateway::metrics_defs::ALL_METRICS);
    Ok(())
}

async fn run(config: gateway::config::Config) -> Result<(), JanusError> {
    // The cache client and the resolved backend endpoints are built once
    // here and injected; they live for the lifetime of the process.
    let cache_store = cache::get_store(&config.cache).await?;
    let gateway = Gateway::new(&config, cache_store);

    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "gateway listening");

    api::serve(listener, gateway).await?;
    tracing::info!("gateway shut down");
    Ok(())
}
