use anyhow::{Context, anyhow};
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use foreman_core::store::{Store, postgres};
use foreman_server::infra::app_state::AppState;
use foreman_server::infra::config::{CliOverrides, Config};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments for the Foreman dispatch server
#[derive(Parser, Debug)]
#[command(name = "foreman-server")]
#[command(about = "Dispatch and coordination server for a fleet of file-processing worker nodes")]
struct Args {
    /// Path to a TOML config file (overrides discovery)
    #[arg(long, env = "FOREMAN_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Bind address, e.g. 0.0.0.0:8080
    #[arg(short, long, env = "BIND_ADDRESS")]
    bind: Option<SocketAddr>,

    /// Path to TLS certificate file (PEM format)
    #[arg(long, env = "TLS_CERT_PATH")]
    cert: Option<PathBuf>,

    /// Path to TLS private key file (PEM format)
    #[arg(long, env = "TLS_KEY_PATH")]
    key: Option<PathBuf>,

    /// Dev mode: in-memory store allowed, relaxed startup checks
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(CliOverrides {
        config_path: args.config,
        bind_address: args.bind,
        tls_cert: args.cert,
        tls_key: args.key,
        dev_mode: args.dev,
    })?;
    let config = Arc::new(config);

    let _log_guard = init_tracing(&config);
    info!(
        bind = %config.bind_address,
        dev_mode = config.dev_mode,
        auth_mode = ?config.auth_mode,
        "server configuration loaded"
    );

    let store = match &config.db_connection {
        Some(db_connection) => {
            info!("connecting to PostgreSQL");
            let pool = postgres::connect(db_connection)
                .await
                .context("database connection failed")?;

            match postgres::run_migrations(&pool).await {
                Ok(()) => info!("database schema is up to date"),
                Err(e) if config.dev_mode => {
                    warn!("continuing in dev mode with an unverified schema: {e}")
                }
                Err(e) => {
                    return Err(anyhow!("refusing to start with a bad schema: {e}"));
                }
            }
            Store::postgres(pool)
        }
        None => {
            // Config validation only allows this in dev mode.
            warn!("no DATABASE_URL configured - using the in-memory store");
            Store::memory()
        }
    };

    let state = AppState::new(config.clone(), store);
    let _sweeper = state.start_sweeper();
    info!(
        lock_sweep_secs = config.lock_sweep_interval.as_secs(),
        node_sweep_secs = config.node_sweep_interval.as_secs(),
        "background sweeper started"
    );

    let app = foreman_server::create_app(state);

    match (&config.tls_cert, &config.tls_key) {
        (Some(cert_path), Some(key_path)) => {
            info!("TLS enabled - starting HTTPS server");
            let _ = rustls::crypto::ring::default_provider().install_default();

            let rustls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .with_context(|| {
                    format!(
                        "failed to load TLS material from {} / {}",
                        cert_path.display(),
                        key_path.display()
                    )
                })?;

            info!("starting Foreman dispatch server (HTTPS) on {}", config.bind_address);
            axum_server::bind_rustls(config.bind_address, rustls_config)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await?;
        }
        _ => {
            info!("starting Foreman dispatch server (HTTP) on {}", config.bind_address);
            warn!(
                "TLS is not configured; set TLS_CERT_PATH and TLS_KEY_PATH for production use"
            );

            let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "foreman_server={level},foreman_core={level},tower_http=warn",
            level = config.log_level
        ))
    });

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer());

    match &config.log_directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "foreman.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}
