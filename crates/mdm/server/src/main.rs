//! MDM server: device check-ins and wake-up pushes.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::WrapErr as _;
use mdm_crypto::{CaTrust, ScriptVerifier, TrustedVerifier};
use mdm_push::{H2ConnectorFactory, PushService};
use mdm_service::MdmService;
use mdm_storage::SqliteStorage;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "mdm-server")]
#[command(about = "MDM check-in and push server", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "MDM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).wrap_err("failed to load config")?;
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.storage.database_url = url;
    }

    tracing::info!(config = ?cli.config, "mdm-server starting");

    let storage = SqliteStorage::new(&config.storage.database_url)
        .wrap_err("failed to initialize storage")?;
    storage
        .run_migrations()
        .wrap_err("failed to run migrations")?;

    let ca = match &config.identity.ca_certificate {
        Some(path) => {
            let pem = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read CA certificate {}", path.display()))?;
            Some(CaTrust::from_pem(&pem).wrap_err("invalid CA certificate")?)
        }
        None => None,
    };
    let verifier = TrustedVerifier::new(
        ScriptVerifier::new(&config.identity.verifier)
            .with_timeout(Duration::from_secs(config.identity.verify_timeout_secs)),
        ca,
    );

    let service = MdmService::with_config(storage.clone(), config.checkin);
    let pusher = PushService::new(
        H2ConnectorFactory::gateway(config.push.sandbox),
        storage.clone(),
        config.push.connection_settings(),
    );

    let app = mdm_http::app(
        mdm_http::mdm_router(service, Arc::new(verifier)),
        mdm_http::api_router(storage, pusher.clone()),
    );

    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .wrap_err("failed to bind")?;
    tracing::info!(addr = %config.server.listen, sandbox = config.push.sandbox, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    pusher.shutdown().await;
    tracing::info!("mdm-server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
