//! Sproxyd object server
//!
//! Serves the Swift object server API, storing objects in sproxyd.

use anyhow::{Context, Result};
use clap::Parser;
use sproxyd_client::SproxydClientFactory;
use sproxyd_common::GatewayConfig;
use sproxyd_object_server::{AsyncUpdateDispatcher, ClientRegistry, ObjectGateway, router};
use sproxyd_policy::PolicyConfiguration;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "sproxyd-object-server")]
#[command(about = "Swift object server backed by Scality sproxyd")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/swift/object-server.conf")]
    config: PathBuf,

    /// Listen address, overriding bind_ip and bind_port
    #[arg(short, long)]
    listen: Option<String>,

    /// Storage policy document, overriding policy_config_path
    #[arg(long)]
    policy_config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sproxyd object server");

    info!("Loading configuration from {}", args.config.display());
    let config = GatewayConfig::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let policy_path = args
        .policy_config
        .unwrap_or_else(|| config.policy_config_path.clone());
    let policies = PolicyConfiguration::load(&policy_path)
        .with_context(|| format!("failed to load {}", policy_path.display()))?
        .map(Arc::new);

    let default_endpoints = config.default_endpoints();
    info!("Default policy endpoints: {:?}", default_endpoints);

    let registry = Arc::new(ClientRegistry::new(
        Arc::new(SproxydClientFactory),
        default_endpoints,
        policies,
        config.backend_timeouts()?,
    ));
    let updater = AsyncUpdateDispatcher::new(
        config.container_conn_timeout()?,
        config.container_node_timeout()?,
    )?;
    let gateway = Arc::new(ObjectGateway::new(registry, updater));

    let app = router(gateway);
    let addr = args.listen.unwrap_or_else(|| config.listen_addr());
    info!("Starting object server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    info!("Object server shut down gracefully");

    Ok(())
}
