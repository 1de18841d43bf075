use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tailgate::config::{CredentialStore, Settings};
use tailgate::lifecycle::{spawn_signal_listener, Shutdown};
use tailgate::overlay::{Opener, OverlayOpener};
use tailgate::proxy::coordinator::Coordinator;
use tailgate::proxy::rewrite::RewriteRules;
use tailgate::LifecycleServer;

#[derive(Debug, Parser)]
#[command(name = "tailgate", about = "Per-tenant overlay gateway")]
struct Args {
    /// Path to the settings file. Falls back to environment-only settings
    /// when the file does not exist.
    #[arg(long, default_value = "tailgate.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tailgate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let settings = if args.config.exists() {
        Settings::load(&args.config)?
    } else {
        tracing::info!(path = %args.config.display(), "no settings file, using environment");
        Settings::from_env()?
    };
    let settings = Arc::new(settings);

    tracing::info!(
        bind_address = %settings.server.bind_address,
        proxy_prefix = %settings.proxy.prefix,
        reload_interval_secs = settings.reload.interval_secs,
        "configuration loaded"
    );

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(address) => tailgate::observability::metrics::init_metrics(address),
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "failed to parse metrics address"
            ),
        }
    }

    let store = CredentialStore::new(settings.agent.clone());
    let opener: Arc<dyn Opener> = Arc::new(OverlayOpener::new(settings.overlay.clone()));
    let coordinator = Coordinator::new(
        store,
        opener,
        RewriteRules::from(&settings.proxy),
        settings.reload.clone(),
    );

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_listener(shutdown.clone());

    let listener = TcpListener::bind(&settings.server.bind_address).await?;
    let server = LifecycleServer::new(settings, coordinator, shutdown);
    server.run(listener).await?;

    tracing::info!("shutdown complete");
    Ok(())
}
