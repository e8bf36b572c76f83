use std::{net::SocketAddr, process, sync::Arc};

use clap::Parser;
use ocm_core::{
    compat::ProfileRegistry,
    config::Config,
    http_client::HyperHttpClient,
    identity::InMemoryUserDirectory,
    net::{self, notifier::HttpShareNotifier, own_discovery_document, AppState},
    shares::{InMemoryIncomingShareRepo, InMemoryOutgoingShareRepo},
    token::{TokenStore, DEFAULT_TOKEN_TTL},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(name = "ocm-server", about = "Open Cloud Mesh federation endpoint")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: std::path::PathBuf,
}

async fn run(args: Args) -> Result<(), ocm_core::error::BoxError> {
    let raw = tokio::fs::read_to_string(&args.config).await?;
    let config = Arc::new(Config::from_toml_str(&raw)?);

    let own_discovery = Arc::new(own_discovery_document(&config));
    let profiles = Arc::new(ProfileRegistry::new(
        config.peer_compat.profiles.clone(),
        config.peer_compat.mappings.clone(),
    ));

    let token_store = Arc::new(TokenStore::in_memory(DEFAULT_TOKEN_TTL));
    let http: Arc<dyn ocm_core::http_client::HttpClient> = Arc::new(HyperHttpClient::default());
    let notifier = Arc::new(HttpShareNotifier::new(http, config.outbound_http.timeout()));

    let state = AppState {
        config: config.clone(),
        own_discovery,
        profiles,
        incoming_shares: InMemoryIncomingShareRepo::new(),
        outgoing_shares: InMemoryOutgoingShareRepo::new(),
        user_directory: InMemoryUserDirectory::new().shared(),
        token_store,
        notifier,
    };

    let router = net::router(state);
    let addr: SocketAddr = config.instance.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
