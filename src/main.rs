use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use poddy::cli::{Cli, Commands};
use poddy::config::{self, Config};
use poddy::oauth::registry::ProviderRegistry;
use poddy::workspace::cluster::KubeCluster;
use poddy::{api, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_json);

    let cfg = config::load(args.config.as_deref()).context("failed to load configuration")?;

    let result = match args.command {
        Some(Commands::Providers) => print_providers(&cfg),
        Some(Commands::Serve { listen }) => run_server(cfg, listen).await,
        None => run_server(cfg, None).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "poddy=debug,tower_http=info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_server(mut cfg: Config, listen: Option<String>) -> anyhow::Result<()> {
    if let Some(listen) = listen {
        cfg.server.listen_address = listen;
    }
    let addr = cfg.server.listen_addr()?;

    tracing::info!("Connecting to cluster...");
    let cluster = KubeCluster::connect(cfg.deployment.namespace.clone())
        .await
        .context("failed to create cluster client")?;
    tracing::info!(namespace = cluster.namespace(), "Cluster client ready");

    let state = Arc::new(AppState::new(cfg, Arc::new(cluster))?);
    tracing::info!(providers = state.providers.len(), "Provider registry ready");

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Poddy listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_providers(cfg: &Config) -> anyhow::Result<()> {
    let registry = ProviderRegistry::from_config(cfg)?;
    if registry.is_empty() {
        println!("No providers configured.");
        return Ok(());
    }

    println!("{:<16} {:<8} {:<32} REDIRECT URL", "ID", "TYPE", "HOST");
    for p in registry.iter() {
        println!(
            "{:<16} {:<8} {:<32} {}",
            p.id,
            p.kind.as_str(),
            p.host,
            p.oauth.redirect_url
        );
    }
    Ok(())
}
