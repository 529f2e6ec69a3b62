use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use onepanel::assets::AssetStore;
use onepanel::auth::jwt::load_or_create_secret;
use onepanel::auth::JwtKeys;
use onepanel::config::{Cli, Config};
use onepanel::db;
use onepanel::fetch::HttpFetcher;
use onepanel::routes;
use onepanel::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Upload tree served under /static
    let assets = AssetStore::new(config.storage_path());
    assets.ensure_dirs()?;
    tracing::info!("Static files: {}", assets.root().display());

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let secret = load_or_create_secret(config.auth.secret_key.as_deref(), &data_dir)?;
    let keys = JwtKeys::new(secret.as_bytes(), config.auth.token_days);
    let fetcher =
        HttpFetcher::new(&config.fetch)?.with_icon_limit(config.storage.max_upload_bytes);

    let state = AppState {
        db: pool,
        config: config.clone(),
        keys: Arc::new(keys),
        assets: Arc::new(assets),
        fetcher: Arc::new(fetcher),
    };

    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
