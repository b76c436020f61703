use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;
use tessera_adapters::AdminApiConfig;
use tessera_core::StorageConfig;
use tessera_service::{build_router, ServiceConfig, ServiceState};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StorageMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Parser)]
#[command(name = "tesserad", version, about = "Order reconciliation and ledger service")]
struct Cli {
    /// Socket address to bind, e.g. 127.0.0.1:8094
    #[arg(long, default_value = "127.0.0.1:8094")]
    listen: SocketAddr,
    /// Local store backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = StorageMode::Auto, env = "TESSERA_STORAGE")]
    storage: StorageMode,
    /// PostgreSQL url for the ledger and ticket stores.
    #[arg(long, env = "TESSERA_DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections.
    #[arg(long, default_value_t = 5, env = "TESSERA_PG_MAX_CONNECTIONS")]
    pg_max_connections: u32,
    /// Remote commerce platform Admin API endpoint.
    #[arg(long, env = "TESSERA_ADMIN_ENDPOINT")]
    admin_endpoint: Option<String>,
    /// Access token for the Admin API.
    #[arg(long, env = "TESSERA_ADMIN_TOKEN")]
    admin_token: Option<String>,
    /// Budget for each remote call, in milliseconds.
    #[arg(long, default_value_t = 3000, env = "TESSERA_REMOTE_TIMEOUT_MS")]
    remote_timeout_ms: u64,
    /// Default listing page size.
    #[arg(long, default_value_t = 10, env = "TESSERA_PAGE_SIZE")]
    page_size: u32,
}

fn resolve_storage(cli: &Cli) -> anyhow::Result<StorageConfig> {
    let resolved_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let storage = match cli.storage {
        StorageMode::Memory => StorageConfig::Memory,
        StorageMode::Postgres => {
            let database_url = resolved_url.ok_or_else(|| {
                anyhow::anyhow!("storage=postgres requires --database-url or DATABASE_URL")
            })?;
            StorageConfig::postgres(database_url, cli.pg_max_connections)
        }
        StorageMode::Auto => match resolved_url {
            Some(database_url) => StorageConfig::postgres(database_url, cli.pg_max_connections),
            None => StorageConfig::Memory,
        },
    };

    Ok(storage)
}

fn resolve_admin_api(cli: &Cli) -> Option<AdminApiConfig> {
    match (&cli.admin_endpoint, &cli.admin_token) {
        (Some(endpoint), Some(token)) => {
            let mut config = AdminApiConfig::new(endpoint, token);
            config.timeout = Duration::from_millis(cli.remote_timeout_ms);
            Some(config)
        }
        _ => None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tessera_service=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let storage = resolve_storage(&cli)?;
    info!(backend = storage.label(), "local storage resolved");

    let config = ServiceConfig {
        storage,
        admin_api: resolve_admin_api(&cli),
        remote_timeout: Duration::from_millis(cli.remote_timeout_ms),
        default_page_size: cli.page_size,
    };
    let state = ServiceState::bootstrap(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("tessera-service listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
