use campus_core::CampusCore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "campus_core=info".into()),
        )
        .init();

    let core = CampusCore::start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    core.shutdown().await
}
