use tracing_subscriber::{fmt, EnvFilter};
use visit_tracker_server::{start_server, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    start_server(config).await
}
