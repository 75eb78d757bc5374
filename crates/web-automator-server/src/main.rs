use dotenv::dotenv;
use tracing_subscriber::EnvFilter;
use web_automator::configuration::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::new()?;
    web_automator_server::serve(settings).await
}
