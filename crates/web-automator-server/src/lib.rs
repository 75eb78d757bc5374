pub mod routes;
pub mod state;

use state::AppState;
use tracing::info;
use web_automator::configuration::Settings;

/// Serve the HTTP api until the process is stopped
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let addr = settings.server.socket_addr()?;
    let app = routes::configure(AppState::new(settings));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
