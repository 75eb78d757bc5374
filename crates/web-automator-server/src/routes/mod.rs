// Export route modules
pub mod health;
pub mod run;

use crate::state::AppState;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::routes())
        .merge(run::routes(state))
        .layer(cors)
}
