//! # HTTP Surface
//!
//! Operator routes (issuance, card download) sit behind the bearer check.
//! Validation pages and liveness are public.

pub mod auth;
pub mod cards;
pub mod error;
pub mod state;
pub mod validation;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use state::AppState;

/// Assemble the full application router.
pub fn app(state: AppState) -> Router {
    let operator = cards::router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_operator,
    ));

    Router::new()
        .merge(operator)
        .merge(validation::router())
        .route("/health/liveness", get(liveness))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn liveness() -> &'static str {
    "ok"
}
