use std::sync::Arc;

use axum::{
    Router,
    routing::post,
};

use shared_config::AppConfig;

use crate::handlers;

/// Authenticated by the Stripe signature, not by a user token.
pub fn payment_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/stripe", post(handlers::stripe_webhook))
        .with_state(state)
}
