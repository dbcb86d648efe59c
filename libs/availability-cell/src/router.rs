use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put, delete},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/slots", get(handlers::get_available_slots))
        .route("/business-hours", get(handlers::list_business_hours))
        .route("/settings", get(handlers::get_settings));

    // Role checks happen in the handlers
    let admin_routes = Router::new()
        .route("/admin/business-hours/{day_of_week}", put(handlers::upsert_business_hours))
        .route("/admin/settings", put(handlers::update_settings))
        .route("/admin/time-blocks", get(handlers::list_time_blocks).post(handlers::create_time_block))
        .route("/admin/time-blocks/{block_id}", delete(handlers::delete_time_block))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .with_state(state)
}
