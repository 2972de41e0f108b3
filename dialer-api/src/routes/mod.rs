//! API route handlers.

pub mod calls;
pub mod campaigns;
pub mod contacts;
pub mod credits;
pub mod cron;
pub mod health;
pub mod owners;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        // Scheduler trigger
        .route("/cron/outbound-calls", post(cron::run_outbound_calls))
        // Campaign endpoints
        .route("/campaigns", post(campaigns::create_campaign))
        .route(
            "/campaigns/:campaign_id",
            get(campaigns::get_campaign).patch(campaigns::update_campaign),
        )
        .route(
            "/campaigns/:campaign_id/enrollments",
            post(campaigns::enroll_contacts),
        )
        .route("/enrollments/:enrollment_id", get(campaigns::get_enrollment))
        // Contact endpoints
        .route("/contacts", post(contacts::create_contact))
        .route("/contacts/:contact_id", get(contacts::get_contact))
        // Credits endpoints
        .route("/credits/:owner_id", get(credits::get_credits))
        .route("/credits/:owner_id/add", post(credits::add_credits))
        .route("/credits/:owner_id/consume", post(credits::consume_credits))
        .route("/credits/:owner_id/auto-top-up", post(credits::set_auto_top_up))
        // Manual calls
        .route("/calls", post(calls::place_call))
        // Provider settings
        .route(
            "/owners/:owner_id/provider-settings",
            put(owners::put_provider_settings),
        )
        // State
        .with_state(state)
}
