use crate::treasury_handlers::{
    burn, emergency_control, get_emergency_actions, get_payout_history, get_treasury_status,
    health, mint, process_payout, record_revenue,
};
use crate::ApiState;
use axum::{
    routing::{get, post},
    Router,
};

/// Create routes for the treasury endpoints
pub fn create_routes() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health))
        // Admin dashboard
        .route("/treasury/status", get(get_treasury_status))
        .route(
            "/treasury/payout",
            get(get_payout_history).post(process_payout),
        )
        .route("/treasury/revenue", post(record_revenue))
        // Emergency controls
        .route(
            "/treasury/emergency",
            get(get_emergency_actions).post(emergency_control),
        )
        // Wallet operations
        .route("/treasury/mint", post(mint))
        .route("/treasury/burn", post(burn))
}
