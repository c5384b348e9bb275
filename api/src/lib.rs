//! HTTP boundary of the ECE treasury
//!
//! Admin dashboard routes, emergency controls and wallet mint/burn, all
//! authenticated through the `x-wallet-address` header.

mod auth;
mod error;
mod extract;
mod routes;
mod state;
pub mod treasury_handlers;

pub use auth::{is_valid_wallet_address, AdminWallet, EmergencySigner, Wallet, WALLET_HEADER};
pub use error::{ApiError, ApiResult};
pub use extract::ValidatedJson;
pub use state::ApiState;

use axum::http::{header::CONTENT_TYPE, HeaderName, Method};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the application router with tracing and CORS layers
pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(WALLET_HEADER)]);

    routes::create_routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Serve the API until `shutdown` resolves
pub async fn start_server<F>(
    addr: SocketAddr,
    state: ApiState,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "treasury API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("treasury API stopped");
    Ok(())
}
