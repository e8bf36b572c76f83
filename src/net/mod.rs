//! HTTP surface: route table and shared state — one router, one state struct, no per-route
//! globals.

pub mod handlers;
pub mod notifier;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};

pub use state::{own_discovery_document, AppState};

/// Builds the full route table for one instance. The WebDAV surface is mounted under
/// `/webdav/ocm/*rest` so the handler can validate the full path itself (including depth and
/// any trailing segments) rather than relying on axum's own path matching for that shape.
pub fn router(state: AppState) -> Router {
    let token_path = format!("/{}", state.config.token_exchange.path.trim_start_matches('/'));

    Router::new()
        .route("/.well-known/ocm", get(handlers::discovery))
        .route("/ocm/shares", post(handlers::create_share))
        .route(
            "/ocm/shares/:share_id",
            get(handlers::get_share).post(handlers::decide_share),
        )
        .route(&token_path, post(handlers::token_exchange))
        .route("/ocm/notifications", post(handlers::receive_notification))
        .route("/ocm/invite-accepted", post(handlers::invite_accepted))
        .route("/webdav/ocm/*rest", get(handlers::webdav_get))
        .with_state(state)
}
