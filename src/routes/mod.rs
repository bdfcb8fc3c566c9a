use axum::Router;

use crate::state::SharedState;

/// OpenAPI documentation routes.
pub mod docs;
/// Health check routes.
pub mod health;
/// WebSocket upgrade routes for both protocols.
pub mod websocket;

/// Compose all route trees, wiring in shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(websocket::router())
        .merge(docs::router())
        .with_state(state)
}
