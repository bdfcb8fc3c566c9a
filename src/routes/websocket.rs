use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{
    services::{battle_service, lobby_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws/battle",
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a battle WebSocket session.
pub async fn battle_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| battle_service::handle_socket(state, socket))
}

#[utoipa::path(
    get,
    path = "/ws/lobby",
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a lobby WebSocket session.
pub async fn lobby_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| lobby_service::handle_socket(state, socket))
}

/// Configure the WebSocket endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/ws/battle", get(battle_handler))
        .route("/ws/lobby", get(lobby_handler))
}
