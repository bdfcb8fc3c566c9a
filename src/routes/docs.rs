use axum::{Json, Router, routing::get};
use utoipa::OpenApi;

use crate::state::SharedState;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the match coordinator.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::battle_handler,
        crate::routes::websocket::lobby_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::battle::BattleInboundMessage,
            crate::dto::battle::BattleOutboundMessage,
            crate::dto::battle::PlayerScore,
            crate::dto::lobby::LobbyInboundMessage,
            crate::dto::lobby::LobbyOutboundMessage,
            crate::dto::lobby::LobbyRole,
            crate::dto::lobby::DepositFlags,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "battle", description = "WebSocket operations for 1v1 tap battles"),
        (name = "lobby", description = "WebSocket operations for the deposit handshake"),
    )
)]
pub struct ApiDoc;

/// Serve the raw OpenAPI document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Configure the documentation routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/api-doc/openapi.json", get(openapi_json))
}
