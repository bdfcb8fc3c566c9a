use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::health::HealthResponse, state::SharedState};

#[utoipa::path(
    get,
    path = "/healthcheck",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
/// Return the current health status and in-memory session occupancy.
pub async fn healthcheck(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(
        state.battles().len(),
        state.lobbies().len(),
    ))
}

/// Configure the health routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/healthcheck", get(healthcheck))
}
