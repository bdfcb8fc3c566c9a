//! Health check payloads.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Snapshot returned by the health endpoint.
pub struct HealthResponse {
    /// Overall service status; always `ok` while the process is serving.
    pub status: String,
    /// Number of battle sessions currently held in memory.
    pub active_sessions: usize,
    /// Number of lobbies currently held in memory.
    pub active_lobbies: usize,
}

impl HealthResponse {
    /// Build a healthy response with the given occupancy counts.
    pub fn ok(active_sessions: usize, active_lobbies: usize) -> Self {
        Self {
            status: "ok".into(),
            active_sessions,
            active_lobbies,
        }
    }
}
