//! Battle protocol message shapes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{dto::validation, error::SessionError};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from battle WebSocket clients.
///
/// The `matchId`/`wallet` pair only travels on `join_match`; subsequent
/// messages are attributed to the connection that sent them.
#[serde(tag = "type")]
pub enum BattleInboundMessage {
    /// Identify the connection and attach it to a match.
    #[serde(rename = "join_match", rename_all = "camelCase")]
    JoinMatch {
        /// Externally assigned match identifier.
        match_id: String,
        /// Wallet address of the joining player.
        wallet: String,
    },
    /// One tap. Each delivered frame counts exactly once.
    #[serde(rename = "tap")]
    Tap {},
    /// Advisory completion notice; the server's own timer stays authoritative.
    #[serde(rename = "game_complete")]
    GameComplete {},
    /// Catch-all for unrecognized `type` tags; rejected as malformed.
    #[serde(other)]
    Unknown,
}

impl BattleInboundMessage {
    /// Parse and validate an inbound frame, failing closed on unknown shapes.
    pub fn from_json_str(raw: &str) -> Result<Self, SessionError> {
        let message: Self = serde_json::from_str(raw).map_err(SessionError::malformed)?;
        if let Self::JoinMatch { match_id, wallet } = &message {
            validation::validate_match_id(match_id)?;
            validation::validate_wallet(wallet)?;
        }
        Ok(message)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Messages broadcast to battle WebSocket clients.
#[serde(tag = "type")]
pub enum BattleOutboundMessage {
    /// A participant registered or reconnected.
    #[serde(rename = "player_joined", rename_all = "camelCase")]
    PlayerJoined {
        /// Wallet of the player that joined.
        wallet: String,
        /// Number of live connections after the join.
        player_count: usize,
        /// Current session phase label.
        game_state: String,
    },
    /// The pre-match countdown started.
    #[serde(rename = "countdown_start", rename_all = "camelCase")]
    CountdownStart {
        /// Server wall-clock at countdown start, unix milliseconds.
        start_time: i64,
        /// Countdown length in milliseconds.
        duration: u64,
    },
    /// The tapping window opened; counters were reset to zero.
    #[serde(rename = "game_start", rename_all = "camelCase")]
    GameStart {
        /// Server wall-clock at window start, unix milliseconds.
        start_time: i64,
        /// Window length in milliseconds.
        duration: u64,
    },
    /// A participant's tap counter advanced.
    #[serde(rename = "tap_update", rename_all = "camelCase")]
    TapUpdate {
        /// Wallet whose counter changed.
        wallet: String,
        /// Authoritative count after the increment.
        taps: u64,
        /// Server wall-clock of the increment, unix milliseconds.
        timestamp: i64,
    },
    /// The window closed and the outcome is final.
    #[serde(rename = "game_end", rename_all = "camelCase")]
    GameEnd {
        /// Final score lines in join order.
        scores: Vec<PlayerScore>,
        /// Winning wallet, or `null` on an exact tie.
        winner: Option<String>,
        /// Server wall-clock of the finish, unix milliseconds.
        timestamp: i64,
    },
    /// A participant's connection dropped (their slot remains).
    #[serde(rename = "player_left", rename_all = "camelCase")]
    PlayerLeft {
        /// Wallet of the player that disconnected.
        wallet: String,
        /// Number of live connections after the drop.
        player_count: usize,
    },
    /// Error acknowledgment, sent only to the offending connection.
    #[serde(rename = "error")]
    Error {
        /// Human-readable error code and detail.
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Final score line for one participant.
pub struct PlayerScore {
    /// Participant wallet.
    pub wallet: String,
    /// Final authoritative tap count.
    pub score: u64,
}
