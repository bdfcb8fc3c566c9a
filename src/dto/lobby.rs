//! Lobby protocol message shapes for the pre-match deposit handshake.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{dto::validation, error::SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
/// Role a player occupies inside a lobby.
pub enum LobbyRole {
    /// Player who created the match and deposited first.
    Creator,
    /// Player who accepted the match.
    Opponent,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from lobby WebSocket clients.
#[serde(tag = "type")]
pub enum LobbyInboundMessage {
    /// Identify the connection and attach it to a lobby under a role.
    #[serde(rename = "join_lobby", rename_all = "camelCase")]
    JoinLobby {
        /// Lobby identifier, shared with the match-to-be.
        lobby_id: String,
        /// Wallet address of the joining player.
        wallet: String,
        /// Role the player claims.
        role: LobbyRole,
    },
    /// The external ledger confirmed this role's wager deposit.
    #[serde(rename = "deposit_made", rename_all = "camelCase")]
    DepositMade {
        /// Role whose deposit landed; must match the sender's own role.
        role: LobbyRole,
        /// Deposited amount, informational only.
        amount: f64,
    },
    /// Catch-all for unrecognized `type` tags; rejected as malformed.
    #[serde(other)]
    Unknown,
}

impl LobbyInboundMessage {
    /// Parse and validate an inbound frame, failing closed on unknown shapes.
    pub fn from_json_str(raw: &str) -> Result<Self, SessionError> {
        let message: Self = serde_json::from_str(raw).map_err(SessionError::malformed)?;
        if let Self::JoinLobby { lobby_id, wallet, .. } = &message {
            validation::validate_match_id(lobby_id)?;
            validation::validate_wallet(wallet)?;
        }
        Ok(message)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Deposit confirmation flags, one per role.
pub struct DepositFlags {
    /// Creator's deposit has been confirmed.
    pub creator: bool,
    /// Opponent's deposit has been confirmed.
    pub opponent: bool,
}

impl DepositFlags {
    /// True once both roles have confirmed.
    pub fn complete(&self) -> bool {
        self.creator && self.opponent
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// Messages broadcast to lobby WebSocket clients.
#[serde(tag = "type")]
pub enum LobbyOutboundMessage {
    /// Current lobby roster and deposit status.
    #[serde(rename = "lobby_update", rename_all = "camelCase")]
    LobbyUpdate {
        /// Number of live connections.
        player_count: usize,
        /// `waiting` or `ready`.
        status: String,
        /// Per-role deposit confirmation flags.
        deposits: DepositFlags,
    },
    /// A player joined the lobby.
    #[serde(rename = "player_joined", rename_all = "camelCase")]
    PlayerJoined {
        /// Wallet of the player that joined.
        wallet: String,
        /// Role the player occupies.
        role: LobbyRole,
        /// Number of live connections after the join.
        player_count: usize,
    },
    /// One role's deposit was confirmed.
    #[serde(rename = "deposit_confirmed", rename_all = "camelCase")]
    DepositConfirmed {
        /// Wallet whose deposit landed.
        wallet: String,
        /// Role whose deposit landed.
        role: LobbyRole,
    },
    /// Both deposits confirmed; the match may begin.
    #[serde(rename = "match_ready", rename_all = "camelCase")]
    MatchReady {
        /// Identifier of the match about to start.
        match_id: String,
    },
    /// Error acknowledgment, sent only to the offending connection.
    #[serde(rename = "error")]
    Error {
        /// Human-readable error code and detail.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_lobby_parses_role() {
        let msg = LobbyInboundMessage::from_json_str(
            r#"{"type":"join_lobby","lobbyId":"l1","wallet":"0xabc","role":"creator"}"#,
        )
        .unwrap();
        match msg {
            LobbyInboundMessage::JoinLobby { role, .. } => assert_eq!(role, LobbyRole::Creator),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn deposit_made_parses_amount() {
        let msg = LobbyInboundMessage::from_json_str(
            r#"{"type":"deposit_made","role":"opponent","amount":2.5}"#,
        )
        .unwrap();
        assert!(matches!(
            msg,
            LobbyInboundMessage::DepositMade { role: LobbyRole::Opponent, .. }
        ));
    }

    #[test]
    fn bogus_role_is_malformed() {
        assert!(
            LobbyInboundMessage::from_json_str(
                r#"{"type":"join_lobby","lobbyId":"l1","wallet":"0xabc","role":"referee"}"#,
            )
            .is_err()
        );
    }

    #[test]
    fn deposit_flags_complete_requires_both() {
        let mut flags = DepositFlags::default();
        assert!(!flags.complete());
        flags.creator = true;
        assert!(!flags.complete());
        flags.opponent = true;
        assert!(flags.complete());
    }
}
