//! Lobby session data and two-state machine for the deposit handshake.
//!
//! Structurally a smaller sibling of the battle session: same roster and
//! fan-out scaffolding, no timers, and only explicit deposit/join/leave
//! events drive it. Ownership of the match passes to a battle session once
//! both deposits are confirmed.

use indexmap::IndexMap;
use uuid::Uuid;

use crate::{
    dto::lobby::{DepositFlags, LobbyOutboundMessage, LobbyRole},
    error::SessionError,
    state::registry::{ConnectionHandle, Roster},
};

/// Lifecycle status of a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyStatus {
    /// Waiting for one or both deposits.
    Waiting,
    /// Both deposits confirmed; the match may begin.
    Ready,
}

impl LobbyStatus {
    /// Wire-level label for this status.
    pub fn label(&self) -> &'static str {
        match self {
            LobbyStatus::Waiting => "waiting",
            LobbyStatus::Ready => "ready",
        }
    }
}

/// The pre-match deposit handshake for one match-to-be.
#[derive(Debug)]
pub struct LobbySession {
    match_id: String,
    status: LobbyStatus,
    roster: Roster,
    roles: IndexMap<LobbyRole, String>,
    deposits: DepositFlags,
    /// Tombstone set under the session lock just before directory removal,
    /// so a join racing the eviction cannot land on an orphaned instance.
    evicted: bool,
}

impl LobbySession {
    /// Create a lobby in the waiting status.
    pub fn new(match_id: String) -> Self {
        Self {
            match_id,
            status: LobbyStatus::Waiting,
            roster: Roster::default(),
            roles: IndexMap::new(),
            deposits: DepositFlags::default(),
            evicted: false,
        }
    }

    /// Identifier of the match this lobby precedes.
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Current handshake status.
    pub fn status(&self) -> LobbyStatus {
        self.status
    }

    /// Current deposit flags.
    pub fn deposits(&self) -> DepositFlags {
        self.deposits
    }

    /// True once no player holds a slot; the lobby should then be evicted.
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Mark this instance as removed from the directory.
    ///
    /// Must be called under the session lock, before the directory entry is
    /// dropped, so every later join on this instance is rejected instead of
    /// landing on an orphan.
    pub fn mark_evicted(&mut self) {
        self.evicted = true;
    }

    /// Whether this instance has been removed from the directory.
    pub fn is_evicted(&self) -> bool {
        self.evicted
    }

    /// Register a player under a role, reconnecting idempotently.
    ///
    /// A role already claimed by a different wallet is rejected.
    pub fn join(
        &mut self,
        wallet: &str,
        role: LobbyRole,
        conn: ConnectionHandle,
    ) -> Result<(), SessionError> {
        if self.evicted {
            return Err(SessionError::SessionClosed);
        }
        if let Some(existing) = self.roles.get(&role) {
            if existing != wallet {
                return Err(SessionError::RoleTaken);
            }
        }

        self.roles.insert(role, wallet.to_string());
        self.roster.register(wallet, conn);

        self.roster.broadcast(&LobbyOutboundMessage::PlayerJoined {
            wallet: wallet.to_string(),
            role,
            player_count: self.roster.live_count(),
        });
        self.broadcast_update();
        Ok(())
    }

    /// Record a deposit confirmation for the sender's role.
    ///
    /// Returns `true` exactly once, when the second confirmation flips the
    /// lobby to ready; the caller then notifies the external match record.
    pub fn mark_deposit(&mut self, wallet: &str, role: LobbyRole) -> Result<bool, SessionError> {
        match self.roles.get(&role) {
            Some(owner) if owner == wallet => {}
            _ => {
                return Err(SessionError::MalformedMessage(
                    "deposit role does not match the connection's role".into(),
                ));
            }
        }

        match role {
            LobbyRole::Creator => self.deposits.creator = true,
            LobbyRole::Opponent => self.deposits.opponent = true,
        }

        self.roster.broadcast(&LobbyOutboundMessage::DepositConfirmed {
            wallet: wallet.to_string(),
            role,
        });

        let became_ready = self.deposits.complete() && self.status == LobbyStatus::Waiting;
        if became_ready {
            self.status = LobbyStatus::Ready;
            self.roster.broadcast(&LobbyOutboundMessage::MatchReady {
                match_id: self.match_id.clone(),
            });
        }
        self.broadcast_update();

        Ok(became_ready)
    }

    /// Drop a player's slot entirely on disconnect.
    ///
    /// Lobby slots are not sticky the way battle slots are: the handshake
    /// restarts from the join when a player comes back. While the lobby is
    /// still waiting, the freed role's deposit flag is reset too, so a new
    /// wallet claiming that role never inherits a confirmation it did not
    /// make. Returns whether the lobby is now empty and should be evicted.
    pub fn leave(&mut self, wallet: &str, conn_id: Uuid) -> bool {
        if !self.roster.unregister(wallet, conn_id) {
            return false;
        }
        self.roster.remove(wallet);
        let freed: Vec<LobbyRole> = self
            .roles
            .iter()
            .filter_map(|(role, owner)| (owner.as_str() == wallet).then_some(*role))
            .collect();
        for role in freed {
            self.roles.shift_remove(&role);
            if self.status == LobbyStatus::Waiting {
                match role {
                    LobbyRole::Creator => self.deposits.creator = false,
                    LobbyRole::Opponent => self.deposits.opponent = false,
                }
            }
        }
        self.broadcast_update();
        self.roster.is_empty()
    }

    fn broadcast_update(&mut self) {
        let update = LobbyOutboundMessage::LobbyUpdate {
            player_count: self.roster.live_count(),
            status: self.status.label().to_string(),
            deposits: self.deposits,
        };
        self.roster.broadcast(&update);
    }
}
