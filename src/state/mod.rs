//! Shared application state: session directories and the reporting handle.

/// Battle session data and state machine.
pub mod battle;
/// Generic keyed session directory.
pub mod directory;
/// Lobby session data and state machine.
pub mod lobby;
/// Connection registry and broadcast fan-out.
pub mod registry;

use std::sync::Arc;

use time::OffsetDateTime;

use crate::{
    config::AppConfig,
    services::report::MatchReporter,
    state::{battle::BattleSession, directory::Directory, lobby::LobbySession},
};

/// Cheaply cloneable handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state.
///
/// Constructed once at process start and injected everywhere; the directories
/// are the only structures touched by multiple sessions' actors concurrently.
pub struct AppState {
    config: AppConfig,
    battles: Directory<BattleSession>,
    lobbies: Directory<LobbySession>,
    reporter: Arc<dyn MatchReporter>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, reporter: Arc<dyn MatchReporter>) -> SharedState {
        Arc::new(Self {
            config,
            battles: Directory::new(),
            lobbies: Directory::new(),
            reporter,
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Directory of active battle sessions.
    pub fn battles(&self) -> &Directory<BattleSession> {
        &self.battles
    }

    /// Directory of active lobbies.
    pub fn lobbies(&self) -> &Directory<LobbySession> {
        &self.lobbies
    }

    /// Handle to the external match record reporter.
    pub fn reporter(&self) -> Arc<dyn MatchReporter> {
        self.reporter.clone()
    }
}

/// Current wall-clock time as unix milliseconds, as carried in outbound events.
pub fn unix_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
