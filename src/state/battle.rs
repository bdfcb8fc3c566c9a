//! Battle session data and state machine.
//!
//! One instance per match, always mutated under its own mutex: join, tap,
//! leave, and timer fires are serialized per session while different sessions
//! run fully independently. Methods broadcast their own outbound events
//! through the session roster and hand any timer that must be armed back to
//! the caller, which owns the scheduler.

use std::time::Duration;

use indexmap::IndexMap;
use tokio::{task::AbortHandle, time::Instant};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dto::battle::{BattleOutboundMessage, PlayerScore},
    error::SessionError,
    state::{
        registry::{ConnectionHandle, Roster},
        unix_millis,
    },
};

/// Lifecycle phase of a battle session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BattlePhase {
    /// Waiting for the second distinct participant.
    Waiting,
    /// Both players present; tapping window opens at `deadline`.
    Countdown {
        /// When the countdown elapses.
        deadline: Instant,
    },
    /// Tapping window open; closes at `deadline`.
    Active {
        /// When the window closes.
        deadline: Instant,
    },
    /// Outcome computed; session lingers for late final-state delivery.
    Finished {
        /// Winning wallet, or `None` on an exact tie.
        winner: Option<String>,
    },
}

impl BattlePhase {
    /// Wire-level label for this phase.
    pub fn label(&self) -> &'static str {
        match self {
            BattlePhase::Waiting => "waiting",
            BattlePhase::Countdown { .. } => "countdown",
            BattlePhase::Active { .. } => "active",
            BattlePhase::Finished { .. } => "finished",
        }
    }
}

/// A one-shot timer the caller must arm after a mutation.
///
/// Each carries the session epoch observed when the transition was decided;
/// the fire handler re-validates it so a stale timer, racing an out-of-band
/// transition or eviction, falls through silently.
#[derive(Debug, Clone, Copy)]
pub enum ArmTimer {
    /// Countdown elapses and the tapping window should open.
    Countdown {
        /// Absolute fire time.
        deadline: Instant,
        /// Epoch the session must still be in when the timer fires.
        epoch: u64,
    },
    /// Tapping window elapses and the outcome should be computed.
    ActiveWindow {
        /// Absolute fire time.
        deadline: Instant,
        /// Epoch the session must still be in when the timer fires.
        epoch: u64,
    },
    /// Finished grace period elapses and the session should be evicted.
    FinishedGrace {
        /// Absolute fire time.
        deadline: Instant,
        /// Epoch the session must still be in when the timer fires.
        epoch: u64,
    },
    /// All connections dropped; evict early unless someone reconnects.
    IdleGrace {
        /// Absolute fire time.
        deadline: Instant,
    },
}

/// Final outcome handed to the reporting layer.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Final score lines in join order.
    pub scores: Vec<PlayerScore>,
    /// Winning wallet, or `None` on an exact tie.
    pub winner: Option<String>,
}

/// One in-progress or pending 1v1 scored match.
#[derive(Debug)]
pub struct BattleSession {
    session_id: String,
    phase: BattlePhase,
    /// Bumped on every phase transition; the scheduler's stale-timer guard.
    epoch: u64,
    roster: Roster,
    taps: IndexMap<String, u64>,
    countdown: Duration,
    active_window: Duration,
    finished_grace: Duration,
    idle_grace: Duration,
    phase_timer: Option<AbortHandle>,
    idle_timer: Option<AbortHandle>,
    /// Tombstone set under the session lock just before directory removal,
    /// so a join racing the eviction cannot land on an orphaned instance.
    evicted: bool,
}

impl BattleSession {
    /// Create a session in the waiting phase with the configured timings.
    pub fn new(session_id: String, config: &AppConfig) -> Self {
        Self {
            session_id,
            phase: BattlePhase::Waiting,
            epoch: 0,
            roster: Roster::default(),
            taps: IndexMap::new(),
            countdown: config.countdown,
            active_window: config.active_window,
            finished_grace: config.finished_grace,
            idle_grace: config.idle_grace,
            phase_timer: None,
            idle_timer: None,
            evicted: false,
        }
    }

    /// Externally assigned match identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> &BattlePhase {
        &self.phase
    }

    /// Current transition epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of live connections.
    pub fn live_connections(&self) -> usize {
        self.roster.live_count()
    }

    /// Current tap count for a participant, if they ever joined.
    pub fn taps(&self, wallet: &str) -> Option<u64> {
        self.taps.get(wallet).copied()
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

    /// Register a participant's connection, reconnecting idempotently.
    ///
    /// A third distinct identity is rejected; the second distinct join arms
    /// the countdown as a side effect and returns the timer to schedule.
    pub fn join(
        &mut self,
        wallet: &str,
        conn: ConnectionHandle,
    ) -> Result<Option<ArmTimer>, SessionError> {
        if self.evicted {
            return Err(SessionError::SessionClosed);
        }
        let known = self.roster.contains(wallet);
        if !known {
            if matches!(self.phase, BattlePhase::Finished { .. }) {
                return Err(SessionError::SessionClosed);
            }
            if self.roster.len() >= 2 {
                return Err(SessionError::SessionFull);
            }
        }

        self.roster.register(wallet, conn);
        self.taps.entry(wallet.to_string()).or_insert(0);

        // A reconnect cancels any pending idle eviction.
        if let Some(timer) = self.idle_timer.take() {
            timer.abort();
        }

        self.roster.broadcast(&BattleOutboundMessage::PlayerJoined {
            wallet: wallet.to_string(),
            player_count: self.roster.live_count(),
            game_state: self.phase.label().to_string(),
        });

        // The grace period exists so a participant who missed the outcome can
        // come back for it; replay the final state to them alone.
        if let BattlePhase::Finished { winner } = &self.phase {
            let replay = BattleOutboundMessage::GameEnd {
                scores: self.score_lines(),
                winner: winner.clone(),
                timestamp: unix_millis(),
            };
            self.roster.send_to(wallet, &replay);
        }

        if !known && self.roster.len() == 2 && matches!(self.phase, BattlePhase::Waiting) {
            let deadline = Instant::now() + self.countdown;
            self.phase = BattlePhase::Countdown { deadline };
            self.epoch += 1;
            self.roster.broadcast(&BattleOutboundMessage::CountdownStart {
                start_time: unix_millis(),
                duration: self.countdown.as_millis() as u64,
            });
            return Ok(Some(ArmTimer::Countdown {
                deadline,
                epoch: self.epoch,
            }));
        }

        Ok(None)
    }

    /// Count one tap for a participant.
    ///
    /// Silently ignored outside the active window and for unknown wallets;
    /// each delivered frame increments by exactly one, never retroactively.
    pub fn tap(&mut self, wallet: &str) {
        if !matches!(self.phase, BattlePhase::Active { .. }) {
            return;
        }
        let Some(count) = self.taps.get_mut(wallet) else {
            return;
        };
        *count += 1;
        let taps = *count;
        self.roster.broadcast(&BattleOutboundMessage::TapUpdate {
            wallet: wallet.to_string(),
            taps,
            timestamp: unix_millis(),
        });
    }

    /// Deregister a participant's connection; their slot and counter remain.
    ///
    /// Returns an idle-eviction timer when this drops live connections to
    /// zero. The connection id guard makes a stale read loop a no-op.
    pub fn leave(&mut self, wallet: &str, conn_id: Uuid) -> Option<ArmTimer> {
        if !self.roster.unregister(wallet, conn_id) {
            return None;
        }

        self.roster.broadcast(&BattleOutboundMessage::PlayerLeft {
            wallet: wallet.to_string(),
            player_count: self.roster.live_count(),
        });

        if self.roster.live_count() == 0 {
            return Some(ArmTimer::IdleGrace {
                deadline: Instant::now() + self.idle_grace,
            });
        }
        None
    }

    /// Countdown elapsed: reset counters and open the tapping window.
    ///
    /// Returns `None` when the timer is stale (epoch moved on).
    pub fn begin_active(&mut self, expected_epoch: u64) -> Option<ArmTimer> {
        if self.epoch != expected_epoch || !matches!(self.phase, BattlePhase::Countdown { .. }) {
            return None;
        }

        for count in self.taps.values_mut() {
            *count = 0;
        }

        let deadline = Instant::now() + self.active_window;
        self.phase = BattlePhase::Active { deadline };
        self.epoch += 1;
        self.roster.broadcast(&BattleOutboundMessage::GameStart {
            start_time: unix_millis(),
            duration: self.active_window.as_millis() as u64,
        });

        Some(ArmTimer::ActiveWindow {
            deadline,
            epoch: self.epoch,
        })
    }

    /// Window elapsed: freeze counters, compute and broadcast the outcome.
    ///
    /// Strictly greater count wins; an exact tie names no winner. The window
    /// is only ever entered with two distinct participants, so the outcome
    /// always carries two score lines. Returns `None` on a stale timer.
    pub fn finish(&mut self, expected_epoch: u64) -> Option<(MatchOutcome, ArmTimer)> {
        if self.epoch != expected_epoch || !matches!(self.phase, BattlePhase::Active { .. }) {
            return None;
        }

        let scores = self.score_lines();

        let winner = match scores.as_slice() {
            [first, second] if first.score > second.score => Some(first.wallet.clone()),
            [first, second] if second.score > first.score => Some(second.wallet.clone()),
            _ => None,
        };

        self.phase = BattlePhase::Finished {
            winner: winner.clone(),
        };
        self.epoch += 1;
        self.roster.broadcast(&BattleOutboundMessage::GameEnd {
            scores: scores.clone(),
            winner: winner.clone(),
            timestamp: unix_millis(),
        });

        let outcome = MatchOutcome { scores, winner };
        let timer = ArmTimer::FinishedGrace {
            deadline: Instant::now() + self.finished_grace,
            epoch: self.epoch,
        };
        Some((outcome, timer))
    }

    /// Score lines in join order, from the current counters.
    fn score_lines(&self) -> Vec<PlayerScore> {
        self.taps
            .iter()
            .map(|(wallet, &score)| PlayerScore {
                wallet: wallet.clone(),
                score,
            })
            .collect()
    }

    /// Store the handle of the armed phase timer, aborting any predecessor.
    pub fn set_phase_timer(&mut self, handle: AbortHandle) {
        if let Some(previous) = self.phase_timer.replace(handle) {
            previous.abort();
        }
    }

    /// Store the handle of the armed idle timer, aborting any predecessor.
    pub fn set_idle_timer(&mut self, handle: AbortHandle) {
        if let Some(previous) = self.idle_timer.replace(handle) {
            previous.abort();
        }
    }

    /// Take the phase timer handle without aborting it.
    pub fn take_phase_timer(&mut self) -> Option<AbortHandle> {
        self.phase_timer.take()
    }

    /// Take the idle timer handle without aborting it.
    pub fn take_idle_timer(&mut self) -> Option<AbortHandle> {
        self.idle_timer.take()
    }
}
