//! One-shot timers driving time-based battle session transitions.
//!
//! Every armed timer is tied to the session epoch observed when the
//! transition was decided. On fire the handler re-locks the session and the
//! state machine re-validates the epoch, so a timer racing an out-of-band
//! transition or eviction falls through silently instead of mutating a
//! session it no longer owns. Waiting on a timer never blocks any session's
//! event handling; the session mutex is only taken once the deadline passes.

use std::sync::Arc;

use tokio::{sync::Mutex, time::sleep_until};
use tracing::{debug, info};

use crate::{
    services::report,
    state::{
        SharedState,
        battle::{ArmTimer, BattleSession},
    },
};

/// Arm the timer a session mutation handed back.
///
/// Must be called while still holding the session guard, so the stored abort
/// handle can never race the timer task itself (the task blocks on the same
/// mutex until the caller releases it).
pub fn arm(
    state: SharedState,
    session: Arc<Mutex<BattleSession>>,
    guard: &mut BattleSession,
    timer: ArmTimer,
) {
    match timer {
        ArmTimer::Countdown { deadline, epoch } => {
            let task = tokio::spawn(countdown_fired(state, session, deadline, epoch));
            guard.set_phase_timer(task.abort_handle());
        }
        ArmTimer::ActiveWindow { deadline, epoch } => {
            let task = tokio::spawn(window_fired(state, session, deadline, epoch));
            guard.set_phase_timer(task.abort_handle());
        }
        ArmTimer::FinishedGrace { deadline, epoch } => {
            let task = tokio::spawn(finished_grace_fired(state, session, deadline, epoch));
            guard.set_phase_timer(task.abort_handle());
        }
        ArmTimer::IdleGrace { deadline } => {
            let task = tokio::spawn(idle_grace_fired(state, session, deadline));
            guard.set_idle_timer(task.abort_handle());
        }
    }
}

async fn countdown_fired(
    state: SharedState,
    session: Arc<Mutex<BattleSession>>,
    deadline: tokio::time::Instant,
    epoch: u64,
) {
    sleep_until(deadline).await;
    let mut guard = session.lock().await;
    let Some(next) = guard.begin_active(epoch) else {
        debug!(session_id = %guard.session_id(), "stale countdown timer ignored");
        return;
    };
    info!(session_id = %guard.session_id(), "tapping window opened");
    arm(state, session.clone(), &mut guard, next);
}

async fn window_fired(
    state: SharedState,
    session: Arc<Mutex<BattleSession>>,
    deadline: tokio::time::Instant,
    epoch: u64,
) {
    sleep_until(deadline).await;
    let mut guard = session.lock().await;
    let Some((outcome, next)) = guard.finish(epoch) else {
        debug!(session_id = %guard.session_id(), "stale window timer ignored");
        return;
    };
    let session_id = guard.session_id().to_string();
    info!(
        %session_id,
        winner = outcome.winner.as_deref().unwrap_or("tie"),
        "match finished"
    );
    arm(state.clone(), session.clone(), &mut guard, next);
    drop(guard);

    report::fire_and_forget(
        state
            .reporter()
            .report_result(session_id, outcome.scores, outcome.winner),
        "match result",
    );
}

async fn finished_grace_fired(
    state: SharedState,
    session: Arc<Mutex<BattleSession>>,
    deadline: tokio::time::Instant,
    epoch: u64,
) {
    sleep_until(deadline).await;
    let mut guard = session.lock().await;
    if guard.epoch() != epoch {
        debug!(session_id = %guard.session_id(), "stale grace timer ignored");
        return;
    }
    guard.take_phase_timer();
    if let Some(idle) = guard.take_idle_timer() {
        idle.abort();
    }
    info!(session_id = %guard.session_id(), "evicting finished session");
    // Tombstone first, still under the lock: a join that already fetched
    // this instance from the directory must fail and retry the lookup.
    guard.mark_evicted();
    state.battles().evict(guard.session_id());
}

async fn idle_grace_fired(
    state: SharedState,
    session: Arc<Mutex<BattleSession>>,
    deadline: tokio::time::Instant,
) {
    sleep_until(deadline).await;
    let mut guard = session.lock().await;
    guard.take_idle_timer();
    // Someone may have reconnected while we slept; only a still-deserted
    // session is evicted early.
    if guard.live_connections() > 0 {
        return;
    }
    if let Some(pending) = guard.take_phase_timer() {
        pending.abort();
    }
    info!(session_id = %guard.session_id(), "evicting deserted session");
    guard.mark_evicted();
    state.battles().evict(guard.session_id());
}
