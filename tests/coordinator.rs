//! End-to-end coordinator scenarios driven through the shared state,
//! session state machines, and scheduler, with channel-backed connections
//! standing in for live sockets. Time is paused so timers fire instantly
//! and deterministically.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::extract::ws::Message;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use tap_battle_back::{
    config::AppConfig,
    dto::battle::PlayerScore,
    dto::lobby::LobbyRole,
    error::SessionError,
    services::{lobby_service, report::MatchReporter, scheduler},
    state::{
        AppState, SharedState,
        battle::BattleSession,
        lobby::LobbySession,
        registry::ConnectionHandle,
    },
};

/// Reporter that records every call for later assertions.
#[derive(Default)]
struct RecordingReporter {
    results: StdMutex<Vec<(String, Vec<PlayerScore>, Option<String>)>>,
    in_progress: StdMutex<Vec<String>>,
}

impl MatchReporter for RecordingReporter {
    fn report_result(
        &self,
        match_id: String,
        scores: Vec<PlayerScore>,
        winner: Option<String>,
    ) -> BoxFuture<'static, Result<(), tap_battle_back::services::report::ReportError>> {
        self.results.lock().unwrap().push((match_id, scores, winner));
        Box::pin(async { Ok(()) })
    }

    fn mark_in_progress(
        &self,
        match_id: String,
    ) -> BoxFuture<'static, Result<(), tap_battle_back::services::report::ReportError>> {
        self.in_progress.lock().unwrap().push(match_id);
        Box::pin(async { Ok(()) })
    }
}

fn test_state() -> (SharedState, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::default());
    let state = AppState::new(AppConfig::default(), reporter.clone());
    (state, reporter)
}

#[derive(Debug)]
struct TestClient {
    session: Arc<Mutex<BattleSession>>,
    wallet: String,
    conn_id: Uuid,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl TestClient {
    /// Collect every queued broadcast, parsed, in delivery order.
    fn drain(&mut self) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(Message::Text(text)) = self.rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    async fn tap(&self, times: usize) {
        for _ in 0..times {
            self.session.lock().await.tap(&self.wallet);
        }
    }

    async fn disconnect(&self, state: &SharedState) {
        let mut guard = self.session.lock().await;
        if let Some(timer) = guard.leave(&self.wallet, self.conn_id) {
            scheduler::arm(state.clone(), self.session.clone(), &mut guard, timer);
        }
    }
}

/// Connect a wallet to a match the way the transport adapter does: resolve
/// the session through the directory, join, and arm whatever timer the join
/// produced.
async fn connect(state: &SharedState, match_id: &str, wallet: &str) -> TestClient {
    try_connect(state, match_id, wallet).await.expect("join accepted")
}

async fn try_connect(
    state: &SharedState,
    match_id: &str,
    wallet: &str,
) -> Result<TestClient, SessionError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = ConnectionHandle::new(tx);
    let conn_id = conn.id;
    let session = state
        .battles()
        .get_or_create(match_id, || BattleSession::new(match_id.into(), state.config()));

    let mut guard = session.lock().await;
    match guard.join(wallet, conn) {
        Ok(Some(timer)) => scheduler::arm(state.clone(), session.clone(), &mut guard, timer),
        Ok(None) => {}
        Err(err) => return Err(err),
    }
    drop(guard);

    Ok(TestClient {
        session,
        wallet: wallet.to_string(),
        conn_id,
        rx,
    })
}

/// Sleep slightly past a configured duration so the armed timer has fired.
async fn run_past(duration: Duration) {
    tokio::time::sleep(duration + Duration::from_millis(20)).await;
}

#[tokio::test(start_paused = true)]
async fn two_joins_trigger_countdown_then_game_start() {
    let (state, _reporter) = test_state();
    let mut a = connect(&state, "s1", "A").await;
    let _b = connect(&state, "s1", "B").await;

    let events = a.drain();
    let types: Vec<_> = events.iter().map(|e| e["type"].as_str().unwrap().to_string()).collect();
    assert_eq!(types, vec!["player_joined", "player_joined", "countdown_start"]);
    assert_eq!(events[0]["playerCount"], 1);
    assert_eq!(events[1]["playerCount"], 2);
    assert_eq!(events[2]["duration"], 3000);

    run_past(state.config().countdown).await;

    let events = a.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "game_start");
    assert_eq!(events[0]["duration"], 10000);
}

#[tokio::test(start_paused = true)]
async fn higher_tap_count_wins_and_result_is_reported() {
    let (state, reporter) = test_state();
    let a = connect(&state, "s1", "A").await;
    let mut b = connect(&state, "s1", "B").await;
    run_past(state.config().countdown).await;

    a.tap(15).await;
    b.tap(9).await;
    run_past(state.config().active_window).await;

    let events = b.drain();
    let game_end = events
        .iter()
        .find(|event| event["type"] == "game_end")
        .expect("game_end broadcast");
    assert_eq!(game_end["winner"], "A");
    assert_eq!(game_end["scores"][0]["wallet"], "A");
    assert_eq!(game_end["scores"][0]["score"], 15);
    assert_eq!(game_end["scores"][1]["wallet"], "B");
    assert_eq!(game_end["scores"][1]["score"], 9);

    // The final result reaches the external record store exactly once.
    let results = reporter.results.lock().unwrap();
    assert_eq!(results.len(), 1);
    let (match_id, scores, winner) = &results[0];
    assert_eq!(match_id, "s1");
    assert_eq!(winner.as_deref(), Some("A"));
    assert_eq!(scores.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn equal_counts_end_with_no_winner() {
    let (state, reporter) = test_state();
    let a = connect(&state, "s1", "A").await;
    let mut b = connect(&state, "s1", "B").await;
    run_past(state.config().countdown).await;

    a.tap(7).await;
    b.tap(7).await;
    run_past(state.config().active_window).await;

    let events = b.drain();
    let game_end = events
        .iter()
        .find(|event| event["type"] == "game_end")
        .expect("game_end broadcast");
    assert!(game_end["winner"].is_null());

    let results = reporter.results.lock().unwrap();
    assert!(results[0].2.is_none());
}

#[tokio::test(start_paused = true)]
async fn third_wallet_is_rejected_without_side_effects() {
    let (state, _reporter) = test_state();
    let _a = connect(&state, "s1", "A").await;
    let mut b = connect(&state, "s1", "B").await;
    b.drain();

    let err = try_connect(&state, "s1", "C").await.unwrap_err();
    assert_eq!(err.to_string(), "SessionFull");
    assert!(b.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_mid_window_does_not_stop_the_match() {
    let (state, reporter) = test_state();
    let a = connect(&state, "s1", "A").await;
    let mut b = connect(&state, "s1", "B").await;
    run_past(state.config().countdown).await;

    a.tap(5).await;
    a.disconnect(&state).await;
    b.tap(3).await;
    run_past(state.config().active_window).await;

    let events = b.drain();
    assert!(events.iter().any(|event| event["type"] == "player_left"));
    let game_end = events
        .iter()
        .find(|event| event["type"] == "game_end")
        .expect("game_end still fires at the deadline");
    assert_eq!(game_end["winner"], "A");
    assert_eq!(game_end["scores"][0]["score"], 5);
    assert_eq!(game_end["scores"][1]["score"], 3);

    assert_eq!(reporter.results.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn taps_before_and_after_the_window_never_count() {
    let (state, _reporter) = test_state();
    let a = connect(&state, "s1", "A").await;
    let mut b = connect(&state, "s1", "B").await;

    // Countdown phase: gated.
    a.tap(10).await;
    run_past(state.config().countdown).await;

    a.tap(2).await;
    run_past(state.config().active_window).await;

    // Finished phase: gated and frozen.
    a.tap(10).await;

    let events = b.drain();
    let game_end = events
        .iter()
        .find(|event| event["type"] == "game_end")
        .expect("game_end broadcast");
    assert_eq!(game_end["scores"][0]["score"], 2);
}

#[tokio::test(start_paused = true)]
async fn broadcasts_arrive_in_generation_order() {
    let (state, _reporter) = test_state();
    let a = connect(&state, "s1", "A").await;
    let mut b = connect(&state, "s1", "B").await;
    run_past(state.config().countdown).await;
    a.tap(3).await;
    run_past(state.config().active_window).await;

    let types: Vec<String> = b
        .drain()
        .iter()
        .map(|event| event["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        types,
        vec![
            "player_joined",
            "countdown_start",
            "game_start",
            "tap_update",
            "tap_update",
            "tap_update",
            "game_end",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn finished_session_is_evicted_after_the_grace_period() {
    let (state, _reporter) = test_state();
    let _a = connect(&state, "s1", "A").await;
    let _b = connect(&state, "s1", "B").await;
    run_past(state.config().countdown).await;
    run_past(state.config().active_window).await;
    assert_eq!(state.battles().len(), 1);

    run_past(state.config().finished_grace).await;
    assert!(state.battles().is_empty());
}

#[tokio::test(start_paused = true)]
async fn deserted_session_is_evicted_early() {
    let (state, _reporter) = test_state();
    let a = connect(&state, "s1", "A").await;
    a.disconnect(&state).await;

    run_past(state.config().idle_grace).await;
    assert!(state.battles().is_empty());
}

#[tokio::test(start_paused = true)]
async fn reconnect_during_idle_grace_keeps_the_session_alive() {
    let (state, _reporter) = test_state();
    let a = connect(&state, "s1", "A").await;
    a.disconnect(&state).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let _a2 = connect(&state, "s1", "A").await;

    run_past(state.config().idle_grace).await;
    assert_eq!(state.battles().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejoin_during_the_grace_period_receives_the_final_state() {
    let (state, _reporter) = test_state();
    let a = connect(&state, "s1", "A").await;
    let _b = connect(&state, "s1", "B").await;
    run_past(state.config().countdown).await;
    a.tap(4).await;
    a.disconnect(&state).await;
    run_past(state.config().active_window).await;

    // A missed the outcome; coming back within the grace period replays it.
    let mut a2 = connect(&state, "s1", "A").await;
    let events = a2.drain();
    assert_eq!(events[0]["type"], "player_joined");
    assert_eq!(events[0]["gameState"], "finished");
    let game_end = events
        .iter()
        .find(|event| event["type"] == "game_end")
        .expect("final state replayed to the rejoiner");
    assert_eq!(game_end["winner"], "A");
    assert_eq!(game_end["scores"][0]["score"], 4);
}

#[tokio::test(start_paused = true)]
async fn connection_after_eviction_gets_a_fresh_session() {
    let (state, _reporter) = test_state();
    let a = connect(&state, "s1", "A").await;
    a.disconnect(&state).await;
    run_past(state.config().idle_grace).await;
    assert!(state.battles().is_empty());

    // The evicted instance is tombstoned: a join racing the eviction with a
    // stale directory lookup is rejected instead of landing on the orphan.
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = a
        .session
        .lock()
        .await
        .join("A", ConnectionHandle::new(tx))
        .unwrap_err();
    assert_eq!(err.to_string(), "SessionClosed");

    // A retried lookup resolves to a brand-new instance for the same id.
    let a2 = connect(&state, "s1", "A").await;
    assert!(!Arc::ptr_eq(&a.session, &a2.session));
    assert_eq!(state.battles().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_deposit_marks_the_match_in_progress_once() {
    let (state, reporter) = test_state();
    let lobby = state
        .lobbies()
        .get_or_create("l1", || LobbySession::new("l1".into()));
    let (tx_a, _rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    {
        let mut guard = lobby.lock().await;
        guard
            .join("A", LobbyRole::Creator, ConnectionHandle::new(tx_a))
            .unwrap();
        guard
            .join("B", LobbyRole::Opponent, ConnectionHandle::new(tx_b))
            .unwrap();
    }

    lobby_service::confirm_deposit(&state, &lobby, "A", LobbyRole::Creator)
        .await
        .unwrap();
    assert!(reporter.in_progress.lock().unwrap().is_empty());

    lobby_service::confirm_deposit(&state, &lobby, "B", LobbyRole::Opponent)
        .await
        .unwrap();
    assert_eq!(*reporter.in_progress.lock().unwrap(), vec!["l1".to_string()]);

    // A duplicate confirmation from a flaky client must not re-notify.
    lobby_service::confirm_deposit(&state, &lobby, "B", LobbyRole::Opponent)
        .await
        .unwrap();
    assert_eq!(reporter.in_progress.lock().unwrap().len(), 1);

    let mut events = Vec::new();
    while let Ok(Message::Text(text)) = rx_b.try_recv() {
        events.push(serde_json::from_str::<serde_json::Value>(&text).unwrap());
    }
    let ready = events
        .iter()
        .find(|event| event["type"] == "match_ready")
        .expect("match_ready broadcast");
    assert_eq!(ready["matchId"], "l1");
}

#[tokio::test(start_paused = true)]
async fn sessions_run_independently() {
    let (state, reporter) = test_state();
    let a1 = connect(&state, "s1", "A").await;
    let _b1 = connect(&state, "s1", "B").await;
    let _a2 = connect(&state, "s2", "C").await;

    run_past(state.config().countdown).await;
    a1.tap(1).await;
    run_past(state.config().active_window).await;

    // s1 finished; s2 never left waiting and reported nothing.
    assert_eq!(reporter.results.lock().unwrap().len(), 1);
    assert_eq!(state.battles().len(), 2);
}
