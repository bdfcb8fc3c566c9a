//! WebSocket lifecycle and message handling for the battle protocol.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::battle::{BattleInboundMessage, BattleOutboundMessage},
    error::SessionError,
    services::scheduler,
    state::{SharedState, battle::BattleSession, registry::ConnectionHandle},
};

/// Handle the full lifecycle for an individual battle WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let ident_timeout = state.config().ident_timeout;
    let initial_message = match tokio::time::timeout(ident_timeout, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let (match_id, wallet) = match BattleInboundMessage::from_json_str(&initial_message) {
        Ok(BattleInboundMessage::JoinMatch { match_id, wallet }) => (match_id, wallet),
        Ok(_) => {
            warn!("first battle message was not join_match");
            send_error(
                &outbound_tx,
                &SessionError::MalformedMessage("expected join_match first".into()),
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse or validate battle message");
            send_error(&outbound_tx, &err);
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let conn = ConnectionHandle::new(outbound_tx.clone());
    let conn_id = conn.id;
    let session = loop {
        let session = state
            .battles()
            .get_or_create(&match_id, || BattleSession::new(match_id.clone(), state.config()));

        let mut guard = session.lock().await;
        if guard.is_evicted() {
            // A grace timer evicted this instance between the directory
            // lookup and our lock; the entry is gone, so look up again to
            // get a fresh one.
            debug!(%match_id, "session evicted mid-join, retrying lookup");
            continue;
        }
        match guard.join(&wallet, conn.clone()) {
            Ok(Some(timer)) => scheduler::arm(state.clone(), session.clone(), &mut guard, timer),
            Ok(None) => {}
            Err(err) => {
                info!(%match_id, %wallet, error = %err, "battle join rejected");
                send_error(&outbound_tx, &err);
                let _ = outbound_tx.send(Message::Close(None));
                drop(guard);
                finalize(writer_task, outbound_tx).await;
                return;
            }
        }
        drop(guard);
        break session;
    };

    info!(%match_id, %wallet, "player connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match BattleInboundMessage::from_json_str(&text) {
                Ok(BattleInboundMessage::Tap {}) => {
                    session.lock().await.tap(&wallet);
                }
                Ok(BattleInboundMessage::GameComplete {}) => {
                    // Advisory only; the server's own window timer is authoritative.
                    debug!(%match_id, %wallet, "ignoring advisory game_complete");
                }
                Ok(BattleInboundMessage::JoinMatch { .. }) => {
                    warn!(%match_id, %wallet, "ignoring duplicate join_match");
                }
                Ok(BattleInboundMessage::Unknown) => {
                    send_error(
                        &outbound_tx,
                        &SessionError::MalformedMessage("unknown message type".into()),
                    );
                }
                Err(err) => {
                    warn!(%match_id, %wallet, error = %err, "failed to parse or validate battle message");
                    send_error(&outbound_tx, &err);
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%match_id, %wallet, "battle client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%match_id, %wallet, error = %err, "websocket error");
                break;
            }
        }
    }

    {
        let mut guard = session.lock().await;
        if let Some(timer) = guard.leave(&wallet, conn_id) {
            scheduler::arm(state.clone(), session.clone(), &mut guard, timer);
        }
    }
    info!(%match_id, %wallet, "player disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Serialize a payload and push it onto the provided WebSocket sender.
pub(crate) fn send_message_to_websocket<T>(tx: &mpsc::UnboundedSender<Message>, value: &T)
where
    T: ?Sized + Serialize,
{
    match serde_json::to_string(value) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize outbound message"),
    }
}

/// Acknowledge an error to the offending sender only.
fn send_error(tx: &mpsc::UnboundedSender<Message>, err: &SessionError) {
    send_message_to_websocket(
        tx,
        &BattleOutboundMessage::Error {
            message: err.to_string(),
        },
    );
}

/// Ensure the writer task winds down before we return from the socket handler.
pub(crate) async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
