//! WebSocket lifecycle and message handling for the lobby protocol.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::{
    dto::lobby::{LobbyInboundMessage, LobbyOutboundMessage, LobbyRole},
    error::SessionError,
    services::{
        battle_service::{finalize, send_message_to_websocket},
        report,
    },
    state::{SharedState, lobby::LobbySession, registry::ConnectionHandle},
};

/// Handle the full lifecycle for an individual lobby WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

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

    let (lobby_id, wallet, role) = match LobbyInboundMessage::from_json_str(&initial_message) {
        Ok(LobbyInboundMessage::JoinLobby {
            lobby_id,
            wallet,
            role,
        }) => (lobby_id, wallet, role),
        Ok(_) => {
            warn!("first lobby message was not join_lobby");
            send_error(
                &outbound_tx,
                &SessionError::MalformedMessage("expected join_lobby first".into()),
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse or validate lobby message");
            send_error(&outbound_tx, &err);
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let conn = ConnectionHandle::new(outbound_tx.clone());
    let conn_id = conn.id;
    let lobby = loop {
        let lobby = state
            .lobbies()
            .get_or_create(&lobby_id, || LobbySession::new(lobby_id.clone()));

        let mut guard = lobby.lock().await;
        if guard.is_evicted() {
            // The last player left and evicted this instance between the
            // directory lookup and our lock; look up again for a fresh one.
            debug!(%lobby_id, "lobby evicted mid-join, retrying lookup");
            continue;
        }
        if let Err(err) = guard.join(&wallet, role, conn.clone()) {
            info!(%lobby_id, %wallet, ?role, error = %err, "lobby join rejected");
            send_error(&outbound_tx, &err);
            let _ = outbound_tx.send(Message::Close(None));
            drop(guard);
            finalize(writer_task, outbound_tx).await;
            return;
        }
        drop(guard);
        break lobby;
    };

    info!(%lobby_id, %wallet, ?role, "lobby player connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match LobbyInboundMessage::from_json_str(&text) {
                Ok(LobbyInboundMessage::DepositMade {
                    role: claimed_role,
                    amount,
                }) => {
                    if claimed_role != role {
                        send_error(
                            &outbound_tx,
                            &SessionError::MalformedMessage(
                                "deposit role does not match the connection's role".into(),
                            ),
                        );
                        continue;
                    }
                    info!(%lobby_id, %wallet, ?role, amount, "deposit confirmed");
                    if let Err(err) = confirm_deposit(&state, &lobby, &wallet, role).await {
                        send_error(&outbound_tx, &err);
                    }
                }
                Ok(LobbyInboundMessage::JoinLobby { .. }) => {
                    warn!(%lobby_id, %wallet, "ignoring duplicate join_lobby");
                }
                Ok(LobbyInboundMessage::Unknown) => {
                    send_error(
                        &outbound_tx,
                        &SessionError::MalformedMessage("unknown message type".into()),
                    );
                }
                Err(err) => {
                    warn!(%lobby_id, %wallet, error = %err, "failed to parse or validate lobby message");
                    send_error(&outbound_tx, &err);
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%lobby_id, %wallet, "lobby client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%lobby_id, %wallet, error = %err, "websocket error");
                break;
            }
        }
    }

    {
        let mut guard = lobby.lock().await;
        if guard.leave(&wallet, conn_id) {
            info!(%lobby_id, "evicting empty lobby");
            // Tombstone first, still under the lock: a join that already
            // fetched this instance must fail and retry the lookup.
            guard.mark_evicted();
            state.lobbies().evict(&lobby_id);
        }
    }
    info!(%lobby_id, %wallet, "lobby player disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Record a deposit confirmation and, when it completes the handshake,
/// notify the external match record that play is starting.
pub async fn confirm_deposit(
    state: &SharedState,
    lobby: &Arc<Mutex<LobbySession>>,
    wallet: &str,
    role: LobbyRole,
) -> Result<(), SessionError> {
    let (became_ready, match_id) = {
        let mut guard = lobby.lock().await;
        let became_ready = guard.mark_deposit(wallet, role)?;
        (became_ready, guard.match_id().to_string())
    };
    if became_ready {
        report::fire_and_forget(
            state.reporter().mark_in_progress(match_id),
            "match in-progress status",
        );
    }
    Ok(())
}

/// Acknowledge an error to the offending sender only.
fn send_error(tx: &mpsc::UnboundedSender<Message>, err: &SessionError) {
    send_message_to_websocket(
        tx,
        &LobbyOutboundMessage::Error {
            message: err.to_string(),
        },
    );
}
