//! Wire-level data transfer objects for both client protocols.

/// Battle protocol messages (join, tap, state broadcasts).
pub mod battle;
/// Health check payloads.
pub mod health;
/// Lobby protocol messages (deposit-confirmation handshake).
pub mod lobby;
/// Validation helpers for identifiers carried in inbound messages.
pub mod validation;
