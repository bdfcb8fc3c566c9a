/// Battle WebSocket connection and message handling.
pub mod battle_service;
/// Lobby WebSocket connection and message handling.
pub mod lobby_service;
/// Best-effort reporting to the external match record service.
pub mod report;
/// One-shot timers driving time-based session transitions.
pub mod scheduler;
