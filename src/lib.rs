//! Library crate for tap-battle-back, exposing modules for binaries and integration tests.

/// Runtime configuration.
pub mod config;
/// Wire-level data transfer objects.
pub mod dto;
/// Error taxonomy.
pub mod error;
/// HTTP and WebSocket routes.
pub mod routes;
/// Socket handling, scheduling, and reporting services.
pub mod services;
/// Shared state, session directories, and state machines.
pub mod state;
