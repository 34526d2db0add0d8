#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Arena Server
//!
//! Room/session engine for a real-time multiplayer arena game server.
//!
//! Rooms run concurrent game sessions with independent clocks, rosters and
//! gamemodes; the engine emits typed protocol messages and leaves byte-level
//! encoding to the attached transport.

/// Server configuration and environment overrides
pub mod config;

/// Gamemode rule sets (free-for-all, team deathmatch, CTF variants)
pub mod gamemode;

/// Structured logging configuration
pub mod logging;

/// Client and player entities
pub mod player;

/// Typed protocol messages and shared protocol types
pub mod protocol;

/// The room engine: sessions, rosters, broadcast coalescing
pub mod room;

/// Host layer: per-room tasks and event dispatch
pub mod server;

/// Deterministic game timing
pub mod timing;
