//! Deterministic game timing.

pub mod game_clock;

pub use game_clock::{ClockEvent, ClockEvents, GameClock};
