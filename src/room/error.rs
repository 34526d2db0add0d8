use crate::protocol::Pn;

/// Failures surfaced by the client-event handler surface.
///
/// Handlers validate fully before mutating; an error always means no room
/// state changed. Stale flag versions are deliberately not represented here:
/// those events are silently ignored, not failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("insufficient permissions to {what}")]
    InsufficientPermissions { what: &'static str },

    #[error("no player with pn {pn} found")]
    UnknownPlayer { pn: Pn },
}
