//! Protocol-facing type definitions shared across the room engine.

pub mod messages;
pub mod types;

pub use messages::{ClientInit, FlagInit, MasterEntry, Message, SpawnInfo};
pub use types::{
    guns, mastermodes, AllowAll, ArmourType, Capability, Cn, FlagId, PermissionResolver, Pn,
    Position, Privilege, PrivilegeThreshold, TeamId, BOT_PN_BASE, GUN_DAMAGE, NUM_GUNS,
};
