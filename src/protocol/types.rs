use serde::{Deserialize, Serialize};

/// Client number: unique per connected client within a room, stable for the
/// connection lifetime.
pub type Cn = u32;
/// Player number: unique per player entity within a room. Human players use
/// `pn == cn`; bot players would draw from `BOT_PN_BASE` upward.
pub type Pn = u32;
/// Team index within the active gamemode (0 = "good", 1 = "evil").
pub type TeamId = u8;
/// Flag index within the active flag-capable gamemode.
pub type FlagId = u8;

/// First player number reserved for server-controlled (bot) players.
pub const BOT_PN_BASE: Pn = 128;

/// Number of weapon slots carried in spawn state and ammo arrays.
pub const NUM_GUNS: usize = 7;

/// Weapon slots, in protocol order.
pub mod guns {
    pub const FIST: usize = 0;
    pub const SHOTGUN: usize = 1;
    pub const CHAINGUN: usize = 2;
    pub const ROCKET: usize = 3;
    pub const RIFLE: usize = 4;
    pub const GRENADE: usize = 5;
    pub const PISTOL: usize = 6;
}

/// Per-gun damage table (indexed by gun slot), used by non-insta modes.
pub const GUN_DAMAGE: [i32; NUM_GUNS] = [50, 10, 30, 120, 100, 90, 35];

/// Armour classes in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmourType {
    #[default]
    None,
    Blue,
    Green,
    Yellow,
}

/// Mastermode values, in protocol order.
pub mod mastermodes {
    pub const MM_OPEN: i32 = 0;
    pub const MM_VETO: i32 = 1;
    pub const MM_LOCKED: i32 = 2;
    pub const MM_PRIVATE: i32 = 3;
}

/// World position. The server treats coordinates as opaque simulation data;
/// it never interprets map geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Privilege level attached to a client connection, resolved by the external
/// authentication layer before room entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    #[default]
    None,
    Master,
    Auth,
    Admin,
}

/// Capabilities the permission resolver is asked about before a client event
/// is allowed to mutate room state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    SetMasterMode,
    SetTeam,
    SetSpectator,
    PauseResume,
}

impl Capability {
    /// Human-readable name used in denial messages.
    pub fn describe(self) -> &'static str {
        match self {
            Self::SetMasterMode => "change the mastermode",
            Self::SetTeam => "change player teams",
            Self::SetSpectator => "change who is spectating",
            Self::PauseResume => "pause or resume the game",
        }
    }
}

/// Permission resolution is external to the room engine; the room only
/// enforces the fail-fast contract on the answer.
pub trait PermissionResolver: Send {
    fn allows(&self, cn: Cn, privilege: Privilege, capability: Capability) -> bool;
}

/// Resolver that grants every capability. Useful for unrestricted local rooms
/// and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PermissionResolver for AllowAll {
    fn allows(&self, _cn: Cn, _privilege: Privilege, _capability: Capability) -> bool {
        true
    }
}

/// Resolver that requires a minimum privilege level per capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrivilegeThreshold;

impl PermissionResolver for PrivilegeThreshold {
    fn allows(&self, _cn: Cn, privilege: Privilege, capability: Capability) -> bool {
        let required = match capability {
            Capability::PauseResume => Privilege::Master,
            Capability::SetTeam | Capability::SetSpectator => Privilege::Master,
            Capability::SetMasterMode => Privilege::Auth,
        };
        privilege >= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_ordering_matches_protocol() {
        assert!(Privilege::Admin > Privilege::Auth);
        assert!(Privilege::Auth > Privilege::Master);
        assert!(Privilege::Master > Privilege::None);
    }

    #[test]
    fn threshold_resolver_gates_on_privilege() {
        let resolver = PrivilegeThreshold;
        assert!(!resolver.allows(0, Privilege::None, Capability::PauseResume));
        assert!(resolver.allows(0, Privilege::Master, Capability::PauseResume));
        assert!(!resolver.allows(0, Privilege::Master, Capability::SetMasterMode));
        assert!(resolver.allows(0, Privilege::Admin, Capability::SetMasterMode));
    }
}
