//! Client and player entities.
//!
//! A `Client` is one network connection; a `Player` is one simulation actor.
//! A client owns its players (a connection may also control bot players), so
//! client removal cascades to player removal. Players keep only a weak
//! back-reference to their owner via `cn`.

pub mod state;

use smallvec::SmallVec;

pub use state::{LifeState, PlayerState};

use crate::protocol::{ClientInit, Cn, Pn, Privilege, TeamId, BOT_PN_BASE};

/// One network connection admitted to a room.
#[derive(Debug, Clone)]
pub struct Client {
    pub cn: Cn,
    pub privilege: Privilege,
    /// Players controlled by this connection, own player first.
    pub player_nums: SmallVec<[Pn; 2]>,
}

impl Client {
    pub fn new(cn: Cn, privilege: Privilege) -> Self {
        Self {
            cn,
            privilege,
            player_nums: SmallVec::new(),
        }
    }
}

/// One game-simulation actor.
#[derive(Debug, Clone)]
pub struct Player {
    pub pn: Pn,
    /// Owning connection; lookup/formatting only, the client owns the player.
    pub cn: Cn,
    pub name: String,
    pub playermodel: i32,
    pub team: Option<TeamId>,
    pub frags: i32,
    pub deaths: i32,
    pub state: PlayerState,
}

impl Player {
    pub fn new(pn: Pn, cn: Cn, name: String, playermodel: i32) -> Self {
        Self {
            pn,
            cn,
            name,
            playermodel,
            team: None,
            frags: 0,
            deaths: 0,
            state: PlayerState::default(),
        }
    }

    pub fn is_bot(&self) -> bool {
        self.pn >= BOT_PN_BASE
    }

    /// Team membership as the rest of the room sees it: spectators have none.
    pub fn effective_team(&self) -> Option<TeamId> {
        if self.state.is_spectator() {
            None
        } else {
            self.team
        }
    }

    /// Roster entry for the entry handshake and join broadcasts.
    pub fn client_init(&self, team_name: Option<String>) -> ClientInit {
        ClientInit {
            pn: self.pn,
            name: self.name.clone(),
            playermodel: self.playermodel,
            team: team_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spectator_has_no_effective_team() {
        let mut player = Player::new(0, 0, "tester".into(), 0);
        player.team = Some(1);
        assert_eq!(player.effective_team(), Some(1));
        player.state.life = LifeState::Spectator;
        assert_eq!(player.effective_team(), None);
    }

    #[test]
    fn bot_detection_uses_reserved_range() {
        assert!(!Player::new(3, 3, "human".into(), 0).is_bot());
        assert!(Player::new(BOT_PN_BASE, 3, "bot".into(), 0).is_bot());
    }
}
