//! Per-player transient simulation state.

use std::time::Duration;

use crate::protocol::{ArmourType, FlagId, Message, Position, SpawnInfo, NUM_GUNS};

/// What a player currently is, as far as the simulation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifeState {
    Alive,
    #[default]
    Dead,
    Spectator,
    Editing,
}

/// Mutable simulation state for one player. Mutated only by room and gamemode
/// handlers; reset on respawn and on map/mode change.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub life: LifeState,
    pub lifesequence: i32,
    pub gunselect: i32,
    pub ammo: [i32; NUM_GUNS],
    pub health: i32,
    pub maxhealth: i32,
    pub armour: i32,
    pub armour_type: ArmourType,
    pub position: Option<Position>,
    /// Flag currently carried, for flag-capable gamemodes.
    pub flag: Option<FlagId>,
    /// Game-clock running time at the moment of death; spawn-delay
    /// eligibility is measured from here.
    pub died_at: Option<Duration>,
    /// Outbound messages coalesced into one `ClientData` fan-out per tick.
    pub messages: Vec<Message>,
}

impl PlayerState {
    pub fn is_alive(&self) -> bool {
        self.life == LifeState::Alive
    }

    pub fn is_spectator(&self) -> bool {
        self.life == LifeState::Spectator
    }

    /// Whether a spawn request may be honored right now. Ineligible requests
    /// are strict no-ops at the caller.
    pub fn can_spawn(&self, clock_elapsed: Duration, spawn_delay: Duration) -> bool {
        if self.life != LifeState::Dead {
            return false;
        }
        match self.died_at {
            None => true,
            Some(at) => clock_elapsed.saturating_sub(at) >= spawn_delay,
        }
    }

    /// Apply spawn values and bring the player to life. `lifesequence` is
    /// bumped so in-flight events against the previous life are rejected.
    pub fn respawn(
        &mut self,
        health: i32,
        armour: i32,
        armour_type: ArmourType,
        ammo: [i32; NUM_GUNS],
        gunselect: i32,
    ) {
        self.life = LifeState::Alive;
        self.lifesequence = self.lifesequence.wrapping_add(1);
        self.health = health;
        self.maxhealth = health;
        self.armour = armour;
        self.armour_type = armour_type;
        self.ammo = ammo;
        self.gunselect = gunselect;
        self.flag = None;
        self.died_at = None;
    }

    /// Mark the player dead at the given game-clock time. A carried flag is
    /// left in place: the gamemode's death reaction drops it.
    pub fn die(&mut self, clock_elapsed: Duration) {
        self.life = LifeState::Dead;
        self.died_at = Some(clock_elapsed);
    }

    /// Back to a blank slate, keeping only identity-free defaults. Used on
    /// map/mode change; the life-sequence survives so stale shots from the
    /// previous round stay rejected.
    pub fn reset(&mut self) {
        let lifesequence = self.lifesequence;
        let spectating = self.is_spectator();
        *self = Self::default();
        self.lifesequence = lifesequence;
        if spectating {
            self.life = LifeState::Spectator;
        }
    }

    /// Queue a message into the per-tick coalescing buffer.
    pub fn queue(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn spawn_info(&self) -> SpawnInfo {
        SpawnInfo {
            lifesequence: self.lifesequence,
            health: self.health,
            maxhealth: self.maxhealth,
            armour: self.armour,
            armourtype: self.armour_type,
            gunselect: self.gunselect,
            ammo: self.ammo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(5);

    #[test]
    fn fresh_state_can_spawn_immediately() {
        let state = PlayerState::default();
        assert!(state.can_spawn(Duration::ZERO, DELAY));
    }

    #[test]
    fn death_blocks_spawn_until_delay_elapses() {
        let mut state = PlayerState::default();
        state.respawn(100, 0, ArmourType::None, [0; NUM_GUNS], 4);
        state.die(Duration::from_secs(30));

        assert!(!state.can_spawn(Duration::from_secs(30), DELAY));
        assert!(!state.can_spawn(Duration::from_secs(34), DELAY));
        assert!(state.can_spawn(Duration::from_secs(35), DELAY));
    }

    #[test]
    fn alive_player_cannot_respawn() {
        let mut state = PlayerState::default();
        state.respawn(100, 0, ArmourType::None, [0; NUM_GUNS], 4);
        assert!(!state.can_spawn(Duration::from_secs(100), DELAY));
    }

    #[test]
    fn respawn_bumps_lifesequence_and_clears_flag() {
        let mut state = PlayerState {
            flag: Some(1),
            ..Default::default()
        };
        let before = state.lifesequence;
        state.respawn(1, 0, ArmourType::None, [0; NUM_GUNS], 4);
        assert_eq!(state.lifesequence, before + 1);
        assert_eq!(state.flag, None);
        assert!(state.is_alive());
    }

    #[test]
    fn reset_preserves_lifesequence_and_spectating() {
        let mut state = PlayerState::default();
        state.respawn(100, 0, ArmourType::None, [0; NUM_GUNS], 4);
        state.queue(Message::Taunt);
        let seq = state.lifesequence;
        state.reset();
        assert_eq!(state.lifesequence, seq);
        assert_eq!(state.life, LifeState::Dead);
        assert!(state.messages.is_empty());

        state.life = LifeState::Spectator;
        state.reset();
        assert_eq!(state.life, LifeState::Spectator);
    }
}
