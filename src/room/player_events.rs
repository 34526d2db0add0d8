//! Player-level event handlers.
//!
//! Everything a player does in the simulation lands here, keyed by `pn`.
//! Events from players no longer in the room are dropped silently; they are
//! expected during disconnect races, not errors. Relayed state (name/model
//! switches, chat, gun selection) goes through the player's coalescing
//! buffer so each tick fans out one batch per player.

use tracing::debug;

use super::broadcaster;
use super::Room;
use crate::player::LifeState;
use crate::protocol::{FlagId, Message, Pn, Position};

const FALLBACK_NAME: &str = "unnamed";

impl Room {
    pub fn on_player_switch_name(&mut self, pn: Pn, name: &str) {
        let Some(player) = self.players.by_pn_mut(pn) else {
            return;
        };
        let name = if name.is_empty() { FALLBACK_NAME } else { name };
        player.name = name.to_string();
        player.state.queue(Message::SwitchName {
            name: name.to_string(),
        });
    }

    pub fn on_player_switch_model(&mut self, pn: Pn, playermodel: i32) {
        let Some(player) = self.players.by_pn_mut(pn) else {
            return;
        };
        player.playermodel = playermodel;
        player.state.queue(Message::SwitchModel { playermodel });
    }

    /// Player-initiated team switch; the gamemode decides whether it means
    /// anything.
    pub fn on_player_switch_team(&mut self, pn: Pn, team_name: &str) {
        self.with_mode(|mode, ctx| mode.on_player_try_set_team(ctx, pn, pn, team_name));
    }

    pub fn on_player_game_chat(&mut self, pn: Pn, text: &str) {
        let Some(player) = self.players.by_pn_mut(pn) else {
            return;
        };
        player.state.queue(Message::Text {
            text: text.to_string(),
        });
    }

    /// Chat delivered only to the sender's teammates.
    pub fn on_player_team_chat(&mut self, pn: Pn, text: &str) {
        let Some(player) = self.players.by_pn(pn) else {
            return;
        };
        let Some(team) = player.effective_team() else {
            return;
        };
        let cn = player.cn;
        let teammates: Vec<_> = self
            .players
            .iter()
            .filter(|p| p.pn != pn && p.effective_team() == Some(team))
            .map(|p| p.cn)
            .collect();
        if teammates.is_empty() {
            return;
        }
        let mut scope = self.broadcaster.scope(
            broadcaster::CHAN_MSG,
            true,
            broadcaster::RecipientSet::Only(teammates.into_iter().collect()),
        );
        scope.write(Message::TeamChat {
            cn,
            text: text.to_string(),
        });
    }

    pub fn on_player_gunselect(&mut self, pn: Pn, gun: i32) {
        let Some(player) = self.players.by_pn_mut(pn) else {
            return;
        };
        if !player.state.is_alive() {
            return;
        }
        player.state.gunselect = gun;
        player.state.queue(Message::GunSelect { gun });
    }

    pub fn on_player_sound(&mut self, pn: Pn, sound: i32) {
        if let Some(player) = self.players.by_pn_mut(pn) {
            player.state.queue(Message::Sound { sound });
        }
    }

    pub fn on_player_taunt(&mut self, pn: Pn) {
        self.with_mode(|mode, ctx| mode.on_player_taunt(ctx, pn));
    }

    /// Position sample from the movement channel; only the latest one per
    /// tick survives into the flush.
    pub fn on_player_position(&mut self, pn: Pn, position: Position) {
        let Some(player) = self.players.by_pn_mut(pn) else {
            return;
        };
        if player.state.is_alive() || player.state.life == LifeState::Editing {
            player.state.position = Some(position);
        }
    }

    pub fn on_player_teleport(&mut self, pn: Pn, teleport: i32, teledest: i32) {
        if self.players.by_pn(pn).is_some() {
            self.broadcaster.teleport(pn, teleport, teledest);
        }
    }

    pub fn on_player_jumppad(&mut self, pn: Pn, jumppad: i32) {
        if self.players.by_pn(pn).is_some() {
            self.broadcaster.jumppad(pn, jumppad);
        }
    }

    /// Self-inflicted death. Costs a frag, then runs the shared death chain.
    pub fn on_player_suicide(&mut self, pn: Pn) {
        let elapsed = self.clock.elapsed();
        let Some(player) = self.players.by_pn_mut(pn) else {
            return;
        };
        if !player.state.is_alive() {
            return;
        }
        player.state.die(elapsed);
        player.deaths += 1;
        player.frags -= 1;
        let frags = player.frags;
        self.broadcaster.player_died(pn, pn, frags);
        self.with_mode(|mode, ctx| mode.on_player_death(ctx, pn, pn));
    }

    pub fn on_player_shoot(
        &mut self,
        pn: Pn,
        shot_id: i32,
        gun: i32,
        from: Position,
        to: Position,
        hits: &[crate::gamemode::HitInfo],
    ) {
        self.with_mode(|mode, ctx| mode.on_player_shoot(ctx, pn, shot_id, gun, from, to, hits));
    }

    pub fn on_player_explode(
        &mut self,
        pn: Pn,
        gun: i32,
        explode_id: i32,
        hits: &[crate::gamemode::HitInfo],
    ) {
        self.with_mode(|mode, ctx| mode.on_player_explode(ctx, pn, gun, explode_id, hits));
    }

    pub fn on_player_request_spawn(&mut self, pn: Pn) {
        if self
            .players
            .by_pn(pn)
            .is_some_and(|p| p.state.is_spectator())
        {
            return;
        }
        self.with_mode(|mode, ctx| mode.on_player_request_spawn(ctx, pn));
    }

    /// Client-side spawn confirmation; relays the spawn to the room once the
    /// life sequence checks out.
    pub fn on_player_spawn(&mut self, pn: Pn, lifesequence: i32, gunselect: i32) {
        let Some(player) = self.players.by_pn_mut(pn) else {
            return;
        };
        if player.state.lifesequence != lifesequence {
            debug!(pn, lifesequence, "spawn confirmation for a previous life dropped");
            return;
        }
        player.state.gunselect = gunselect;
        player.state.queue(Message::Spawn {
            pn,
            lifesequence,
            gunselect,
        });
    }

    pub fn on_player_pickup_item(&mut self, pn: Pn, item: i32) {
        self.with_mode(|mode, ctx| mode.on_player_pickup_item(ctx, pn, item));
    }

    /// Ammo boxes replenish client-side in this ruleset.
    pub fn on_player_replenish_ammo(&mut self, pn: Pn) {
        debug!(pn, "ammo replenish handled client-side");
    }

    pub fn on_player_take_flag(&mut self, pn: Pn, flag: FlagId, version: u32) {
        self.with_mode(|mode, ctx| mode.on_player_take_flag(ctx, pn, flag, version));
    }

    pub fn on_player_try_drop_flag(&mut self, pn: Pn) {
        self.with_mode(|mode, ctx| mode.on_player_try_drop_flag(ctx, pn));
    }

    pub fn on_player_edit_mode(&mut self, pn: Pn, on: bool) {
        let Some(player) = self.players.by_pn_mut(pn) else {
            return;
        };
        match (on, player.state.life) {
            (true, LifeState::Alive) => player.state.life = LifeState::Editing,
            (false, LifeState::Editing) => player.state.life = LifeState::Alive,
            _ => return,
        }
        player.state.queue(Message::EditMode { on });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::gamemode::GamemodeKind;
    use crate::protocol::{AllowAll, Privilege};
    use crate::room::broadcaster::RecordingTransport;
    use crate::room::{RoomContext, RoomEntryContext};

    fn ffa_room() -> Room {
        Room::new(
            "test".into(),
            RoomContext {
                description: "test server".into(),
                domain: String::new(),
                map_meta: HashMap::new(),
                permissions: Box::new(AllowAll),
                rotation: vec![("complex".into(), GamemodeKind::FreeForAll)],
                rotate_on_first_player: false,
                resume_delay: None,
                intermission_len: Duration::from_secs(10),
            },
        )
    }

    fn enter(room: &mut Room, cn: u32) {
        room.client_enter(RoomEntryContext {
            cn,
            name: format!("p{cn}"),
            playermodel: 0,
            privilege: Privilege::None,
        });
    }

    #[test]
    fn suicide_costs_a_frag_and_broadcasts_death() {
        let mut room = ffa_room();
        enter(&mut room, 0);
        let mut transport = RecordingTransport::default();
        room.flush(&mut transport);
        transport.clear();

        room.on_player_suicide(0);
        room.on_player_suicide(0);
        room.flush(&mut transport);

        let player = room.players().by_pn(0).unwrap();
        assert_eq!(player.frags, -1);
        assert_eq!(player.deaths, 1);
        let kinds = transport.kinds_to(0);
        assert_eq!(kinds.iter().filter(|k| **k == "died").count(), 1);
    }

    #[test]
    fn name_switch_falls_back_when_empty() {
        let mut room = ffa_room();
        enter(&mut room, 0);
        room.on_player_switch_name(0, "");
        assert_eq!(room.players().by_pn(0).unwrap().name, "unnamed");
    }

    #[test]
    fn events_from_unknown_players_are_dropped() {
        let mut room = ffa_room();
        enter(&mut room, 0);
        room.on_player_switch_name(9, "ghost");
        room.on_player_suicide(9);
        room.on_player_gunselect(9, 3);

        let mut transport = RecordingTransport::default();
        room.flush(&mut transport);
        assert!(!transport.kinds_to(0).contains(&"died"));
    }

    #[test]
    fn edit_mode_round_trips_life_state() {
        let mut room = ffa_room();
        enter(&mut room, 0);
        room.on_player_edit_mode(0, true);
        assert_eq!(
            room.players().by_pn(0).unwrap().state.life,
            LifeState::Editing
        );
        room.on_player_edit_mode(0, false);
        assert!(room.players().by_pn(0).unwrap().state.is_alive());
    }

    #[test]
    fn position_samples_collapse_to_latest() {
        let mut room = ffa_room();
        enter(&mut room, 0);
        room.on_player_position(0, Position::new(1.0, 0.0, 0.0));
        room.on_player_position(0, Position::new(2.0, 0.0, 0.0));

        let mut transport = RecordingTransport::default();
        room.flush(&mut transport);
        let positions: Vec<_> = transport
            .deliveries
            .iter()
            .filter(|d| d.channel == broadcaster::CHAN_POS)
            .collect();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].messages.len(), 1);
    }
}
