//! Shared spawn policy.
//!
//! Every gamemode variant spawns players the same way; only the static rule
//! parameters differ. Kept as free functions so variants share one code path
//! instead of a common base type.

use std::time::Duration;

use super::ModeRules;
use crate::player::Player;
use crate::protocol::Message;
use crate::room::broadcaster::Broadcaster;
use crate::timing::GameClock;

/// Apply the mode's spawn values and bring the player to life.
pub fn respawn_player(player: &mut Player, rules: &ModeRules) {
    player.state.respawn(
        rules.spawn_health,
        rules.spawn_armour,
        rules.spawn_armour_type,
        rules.spawn_ammo(),
        rules.spawn_gun as i32,
    );
}

/// Whether the player may spawn right now under the mode's spawn delay.
pub fn eligible(player: &Player, rules: &ModeRules, clock: &GameClock) -> bool {
    player
        .state
        .can_spawn(clock.elapsed(), Duration::from_secs(rules.spawn_delay_secs))
}

/// Honor a spawn request if eligible; an ineligible request sends nothing.
pub fn request_spawn(
    player: &mut Player,
    rules: &ModeRules,
    clock: &GameClock,
    broadcaster: &mut Broadcaster,
) {
    if !eligible(player, rules, clock) {
        return;
    }
    respawn_player(player, rules);
    broadcaster.unicast(player.cn).write(Message::SpawnState {
        pn: player.pn,
        spawn: player.state.spawn_info(),
    });
}
