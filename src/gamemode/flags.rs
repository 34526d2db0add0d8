//! Flag state machine for capture-the-flag gamemodes.
//!
//! Every flag mutation bumps the flag's version counter; client events carry
//! the version they were computed against and are silently ignored when
//! stale. A dropped flag arms a reset deadline which is disarmed again the
//! moment the flag is picked up or returned — a superseded deadline can never
//! fire.

use std::time::Duration;

use super::teams::TeamState;
use crate::protocol::{FlagId, FlagInit, Message, Pn, Position, TeamId};
use crate::room::broadcaster::Broadcaster;
use crate::room::collections::PlayerCollection;

/// How long a dropped flag lies around before it auto-resets to base.
pub const FLAG_RESET_DELAY: Duration = Duration::from_secs(10);

/// Static flag placement, from map metadata or the first client flag list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlagSpawn {
    pub team: TeamId,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlagStatus {
    AtBase,
    Carried(Pn),
    Dropped(Position),
}

#[derive(Debug, Clone)]
pub struct Flag {
    pub id: FlagId,
    pub team: TeamId,
    pub base: Position,
    pub status: FlagStatus,
    pub version: u32,
    /// Armed while dropped; the auto-reset deadline in room time.
    reset_at: Option<Duration>,
}

impl Flag {
    fn new(id: FlagId, spawn: FlagSpawn) -> Self {
        Self {
            id,
            team: spawn.team,
            base: spawn.position,
            status: FlagStatus::AtBase,
            version: 0,
            reset_at: None,
        }
    }

    pub fn is_at_base(&self) -> bool {
        matches!(self.status, FlagStatus::AtBase)
    }
}

/// Runtime flag state for one flag-capable gamemode instance. Discarded with
/// the instance on map/mode change.
#[derive(Debug, Clone, Default)]
pub struct FlagState {
    flags: Vec<Flag>,
}

impl FlagState {
    pub fn from_spawns(spawns: &[FlagSpawn]) -> Self {
        Self {
            flags: spawns
                .iter()
                .enumerate()
                .map(|(id, spawn)| Flag::new(id as FlagId, *spawn))
                .collect(),
        }
    }

    /// Late initialization from the first client-announced flag list, for
    /// maps without server-side metadata. Ignored once flags exist.
    pub fn init_from_list(&mut self, spawns: &[FlagSpawn]) {
        if self.flags.is_empty() {
            *self = Self::from_spawns(spawns);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    pub fn snapshot(&self) -> Vec<FlagInit> {
        self.flags
            .iter()
            .map(|flag| FlagInit {
                team: flag.team,
                version: flag.version,
                carrier: match flag.status {
                    FlagStatus::Carried(pn) => Some(pn),
                    _ => None,
                },
                dropped: match flag.status {
                    FlagStatus::Dropped(position) => Some(position),
                    _ => None,
                },
            })
            .collect()
    }

    /// React to a client take-flag event.
    ///
    /// Own-team flag: dropped → return to base; at base while carrying the
    /// enemy flag → score. Enemy flag: take. Everything else, including any
    /// version mismatch, is silently ignored.
    pub fn take(
        &mut self,
        teams: &mut TeamState,
        players: &mut PlayerCollection,
        broadcaster: &mut Broadcaster,
        pn: Pn,
        flag_id: FlagId,
        version: u32,
    ) {
        let Some(player) = players.by_pn(pn) else {
            return;
        };
        if !player.state.is_alive() {
            return;
        }
        let Some(player_team) = player.effective_team() else {
            return;
        };
        let carried = player.state.flag;

        let Some(flag) = self.flags.get(flag_id as usize) else {
            return;
        };
        if flag.version != version {
            tracing::debug!(%pn, flag = flag_id, version, current = flag.version, "Stale flag event ignored");
            return;
        }

        if flag.team == player_team {
            match flag.status {
                FlagStatus::Dropped(_) => self.return_flag(broadcaster, pn, flag_id),
                FlagStatus::AtBase => {
                    let carries_enemy = carried
                        .and_then(|id| self.flags.get(id as usize))
                        .is_some_and(|f| f.team != player_team);
                    if carries_enemy {
                        self.score(teams, players, broadcaster, pn, player_team);
                    }
                }
                FlagStatus::Carried(_) => {}
            }
        } else {
            match flag.status {
                FlagStatus::AtBase | FlagStatus::Dropped(_) if carried.is_none() => {
                    let flag = &mut self.flags[flag_id as usize];
                    flag.status = FlagStatus::Carried(pn);
                    flag.version += 1;
                    flag.reset_at = None;
                    let version = flag.version;
                    if let Some(player) = players.by_pn_mut(pn) {
                        player.state.flag = Some(flag_id);
                    }
                    broadcaster.broadcast().write(Message::TakeFlag {
                        pn,
                        flag: flag_id,
                        version,
                    });
                }
                _ => {}
            }
        }
    }

    fn return_flag(&mut self, broadcaster: &mut Broadcaster, pn: Pn, flag_id: FlagId) {
        let flag = &mut self.flags[flag_id as usize];
        flag.status = FlagStatus::AtBase;
        flag.version += 1;
        flag.reset_at = None;
        broadcaster.broadcast().write(Message::ReturnFlag {
            pn,
            flag: flag_id,
            version: flag.version,
        });
    }

    fn score(
        &mut self,
        teams: &mut TeamState,
        players: &mut PlayerCollection,
        broadcaster: &mut Broadcaster,
        pn: Pn,
        team: TeamId,
    ) {
        let Some(player) = players.by_pn_mut(pn) else {
            return;
        };
        let Some(carried_id) = player.state.flag.take() else {
            return;
        };
        player.frags += 1;

        let flag = &mut self.flags[carried_id as usize];
        flag.status = FlagStatus::AtBase;
        flag.version += 1;
        flag.reset_at = None;

        let score = teams.add_score(team, 1);
        broadcaster.broadcast().write(Message::ScoreFlag {
            pn,
            flag: carried_id,
            team,
            score,
        });
    }

    /// Drop the player's carried flag (death, suicide, explicit drop,
    /// disconnect) at their current position and arm the reset deadline.
    pub fn drop_carried(
        &mut self,
        players: &mut PlayerCollection,
        broadcaster: &mut Broadcaster,
        pn: Pn,
        now: Duration,
    ) {
        let Some(player) = players.by_pn_mut(pn) else {
            return;
        };
        let Some(flag_id) = player.state.flag.take() else {
            return;
        };
        let position = player.state.position;

        let Some(flag) = self.flags.get_mut(flag_id as usize) else {
            return;
        };
        let position = position.unwrap_or(flag.base);
        flag.status = FlagStatus::Dropped(position);
        flag.version += 1;
        flag.reset_at = Some(now + FLAG_RESET_DELAY);
        broadcaster.broadcast().write(Message::DropFlag {
            pn,
            flag: flag_id,
            version: flag.version,
            position,
        });
    }

    /// Fire due reset deadlines. Each armed deadline fires at most once.
    pub fn advance(&mut self, broadcaster: &mut Broadcaster, now: Duration) {
        for flag in &mut self.flags {
            let due = flag.reset_at.is_some_and(|at| at <= now);
            if !due {
                continue;
            }
            flag.reset_at = None;
            if !matches!(flag.status, FlagStatus::Dropped(_)) {
                // Reset deadlines are disarmed on every pickup; a live
                // deadline on a non-dropped flag means bookkeeping broke.
                tracing::error!(flag = flag.id, "Reset deadline on non-dropped flag");
                continue;
            }
            flag.status = FlagStatus::AtBase;
            flag.version += 1;
            broadcaster.broadcast().write(Message::ResetFlag {
                flag: flag.id,
                version: flag.version,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Player;
    use crate::room::broadcaster::RecordingTransport;
    use crate::room::collections::ClientCollection;

    fn fixture() -> (FlagState, TeamState, PlayerCollection, Broadcaster) {
        let flags = FlagState::from_spawns(&[
            FlagSpawn {
                team: 0,
                position: Position::new(10.0, 0.0, 0.0),
            },
            FlagSpawn {
                team: 1,
                position: Position::new(-10.0, 0.0, 0.0),
            },
        ]);
        let mut players = PlayerCollection::default();
        let mut player = Player::new(0, 0, "runner".into(), 0);
        player.team = Some(0);
        player.state.respawn(100, 0, crate::protocol::ArmourType::None, [0; 7], 4);
        players.add(player);
        (flags, TeamState::default(), players, Broadcaster::default())
    }

    fn drain(broadcaster: &mut Broadcaster, players: &mut PlayerCollection) -> Vec<Message> {
        let mut clients = ClientCollection::default();
        clients.add(crate::player::Client::new(0, crate::protocol::Privilege::None));
        let mut transport = RecordingTransport::default();
        broadcaster.flush(&clients, players, &mut transport);
        transport.messages_to(0)
    }

    #[test]
    fn stale_version_is_ignored() {
        let (mut flags, mut teams, mut players, mut broadcaster) = fixture();
        flags.take(&mut teams, &mut players, &mut broadcaster, 0, 1, 7);
        assert!(drain(&mut broadcaster, &mut players).is_empty());
        assert!(flags.flags()[1].is_at_base());
    }

    #[test]
    fn take_then_own_base_scores_and_resets() {
        let (mut flags, mut teams, mut players, mut broadcaster) = fixture();
        flags.take(&mut teams, &mut players, &mut broadcaster, 0, 1, 0);
        assert_eq!(flags.flags()[1].version, 1);
        assert_eq!(players.by_pn(0).unwrap().state.flag, Some(1));

        flags.take(&mut teams, &mut players, &mut broadcaster, 0, 0, 0);
        let kinds: Vec<_> = drain(&mut broadcaster, &mut players)
            .iter()
            .map(Message::kind)
            .collect();
        assert_eq!(kinds, vec!["take_flag", "score_flag"]);
        assert!(flags.flags().iter().all(Flag::is_at_base));
        assert_eq!(flags.flags()[1].version, 2);
        assert_eq!(teams.score(0), 1);
        assert_eq!(players.by_pn(0).unwrap().state.flag, None);
    }

    #[test]
    fn drop_arms_reset_which_fires_once() {
        let (mut flags, mut teams, mut players, mut broadcaster) = fixture();
        flags.take(&mut teams, &mut players, &mut broadcaster, 0, 1, 0);
        flags.drop_carried(&mut players, &mut broadcaster, 0, Duration::ZERO);
        assert!(matches!(flags.flags()[1].status, FlagStatus::Dropped(_)));

        flags.advance(&mut broadcaster, Duration::from_secs(9));
        flags.advance(&mut broadcaster, FLAG_RESET_DELAY);
        flags.advance(&mut broadcaster, Duration::from_secs(20));

        let kinds: Vec<_> = drain(&mut broadcaster, &mut players)
            .iter()
            .map(Message::kind)
            .collect();
        assert_eq!(kinds, vec!["take_flag", "drop_flag", "reset_flag"]);
        assert!(flags.flags()[1].is_at_base());
    }

    #[test]
    fn pickup_disarms_reset_deadline() {
        let (mut flags, mut teams, mut players, mut broadcaster) = fixture();
        flags.take(&mut teams, &mut players, &mut broadcaster, 0, 1, 0);
        flags.drop_carried(&mut players, &mut broadcaster, 0, Duration::ZERO);

        // Recovered before the deadline: version is now 2 after take+drop.
        flags.take(&mut teams, &mut players, &mut broadcaster, 0, 1, 2);
        flags.advance(&mut broadcaster, Duration::from_secs(60));

        let kinds: Vec<_> = drain(&mut broadcaster, &mut players)
            .iter()
            .map(Message::kind)
            .collect();
        assert_eq!(kinds, vec!["take_flag", "drop_flag", "take_flag"]);
    }

    #[test]
    fn own_dropped_flag_returns_to_base() {
        let (mut flags, mut teams, mut players, mut broadcaster) = fixture();
        // Force the own flag into a dropped state via a carry and death-drop.
        flags.take(&mut teams, &mut players, &mut broadcaster, 0, 1, 0);
        flags.drop_carried(&mut players, &mut broadcaster, 0, Duration::ZERO);

        // Manually relabel: pretend flag 0 (own team) was the dropped one by
        // touching it as dropped.
        flags.flags[0].status = FlagStatus::Dropped(Position::default());
        flags.flags[0].version = 3;
        flags.take(&mut teams, &mut players, &mut broadcaster, 0, 0, 3);

        assert!(flags.flags()[0].is_at_base());
        assert_eq!(flags.flags()[0].version, 4);
        let kinds: Vec<_> = drain(&mut broadcaster, &mut players)
            .iter()
            .map(Message::kind)
            .collect();
        assert!(kinds.contains(&"return_flag"));
    }

    #[test]
    fn dead_player_cannot_take() {
        let (mut flags, mut teams, mut players, mut broadcaster) = fixture();
        players.by_pn_mut(0).unwrap().state.die(Duration::ZERO);
        flags.take(&mut teams, &mut players, &mut broadcaster, 0, 1, 0);
        assert!(flags.flags()[1].is_at_base());
    }
}
