//! Two-team bookkeeping for team-based gamemodes.

use crate::protocol::TeamId;
use crate::room::collections::PlayerCollection;

pub const TEAM_NAMES: [&str; 2] = ["good", "evil"];

/// Runtime team scores; discarded with the gamemode instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamState {
    scores: [i32; 2],
}

impl TeamState {
    pub fn score(&self, team: TeamId) -> i32 {
        self.scores[usize::from(team)]
    }

    /// Apply a score delta, returning the new total.
    pub fn add_score(&mut self, team: TeamId, delta: i32) -> i32 {
        let slot = &mut self.scores[usize::from(team)];
        *slot += delta;
        *slot
    }

    pub fn scores(&self) -> Vec<i32> {
        self.scores.to_vec()
    }
}

pub fn team_name(team: TeamId) -> &'static str {
    TEAM_NAMES[usize::from(team)]
}

pub fn team_by_name(name: &str) -> Option<TeamId> {
    TEAM_NAMES
        .iter()
        .position(|n| *n == name)
        .map(|idx| idx as TeamId)
}

/// Join team for a new player: whichever side currently fields fewer
/// players, first team on ties.
pub fn balanced_team(players: &PlayerCollection) -> TeamId {
    let mut counts = [0usize; 2];
    for player in players.iter() {
        if let Some(team) = player.effective_team() {
            counts[usize::from(team)] += 1;
        }
    }
    if counts[1] < counts[0] {
        1
    } else {
        0
    }
}
