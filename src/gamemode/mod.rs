//! Pluggable rule sets.
//!
//! A gamemode is a tagged variant carrying only the capability data relevant
//! to its kind (teams, flags, items); dispatch is plain pattern matching and
//! shared behavior (spawn policy) lives in free functions. One instance
//! exists per active map/mode and is discarded wholesale on rotation — no
//! runtime state migrates across gamemode changes.

pub mod flags;
pub mod spawn;
pub mod teams;

use std::collections::BTreeSet;
use std::time::Duration;

pub use flags::{FlagSpawn, FlagState, FLAG_RESET_DELAY};
pub use teams::{TeamState, TEAM_NAMES};

use crate::player::Player;
use crate::protocol::{
    guns, ArmourType, Cn, FlagId, Message, Pn, Position, TeamId, GUN_DAMAGE, NUM_GUNS,
};
use crate::room::broadcaster::{BroadcastScope, Broadcaster};
use crate::room::collections::PlayerCollection;
use crate::timing::GameClock;

/// Static rule parameters for one mode. These never change at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeRules {
    pub name: &'static str,
    /// Client-visible mode number from the original protocol.
    pub mode_num: i32,
    pub timed: bool,
    pub timeout_secs: u64,
    pub has_items: bool,
    pub has_flags: bool,
    pub has_teams: bool,
    /// One-hit-kill weapons, no item pickups affecting health.
    pub insta: bool,
    pub spawn_health: i32,
    pub spawn_armour: i32,
    pub spawn_armour_type: ArmourType,
    pub spawn_delay_secs: u64,
    pub spawn_gun: usize,
    spawn_ammo: [i32; NUM_GUNS],
}

impl ModeRules {
    pub fn spawn_ammo(&self) -> [i32; NUM_GUNS] {
        self.spawn_ammo
    }
}

const STANDARD_AMMO: [i32; NUM_GUNS] = [1, 0, 0, 0, 0, 1, 40];
const INSTA_AMMO: [i32; NUM_GUNS] = [1, 0, 0, 0, 100, 0, 0];

const FFA_RULES: ModeRules = ModeRules {
    name: "ffa",
    mode_num: 0,
    timed: true,
    timeout_secs: 600,
    has_items: true,
    has_flags: false,
    has_teams: false,
    insta: false,
    spawn_health: 100,
    spawn_armour: 25,
    spawn_armour_type: ArmourType::Blue,
    spawn_delay_secs: 0,
    spawn_gun: guns::PISTOL,
    spawn_ammo: STANDARD_AMMO,
};

const TEAMPLAY_RULES: ModeRules = ModeRules {
    name: "teamplay",
    mode_num: 2,
    has_teams: true,
    ..FFA_RULES
};

const CTF_RULES: ModeRules = ModeRules {
    name: "ctf",
    mode_num: 11,
    has_teams: true,
    has_flags: true,
    spawn_delay_secs: 5,
    ..FFA_RULES
};

const INSTACTF_RULES: ModeRules = ModeRules {
    name: "instactf",
    mode_num: 12,
    has_items: false,
    insta: true,
    spawn_armour: 0,
    spawn_armour_type: ArmourType::None,
    spawn_gun: guns::RIFLE,
    spawn_ammo: INSTA_AMMO,
    ..CTF_RULES
};

/// The supported mode roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamemodeKind {
    FreeForAll,
    TeamDeathmatch,
    CaptureTheFlag,
    InstaCtf,
}

impl GamemodeKind {
    pub const ALL: [GamemodeKind; 4] = [
        Self::FreeForAll,
        Self::TeamDeathmatch,
        Self::CaptureTheFlag,
        Self::InstaCtf,
    ];

    pub fn rules(self) -> &'static ModeRules {
        match self {
            Self::FreeForAll => &FFA_RULES,
            Self::TeamDeathmatch => &TEAMPLAY_RULES,
            Self::CaptureTheFlag => &CTF_RULES,
            Self::InstaCtf => &INSTACTF_RULES,
        }
    }

    pub fn name(self) -> &'static str {
        self.rules().name
    }

    /// Resolve a client-visible mode name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Static per-map data supplied by the external map metadata accessor.
/// Absence of an entry is valid: the mode runs with a default/empty layout.
#[derive(Debug, Clone, Default)]
pub struct MapMetaData {
    pub flag_spawns: Vec<FlagSpawn>,
    pub items: Vec<i32>,
}

/// Item pickups for item-capable modes. Announced once per map (by metadata
/// or the first client item list); each item is claimable once.
#[derive(Debug, Clone, Default)]
pub struct ItemState {
    available: BTreeSet<i32>,
    announced: bool,
}

impl ItemState {
    fn from_meta(items: &[i32]) -> Self {
        Self {
            available: items.iter().copied().collect(),
            announced: !items.is_empty(),
        }
    }
}

/// One decoded hit from a shoot/explode event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitInfo {
    pub target: Pn,
    /// Life sequence the shooter computed the hit against; stale hits from a
    /// previous life are rejected.
    pub lifesequence: i32,
}

/// Mutable room state a gamemode reaction may touch, borrowed for the
/// duration of one handler invocation.
pub struct ModeContext<'a> {
    pub players: &'a mut PlayerCollection,
    pub broadcaster: &'a mut Broadcaster,
    pub clock: &'a GameClock,
    /// Room-monotonic time, for timer arming (flag resets).
    pub now: Duration,
}

/// Capability data per variant.
#[derive(Debug, Clone)]
enum Caps {
    FreeForAll {
        items: ItemState,
    },
    TeamDeathmatch {
        teams: TeamState,
    },
    CaptureTheFlag {
        teams: TeamState,
        flags: FlagState,
        items: ItemState,
    },
    InstaCtf {
        teams: TeamState,
        flags: FlagState,
    },
}

/// One active rule-set instance.
#[derive(Debug, Clone)]
pub struct Gamemode {
    kind: GamemodeKind,
    initialized: bool,
    caps: Caps,
}

impl Gamemode {
    pub fn new(kind: GamemodeKind, meta: Option<&MapMetaData>) -> Self {
        let flag_state = || {
            meta.map(|m| FlagState::from_spawns(&m.flag_spawns))
                .unwrap_or_default()
        };
        let item_state = || {
            meta.map(|m| ItemState::from_meta(&m.items))
                .unwrap_or_default()
        };
        let caps = match kind {
            GamemodeKind::FreeForAll => Caps::FreeForAll { items: item_state() },
            GamemodeKind::TeamDeathmatch => Caps::TeamDeathmatch {
                teams: TeamState::default(),
            },
            GamemodeKind::CaptureTheFlag => Caps::CaptureTheFlag {
                teams: TeamState::default(),
                flags: flag_state(),
                items: item_state(),
            },
            GamemodeKind::InstaCtf => Caps::InstaCtf {
                teams: TeamState::default(),
                flags: flag_state(),
            },
        };
        Self {
            kind,
            initialized: false,
            caps,
        }
    }

    pub fn kind(&self) -> GamemodeKind {
        self.kind
    }

    pub fn rules(&self) -> &'static ModeRules {
        self.kind.rules()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// One-time initialization, on first resume.
    pub fn initialize(&mut self) {
        self.initialized = true;
    }

    fn teams_mut(&mut self) -> Option<&mut TeamState> {
        match &mut self.caps {
            Caps::TeamDeathmatch { teams }
            | Caps::CaptureTheFlag { teams, .. }
            | Caps::InstaCtf { teams, .. } => Some(teams),
            Caps::FreeForAll { .. } => None,
        }
    }

    fn flag_parts(&mut self) -> Option<(&mut FlagState, &mut TeamState)> {
        match &mut self.caps {
            Caps::CaptureTheFlag { teams, flags, .. } | Caps::InstaCtf { teams, flags } => {
                Some((flags, teams))
            }
            _ => None,
        }
    }

    fn items_mut(&mut self) -> Option<&mut ItemState> {
        match &mut self.caps {
            Caps::FreeForAll { items } | Caps::CaptureTheFlag { items, .. } => Some(items),
            _ => None,
        }
    }

    pub fn team_scores(&self) -> Option<Vec<i32>> {
        match &self.caps {
            Caps::TeamDeathmatch { teams }
            | Caps::CaptureTheFlag { teams, .. }
            | Caps::InstaCtf { teams, .. } => Some(teams.scores()),
            Caps::FreeForAll { .. } => None,
        }
    }

    pub fn flag_state(&self) -> Option<&FlagState> {
        match &self.caps {
            Caps::CaptureTheFlag { flags, .. } | Caps::InstaCtf { flags, .. } => Some(flags),
            _ => None,
        }
    }

    /// Mode-specific init data written into the entry handshake and the
    /// map-change broadcast.
    pub fn write_init_data(&self, scope: &mut BroadcastScope<'_>) {
        if let (Some(flags), Some(scores)) = (self.flag_state(), self.team_scores()) {
            scope.write(Message::InitFlags {
                scores,
                flags: flags.snapshot(),
            });
        }
    }

    /// New player admitted: team modes balance them onto a side.
    pub fn on_player_connected(&mut self, ctx: &mut ModeContext<'_>, pn: Pn) {
        if self.teams_mut().is_none() {
            return;
        }
        let team = teams::balanced_team(ctx.players);
        if let Some(player) = ctx.players.by_pn_mut(pn) {
            player.team = Some(team);
        }
        ctx.broadcaster.broadcast().write(Message::SetTeam {
            pn,
            team: teams::team_name(team).to_string(),
        });
    }

    pub fn on_player_disconnected(&mut self, ctx: &mut ModeContext<'_>, pn: Pn) {
        if let Some((flags, _)) = self.flag_parts() {
            flags.drop_carried(ctx.players, ctx.broadcaster, pn, ctx.now);
        }
    }

    /// Death reaction shared by suicide and combat kills.
    pub fn on_player_death(&mut self, ctx: &mut ModeContext<'_>, victim: Pn, _actor: Pn) {
        if let Some((flags, _)) = self.flag_parts() {
            flags.drop_carried(ctx.players, ctx.broadcaster, victim, ctx.now);
        }
    }

    pub fn on_player_request_spawn(&mut self, ctx: &mut ModeContext<'_>, pn: Pn) {
        let rules = self.rules();
        if let Some(player) = ctx.players.by_pn_mut(pn) {
            spawn::request_spawn(player, rules, ctx.clock, ctx.broadcaster);
        }
    }

    pub fn on_player_take_flag(
        &mut self,
        ctx: &mut ModeContext<'_>,
        pn: Pn,
        flag: FlagId,
        version: u32,
    ) {
        if let Some((flags, teams)) = self.flag_parts() {
            flags.take(teams, ctx.players, ctx.broadcaster, pn, flag, version);
        }
    }

    pub fn on_player_try_drop_flag(&mut self, ctx: &mut ModeContext<'_>, pn: Pn) {
        if let Some((flags, _)) = self.flag_parts() {
            flags.drop_carried(ctx.players, ctx.broadcaster, pn, ctx.now);
        }
    }

    /// Move a player between teams; a carried flag drops first.
    pub fn on_player_try_set_team(
        &mut self,
        ctx: &mut ModeContext<'_>,
        _actor: Pn,
        target: Pn,
        team_name: &str,
    ) {
        if self.teams_mut().is_none() {
            return;
        }
        let Some(team) = teams::team_by_name(team_name) else {
            return;
        };
        if let Some((flags, _)) = self.flag_parts() {
            flags.drop_carried(ctx.players, ctx.broadcaster, target, ctx.now);
        }
        let Some(player) = ctx.players.by_pn_mut(target) else {
            return;
        };
        if player.team == Some(team) {
            return;
        }
        player.team = Some(team);
        ctx.broadcaster.broadcast().write(Message::SetTeam {
            pn: target,
            team: teams::team_name(team).to_string(),
        });
    }

    pub fn on_player_taunt(&mut self, ctx: &mut ModeContext<'_>, pn: Pn) {
        if let Some(player) = ctx.players.by_pn_mut(pn) {
            player.state.queue(Message::Taunt);
        }
    }

    pub fn on_player_shoot(
        &mut self,
        ctx: &mut ModeContext<'_>,
        pn: Pn,
        shot_id: i32,
        gun: i32,
        from: Position,
        to: Position,
        hits: &[HitInfo],
    ) {
        let Some(shooter) = ctx.players.by_pn_mut(pn) else {
            return;
        };
        if !shooter.state.is_alive() {
            return;
        }
        shooter.state.queue(Message::ShotFx {
            pn,
            shot_id,
            gun,
            from,
            to,
        });
        let damage = self.gun_damage(gun);
        for hit in hits {
            self.apply_hit(ctx, pn, *hit, damage);
        }
    }

    pub fn on_player_explode(
        &mut self,
        ctx: &mut ModeContext<'_>,
        pn: Pn,
        gun: i32,
        _explode_id: i32,
        hits: &[HitInfo],
    ) {
        let alive = ctx
            .players
            .by_pn(pn)
            .is_some_and(|p| p.state.is_alive());
        if !alive {
            return;
        }
        let damage = self.gun_damage(gun);
        for hit in hits {
            self.apply_hit(ctx, pn, *hit, damage);
        }
    }

    fn gun_damage(&self, gun: i32) -> i32 {
        if self.rules().insta {
            // Insta weapons are lethal against insta spawn values.
            return self.rules().spawn_health;
        }
        usize::try_from(gun)
            .ok()
            .and_then(|idx| GUN_DAMAGE.get(idx).copied())
            .unwrap_or(0)
    }

    /// Validate and apply one hit; a lethal hit runs the full death chain.
    fn apply_hit(&mut self, ctx: &mut ModeContext<'_>, actor: Pn, hit: HitInfo, damage: i32) {
        if damage <= 0 || actor == hit.target {
            return;
        }
        let same_team = {
            let actor_team = ctx.players.by_pn(actor).and_then(Player::effective_team);
            let target_team = ctx
                .players
                .by_pn(hit.target)
                .and_then(Player::effective_team);
            actor_team.is_some() && actor_team == target_team
        };

        let Some(target) = ctx.players.by_pn_mut(hit.target) else {
            return;
        };
        if !target.state.is_alive() || target.state.lifesequence != hit.lifesequence {
            return;
        }
        let absorbed = (target.state.armour / 2).min(damage / 2);
        target.state.armour -= absorbed;
        target.state.health = (target.state.health - (damage - absorbed)).max(0);
        let health = target.state.health;
        ctx.broadcaster.broadcast().write(Message::Damage {
            target: hit.target,
            actor,
            damage,
            health,
        });
        if health > 0 {
            return;
        }

        let victim = hit.target;
        if let Some(target) = ctx.players.by_pn_mut(victim) {
            target.state.die(ctx.clock.elapsed());
            target.deaths += 1;
        }
        let frag_delta = if same_team { -1 } else { 1 };
        let frags = ctx
            .players
            .by_pn_mut(actor)
            .map(|a| {
                a.frags += frag_delta;
                a.frags
            })
            .unwrap_or(0);
        ctx.broadcaster.player_died(victim, actor, frags);
        self.on_player_death(ctx, victim, actor);
    }

    pub fn on_player_pickup_item(&mut self, ctx: &mut ModeContext<'_>, pn: Pn, item: i32) {
        let alive = ctx.players.by_pn(pn).is_some_and(|p| p.state.is_alive());
        if !alive {
            return;
        }
        let Some(items) = self.items_mut() else {
            return;
        };
        if items.available.remove(&item) {
            ctx.broadcaster.broadcast().write(Message::ItemAcc { item, pn });
        }
    }

    /// First client item list announces the map's items when metadata
    /// didn't.
    pub fn on_client_item_list(&mut self, _ctx: &mut ModeContext<'_>, _cn: Cn, items: &[i32]) {
        let Some(state) = self.items_mut() else {
            return;
        };
        if state.announced {
            return;
        }
        state.available = items.iter().copied().collect();
        state.announced = true;
    }

    /// First client flag list lays out flags when metadata didn't.
    pub fn on_client_flag_list(&mut self, _ctx: &mut ModeContext<'_>, _cn: Cn, spawns: &[FlagSpawn]) {
        if let Some((flags, _)) = self.flag_parts() {
            flags.init_from_list(spawns);
        }
    }

    /// Base-capture modes are not part of the roster; the list is accepted
    /// and discarded.
    pub fn on_client_base_list(&mut self, _ctx: &mut ModeContext<'_>, _cn: Cn) {}

    /// Drive mode-owned timers (flag reset deadlines).
    pub fn advance(&mut self, ctx: &mut ModeContext<'_>) {
        if let Some((flags, _)) = self.flag_parts() {
            flags.advance(ctx.broadcaster, ctx.now);
        }
    }

    pub fn team_display_name(&self, team: Option<TeamId>) -> Option<String> {
        match &self.caps {
            Caps::FreeForAll { .. } => None,
            _ => team.map(|t| teams::team_name(t).to_string()),
        }
    }
}
