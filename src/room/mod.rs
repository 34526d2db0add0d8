//! The room engine: one concurrent game session.
//!
//! A room owns its clients, players, game clock, gamemode instance and the
//! per-tick broadcaster. All mutation happens on the room's own task; the
//! scheduling layer drives `advance` and `flush` once per tick and feeds
//! decoded client events in between. Everything the room needs from the
//! outside world (map metadata, permission resolution, the map rotation)
//! arrives through [`RoomContext`] at construction.

pub mod broadcaster;
pub mod client_events;
pub mod collections;
pub mod error;
pub mod player_events;

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use broadcaster::{Broadcaster, Transport};
use collections::{ClientCollection, PlayerCollection};
pub use error::RoomError;

use crate::gamemode::{Gamemode, GamemodeKind, MapMetaData, ModeContext};
use crate::player::{Client, Player};
use crate::protocol::{
    mastermodes, Cn, MasterEntry, Message, PermissionResolver, Privilege, SpawnInfo,
};
use crate::timing::{ClockEvent, ClockEvents, GameClock};

/// Everything a room is handed at construction instead of reaching for
/// globals: external accessors, policy knobs and the map rotation.
pub struct RoomContext {
    /// Server description shown in the entry handshake.
    pub description: String,
    /// Auth domain advertised in the entry handshake.
    pub domain: String,
    /// Static per-map layout data, keyed by map name. Missing maps are valid;
    /// modes then run with an empty layout until clients announce one.
    pub map_meta: HashMap<String, MapMetaData>,
    /// External permission policy consulted before privileged operations.
    pub permissions: Box<dyn PermissionResolver>,
    /// Map/mode rotation, advanced when a round's intermission ends.
    pub rotation: Vec<(String, GamemodeKind)>,
    /// Also rotate when a client enters an empty room, so returning players
    /// get a fresh round instead of a stale clock.
    pub rotate_on_first_player: bool,
    /// Countdown announced before the clock resumes; `None` resumes
    /// immediately.
    pub resume_delay: Option<u32>,
    pub intermission_len: Duration,
}

/// Identity of a connection being admitted, resolved by the connect layer
/// before room entry.
#[derive(Debug, Clone)]
pub struct RoomEntryContext {
    pub cn: Cn,
    pub name: String,
    pub playermodel: i32,
    pub privilege: Privilege,
}

pub struct Room {
    name: String,
    ctx: RoomContext,
    clock: GameClock,
    clients: ClientCollection,
    players: PlayerCollection,
    broadcaster: Broadcaster,
    gamemode: Gamemode,
    map_name: String,
    mastermode: i32,
    rotation_index: usize,
    /// Room-monotonic time, advanced by the tick loop. Mode-owned deadlines
    /// (flag resets) are armed against this, so they keep running while the
    /// game clock is paused.
    now: Duration,
    /// Set once a map/mode pair has been activated; the first entering
    /// client triggers the initial rotation.
    map_set: bool,
    decommissioned: bool,
}

impl Room {
    pub fn new(name: String, ctx: RoomContext) -> Self {
        Self {
            name,
            ctx,
            clock: GameClock::new(),
            clients: ClientCollection::default(),
            players: PlayerCollection::default(),
            broadcaster: Broadcaster::default(),
            gamemode: Gamemode::new(GamemodeKind::FreeForAll, None),
            map_name: String::new(),
            mastermode: mastermodes::MM_OPEN,
            rotation_index: 0,
            now: Duration::ZERO,
            map_set: false,
            decommissioned: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn gamemode(&self) -> &Gamemode {
        &self.gamemode
    }

    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    pub fn clients(&self) -> &ClientCollection {
        &self.clients
    }

    pub fn players(&self) -> &PlayerCollection {
        &self.players
    }

    pub fn mastermode(&self) -> i32 {
        self.mastermode
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_decommissioned(&self) -> bool {
        self.decommissioned
    }

    /// Mark the room closed. Events arriving after this are dropped; the
    /// scheduling layer tears the task down after a final flush.
    pub fn decommission(&mut self) {
        self.decommissioned = true;
        self.clock.stop();
        info!(room = %self.name, "room decommissioned");
    }

    /// Run a gamemode handler against the room's mutable state.
    fn with_mode<R>(&mut self, f: impl FnOnce(&mut Gamemode, &mut ModeContext<'_>) -> R) -> R {
        let mut ctx = ModeContext {
            players: &mut self.players,
            broadcaster: &mut self.broadcaster,
            clock: &self.clock,
            now: self.now,
        };
        f(&mut self.gamemode, &mut ctx)
    }

    fn masters(&self) -> Vec<MasterEntry> {
        self.clients
            .iter()
            .filter(|c| c.privilege > Privilege::None)
            .map(|c| MasterEntry {
                cn: c.cn,
                privilege: c.privilege,
            })
            .collect()
    }

    /// Admit a connection. Sends the entry handshake to the newcomer,
    /// announces them to the rest of the room and hands them to the gamemode.
    /// Re-admitting a present `cn` is ignored.
    pub fn client_enter(&mut self, entry: RoomEntryContext) {
        if self.decommissioned {
            debug!(room = %self.name, cn = entry.cn, "entry into decommissioned room dropped");
            return;
        }
        if self.clients.contains(entry.cn) {
            warn!(room = %self.name, cn = entry.cn, "duplicate room entry ignored");
            return;
        }
        if !self.map_set || (self.ctx.rotate_on_first_player && self.players.is_empty()) {
            self.rotate_map_mode();
        }

        let cn = entry.cn;
        let pn = cn;
        // Broadcasts queued before admission (the initial rotation included)
        // are not for the newcomer; their view starts with the handshake.
        self.broadcaster.exclude_from_pending(cn);
        let mut client = Client::new(cn, entry.privilege);
        client.player_nums.push(pn);
        self.clients.add(client);
        self.players
            .add(Player::new(pn, cn, entry.name, entry.playermodel));
        info!(room = %self.name, cn, name = %self.players.by_pn(pn).map(|p| p.name.as_str()).unwrap_or(""), "client entered");

        // Team assignment happens before the handshake so the roster the
        // newcomer receives already carries their side.
        self.with_mode(|mode, ctx| mode.on_player_connected(ctx, pn));

        let rules = self.gamemode.rules();
        let masters = self.masters();
        let resume: Vec<SpawnInfo> = self
            .players
            .iter()
            .filter(|p| p.pn != pn)
            .map(|p| p.state.spawn_info())
            .collect();
        let roster: Vec<Message> = self
            .players
            .iter()
            .filter(|p| p.pn != pn)
            .map(|p| Message::InitClient(p.client_init(self.gamemode.team_display_name(p.effective_team()))))
            .collect();
        {
            let mut scope = self.broadcaster.unicast(cn);
            scope.write(Message::Welcome);
            scope.write(Message::ServerInfo {
                description: self.ctx.description.clone(),
                haspwd: false,
                domain: self.ctx.domain.clone(),
            });
            scope.write(Message::CurrentMaster {
                mastermode: self.mastermode,
                masters,
            });
            scope.write(Message::MapChange {
                map_name: self.map_name.clone(),
                mode_num: rules.mode_num,
                hasitems: rules.has_items,
            });
            if let Some(seconds) = self.clock.timeleft_seconds() {
                scope.write(Message::TimeUp { seconds });
            }
            if self.clock.is_paused() {
                scope.write(Message::PauseGame { paused: true });
            }
            self.gamemode.write_init_data(&mut scope);
            scope.write(Message::Resume { players: resume });
            for init in roster {
                scope.write(init);
            }
        }

        if let Some(player) = self.players.by_pn(pn) {
            let team_name = self.gamemode.team_display_name(player.effective_team());
            self.broadcaster.client_connected(player, team_name);
        }

        // An eligible newcomer gets their spawn state right away.
        self.with_mode(|mode, ctx| mode.on_player_request_spawn(ctx, pn));
    }

    /// Remove a connection and every player it controls. Already-departed
    /// connections are ignored.
    pub fn client_leave(&mut self, cn: Cn) {
        let Some(client) = self.clients.remove(cn) else {
            return;
        };
        for pn in client.player_nums {
            self.with_mode(|mode, ctx| mode.on_player_disconnected(ctx, pn));
            self.players.remove(pn);
        }
        self.broadcaster.player_disconnected(cn);
        info!(room = %self.name, cn, "client left");
    }

    /// Activate a map/mode pair: one announcement broadcast, a fresh gamemode
    /// instance, a restarted clock and a fresh spawn for every non-spectator.
    pub fn change_map_mode(&mut self, map_name: &str, kind: GamemodeKind) {
        self.map_set = true;
        self.map_name = map_name.to_string();
        let meta = self.ctx.map_meta.get(map_name);
        self.gamemode = Gamemode::new(kind, meta);
        let rules = self.gamemode.rules();
        info!(room = %self.name, map = map_name, mode = rules.name, "map/mode change");

        {
            let mut scope = self.broadcaster.broadcast();
            scope.write(Message::MapChange {
                map_name: self.map_name.clone(),
                mode_num: rules.mode_num,
                hasitems: rules.has_items,
            });
            self.gamemode.write_init_data(&mut scope);
        }

        let events = if rules.timed {
            self.clock.start(
                Duration::from_secs(rules.timeout_secs),
                self.ctx.intermission_len,
            )
        } else {
            self.clock.start_untimed()
        };
        self.apply_clock_events(events);
        let events = self.clock.resume(self.ctx.resume_delay);
        self.apply_clock_events(events);

        let pns: Vec<_> = self.players.pns().collect();
        for pn in pns {
            if let Some(player) = self.players.by_pn_mut(pn) {
                player.frags = 0;
                player.deaths = 0;
                player.state.reset();
                if player.state.is_spectator() {
                    continue;
                }
            }
            if self.gamemode.rules().has_teams {
                let unteamed = self
                    .players
                    .by_pn(pn)
                    .is_some_and(|p| p.effective_team().is_none());
                if unteamed {
                    self.with_mode(|mode, ctx| mode.on_player_connected(ctx, pn));
                }
            }
            self.with_mode(|mode, ctx| mode.on_player_request_spawn(ctx, pn));
        }
    }

    /// Advance to the next rotation entry.
    pub fn rotate_map_mode(&mut self) {
        let (map_name, kind) = self
            .ctx
            .rotation
            .get(self.rotation_index % self.ctx.rotation.len().max(1))
            .cloned()
            .unwrap_or_else(|| ("complex".to_string(), GamemodeKind::FreeForAll));
        self.rotation_index += 1;
        self.change_map_mode(&map_name, kind);
    }

    pub fn pause_game(&mut self) {
        let events = self.clock.pause();
        self.apply_clock_events(events);
    }

    pub fn resume_game(&mut self) {
        let events = self.clock.resume(self.ctx.resume_delay);
        self.apply_clock_events(events);
    }

    pub fn set_time_left(&mut self, seconds: u32) {
        let events = self.clock.set_time_left(seconds);
        self.apply_clock_events(events);
    }

    /// One scheduling tick: advance room time and the game clock, dispatch
    /// whatever the clock crossed, then drive mode-owned timers.
    pub fn advance(&mut self, dt: Duration) {
        if self.decommissioned {
            return;
        }
        self.now += dt;
        let events = self.clock.advance(dt);
        self.apply_clock_events(events);
        self.with_mode(|mode, ctx| mode.advance(ctx));
    }

    /// Unicast server text to one client; the host layer uses this for
    /// denial notices.
    pub fn server_message_to(&mut self, cn: Cn, text: String) {
        self.broadcaster
            .unicast(cn)
            .write(Message::ServerText { text });
    }

    /// Hand everything accumulated this tick to the transport, exactly once.
    pub fn flush(&mut self, transport: &mut dyn Transport) {
        self.broadcaster
            .flush(&self.clients, &mut self.players, transport);
    }

    fn apply_clock_events(&mut self, events: ClockEvents) {
        for event in events {
            match event {
                ClockEvent::Resumed => {
                    self.broadcaster.resume();
                    if !self.gamemode.is_initialized() {
                        self.gamemode.initialize();
                    }
                }
                ClockEvent::Paused => self.broadcaster.pause(),
                ClockEvent::CountdownTick { seconds } => {
                    self.broadcaster
                        .server_message(format!("Resuming in {seconds} seconds..."));
                }
                ClockEvent::TimeLeftChanged { seconds } => self.broadcaster.time_left(seconds),
                ClockEvent::IntermissionStarted => {
                    self.broadcaster.intermission();
                    self.broadcaster
                        .server_message("Intermission has started.".to_string());
                    debug!(room = %self.name, "intermission started");
                }
                ClockEvent::IntermissionEnded => {
                    self.broadcaster
                        .server_message("Intermission has ended.".to_string());
                    self.rotate_map_mode();
                }
            }
        }
    }
}
