//! Host layer: one tokio task per room.
//!
//! Each room task owns its `Room` outright; the rest of the process talks to
//! it through an mpsc channel of [`RoomEvent`]s. The task interleaves event
//! dispatch with a fixed-interval scheduling tick that advances the clock and
//! flushes the broadcaster, so every tick hands the transport at most one
//! batch per channel regardless of how many events arrived in between.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::gamemode::{FlagSpawn, GamemodeKind, HitInfo, MapMetaData};
use crate::protocol::{Cn, FlagId, Pn, Position, PrivilegeThreshold};
use crate::room::broadcaster::{Delivery, Transport};
use crate::room::{Room, RoomContext, RoomEntryContext};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection-level events, dispatched with the sender's `cn`.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    SetMasterMode(i32),
    SetTeam { target: Pn, team: String },
    SetSpectator { target: Pn, spectating: bool },
    PauseGame(bool),
    ItemList(Vec<i32>),
    FlagList(Vec<FlagSpawn>),
    BaseList,
}

/// Player-level events, dispatched with the acting `pn`.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    SwitchName(String),
    SwitchModel(i32),
    SwitchTeam(String),
    GameChat(String),
    TeamChat(String),
    GunSelect(i32),
    Sound(i32),
    Taunt,
    Position(Position),
    Teleport { teleport: i32, teledest: i32 },
    JumpPad(i32),
    Suicide,
    Shoot { shot_id: i32, gun: i32, from: Position, to: Position, hits: Vec<HitInfo> },
    Explode { gun: i32, explode_id: i32, hits: Vec<HitInfo> },
    RequestSpawn,
    Spawn { lifesequence: i32, gunselect: i32 },
    PickupItem(i32),
    ReplenishAmmo,
    TakeFlag { flag: FlagId, version: u32 },
    TryDropFlag,
    EditMode(bool),
}

/// Everything a room task consumes.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    ClientEnter(RoomEntryContext),
    ClientLeave(Cn),
    Client { cn: Cn, event: ClientEvent },
    Player { pn: Pn, event: PlayerEvent },
    Decommission,
}

/// Sending half of one room's event channel.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    name: String,
    events: mpsc::Sender<RoomEvent>,
}

impl RoomHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue an event for the room. Returns false once the room is gone.
    pub async fn send(&self, event: RoomEvent) -> bool {
        if self.events.send(event).await.is_err() {
            debug!(room = %self.name, "event for closed room dropped");
            return false;
        }
        true
    }
}

/// Transport that renders each delivery as one JSON line through tracing.
/// Stands in until a wire transport is attached; also convenient when
/// diagnosing broadcast batching.
#[derive(Debug, Default)]
pub struct TraceTransport;

impl Transport for TraceTransport {
    fn deliver(&mut self, delivery: Delivery) {
        let payload = serde_json::to_string(&delivery.messages).unwrap_or_default();
        debug!(
            recipients = ?delivery.recipients.as_slice(),
            channel = delivery.channel,
            reliable = delivery.reliable,
            %payload,
            "delivery"
        );
    }
}

/// The running server: one spawned task per configured room.
pub struct ArenaServer {
    rooms: HashMap<String, RoomHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl ArenaServer {
    /// Build rooms from config and spawn their tasks. The factory supplies
    /// each room's transport.
    pub fn start<F>(cfg: &Config, mut transport_factory: F) -> Self
    where
        F: FnMut(&str) -> Box<dyn Transport>,
    {
        let tick = Duration::from_millis(cfg.server.tick_ms);
        let mut rooms = HashMap::new();
        let mut tasks = Vec::new();

        for room_cfg in &cfg.server.rooms {
            let room = Room::new(room_cfg.name.clone(), room_context(cfg, &room_cfg.rotation));
            let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let transport = transport_factory(&room_cfg.name);
            let name = room_cfg.name.clone();
            tasks.push(tokio::spawn(run_room(room, rx, transport, tick)));
            rooms.insert(name.clone(), RoomHandle { name, events: tx });
            info!(room = %room_cfg.name, "room task started");
        }

        Self { rooms, tasks }
    }

    pub fn room(&self, name: &str) -> Option<&RoomHandle> {
        self.rooms.get(name)
    }

    pub fn room_names(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }

    /// Decommission every room and wait for the tasks to drain.
    pub async fn shutdown(self) {
        for handle in self.rooms.values() {
            handle.send(RoomEvent::Decommission).await;
        }
        drop(self.rooms);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(%err, "room task ended abnormally");
            }
        }
        info!("all rooms drained");
    }
}

fn room_context(cfg: &Config, rotation: &[crate::config::RotationEntry]) -> RoomContext {
    let map_meta = cfg
        .maps
        .iter()
        .map(|(name, map)| {
            (
                name.clone(),
                MapMetaData {
                    flag_spawns: map
                        .flags
                        .iter()
                        .map(|f| FlagSpawn {
                            team: f.team,
                            position: Position::new(f.x, f.y, f.z),
                        })
                        .collect(),
                    items: map.items.clone(),
                },
            )
        })
        .collect();
    let rotation = rotation
        .iter()
        .filter_map(|entry| {
            GamemodeKind::from_name(&entry.mode).map(|kind| (entry.map_name.clone(), kind))
        })
        .collect();
    RoomContext {
        description: cfg.description.clone(),
        domain: cfg.domain.clone(),
        map_meta,
        permissions: Box::new(PrivilegeThreshold),
        rotation,
        rotate_on_first_player: cfg.server.rotate_on_first_player,
        resume_delay: cfg.server.resume_delay_secs,
        intermission_len: Duration::from_secs(cfg.server.intermission_secs),
    }
}

/// The per-room task body.
async fn run_room(
    mut room: Room,
    mut events: mpsc::Receiver<RoomEvent>,
    mut transport: Box<dyn Transport>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                room.advance(now - last);
                last = now;
                room.flush(transport.as_mut());
                if room.is_decommissioned() {
                    break;
                }
            }
            event = events.recv() => {
                match event {
                    Some(event) => dispatch(&mut room, event),
                    None => {
                        room.decommission();
                        room.flush(transport.as_mut());
                        break;
                    }
                }
            }
        }
    }
}

fn dispatch(room: &mut Room, event: RoomEvent) {
    match event {
        RoomEvent::ClientEnter(entry) => room.client_enter(entry),
        RoomEvent::ClientLeave(cn) => room.client_leave(cn),
        RoomEvent::Decommission => room.decommission(),
        RoomEvent::Client { cn, event } => dispatch_client(room, cn, event),
        RoomEvent::Player { pn, event } => dispatch_player(room, pn, event),
    }
}

/// Failed client operations come back to the caller alone as server text;
/// nobody else sees anything.
fn dispatch_client(room: &mut Room, cn: Cn, event: ClientEvent) {
    let result = match event {
        ClientEvent::SetMasterMode(mastermode) => room.on_client_set_master_mode(cn, mastermode),
        ClientEvent::SetTeam { target, team } => room.on_client_set_team(cn, target, &team),
        ClientEvent::SetSpectator { target, spectating } => {
            room.on_client_set_spectator(cn, target, spectating)
        }
        ClientEvent::PauseGame(pause) => room.on_client_pause_game(cn, pause),
        ClientEvent::ItemList(items) => {
            room.on_client_item_list(cn, &items);
            Ok(())
        }
        ClientEvent::FlagList(spawns) => {
            room.on_client_flag_list(cn, &spawns);
            Ok(())
        }
        ClientEvent::BaseList => {
            room.on_client_base_list(cn);
            Ok(())
        }
    };
    if let Err(err) = result {
        room.server_message_to(cn, err.to_string());
    }
}

fn dispatch_player(room: &mut Room, pn: Pn, event: PlayerEvent) {
    match event {
        PlayerEvent::SwitchName(name) => room.on_player_switch_name(pn, &name),
        PlayerEvent::SwitchModel(playermodel) => room.on_player_switch_model(pn, playermodel),
        PlayerEvent::SwitchTeam(team) => room.on_player_switch_team(pn, &team),
        PlayerEvent::GameChat(text) => room.on_player_game_chat(pn, &text),
        PlayerEvent::TeamChat(text) => room.on_player_team_chat(pn, &text),
        PlayerEvent::GunSelect(gun) => room.on_player_gunselect(pn, gun),
        PlayerEvent::Sound(sound) => room.on_player_sound(pn, sound),
        PlayerEvent::Taunt => room.on_player_taunt(pn),
        PlayerEvent::Position(position) => room.on_player_position(pn, position),
        PlayerEvent::Teleport { teleport, teledest } => {
            room.on_player_teleport(pn, teleport, teledest)
        }
        PlayerEvent::JumpPad(jumppad) => room.on_player_jumppad(pn, jumppad),
        PlayerEvent::Suicide => room.on_player_suicide(pn),
        PlayerEvent::Shoot { shot_id, gun, from, to, hits } => {
            room.on_player_shoot(pn, shot_id, gun, from, to, &hits)
        }
        PlayerEvent::Explode { gun, explode_id, hits } => {
            room.on_player_explode(pn, gun, explode_id, &hits)
        }
        PlayerEvent::RequestSpawn => room.on_player_request_spawn(pn),
        PlayerEvent::Spawn { lifesequence, gunselect } => {
            room.on_player_spawn(pn, lifesequence, gunselect)
        }
        PlayerEvent::PickupItem(item) => room.on_player_pickup_item(pn, item),
        PlayerEvent::ReplenishAmmo => room.on_player_replenish_ammo(pn),
        PlayerEvent::TakeFlag { flag, version } => room.on_player_take_flag(pn, flag, version),
        PlayerEvent::TryDropFlag => room.on_player_try_drop_flag(pn),
        PlayerEvent::EditMode(on) => room.on_player_edit_mode(pn, on),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::protocol::{Message, Privilege};

    #[derive(Debug, Default)]
    struct SharedTransport(Arc<Mutex<Vec<Delivery>>>);

    impl Transport for SharedTransport {
        fn deliver(&mut self, delivery: Delivery) {
            self.0.lock().unwrap().push(delivery);
        }
    }

    fn test_config() -> Config {
        let mut cfg = Config::default();
        cfg.server.tick_ms = 5;
        cfg.server.resume_delay_secs = None;
        cfg
    }

    #[tokio::test]
    async fn room_task_handshakes_and_drains_on_shutdown() {
        let cfg = test_config();
        let deliveries: Arc<Mutex<Vec<Delivery>>> = Arc::default();
        let sink = deliveries.clone();
        let server = ArenaServer::start(&cfg, move |_| Box::new(SharedTransport(sink.clone())));

        let handle = server.room("main").unwrap().clone();
        assert!(
            handle
                .send(RoomEvent::ClientEnter(RoomEntryContext {
                    cn: 0,
                    name: "ace".into(),
                    playermodel: 0,
                    privilege: Privilege::None,
                }))
                .await
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.shutdown().await;

        let recorded = deliveries.lock().unwrap();
        let kinds: Vec<&'static str> = recorded
            .iter()
            .flat_map(|d| d.messages.iter())
            .map(Message::kind)
            .collect();
        assert!(kinds.contains(&"welcome"));
        assert!(kinds.contains(&"map_change"));
    }

    #[tokio::test]
    async fn denied_operation_answers_only_the_caller() {
        let cfg = test_config();
        let deliveries: Arc<Mutex<Vec<Delivery>>> = Arc::default();
        let sink = deliveries.clone();
        let server = ArenaServer::start(&cfg, move |_| Box::new(SharedTransport(sink.clone())));

        let handle = server.room("main").unwrap().clone();
        for cn in [0, 1] {
            handle
                .send(RoomEvent::ClientEnter(RoomEntryContext {
                    cn,
                    name: format!("p{cn}"),
                    playermodel: 0,
                    privilege: Privilege::None,
                }))
                .await;
        }
        handle
            .send(RoomEvent::Client {
                cn: 0,
                event: ClientEvent::PauseGame(true),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.shutdown().await;

        let recorded = deliveries.lock().unwrap();
        let denials: Vec<_> = recorded
            .iter()
            .filter(|d| {
                d.messages
                    .iter()
                    .any(|m| matches!(m, Message::ServerText { .. }))
            })
            .collect();
        assert!(!denials.is_empty());
        for delivery in denials {
            assert_eq!(delivery.recipients.as_slice(), &[0]);
        }
    }
}
