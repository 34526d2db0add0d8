//! Typed wire-facing protocol messages.
//!
//! The room engine never performs per-opcode binary encoding; it emits these
//! typed payloads and the transport layer owns the byte-level codec. Serde
//! field names follow the original protocol's decoded message dictionaries
//! (`map_name`, `hasitems`, `mode_num`, ...) so a JSON-framed transport is
//! byte-compatible with the reference decoder.

use serde::{Deserialize, Serialize};

use super::types::{ArmourType, Cn, FlagId, Pn, Position, Privilege, TeamId, NUM_GUNS};

/// Spawn-state payload shared by `SpawnState` and `Resume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnInfo {
    pub lifesequence: i32,
    pub health: i32,
    pub maxhealth: i32,
    pub armour: i32,
    pub armourtype: ArmourType,
    pub gunselect: i32,
    pub ammo: [i32; NUM_GUNS],
}

/// Roster entry written during the entry handshake and on join broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInit {
    pub pn: Pn,
    pub name: String,
    pub playermodel: i32,
    pub team: Option<String>,
}

/// One elevated client in a `CurrentMaster` broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterEntry {
    pub cn: Cn,
    pub privilege: Privilege,
}

/// Per-flag snapshot written by flag-capable gamemode init data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagInit {
    pub team: TeamId,
    pub version: u32,
    pub carrier: Option<Pn>,
    pub dropped: Option<Position>,
}

/// A decoded outbound protocol message.
///
/// Serialized internally tagged so each message flattens to the original
/// protocol's field dictionary plus a `type` discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Welcome,
    ServerInfo {
        description: String,
        haspwd: bool,
        domain: String,
    },
    CurrentMaster {
        mastermode: i32,
        masters: Vec<MasterEntry>,
    },
    MapChange {
        map_name: String,
        mode_num: i32,
        hasitems: bool,
    },
    TimeUp {
        seconds: u32,
    },
    PauseGame {
        paused: bool,
    },
    ServerText {
        text: String,
    },
    InitClient(ClientInit),
    Resume {
        players: Vec<SpawnInfo>,
    },
    SpawnState {
        pn: Pn,
        #[serde(flatten)]
        spawn: SpawnInfo,
    },
    Spawn {
        pn: Pn,
        lifesequence: i32,
        gunselect: i32,
    },
    Died {
        victim: Pn,
        actor: Pn,
        frags: i32,
    },
    Damage {
        target: Pn,
        actor: Pn,
        damage: i32,
        health: i32,
    },
    ShotFx {
        pn: Pn,
        shot_id: i32,
        gun: i32,
        from: Position,
        to: Position,
    },
    GunSelect {
        gun: i32,
    },
    SwitchModel {
        playermodel: i32,
    },
    SwitchName {
        name: String,
    },
    SetTeam {
        pn: Pn,
        team: String,
    },
    Taunt,
    Sound {
        sound: i32,
    },
    Text {
        text: String,
    },
    TeamChat {
        cn: Cn,
        text: String,
    },
    EditMode {
        on: bool,
    },
    /// Coalesced per-player message buffer, fanned out once per tick.
    ClientData {
        cn: Cn,
        messages: Vec<Message>,
    },
    Pos {
        pn: Pn,
        position: Position,
    },
    Teleport {
        pn: Pn,
        teleport: i32,
        teledest: i32,
    },
    JumpPad {
        pn: Pn,
        jumppad: i32,
    },
    ClientDisconnected {
        cn: Cn,
    },
    InitFlags {
        scores: Vec<i32>,
        flags: Vec<FlagInit>,
    },
    TakeFlag {
        pn: Pn,
        flag: FlagId,
        version: u32,
    },
    DropFlag {
        pn: Pn,
        flag: FlagId,
        version: u32,
        position: Position,
    },
    ReturnFlag {
        pn: Pn,
        flag: FlagId,
        version: u32,
    },
    ScoreFlag {
        pn: Pn,
        flag: FlagId,
        team: TeamId,
        score: i32,
    },
    ResetFlag {
        flag: FlagId,
        version: u32,
    },
    ItemList {
        items: Vec<i32>,
    },
    ItemAcc {
        item: i32,
        pn: Pn,
    },
}

impl Message {
    /// Discriminant name as it appears on the wire, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::ServerInfo { .. } => "server_info",
            Self::CurrentMaster { .. } => "current_master",
            Self::MapChange { .. } => "map_change",
            Self::TimeUp { .. } => "time_up",
            Self::PauseGame { .. } => "pause_game",
            Self::ServerText { .. } => "server_text",
            Self::InitClient(_) => "init_client",
            Self::Resume { .. } => "resume",
            Self::SpawnState { .. } => "spawn_state",
            Self::Spawn { .. } => "spawn",
            Self::Died { .. } => "died",
            Self::Damage { .. } => "damage",
            Self::ShotFx { .. } => "shot_fx",
            Self::GunSelect { .. } => "gun_select",
            Self::SwitchModel { .. } => "switch_model",
            Self::SwitchName { .. } => "switch_name",
            Self::SetTeam { .. } => "set_team",
            Self::Taunt => "taunt",
            Self::Sound { .. } => "sound",
            Self::Text { .. } => "text",
            Self::TeamChat { .. } => "team_chat",
            Self::EditMode { .. } => "edit_mode",
            Self::ClientData { .. } => "client_data",
            Self::Pos { .. } => "pos",
            Self::Teleport { .. } => "teleport",
            Self::JumpPad { .. } => "jump_pad",
            Self::ClientDisconnected { .. } => "client_disconnected",
            Self::InitFlags { .. } => "init_flags",
            Self::TakeFlag { .. } => "take_flag",
            Self::DropFlag { .. } => "drop_flag",
            Self::ReturnFlag { .. } => "return_flag",
            Self::ScoreFlag { .. } => "score_flag",
            Self::ResetFlag { .. } => "reset_flag",
            Self::ItemList { .. } => "item_list",
            Self::ItemAcc { .. } => "item_acc",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_change_serializes_with_protocol_field_names() {
        let msg = Message::MapChange {
            map_name: "dust2".to_string(),
            mode_num: 12,
            hasitems: false,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "map_change");
        assert_eq!(value["map_name"], "dust2");
        assert_eq!(value["mode_num"], 12);
        assert_eq!(value["hasitems"], false);
    }

    #[test]
    fn spawn_state_flattens_spawn_info() {
        let msg = Message::SpawnState {
            pn: 3,
            spawn: SpawnInfo {
                lifesequence: 1,
                health: 100,
                maxhealth: 100,
                armour: 25,
                armourtype: ArmourType::Blue,
                gunselect: 6,
                ammo: [1, 0, 0, 0, 0, 1, 40],
            },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "spawn_state");
        assert_eq!(value["pn"], 3);
        assert_eq!(value["health"], 100);
        assert_eq!(value["gunselect"], 6);
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let msg = Message::ResetFlag { flag: 0, version: 4 };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.kind());
    }
}
