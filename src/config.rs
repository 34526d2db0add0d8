//! Configuration loading.
//!
//! Everything is JSON with compiled-in defaults. Sources, highest precedence
//! first: `ARENA_CONFIG_JSON` (inline JSON), the file named by
//! `ARENA_CONFIG_PATH`, `config.json` in the working directory, defaults.
//! Errors while reading or parsing a source are printed to stderr and that
//! source is skipped; `load()` always returns a usable `Config`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gamemode::GamemodeKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server description sent in the entry handshake.
    #[serde(default = "default_description")]
    pub description: String,
    /// Auth domain advertised in the entry handshake.
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Static per-map layout data, keyed by map name.
    #[serde(default)]
    pub maps: HashMap<String, MapConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            description: default_description(),
            domain: String::new(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            maps: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Tracing level directive; falls back to `RUST_LOG`, then "info".
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Scheduling tick interval in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Countdown announced before the game clock resumes.
    #[serde(default = "default_resume_delay_secs")]
    pub resume_delay_secs: Option<u32>,
    #[serde(default = "default_intermission_secs")]
    pub intermission_secs: u64,
    /// Rotate to a fresh map when a client enters an empty room.
    #[serde(default)]
    pub rotate_on_first_player: bool,
    #[serde(default = "default_rooms")]
    pub rooms: Vec<RoomConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            resume_delay_secs: default_resume_delay_secs(),
            intermission_secs: default_intermission_secs(),
            rotate_on_first_player: false,
            rooms: default_rooms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    #[serde(default = "default_rotation")]
    pub rotation: Vec<RotationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationEntry {
    pub map_name: String,
    /// Mode name: "ffa", "teamplay", "ctf" or "instactf".
    pub mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default)]
    pub flags: Vec<FlagSpawnConfig>,
    #[serde(default)]
    pub items: Vec<i32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FlagSpawnConfig {
    pub team: u8,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

fn default_description() -> String {
    "arena server".to_string()
}

fn default_tick_ms() -> u64 {
    33
}

fn default_resume_delay_secs() -> Option<u32> {
    Some(3)
}

fn default_intermission_secs() -> u64 {
    10
}

fn default_rotation() -> Vec<RotationEntry> {
    vec![RotationEntry {
        map_name: "complex".to_string(),
        mode: "ffa".to_string(),
    }]
}

fn default_rooms() -> Vec<RoomConfig> {
    vec![RoomConfig {
        name: "main".to_string(),
        rotation: default_rotation(),
    }]
}

#[must_use]
pub fn load() -> Config {
    use std::env;

    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    merge_file_source(&mut merged, Path::new("config.json"));

    if let Ok(path) = env::var("ARENA_CONFIG_PATH") {
        merge_file_source(&mut merged, Path::new(&path));
    }

    if let Ok(json) = env::var("ARENA_CONFIG_JSON") {
        if !json.trim().is_empty() {
            match serde_json::from_str(&json) {
                Ok(value) => merge_values(&mut merged, value),
                Err(err) => eprintln!("Failed to parse ARENA_CONFIG_JSON: {err}"),
            }
        }
    }

    match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    }
}

fn merge_file_source(merged: &mut Value, path: &Path) {
    if !path.exists() {
        return;
    }
    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(value) => merge_values(merged, value),
            Err(err) => eprintln!("Failed to parse {}: {err}", path.display()),
        },
        Err(err) => eprintln!("Failed to read {}: {err}", path.display()),
    }
}

/// Recursive merge; objects merge key-by-key, everything else overwrites.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value,
    }
}

/// Reject configurations the server cannot run with. `load()` does not call
/// this; startup does and propagates the error.
pub fn validate(cfg: &Config) -> Result<(), String> {
    if cfg.server.tick_ms == 0 {
        return Err("server.tick_ms must be nonzero".to_string());
    }
    if cfg.server.rooms.is_empty() {
        return Err("server.rooms must name at least one room".to_string());
    }
    for room in &cfg.server.rooms {
        if room.rotation.is_empty() {
            return Err(format!("room '{}' has an empty rotation", room.name));
        }
        for entry in &room.rotation {
            if GamemodeKind::from_name(&entry.mode).is_none() {
                return Err(format!(
                    "room '{}' rotation names unknown mode '{}'",
                    room.name, entry.mode
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(validate(&Config::default()), Ok(()));
    }

    #[test]
    fn unknown_mode_in_rotation_is_rejected() {
        let mut cfg = Config::default();
        cfg.server.rooms[0].rotation[0].mode = "bases".to_string();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn overlay_merges_nested_objects() {
        let mut base = serde_json::to_value(Config::default()).unwrap();
        let overlay = serde_json::json!({
            "server": { "tick_ms": 50 },
            "maps": { "dust2": { "items": [1, 2] } }
        });
        merge_values(&mut base, overlay);
        let cfg: Config = serde_json::from_value(base).unwrap();
        assert_eq!(cfg.server.tick_ms, 50);
        assert_eq!(cfg.server.intermission_secs, 10);
        assert_eq!(cfg.maps["dust2"].items, vec![1, 2]);
    }
}
