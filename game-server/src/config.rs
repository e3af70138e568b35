//! Process-wide configuration (spec §4.8 **[EXPANDED]**). Mirrors the
//! teacher's `GameConfig.json`-loaded `AppState.configs` map: a flat,
//! reloadable JSON file whose fields are all optional, with code defaults
//! equal to spec §6's normative constants wherever the file is silent.

use std::path::Path;

use room_core::RoomConfig;
use serde::Deserialize;

/// On-disk shape of `AsterobiaConfig.json`. A partial file only overrides
/// the fields it names; [`ServerConfig::load`] fills the rest from whatever
/// `ServerConfig` was already running (or [`ServerConfig::default`] at
/// first boot).
#[derive(Debug, Default, Deserialize)]
struct RawServerConfig {
    tick_rate_hz: Option<u32>,
    physics_enabled: Option<bool>,
    max_obstacles: Option<usize>,
    max_mines: Option<usize>,
    state_hash_sample_interval: Option<u64>,
    max_slot: Option<u32>,
    cmd_batch_schedule_buffer: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub room: RoomConfig,
    /// Highest slot a `JOIN_ACK`/`SPAWN_MANIFEST` may assign (spec §3: a
    /// room is a host plus a bounded number of guest slots).
    pub max_slot: u32,
    /// `CMD_BATCH.scheduled-tick = sim-tick + buffer` when a batch entry
    /// does not pin its own tick (spec §6, default 2).
    pub cmd_batch_schedule_buffer: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { room: RoomConfig::default(), max_slot: 8, cmd_batch_schedule_buffer: 2 }
    }
}

impl ServerConfig {
    /// Reads `path`, overlaying only the fields it names onto `fallback`.
    /// If the file is absent or unparsable, `fallback` is returned
    /// untouched — mirrors the teacher's `reload_config` leaving the prior
    /// config in place on a bad reload rather than tearing down the server.
    pub fn load(path: &Path, fallback: &ServerConfig) -> ServerConfig {
        let raw = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<RawServerConfig>(&text) {
                Ok(raw) => raw,
                Err(error) => {
                    tracing::error!(%error, path = %path.display(), "failed to parse server config, keeping prior config");
                    return *fallback;
                }
            },
            Err(error) => {
                tracing::warn!(%error, path = %path.display(), "server config file not found, keeping prior config");
                return *fallback;
            }
        };

        let mut config = *fallback;
        if let Some(tick_rate_hz) = raw.tick_rate_hz {
            config.room.tick_rate_hz = tick_rate_hz;
        }
        if let Some(physics_enabled) = raw.physics_enabled {
            config.room.physics_enabled = physics_enabled;
        }
        if let Some(max_obstacles) = raw.max_obstacles {
            config.room.max_obstacles = max_obstacles;
        }
        if let Some(max_mines) = raw.max_mines {
            config.room.max_mines = max_mines;
        }
        if let Some(state_hash_sample_interval) = raw.state_hash_sample_interval {
            config.room.state_hash_sample_interval = state_hash_sample_interval;
        }
        if let Some(max_slot) = raw.max_slot {
            config.max_slot = max_slot;
        }
        if let Some(buffer) = raw.cmd_batch_schedule_buffer {
            config.cmd_batch_schedule_buffer = buffer;
        }
        config
    }
}
