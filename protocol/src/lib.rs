//! Wire message and channel-naming types shared by the channel relay and the
//! game server (spec §6). Payloads are logical, field-named structures —
//! the spec explicitly treats the relay's on-the-wire byte framing as an
//! external concern, so every message here is a `serde`-tagged enum carried
//! as JSON inside the relay's frames, not a packed byte layout.

use serde::{Deserialize, Serialize};

/// Buffer size for the relay's per-client outbound channel and per-room
/// command-ingestion channel.
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// `asterobia:lobby` — the channel every connected client subscribes to
/// before a room exists, used for `HOST_ANNOUNCE`.
pub const LOBBY_CHANNEL: &str = "asterobia:lobby";

/// `asterobia:session:<room-id>` — one channel per room, carrying every
/// in-room message and the server's snapshot broadcast.
pub fn session_channel(room_id: &str) -> String {
    format!("asterobia:session:{room_id}")
}

// ---- relay pub/sub frames (spec §6 "Channel relay protocol") -------------

/// Client→server frames. A sender must be subscribed to a channel before it
/// may broadcast on it; the relay does not otherwise interpret `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayClientFrame {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Broadcast { channel: String, payload: serde_json::Value },
}

/// Server→client frames. Unknown client frame types and invalid frames
/// produce an `Error` frame rather than dropping the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayServerFrame {
    Message { channel: String, payload: serde_json::Value },
    Error { message: String },
}

// ---- game message payloads (spec §6 "Message payloads") ------------------

/// One unit entry in a `SPAWN_MANIFEST`. Position is optional; a unit
/// without a position is placed by the room at the terrain surface under
/// `(0, 1, 0)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestUnit {
    pub id: u32,
    pub owner_slot: u32,
    pub model_index: u32,
    #[serde(default)]
    pub px: Option<f32>,
    #[serde(default)]
    pub py: Option<f32>,
    #[serde(default)]
    pub pz: Option<f32>,
}

/// A single waypoint in a `PATH_DATA` message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaypointXyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One entry inside a `CMD_BATCH` (spec §6). `params` is left as an opaque
/// JSON value — its shape depends on `type` and is validated at the point
/// the game server interprets it, not at the framing layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchedCommand {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub slot: u32,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Per-unit compact view inside `SERVER_SNAPSHOT.units[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotUnit {
    pub id: u32,
    pub owner_slot: u32,
    pub model_index: u32,
    pub px: f32,
    pub py: f32,
    pub pz: f32,
    pub qx: f32,
    pub qy: f32,
    pub qz: f32,
    pub qw: f32,
    pub heading: f32,
    pub speed: f32,
    pub state: String,
    pub hp: i32,
    pub mode: String,
    pub physics_mode: String,
    pub altitude: f32,
}

/// Every logical message shape exchanged over a session channel (spec §6).
/// This is the payload that rides inside [`RelayClientFrame::Broadcast`] /
/// [`RelayServerFrame::Message`] — the relay itself is blind to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMessage {
    HostAnnounce {
        host_id: String,
        host_display_name: String,
    },
    SpawnManifest {
        units: Vec<ManifestUnit>,
    },
    JoinAck {
        accepted: bool,
        assigned_slot: u32,
        #[serde(default)]
        reject_reason: Option<String>,
        #[serde(default)]
        sim_tick: u64,
        #[serde(default)]
        full_snapshot: Option<Box<GameMessage>>,
    },
    MoveInput {
        forward: bool,
        backward: bool,
        left: bool,
        right: bool,
        #[serde(default)]
        unit_id: Option<u32>,
    },
    PathData {
        unit_id: u32,
        waypoints: Vec<WaypointXyz>,
        closed: bool,
    },
    CmdBatch {
        batch_seq: u64,
        sim_tick: u64,
        scheduled_tick: u64,
        commands: Vec<BatchedCommand>,
        state_hash: Option<String>,
        timestamp: u64,
    },
    CmdAdmin {
        action: String,
        #[serde(default)]
        unit_id: Option<u32>,
        #[serde(default)]
        params: serde_json::Value,
    },
    ServerSnapshot {
        version: u32,
        tick: u64,
        server_time_ms: u64,
        units: Vec<SnapshotUnit>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_input_round_trips_through_json() {
        let msg = GameMessage::MoveInput {
            forward: true,
            backward: false,
            left: false,
            right: true,
            unit_id: Some(7),
        };
        let encoded = serde_json::to_string(&msg).unwrap();
        assert!(encoded.contains("\"type\":\"MOVE_INPUT\""));
        let decoded: GameMessage = serde_json::from_str(&encoded).unwrap();
        match decoded {
            GameMessage::MoveInput { forward, right, unit_id, .. } => {
                assert!(forward);
                assert!(right);
                assert_eq!(unit_id, Some(7));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn session_channel_names_match_spec_convention() {
        assert_eq!(session_channel("r1"), "asterobia:session:r1");
    }

    #[test]
    fn relay_frame_unknown_type_fails_to_parse_and_is_reported_as_error() {
        let raw = r#"{"type":"not_a_real_type"}"#;
        assert!(serde_json::from_str::<RelayClientFrame>(raw).is_err());
    }
}
