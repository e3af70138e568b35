//! Transport-authenticated identity map and message routing (spec §4.8).
//!
//! Grounded on `relay-server/src/lobby.rs`'s `AppState`/`Room` registry shape
//! (`Arc<Mutex<HashMap<...>>>`, consulted read-only except at
//! creation/disconnect) and `relay-server/src/hand_shake.rs`'s
//! accept/reject-with-reason control flow — generalized from a single
//! client-hosted room handshake to the server-authoritative routing table
//! spec §4.8 describes. The mapping from a relay's server-assigned
//! [`ClientId`] to `{room, slot}` is the one piece of state this module
//! trusts nothing else to populate: it is never constructed from a
//! payload-declared slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use room_core::{AdminCommand, Player, RoomConfig, RoomHandle, RoomId, RoomLifecycle, Slot, UnitId};
use protocol::{BatchedCommand, GameMessage, ManifestUnit, WaypointXyz};
use sphere_math::Vec3;
use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::relay::{ChannelRelay, ClientId, RelayObservation};

/// `{room-id, slot}` — the only identity a dispatched command is allowed to
/// carry once it reaches `room-core` (spec §4.8).
type ClientMapping = (RoomId, Slot);

pub struct GameServer {
    /// Behind a lock rather than a plain field so `reload_config` (spec §6
    /// `GET /reload` parity) can swap it without tearing the server down —
    /// only rooms created after a reload see the new values, matching the
    /// teacher's own `reload_config` semantics of leaving live rooms alone.
    config: StdMutex<ServerConfig>,
    rooms: StdMutex<HashMap<RoomId, RoomHandle>>,
    client_slots: StdMutex<HashMap<ClientId, ClientMapping>>,
    /// Last accepted `CMD_BATCH.batch_seq` per sender (spec §6: "duplicates,
    /// out-of-order dropped").
    last_batch_seq: StdMutex<HashMap<ClientId, u64>>,
    relay: StdMutex<Option<Arc<dyn ChannelRelay>>>,
    /// Spec §7: "where a debug counter exists, incremented" for protocol
    /// violations silently dropped at the ingress boundary.
    dropped_messages: AtomicU64,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Arc<GameServer> {
        Arc::new(GameServer {
            config: StdMutex::new(config),
            rooms: StdMutex::new(HashMap::new()),
            client_slots: StdMutex::new(HashMap::new()),
            last_batch_seq: StdMutex::new(HashMap::new()),
            relay: StdMutex::new(None),
            dropped_messages: AtomicU64::new(0),
        })
    }

    pub fn dropped_message_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    fn config(&self) -> ServerConfig {
        *self.config.lock().unwrap()
    }

    /// The live config, for a reload handler to use as the fallback it
    /// overlays a freshly-read file onto (or keeps outright on a bad read).
    pub fn current_config(&self) -> ServerConfig {
        self.config()
    }

    /// Swaps the live config; only rooms spawned after this call see the
    /// new values (spec §6 `GET /reload` parity with the teacher's
    /// `reload_config`, which likewise never touches already-running rooms).
    pub fn reload_config(&self, config: ServerConfig) {
        *self.config.lock().unwrap() = config;
    }

    pub fn room_handle(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.lock().unwrap().get(room_id).cloned()
    }

    /// Installs an interceptor on the relay's broadcast path: every message
    /// it carries is inspected here (spec §4.8 `wire_to_relay`), after the
    /// relay has already delivered it to its normal subscribers. This is a
    /// tee, not a gate — the game server cannot block or drop a message
    /// other subscribers would see.
    pub fn wire_to_relay(self: &Arc<Self>, relay: Arc<dyn ChannelRelay>) {
        *self.relay.lock().unwrap() = Some(relay.clone());

        let mut observations = relay.observe();
        let server = self.clone();
        tokio::spawn(async move {
            loop {
                match observations.recv().await {
                    Ok(observation) => {
                        let server = server.clone();
                        tokio::spawn(async move { server.handle_observation(observation).await });
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut disconnects = relay.on_disconnect();
        let server = self.clone();
        tokio::spawn(async move {
            loop {
                match disconnects.recv().await {
                    Ok(client) => server.on_disconnect(client),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn handle_observation(self: Arc<Self>, observation: RelayObservation) {
        let message = match serde_json::from_value::<GameMessage>(observation.payload) {
            Ok(message) => message,
            Err(error) => {
                self.drop_violation(&format!("malformed frame: {error}"));
                return;
            }
        };
        self.dispatch(observation.sender, &observation.channel, message).await;
    }

    /// Spec §7 disconnect handling: drop the client's `client_slots` entry;
    /// the room continues ticking with that slot idle.
    fn on_disconnect(&self, client: ClientId) {
        self.client_slots.lock().unwrap().remove(&client);
        self.last_batch_seq.lock().unwrap().remove(&client);
    }

    fn drop_violation(&self, reason: &str) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(reason, "dropping protocol-violating message");
    }

    fn mapping_of(&self, client: ClientId) -> Option<ClientMapping> {
        self.client_slots.lock().unwrap().get(&client).cloned()
    }

    pub async fn dispatch(&self, sender: ClientId, channel: &str, message: GameMessage) {
        match message {
            GameMessage::HostAnnounce { host_id, host_display_name } => {
                self.handle_host_announce(sender, host_id, host_display_name).await;
            }
            GameMessage::SpawnManifest { units } => {
                self.handle_spawn_manifest(sender, units).await;
            }
            GameMessage::JoinAck { accepted, assigned_slot, .. } => {
                self.handle_join_ack(sender, accepted, assigned_slot).await;
            }
            GameMessage::MoveInput { forward, backward, left, right, unit_id } => {
                self.handle_move_input(sender, channel, forward, backward, left, right, unit_id).await;
            }
            GameMessage::PathData { unit_id, waypoints, closed } => {
                self.handle_path_data(sender, unit_id, waypoints, closed).await;
            }
            GameMessage::CmdAdmin { action, unit_id, params } => {
                self.handle_cmd_admin(sender, action, unit_id, params).await;
            }
            GameMessage::CmdBatch { batch_seq, sim_tick, scheduled_tick, commands, .. } => {
                self.handle_cmd_batch(sender, batch_seq, sim_tick, scheduled_tick, commands).await;
            }
            GameMessage::ServerSnapshot { .. } => {
                // Only ever produced by this server; never a legal client->server frame.
                self.drop_violation("SERVER_SNAPSHOT observed from a client");
            }
        }
    }

    async fn handle_host_announce(&self, sender: ClientId, host_id: String, host_display_name: String) {
        let room_id = RoomId(host_id.clone());
        let already_exists = self.rooms.lock().unwrap().contains_key(&room_id);
        if already_exists {
            self.drop_violation("HOST_ANNOUNCE for a room that already exists");
            return;
        }

        let handle = RoomHandle::spawn(room_id.clone(), self.config().room);
        self.rooms.lock().unwrap().insert(room_id.clone(), handle.clone());
        self.client_slots.lock().unwrap().insert(sender, (room_id.clone(), Slot::HOST));
        let _ = handle.register_player(Slot::HOST, Player { user_id: host_id, display_name: host_display_name }).await;

        if let Some(relay) = self.relay.lock().unwrap().clone() {
            spawn_snapshot_forwarder(relay, room_id, handle, self.config().room.state_hash_sample_interval);
        }
    }

    async fn handle_spawn_manifest(&self, sender: ClientId, units: Vec<ManifestUnit>) {
        let Some((room_id, slot)) = self.mapping_of(sender) else {
            self.drop_violation("SPAWN_MANIFEST from an unmapped sender");
            return;
        };
        if slot != Slot::HOST {
            self.drop_violation("SPAWN_MANIFEST from a non-host slot");
            return;
        }
        if units.len() > unit_sim::consts::MANIFEST_MAX_UNITS {
            self.drop_violation("SPAWN_MANIFEST exceeds the manifest size cap");
            return;
        }
        for unit in &units {
            if unit.owner_slot > self.config().max_slot {
                self.drop_violation("SPAWN_MANIFEST unit with out-of-range owner_slot");
                return;
            }
        }
        let Some(handle) = self.room_handle(&room_id) else { return };
        match handle.create_manifest(units).await {
            Ok(Ok(())) => {
                if handle.start().await.is_err() {
                    tracing::debug!(room = %room_id, "room task gone before SPAWN_MANIFEST could start it");
                }
            }
            Ok(Err(error)) => self.drop_violation(&format!("SPAWN_MANIFEST rejected by room: {error}")),
            Err(_) => tracing::debug!(room = %room_id, "room task gone during SPAWN_MANIFEST"),
        }
    }

    /// Spec §9 OQ1: manifest-only unit creation is authoritative. `JOIN_ACK`
    /// observation only maps the guest's slot and lazily creates a default
    /// guest unit if-and-only-if the manifest did not already supply one.
    async fn handle_join_ack(&self, sender: ClientId, accepted: bool, assigned_slot: u32) {
        let Some((room_id, slot)) = self.mapping_of(sender) else {
            self.drop_violation("JOIN_ACK observed without a known host session");
            return;
        };
        if slot != Slot::HOST {
            self.drop_violation("JOIN_ACK observed from a non-host sender");
            return;
        }
        if assigned_slot == 0 || assigned_slot > self.config().max_slot {
            self.drop_violation("JOIN_ACK with an out-of-range assigned_slot");
            return;
        }
        if !accepted {
            return;
        }
        let Some(handle) = self.room_handle(&room_id) else { return };
        let _ = handle.ensure_guest_unit(Slot(assigned_slot), 0).await;
    }

    async fn handle_move_input(
        &self,
        sender: ClientId,
        channel: &str,
        forward: bool,
        backward: bool,
        left: bool,
        right: bool,
        unit_id: Option<u32>,
    ) {
        let mapping = match self.mapping_of(sender) {
            Some(mapping) => Some(mapping),
            None => self.lazy_map_guest(sender, channel),
        };
        let Some((room_id, slot)) = mapping else {
            self.drop_violation("MOVE_INPUT: no room to lazily map into");
            return;
        };
        let Some(handle) = self.room_handle(&room_id) else { return };
        let _ = handle.enqueue_move_input(slot, unit_id.map(UnitId), forward, backward, left, right).await;
    }

    /// Maps `sender` to the first unmapped guest slot (`1..=max_slot`) in
    /// the room named by `channel`'s `asterobia:session:<room-id>` suffix
    /// (spec §4.8: "the guest's client-id is mapped lazily on its first
    /// MOVE_INPUT to the first unmapped guest slot in that room").
    fn lazy_map_guest(&self, sender: ClientId, channel: &str) -> Option<ClientMapping> {
        let room_id = room_id_from_channel(channel)?;
        if !self.rooms.lock().unwrap().contains_key(&room_id) {
            return None;
        }

        let mut client_slots = self.client_slots.lock().unwrap();
        let used: std::collections::HashSet<Slot> =
            client_slots.values().filter(|(r, _)| *r == room_id).map(|(_, s)| *s).collect();
        let slot = (1..=self.config().max_slot).map(Slot).find(|s| !used.contains(s))?;
        client_slots.insert(sender, (room_id.clone(), slot));
        Some((room_id, slot))
    }

    async fn handle_path_data(&self, sender: ClientId, unit_id: u32, waypoints: Vec<WaypointXyz>, closed: bool) {
        let Some((room_id, slot)) = self.mapping_of(sender) else {
            self.drop_violation("PATH_DATA from an unmapped sender");
            return;
        };
        let Some(handle) = self.room_handle(&room_id) else { return };
        if handle.lifecycle() != RoomLifecycle::Running {
            self.drop_violation("PATH_DATA while room is not RUNNING");
            return;
        }
        if waypoints.is_empty() || waypoints.len() > unit_sim::consts::MAX_WAYPOINTS {
            self.drop_violation("PATH_DATA waypoint count out of range");
            return;
        }
        let points: Vec<Vec3> = waypoints.iter().map(|w| Vec3::new(w.x, w.y, w.z)).collect();
        if !points.iter().all(|p| p.is_finite()) {
            self.drop_violation("PATH_DATA contains a non-finite waypoint");
            return;
        }
        if !segments_within_limit(&points, closed) {
            self.drop_violation("PATH_DATA segment exceeds MAX_SEGMENT_LENGTH");
            return;
        }
        let _ = handle.enqueue_path(slot, UnitId(unit_id), points, closed).await;
    }

    async fn handle_cmd_admin(&self, sender: ClientId, action: String, unit_id: Option<u32>, params: serde_json::Value) {
        let Some((room_id, slot)) = self.mapping_of(sender) else {
            self.drop_violation("CMD_ADMIN from an unmapped sender");
            return;
        };
        if slot != Slot::HOST {
            self.drop_violation("CMD_ADMIN from a non-host sender");
            return;
        }
        let Some(handle) = self.room_handle(&room_id) else { return };
        match handle.physics_enabled().await {
            Ok(true) => {}
            _ => {
                self.drop_violation("CMD_ADMIN dev gate closed (enable_physics == false)");
                return;
            }
        }
        let Some(command) = parse_admin_command(&action, unit_id, &params) else {
            self.drop_violation(&format!("CMD_ADMIN unknown action or malformed payload: {action}"));
            return;
        };
        let _ = handle.admin(command).await;
    }

    async fn handle_cmd_batch(
        &self,
        sender: ClientId,
        batch_seq: u64,
        sim_tick: u64,
        scheduled_tick: u64,
        commands: Vec<BatchedCommand>,
    ) {
        {
            let mut last = self.last_batch_seq.lock().unwrap();
            if let Some(&previous) = last.get(&sender) {
                if batch_seq <= previous {
                    drop(last);
                    self.drop_violation("CMD_BATCH duplicate or out-of-order batch_seq");
                    return;
                }
            }
            last.insert(sender, batch_seq);
        }
        let Some((room_id, slot)) = self.mapping_of(sender) else {
            self.drop_violation("CMD_BATCH from an unmapped sender");
            return;
        };
        let Some(handle) = self.room_handle(&room_id) else { return };

        let effective_tick = if scheduled_tick > 0 { scheduled_tick } else { sim_tick + self.config().cmd_batch_schedule_buffer };
        for entry in commands.into_iter().take(unit_sim::consts::CMD_BATCH_MAX) {
            self.route_batched_command(&handle, slot, entry, effective_tick).await;
        }
    }

    async fn route_batched_command(&self, handle: &RoomHandle, slot: Slot, entry: BatchedCommand, scheduled_tick: u64) {
        match entry.kind.as_str() {
            "MOVE_INPUT" => {
                let Ok(params) = serde_json::from_value::<BatchedMoveInput>(entry.params) else {
                    self.drop_violation("CMD_BATCH MOVE_INPUT entry malformed");
                    return;
                };
                let _ = handle
                    .enqueue_move_input_scheduled(
                        slot,
                        params.unit_id.map(UnitId),
                        params.forward,
                        params.backward,
                        params.left,
                        params.right,
                        Some(scheduled_tick),
                    )
                    .await;
            }
            "PATH_DATA" => {
                let Ok(params) = serde_json::from_value::<BatchedPathData>(entry.params) else {
                    self.drop_violation("CMD_BATCH PATH_DATA entry malformed");
                    return;
                };
                let points: Vec<Vec3> = params.waypoints.iter().map(|w| Vec3::new(w.x, w.y, w.z)).collect();
                if points.is_empty()
                    || points.len() > unit_sim::consts::MAX_WAYPOINTS
                    || !points.iter().all(|p| p.is_finite())
                    || !segments_within_limit(&points, params.closed)
                {
                    self.drop_violation("CMD_BATCH PATH_DATA entry out of range");
                    return;
                }
                let _ = handle
                    .enqueue_path_scheduled(slot, UnitId(params.unit_id), points, params.closed, Some(scheduled_tick))
                    .await;
            }
            _ => self.drop_violation(&format!("CMD_BATCH unknown command type: {}", entry.kind)),
        }
    }
}

fn segments_within_limit(points: &[Vec3], closed: bool) -> bool {
    if points.windows(2).any(|pair| pair[0].distance(pair[1]) > unit_sim::consts::MAX_SEGMENT_LENGTH) {
        return false;
    }
    if closed && points.len() > 1 {
        let wrap = points[points.len() - 1].distance(points[0]);
        if wrap > unit_sim::consts::MAX_SEGMENT_LENGTH {
            return false;
        }
    }
    true
}

fn room_id_from_channel(channel: &str) -> Option<RoomId> {
    channel.strip_prefix("asterobia:session:").map(|id| RoomId(id.to_string()))
}

#[derive(serde::Deserialize)]
struct BatchedMoveInput {
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
    #[serde(default)]
    unit_id: Option<u32>,
}

#[derive(serde::Deserialize)]
struct BatchedPathData {
    unit_id: u32,
    waypoints: Vec<WaypointXyz>,
    closed: bool,
}

#[derive(serde::Deserialize)]
struct PositionXyz {
    x: f32,
    y: f32,
    z: f32,
}

impl From<PositionXyz> for Vec3 {
    fn from(p: PositionXyz) -> Vec3 {
        Vec3::new(p.x, p.y, p.z)
    }
}

/// Every `CMD_ADMIN` action named in spec §4.8. Unknown actions and
/// malformed payloads return `None`, which the caller silently drops.
fn parse_admin_command(action: &str, unit_id: Option<u32>, params: &serde_json::Value) -> Option<AdminCommand> {
    #[derive(serde::Deserialize)]
    struct Explosion {
        #[serde(default)]
        center: Option<PositionXyz>,
        radius: f32,
        strength: f32,
    }
    #[derive(serde::Deserialize)]
    struct Mine {
        position: PositionXyz,
        #[serde(default)]
        trigger_radius: Option<f32>,
        #[serde(default)]
        upward_impulse: Option<f32>,
        #[serde(default)]
        radial_impulse: Option<f32>,
        #[serde(default)]
        blast_radius: Option<f32>,
    }
    #[derive(serde::Deserialize)]
    struct Rock {
        position: PositionXyz,
        radius: f32,
    }
    #[derive(serde::Deserialize)]
    struct Enable {
        enable: bool,
    }
    #[derive(serde::Deserialize)]
    struct Altitude {
        altitude: f32,
    }
    #[derive(serde::Deserialize)]
    struct Degrees {
        degrees: f32,
    }

    match action {
        "TRIGGER_EXPLOSION" => {
            let p: Explosion = serde_json::from_value(params.clone()).ok()?;
            Some(AdminCommand::TriggerExplosion {
                unit_id: unit_id.map(UnitId),
                center: p.center.map(Vec3::from),
                radius: p.radius,
                strength: p.strength,
            })
        }
        "PLACE_MINE" => {
            let p: Mine = serde_json::from_value(params.clone()).ok()?;
            Some(AdminCommand::PlaceMine {
                position: p.position.into(),
                trigger_radius: p.trigger_radius,
                upward_impulse: p.upward_impulse,
                radial_impulse: p.radial_impulse,
                blast_radius: p.blast_radius,
            })
        }
        "SPAWN_ROCK" => {
            let p: Rock = serde_json::from_value(params.clone()).ok()?;
            Some(AdminCommand::SpawnRock { position: p.position.into(), radius: p.radius })
        }
        "TOGGLE_UNIT_PHYSICS" => {
            let p: Enable = serde_json::from_value(params.clone()).ok()?;
            Some(AdminCommand::ToggleUnitPhysics { unit_id: UnitId(unit_id?), enable: p.enable })
        }
        "DROP_TEST" => {
            let p: Altitude = serde_json::from_value(params.clone()).ok()?;
            Some(AdminCommand::DropTest { unit_id: UnitId(unit_id?), altitude: p.altitude })
        }
        "SET_ALTITUDE" => {
            let p: Altitude = serde_json::from_value(params.clone()).ok()?;
            Some(AdminCommand::SetAltitude { unit_id: UnitId(unit_id?), altitude: p.altitude })
        }
        "TOGGLE_RAPIER" => {
            let p: Enable = serde_json::from_value(params.clone()).ok()?;
            Some(AdminCommand::ToggleRapier { enable: p.enable })
        }
        "SET_ROLLOVER_THRESHOLD" => {
            let p: Degrees = serde_json::from_value(params.clone()).ok()?;
            Some(AdminCommand::SetRolloverThreshold { degrees: p.degrees })
        }
        _ => None,
    }
}

/// Spawns one task per room forwarding its snapshot broadcast onto the
/// relay's subscriber set for `asterobia:session:<room-id>` (spec §4.8,
/// §6). Also samples the determinism state hash every
/// `state_hash_sample_interval` ticks (spec §6 "State hash").
fn spawn_snapshot_forwarder(
    relay: Arc<dyn ChannelRelay>,
    room_id: RoomId,
    handle: RoomHandle,
    state_hash_sample_interval: u64,
) {
    tokio::spawn(async move {
        let mut snapshots = handle.subscribe_snapshots();
        let channel = protocol::session_channel(room_id.as_str());
        let interval = state_hash_sample_interval.max(1);
        loop {
            match snapshots.recv().await {
                Ok(snapshot) => {
                    if snapshot.tick % interval == 0 {
                        let hash = room_core::state_hash(snapshot.tick, &snapshot.units);
                        tracing::debug!(room = %room_id, tick = snapshot.tick, hash, "state hash sample");
                    }
                    let message = to_wire_snapshot(&snapshot);
                    if let Ok(payload) = serde_json::to_value(&message) {
                        relay.publish(&channel, payload);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn to_wire_snapshot(snapshot: &room_core::RoomSnapshot) -> GameMessage {
    GameMessage::ServerSnapshot {
        version: snapshot.version,
        tick: snapshot.tick,
        server_time_ms: snapshot.server_time_ms,
        units: snapshot.units.iter().map(to_wire_unit).collect(),
    }
}

fn to_wire_unit(unit: &unit_sim::UnitSnapshot) -> protocol::SnapshotUnit {
    protocol::SnapshotUnit {
        id: unit.id.0,
        owner_slot: unit.owner_slot.0,
        model_index: unit.model_index,
        px: unit.px,
        py: unit.py,
        pz: unit.pz,
        qx: unit.qx,
        qy: unit.qy,
        qz: unit.qz,
        qw: unit.qw,
        heading: unit.heading,
        speed: unit.speed,
        state: unit.state.to_string(),
        hp: unit.hp,
        mode: movement_mode_label(unit.mode).to_string(),
        physics_mode: physics_mode_label(unit.physics_mode).to_string(),
        altitude: unit.altitude,
    }
}

fn movement_mode_label(mode: unit_sim::MovementMode) -> &'static str {
    match mode {
        unit_sim::MovementMode::Grounded => "GROUNDED",
        unit_sim::MovementMode::Airborne => "AIRBORNE",
    }
}

fn physics_mode_label(mode: unit_sim::PhysicsMode) -> &'static str {
    match mode {
        unit_sim::PhysicsMode::Kinematic => "KINEMATIC",
        unit_sim::PhysicsMode::Dynamic => "DYNAMIC",
        unit_sim::PhysicsMode::Settled => "SETTLED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn host_announce_creates_a_room_and_maps_the_host_slot() {
        let server = GameServer::new(ServerConfig { room: RoomConfig::flat_no_physics(), ..ServerConfig::default() });
        server
            .dispatch(
                ClientId(1),
                "asterobia:lobby",
                GameMessage::HostAnnounce { host_id: "r1".into(), host_display_name: "Host".into() },
            )
            .await;
        assert_eq!(server.mapping_of(ClientId(1)), Some((RoomId("r1".into()), Slot::HOST)));
    }

    #[tokio::test]
    async fn second_host_announce_for_same_room_is_dropped() {
        let server = GameServer::new(ServerConfig { room: RoomConfig::flat_no_physics(), ..ServerConfig::default() });
        let announce = || GameMessage::HostAnnounce { host_id: "r1".into(), host_display_name: "Host".into() };
        server.dispatch(ClientId(1), "asterobia:lobby", announce()).await;
        server.dispatch(ClientId(2), "asterobia:lobby", announce()).await;
        assert_eq!(server.dropped_message_count(), 1);
        assert_eq!(server.mapping_of(ClientId(2)), None);
    }

    #[tokio::test]
    async fn spawn_manifest_from_non_host_is_rejected() {
        let server = GameServer::new(ServerConfig { room: RoomConfig::flat_no_physics(), ..ServerConfig::default() });
        server
            .dispatch(
                ClientId(1),
                "asterobia:lobby",
                GameMessage::HostAnnounce { host_id: "r1".into(), host_display_name: "Host".into() },
            )
            .await;
        server.client_slots.lock().unwrap().insert(ClientId(2), (RoomId("r1".into()), Slot(1)));
        server.dispatch(ClientId(2), "asterobia:session:r1", GameMessage::SpawnManifest { units: vec![] }).await;
        assert_eq!(server.dropped_message_count(), 1);
    }

    #[tokio::test]
    async fn move_input_lazily_maps_an_unmapped_guest_to_the_first_free_slot() {
        let server = GameServer::new(ServerConfig { room: RoomConfig::flat_no_physics(), ..ServerConfig::default() });
        server
            .dispatch(
                ClientId(1),
                "asterobia:lobby",
                GameMessage::HostAnnounce { host_id: "r1".into(), host_display_name: "Host".into() },
            )
            .await;
        server
            .dispatch(
                ClientId(2),
                "asterobia:session:r1",
                GameMessage::MoveInput { forward: true, backward: false, left: false, right: false, unit_id: None },
            )
            .await;
        assert_eq!(server.mapping_of(ClientId(2)), Some((RoomId("r1".into()), Slot(1))));
    }

    #[tokio::test]
    async fn disconnect_clears_the_client_mapping() {
        let server = GameServer::new(ServerConfig { room: RoomConfig::flat_no_physics(), ..ServerConfig::default() });
        server
            .dispatch(
                ClientId(1),
                "asterobia:lobby",
                GameMessage::HostAnnounce { host_id: "r1".into(), host_display_name: "Host".into() },
            )
            .await;
        server.on_disconnect(ClientId(1));
        assert_eq!(server.mapping_of(ClientId(1)), None);
    }

    #[tokio::test]
    async fn cmd_admin_is_dropped_when_physics_gate_is_closed() {
        let server = GameServer::new(ServerConfig { room: RoomConfig::flat_no_physics(), ..ServerConfig::default() });
        server
            .dispatch(
                ClientId(1),
                "asterobia:lobby",
                GameMessage::HostAnnounce { host_id: "r1".into(), host_display_name: "Host".into() },
            )
            .await;
        server
            .dispatch(
                ClientId(1),
                "asterobia:session:r1",
                GameMessage::CmdAdmin {
                    action: "TOGGLE_RAPIER".into(),
                    unit_id: None,
                    params: serde_json::json!({ "enable": true }),
                },
            )
            .await;
        assert_eq!(server.dropped_message_count(), 1);
    }
}
