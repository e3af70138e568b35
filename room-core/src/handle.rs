//! `RoomHandle` (spec §4.7 **[EXPANDED]**): runs one [`Room`] on its own
//! `tokio::task`, driven by a `tokio::time::interval` the same way the
//! teacher's `main.rs` drives its watchdog loop. `game-server` never touches
//! a `Room` directly — only through this handle's command channel and
//! snapshot broadcast, matching spec §5's "the room tick itself does not
//! suspend" and "no shared mutable state to lock inside a tick".

use std::time::Duration;

use sphere_math::Vec3;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::RoomConfig;
use crate::ids::{RoomId, Slot, UnitId};
use crate::queue::CommandPayload;
use crate::room::{AdminCommand, Player, Room, RoomError, RoomLifecycle};
use crate::snapshot::RoomSnapshot;
use protocol::ManifestUnit;

/// Broadcast lag beyond this many unconsumed snapshots is the transport's
/// problem to catch up on, per spec §5 "backpressure is the transport's
/// concern" — sized generously so a slow subscriber doesn't miss an entire
/// state-hash sampling window.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Generous enough that a burst of `MOVE_INPUT`/`PATH_DATA` ingestion never
/// backs up into the caller; the room's own [`CommandQueue`](crate::queue::CommandQueue)
/// is the real backpressure point and enforces `unit_sim::consts::QUEUE_MAX`.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum RoomHandleError {
    #[error("room task is no longer running")]
    RoomGone,
}

enum RoomCommand {
    CreateManifest { units: Vec<ManifestUnit>, reply: oneshot::Sender<Result<(), RoomError>> },
    Start { reply: oneshot::Sender<Result<(), RoomError>> },
    Stop,
    RegisterPlayer { slot: Slot, player: Player },
    EnqueueMoveInput {
        slot: Slot,
        unit_id: Option<UnitId>,
        forward: bool,
        backward: bool,
        left: bool,
        right: bool,
        scheduled_tick: Option<u64>,
    },
    EnqueuePath { slot: Slot, unit_id: UnitId, waypoints: Vec<Vec3>, closed: bool, scheduled_tick: Option<u64> },
    EnsureGuestUnit { slot: Slot, model_index: u32, reply: oneshot::Sender<UnitId> },
    Admin { command: AdminCommand, reply: oneshot::Sender<Result<(), RoomError>> },
    PhysicsEnabled { reply: oneshot::Sender<bool> },
}

/// Cheap to `Clone` — every clone shares the same underlying room task.
#[derive(Clone)]
pub struct RoomHandle {
    pub id: RoomId,
    commands: mpsc::Sender<RoomCommand>,
    lifecycle: watch::Receiver<RoomLifecycle>,
    snapshots: broadcast::Sender<RoomSnapshot>,
}

impl RoomHandle {
    pub fn spawn(id: RoomId, config: RoomConfig) -> RoomHandle {
        let room = Room::new(id.clone(), config);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (lifecycle_tx, lifecycle_rx) = watch::channel(RoomLifecycle::Waiting);
        let (snapshot_tx, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);

        let task_snapshot_tx = snapshot_tx.clone();
        tokio::spawn(run_room(room, command_rx, lifecycle_tx, task_snapshot_tx));

        RoomHandle { id, commands: command_tx, lifecycle: lifecycle_rx, snapshots: snapshot_tx }
    }

    pub fn lifecycle(&self) -> RoomLifecycle {
        *self.lifecycle.borrow()
    }

    pub fn lifecycle_watch(&self) -> watch::Receiver<RoomLifecycle> {
        self.lifecycle.clone()
    }

    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<RoomSnapshot> {
        self.snapshots.subscribe()
    }

    async fn dispatch(&self, command: RoomCommand) -> Result<(), RoomHandleError> {
        self.commands.send(command).await.map_err(|_| RoomHandleError::RoomGone)
    }

    pub async fn create_manifest(&self, units: Vec<ManifestUnit>) -> Result<Result<(), RoomError>, RoomHandleError> {
        let (reply, recv) = oneshot::channel();
        self.dispatch(RoomCommand::CreateManifest { units, reply }).await?;
        recv.await.map_err(|_| RoomHandleError::RoomGone)
    }

    pub async fn start(&self) -> Result<Result<(), RoomError>, RoomHandleError> {
        let (reply, recv) = oneshot::channel();
        self.dispatch(RoomCommand::Start { reply }).await?;
        recv.await.map_err(|_| RoomHandleError::RoomGone)
    }

    pub async fn stop(&self) -> Result<(), RoomHandleError> {
        self.dispatch(RoomCommand::Stop).await
    }

    pub async fn register_player(&self, slot: Slot, player: Player) -> Result<(), RoomHandleError> {
        self.dispatch(RoomCommand::RegisterPlayer { slot, player }).await
    }

    pub async fn enqueue_move_input(
        &self,
        slot: Slot,
        unit_id: Option<UnitId>,
        forward: bool,
        backward: bool,
        left: bool,
        right: bool,
    ) -> Result<(), RoomHandleError> {
        self.enqueue_move_input_scheduled(slot, unit_id, forward, backward, left, right, None).await
    }

    /// Like [`RoomHandle::enqueue_move_input`] but lets a `CMD_BATCH` entry
    /// (spec §6) pin the command to a future tick instead of running next
    /// flush.
    pub async fn enqueue_move_input_scheduled(
        &self,
        slot: Slot,
        unit_id: Option<UnitId>,
        forward: bool,
        backward: bool,
        left: bool,
        right: bool,
        scheduled_tick: Option<u64>,
    ) -> Result<(), RoomHandleError> {
        self.dispatch(RoomCommand::EnqueueMoveInput { slot, unit_id, forward, backward, left, right, scheduled_tick })
            .await
    }

    pub async fn enqueue_path(
        &self,
        slot: Slot,
        unit_id: UnitId,
        waypoints: Vec<Vec3>,
        closed: bool,
    ) -> Result<(), RoomHandleError> {
        self.enqueue_path_scheduled(slot, unit_id, waypoints, closed, None).await
    }

    pub async fn enqueue_path_scheduled(
        &self,
        slot: Slot,
        unit_id: UnitId,
        waypoints: Vec<Vec3>,
        closed: bool,
        scheduled_tick: Option<u64>,
    ) -> Result<(), RoomHandleError> {
        self.dispatch(RoomCommand::EnqueuePath { slot, unit_id, waypoints, closed, scheduled_tick }).await
    }

    pub async fn ensure_guest_unit(&self, slot: Slot, model_index: u32) -> Result<UnitId, RoomHandleError> {
        let (reply, recv) = oneshot::channel();
        self.dispatch(RoomCommand::EnsureGuestUnit { slot, model_index, reply }).await?;
        recv.await.map_err(|_| RoomHandleError::RoomGone)
    }

    pub async fn admin(&self, command: AdminCommand) -> Result<Result<(), RoomError>, RoomHandleError> {
        let (reply, recv) = oneshot::channel();
        self.dispatch(RoomCommand::Admin { command, reply }).await?;
        recv.await.map_err(|_| RoomHandleError::RoomGone)
    }

    /// Mirrors spec §4.8's `CMD_ADMIN` dev gate (`enable_physics == true`),
    /// which reads the room's *current* `physics_enabled` flag — this can
    /// change at runtime via `TOGGLE_RAPIER`, so callers must query it fresh
    /// rather than caching the value a room was created with.
    pub async fn physics_enabled(&self) -> Result<bool, RoomHandleError> {
        let (reply, recv) = oneshot::channel();
        self.dispatch(RoomCommand::PhysicsEnabled { reply }).await?;
        recv.await.map_err(|_| RoomHandleError::RoomGone)
    }
}

/// Owns `room` exclusively for its whole lifetime — no `Mutex`, per spec §5.
/// Commands are applied as soon as received; the fixed-rate tick wakes
/// `SimLoop::step` once per interval fire, matching the teacher's own
/// `tokio::time::interval` watchdog idiom.
async fn run_room(
    mut room: Room,
    mut commands: mpsc::Receiver<RoomCommand>,
    lifecycle_tx: watch::Sender<RoomLifecycle>,
    snapshot_tx: broadcast::Sender<RoomSnapshot>,
) {
    let dt_ms = (1000 / room.tick_rate_hz().max(1) as u64).max(1);
    let mut sim = crate::sim_loop::SimLoop::from_tick_rate_hz(room.tick_rate_hz());
    let mut ticker = tokio::time::interval(Duration::from_millis(dt_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_command = commands.recv() => {
                match maybe_command {
                    Some(command) => apply_command(&mut room, command).await,
                    None => {
                        room.stop();
                        let _ = lifecycle_tx.send(RoomLifecycle::Ended);
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                sim.step(dt_ms, |dt, tick| {
                    if let Some(snapshot) = room.on_sim_tick(dt, tick) {
                        let _ = snapshot_tx.send(snapshot);
                    }
                });
            }
        }

        if room.lifecycle() != *lifecycle_tx.borrow() {
            let _ = lifecycle_tx.send(room.lifecycle());
        }
        if room.lifecycle() == RoomLifecycle::Ended {
            break;
        }
    }
}

async fn apply_command(room: &mut Room, command: RoomCommand) {
    match command {
        RoomCommand::CreateManifest { units, reply } => {
            let _ = reply.send(room.create_units_from_manifest(&units));
        }
        RoomCommand::Start { reply } => {
            let _ = reply.send(room.start().await);
        }
        RoomCommand::Stop => room.stop(),
        RoomCommand::RegisterPlayer { slot, player } => room.register_player(slot, player),
        RoomCommand::EnqueueMoveInput { slot, unit_id, forward, backward, left, right, scheduled_tick } => {
            room.enqueue_command(
                slot,
                scheduled_tick,
                CommandPayload::MoveInput { unit_id, forward, backward, left, right },
            );
        }
        RoomCommand::EnqueuePath { slot, unit_id, waypoints, closed, scheduled_tick } => {
            room.enqueue_command(slot, scheduled_tick, CommandPayload::PathData { unit_id, waypoints, closed });
        }
        RoomCommand::EnsureGuestUnit { slot, model_index, reply } => {
            let _ = reply.send(room.ensure_guest_unit(slot, model_index));
        }
        RoomCommand::Admin { command, reply } => {
            let _ = reply.send(room.apply_admin(command));
        }
        RoomCommand::PhysicsEnabled { reply } => {
            let _ = reply.send(room.physics_enabled());
        }
    }
}
