//! Monotonic command ingestion with tick scheduling (spec §4.6). Informed by
//! the teacher's `backbone-lib/src/timer.rs` retain-and-collect shape (drain
//! by predicate) but not copied from it — the queue's semantics are
//! scheduled-tick filtering, not a countdown timer list.

use crate::ids::{Slot, UnitId};
use sphere_math::Vec3;

/// One unit's worth of command payload (spec §3 `Command.payload`).
#[derive(Debug, Clone)]
pub enum CommandPayload {
    MoveInput {
        unit_id: Option<UnitId>,
        forward: bool,
        backward: bool,
        left: bool,
        right: bool,
    },
    PathData {
        unit_id: UnitId,
        waypoints: Vec<Vec3>,
        closed: bool,
    },
}

/// `{ type, source-slot (server-stamped), seq (per-sender monotonic),
/// optional scheduled-tick, payload }` (spec §3).
#[derive(Debug, Clone)]
pub struct Command {
    pub source_slot: Slot,
    pub seq: u64,
    pub scheduled_tick: Option<u64>,
    pub payload: CommandPayload,
}

/// Drains commands in deterministic order: insertion order after filtering
/// by scheduled tick. A command with no `scheduled_tick` is eligible on the
/// very next flush.
#[derive(Debug, Default)]
pub struct CommandQueue {
    items: Vec<Command>,
    next_seq: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        CommandQueue::default()
    }

    /// Returns the `seq` assigned to this push — per-sender monotonic in the
    /// sense that the room stamps a single, queue-wide monotonic counter;
    /// callers that need per-sender sequencing track their own and pass it
    /// through unchanged (spec §6 `CMD_BATCH.batch_seq`).
    pub fn push(&mut self, source_slot: Slot, scheduled_tick: Option<u64>, payload: CommandPayload) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push(Command {
            source_slot,
            seq,
            scheduled_tick,
            payload,
        });
        seq
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns every command whose `scheduled_tick` is `<= current_tick` (or
    /// unset), in arrival order, removing them from the queue. Never
    /// returns a command with `scheduled_tick > current_tick`; remaining
    /// commands stay queued for a later flush (successive flushes partition
    /// the command stream).
    pub fn flush(&mut self, current_tick: u64) -> Vec<Command> {
        let mut ready = Vec::new();
        let mut pending = Vec::with_capacity(self.items.len());
        for cmd in self.items.drain(..) {
            match cmd.scheduled_tick {
                Some(t) if t > current_tick => pending.push(cmd),
                _ => ready.push(cmd),
            }
        }
        self.items = pending;
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn move_cmd() -> CommandPayload {
        CommandPayload::MoveInput {
            unit_id: None,
            forward: true,
            backward: false,
            left: false,
            right: false,
        }
    }

    #[test]
    fn flush_never_returns_a_future_scheduled_command() {
        let mut queue = CommandQueue::new();
        queue.push(Slot(0), Some(5), move_cmd());
        let ready = queue.flush(3);
        assert!(ready.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn flush_partitions_the_command_stream() {
        let mut queue = CommandQueue::new();
        queue.push(Slot(0), None, move_cmd());
        queue.push(Slot(0), Some(10), move_cmd());
        let first = queue.flush(1);
        assert_eq!(first.len(), 1);
        assert_eq!(queue.len(), 1);
        let second = queue.flush(10);
        assert_eq!(second.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn flush_preserves_insertion_order() {
        let mut queue = CommandQueue::new();
        for _ in 0..5 {
            queue.push(Slot(0), None, move_cmd());
        }
        let ready = queue.flush(0);
        let seqs: Vec<u64> = ready.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }
}
