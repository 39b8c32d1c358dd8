//! Latest-input-wins buffering between the network and the simulation.
//!
//! Each player has at most one pending input. A newer sequence number replaces the
//! pending one; an older or repeated one is dropped. Movement is sanitised on the way
//! in so the simulation only ever sees finite vectors of length at most one.

use log::debug;
use shared::protocol::ActionFlags;
use shared::{PlayerId, Vec2};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InboundInput {
    pub player_id: PlayerId,
    pub seq: u32,
    pub move_dir: Vec2,
    pub actions: ActionFlags,
    pub client_time: u64,
}

impl InboundInput {
    /// Returns a copy whose movement is finite and clamped to unit length.
    pub fn sanitized(mut self) -> Self {
        self.move_dir = if self.move_dir.is_finite() {
            self.move_dir.clamp_length(1.0)
        } else {
            Vec2::ZERO
        };
        self
    }
}

#[derive(Debug, Default)]
pub struct InputBuffer {
    pending: BTreeMap<PlayerId, InboundInput>,
    /// Highest sequence number ever accepted, per player.
    last_seq: BTreeMap<PlayerId, u32>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers an input, returning false if it was stale.
    pub fn push(&mut self, input: InboundInput) -> bool {
        if let Some(&seen) = self.last_seq.get(&input.player_id) {
            if input.seq <= seen {
                debug!(
                    "Dropping stale input {} from player {} (latest {})",
                    input.seq, input.player_id, seen
                );
                return false;
            }
        }
        self.last_seq.insert(input.player_id, input.seq);
        self.pending.insert(input.player_id, input.sanitized());
        true
    }

    /// Hands out every pending input in player-id order and clears the buffer.
    pub fn drain(&mut self) -> Vec<InboundInput> {
        std::mem::take(&mut self.pending).into_values().collect()
    }

    /// Forgets everything about a player that has left.
    pub fn remove_player(&mut self, player_id: PlayerId) {
        self.pending.remove(&player_id);
        self.last_seq.remove(&player_id);
    }

    pub fn last_seq(&self, player_id: PlayerId) -> Option<u32> {
        self.last_seq.get(&player_id).copied()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
