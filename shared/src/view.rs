//! Client-side mirror of the authoritative world, built only from received messages.

use crate::protocol::{BossSnapshot, Message, PlayerId, PlayerSnapshot, Tick, WorldSnapshot};

#[derive(Debug, Clone, Default)]
pub struct WorldView {
    pub player_id: Option<PlayerId>,
    pub snapshot: Option<WorldSnapshot>,
    pub disconnect_reason: Option<String>,
}

impl WorldView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one server message into the view.
    ///
    /// Snapshots older than the current view and deltas that do not advance it are
    /// ignored, so replays and reordering never roll the mirror back.
    pub fn observe(&mut self, message: &Message) {
        match message {
            Message::JoinAck {
                player_id,
                snapshot,
            } => {
                self.player_id = Some(*player_id);
                self.snapshot = Some(snapshot.clone());
            }
            Message::WorldSnapshot(snapshot) => {
                if self.tick().map_or(true, |tick| snapshot.tick >= tick) {
                    self.snapshot = Some(snapshot.clone());
                }
            }
            Message::WorldDelta { tick, changed } => {
                if let Some(current) = self.snapshot.as_mut() {
                    if *tick > current.tick {
                        current.apply(*tick, changed);
                    }
                }
            }
            Message::Disconnect { reason } => {
                self.disconnect_reason = Some(reason.clone());
            }
            Message::Join { .. }
            | Message::Input { .. }
            | Message::AdminCommand { .. }
            | Message::Heartbeat => {}
        }
    }

    pub fn is_joined(&self) -> bool {
        self.player_id.is_some() && self.snapshot.is_some()
    }

    pub fn tick(&self) -> Option<Tick> {
        self.snapshot.as_ref().map(|s| s.tick)
    }

    pub fn me(&self) -> Option<&PlayerSnapshot> {
        let id = self.player_id?;
        self.snapshot.as_ref()?.player(id)
    }

    pub fn boss(&self) -> Option<&BossSnapshot> {
        self.snapshot.as_ref().map(|s| &s.boss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tests::test_snapshot;
    use crate::protocol::DeltaField;
    use crate::vector::Vec2;

    fn joined_view() -> WorldView {
        let mut view = WorldView::new();
        view.observe(&Message::JoinAck {
            player_id: 1,
            snapshot: test_snapshot(10),
        });
        view
    }

    #[test]
    fn test_join_ack_sets_identity() {
        let view = joined_view();
        assert!(view.is_joined());
        assert_eq!(view.me().map(|p| p.id), Some(1));
        assert_eq!(view.tick(), Some(10));
    }

    #[test]
    fn test_delta_before_join_is_ignored() {
        let mut view = WorldView::new();
        view.observe(&Message::WorldDelta {
            tick: 3,
            changed: vec![DeltaField::Level(4)],
        });
        assert!(view.snapshot.is_none());
    }

    #[test]
    fn test_stale_delta_is_ignored() {
        let mut view = joined_view();
        view.observe(&Message::WorldDelta {
            tick: 10,
            changed: vec![DeltaField::Level(9)],
        });
        assert_eq!(view.snapshot.as_ref().map(|s| s.level), Some(1));
    }

    #[test]
    fn test_delta_moves_player() {
        let mut view = joined_view();
        let mut moved = test_snapshot(11).players[0].clone();
        moved.position = Vec2::new(250.0, 260.0);
        view.observe(&Message::WorldDelta {
            tick: 11,
            changed: vec![DeltaField::PlayerUpdated(moved)],
        });
        assert_eq!(view.tick(), Some(11));
        assert_eq!(view.me().map(|p| p.position), Some(Vec2::new(250.0, 260.0)));
    }

    #[test]
    fn test_older_snapshot_does_not_roll_back() {
        let mut view = joined_view();
        view.observe(&Message::WorldSnapshot(test_snapshot(4)));
        assert_eq!(view.tick(), Some(10));
        view.observe(&Message::WorldSnapshot(test_snapshot(20)));
        assert_eq!(view.tick(), Some(20));
    }

    #[test]
    fn test_disconnect_records_reason() {
        let mut view = joined_view();
        view.observe(&Message::Disconnect {
            reason: "server shutting down".to_string(),
        });
        assert_eq!(view.disconnect_reason.as_deref(), Some("server shutting down"));
    }
}
