//! Types and rules shared by the arena server and its clients.
//!
//! * [`protocol`] defines every message that crosses the wire.
//! * [`codec`] frames those messages over a byte stream.
//! * [`scaling`] holds the difficulty curves the boss is tuned with.
//! * [`view`] and [`bot`] let any client mirror the world and play it autonomously.
//!
//! Arena geometry and tuning constants live at the crate root so the server and the
//! clients always agree on them.

pub mod bot;
pub mod codec;
pub mod protocol;
pub mod scaling;
pub mod vector;
pub mod view;

pub use bot::BotController;
pub use codec::{Decoded, FrameBuffer, ProtocolError};
pub use protocol::{Message, PlayerId, ProjectileId, Tick, WorldSnapshot};
pub use vector::Vec2;
pub use view::WorldView;

pub const TICK_RATE: u32 = 30;
pub const TICK_DT: f32 = 1.0 / TICK_RATE as f32;

pub const ARENA_WIDTH: f32 = 800.0;
pub const ARENA_HEIGHT: f32 = 600.0;
/// Players are kept this far from the arena edge.
pub const ARENA_MARGIN: f32 = 20.0;

pub const PLAYER_RADIUS: f32 = 15.0;
pub const BOSS_RADIUS: f32 = 60.0;
pub const PROJECTILE_RADIUS: f32 = 8.0;

pub const PLAYER_MAX_HEALTH: f32 = 100.0;
pub const PLAYER_SPEED: f32 = 400.0;
pub const BOSS_HOME: Vec2 = Vec2::new(ARENA_WIDTH / 2.0, ARENA_HEIGHT / 2.0);

pub const MAX_NAME_LEN: usize = 16;
pub const DEFAULT_PORT: u16 = 5555;

/// Converts a duration to whole ticks, rounding up so a cooldown never ends early.
pub fn secs_to_ticks(secs: f32) -> u32 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * TICK_RATE as f32).ceil() as u32
}

pub fn circles_overlap(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> bool {
    let reach = radius_a + radius_b;
    let d = a - b;
    d.x * d.x + d.y * d.y < reach * reach
}

/// Clamps a player position into the playable rectangle.
pub fn clamp_to_arena(position: Vec2) -> Vec2 {
    position.clamp_to(
        Vec2::new(ARENA_MARGIN, ARENA_MARGIN),
        Vec2::new(ARENA_WIDTH - ARENA_MARGIN, ARENA_HEIGHT - ARENA_MARGIN),
    )
}

pub fn in_arena(position: Vec2) -> bool {
    (0.0..=ARENA_WIDTH).contains(&position.x) && (0.0..=ARENA_HEIGHT).contains(&position.y)
}
