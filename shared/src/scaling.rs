//! Difficulty curves.
//!
//! Everything here is a pure function of the level (and for [`scale`], elapsed ticks and
//! party size). The per-level curves are flat through level 10 and grow afterwards; the
//! combined multipliers from [`scale`] never decrease as level or elapsed time grows.

use crate::{Tick, TICK_RATE};

pub const BASE_BOSS_HEALTH: f32 = 300.0;
pub const BASE_BOSS_DAMAGE: f32 = 35.0;
/// Keeps exponential health growth finite at very high levels.
pub const MAX_BOSS_HEALTH: f32 = 1.0e12;

/// Elapsed fight time after which enrage stops growing.
const ENRAGE_CAP_SECS: f32 = 120.0;

/// Combined multipliers applied to the boss for one fight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub boss_health_multiplier: f32,
    pub boss_damage_multiplier: f32,
    pub spawn_rate_multiplier: f32,
}

/// Maps level, time spent in the current fight and party size onto boss multipliers.
///
/// Health grows with every extra player; damage and attack rate creep up the longer a
/// fight lasts, capping after two minutes.
pub fn scale(level: u32, elapsed_ticks: Tick, player_count: usize) -> ScaleFactors {
    let party = 1.0 + 0.5 * player_count.saturating_sub(1) as f32;
    let elapsed_secs = elapsed_ticks as f32 / TICK_RATE as f32;
    let enrage = 1.0 + (elapsed_secs.min(ENRAGE_CAP_SECS) / 60.0) * 0.1;

    ScaleFactors {
        boss_health_multiplier: boss_health(level) / BASE_BOSS_HEALTH * party,
        boss_damage_multiplier: boss_damage(level) / BASE_BOSS_DAMAGE * enrage,
        spawn_rate_multiplier: enrage / boss_fire_delay(level, 1.0, 0.25),
    }
}

pub fn is_super_level(level: u32) -> bool {
    level > 0 && level % 10 == 0
}

pub fn boss_health(level: u32) -> f32 {
    if level <= 10 {
        BASE_BOSS_HEALTH + level as f32 * 50.0
    } else {
        (BASE_BOSS_HEALTH * 1.15f32.powi(level as i32)).min(MAX_BOSS_HEALTH)
    }
}

pub fn boss_damage(level: u32) -> f32 {
    if level <= 10 {
        return BASE_BOSS_DAMAGE;
    }
    let multiplier = 1.0 + ((level + 1) as f32).ln() * 0.1;
    (BASE_BOSS_DAMAGE * multiplier).floor().min(200.0)
}

/// Attack delay in seconds, shrinking past level 10 but never below `min_delay`.
pub fn boss_fire_delay(level: u32, base_delay: f32, min_delay: f32) -> f32 {
    if level <= 10 {
        return base_delay;
    }
    (base_delay * (-0.03 * (level - 10) as f32).exp()).max(min_delay)
}

pub fn player_damage_bonus(level: u32) -> f32 {
    if level <= 10 {
        0.0
    } else {
        5.0 * ((level + 1) as f32).ln()
    }
}

pub fn projectile_speed(level: u32, base_speed: f32) -> f32 {
    if level <= 5 {
        base_speed
    } else {
        base_speed * (1.0 + ((level - 4) as f32).ln() * 0.1)
    }
}

pub fn coin_reward(level: u32) -> u64 {
    let mut reward = 30.0 * level as f64;
    if is_super_level(level) {
        reward *= 3.0;
    }
    if level > 20 {
        reward *= 1.0 + (level as f64 / 20.0).ln() * 0.5;
    }
    reward as u64
}

pub fn laser_count(level: u32) -> u32 {
    match level {
        0..=2 => 3,
        3..=9 => 5,
        _ => (7 + level / 12).min(12),
    }
}

/// Half-width of the laser fan, in degrees.
pub fn laser_spread_degrees(level: u32) -> f32 {
    match level {
        0..=3 => 30.0,
        4..=14 => 45.0,
        _ => (60 + level).min(90) as f32,
    }
}

pub fn charge_speed(level: u32) -> f32 {
    600.0 + ((level + 1) as f32).ln() * 180.0
}

pub fn homing_count(level: u32) -> u32 {
    match level {
        0..=14 => 2,
        15..=24 => 3,
        _ => (4 + level / 20).min(8),
    }
}

pub fn spray_duration_secs(level: u32) -> f32 {
    let mut duration = if is_super_level(level) { 9.0 } else { 7.0 };
    if level > 40 {
        duration += ((level - 30) as f32).ln().min(3.0);
    }
    duration.min(12.0)
}

pub fn spray_bullet_count(level: u32) -> u32 {
    (16 + level / 15).min(20)
}
