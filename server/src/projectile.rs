//! Projectiles in flight and their per-target hit bookkeeping.

use shared::protocol::{ProjectileKind, ProjectileOwner, ProjectileSnapshot};
use shared::vector::wrap_angle;
use shared::{circles_overlap, in_arena, PlayerId, ProjectileId, Vec2, PROJECTILE_RADIUS, TICK_DT};
use std::collections::BTreeSet;

/// Player homing rounds stop steering inside this distance so they cannot orbit.
const HOMING_MIN_DISTANCE: f32 = 40.0;
const HOMING_FALLOFF_DISTANCE: f32 = 100.0;
const PLAYER_HOMING_TURN_RATE: f32 = 0.25;
const BOSS_HOMING_TURN_RATE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Target {
    Boss,
    Player(PlayerId),
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: ProjectileId,
    pub owner: ProjectileOwner,
    pub kind: ProjectileKind,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Ticks left before the projectile expires.
    pub lifetime: u32,
    pub damage: f32,
    pub piercing: bool,
    has_hit: BTreeSet<Target>,
    spent: bool,
}

impl Projectile {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ProjectileId,
        owner: ProjectileOwner,
        kind: ProjectileKind,
        position: Vec2,
        velocity: Vec2,
        lifetime: u32,
        damage: f32,
        piercing: bool,
    ) -> Self {
        Self {
            id,
            owner,
            kind,
            position,
            velocity,
            lifetime,
            damage,
            piercing,
            has_hit: BTreeSet::new(),
            spent: false,
        }
    }

    pub fn has_hit(&self, target: Target) -> bool {
        self.has_hit.contains(&target)
    }

    pub fn hit_count(&self) -> usize {
        self.has_hit.len()
    }

    /// Steers (for homing kinds), moves and ages the projectile by one tick.
    ///
    /// `players` lists the positions of players that may still be targeted.
    pub fn advance(&mut self, boss: Vec2, players: &[(PlayerId, Vec2)], time_scale: f32) {
        if self.kind == ProjectileKind::Homing {
            match self.owner {
                ProjectileOwner::Player(_) => {
                    if !self.has_hit(Target::Boss) {
                        self.steer_player_round(boss);
                    }
                }
                ProjectileOwner::Boss => {
                    let target = players
                        .iter()
                        .filter(|(id, _)| !self.has_hit(Target::Player(*id)))
                        .map(|(_, position)| *position)
                        .min_by(|a, b| {
                            a.distance(self.position)
                                .total_cmp(&b.distance(self.position))
                        });
                    if let Some(target) = target {
                        self.turn_towards(target, BOSS_HOMING_TURN_RATE);
                    }
                }
            }
        }

        self.position = self.position + self.velocity.scale(TICK_DT * time_scale);
        self.lifetime = self.lifetime.saturating_sub(1);
    }

    fn steer_player_round(&mut self, boss: Vec2) {
        let distance = self.position.distance(boss);
        if distance <= HOMING_MIN_DISTANCE {
            return;
        }
        let rate = if distance < HOMING_FALLOFF_DISTANCE {
            PLAYER_HOMING_TURN_RATE * distance / HOMING_FALLOFF_DISTANCE
        } else {
            PLAYER_HOMING_TURN_RATE
        };
        self.turn_towards(boss, rate);
    }

    fn turn_towards(&mut self, target: Vec2, rate: f32) {
        let speed = self.velocity.length();
        if speed == 0.0 {
            return;
        }
        let heading = self.velocity.angle();
        let wanted = (target - self.position).angle();
        let heading = heading + wrap_angle(wanted - heading) * rate;
        self.velocity = Vec2::from_angle(heading).scale(speed);
    }

    /// Registers a hit on `target` if the projectile overlaps it and has not hit it yet.
    ///
    /// Returns the damage to apply. A non-piercing projectile is spent by its first hit.
    pub fn try_hit(&mut self, target: Target, position: Vec2, radius: f32) -> Option<f32> {
        if self.spent || self.has_hit(target) {
            return None;
        }
        if !circles_overlap(self.position, PROJECTILE_RADIUS, position, radius) {
            return None;
        }
        self.has_hit.insert(target);
        if !self.piercing {
            self.spent = true;
        }
        Some(self.damage)
    }

    pub fn is_expired(&self) -> bool {
        self.spent || self.lifetime == 0 || !in_arena(self.position)
    }

    pub fn snapshot(&self) -> ProjectileSnapshot {
        ProjectileSnapshot {
            id: self.id,
            owner: self.owner,
            kind: self.kind,
            position: self.position,
            velocity: self.velocity,
            lifetime: self.lifetime,
            damage: self.damage,
            piercing: self.piercing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{BOSS_HOME, BOSS_RADIUS, PLAYER_RADIUS};

    fn shot(kind: ProjectileKind, position: Vec2, velocity: Vec2, piercing: bool) -> Projectile {
        Projectile::new(1, ProjectileOwner::Player(1), kind, position, velocity, 60, 5.0, piercing)
    }

    #[test]
    fn test_straight_motion_and_aging() {
        let mut p = shot(
            ProjectileKind::Straight,
            Vec2::new(100.0, 100.0),
            Vec2::new(300.0, 0.0),
            false,
        );
        p.advance(BOSS_HOME, &[], 1.0);
        assert_approx_eq!(p.position.x, 110.0, 1e-3);
        assert_eq!(p.lifetime, 59);
    }

    #[test]
    fn test_time_scale_scales_displacement() {
        let mut p = shot(
            ProjectileKind::Straight,
            Vec2::new(100.0, 100.0),
            Vec2::new(300.0, 0.0),
            false,
        );
        p.advance(BOSS_HOME, &[], 0.5);
        assert_approx_eq!(p.position.x, 105.0, 1e-3);
        assert_eq!(p.lifetime, 59);
    }

    #[test]
    fn test_non_piercing_is_spent_by_first_hit() {
        let mut p = shot(ProjectileKind::Straight, BOSS_HOME, Vec2::ZERO, false);
        assert_eq!(p.try_hit(Target::Boss, BOSS_HOME, BOSS_RADIUS), Some(5.0));
        assert!(p.is_expired());
        assert_eq!(p.try_hit(Target::Player(2), BOSS_HOME, PLAYER_RADIUS), None);
    }

    #[test]
    fn test_piercing_hits_each_target_once() {
        let mut p = shot(ProjectileKind::Piercing, BOSS_HOME, Vec2::ZERO, true);
        assert!(p.try_hit(Target::Boss, BOSS_HOME, BOSS_RADIUS).is_some());
        assert!(p.try_hit(Target::Boss, BOSS_HOME, BOSS_RADIUS).is_none());
        assert!(p.try_hit(Target::Player(3), BOSS_HOME, PLAYER_RADIUS).is_some());
        assert_eq!(p.hit_count(), 2);
        assert!(!p.is_expired());
    }

    #[test]
    fn test_miss_records_nothing() {
        let mut p = shot(ProjectileKind::Straight, Vec2::new(20.0, 20.0), Vec2::ZERO, false);
        assert!(p.try_hit(Target::Boss, BOSS_HOME, BOSS_RADIUS).is_none());
        assert_eq!(p.hit_count(), 0);
    }

    #[test]
    fn test_player_homing_turns_towards_boss() {
        let mut p = shot(
            ProjectileKind::Homing,
            Vec2::new(100.0, 300.0),
            Vec2::new(0.0, -700.0),
            false,
        );
        p.advance(BOSS_HOME, &[], 1.0);
        assert!(p.velocity.x > 0.0);
        assert_approx_eq!(p.velocity.length(), 700.0, 1e-2);
    }

    #[test]
    fn test_player_homing_stops_after_hitting_boss() {
        let mut p = shot(ProjectileKind::Homing, BOSS_HOME, Vec2::new(0.0, -700.0), true);
        assert!(p.try_hit(Target::Boss, BOSS_HOME, BOSS_RADIUS).is_some());
        p.position = Vec2::new(100.0, 300.0);
        p.advance(BOSS_HOME, &[], 1.0);
        assert_approx_eq!(p.velocity.x, 0.0);
    }

    #[test]
    fn test_player_homing_ignores_boss_when_close() {
        let mut p = shot(
            ProjectileKind::Homing,
            Vec2::new(BOSS_HOME.x - 30.0, BOSS_HOME.y),
            Vec2::new(0.0, -700.0),
            false,
        );
        p.advance(BOSS_HOME, &[], 1.0);
        assert_approx_eq!(p.velocity.x, 0.0);
    }

    #[test]
    fn test_out_of_arena_expires() {
        let p = shot(ProjectileKind::Straight, Vec2::new(-5.0, 10.0), Vec2::ZERO, false);
        assert!(p.is_expired());
    }
}
