//! Boss combat state machine.
//!
//! The boss cycles `Idle -> SelectingAttack -> ExecutingAttack -> Cooldown -> Idle`,
//! advancing at most one phase per tick. `Defeated` is terminal for the current fight.
//!
//! Every attack has its own cooldown, counted down each tick and armed when the attack
//! starts. Spray additionally arms a lockout when it finishes that outlasts its cooldown,
//! so it can never chain. Dropping to 30% health switches the boss to the berserk tier,
//! which only re-weights attack selection.
//!
//! A timeshatter freezes the machine: while frozen nothing advances, cooldowns included.
//!
//! The machine never touches players or projectiles directly: it returns spawn records
//! and melee hits for the world to apply.

use crate::projectile::Projectile;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;
use shared::protocol::{
    AttackKind, BossPhaseKind, BossSnapshot, BossTier, ProjectileKind, ProjectileOwner,
};
use shared::scaling::{self, ScaleFactors};
use shared::vector::wrap_angle;
use shared::{
    circles_overlap, secs_to_ticks, PlayerId, ProjectileId, Vec2, ARENA_HEIGHT, ARENA_WIDTH,
    BOSS_HOME, BOSS_RADIUS, PLAYER_RADIUS, TICK_DT,
};
use std::collections::{BTreeMap, BTreeSet};
use std::f32::consts::TAU;

const BERSERK_THRESHOLD: f32 = 0.3;

const LASER_DAMAGE: f32 = 12.0;
const SPRAY_DAMAGE: f32 = 15.0;
const HOMING_DAMAGE: f32 = 20.0;
const MELEE_DAMAGE: f32 = 25.0;

const LASER_EXECUTE_SECS: f32 = 0.3;
const HOMING_EXECUTE_SECS: f32 = 0.5;
const CHARGE_SECS: f32 = 0.5;
const SPRAY_WARMUP_SECS: f32 = 1.5;
const SPRAY_LOCKOUT_EXTRA_SECS: f32 = 3.0;
const SPRAY_RING_INTERVAL: u32 = 6;
const SPRAY_ROTATION_PER_SEC: f32 = 0.6;
const SPRAY_GAP_DRIFT_PER_SEC: f32 = 1.2;
const SPRAY_GAP_HALF_WIDTH: f32 = 0.35;

const RECOVERY_SECS: f32 = 0.5;
const BERSERK_RECOVERY_SECS: f32 = 0.25;

const LASER_LIFETIME_SECS: f32 = 3.0;
const SPRAY_LIFETIME_SECS: f32 = 4.0;
const HOMING_LIFETIME_SECS: f32 = 6.0;

const HOMING_MIN_LEVEL: u32 = 8;
const SPRAY_MIN_LEVEL: u32 = 25;

/// Base and minimum cooldown in seconds, before the spawn-rate multiplier.
fn cooldown_bounds(kind: AttackKind) -> (f32, f32) {
    match kind {
        AttackKind::Laser => (2.0, 1.5),
        AttackKind::Melee => (7.0, 2.0),
        AttackKind::HomingPiercing => (6.0, 2.5),
        AttackKind::Spray => (12.0, 6.0),
    }
}

fn selection_weight(kind: AttackKind, tier: BossTier) -> u32 {
    match (tier, kind) {
        (BossTier::Normal, AttackKind::Laser) => 4,
        (BossTier::Normal, AttackKind::Melee) => 2,
        (BossTier::Normal, AttackKind::HomingPiercing) => 3,
        (BossTier::Normal, AttackKind::Spray) => 2,
        (BossTier::Berserk, AttackKind::Laser) => 3,
        (BossTier::Berserk, AttackKind::Melee) => 4,
        (BossTier::Berserk, AttackKind::HomingPiercing) => 3,
        (BossTier::Berserk, AttackKind::Spray) => 4,
    }
}

fn level_allows(kind: AttackKind, level: u32) -> bool {
    match kind {
        AttackKind::Laser | AttackKind::Melee => true,
        AttackKind::HomingPiercing => level >= HOMING_MIN_LEVEL,
        AttackKind::Spray => level >= SPRAY_MIN_LEVEL,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BossPhase {
    Idle,
    SelectingAttack,
    ExecutingAttack {
        kind: AttackKind,
        elapsed: u32,
        duration: u32,
    },
    Cooldown {
        remaining: u32,
    },
    Defeated,
}

impl BossPhase {
    pub fn kind(&self) -> BossPhaseKind {
        match self {
            BossPhase::Idle => BossPhaseKind::Idle,
            BossPhase::SelectingAttack => BossPhaseKind::SelectingAttack,
            BossPhase::ExecutingAttack { .. } => BossPhaseKind::ExecutingAttack,
            BossPhase::Cooldown { .. } => BossPhaseKind::Cooldown,
            BossPhase::Defeated => BossPhaseKind::Defeated,
        }
    }
}

/// A projectile the boss wants created. The world assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileSpawn {
    pub kind: ProjectileKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub lifetime: u32,
    pub damage: f32,
    pub piercing: bool,
}

impl ProjectileSpawn {
    pub fn into_projectile(self, id: ProjectileId) -> Projectile {
        Projectile::new(
            id,
            ProjectileOwner::Boss,
            self.kind,
            self.position,
            self.velocity,
            self.lifetime,
            self.damage,
            self.piercing,
        )
    }
}

/// Per-tick inputs to the boss.
#[derive(Debug, Clone, Copy)]
pub struct BossContext<'a> {
    pub level: u32,
    pub factors: ScaleFactors,
    /// Living, targetable players in id order.
    pub targets: &'a [(PlayerId, Vec2)],
    pub time_scale: f32,
}

#[derive(Debug, Default, PartialEq)]
pub struct BossOutput {
    pub spawns: Vec<ProjectileSpawn>,
    pub melee_hits: Vec<(PlayerId, f32)>,
}

#[derive(Debug, Clone)]
struct Charge {
    direction: Vec2,
    speed: f32,
    struck: BTreeSet<PlayerId>,
}

#[derive(Debug, Clone, Copy)]
struct SprayPattern {
    rotation: f32,
    gap_angle: f32,
    warmup: u32,
}

#[derive(Debug, Clone)]
pub struct BossCombat {
    pub position: Vec2,
    pub health: f32,
    pub max_health: f32,
    phase: BossPhase,
    tier: BossTier,
    cooldowns: BTreeMap<AttackKind, u32>,
    spray_lockout: u32,
    charge: Option<Charge>,
    spray: Option<SprayPattern>,
    /// Aim fixed at the start of the current attack.
    aim: Option<Vec2>,
    frozen: u32,
}

impl BossCombat {
    pub fn new(max_health: f32) -> Self {
        let max_health = if max_health.is_finite() && max_health > 0.0 {
            max_health
        } else {
            scaling::BASE_BOSS_HEALTH
        };
        Self {
            position: BOSS_HOME,
            health: max_health,
            max_health,
            phase: BossPhase::Idle,
            tier: BossTier::Normal,
            cooldowns: AttackKind::ALL.iter().map(|k| (*k, 0)).collect(),
            spray_lockout: 0,
            charge: None,
            spray: None,
            aim: None,
            frozen: 0,
        }
    }

    pub fn phase(&self) -> BossPhase {
        self.phase
    }

    pub fn tier(&self) -> BossTier {
        self.tier
    }

    pub fn is_defeated(&self) -> bool {
        self.phase == BossPhase::Defeated
    }

    pub fn cooldown(&self, kind: AttackKind) -> u32 {
        self.cooldowns.get(&kind).copied().unwrap_or(0)
    }

    pub fn spray_lockout(&self) -> u32 {
        self.spray_lockout
    }

    pub fn frozen_ticks(&self) -> u32 {
        self.frozen
    }

    /// Holds the machine still for `ticks`. Overlapping freezes don't add up.
    pub fn freeze(&mut self, ticks: u32) {
        if self.is_defeated() {
            return;
        }
        debug!("Boss frozen for {} ticks", ticks);
        self.frozen = self.frozen.max(ticks);
    }

    pub fn active_attack(&self) -> Option<AttackKind> {
        match self.phase {
            BossPhase::ExecutingAttack { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Cooldown in ticks armed when `kind` starts.
    pub fn cooldown_ticks(kind: AttackKind, factors: &ScaleFactors) -> u32 {
        let (base, min) = cooldown_bounds(kind);
        let rate = if factors.spawn_rate_multiplier.is_finite() && factors.spawn_rate_multiplier > 0.0 {
            factors.spawn_rate_multiplier
        } else {
            1.0
        };
        secs_to_ticks((base / rate).max(min))
    }

    /// Applies player damage. Returns true if this hit defeated the boss.
    pub fn apply_damage(&mut self, amount: f32) -> bool {
        if self.is_defeated() || !amount.is_finite() || amount <= 0.0 {
            return false;
        }
        self.health = (self.health - amount).max(0.0);
        if self.health == 0.0 {
            self.defeat();
            return true;
        }
        if self.tier == BossTier::Normal && self.health <= self.max_health * BERSERK_THRESHOLD {
            info!("Boss enters berserk at {:.0}/{:.0}", self.health, self.max_health);
            self.tier = BossTier::Berserk;
        }
        false
    }

    pub fn defeat(&mut self) {
        self.health = 0.0;
        self.phase = BossPhase::Defeated;
        self.charge = None;
        self.spray = None;
        self.aim = None;
        self.frozen = 0;
    }

    /// Advances the machine by one tick.
    pub fn step(&mut self, ctx: &BossContext, rng: &mut StdRng) -> BossOutput {
        let mut output = BossOutput::default();
        if self.is_defeated() {
            return output;
        }
        if self.frozen > 0 {
            self.frozen -= 1;
            return output;
        }

        for remaining in self.cooldowns.values_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        self.spray_lockout = self.spray_lockout.saturating_sub(1);

        self.phase = match self.phase {
            BossPhase::Idle => {
                if ctx.targets.is_empty() {
                    BossPhase::Idle
                } else {
                    BossPhase::SelectingAttack
                }
            }
            BossPhase::SelectingAttack => self.select_attack(ctx, rng),
            BossPhase::ExecutingAttack {
                kind,
                elapsed,
                duration,
            } => {
                self.execute(kind, elapsed, duration, ctx, rng, &mut output);
                let elapsed = elapsed + 1;
                if elapsed >= duration {
                    self.finish_attack(kind, ctx);
                    BossPhase::Cooldown {
                        remaining: self.recovery_ticks(),
                    }
                } else {
                    BossPhase::ExecutingAttack {
                        kind,
                        elapsed,
                        duration,
                    }
                }
            }
            BossPhase::Cooldown { remaining } => {
                if remaining <= 1 {
                    BossPhase::Idle
                } else {
                    BossPhase::Cooldown {
                        remaining: remaining - 1,
                    }
                }
            }
            BossPhase::Defeated => BossPhase::Defeated,
        };

        output
    }

    pub fn is_eligible(&self, kind: AttackKind, level: u32) -> bool {
        if !level_allows(kind, level) || self.cooldown(kind) > 0 {
            return false;
        }
        kind != AttackKind::Spray || self.spray_lockout == 0
    }

    fn select_attack(&mut self, ctx: &BossContext, rng: &mut StdRng) -> BossPhase {
        let Some(target) = self.nearest_target(ctx.targets) else {
            return BossPhase::Idle;
        };

        let candidates: Vec<(AttackKind, u32)> = AttackKind::ALL
            .iter()
            .filter(|kind| self.is_eligible(**kind, ctx.level))
            .map(|kind| (*kind, selection_weight(*kind, self.tier)))
            .collect();
        let total: u32 = candidates.iter().map(|(_, weight)| weight).sum();
        if total == 0 {
            return BossPhase::Idle;
        }

        let mut roll = rng.gen_range(0..total);
        let mut chosen = candidates[0].0;
        for (kind, weight) in &candidates {
            if roll < *weight {
                chosen = *kind;
                break;
            }
            roll -= weight;
        }

        self.begin_attack(chosen, target, ctx)
    }

    fn begin_attack(&mut self, kind: AttackKind, target: Vec2, ctx: &BossContext) -> BossPhase {
        self.cooldowns
            .insert(kind, Self::cooldown_ticks(kind, &ctx.factors));
        self.aim = Some(target);

        let duration = match kind {
            AttackKind::Laser => secs_to_ticks(LASER_EXECUTE_SECS),
            AttackKind::HomingPiercing => secs_to_ticks(HOMING_EXECUTE_SECS),
            AttackKind::Melee => {
                self.charge = Some(Charge {
                    direction: (target - self.position).normalize(),
                    speed: scaling::charge_speed(ctx.level),
                    struck: BTreeSet::new(),
                });
                secs_to_ticks(CHARGE_SECS) * 2
            }
            AttackKind::Spray => {
                let warmup = secs_to_ticks(SPRAY_WARMUP_SECS);
                self.spray = Some(SprayPattern {
                    rotation: 0.0,
                    gap_angle: (target - self.position).angle(),
                    warmup,
                });
                warmup + secs_to_ticks(scaling::spray_duration_secs(ctx.level))
            }
        };

        debug!("Boss starts {:?} for {} ticks", kind, duration);
        BossPhase::ExecutingAttack {
            kind,
            elapsed: 0,
            duration: duration.max(1),
        }
    }

    fn finish_attack(&mut self, kind: AttackKind, ctx: &BossContext) {
        match kind {
            AttackKind::Spray => {
                self.spray = None;
                self.spray_lockout = Self::cooldown_ticks(AttackKind::Spray, &ctx.factors)
                    + secs_to_ticks(SPRAY_LOCKOUT_EXTRA_SECS);
            }
            AttackKind::Melee => {
                self.charge = None;
                self.position = BOSS_HOME;
            }
            AttackKind::Laser | AttackKind::HomingPiercing => {}
        }
        self.aim = None;
    }

    fn recovery_ticks(&self) -> u32 {
        match self.tier {
            BossTier::Normal => secs_to_ticks(RECOVERY_SECS),
            BossTier::Berserk => secs_to_ticks(BERSERK_RECOVERY_SECS),
        }
    }

    fn execute(
        &mut self,
        kind: AttackKind,
        elapsed: u32,
        duration: u32,
        ctx: &BossContext,
        rng: &mut StdRng,
        output: &mut BossOutput,
    ) {
        let damage_multiplier = ctx.factors.boss_damage_multiplier;
        match kind {
            AttackKind::Laser => {
                if elapsed == 0 {
                    self.fire_laser_fan(ctx.level, LASER_DAMAGE * damage_multiplier, output);
                }
            }
            AttackKind::HomingPiercing => {
                if elapsed == 0 {
                    let speed = scaling::projectile_speed(ctx.level, 200.0);
                    for _ in 0..scaling::homing_count(ctx.level) {
                        let angle = rng.gen_range(0.0..TAU);
                        output.spawns.push(ProjectileSpawn {
                            kind: ProjectileKind::Homing,
                            position: self.position,
                            velocity: Vec2::from_angle(angle).scale(speed),
                            lifetime: secs_to_ticks(HOMING_LIFETIME_SECS),
                            damage: HOMING_DAMAGE * damage_multiplier,
                            piercing: true,
                        });
                    }
                }
            }
            AttackKind::Melee => {
                self.advance_charge(elapsed, duration, ctx);
                self.strike(ctx.targets, MELEE_DAMAGE * damage_multiplier, output);
            }
            AttackKind::Spray => {
                self.emit_spray(elapsed, ctx, SPRAY_DAMAGE * damage_multiplier, output);
            }
        }
    }

    fn fire_laser_fan(&self, level: u32, damage: f32, output: &mut BossOutput) {
        let Some(aim) = self.aim else {
            return;
        };
        let count = scaling::laser_count(level);
        let spread = scaling::laser_spread_degrees(level).to_radians();
        let speed = scaling::projectile_speed(level, 400.0);
        let base = (aim - self.position).angle();

        for i in 0..count {
            let angle = if count > 1 {
                base + (i as f32 / (count - 1) as f32 - 0.5) * spread * 2.0
            } else {
                base
            };
            output.spawns.push(ProjectileSpawn {
                kind: ProjectileKind::LaserSegment,
                position: self.position,
                velocity: Vec2::from_angle(angle).scale(speed),
                lifetime: secs_to_ticks(LASER_LIFETIME_SECS),
                damage,
                piercing: false,
            });
        }
    }

    fn advance_charge(&mut self, elapsed: u32, duration: u32, ctx: &BossContext) {
        let Some(charge) = self.charge.as_ref() else {
            return;
        };
        let outbound = duration / 2;
        if elapsed < outbound {
            let step = charge.direction.scale(charge.speed * TICK_DT * ctx.time_scale);
            self.position = clamp_boss(self.position + step);
        } else {
            // Close a fixed fraction of the way home so the boss lands exactly on time.
            let remaining = (duration - elapsed).max(1) as f32;
            self.position = self.position + (BOSS_HOME - self.position).scale(1.0 / remaining);
        }
    }

    fn strike(&mut self, targets: &[(PlayerId, Vec2)], damage: f32, output: &mut BossOutput) {
        let position = self.position;
        let Some(charge) = self.charge.as_mut() else {
            return;
        };
        for (id, target) in targets {
            if charge.struck.contains(id) {
                continue;
            }
            if circles_overlap(position, BOSS_RADIUS, *target, PLAYER_RADIUS) {
                charge.struck.insert(*id);
                output.melee_hits.push((*id, damage));
            }
        }
    }

    fn emit_spray(&mut self, elapsed: u32, ctx: &BossContext, damage: f32, output: &mut BossOutput) {
        let position = self.position;
        let Some(spray) = self.spray.as_mut() else {
            return;
        };
        if elapsed < spray.warmup {
            return;
        }

        spray.rotation += SPRAY_ROTATION_PER_SEC * TICK_DT;
        spray.gap_angle += SPRAY_GAP_DRIFT_PER_SEC * TICK_DT;

        if (elapsed - spray.warmup) % SPRAY_RING_INTERVAL != 0 {
            return;
        }

        let count = scaling::spray_bullet_count(ctx.level);
        let speed = scaling::projectile_speed(ctx.level, 400.0);
        for i in 0..count {
            let angle = i as f32 / count as f32 * TAU + spray.rotation;
            if wrap_angle(angle - spray.gap_angle).abs() < SPRAY_GAP_HALF_WIDTH {
                continue;
            }
            output.spawns.push(ProjectileSpawn {
                kind: ProjectileKind::SprayShard,
                position,
                velocity: Vec2::from_angle(angle).scale(speed),
                lifetime: secs_to_ticks(SPRAY_LIFETIME_SECS),
                damage,
                piercing: false,
            });
        }
    }

    /// Nearest living target, ties broken by lowest id.
    fn nearest_target(&self, targets: &[(PlayerId, Vec2)]) -> Option<Vec2> {
        let mut best: Option<(f32, Vec2)> = None;
        for (_, position) in targets {
            let distance = position.distance(self.position);
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, *position));
            }
        }
        best.map(|(_, position)| position)
    }

    pub fn snapshot(&self) -> BossSnapshot {
        BossSnapshot {
            position: self.position,
            health: self.health,
            max_health: self.max_health,
            phase: self.phase.kind(),
            tier: self.tier,
            active_attack: self.active_attack(),
            frozen_ticks: self.frozen,
        }
    }
}

fn clamp_boss(position: Vec2) -> Vec2 {
    position.clamp_to(
        Vec2::new(BOSS_RADIUS, BOSS_RADIUS),
        Vec2::new(ARENA_WIDTH - BOSS_RADIUS, ARENA_HEIGHT - BOSS_RADIUS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn factors() -> ScaleFactors {
        scaling::scale(1, 0, 1)
    }

    fn ctx<'a>(level: u32, targets: &'a [(PlayerId, Vec2)]) -> BossContext<'a> {
        BossContext {
            level,
            factors: scaling::scale(level, 0, 1),
            targets,
            time_scale: 1.0,
        }
    }

    fn far_target() -> [(PlayerId, Vec2); 1] {
        [(1, Vec2::new(100.0, 100.0))]
    }

    #[test]
    fn test_idle_without_targets() {
        let mut boss = BossCombat::new(350.0);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10 {
            let output = boss.step(&ctx(1, &[]), &mut rng);
            assert_eq!(output, BossOutput::default());
            assert_eq!(boss.phase(), BossPhase::Idle);
        }
    }

    #[test]
    fn test_freeze_holds_phase_and_cooldowns() {
        let mut boss = BossCombat::new(350.0);
        let mut rng = StdRng::seed_from_u64(2);
        let targets = far_target();
        boss.step(&ctx(1, &targets), &mut rng);
        boss.step(&ctx(1, &targets), &mut rng);
        let phase = boss.phase();
        let laser = boss.cooldown(AttackKind::Laser);

        boss.freeze(10);
        boss.freeze(4);
        assert_eq!(boss.snapshot().frozen_ticks, 10);
        for _ in 0..10 {
            assert_eq!(boss.step(&ctx(1, &targets), &mut rng), BossOutput::default());
            assert_eq!(boss.phase(), phase);
            assert_eq!(boss.cooldown(AttackKind::Laser), laser);
        }
        assert_eq!(boss.frozen_ticks(), 0);
        boss.step(&ctx(1, &targets), &mut rng);
        assert_ne!(boss.phase(), phase);
    }

    #[test]
    fn test_phase_cycle() {
        let mut boss = BossCombat::new(350.0);
        let mut rng = StdRng::seed_from_u64(2);
        let targets = far_target();
        boss.step(&ctx(1, &targets), &mut rng);
        assert_eq!(boss.phase(), BossPhase::SelectingAttack);
        boss.step(&ctx(1, &targets), &mut rng);
        assert!(matches!(boss.phase(), BossPhase::ExecutingAttack { .. }));

        let mut saw_cooldown = false;
        for _ in 0..200 {
            boss.step(&ctx(1, &targets), &mut rng);
            if matches!(boss.phase(), BossPhase::Cooldown { .. }) {
                saw_cooldown = true;
            }
        }
        assert!(saw_cooldown);
    }

    #[test]
    fn test_level_gates() {
        let boss = BossCombat::new(350.0);
        assert!(!boss.is_eligible(AttackKind::HomingPiercing, 7));
        assert!(boss.is_eligible(AttackKind::HomingPiercing, 8));
        assert!(!boss.is_eligible(AttackKind::Spray, 24));
        assert!(boss.is_eligible(AttackKind::Spray, 25));
    }

    #[test]
    fn test_laser_cooldown_at_least_one_and_a_half_seconds() {
        let mut fast = factors();
        fast.spawn_rate_multiplier = 100.0;
        assert!(BossCombat::cooldown_ticks(AttackKind::Laser, &fast) >= secs_to_ticks(1.5));
    }

    #[test]
    fn test_laser_fan_spawns_segments() {
        let mut boss = BossCombat::new(350.0);
        let targets = far_target();
        let context = ctx(1, &targets);
        let phase = boss.begin_attack(AttackKind::Laser, targets[0].1, &context);
        boss.phase = phase;
        let mut rng = StdRng::seed_from_u64(3);
        let output = boss.step(&context, &mut rng);
        assert_eq!(output.spawns.len(), 3);
        assert!(output
            .spawns
            .iter()
            .all(|s| s.kind == ProjectileKind::LaserSegment && !s.piercing));
        assert!(boss.cooldown(AttackKind::Laser) > 0);
        assert!(!boss.is_eligible(AttackKind::Laser, 1));
    }

    #[test]
    fn test_melee_strikes_each_player_once() {
        let mut boss = BossCombat::new(350.0);
        let targets = [(1, Vec2::new(BOSS_HOME.x + 70.0, BOSS_HOME.y))];
        let context = ctx(1, &targets);
        boss.phase = boss.begin_attack(AttackKind::Melee, targets[0].1, &context);
        let mut rng = StdRng::seed_from_u64(4);

        let mut hits = 0;
        while matches!(boss.phase(), BossPhase::ExecutingAttack { .. }) {
            hits += boss.step(&context, &mut rng).melee_hits.len();
        }
        assert_eq!(hits, 1);
        assert_eq!(boss.position, BOSS_HOME);
    }

    #[test]
    fn test_spray_lockout_outlasts_cooldown() {
        let mut boss = BossCombat::new(350.0);
        let targets = far_target();
        let context = ctx(30, &targets);
        boss.phase = boss.begin_attack(AttackKind::Spray, targets[0].1, &context);
        let mut rng = StdRng::seed_from_u64(5);

        let mut shards = 0;
        while matches!(boss.phase(), BossPhase::ExecutingAttack { .. }) {
            shards += boss.step(&context, &mut rng).spawns.len();
        }
        assert!(shards > 0);
        assert!(boss.spray_lockout() > boss.cooldown(AttackKind::Spray));
        assert!(
            boss.spray_lockout() > BossCombat::cooldown_ticks(AttackKind::Spray, &context.factors)
        );
        assert!(!boss.is_eligible(AttackKind::Spray, 30));
    }

    #[test]
    fn test_berserk_keeps_cooldowns() {
        let mut boss = BossCombat::new(100.0);
        boss.cooldowns.insert(AttackKind::Melee, 40);
        assert!(!boss.apply_damage(75.0));
        assert_eq!(boss.tier(), BossTier::Berserk);
        assert_eq!(boss.cooldown(AttackKind::Melee), 40);
    }

    #[test]
    fn test_defeat_is_terminal() {
        let mut boss = BossCombat::new(1.0);
        let targets = far_target();
        assert!(boss.apply_damage(5.0));
        assert_eq!(boss.health, 0.0);
        let mut rng = StdRng::seed_from_u64(6);
        for _ in 0..100 {
            assert_eq!(boss.step(&ctx(1, &targets), &mut rng), BossOutput::default());
        }
        assert_eq!(boss.phase(), BossPhase::Defeated);
        assert!(!boss.apply_damage(5.0));
    }
}
