//! Authoritative per-player state and the actions a player can take in a tick.

use crate::input::InboundInput;
use crate::projectile::Projectile;
use shared::protocol::{
    Ability, AbilityCooldowns, ActionFlags, PeerRole, PlayerSnapshot, ProjectileKind,
    ProjectileOwner,
};
use shared::{
    clamp_to_arena, scaling, secs_to_ticks, PlayerId, ProjectileId, Vec2, ARENA_HEIGHT,
    ARENA_WIDTH, BOSS_HOME, PLAYER_MAX_HEALTH, PLAYER_SPEED, TICK_DT,
};
use std::f32::consts::PI;

const SHOT_SPEED: f32 = 700.0;
const SHOT_LIFETIME_SECS: f32 = 2.0;
const DASH_DISTANCE: f32 = 150.0;
const DASH_DISTANCE_PER_STACK: f32 = 20.0;
const PARRY_WINDOW_SECS: f32 = 0.35;
/// Stacks shorten cooldowns by 15% each, but never below this.
const MIN_ABILITY_COOLDOWN_SECS: f32 = 1.0;
pub const MAX_ABILITY_STACKS: u32 = 5;
const SPAWN_RADIUS: f32 = 250.0;
const SPAWN_RING_STEP: f32 = 35.0;
const SPAWN_SLOTS: u32 = 5;

/// Cooldown at one stack.
fn base_cooldown_secs(ability: Ability) -> f32 {
    match ability {
        Ability::Dash => 2.0,
        Ability::Teleport => 8.0,
        Ability::Timeshatter => 14.0,
        Ability::Shockwave => 10.0,
        Ability::Parry => 1.0,
    }
}

pub fn ability_cooldown_ticks(ability: Ability, stacks: u32) -> u32 {
    let extra = stacks.clamp(1, MAX_ABILITY_STACKS) - 1;
    let secs = base_cooldown_secs(ability) * 0.85f32.powi(extra as i32);
    secs_to_ticks(secs.max(MIN_ABILITY_COOLDOWN_SECS))
}

/// Upgrade levels. Numeric stats start at 1; the flags are 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStats {
    pub damage: f32,
    pub speed: f32,
    pub fire_rate: f32,
    pub piercing: bool,
    pub homing: bool,
    pub ability_stacks: u32,
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self {
            damage: 1.0,
            speed: 1.0,
            fire_rate: 1.0,
            piercing: false,
            homing: false,
            ability_stacks: 1,
        }
    }
}

impl PlayerStats {
    pub fn fire_cooldown_secs(&self) -> f32 {
        (0.35 - (self.fire_rate - 1.0) * 0.07).max(0.08)
    }

    pub fn shot_damage(&self, level: u32) -> f32 {
        5.0 * self.damage + scaling::player_damage_bonus(level)
    }

    pub fn shot_speed(&self) -> f32 {
        SHOT_SPEED + (self.speed - 1.0) * 100.0
    }

    /// Boss freeze from a timeshatter: 2 s plus half a second per stack.
    pub fn timeshatter_ticks(&self) -> u32 {
        secs_to_ticks(2.0 + 0.5 * self.ability_stacks as f32)
    }

    pub fn shockwave_radius(&self) -> f32 {
        200.0 + 30.0 * self.ability_stacks as f32
    }

    /// Invulnerability after a teleport, from two stacks up.
    pub fn teleport_iframes(&self) -> u32 {
        if self.ability_stacks < 2 {
            return 0;
        }
        secs_to_ticks(0.3 + (self.ability_stacks - 2) as f32 * 0.15)
    }
}

/// What the player last asked for. Movement and fire persist until the next input;
/// ability requests are consumed by the tick that sees them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Intent {
    pub move_dir: Vec2,
    pub actions: ActionFlags,
}

#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: PlayerId,
    pub name: String,
    pub role: PeerRole,
    pub position: Vec2,
    pub velocity: Vec2,
    pub health: f32,
    pub max_health: f32,
    pub coins: u64,
    pub alive: bool,
    pub invincible: bool,
    pub stats: PlayerStats,
    pub fire_cooldown: u32,
    pub abilities: AbilityCooldowns,
    /// Ticks left on an armed parry.
    pub parry_window: u32,
    /// Ticks of invulnerability left from a teleport.
    pub iframes: u32,
    pub intent: Intent,
    pub last_seq: u32,
}

/// Deterministic spawn slot on an arc facing the boss from the left. Every five ids the
/// arc moves one step further out.
pub fn spawn_point(id: PlayerId) -> Vec2 {
    let slot = (id % SPAWN_SLOTS) as f32 - 2.0;
    let ring = ((id / SPAWN_SLOTS) % 3) as f32;
    let angle = PI + slot * 0.3;
    let radius = SPAWN_RADIUS - ring * SPAWN_RING_STEP;
    clamp_to_arena(BOSS_HOME + Vec2::from_angle(angle).scale(radius))
}

impl PlayerState {
    pub fn new(id: PlayerId, name: String, role: PeerRole) -> Self {
        Self {
            id,
            name,
            role,
            position: spawn_point(id),
            velocity: Vec2::ZERO,
            health: PLAYER_MAX_HEALTH,
            max_health: PLAYER_MAX_HEALTH,
            coins: 0,
            alive: true,
            invincible: false,
            stats: PlayerStats::default(),
            fire_cooldown: 0,
            abilities: AbilityCooldowns::default(),
            parry_window: 0,
            iframes: 0,
            intent: Intent::default(),
            last_seq: 0,
        }
    }

    pub fn apply_input(&mut self, input: &InboundInput) {
        self.intent = Intent {
            move_dir: input.move_dir,
            actions: input.actions,
        };
        self.last_seq = input.seq;
    }

    pub fn tick_cooldowns(&mut self) {
        self.fire_cooldown = self.fire_cooldown.saturating_sub(1);
        self.abilities.tick();
        self.parry_window = self.parry_window.saturating_sub(1);
        self.iframes = self.iframes.saturating_sub(1);
    }

    /// Consumes a pending request for `ability`. True if it fires now, which starts
    /// its cooldown.
    fn trigger(&mut self, ability: Ability) -> bool {
        let requested = std::mem::take(self.intent.actions.ability_mut(ability));
        if !requested || !self.alive || self.abilities.get(ability) > 0 {
            return false;
        }
        self.abilities
            .set(ability, ability_cooldown_ticks(ability, self.stats.ability_stacks));
        true
    }

    pub fn step_movement(&mut self, time_scale: f32) {
        if !self.alive {
            self.velocity = Vec2::ZERO;
            return;
        }
        self.velocity = self.intent.move_dir.scale(PLAYER_SPEED);
        self.position = clamp_to_arena(self.position + self.velocity.scale(TICK_DT * time_scale));
    }

    /// Dashes away from the boss if requested and off cooldown.
    pub fn try_dash(&mut self, boss: Vec2) -> bool {
        let away = (self.position - boss).normalize();
        if away == Vec2::ZERO {
            self.intent.actions.dash = false;
            return false;
        }
        if !self.trigger(Ability::Dash) {
            return false;
        }
        let extra = (self.stats.ability_stacks.max(1) - 1) as f32;
        let distance = DASH_DISTANCE + extra * DASH_DISTANCE_PER_STACK;
        self.position = clamp_to_arena(self.position + away.scale(distance));
        true
    }

    /// Jumps to the point mirrored through the arena centre.
    pub fn try_teleport(&mut self) -> bool {
        if !self.trigger(Ability::Teleport) {
            return false;
        }
        let mirrored = Vec2::new(ARENA_WIDTH - self.position.x, ARENA_HEIGHT - self.position.y);
        self.position = clamp_to_arena(mirrored);
        self.iframes = self.iframes.max(self.stats.teleport_iframes());
        true
    }

    /// Returns how many ticks the boss should freeze for.
    pub fn try_timeshatter(&mut self) -> Option<u32> {
        self.trigger(Ability::Timeshatter)
            .then(|| self.stats.timeshatter_ticks())
    }

    /// Returns the radius inside which boss projectiles are destroyed.
    pub fn try_shockwave(&mut self) -> Option<f32> {
        self.trigger(Ability::Shockwave)
            .then(|| self.stats.shockwave_radius())
    }

    /// Arms a parry that absorbs the next boss hit inside its window.
    pub fn try_parry(&mut self) -> bool {
        if !self.trigger(Ability::Parry) {
            return false;
        }
        self.parry_window = secs_to_ticks(PARRY_WINDOW_SECS);
        true
    }

    /// Spends an armed parry. True if the hit was parried.
    pub fn absorb_with_parry(&mut self) -> bool {
        if !self.alive || self.parry_window == 0 {
            return false;
        }
        self.parry_window = 0;
        true
    }

    /// Fires one shot at the boss if the trigger is held and the gun is ready.
    pub fn try_fire(&mut self, boss: Vec2, level: u32, id: ProjectileId) -> Option<Projectile> {
        if !self.intent.actions.fire || !self.alive || self.fire_cooldown > 0 {
            return None;
        }
        let direction = (boss - self.position).normalize();
        if direction == Vec2::ZERO {
            return None;
        }

        let kind = if self.stats.homing {
            ProjectileKind::Homing
        } else if self.stats.piercing {
            ProjectileKind::Piercing
        } else {
            ProjectileKind::Straight
        };
        self.fire_cooldown = secs_to_ticks(self.stats.fire_cooldown_secs()).max(1);

        Some(Projectile::new(
            id,
            ProjectileOwner::Player(self.id),
            kind,
            self.position,
            direction.scale(self.stats.shot_speed()),
            secs_to_ticks(SHOT_LIFETIME_SECS),
            self.stats.shot_damage(level),
            self.stats.piercing,
        ))
    }

    /// Applies damage, returning true if this hit killed the player.
    pub fn take_damage(&mut self, amount: f32) -> bool {
        if !self.alive
            || self.invincible
            || self.iframes > 0
            || !amount.is_finite()
            || amount <= 0.0
        {
            return false;
        }
        self.health = (self.health - amount).max(0.0);
        if self.health == 0.0 {
            self.kill();
            return true;
        }
        false
    }

    pub fn kill(&mut self) {
        self.health = 0.0;
        self.alive = false;
        self.velocity = Vec2::ZERO;
    }

    /// Heals a living player, by `amount` or to full.
    pub fn heal(&mut self, amount: Option<f32>) {
        if !self.alive {
            return;
        }
        self.health = match amount {
            Some(amount) => (self.health + amount).min(self.max_health),
            None => self.max_health,
        };
    }

    /// Restores the player for a new fight, keeping coins and upgrades.
    pub fn revive(&mut self) {
        self.health = self.max_health;
        self.alive = true;
        self.position = spawn_point(self.id);
        self.velocity = Vec2::ZERO;
        self.fire_cooldown = 0;
        self.abilities = AbilityCooldowns::default();
        self.parry_window = 0;
        self.iframes = 0;
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
            position: self.position,
            velocity: self.velocity,
            health: self.health,
            max_health: self.max_health,
            coins: self.coins,
            alive: self.alive,
            invincible: self.invincible,
            fire_cooldown: self.fire_cooldown,
            abilities: self.abilities,
            parrying: self.parry_window > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn player() -> PlayerState {
        PlayerState::new(1, "Ann".to_string(), PeerRole::Human)
    }

    fn input(move_dir: Vec2, fire: bool, dash: bool) -> InboundInput {
        InboundInput {
            player_id: 1,
            seq: 1,
            move_dir,
            actions: ActionFlags {
                fire,
                dash,
                ..ActionFlags::default()
            },
            client_time: 0,
        }
    }

    fn request(p: &mut PlayerState, ability: Ability) {
        *p.intent.actions.ability_mut(ability) = true;
    }

    #[test]
    fn test_spawn_points_are_left_of_boss() {
        for id in 1..=15 {
            let spawn = spawn_point(id);
            assert!(spawn.x < BOSS_HOME.x);
            assert!(spawn.distance(BOSS_HOME) > 150.0);
        }
    }

    #[test]
    fn test_spawn_points_do_not_collide() {
        let spawns: Vec<Vec2> = (1..=10).map(spawn_point).collect();
        for (i, a) in spawns.iter().enumerate() {
            for b in &spawns[i + 1..] {
                assert!(a.distance(*b) > 10.0, "{a:?} and {b:?} overlap");
            }
        }
    }

    #[test]
    fn test_fire_cooldown_floor() {
        let mut stats = PlayerStats::default();
        assert_approx_eq!(stats.fire_cooldown_secs(), 0.35);
        stats.fire_rate = 10.0;
        assert_approx_eq!(stats.fire_cooldown_secs(), 0.08);
    }

    #[test]
    fn test_movement_is_clamped() {
        let mut p = player();
        p.apply_input(&input(Vec2::new(-1.0, 0.0), false, false));
        for _ in 0..100 {
            p.step_movement(1.0);
        }
        assert_approx_eq!(p.position.x, 20.0);
    }

    #[test]
    fn test_no_input_means_no_motion() {
        let mut p = player();
        let start = p.position;
        p.step_movement(1.0);
        p.step_movement(1.0);
        assert_eq!(p.position, start);
    }

    #[test]
    fn test_fire_respects_cooldown() {
        let mut p = player();
        p.apply_input(&input(Vec2::ZERO, true, false));
        let shot = p.try_fire(BOSS_HOME, 1, 7).unwrap();
        assert_eq!(shot.id, 7);
        assert_approx_eq!(shot.damage, 5.0);
        assert_approx_eq!(shot.velocity.length(), 700.0, 1e-2);
        assert!(p.try_fire(BOSS_HOME, 1, 8).is_none());

        for _ in 0..secs_to_ticks(0.35) {
            p.tick_cooldowns();
        }
        assert!(p.try_fire(BOSS_HOME, 1, 8).is_some());
    }

    #[test]
    fn test_stats_choose_projectile_kind() {
        let mut p = player();
        p.stats.piercing = true;
        p.apply_input(&input(Vec2::ZERO, true, false));
        let shot = p.try_fire(BOSS_HOME, 1, 1).unwrap();
        assert_eq!(shot.kind, ProjectileKind::Piercing);
        assert!(shot.piercing);
    }

    #[test]
    fn test_dash_moves_away_once() {
        let mut p = player();
        let before = p.position.distance(BOSS_HOME);
        p.apply_input(&input(Vec2::ZERO, false, true));
        assert!(p.try_dash(BOSS_HOME));
        assert!(p.position.distance(BOSS_HOME) > before);
        assert!(!p.try_dash(BOSS_HOME));
        assert_eq!(p.abilities.dash, secs_to_ticks(2.0));
    }

    #[test]
    fn test_stacks_shorten_cooldowns_to_a_floor() {
        assert_eq!(ability_cooldown_ticks(Ability::Teleport, 1), secs_to_ticks(8.0));
        assert_eq!(
            ability_cooldown_ticks(Ability::Teleport, 3),
            secs_to_ticks(8.0 * 0.85 * 0.85)
        );
        assert_eq!(ability_cooldown_ticks(Ability::Parry, 5), secs_to_ticks(1.0));
        assert_eq!(
            ability_cooldown_ticks(Ability::Shockwave, 99),
            ability_cooldown_ticks(Ability::Shockwave, MAX_ABILITY_STACKS)
        );
    }

    #[test]
    fn test_teleport_mirrors_position() {
        let mut p = player();
        p.position = Vec2::new(100.0, 150.0);
        request(&mut p, Ability::Teleport);
        assert!(p.try_teleport());
        assert_approx_eq!(p.position.x, 700.0);
        assert_approx_eq!(p.position.y, 450.0);
        assert_eq!(p.abilities.teleport, secs_to_ticks(8.0));
        assert_eq!(p.iframes, 0);

        request(&mut p, Ability::Teleport);
        assert!(!p.try_teleport());
        assert_approx_eq!(p.position.x, 700.0);
    }

    #[test]
    fn test_stacked_teleport_grants_iframes() {
        let mut p = player();
        p.stats.ability_stacks = 2;
        request(&mut p, Ability::Teleport);
        assert!(p.try_teleport());
        assert_eq!(p.iframes, secs_to_ticks(0.3));
        assert!(!p.take_damage(50.0));
        assert_eq!(p.health, PLAYER_MAX_HEALTH);

        for _ in 0..secs_to_ticks(0.3) {
            p.tick_cooldowns();
        }
        p.take_damage(50.0);
        assert_approx_eq!(p.health, PLAYER_MAX_HEALTH - 50.0);
    }

    #[test]
    fn test_timeshatter_and_shockwave_scale_with_stacks() {
        let mut p = player();
        request(&mut p, Ability::Timeshatter);
        assert_eq!(p.try_timeshatter(), Some(secs_to_ticks(2.5)));
        request(&mut p, Ability::Timeshatter);
        assert_eq!(p.try_timeshatter(), None);
        assert_eq!(p.abilities.timeshatter, secs_to_ticks(14.0));

        p.stats.ability_stacks = 3;
        request(&mut p, Ability::Shockwave);
        assert_eq!(p.try_shockwave(), Some(290.0));
        assert!(p.abilities.shockwave > 0);
    }

    #[test]
    fn test_parry_window_absorbs_one_hit() {
        let mut p = player();
        assert!(!p.absorb_with_parry());
        request(&mut p, Ability::Parry);
        assert!(p.try_parry());
        assert!(p.snapshot().parrying);
        assert!(p.absorb_with_parry());
        assert!(!p.absorb_with_parry());
    }

    #[test]
    fn test_parry_window_expires() {
        let mut p = player();
        request(&mut p, Ability::Parry);
        assert!(p.try_parry());
        for _ in 0..secs_to_ticks(0.35) {
            p.tick_cooldowns();
        }
        assert!(!p.absorb_with_parry());
        assert!(p.abilities.parry > 0);
    }

    #[test]
    fn test_dead_players_cannot_use_abilities() {
        let mut p = player();
        p.kill();
        for ability in Ability::ALL {
            request(&mut p, ability);
        }
        assert!(!p.try_teleport());
        assert!(!p.try_parry());
        assert_eq!(p.try_shockwave(), None);
        assert_eq!(p.abilities, AbilityCooldowns::default());
        assert!(!p.intent.actions.teleport);
    }

    #[test]
    fn test_damage_kills_and_dead_are_immune() {
        let mut p = player();
        assert!(!p.take_damage(40.0));
        assert!(p.take_damage(80.0));
        assert!(!p.alive);
        assert_eq!(p.health, 0.0);
        assert!(!p.take_damage(10.0));
    }

    #[test]
    fn test_invincible_takes_no_damage() {
        let mut p = player();
        p.invincible = true;
        assert!(!p.take_damage(500.0));
        assert_eq!(p.health, PLAYER_MAX_HEALTH);
    }

    #[test]
    fn test_heal_caps_at_max() {
        let mut p = player();
        p.take_damage(50.0);
        p.heal(Some(20.0));
        assert_approx_eq!(p.health, 70.0);
        p.heal(Some(500.0));
        assert_approx_eq!(p.health, PLAYER_MAX_HEALTH);
    }
}
