//! The authoritative world: players, projectiles, the boss and fight progression.
//!
//! [`WorldState::step`] is the only place simulation time advances. It reads nothing but
//! its own state and the inputs it is handed, so the same inputs always produce the same
//! world.

use crate::boss::{BossCombat, BossContext};
use crate::input::InboundInput;
use crate::player::PlayerState;
use crate::projectile::{Projectile, Target};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::protocol::{PeerRole, ProjectileOwner, WorldSnapshot};
use shared::scaling;
use shared::{
    secs_to_ticks, PlayerId, ProjectileId, Tick, Vec2, BOSS_RADIUS, MAX_NAME_LEN, PLAYER_RADIUS,
};
use std::collections::BTreeMap;

pub const MIN_LEVEL: u32 = 1;
pub const MAX_LEVEL: u32 = 999;
pub const MIN_TIME_SCALE: f32 = 0.1;
pub const MAX_TIME_SCALE: f32 = 5.0;
const INTERMISSION_SECS: f32 = 5.0;
/// Damage a successful parry returns to the boss.
pub const PARRY_COUNTER_DAMAGE: f32 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FightOutcome {
    Victory,
    Wipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intermission {
    pub outcome: FightOutcome,
    pub remaining: u32,
}

/// Notable things that happened during one tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickEvents {
    pub boss_defeated: bool,
    pub players_killed: Vec<PlayerId>,
    pub fight_ended: Option<FightOutcome>,
    pub level_started: Option<u32>,
}

pub struct WorldState {
    pub tick: Tick,
    pub level: u32,
    /// Highest level reached, for persistence.
    pub max_level: u32,
    pub players: BTreeMap<PlayerId, PlayerState>,
    pub projectiles: BTreeMap<ProjectileId, Projectile>,
    pub boss: BossCombat,
    pub time_scale: f32,
    intermission: Option<Intermission>,
    fight_started: Tick,
    next_projectile_id: ProjectileId,
    rng: StdRng,
}

impl WorldState {
    pub fn new(level: u32, seed: u64) -> Self {
        let level = level.clamp(MIN_LEVEL, MAX_LEVEL);
        let mut world = Self {
            tick: 0,
            level,
            max_level: level,
            players: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            boss: BossCombat::new(scaling::BASE_BOSS_HEALTH),
            time_scale: 1.0,
            intermission: None,
            fight_started: 0,
            next_projectile_id: 1,
            rng: StdRng::seed_from_u64(seed),
        };
        world.start_level(level);
        world
    }

    pub fn elapsed_fight_ticks(&self) -> Tick {
        self.tick.saturating_sub(self.fight_started)
    }

    /// Resets the fight at `level`: fresh boss, no projectiles, every player revived.
    pub fn start_level(&mut self, level: u32) {
        let level = level.clamp(MIN_LEVEL, MAX_LEVEL);
        self.level = level;
        self.max_level = self.max_level.max(level);
        self.fight_started = self.tick;
        self.intermission = None;
        self.projectiles.clear();

        let factors = scaling::scale(level, 0, self.players.len());
        let mut max_health = scaling::BASE_BOSS_HEALTH * factors.boss_health_multiplier;
        if scaling::is_super_level(level) {
            max_health *= 2.0;
        }
        self.boss = BossCombat::new(max_health);

        for player in self.players.values_mut() {
            player.revive();
        }
        info!(
            "Level {} begins: boss health {:.0}{}",
            level,
            self.boss.max_health,
            if scaling::is_super_level(level) {
                " (super level)"
            } else {
                ""
            }
        );
    }

    pub fn add_player(&mut self, id: PlayerId, name: &str, role: PeerRole) -> &PlayerState {
        let name = sanitize_name(id, name);
        info!("Player {} ({}) joined as {:?}", id, name, role);
        self.players
            .entry(id)
            .or_insert_with(|| PlayerState::new(id, name, role))
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<PlayerState> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Player {} left the arena", id);
        }
        removed
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut PlayerState> {
        self.players.get_mut(&id)
    }

    fn allocate_projectile_id(&mut self) -> ProjectileId {
        let id = self.next_projectile_id;
        self.next_projectile_id += 1;
        id
    }

    /// Advances the world by one tick using the latest input of each player.
    pub fn step(&mut self, inputs: &[InboundInput]) -> TickEvents {
        let mut events = TickEvents::default();

        for input in inputs {
            match self.players.get_mut(&input.player_id) {
                Some(player) => player.apply_input(input),
                None => debug!("Input for unknown player {} skipped", input.player_id),
            }
        }

        let boss_position = self.boss.position;
        let level = self.level;
        let mut fired = Vec::new();
        let mut shockwaves = Vec::new();
        let mut freeze = 0;
        for player in self.players.values_mut() {
            player.tick_cooldowns();
            player.try_dash(boss_position);
            player.try_teleport();
            player.try_parry();
            if let Some(ticks) = player.try_timeshatter() {
                info!("Player {} shattered time for {} ticks", player.id, ticks);
                freeze = freeze.max(ticks);
            }
            if let Some(radius) = player.try_shockwave() {
                shockwaves.push((player.position, radius));
            }
            player.step_movement(self.time_scale);
            if !self.boss.is_defeated() && player.intent.actions.fire && player.fire_cooldown == 0
            {
                fired.push(player.id);
            }
        }
        if freeze > 0 {
            self.boss.freeze(freeze);
        }
        for (center, radius) in shockwaves {
            let before = self.projectiles.len();
            self.projectiles.retain(|_, p| {
                p.owner != ProjectileOwner::Boss || p.position.distance(center) > radius
            });
            debug!("Shockwave cleared {} projectiles", before - self.projectiles.len());
        }
        for id in fired {
            let projectile_id = self.allocate_projectile_id();
            let shot = self
                .players
                .get_mut(&id)
                .and_then(|p| p.try_fire(boss_position, level, projectile_id));
            if let Some(shot) = shot {
                self.projectiles.insert(projectile_id, shot);
            }
        }

        let targets = self.targets();
        let factors = scaling::scale(self.level, self.elapsed_fight_ticks(), self.players.len());
        let boss_output = self.boss.step(
            &BossContext {
                level: self.level,
                factors,
                targets: &targets,
                time_scale: self.time_scale,
            },
            &mut self.rng,
        );
        for spawn in boss_output.spawns {
            let id = self.allocate_projectile_id();
            self.projectiles.insert(id, spawn.into_projectile(id));
        }
        for (id, damage) in boss_output.melee_hits {
            self.damage_player(id, damage, &mut events);
        }

        self.resolve_projectiles(&mut events);

        let already_won = matches!(
            self.intermission,
            Some(Intermission {
                outcome: FightOutcome::Victory,
                ..
            })
        );
        if self.boss.is_defeated() && !already_won && !events.boss_defeated {
            // Defeated outside of projectile resolution, e.g. by an admin kill.
            events.boss_defeated = true;
        }
        self.update_progression(&mut events);

        self.tick += 1;
        events
    }

    /// Living players the boss may target, in id order.
    fn targets(&self) -> Vec<(PlayerId, Vec2)> {
        self.players
            .values()
            .filter(|p| p.alive)
            .map(|p| (p.id, p.position))
            .collect()
    }

    fn damage_player(&mut self, id: PlayerId, damage: f32, events: &mut TickEvents) {
        if let Some(player) = self.players.get_mut(&id) {
            hit_player(player, &mut self.boss, damage, events);
        }
    }

    fn resolve_projectiles(&mut self, events: &mut TickEvents) {
        let boss_position = self.boss.position;
        let mut targets = self.targets();

        for projectile in self.projectiles.values_mut() {
            projectile.advance(boss_position, &targets, self.time_scale);

            match projectile.owner {
                ProjectileOwner::Player(_) => {
                    if self.boss.is_defeated() {
                        continue;
                    }
                    if let Some(damage) =
                        projectile.try_hit(Target::Boss, self.boss.position, BOSS_RADIUS)
                    {
                        if self.boss.apply_damage(damage) {
                            info!("Boss defeated on level {}", self.level);
                            events.boss_defeated = true;
                        }
                    }
                }
                ProjectileOwner::Boss => {
                    for (id, position) in &targets {
                        let Some(damage) =
                            projectile.try_hit(Target::Player(*id), *position, PLAYER_RADIUS)
                        else {
                            continue;
                        };
                        if let Some(player) = self.players.get_mut(id) {
                            hit_player(player, &mut self.boss, damage, events);
                        }
                    }
                    // Dead players stop being targets for the rest of the tick.
                    targets.retain(|(id, _)| self.players.get(id).map_or(false, |p| p.alive));
                }
            }
        }

        self.projectiles.retain(|_, p| !p.is_expired());
    }

    fn update_progression(&mut self, events: &mut TickEvents) {
        if let Some(mut intermission) = self.intermission {
            if intermission.outcome == FightOutcome::Wipe && self.boss.is_defeated() {
                // A boss that falls after the party still counts as beaten.
                self.award_victory();
                events.fight_ended = Some(FightOutcome::Victory);
                self.intermission = Some(Intermission {
                    outcome: FightOutcome::Victory,
                    remaining: secs_to_ticks(INTERMISSION_SECS),
                });
                return;
            }
            intermission.remaining = intermission.remaining.saturating_sub(1);
            if intermission.remaining > 0 {
                self.intermission = Some(intermission);
                return;
            }
            let next = match intermission.outcome {
                FightOutcome::Victory => (self.level + 1).min(MAX_LEVEL),
                FightOutcome::Wipe => self.level,
            };
            self.start_level(next);
            events.level_started = Some(next);
            return;
        }

        let outcome = if self.boss.is_defeated() {
            self.award_victory();
            FightOutcome::Victory
        } else if !self.players.is_empty() && self.players.values().all(|p| !p.alive) {
            info!("All players down on level {}", self.level);
            FightOutcome::Wipe
        } else {
            return;
        };

        events.fight_ended = Some(outcome);
        self.intermission = Some(Intermission {
            outcome,
            remaining: secs_to_ticks(INTERMISSION_SECS),
        });
    }

    fn award_victory(&mut self) {
        let reward = scaling::coin_reward(self.level);
        for player in self.players.values_mut() {
            player.coins = player.coins.saturating_add(reward);
        }
        info!("Victory on level {}: {} coins each", self.level, reward);
    }

    pub fn set_time_scale(&mut self, factor: f32) -> f32 {
        let clamped = factor.clamp(MIN_TIME_SCALE, MAX_TIME_SCALE);
        if clamped != factor {
            warn!("Time scale {} clamped to {}", factor, clamped);
        }
        self.time_scale = clamped;
        clamped
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            level: self.level,
            players: self.players.values().map(|p| p.snapshot()).collect(),
            projectiles: self.projectiles.values().map(|p| p.snapshot()).collect(),
            boss: self.boss.snapshot(),
        }
    }
}

/// Lands a boss hit on `player`. An armed parry eats the hit and strikes the boss back.
fn hit_player(
    player: &mut PlayerState,
    boss: &mut BossCombat,
    damage: f32,
    events: &mut TickEvents,
) {
    if player.absorb_with_parry() {
        debug!("Player {} parried {:.0} damage", player.id, damage);
        if boss.apply_damage(PARRY_COUNTER_DAMAGE) {
            info!("Boss defeated by a parry from player {}", player.id);
            events.boss_defeated = true;
        }
        return;
    }
    if player.take_damage(damage) {
        info!("Player {} was killed", player.id);
        events.players_killed.push(player.id);
    }
}

/// Trims a display name to printable characters and the maximum length.
fn sanitize_name(id: PlayerId, name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        format!("Player{}", id)
    } else {
        cleaned.to_string()
    }
}
