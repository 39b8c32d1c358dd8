//! Autonomous player used for testing and for filling empty slots.
//!
//! A [`BotController`] sees the world only through a [`WorldView`] fed with the same
//! messages a human client receives, and answers with one `Input` per tick. The server
//! drives it over an in-process channel; the standalone runner drives it over TCP.

use crate::protocol::{Ability, AbilityCooldowns, ActionFlags, BossPhaseKind, Message, ProjectileOwner};
use crate::vector::Vec2;
use crate::view::WorldView;
use crate::{ARENA_HEIGHT, ARENA_MARGIN, ARENA_WIDTH, TICK_RATE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Distance kept from the boss while attacking.
const STANDOFF_RADIUS: f32 = 180.0;
/// Projectiles closer than this trigger a dash, or a parry when dash is cooling down.
const PANIC_RADIUS: f32 = 35.0;
/// A shockwave is worth it once this many boss projectiles are inside `CROWD_RADIUS`.
const CROWD_SIZE: usize = 4;
const CROWD_RADIUS: f32 = 150.0;
const ARRIVAL_RADIUS: f32 = 10.0;

/// Per-bot randomised temperament.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Personality {
    /// Probability of firing on a tick where the bot feels safe.
    pub aggression: f32,
    /// Scales how early the bot starts dodging.
    pub dodge_skill: f32,
}

impl Personality {
    pub fn roll(rng: &mut impl Rng) -> Self {
        Self {
            aggression: rng.gen_range(0.3..0.8),
            dodge_skill: rng.gen_range(0.5..1.0),
        }
    }

    fn dodge_radius(&self) -> f32 {
        60.0 + 60.0 * self.dodge_skill
    }
}

pub struct BotController {
    name: String,
    view: WorldView,
    personality: Personality,
    rng: StdRng,
    seq: u32,
    wander_target: Vec2,
    wander_ticks: u32,
    orbit_sign: f32,
}

impl BotController {
    pub fn new(name: impl Into<String>, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let personality = Personality::roll(&mut rng);
        let orbit_sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        Self {
            name: name.into(),
            view: WorldView::new(),
            personality,
            rng,
            seq: 0,
            wander_target: Vec2::new(ARENA_WIDTH / 2.0, ARENA_HEIGHT / 2.0),
            wander_ticks: 0,
            orbit_sign,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn personality(&self) -> Personality {
        self.personality
    }

    pub fn view(&self) -> &WorldView {
        &self.view
    }

    pub fn join_message(&self) -> Message {
        Message::Join {
            name: self.name.clone(),
        }
    }

    pub fn observe(&mut self, message: &Message) {
        self.view.observe(message);
    }

    /// Chooses this tick's input, or `None` until the bot has joined.
    pub fn decide(&mut self) -> Option<Message> {
        let tick = self.view.tick()?;
        let (position, alive, cooldowns) = {
            let me = self.view.me()?;
            (me.position, me.alive, me.abilities)
        };

        let (move_dir, actions) = if alive {
            self.steer(position, cooldowns)
        } else {
            (Vec2::ZERO, ActionFlags::default())
        };

        self.seq = self.seq.wrapping_add(1);
        Some(Message::Input {
            seq: self.seq,
            move_dir,
            actions,
            client_time: tick,
        })
    }

    fn steer(&mut self, position: Vec2, cooldowns: AbilityCooldowns) -> (Vec2, ActionFlags) {
        let mut actions = ActionFlags::default();
        let ready = |ability| cooldowns.get(ability) == 0;

        actions.shockwave =
            ready(Ability::Shockwave) && self.crowding(position) >= CROWD_SIZE;

        if let Some((threat, distance)) = self.nearest_threat(position) {
            let away = (position - threat).normalize();
            // Sidestep rather than back straight into a wall.
            let side = Vec2::new(-away.y, away.x).scale(self.orbit_sign);
            if distance < PANIC_RADIUS {
                actions.dash = ready(Ability::Dash);
                actions.parry = !actions.dash && ready(Ability::Parry);
            }
            return ((away + side.scale(0.5)).normalize(), actions);
        }

        let boss = match self.view.boss() {
            Some(boss) if boss.phase != BossPhaseKind::Defeated => boss.position,
            _ => return (self.wander(position), actions),
        };

        actions.fire = self.rng.gen::<f32>() < self.personality.aggression;

        let offset = position - boss;
        let distance = offset.length();
        let radial = if distance > 0.0 {
            offset.scale(1.0 / distance)
        } else {
            Vec2::new(-1.0, 0.0)
        };
        let tangent = Vec2::new(-radial.y, radial.x).scale(self.orbit_sign);

        let correction = ((STANDOFF_RADIUS - distance) / STANDOFF_RADIUS).clamp(-1.0, 1.0);
        let move_dir = (radial.scale(correction) + tangent.scale(0.4)).clamp_length(1.0);
        (move_dir, actions)
    }

    fn nearest_threat(&self, position: Vec2) -> Option<(Vec2, f32)> {
        let radius = self.personality.dodge_radius();
        self.view
            .snapshot
            .as_ref()?
            .projectiles
            .iter()
            .filter(|p| p.owner == ProjectileOwner::Boss)
            .map(|p| (p.position, p.position.distance(position)))
            .filter(|(_, distance)| *distance < radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn crowding(&self, position: Vec2) -> usize {
        self.view.snapshot.as_ref().map_or(0, |snapshot| {
            snapshot
                .projectiles
                .iter()
                .filter(|p| p.owner == ProjectileOwner::Boss)
                .filter(|p| p.position.distance(position) < CROWD_RADIUS)
                .count()
        })
    }

    fn wander(&mut self, position: Vec2) -> Vec2 {
        if self.wander_ticks == 0 || position.distance(self.wander_target) < ARRIVAL_RADIUS {
            let margin = ARENA_MARGIN * 4.0;
            self.wander_target = Vec2::new(
                self.rng.gen_range(margin..ARENA_WIDTH - margin),
                self.rng.gen_range(margin..ARENA_HEIGHT - margin),
            );
            self.wander_ticks = self.rng.gen_range(TICK_RATE..TICK_RATE * 3);
        }
        self.wander_ticks -= 1;
        (self.wander_target - position).normalize()
    }
}
