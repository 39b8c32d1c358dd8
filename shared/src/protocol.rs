//! Message types exchanged between the authoritative server and its peers.
//!
//! Every frame on the wire carries exactly one [`Message`]. The set of variants is
//! closed, so both ends handle every kind exhaustively.

use crate::vector::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type PlayerId = u32;
pub type ProjectileId = u64;
pub type Tick = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Join {
        name: String,
    },
    JoinAck {
        player_id: PlayerId,
        snapshot: WorldSnapshot,
    },
    Input {
        seq: u32,
        move_dir: Vec2,
        actions: ActionFlags,
        client_time: u64,
    },
    WorldSnapshot(WorldSnapshot),
    WorldDelta {
        tick: Tick,
        changed: Vec<DeltaField>,
    },
    AdminCommand {
        target: Option<PlayerId>,
        verb: AdminVerb,
    },
    Heartbeat,
    Disconnect {
        reason: String,
    },
}

impl Message {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Join { .. } => "Join",
            Message::JoinAck { .. } => "JoinAck",
            Message::Input { .. } => "Input",
            Message::WorldSnapshot(_) => "WorldSnapshot",
            Message::WorldDelta { .. } => "WorldDelta",
            Message::AdminCommand { .. } => "AdminCommand",
            Message::Heartbeat => "Heartbeat",
            Message::Disconnect { .. } => "Disconnect",
        }
    }
}

/// Player abilities. Each has its own cooldown; firing is not one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ability {
    Dash,
    Teleport,
    Timeshatter,
    Shockwave,
    Parry,
}

impl Ability {
    pub const ALL: [Ability; 5] = [
        Ability::Dash,
        Ability::Teleport,
        Ability::Timeshatter,
        Ability::Shockwave,
        Ability::Parry,
    ];
}

/// Buttons held for one input sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionFlags {
    pub fire: bool,
    pub dash: bool,
    pub teleport: bool,
    pub timeshatter: bool,
    pub shockwave: bool,
    pub parry: bool,
}

impl ActionFlags {
    pub fn ability(&self, ability: Ability) -> bool {
        match ability {
            Ability::Dash => self.dash,
            Ability::Teleport => self.teleport,
            Ability::Timeshatter => self.timeshatter,
            Ability::Shockwave => self.shockwave,
            Ability::Parry => self.parry,
        }
    }

    pub fn ability_mut(&mut self, ability: Ability) -> &mut bool {
        match ability {
            Ability::Dash => &mut self.dash,
            Ability::Teleport => &mut self.teleport,
            Ability::Timeshatter => &mut self.timeshatter,
            Ability::Shockwave => &mut self.shockwave,
            Ability::Parry => &mut self.parry,
        }
    }
}

/// Ticks until each ability can be used again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AbilityCooldowns {
    pub dash: u32,
    pub teleport: u32,
    pub timeshatter: u32,
    pub shockwave: u32,
    pub parry: u32,
}

impl AbilityCooldowns {
    pub fn get(&self, ability: Ability) -> u32 {
        match ability {
            Ability::Dash => self.dash,
            Ability::Teleport => self.teleport,
            Ability::Timeshatter => self.timeshatter,
            Ability::Shockwave => self.shockwave,
            Ability::Parry => self.parry,
        }
    }

    pub fn set(&mut self, ability: Ability, ticks: u32) {
        match ability {
            Ability::Dash => self.dash = ticks,
            Ability::Teleport => self.teleport = ticks,
            Ability::Timeshatter => self.timeshatter = ticks,
            Ability::Shockwave => self.shockwave = ticks,
            Ability::Parry => self.parry = ticks,
        }
    }

    /// Counts every cooldown down by one tick.
    pub fn tick(&mut self) {
        for ability in Ability::ALL {
            self.set(ability, self.get(ability).saturating_sub(1));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRole {
    Human,
    Bot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectileOwner {
    Boss,
    Player(PlayerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectileKind {
    Straight,
    Homing,
    Piercing,
    SprayShard,
    LaserSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttackKind {
    Laser,
    Spray,
    HomingPiercing,
    Melee,
}

impl AttackKind {
    pub const ALL: [AttackKind; 4] = [
        AttackKind::Laser,
        AttackKind::Spray,
        AttackKind::HomingPiercing,
        AttackKind::Melee,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BossPhaseKind {
    Idle,
    SelectingAttack,
    ExecutingAttack,
    Cooldown,
    Defeated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BossTier {
    Normal,
    Berserk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
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
    pub fire_cooldown: u32,
    pub abilities: AbilityCooldowns,
    /// A parry is armed and will absorb the next boss hit.
    pub parrying: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub id: ProjectileId,
    pub owner: ProjectileOwner,
    pub kind: ProjectileKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub lifetime: u32,
    pub damage: f32,
    pub piercing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossSnapshot {
    pub position: Vec2,
    pub health: f32,
    pub max_health: f32,
    pub phase: BossPhaseKind,
    pub tier: BossTier,
    pub active_attack: Option<AttackKind>,
    /// Ticks left on a timeshatter freeze.
    pub frozen_ticks: u32,
}

/// Full world state at one tick. Players and projectiles are kept sorted by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub level: u32,
    pub players: Vec<PlayerSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
    pub boss: BossSnapshot,
}

/// One changed field of the world between two broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeltaField {
    PlayerUpdated(PlayerSnapshot),
    PlayerRemoved(PlayerId),
    ProjectileUpdated(ProjectileSnapshot),
    ProjectileRemoved(ProjectileId),
    Boss(BossSnapshot),
    Level(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatName {
    Damage,
    Speed,
    FireRate,
    Piercing,
    Homing,
    /// Shared stack count of every ability, 1 to 5.
    AbilityStacks,
}

/// Closed set of admin mutations. Text parsing of console commands happens elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdminVerb {
    /// `None` heals to full.
    Heal { amount: Option<f32> },
    Kill,
    SetInvincible(bool),
    SetStat { stat: StatName, value: f32 },
    GiveMoney(i64),
    SetMoney(i64),
    SetLevel(u32),
    KillBoss,
    SkipLevel,
    SetTimescale(f32),
    SpawnBot { name: Option<String> },
    RemoveBot { id: Option<PlayerId> },
}

impl WorldSnapshot {
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSnapshot> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Computes the fields that changed between `self` and `next`.
    ///
    /// Upserts carry whole records, so applying the result to any state that already
    /// contains part of the change still converges on `next`.
    pub fn diff(&self, next: &WorldSnapshot) -> Vec<DeltaField> {
        let mut changed = Vec::new();

        if self.level != next.level {
            changed.push(DeltaField::Level(next.level));
        }
        if self.boss != next.boss {
            changed.push(DeltaField::Boss(next.boss.clone()));
        }

        let before: BTreeMap<PlayerId, &PlayerSnapshot> =
            self.players.iter().map(|p| (p.id, p)).collect();
        let after: BTreeMap<PlayerId, &PlayerSnapshot> =
            next.players.iter().map(|p| (p.id, p)).collect();
        for id in before.keys() {
            if !after.contains_key(id) {
                changed.push(DeltaField::PlayerRemoved(*id));
            }
        }
        for (id, player) in &after {
            if before.get(id) != Some(player) {
                changed.push(DeltaField::PlayerUpdated((*player).clone()));
            }
        }

        let before: BTreeMap<ProjectileId, &ProjectileSnapshot> =
            self.projectiles.iter().map(|p| (p.id, p)).collect();
        let after: BTreeMap<ProjectileId, &ProjectileSnapshot> =
            next.projectiles.iter().map(|p| (p.id, p)).collect();
        for id in before.keys() {
            if !after.contains_key(id) {
                changed.push(DeltaField::ProjectileRemoved(*id));
            }
        }
        for (id, projectile) in &after {
            if before.get(id) != Some(projectile) {
                changed.push(DeltaField::ProjectileUpdated((*projectile).clone()));
            }
        }

        changed
    }

    /// Applies a delta produced by [`WorldSnapshot::diff`] and stamps the new tick.
    pub fn apply(&mut self, tick: Tick, changed: &[DeltaField]) {
        for field in changed {
            match field {
                DeltaField::Level(level) => self.level = *level,
                DeltaField::Boss(boss) => self.boss = boss.clone(),
                DeltaField::PlayerRemoved(id) => self.players.retain(|p| p.id != *id),
                DeltaField::PlayerUpdated(player) => {
                    match self.players.binary_search_by_key(&player.id, |p| p.id) {
                        Ok(index) => self.players[index] = player.clone(),
                        Err(index) => self.players.insert(index, player.clone()),
                    }
                }
                DeltaField::ProjectileRemoved(id) => self.projectiles.retain(|p| p.id != *id),
                DeltaField::ProjectileUpdated(projectile) => {
                    match self
                        .projectiles
                        .binary_search_by_key(&projectile.id, |p| p.id)
                    {
                        Ok(index) => self.projectiles[index] = projectile.clone(),
                        Err(index) => self.projectiles.insert(index, projectile.clone()),
                    }
                }
            }
        }
        self.tick = tick;
    }
}
