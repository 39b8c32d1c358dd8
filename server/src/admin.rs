//! Admin mutations: validated, then applied to the world between ticks.

use crate::error::CommandError;
use crate::game::{WorldState, MAX_LEVEL, MIN_LEVEL};
use crate::player::MAX_ABILITY_STACKS;
use log::info;
use shared::protocol::{AdminVerb, StatName};
use shared::PlayerId;
use tokio::sync::mpsc;

/// Upper bound for a player's coin balance.
pub const MAX_COINS: u64 = u32::MAX as u64;
const MIN_STAT: f32 = 1.0;
const MAX_STAT: f32 = 10.0;

/// An admin command waiting for the next tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminRequest {
    /// Player of the session that issued the command, if any.
    pub issuer: Option<PlayerId>,
    pub target: Option<PlayerId>,
    pub verb: AdminVerb,
}

/// What the loop still has to do after a command touched the world.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminEffect {
    Applied,
    SpawnBot { name: Option<String> },
    RemoveBot { id: Option<PlayerId> },
}

/// In-process sender for a host console. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AdminHandle {
    tx: mpsc::UnboundedSender<AdminRequest>,
    issuer: Option<PlayerId>,
}

impl AdminHandle {
    pub fn new(tx: mpsc::UnboundedSender<AdminRequest>) -> Self {
        Self { tx, issuer: None }
    }

    /// Returns a handle whose untargeted commands act on `player`.
    pub fn for_player(&self, player: PlayerId) -> Self {
        Self {
            tx: self.tx.clone(),
            issuer: Some(player),
        }
    }

    /// Queues a command. Returns false once the server has stopped.
    pub fn send(&self, target: Option<PlayerId>, verb: AdminVerb) -> bool {
        self.tx
            .send(AdminRequest {
                issuer: self.issuer,
                target,
                verb,
            })
            .is_ok()
    }
}

fn verb_name(verb: &AdminVerb) -> &'static str {
    match verb {
        AdminVerb::Heal { .. } => "heal",
        AdminVerb::Kill => "kill",
        AdminVerb::SetInvincible(_) => "set-invincible",
        AdminVerb::SetStat { .. } => "set-stat",
        AdminVerb::GiveMoney(_) => "give-money",
        AdminVerb::SetMoney(_) => "set-money",
        AdminVerb::SetLevel(_) => "set-level",
        AdminVerb::KillBoss => "kill-boss",
        AdminVerb::SkipLevel => "skip-level",
        AdminVerb::SetTimescale(_) => "set-timescale",
        AdminVerb::SpawnBot { .. } => "spawn-bot",
        AdminVerb::RemoveBot { .. } => "remove-bot",
    }
}

/// Validates `request` and applies it. Nothing is mutated when validation fails.
pub fn apply_admin(world: &mut WorldState, request: &AdminRequest) -> Result<AdminEffect, CommandError> {
    let verb = verb_name(&request.verb);
    let target = request.target.or(request.issuer);

    match &request.verb {
        AdminVerb::Heal { amount } => {
            if let Some(amount) = amount {
                if !amount.is_finite() || *amount < 0.0 {
                    return Err(CommandError::invalid(verb, format!("heal amount {}", amount)));
                }
            }
            player(world, target)?.heal(*amount);
        }
        AdminVerb::Kill => player(world, target)?.kill(),
        AdminVerb::SetInvincible(on) => player(world, target)?.invincible = *on,
        AdminVerb::SetStat { stat, value } => {
            validate_stat(*stat, *value).map_err(|reason| CommandError::invalid(verb, reason))?;
            let stats = &mut player(world, target)?.stats;
            match stat {
                StatName::Damage => stats.damage = *value,
                StatName::Speed => stats.speed = *value,
                StatName::FireRate => stats.fire_rate = *value,
                StatName::Piercing => stats.piercing = *value == 1.0,
                StatName::Homing => stats.homing = *value == 1.0,
                StatName::AbilityStacks => stats.ability_stacks = *value as u32,
            }
        }
        AdminVerb::GiveMoney(amount) => {
            let p = player(world, target)?;
            let coins = (p.coins as i128 + *amount as i128).clamp(0, MAX_COINS as i128);
            p.coins = coins as u64;
        }
        AdminVerb::SetMoney(amount) => {
            if *amount < 0 {
                return Err(CommandError::invalid(verb, format!("negative balance {}", amount)));
            }
            player(world, target)?.coins = (*amount as u64).min(MAX_COINS);
        }
        AdminVerb::SetLevel(level) => {
            if !(MIN_LEVEL..=MAX_LEVEL).contains(level) {
                return Err(CommandError::invalid(
                    verb,
                    format!("level {} outside {}..={}", level, MIN_LEVEL, MAX_LEVEL),
                ));
            }
            world.start_level(*level);
        }
        AdminVerb::KillBoss => {
            if !world.boss.is_defeated() {
                world.boss.defeat();
            }
        }
        AdminVerb::SkipLevel => {
            if world.level >= MAX_LEVEL {
                return Err(CommandError::invalid(verb, "already at the last level"));
            }
            world.start_level(world.level + 1);
        }
        AdminVerb::SetTimescale(factor) => {
            if !factor.is_finite() {
                return Err(CommandError::invalid(verb, format!("factor {}", factor)));
            }
            world.set_time_scale(*factor);
        }
        AdminVerb::SpawnBot { name } => {
            return Ok(AdminEffect::SpawnBot { name: name.clone() });
        }
        AdminVerb::RemoveBot { id } => {
            return Ok(AdminEffect::RemoveBot { id: *id });
        }
    }

    info!("Admin {} applied (target {:?})", verb, target);
    Ok(AdminEffect::Applied)
}

fn player(
    world: &mut WorldState,
    target: Option<PlayerId>,
) -> Result<&mut crate::player::PlayerState, CommandError> {
    target
        .and_then(|id| world.player_mut(id))
        .ok_or(CommandError::UnknownTarget(target))
}

fn validate_stat(stat: StatName, value: f32) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{:?} value {}", stat, value));
    }
    match stat {
        StatName::Damage | StatName::Speed | StatName::FireRate => {
            if (MIN_STAT..=MAX_STAT).contains(&value) {
                Ok(())
            } else {
                Err(format!("{:?} {} outside {}..={}", stat, value, MIN_STAT, MAX_STAT))
            }
        }
        StatName::Piercing | StatName::Homing => {
            if value == 0.0 || value == 1.0 {
                Ok(())
            } else {
                Err(format!("{:?} must be 0 or 1, got {}", stat, value))
            }
        }
        StatName::AbilityStacks => {
            if value.fract() == 0.0 && (1.0..=MAX_ABILITY_STACKS as f32).contains(&value) {
                Ok(())
            } else {
                Err(format!("{:?} must be a whole 1..={}, got {}", stat, MAX_ABILITY_STACKS, value))
            }
        }
    }
}
