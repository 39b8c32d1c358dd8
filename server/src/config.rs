use shared::{DEFAULT_PORT, TICK_DT, TICK_RATE};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for one server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_players: usize,
    /// Bots spawned at startup, counted against `max_players`.
    pub bots: usize,
    /// A session silent for this many ticks is dropped.
    pub timeout_ticks: u64,
    /// Ticks between full keyframe snapshots.
    pub snapshot_interval: u64,
    /// Starting level; `None` resumes from the saved progress.
    pub level: Option<u32>,
    pub seed: u64,
    pub save_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_players: 8,
            bots: 0,
            timeout_ticks: 5 * TICK_RATE as u64,
            snapshot_interval: 90,
            level: None,
            seed: 0,
            save_file: None,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Wall-clock length of one tick. Fixed: every timer in the simulation is counted
    /// in ticks of this length.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f32(TICK_DT)
    }

    pub fn timeout_secs(&self) -> f64 {
        self.timeout_ticks as f64 / TICK_RATE as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tick_duration() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:5555");
        assert_eq!(config.tick_duration().as_micros(), 33_333);
        assert_eq!(config.timeout_secs(), 5.0);
    }

    #[test]
    fn test_laser_floor_holds_in_wall_clock_time() {
        use crate::boss::BossCombat;
        use shared::protocol::AttackKind;
        use shared::scaling::ScaleFactors;

        let config = ServerConfig::default();
        let frantic = ScaleFactors {
            boss_health_multiplier: 1.0,
            boss_damage_multiplier: 1.0,
            spawn_rate_multiplier: 100.0,
        };
        let ticks = BossCombat::cooldown_ticks(AttackKind::Laser, &frantic);
        let secs = config.tick_duration().as_secs_f64() * ticks as f64;
        assert!(secs >= 1.5 - 1e-6, "laser floor is {:.3}s", secs);
    }
}
