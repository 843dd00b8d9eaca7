//! Gameplay tuning, optionally loaded from a TOML file
//!
//! Every section falls back to the stock values when absent, so a config file
//! only needs the numbers it changes.

use crate::combat::FireMode;
use serde::Deserialize;
use shared::{DEFAULT_HEALTH, PLAYER_RADIUS, PLAYER_SPEED};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid tuning: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Tuning {
    pub health: HealthTuning,
    pub director: DirectorTuning,
    pub weapon: WeaponTuning,
    pub tracker: TrackerTuning,
    pub barrel: BarrelTuning,
    pub pickup: PickupTuning,
    pub player: PlayerTuning,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HealthTuning {
    pub default_health: f32,
}

impl Default for HealthTuning {
    fn default() -> Self {
        Self {
            default_health: DEFAULT_HEALTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DirectorTuning {
    pub time_between_waves: f64,
    pub spawn_interval: f64,
    pub poll_interval: f64,
    /// Bots spawned per wave number: wave N spawns `bots_per_wave * N`.
    pub bots_per_wave: u32,
}

impl Default for DirectorTuning {
    fn default() -> Self {
        Self {
            time_between_waves: 2.0,
            spawn_interval: 1.0,
            poll_interval: 1.0,
            bots_per_wave: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeaponTuning {
    pub base_damage: f32,
    pub vulnerable_multiplier: f32,
    /// Rounds per minute
    pub rate_of_fire: f32,
    pub range: f32,
    pub fire_mode: FireMode,
    pub projectile: ProjectileTuning,
}

impl Default for WeaponTuning {
    fn default() -> Self {
        Self {
            base_damage: 20.0,
            vulnerable_multiplier: 4.0,
            rate_of_fire: 600.0,
            range: 10_000.0,
            fire_mode: FireMode::Hitscan,
            projectile: ProjectileTuning::default(),
        }
    }
}

/// Launched rounds for weapons in projectile mode
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectileTuning {
    pub speed: f32,
    pub radius: f32,
    /// Distance ahead of the eye where the round appears
    pub muzzle_offset: f32,
    /// Seconds of flight before it explodes on its own
    pub fuse: f64,
    pub damage: f32,
    pub damage_radius: f32,
}

impl Default for ProjectileTuning {
    fn default() -> Self {
        Self {
            speed: 2_000.0,
            radius: 10.0,
            muzzle_offset: 60.0,
            fuse: 1.0,
            damage: 50.0,
            damage_radius: 150.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerTuning {
    pub max_health: f32,
    pub radius: f32,
    pub speed: f32,
    pub explosion_damage: f32,
    pub explosion_radius: f32,
    pub self_damage: f32,
    pub self_damage_interval: f64,
    pub contact_radius: f32,
    pub power_level_radius: f32,
    pub power_level_interval: f64,
    pub max_power_level: u8,
    pub required_distance_to_target: f32,
    pub path_refresh_interval: f64,
    pub removal_delay: f64,
}

impl Default for TrackerTuning {
    fn default() -> Self {
        Self {
            max_health: DEFAULT_HEALTH,
            radius: 40.0,
            speed: 300.0,
            explosion_damage: 40.0,
            explosion_radius: 200.0,
            self_damage: 20.0,
            self_damage_interval: 0.25,
            contact_radius: 200.0,
            power_level_radius: 600.0,
            power_level_interval: 1.0,
            max_power_level: 4,
            required_distance_to_target: 100.0,
            path_refresh_interval: 5.0,
            removal_delay: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BarrelTuning {
    pub max_health: f32,
    pub radius: f32,
    pub explosion_impulse: f32,
    pub radial_radius: f32,
    pub radial_impulse: f32,
}

impl Default for BarrelTuning {
    fn default() -> Self {
        Self {
            max_health: DEFAULT_HEALTH,
            radius: 50.0,
            explosion_impulse: 400.0,
            radial_radius: 250.0,
            radial_impulse: 1000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PickupTuning {
    pub radius: f32,
    pub cooldown: f64,
    pub regen_amount: f32,
    pub regen_interval: f64,
    pub regen_ticks: u32,
    pub speed_multiplier: f32,
    pub speed_duration: f64,
}

impl Default for PickupTuning {
    fn default() -> Self {
        Self {
            radius: 75.0,
            cooldown: 10.0,
            regen_amount: 10.0,
            regen_interval: 1.0,
            regen_ticks: 5,
            speed_multiplier: 2.0,
            speed_duration: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    pub speed: f32,
    pub radius: f32,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            speed: PLAYER_SPEED,
            radius: PLAYER_RADIUS,
        }
    }
}

impl Tuning {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let tuning: Tuning = toml::from_str(source)?;
        tuning.validate()?;
        Ok(tuning)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Rejects values that would divide by zero or spin a timer
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.weapon.rate_of_fire <= 0.0 {
            return Err(ConfigError::Invalid(
                "weapon.rate_of_fire must be positive".to_string(),
            ));
        }
        if self.weapon.projectile.speed <= 0.0 {
            return Err(ConfigError::Invalid(
                "weapon.projectile.speed must be positive".to_string(),
            ));
        }
        if self.health.default_health <= 0.0
            || self.tracker.max_health <= 0.0
            || self.barrel.max_health <= 0.0
        {
            return Err(ConfigError::Invalid(
                "max health values must be positive".to_string(),
            ));
        }
        let intervals = [
            ("director.spawn_interval", self.director.spawn_interval),
            ("director.poll_interval", self.director.poll_interval),
            (
                "tracker.self_damage_interval",
                self.tracker.self_damage_interval,
            ),
            (
                "tracker.power_level_interval",
                self.tracker.power_level_interval,
            ),
            (
                "tracker.path_refresh_interval",
                self.tracker.path_refresh_interval,
            ),
            ("weapon.projectile.fuse", self.weapon.projectile.fuse),
        ];
        for (name, value) in intervals {
            if value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}
