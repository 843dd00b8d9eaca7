//! Cosmetic effects an observer plays in response to replicated changes

use log::{debug, info};
use shared::{EntityId, EntityKind, HitOutcome, SurfaceKind, Vec3, WaveState};

/// Something perceptible an observer should show. Derived locally from
/// snapshot diffs; never fed back into gameplay.
#[derive(Debug, Clone, PartialEq)]
pub enum CosmeticEvent {
    EntityAppeared {
        entity: EntityId,
        kind: EntityKind,
    },
    /// `delta` is new minus old, so damage is negative
    HealthChanged {
        entity: EntityId,
        new_health: f32,
        delta: f32,
    },
    Died {
        entity: EntityId,
    },
    WaveStateChanged {
        old_state: Option<WaveState>,
        new_state: WaveState,
        wave_count: u32,
    },
    PowerLevelChanged {
        unit: EntityId,
        power_level: u8,
    },
    SelfDestructPrimed {
        unit: EntityId,
    },
    Detonated {
        unit: EntityId,
        position: Vec3,
        power_level: u8,
    },
    /// Another player's shot, replayed once per replicated change
    HitReplayed {
        weapon: EntityId,
        owner: EntityId,
        hit: HitOutcome,
    },
    /// Our own shot, shown immediately without waiting for the server
    LocalShot {
        weapon: EntityId,
    },
    EntityRemoved {
        entity: EntityId,
    },
}

pub trait EffectPlayer {
    fn play(&mut self, event: &CosmeticEvent);
}

/// Headless player that narrates effects through the log
#[derive(Debug, Default)]
pub struct LogEffectPlayer {
    played: u64,
}

impl LogEffectPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> u64 {
        self.played
    }
}

impl EffectPlayer for LogEffectPlayer {
    fn play(&mut self, event: &CosmeticEvent) {
        self.played += 1;
        match event {
            CosmeticEvent::EntityAppeared { entity, kind } => {
                debug!("{:?} {} appeared", kind, entity)
            }
            CosmeticEvent::HealthChanged {
                entity,
                new_health,
                delta,
            } => debug!("Entity {} health {:.1} ({:+.1})", entity, new_health, delta),
            CosmeticEvent::Died { entity } => info!("Entity {} died", entity),
            CosmeticEvent::WaveStateChanged {
                old_state,
                new_state,
                wave_count,
            } => info!("Wave {}: {:?} -> {:?}", wave_count, old_state, new_state),
            CosmeticEvent::PowerLevelChanged { unit, power_level } => {
                debug!("Tracker {} glows at power {}", unit, power_level)
            }
            CosmeticEvent::SelfDestructPrimed { unit } => {
                info!("Tracker {} is pulsing", unit)
            }
            CosmeticEvent::Detonated {
                unit,
                position,
                power_level,
            } => info!(
                "Tracker {} exploded at ({:.0}, {:.0}) power {}",
                unit, position.x, position.y, power_level
            ),
            CosmeticEvent::HitReplayed { weapon, owner, hit } => {
                let splash = match hit.surface_kind {
                    SurfaceKind::FleshVulnerable => "critical impact",
                    SurfaceKind::Flesh => "flesh impact",
                    SurfaceKind::Default => "impact",
                };
                debug!(
                    "Weapon {} of {} tracer to ({:.0}, {:.0}, {:.0}) with {}",
                    weapon,
                    owner,
                    hit.impact_point.x,
                    hit.impact_point.y,
                    hit.impact_point.z,
                    splash
                );
            }
            CosmeticEvent::LocalShot { weapon } => debug!("Muzzle flash on {}", weapon),
            CosmeticEvent::EntityRemoved { entity } => debug!("Entity {} removed", entity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_player_counts_effects() {
        let mut player = LogEffectPlayer::new();
        player.play(&CosmeticEvent::Died { entity: 1 });
        player.play(&CosmeticEvent::LocalShot { weapon: 2 });
        assert_eq!(player.played(), 2);
    }
}
