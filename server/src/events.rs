//! Outbound notifications and the bus that fans them out
//!
//! Components publish `GameEvent`s instead of calling each other directly.
//! The bus hands every event to the registered sinks (presentation, logging)
//! and keeps a queue the simulation drains to route kills and deaths back into
//! the director and the hazards. Delivery is fire-and-forget.

use crate::powerup::PowerupKind;
use log::{debug, info};
use shared::{EntityId, ReplicatedHit, Vec3, WaveState};
use std::collections::VecDeque;

/// What dealt (or restored) health
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageSource {
    Weapon(EntityId),
    Explosion(EntityId),
    SelfDestruct,
    Healing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// `delta` is the damage dealt; heals are reported as negative damage.
    HealthChanged {
        target: EntityId,
        new_health: f32,
        delta: f32,
        source: DamageSource,
        causer: Option<EntityId>,
    },
    Killed {
        target: EntityId,
        causer: Option<EntityId>,
        causer_controller: Option<EntityId>,
    },
    WaveStateChanged {
        new_state: WaveState,
        old_state: WaveState,
    },
    HitOutcomeChanged {
        weapon: EntityId,
        owner: EntityId,
        hit: ReplicatedHit,
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
        damage: f32,
        radius: f32,
    },
    BarrelExploded {
        barrel: EntityId,
        position: Vec3,
    },
    ProjectileLaunched {
        projectile: EntityId,
        weapon: EntityId,
        owner: EntityId,
    },
    ProjectileExploded {
        projectile: EntityId,
        position: Vec3,
    },
    PowerupActivated {
        powerup: u32,
        target: EntityId,
        kind: PowerupKind,
    },
    PowerupExpired {
        powerup: u32,
        target: EntityId,
    },
}

/// Consumer of simulation notifications
pub trait EventSink {
    fn notify(&mut self, event: &GameEvent);
}

/// Sink that writes every notification to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn notify(&mut self, event: &GameEvent) {
        match event {
            GameEvent::HealthChanged {
                target,
                new_health,
                delta,
                ..
            } => debug!("Entity {} health {:.1} (delta {:.1})", target, new_health, delta),
            GameEvent::Killed { target, causer, .. } => {
                info!("Entity {} killed by {:?}", target, causer)
            }
            GameEvent::WaveStateChanged {
                new_state,
                old_state,
            } => info!("Wave state {:?} -> {:?}", old_state, new_state),
            GameEvent::HitOutcomeChanged { weapon, hit, .. } => debug!(
                "Weapon {} shot #{} hit {:?} on {:?}",
                weapon, hit.sequence, hit.outcome.actor_hit, hit.outcome.surface_kind
            ),
            GameEvent::PowerLevelChanged { unit, power_level } => {
                debug!("Tracker {} power level {}", unit, power_level)
            }
            GameEvent::SelfDestructPrimed { unit } => {
                info!("Tracker {} priming self-destruct", unit)
            }
            GameEvent::Detonated {
                unit,
                damage,
                radius,
                ..
            } => info!(
                "Tracker {} detonated ({:.0} damage, radius {:.0})",
                unit, damage, radius
            ),
            GameEvent::BarrelExploded { barrel, .. } => info!("Barrel {} exploded", barrel),
            GameEvent::ProjectileLaunched {
                projectile,
                weapon,
                ..
            } => debug!("Weapon {} launched projectile {}", weapon, projectile),
            GameEvent::ProjectileExploded { projectile, .. } => {
                debug!("Projectile {} exploded", projectile)
            }
            GameEvent::PowerupActivated {
                powerup,
                target,
                kind,
            } => info!("Powerup {} ({:?}) activated on {}", powerup, kind, target),
            GameEvent::PowerupExpired { powerup, target } => {
                debug!("Powerup {} expired on {}", powerup, target)
            }
        }
    }
}

/// Fans events out to sinks and queues them for internal routing
#[derive(Default)]
pub struct EventBus {
    sinks: Vec<Box<dyn EventSink + Send + Sync>>,
    pending: VecDeque<GameEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Box<dyn EventSink + Send + Sync>) {
        self.sinks.push(sink);
    }

    pub fn publish(&mut self, event: GameEvent) {
        for sink in &mut self.sinks {
            sink.notify(&event);
        }
        self.pending.push_back(event);
    }

    /// Takes the oldest event not yet routed internally
    pub fn pop_pending(&mut self) -> Option<GameEvent> {
        self.pending.pop_front()
    }

    /// Takes every queued event at once
    pub fn drain(&mut self) -> Vec<GameEvent> {
        self.pending.drain(..).collect()
    }
}
