//! Observer-side mirror of the replicated world
//!
//! Only current values travel over the wire. The replica keeps the last
//! accepted snapshot and turns each new one into cosmetic events by diffing:
//! health deltas are derived as new minus old, flags and power levels fire on
//! change, and each weapon's latest hit is replayed once per distinct value.
//! Re-applying a snapshot, or one older than the last accepted tick, yields
//! nothing.

use crate::effects::CosmeticEvent;
use log::debug;
use shared::{
    EntityId, EntityKind, EntitySnapshot, Packet, ReplicatedHit, Vec3, WaveState, WeaponSnapshot,
    PLAYER_EYE_HEIGHT,
};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ObserverReplica {
    last_tick: Option<u32>,
    wave_state: Option<WaveState>,
    wave_count: u32,
    entities: HashMap<EntityId, EntitySnapshot>,
    replayed_hits: HashMap<EntityId, ReplicatedHit>,
}

impl ObserverReplica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_tick(&self) -> Option<u32> {
        self.last_tick
    }

    pub fn wave_state(&self) -> Option<WaveState> {
        self.wave_state
    }

    pub fn wave_count(&self) -> u32 {
        self.wave_count
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.entities.values()
    }

    /// Current health as last replicated
    pub fn health_of(&self, id: EntityId) -> Option<f32> {
        self.entities
            .get(&id)
            .and_then(|e| e.health)
            .map(|h| h.current_health)
    }

    /// Applies a `Snapshot` packet; other packets produce no events
    pub fn apply_packet(&mut self, packet: &Packet) -> Vec<CosmeticEvent> {
        match packet {
            Packet::Snapshot {
                tick,
                wave_state,
                wave_count,
                entities,
                weapons,
                ..
            } => self.apply_snapshot(*tick, *wave_state, *wave_count, entities, weapons),
            _ => Vec::new(),
        }
    }

    pub fn apply_snapshot(
        &mut self,
        tick: u32,
        wave_state: WaveState,
        wave_count: u32,
        entities: &[EntitySnapshot],
        weapons: &[WeaponSnapshot],
    ) -> Vec<CosmeticEvent> {
        if self.last_tick.is_some_and(|last| tick <= last) {
            debug!("Dropping stale snapshot {} (have {:?})", tick, self.last_tick);
            return Vec::new();
        }
        self.last_tick = Some(tick);

        let mut events = Vec::new();

        if self.wave_state != Some(wave_state) {
            events.push(CosmeticEvent::WaveStateChanged {
                old_state: self.wave_state,
                new_state: wave_state,
                wave_count,
            });
            self.wave_state = Some(wave_state);
        }
        self.wave_count = wave_count;

        let mut next = HashMap::with_capacity(entities.len());
        for snapshot in entities {
            diff_entity(self.entities.get(&snapshot.id), snapshot, &mut events);
            next.insert(snapshot.id, snapshot.clone());
        }

        let mut removed: Vec<EntityId> = self
            .entities
            .keys()
            .filter(|id| !next.contains_key(id))
            .copied()
            .collect();
        removed.sort_unstable();
        events.extend(
            removed
                .into_iter()
                .map(|entity| CosmeticEvent::EntityRemoved { entity }),
        );
        self.entities = next;

        for weapon in weapons {
            let Some(hit) = weapon.last_hit else {
                continue;
            };
            if self.replayed_hits.get(&weapon.weapon_id) == Some(&hit) {
                continue;
            }
            self.replayed_hits.insert(weapon.weapon_id, hit);
            events.push(CosmeticEvent::HitReplayed {
                weapon: weapon.weapon_id,
                owner: weapon.owner,
                hit: hit.outcome,
            });
        }
        self.replayed_hits
            .retain(|id, _| weapons.iter().any(|w| w.weapon_id == *id));

        events
    }

    /// Direction from `viewer`'s eye to the nearest live threat unit
    pub fn aim_at_nearest_threat(&self, viewer: EntityId) -> Option<Vec3> {
        let eye = self
            .entities
            .get(&viewer)?
            .position
            .add(&Vec3::new(0.0, 0.0, PLAYER_EYE_HEIGHT));

        self.entities
            .values()
            .filter(|e| e.kind == EntityKind::ThreatUnit && !e.detonated)
            .min_by(|a, b| {
                a.position
                    .distance_squared(&eye)
                    .total_cmp(&b.position.distance_squared(&eye))
            })
            .map(|target| target.position.sub(&eye).normalize())
    }
}

/// Events for one entity. The first sighting establishes the health baseline;
/// flags still fire so a late joiner sees an explosion already in progress.
fn diff_entity(
    old: Option<&EntitySnapshot>,
    new: &EntitySnapshot,
    events: &mut Vec<CosmeticEvent>,
) {
    let (old_health, old_power, old_priming, old_detonated) = match old {
        Some(old) => (
            old.health.map(|h| h.current_health),
            old.power_level,
            old.priming_self_destruct,
            old.detonated,
        ),
        None => {
            events.push(CosmeticEvent::EntityAppeared {
                entity: new.id,
                kind: new.kind,
            });
            (new.health.map(|h| h.current_health), 0, false, false)
        }
    };

    if let (Some(old_health), Some(health)) = (old_health, new.health) {
        let new_health = health.current_health;
        if new_health != old_health {
            events.push(CosmeticEvent::HealthChanged {
                entity: new.id,
                new_health,
                delta: new_health - old_health,
            });
            if new_health <= 0.0 && old_health > 0.0 {
                events.push(CosmeticEvent::Died { entity: new.id });
            }
        }
    }

    if new.power_level != old_power {
        events.push(CosmeticEvent::PowerLevelChanged {
            unit: new.id,
            power_level: new.power_level,
        });
    }
    if new.priming_self_destruct && !old_priming {
        events.push(CosmeticEvent::SelfDestructPrimed { unit: new.id });
    }
    if new.detonated && !old_detonated {
        events.push(CosmeticEvent::Detonated {
            unit: new.id,
            position: new.position,
            power_level: new.power_level,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{HealthSnapshot, HitOutcome, SurfaceKind, HAZARD_TEAM};

    fn unit(id: EntityId, health: f32) -> EntitySnapshot {
        EntitySnapshot {
            id,
            kind: EntityKind::ThreatUnit,
            team: Some(HAZARD_TEAM),
            position: Vec3::new(100.0, 0.0, 0.0),
            health: Some(HealthSnapshot {
                current_health: health,
                max_health: 100.0,
            }),
            power_level: 0,
            priming_self_destruct: false,
            detonated: false,
        }
    }

    fn hit(sequence: u32) -> WeaponSnapshot {
        WeaponSnapshot {
            weapon_id: 50,
            owner: 3,
            last_hit: Some(ReplicatedHit {
                sequence,
                outcome: HitOutcome {
                    impact_point: Vec3::new(1.0, 2.0, 3.0),
                    surface_kind: SurfaceKind::Flesh,
                    actor_hit: Some(9),
                },
            }),
        }
    }

    #[test]
    fn test_health_delta_is_new_minus_old() {
        let mut replica = ObserverReplica::new();
        replica.apply_snapshot(1, WaveState::WaveInProgress, 1, &[unit(9, 100.0)], &[]);

        let events = replica.apply_snapshot(2, WaveState::WaveInProgress, 1, &[unit(9, 60.0)], &[]);
        match events.as_slice() {
            [CosmeticEvent::HealthChanged {
                entity,
                new_health,
                delta,
            }] => {
                assert_eq!(*entity, 9);
                assert_approx_eq!(*new_health, 60.0);
                assert_approx_eq!(*delta, -40.0);
            }
            other => panic!("Unexpected events {:?}", other),
        }
    }

    #[test]
    fn test_first_sighting_sets_baseline() {
        let mut replica = ObserverReplica::new();
        let events = replica.apply_snapshot(1, WaveState::WaitingToStart, 0, &[unit(9, 40.0)], &[]);

        assert!(events.contains(&CosmeticEvent::EntityAppeared {
            entity: 9,
            kind: EntityKind::ThreatUnit
        }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, CosmeticEvent::HealthChanged { .. })));
        assert_eq!(replica.health_of(9), Some(40.0));
    }

    #[test]
    fn test_hit_replays_once_per_change() {
        let mut replica = ObserverReplica::new();
        let count_hits = |events: &[CosmeticEvent]| {
            events
                .iter()
                .filter(|e| matches!(e, CosmeticEvent::HitReplayed { .. }))
                .count()
        };

        let first = replica.apply_snapshot(1, WaveState::WaveInProgress, 1, &[], &[hit(1)]);
        let repeat = replica.apply_snapshot(2, WaveState::WaveInProgress, 1, &[], &[hit(1)]);
        let next = replica.apply_snapshot(3, WaveState::WaveInProgress, 1, &[], &[hit(2)]);

        assert_eq!(count_hits(&first), 1);
        assert_eq!(count_hits(&repeat), 0);
        assert_eq!(count_hits(&next), 1);
    }

    #[test]
    fn test_stale_snapshot_is_ignored() {
        let mut replica = ObserverReplica::new();
        replica.apply_snapshot(5, WaveState::WaveInProgress, 1, &[unit(9, 100.0)], &[]);

        let events = replica.apply_snapshot(4, WaveState::GameOver, 1, &[unit(9, 10.0)], &[]);
        assert!(events.is_empty());
        assert_eq!(replica.wave_state(), Some(WaveState::WaveInProgress));
        assert_eq!(replica.health_of(9), Some(100.0));
    }

    #[test]
    fn test_detonation_flags_fire_on_edges() {
        let mut replica = ObserverReplica::new();
        replica.apply_snapshot(1, WaveState::WaveInProgress, 1, &[unit(9, 100.0)], &[]);

        let mut priming = unit(9, 80.0);
        priming.priming_self_destruct = true;
        priming.power_level = 2;
        let events =
            replica.apply_snapshot(2, WaveState::WaveInProgress, 1, &[priming.clone()], &[]);
        assert!(events.contains(&CosmeticEvent::SelfDestructPrimed { unit: 9 }));
        assert!(events.contains(&CosmeticEvent::PowerLevelChanged {
            unit: 9,
            power_level: 2
        }));

        let mut detonated = priming;
        detonated.priming_self_destruct = false;
        detonated.detonated = true;
        detonated.health = Some(HealthSnapshot {
            current_health: 0.0,
            max_health: 100.0,
        });
        let events =
            replica.apply_snapshot(3, WaveState::WaveInProgress, 1, &[detonated.clone()], &[]);
        assert!(events.contains(&CosmeticEvent::Died { entity: 9 }));
        assert!(events
            .iter()
            .any(|e| matches!(e, CosmeticEvent::Detonated { unit: 9, power_level: 2, .. })));

        let again = replica.apply_snapshot(4, WaveState::WaveInProgress, 1, &[detonated], &[]);
        assert!(again.is_empty());

        let gone = replica.apply_snapshot(5, WaveState::WaveInProgress, 1, &[], &[]);
        assert_eq!(gone, vec![CosmeticEvent::EntityRemoved { entity: 9 }]);
    }

    #[test]
    fn test_aim_points_at_nearest_threat() {
        let mut replica = ObserverReplica::new();
        let mut me = unit(1, 100.0);
        me.kind = EntityKind::Player;
        me.position = Vec3::ZERO;
        replica.apply_snapshot(1, WaveState::WaveInProgress, 1, &[me, unit(9, 100.0)], &[]);

        let aim = replica.aim_at_nearest_threat(1).unwrap();
        assert!(aim.x > 0.0);
        assert!(aim.z < 0.0);
        assert_approx_eq!(aim.length(), 1.0);
    }
}
