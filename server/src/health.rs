//! Team-aware health accounting and kill notification
//!
//! The ledger is the only place health is mutated. It clamps every change to
//! `[0, max_health]`, makes death monotonic, suppresses ally-on-ally damage
//! (self-inflicted damage is always allowed) and publishes `HealthChanged` and
//! `Killed` notifications. Only `current_health` is replicated; observers
//! derive their own deltas from it.

use crate::events::{DamageSource, EventBus, GameEvent};
use log::{debug, info, warn};
use shared::{EntityId, HealthSnapshot, Role, TeamId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthRecord {
    pub current_health: f32,
    pub max_health: f32,
    pub team_id: TeamId,
    pub is_dead: bool,
}

impl HealthRecord {
    pub fn new(max_health: f32, team_id: TeamId) -> Self {
        Self {
            current_health: max_health,
            max_health,
            team_id,
            is_dead: false,
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            current_health: self.current_health,
            max_health: self.max_health,
        }
    }
}

/// Who is responsible for a damage application
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageInfo {
    pub source: DamageSource,
    /// Entity whose team decides friendliness
    pub causer: Option<EntityId>,
    /// Controlling player credited with a kill
    pub instigator: Option<EntityId>,
}

impl DamageInfo {
    pub fn self_inflicted(entity: EntityId) -> Self {
        Self {
            source: DamageSource::SelfDestruct,
            causer: Some(entity),
            instigator: None,
        }
    }
}

#[derive(Debug)]
pub struct HealthLedger {
    role: Role,
    records: HashMap<EntityId, HealthRecord>,
}

impl HealthLedger {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            records: HashMap::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Creates a record at full health. Non-positive max health is refused.
    pub fn register(&mut self, entity: EntityId, max_health: f32, team_id: TeamId) -> bool {
        if !self.role.is_authority() {
            warn!("Ignoring health registration for {} on observer", entity);
            return false;
        }
        if max_health <= 0.0 {
            warn!("Refusing health record for {} with max health {}", entity, max_health);
            return false;
        }
        self.records
            .insert(entity, HealthRecord::new(max_health, team_id));
        true
    }

    pub fn remove(&mut self, entity: EntityId) -> Option<HealthRecord> {
        self.records.remove(&entity)
    }

    pub fn get(&self, entity: EntityId) -> Option<&HealthRecord> {
        self.records.get(&entity)
    }

    pub fn current_health(&self, entity: EntityId) -> Option<f32> {
        self.records.get(&entity).map(|r| r.current_health)
    }

    pub fn team_of(&self, entity: EntityId) -> Option<TeamId> {
        self.records.get(&entity).map(|r| r.team_id)
    }

    /// True when the entity has a record and is not dead
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.records.get(&entity).is_some_and(|r| !r.is_dead)
    }

    /// Allied when either side has no record, otherwise when teams match.
    pub fn is_friendly(&self, a: Option<EntityId>, b: Option<EntityId>) -> bool {
        let team_a = a.and_then(|id| self.team_of(id));
        let team_b = b.and_then(|id| self.team_of(id));
        match (team_a, team_b) {
            (Some(team_a), Some(team_b)) => team_a == team_b,
            _ => true,
        }
    }

    /// Applies damage on the authority. Returns whether health changed.
    pub fn apply_damage(
        &mut self,
        target: EntityId,
        amount: f32,
        info: DamageInfo,
        events: &mut EventBus,
    ) -> bool {
        if !self.role.is_authority() {
            warn!("Ignoring damage to {} on observer", target);
            return false;
        }
        if !(amount > 0.0) {
            return false;
        }

        let self_inflicted = info.causer == Some(target);
        let friendly = !self_inflicted && self.is_friendly(info.causer, Some(target));

        let Some(record) = self.records.get_mut(&target) else {
            return false;
        };
        if record.is_dead {
            return false;
        }
        if friendly {
            debug!(
                "Suppressed friendly damage {:.1} to {} from {:?}",
                amount, target, info.causer
            );
            return false;
        }

        record.current_health = (record.current_health - amount).clamp(0.0, record.max_health);
        let died = record.current_health <= 0.0;
        if died {
            record.is_dead = true;
        }
        let new_health = record.current_health;

        events.publish(GameEvent::HealthChanged {
            target,
            new_health,
            delta: amount,
            source: info.source,
            causer: info.causer,
        });

        if died {
            info!("Entity {} died (causer {:?})", target, info.causer);
            events.publish(GameEvent::Killed {
                target,
                causer: info.causer,
                causer_controller: info.instigator,
            });
        }
        true
    }

    /// Restores health on the authority. Dead entities cannot be healed.
    pub fn heal(&mut self, target: EntityId, amount: f32, events: &mut EventBus) -> bool {
        if !self.role.is_authority() {
            warn!("Ignoring heal of {} on observer", target);
            return false;
        }
        if !(amount > 0.0) {
            return false;
        }
        let Some(record) = self.records.get_mut(&target) else {
            return false;
        };
        if record.is_dead {
            return false;
        }

        record.current_health = (record.current_health + amount).clamp(0.0, record.max_health);
        let new_health = record.current_health;

        events.publish(GameEvent::HealthChanged {
            target,
            new_health,
            delta: -amount,
            source: DamageSource::Healing,
            causer: None,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{HAZARD_TEAM, PLAYER_TEAM};

    fn weapon_hit(causer: EntityId) -> DamageInfo {
        DamageInfo {
            source: DamageSource::Weapon(100),
            causer: Some(causer),
            instigator: Some(causer),
        }
    }

    fn ledger_with_teams() -> HealthLedger {
        let mut ledger = HealthLedger::new(Role::Authority);
        ledger.register(1, 100.0, PLAYER_TEAM);
        ledger.register(2, 100.0, PLAYER_TEAM);
        ledger.register(3, 100.0, HAZARD_TEAM);
        ledger
    }

    #[test]
    fn test_record_starts_full() {
        let ledger = ledger_with_teams();
        let record = ledger.get(1).unwrap();
        assert_eq!(record.current_health, record.max_health);
        assert!(!record.is_dead);
    }

    #[test]
    fn test_health_stays_in_bounds_and_death_is_monotonic() {
        let mut ledger = ledger_with_teams();
        let mut events = EventBus::new();

        let script: [(bool, f32); 8] = [
            (true, 30.0),
            (false, 500.0),
            (true, 0.0),
            (true, -10.0),
            (true, 95.0),
            (true, 20.0),
            (false, 50.0),
            (true, 5.0),
        ];

        let mut was_dead = false;
        for (is_damage, amount) in script {
            if is_damage {
                ledger.apply_damage(1, amount, weapon_hit(3), &mut events);
            } else {
                ledger.heal(1, amount, &mut events);
            }
            let record = ledger.get(1).unwrap();
            assert!(record.current_health >= 0.0);
            assert!(record.current_health <= record.max_health);
            if was_dead {
                assert!(record.is_dead);
            }
            was_dead = record.is_dead;
        }
        assert!(was_dead);
        assert_eq!(ledger.current_health(1), Some(0.0));
    }

    #[test]
    fn test_ally_damage_suppressed() {
        let mut ledger = ledger_with_teams();
        let mut events = EventBus::new();

        assert!(!ledger.apply_damage(1, 25.0, weapon_hit(2), &mut events));
        assert_eq!(ledger.current_health(1), Some(100.0));
        assert!(events.drain().is_empty());
    }

    #[test]
    fn test_self_damage_always_applies() {
        let mut ledger = ledger_with_teams();
        let mut events = EventBus::new();

        assert!(ledger.apply_damage(3, 20.0, DamageInfo::self_inflicted(3), &mut events));
        assert_approx_eq!(ledger.current_health(3).unwrap(), 80.0);
    }

    #[test]
    fn test_hostile_damage_emits_health_changed() {
        let mut ledger = ledger_with_teams();
        let mut events = EventBus::new();

        assert!(ledger.apply_damage(3, 20.0, weapon_hit(1), &mut events));
        assert_eq!(
            events.drain(),
            vec![GameEvent::HealthChanged {
                target: 3,
                new_health: 80.0,
                delta: 20.0,
                source: DamageSource::Weapon(100),
                causer: Some(1),
            }]
        );
    }

    #[test]
    fn test_killed_emitted_exactly_once() {
        let mut ledger = ledger_with_teams();
        let mut events = EventBus::new();

        ledger.apply_damage(3, 150.0, weapon_hit(1), &mut events);
        ledger.apply_damage(3, 10.0, weapon_hit(1), &mut events);

        let kills: Vec<_> = events
            .drain()
            .into_iter()
            .filter(|e| matches!(e, GameEvent::Killed { .. }))
            .collect();
        assert_eq!(
            kills,
            vec![GameEvent::Killed {
                target: 3,
                causer: Some(1),
                causer_controller: Some(1),
            }]
        );
        assert!(ledger.get(3).unwrap().is_dead);
    }

    #[test]
    fn test_non_positive_amounts_ignored() {
        let mut ledger = ledger_with_teams();
        let mut events = EventBus::new();

        assert!(!ledger.apply_damage(3, 0.0, weapon_hit(1), &mut events));
        assert!(!ledger.apply_damage(3, -5.0, weapon_hit(1), &mut events));
        assert!(!ledger.heal(3, 0.0, &mut events));
        assert!(events.drain().is_empty());
    }

    #[test]
    fn test_heal_clamps_and_reports_negative_delta() {
        let mut ledger = ledger_with_teams();
        let mut events = EventBus::new();

        ledger.apply_damage(3, 30.0, weapon_hit(1), &mut events);
        events.drain();

        assert!(ledger.heal(3, 50.0, &mut events));
        assert_eq!(ledger.current_health(3), Some(100.0));
        match events.drain().as_slice() {
            [GameEvent::HealthChanged { delta, .. }] => assert_approx_eq!(*delta, -50.0),
            other => panic!("Unexpected events: {:?}", other),
        }
    }

    #[test]
    fn test_dead_cannot_be_healed() {
        let mut ledger = ledger_with_teams();
        let mut events = EventBus::new();

        ledger.apply_damage(3, 100.0, weapon_hit(1), &mut events);
        assert!(!ledger.heal(3, 50.0, &mut events));
        assert_eq!(ledger.current_health(3), Some(0.0));
        assert!(!ledger.is_alive(3));
    }

    #[test]
    fn test_missing_record_is_friendly() {
        let ledger = ledger_with_teams();
        assert!(ledger.is_friendly(Some(1), Some(99)));
        assert!(ledger.is_friendly(None, Some(3)));
        assert!(ledger.is_friendly(Some(1), Some(2)));
        assert!(!ledger.is_friendly(Some(1), Some(3)));
    }

    #[test]
    fn test_untagged_causer_cannot_damage() {
        let mut ledger = ledger_with_teams();
        let mut events = EventBus::new();

        assert!(!ledger.apply_damage(1, 10.0, weapon_hit(99), &mut events));
        assert_eq!(ledger.current_health(1), Some(100.0));
    }

    #[test]
    fn test_observer_ledger_never_mutates() {
        let mut ledger = HealthLedger::new(Role::ObserverProxy);
        let mut events = EventBus::new();

        assert!(!ledger.register(1, 100.0, PLAYER_TEAM));
        assert!(!ledger.apply_damage(1, 10.0, DamageInfo::self_inflicted(1), &mut events));
        assert!(ledger.get(1).is_none());
    }

    #[test]
    fn test_invalid_max_health_refused() {
        let mut ledger = HealthLedger::new(Role::Authority);
        assert!(!ledger.register(1, 0.0, PLAYER_TEAM));
        assert!(ledger.get(1).is_none());
    }
}
