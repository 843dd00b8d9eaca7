//! Proximity-based threat scaling for tracker bots
//!
//! Power level is derived, never accumulated: each recompute counts the other
//! live bots around a unit from scratch and clamps the count.

use crate::collaborators::{OverlapFilter, SpatialQuery};
use crate::config::TrackerTuning;
use crate::world::World;
use log::warn;
use shared::{EntityId, EntityKind, Role};

#[derive(Debug, Clone, Copy)]
pub struct SwarmAggregator {
    role: Role,
    radius: f32,
    max_power_level: u8,
}

impl SwarmAggregator {
    pub fn new(role: Role, tuning: &TrackerTuning) -> Self {
        Self {
            role,
            radius: tuning.power_level_radius,
            max_power_level: tuning.max_power_level,
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Counts other tracker bots within the scan radius, clamped to the max
    /// power level. None when the unit has vanished or on an observer.
    pub fn power_level_for(
        &self,
        unit: EntityId,
        world: &World,
        spatial: &dyn SpatialQuery,
    ) -> Option<u8> {
        if !self.role.is_authority() {
            warn!("Power level recompute requested on observer for {}", unit);
            return None;
        }
        let center = world.position(unit)?;

        let nearby = spatial
            .overlap_sphere(
                world,
                center,
                self.radius,
                OverlapFilter::Kind(EntityKind::ThreatUnit),
            )
            .into_iter()
            .filter(|id| *id != unit)
            .count();

        Some(nearby.min(self.max_power_level as usize) as u8)
    }
}

/// Terminal explosion damage scaled by power level
pub fn explosion_damage(base_damage: f32, power_level: u8) -> f32 {
    base_damage * (1.0 + power_level as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SphereSpatialQuery;
    use crate::world::{Controller, SpawnParams};
    use assert_approx_eq::assert_approx_eq;
    use shared::{SurfaceKind, Vec3};

    fn spawn_bot(world: &mut World, x: f32) -> EntityId {
        world.spawn(SpawnParams {
            kind: EntityKind::ThreatUnit,
            position: Vec3::new(x, 0.0, 0.0),
            radius: 40.0,
            surface: SurfaceKind::Default,
            controller: Controller::Authority,
        })
    }

    #[test]
    fn test_power_level_clamps_peer_count() {
        let aggregator = SwarmAggregator::new(Role::Authority, &TrackerTuning::default());

        for (peers, expected) in [(0, 0), (1, 1), (4, 4), (7, 4)] {
            let mut world = World::new();
            let unit = spawn_bot(&mut world, 0.0);
            for i in 0..peers {
                spawn_bot(&mut world, 10.0 * (i + 1) as f32);
            }
            // Out of range; never counted
            spawn_bot(&mut world, 5_000.0);

            assert_eq!(
                aggregator.power_level_for(unit, &world, &SphereSpatialQuery),
                Some(expected),
                "{} peers",
                peers
            );
        }
    }

    #[test]
    fn test_players_do_not_count() {
        let aggregator = SwarmAggregator::new(Role::Authority, &TrackerTuning::default());
        let mut world = World::new();
        let unit = spawn_bot(&mut world, 0.0);
        world.spawn(SpawnParams {
            kind: EntityKind::Player,
            position: Vec3::new(50.0, 0.0, 0.0),
            radius: 42.0,
            surface: SurfaceKind::Flesh,
            controller: Controller::Remote(1),
        });

        assert_eq!(
            aggregator.power_level_for(unit, &world, &SphereSpatialQuery),
            Some(0)
        );
    }

    #[test]
    fn test_vanished_unit_has_no_power_level() {
        let aggregator = SwarmAggregator::new(Role::Authority, &TrackerTuning::default());
        let world = World::new();
        assert!(aggregator
            .power_level_for(42, &world, &SphereSpatialQuery)
            .is_none());
    }

    #[test]
    fn test_explosion_damage_scales_with_power() {
        assert_approx_eq!(explosion_damage(40.0, 0), 40.0);
        assert_approx_eq!(explosion_damage(40.0, 4), 200.0);
    }
}
