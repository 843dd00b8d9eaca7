//! Explosive barrel: a shootable prop that blows up once when its health runs out

use crate::collaborators::OverlapFilter;
use crate::config::BarrelTuning;
use crate::events::GameEvent;
use crate::game::SimContext;
use log::debug;
use shared::{EntityId, EntityKind, Vec3};

#[derive(Debug)]
pub struct ExplosiveBarrel {
    id: EntityId,
    tuning: BarrelTuning,
    exploded: bool,
}

impl ExplosiveBarrel {
    pub fn new(id: EntityId, tuning: &BarrelTuning) -> Self {
        Self {
            id,
            tuning: tuning.clone(),
            exploded: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn has_exploded(&self) -> bool {
        self.exploded
    }

    /// Launches itself upward and shoves nearby physics bodies away. Deals no
    /// damage. Only the first call has any effect.
    pub fn explode(&mut self, ctx: &mut SimContext<'_>) -> bool {
        if self.exploded {
            return false;
        }
        self.exploded = true;

        let Some(position) = ctx.world.position(self.id) else {
            return true;
        };
        ctx.world
            .add_impulse(self.id, Vec3::UP.scale(self.tuning.explosion_impulse));

        let pushed: Vec<EntityId> = ctx
            .spatial
            .overlap_sphere(ctx.world, position, self.tuning.radial_radius, OverlapFilter::Any)
            .into_iter()
            .filter(|id| *id != self.id)
            .filter(|id| {
                matches!(
                    ctx.world.kind(*id),
                    Some(EntityKind::ExplosiveBarrel | EntityKind::ThreatUnit)
                )
            })
            .collect();

        for id in pushed {
            let Some(other) = ctx.world.position(id) else {
                continue;
            };
            let mut direction = other.sub(&position).normalize();
            if direction == Vec3::ZERO {
                direction = Vec3::UP;
            }
            ctx.world
                .add_impulse(id, direction.scale(self.tuning.radial_impulse));
            debug!("Barrel {} pushed {}", self.id, id);
        }

        ctx.events.publish(GameEvent::BarrelExploded {
            barrel: self.id,
            position,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{SphereSpatialQuery, StraightLinePathfinder};
    use crate::events::EventBus;
    use crate::game::TimerEvent;
    use crate::health::HealthLedger;
    use crate::scheduler::Scheduler;
    use crate::world::{Controller, SpawnParams, World};
    use assert_approx_eq::assert_approx_eq;
    use shared::{Role, SurfaceKind, HAZARD_TEAM, PLAYER_TEAM};

    #[test]
    fn test_explodes_once_and_pushes_bodies() {
        let mut world = World::new();
        let mut ledger = HealthLedger::new(Role::Authority);
        let mut scheduler: Scheduler<TimerEvent> = Scheduler::new();
        let mut events = EventBus::new();
        let tuning = BarrelTuning::default();

        let spawn = |world: &mut World, kind, x: f32| {
            world.spawn(SpawnParams {
                kind,
                position: Vec3::new(x, 0.0, 0.0),
                radius: 40.0,
                surface: SurfaceKind::Default,
                controller: Controller::Authority,
            })
        };
        let barrel_id = spawn(&mut world, EntityKind::ExplosiveBarrel, 0.0);
        let bot = spawn(&mut world, EntityKind::ThreatUnit, 100.0);
        let player = spawn(&mut world, EntityKind::Player, -100.0);
        ledger.register(barrel_id, 100.0, HAZARD_TEAM);
        ledger.register(player, 100.0, PLAYER_TEAM);

        let mut barrel = ExplosiveBarrel::new(barrel_id, &tuning);
        let mut ctx = SimContext {
            world: &mut world,
            ledger: &mut ledger,
            scheduler: &mut scheduler,
            events: &mut events,
            spatial: &SphereSpatialQuery,
            pathfinder: &StraightLinePathfinder,
        };
        assert!(barrel.explode(&mut ctx));
        assert!(!barrel.explode(&mut ctx));

        assert_approx_eq!(world.get(barrel_id).unwrap().velocity.z, tuning.explosion_impulse);
        assert_approx_eq!(world.get(bot).unwrap().velocity.x, tuning.radial_impulse);
        assert_eq!(world.get(player).unwrap().velocity, Vec3::ZERO);
        assert_eq!(ledger.current_health(player), Some(100.0));

        let explosions = events
            .drain()
            .into_iter()
            .filter(|e| matches!(e, GameEvent::BarrelExploded { .. }))
            .count();
        assert_eq!(explosions, 1);
    }
}
