//! External collaborators consumed by the simulation core
//!
//! Spatial queries, pathfinding and spawn placement are black boxes to the
//! core. Each is a trait so tests and other hosts can substitute their own;
//! the default implementations below treat every entity as a sphere on an
//! open, flat arena.

use crate::world::World;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{EntityId, EntityKind, SurfaceKind, Vec3};

/// Fraction of a flesh body's radius above its center that counts as the weak spot
const VULNERABLE_HEIGHT_FRACTION: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub surface_kind: SurfaceKind,
    /// None when the trace struck level geometry
    pub entity_id: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapFilter {
    Any,
    Kind(EntityKind),
}

impl OverlapFilter {
    fn accepts(self, kind: EntityKind) -> bool {
        match self {
            OverlapFilter::Any => true,
            OverlapFilter::Kind(wanted) => wanted == kind,
        }
    }
}

pub trait SpatialQuery {
    /// Ids of collidable entities whose bounds intersect the sphere
    fn overlap_sphere(
        &self,
        world: &World,
        center: Vec3,
        radius: f32,
        filter: OverlapFilter,
    ) -> Vec<EntityId>;

    /// Nearest blocking hit along the ray, skipping the ignored ids
    fn line_trace(
        &self,
        world: &World,
        origin: Vec3,
        direction: Vec3,
        max_range: f32,
        ignore: &[EntityId],
    ) -> Option<TraceHit>;
}

pub trait Pathfinder {
    /// Ordered waypoints from `from` to the target entity, starting at `from`
    fn find_path(&self, world: &World, from: Vec3, to: EntityId) -> Option<Vec<Vec3>>;
}

/// Chooses where the next bot appears
pub trait SpawnPlacement {
    fn next_spawn_point(&mut self) -> Vec3;
}

/// Bounding-sphere queries over the world plus a ground plane at z = 0
#[derive(Debug, Default, Clone, Copy)]
pub struct SphereSpatialQuery;

impl SpatialQuery for SphereSpatialQuery {
    fn overlap_sphere(
        &self,
        world: &World,
        center: Vec3,
        radius: f32,
        filter: OverlapFilter,
    ) -> Vec<EntityId> {
        world
            .iter()
            .filter(|e| e.collision_enabled && filter.accepts(e.kind))
            .filter(|e| e.position.distance(&center) <= radius + e.radius)
            .map(|e| e.id)
            .collect()
    }

    fn line_trace(
        &self,
        world: &World,
        origin: Vec3,
        direction: Vec3,
        max_range: f32,
        ignore: &[EntityId],
    ) -> Option<TraceHit> {
        let dir = direction.normalize();
        if dir == Vec3::ZERO {
            return None;
        }

        let mut best: Option<(f32, TraceHit)> = None;

        for entity in world.iter() {
            if !entity.collision_enabled || ignore.contains(&entity.id) {
                continue;
            }
            let Some(t) = ray_sphere(origin, dir, entity.position, entity.radius) else {
                continue;
            };
            if t > max_range || best.as_ref().is_some_and(|(best_t, _)| t >= *best_t) {
                continue;
            }

            let point = origin.add(&dir.scale(t));
            let surface_kind = match entity.surface {
                SurfaceKind::Flesh
                    if point.z - entity.position.z
                        > entity.radius * VULNERABLE_HEIGHT_FRACTION =>
                {
                    SurfaceKind::FleshVulnerable
                }
                other => other,
            };
            best = Some((
                t,
                TraceHit {
                    point,
                    normal: point.sub(&entity.position).normalize(),
                    surface_kind,
                    entity_id: Some(entity.id),
                },
            ));
        }

        if dir.z < 0.0 && origin.z >= 0.0 {
            let t = -origin.z / dir.z;
            if t <= max_range && best.as_ref().map_or(true, |(best_t, _)| t < *best_t) {
                best = Some((
                    t,
                    TraceHit {
                        point: origin.add(&dir.scale(t)),
                        normal: Vec3::UP,
                        surface_kind: SurfaceKind::Default,
                        entity_id: None,
                    },
                ));
            }
        }

        best.map(|(_, hit)| hit)
    }
}

/// Distance along a unit ray to the first sphere intersection in front of the origin
fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let oc = origin.sub(&center);
    let b = oc.dot(&dir);
    let c = oc.dot(&oc) - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let root = disc.sqrt();
    let near = -b - root;
    if near >= 0.0 {
        return Some(near);
    }
    let far = -b + root;
    (far >= 0.0).then_some(far)
}

/// Open-arena pathfinding: the path is the straight segment to the target
#[derive(Debug, Default, Clone, Copy)]
pub struct StraightLinePathfinder;

impl Pathfinder for StraightLinePathfinder {
    fn find_path(&self, world: &World, from: Vec3, to: EntityId) -> Option<Vec<Vec3>> {
        world.position(to).map(|target| vec![from, target])
    }
}

/// Random points on a ring around the arena center
#[derive(Debug)]
pub struct RingSpawnPlacement {
    rng: StdRng,
    center: Vec3,
    radius: f32,
}

impl RingSpawnPlacement {
    pub fn new(seed: u64, center: Vec3, radius: f32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            center,
            radius,
        }
    }
}

impl SpawnPlacement for RingSpawnPlacement {
    fn next_spawn_point(&mut self) -> Vec3 {
        let angle: f32 = self.rng.gen_range(0.0..std::f32::consts::TAU);
        self.center.add(&Vec3::new(
            angle.cos() * self.radius,
            angle.sin() * self.radius,
            0.0,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Controller, SpawnParams};
    use assert_approx_eq::assert_approx_eq;

    fn spawn(
        world: &mut World,
        kind: EntityKind,
        position: Vec3,
        surface: SurfaceKind,
    ) -> EntityId {
        world.spawn(SpawnParams {
            kind,
            position,
            radius: 40.0,
            surface,
            controller: Controller::Authority,
        })
    }

    #[test]
    fn test_line_trace_hits_nearest_entity() {
        let mut world = World::new();
        let far = spawn(
            &mut world,
            EntityKind::ThreatUnit,
            Vec3::new(500.0, 0.0, 50.0),
            SurfaceKind::Default,
        );
        let near = spawn(
            &mut world,
            EntityKind::ThreatUnit,
            Vec3::new(200.0, 0.0, 50.0),
            SurfaceKind::Default,
        );

        let hit = SphereSpatialQuery
            .line_trace(&world, Vec3::new(0.0, 0.0, 50.0), Vec3::new(1.0, 0.0, 0.0), 10_000.0, &[])
            .unwrap();

        assert_eq!(hit.entity_id, Some(near));
        assert_approx_eq!(hit.point.x, 160.0, 0.01);
        assert_ne!(hit.entity_id, Some(far));
    }

    #[test]
    fn test_line_trace_respects_ignore_and_range() {
        let mut world = World::new();
        let owner = spawn(
            &mut world,
            EntityKind::Player,
            Vec3::new(0.0, 0.0, 50.0),
            SurfaceKind::Flesh,
        );
        let target = spawn(
            &mut world,
            EntityKind::ThreatUnit,
            Vec3::new(300.0, 0.0, 50.0),
            SurfaceKind::Default,
        );

        let origin = Vec3::new(0.0, 0.0, 50.0);
        let dir = Vec3::new(1.0, 0.0, 0.0);
        let hit = SphereSpatialQuery.line_trace(&world, origin, dir, 10_000.0, &[owner]);
        assert_eq!(hit.unwrap().entity_id, Some(target));

        assert!(SphereSpatialQuery
            .line_trace(&world, origin, dir, 100.0, &[owner])
            .is_none());
    }

    #[test]
    fn test_line_trace_head_zone_is_vulnerable() {
        let mut world = World::new();
        let target = spawn(
            &mut world,
            EntityKind::Player,
            Vec3::new(300.0, 0.0, 0.0),
            SurfaceKind::Flesh,
        );

        let head = SphereSpatialQuery
            .line_trace(&world, Vec3::new(0.0, 0.0, 35.0), Vec3::new(1.0, 0.0, 0.0), 10_000.0, &[])
            .unwrap();
        assert_eq!(head.entity_id, Some(target));
        assert_eq!(head.surface_kind, SurfaceKind::FleshVulnerable);

        let body = SphereSpatialQuery
            .line_trace(&world, Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 10_000.0, &[])
            .unwrap();
        assert_eq!(body.surface_kind, SurfaceKind::Flesh);
    }

    #[test]
    fn test_line_trace_downward_hits_ground() {
        let world = World::new();
        let hit = SphereSpatialQuery
            .line_trace(
                &world,
                Vec3::new(0.0, 0.0, 100.0),
                Vec3::new(1.0, 0.0, -1.0),
                10_000.0,
                &[],
            )
            .unwrap();
        assert_eq!(hit.entity_id, None);
        assert_approx_eq!(hit.point.x, 100.0, 0.01);
        assert_approx_eq!(hit.point.z, 0.0, 0.01);
    }

    #[test]
    fn test_overlap_skips_disabled_collision_and_filters_kind() {
        let mut world = World::new();
        let bot = spawn(
            &mut world,
            EntityKind::ThreatUnit,
            Vec3::new(100.0, 0.0, 0.0),
            SurfaceKind::Default,
        );
        let dead = spawn(
            &mut world,
            EntityKind::ThreatUnit,
            Vec3::new(50.0, 0.0, 0.0),
            SurfaceKind::Default,
        );
        let player = spawn(
            &mut world,
            EntityKind::Player,
            Vec3::new(10.0, 0.0, 0.0),
            SurfaceKind::Flesh,
        );
        world.set_collision(dead, false);

        let bots = SphereSpatialQuery.overlap_sphere(
            &world,
            Vec3::ZERO,
            200.0,
            OverlapFilter::Kind(EntityKind::ThreatUnit),
        );
        assert_eq!(bots, vec![bot]);

        let all = SphereSpatialQuery.overlap_sphere(&world, Vec3::ZERO, 200.0, OverlapFilter::Any);
        assert_eq!(all, vec![bot, player]);
    }

    #[test]
    fn test_straight_line_path() {
        let mut world = World::new();
        let target = spawn(
            &mut world,
            EntityKind::Player,
            Vec3::new(10.0, 20.0, 0.0),
            SurfaceKind::Flesh,
        );

        let path = StraightLinePathfinder
            .find_path(&world, Vec3::ZERO, target)
            .unwrap();
        assert_eq!(path, vec![Vec3::ZERO, Vec3::new(10.0, 20.0, 0.0)]);
        assert!(StraightLinePathfinder.find_path(&world, Vec3::ZERO, 99).is_none());
    }

    #[test]
    fn test_ring_placement_is_seeded() {
        let mut a = RingSpawnPlacement::new(7, Vec3::ZERO, 1000.0);
        let mut b = RingSpawnPlacement::new(7, Vec3::ZERO, 1000.0);
        let p = a.next_spawn_point();
        assert_eq!(p, b.next_spawn_point());
        assert_approx_eq!(p.length(), 1000.0, 0.1);
    }
}
