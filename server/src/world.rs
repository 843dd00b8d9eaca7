//! Registry of live entities on the authority
//!
//! The entity set is read by the director's liveness poll, the swarm scan and
//! weapon hit-tests, and mutated only by spawn/despawn. Lookups return
//! `Option` so a reader that races a removal simply sees the id as absent.

use log::info;
use shared::{EntityId, EntityKind, SurfaceKind, Vec3, PLAYER_EYE_HEIGHT};
use std::collections::BTreeMap;

/// Linear damping applied to impulse-driven bodies, per second
const IMPULSE_DAMPING: f32 = 2.0;

/// Who drives an entity's inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Controller {
    Authority,
    /// Owned by a connected client; the authority still owns its state.
    Remote(u32),
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub controller: Controller,
    /// Center of the bounding sphere
    pub position: Vec3,
    pub velocity: Vec3,
    pub radius: f32,
    pub surface: SurfaceKind,
    pub collision_enabled: bool,
    /// Unit aim direction; only meaningful for players
    pub aim: Vec3,
}

impl Entity {
    /// Viewpoint used as the origin of weapon traces
    pub fn eye_location(&self) -> Vec3 {
        match self.kind {
            EntityKind::Player => self.position.add(&Vec3::new(0.0, 0.0, PLAYER_EYE_HEIGHT)),
            _ => self.position,
        }
    }
}

/// Describes a new entity for `World::spawn`
#[derive(Debug, Clone, Copy)]
pub struct SpawnParams {
    pub kind: EntityKind,
    pub position: Vec3,
    pub radius: f32,
    pub surface: SurfaceKind,
    pub controller: Controller,
}

#[derive(Debug, Default)]
pub struct World {
    next_id: EntityId,
    entities: BTreeMap<EntityId, Entity>,
}

impl World {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entities: BTreeMap::new(),
        }
    }

    /// Reserves an id from the shared id space without creating an entity
    pub fn allocate_id(&mut self) -> EntityId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    pub fn spawn(&mut self, params: SpawnParams) -> EntityId {
        let id = self.allocate_id();
        self.entities.insert(
            id,
            Entity {
                id,
                kind: params.kind,
                controller: params.controller,
                position: params.position,
                velocity: Vec3::ZERO,
                radius: params.radius,
                surface: params.surface,
                collision_enabled: true,
                aim: Vec3::new(1.0, 0.0, 0.0),
            },
        );
        info!(
            "Spawned {:?} {} at ({:.0}, {:.0}, {:.0})",
            params.kind, id, params.position.x, params.position.y, params.position.z
        );
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let removed = self.entities.remove(&id);
        if let Some(entity) = &removed {
            info!("Removed {:?} {}", entity.kind, id);
        }
        removed
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn position(&self, id: EntityId) -> Option<Vec3> {
        self.entities.get(&id).map(|e| e.position)
    }

    pub fn kind(&self, id: EntityId) -> Option<EntityKind> {
        self.entities.get(&id).map(|e| e.kind)
    }

    /// Entities in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn ids_of_kind(&self, kind: EntityKind) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.kind == kind)
            .map(|e| e.id)
            .collect()
    }

    pub fn set_collision(&mut self, id: EntityId, enabled: bool) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.collision_enabled = enabled;
        }
    }

    pub fn set_velocity(&mut self, id: EntityId, velocity: Vec3) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.velocity = velocity;
        }
    }

    pub fn add_impulse(&mut self, id: EntityId, impulse: Vec3) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.velocity = entity.velocity.add(&impulse);
        }
    }

    /// Advances positions by their velocities. Impulse-driven bodies slow down
    /// over time and nothing sinks below the ground plane.
    pub fn integrate(&mut self, dt: f32) {
        let damping = (1.0 - IMPULSE_DAMPING * dt).max(0.0);
        for entity in self.entities.values_mut() {
            entity.position = entity.position.add(&entity.velocity.scale(dt));
            if entity.position.z < 0.0 {
                entity.position.z = 0.0;
                entity.velocity.z = entity.velocity.z.max(0.0);
            }
            if matches!(
                entity.kind,
                EntityKind::ExplosiveBarrel | EntityKind::Pickup
            ) {
                entity.velocity = entity.velocity.scale(damping);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
