//! Rounds launched by projectile-mode weapons
//!
//! A projectile flies in a straight line and explodes on the first blocking
//! hit along the path it covered since the last step, or when its fuse runs
//! out. The blast damages everything in range through the health ledger on
//! behalf of the shooter, so friendly fire rules apply as for any other hit.

use crate::collaborators::OverlapFilter;
use crate::config::ProjectileTuning;
use crate::events::{DamageSource, GameEvent};
use crate::game::{SimContext, TimerEvent};
use crate::health::DamageInfo;
use crate::scheduler::TimerHandle;
use log::debug;
use shared::{EntityId, Vec3};

#[derive(Debug)]
pub struct Projectile {
    id: EntityId,
    owner: EntityId,
    weapon: EntityId,
    tuning: ProjectileTuning,
    last_position: Option<Vec3>,
    fuse_timer: Option<TimerHandle>,
    removal_timer: Option<TimerHandle>,
    exploded: bool,
}

impl Projectile {
    pub fn new(id: EntityId, owner: EntityId, weapon: EntityId, tuning: &ProjectileTuning) -> Self {
        Self {
            id,
            owner,
            weapon,
            tuning: tuning.clone(),
            last_position: None,
            fuse_timer: None,
            removal_timer: None,
            exploded: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn weapon(&self) -> EntityId {
        self.weapon
    }

    pub fn has_exploded(&self) -> bool {
        self.exploded
    }

    /// Lights the fuse and starts tracking the flight from the current position
    pub fn arm(&mut self, ctx: &mut SimContext<'_>) {
        self.last_position = ctx.world.position(self.id);
        ctx.scheduler.clear(&mut self.fuse_timer);
        let fuse = self.tuning.fuse;
        self.fuse_timer = Some(ctx.scheduler.after(fuse, TimerEvent::ProjectileFuse(self.id)));
    }

    /// Traces the segment flown since the last sweep. Returns true when it
    /// struck something and exploded.
    pub fn sweep(&mut self, ctx: &mut SimContext<'_>) -> bool {
        if self.exploded {
            return false;
        }
        let Some(current) = ctx.world.position(self.id) else {
            return false;
        };
        let Some(from) = self.last_position.replace(current) else {
            return false;
        };
        let travel = current.sub(&from);
        let distance = travel.length();
        if distance <= f32::EPSILON {
            return false;
        }

        let Some(hit) = ctx.spatial.line_trace(
            ctx.world,
            from,
            travel,
            distance + self.tuning.radius,
            &[self.id, self.owner],
        ) else {
            return false;
        };
        if let Some(entity) = ctx.world.get_mut(self.id) {
            entity.position = hit.point;
        }
        debug!(
            "Projectile {} struck {:?} at ({:.0}, {:.0}, {:.0})",
            self.id, hit.entity_id, hit.point.x, hit.point.y, hit.point.z
        );
        self.explode(ctx)
    }

    /// Fuse expiry
    pub fn on_fuse(&mut self, ctx: &mut SimContext<'_>) {
        self.fuse_timer = None;
        self.explode(ctx);
    }

    /// Damages everything within the blast radius, then removes the round.
    /// Only the first call has any effect.
    pub fn explode(&mut self, ctx: &mut SimContext<'_>) -> bool {
        if self.exploded {
            return false;
        }
        self.exploded = true;
        ctx.scheduler.clear(&mut self.fuse_timer);
        ctx.world.set_velocity(self.id, Vec3::ZERO);

        let Some(position) = ctx.world.position(self.id) else {
            return true;
        };
        let victims = ctx.spatial.overlap_sphere(
            ctx.world,
            position,
            self.tuning.damage_radius,
            OverlapFilter::Any,
        );

        ctx.events.publish(GameEvent::ProjectileExploded {
            projectile: self.id,
            position,
        });

        let info = DamageInfo {
            source: DamageSource::Explosion(self.id),
            causer: Some(self.owner),
            instigator: Some(self.owner),
        };
        for victim in victims {
            ctx.ledger.apply_damage(victim, self.tuning.damage, info, ctx.events);
        }

        self.removal_timer = Some(ctx.scheduler.after(0.0, TimerEvent::Despawn(self.id)));
        true
    }

    pub fn end_play(&mut self, ctx: &mut SimContext<'_>) {
        ctx.scheduler.clear(&mut self.fuse_timer);
        ctx.scheduler.clear(&mut self.removal_timer);
    }
}
