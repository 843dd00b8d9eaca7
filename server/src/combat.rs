//! Weapon fire: requested anywhere, executed only on the authority
//!
//! A fire request from an observer crosses the replication boundary as a
//! validated remote call. The authority enforces the minimum interval between
//! shots, then either runs a single line trace from the owner's eye along its
//! aim (hitscan) or launches a projectile from the muzzle along the same aim.
//! A hitscan shot applies surface-scaled damage through the health ledger and
//! publishes the outcome as the weapon's latest replicated hit; a projectile
//! does its damage when it explodes (see [`crate::projectile`]).
//!
//! Requests that arrive too early are queued, not dropped: each queued request
//! fires exactly once, spaced by the shot interval.

use crate::config::WeaponTuning;
use crate::events::{DamageSource, GameEvent};
use crate::game::{SimContext, TimerEvent};
use crate::health::DamageInfo;
use crate::scheduler::TimerHandle;
use crate::world::{Controller, SpawnParams};
use log::{debug, warn};
use serde::Deserialize;
use shared::{
    EntityId, EntityKind, HitOutcome, ReplicatedHit, Role, SurfaceKind, Vec3, WeaponSnapshot,
};

/// Slack for comparing scheduler times against the ready instant
const TIME_EPSILON: f64 = 1e-9;

/// How a shot reaches its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireMode {
    #[default]
    Hitscan,
    Projectile,
}

/// What happened to a fire request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDisposition {
    Fired,
    /// Accepted; executes once the shot interval has elapsed
    Deferred,
    /// No owner, failed validation, or not on the authority
    Ignored,
}

#[derive(Debug)]
pub struct Weapon {
    id: EntityId,
    owner: Option<EntityId>,
    role: Role,
    tuning: WeaponTuning,
    mode: FireMode,
    last_fired_time: Option<f64>,
    pending_requests: u32,
    deferred_timer: Option<TimerHandle>,
    auto_fire_timer: Option<TimerHandle>,
    shot_sequence: u32,
    last_hit: Option<ReplicatedHit>,
    hit_tests: u64,
    projectiles_launched: u64,
}

impl Weapon {
    pub fn new(id: EntityId, owner: Option<EntityId>, role: Role, tuning: &WeaponTuning) -> Self {
        Self {
            id,
            owner,
            role,
            tuning: tuning.clone(),
            mode: tuning.fire_mode,
            last_fired_time: None,
            pending_requests: 0,
            deferred_timer: None,
            auto_fire_timer: None,
            shot_sequence: 0,
            last_hit: None,
            hit_tests: 0,
            projectiles_launched: 0,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub fn last_hit(&self) -> Option<ReplicatedHit> {
        self.last_hit
    }

    /// Number of line traces performed on the authority
    pub fn hit_tests(&self) -> u64 {
        self.hit_tests
    }

    pub fn projectiles_launched(&self) -> u64 {
        self.projectiles_launched
    }

    pub fn fire_mode(&self) -> FireMode {
        self.mode
    }

    /// Switches between hitscan and projectile. Queued requests keep their place.
    pub fn set_fire_mode(&mut self, mode: FireMode) {
        self.mode = mode;
    }

    pub fn pending_requests(&self) -> u32 {
        self.pending_requests
    }

    pub fn is_auto_firing(&self) -> bool {
        self.auto_fire_timer.is_some()
    }

    /// Seconds between shots, derived from rounds per minute
    pub fn time_between_shots(&self) -> f64 {
        60.0 / self.tuning.rate_of_fire as f64
    }

    fn ready_at(&self) -> f64 {
        self.last_fired_time
            .map_or(f64::NEG_INFINITY, |t| t + self.time_between_shots())
    }

    /// Damage for a hit on the given surface
    pub fn damage_for(&self, surface: SurfaceKind) -> f32 {
        if surface.is_vulnerable() {
            self.tuning.base_damage * self.tuning.vulnerable_multiplier
        } else {
            self.tuning.base_damage
        }
    }

    /// Trust check for requests arriving from an observer. Every request is
    /// accepted; there is no anti-cheat.
    pub fn validate_fire_request(&self) -> bool {
        true
    }

    /// Entry point for a fire request from either side of the boundary
    pub fn request_fire(&mut self, requester: Role, ctx: &mut SimContext<'_>) -> FireDisposition {
        if !requester.is_authority() && !self.validate_fire_request() {
            warn!("Rejected fire request for weapon {}", self.id);
            return FireDisposition::Ignored;
        }
        if !self.role.is_authority() {
            warn!("Weapon {} cannot execute fire on observer", self.id);
            return FireDisposition::Ignored;
        }
        if self.owner.map_or(true, |owner| !ctx.world.contains(owner)) {
            return FireDisposition::Ignored;
        }

        let now = ctx.scheduler.now();
        let ready = self.ready_at();
        if self.pending_requests == 0 && now + TIME_EPSILON >= ready {
            self.fire(ctx);
            return FireDisposition::Fired;
        }

        self.pending_requests += 1;
        if self.deferred_timer.is_none() {
            let delay = (ready - now).max(0.0);
            self.deferred_timer =
                Some(ctx.scheduler.after(delay, TimerEvent::DeferredFire(self.id)));
        }
        debug!(
            "Weapon {} deferred fire ({} pending)",
            self.id, self.pending_requests
        );
        FireDisposition::Deferred
    }

    /// Drains one queued request per shot interval
    pub fn on_deferred_fire(&mut self, ctx: &mut SimContext<'_>) {
        self.deferred_timer = None;
        if self.pending_requests == 0 {
            return;
        }

        let now = ctx.scheduler.now();
        let ready = self.ready_at();
        if now + TIME_EPSILON < ready {
            let delay = ready - now;
            self.deferred_timer =
                Some(ctx.scheduler.after(delay, TimerEvent::DeferredFire(self.id)));
            return;
        }

        self.pending_requests -= 1;
        self.fire(ctx);

        if self.pending_requests > 0 {
            let delay = self.time_between_shots();
            self.deferred_timer =
                Some(ctx.scheduler.after(delay, TimerEvent::DeferredFire(self.id)));
        }
    }

    /// Begins automatic fire. The first shot waits out the current interval.
    pub fn start_fire(&mut self, ctx: &mut SimContext<'_>) {
        if !self.role.is_authority() || self.auto_fire_timer.is_some() {
            return;
        }
        let now = ctx.scheduler.now();
        let first_delay = (self.ready_at() - now).max(0.0);
        self.auto_fire_timer = Some(ctx.scheduler.every_with_delay(
            first_delay,
            self.time_between_shots(),
            TimerEvent::AutoFire(self.id),
        ));
    }

    pub fn stop_fire(&mut self, ctx: &mut SimContext<'_>) {
        ctx.scheduler.clear(&mut self.auto_fire_timer);
    }

    pub fn on_auto_fire(&mut self, ctx: &mut SimContext<'_>) {
        if self.auto_fire_timer.is_none() || self.pending_requests > 0 {
            return;
        }
        if self.owner.map_or(true, |owner| !ctx.world.contains(owner)) {
            ctx.scheduler.clear(&mut self.auto_fire_timer);
            return;
        }
        if ctx.scheduler.now() + TIME_EPSILON >= self.ready_at() {
            self.fire(ctx);
        }
    }

    /// Drops queued requests and stops automatic fire
    pub fn disarm(&mut self, ctx: &mut SimContext<'_>) {
        self.pending_requests = 0;
        ctx.scheduler.clear(&mut self.deferred_timer);
        ctx.scheduler.clear(&mut self.auto_fire_timer);
    }

    /// One authoritative shot. Returns false when there is no owner to fire from.
    fn fire(&mut self, ctx: &mut SimContext<'_>) -> bool {
        let Some(owner) = self.owner else {
            return false;
        };
        let Some(shooter) = ctx.world.get(owner) else {
            return false;
        };
        let origin = shooter.eye_location();
        let direction = shooter.aim.normalize();

        self.last_fired_time = Some(ctx.scheduler.now());
        match self.mode {
            FireMode::Hitscan => self.trace_shot(ctx, owner, origin, direction),
            FireMode::Projectile => self.launch_projectile(ctx, owner, origin, direction),
        }
        true
    }

    fn launch_projectile(
        &mut self,
        ctx: &mut SimContext<'_>,
        owner: EntityId,
        eye: Vec3,
        direction: Vec3,
    ) {
        let projectile = &self.tuning.projectile;
        let muzzle = eye.add(&direction.scale(projectile.muzzle_offset));
        let id = ctx.world.spawn(SpawnParams {
            kind: EntityKind::Projectile,
            position: muzzle,
            radius: projectile.radius,
            surface: SurfaceKind::Default,
            controller: Controller::Authority,
        });
        // In flight it only looks for what it hits; nothing collides with it
        ctx.world.set_collision(id, false);
        ctx.world.set_velocity(id, direction.scale(projectile.speed));

        self.projectiles_launched += 1;
        ctx.events.publish(GameEvent::ProjectileLaunched {
            projectile: id,
            weapon: self.id,
            owner,
        });
    }

    fn trace_shot(
        &mut self,
        ctx: &mut SimContext<'_>,
        owner: EntityId,
        origin: Vec3,
        direction: Vec3,
    ) {
        self.hit_tests += 1;

        let trace = ctx.spatial.line_trace(
            ctx.world,
            origin,
            direction,
            self.tuning.range,
            &[owner, self.id],
        );

        let outcome = match trace {
            Some(hit) => {
                if let Some(actor) = hit.entity_id {
                    let damage = self.damage_for(hit.surface_kind);
                    ctx.ledger.apply_damage(
                        actor,
                        damage,
                        DamageInfo {
                            source: DamageSource::Weapon(self.id),
                            causer: Some(owner),
                            instigator: Some(owner),
                        },
                        ctx.events,
                    );
                }
                HitOutcome {
                    impact_point: hit.point,
                    surface_kind: hit.surface_kind,
                    actor_hit: hit.entity_id,
                }
            }
            None => HitOutcome {
                impact_point: origin.add(&direction.scale(self.tuning.range)),
                surface_kind: SurfaceKind::Default,
                actor_hit: None,
            },
        };

        self.shot_sequence = self.shot_sequence.wrapping_add(1);
        let hit = ReplicatedHit {
            sequence: self.shot_sequence,
            outcome,
        };
        self.last_hit = Some(hit);
        ctx.events.publish(GameEvent::HitOutcomeChanged {
            weapon: self.id,
            owner,
            hit,
        });
    }

    /// Replicated view of this weapon for one recipient. The owner already
    /// played its own prediction, so its copy carries no hit.
    pub fn replicated_for(&self, viewer: Option<EntityId>) -> WeaponSnapshot {
        let is_owner = viewer.is_some() && viewer == self.owner;
        WeaponSnapshot {
            weapon_id: self.id,
            owner: self.owner.unwrap_or_default(),
            last_hit: if is_owner { None } else { self.last_hit },
        }
    }
}
