//! Tracker bot: chases the nearest hostile and self-destructs on contact
//!
//! A unit moves toward a waypoint supplied by the pathfinder and, once it
//! touches a hostile, starts a self-damage countdown that runs through the
//! health ledger like any other damage. Its death detonates it:
//!
//! ```text
//! Idle --contact with hostile--> Priming --health reaches zero--> Detonated
//!   \___________________health reaches zero___________________/
//! ```
//!
//! Detonation deals one area-damage pulse scaled by the unit's power level,
//! disables the unit's collision and schedules its removal.

use crate::collaborators::OverlapFilter;
use crate::config::TrackerTuning;
use crate::events::{DamageSource, GameEvent};
use crate::game::{SimContext, TimerEvent};
use crate::health::DamageInfo;
use crate::scheduler::TimerHandle;
use crate::swarm::{explosion_damage, SwarmAggregator};
use log::{debug, info, warn};
use shared::{EntityId, Role, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfDestructState {
    Idle,
    Priming,
    Detonated,
}

#[derive(Debug)]
pub struct ThreatUnit {
    id: EntityId,
    role: Role,
    tuning: TrackerTuning,
    state: SelfDestructState,
    power_level: u8,
    next_waypoint: Option<Vec3>,
    target: Option<EntityId>,
    self_damage_timer: Option<TimerHandle>,
    path_refresh_timer: Option<TimerHandle>,
    power_level_timer: Option<TimerHandle>,
    removal_timer: Option<TimerHandle>,
}

impl ThreatUnit {
    pub fn new(id: EntityId, role: Role, tuning: &TrackerTuning) -> Self {
        Self {
            id,
            role,
            tuning: tuning.clone(),
            state: SelfDestructState::Idle,
            power_level: 0,
            next_waypoint: None,
            target: None,
            self_damage_timer: None,
            path_refresh_timer: None,
            power_level_timer: None,
            removal_timer: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn state(&self) -> SelfDestructState {
        self.state
    }

    pub fn power_level(&self) -> u8 {
        self.power_level
    }

    pub fn is_priming(&self) -> bool {
        self.state == SelfDestructState::Priming
    }

    pub fn is_detonated(&self) -> bool {
        self.state == SelfDestructState::Detonated
    }

    pub fn next_waypoint(&self) -> Option<Vec3> {
        self.next_waypoint
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    /// Arms the power-level and forced path-refresh timers and picks a first waypoint
    pub fn begin_play(&mut self, ctx: &mut SimContext<'_>) {
        if !self.role.is_authority() {
            return;
        }
        let interval = self.tuning.power_level_interval;
        self.power_level_timer =
            Some(ctx.scheduler.every(interval, TimerEvent::PowerLevel(self.id)));
        let interval = self.tuning.path_refresh_interval;
        self.path_refresh_timer =
            Some(ctx.scheduler.every(interval, TimerEvent::PathRefresh(self.id)));
        self.refresh_path(ctx);
    }

    /// Cancels every timer this unit owns. Safe to call repeatedly.
    pub fn end_play(&mut self, ctx: &mut SimContext<'_>) {
        ctx.scheduler.clear(&mut self.self_damage_timer);
        ctx.scheduler.clear(&mut self.path_refresh_timer);
        ctx.scheduler.clear(&mut self.power_level_timer);
        ctx.scheduler.clear(&mut self.removal_timer);
    }

    pub fn recompute_power_level(&mut self, ctx: &mut SimContext<'_>, swarm: &SwarmAggregator) {
        if self.is_detonated() {
            return;
        }
        let Some(level) = swarm.power_level_for(self.id, ctx.world, ctx.spatial) else {
            return;
        };
        if level != self.power_level {
            self.power_level = level;
            ctx.events.publish(GameEvent::PowerLevelChanged {
                unit: self.id,
                power_level: level,
            });
        }
    }

    /// Asks the pathfinder for a route to the nearest hostile. Without a
    /// target, or without a usable path, the unit holds position.
    pub fn refresh_path(&mut self, ctx: &mut SimContext<'_>) {
        if !self.role.is_authority() || self.is_detonated() {
            return;
        }
        let Some(position) = ctx.world.position(self.id) else {
            return;
        };

        self.target = self.nearest_target(ctx, position);
        self.next_waypoint = match self.target {
            Some(target) => match ctx.pathfinder.find_path(ctx.world, position, target) {
                Some(path) if path.len() >= 2 => Some(path[1]),
                _ => Some(position),
            },
            None => None,
        };
        debug!(
            "Tracker {} target {:?} waypoint {:?}",
            self.id, self.target, self.next_waypoint
        );
    }

    fn nearest_target(&self, ctx: &SimContext<'_>, position: Vec3) -> Option<EntityId> {
        ctx.world
            .iter()
            .filter(|e| e.id != self.id)
            .filter(|e| ctx.ledger.is_alive(e.id))
            .filter(|e| !ctx.ledger.is_friendly(Some(self.id), Some(e.id)))
            .map(|e| (e.id, e.position.distance_squared(&position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Desired planar velocity for this tick. Re-paths on arrival.
    pub fn steer(&mut self, ctx: &mut SimContext<'_>) -> Vec3 {
        if self.is_detonated() {
            return Vec3::ZERO;
        }
        let Some(position) = ctx.world.position(self.id) else {
            return Vec3::ZERO;
        };

        let arrived = self
            .next_waypoint
            .map_or(true, |waypoint| {
                planar(waypoint.sub(&position)).length() <= self.tuning.required_distance_to_target
            });
        if arrived {
            self.refresh_path(ctx);
        }

        let Some(waypoint) = self.next_waypoint else {
            return Vec3::ZERO;
        };
        let offset = planar(waypoint.sub(&position));
        if offset.length() <= self.tuning.required_distance_to_target {
            return Vec3::ZERO;
        }
        offset.normalize().scale(self.tuning.speed)
    }

    /// Contact with another entity. Starts the countdown at most once, and
    /// only for a live, non-friendly entity.
    pub fn notify_begin_overlap(&mut self, ctx: &mut SimContext<'_>, other: EntityId) -> bool {
        if !self.role.is_authority() || self.state != SelfDestructState::Idle || other == self.id {
            return false;
        }
        if !ctx.ledger.is_alive(other) || ctx.ledger.is_friendly(Some(self.id), Some(other)) {
            return false;
        }

        self.state = SelfDestructState::Priming;
        self.self_damage_timer = Some(ctx.scheduler.every_with_delay(
            0.0,
            self.tuning.self_damage_interval,
            TimerEvent::SelfDamage(self.id),
        ));
        info!("Tracker {} touched {} and is priming", self.id, other);
        ctx.events
            .publish(GameEvent::SelfDestructPrimed { unit: self.id });
        true
    }

    /// One countdown tick: constant self-inflicted damage through the ledger
    pub fn damage_self(&mut self, ctx: &mut SimContext<'_>) {
        if self.state != SelfDestructState::Priming {
            ctx.scheduler.clear(&mut self.self_damage_timer);
            return;
        }
        ctx.ledger.apply_damage(
            self.id,
            self.tuning.self_damage,
            DamageInfo::self_inflicted(self.id),
            ctx.events,
        );
    }

    /// Explodes once. Later calls are no-ops and return false.
    pub fn detonate(&mut self, ctx: &mut SimContext<'_>) -> bool {
        if !self.role.is_authority() {
            warn!("Ignoring detonation of {} on observer", self.id);
            return false;
        }
        if self.is_detonated() {
            debug!("Tracker {} already detonated", self.id);
            return false;
        }
        self.state = SelfDestructState::Detonated;

        ctx.scheduler.clear(&mut self.self_damage_timer);
        ctx.scheduler.clear(&mut self.path_refresh_timer);
        ctx.scheduler.clear(&mut self.power_level_timer);
        self.next_waypoint = None;

        ctx.world.set_collision(self.id, false);
        ctx.world.set_velocity(self.id, Vec3::ZERO);

        let Some(position) = ctx.world.position(self.id) else {
            return true;
        };
        let damage = explosion_damage(self.tuning.explosion_damage, self.power_level);
        let victims: Vec<EntityId> = ctx
            .spatial
            .overlap_sphere(ctx.world, position, self.tuning.explosion_radius, OverlapFilter::Any)
            .into_iter()
            .filter(|id| *id != self.id)
            .collect();

        ctx.events.publish(GameEvent::Detonated {
            unit: self.id,
            position,
            damage,
            radius: self.tuning.explosion_radius,
        });

        let info = DamageInfo {
            source: DamageSource::Explosion(self.id),
            causer: Some(self.id),
            instigator: None,
        };
        for victim in victims {
            ctx.ledger.apply_damage(victim, damage, info, ctx.events);
        }

        let delay = self.tuning.removal_delay;
        self.removal_timer = Some(ctx.scheduler.after(delay, TimerEvent::Despawn(self.id)));
        true
    }
}

fn planar(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, 0.0)
}
