//! Authoritative simulation: every component on one serial timeline
//!
//! `Simulation` owns the entity registry, the health ledger, the scheduler and
//! the notification bus, and drives the components that read and mutate them.
//! A call to [`Simulation::step`] applies movement, detects contacts, then
//! fires every timer that falls due within the step in (time, insertion)
//! order. After each mutation the pending notifications are routed back in:
//! a `Killed` reaches the dying entity's own behaviour (detonation, barrel
//! explosion, player death) and then the encounter director.
//!
//! Nothing here blocks or sleeps; the network layer calls `step` once per
//! server tick and tests call it directly.

use crate::barrel::ExplosiveBarrel;
use crate::collaborators::{
    OverlapFilter, Pathfinder, RingSpawnPlacement, SpatialQuery, SpawnPlacement,
    SphereSpatialQuery, StraightLinePathfinder,
};
use crate::combat::{FireDisposition, FireMode, Weapon};
use crate::config::{TrackerTuning, Tuning};
use crate::director::{BotSpawner, EncounterDirector, LivenessView};
use crate::events::{EventBus, EventSink, GameEvent};
use crate::health::{DamageInfo, HealthLedger};
use crate::powerup::{Pickup, Powerup, PowerupOffer};
use crate::projectile::Projectile;
use crate::scheduler::{Scheduler, TimerHandle};
use crate::swarm::SwarmAggregator;
use crate::tracker::ThreatUnit;
use crate::world::{Controller, SpawnParams, World};
use log::{debug, info};
use shared::{
    EntityId, EntityKind, EntitySnapshot, Packet, Role, SurfaceKind, Vec3, WaveState,
    WeaponSnapshot, HAZARD_TEAM, PLAYER_TEAM,
};
use std::collections::{BTreeMap, HashSet};

/// Distance from the arena center at which bots appear
const SPAWN_RING_RADIUS: f32 = 1500.0;
/// Gap between consecutive player spawn points
const PLAYER_SPAWN_SPACING: f32 = 150.0;

/// Everything the scheduler can fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    StartWave,
    SpawnBot,
    LivenessPoll,
    PowerLevel(EntityId),
    SelfDamage(EntityId),
    PathRefresh(EntityId),
    Despawn(EntityId),
    DeferredFire(EntityId),
    AutoFire(EntityId),
    PowerupTick(u32),
    PickupRespawn(EntityId),
    ProjectileFuse(EntityId),
}

/// Shared simulation state lent to a component for one call
pub struct SimContext<'a> {
    pub world: &'a mut World,
    pub ledger: &'a mut HealthLedger,
    pub scheduler: &'a mut Scheduler<TimerEvent>,
    pub events: &'a mut EventBus,
    pub spatial: &'a dyn SpatialQuery,
    pub pathfinder: &'a dyn Pathfinder,
}

struct SimCore {
    world: World,
    ledger: HealthLedger,
    scheduler: Scheduler<TimerEvent>,
    events: EventBus,
}

impl SimCore {
    fn context<'a>(
        &'a mut self,
        spatial: &'a dyn SpatialQuery,
        pathfinder: &'a dyn Pathfinder,
    ) -> SimContext<'a> {
        SimContext {
            world: &mut self.world,
            ledger: &mut self.ledger,
            scheduler: &mut self.scheduler,
            events: &mut self.events,
            spatial,
            pathfinder,
        }
    }
}

struct Liveness<'a> {
    world: &'a World,
    ledger: &'a HealthLedger,
}

impl Liveness<'_> {
    fn count_alive(&self, kind: EntityKind) -> usize {
        self.world
            .iter()
            .filter(|e| e.kind == kind && self.ledger.is_alive(e.id))
            .count()
    }
}

impl LivenessView for Liveness<'_> {
    fn any_player_alive(&self) -> bool {
        self.count_alive(EntityKind::Player) > 0
    }

    fn live_threat_count(&self) -> usize {
        self.count_alive(EntityKind::ThreatUnit)
    }
}

/// Spawns tracker bodies for the director and remembers them so the
/// simulation can attach their behaviour afterwards
struct BotFactory<'a> {
    world: &'a mut World,
    ledger: &'a mut HealthLedger,
    placement: &'a mut (dyn SpawnPlacement + Send + Sync),
    tuning: &'a TrackerTuning,
    spawned: Vec<EntityId>,
}

impl BotSpawner for BotFactory<'_> {
    fn spawn_new_bot(&mut self) -> EntityId {
        let position = self.placement.next_spawn_point();
        let id = spawn_tracker_body(self.world, self.ledger, self.tuning, position);
        self.spawned.push(id);
        id
    }
}

fn spawn_tracker_body(
    world: &mut World,
    ledger: &mut HealthLedger,
    tuning: &TrackerTuning,
    position: Vec3,
) -> EntityId {
    let id = world.spawn(SpawnParams {
        kind: EntityKind::ThreatUnit,
        position,
        radius: tuning.radius,
        surface: SurfaceKind::Flesh,
        controller: Controller::Authority,
    });
    ledger.register(id, tuning.max_health, HAZARD_TEAM);
    id
}

/// Server-side state of one player avatar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub weapon: EntityId,
    /// Planar movement intent, each axis in [-1, 1]
    pub move_intent: (f32, f32),
    pub dead: bool,
}

pub struct Simulation {
    tick: u32,
    tuning: Tuning,
    core: SimCore,
    director: EncounterDirector,
    swarm: SwarmAggregator,
    trackers: BTreeMap<EntityId, ThreatUnit>,
    weapons: BTreeMap<EntityId, Weapon>,
    barrels: BTreeMap<EntityId, ExplosiveBarrel>,
    pickups: BTreeMap<EntityId, Pickup>,
    projectiles: BTreeMap<EntityId, Projectile>,
    powerups: BTreeMap<u32, Powerup>,
    next_powerup_id: u32,
    players: BTreeMap<EntityId, PlayerState>,
    contacts: HashSet<(EntityId, EntityId)>,
    spatial: Box<dyn SpatialQuery + Send + Sync>,
    pathfinder: Box<dyn Pathfinder + Send + Sync>,
    placement: Box<dyn SpawnPlacement + Send + Sync>,
}

impl Simulation {
    /// Simulation with the default sphere queries, straight-line paths and
    /// ring spawn placement seeded from `seed`
    pub fn new(tuning: Tuning, seed: u64) -> Self {
        Self::with_collaborators(
            tuning,
            Box::new(SphereSpatialQuery),
            Box::new(StraightLinePathfinder),
            Box::new(RingSpawnPlacement::new(seed, Vec3::ZERO, SPAWN_RING_RADIUS)),
        )
    }

    pub fn with_collaborators(
        tuning: Tuning,
        spatial: Box<dyn SpatialQuery + Send + Sync>,
        pathfinder: Box<dyn Pathfinder + Send + Sync>,
        placement: Box<dyn SpawnPlacement + Send + Sync>,
    ) -> Self {
        Self {
            tick: 0,
            director: EncounterDirector::new(Role::Authority, &tuning.director),
            swarm: SwarmAggregator::new(Role::Authority, &tuning.tracker),
            core: SimCore {
                world: World::new(),
                ledger: HealthLedger::new(Role::Authority),
                scheduler: Scheduler::new(),
                events: EventBus::new(),
            },
            tuning,
            trackers: BTreeMap::new(),
            weapons: BTreeMap::new(),
            barrels: BTreeMap::new(),
            pickups: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            powerups: BTreeMap::new(),
            next_powerup_id: 1,
            players: BTreeMap::new(),
            contacts: HashSet::new(),
            spatial,
            pathfinder,
            placement,
        }
    }

    pub fn subscribe(&mut self, sink: Box<dyn EventSink + Send + Sync>) {
        self.core.events.subscribe(sink);
    }

    /// Starts the encounter. Later calls are ignored.
    pub fn start_play(&mut self) {
        self.director
            .start_play(&mut self.core.scheduler, &mut self.core.events);
        self.process_events();
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Simulated seconds since creation
    pub fn now(&self) -> f64 {
        self.core.scheduler.now()
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn wave_state(&self) -> WaveState {
        self.director.state()
    }

    pub fn wave_count(&self) -> u32 {
        self.director.wave_count()
    }

    pub fn director(&self) -> &EncounterDirector {
        &self.director
    }

    pub fn world(&self) -> &World {
        &self.core.world
    }

    pub fn ledger(&self) -> &HealthLedger {
        &self.core.ledger
    }

    pub fn tracker(&self, id: EntityId) -> Option<&ThreatUnit> {
        self.trackers.get(&id)
    }

    pub fn tracker_ids(&self) -> Vec<EntityId> {
        self.trackers.keys().copied().collect()
    }

    pub fn weapon(&self, id: EntityId) -> Option<&Weapon> {
        self.weapons.get(&id)
    }

    pub fn player(&self, entity: EntityId) -> Option<&PlayerState> {
        self.players.get(&entity)
    }

    pub fn barrel(&self, id: EntityId) -> Option<&ExplosiveBarrel> {
        self.barrels.get(&id)
    }

    pub fn pickup(&self, id: EntityId) -> Option<&Pickup> {
        self.pickups.get(&id)
    }

    pub fn projectile(&self, id: EntityId) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    pub fn projectile_ids(&self) -> Vec<EntityId> {
        self.projectiles.keys().copied().collect()
    }

    pub fn powerups(&self) -> impl Iterator<Item = &Powerup> {
        self.powerups.values()
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.core.ledger.is_alive(id)
    }

    /// Spawns a player avatar with its weapon. Returns (entity, weapon).
    pub fn add_player(&mut self, controller: Controller) -> (EntityId, EntityId) {
        let position = Vec3::new(self.players.len() as f32 * PLAYER_SPAWN_SPACING, 0.0, 0.0);
        let entity = self.core.world.spawn(SpawnParams {
            kind: EntityKind::Player,
            position,
            radius: self.tuning.player.radius,
            surface: SurfaceKind::Flesh,
            controller,
        });
        self.core
            .ledger
            .register(entity, self.tuning.health.default_health, PLAYER_TEAM);

        let weapon_id = self.core.world.allocate_id();
        self.weapons.insert(
            weapon_id,
            Weapon::new(weapon_id, Some(entity), Role::Authority, &self.tuning.weapon),
        );
        self.players.insert(
            entity,
            PlayerState {
                weapon: weapon_id,
                move_intent: (0.0, 0.0),
                dead: false,
            },
        );
        info!("Player {} joined with weapon {}", entity, weapon_id);
        (entity, weapon_id)
    }

    pub fn remove_player(&mut self, entity: EntityId) -> bool {
        if !self.players.contains_key(&entity) {
            return false;
        }
        self.despawn_entity(entity);
        self.process_events();
        true
    }

    pub fn spawn_threat_unit(&mut self, position: Vec3) -> EntityId {
        let id = spawn_tracker_body(
            &mut self.core.world,
            &mut self.core.ledger,
            &self.tuning.tracker,
            position,
        );
        self.attach_threat_unit(id);
        id
    }

    fn attach_threat_unit(&mut self, id: EntityId) {
        let mut unit = ThreatUnit::new(id, Role::Authority, &self.tuning.tracker);
        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        unit.begin_play(&mut ctx);
        self.trackers.insert(id, unit);
    }

    pub fn spawn_barrel(&mut self, position: Vec3) -> EntityId {
        let id = self.core.world.spawn(SpawnParams {
            kind: EntityKind::ExplosiveBarrel,
            position,
            radius: self.tuning.barrel.radius,
            surface: SurfaceKind::Default,
            controller: Controller::Authority,
        });
        self.core
            .ledger
            .register(id, self.tuning.barrel.max_health, HAZARD_TEAM);
        self.barrels
            .insert(id, ExplosiveBarrel::new(id, &self.tuning.barrel));
        id
    }

    /// Pickups never block traces or bodies; they only watch for players
    pub fn spawn_pickup(&mut self, position: Vec3, offer: PowerupOffer) -> EntityId {
        let id = self.core.world.spawn(SpawnParams {
            kind: EntityKind::Pickup,
            position,
            radius: self.tuning.pickup.radius,
            surface: SurfaceKind::Default,
            controller: Controller::Authority,
        });
        self.core.world.set_collision(id, false);
        self.pickups
            .insert(id, Pickup::new(id, offer, self.tuning.pickup.cooldown));
        id
    }

    /// Moves an entity directly, bypassing physics
    pub fn teleport(&mut self, id: EntityId, position: Vec3) {
        if let Some(entity) = self.core.world.get_mut(id) {
            entity.position = position;
        }
    }

    pub fn set_player_move(&mut self, entity: EntityId, x: f32, y: f32) {
        if let Some(player) = self.players.get_mut(&entity) {
            if !player.dead {
                player.move_intent = (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));
            }
        }
    }

    pub fn set_player_aim(&mut self, entity: EntityId, direction: Vec3) {
        let direction = direction.normalize();
        if direction == Vec3::ZERO || !self.players.contains_key(&entity) {
            return;
        }
        if let Some(avatar) = self.core.world.get_mut(entity) {
            avatar.aim = direction;
        }
    }

    /// Fire request for a player's weapon; `requester` is the side it came from
    pub fn request_fire(&mut self, entity: EntityId, requester: Role) -> FireDisposition {
        let Some(player) = self.players.get(&entity).copied() else {
            return FireDisposition::Ignored;
        };
        if player.dead {
            return FireDisposition::Ignored;
        }
        let Some(weapon) = self.weapons.get_mut(&player.weapon) else {
            return FireDisposition::Ignored;
        };
        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        let disposition = weapon.request_fire(requester, &mut ctx);
        self.process_events();
        disposition
    }

    /// Switches a player's weapon between hitscan and projectile fire
    pub fn set_fire_mode(&mut self, entity: EntityId, mode: FireMode) -> bool {
        let Some(player) = self.players.get(&entity) else {
            return false;
        };
        match self.weapons.get_mut(&player.weapon) {
            Some(weapon) => {
                weapon.set_fire_mode(mode);
                true
            }
            None => false,
        }
    }

    pub fn start_fire(&mut self, entity: EntityId) {
        let Some(player) = self.players.get(&entity).copied() else {
            return;
        };
        if player.dead {
            return;
        }
        if let Some(weapon) = self.weapons.get_mut(&player.weapon) {
            let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
            weapon.start_fire(&mut ctx);
        }
    }

    pub fn stop_fire(&mut self, entity: EntityId) {
        let Some(player) = self.players.get(&entity).copied() else {
            return;
        };
        if let Some(weapon) = self.weapons.get_mut(&player.weapon) {
            let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
            weapon.stop_fire(&mut ctx);
        }
    }

    pub fn apply_damage(&mut self, target: EntityId, amount: f32, info: DamageInfo) -> bool {
        let applied = self
            .core
            .ledger
            .apply_damage(target, amount, info, &mut self.core.events);
        self.process_events();
        applied
    }

    pub fn heal(&mut self, target: EntityId, amount: f32) -> bool {
        let applied = self
            .core
            .ledger
            .heal(target, amount, &mut self.core.events);
        self.process_events();
        applied
    }

    /// Runs a tracker's detonation directly. Returns false when it already went off.
    pub fn detonate(&mut self, unit: EntityId) -> bool {
        let Some(tracker) = self.trackers.get_mut(&unit) else {
            return false;
        };
        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        let detonated = tracker.detonate(&mut ctx);
        self.process_events();
        detonated
    }

    /// Activates a powerup on `target` and returns its id
    pub fn grant_powerup(&mut self, target: EntityId, offer: PowerupOffer) -> u32 {
        let id = self.next_powerup_id;
        self.next_powerup_id += 1;

        let mut powerup = Powerup::new(id, offer);
        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        powerup.activate(target, &mut ctx);
        if powerup.is_active() {
            self.powerups.insert(id, powerup);
        }
        self.process_events();
        id
    }

    /// Advances the simulation by `dt` seconds
    pub fn step(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        self.apply_movement();
        self.core.world.integrate(dt);
        self.sweep_projectiles();
        self.detect_contacts();
        self.detect_pickups();
        self.process_events();

        let until = self.core.scheduler.now() + dt as f64;
        while let Some((handle, event)) = self.core.scheduler.pop_due(until) {
            self.handle_timer(handle, event);
            self.process_events();
        }
        self.core.scheduler.settle(until);

        self.tick = self.tick.wrapping_add(1);
    }

    /// Steps repeatedly until `duration` seconds have elapsed
    pub fn run_for(&mut self, duration: f64, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let steps = (duration / dt as f64).round() as u64;
        for _ in 0..steps {
            self.step(dt);
        }
    }

    fn speed_multiplier(&self, entity: EntityId) -> f32 {
        self.powerups
            .values()
            .filter(|p| p.target() == Some(entity))
            .filter_map(|p| p.speed_multiplier())
            .product()
    }

    fn apply_movement(&mut self) {
        let velocities: Vec<(EntityId, Vec3)> = self
            .players
            .iter()
            .map(|(id, player)| {
                if player.dead {
                    return (*id, Vec3::ZERO);
                }
                let (x, y) = player.move_intent;
                let mut direction = Vec3::new(x, y, 0.0);
                if direction.length() > 1.0 {
                    direction = direction.normalize();
                }
                let speed = self.tuning.player.speed * self.speed_multiplier(*id);
                (*id, direction.scale(speed))
            })
            .collect();
        for (id, velocity) in velocities {
            self.core.world.set_velocity(id, velocity);
        }

        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        for unit in self.trackers.values_mut() {
            let velocity = unit.steer(&mut ctx);
            ctx.world.set_velocity(unit.id(), velocity);
        }
    }

    fn sweep_projectiles(&mut self) {
        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        for projectile in self.projectiles.values_mut() {
            projectile.sweep(&mut ctx);
        }
    }

    /// Begin-overlap detection between trackers and everything around them
    fn detect_contacts(&mut self) {
        let contact_radius = self.tuning.tracker.contact_radius;
        let mut current = HashSet::new();

        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        for unit in self.trackers.values_mut() {
            if unit.is_detonated() {
                continue;
            }
            let Some(position) = ctx.world.position(unit.id()) else {
                continue;
            };
            let touching =
                ctx.spatial
                    .overlap_sphere(ctx.world, position, contact_radius, OverlapFilter::Any);
            for other in touching {
                if other == unit.id() {
                    continue;
                }
                let pair = (unit.id(), other);
                if !self.contacts.contains(&pair) {
                    unit.notify_begin_overlap(&mut ctx, other);
                }
                current.insert(pair);
            }
        }
        self.contacts = current;
    }

    fn detect_pickups(&mut self) {
        let radius = self.tuning.pickup.radius;
        let mut grants = Vec::new();

        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        for pickup in self.pickups.values_mut() {
            if !pickup.is_available() {
                continue;
            }
            let Some(position) = ctx.world.position(pickup.id()) else {
                continue;
            };
            let taker = ctx
                .spatial
                .overlap_sphere(
                    ctx.world,
                    position,
                    radius,
                    OverlapFilter::Kind(EntityKind::Player),
                )
                .into_iter()
                .find(|id| ctx.ledger.is_alive(*id));
            if let Some(player) = taker {
                if let Some(offer) = pickup.take(&mut ctx) {
                    debug!("Player {} took pickup {}", player, pickup.id());
                    grants.push((player, offer));
                }
            }
        }

        for (player, offer) in grants {
            self.grant_powerup(player, offer);
        }
    }

    /// Routes queued notifications back into the components that react to them
    fn process_events(&mut self) {
        while let Some(event) = self.core.events.pop_pending() {
            match event {
                GameEvent::Killed { target, .. } => self.on_killed(target),
                GameEvent::ProjectileLaunched {
                    projectile,
                    weapon,
                    owner,
                } => self.attach_projectile(projectile, owner, weapon),
                _ => {}
            }
        }
    }

    fn attach_projectile(&mut self, id: EntityId, owner: EntityId, weapon: EntityId) {
        let mut projectile = Projectile::new(id, owner, weapon, &self.tuning.weapon.projectile);
        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        projectile.arm(&mut ctx);
        self.projectiles.insert(id, projectile);
    }

    fn on_killed(&mut self, target: EntityId) {
        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        if let Some(unit) = self.trackers.get_mut(&target) {
            unit.detonate(&mut ctx);
        }
        if let Some(barrel) = self.barrels.get_mut(&target) {
            barrel.explode(&mut ctx);
        }
        if let Some(player) = self.players.get_mut(&target) {
            player.dead = true;
            player.move_intent = (0.0, 0.0);
            if let Some(weapon) = self.weapons.get_mut(&player.weapon) {
                weapon.disarm(&mut ctx);
            }
            ctx.world.set_velocity(target, Vec3::ZERO);
            ctx.world.set_collision(target, false);
            info!("Player {} is down", target);
        }

        let SimCore {
            world,
            ledger,
            scheduler,
            events,
        } = &mut self.core;
        let view = Liveness { world, ledger };
        self.director.on_killed(scheduler, events, &view);
    }

    fn handle_timer(&mut self, handle: TimerHandle, event: TimerEvent) {
        match event {
            TimerEvent::StartWave => {
                self.director
                    .on_start_wave(&mut self.core.scheduler, &mut self.core.events);
            }
            TimerEvent::SpawnBot => {
                let SimCore {
                    world,
                    ledger,
                    scheduler,
                    events,
                } = &mut self.core;
                let mut factory = BotFactory {
                    world,
                    ledger,
                    placement: &mut *self.placement,
                    tuning: &self.tuning.tracker,
                    spawned: Vec::new(),
                };
                self.director.on_spawn_tick(scheduler, events, &mut factory);
                for id in factory.spawned {
                    self.attach_threat_unit(id);
                }
            }
            TimerEvent::LivenessPoll => {
                let SimCore {
                    world,
                    ledger,
                    scheduler,
                    events,
                } = &mut self.core;
                let view = Liveness { world, ledger };
                self.director.on_liveness_poll(scheduler, events, &view);
            }
            TimerEvent::PowerLevel(id) => {
                let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
                match self.trackers.get_mut(&id) {
                    Some(unit) => unit.recompute_power_level(&mut ctx, &self.swarm),
                    None => {
                        ctx.scheduler.cancel(handle);
                    }
                }
            }
            TimerEvent::SelfDamage(id) => {
                let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
                match self.trackers.get_mut(&id) {
                    Some(unit) => unit.damage_self(&mut ctx),
                    None => {
                        ctx.scheduler.cancel(handle);
                    }
                }
            }
            TimerEvent::PathRefresh(id) => {
                let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
                match self.trackers.get_mut(&id) {
                    Some(unit) => unit.refresh_path(&mut ctx),
                    None => {
                        ctx.scheduler.cancel(handle);
                    }
                }
            }
            TimerEvent::Despawn(id) => self.despawn_entity(id),
            TimerEvent::DeferredFire(weapon_id) => {
                if let Some(weapon) = self.weapons.get_mut(&weapon_id) {
                    let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
                    weapon.on_deferred_fire(&mut ctx);
                }
            }
            TimerEvent::AutoFire(weapon_id) => {
                let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
                match self.weapons.get_mut(&weapon_id) {
                    Some(weapon) => weapon.on_auto_fire(&mut ctx),
                    None => {
                        ctx.scheduler.cancel(handle);
                    }
                }
            }
            TimerEvent::PowerupTick(powerup_id) => {
                let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
                let expired = match self.powerups.get_mut(&powerup_id) {
                    Some(powerup) => {
                        powerup.on_tick(&mut ctx);
                        !powerup.is_active()
                    }
                    None => {
                        ctx.scheduler.cancel(handle);
                        false
                    }
                };
                if expired {
                    self.powerups.remove(&powerup_id);
                }
            }
            TimerEvent::PickupRespawn(id) => {
                if let Some(pickup) = self.pickups.get_mut(&id) {
                    pickup.respawn();
                }
            }
            TimerEvent::ProjectileFuse(id) => {
                if let Some(projectile) = self.projectiles.get_mut(&id) {
                    let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
                    projectile.on_fuse(&mut ctx);
                }
            }
        }
    }

    /// Removes an entity and everything attached to it
    fn despawn_entity(&mut self, id: EntityId) {
        let mut ctx = self.core.context(&*self.spatial, &*self.pathfinder);
        if let Some(mut unit) = self.trackers.remove(&id) {
            unit.end_play(&mut ctx);
        }
        if let Some(mut pickup) = self.pickups.remove(&id) {
            pickup.end_play(&mut ctx);
        }
        if let Some(mut projectile) = self.projectiles.remove(&id) {
            projectile.end_play(&mut ctx);
        }
        self.barrels.remove(&id);
        if let Some(player) = self.players.remove(&id) {
            if let Some(mut weapon) = self.weapons.remove(&player.weapon) {
                weapon.disarm(&mut ctx);
            }
            for powerup in self.powerups.values_mut() {
                if powerup.target() == Some(id) {
                    powerup.cancel(&mut ctx);
                }
            }
            self.powerups.retain(|_, p| p.target() != Some(id));
        }
        ctx.ledger.remove(id);
        ctx.world.despawn(id);
        self.contacts.retain(|(a, b)| *a != id && *b != id);
    }

    /// Replicated fields of every live entity
    pub fn entity_snapshots(&self) -> Vec<EntitySnapshot> {
        self.core
            .world
            .iter()
            .map(|entity| {
                let tracker = self.trackers.get(&entity.id);
                EntitySnapshot {
                    id: entity.id,
                    kind: entity.kind,
                    team: self.core.ledger.team_of(entity.id),
                    position: entity.position,
                    health: self.core.ledger.get(entity.id).map(|r| r.snapshot()),
                    power_level: tracker.map_or(0, |t| t.power_level()),
                    priming_self_destruct: tracker.is_some_and(|t| t.is_priming()),
                    detonated: tracker.is_some_and(|t| t.is_detonated()),
                }
            })
            .collect()
    }

    /// Every weapon's latest hit as seen by `viewer`
    pub fn weapon_snapshots_for(&self, viewer: Option<EntityId>) -> Vec<WeaponSnapshot> {
        self.weapons
            .values()
            .map(|weapon| weapon.replicated_for(viewer))
            .collect()
    }

    /// Full replication packet for one recipient
    pub fn snapshot_packet(
        &self,
        viewer: Option<EntityId>,
        last_processed_action: u32,
        timestamp: u64,
    ) -> Packet {
        Packet::Snapshot {
            tick: self.tick,
            timestamp,
            wave_state: self.director.state(),
            wave_count: self.director.wave_count(),
            last_processed_action,
            entities: self.entity_snapshots(),
            weapons: self.weapon_snapshots_for(viewer),
        }
    }
}
