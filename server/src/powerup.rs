//! Pickups and the timed powerups they grant
//!
//! A pickup offers one powerup at a time. Touching it hands the powerup to the
//! player and starts the pickup's cooldown before a fresh one is offered. A
//! powerup ticks a fixed number of times on its own timer (or once, right
//! away, when it has no interval) and then expires.

use crate::config::PickupTuning;
use crate::events::GameEvent;
use crate::game::{SimContext, TimerEvent};
use crate::scheduler::TimerHandle;
use log::debug;
use shared::EntityId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerupKind {
    /// Heals `amount` per tick
    HealthRegen { amount: f32 },
    /// Movement speed multiplier while active
    SuperSpeed { multiplier: f32 },
}

/// What a pickup hands out: the kind plus its tick schedule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerupOffer {
    pub kind: PowerupKind,
    pub interval: f64,
    pub total_ticks: u32,
}

impl PowerupOffer {
    pub fn health_regen(tuning: &PickupTuning) -> Self {
        Self {
            kind: PowerupKind::HealthRegen {
                amount: tuning.regen_amount,
            },
            interval: tuning.regen_interval,
            total_ticks: tuning.regen_ticks,
        }
    }

    /// Lasts one interval of `speed_duration`
    pub fn super_speed(tuning: &PickupTuning) -> Self {
        Self {
            kind: PowerupKind::SuperSpeed {
                multiplier: tuning.speed_multiplier,
            },
            interval: tuning.speed_duration,
            total_ticks: 1,
        }
    }
}

#[derive(Debug)]
pub struct Powerup {
    id: u32,
    offer: PowerupOffer,
    target: Option<EntityId>,
    ticks_processed: u32,
    timer: Option<TimerHandle>,
    active: bool,
}

impl Powerup {
    pub fn new(id: u32, offer: PowerupOffer) -> Self {
        Self {
            id,
            offer,
            target: None,
            ticks_processed: 0,
            timer: None,
            active: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> PowerupKind {
        self.offer.kind
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn ticks_processed(&self) -> u32 {
        self.ticks_processed
    }

    /// Speed multiplier this powerup grants its target right now
    pub fn speed_multiplier(&self) -> Option<f32> {
        match self.offer.kind {
            PowerupKind::SuperSpeed { multiplier } if self.active => Some(multiplier),
            _ => None,
        }
    }

    pub fn activate(&mut self, target: EntityId, ctx: &mut SimContext<'_>) -> bool {
        if self.active || self.ticks_processed > 0 {
            return false;
        }
        self.active = true;
        self.target = Some(target);
        ctx.events.publish(GameEvent::PowerupActivated {
            powerup: self.id,
            target,
            kind: self.offer.kind,
        });

        if self.offer.interval > 0.0 {
            let interval = self.offer.interval;
            self.timer = Some(ctx.scheduler.every(interval, TimerEvent::PowerupTick(self.id)));
        } else {
            self.on_tick(ctx);
        }
        true
    }

    pub fn on_tick(&mut self, ctx: &mut SimContext<'_>) {
        if !self.active {
            ctx.scheduler.clear(&mut self.timer);
            return;
        }
        self.ticks_processed += 1;

        if let (PowerupKind::HealthRegen { amount }, Some(target)) = (self.offer.kind, self.target)
        {
            ctx.ledger.heal(target, amount, ctx.events);
        }
        debug!(
            "Powerup {} tick {}/{}",
            self.id, self.ticks_processed, self.offer.total_ticks
        );

        if self.ticks_processed >= self.offer.total_ticks {
            self.expire(ctx);
        }
    }

    fn expire(&mut self, ctx: &mut SimContext<'_>) {
        ctx.scheduler.clear(&mut self.timer);
        self.active = false;
        if let Some(target) = self.target {
            ctx.events.publish(GameEvent::PowerupExpired {
                powerup: self.id,
                target,
            });
        }
    }

    /// Ends the powerup early, e.g. when its target leaves
    pub fn cancel(&mut self, ctx: &mut SimContext<'_>) {
        if self.active {
            self.expire(ctx);
        }
    }
}

/// A spot in the arena that offers one powerup at a time
#[derive(Debug)]
pub struct Pickup {
    id: EntityId,
    offer: PowerupOffer,
    cooldown: f64,
    available: bool,
    respawn_timer: Option<TimerHandle>,
}

impl Pickup {
    pub fn new(id: EntityId, offer: PowerupOffer, cooldown: f64) -> Self {
        Self {
            id,
            offer,
            cooldown,
            available: true,
            respawn_timer: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Hands out the current powerup and starts the cooldown
    pub fn take(&mut self, ctx: &mut SimContext<'_>) -> Option<PowerupOffer> {
        if !self.available {
            return None;
        }
        self.available = false;
        self.respawn_timer =
            Some(ctx.scheduler.after(self.cooldown, TimerEvent::PickupRespawn(self.id)));
        Some(self.offer)
    }

    pub fn respawn(&mut self) {
        self.respawn_timer = None;
        self.available = true;
    }

    pub fn end_play(&mut self, ctx: &mut SimContext<'_>) {
        ctx.scheduler.clear(&mut self.respawn_timer);
    }
}
