//! Wave progression for the encounter
//!
//! The director decides when a wave starts, how many bots it spawns and when
//! it is over; placement is left to a `BotSpawner`. States, authority only:
//!
//! ```text
//! WaitingToStart --start delay--> WaveInProgress --last spawn--> WaitingToComplete
//!       ^                                                              |
//!       +------------- WaveComplete <----- no live bots ---------------+
//!
//! any state --no live player on poll or kill--> GameOver (terminal)
//! ```
//!
//! A kill can clear a wave early, but never while every player is down.

use crate::config::DirectorTuning;
use crate::events::{EventBus, GameEvent};
use crate::game::TimerEvent;
use crate::scheduler::{Scheduler, TimerHandle};
use log::{info, warn};
use shared::{EntityId, Role, WaveState};

/// Places a new bot in the world; the director never decides where
pub trait BotSpawner {
    fn spawn_new_bot(&mut self) -> EntityId;
}

/// Read-only liveness queries over the live entity set
pub trait LivenessView {
    fn any_player_alive(&self) -> bool;
    fn live_threat_count(&self) -> usize;
}

#[derive(Debug)]
pub struct EncounterDirector {
    role: Role,
    tuning: DirectorTuning,
    state: WaveState,
    wave_count: u32,
    bots_remaining: u32,
    kills: u32,
    started: bool,
    start_timer: Option<TimerHandle>,
    spawn_timer: Option<TimerHandle>,
    poll_timer: Option<TimerHandle>,
}

impl EncounterDirector {
    pub fn new(role: Role, tuning: &DirectorTuning) -> Self {
        Self {
            role,
            tuning: tuning.clone(),
            state: WaveState::WaitingToStart,
            wave_count: 0,
            bots_remaining: 0,
            kills: 0,
            started: false,
            start_timer: None,
            spawn_timer: None,
            poll_timer: None,
        }
    }

    pub fn state(&self) -> WaveState {
        self.state
    }

    pub fn wave_count(&self) -> u32 {
        self.wave_count
    }

    pub fn bots_remaining(&self) -> u32 {
        self.bots_remaining
    }

    /// Kill notifications received so far
    pub fn kills(&self) -> u32 {
        self.kills
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Starts the liveness poll and the first start delay. Only the first call counts.
    pub fn start_play(&mut self, scheduler: &mut Scheduler<TimerEvent>, events: &mut EventBus) {
        if !self.role.is_authority() {
            warn!("Encounter cannot be started on observer");
            return;
        }
        if self.started {
            return;
        }
        self.started = true;
        self.poll_timer =
            Some(scheduler.every(self.tuning.poll_interval, TimerEvent::LivenessPoll));
        self.prepare_for_next_wave(scheduler, events);
    }

    fn prepare_for_next_wave(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        events: &mut EventBus,
    ) {
        scheduler.clear(&mut self.start_timer);
        let delay = self.tuning.time_between_waves;
        self.start_timer = Some(scheduler.after(delay, TimerEvent::StartWave));
        self.set_state(WaveState::WaitingToStart, events);
    }

    pub fn on_start_wave(&mut self, scheduler: &mut Scheduler<TimerEvent>, events: &mut EventBus) {
        self.start_timer = None;
        if self.state.is_terminal() {
            return;
        }
        self.wave_count += 1;
        self.bots_remaining = self.tuning.bots_per_wave * self.wave_count;
        info!(
            "Starting wave {} with {} bots",
            self.wave_count, self.bots_remaining
        );
        self.set_state(WaveState::WaveInProgress, events);

        scheduler.clear(&mut self.spawn_timer);
        if self.bots_remaining == 0 {
            self.end_wave(events);
            return;
        }
        self.spawn_timer = Some(scheduler.every(self.tuning.spawn_interval, TimerEvent::SpawnBot));
    }

    pub fn on_spawn_tick(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        events: &mut EventBus,
        spawner: &mut dyn BotSpawner,
    ) {
        if self.state != WaveState::WaveInProgress || self.bots_remaining == 0 {
            scheduler.clear(&mut self.spawn_timer);
            return;
        }

        spawner.spawn_new_bot();
        self.bots_remaining -= 1;

        if self.bots_remaining == 0 {
            scheduler.clear(&mut self.spawn_timer);
            self.end_wave(events);
        }
    }

    fn end_wave(&mut self, events: &mut EventBus) {
        self.set_state(WaveState::WaitingToComplete, events);
    }

    /// Periodic check: game over first, then wave completion
    pub fn on_liveness_poll(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        events: &mut EventBus,
        view: &dyn LivenessView,
    ) {
        if self.state.is_terminal() {
            return;
        }
        if !view.any_player_alive() {
            self.game_over(scheduler, events);
            return;
        }
        self.check_wave_state(scheduler, events, view);
    }

    /// Kill notification routed from the health ledger
    pub fn on_killed(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        events: &mut EventBus,
        view: &dyn LivenessView,
    ) {
        self.kills += 1;
        if !self.started || self.state.is_terminal() {
            return;
        }
        if !view.any_player_alive() {
            self.game_over(scheduler, events);
            return;
        }
        self.check_wave_state(scheduler, events, view);
    }

    fn check_wave_state(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        events: &mut EventBus,
        view: &dyn LivenessView,
    ) {
        if self.state != WaveState::WaitingToComplete || self.bots_remaining > 0 {
            return;
        }
        if view.live_threat_count() > 0 {
            return;
        }
        info!("Wave {} cleared", self.wave_count);
        self.set_state(WaveState::WaveComplete, events);
        self.prepare_for_next_wave(scheduler, events);
    }

    fn game_over(&mut self, scheduler: &mut Scheduler<TimerEvent>, events: &mut EventBus) {
        scheduler.clear(&mut self.start_timer);
        scheduler.clear(&mut self.spawn_timer);
        scheduler.clear(&mut self.poll_timer);
        info!("No players alive after {} waves", self.wave_count);
        self.set_state(WaveState::GameOver, events);
    }

    fn set_state(&mut self, new_state: WaveState, events: &mut EventBus) {
        if new_state == self.state {
            return;
        }
        let old_state = self.state;
        self.state = new_state;
        events.publish(GameEvent::WaveStateChanged {
            new_state,
            old_state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingSpawner {
        spawned: Vec<EntityId>,
    }

    impl BotSpawner for CountingSpawner {
        fn spawn_new_bot(&mut self) -> EntityId {
            let id = 100 + self.spawned.len() as EntityId;
            self.spawned.push(id);
            id
        }
    }

    struct FakeLiveness {
        players_alive: Cell<bool>,
        threats: Cell<usize>,
    }

    impl LivenessView for FakeLiveness {
        fn any_player_alive(&self) -> bool {
            self.players_alive.get()
        }

        fn live_threat_count(&self) -> usize {
            self.threats.get()
        }
    }

    struct Harness {
        director: EncounterDirector,
        scheduler: Scheduler<TimerEvent>,
        events: EventBus,
        spawner: CountingSpawner,
        view: FakeLiveness,
    }

    impl Harness {
        fn new() -> Self {
            let mut harness = Self {
                director: EncounterDirector::new(Role::Authority, &DirectorTuning::default()),
                scheduler: Scheduler::new(),
                events: EventBus::new(),
                spawner: CountingSpawner::default(),
                view: FakeLiveness {
                    players_alive: Cell::new(true),
                    threats: Cell::new(0),
                },
            };
            harness
                .director
                .start_play(&mut harness.scheduler, &mut harness.events);
            harness
        }

        fn advance_to(&mut self, until: f64) {
            while let Some((_, event)) = self.scheduler.pop_due(until) {
                match event {
                    TimerEvent::StartWave => {
                        self.director.on_start_wave(&mut self.scheduler, &mut self.events)
                    }
                    TimerEvent::SpawnBot => {
                        self.director.on_spawn_tick(
                            &mut self.scheduler,
                            &mut self.events,
                            &mut self.spawner,
                        );
                        self.view.threats.set(self.view.threats.get() + 1);
                    }
                    TimerEvent::LivenessPoll => self.director.on_liveness_poll(
                        &mut self.scheduler,
                        &mut self.events,
                        &self.view,
                    ),
                    other => panic!("Unexpected timer {:?}", other),
                }
            }
            self.scheduler.settle(until);
        }

        fn kill_threat(&mut self) {
            self.view.threats.set(self.view.threats.get() - 1);
            self.director
                .on_killed(&mut self.scheduler, &mut self.events, &self.view);
        }

        fn states(&mut self) -> Vec<WaveState> {
            self.events
                .drain()
                .into_iter()
                .filter_map(|e| match e {
                    GameEvent::WaveStateChanged { new_state, .. } => Some(new_state),
                    _ => None,
                })
                .collect()
        }
    }

    #[test]
    fn test_first_wave_starts_after_delay() {
        let mut h = Harness::new();
        assert_eq!(h.director.state(), WaveState::WaitingToStart);
        assert_eq!(h.director.wave_count(), 0);

        h.advance_to(1.9);
        assert_eq!(h.director.state(), WaveState::WaitingToStart);

        h.advance_to(2.0);
        assert_eq!(h.director.state(), WaveState::WaveInProgress);
        assert_eq!(h.director.wave_count(), 1);
        assert_eq!(h.director.bots_remaining(), 2);
    }

    #[test]
    fn test_wave_cycle() {
        let mut h = Harness::new();

        h.advance_to(4.0);
        assert_eq!(h.spawner.spawned.len(), 2);
        assert_eq!(h.director.state(), WaveState::WaitingToComplete);
        assert_eq!(h.director.bots_remaining(), 0);

        h.kill_threat();
        assert_eq!(h.director.state(), WaveState::WaitingToComplete);
        h.states();
        h.kill_threat();
        assert_eq!(
            h.states(),
            vec![WaveState::WaveComplete, WaveState::WaitingToStart]
        );
        assert_eq!(h.director.state(), WaveState::WaitingToStart);

        // Next start delay runs from the clear at t=4
        h.advance_to(6.0);
        assert_eq!(h.director.wave_count(), 2);
        assert_eq!(h.director.bots_remaining(), 4);
    }

    #[test]
    fn test_poll_completes_wave_without_kill_notification() {
        let mut h = Harness::new();
        h.advance_to(4.0);
        assert_eq!(h.director.state(), WaveState::WaitingToComplete);

        h.view.threats.set(0);
        h.advance_to(5.0);
        assert_eq!(h.director.state(), WaveState::WaitingToStart);
    }

    #[test]
    fn test_game_over_takes_priority_and_stops_spawning() {
        let mut h = Harness::new();
        h.advance_to(2.0);
        assert_eq!(h.director.bots_remaining(), 2);

        h.view.players_alive.set(false);
        h.advance_to(3.0);
        assert_eq!(h.director.state(), WaveState::GameOver);

        let spawned = h.spawner.spawned.len();
        h.advance_to(60.0);
        assert_eq!(h.spawner.spawned.len(), spawned);
        assert!(h.director.bots_remaining() > 0);
        assert!(h.scheduler.is_empty());
        assert_eq!(h.director.state(), WaveState::GameOver);
    }

    #[test]
    fn test_game_over_is_terminal() {
        let mut h = Harness::new();
        h.view.players_alive.set(false);
        h.advance_to(1.0);
        assert_eq!(h.director.state(), WaveState::GameOver);

        h.view.players_alive.set(true);
        h.director
            .on_killed(&mut h.scheduler, &mut h.events, &h.view);
        h.director.on_start_wave(&mut h.scheduler, &mut h.events);
        assert_eq!(h.director.state(), WaveState::GameOver);
        assert_eq!(h.director.wave_count(), 0);
    }

    #[test]
    fn test_kill_after_last_player_falls_never_clears_wave() {
        let mut h = Harness::new();
        h.advance_to(4.0);
        assert_eq!(h.director.state(), WaveState::WaitingToComplete);
        h.states();

        h.view.players_alive.set(false);
        h.kill_threat();
        h.kill_threat();
        assert_eq!(h.states(), vec![WaveState::GameOver]);

        h.advance_to(30.0);
        assert_eq!(h.director.wave_count(), 1);
        assert_eq!(h.spawner.spawned.len(), 2);
        assert!(h.scheduler.is_empty());
    }

    #[test]
    fn test_start_play_only_once_and_not_on_observer() {
        let mut h = Harness::new();
        let timers = h.scheduler.len();
        h.director.start_play(&mut h.scheduler, &mut h.events);
        assert_eq!(h.scheduler.len(), timers);

        let mut observer = EncounterDirector::new(Role::ObserverProxy, &DirectorTuning::default());
        let mut scheduler = Scheduler::new();
        observer.start_play(&mut scheduler, &mut EventBus::new());
        assert!(scheduler.is_empty());
        assert!(!observer.has_started());
    }
}
