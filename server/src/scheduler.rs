//! Deterministic timer scheduler for the authoritative simulation
//!
//! Every fixed-delay and fixed-interval behaviour of the simulation (wave start
//! delay, spawn cadence, liveness polling, power-level recompute, self-damage
//! ticks, removal grace periods, rate-limited fire) is a timer on this
//! scheduler. Time is simulated seconds and only moves when the owner pops due
//! timers, so tests never sleep and the timeline stays strictly serial.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Shortest repeat interval accepted; protects against a zero interval spinning forever.
const MIN_INTERVAL: f64 = 1e-3;

/// Opaque handle identifying one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct QueueEntry {
    due: f64,
    seq: u64,
    handle: TimerHandle,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // Reversed so the max-heap pops the earliest due time, then the earliest insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .partial_cmp(&self.due)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
struct Timer<E> {
    event: E,
    interval: Option<f64>,
}

/// Min-heap of pending timers keyed by due time
#[derive(Debug)]
pub struct Scheduler<E> {
    now: f64,
    next_handle: u64,
    next_seq: u64,
    queue: BinaryHeap<QueueEntry>,
    timers: HashMap<TimerHandle, Timer<E>>,
}

impl<E: Clone> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_handle: 1,
            next_seq: 0,
            queue: BinaryHeap::new(),
            timers: HashMap::new(),
        }
    }

    /// Current simulated time in seconds
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Schedules a one-shot timer firing `delay` seconds from now
    pub fn after(&mut self, delay: f64, event: E) -> TimerHandle {
        self.insert(delay.max(0.0), None, event)
    }

    /// Schedules a repeating timer whose first fire is one interval from now
    pub fn every(&mut self, interval: f64, event: E) -> TimerHandle {
        self.every_with_delay(interval, interval, event)
    }

    /// Schedules a repeating timer with an explicit first delay
    pub fn every_with_delay(&mut self, first_delay: f64, interval: f64, event: E) -> TimerHandle {
        self.insert(
            first_delay.max(0.0),
            Some(interval.max(MIN_INTERVAL)),
            event,
        )
    }

    /// Cancels a timer. Returns false when the handle was already fired,
    /// cancelled or never existed; that case is a no-op.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.timers.remove(&handle).is_some()
    }

    /// Cancels the timer held in `slot` (if any) and clears the slot
    pub fn clear(&mut self, slot: &mut Option<TimerHandle>) {
        if let Some(handle) = slot.take() {
            self.cancel(handle);
        }
    }

    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    /// Number of live (not yet fired or cancelled) timers
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Pops the next timer due at or before `until`, moving the clock to its
    /// due time. Repeating timers are re-armed before the event is returned,
    /// so the caller may cancel the handle while handling it.
    pub fn pop_due(&mut self, until: f64) -> Option<(TimerHandle, E)> {
        loop {
            let due = self.queue.peek()?.due;
            if due > until {
                return None;
            }
            let entry = self.queue.pop()?;

            let (event, interval) = match self.timers.get(&entry.handle) {
                Some(timer) => (timer.event.clone(), timer.interval),
                // Cancelled after being queued
                None => continue,
            };

            self.now = self.now.max(entry.due);

            match interval {
                Some(interval) => {
                    let seq = self.bump_seq();
                    self.queue.push(QueueEntry {
                        due: entry.due + interval,
                        seq,
                        handle: entry.handle,
                    });
                }
                None => {
                    self.timers.remove(&entry.handle);
                }
            }

            return Some((entry.handle, event));
        }
    }

    /// Moves the clock forward to `until` once all due timers are handled
    pub fn settle(&mut self, until: f64) {
        self.now = self.now.max(until);
    }

    fn insert(&mut self, delay: f64, interval: Option<f64>, event: E) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;

        let seq = self.bump_seq();
        self.queue.push(QueueEntry {
            due: self.now + delay,
            seq,
            handle,
        });
        self.timers.insert(handle, Timer { event, interval });
        handle
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut Scheduler<&'static str>, until: f64) -> Vec<&'static str> {
        let mut fired = Vec::new();
        while let Some((_, event)) = scheduler.pop_due(until) {
            fired.push(event);
        }
        scheduler.settle(until);
        fired
    }

    #[test]
    fn test_after_fires_once() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.after(2.0, "start");

        assert!(drain(&mut scheduler, 1.9).is_empty());
        assert_eq!(drain(&mut scheduler, 2.0), vec!["start"]);
        assert!(!scheduler.is_active(handle));
        assert!(drain(&mut scheduler, 10.0).is_empty());
    }

    #[test]
    fn test_every_repeats_until_cancelled() {
        let mut scheduler = Scheduler::new();
        let handle = scheduler.every(1.0, "poll");

        assert_eq!(drain(&mut scheduler, 3.5), vec!["poll", "poll", "poll"]);
        assert!(scheduler.cancel(handle));
        assert!(drain(&mut scheduler, 10.0).is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut scheduler: Scheduler<&str> = Scheduler::new();
        let handle = scheduler.every(0.25, "tick");

        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));

        let mut slot = None;
        scheduler.clear(&mut slot);
        assert!(slot.is_none());
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_events_ordered_by_time_then_insertion() {
        let mut scheduler = Scheduler::new();
        scheduler.after(1.0, "b");
        scheduler.after(0.5, "a");
        scheduler.after(1.0, "c");

        assert_eq!(drain(&mut scheduler, 1.0), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_zero_first_delay_fires_immediately() {
        let mut scheduler = Scheduler::new();
        scheduler.settle(5.0);
        scheduler.every_with_delay(0.0, 0.25, "self-damage");

        assert_eq!(drain(&mut scheduler, 5.0), vec!["self-damage"]);
        assert_eq!(drain(&mut scheduler, 5.5), vec!["self-damage", "self-damage"]);
    }

    #[test]
    fn test_handler_may_cancel_its_own_repeating_timer() {
        let mut scheduler = Scheduler::new();
        scheduler.every(1.0, "spawn");

        let (handle, _) = scheduler.pop_due(1.0).unwrap();
        assert!(scheduler.is_active(handle));
        assert!(scheduler.cancel(handle));
        assert!(drain(&mut scheduler, 5.0).is_empty());
    }

    #[test]
    fn test_clock_tracks_due_time() {
        let mut scheduler = Scheduler::new();
        scheduler.after(0.75, "x");

        scheduler.pop_due(2.0).unwrap();
        assert_eq!(scheduler.now(), 0.75);
        scheduler.settle(2.0);
        assert_eq!(scheduler.now(), 2.0);

        scheduler.after(1.0, "y");
        assert!(scheduler.pop_due(2.9).is_none());
        assert!(scheduler.pop_due(3.0).is_some());
    }
}
