//! Interval timers compared against the loop clock.
//!
//! A [`Timer`] never sleeps: it answers "is this action due?" by comparing
//! `now - last_fired >= interval`. The loop keeps its periodic tasks in a
//! [`TimerTable`] so all of them are checked the same way.

use std::time::Duration;

/// A single interval timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    interval: Duration,
    last_fired: Option<Duration>,
}

impl Timer {
    /// A timer that is due immediately on first check.
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    /// A timer that first becomes due one interval after `now`.
    pub const fn armed_at(interval: Duration, now: Duration) -> Self {
        Self {
            interval,
            last_fired: Some(now),
        }
    }

    /// Returns `true` if the interval has elapsed since the last firing.
    pub fn is_due(&self, now: Duration) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval,
        }
    }

    /// Record that the action ran at `now`.
    pub fn fire(&mut self, now: Duration) {
        self.last_fired = Some(now);
    }

    /// Fire the timer if it is due. Returns whether it fired.
    pub fn poll(&mut self, now: Duration) -> bool {
        if self.is_due(now) {
            self.fire(now);
            true
        } else {
            false
        }
    }

    /// Make the timer due on the next check.
    pub fn reset(&mut self) {
        self.last_fired = None;
    }

    /// Change the interval without touching the last firing time.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_fired(&self) -> Option<Duration> {
        self.last_fired
    }
}

/// Named timers checked uniformly by the loop.
#[derive(Debug, Clone)]
pub struct TimerTable<K> {
    timers: Vec<(K, Timer)>,
}

impl<K: Copy + PartialEq> TimerTable<K> {
    pub fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Add or replace the timer registered under `key`.
    pub fn insert(&mut self, key: K, timer: Timer) {
        match self.get_mut(key) {
            Some(existing) => *existing = timer,
            None => self.timers.push((key, timer)),
        }
    }

    pub fn get(&self, key: K) -> Option<&Timer> {
        self.timers.iter().find(|(k, _)| *k == key).map(|(_, t)| t)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut Timer> {
        self.timers
            .iter_mut()
            .find(|(k, _)| *k == key)
            .map(|(_, t)| t)
    }

    /// Fire the timer under `key` if due. Unknown keys are never due.
    pub fn poll(&mut self, key: K, now: Duration) -> bool {
        self.get_mut(key).map(|t| t.poll(now)).unwrap_or(false)
    }

    /// Keys whose timers are due, in registration order.
    pub fn due(&self, now: Duration) -> Vec<K> {
        self.timers
            .iter()
            .filter(|(_, t)| t.is_due(now))
            .map(|(k, _)| *k)
            .collect()
    }
}

impl<K: Copy + PartialEq> Default for TimerTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_new_timer_is_due_immediately() {
        let timer = Timer::new(secs(30));
        assert!(timer.is_due(Duration::ZERO));
    }

    #[test]
    fn test_armed_timer_waits_one_interval() {
        let mut timer = Timer::armed_at(secs(30), secs(100));
        assert!(!timer.poll(secs(129)));
        assert!(timer.poll(secs(130)));
        assert_eq!(timer.last_fired(), Some(secs(130)));
        assert!(!timer.is_due(secs(131)));
    }

    #[test]
    fn test_clock_going_backwards_is_not_due() {
        let timer = Timer::armed_at(secs(10), secs(50));
        assert!(!timer.is_due(secs(20)));
    }

    #[test]
    fn test_reset_makes_due() {
        let mut timer = Timer::armed_at(secs(3600), secs(0));
        timer.reset();
        assert!(timer.is_due(secs(1)));
    }

    #[test]
    fn test_table_polls_by_key() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        enum Task {
            A,
            B,
        }

        let mut table = TimerTable::new();
        table.insert(Task::A, Timer::armed_at(secs(10), secs(0)));
        table.insert(Task::B, Timer::armed_at(secs(60), secs(0)));

        assert_eq!(table.due(secs(10)), vec![Task::A]);
        assert!(table.poll(Task::A, secs(10)));
        assert!(!table.poll(Task::B, secs(10)));
        assert!(table.due(secs(19)).is_empty());
        assert_eq!(table.due(secs(60)), vec![Task::A, Task::B]);

        table.insert(Task::B, Timer::new(secs(5)));
        assert!(table.poll(Task::B, secs(11)));
    }
}
