// src/state_machine.rs

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Mode {
    Takeoff,
    Search,
    Track,
    Land,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Takeoff => "takeoff",
            Self::Search => "search",
            Self::Track => "track",
            Self::Land => "land",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a single iteration of the current mode observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleResult {
    /// Manual abort was seen at this iteration's check-point.
    pub aborted: bool,
    /// Detections in the frame polled this iteration (0 if none was polled).
    pub detections: usize,
    /// Time spent in the current mode, sampled at the start of the iteration.
    pub elapsed: Duration,
}

impl CycleResult {
    pub fn completed(elapsed: Duration) -> Self {
        Self {
            aborted: false,
            detections: 0,
            elapsed,
        }
    }

    pub fn aborted(elapsed: Duration) -> Self {
        Self {
            aborted: true,
            detections: 0,
            elapsed,
        }
    }

    pub fn polled(detections: usize, elapsed: Duration) -> Self {
        Self {
            aborted: false,
            detections,
            elapsed,
        }
    }
}

/// Pure transition function.
///
/// Priority inside Search: abort, then timeout, then a detection. The
/// timeout compares the elapsed time sampled before polling, so a search
/// that has run for exactly `search_timeout` lands.
pub fn next_mode(current: Mode, cycle: &CycleResult, search_timeout: Duration) -> Mode {
    match current {
        Mode::Takeoff => Mode::Search,
        Mode::Search => {
            if cycle.aborted || cycle.elapsed >= search_timeout {
                Mode::Land
            } else if cycle.detections > 0 {
                Mode::Track
            } else {
                Mode::Search
            }
        }
        Mode::Track => {
            if cycle.aborted {
                Mode::Land
            } else if cycle.detections == 0 {
                Mode::Search
            } else {
                Mode::Track
            }
        }
        Mode::Land => Mode::Land,
    }
}

/// Time source for mode timers.
pub trait Clock {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
}

pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub from: Mode,
    pub to: Mode,
    pub at: Duration,
}

/// The single authoritative holder of the vehicle mode.
pub struct ModeMachine {
    mode: Mode,
    entered_at: Duration,
    search_timeout: Duration,
}

impl ModeMachine {
    pub fn new(search_timeout: Duration, now: Duration) -> Self {
        Self {
            mode: Mode::Takeoff,
            entered_at: now,
            search_timeout,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn time_in_mode(&self, now: Duration) -> Duration {
        now.saturating_sub(self.entered_at)
    }

    pub fn time_remaining(&self, now: Duration) -> Duration {
        self.search_timeout.saturating_sub(self.time_in_mode(now))
    }

    /// Apply one cycle's observations; returns the transition if the mode changed.
    pub fn advance(&mut self, cycle: &CycleResult, now: Duration) -> Option<Transition> {
        let next = next_mode(self.mode, cycle, self.search_timeout);
        if next == self.mode {
            return None;
        }

        let transition = Transition {
            from: self.mode,
            to: next,
            at: now,
        };
        info!(
            "Mode {} -> {} after {:.1}s{}",
            transition.from,
            transition.to,
            self.time_in_mode(now).as_secs_f64(),
            if cycle.aborted { " (manual abort)" } else { "" }
        );

        self.mode = next;
        self.entered_at = now;
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(40);

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_takeoff_always_goes_to_search() {
        let cycle = CycleResult::completed(secs(0));
        assert_eq!(next_mode(Mode::Takeoff, &cycle, TIMEOUT), Mode::Search);
    }

    #[test]
    fn test_search_times_out_to_land() {
        let empty = CycleResult::polled(0, secs(41));
        assert_eq!(next_mode(Mode::Search, &empty, TIMEOUT), Mode::Land);
    }

    #[test]
    fn test_search_timeout_boundary_is_inclusive() {
        let at_boundary = CycleResult::polled(0, secs(40));
        assert_eq!(next_mode(Mode::Search, &at_boundary, TIMEOUT), Mode::Land);

        let just_before = CycleResult::polled(0, Duration::from_millis(39_999));
        assert_eq!(next_mode(Mode::Search, &just_before, TIMEOUT), Mode::Search);
    }

    #[test]
    fn test_detection_at_39s_tracks() {
        let found = CycleResult::polled(1, secs(39));
        assert_eq!(next_mode(Mode::Search, &found, TIMEOUT), Mode::Track);
    }

    #[test]
    fn test_track_loses_target_to_search() {
        let lost = CycleResult::polled(0, secs(3));
        assert_eq!(next_mode(Mode::Track, &lost, TIMEOUT), Mode::Search);

        let kept = CycleResult::polled(2, secs(300));
        assert_eq!(next_mode(Mode::Track, &kept, TIMEOUT), Mode::Track);
    }

    #[test]
    fn test_abort_lands_from_search_and_track() {
        let abort = CycleResult {
            aborted: true,
            detections: 3,
            elapsed: secs(1),
        };
        assert_eq!(next_mode(Mode::Search, &abort, TIMEOUT), Mode::Land);
        assert_eq!(next_mode(Mode::Track, &abort, TIMEOUT), Mode::Land);
    }

    #[test]
    fn test_land_is_terminal() {
        let abort = CycleResult::aborted(secs(0));
        assert_eq!(next_mode(Mode::Land, &abort, TIMEOUT), Mode::Land);
    }

    #[test]
    fn test_machine_resets_timer_on_transition() {
        let mut machine = ModeMachine::new(TIMEOUT, secs(0));
        machine.advance(&CycleResult::completed(secs(0)), secs(5));
        assert_eq!(machine.mode(), Mode::Search);
        assert_eq!(machine.time_in_mode(secs(15)), secs(10));
        assert_eq!(machine.time_remaining(secs(15)), secs(30));

        // Staying in Search keeps the timer running.
        assert!(machine
            .advance(&CycleResult::polled(0, secs(10)), secs(15))
            .is_none());
        assert_eq!(machine.time_in_mode(secs(15)), secs(10));

        let t = machine
            .advance(&CycleResult::polled(1, secs(12)), secs(17))
            .unwrap();
        assert_eq!((t.from, t.to), (Mode::Search, Mode::Track));
        assert_eq!(machine.time_in_mode(secs(17)), secs(0));
    }
}
