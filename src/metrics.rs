// src/metrics.rs
//
// Per-run counters for the control loop, summarised once the vehicle is down.

use crate::state_machine::{Mode, Transition};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Transitions kept verbatim in the summary; older ones only survive as counts.
const RECENT_TRANSITIONS: usize = 16;

#[derive(Debug, Clone, Default)]
pub struct PilotMetrics {
    pub search_cycles: u64,
    pub track_cycles: u64,
    pub frames_with_detections: u64,
    pub on_target_ranging: u64,
    pub off_target_ranging: u64,
    pub missing_ranging: u64,
    pub dispatches: u64,
    pub render_failures: u64,
    pub aborted: bool,
    pub search_timed_out: bool,
    recent_transitions: VecDeque<Transition>,
    transition_counts: BTreeMap<String, u64>,
    fps_sum: f64,
    fps_samples: u64,
}

impl PilotMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&mut self, detections: usize, fps: f32) {
        if detections > 0 {
            self.frames_with_detections += 1;
        }
        if fps.is_finite() && fps > 0.0 {
            self.fps_sum += fps as f64;
            self.fps_samples += 1;
        }
    }

    pub fn record_transition(&mut self, transition: Transition) {
        let kind = format!("{}->{}", transition.from, transition.to);
        *self.transition_counts.entry(kind).or_default() += 1;

        if self.recent_transitions.len() == RECENT_TRANSITIONS {
            self.recent_transitions.pop_front();
        }
        self.recent_transitions.push_back(transition);
    }

    pub fn average_fps(&self) -> f64 {
        if self.fps_samples > 0 {
            self.fps_sum / self.fps_samples as f64
        } else {
            0.0
        }
    }

    pub fn summary(&self, final_mode: Mode, elapsed: Duration) -> MetricsSummary {
        MetricsSummary {
            final_mode,
            search_cycles: self.search_cycles,
            track_cycles: self.track_cycles,
            frames_with_detections: self.frames_with_detections,
            on_target_ranging: self.on_target_ranging,
            off_target_ranging: self.off_target_ranging,
            missing_ranging: self.missing_ranging,
            dispatches: self.dispatches,
            render_failures: self.render_failures,
            transitions: self
                .recent_transitions
                .iter()
                .map(|t| format!("{}->{}@{:.1}s", t.from, t.to, t.at.as_secs_f64()))
                .collect(),
            transition_counts: self.transition_counts.clone(),
            aborted: self.aborted,
            search_timed_out: self.search_timed_out,
            avg_fps: self.average_fps(),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub final_mode: Mode,
    pub search_cycles: u64,
    pub track_cycles: u64,
    pub frames_with_detections: u64,
    pub on_target_ranging: u64,
    pub off_target_ranging: u64,
    pub missing_ranging: u64,
    pub dispatches: u64,
    pub render_failures: u64,
    /// Most recent transitions, oldest first.
    pub transitions: Vec<String>,
    pub transition_counts: BTreeMap<String, u64>,
    pub aborted: bool,
    pub search_timed_out: bool,
    pub avg_fps: f64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_average_skips_unknown_rates() {
        let mut metrics = PilotMetrics::new();
        metrics.record_frame(0, 20.0);
        metrics.record_frame(2, 30.0);
        metrics.record_frame(1, 0.0);
        assert_eq!(metrics.frames_with_detections, 2);
        assert_eq!(metrics.average_fps(), 25.0);
    }

    #[test]
    fn test_summary_serialises_transitions() {
        let mut metrics = PilotMetrics::new();
        metrics.record_transition(Transition {
            from: Mode::Takeoff,
            to: Mode::Search,
            at: Duration::from_secs(2),
        });
        let summary = metrics.summary(Mode::Land, Duration::from_secs(10));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["final_mode"], "Land");
        assert_eq!(json["transitions"][0], "takeoff->search@2.0s");
        assert_eq!(json["elapsed_secs"], 10.0);
        assert_eq!(json["transition_counts"]["takeoff->search"], 1);
    }

    #[test]
    fn test_flickering_target_keeps_summary_bounded() {
        let mut metrics = PilotMetrics::new();
        for i in 0..500u64 {
            let (from, to) = if i % 2 == 0 {
                (Mode::Search, Mode::Track)
            } else {
                (Mode::Track, Mode::Search)
            };
            metrics.record_transition(Transition {
                from,
                to,
                at: Duration::from_millis(i * 100),
            });
        }

        let summary = metrics.summary(Mode::Land, Duration::from_secs(50));
        assert_eq!(summary.transitions.len(), RECENT_TRANSITIONS);
        assert_eq!(summary.transitions.last().unwrap(), "track->search@49.9s");
        assert_eq!(summary.transition_counts["search->track"], 250);
        assert_eq!(summary.transition_counts["track->search"], 250);
    }
}
