// src/pilot.rs
//
// The control loop. Owns the mode machine, the fusion buffers and every
// collaborator; one thread, one blocking call at a time.

use crate::config::SystemConfig;
use crate::debug::{render_safely, DebugSink, Overlay, TrackOverlay};
use crate::dispatch::dispatch_commands;
use crate::flight::FlightController;
use crate::fusion::FusionLayer;
use crate::metrics::{MetricsSummary, PilotMetrics};
use crate::sensors::{AbortSource, Detector, RangeFinder};
use crate::state_machine::{Clock, CycleResult, Mode, ModeMachine};
use crate::targeting::{TargetSelector, TargetState};
use crate::types::RangingSample;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fires once per whole second of search countdown, so the default log
/// level shows progress without a line per frame.
#[derive(Debug, Default)]
struct SearchTicker {
    last_second: Option<u64>,
}

impl SearchTicker {
    fn tick(&mut self, remaining: Duration) -> bool {
        let second = remaining.as_secs();
        if self.last_second == Some(second) {
            return false;
        }
        self.last_second = Some(second);
        true
    }
}

/// Everything outside the core that the loop talks to.
pub struct Collaborators {
    pub selector: Box<dyn TargetSelector>,
    pub detector: Box<dyn Detector>,
    pub ranging: Box<dyn RangeFinder>,
    pub controller: Box<dyn FlightController>,
    pub abort: Box<dyn AbortSource>,
    pub sink: Box<dyn DebugSink>,
    pub clock: Box<dyn Clock>,
}

pub struct Autopilot {
    config: SystemConfig,
    parts: Collaborators,
    machine: ModeMachine,
    fusion: FusionLayer,
    metrics: PilotMetrics,
    image_center: (f32, f32),
    started_at: Duration,
}

impl Autopilot {
    /// Prepare the controller and camera. Any failure here is a setup
    /// failure and the vehicle has not moved yet.
    pub fn new(config: SystemConfig, mut parts: Collaborators) -> Result<Self> {
        parts.controller.set_flight_altitude(config.max_altitude);
        parts.controller.configure(config.control);
        parts
            .controller
            .initialize_debug_logs(&config.debug_path)
            .context("Failed to initialise flight logs")?;

        parts
            .detector
            .initialize()
            .context("Failed to initialise detector")?;
        let (width, height) = parts.detector.image_size();
        let image_center = (width as f32 / 2.0, height as f32 / 2.0);
        info!(
            "Image {}x{}, centre ({:.0}, {:.0}), target strategy: {}",
            width,
            height,
            image_center.0,
            image_center.1,
            parts.selector.name()
        );

        let now = parts.clock.now();
        Ok(Self {
            machine: ModeMachine::new(config.search_timeout(), now),
            fusion: FusionLayer::new(&config),
            metrics: PilotMetrics::new(),
            image_center,
            started_at: now,
            config,
            parts,
        })
    }

    /// Fly until landed. Collaborator failures end the run with an error.
    pub fn run(mut self) -> Result<MetricsSummary> {
        loop {
            match self.machine.mode() {
                Mode::Takeoff => self.takeoff()?,
                Mode::Search => self.search()?,
                Mode::Track => self.track()?,
                Mode::Land => {
                    self.land()?;
                    break;
                }
            }
        }

        let elapsed = self.parts.clock.now().saturating_sub(self.started_at);
        Ok(self.metrics.summary(self.machine.mode(), elapsed))
    }

    fn advance(&mut self, cycle: CycleResult) {
        let now = self.parts.clock.now();
        if let Some(transition) = self.machine.advance(&cycle, now) {
            self.metrics.record_transition(transition);
        }
    }

    fn takeoff(&mut self) -> Result<()> {
        let controller = &mut self.parts.controller;
        controller.set_mode_label(Mode::Takeoff.label());
        controller.report();
        controller
            .arm_and_takeoff(self.config.max_altitude)
            .context("Takeoff failed")?;

        let elapsed = self.machine.time_in_mode(self.parts.clock.now());
        self.advance(CycleResult::completed(elapsed));
        Ok(())
    }

    fn search(&mut self) -> Result<()> {
        self.parts.controller.set_mode_label(Mode::Search.label());
        self.parts.controller.stop().context("Failed to hold position")?;
        let timeout = self.config.search_timeout();
        let mut ticker = SearchTicker::default();

        while self.machine.mode() == Mode::Search {
            let elapsed = self.machine.time_in_mode(self.parts.clock.now());
            if elapsed >= timeout {
                warn!("No target for {:.1}s, giving up", elapsed.as_secs_f64());
                self.metrics.search_timed_out = true;
                self.advance(CycleResult::polled(0, elapsed));
                continue;
            }
            if self.parts.abort.abort_requested() {
                self.metrics.aborted = true;
                self.advance(CycleResult::aborted(elapsed));
                continue;
            }

            let result = self
                .parts
                .detector
                .next_frame()
                .context("Detector failed while searching")?;
            self.metrics.search_cycles += 1;
            self.metrics
                .record_frame(result.detections.len(), result.fps);

            let remaining = self.machine.time_remaining(self.parts.clock.now());
            debug!(
                "search: detections={} remaining={:.1}s fps={:.1}",
                result.detections.len(),
                remaining.as_secs_f64(),
                result.fps
            );
            if ticker.tick(remaining) {
                info!("{}", Overlay::searching_text(remaining));
            }

            if !result.has_detections() {
                let overlay = Overlay::Searching { remaining };
                if !render_safely(self.parts.sink.as_mut(), result.frame, &overlay) {
                    self.metrics.render_failures += 1;
                }
            }
            self.advance(CycleResult::polled(result.detections.len(), elapsed));
        }
        Ok(())
    }

    fn track(&mut self) -> Result<()> {
        self.parts.controller.set_mode_label(Mode::Track.label());

        while self.machine.mode() == Mode::Track {
            let elapsed = self.machine.time_in_mode(self.parts.clock.now());
            if self.parts.abort.abort_requested() {
                self.metrics.aborted = true;
                self.advance(CycleResult::aborted(elapsed));
                continue;
            }

            let result = self
                .parts
                .detector
                .next_frame()
                .context("Detector failed while tracking")?;
            self.metrics.track_cycles += 1;
            self.metrics
                .record_frame(result.detections.len(), result.fps);

            let Some(detection) = self.parts.selector.select(&result.detections).copied() else {
                info!("Target lost");
                self.advance(CycleResult::polled(0, elapsed));
                continue;
            };
            let target = TargetState::locate(&detection, self.image_center);

            let ranging = self
                .parts
                .ranging
                .read_distance()
                .context("Lidar read failed")?;
            match ranging {
                RangingSample::Distance(_) if target.ranging_on_target => {
                    self.metrics.on_target_ranging += 1
                }
                RangingSample::Distance(_) => self.metrics.off_target_ranging += 1,
                RangingSample::NoReading => self.metrics.missing_ranging += 1,
            }

            let update = self.fusion.fuse(target, ranging);
            let command = dispatch_commands(self.parts.controller.as_mut(), &update)?;
            self.metrics.dispatches += 1;

            debug!(
                "track: detections={} x_delta={:.1} y_delta={:.1} on_target={} ranging={:?} used={} forward={:.2} yaw={:.2}",
                result.detections.len(),
                target.yaw_delta,
                target.pitch_delta,
                target.ranging_on_target,
                ranging,
                update.ranging_used(),
                command.forward_velocity_command,
                command.yaw_command
            );

            let overlay = Overlay::Tracking(TrackOverlay {
                update,
                image_center: self.image_center,
                command,
                fps: result.fps,
            });
            if !render_safely(self.parts.sink.as_mut(), result.frame, &overlay) {
                self.metrics.render_failures += 1;
            }

            self.advance(CycleResult::polled(result.detections.len(), elapsed));
        }
        Ok(())
    }

    fn land(&mut self) -> Result<()> {
        self.parts.controller.set_mode_label(Mode::Land.label());
        self.parts.controller.land().context("Landing failed")?;
        self.parts
            .detector
            .close()
            .context("Failed to release camera")?;
        info!(
            "Down after {} search and {} track cycles, {} setpoints",
            self.metrics.search_cycles, self.metrics.track_cycles, self.metrics.dispatches
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerVariant;
    use crate::debug::LogSink;
    use crate::dispatch::tests::{Call, RecordingController};
    use crate::sensors::AbortFlag;
    use crate::sim::{scripted_sensors, SimStep, SteppingClock};
    use crate::targeting::FirstDetection;
    use crate::types::{BoundingBox, Frame};
    use anyhow::bail;
    use std::cell::RefCell;
    use std::rc::Rc;

    const IMAGE: (usize, usize) = (1280, 720);

    struct AbortAfter {
        polls: usize,
        after: usize,
    }

    impl AbortSource for AbortAfter {
        fn abort_requested(&mut self) -> bool {
            self.polls += 1;
            self.polls > self.after
        }
    }

    struct BrokenSink;

    impl DebugSink for BrokenSink {
        fn render(&mut self, _frame: Frame, _overlay: &Overlay) -> Result<()> {
            bail!("no display")
        }
    }

    fn config() -> SystemConfig {
        SystemConfig {
            search_timeout_secs: 1.0,
            ..SystemConfig::default()
        }
    }

    fn person_at(x_offset: f32) -> SimStep {
        let bbox = BoundingBox::from_center(640.0 + x_offset, 360.0, 200.0, 400.0);
        SimStep::target(bbox, RangingSample::Distance(3.0))
    }

    fn pilot(
        steps: Vec<SimStep>,
        abort: Box<dyn AbortSource>,
        sink: Box<dyn DebugSink>,
    ) -> (Autopilot, Rc<RefCell<Vec<Call>>>) {
        let clock = SteppingClock::new();
        let (detector, ranging) = scripted_sensors(steps, IMAGE, 10.0, &clock);
        let (controller, calls) = RecordingController::new();
        let parts = Collaborators {
            selector: Box::new(FirstDetection),
            detector: Box::new(detector),
            ranging: Box::new(ranging),
            controller: Box::new(controller),
            abort,
            sink,
            clock: Box::new(clock),
        };
        (Autopilot::new(config(), parts).unwrap(), calls)
    }

    fn count(calls: &[Call], call: &Call) -> usize {
        calls.iter().filter(|c| *c == call).count()
    }

    #[test]
    fn test_search_ticker_fires_once_per_second() {
        let mut ticker = SearchTicker::default();
        let fired: Vec<bool> = [40_000, 39_900, 39_050, 38_999, 38_100, 0]
            .iter()
            .map(|&ms| ticker.tick(Duration::from_millis(ms)))
            .collect();
        assert_eq!(fired, vec![true, true, false, true, false, true]);
    }

    #[test]
    fn test_end_to_end_search_track_loss_and_timeout() {
        let mut steps = vec![SimStep::empty(); 3];
        steps.push(person_at(50.0)); // seen while searching
        steps.push(person_at(50.0)); // first tracked cycle
        let (pilot, calls) = pilot(steps, Box::new(AbortFlag::new()), Box::new(LogSink::new()));
        assert_eq!(pilot.machine.mode(), Mode::Takeoff);

        let summary = pilot.run().unwrap();
        let calls = calls.borrow();

        assert_eq!(
            &calls[..4],
            &[
                Call::Altitude(2.5),
                Call::Configure(ControllerVariant::Pid),
                Call::DebugLogs,
                Call::Label("takeoff".to_string()),
            ]
        );
        assert_eq!(calls[4], Call::Takeoff(2.5));

        // The only tracked cycle: both axes resolved, then one apply.
        let apply = calls.iter().position(|c| *c == Call::Apply).unwrap();
        assert_eq!(
            &calls[apply - 4..=apply],
            &[
                Call::SetForward(1.0),
                Call::GetForward,
                Call::SetYaw(50.0),
                Call::GetYaw,
                Call::Apply,
            ]
        );
        assert_eq!(count(&calls, &Call::Apply), 1);
        assert_eq!(calls.last(), Some(&Call::Land));

        assert_eq!(
            summary.transitions,
            vec![
                "takeoff->search@0.0s",
                "search->track@0.4s",
                "track->search@0.6s",
                "search->land@1.6s",
            ]
        );
        assert_eq!(summary.final_mode, Mode::Land);
        assert_eq!(summary.track_cycles, 2);
        assert_eq!(summary.dispatches, 1);
        assert_eq!(summary.on_target_ranging, 1);
        assert!(summary.search_timed_out);
        assert!(!summary.aborted);
    }

    #[test]
    fn test_search_times_out_without_detections() {
        let (pilot, calls) = pilot(Vec::new(), Box::new(AbortFlag::new()), Box::new(LogSink::new()));
        let summary = pilot.run().unwrap();

        // Polls at 0.0 .. 0.9 s; the check at 1.0 s lands without polling.
        assert_eq!(summary.search_cycles, 10);
        assert!(summary.search_timed_out);
        assert_eq!(summary.dispatches, 0);
        assert_eq!(count(&calls.borrow(), &Call::Stop), 1);
        assert_eq!(summary.transitions.last().unwrap(), "search->land@1.0s");
    }

    #[test]
    fn test_abort_in_search_lands_before_polling() {
        let flag = AbortFlag::new();
        flag.raise();
        let steps = vec![person_at(0.0); 5];
        let (pilot, calls) = pilot(steps, Box::new(flag), Box::new(LogSink::new()));
        let summary = pilot.run().unwrap();

        assert!(summary.aborted);
        assert_eq!(summary.search_cycles, 0);
        assert_eq!(summary.track_cycles, 0);
        assert_eq!(count(&calls.borrow(), &Call::Land), 1);
    }

    #[test]
    fn test_abort_in_track_lands_on_next_poll() {
        let steps = vec![person_at(-30.0); 20];
        let abort = AbortAfter { polls: 0, after: 3 };
        let (pilot, calls) = pilot(steps, Box::new(abort), Box::new(LogSink::new()));
        let summary = pilot.run().unwrap();

        assert!(summary.aborted);
        assert_eq!(summary.search_cycles, 1);
        assert_eq!(summary.track_cycles, 2);
        assert_eq!(summary.dispatches, 2);
        assert_eq!(count(&calls.borrow(), &Call::Apply), 2);
        assert_eq!(summary.transitions.last().unwrap(), "track->land@0.3s");
    }

    #[test]
    fn test_off_target_ranging_clears_forward_axis() {
        let bbox = BoundingBox::from_center(1000.0, 360.0, 100.0, 100.0);
        let steps = vec![
            SimStep::target(bbox, RangingSample::Distance(3.0)),
            SimStep::target(bbox, RangingSample::Distance(3.0)),
        ];
        let (pilot, calls) = pilot(steps, Box::new(AbortFlag::new()), Box::new(LogSink::new()));
        let summary = pilot.run().unwrap();
        let calls = calls.borrow();

        assert_eq!(summary.off_target_ranging, 1);
        assert_eq!(count(&calls, &Call::ClearForward), 1);
        assert_eq!(count(&calls, &Call::SetYaw(360.0)), 1);
        assert!(!calls.iter().any(|c| matches!(c, Call::SetForward(_))));
    }

    #[test]
    fn test_render_failures_do_not_stop_the_loop() {
        let steps = vec![person_at(10.0); 3];
        let (pilot, _) = pilot(steps, Box::new(AbortFlag::new()), Box::new(BrokenSink));
        let summary = pilot.run().unwrap();

        assert_eq!(summary.dispatches, 2);
        assert!(summary.render_failures > 0);
        assert_eq!(summary.final_mode, Mode::Land);
    }
}
