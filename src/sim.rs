// src/sim.rs
//
// Scripted stand-ins for the camera, lidar, vehicle and clock. Used by
// `--mode sim` and by the pilot tests. Nothing here models flight dynamics:
// the vehicle only records what it was told.

use crate::flight::VehicleLink;
use crate::sensors::{Detector, RangeFinder};
use crate::state_machine::Clock;
use crate::types::{BoundingBox, Detection, Frame, FrameResult, RangingSample};
use anyhow::{bail, Result};
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

/// What the sensors see during one scripted frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SimStep {
    pub detections: Vec<Detection>,
    pub distance: RangingSample,
}

impl SimStep {
    pub fn empty() -> Self {
        Self {
            detections: Vec::new(),
            distance: RangingSample::NoReading,
        }
    }

    pub fn target(bbox: BoundingBox, distance: RangingSample) -> Self {
        Self {
            detections: vec![Detection::new(bbox, 0.9)],
            distance,
        }
    }
}

/// Simulated time, advanced only by frames being captured.
#[derive(Debug, Clone, Default)]
pub struct SteppingClock {
    now: Rc<Cell<Duration>>,
}

impl SteppingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// Replays `SimStep`s one per frame, then yields empty frames forever.
pub struct ScriptedDetector {
    steps: VecDeque<SimStep>,
    width: usize,
    height: usize,
    frame_period: Duration,
    clock: SteppingClock,
    ranging: Rc<Cell<RangingSample>>,
    frames: u64,
    open: bool,
}

#[cfg(test)]
impl ScriptedDetector {
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Detector for ScriptedDetector {
    fn initialize(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<FrameResult> {
        if !self.open {
            bail!("Scripted camera is closed");
        }
        self.clock.advance(self.frame_period);
        self.frames += 1;

        let step = self.steps.pop_front().unwrap_or_else(SimStep::empty);
        self.ranging.set(step.distance);

        let fps = 1.0 / self.frame_period.as_secs_f32();
        let timestamp_ms = self.clock.now().as_secs_f64() * 1000.0;
        Ok(FrameResult {
            detections: step.detections,
            fps,
            frame: Frame::blank(self.width, self.height, timestamp_ms),
        })
    }

    fn close(&mut self) -> Result<()> {
        debug!("Scripted camera closed after {} frames", self.frames);
        self.open = false;
        Ok(())
    }
}

/// Reports whatever distance belongs to the most recent scripted frame.
pub struct ScriptedRangeFinder {
    ranging: Rc<Cell<RangingSample>>,
}

impl RangeFinder for ScriptedRangeFinder {
    fn read_distance(&mut self) -> Result<RangingSample> {
        Ok(self.ranging.get())
    }
}

/// Build a detector / range finder pair over one script, sharing `clock`.
pub fn scripted_sensors(
    steps: Vec<SimStep>,
    image_size: (usize, usize),
    fps: f32,
    clock: &SteppingClock,
) -> (ScriptedDetector, ScriptedRangeFinder) {
    let ranging = Rc::new(Cell::new(RangingSample::NoReading));
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { 25.0 };
    let detector = ScriptedDetector {
        steps: steps.into(),
        width: image_size.0,
        height: image_size.1,
        frame_period: Duration::from_secs_f64(1.0 / fps as f64),
        clock: clock.clone(),
        ranging: Rc::clone(&ranging),
        frames: 0,
        open: false,
    };
    (detector, ScriptedRangeFinder { ranging })
}

/// Built-in run: nobody, then a person walking away to the right, a
/// moment off the lidar, lost, found again, and finally gone for good.
pub fn demo_scenario(image_size: (usize, usize)) -> Vec<SimStep> {
    let (w, h) = (image_size.0 as f32, image_size.1 as f32);
    let (cx, cy) = (w / 2.0, h / 2.0);
    let person = |x: f32| BoundingBox::from_center(x, cy, w * 0.15, h * 0.6);

    let mut steps = vec![SimStep::empty(); 3];

    // Drifting right and away; the box still covers the image centre.
    for i in 0..50 {
        let x = cx + 50.0 + i as f32;
        let distance = RangingSample::from_meters(3.0 + i as f32 * 0.02);
        steps.push(SimStep::target(person(x), distance));
    }

    // Far enough right that the lidar hits the background.
    for i in 0..10 {
        let x = cx + w * 0.2 + i as f32 * 4.0;
        steps.push(SimStep::target(person(x), RangingSample::Distance(8.0)));
    }

    steps.extend(vec![SimStep::empty(); 10]);

    for i in 0..20 {
        let x = cx - 30.0 + i as f32;
        let distance = RangingSample::from_meters(2.4 - i as f32 * 0.01);
        steps.push(SimStep::target(person(x), distance));
    }

    steps
}

/// Vehicle link that flies nowhere and remembers everything it was asked.
#[derive(Debug, Default)]
pub struct LoggingVehicle {
    setpoints: Vec<(f32, f32)>,
    takeoff_altitude: Option<f32>,
    landed: bool,
}

impl LoggingVehicle {
    pub fn new() -> Self {
        Self::default()
    }

}

#[cfg(test)]
impl LoggingVehicle {
    /// (forward m/s, yaw deg/s) in the order they were sent.
    pub fn setpoints(&self) -> &[(f32, f32)] {
        &self.setpoints
    }

    pub fn takeoff_altitude(&self) -> Option<f32> {
        self.takeoff_altitude
    }

    pub fn landed(&self) -> bool {
        self.landed
    }
}

impl VehicleLink for LoggingVehicle {
    fn describe(&self) -> String {
        "simulated vehicle (commands are logged only)".to_string()
    }

    fn arm_and_takeoff(&mut self, altitude: f32) -> Result<()> {
        if self.landed {
            bail!("Vehicle has already landed");
        }
        info!("[sim] armed, at {:.1} m", altitude);
        self.takeoff_altitude = Some(altitude);
        Ok(())
    }

    fn send_velocity(&mut self, forward: f32, yaw_rate: f32) -> Result<()> {
        debug!("[sim] setpoint forward={:.2} yaw_rate={:.2}", forward, yaw_rate);
        self.setpoints.push((forward, yaw_rate));
        Ok(())
    }

    fn land(&mut self) -> Result<()> {
        info!(
            "[sim] landed from {:.1} m after {} setpoints",
            self.takeoff_altitude.unwrap_or(0.0),
            self.setpoints.len()
        );
        self.landed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_replays_then_runs_dry() {
        let clock = SteppingClock::new();
        let bbox = BoundingBox::from_center(10.0, 10.0, 4.0, 4.0);
        let steps = vec![SimStep::target(bbox, RangingSample::Distance(3.0))];
        let (mut detector, mut lidar) = scripted_sensors(steps, (20, 20), 10.0, &clock);
        detector.initialize().unwrap();

        let first = detector.next_frame().unwrap();
        assert_eq!(first.detections.len(), 1);
        assert_eq!(lidar.read_distance().unwrap(), RangingSample::Distance(3.0));
        assert_eq!(clock.now(), Duration::from_millis(100));

        let second = detector.next_frame().unwrap();
        assert!(!second.has_detections());
        assert_eq!(lidar.read_distance().unwrap(), RangingSample::NoReading);
        assert_eq!(clock.now(), Duration::from_millis(200));
        assert_eq!(detector.frames(), 2);
    }

    #[test]
    fn test_closed_camera_refuses_frames() {
        let clock = SteppingClock::new();
        let (mut detector, _) = scripted_sensors(Vec::new(), (20, 20), 10.0, &clock);
        detector.initialize().unwrap();
        detector.close().unwrap();
        assert!(!detector.is_open());
        assert!(detector.next_frame().is_err());
    }

    #[test]
    fn test_demo_scenario_starts_empty_and_ends_on_target() {
        let steps = demo_scenario((1280, 720));
        assert!(steps[..3].iter().all(|s| s.detections.is_empty()));
        assert_eq!(steps[3].detections[0].center().0, 690.0);
        assert!(steps.last().unwrap().distance.distance().is_some());
    }

    #[test]
    fn test_logging_vehicle_records_setpoints() {
        let mut vehicle = LoggingVehicle::new();
        vehicle.arm_and_takeoff(2.5).unwrap();
        vehicle.send_velocity(0.5, -3.0).unwrap();
        vehicle.land().unwrap();
        assert_eq!(vehicle.setpoints(), &[(0.5, -3.0)]);
        assert!(vehicle.landed());
        assert!(vehicle.arm_and_takeoff(2.5).is_err());
    }
}
