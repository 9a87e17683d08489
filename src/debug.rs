// src/debug.rs

use crate::fusion::FusedUpdate;
use crate::types::{ControlCommand, Frame};
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything drawn on a tracking frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackOverlay {
    pub update: FusedUpdate,
    pub image_center: (f32, f32),
    pub command: ControlCommand,
    pub fps: f32,
}

impl TrackOverlay {
    /// Distance drawn on the lidar bar; 0 when there was no reading.
    pub fn lidar_distance(&self) -> f32 {
        self.update.ranging.distance().unwrap_or(0.0)
    }

    /// Text rows, top to bottom.
    pub fn lines(&self) -> [String; 3] {
        [
            format!(
                "fps: {:.2} yaw: {:.2} forward: {:.2}",
                self.fps, self.command.yaw_command, self.command.forward_velocity_command
            ),
            format!("lidar_on_target: {}", self.update.target.ranging_on_target),
            format!(
                "x_delta: {:.2} y_delta: {:.2}",
                self.update.target.yaw_delta, self.update.target.pitch_delta
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Overlay {
    Searching { remaining: Duration },
    Tracking(TrackOverlay),
}

impl Overlay {
    pub fn searching_text(remaining: Duration) -> String {
        format!(
            "searching target. Time left: {:.1}",
            remaining.as_secs_f64()
        )
    }
}

/// Diagnostics output. Never on the safety path.
pub trait DebugSink {
    fn render(&mut self, frame: Frame, overlay: &Overlay) -> Result<()>;
}

/// Writes overlays to the log instead of an image.
#[derive(Debug, Default)]
pub struct LogSink {
    rendered: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DebugSink for LogSink {
    fn render(&mut self, frame: Frame, overlay: &Overlay) -> Result<()> {
        self.rendered += 1;
        match overlay {
            Overlay::Searching { remaining } => {
                debug!(
                    "[frame #{} {:.0}ms] {}",
                    self.rendered,
                    frame.timestamp_ms,
                    Overlay::searching_text(*remaining)
                );
            }
            Overlay::Tracking(track) => {
                let [status, lidar, deltas] = track.lines();
                debug!(
                    "[frame #{} {:.0}ms] {} | {} | {} | distance: {:.2}",
                    self.rendered,
                    frame.timestamp_ms,
                    status,
                    lidar,
                    deltas,
                    track.lidar_distance()
                );
            }
        }
        Ok(())
    }
}

/// Render and swallow any failure; the control loop must not care.
pub fn render_safely(sink: &mut dyn DebugSink, frame: Frame, overlay: &Overlay) -> bool {
    match sink.render(frame, overlay) {
        Ok(()) => true,
        Err(e) => {
            warn!("Debug render failed (ignored): {:#}", e);
            false
        }
    }
}
