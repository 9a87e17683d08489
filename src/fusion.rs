// src/fusion.rs

use crate::config::SystemConfig;
use crate::smoother::MovingAverage;
use crate::targeting::TargetState;
use crate::types::RangingSample;
use tracing::debug;

/// Result of fusing one detection with one lidar sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedUpdate {
    pub target: TargetState,
    pub ranging: RangingSample,
    /// Smoothed distance minus follow distance. `None` when this cycle's
    /// reading was absent or did not belong to the target.
    pub forward_error: Option<f32>,
    /// Smoothed horizontal pixel offset.
    pub yaw_error: Option<f32>,
}

impl FusedUpdate {
    pub fn ranging_used(&self) -> bool {
        self.forward_error.is_some()
    }
}

/// Owns the two smoothing windows; lives as long as the control loop.
#[derive(Debug, Clone)]
pub struct FusionLayer {
    max_follow_distance: f32,
    forward: MovingAverage,
    yaw: MovingAverage,
}

impl FusionLayer {
    pub fn new(config: &SystemConfig) -> Self {
        Self {
            max_follow_distance: config.max_follow_distance,
            forward: MovingAverage::new(config.forward_window),
            yaw: MovingAverage::new(config.yaw_window),
        }
    }

    pub fn fuse(&mut self, target: TargetState, ranging: RangingSample) -> FusedUpdate {
        let forward_error = match ranging.distance() {
            Some(distance) if target.ranging_on_target => {
                self.forward.push(distance);
                self.forward.mean().map(|mean| mean - self.max_follow_distance)
            }
            Some(distance) => {
                debug!(
                    "Ignoring lidar {:.2} m: look direction is off the target box",
                    distance
                );
                None
            }
            None => None,
        };

        self.yaw.push(target.yaw_delta);
        let yaw_error = self.yaw.mean();

        FusedUpdate {
            target,
            ranging,
            forward_error,
            yaw_error,
        }
    }
}

#[cfg(test)]
impl FusionLayer {
    pub fn forward_window(&self) -> &MovingAverage {
        &self.forward
    }

    pub fn yaw_window(&self) -> &MovingAverage {
        &self.yaw
    }
}
