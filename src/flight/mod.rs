// src/flight/mod.rs

mod controller;
mod log;
mod mavlink_link;
mod pid;

pub use controller::PidFlightController;
pub use mavlink_link::MavlinkVehicle;

use crate::config::ControllerVariant;
use crate::types::ControlCommand;
use anyhow::Result;
use std::path::Path;

/// The controller the pilot hands axis errors to.
///
/// Errors go in per axis, bounded commands come back out, and `apply`
/// sends whatever the axes currently hold to the vehicle in one go.
pub trait FlightController {
    fn set_flight_altitude(&mut self, meters: f32);

    fn configure(&mut self, variant: ControllerVariant);

    fn initialize_debug_logs(&mut self, base_path: &Path) -> Result<()>;

    /// Arm and climb; returns once the vehicle reports the altitude.
    fn arm_and_takeoff(&mut self, meters: f32) -> Result<()>;

    fn set_forward_error(&mut self, delta: f32);

    fn set_yaw_error(&mut self, delta: f32);

    /// Drop the forward axis for this cycle so `apply` sends zero on it.
    fn clear_forward(&mut self);

    /// Drop the yaw axis for this cycle so `apply` sends zero on it.
    fn clear_yaw(&mut self);

    fn forward_velocity_command(&self) -> f32;

    fn yaw_command(&self) -> f32;

    fn apply(&mut self) -> Result<ControlCommand>;

    /// Hover in place.
    fn stop(&mut self) -> Result<()>;

    /// Land; returns once the vehicle is down.
    fn land(&mut self) -> Result<()>;

    /// Telemetry and log label only.
    fn set_mode_label(&mut self, label: &str);

    fn report(&self);
}

/// Transport to the autopilot that actually flies the airframe.
pub trait VehicleLink {
    fn describe(&self) -> String;

    fn arm_and_takeoff(&mut self, altitude: f32) -> Result<()>;

    /// Body-frame forward velocity (m/s) and yaw rate (deg/s).
    fn send_velocity(&mut self, forward: f32, yaw_rate: f32) -> Result<()>;

    fn land(&mut self) -> Result<()>;
}

impl<L: VehicleLink + ?Sized> VehicleLink for Box<L> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn arm_and_takeoff(&mut self, altitude: f32) -> Result<()> {
        (**self).arm_and_takeoff(altitude)
    }

    fn send_velocity(&mut self, forward: f32, yaw_rate: f32) -> Result<()> {
        (**self).send_velocity(forward, yaw_rate)
    }

    fn land(&mut self) -> Result<()> {
        (**self).land()
    }
}
