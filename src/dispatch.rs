// src/dispatch.rs

use crate::flight::FlightController;
use crate::fusion::FusedUpdate;
use crate::types::ControlCommand;
use anyhow::{Context, Result};
use tracing::debug;

/// Hand one cycle's axis errors to the controller and send them.
///
/// Both axes are resolved (set and read back, or cleared) before the single
/// `apply`, so the vehicle never sees a half-updated command. A skipped axis
/// is cleared and goes out as zero.
pub fn dispatch_commands(
    controller: &mut dyn FlightController,
    update: &FusedUpdate,
) -> Result<ControlCommand> {
    let forward = match update.forward_error {
        Some(error) => {
            controller.set_forward_error(error);
            controller.forward_velocity_command()
        }
        None => {
            controller.clear_forward();
            0.0
        }
    };

    let yaw = match update.yaw_error {
        Some(error) => {
            controller.set_yaw_error(error);
            controller.yaw_command()
        }
        None => {
            controller.clear_yaw();
            0.0
        }
    };

    debug!(
        "Dispatch forward_err={:?} yaw_err={:?} -> forward={:.2} yaw={:.2}",
        update.forward_error, update.yaw_error, forward, yaw
    );

    controller.apply().context("Failed to apply control command")
}
