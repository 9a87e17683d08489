// src/flight/controller.rs

use super::log::{FlightLog, FlightLogRecord};
use super::pid::Pid;
use super::{FlightController, VehicleLink};
use crate::config::{ControllerConfig, ControllerVariant};
use crate::types::ControlCommand;
use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Updates further apart than this restart the I and D terms.
const STALE_UPDATE_SECS: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
struct AxisState {
    error: Option<f32>,
    last_update: Option<Instant>,
}

impl AxisState {
    fn dt(&self, now: Instant) -> Option<f32> {
        self.last_update
            .map(|t| now.duration_since(t).as_secs_f32())
            .filter(|dt| *dt <= STALE_UPDATE_SECS)
    }
}

/// Two PID axes in front of a vehicle link.
///
/// An axis only contributes to `apply` if its error was set since the
/// previous `apply`; anything else is sent as zero.
pub struct PidFlightController<L: VehicleLink> {
    link: L,
    config: ControllerConfig,
    variant: ControllerVariant,
    forward: Pid,
    yaw: Pid,
    forward_state: AxisState,
    yaw_state: AxisState,
    altitude: f32,
    mode_label: String,
    log: Option<FlightLog>,
    dispatched: u64,
}

impl<L: VehicleLink> PidFlightController<L> {
    pub fn new(link: L, config: ControllerConfig) -> Self {
        let variant = ControllerVariant::Pid;
        Self {
            forward: Self::forward_axis(variant, &config),
            yaw: Self::yaw_axis(variant, &config),
            link,
            config,
            variant,
            forward_state: AxisState::default(),
            yaw_state: AxisState::default(),
            altitude: 0.0,
            mode_label: "init".to_string(),
            log: None,
            dispatched: 0,
        }
    }

    fn forward_axis(variant: ControllerVariant, config: &ControllerConfig) -> Pid {
        Pid::for_variant(
            variant,
            config.forward,
            config.max_forward_speed,
            config.integral_limit,
        )
    }

    fn yaw_axis(variant: ControllerVariant, config: &ControllerConfig) -> Pid {
        Pid::for_variant(
            variant,
            config.yaw,
            config.max_yaw_rate,
            config.integral_limit * config.max_yaw_rate / config.max_forward_speed,
        )
    }

    fn write_log(&mut self, event: &'static str, command: ControlCommand) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        let record = FlightLogRecord {
            timestamp: Utc::now(),
            event,
            mode: self.mode_label.clone(),
            forward_error: self.forward_state.error,
            yaw_error: self.yaw_state.error,
            forward_command: command.forward_velocity_command,
            yaw_command: command.yaw_command,
        };
        if let Err(e) = log.record(&record) {
            warn!("Flight log write failed: {:#}", e);
        }
    }
}

impl<L: VehicleLink> FlightController for PidFlightController<L> {
    fn set_flight_altitude(&mut self, meters: f32) {
        self.altitude = meters;
    }

    fn configure(&mut self, variant: ControllerVariant) {
        self.variant = variant;
        self.forward = Self::forward_axis(variant, &self.config);
        self.yaw = Self::yaw_axis(variant, &self.config);
        self.forward_state = AxisState::default();
        self.yaw_state = AxisState::default();
        info!("Controller configured: {}", variant.as_str());
    }

    fn initialize_debug_logs(&mut self, base_path: &Path) -> Result<()> {
        let log = FlightLog::create(base_path)?;
        info!("Flight log: {}", log.path().display());
        self.log = Some(log);
        Ok(())
    }

    fn arm_and_takeoff(&mut self, meters: f32) -> Result<()> {
        let target = if meters > 0.0 { meters } else { self.altitude };
        info!("Arming and climbing to {:.1} m", target);
        self.link.arm_and_takeoff(target)
    }

    fn set_forward_error(&mut self, delta: f32) {
        let now = Instant::now();
        self.forward.update(delta, self.forward_state.dt(now));
        self.forward_state = AxisState {
            error: Some(delta),
            last_update: Some(now),
        };
    }

    fn set_yaw_error(&mut self, delta: f32) {
        let now = Instant::now();
        self.yaw.update(delta, self.yaw_state.dt(now));
        self.yaw_state = AxisState {
            error: Some(delta),
            last_update: Some(now),
        };
    }

    fn clear_forward(&mut self) {
        self.forward_state.error = None;
    }

    fn clear_yaw(&mut self) {
        self.yaw_state.error = None;
    }

    fn forward_velocity_command(&self) -> f32 {
        if self.forward_state.error.is_some() {
            self.forward.output()
        } else {
            0.0
        }
    }

    fn yaw_command(&self) -> f32 {
        if self.yaw_state.error.is_some() {
            self.yaw.output()
        } else {
            0.0
        }
    }

    fn apply(&mut self) -> Result<ControlCommand> {
        let command = ControlCommand {
            yaw_command: self.yaw_command(),
            forward_velocity_command: self.forward_velocity_command(),
        };
        self.link
            .send_velocity(command.forward_velocity_command, command.yaw_command)?;
        self.dispatched += 1;
        self.write_log("apply", command);
        debug!(
            "Applied forward={:.2} m/s yaw={:.2} deg/s",
            command.forward_velocity_command, command.yaw_command
        );

        // Next cycle has to set each axis again or it goes out as zero.
        self.forward_state.error = None;
        self.yaw_state.error = None;
        Ok(command)
    }

    fn stop(&mut self) -> Result<()> {
        self.forward.reset();
        self.yaw.reset();
        self.forward_state = AxisState::default();
        self.yaw_state = AxisState::default();
        self.link.send_velocity(0.0, 0.0)?;
        self.write_log("stop", ControlCommand::default());
        info!("Holding position");
        Ok(())
    }

    fn land(&mut self) -> Result<()> {
        self.write_log("land", ControlCommand::default());
        self.link.land()?;
        info!("Landed");
        Ok(())
    }

    fn set_mode_label(&mut self, label: &str) {
        self.mode_label = label.to_string();
        info!("System state: {}", label);
    }

    fn report(&self) {
        info!("Vehicle link: {}", self.link.describe());
        info!(
            "Controller: {} | forward kp={:.3} ki={:.3} kd={:.3} (±{:.1} m/s) | yaw kp={:.3} ki={:.3} kd={:.3} (±{:.1} deg/s)",
            self.variant.as_str(),
            self.forward.gains().kp,
            self.forward.gains().ki,
            self.forward.gains().kd,
            self.config.max_forward_speed,
            self.yaw.gains().kp,
            self.yaw.gains().ki,
            self.yaw.gains().kd,
            self.config.max_yaw_rate,
        );
        info!(
            "Flight altitude: {:.1} m, setpoints sent: {}",
            self.altitude, self.dispatched
        );
    }
}

#[cfg(test)]
impl<L: VehicleLink> PidFlightController<L> {
    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::LoggingVehicle;
    use approx::assert_relative_eq;

    fn controller() -> PidFlightController<LoggingVehicle> {
        let mut c = PidFlightController::new(LoggingVehicle::new(), ControllerConfig::default());
        c.configure(ControllerVariant::Proportional);
        c
    }

    #[test]
    fn test_commands_follow_errors_and_are_bounded() {
        let mut c = controller();
        c.set_forward_error(1.0);
        c.set_yaw_error(50.0);
        assert_relative_eq!(c.forward_velocity_command(), 0.6);
        assert_relative_eq!(c.yaw_command(), 4.0);

        c.set_forward_error(100.0);
        c.set_yaw_error(-10_000.0);
        assert_relative_eq!(c.forward_velocity_command(), 1.5);
        assert_relative_eq!(c.yaw_command(), -30.0);
    }

    #[test]
    fn test_apply_sends_setpoint_once() {
        let mut c = controller();
        c.set_forward_error(1.0);
        c.set_yaw_error(50.0);
        let sent = c.apply().unwrap();

        assert_eq!(c.link().setpoints(), &[(sent.forward_velocity_command, sent.yaw_command)]);
        assert_eq!(c.dispatched(), 1);
    }

    #[test]
    fn test_axis_not_set_this_cycle_goes_out_as_zero() {
        let mut c = controller();
        c.set_forward_error(1.0);
        c.set_yaw_error(50.0);
        c.apply().unwrap();

        // Only yaw is refreshed: the old forward command must not be resent.
        c.set_yaw_error(25.0);
        let sent = c.apply().unwrap();
        assert_eq!(sent.forward_velocity_command, 0.0);
        assert_relative_eq!(sent.yaw_command, 2.0);
    }

    #[test]
    fn test_clear_forward_zeroes_pending_axis() {
        let mut c = controller();
        c.set_forward_error(1.0);
        c.clear_forward();
        assert_eq!(c.forward_velocity_command(), 0.0);
    }

    #[test]
    fn test_stop_and_land_reach_the_link() {
        let mut c = controller();
        c.set_flight_altitude(2.5);
        c.arm_and_takeoff(2.5).unwrap();
        c.stop().unwrap();
        c.land().unwrap();

        let link = c.link();
        assert_eq!(link.takeoff_altitude(), Some(2.5));
        assert_eq!(link.setpoints(), &[(0.0, 0.0)]);
        assert!(link.landed());
    }
}
