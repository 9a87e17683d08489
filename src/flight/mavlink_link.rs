// src/flight/mavlink_link.rs
//
// ArduCopter over MAVLink (common dialect): GUIDED mode, body-frame
// velocity setpoints with yaw rate, LAND mode to come down.

use super::VehicleLink;
use anyhow::{anyhow, bail, Context, Result};
use mavlink::common::{
    MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavState, MavType,
    PositionTargetTypemask, COMMAND_LONG_DATA, HEARTBEAT_DATA, SET_POSITION_TARGET_LOCAL_NED_DATA,
};
use mavlink::{MavConnection, MavHeader};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const COPTER_MODE_GUIDED: f32 = 4.0;
const COPTER_MODE_LAND: f32 = 9.0;
const MAV_MODE_FLAG_CUSTOM_MODE_ENABLED: f32 = 1.0;

/// Ignore position, acceleration and yaw angle; use velocity and yaw rate.
const VELOCITY_AND_YAW_RATE: u16 = 0b0000_0101_1100_0111;

const GLOBAL_POSITION_INT_ID: f32 = 33.0;
const POSITION_STREAM_INTERVAL_US: f32 = 100_000.0;

/// Takeoff counts as done at this fraction of the requested altitude.
const TAKEOFF_ALTITUDE_RATIO: f32 = 0.95;
const GCS_HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 50;

pub struct MavlinkVehicle {
    connection: Box<dyn MavConnection<MavMessage> + Send + Sync>,
    endpoint: String,
    target_system: u8,
    target_component: u8,
    started: Instant,
    last_heartbeat_sent: Option<Instant>,
}

impl MavlinkVehicle {
    /// Open `endpoint` (e.g. `serial:/dev/ttyACM0:57600`, `udpin:127.0.0.1:14551`)
    /// and block until the autopilot's first heartbeat.
    pub fn connect(endpoint: &str) -> Result<Self> {
        info!("Connecting to vehicle on {}", endpoint);
        let connection = mavlink::connect::<MavMessage>(endpoint)
            .with_context(|| format!("Failed to open MAVLink endpoint {}", endpoint))?;

        let mut vehicle = Self {
            connection,
            endpoint: endpoint.to_string(),
            target_system: 0,
            target_component: 0,
            started: Instant::now(),
            last_heartbeat_sent: None,
        };

        let (system, component) = vehicle.wait_for(|header, msg| match msg {
            MavMessage::HEARTBEAT(hb) if hb.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID => {
                Some((header.system_id, header.component_id))
            }
            _ => None,
        })?;
        vehicle.target_system = system;
        vehicle.target_component = component;
        info!("✓ Heartbeat from system {} component {}", system, component);

        Ok(vehicle)
    }

    fn send(&self, message: &MavMessage) -> Result<()> {
        let header = MavHeader {
            system_id: 255,
            component_id: 190,
            sequence: 0,
        };
        self.connection
            .send(&header, message)
            .map_err(|e| anyhow!("MAVLink send failed: {:?}", e))?;
        Ok(())
    }

    fn command_long(&self, command: MavCmd, params: [f32; 7]) -> Result<()> {
        debug!("COMMAND_LONG {:?} {:?}", command, params);
        self.send(&MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        }))
    }

    fn set_copter_mode(&self, custom_mode: f32) -> Result<()> {
        self.command_long(
            MavCmd::MAV_CMD_DO_SET_MODE,
            [MAV_MODE_FLAG_CUSTOM_MODE_ENABLED, custom_mode, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    fn send_gcs_heartbeat(&mut self) -> Result<()> {
        let due = self
            .last_heartbeat_sent
            .map_or(true, |t| t.elapsed() >= GCS_HEARTBEAT_PERIOD);
        if !due {
            return Ok(());
        }
        self.send(&MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        }))?;
        self.last_heartbeat_sent = Some(Instant::now());
        Ok(())
    }

    /// Read messages from the autopilot until `pick` returns a value.
    fn wait_for<T>(&self, mut pick: impl FnMut(&MavHeader, &MavMessage) -> Option<T>) -> Result<T> {
        let mut errors = 0;
        loop {
            match self.connection.recv() {
                Ok((header, message)) => {
                    errors = 0;
                    // 0 until the first heartbeat tells us who the autopilot is.
                    if self.target_system != 0 && header.system_id != self.target_system {
                        continue;
                    }
                    if let Some(value) = pick(&header, &message) {
                        return Ok(value);
                    }
                }
                Err(e) => {
                    errors += 1;
                    if errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        bail!("MAVLink link on {} failing: {:?}", self.endpoint, e);
                    }
                    debug!("Discarding unreadable MAVLink frame: {:?}", e);
                }
            }
        }
    }

    fn is_armed(message: &MavMessage) -> Option<bool> {
        match message {
            MavMessage::HEARTBEAT(hb) if hb.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID => {
                Some(hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED))
            }
            _ => None,
        }
    }
}

impl VehicleLink for MavlinkVehicle {
    fn describe(&self) -> String {
        format!(
            "MAVLink {} (system {}, component {})",
            self.endpoint, self.target_system, self.target_component
        )
    }

    fn arm_and_takeoff(&mut self, altitude: f32) -> Result<()> {
        self.command_long(
            MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
            [GLOBAL_POSITION_INT_ID, POSITION_STREAM_INTERVAL_US, 0.0, 0.0, 0.0, 0.0, 0.0],
        )?;

        self.set_copter_mode(COPTER_MODE_GUIDED)?;
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )?;
        self.wait_for(|_, msg| Self::is_armed(msg).filter(|armed| *armed))?;
        info!("✓ Armed");

        self.command_long(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, altitude],
        )?;

        let target_mm = altitude * TAKEOFF_ALTITUDE_RATIO * 1000.0;
        let mut last_logged = Instant::now();
        let reached = self.wait_for(|_, msg| match msg {
            MavMessage::GLOBAL_POSITION_INT(pos) => {
                let current = pos.relative_alt as f32;
                if last_logged.elapsed() >= Duration::from_secs(1) {
                    info!("Altitude: {:.2} m", current / 1000.0);
                    last_logged = Instant::now();
                }
                (current >= target_mm).then_some(current / 1000.0)
            }
            _ => None,
        })?;
        info!("✓ Reached {:.2} m", reached);
        Ok(())
    }

    fn send_velocity(&mut self, forward: f32, yaw_rate: f32) -> Result<()> {
        self.send_gcs_heartbeat()?;
        let time_boot_ms = self.started.elapsed().as_millis() as u32;
        self.send(&MavMessage::SET_POSITION_TARGET_LOCAL_NED(
            SET_POSITION_TARGET_LOCAL_NED_DATA {
                time_boot_ms,
                x: 0.0,
                y: 0.0,
                z: 0.0,
                vx: forward,
                vy: 0.0,
                vz: 0.0,
                afx: 0.0,
                afy: 0.0,
                afz: 0.0,
                yaw: 0.0,
                yaw_rate: yaw_rate.to_radians(),
                type_mask: PositionTargetTypemask::from_bits_truncate(VELOCITY_AND_YAW_RATE),
                target_system: self.target_system,
                target_component: self.target_component,
                coordinate_frame: MavFrame::MAV_FRAME_BODY_OFFSET_NED,
            },
        ))
    }

    fn land(&mut self) -> Result<()> {
        self.set_copter_mode(COPTER_MODE_LAND)?;
        info!("Landing...");
        self.wait_for(|_, msg| Self::is_armed(msg).filter(|armed| !*armed))?;
        if let Err(e) = self.send_gcs_heartbeat() {
            warn!("Final heartbeat failed: {:#}", e);
        }
        Ok(())
    }
}
