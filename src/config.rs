// src/config.rs

use anyhow::{ensure, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the process is flying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Real vehicle; debug frames are recorded to a video file.
    Flight,
    /// Software-in-the-loop autopilot; debug frames shown in a window.
    Test,
    /// Scripted sensors and a logging vehicle, no hardware at all.
    Sim,
}

/// Which control law the flight controller runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ControllerVariant {
    #[serde(rename = "PID")]
    #[value(name = "PID")]
    Pid,
    #[serde(rename = "P")]
    #[value(name = "P")]
    Proportional,
}

impl ControllerVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pid => "PID",
            Self::Proportional => "P",
        }
    }
}

/// How the tracked person is chosen when several are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStrategy {
    /// Detector's own priority order.
    #[default]
    First,
    HighestConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub lidar_port: String,
    pub lidar_baud: u32,
    /// MAVLink address used in flight mode.
    pub flight_endpoint: String,
    /// MAVLink address of the SITL autopilot used in test mode.
    pub test_endpoint: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            lidar_port: "/dev/ttyTHS1".to_string(),
            lidar_baud: 115_200,
            flight_endpoint: "serial:/dev/ttyACM0:57600".to_string(),
            test_endpoint: "udpin:127.0.0.1:14551".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: i32,
    pub width: usize,
    pub height: usize,
    pub model_path: String,
    pub confidence_threshold: f32,
    /// Frame rate the scripted detector reports in sim mode.
    pub sim_fps: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
            model_path: "models/yolov8n.onnx".to_string(),
            confidence_threshold: 0.5,
            sim_fps: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Forward axis: metres of distance error -> m/s.
    pub forward: PidGains,
    /// Yaw axis: pixels of horizontal offset -> deg/s.
    pub yaw: PidGains,
    pub max_forward_speed: f32,
    pub max_yaw_rate: f32,
    /// Clamp on the accumulated integral term, in output units.
    pub integral_limit: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            forward: PidGains {
                kp: 0.6,
                ki: 0.02,
                kd: 0.1,
            },
            yaw: PidGains {
                kp: 0.08,
                ki: 0.001,
                kd: 0.01,
            },
            max_forward_speed: 1.5,
            max_yaw_rate: 30.0,
            integral_limit: 0.5,
        }
    }
}

/// Process-wide settings, fixed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub max_follow_distance: f32,
    pub max_altitude: f32,
    pub search_timeout_secs: f64,
    pub forward_window: usize,
    pub yaw_window: usize,
    pub mode: OperatingMode,
    pub control: ControllerVariant,
    pub target_strategy: TargetStrategy,
    pub debug_path: PathBuf,
    pub abort_key: char,
    pub devices: DeviceConfig,
    pub camera: CameraConfig,
    pub controller: ControllerConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_follow_distance: 2.0,
            max_altitude: 2.5,
            search_timeout_secs: 40.0,
            forward_window: 5,
            yaw_window: 5,
            mode: OperatingMode::Flight,
            control: ControllerVariant::Pid,
            target_strategy: TargetStrategy::First,
            debug_path: PathBuf::from("debug/run1"),
            abort_key: 'q',
            devices: DeviceConfig::default(),
            camera: CameraConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

/// Command line surface.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Drive autonomous: follow a person with a drone")]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base path for debug video and flight log (extensions are added)
    #[arg(long, alias = "debug_path")]
    pub debug_path: Option<PathBuf>,

    /// Switches between flight recording, SITL visualisation and pure simulation
    #[arg(long, value_enum)]
    pub mode: Option<OperatingMode>,

    /// Use PID or P controller
    #[arg(long, value_enum)]
    pub control: Option<ControllerVariant>,

    /// Distance to keep from the target, metres
    #[arg(long)]
    pub max_follow_distance: Option<f32>,

    /// Takeoff altitude, metres
    #[arg(long)]
    pub max_altitude: Option<f32>,

    /// Seconds to search before landing
    #[arg(long)]
    pub search_timeout: Option<f64>,
}

impl SystemConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: SystemConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// File (if given) first, then command line overrides, then validation.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(path) = &cli.debug_path {
            self.debug_path = path.clone();
        }
        if let Some(mode) = cli.mode {
            self.mode = mode;
        }
        if let Some(control) = cli.control {
            self.control = control;
        }
        if let Some(distance) = cli.max_follow_distance {
            self.max_follow_distance = distance;
        }
        if let Some(altitude) = cli.max_altitude {
            self.max_altitude = altitude;
        }
        if let Some(timeout) = cli.search_timeout {
            self.search_timeout_secs = timeout;
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.max_follow_distance > 0.0,
            "max_follow_distance must be positive, got {}",
            self.max_follow_distance
        );
        ensure!(
            self.max_altitude > 0.0,
            "max_altitude must be positive, got {}",
            self.max_altitude
        );
        ensure!(
            self.search_timeout_secs.is_finite() && self.search_timeout_secs > 0.0,
            "search_timeout_secs must be positive, got {}",
            self.search_timeout_secs
        );
        ensure!(self.forward_window >= 1, "forward_window must be at least 1");
        ensure!(self.yaw_window >= 1, "yaw_window must be at least 1");
        ensure!(
            self.camera.width > 0 && self.camera.height > 0,
            "camera resolution must be non-zero"
        );

        let c = &self.controller;
        for (axis, gains) in [("forward", &c.forward), ("yaw", &c.yaw)] {
            ensure!(
                gains.kp.is_finite() && gains.ki.is_finite() && gains.kd.is_finite(),
                "{} gains must be finite",
                axis
            );
        }
        ensure!(
            c.max_forward_speed > 0.0 && c.max_yaw_rate > 0.0,
            "controller output limits must be positive"
        );
        ensure!(c.integral_limit >= 0.0, "integral_limit must not be negative");
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.search_timeout_secs)
    }

    /// MAVLink address for the current mode; sim mode has none.
    pub fn vehicle_endpoint(&self) -> Option<&str> {
        match self.mode {
            OperatingMode::Flight => Some(&self.devices.flight_endpoint),
            OperatingMode::Test => Some(&self.devices.test_endpoint),
            OperatingMode::Sim => None,
        }
    }
}
