// src/main.rs

mod config;
mod debug;
mod dispatch;
mod flight;
mod fusion;
mod metrics;
mod pilot;
mod sensors;
mod sim;
mod smoother;
mod state_machine;
mod targeting;
mod types;
mod vision;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Cli, OperatingMode, SystemConfig};
use debug::{DebugSink, LogSink};
use flight::{MavlinkVehicle, PidFlightController};
use pilot::{Autopilot, Collaborators};
use sensors::{spawn_key_listener, AbortFlag, Detector, TfMiniLidar};
use sim::{LoggingVehicle, SteppingClock};
use state_machine::MonotonicClock;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("follow_pilot=info,ort=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = SystemConfig::from_cli(&cli)?;
    info!("🚁 Follow pilot starting");
    info!(
        "Mode: {:?} | controller: {} | follow distance {:.1} m | altitude {:.1} m | search timeout {:.0} s",
        config.mode,
        config.control.as_str(),
        config.max_follow_distance,
        config.max_altitude,
        config.search_timeout_secs
    );

    let abort = AbortFlag::new();
    spawn_key_listener(config.abort_key, abort.clone())?;
    info!("Press '{}' + Enter to land", config.abort_key);

    let parts = match config.mode {
        OperatingMode::Sim => sim_collaborators(&config, abort),
        OperatingMode::Flight | OperatingMode::Test => hardware_collaborators(&config, abort)?,
    };

    let pilot = Autopilot::new(config, parts)?;
    let summary = pilot.run()?;

    info!("✓ Landed");
    info!("Run summary: {}", serde_json::to_string(&summary)?);
    Ok(())
}

/// Scripted sensors and a logging vehicle; nothing leaves the process.
fn sim_collaborators(config: &SystemConfig, abort: AbortFlag) -> Collaborators {
    let image_size = (config.camera.width, config.camera.height);
    let clock = SteppingClock::new();
    let (detector, ranging) = sim::scripted_sensors(
        sim::demo_scenario(image_size),
        image_size,
        config.camera.sim_fps,
        &clock,
    );
    let controller = PidFlightController::new(LoggingVehicle::new(), config.controller.clone());

    Collaborators {
        selector: targeting::selector_for(config.target_strategy),
        detector: Box::new(detector),
        ranging: Box::new(ranging),
        controller: Box::new(controller),
        abort: Box::new(abort),
        sink: Box::new(LogSink::new()),
        clock: Box::new(clock),
    }
}

fn hardware_collaborators(config: &SystemConfig, abort: AbortFlag) -> Result<Collaborators> {
    let lidar = TfMiniLidar::connect(&config.devices.lidar_port, config.devices.lidar_baud)?;
    info!("✓ Lidar connected");

    let (detector, sink) = vision_collaborators(config, abort.clone())?;
    info!("✓ Detector ready");

    let endpoint = config
        .vehicle_endpoint()
        .context("No vehicle endpoint for this mode")?;
    let vehicle = MavlinkVehicle::connect(endpoint)?;
    let controller = PidFlightController::new(vehicle, config.controller.clone());
    info!("✓ Vehicle connected");

    Ok(Collaborators {
        selector: targeting::selector_for(config.target_strategy),
        detector,
        ranging: Box::new(lidar),
        controller: Box::new(controller),
        abort: Box::new(abort),
        sink,
        clock: Box::new(MonotonicClock::new()),
    })
}

#[cfg(feature = "vision")]
fn vision_collaborators(
    config: &SystemConfig,
    abort: AbortFlag,
) -> Result<(Box<dyn Detector>, Box<dyn DebugSink>)> {
    let detector = vision::YoloPersonDetector::new(&config.camera)?;
    let sink = vision::OpencvSink::new(config.mode, &config.debug_path, config.abort_key, abort)?;
    Ok((Box::new(detector), Box::new(sink)))
}

#[cfg(not(feature = "vision"))]
fn vision_collaborators(
    _config: &SystemConfig,
    _abort: AbortFlag,
) -> Result<(Box<dyn Detector>, Box<dyn DebugSink>)> {
    anyhow::bail!(
        "Camera and person detector need the `vision` feature; rebuild with --features vision or run --mode sim"
    )
}
