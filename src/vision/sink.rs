// src/vision/sink.rs

use crate::config::OperatingMode;
use crate::debug::{DebugSink, Overlay, TrackOverlay};
use crate::sensors::AbortFlag;
use crate::types::Frame;
use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat},
    highgui, imgproc,
    prelude::*,
    videoio::VideoWriter,
};
use std::path::{Path, PathBuf};
use tracing::info;

const WINDOW: &str = "out";
const RECORD_FPS: f64 = 25.0;
/// Pixels of bar per metre of lidar distance.
const LIDAR_BAR_SCALE: f32 = 200.0;

fn red() -> core::Scalar {
    core::Scalar::new(0.0, 0.0, 255.0, 0.0)
}

fn green() -> core::Scalar {
    core::Scalar::new(0.0, 255.0, 0.0, 0.0)
}

fn blue() -> core::Scalar {
    core::Scalar::new(255.0, 0.0, 0.0, 0.0)
}

fn point(p: (f32, f32)) -> core::Point {
    core::Point::new(p.0 as i32, p.1 as i32)
}

enum Output {
    Record {
        path: PathBuf,
        writer: Option<VideoWriter>,
    },
    Window { abort_key: char, abort: AbortFlag },
}

/// Draws overlays with OpenCV, then records (flight) or shows (test) them.
pub struct OpencvSink {
    output: Output,
}

impl OpencvSink {
    pub fn new(
        mode: OperatingMode,
        debug_path: &Path,
        abort_key: char,
        abort: AbortFlag,
    ) -> Result<Self> {
        let output = match mode {
            OperatingMode::Flight => {
                let path = debug_path.with_extension("avi");
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("Failed to create {}", dir.display()))?;
                }
                Output::Record { path, writer: None }
            }
            OperatingMode::Test | OperatingMode::Sim => Output::Window { abort_key, abort },
        };
        Ok(Self { output })
    }

    /// Sized from the first frame; the camera may not honour the requested mode.
    fn open_writer(path: &Path, image: &Mat) -> Result<VideoWriter> {
        let fourcc = VideoWriter::fourcc('M', 'J', 'P', 'G')?;
        let writer = VideoWriter::new(
            &path.to_string_lossy(),
            fourcc,
            RECORD_FPS,
            core::Size::new(image.cols(), image.rows()),
            true,
        )
        .with_context(|| format!("Failed to open debug video {}", path.display()))?;
        info!("Debug video: {}", path.display());
        Ok(writer)
    }

    fn draw_tracking(image: &mut Mat, track: &TrackOverlay) -> Result<()> {
        let (width, height) = (image.cols(), image.rows());

        // Lidar distance bar on the right edge.
        let bar_x = width - 50;
        let bar_bottom = height - 50;
        let bar_top = (height as f32 - track.lidar_distance() * LIDAR_BAR_SCALE) as i32;
        imgproc::line(
            image,
            core::Point::new(bar_x, bar_bottom),
            core::Point::new(bar_x, bar_top),
            green(),
            10,
            imgproc::LINE_8,
            0,
        )?;
        imgproc::put_text(
            image,
            &format!("distance: {:.2}", track.lidar_distance()),
            core::Point::new(width - 300, 200),
            imgproc::FONT_HERSHEY_SIMPLEX,
            1.0,
            red(),
            3,
            imgproc::LINE_AA,
            false,
        )?;

        let target = &track.update.target;
        imgproc::line(
            image,
            point(track.image_center),
            point(target.center),
            blue(),
            10,
            imgproc::LINE_8,
            0,
        )?;
        imgproc::rectangle_points(
            image,
            point((target.bbox.left, target.bbox.bottom)),
            point((target.bbox.right, target.bbox.top)),
            red(),
            10,
            imgproc::LINE_8,
            0,
        )?;
        imgproc::circle(image, point(track.image_center), 20, green(), -1, imgproc::LINE_8, 0)?;
        imgproc::circle(image, point(target.center), 20, red(), -1, imgproc::LINE_8, 0)?;

        for (row, text) in track.lines().iter().enumerate() {
            imgproc::put_text(
                image,
                text,
                core::Point::new(50, 50 + 50 * row as i32),
                imgproc::FONT_HERSHEY_SIMPLEX,
                1.0,
                red(),
                3,
                imgproc::LINE_AA,
                false,
            )?;
        }
        Ok(())
    }
}

impl DebugSink for OpencvSink {
    fn render(&mut self, frame: Frame, overlay: &Overlay) -> Result<()> {
        let mat = Mat::from_slice(&frame.data)?;
        let mat = mat.reshape(3, frame.height as i32)?;
        let mut image = mat.try_clone()?;

        match overlay {
            Overlay::Searching { remaining } => {
                imgproc::put_text(
                    &mut image,
                    &Overlay::searching_text(*remaining),
                    core::Point::new(50, 50),
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    1.0,
                    red(),
                    3,
                    imgproc::LINE_AA,
                    false,
                )?;
            }
            Overlay::Tracking(track) => Self::draw_tracking(&mut image, track)?,
        }

        match &mut self.output {
            Output::Record { path, writer } => {
                if writer.is_none() {
                    *writer = Some(Self::open_writer(path, &image)?);
                }
                if let Some(writer) = writer.as_mut() {
                    writer.write(&image)?;
                }
            }
            Output::Window { abort_key, abort } => {
                highgui::imshow(WINDOW, &image)?;
                let key = highgui::wait_key(1)?;
                if key >= 0 && (key as u8 as char).eq_ignore_ascii_case(abort_key) {
                    abort.raise();
                }
            }
        }
        Ok(())
    }
}

impl Drop for OpencvSink {
    fn drop(&mut self) {
        match &mut self.output {
            Output::Record { writer, .. } => {
                if let Some(writer) = writer.as_mut() {
                    let _ = writer.release();
                }
            }
            Output::Window { .. } => {
                let _ = highgui::destroy_all_windows();
            }
        }
    }
}
