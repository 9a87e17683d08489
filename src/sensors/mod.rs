// src/sensors/mod.rs

mod abort;
mod tfmini;

pub use abort::{spawn_key_listener, AbortFlag, AbortSource};
pub use tfmini::TfMiniLidar;

use crate::types::{FrameResult, RangingSample};
use anyhow::Result;

/// Produces one frame of prioritised detections per call.
pub trait Detector {
    /// Open the camera / load the model.
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// (width, height) in pixels of every frame this detector returns.
    fn image_size(&self) -> (usize, usize);

    /// Blocks for one frame and its inference.
    fn next_frame(&mut self) -> Result<FrameResult>;

    /// Release the camera.
    fn close(&mut self) -> Result<()>;
}

/// Forward-looking distance sensor aligned with the image centre.
pub trait RangeFinder {
    /// `NoReading` is a normal answer, not an error.
    fn read_distance(&mut self) -> Result<RangingSample>;
}
