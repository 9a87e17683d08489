// src/vision/detector.rs

use super::yolo::{self, INPUT_SIZE};
use crate::config::CameraConfig;
use crate::sensors::Detector;
use crate::types::{Frame, FrameResult};
use anyhow::{bail, Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use std::time::Instant;
use tracing::{debug, info};

/// Camera + YOLOv8 person detector.
pub struct YoloPersonDetector {
    config: CameraConfig,
    session: Session,
    camera: Option<VideoCapture>,
    width: usize,
    height: usize,
    started: Instant,
    last_frame: Option<Instant>,
}

impl YoloPersonDetector {
    pub fn new(config: &CameraConfig) -> Result<Self> {
        info!("Loading YOLO model: {}", config.model_path);

        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("Failed to load model {}", config.model_path))?;

        info!("✓ YOLO person detector ready");
        Ok(Self {
            config: config.clone(),
            session,
            camera: None,
            width: config.width,
            height: config.height,
            started: Instant::now(),
            last_frame: None,
        })
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1, 3, INPUT_SIZE, INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }

    fn capture(&mut self) -> Result<Frame> {
        let Some(camera) = self.camera.as_mut() else {
            bail!("Camera is not open");
        };

        let mut mat = Mat::default();
        if !camera.read(&mut mat)? || mat.empty() {
            bail!("Camera returned no frame");
        }

        let width = mat.cols() as usize;
        let height = mat.rows() as usize;
        let data = mat.data_bytes()?.to_vec();
        Ok(Frame {
            data,
            width,
            height,
            timestamp_ms: self.started.elapsed().as_secs_f64() * 1000.0,
        })
    }
}

impl Detector for YoloPersonDetector {
    fn initialize(&mut self) -> Result<()> {
        let index = self.config.index;
        let mut camera = VideoCapture::new(index, videoio::CAP_ANY)
            .with_context(|| format!("Failed to open camera {}", index))?;
        if !camera.is_opened()? {
            bail!("Camera {} did not open", index);
        }
        camera.set(videoio::CAP_PROP_FRAME_WIDTH, self.config.width as f64)?;
        camera.set(videoio::CAP_PROP_FRAME_HEIGHT, self.config.height as f64)?;

        // The driver may pick a different mode; trust what it reports.
        self.width = VideoCaptureTraitConst::get(&camera, videoio::CAP_PROP_FRAME_WIDTH)? as usize;
        self.height = VideoCaptureTraitConst::get(&camera, videoio::CAP_PROP_FRAME_HEIGHT)? as usize;
        info!("Camera {} open at {}x{}", index, self.width, self.height);

        self.camera = Some(camera);
        Ok(())
    }

    fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<FrameResult> {
        let frame = self.capture()?;

        let (input, letterbox) = yolo::preprocess(&frame.data, frame.width, frame.height);
        let output = self.infer(input)?;
        let detections = yolo::postprocess(
            &output,
            letterbox,
            (frame.width, frame.height),
            self.config.confidence_threshold,
        );

        let now = Instant::now();
        let fps = self
            .last_frame
            .map(|t| now.duration_since(t).as_secs_f32())
            .filter(|dt| *dt > 0.0)
            .map_or(0.0, |dt| 1.0 / dt);
        self.last_frame = Some(now);

        debug!("Detected {} people ({:.1} fps)", detections.len(), fps);
        Ok(FrameResult {
            detections,
            fps,
            frame,
        })
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut camera) = self.camera.take() {
            camera.release()?;
            info!("Camera released");
        }
        Ok(())
    }
}
