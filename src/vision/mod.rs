// src/vision/mod.rs
//
// Camera, person detection and the image debug overlay. The OpenCV / ONNX
// parts only build with `--features vision`.

#[cfg(feature = "vision")]
mod detector;
#[cfg(feature = "vision")]
mod sink;
#[cfg_attr(not(feature = "vision"), allow(dead_code))]
mod resample;
#[cfg_attr(not(feature = "vision"), allow(dead_code))]
pub mod yolo;

#[cfg(feature = "vision")]
pub use detector::YoloPersonDetector;
#[cfg(feature = "vision")]
pub use sink::OpencvSink;
