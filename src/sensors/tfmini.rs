// src/sensors/tfmini.rs
//
// Benewake TFmini / TF-Luna serial output, 9-byte frames at 100 Hz:
//   0x59 0x59 dist_lo dist_hi strength_lo strength_hi temp_lo temp_hi checksum
// distance in centimetres, checksum = low byte of the sum of bytes 0..8.

use super::RangeFinder;
use crate::types::RangingSample;
use anyhow::{Context, Result};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read};
use std::time::Duration;
use tracing::{debug, info, warn};

const FRAME_HEADER: u8 = 0x59;
const FRAME_LEN: usize = 9;
/// Readings below this signal strength are unreliable.
const MIN_STRENGTH: u16 = 100;
const STRENGTH_SATURATED: u16 = 65_535;
const READ_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_READS_PER_SAMPLE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TfMiniFrame {
    pub distance_cm: u16,
    pub strength: u16,
}

impl TfMiniFrame {
    /// Validates header and checksum of exactly one frame.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FRAME_LEN || bytes[0] != FRAME_HEADER || bytes[1] != FRAME_HEADER {
            return None;
        }
        let checksum = bytes[..8].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        if checksum != bytes[8] {
            return None;
        }
        Some(Self {
            distance_cm: u16::from_le_bytes([bytes[2], bytes[3]]),
            strength: u16::from_le_bytes([bytes[4], bytes[5]]),
        })
    }

    pub fn sample(&self) -> RangingSample {
        if self.strength < MIN_STRENGTH || self.strength == STRENGTH_SATURATED {
            return RangingSample::NoReading;
        }
        RangingSample::from_meters(self.distance_cm as f32 / 100.0)
    }
}

/// Accumulates serial bytes and cuts out valid frames.
#[derive(Debug, Default)]
struct FrameSplitter {
    buffer: Vec<u8>,
}

impl FrameSplitter {
    fn push_bytes(&mut self, data: &[u8]) -> Vec<TfMiniFrame> {
        self.buffer.extend_from_slice(data);
        let mut frames = Vec::new();

        let mut start = 0;
        while start + FRAME_LEN <= self.buffer.len() {
            match TfMiniFrame::parse(&self.buffer[start..start + FRAME_LEN]) {
                Some(frame) => {
                    frames.push(frame);
                    start += FRAME_LEN;
                }
                None => start += 1,
            }
        }
        // Everything before `start` is either consumed or unframeable.
        self.buffer.drain(..start);
        frames
    }
}

pub struct TfMiniLidar {
    port: Box<dyn SerialPort>,
    splitter: FrameSplitter,
}

impl TfMiniLidar {
    pub fn connect(path: &str, baud: u32) -> Result<Self> {
        info!("Connecting lidar on {} @ {} baud", path, baud);
        let port = serialport::new(path, baud)
            .timeout(READ_TIMEOUT)
            .open()
            .with_context(|| format!("Failed to open lidar port {}", path))?;
        Ok(Self {
            port,
            splitter: FrameSplitter::default(),
        })
    }
}

impl RangeFinder for TfMiniLidar {
    fn read_distance(&mut self) -> Result<RangingSample> {
        // Drop what queued up while the detector was busy; we want a fresh frame.
        if let Err(e) = self.port.clear(ClearBuffer::Input) {
            debug!("Could not flush lidar input: {}", e);
        }
        self.splitter = FrameSplitter::default();

        let mut chunk = [0u8; 64];
        for _ in 0..MAX_READS_PER_SAMPLE {
            let n = match self.port.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    warn!("Lidar read timed out");
                    return Ok(RangingSample::NoReading);
                }
                Err(e) => return Err(e).context("Lidar read failed"),
            };

            if let Some(frame) = self.splitter.push_bytes(&chunk[..n]).pop() {
                debug!("Lidar {} cm, strength {}", frame.distance_cm, frame.strength);
                return Ok(frame.sample());
            }
        }

        warn!("No valid lidar frame in {} reads", MAX_READS_PER_SAMPLE);
        Ok(RangingSample::NoReading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(distance_cm: u16, strength: u16) -> [u8; FRAME_LEN] {
        let d = distance_cm.to_le_bytes();
        let s = strength.to_le_bytes();
        let mut frame = [FRAME_HEADER, FRAME_HEADER, d[0], d[1], s[0], s[1], 0x10, 0x09, 0];
        frame[8] = frame[..8].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        frame
    }

    #[test]
    fn test_parse_valid_frame() {
        let frame = TfMiniFrame::parse(&encode(300, 1200)).unwrap();
        assert_eq!(frame.distance_cm, 300);
        assert_eq!(frame.strength, 1200);
        assert_eq!(frame.sample(), RangingSample::Distance(3.0));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let mut bytes = encode(300, 1200);
        bytes[8] = bytes[8].wrapping_add(1);
        assert!(TfMiniFrame::parse(&bytes).is_none());
    }

    #[test]
    fn test_weak_or_zero_readings_are_no_reading() {
        assert_eq!(TfMiniFrame::parse(&encode(300, 20)).unwrap().sample(), RangingSample::NoReading);
        assert_eq!(
            TfMiniFrame::parse(&encode(300, STRENGTH_SATURATED)).unwrap().sample(),
            RangingSample::NoReading
        );
        assert_eq!(TfMiniFrame::parse(&encode(0, 1200)).unwrap().sample(), RangingSample::NoReading);
    }

    #[test]
    fn test_splitter_resyncs_after_garbage() {
        let mut splitter = FrameSplitter::default();
        let mut stream = vec![0x00, 0x59, 0x13];
        stream.extend_from_slice(&encode(150, 500));
        stream.extend_from_slice(&encode(160, 500)[..4]);

        let frames = splitter.push_bytes(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].distance_cm, 150);

        let frames = splitter.push_bytes(&encode(160, 500)[4..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].distance_cm, 160);
    }
}
