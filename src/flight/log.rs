// src/flight/log.rs
//
// One JSON line per dispatched setpoint, next to the debug video.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct FlightLogRecord {
    pub timestamp: DateTime<Utc>,
    pub event: &'static str,
    pub mode: String,
    pub forward_error: Option<f32>,
    pub yaw_error: Option<f32>,
    pub forward_command: f32,
    pub yaw_command: f32,
}

pub struct FlightLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FlightLog {
    /// `debug/run1` becomes `debug/run1.jsonl`; parent directories are created.
    pub fn create(base_path: &Path) -> Result<Self> {
        let path = base_path.with_extension("jsonl");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let file = File::create(&path)
            .with_context(|| format!("Failed to create flight log {}", path.display()))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn record(&mut self, record: &FlightLogRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_one_line_per_record() {
        let dir = std::env::temp_dir().join(format!("follow_pilot_log_{}", std::process::id()));
        let base = dir.join("run1");
        let mut log = FlightLog::create(&base).unwrap();
        assert_eq!(log.path(), dir.join("run1.jsonl"));

        for i in 0..3 {
            log.record(&FlightLogRecord {
                timestamp: Utc::now(),
                event: "apply",
                mode: "track".to_string(),
                forward_error: Some(i as f32),
                yaw_error: None,
                forward_command: 0.5,
                yaw_command: -2.0,
            })
            .unwrap();
        }

        let contents = fs::read_to_string(dir.join("run1.jsonl")).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        let parsed: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(parsed["mode"], "track");
        assert_eq!(parsed["forward_error"], 2.0);
        assert!(parsed["yaw_error"].is_null());

        fs::remove_dir_all(&dir).ok();
    }
}
