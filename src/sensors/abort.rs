// src/sensors/abort.rs

use anyhow::{Context, Result};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Polled, non-blocking manual abort check.
pub trait AbortSource {
    fn abort_requested(&mut self) -> bool;
}

/// Latching abort flag shared between whoever detects the key and the pilot.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    raised: Arc<AtomicBool>,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

impl AbortSource for AbortFlag {
    fn abort_requested(&mut self) -> bool {
        self.is_raised()
    }
}

/// Watch stdin on a background thread and raise `flag` when a line
/// consisting of `key` is entered.
pub fn spawn_key_listener(key: char, flag: AbortFlag) -> Result<()> {
    thread::Builder::new()
        .name("abort-key".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) if is_abort_key(&line, key) => {
                        warn!("Manual interruption requested ('{}')", key);
                        flag.raise();
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("stdin closed: {}", e);
                        return;
                    }
                }
            }
        })
        .context("Failed to spawn abort key listener")?;
    Ok(())
}

fn is_abort_key(line: &str, key: char) -> bool {
    let mut chars = line.trim().chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.eq_ignore_ascii_case(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_latches_across_clones() {
        let flag = AbortFlag::new();
        let mut polled = flag.clone();
        assert!(!polled.abort_requested());
        flag.raise();
        assert!(polled.abort_requested());
        assert!(polled.abort_requested());
    }

    #[test]
    fn test_abort_key_matching() {
        assert!(is_abort_key("q", 'q'));
        assert!(is_abort_key(" Q \n", 'q'));
        assert!(!is_abort_key("quit", 'q'));
        assert!(!is_abort_key("", 'q'));
    }
}
