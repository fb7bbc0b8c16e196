// src/gps/replay.rs
//! Replays a recorded fix log as a live source

use super::{
    data::RawFix,
    sampler::{runtime_handle, FixSink, GeoSampler},
};
use crate::error::{RecorderError, Result};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinHandle;

/// Location source replaying JSON-lines `RawFix` records.
///
/// Deliveries are spaced by the recorded timestamp gaps divided by `speedup`.
/// Fixes are not throttled: the log is assumed to be a platform recording.
/// Stopping keeps the position in the log, so the next `start` continues with
/// the first undelivered fix. `rewind` goes back to the beginning.
pub struct ReplaySampler {
    fixes: Arc<[RawFix]>,
    speedup: f64,
    cursor: Arc<AtomicUsize>,
    task: Option<JoinHandle<()>>,
}

impl ReplaySampler {
    pub fn new(fixes: Vec<RawFix>, speedup: f64) -> Self {
        Self {
            fixes: fixes.into(),
            speedup: if speedup > 0.0 { speedup } else { 1.0 },
            cursor: Arc::new(AtomicUsize::new(0)),
            task: None,
        }
    }

    /// Load a JSON-lines log. Blank lines and `#` comments are skipped.
    pub fn from_file(path: &Path, speedup: f64) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RecorderError::Other(format!("Failed to read replay file {}: {}", path.display(), e)))?;
        Ok(Self::new(parse_fix_log(&contents)?, speedup))
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    /// Number of fixes already delivered
    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Restart from the first fix on the next `start`
    pub fn rewind(&mut self) {
        self.stop();
        self.cursor.store(0, Ordering::Release);
    }
}

/// Parse one `RawFix` JSON object per line
pub fn parse_fix_log(contents: &str) -> Result<Vec<RawFix>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str::<RawFix>(line)
                .map_err(|e| RecorderError::Parse(format!("Line {}: {}", index + 1, e)))
        })
        .collect()
}

impl GeoSampler for ReplaySampler {
    fn name(&self) -> &str {
        "Replay"
    }

    fn start(&mut self, sink: FixSink) -> Result<()> {
        let runtime = runtime_handle("replay sampler")?;
        self.stop();

        let fixes = Arc::clone(&self.fixes);
        let cursor = Arc::clone(&self.cursor);
        let speedup = self.speedup;
        let first = cursor.load(Ordering::Acquire).min(fixes.len());
        if first > 0 {
            log::debug!("Replay continuing at fix {} of {}", first + 1, fixes.len());
        }

        self.task = Some(runtime.spawn(async move {
            // A resumed replay delivers its next fix immediately
            let mut previous: Option<i64> = None;
            for (index, fix) in fixes.iter().enumerate().skip(first) {
                if let Some(prev) = previous {
                    let gap_ms = (fix.timestamp - prev).max(0) as f64 / speedup;
                    tokio::time::sleep(Duration::from_millis(gap_ms as u64)).await;
                }
                previous = Some(fix.timestamp);
                if !sink.deliver(fix.clone()) {
                    return;
                }
                cursor.store(index + 1, Ordering::Release);
            }
            log::info!("Replay finished");
        }));

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }
}
