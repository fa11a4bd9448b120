//! Progress reporting: a callback trait plus a throttling tracker.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`]. The
//! orchestrator reports fixed checkpoints (5 % initializing, 20 % converting,
//! 95 % finalizing, 100 % done) through a [`ProgressTracker`], which drops
//! updates arriving faster than the configured interval.
//!
//! Progress is advisory only. Nothing in the pipeline depends on a callback
//! having been delivered.
//!
//! # Example
//!
//! ```rust
//! use edgequake_any2md::{ConversionProgressCallback, ProgressDetail, ProgressTracker};
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! struct Recorder(Mutex<Vec<f64>>);
//!
//! impl ConversionProgressCallback for Recorder {
//!     fn on_progress(&self, percent: f64, _detail: Option<&ProgressDetail>) {
//!         self.0.lock().unwrap().push(percent);
//!     }
//! }
//!
//! let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
//! let tracker = ProgressTracker::new(Some(recorder.clone()), Duration::from_secs(60));
//! tracker.update(0.0, None);
//! tracker.update(50.0, None);
//! tracker.update(60.0, None); // throttled
//! tracker.update(100.0, None);
//! assert_eq!(*recorder.0.lock().unwrap(), vec![0.0, 50.0, 100.0]);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Optional detail attached to a progress update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressDetail {
    /// Short machine-friendly stage name, e.g. `"converting"`.
    pub status: String,
    /// Human-readable detail, e.g. the file being converted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressDetail {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Receives progress updates. Fire-and-forget; the return value is ignored.
///
/// Implementations must be `Send + Sync`: independent conversions may report
/// from different tasks at once.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called with a percentage in `0.0..=100.0`.
    fn on_progress(&self, percent: f64, detail: Option<&ProgressDetail>) {
        let _ = (percent, detail);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Sentinel for "nothing forwarded yet".
const NEVER: u64 = u64::MAX;

/// Throttles and rescales updates before forwarding them to a callback.
pub struct ProgressTracker {
    sink: Option<ProgressCallback>,
    interval: Duration,
    started: Instant,
    /// Milliseconds since `started` of the last forwarded update.
    last_emit_ms: AtomicU64,
}

impl ProgressTracker {
    pub fn new(sink: Option<ProgressCallback>, interval: Duration) -> Self {
        Self {
            sink,
            interval,
            started: Instant::now(),
            last_emit_ms: AtomicU64::new(NEVER),
        }
    }

    /// A tracker that forwards nothing.
    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    /// Forward `percent` unless an update went out less than `interval` ago.
    /// 0 % and 100 % are never throttled.
    pub fn update(&self, percent: f64, detail: Option<&ProgressDetail>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let percent = percent.clamp(0.0, 100.0);
        let now_ms = self.started.elapsed().as_millis() as u64;
        let boundary = percent <= 0.0 || percent >= 100.0;

        if !boundary {
            let last = self.last_emit_ms.load(Ordering::Acquire);
            if last != NEVER && now_ms.saturating_sub(last) < self.interval.as_millis() as u64 {
                return;
            }
        }

        self.last_emit_ms.store(now_ms, Ordering::Release);
        sink.on_progress(percent, detail);
    }

    /// Map a sub-task's `0..=100` progress linearly into `start..=end`.
    pub fn update_scaled(
        &self,
        percent: f64,
        start: f64,
        end: f64,
        detail: Option<&ProgressDetail>,
    ) {
        let fraction = percent.clamp(0.0, 100.0) / 100.0;
        self.update(start + (end - start) * fraction, detail);
    }
}
