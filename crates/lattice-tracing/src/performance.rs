//! Performance-focused tracing utilities
//!
//! Timing guards and standard events for launches, host/device transfers and
//! registry activity. The process-wide policy (enabled flag, threshold) is set
//! by [`crate::init_global_tracing`] or directly through [`configure`].
//!
//! ## Example
//!
//! ```rust
//! use lattice_tracing::performance::{record_transfer, PerformanceSpan};
//!
//! let span = PerformanceSpan::new("fill", Some(100));
//! // ... do work ...
//! drop(span); // logged only if the work took 100us or more
//!
//! record_transfer(4096, "D2H", 12);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::Level;

static ENABLED: AtomicBool = AtomicBool::new(true);

// u64::MAX encodes "no threshold"
static DEFAULT_THRESHOLD_US: AtomicU64 = AtomicU64::new(u64::MAX);

/// Set the process-wide performance-span policy.
pub fn configure(enabled: bool, threshold_us: Option<u64>) {
    ENABLED.store(enabled, Ordering::Relaxed);
    DEFAULT_THRESHOLD_US.store(threshold_us.unwrap_or(u64::MAX), Ordering::Relaxed);
}

/// Whether performance spans currently record anything.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

fn default_threshold() -> Option<u64> {
    match DEFAULT_THRESHOLD_US.load(Ordering::Relaxed) {
        u64::MAX => None,
        t => Some(t),
    }
}

/// RAII guard that measures its own lifetime and logs on drop when the
/// duration reaches the threshold.
///
/// A `None` threshold falls back to the process-wide default set through
/// [`configure`].
pub struct PerformanceSpan {
    name: String,
    threshold_us: Option<u64>,
    started: Instant,
    span: tracing::Span,
    enabled: bool,
}

impl PerformanceSpan {
    /// Create a debug-level performance span.
    pub fn new(span_name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, span_name, threshold_us)
    }

    /// Create a performance span at the given tracing level.
    pub fn with_level(level: Level, span_name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let name = span_name.into();
        let enabled = is_enabled();
        let span = if !enabled {
            tracing::Span::none()
        } else {
            match level {
                Level::TRACE => tracing::trace_span!("perf", name = %name),
                Level::DEBUG => tracing::debug_span!("perf", name = %name),
                Level::INFO => tracing::info_span!("perf", name = %name),
                Level::WARN => tracing::warn_span!("perf", name = %name),
                Level::ERROR => tracing::error_span!("perf", name = %name),
            }
        };

        Self {
            name,
            threshold_us: threshold_us.or_else(default_threshold),
            started: Instant::now(),
            span,
            enabled,
        }
    }

    /// Guard reporting inside `span`, typically one carrying launch fields.
    /// Uses the process-wide threshold.
    pub fn attached(span_name: impl Into<String>, span: tracing::Span) -> Self {
        let enabled = is_enabled();
        Self {
            name: span_name.into(),
            threshold_us: default_threshold(),
            started: Instant::now(),
            span: if enabled { span } else { tracing::Span::none() },
            enabled,
        }
    }

    /// Whether this guard will report on drop
    pub fn is_recording(&self) -> bool {
        self.enabled
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed_us(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed = self.elapsed_us();
        if self.threshold_us.map_or(true, |min| elapsed >= min) {
            self.span.in_scope(|| tracing::debug!(name = %self.name, elapsed_us = elapsed, "perf_span_closed"));
        }
    }
}

/// `amount` per second over `duration_us`; 0 for an unmeasurably short span
fn rate(amount: usize, duration_us: u64) -> f64 {
    match duration_us {
        0 => 0.0,
        us => amount as f64 * 1e6 / us as f64,
    }
}

/// Record a host/device transfer with bandwidth.
///
/// `direction` is `"H2D"` (mirror to device) or `"D2H"` (device to mirror).
pub fn record_transfer(bytes: usize, direction: &str, duration_us: u64) {
    tracing::debug!(
        event = "transfer",
        bytes,
        direction,
        duration_us,
        mib_per_sec = rate(bytes, duration_us) / (1024.0 * 1024.0),
        "mirror_transfer"
    );
}

/// Record one completed launch with its geometry and site throughput.
pub fn record_launch(form: &str, backend: &str, sites: usize, lanes: usize, duration_us: u64) {
    tracing::debug!(
        event = "launch",
        form,
        backend,
        sites,
        lanes,
        duration_us,
        msites_per_sec = rate(sites, duration_us) / 1e6,
        "dispatch_launch"
    );
}

/// Record a registry drain at region exit.
pub fn record_region_drain(region: u64, accessors: usize, depth: usize) {
    tracing::trace!(event = "region_drain", region, accessors, depth, "registry_drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::thread;
    use std::time::Duration;

    #[test]
    #[serial]
    fn span_uses_default_threshold_when_unset() {
        configure(true, Some(500));
        let span = PerformanceSpan::new("fill", None);
        assert_eq!(span.threshold_us, Some(500));
        configure(true, None);
        let span = PerformanceSpan::new("fill", None);
        assert_eq!(span.threshold_us, None);
    }

    #[test]
    #[serial]
    fn explicit_threshold_wins() {
        configure(true, Some(500));
        let span = PerformanceSpan::new("copy", Some(10));
        assert_eq!(span.threshold_us, Some(10));
        configure(true, None);
    }

    #[test]
    #[serial]
    fn disabled_spans_record_nothing() {
        configure(false, None);
        let span = PerformanceSpan::new("quiet", None);
        assert!(!span.enabled);
        assert!(!is_enabled());
        drop(span);
        configure(true, None);
    }

    #[test]
    fn elapsed_advances() {
        let span = PerformanceSpan::new("sleep", None);
        thread::sleep(Duration::from_millis(5));
        assert!(span.elapsed_us() >= 5_000);
        assert_eq!(span.name(), "sleep");
    }

    #[test]
    fn rate_handles_zero_duration() {
        assert_eq!(rate(1024, 0), 0.0);
        assert_eq!(rate(3, 1_000_000), 3.0);
    }

    #[test]
    fn record_helpers_do_not_panic() {
        record_transfer(4096, "H2D", 0);
        record_transfer(4096, "D2H", 250);
        record_launch("accelerator", "host", 1024, 2, 10);
        record_region_drain(3, 2, 0);
    }
}
