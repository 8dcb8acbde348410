//! Dispatch configuration
//!
//! Launch geometry and host parallelism are fixed per [`Context`]. Defaults
//! can be overridden from the environment:
//!
//! | variable | field | default |
//! |---|---|---|
//! | `LATTICE_GPU_THREADS` | `threads_per_block` | 8 |
//! | `LATTICE_HOST_THREADS` | `host_threads` | rayon global pool |
//! | `LATTICE_SIMD_LANES` | `simd_lanes` | 1 |
//! | `LATTICE_STREAMING_STORES` | `streaming_stores` | true |
//!
//! [`Context`]: crate::dispatch::Context

use crate::error::{BackendError, Result};
use std::env;

/// Sites per accelerator block unless configured otherwise
pub const DEFAULT_THREADS_PER_BLOCK: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Sites packed into one accelerator block
    pub threads_per_block: u32,
    /// Size of a dedicated host pool; `None` uses the rayon global pool
    pub host_threads: Option<usize>,
    /// Lanes per site for lane-aware copies
    pub simd_lanes: u32,
    /// Use non-temporal stores for write-only expression output
    pub streaming_stores: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            threads_per_block: DEFAULT_THREADS_PER_BLOCK,
            host_threads: None,
            simd_lanes: 1,
            streaming_stores: true,
        }
    }
}

impl DispatchConfig {
    /// Defaults overridden by `LATTICE_*` variables. Unparsable values are
    /// ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(threads) = parse_var::<u32>("LATTICE_GPU_THREADS") {
            config.threads_per_block = threads;
        }
        if let Some(threads) = parse_var::<usize>("LATTICE_HOST_THREADS") {
            config.host_threads = Some(threads);
        }
        if let Some(lanes) = parse_var::<u32>("LATTICE_SIMD_LANES") {
            config.simd_lanes = lanes;
        }
        if let Ok(streaming) = env::var("LATTICE_STREAMING_STORES") {
            config.streaming_stores = !(streaming == "0"
                || streaming.eq_ignore_ascii_case("false")
                || streaming.eq_ignore_ascii_case("no"));
        }

        config
    }

    pub fn with_threads_per_block(mut self, threads: u32) -> Self {
        self.threads_per_block = threads;
        self
    }

    pub fn with_host_threads(mut self, threads: usize) -> Self {
        self.host_threads = Some(threads);
        self
    }

    pub fn with_simd_lanes(mut self, lanes: u32) -> Self {
        self.simd_lanes = lanes;
        self
    }

    pub fn with_streaming_stores(mut self, enabled: bool) -> Self {
        self.streaming_stores = enabled;
        self
    }

    /// Reject zero-sized geometry
    pub fn validate(&self) -> Result<()> {
        if self.threads_per_block == 0 {
            return Err(BackendError::invalid_launch("threads_per_block must be non-zero"));
        }
        if self.simd_lanes == 0 {
            return Err(BackendError::invalid_launch("simd_lanes must be non-zero"));
        }
        if self.host_threads == Some(0) {
            return Err(BackendError::invalid_launch("host_threads must be non-zero"));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable dispatch setting");
            None
        }
    }
}
