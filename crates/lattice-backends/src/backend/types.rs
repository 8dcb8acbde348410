//! Handles, backend tags and launch geometry

use crate::error::{BackendError, Result};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ACCESSOR_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_REGION_ID: AtomicU64 = AtomicU64::new(1);

/// Which execution backend a type is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Multi-core host threads
    Host,
    /// NVIDIA GPU through the CUDA driver
    Cuda,
    /// OpenCL device
    OpenCl,
}

impl BackendKind {
    pub const fn name(self) -> &'static str {
        match self {
            BackendKind::Host => "host",
            BackendKind::Cuda => "cuda",
            BackendKind::OpenCl => "opencl",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Process-unique identity of an accessor
///
/// The registry deduplicates by this identity, never by buffer contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessorId(pub u64);

impl AccessorId {
    /// Allocate the next identity
    pub fn next() -> Self {
        AccessorId(NEXT_ACCESSOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acc{}", self.0)
    }
}

/// Process-unique identity of a dispatch region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub u64);

impl RegionId {
    pub fn next() -> Self {
        RegionId(NEXT_REGION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region{}", self.0)
    }
}

/// Block dimensions: `x` sites per block, `y` lanes per site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockDim {
    pub x: u32,
    pub y: u32,
}

impl BlockDim {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Work items per block
    pub const fn total_lanes(&self) -> u64 {
        self.x as u64 * self.y as u64
    }
}

impl Default for BlockDim {
    fn default() -> Self {
        Self { x: 1, y: 1 }
    }
}

impl fmt::Display for BlockDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Geometry of one accelerator launch over `sites × lanes`
///
/// Sites are packed `block.x` to a block; the last block may be partial, so
/// every work item is bounds-checked against `sites` and `block.y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Number of blocks
    pub blocks: u64,
    /// Sites per block and lanes per site
    pub block: BlockDim,
    /// Total sites covered by the launch
    pub sites: u64,
}

impl LaunchConfig {
    /// Geometry for `sites` sites with `lanes` lanes each
    pub fn for_sites(sites: u64, lanes: u32, threads_per_block: u32) -> Result<Self> {
        if threads_per_block == 0 {
            return Err(BackendError::invalid_launch("threads_per_block must be non-zero"));
        }
        if lanes == 0 {
            return Err(BackendError::invalid_launch("lane count must be non-zero"));
        }
        Ok(Self {
            blocks: sites.div_ceil(threads_per_block as u64),
            block: BlockDim::new(threads_per_block, lanes),
            sites,
        })
    }

    /// Work items launched, including the idle tail of the last block
    pub const fn total_work_items(&self) -> u64 {
        self.blocks * self.block.total_lanes()
    }

    /// Global site index of thread `tx` in `block`
    pub const fn site(&self, block: u64, tx: u32) -> u64 {
        tx as u64 + self.block.x as u64 * block
    }

    /// Sites owned by `block`, clipped to the launch
    pub fn block_sites(&self, block: u64) -> Range<u64> {
        let start = (block * self.block.x as u64).min(self.sites);
        let end = (start + self.block.x as u64).min(self.sites);
        start..end
    }
}

impl fmt::Display for LaunchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blocks={}, block={}, sites={}", self.blocks, self.block, self.sites)
    }
}
