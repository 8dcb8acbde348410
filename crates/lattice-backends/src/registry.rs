//! Region-scoped accessor bookkeeping
//!
//! Every dispatch region pushes a frame. Views register their accessor in
//! the frame of the region they were created for; the dispatch primitive
//! opens host access for the whole frame before running the body and closes
//! it afterwards. Frames form a stack, so a region opened while another is
//! live (a nested dispatch) gets its own set. An accessor tracked by both
//! stays materialized until the outer frame releases it, because host opens
//! are reference counted on the accessor.

use crate::accessor::HostAccess;
use crate::backend::{AccessorId, RegionId};
use crate::error::{BackendError, Result};
use lattice_tracing::performance::record_region_drain;
use parking_lot::Mutex;
use std::sync::Arc;

struct Entry {
    accessor: Arc<dyn HostAccess>,
    opened: bool,
}

struct Frame {
    region: RegionId,
    entries: Vec<Entry>,
}

impl Frame {
    fn contains(&self, id: AccessorId) -> bool {
        self.entries.iter().any(|e| e.accessor.accessor_id() == id)
    }
}

/// Stack of per-region accessor sets
#[derive(Default)]
pub struct AccessorRegistry {
    frames: Mutex<Vec<Frame>>,
}

impl AccessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a frame for a new region
    pub fn open(&self) -> RegionId {
        let region = RegionId::next();
        let mut frames = self.frames.lock();
        frames.push(Frame {
            region,
            entries: Vec::new(),
        });
        tracing::trace!(%region, depth = frames.len(), "region_open");
        region
    }

    /// Add `accessor` to `region`'s set.
    ///
    /// Returns `false` if the same accessor (by identity) is already tracked
    /// in that region.
    pub fn track(&self, region: RegionId, accessor: Arc<dyn HostAccess>) -> Result<bool> {
        let mut frames = self.frames.lock();
        let frame = Self::frame_mut(&mut frames, region)?;
        if frame.contains(accessor.accessor_id()) {
            return Ok(false);
        }
        frame.entries.push(Entry {
            accessor,
            opened: false,
        });
        Ok(true)
    }

    /// Open host access on every entry of `region` not opened yet.
    ///
    /// Entries opened before a failure stay marked, so [`release_all`]
    /// closes exactly what was opened.
    ///
    /// [`release_all`]: AccessorRegistry::release_all
    pub fn materialize_all(&self, region: RegionId) -> Result<()> {
        let mut frames = self.frames.lock();
        let frame = Self::frame_mut(&mut frames, region)?;
        for entry in frame.entries.iter_mut().filter(|e| !e.opened) {
            entry.accessor.ensure_host_access()?;
            entry.opened = true;
        }
        Ok(())
    }

    /// Close host access on every opened entry of `region`, then clear it.
    ///
    /// All entries are released even if one fails; the first error is
    /// returned.
    pub fn release_all(&self, region: RegionId) -> Result<()> {
        let entries = {
            let mut frames = self.frames.lock();
            std::mem::take(&mut Self::frame_mut(&mut frames, region)?.entries)
        };

        let count = entries.len();
        let mut first_error = None;
        for entry in entries.into_iter().filter(|e| e.opened) {
            if let Err(err) = entry.accessor.release_host_access() {
                tracing::error!(
                    accessor = %entry.accessor.accessor_id(),
                    error = %err,
                    "release_host_access failed"
                );
                first_error.get_or_insert(err);
            }
        }

        record_region_drain(region.id(), count, self.depth());
        first_error.map_or(Ok(()), Err)
    }

    /// Pop `region`'s frame. Remaining entries are released first.
    pub fn close(&self, region: RegionId) -> Result<()> {
        let released = self.release_all(region);
        let mut frames = self.frames.lock();
        if let Some(pos) = frames.iter().rposition(|f| f.region == region) {
            if pos + 1 != frames.len() {
                tracing::warn!(%region, depth = frames.len(), "region closed out of stack order");
            }
            frames.remove(pos);
        }
        released
    }

    /// Number of open regions
    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    /// Entries currently tracked in `region`
    pub fn tracked(&self, region: RegionId) -> usize {
        self.frames
            .lock()
            .iter()
            .find(|f| f.region == region)
            .map_or(0, |f| f.entries.len())
    }

    /// No open region and nothing tracked
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    fn frame_mut(frames: &mut [Frame], region: RegionId) -> Result<&mut Frame> {
        frames
            .iter_mut()
            .rev()
            .find(|f| f.region == region)
            .ok_or_else(|| BackendError::Other(format!("{region} is not open")))
    }
}

impl std::fmt::Debug for AccessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let frames = self.frames.lock();
        f.debug_struct("AccessorRegistry")
            .field("depth", &frames.len())
            .field("tracked", &frames.iter().map(|fr| fr.entries.len()).sum::<usize>())
            .finish()
    }
}
