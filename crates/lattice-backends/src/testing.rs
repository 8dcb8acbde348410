//! Staged test double
//!
//! [`StagedBackend`] keeps "device" memory in a separate host allocation
//! and counts every transfer, so suites can check staging semantics (lazy
//! materialization, write-back, registry hygiene) without a GPU. It models
//! the OpenCL buffer discipline and reports itself as such.

use crate::backend::{Backend, BackendKind};
use crate::error::{BackendError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Stats {
    uploads: AtomicUsize,
    downloads: AtomicUsize,
    synchronizations: AtomicUsize,
    alloc_limit: AtomicUsize,
    fail_synchronize: AtomicBool,
}

/// Backend whose device memory is a private byte vector
#[derive(Debug, Clone)]
pub struct StagedBackend {
    stats: Arc<Stats>,
}

impl Default for StagedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StagedBackend {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Stats {
                uploads: AtomicUsize::new(0),
                downloads: AtomicUsize::new(0),
                synchronizations: AtomicUsize::new(0),
                alloc_limit: AtomicUsize::new(usize::MAX),
                fail_synchronize: AtomicBool::new(false),
            }),
        }
    }

    /// H2D transfers so far
    pub fn uploads(&self) -> usize {
        self.stats.uploads.load(Ordering::SeqCst)
    }

    /// D2H transfers so far
    pub fn downloads(&self) -> usize {
        self.stats.downloads.load(Ordering::SeqCst)
    }

    pub fn synchronizations(&self) -> usize {
        self.stats.synchronizations.load(Ordering::SeqCst)
    }

    /// Fail any single device allocation larger than `bytes`
    pub fn limit_allocations(&self, bytes: usize) {
        self.stats.alloc_limit.store(bytes, Ordering::SeqCst);
    }

    /// Make the next synchronizations report an execution fault
    pub fn fail_synchronize(&self, fail: bool) {
        self.stats.fail_synchronize.store(fail, Ordering::SeqCst);
    }
}

impl Backend for StagedBackend {
    type DeviceBuffer = Vec<u8>;

    const KIND: BackendKind = BackendKind::OpenCl;
    const HOST_ADDRESSABLE: bool = false;

    fn name(&self) -> &'static str {
        "staged"
    }

    fn alloc_device(&self, bytes: usize) -> Result<Vec<u8>> {
        if bytes > self.stats.alloc_limit.load(Ordering::SeqCst) {
            return Err(BackendError::allocation(bytes, "staged device memory exhausted"));
        }
        Ok(vec![0; bytes])
    }

    fn upload(&self, dst: &mut Vec<u8>, src: &[u8]) -> Result<()> {
        if dst.len() != src.len() {
            return Err(BackendError::SizeMismatch {
                expected: dst.len(),
                actual: src.len(),
            });
        }
        dst.copy_from_slice(src);
        self.stats.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn download(&self, src: &Vec<u8>, dst: &mut [u8]) -> Result<()> {
        if dst.len() != src.len() {
            return Err(BackendError::SizeMismatch {
                expected: src.len(),
                actual: dst.len(),
            });
        }
        dst.copy_from_slice(src);
        self.stats.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        self.stats.synchronizations.fetch_add(1, Ordering::SeqCst);
        if self.stats.fail_synchronize.load(Ordering::SeqCst) {
            return Err(BackendError::execution_fault("staged device reported a fault"));
        }
        Ok(())
    }
}
