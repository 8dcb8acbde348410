//! CUDA backend for NVIDIA GPUs
//!
//! Lattice buffers live in device memory as `CudaSlice<u8>`. Kernel bodies
//! are Rust closures, so they run on host workers over the accessor's host
//! mirror with the launch geometry of the device; the registry downloads
//! the buffer before the region and writes it back afterwards.
//!
//! ```text
//! CudaBackend
//! ├── Device   - Arc<CudaDevice> (shared by clones)
//! └── Buffers  - CudaSlice<u8> owned by each Accessor
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use lattice_backends::{Context, CudaBackend};
//!
//! if CudaBackend::is_available() {
//!     let ctx = Context::new(CudaBackend::new()?);
//! }
//! ```

use crate::backend::{Backend, BackendKind};
use crate::error::{BackendError, Result};
use cudarc::driver::{CudaDevice, CudaSlice};
use std::fmt;
use std::sync::Arc;

/// CUDA execution on one device
#[derive(Clone)]
pub struct CudaBackend {
    device: Arc<CudaDevice>,
    ordinal: usize,
}

impl CudaBackend {
    /// Open device 0
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::DeviceUnavailable`] if no CUDA device is
    /// present or driver initialization fails.
    pub fn new() -> Result<Self> {
        Self::with_device(0)
    }

    /// Open the device with the given ordinal
    pub fn with_device(ordinal: usize) -> Result<Self> {
        // In cudarc 0.12, CudaDevice::new returns Arc<CudaDevice>
        let device = CudaDevice::new(ordinal)
            .map_err(|e| BackendError::DeviceUnavailable(format!("CUDA device {ordinal}: {e}")))?;
        tracing::debug!(ordinal, "cuda_device_open");
        Ok(Self { device, ordinal })
    }

    /// Check if CUDA is available on this system
    pub fn is_available() -> bool {
        CudaDevice::new(0).is_ok()
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

impl Backend for CudaBackend {
    type DeviceBuffer = CudaSlice<u8>;

    const KIND: BackendKind = BackendKind::Cuda;
    const HOST_ADDRESSABLE: bool = false;

    fn alloc_device(&self, bytes: usize) -> Result<CudaSlice<u8>> {
        self.device
            .alloc_zeros::<u8>(bytes)
            .map_err(|e| BackendError::allocation(bytes, format!("CUDA buffer allocation failed: {e}")))
    }

    fn upload(&self, dst: &mut CudaSlice<u8>, src: &[u8]) -> Result<()> {
        if src.len() != dst.len() {
            return Err(BackendError::SizeMismatch {
                expected: dst.len(),
                actual: src.len(),
            });
        }
        self.device
            .htod_sync_copy_into(src, dst)
            .map_err(|e| BackendError::Other(format!("CUDA host-to-device copy failed: {e}")))
    }

    fn download(&self, src: &CudaSlice<u8>, dst: &mut [u8]) -> Result<()> {
        if dst.len() != src.len() {
            return Err(BackendError::SizeMismatch {
                expected: src.len(),
                actual: dst.len(),
            });
        }
        self.device
            .dtoh_sync_copy_into(src, dst)
            .map_err(|e| BackendError::Other(format!("CUDA device-to-host copy failed: {e}")))
    }

    fn synchronize(&self) -> Result<()> {
        self.device
            .synchronize()
            .map_err(|e| BackendError::execution_fault(format!("CUDA synchronize: {e}")))
    }
}

impl fmt::Debug for CudaBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaBackend").field("ordinal", &self.ordinal).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn try_backend() -> Option<CudaBackend> {
        CudaBackend::new().ok()
    }

    #[test]
    fn test_round_trip_through_device() {
        let Some(backend) = try_backend() else {
            println!("Skipping: no CUDA device");
            return;
        };

        let mut buffer = backend.alloc_device(16).unwrap();
        let src: Vec<u8> = (0..16).collect();
        backend.upload(&mut buffer, &src).unwrap();
        backend.synchronize().unwrap();

        let mut dst = vec![0u8; 16];
        backend.download(&buffer, &mut dst).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let Some(backend) = try_backend() else {
            println!("Skipping: no CUDA device");
            return;
        };

        let mut buffer = backend.alloc_device(8).unwrap();
        assert!(matches!(
            backend.upload(&mut buffer, &[0u8; 4]),
            Err(BackendError::SizeMismatch { .. })
        ));
    }
}
