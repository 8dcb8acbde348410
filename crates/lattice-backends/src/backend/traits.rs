//! Backend trait: the compile-time seam between containers and device runtimes

use super::types::BackendKind;
use crate::error::Result;

/// A value that can live at a lattice site.
///
/// `Pod` lets staged backends move buffers as raw bytes and lets host
/// allocations start zeroed.
pub trait Element: bytemuck::Pod + Default + Send + Sync + 'static {}

impl<T> Element for T where T: bytemuck::Pod + Default + Send + Sync + 'static {}

/// Execution backend
///
/// A backend is selected at compile time: containers, accessors and views are
/// generic over `B: Backend`, so the per-site path never goes through a
/// vtable. Backends own their device memory as `DeviceBuffer` and move bytes
/// between it and the accessor's host mirror.
///
/// Backends whose memory is directly host-addressable set
/// `HOST_ADDRESSABLE`; for them host-access materialization is a no-op and
/// the device hooks are never called.
///
/// # Example
///
/// ```rust
/// use lattice_backends::{Backend, HostBackend};
///
/// let backend = HostBackend::new();
/// assert!(HostBackend::HOST_ADDRESSABLE);
/// assert_eq!(backend.name(), "host");
/// backend.synchronize().unwrap();
/// ```
pub trait Backend: Clone + Send + Sync + 'static {
    /// Backend-owned device allocation
    type DeviceBuffer: Send + Sync;

    /// Backend tag used in diagnostics
    const KIND: BackendKind;

    /// Whether kernels and host code address the same memory
    const HOST_ADDRESSABLE: bool;

    // ============================================================================================
    // Identification
    // ============================================================================================

    /// Short name for logs
    fn name(&self) -> &'static str {
        Self::KIND.name()
    }

    // ============================================================================================
    // Device Memory
    // ============================================================================================

    /// Allocate `bytes` zeroed bytes of device memory
    fn alloc_device(&self, bytes: usize) -> Result<Self::DeviceBuffer>;

    /// Copy `src` into the device buffer (H2D)
    fn upload(&self, dst: &mut Self::DeviceBuffer, src: &[u8]) -> Result<()>;

    /// Copy the device buffer into `dst` (D2H)
    fn download(&self, src: &Self::DeviceBuffer, dst: &mut [u8]) -> Result<()>;

    // ============================================================================================
    // Synchronization
    // ============================================================================================

    /// Wait for all submitted device work; runtime errors surface here
    fn synchronize(&self) -> Result<()>;
}
