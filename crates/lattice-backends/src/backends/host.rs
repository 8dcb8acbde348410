//! Host backend: memory is ordinary host memory, kernels run on rayon
//! workers, and there is nothing to stage or synchronize.

use crate::backend::{Backend, BackendKind};
use crate::error::Result;

/// Multi-core host execution
#[derive(Debug, Clone, Copy, Default)]
pub struct HostBackend;

impl HostBackend {
    pub const fn new() -> Self {
        HostBackend
    }
}

impl Backend for HostBackend {
    type DeviceBuffer = ();

    const KIND: BackendKind = BackendKind::Host;
    const HOST_ADDRESSABLE: bool = true;

    fn alloc_device(&self, _bytes: usize) -> Result<()> {
        Ok(())
    }

    fn upload(&self, _dst: &mut (), _src: &[u8]) -> Result<()> {
        Ok(())
    }

    fn download(&self, _src: &(), _dst: &mut [u8]) -> Result<()> {
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }
}
