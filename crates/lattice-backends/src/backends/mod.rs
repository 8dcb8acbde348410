//! Backend implementations for the supported execution targets
//!
//! - `host` - multi-core host threads (always available)
//! - `cuda` - NVIDIA GPUs (feature `cuda`)
//! - `opencl` - OpenCL devices (feature `opencl`)

pub mod host;

#[cfg(feature = "cuda")]
pub mod cuda;

#[cfg(feature = "opencl")]
pub mod opencl;

pub use host::HostBackend;

#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;

#[cfg(feature = "opencl")]
pub use opencl::{OpenClBackend, OpenClBuffer};
