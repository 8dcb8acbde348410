//! Storage and dispatch layer for lattice containers
//!
//! This crate provides:
//! - **Accessor**: per-backend buffer handle with a host mirror and lazy
//!   host-access materialization
//! - **Registry**: region-scoped tracking of accessors touched by a dispatch
//! - **Dispatch**: `Context` and `Region`, unifying host-thread loops and
//!   accelerator launches
//! - **Backends**: host threads, CUDA (`cuda` feature), OpenCL (`opencl` feature)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        Lattice containers / expressions       │
//! └───────────────────────┬──────────────────────┘
//!                         │ views, tracked accessors
//!                         ▼
//! ┌──────────────────────────────────────────────┐
//! │   Context ── Region ── AccessorRegistry       │
//! │   for_host_threads / for_accelerator          │
//! └───────────────────────┬──────────────────────┘
//!                         │ Backend (compile time)
//!         ┌───────────────┼───────────────┐
//!         ▼               ▼               ▼
//!   ┌──────────┐    ┌──────────┐    ┌──────────┐
//!   │   Host   │    │   CUDA   │    │  OpenCL  │
//!   └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use lattice_backends::{Accessor, Context, DispatchConfig, HostBackend};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = Context::with_config(HostBackend::new(), DispatchConfig::default())?;
//!
//! let mut acc = Accessor::<f32, _>::new(HostBackend::new());
//! acc.bind_from(&[1.0, 2.0, 3.0, 4.0])?;
//! let acc = Arc::new(acc);
//! let data = acc.device_access();
//!
//! let region = ctx.region();
//! region.track(acc.clone())?;
//! region.for_accelerator(4, 1, |_, site| unsafe {
//!     data.write(site, data.read(site) * 2.0);
//! })?;
//!
//! assert_eq!(unsafe { data.read(3) }, 8.0);
//! # Ok(())
//! # }
//! ```

pub mod accessor;
pub mod backend;
pub mod backends;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use accessor::{fence_streaming_stores, Accessor, HostAccess, HostBuffer, SitePtr, HOST_ALIGNMENT};
pub use backend::{AccessorId, Backend, BackendKind, BlockDim, Element, LaunchConfig, RegionId};
pub use backends::HostBackend;
pub use config::{DispatchConfig, DEFAULT_THREADS_PER_BLOCK};
pub use dispatch::{Context, Region};
pub use error::{BackendError, Result};
pub use registry::AccessorRegistry;

#[cfg(feature = "cuda")]
pub use backends::CudaBackend;

#[cfg(feature = "opencl")]
pub use backends::{OpenClBackend, OpenClBuffer};
