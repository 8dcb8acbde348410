//! Lattice containers with fused expression evaluation
//!
//! One body of element-wise arithmetic over a structured grid, written
//! once, runs unmodified on host threads, CUDA and OpenCL. This crate
//! provides:
//! - **Lattice**: a container bound to a topology, holding one value per site
//!   under a checkerboard parity tag
//! - **Views**: `Copy` handles kernels capture instead of the container
//! - **Expressions**: `a * b + c` builds a tree that is evaluated in one pass
//!   on assignment, with no temporaries
//!
//! Storage, regions and backends live in [`lattice_backends`].
//!
//! # Example
//!
//! ```rust
//! use lattice_core::{Context, DispatchConfig, FlatGrid, HostBackend, Lattice, Parity};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = Context::with_config(HostBackend::new(), DispatchConfig::default())?;
//! let grid = FlatGrid::shared(4);
//!
//! let mut a = Lattice::from_slice(&ctx, &grid, &[1.0f64, 2.0, 3.0, 4.0])?;
//! let mut b = Lattice::from_slice(&ctx, &grid, &[10.0f64, 20.0, 30.0, 40.0])?;
//! a.set_checkerboard(Parity::Even);
//! b.set_checkerboard(Parity::Even);
//!
//! let mut c = Lattice::<f64, _>::new(&ctx, &grid);
//! c.try_assign(&a * &b + 1.0f64)?;
//!
//! assert_eq!(c.checkerboard(), Parity::Even);
//! assert_eq!(c.to_vec(), vec![11.0, 41.0, 91.0, 161.0]);
//! # Ok(())
//! # }
//! ```

pub mod accelerator;
pub mod error;
pub mod expr;
pub mod lattice;
pub mod parity;
pub mod topology;
pub mod view;

pub use accelerator::LatticeAccelerator;
pub use error::{LatticeError, Result};
pub use expr::{
    map, mul_add, where_nonzero, zip3_with, zip_with, BinaryExpr, ExprMeta, ExprOperand, IntoOperand, Scalar,
    TrinaryExpr, UnaryExpr,
};
pub use lattice::Lattice;
pub use parity::Parity;
pub use topology::{FlatGrid, GridId, GridRef, Topology};
pub use view::{LatticeView, RegionExt};

pub use lattice_backends::{Backend, BackendKind, Context, DispatchConfig, Element, HostBackend, Region};

#[cfg(feature = "cuda")]
pub use lattice_backends::CudaBackend;

#[cfg(feature = "opencl")]
pub use lattice_backends::OpenClBackend;
