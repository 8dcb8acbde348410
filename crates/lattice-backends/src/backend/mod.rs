//! Backend trait and shared types

mod traits;
mod types;

pub use traits::{Backend, Element};
pub use types::{AccessorId, BackendKind, BlockDim, LaunchConfig, RegionId};
