//! Device-visible container state
//!
//! [`LatticeAccelerator`] is the part of a container that may be copied into
//! a kernel: grid identity, parity, size and the raw data handle. It holds
//! nothing that lives only on the host.

use crate::error::{LatticeError, Result};
use crate::parity::Parity;
use crate::topology::GridId;
use lattice_backends::{Element, SitePtr};
use std::fmt;

pub struct LatticeAccelerator<T> {
    pub(crate) grid: Option<GridId>,
    pub(crate) checkerboard: Parity,
    pub(crate) osites: usize,
    pub(crate) odata: Option<SitePtr<T>>,
}

impl<T> Clone for LatticeAccelerator<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for LatticeAccelerator<T> {}

impl<T: Element> LatticeAccelerator<T> {
    /// State of a container with no buffer on `grid`
    pub(crate) fn unbound(grid: GridId) -> Self {
        Self {
            grid: Some(grid),
            checkerboard: Parity::Full,
            osites: 0,
            odata: None,
        }
    }

    pub fn grid(&self) -> Option<GridId> {
        self.grid
    }

    pub fn checkerboard(&self) -> Parity {
        self.checkerboard
    }

    pub fn osites(&self) -> usize {
        self.osites
    }

    /// Raw data handle; `None` while unbound
    pub fn odata(&self) -> Option<SitePtr<T>> {
        self.odata
    }

    /// Unify `grid` with this state's topology.
    ///
    /// An unset `grid` adopts ours; a set one must be the same topology by
    /// identity.
    pub fn conformable(&self, grid: &mut Option<GridId>) -> Result<()> {
        let mine = self.grid.ok_or(LatticeError::NoTopology)?;
        match *grid {
            None => {
                *grid = Some(mine);
                Ok(())
            }
            Some(theirs) if theirs == mine => Ok(()),
            Some(theirs) => Err(LatticeError::conformability(format!(
                "operand on {mine} does not conform to {theirs}"
            ))),
        }
    }
}

impl<T> fmt::Debug for LatticeAccelerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatticeAccelerator")
            .field("grid", &self.grid)
            .field("checkerboard", &self.checkerboard)
            .field("osites", &self.osites)
            .field("bound", &self.odata.is_some())
            .finish()
    }
}
