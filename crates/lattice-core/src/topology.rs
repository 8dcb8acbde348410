//! Topology handles
//!
//! Containers do not interpret their grid beyond its site count and the
//! parity of individual sites. Grids are shared through [`GridRef`] and
//! compared by reference identity: two structurally identical grids are
//! still different topologies.

use crate::parity::Parity;
use std::fmt;
use std::sync::Arc;

/// Grid geometry as seen by a lattice container
pub trait Topology: Send + Sync + 'static {
    /// Sites held per container
    fn osites(&self) -> usize;

    /// Checkerboard parity of `site`
    fn site_parity(&self, _site: usize) -> Parity {
        Parity::Full
    }

    /// Name for diagnostics
    fn name(&self) -> &str {
        "topology"
    }
}

/// Identity of a shared topology, valid while any [`GridRef`] to it lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridId(usize);

impl fmt::Display for GridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid@{:#x}", self.0)
    }
}

/// Shared, identity-compared topology handle
#[derive(Clone)]
pub struct GridRef(Arc<dyn Topology>);

impl GridRef {
    pub fn new(topology: impl Topology) -> Self {
        Self(Arc::new(topology))
    }

    pub fn from_arc(topology: Arc<dyn Topology>) -> Self {
        Self(topology)
    }

    pub fn id(&self) -> GridId {
        GridId(Arc::as_ptr(&self.0).cast::<()>() as usize)
    }

    pub fn osites(&self) -> usize {
        self.0.osites()
    }

    pub fn site_parity(&self, site: usize) -> Parity {
        self.0.site_parity(site)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn topology(&self) -> &dyn Topology {
        &*self.0
    }
}

impl PartialEq for GridRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for GridRef {}

impl fmt::Debug for GridRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridRef")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("osites", &self.osites())
            .finish()
    }
}

/// Flat range of sites; parity alternates with the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatGrid {
    osites: usize,
}

impl FlatGrid {
    pub const fn new(osites: usize) -> Self {
        Self { osites }
    }

    /// New shared handle with its own identity
    pub fn shared(osites: usize) -> GridRef {
        GridRef::new(Self::new(osites))
    }
}

impl Topology for FlatGrid {
    fn osites(&self) -> usize {
        self.osites
    }

    fn site_parity(&self, site: usize) -> Parity {
        Parity::of_index(site)
    }

    fn name(&self) -> &str {
        "flat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_not_structure() {
        let a = FlatGrid::shared(16);
        let b = FlatGrid::shared(16);
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone(), a);
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_flat_grid_parity() {
        let grid = FlatGrid::shared(4);
        assert_eq!(grid.osites(), 4);
        assert_eq!(grid.site_parity(0), Parity::Even);
        assert_eq!(grid.site_parity(1), Parity::Odd);
        assert_eq!(grid.name(), "flat");
    }

    #[test]
    fn test_default_parity_is_full() {
        struct Blob;
        impl Topology for Blob {
            fn osites(&self) -> usize {
                3
            }
        }
        let grid = GridRef::new(Blob);
        assert_eq!(grid.site_parity(1), Parity::Full);
        assert_eq!(grid.name(), "topology");
    }
}
