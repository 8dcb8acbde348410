//! Device-safe container views
//!
//! A [`LatticeView`] is what kernel bodies capture: the raw data handle, a
//! copy of the container's accelerator state and a back-reference used only
//! on host paths. It is `Copy`, borrows the container, and must not be used
//! after the dispatch of the region it was created for has returned.
//!
//! Views obtained through [`Lattice::view`] or [`RegionExt::view`] have their
//! accessor registered with the region before any indexing happens.

use crate::accelerator::LatticeAccelerator;
use crate::error::Result;
use crate::lattice::Lattice;
use crate::parity::Parity;
use lattice_backends::{Backend, Element, Region, SitePtr};
use std::fmt;

pub struct LatticeView<'a, T: Element, B: Backend> {
    data: SitePtr<T>,
    state: LatticeAccelerator<T>,
    owner: &'a Lattice<T, B>,
}

impl<T: Element, B: Backend> Clone for LatticeView<'_, T, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Element, B: Backend> Copy for LatticeView<'_, T, B> {}

impl<'a, T: Element, B: Backend> LatticeView<'a, T, B> {
    pub(crate) fn new(owner: &'a Lattice<T, B>) -> Self {
        let state = owner.accelerator();
        Self {
            data: state.odata.unwrap_or_else(SitePtr::empty),
            state,
            owner,
        }
    }

    // ============================================================================================
    // Geometry
    // ============================================================================================

    pub fn size(&self) -> usize {
        self.state.osites
    }

    pub fn osites(&self) -> usize {
        self.state.osites
    }

    pub fn checkerboard(&self) -> Parity {
        self.state.checkerboard
    }

    pub fn begin(&self) -> usize {
        0
    }

    pub fn end(&self) -> usize {
        self.state.osites
    }

    pub fn accelerator(&self) -> LatticeAccelerator<T> {
        self.state
    }

    /// Owning container, for host-side queries
    pub fn owner(&self) -> &'a Lattice<T, B> {
        self.owner
    }

    // ============================================================================================
    // Device Path
    // ============================================================================================

    /// Read `site`.
    ///
    /// # Panics
    ///
    /// Panics if `site >= size()`.
    #[inline]
    pub fn get(&self, site: usize) -> T {
        // SAFETY: the borrow of `owner` keeps the buffer alive; the
        // dispatch contract forbids concurrent writes to a site being read.
        unsafe { self.data.read(site) }
    }

    /// Write `site`.
    ///
    /// # Safety
    ///
    /// No other work item may access `site` concurrently.
    #[inline]
    pub unsafe fn set(&self, site: usize, value: T) {
        self.data.write(site, value);
    }

    /// Write `site` with a non-temporal store.
    ///
    /// # Safety
    ///
    /// Same contract as [`LatticeView::set`].
    #[inline]
    pub unsafe fn stream(&self, site: usize, value: T) {
        self.data.stream(site, value);
    }

    /// Lane-aware read; every lane of a site sees the whole element
    #[inline]
    pub fn coalesced_read(&self, _lane: usize, site: usize) -> T {
        self.get(site)
    }

    /// Lane-aware write: lane 0 commits, other lanes are no-ops, so results
    /// do not depend on the lane count.
    ///
    /// # Safety
    ///
    /// Same contract as [`LatticeView::set`].
    #[inline]
    pub unsafe fn coalesced_write(&self, lane: usize, site: usize, value: T) {
        if lane == 0 {
            self.data.write(site, value);
        }
    }

    // ============================================================================================
    // Host Path
    // ============================================================================================

    fn host_data(&self) -> SitePtr<T> {
        match self.owner.accessor().host_handle() {
            Ok(ptr) => ptr,
            Err(err) => panic!("host access outside a materializing region: {err}"),
        }
    }

    /// Read `site` through the host handle.
    ///
    /// # Panics
    ///
    /// Panics if the accessor is not materialized by an open region.
    pub fn host_get(&self, site: usize) -> T {
        // SAFETY: as for `get`; the host handle is open.
        unsafe { self.host_data().read(site) }
    }

    /// Write `site` through the host handle.
    ///
    /// # Safety
    ///
    /// Same contract as [`LatticeView::set`].
    pub unsafe fn host_set(&self, site: usize, value: T) {
        self.host_data().write(site, value);
    }
}

impl<T: Element, B: Backend> fmt::Debug for LatticeView<'_, T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatticeView")
            .field("state", &self.state)
            .field("accessor", &self.owner.accessor().id())
            .finish()
    }
}

/// View creation on a region
pub trait RegionExt<B: Backend> {
    /// Register `lattice` with this region and return its view.
    ///
    /// # Panics
    ///
    /// Panics if the region's frame is gone, which cannot happen while the
    /// region is alive.
    fn view<'a, T: Element>(&self, lattice: &'a Lattice<T, B>) -> LatticeView<'a, T, B>;

    fn try_view<'a, T: Element>(&self, lattice: &'a Lattice<T, B>) -> Result<LatticeView<'a, T, B>>;
}

impl<B: Backend> RegionExt<B> for Region<'_, B> {
    fn view<'a, T: Element>(&self, lattice: &'a Lattice<T, B>) -> LatticeView<'a, T, B> {
        lattice.view(self)
    }

    fn try_view<'a, T: Element>(&self, lattice: &'a Lattice<T, B>) -> Result<LatticeView<'a, T, B>> {
        lattice.try_view(self)
    }
}
