//! Lattice container
//!
//! A [`Lattice`] owns one buffer of `T` per site of its topology on backend
//! `B`. Arithmetic on containers builds expression trees (see
//! [`crate::expr`]); assigning a tree evaluates it in one accelerator pass.
//!
//! ```text
//!            new / from_slice / from_expr
//!   Unbound ─────────────────────────────▶ Bound(grid, osites)
//!      ▲                                       │
//!      └─────────── take / resize(0) ──────────┘
//! ```
//!
//! Every operation exists in two forms. `try_*` returns a [`LatticeError`];
//! the plain form treats the error as fatal, logs it and panics.

use crate::accelerator::LatticeAccelerator;
use crate::error::{LatticeError, Result};
use crate::expr::{BinaryAdd, BinaryExpr, BinaryMul, BinaryOp, BinarySub, ExprMeta, ExprOperand, IntoOperand};
use crate::parity::Parity;
use crate::topology::{GridId, GridRef};
use crate::view::LatticeView;
use lattice_backends::{Accessor, Backend, BackendError, Context, Element, Region, SitePtr};
use lattice_tracing::perf_event;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Sub, SubAssign};
use std::sync::{Arc, OnceLock};

pub struct Lattice<T: Element, B: Backend> {
    grid: GridRef,
    ctx: Arc<Context<B>>,
    accessor: Arc<Accessor<T, B>>,
    state: LatticeAccelerator<T>,
}

fn fatal<R>(operation: &'static str, result: Result<R>) -> R {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::error!(operation, error = %err, "fatal lattice error");
            panic!("{operation}: {err}");
        }
    }
}

/// Value a single-item host read left behind
fn take_host_read<R>(operation: &'static str, slot: OnceLock<R>) -> Result<R> {
    slot.into_inner()
        .ok_or_else(|| BackendError::execution_fault(format!("{operation}: host worker produced no value")).into())
}

impl<T: Element, B: Backend> Lattice<T, B> {
    // ============================================================================================
    // Construction
    // ============================================================================================

    /// Container over every site of `grid`, zero-initialized, parity Full.
    ///
    /// # Panics
    ///
    /// Panics if the buffer cannot be allocated; see [`Lattice::try_new`].
    pub fn new(ctx: &Arc<Context<B>>, grid: &GridRef) -> Self {
        fatal("Lattice::new", Self::try_new(ctx, grid))
    }

    #[tracing::instrument(skip_all, fields(grid = grid.name(), osites = grid.osites(), backend = B::KIND.name()))]
    pub fn try_new(ctx: &Arc<Context<B>>, grid: &GridRef) -> Result<Self> {
        let mut lattice = Self::unbound(ctx, grid);
        lattice.rebind(grid.osites())?;
        Ok(lattice)
    }

    /// Container on `grid` with no buffer yet
    pub fn unbound(ctx: &Arc<Context<B>>, grid: &GridRef) -> Self {
        Self {
            grid: grid.clone(),
            ctx: Arc::clone(ctx),
            accessor: Arc::new(Accessor::new(ctx.backend().clone())),
            state: LatticeAccelerator::unbound(grid.id()),
        }
    }

    /// Container holding a copy of `data`, which must cover every site
    pub fn from_slice(ctx: &Arc<Context<B>>, grid: &GridRef, data: &[T]) -> Result<Self> {
        if data.len() != grid.osites() {
            return Err(LatticeError::SizeMismatch {
                expected: grid.osites(),
                actual: data.len(),
            });
        }

        let mut accessor = Accessor::new(ctx.backend().clone());
        accessor.bind_from(data)?;

        let mut lattice = Self {
            grid: grid.clone(),
            ctx: Arc::clone(ctx),
            accessor: Arc::new(accessor),
            state: LatticeAccelerator::unbound(grid.id()),
        };
        lattice.refresh_state();
        Ok(lattice)
    }

    /// New container evaluated from `expr`, taking topology, context and
    /// parity from its leaves.
    pub fn from_expr<E>(expr: E) -> Self
    where
        E: IntoOperand<B>,
        E::Operand: ExprOperand<B, Value = T>,
    {
        fatal("Lattice::from_expr", Self::try_from_expr(expr))
    }

    pub fn try_from_expr<E>(expr: E) -> Result<Self>
    where
        E: IntoOperand<B>,
        E::Operand: ExprOperand<B, Value = T>,
    {
        let expr = expr.into_operand();
        let mut meta = ExprMeta::new();
        expr.conform(&mut meta)?;

        let (Some(grid), Some(ctx)) = (meta.topology.take(), meta.context.take()) else {
            return Err(LatticeError::NoTopology);
        };
        let parity = meta.parity.unwrap_or_default();
        if !parity.is_checkerboarded() {
            return Err(LatticeError::InvalidResultParity(parity));
        }

        let mut lattice = Self::try_new(&ctx, &grid)?;
        lattice.assign_operand(&expr)?;
        Ok(lattice)
    }

    fn rebind(&mut self, osites: usize) -> Result<()> {
        let accessor = Arc::get_mut(&mut self.accessor).ok_or(LatticeError::AccessorInUse)?;
        let bound = accessor.bind(osites);
        self.refresh_state();
        bound.map_err(Into::into)
    }

    fn refresh_state(&mut self) {
        self.state.grid = Some(self.grid.id());
        self.state.osites = self.accessor.len();
        self.state.odata = self.accessor.try_device_access().ok();
    }

    // ============================================================================================
    // Accessors
    // ============================================================================================

    pub fn grid(&self) -> &GridRef {
        &self.grid
    }

    pub fn grid_id(&self) -> GridId {
        self.grid.id()
    }

    pub fn checkerboard(&self) -> Parity {
        self.state.checkerboard
    }

    pub fn set_checkerboard(&mut self, parity: Parity) {
        self.state.checkerboard = parity;
    }

    /// Sites held; 0 while unbound
    pub fn osites(&self) -> usize {
        self.state.osites
    }

    pub fn is_bound(&self) -> bool {
        self.accessor.is_bound()
    }

    pub fn context(&self) -> &Arc<Context<B>> {
        &self.ctx
    }

    /// Copy of the device-visible state
    pub fn accelerator(&self) -> LatticeAccelerator<T> {
        self.state
    }

    pub fn accessor(&self) -> &Arc<Accessor<T, B>> {
        &self.accessor
    }

    // ============================================================================================
    // Views
    // ============================================================================================

    /// Register with `region` and return a view for its loop body
    pub fn view(&self, region: &Region<'_, B>) -> LatticeView<'_, T, B> {
        fatal("Lattice::view", self.try_view(region))
    }

    pub fn try_view(&self, region: &Region<'_, B>) -> Result<LatticeView<'_, T, B>> {
        if !std::ptr::eq(region.context(), Arc::as_ptr(&self.ctx)) {
            return Err(LatticeError::ContextMismatch);
        }
        region.track(self.accessor.clone())?;
        Ok(LatticeView::new(self))
    }

    fn check_conformable<U: Element>(&self, other: &Lattice<U, B>) -> Result<()> {
        if self.grid.id() != other.grid.id() {
            return Err(LatticeError::conformability(format!(
                "lattice on {} does not conform to {}",
                other.grid.id(),
                self.grid.id()
            )));
        }
        if !Arc::ptr_eq(&self.ctx, &other.ctx) {
            return Err(LatticeError::ContextMismatch);
        }
        Ok(())
    }

    // ============================================================================================
    // Expression Assignment
    // ============================================================================================

    /// Evaluate `expr` into this container.
    ///
    /// # Panics
    ///
    /// Panics on any error reported by [`Lattice::try_assign`].
    pub fn assign<E>(&mut self, expr: E)
    where
        E: IntoOperand<B>,
        E::Operand: ExprOperand<B, Value = T>,
    {
        fatal("Lattice::assign", self.try_assign(expr));
    }

    /// Evaluate `expr` into this container in one accelerator pass.
    ///
    /// The leaves must share this container's topology, context and one
    /// Even or Odd parity, which the container adopts. The container is
    /// reallocated to the leaves' site count when the two differ.
    #[tracing::instrument(skip_all, fields(osites = self.osites(), backend = B::KIND.name()))]
    pub fn try_assign<E>(&mut self, expr: E) -> Result<()>
    where
        E: IntoOperand<B>,
        E::Operand: ExprOperand<B, Value = T>,
    {
        self.assign_operand(&expr.into_operand())
    }

    fn assign_operand<X: ExprOperand<B, Value = T>>(&mut self, expr: &X) -> Result<()> {
        let (parity, leaf_sites) = self.conform_expr(expr)?;
        if !self.is_bound() || self.osites() != leaf_sites {
            self.rebind(leaf_sites)?;
        }
        self.dispatch_expr(expr, leaf_sites)?;
        self.state.checkerboard = parity;
        perf_event!("lattice_assign", sites = leaf_sites, parity = parity.name());
        Ok(())
    }

    fn conform_expr<X: ExprOperand<B>>(&self, expr: &X) -> Result<(Parity, usize)> {
        let mut meta = ExprMeta::new();
        expr.conform(&mut meta)?;

        let grid = meta.grid.ok_or(LatticeError::NoTopology)?;
        if grid != self.grid.id() {
            return Err(LatticeError::conformability(format!(
                "expression on {grid} assigned to lattice on {}",
                self.grid.id()
            )));
        }
        if let Some(ctx) = &meta.context {
            if !Arc::ptr_eq(ctx, &self.ctx) {
                return Err(LatticeError::ContextMismatch);
            }
        }

        let parity = meta.parity.unwrap_or_default();
        if !parity.is_checkerboarded() {
            return Err(LatticeError::InvalidResultParity(parity));
        }
        Ok((parity, meta.osites.unwrap_or(0)))
    }

    fn dispatch_expr<X: ExprOperand<B, Value = T>>(&self, expr: &X, leaf_sites: usize) -> Result<()> {
        let osites = self.osites();
        if leaf_sites != osites {
            return Err(LatticeError::SizeMismatch {
                expected: osites,
                actual: leaf_sites,
            });
        }

        let out = self.state.odata.unwrap_or_else(SitePtr::empty);
        let streaming = self.ctx.config().streaming_stores;

        let region = self.ctx.region();
        expr.track(&region)?;
        region.track(self.accessor.clone())?;
        region.for_accelerator(osites, 1, |_, site| {
            let value = expr.eval(site);
            // SAFETY: each work item owns exactly one output site, and reads
            // of that site by the expression happen before the store.
            unsafe {
                if streaming {
                    out.stream(site, value);
                } else {
                    out.write(site, value);
                }
            }
        })?;
        Ok(())
    }

    /// `self = self op rhs` through the expression path
    fn update_with<Op, Y>(&mut self, op: Op, rhs: Y) -> Result<()>
    where
        Op: BinaryOp<T, T, Output = T> + Send + Sync,
        Y: ExprOperand<B, Value = T>,
    {
        let parity = {
            let expr = BinaryExpr::<B, _, _, _>::new(op, LatticeView::new(self), rhs);
            let (parity, leaf_sites) = self.conform_expr(&expr)?;
            self.dispatch_expr(&expr, leaf_sites)?;
            parity
        };
        self.state.checkerboard = parity;
        Ok(())
    }

    // ============================================================================================
    // Fill and Copy
    // ============================================================================================

    /// Broadcast `value` to every site. The parity tag is left unchanged.
    pub fn fill(&mut self, value: T) {
        fatal("Lattice::fill", self.try_fill(value));
    }

    pub fn try_fill(&mut self, value: T) -> Result<()> {
        let out = self.state.odata.unwrap_or_else(SitePtr::empty);
        let region = self.ctx.region();
        region.track(self.accessor.clone())?;
        region.for_host_threads(self.osites(), |site| {
            // SAFETY: host chunks are disjoint.
            unsafe { out.write(site, value) };
        })?;
        Ok(())
    }

    /// Deep copy of `other`'s contents and parity.
    pub fn copy_from(&mut self, other: &Self) {
        fatal("Lattice::copy_from", self.try_copy_from(other));
    }

    /// Copies with `simd_lanes` lanes per site; lane 0 commits each site.
    pub fn try_copy_from(&mut self, other: &Self) -> Result<()> {
        self.check_conformable(other)?;
        if self.osites() != other.osites() || self.is_bound() != other.is_bound() {
            self.rebind(other.osites())?;
        }

        let lanes = self.ctx.config().simd_lanes;
        {
            let region = self.ctx.region();
            let src = other.try_view(&region)?;
            let dst = self.try_view(&region)?;
            region.for_accelerator(other.osites(), lanes, |lane, site| {
                // SAFETY: one committing lane per site.
                unsafe { dst.coalesced_write(lane, site, src.coalesced_read(lane, site)) };
            })?;
        }
        self.state.checkerboard = other.checkerboard();
        Ok(())
    }

    /// Copy `other` converting every site through `From`
    pub fn convert_from<U: Element>(&mut self, other: &Lattice<U, B>)
    where
        T: From<U>,
    {
        fatal("Lattice::convert_from", self.try_convert_from(other));
    }

    pub fn try_convert_from<U: Element>(&mut self, other: &Lattice<U, B>) -> Result<()>
    where
        T: From<U>,
    {
        self.check_conformable(other)?;
        if self.osites() != other.osites() || self.is_bound() != other.is_bound() {
            self.rebind(other.osites())?;
        }

        {
            let region = self.ctx.region();
            let src = other.try_view(&region)?;
            let dst = self.try_view(&region)?;
            region.for_accelerator(other.osites(), 1, |_, site| {
                // SAFETY: one work item per site.
                unsafe { dst.set(site, T::from(src.get(site))) };
            })?;
        }
        self.state.checkerboard = other.checkerboard();
        Ok(())
    }

    // ============================================================================================
    // Moves and Rebinding
    // ============================================================================================

    /// Move the buffer, size and parity out into a new container.
    ///
    /// `self` is left unbound with size 0 on the same topology and can be
    /// assigned again.
    pub fn take(&mut self) -> Self {
        let fresh = Arc::new(Accessor::new(self.ctx.backend().clone()));
        let accessor = std::mem::replace(&mut self.accessor, fresh);
        let state = std::mem::replace(&mut self.state, LatticeAccelerator::unbound(self.grid.id()));
        perf_event!("lattice_take", accessor = tracing::field::display(accessor.id()), sites = state.osites);

        Self {
            grid: self.grid.clone(),
            ctx: Arc::clone(&self.ctx),
            accessor,
            state,
        }
    }

    /// Release this container's buffer and take over `other`'s
    pub fn move_from(&mut self, other: &mut Self) {
        *self = other.take();
    }

    /// Exchange buffers and parity with a conformable container
    pub fn swap(&mut self, other: &mut Self) {
        fatal("Lattice::swap", self.try_swap(other));
    }

    pub fn try_swap(&mut self, other: &mut Self) -> Result<()> {
        self.check_conformable(other)?;
        std::mem::swap(&mut self.accessor, &mut other.accessor);
        std::mem::swap(&mut self.state, &mut other.state);
        Ok(())
    }

    /// Rebind to a different topology: new zeroed buffer, parity Full.
    /// A no-op when `grid` is already this container's topology.
    pub fn reset(&mut self, grid: &GridRef) {
        fatal("Lattice::reset", self.try_reset(grid));
    }

    pub fn try_reset(&mut self, grid: &GridRef) -> Result<()> {
        if grid.id() == self.grid.id() {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.grid, grid.clone());
        if let Err(err) = self.rebind(grid.osites()) {
            self.grid = previous;
            self.refresh_state();
            return Err(err);
        }
        self.state.checkerboard = Parity::Full;
        Ok(())
    }

    /// Reallocate to `osites` sites if the count changes; 0 unbinds
    pub fn resize(&mut self, osites: usize) {
        fatal("Lattice::resize", self.try_resize(osites));
    }

    pub fn try_resize(&mut self, osites: usize) -> Result<()> {
        if osites == self.osites() {
            return Ok(());
        }
        self.rebind(osites)
    }

    // ============================================================================================
    // Host Access
    // ============================================================================================

    fn check_site(&self, site: usize) -> Result<()> {
        let osites = self.osites();
        if site >= osites {
            return Err(LatticeError::SiteOutOfRange { site, osites });
        }
        let container = self.checkerboard();
        if container.is_checkerboarded() {
            let site_parity = self.grid.site_parity(site);
            if !container.admits(site_parity) {
                return Err(LatticeError::ParityViolation {
                    site,
                    site_parity,
                    container,
                });
            }
        }
        Ok(())
    }

    /// Read one site through the host path
    pub fn peek(&self, site: usize) -> T {
        fatal("Lattice::peek", self.try_peek(site))
    }

    pub fn try_peek(&self, site: usize) -> Result<T> {
        self.check_site(site)?;
        let region = self.ctx.region();
        let view = self.try_view(&region)?;
        let slot = OnceLock::new();
        region.for_host_threads(1, |_| {
            slot.get_or_init(|| view.host_get(site));
        })?;
        take_host_read("Lattice::peek", slot)
    }

    /// Write one site through the host path
    pub fn poke(&mut self, site: usize, value: T) {
        fatal("Lattice::poke", self.try_poke(site, value));
    }

    pub fn try_poke(&mut self, site: usize, value: T) -> Result<()> {
        self.check_site(site)?;
        let region = self.ctx.region();
        let view = self.try_view(&region)?;
        region.for_host_threads(1, |_| {
            // SAFETY: single work item.
            unsafe { view.host_set(site, value) };
        })?;
        Ok(())
    }

    /// Snapshot of every site
    pub fn to_vec(&self) -> Vec<T> {
        fatal("Lattice::to_vec", self.try_to_vec())
    }

    pub fn try_to_vec(&self) -> Result<Vec<T>> {
        let region = self.ctx.region();
        let view = self.try_view(&region)?;
        let slot = OnceLock::new();
        region.for_host_threads(1, |_| {
            slot.get_or_init(|| (0..view.size()).map(|site| view.host_get(site)).collect::<Vec<T>>());
        })?;
        take_host_read("Lattice::to_vec", slot)
    }

    /// Overwrite every site from `data`
    pub fn copy_from_slice(&mut self, data: &[T]) -> Result<()> {
        if data.len() != self.osites() {
            return Err(LatticeError::SizeMismatch {
                expected: self.osites(),
                actual: data.len(),
            });
        }
        let region = self.ctx.region();
        let view = self.try_view(&region)?;
        region.for_host_threads(data.len(), |site| {
            // SAFETY: host chunks are disjoint.
            unsafe { view.host_set(site, data[site]) };
        })?;
        Ok(())
    }
}

impl<T: Element, B: Backend> Clone for Lattice<T, B> {
    fn clone(&self) -> Self {
        let mut lattice = Self::unbound(&self.ctx, &self.grid);
        lattice.copy_from(self);
        lattice
    }
}

impl<T: Element, B: Backend> fmt::Debug for Lattice<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lattice")
            .field("grid", &self.grid)
            .field("backend", &B::KIND)
            .field("checkerboard", &self.state.checkerboard)
            .field("osites", &self.state.osites)
            .field("accessor", &self.accessor.id())
            .finish()
    }
}

// ================================================================================================
// Compound Assignment
// ================================================================================================

macro_rules! compound_assign {
    ($trait:ident, $method:ident, $op:ident, $tag:ident) => {
        impl<T, B, R> $trait<R> for Lattice<T, B>
        where
            T: Element + $op<Output = T>,
            B: Backend,
            R: IntoOperand<B>,
            R::Operand: ExprOperand<B, Value = T>,
        {
            fn $method(&mut self, rhs: R) {
                fatal(
                    concat!("Lattice::", stringify!($method)),
                    self.update_with($tag, rhs.into_operand()),
                );
            }
        }
    };
}

compound_assign!(AddAssign, add_assign, Add, BinaryAdd);
compound_assign!(SubAssign, sub_assign, Sub, BinarySub);
compound_assign!(MulAssign, mul_assign, Mul, BinaryMul);
