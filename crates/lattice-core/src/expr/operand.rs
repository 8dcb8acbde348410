//! Expression operands
//!
//! Everything that can appear in an expression implements [`ExprOperand`]:
//! container views, scalars and the expression nodes themselves.
//! [`IntoOperand`] maps what users write (`&Lattice`, `2.0`, a node) onto
//! those operand types.

use crate::error::{LatticeError, Result};
use crate::lattice::Lattice;
use crate::parity::Parity;
use crate::topology::{GridId, GridRef};
use crate::view::LatticeView;
use lattice_backends::{Backend, Context, Element, Region};
use std::fmt;
use std::sync::Arc;

/// Metadata unified across the leaves of an expression
pub struct ExprMeta<B: Backend> {
    pub grid: Option<GridId>,
    pub topology: Option<GridRef>,
    pub parity: Option<Parity>,
    pub context: Option<Arc<Context<B>>>,
    pub osites: Option<usize>,
}

impl<B: Backend> ExprMeta<B> {
    pub fn new() -> Self {
        Self {
            grid: None,
            topology: None,
            parity: None,
            context: None,
            osites: None,
        }
    }

    pub fn unify_parity(&mut self, parity: Parity) -> Result<()> {
        match self.parity {
            None => {
                self.parity = Some(parity);
                Ok(())
            }
            Some(seen) if seen == parity => Ok(()),
            Some(seen) => Err(LatticeError::ParityMismatch {
                left: seen,
                right: parity,
            }),
        }
    }

    pub fn unify_context(&mut self, context: &Arc<Context<B>>) -> Result<()> {
        match &self.context {
            None => {
                self.context = Some(Arc::clone(context));
                Ok(())
            }
            Some(seen) if Arc::ptr_eq(seen, context) => Ok(()),
            Some(_) => Err(LatticeError::ContextMismatch),
        }
    }

    pub fn unify_osites(&mut self, osites: usize) -> Result<()> {
        match self.osites {
            None => {
                self.osites = Some(osites);
                Ok(())
            }
            Some(seen) if seen == osites => Ok(()),
            Some(seen) => Err(LatticeError::SizeMismatch {
                expected: seen,
                actual: osites,
            }),
        }
    }
}

impl<B: Backend> Default for ExprMeta<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> fmt::Debug for ExprMeta<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprMeta")
            .field("grid", &self.grid)
            .field("parity", &self.parity)
            .field("osites", &self.osites)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

/// A node or leaf that can be evaluated per site
pub trait ExprOperand<B: Backend>: Send + Sync {
    type Value;

    /// Value at `site`; pure
    fn eval(&self, site: usize) -> Self::Value;

    /// Fold this operand's grid, parity, context and size into `meta`
    fn conform(&self, meta: &mut ExprMeta<B>) -> Result<()>;

    /// Register every container leaf with `region`
    fn track(&self, region: &Region<'_, B>) -> Result<()>;
}

/// Conversion into an expression operand
pub trait IntoOperand<B: Backend> {
    type Operand;
    fn into_operand(self) -> Self::Operand;
}

// ================================================================================================
// Leaves
// ================================================================================================

/// Broadcast value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scalar<S>(pub S);

impl<B: Backend, S: Copy + Send + Sync> ExprOperand<B> for Scalar<S> {
    type Value = S;

    #[inline]
    fn eval(&self, _site: usize) -> S {
        self.0
    }

    fn conform(&self, _meta: &mut ExprMeta<B>) -> Result<()> {
        Ok(())
    }

    fn track(&self, _region: &Region<'_, B>) -> Result<()> {
        Ok(())
    }
}

impl<B: Backend, S> IntoOperand<B> for Scalar<S> {
    type Operand = Self;

    fn into_operand(self) -> Self {
        self
    }
}

macro_rules! scalar_operand {
    ($($ty:ty),*) => {
        $(
            impl<B: Backend> IntoOperand<B> for $ty {
                type Operand = Scalar<$ty>;

                fn into_operand(self) -> Scalar<$ty> {
                    Scalar(self)
                }
            }
        )*
    };
}

scalar_operand!(f32, f64, i32, i64, u32, u64);

impl<B: Backend, T: Element> ExprOperand<B> for LatticeView<'_, T, B> {
    type Value = T;

    #[inline]
    fn eval(&self, site: usize) -> T {
        self.get(site)
    }

    fn conform(&self, meta: &mut ExprMeta<B>) -> Result<()> {
        let owner = self.owner();
        self.accelerator().conformable(&mut meta.grid)?;
        meta.unify_parity(self.checkerboard())?;
        meta.unify_context(owner.context())?;
        meta.unify_osites(self.osites())?;
        if meta.topology.is_none() {
            meta.topology = Some(owner.grid().clone());
        }
        Ok(())
    }

    fn track(&self, region: &Region<'_, B>) -> Result<()> {
        region.track(self.owner().accessor().clone())?;
        Ok(())
    }
}

impl<'a, B: Backend, T: Element> IntoOperand<B> for LatticeView<'a, T, B> {
    type Operand = Self;

    fn into_operand(self) -> Self {
        self
    }
}

impl<'a, B: Backend, T: Element> IntoOperand<B> for &'a Lattice<T, B> {
    type Operand = LatticeView<'a, T, B>;

    fn into_operand(self) -> LatticeView<'a, T, B> {
        LatticeView::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::FlatGrid;
    use lattice_backends::{DispatchConfig, HostBackend};

    fn ctx() -> Arc<Context<HostBackend>> {
        Context::with_config(HostBackend::new(), DispatchConfig::default()).unwrap()
    }

    #[test]
    fn test_meta_unifies_leaves() {
        let ctx = ctx();
        let grid = FlatGrid::shared(4);
        let mut a = Lattice::<f32, _>::new(&ctx, &grid);
        a.set_checkerboard(Parity::Even);
        let mut b = Lattice::<f32, _>::new(&ctx, &grid);
        b.set_checkerboard(Parity::Even);

        let mut meta = ExprMeta::new();
        (&a).into_operand().conform(&mut meta).unwrap();
        (&b).into_operand().conform(&mut meta).unwrap();
        assert_eq!(meta.grid, Some(grid.id()));
        assert_eq!(meta.parity, Some(Parity::Even));
        assert_eq!(meta.osites, Some(4));
        assert_eq!(meta.topology.as_ref(), Some(&grid));
    }

    #[test]
    fn test_meta_rejects_mixed_parity_and_context() {
        let grid = FlatGrid::shared(4);
        let ctx_a = ctx();
        let ctx_b = ctx();
        let mut even = Lattice::<f32, _>::new(&ctx_a, &grid);
        even.set_checkerboard(Parity::Even);
        let mut odd = Lattice::<f32, _>::new(&ctx_a, &grid);
        odd.set_checkerboard(Parity::Odd);
        let mut elsewhere = Lattice::<f32, _>::new(&ctx_b, &grid);
        elsewhere.set_checkerboard(Parity::Even);

        let mut meta = ExprMeta::new();
        (&even).into_operand().conform(&mut meta).unwrap();
        assert!(matches!(
            (&odd).into_operand().conform(&mut meta),
            Err(LatticeError::ParityMismatch { .. })
        ));
        assert!(matches!(
            (&elsewhere).into_operand().conform(&mut meta),
            Err(LatticeError::ContextMismatch)
        ));
    }

    #[test]
    fn test_scalars_carry_no_metadata() {
        let mut meta = ExprMeta::<HostBackend>::new();
        let s = IntoOperand::<HostBackend>::into_operand(2.5f64);
        ExprOperand::<HostBackend>::conform(&s, &mut meta).unwrap();
        assert_eq!(ExprOperand::<HostBackend>::eval(&s, 99), 2.5);
        assert!(meta.grid.is_none() && meta.parity.is_none());
    }
}
