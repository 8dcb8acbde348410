//! Lazy expression templates
//!
//! Arithmetic on containers builds a tree of nodes instead of computing
//! anything. Leaves are container views and scalars; nodes carry an operator
//! tag. Assigning the tree to a container evaluates it once per site in a
//! single accelerator pass, so `a * b + c` makes one sweep over memory with
//! no temporaries.
//!
//! ```text
//!          BinaryExpr<Add>
//!          ┌─────┴──────┐
//!   BinaryExpr<Mul>   view(c)
//!    ┌────┴────┐
//!  view(a)   view(b)
//! ```
//!
//! Building a node is O(1): only views (pointer + small state) are captured.

mod operand;
mod ops;

pub use operand::{ExprMeta, ExprOperand, IntoOperand, Scalar};
pub use ops::{
    BinaryAdd, BinaryDiv, BinaryFn, BinaryMul, BinaryOp, BinarySub, TrinaryFn, TrinaryMulAdd, TrinaryOp,
    TrinaryWhere, UnaryFn, UnaryMinus, UnaryOp,
};

use crate::error::Result;
use crate::lattice::Lattice;
use crate::view::LatticeView;
use lattice_backends::{Backend, Element, Region};
use std::marker::PhantomData;

// ================================================================================================
// Nodes
// ================================================================================================

pub struct UnaryExpr<B, Op, X> {
    op: Op,
    x: X,
    _backend: PhantomData<fn() -> B>,
}

pub struct BinaryExpr<B, Op, X, Y> {
    op: Op,
    x: X,
    y: Y,
    _backend: PhantomData<fn() -> B>,
}

pub struct TrinaryExpr<B, Op, X, Y, Z> {
    op: Op,
    x: X,
    y: Y,
    z: Z,
    _backend: PhantomData<fn() -> B>,
}

impl<B, Op, X> UnaryExpr<B, Op, X> {
    pub fn new(op: Op, x: X) -> Self {
        Self {
            op,
            x,
            _backend: PhantomData,
        }
    }
}

impl<B, Op, X, Y> BinaryExpr<B, Op, X, Y> {
    pub fn new(op: Op, x: X, y: Y) -> Self {
        Self {
            op,
            x,
            y,
            _backend: PhantomData,
        }
    }
}

impl<B, Op, X, Y, Z> TrinaryExpr<B, Op, X, Y, Z> {
    pub fn new(op: Op, x: X, y: Y, z: Z) -> Self {
        Self {
            op,
            x,
            y,
            z,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend, Op, X> ExprOperand<B> for UnaryExpr<B, Op, X>
where
    X: ExprOperand<B>,
    Op: UnaryOp<X::Value> + Send + Sync,
{
    type Value = Op::Output;

    #[inline]
    fn eval(&self, site: usize) -> Self::Value {
        self.op.apply(self.x.eval(site))
    }

    fn conform(&self, meta: &mut ExprMeta<B>) -> Result<()> {
        self.x.conform(meta)
    }

    fn track(&self, region: &Region<'_, B>) -> Result<()> {
        self.x.track(region)
    }
}

impl<B: Backend, Op, X, Y> ExprOperand<B> for BinaryExpr<B, Op, X, Y>
where
    X: ExprOperand<B>,
    Y: ExprOperand<B>,
    Op: BinaryOp<X::Value, Y::Value> + Send + Sync,
{
    type Value = Op::Output;

    #[inline]
    fn eval(&self, site: usize) -> Self::Value {
        self.op.apply(self.x.eval(site), self.y.eval(site))
    }

    fn conform(&self, meta: &mut ExprMeta<B>) -> Result<()> {
        self.x.conform(meta)?;
        self.y.conform(meta)
    }

    fn track(&self, region: &Region<'_, B>) -> Result<()> {
        self.x.track(region)?;
        self.y.track(region)
    }
}

impl<B: Backend, Op, X, Y, Z> ExprOperand<B> for TrinaryExpr<B, Op, X, Y, Z>
where
    X: ExprOperand<B>,
    Y: ExprOperand<B>,
    Z: ExprOperand<B>,
    Op: TrinaryOp<X::Value, Y::Value, Z::Value> + Send + Sync,
{
    type Value = Op::Output;

    #[inline]
    fn eval(&self, site: usize) -> Self::Value {
        self.op.apply(self.x.eval(site), self.y.eval(site), self.z.eval(site))
    }

    fn conform(&self, meta: &mut ExprMeta<B>) -> Result<()> {
        self.x.conform(meta)?;
        self.y.conform(meta)?;
        self.z.conform(meta)
    }

    fn track(&self, region: &Region<'_, B>) -> Result<()> {
        self.x.track(region)?;
        self.y.track(region)?;
        self.z.track(region)
    }
}

impl<B: Backend, Op, X> IntoOperand<B> for UnaryExpr<B, Op, X> {
    type Operand = Self;

    fn into_operand(self) -> Self {
        self
    }
}

impl<B: Backend, Op, X, Y> IntoOperand<B> for BinaryExpr<B, Op, X, Y> {
    type Operand = Self;

    fn into_operand(self) -> Self {
        self
    }
}

impl<B: Backend, Op, X, Y, Z> IntoOperand<B> for TrinaryExpr<B, Op, X, Y, Z> {
    type Operand = Self;

    fn into_operand(self) -> Self {
        self
    }
}

// ================================================================================================
// Operators
// ================================================================================================

macro_rules! expr_operators {
    (impl[$($gen:tt)*] for $lhs:ty) => {
        expr_operators!(@binary [$($gen)*] $lhs, Add, add, BinaryAdd);
        expr_operators!(@binary [$($gen)*] $lhs, Sub, sub, BinarySub);
        expr_operators!(@binary [$($gen)*] $lhs, Mul, mul, BinaryMul);
        expr_operators!(@binary [$($gen)*] $lhs, Div, div, BinaryDiv);

        impl<$($gen)*> std::ops::Neg for $lhs {
            type Output = UnaryExpr<B, UnaryMinus, <$lhs as IntoOperand<B>>::Operand>;

            fn neg(self) -> Self::Output {
                UnaryExpr::new(UnaryMinus, self.into_operand())
            }
        }
    };
    (@binary [$($gen:tt)*] $lhs:ty, $trait:ident, $method:ident, $tag:ident) => {
        impl<$($gen)*, Rhs: IntoOperand<B>> std::ops::$trait<Rhs> for $lhs {
            type Output = BinaryExpr<B, $tag, <$lhs as IntoOperand<B>>::Operand, Rhs::Operand>;

            fn $method(self, rhs: Rhs) -> Self::Output {
                BinaryExpr::new($tag, self.into_operand(), rhs.into_operand())
            }
        }
    };
}

expr_operators!(impl['a, T: Element, B: Backend] for &'a Lattice<T, B>);
expr_operators!(impl['a, T: Element, B: Backend] for LatticeView<'a, T, B>);
expr_operators!(impl[B: Backend, Op, X] for UnaryExpr<B, Op, X>);
expr_operators!(impl[B: Backend, Op, X, Y] for BinaryExpr<B, Op, X, Y>);
expr_operators!(impl[B: Backend, Op, X, Y, Z] for TrinaryExpr<B, Op, X, Y, Z>);

/// `scalar op expr` for floating-point scalars on the left
macro_rules! reverse_scalar_operators {
    (@one $scalar:ty, [$($gen:tt)*] $rhs:ty, $trait:ident, $method:ident, $tag:ident) => {
        impl<$($gen)*> std::ops::$trait<$rhs> for $scalar {
            type Output = BinaryExpr<B, $tag, Scalar<$scalar>, <$rhs as IntoOperand<B>>::Operand>;

            fn $method(self, rhs: $rhs) -> Self::Output {
                BinaryExpr::new($tag, Scalar(self), rhs.into_operand())
            }
        }
    };
    ($scalar:ty; $(impl[$($gen:tt)*] for $rhs:ty;)*) => {
        $(
            reverse_scalar_operators!(@one $scalar, [$($gen)*] $rhs, Add, add, BinaryAdd);
            reverse_scalar_operators!(@one $scalar, [$($gen)*] $rhs, Sub, sub, BinarySub);
            reverse_scalar_operators!(@one $scalar, [$($gen)*] $rhs, Mul, mul, BinaryMul);
            reverse_scalar_operators!(@one $scalar, [$($gen)*] $rhs, Div, div, BinaryDiv);
        )*
    };
}

macro_rules! reverse_scalar_impls {
    ($($scalar:ty),*) => {
        $(
            reverse_scalar_operators!($scalar;
                impl['a, T: Element, B: Backend] for &'a Lattice<T, B>;
                impl['a, T: Element, B: Backend] for LatticeView<'a, T, B>;
                impl[B: Backend, Op, X] for UnaryExpr<B, Op, X>;
                impl[B: Backend, Op, X, Y] for BinaryExpr<B, Op, X, Y>;
                impl[B: Backend, Op, X, Y, Z] for TrinaryExpr<B, Op, X, Y, Z>;
            );
        )*
    };
}

reverse_scalar_impls!(f32, f64);

// ================================================================================================
// Constructors
// ================================================================================================

/// Apply `f` to every site of `x`
pub fn map<B, X, F>(x: X, f: F) -> UnaryExpr<B, UnaryFn<F>, X::Operand>
where
    B: Backend,
    X: IntoOperand<B>,
{
    UnaryExpr::new(UnaryFn(f), x.into_operand())
}

/// Combine two operands site by site with `f`
pub fn zip_with<B, X, Y, F>(x: X, y: Y, f: F) -> BinaryExpr<B, BinaryFn<F>, X::Operand, Y::Operand>
where
    B: Backend,
    X: IntoOperand<B>,
    Y: IntoOperand<B>,
{
    BinaryExpr::new(BinaryFn(f), x.into_operand(), y.into_operand())
}

/// Combine three operands site by site with `f`
pub fn zip3_with<B, X, Y, Z, F>(x: X, y: Y, z: Z, f: F) -> TrinaryExpr<B, TrinaryFn<F>, X::Operand, Y::Operand, Z::Operand>
where
    B: Backend,
    X: IntoOperand<B>,
    Y: IntoOperand<B>,
    Z: IntoOperand<B>,
{
    TrinaryExpr::new(TrinaryFn(f), x.into_operand(), y.into_operand(), z.into_operand())
}

/// `x * y + z`
pub fn mul_add<B, X, Y, Z>(x: X, y: Y, z: Z) -> TrinaryExpr<B, TrinaryMulAdd, X::Operand, Y::Operand, Z::Operand>
where
    B: Backend,
    X: IntoOperand<B>,
    Y: IntoOperand<B>,
    Z: IntoOperand<B>,
{
    TrinaryExpr::new(TrinaryMulAdd, x.into_operand(), y.into_operand(), z.into_operand())
}

/// `then` where `pred` is nonzero, `otherwise` elsewhere
pub fn where_nonzero<B, P, X, Y>(
    pred: P,
    then: X,
    otherwise: Y,
) -> TrinaryExpr<B, TrinaryWhere, P::Operand, X::Operand, Y::Operand>
where
    B: Backend,
    P: IntoOperand<B>,
    X: IntoOperand<B>,
    Y: IntoOperand<B>,
{
    TrinaryExpr::new(TrinaryWhere, pred.into_operand(), then.into_operand(), otherwise.into_operand())
}
