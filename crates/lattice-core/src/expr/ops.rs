//! Operator tags
//!
//! Each tag is a zero-sized (or closure-carrying) value applied per site by
//! its expression node.

use std::ops::{Add, Div, Mul, Neg, Sub};

pub trait UnaryOp<X> {
    type Output;
    fn apply(&self, x: X) -> Self::Output;
}

pub trait BinaryOp<X, Y> {
    type Output;
    fn apply(&self, x: X, y: Y) -> Self::Output;
}

pub trait TrinaryOp<X, Y, Z> {
    type Output;
    fn apply(&self, x: X, y: Y, z: Z) -> Self::Output;
}

// ================================================================================================
// Unary
// ================================================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct UnaryMinus;

impl<X: Neg> UnaryOp<X> for UnaryMinus {
    type Output = X::Output;

    #[inline]
    fn apply(&self, x: X) -> Self::Output {
        -x
    }
}

/// Arbitrary per-site function
#[derive(Clone, Copy)]
pub struct UnaryFn<F>(pub F);

impl<X, R, F: Fn(X) -> R> UnaryOp<X> for UnaryFn<F> {
    type Output = R;

    #[inline]
    fn apply(&self, x: X) -> R {
        (self.0)(x)
    }
}

// ================================================================================================
// Binary
// ================================================================================================

macro_rules! binary_tag {
    ($(#[$doc:meta])* $tag:ident, $trait:ident, $method:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $tag;

        impl<X: $trait<Y>, Y> BinaryOp<X, Y> for $tag {
            type Output = X::Output;

            #[inline]
            fn apply(&self, x: X, y: Y) -> Self::Output {
                x.$method(y)
            }
        }
    };
}

binary_tag!(BinaryAdd, Add, add);
binary_tag!(BinarySub, Sub, sub);
binary_tag!(BinaryMul, Mul, mul);
binary_tag!(BinaryDiv, Div, div);

#[derive(Clone, Copy)]
pub struct BinaryFn<F>(pub F);

impl<X, Y, R, F: Fn(X, Y) -> R> BinaryOp<X, Y> for BinaryFn<F> {
    type Output = R;

    #[inline]
    fn apply(&self, x: X, y: Y) -> R {
        (self.0)(x, y)
    }
}

// ================================================================================================
// Trinary
// ================================================================================================

/// `x * y + z`
#[derive(Debug, Clone, Copy, Default)]
pub struct TrinaryMulAdd;

impl<X, Y, Z> TrinaryOp<X, Y, Z> for TrinaryMulAdd
where
    X: Mul<Y>,
    X::Output: Add<Z>,
{
    type Output = <X::Output as Add<Z>>::Output;

    #[inline]
    fn apply(&self, x: X, y: Y, z: Z) -> Self::Output {
        x * y + z
    }
}

/// Predicated select: `y` where `x` is nonzero, `z` elsewhere
#[derive(Debug, Clone, Copy, Default)]
pub struct TrinaryWhere;

impl<X, Y> TrinaryOp<X, Y, Y> for TrinaryWhere
where
    X: PartialEq + Default,
{
    type Output = Y;

    #[inline]
    fn apply(&self, x: X, y: Y, z: Y) -> Y {
        if x != X::default() {
            y
        } else {
            z
        }
    }
}

#[derive(Clone, Copy)]
pub struct TrinaryFn<F>(pub F);

impl<X, Y, Z, R, F: Fn(X, Y, Z) -> R> TrinaryOp<X, Y, Z> for TrinaryFn<F> {
    type Output = R;

    #[inline]
    fn apply(&self, x: X, y: Y, z: Z) -> R {
        (self.0)(x, y, z)
    }
}
