//! Semiring algebras for the matrix engines.
//!
//! Every engine in this crate (dense matrices, the triangular chart, the
//! recognizers and the SAT encoder) is parameterized over a [`Semiring`].
//! Swapping the algebra swaps the task: sets of nonterminals recognize,
//! forests parse, Boolean formulas encode a satisfiability problem.
//!
//! Two flavours are provided:
//! - [`Semiring`]: an algebra *object* whose operations may consult context
//!   (e.g. the grammar's binary rewrite table).
//! - [`ScalarSemiring`]: context-free value types with `+`/`*` operators,
//!   lifted to an algebra object by [`Scalar`].

use std::fmt::Debug;
use std::marker::PhantomData;
use std::ops::{Add, Mul};

/// A semiring algebra over the carrier type `Elem`.
///
/// Laws: `plus` is associative and commutative with identity `zero`;
/// `times` is associative and distributes over `plus`; `zero` annihilates
/// under `times`. Commutativity of `times` is never assumed.
///
/// `one` is the identity of `times` for the scalar semirings. The grammar
/// algebras (nonterminal sets, forests, formula vectors) have no such
/// element, since `times` rewrites through binary productions; they return
/// `zero` from `one`. Charts never call `one`; only
/// [`crate::matrix::Matrix::identity`] does.
pub trait Semiring: Send + Sync {
    /// The carrier type.
    type Elem: Clone + Debug + PartialEq + Send + Sync;

    /// The additive identity.
    fn zero(&self) -> Self::Elem;

    /// The multiplicative identity, or `zero` for algebras without one.
    fn one(&self) -> Self::Elem;

    /// Aggregate two values.
    fn plus(&self, a: &Self::Elem, b: &Self::Elem) -> Self::Elem;

    /// Combine two values, left operand first.
    fn times(&self, a: &Self::Elem, b: &Self::Elem) -> Self::Elem;

    /// Check if a value is the additive identity.
    fn is_zero(&self, a: &Self::Elem) -> bool {
        *a == self.zero()
    }
}

/// A value type that forms a semiring on its own.
pub trait ScalarSemiring:
    Clone + Debug + PartialEq + Send + Sync + Add<Output = Self> + Mul<Output = Self>
{
    /// The additive identity (zero element).
    fn zero() -> Self;

    /// The multiplicative identity (one element).
    fn one() -> Self;

    /// Check if this value is the zero element.
    fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

/// Lifts a [`ScalarSemiring`] value type to a [`Semiring`] algebra.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scalar<T>(PhantomData<fn() -> T>);

impl<T> Scalar<T> {
    pub fn new() -> Self {
        Scalar(PhantomData)
    }
}

impl<T: ScalarSemiring> Semiring for Scalar<T> {
    type Elem = T;

    fn zero(&self) -> T {
        T::zero()
    }

    fn one(&self) -> T {
        T::one()
    }

    fn plus(&self, a: &T, b: &T) -> T {
        a.clone() + b.clone()
    }

    fn times(&self, a: &T, b: &T) -> T {
        a.clone() * b.clone()
    }

    fn is_zero(&self, a: &T) -> bool {
        a.is_zero()
    }
}

/// Boolean semiring: or and and.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Boolean(pub bool);

impl Boolean {
    pub fn new(x: bool) -> Self {
        Boolean(x)
    }

    pub fn value(&self) -> bool {
        self.0
    }
}

impl ScalarSemiring for Boolean {
    fn zero() -> Self {
        Boolean(false)
    }

    fn one() -> Self {
        Boolean(true)
    }
}

impl Add for Boolean {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Boolean(self.0 || other.0)
    }
}

impl Mul for Boolean {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Boolean(self.0 && other.0)
    }
}

impl From<bool> for Boolean {
    fn from(x: bool) -> Self {
        Boolean(x)
    }
}

/// Integers mod 2: xor and and. A cell holds the parity of its derivations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Gf2(pub u8);

impl Gf2 {
    pub fn new(x: u8) -> Self {
        Gf2(x & 1)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl ScalarSemiring for Gf2 {
    fn zero() -> Self {
        Gf2(0)
    }

    fn one() -> Self {
        Gf2(1)
    }
}

impl Add for Gf2 {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Gf2(self.0 ^ other.0)
    }
}

impl Mul for Gf2 {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Gf2(self.0 & other.0)
    }
}

/// Counting semiring: natural numbers with + and *.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Count(pub u64);

impl Count {
    pub fn new(x: u64) -> Self {
        Count(x)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl ScalarSemiring for Count {
    fn zero() -> Self {
        Count(0)
    }

    fn one() -> Self {
        Count(1)
    }
}

impl Add for Count {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Count(self.0.saturating_add(other.0))
    }
}

impl Mul for Count {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Count(self.0.saturating_mul(other.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_semiring() {
        assert_eq!(Boolean(true) + Boolean(false), Boolean(true));
        assert_eq!(Boolean(true) * Boolean(false), Boolean(false));
        assert_eq!(Boolean(false) + Boolean(false), Boolean(false));
        assert_eq!(Boolean(true) * Boolean(true), Boolean(true));
    }

    #[test]
    fn test_gf2_semiring() {
        assert_eq!(Gf2(1) + Gf2(1), Gf2(0));
        assert_eq!(Gf2(1) + Gf2(0), Gf2(1));
        assert_eq!(Gf2(1) * Gf2(1), Gf2(1));
        assert_eq!(Gf2(1) * Gf2(0), Gf2(0));
        assert_eq!(Gf2::new(3), Gf2(1));
    }

    #[test]
    fn test_count_semiring() {
        let a = Count::new(3);
        let b = Count::new(4);

        assert_eq!(a + b, Count::new(7));
        assert_eq!(a * b, Count::new(12));
        assert_eq!(Count(u64::MAX) + Count(1), Count(u64::MAX));
    }

    #[test]
    fn test_scalar_algebra_laws() {
        let alg = Scalar::<Count>::new();
        let (a, b, c) = (Count(2), Count(3), Count(5));

        // Identities
        assert_eq!(alg.plus(&a, &alg.zero()), a);
        assert_eq!(alg.times(&a, &alg.one()), a);
        // Annihilation
        assert!(alg.is_zero(&alg.times(&a, &alg.zero())));
        // Distributivity
        let lhs = alg.times(&a, &alg.plus(&b, &c));
        let rhs = alg.plus(&alg.times(&a, &b), &alg.times(&a, &c));
        assert_eq!(lhs, rhs);
    }
}
