//! Strictly-upper-triangular charts and the Valiant fixpoint.
//!
//! A chart over `n` tokens stores the `(n+1) x (n+1)` strictly-upper
//! triangle by diagonals: `diagonals[d - 1][i]` is cell `(i, i + d)`.
//! The superdiagonal holds the seeds, every other cell starts at zero and
//! accumulates under `plus`.

use crate::matrix::Matrix;
use crate::semiring::Semiring;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Cell storage for a strictly-upper-triangular matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Chart<E> {
    n: usize,
    diagonals: Vec<Vec<E>>,
}

impl<E: Clone> Chart<E> {
    /// Seed the superdiagonal with one value per token; all longer spans are zero.
    pub fn from_seeds<S: Semiring<Elem = E>>(seeds: Vec<E>, alg: &S) -> Self {
        let n = seeds.len();
        let mut diagonals = Vec::with_capacity(n);
        if n > 0 {
            diagonals.push(seeds);
        }
        for d in 2..=n {
            diagonals.push(vec![alg.zero(); n + 1 - d]);
        }
        Chart { n, diagonals }
    }

    /// Build a chart by evaluating `f(i, j)` for every cell, span by span.
    pub fn from_fn(n: usize, mut f: impl FnMut(usize, usize) -> E) -> Self {
        let diagonals = (1..=n)
            .map(|d| (0..=n - d).map(|i| f(i, i + d)).collect())
            .collect();
        Chart { n, diagonals }
    }

    /// Read the strictly-upper part of a square matrix.
    pub fn from_matrix<S: Semiring<Elem = E>>(m: &Matrix<E>, _alg: &S) -> Self {
        assert_eq!(
            m.rows(),
            m.cols(),
            "Shape mismatch: chart requires a square matrix, got {:?}",
            m.shape()
        );
        let n = m.rows().saturating_sub(1);
        Chart::from_fn(n, |i, j| m.get(i, j).clone())
    }

    /// Number of tokens spanned by the chart.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// The cell for span `[i, j)`, `i < j <= n`.
    pub fn get(&self, i: usize, j: usize) -> &E {
        assert!(i < j && j <= self.n, "Cell ({i}, {j}) is outside the chart");
        &self.diagonals[j - i - 1][i]
    }

    pub fn set(&mut self, i: usize, j: usize, value: E) {
        assert!(i < j && j <= self.n, "Cell ({i}, {j}) is outside the chart");
        self.diagonals[j - i - 1][i] = value;
    }

    /// All cells spanning exactly `d` tokens, left to right.
    pub fn diagonal(&self, d: usize) -> &[E] {
        assert!(d >= 1 && d <= self.n, "Diagonal {d} is outside the chart");
        &self.diagonals[d - 1]
    }

    pub fn diagonals(&self) -> &[Vec<E>] {
        &self.diagonals
    }

    /// The cell spanning the whole input, if any.
    pub fn top(&self) -> Option<&E> {
        self.diagonals.last().and_then(|d| d.first())
    }

    /// Iterate over `((i, j), cell)` in increasing span order.
    pub fn cells(&self) -> impl Iterator<Item = ((usize, usize), &E)> {
        self.diagonals.iter().enumerate().flat_map(|(d, cells)| {
            cells
                .iter()
                .enumerate()
                .map(move |(i, e)| ((i, i + d + 1), e))
        })
    }

    /// `plus` over `k in (i, j)` of `times(cell(i, k), cell(k, j))`.
    fn product_at<S: Semiring<Elem = E>>(&self, i: usize, j: usize, alg: &S) -> E {
        (i + 1..j).fold(alg.zero(), |acc, k| {
            let left = self.get(i, k);
            let right = self.get(k, j);
            if alg.is_zero(left) || alg.is_zero(right) {
                acc
            } else {
                alg.plus(&acc, &alg.times(left, right))
            }
        })
    }

    /// Least fixpoint of `M = M + M * M` over the strictly-upper triangle.
    ///
    /// Diagonals are completed in increasing span order, so every cell only
    /// reads spans that have already converged and one pass is exact.
    pub fn seek_fixpoint<S: Semiring<Elem = E>>(&self, alg: &S) -> Self
    where
        E: Send + Sync,
    {
        let mut out = self.clone();
        for d in 2..=self.n {
            let row = out.closed_diagonal(d, alg);
            out.diagonals[d - 1] = row;
        }
        out
    }

    #[cfg(not(feature = "parallel"))]
    fn closed_diagonal<S: Semiring<Elem = E>>(&self, d: usize, alg: &S) -> Vec<E>
    where
        E: Send + Sync,
    {
        (0..=self.n - d)
            .map(|i| alg.plus(self.get(i, i + d), &self.product_at(i, i + d, alg)))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn closed_diagonal<S: Semiring<Elem = E>>(&self, d: usize, alg: &S) -> Vec<E>
    where
        E: Send + Sync,
    {
        (0..=self.n - d)
            .into_par_iter()
            .map(|i| alg.plus(self.get(i, i + d), &self.product_at(i, i + d, alg)))
            .collect()
    }

    /// One product step `M * M`: the superdiagonal of the result is zero.
    pub fn square<S: Semiring<Elem = E>>(&self, alg: &S) -> Self {
        Chart::from_fn(self.n, |i, j| {
            if j == i + 1 {
                alg.zero()
            } else {
                self.product_at(i, j, alg)
            }
        })
    }

    /// Whether every cell of span two or more already absorbs its product.
    pub fn is_fixpoint<S: Semiring<Elem = E>>(&self, alg: &S) -> bool
    where
        E: PartialEq,
    {
        self.cells()
            .filter(|((i, j), _)| j - i >= 2)
            .all(|((i, j), e)| alg.plus(e, &self.product_at(i, j, alg)) == *e)
    }

    /// Expand to a dense `(n+1) x (n+1)` matrix, zero on and below the diagonal.
    pub fn to_matrix<S: Semiring<Elem = E>>(&self, alg: &S) -> Matrix<E> {
        Matrix::from_fn(self.n + 1, self.n + 1, |r, c| {
            if r < c {
                self.get(r, c).clone()
            } else {
                alg.zero()
            }
        })
    }

    /// Apply `f` to every cell.
    pub fn map<F: Clone>(&self, mut f: impl FnMut((usize, usize), &E) -> F) -> Chart<F> {
        Chart::from_fn(self.n, |i, j| f((i, j), self.get(i, j)))
    }
}
