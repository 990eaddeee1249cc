//! Dense matrices over a semiring.
//!
//! Matrices are pure values: every operation returns a fresh matrix and
//! takes the algebra explicitly. Shape mismatches are programmer errors and
//! panic.

use crate::chart::Chart;
use crate::semiring::Semiring;
use std::fmt;

/// A dense `rows x cols` grid of semiring values, stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix<E> {
    rows: usize,
    cols: usize,
    data: Vec<E>,
}

impl<E: Clone> Matrix<E> {
    /// Build a matrix by evaluating `f(row, col)` for every cell.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> E) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Matrix { rows, cols, data }
    }

    /// Build a matrix from row-major data.
    pub fn from_rows(rows: Vec<Vec<E>>) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        assert!(
            rows.iter().all(|r| r.len() == cols),
            "Shape mismatch: ragged rows"
        );
        let n = rows.len();
        Matrix {
            rows: n,
            cols,
            data: rows.into_iter().flatten().collect(),
        }
    }

    /// The all-zero matrix.
    pub fn zeros<S: Semiring<Elem = E>>(alg: &S, rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![alg.zero(); rows * cols],
        }
    }

    /// The identity under `times`.
    pub fn identity<S: Semiring<Elem = E>>(alg: &S, n: usize) -> Self {
        Matrix::from_fn(n, n, |r, c| if r == c { alg.one() } else { alg.zero() })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, r: usize, c: usize) -> &E {
        assert!(r < self.rows && c < self.cols, "Index ({r}, {c}) out of bounds");
        &self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, value: E) {
        assert!(r < self.rows && c < self.cols, "Index ({r}, {c}) out of bounds");
        self.data[r * self.cols + c] = value;
    }

    /// Iterate over a row.
    pub fn row(&self, r: usize) -> &[E] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Apply `f` to every entry.
    pub fn map<F: Clone>(&self, f: impl FnMut(&E) -> F) -> Matrix<F> {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    pub fn transpose(&self) -> Self {
        Matrix::from_fn(self.cols, self.rows, |r, c| self.get(c, r).clone())
    }

    /// Elementwise `plus`.
    pub fn plus<S: Semiring<Elem = E>>(&self, other: &Self, alg: &S) -> Self {
        assert_eq!(
            self.shape(),
            other.shape(),
            "Shape mismatch: cannot add {:?} and {:?}",
            self.shape(),
            other.shape()
        );
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| alg.plus(a, b))
                .collect(),
        }
    }

    /// Semiring matrix product by triple-loop accumulation.
    pub fn times<S: Semiring<Elem = E>>(&self, other: &Self, alg: &S) -> Self {
        assert_eq!(
            self.cols, other.rows,
            "Shape mismatch: cannot multiply {:?} by {:?}",
            self.shape(),
            other.shape()
        );
        Matrix::from_fn(self.rows, other.cols, |r, c| {
            (0..self.cols).fold(alg.zero(), |acc, k| {
                alg.plus(&acc, &alg.times(self.get(r, k), other.get(k, c)))
            })
        })
    }

    /// Keep the strictly-upper-triangular part as a [`Chart`].
    pub fn to_upper_triangular<S: Semiring<Elem = E>>(&self, alg: &S) -> Chart<E> {
        Chart::from_matrix(self, alg)
    }
}

impl<E: fmt::Display> fmt::Display for Matrix<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            for c in 0..self.cols {
                if c > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", self.data[r * self.cols + c])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semiring::{Boolean, Count, Gf2, Scalar};

    fn bools(rows: &[&[u8]]) -> Matrix<Boolean> {
        Matrix::from_rows(
            rows.iter()
                .map(|r| r.iter().map(|&x| Boolean(x == 1)).collect())
                .collect(),
        )
    }

    #[test]
    fn test_identity_is_neutral() {
        let alg = Scalar::<Count>::new();
        let m = Matrix::from_fn(3, 3, |r, c| Count((r * 3 + c) as u64));
        let id = Matrix::identity(&alg, 3);

        assert_eq!(m.times(&id, &alg), m);
        assert_eq!(id.times(&m, &alg), m);
    }

    #[test]
    fn test_boolean_product() {
        let alg = Scalar::<Boolean>::new();
        let a = bools(&[&[0, 1], &[0, 0]]);
        let b = bools(&[&[0, 0], &[1, 0]]);

        assert_eq!(a.times(&b, &alg), bools(&[&[1, 0], &[0, 0]]));
        assert_eq!(b.times(&a, &alg), bools(&[&[0, 0], &[0, 1]]));
    }

    #[test]
    fn test_product_is_associative() {
        let alg = Scalar::<Count>::new();
        let a = Matrix::from_fn(2, 3, |r, c| Count((r + c) as u64));
        let b = Matrix::from_fn(3, 2, |r, c| Count((2 * r + c) as u64));
        let c = Matrix::from_fn(2, 2, |r, c| Count((r * c + 1) as u64));

        let left = a.times(&b, &alg).times(&c, &alg);
        let right = a.times(&b.times(&c, &alg), &alg);
        assert_eq!(left, right);
    }

    #[test]
    fn test_transpose_and_plus() {
        let alg = Scalar::<Gf2>::new();
        let m = Matrix::from_fn(2, 3, |r, c| Gf2::new((r + c) as u8));
        let t = m.transpose();

        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t.get(2, 1), m.get(1, 2));
        // x + x = 0 over GF(2)
        assert_eq!(m.plus(&m, &alg), Matrix::zeros(&alg, 2, 3));
    }

    #[test]
    #[should_panic(expected = "Shape mismatch")]
    fn test_shape_mismatch_panics() {
        let alg = Scalar::<Count>::new();
        let a = Matrix::zeros(&alg, 2, 3);
        let b = Matrix::zeros(&alg, 2, 3);
        let _ = a.times(&b, &alg);
    }
}
