//! Dense matrix type and the Gauss-Jordan inversion used by the compute
//! worker.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::book::OrderBook;
use crate::error::{BenchError, Result};

/// Pivot magnitudes at or below this are treated as singular
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Dense row-major square matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n: usize,
    data: Vec<f64>,
}

/// Outcome of a verified inversion: X with A·X ≈ E plus its residual
#[derive(Debug)]
pub struct InverseResult {
    pub inverse: Matrix,
    pub residual: f64,
}

impl Matrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n);
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        m
    }

    /// Build from explicit rows; panics on ragged input. Intended for tests
    /// and small fixtures.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let n = rows.len();
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            assert_eq!(row.len(), n, "matrix rows must form a square");
            data.extend(row);
        }
        Self { n, data }
    }

    /// Deterministic matrix derived from the current book state.
    ///
    /// Off-diagonal entries are uniform in [-1, 1) seeded by the book
    /// digest; the diagonal gets +n on top, which keeps the matrix strictly
    /// diagonally dominant and therefore invertible at any dimension.
    pub fn from_book(book: &OrderBook, n: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(book.digest());
        let mut m = Self::zeros(n);
        for r in 0..n {
            for c in 0..n {
                m.data[r * n + c] = rng.gen_range(-1.0..1.0);
            }
            m.data[r * n + r] += n as f64;
        }
        m
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n + col]
    }

    #[inline]
    fn at(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n + col]
    }

    #[inline]
    fn at_mut(&mut self, row: usize, col: usize) -> &mut f64 {
        &mut self.data[row * self.n + col]
    }

    fn swap_rows(&mut self, r1: usize, r2: usize) {
        for c in 0..self.n {
            self.data.swap(r1 * self.n + c, r2 * self.n + c);
        }
    }

    /// Naive O(n^3) product; row-major ikj order for cache friendliness
    pub fn mul(&self, other: &Matrix) -> Matrix {
        let n = self.n;
        let mut out = Matrix::zeros(n);
        for i in 0..n {
            for k in 0..n {
                let a_ik = self.at(i, k);
                if a_ik == 0.0 {
                    continue;
                }
                for j in 0..n {
                    out.data[i * n + j] += a_ik * other.data[k * n + j];
                }
            }
        }
        out
    }

    /// Max absolute deviation of self·x from the identity
    pub fn residual(&self, x: &Matrix) -> f64 {
        let prod = self.mul(x);
        let mut worst = 0.0f64;
        for r in 0..self.n {
            for c in 0..self.n {
                let expected = if r == c { 1.0 } else { 0.0 };
                worst = worst.max((prod.at(r, c) - expected).abs());
            }
        }
        worst
    }

    /// Gauss-Jordan elimination with partial pivoting, solving A·X = E.
    ///
    /// A pivot at or below `pivot_tolerance` (or non-finite) means the
    /// matrix is singular within working precision; the error carries the
    /// offending column for diagnostics.
    pub fn invert(&self, pivot_tolerance: f64) -> Result<Matrix> {
        let n = self.n;
        let mut a = self.clone();
        let mut x = Matrix::identity(n);

        for col in 0..n {
            let mut pivot_row = col;
            let mut pivot = a.at(col, col).abs();
            for r in (col + 1)..n {
                let v = a.at(r, col).abs();
                if v > pivot {
                    pivot = v;
                    pivot_row = r;
                }
            }

            if !pivot.is_finite() || pivot <= pivot_tolerance {
                return Err(BenchError::SingularMatrix { column: col, pivot });
            }

            if pivot_row != col {
                a.swap_rows(col, pivot_row);
                x.swap_rows(col, pivot_row);
            }

            let p = a.at(col, col);
            for c in 0..n {
                *a.at_mut(col, c) /= p;
                *x.at_mut(col, c) /= p;
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a.at(r, col);
                if factor == 0.0 {
                    continue;
                }
                for c in 0..n {
                    let v = a.at(col, c) * factor;
                    *a.at_mut(r, c) -= v;
                }
                for c in 0..n {
                    let v = x.at(col, c) * factor;
                    *x.at_mut(r, c) -= v;
                }
            }
        }

        Ok(x)
    }

    /// Invert and verify the residual before accepting the result
    pub fn invert_checked(&self, tolerance: f64) -> Result<InverseResult> {
        let inverse = self.invert(PIVOT_TOLERANCE)?;
        let residual = self.residual(&inverse);
        if residual > tolerance {
            return Err(BenchError::ResidualTooLarge {
                residual,
                tolerance,
            });
        }
        Ok(InverseResult { inverse, residual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn inverts_known_two_by_two() {
        let a = Matrix::from_rows(vec![vec![4.0, 7.0], vec![2.0, 6.0]]);
        let result = a.invert_checked(1e-9).unwrap();

        assert_close(result.inverse.get(0, 0), 0.6);
        assert_close(result.inverse.get(0, 1), -0.7);
        assert_close(result.inverse.get(1, 0), -0.2);
        assert_close(result.inverse.get(1, 1), 0.4);
        assert!(result.residual < 1e-9);
    }

    #[test]
    fn identity_is_its_own_inverse() {
        let e = Matrix::identity(8);
        let result = e.invert_checked(1e-12).unwrap();
        assert_eq!(result.inverse, Matrix::identity(8));
    }

    #[test]
    fn singular_matrix_is_rejected_not_panicked() {
        let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![2.0, 4.0]]);
        match a.invert(PIVOT_TOLERANCE) {
            Err(BenchError::SingularMatrix { column, .. }) => assert_eq!(column, 1),
            other => panic!("expected SingularMatrix, got {other:?}"),
        }
    }

    #[test]
    fn zero_leading_pivot_forces_a_row_swap() {
        // a[0][0] == 0 requires partial pivoting to succeed at all
        let a = Matrix::from_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
        let result = a.invert_checked(1e-9).unwrap();
        assert_close(result.inverse.get(0, 1), 1.0);
        assert_close(result.inverse.get(1, 0), 1.0);
        assert_close(result.inverse.get(0, 0), 0.0);
    }

    #[test]
    fn book_derived_matrix_is_deterministic() {
        use chrono::Utc;
        let ts = Utc::now();

        let mut book = OrderBook::new();
        book.replace(&[(41000.0, 1.5)], &[(41001.0, 2.5)], ts);

        let a = Matrix::from_book(&book, 16);
        let b = Matrix::from_book(&book, 16);
        assert_eq!(a, b);

        book.merge(&[(40999.0, 1.0)], &[], ts);
        let c = Matrix::from_book(&book, 16);
        assert_ne!(a, c);
    }

    #[test]
    fn book_derived_matrix_inverts_within_tolerance() {
        let book = OrderBook::new();
        let a = Matrix::from_book(&book, 32);
        let result = a.invert_checked(1e-6).unwrap();
        assert!(result.residual < 1e-6);
        assert_eq!(result.inverse.dim(), 32);
    }

    #[test]
    fn residual_detects_a_wrong_inverse() {
        let a = Matrix::from_rows(vec![vec![4.0, 7.0], vec![2.0, 6.0]]);
        let not_inverse = Matrix::identity(2);
        assert!(a.residual(&not_inverse) > 1.0);
    }
}
