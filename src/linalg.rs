//! Linear algebra
//!
//! Dense helpers for the small symmetric positive definite systems that arise
//! in iteratively reweighted least squares. Matrices are row-major `n x n`.

/// Relative pivot size below which a column is treated as collinear.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// Lower triangular Cholesky factor of a symmetric positive definite matrix.
#[derive(Debug, Clone)]
pub struct Cholesky {
    l: Vec<f64>,
    n: usize,
}

impl Cholesky {
    /// Factor `a` (row-major, `n x n`).
    ///
    /// Returns `Err(j)` with the first column whose pivot vanishes relative to
    /// its diagonal entry, i.e. the matrix is not of full rank.
    pub fn new(a: &[f64], n: usize) -> Result<Self, usize> {
        let mut l = vec![0.0; n * n];
        for j in 0..n {
            let diag = a[j * n + j];
            let s = diag - (0..j).map(|k| l[j * n + k] * l[j * n + k]).sum::<f64>();
            if !s.is_finite() || diag <= 0.0 || s <= PIVOT_TOLERANCE * diag {
                return Err(j);
            }
            let pivot = s.sqrt();
            l[j * n + j] = pivot;
            for i in (j + 1)..n {
                let dot: f64 = (0..j).map(|k| l[i * n + k] * l[j * n + k]).sum();
                l[i * n + j] = (a[i * n + j] - dot) / pivot;
            }
        }
        Ok(Cholesky { l, n })
    }

    /// Solve `A x = b`.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;
        let mut y = vec![0.0; n];
        for i in 0..n {
            let dot: f64 = (0..i).map(|k| self.l[i * n + k] * y[k]).sum();
            y[i] = (b[i] - dot) / self.l[i * n + i];
        }
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let dot: f64 = ((i + 1)..n).map(|k| self.l[k * n + i] * x[k]).sum();
            x[i] = (y[i] - dot) / self.l[i * n + i];
        }
        x
    }

    /// Full inverse of `A`, row-major.
    pub fn inverse(&self) -> Vec<f64> {
        let n = self.n;
        let mut inv = vec![0.0; n * n];
        let mut e = vec![0.0; n];
        for j in 0..n {
            e.iter_mut().for_each(|v| *v = 0.0);
            e[j] = 1.0;
            let col = self.solve(&e);
            for (i, v) in col.into_iter().enumerate() {
                inv[i * n + j] = v;
            }
        }
        inv
    }
}
