//! Dense linear algebra used by the solvers.
//!
//! Matrices are row-major `Vec<Vec<f64>>`, the same layout the simplex tableau
//! uses. Problem sizes in this crate are small (tens of rows), so everything here
//! is a straightforward O(n^3) dense routine.

use crate::error::SolverError;

pub type Matrix = Vec<Vec<f64>>;

/// Pivots smaller than this fraction of the matrix infinity norm are treated as zero.
pub const PIVOT_TOLERANCE: f64 = 1e-10;

pub fn dot(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// y = a * x + y
pub fn axpy(a: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += a * xi;
    }
}

pub fn identity(n: usize) -> Matrix {
    let mut m = vec![vec![0.0; n]; n];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

pub fn transpose(a: &[Vec<f64>]) -> Matrix {
    let rows = a.len();
    let cols = a.first().map_or(0, Vec::len);
    let mut t = vec![vec![0.0; rows]; cols];
    for (i, row) in a.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            t[j][i] = v;
        }
    }
    t
}

pub fn mat_vec(a: &[Vec<f64>], x: &[f64]) -> Vec<f64> {
    a.iter().map(|row| dot(row, x)).collect()
}

pub fn mat_mul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Matrix {
    let inner = b.len();
    let cols = b.first().map_or(0, Vec::len);
    a.iter()
        .map(|row| {
            debug_assert_eq!(row.len(), inner);
            let mut out = vec![0.0; cols];
            for (k, &aik) in row.iter().enumerate() {
                if aik != 0.0 {
                    axpy(aik, &b[k], &mut out);
                }
            }
            out
        })
        .collect()
}

/// Maximum absolute row sum.
pub fn norm_inf(a: &[Vec<f64>]) -> f64 {
    a.iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Returns the first off-diagonal pair that differs by more than `tolerance`.
pub fn find_asymmetry(a: &[Vec<f64>], tolerance: f64) -> Option<(usize, usize)> {
    for i in 0..a.len() {
        for j in (i + 1)..a.len() {
            if (a[i][j] - a[j][i]).abs() > tolerance {
                return Some((i, j));
            }
        }
    }
    None
}

pub fn is_symmetric(a: &[Vec<f64>], tolerance: f64) -> bool {
    a.iter().all(|row| row.len() == a.len()) && find_asymmetry(a, tolerance).is_none()
}

fn check_square(a: &[Vec<f64>], context: &str) -> Result<usize, SolverError> {
    let n = a.len();
    for row in a {
        if row.len() != n {
            return Err(SolverError::dimension(context, n, row.len()));
        }
    }
    Ok(n)
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
///
/// Fails with [`SolverError::SingularMatrix`] when a pivot falls below
/// `PIVOT_TOLERANCE * ||A||_inf`.
pub fn solve_linear_system(a: &[Vec<f64>], b: &[f64]) -> Result<Vec<f64>, SolverError> {
    let n = check_square(a, "linear system matrix")?;
    if b.len() != n {
        return Err(SolverError::dimension("linear system rhs", n, b.len()));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let threshold = PIVOT_TOLERANCE * norm_inf(a);
    let mut m: Matrix = a
        .iter()
        .zip(b)
        .map(|(row, &bi)| {
            let mut r = row.clone();
            r.push(bi);
            r
        })
        .collect();

    for col in 0..n {
        // Largest magnitude wins, first row on ties.
        let mut pivot_row = col;
        for row in (col + 1)..n {
            if m[row][col].abs() > m[pivot_row][col].abs() {
                pivot_row = row;
            }
        }
        if m[pivot_row][col].abs() <= threshold {
            return Err(SolverError::SingularMatrix);
        }
        m.swap(col, pivot_row);

        let (upper, lower) = m.split_at_mut(col + 1);
        let pivot = &upper[col];
        for row in lower.iter_mut() {
            let factor = row[col] / pivot[col];
            if factor != 0.0 {
                for j in col..=n {
                    row[j] -= factor * pivot[j];
                }
            }
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let tail: f64 = ((i + 1)..n).map(|j| m[i][j] * x[j]).sum();
        x[i] = (m[i][n] - tail) / m[i][i];
    }
    Ok(x)
}

/// Factor a symmetric positive definite matrix as `L Lᵀ`, returning the lower
/// triangular `L`.
///
/// Only the lower triangle of `m` is read. Fails with
/// [`SolverError::NotPositiveDefinite`] when a diagonal pivot is not positive
/// (relative to machine precision and the largest diagonal entry).
pub fn cholesky_factor(m: &[Vec<f64>]) -> Result<Matrix, SolverError> {
    let n = check_square(m, "cholesky input")?;
    let scale = (0..n).map(|i| m[i][i].abs()).fold(0.0, f64::max);
    let mut l = vec![vec![0.0; n]; n];

    for j in 0..n {
        let s = m[j][j] - dot(&l[j][..j], &l[j][..j]);
        // Also rejects NaN.
        if !(s > f64::EPSILON * scale) {
            return Err(SolverError::NotPositiveDefinite);
        }
        let diag = s.sqrt();
        l[j][j] = diag;

        for i in (j + 1)..n {
            let (head, tail) = l.split_at_mut(i);
            let row_j = &head[j];
            let row_i = &mut tail[0];
            row_i[j] = (m[i][j] - dot(&row_i[..j], &row_j[..j])) / diag;
        }
    }
    Ok(l)
}

/// Solve `L Lᵀ x = b` given the factor from [`cholesky_factor`].
pub fn cholesky_solve(l: &[Vec<f64>], b: &[f64]) -> Result<Vec<f64>, SolverError> {
    let n = l.len();
    if b.len() != n {
        return Err(SolverError::dimension("cholesky rhs", n, b.len()));
    }

    let mut y = b.to_vec();
    for i in 0..n {
        y[i] = (y[i] - dot(&l[i][..i], &y[..i])) / l[i][i];
    }
    for i in (0..n).rev() {
        let tail: f64 = ((i + 1)..n).map(|k| l[k][i] * y[k]).sum();
        y[i] = (y[i] - tail) / l[i][i];
    }
    Ok(y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_slices_eq(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_abs_diff_eq!(a, e, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_solve_linear_system() {
        // 2x + y - z = 8, -3x - y + 2z = -11, -2x + y + 2z = -3
        let a = vec![
            vec![2.0, 1.0, -1.0],
            vec![-3.0, -1.0, 2.0],
            vec![-2.0, 1.0, 2.0],
        ];
        let x = solve_linear_system(&a, &[8.0, -11.0, -3.0]).unwrap();
        assert_slices_eq(&x, &[2.0, 3.0, -1.0]);
    }

    #[test]
    fn test_solve_needs_row_swap() {
        let a = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let x = solve_linear_system(&a, &[3.0, 4.0]).unwrap();
        assert_slices_eq(&x, &[4.0, 3.0]);
    }

    #[test]
    fn test_singular_matrix() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert_eq!(
            solve_linear_system(&a, &[1.0, 2.0]),
            Err(SolverError::SingularMatrix)
        );
        assert_eq!(
            solve_linear_system(&[vec![0.0]], &[0.0]),
            Err(SolverError::SingularMatrix)
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            solve_linear_system(&a, &[1.0, 2.0]),
            Err(SolverError::DimensionMismatch { .. })
        ));
        let a = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        assert!(matches!(
            solve_linear_system(&a, &[1.0]),
            Err(SolverError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_cholesky_round_trip() {
        let m = vec![
            vec![4.0, 12.0, -16.0],
            vec![12.0, 37.0, -43.0],
            vec![-16.0, -43.0, 98.0],
        ];
        let l = cholesky_factor(&m).unwrap();
        assert_slices_eq(&l[0], &[2.0, 0.0, 0.0]);
        assert_slices_eq(&l[1], &[6.0, 1.0, 0.0]);
        assert_slices_eq(&l[2], &[-8.0, 5.0, 3.0]);

        let rebuilt = mat_mul(&l, &transpose(&l));
        for (r, e) in rebuilt.iter().zip(&m) {
            assert_slices_eq(r, e);
        }

        let b = [1.0, 2.0, 3.0];
        let x = cholesky_solve(&l, &b).unwrap();
        assert_slices_eq(&mat_vec(&m, &x), &b);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let m = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        assert_eq!(cholesky_factor(&m), Err(SolverError::NotPositiveDefinite));
        // Positive semidefinite but singular.
        let m = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
        assert_eq!(cholesky_factor(&m), Err(SolverError::NotPositiveDefinite));
    }

    #[test]
    fn test_products_and_norms() {
        let a = vec![vec![1.0, -2.0], vec![3.0, 4.0]];
        assert_slices_eq(&mat_vec(&a, &[1.0, 1.0]), &[-1.0, 7.0]);
        assert_eq!(mat_mul(&a, &identity(2)), a);
        assert_eq!(transpose(&a), vec![vec![1.0, 3.0], vec![-2.0, 4.0]]);
        assert_abs_diff_eq!(norm_inf(&a), 7.0);
        assert_eq!(find_asymmetry(&a, 1e-9), Some((0, 1)));
        assert_eq!(find_asymmetry(&identity(3), 1e-9), None);
        assert!(is_symmetric(&identity(3), 0.0));
        assert!(!is_symmetric(&a, 1e-9));
        assert!(!is_symmetric(&[vec![1.0, 0.0]], 1e-9));
    }
}
