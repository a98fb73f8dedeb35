use crate::error::SolverError;
use crate::linalg::{Matrix, dot, find_asymmetry, mat_vec};

/// Convex quadratic program
///
/// ```text
///     minimize     1/2 x' Q x + c' x
///     subject to   A_eq x  = b_eq
///                  A_ineq x >= b_ineq
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct QpProblem {
    /// Symmetric quadratic term, n x n
    pub q: Matrix,
    /// Linear term
    pub c: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub a_eq: Matrix,
    #[cfg_attr(feature = "serde", serde(default))]
    pub b_eq: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub a_ineq: Matrix,
    #[cfg_attr(feature = "serde", serde(default))]
    pub b_ineq: Vec<f64>,
}

impl QpProblem {
    pub fn new(q: Matrix, c: Vec<f64>) -> Self {
        Self {
            q,
            c,
            a_eq: Vec::new(),
            b_eq: Vec::new(),
            a_ineq: Vec::new(),
            b_ineq: Vec::new(),
        }
    }

    /// Builds a problem from stacked constraint rows where the first `meq` rows
    /// are equalities and the rest are `>=`.
    pub fn from_stacked(
        q: Matrix,
        c: Vec<f64>,
        a: Matrix,
        b: Vec<f64>,
        meq: usize,
    ) -> Result<Self, SolverError> {
        if a.len() != b.len() {
            return Err(SolverError::dimension("constraint rhs", a.len(), b.len()));
        }
        if meq > a.len() {
            return Err(SolverError::dimension("equality count", a.len(), meq));
        }
        let mut a = a;
        let mut b = b;
        let a_ineq = a.split_off(meq);
        let b_ineq = b.split_off(meq);
        let problem = Self {
            q,
            c,
            a_eq: a,
            b_eq: b,
            a_ineq,
            b_ineq,
        };
        problem.validate()?;
        Ok(problem)
    }

    pub fn num_variables(&self) -> usize {
        self.c.len()
    }

    /// Number of leading equality rows in [`QpProblem::constraint_rows`].
    pub fn meq(&self) -> usize {
        self.a_eq.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.a_eq.len() + self.a_ineq.len()
    }

    pub fn add_equality(&mut self, coefficients: Vec<f64>, rhs: f64) -> Result<(), SolverError> {
        self.check_row("equality row", &coefficients)?;
        self.a_eq.push(coefficients);
        self.b_eq.push(rhs);
        Ok(())
    }

    /// Adds `coefficients' x >= rhs`.
    pub fn add_inequality(&mut self, coefficients: Vec<f64>, rhs: f64) -> Result<(), SolverError> {
        self.check_row("inequality row", &coefficients)?;
        self.a_ineq.push(coefficients);
        self.b_ineq.push(rhs);
        Ok(())
    }

    pub fn add_lower_bound(&mut self, index: usize, value: f64) -> Result<(), SolverError> {
        let row = self.unit_row(index, 1.0)?;
        self.add_inequality(row, value)
    }

    pub fn add_upper_bound(&mut self, index: usize, value: f64) -> Result<(), SolverError> {
        let row = self.unit_row(index, -1.0)?;
        self.add_inequality(row, -value)
    }

    /// Equalities followed by inequalities.
    pub fn constraint_rows(&self) -> (Vec<&[f64]>, Vec<f64>) {
        let rows = self
            .a_eq
            .iter()
            .chain(&self.a_ineq)
            .map(Vec::as_slice)
            .collect();
        let rhs = self.b_eq.iter().chain(&self.b_ineq).copied().collect();
        (rows, rhs)
    }

    /// Name used for constraint `index` of [`QpProblem::constraint_rows`].
    pub fn constraint_name(&self, index: usize) -> String {
        if index < self.meq() {
            format!("eq{}", index)
        } else {
            format!("ineq{}", index - self.meq())
        }
    }

    pub fn objective(&self, x: &[f64]) -> f64 {
        0.5 * dot(x, &mat_vec(&self.q, x)) + dot(&self.c, x)
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        let n = self.num_variables();
        if self.q.len() != n {
            return Err(SolverError::dimension("quadratic term rows", n, self.q.len()));
        }
        for row in &self.q {
            if row.len() != n {
                return Err(SolverError::dimension("quadratic term columns", n, row.len()));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(SolverError::non_finite("quadratic term"));
            }
        }
        if self.c.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::non_finite("linear term"));
        }

        let magnitude = self
            .q
            .iter()
            .flatten()
            .map(|v| v.abs())
            .fold(0.0, f64::max);
        if let Some((row, col)) = find_asymmetry(&self.q, 1e-9 * (1.0 + magnitude)) {
            return Err(SolverError::AsymmetricMatrix { row, col });
        }

        for (context, a, b) in [
            ("equality", &self.a_eq, &self.b_eq),
            ("inequality", &self.a_ineq, &self.b_ineq),
        ] {
            if a.len() != b.len() {
                return Err(SolverError::dimension(format!("{} rhs", context), a.len(), b.len()));
            }
            for row in a {
                self.check_row(context, row)?;
            }
            if b.iter().any(|v| !v.is_finite()) {
                return Err(SolverError::non_finite(format!("{} rhs", context)));
            }
        }
        Ok(())
    }

    fn check_row(&self, context: &str, row: &[f64]) -> Result<(), SolverError> {
        if row.len() != self.num_variables() {
            return Err(SolverError::dimension(context, self.num_variables(), row.len()));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::non_finite(context));
        }
        Ok(())
    }

    fn unit_row(&self, index: usize, value: f64) -> Result<Vec<f64>, SolverError> {
        let n = self.num_variables();
        if index >= n {
            return Err(SolverError::dimension("variable index", n, index));
        }
        let mut row = vec![0.0; n];
        row[index] = value;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::identity;

    #[test]
    fn test_from_stacked_splits_rows() {
        let problem = QpProblem::from_stacked(
            identity(2),
            vec![0.0, 0.0],
            vec![vec![1.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![1.0, 0.0, 0.0],
            1,
        )
        .unwrap();
        assert_eq!(problem.meq(), 1);
        assert_eq!(problem.a_ineq.len(), 2);
        assert_eq!(problem.constraint_name(0), "eq0");
        assert_eq!(problem.constraint_name(2), "ineq1");

        let (rows, rhs) = problem.constraint_rows();
        assert_eq!(rows[0], &[1.0, 1.0][..]);
        assert_eq!(rhs, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_validate_rejects_asymmetry() {
        let problem = QpProblem::new(vec![vec![2.0, 1.0], vec![0.0, 2.0]], vec![0.0, 0.0]);
        assert_eq!(
            problem.validate(),
            Err(SolverError::AsymmetricMatrix { row: 0, col: 1 })
        );
    }

    #[test]
    fn test_validate_rejects_bad_shapes() {
        let problem = QpProblem::new(identity(3), vec![0.0, 0.0]);
        assert!(matches!(
            problem.validate(),
            Err(SolverError::DimensionMismatch { .. })
        ));

        let mut problem = QpProblem::new(identity(2), vec![0.0, 0.0]);
        assert!(problem.add_inequality(vec![1.0], 0.0).is_err());
        assert!(problem.add_upper_bound(2, 1.0).is_err());
        problem.b_eq.push(1.0);
        assert!(problem.validate().is_err());
    }

    #[test]
    fn test_bounds_and_objective() {
        let mut problem = QpProblem::new(identity(2), vec![1.0, -1.0]);
        problem.add_lower_bound(0, 0.5).unwrap();
        problem.add_upper_bound(1, 2.0).unwrap();
        assert_eq!(problem.a_ineq, vec![vec![1.0, 0.0], vec![0.0, -1.0]]);
        assert_eq!(problem.b_ineq, vec![0.5, -2.0]);
        // 1/2 (1 + 4) + 1 - 2
        assert_eq!(problem.objective(&[1.0, 2.0]), 1.5);
    }
}
