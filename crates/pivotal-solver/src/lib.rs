//! Linear, mixed-integer and convex quadratic programming.
//!
//! ```
//! use pivotal_solver::{ConstraintOp, LpProblem, Sense, SolveOptions, solve_lp};
//!
//! let mut problem = LpProblem::new(vec!["x".into(), "y".into()]);
//! problem.set_objective(vec![3.0, 2.0], Sense::Maximize).unwrap();
//! problem.add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Le, 4.0).unwrap();
//! problem.add_constraint("x_max", vec![1.0, 0.0], ConstraintOp::Le, 3.0).unwrap();
//!
//! let solution = solve_lp(&problem, &SolveOptions::default()).unwrap();
//! assert!(solution.is_optimal());
//! assert!((solution.objective_value - 11.0).abs() < 1e-9);
//! ```

mod active_set;
mod branch;
mod error;
pub mod linalg;
mod options;
mod problem;
mod quadratic;
mod simplex;
mod solution;

pub use active_set::ActiveSetSolver;
pub use branch::BranchAndBound;
pub use error::SolverError;
pub use linalg::Matrix;
pub use options::{DEFAULT_LP_ITERATIONS, DEFAULT_MIP_NODES, PivotRule, SolveOptions};
pub use problem::{Constraint, ConstraintOp, LpProblem, Objective, Sense, VarKind, Variable};
pub use quadratic::QpProblem;
pub use simplex::Solver;
pub use solution::{Analysis, ConstraintViolation, ReducedCost, ShadowPrice, Solution, SolutionStatus};

/// Solve the continuous relaxation of `problem`; integrality flags are ignored.
pub fn solve_lp(problem: &LpProblem, options: &SolveOptions) -> Result<Solution, SolverError> {
    Solver::from_options(options).solve(problem)
}

/// Solve `problem` honoring integer and binary variables.
pub fn solve_mip(problem: &LpProblem, options: &SolveOptions) -> Result<Solution, SolverError> {
    BranchAndBound::from_options(options).solve(problem)
}

/// Minimize `1/2 x'Qx + c'x` subject to the problem's equalities and `>=` rows.
pub fn solve_qp(problem: &QpProblem, options: &SolveOptions) -> Result<Solution, SolverError> {
    ActiveSetSolver::from_options(options).solve(problem)
}
