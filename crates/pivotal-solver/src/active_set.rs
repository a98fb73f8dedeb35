//! Dual active-set method for strictly convex quadratic programs.
//!
//! This follows Goldfarb and Idnani[^1]: start at the unconstrained minimizer,
//! repeatedly add the most violated constraint to the working set, and step in
//! primal and dual space at once. A constraint leaves the working set only when
//! its multiplier would turn negative. Dual feasibility holds after every step,
//! so the first primal feasible point is optimal.
//!
//! Step directions come from the KKT system of the current working set,
//!
//! ```text
//!     [ Q   N ] [ z ]   [ n+ ]
//!     [ N'  0 ] [ r ] = [ 0  ]
//! ```
//!
//! where `N` holds the working-set normals and `n+` is the normal being added:
//! `z` is the primal step and `-r` the dual step.
//!
//! [^1] D. Goldfarb and A. Idnani (1983). A numerically stable dual
//!     method for solving strictly convex quadratic programs.
//!     Mathematical Programming, 27, 1-33.

use tracing::{debug, trace, warn};

use crate::error::SolverError;
use crate::linalg::{
    Matrix, axpy, cholesky_factor, cholesky_solve, dot, norm_inf, solve_linear_system,
};
use crate::options::{DEFAULT_LP_ITERATIONS, SolveOptions};
use crate::quadratic::QpProblem;
use crate::solution::{Analysis, ShadowPrice, Solution, SolutionStatus};

/// Active-set solver for [`QpProblem`]
#[derive(Debug, Clone)]
pub struct ActiveSetSolver {
    /// Maximum working-set changes before giving up
    max_iterations: usize,
    /// Tolerance for floating point comparisons
    tolerance: f64,
}

/// A working-set member. Equalities violated from above enter with direction -1,
/// so every member reads `direction * a' x >= direction * b`.
#[derive(Debug, Clone, Copy)]
struct Active {
    index: usize,
    direction: f64,
}

enum Step {
    /// The added constraint became active
    Added,
    Infeasible,
    IterationLimit,
    Singular,
}

impl Default for ActiveSetSolver {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_LP_ITERATIONS,
            tolerance: 1e-9,
        }
    }
}

impl ActiveSetSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: &SolveOptions) -> Self {
        Self {
            max_iterations: options.lp_iterations(),
            tolerance: options.tolerance,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn solve(&self, problem: &QpProblem) -> Result<Solution, SolverError> {
        problem.validate()?;
        let factor = cholesky_factor(&problem.q)?;

        let (rows, rhs) = problem.constraint_rows();
        let meq = problem.meq();
        let norms: Vec<f64> = rows.iter().map(|a| dot(a, a).sqrt()).collect();

        debug!(
            component = "active_set",
            operation = "solve",
            status = "start",
            variables = problem.num_variables() as u64,
            equalities = meq as u64,
            inequalities = (rows.len() - meq) as u64,
            "Solving quadratic program"
        );

        // Rows with no coefficients cannot be fixed by moving x.
        for (i, (&norm, &b)) in norms.iter().zip(&rhs).enumerate() {
            let violated = if i < meq {
                b.abs() > self.feasibility_tolerance(b)
            } else {
                b > self.feasibility_tolerance(b)
            };
            if norm == 0.0 && violated {
                debug!(component = "active_set", constraint = i, "Empty constraint row is violated");
                return Ok(Solution::infeasible(0));
            }
        }

        // Unconstrained minimizer: Q x = -c
        let neg_c: Vec<f64> = problem.c.iter().map(|v| -v).collect();
        let mut x = cholesky_solve(&factor, &neg_c)?;

        let mut active: Vec<Active> = Vec::new();
        let mut multipliers: Vec<f64> = Vec::new();
        let mut iterations = 0;

        loop {
            let Some((add, direction)) = self.most_violated(&rows, &rhs, &norms, meq, &x, &active) else {
                break;
            };
            trace!(
                component = "active_set",
                constraint = add,
                direction,
                active = active.len() as u64,
                "Adding violated constraint"
            );

            let step = self.add_constraint(
                problem,
                &rows,
                &rhs,
                meq,
                Active { index: add, direction },
                &mut x,
                &mut active,
                &mut multipliers,
                &mut iterations,
            );

            match step {
                Step::Added => {}
                Step::Infeasible => {
                    debug!(
                        component = "active_set",
                        status = "infeasible",
                        constraint = add,
                        iterations = iterations as u64,
                        "No step can satisfy the constraint"
                    );
                    return Ok(Solution::infeasible(iterations));
                }
                Step::IterationLimit => {
                    warn!(
                        component = "active_set",
                        iterations = iterations as u64,
                        "Iteration limit reached"
                    );
                    return Ok(Solution::iteration_limit(iterations));
                }
                Step::Singular => {
                    warn!(
                        component = "active_set",
                        iterations = iterations as u64,
                        "Singular KKT system; Q is not positive definite on the working set"
                    );
                    return Ok(Solution::unbounded(iterations));
                }
            }
        }

        let objective_value = problem.objective(&x);
        debug!(
            component = "active_set",
            operation = "solve",
            status = "optimal",
            iterations = iterations as u64,
            active = active.len() as u64,
            objective = objective_value,
            "Quadratic program solved"
        );

        let analysis = self.analyze(problem, &active, &multipliers);
        Ok(Solution {
            status: SolutionStatus::Optimal,
            values: x,
            objective_value,
            iterations,
            nodes: 0,
            analysis,
        })
    }

    fn feasibility_tolerance(&self, rhs: f64) -> f64 {
        self.tolerance * (1.0 + rhs.abs())
    }

    /// Largest violation scaled by the row norm, smallest index on ties.
    /// Returns the constraint index and the direction it enters with.
    fn most_violated(
        &self,
        rows: &[&[f64]],
        rhs: &[f64],
        norms: &[f64],
        meq: usize,
        x: &[f64],
        active: &[Active],
    ) -> Option<(usize, f64)> {
        let mut best = None;
        let mut max_violation = 0.0;

        for (i, (a, &b)) in rows.iter().zip(rhs).enumerate() {
            if norms[i] == 0.0 || active.iter().any(|act| act.index == i) {
                continue;
            }
            let slack = dot(a, x) - b;
            let tol = self.feasibility_tolerance(b);
            let (violation, direction) = if slack < -tol {
                (-slack / norms[i], 1.0)
            } else if i < meq && slack > tol {
                (slack / norms[i], -1.0)
            } else {
                continue;
            };
            if violation > max_violation {
                max_violation = violation;
                best = Some((i, direction));
            }
        }
        best
    }

    /// Bring constraint `add` into the working set, dropping members whose
    /// multipliers reach zero along the way.
    #[allow(clippy::too_many_arguments)]
    fn add_constraint(
        &self,
        problem: &QpProblem,
        rows: &[&[f64]],
        rhs: &[f64],
        meq: usize,
        add: Active,
        x: &mut Vec<f64>,
        active: &mut Vec<Active>,
        multipliers: &mut Vec<f64>,
        iterations: &mut usize,
    ) -> Step {
        let normal: Vec<f64> = rows[add.index].iter().map(|v| add.direction * v).collect();
        let target = add.direction * rhs[add.index];
        let q_norm = norm_inf(&problem.q).max(f64::MIN_POSITIVE);
        let mut added_multiplier = 0.0;

        loop {
            if *iterations >= self.max_iterations {
                return Step::IterationLimit;
            }

            let active_normals: Vec<Vec<f64>> = active
                .iter()
                .map(|act| rows[act.index].iter().map(|v| act.direction * v).collect())
                .collect();
            let Ok((z, r)) = kkt_step(&problem.q, &active_normals, &normal) else {
                return Step::Singular;
            };

            // Dual step length: first inequality multiplier to hit zero.
            let mut drop: Option<usize> = None;
            let mut t1 = f64::INFINITY;
            for (pos, (act, (&u, &rj))) in active.iter().zip(multipliers.iter().zip(&r)).enumerate() {
                if act.index >= meq && rj > self.tolerance {
                    let t = u / rj;
                    if t < t1 {
                        t1 = t;
                        drop = Some(pos);
                    }
                }
            }

            // Primal step length: distance to the added constraint's boundary.
            let slack = dot(&normal, x) - target;
            // z'n+ scales like |n+|^2 / |Q|, so the zero test is relative to that.
            let curvature = dot(&z, &normal);
            let t2 = if curvature <= self.tolerance * dot(&normal, &normal) / q_norm {
                f64::INFINITY
            } else {
                -slack / curvature
            };

            if t1.is_infinite() && t2.is_infinite() {
                return Step::Infeasible;
            }

            let step = t1.min(t2);
            if t2.is_finite() {
                axpy(step, &z, x);
            }
            for (u, rj) in multipliers.iter_mut().zip(&r) {
                *u -= step * rj;
            }
            added_multiplier += step;
            *iterations += 1;

            if t2 <= t1 {
                trace!(component = "active_set", constraint = add.index, step, "Full step");
                active.push(add);
                multipliers.push(added_multiplier);
                return Step::Added;
            }

            // Partial step: `drop` is set whenever t1 is finite.
            let Some(pos) = drop else {
                return Step::Infeasible;
            };
            trace!(
                component = "active_set",
                constraint = active[pos].index,
                step,
                "Dropping constraint"
            );
            active.remove(pos);
            multipliers.remove(pos);
        }
    }

    fn analyze(&self, problem: &QpProblem, active: &[Active], multipliers: &[f64]) -> Analysis {
        let mut prices = vec![0.0; problem.num_constraints()];
        for (act, &u) in active.iter().zip(multipliers) {
            prices[act.index] = act.direction * u;
        }

        let shadow_prices = prices
            .into_iter()
            .enumerate()
            .map(|(i, value)| ShadowPrice {
                constraint: problem.constraint_name(i),
                value,
            })
            .collect();

        let mut binding: Vec<usize> = active.iter().map(|act| act.index).collect();
        binding.sort_unstable();

        Analysis {
            shadow_prices,
            reduced_costs: Vec::new(),
            binding_constraints: binding.into_iter().map(|i| problem.constraint_name(i)).collect(),
        }
    }
}

/// Solve the working-set KKT system for the primal step `z` and dual step `r`.
fn kkt_step(q: &Matrix, normals: &[Vec<f64>], added: &[f64]) -> Result<(Vec<f64>, Vec<f64>), SolverError> {
    let n = q.len();
    let k = normals.len();
    let mut kkt = vec![vec![0.0; n + k]; n + k];
    for (i, row) in q.iter().enumerate() {
        kkt[i][..n].copy_from_slice(row);
    }
    for (col, normal) in normals.iter().enumerate() {
        for (i, &v) in normal.iter().enumerate() {
            kkt[i][n + col] = v;
            kkt[n + col][i] = v;
        }
    }

    let mut rhs = added.to_vec();
    rhs.resize(n + k, 0.0);

    let mut solution = solve_linear_system(&kkt, &rhs)?;
    let r = solution.split_off(n);
    Ok((solution, r))
}
