//! Depth-first branch-and-bound over simplex relaxations.

use tracing::{debug, trace, warn};

use crate::error::SolverError;
use crate::options::{DEFAULT_MIP_NODES, SolveOptions};
use crate::problem::LpProblem;
use crate::simplex::Solver;
use crate::solution::{Analysis, Solution, SolutionStatus};

/// Branch-and-bound driver for problems with integer or binary variables
#[derive(Debug, Clone)]
pub struct BranchAndBound {
    /// Maximum nodes to explore before giving up
    max_nodes: usize,
    integrality_tolerance: f64,
    /// Relaxation solver
    lp: Solver,
}

/// A subproblem: the shared model with tightened variable bounds.
struct BranchNode<'a> {
    problem: &'a LpProblem,
    bounds: Vec<(f64, f64)>,
    /// Relaxation objective of the parent, in minimization sense
    bound: f64,
    depth: usize,
}

struct Incumbent {
    values: Vec<f64>,
    /// Minimization-sense objective
    objective: f64,
}

impl Default for BranchAndBound {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MIP_NODES,
            integrality_tolerance: 1e-6,
            lp: Solver::new(),
        }
    }
}

impl BranchAndBound {
    pub fn new() -> Self {
        Self::default()
    }

    /// The iteration limit in `options` caps nodes; each relaxation keeps the
    /// default pivot cap.
    pub fn from_options(options: &SolveOptions) -> Self {
        Self {
            max_nodes: options.mip_nodes(),
            integrality_tolerance: options.integrality_tolerance,
            lp: Solver::new()
                .with_tolerance(options.tolerance)
                .with_pivot_rule(options.pivot_rule),
        }
    }

    pub fn with_max_nodes(mut self, max: usize) -> Self {
        self.max_nodes = max;
        self
    }

    /// Tolerance of the relaxation solver, also used for pruning.
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.lp = self.lp.with_tolerance(tol);
        self
    }

    pub fn with_integrality_tolerance(mut self, tol: f64) -> Self {
        self.integrality_tolerance = tol;
        self
    }

    pub fn with_lp_solver(mut self, lp: Solver) -> Self {
        self.lp = lp;
        self
    }

    pub fn solve(&self, problem: &LpProblem) -> Result<Solution, SolverError> {
        problem.validate()?;

        let root_bounds: Vec<(f64, f64)> = problem
            .variables
            .iter()
            .map(|v| {
                let (lower, upper) = v.effective_bounds();
                if v.is_integral() {
                    (
                        (lower - self.integrality_tolerance).ceil(),
                        (upper + self.integrality_tolerance).floor(),
                    )
                } else {
                    (lower, upper)
                }
            })
            .collect();

        if !problem.has_integer_variables() {
            return Ok(self.lp.solve_with_bounds(problem, &root_bounds));
        }

        Ok(self.search(problem, root_bounds))
    }

    fn search(&self, problem: &LpProblem, root_bounds: Vec<(f64, f64)>) -> Solution {
        let sign = problem.objective.sense.sign();
        let mut stack = vec![BranchNode {
            problem,
            bounds: root_bounds,
            bound: f64::NEG_INFINITY,
            depth: 0,
        }];
        let mut incumbent: Option<Incumbent> = None;
        let mut nodes = 0;
        let mut iterations = 0;
        let mut complete = true;
        let mut node_limit_hit = false;

        debug!(
            component = "branch_and_bound",
            operation = "solve",
            status = "start",
            variables = problem.num_variables() as u64,
            integers = problem.variables.iter().filter(|v| v.is_integral()).count() as u64,
            "Starting branch-and-bound"
        );

        while let Some(node) = stack.pop() {
            if nodes >= self.max_nodes {
                warn!(
                    component = "branch_and_bound",
                    nodes = nodes as u64,
                    open = stack.len() as u64 + 1,
                    "Node limit reached"
                );
                complete = false;
                node_limit_hit = true;
                break;
            }
            nodes += 1;

            if let Some(best) = &incumbent {
                if self.prunes(node.bound, best.objective) {
                    continue;
                }
            }

            let relaxed = self.lp.solve_with_bounds(node.problem, &node.bounds);
            iterations += relaxed.iterations;

            match relaxed.status {
                SolutionStatus::Optimal => {}
                SolutionStatus::Infeasible => {
                    trace!(component = "branch_and_bound", depth = node.depth, "Infeasible node");
                    continue;
                }
                SolutionStatus::Unbounded => {
                    // Children only shrink the region, so this can only be the root.
                    debug!(
                        component = "branch_and_bound",
                        status = "unbounded",
                        "Relaxation is unbounded"
                    );
                    let mut solution = Solution::unbounded(iterations);
                    solution.objective_value *= sign;
                    solution.nodes = nodes;
                    return solution;
                }
                SolutionStatus::IterationLimitExceeded => {
                    warn!(
                        component = "branch_and_bound",
                        depth = node.depth,
                        "Relaxation hit its pivot limit; node dropped"
                    );
                    complete = false;
                    continue;
                }
            }

            let relaxation = sign * relaxed.objective_value;
            if let Some(best) = &incumbent {
                if self.prunes(relaxation, best.objective) {
                    trace!(
                        component = "branch_and_bound",
                        depth = node.depth,
                        relaxation,
                        incumbent = best.objective,
                        "Pruned by bound"
                    );
                    continue;
                }
            }

            let Some(branch_var) = self.select_branch_variable(problem, &relaxed.values) else {
                let values = self.polish(problem, relaxed.values);
                let objective = sign * problem.evaluate(&values);
                debug!(
                    component = "branch_and_bound",
                    depth = node.depth,
                    nodes = nodes as u64,
                    objective = sign * objective,
                    "New incumbent"
                );
                incumbent = Some(Incumbent { values, objective });
                continue;
            };

            let value = relaxed.values[branch_var];
            let floor = value.floor();
            let ceil = value.ceil();
            trace!(
                component = "branch_and_bound",
                depth = node.depth,
                variable = branch_var,
                value,
                relaxation,
                "Branching"
            );

            let mut down = node.bounds.clone();
            down[branch_var].1 = floor;
            let mut up = node.bounds;
            up[branch_var].0 = ceil;

            let down = BranchNode {
                problem,
                bounds: down,
                bound: relaxation,
                depth: node.depth + 1,
            };
            let up = BranchNode {
                problem,
                bounds: up,
                bound: relaxation,
                depth: node.depth + 1,
            };

            // The child on the nearer side of the fractional value is popped first.
            if value - floor > 0.5 {
                stack.push(down);
                stack.push(up);
            } else {
                stack.push(up);
                stack.push(down);
            }
        }

        let solution = match incumbent {
            Some(best) => Solution {
                status: if complete {
                    SolutionStatus::Optimal
                } else {
                    SolutionStatus::IterationLimitExceeded
                },
                objective_value: problem.evaluate(&best.values),
                values: best.values,
                iterations,
                nodes,
                analysis: Analysis::empty(),
            },
            // A dropped relaxation leaves feasibility unproven, but the node cap
            // without an incumbent is still reported as infeasible.
            None if !complete && !node_limit_hit => {
                let mut solution = Solution::iteration_limit(iterations);
                solution.objective_value *= sign;
                solution.nodes = nodes;
                solution
            }
            None => {
                let mut solution = Solution::infeasible(iterations);
                solution.objective_value *= sign;
                solution.nodes = nodes;
                solution
            }
        };

        debug!(
            component = "branch_and_bound",
            operation = "solve",
            status = ?solution.status,
            nodes = nodes as u64,
            iterations = iterations as u64,
            "Branch-and-bound finished"
        );
        solution
    }

    /// Minimization sense: a node cannot improve on the incumbent when its bound
    /// is at least the incumbent objective.
    fn prunes(&self, bound: f64, incumbent: f64) -> bool {
        bound >= incumbent - self.lp.tolerance() * (1.0 + incumbent.abs())
    }

    /// Most fractional integer variable, smallest index on ties.
    fn select_branch_variable(&self, problem: &LpProblem, values: &[f64]) -> Option<usize> {
        let mut best = None;
        let mut best_fraction = self.integrality_tolerance;
        for (j, (var, &x)) in problem.variables.iter().zip(values).enumerate() {
            if !var.is_integral() {
                continue;
            }
            let fraction = (x - x.floor()).min(x.ceil() - x);
            if fraction > best_fraction {
                best_fraction = fraction;
                best = Some(j);
            }
        }
        best
    }

    /// Snap integer components to whole numbers unless that breaks a constraint.
    fn polish(&self, problem: &LpProblem, values: Vec<f64>) -> Vec<f64> {
        let rounded: Vec<f64> = problem
            .variables
            .iter()
            .zip(&values)
            .map(|(v, &x)| if v.is_integral() { x.round() } else { x })
            .collect();
        let scale = 1.0
            + problem
                .constraints
                .iter()
                .map(|c| c.rhs.abs())
                .fold(0.0, f64::max);
        if problem
            .violations(&rounded, self.integrality_tolerance * scale)
            .is_empty()
        {
            rounded
        } else {
            values
        }
    }
}
