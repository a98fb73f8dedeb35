use tracing::{debug, trace, warn};

use crate::error::SolverError;
use crate::linalg::axpy;
use crate::options::{DEFAULT_LP_ITERATIONS, PivotRule, SolveOptions};
use crate::problem::{ConstraintOp, LpProblem};
use crate::solution::{Analysis, ReducedCost, ShadowPrice, Solution, SolutionStatus};

/// Consecutive degenerate pivots tolerated under Dantzig pricing before the
/// solver switches to Bland's rule for the rest of the phase.
const DEGENERATE_PIVOT_LIMIT: usize = 50;

/// Relative slack below which a constraint is reported as binding.
const BINDING_TOLERANCE: f64 = 1e-7;

/// Two-phase tableau simplex solver for linear programming problems
#[derive(Debug, Clone)]
pub struct Solver {
    /// Maximum pivots before giving up
    max_iterations: usize,
    /// Tolerance for floating point comparisons
    tolerance: f64,
    pivot_rule: PivotRule,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_LP_ITERATIONS,
            tolerance: 1e-9,
            pivot_rule: PivotRule::Dantzig,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: &SolveOptions) -> Self {
        Self {
            max_iterations: options.lp_iterations(),
            tolerance: options.tolerance,
            pivot_rule: options.pivot_rule,
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

    pub fn with_pivot_rule(mut self, rule: PivotRule) -> Self {
        self.pivot_rule = rule;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Solve the continuous relaxation of `problem` with the two-phase simplex
    /// method. Integrality flags are ignored.
    pub fn solve(&self, problem: &LpProblem) -> Result<Solution, SolverError> {
        problem.validate()?;
        let bounds: Vec<(f64, f64)> = problem
            .variables
            .iter()
            .map(|v| v.effective_bounds())
            .collect();
        Ok(self.solve_with_bounds(problem, &bounds))
    }

    /// Solve `problem` with its variable bounds replaced by `bounds`.
    /// The problem must already be validated.
    pub(crate) fn solve_with_bounds(&self, problem: &LpProblem, bounds: &[(f64, f64)]) -> Solution {
        debug!(
            component = "simplex",
            operation = "solve",
            status = "start",
            variables = problem.num_variables() as u64,
            constraints = problem.num_constraints() as u64,
            "Solving linear program"
        );

        let sign = problem.objective.sense.sign();

        if let Some((lower, upper)) = bounds.iter().find(|(l, u)| *l > *u + self.tolerance) {
            debug!(
                component = "simplex",
                operation = "solve",
                status = "infeasible",
                lower = *lower,
                upper = *upper,
                "Crossed variable bounds"
            );
            return with_sense(Solution::infeasible(0), sign);
        }

        let mut tableau = self.build_tableau(problem, bounds);
        let mut iterations = 0;

        // Phase 1: Find initial basic feasible solution
        if tableau.n_artificial > 0 {
            match self.phase1(&mut tableau, &mut iterations) {
                SimplexResult::Optimal => {}
                SimplexResult::Infeasible | SimplexResult::Unbounded => {
                    debug!(
                        component = "simplex",
                        operation = "phase1",
                        status = "infeasible",
                        iterations = iterations as u64,
                        "No feasible basis"
                    );
                    return with_sense(Solution::infeasible(iterations), sign);
                }
                SimplexResult::IterationLimit => {
                    return with_sense(Solution::iteration_limit(iterations), sign);
                }
            }
        }

        // Phase 2: Optimize
        match self.phase2(&mut tableau, &mut iterations) {
            SimplexResult::Optimal => {}
            SimplexResult::Unbounded => {
                debug!(
                    component = "simplex",
                    operation = "phase2",
                    status = "unbounded",
                    iterations = iterations as u64,
                    "Objective is unbounded"
                );
                return with_sense(Solution::unbounded(iterations), sign);
            }
            SimplexResult::Infeasible => return with_sense(Solution::infeasible(iterations), sign),
            SimplexResult::IterationLimit => {
                return with_sense(Solution::iteration_limit(iterations), sign);
            }
        }

        let solution = self.extract_solution(&tableau, problem, iterations);
        debug!(
            component = "simplex",
            operation = "solve",
            status = "optimal",
            iterations = iterations as u64,
            objective = solution.objective_value,
            "Linear program solved"
        );
        solution
    }

    fn build_tableau(&self, problem: &LpProblem, bounds: &[(f64, f64)]) -> Tableau {
        // Map every variable onto non-negative structural columns.
        let mut columns = Vec::with_capacity(bounds.len());
        let mut n_struct = 0;
        for &(lower, upper) in bounds {
            let map = if lower.is_finite() {
                ColumnMap::Shifted { col: n_struct, lower }
            } else if upper.is_finite() {
                ColumnMap::Reflected { col: n_struct, upper }
            } else {
                n_struct += 1;
                ColumnMap::Free {
                    pos: n_struct - 1,
                    neg: n_struct,
                }
            };
            n_struct += 1;
            columns.push(map);
        }

        // Constraint rows, then one row per finite upper bound of a shifted column.
        let mut rows: Vec<(Vec<f64>, ConstraintOp, f64)> = Vec::new();
        for c in &problem.constraints {
            let mut coefs = vec![0.0; n_struct];
            let mut rhs = c.rhs;
            for (&a, map) in c.coefficients.iter().zip(&columns) {
                rhs -= map.substitute(a, &mut coefs);
            }
            rows.push((coefs, c.op, rhs));
        }
        for (map, &(_, upper)) in columns.iter().zip(bounds) {
            if let ColumnMap::Shifted { col, lower } = *map {
                if upper.is_finite() {
                    let mut coefs = vec![0.0; n_struct];
                    coefs[col] = 1.0;
                    rows.push((coefs, ConstraintOp::Le, upper - lower));
                }
            }
        }

        // Make every RHS non-negative. `>= 0` rows are flipped too so they get a
        // slack instead of an artificial.
        let mut row_info = Vec::with_capacity(rows.len());
        let mut n_slack = 0;
        let mut n_artificial = 0;
        for (coefs, op, rhs) in &mut rows {
            let flip = *rhs < 0.0 || (*rhs == 0.0 && *op == ConstraintOp::Ge);
            if flip {
                coefs.iter_mut().for_each(|a| *a = -*a);
                *rhs = -*rhs;
                *op = match *op {
                    ConstraintOp::Le => ConstraintOp::Ge,
                    ConstraintOp::Ge => ConstraintOp::Le,
                    ConstraintOp::Eq => ConstraintOp::Eq,
                };
            }
            match op {
                ConstraintOp::Le => n_slack += 1,
                ConstraintOp::Ge => {
                    n_slack += 1; // surplus
                    n_artificial += 1;
                }
                ConstraintOp::Eq => n_artificial += 1,
            }
            row_info.push(RowInfo {
                flip: if flip { -1.0 } else { 1.0 },
                dual_col: 0,
            });
        }

        let n_rows = rows.len();
        let total_cols = n_struct + n_slack + n_artificial + 1; // +1 for RHS
        let mut tableau = Tableau {
            data: vec![vec![0.0; total_cols]; n_rows + 1],
            basic_vars: vec![0; n_rows],
            n_struct,
            n_slack,
            n_artificial,
            n_constraints: problem.num_constraints(),
            columns,
            rows: row_info,
            scale: 1.0 + rows.iter().map(|(_, _, rhs)| rhs.abs()).fold(0.0, f64::max),
        };

        let rhs_col = total_cols - 1;
        let mut slack_idx = n_struct;
        let mut artificial_idx = n_struct + n_slack;
        for (i, (coefs, op, rhs)) in rows.into_iter().enumerate() {
            tableau.data[i][..n_struct].copy_from_slice(&coefs);
            tableau.data[i][rhs_col] = rhs;

            match op {
                ConstraintOp::Le => {
                    tableau.data[i][slack_idx] = 1.0;
                    tableau.basic_vars[i] = slack_idx;
                    tableau.rows[i].dual_col = slack_idx;
                    slack_idx += 1;
                }
                ConstraintOp::Ge => {
                    tableau.data[i][slack_idx] = -1.0; // surplus
                    slack_idx += 1;
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    tableau.rows[i].dual_col = artificial_idx;
                    artificial_idx += 1;
                }
                ConstraintOp::Eq => {
                    tableau.data[i][artificial_idx] = 1.0;
                    tableau.basic_vars[i] = artificial_idx;
                    tableau.rows[i].dual_col = artificial_idx;
                    artificial_idx += 1;
                }
            }
        }

        // Objective row (last row) holds the negated reduced costs of the
        // internal minimization; a positive entry marks an improving column.
        let sign = problem.objective.sense.sign();
        let mut cost = vec![0.0; n_struct];
        for (&c, map) in problem.objective.coefficients.iter().zip(&tableau.columns) {
            map.substitute(sign * c, &mut cost);
        }
        for (entry, c) in tableau.data[n_rows].iter_mut().zip(&cost) {
            *entry = -c;
        }

        tableau
    }

    fn phase1(&self, tableau: &mut Tableau, iterations: &mut usize) -> SimplexResult {
        // Auxiliary objective: minimize the sum of artificial variables
        let n_rows = tableau.data.len() - 1;
        let n_cols = tableau.data[0].len();
        let art_start = tableau.art_start();

        let orig_obj = std::mem::replace(&mut tableau.data[n_rows], vec![0.0; n_cols]);
        {
            let (rows, obj) = tableau.data.split_at_mut(n_rows);
            let obj = &mut obj[0];
            for entry in &mut obj[art_start..art_start + tableau.n_artificial] {
                *entry = -1.0;
            }
            // Price out the basic artificials
            for (row, &basic) in rows.iter().zip(&tableau.basic_vars) {
                if basic >= art_start {
                    axpy(1.0, row, obj);
                }
            }
        }

        match self.iterate(tableau, iterations, "phase1") {
            SimplexResult::Optimal => {}
            SimplexResult::IterationLimit => return SimplexResult::IterationLimit,
            SimplexResult::Unbounded | SimplexResult::Infeasible => {
                warn!(
                    component = "simplex",
                    operation = "phase1",
                    "Auxiliary problem reported unbounded; treating as infeasible"
                );
                return SimplexResult::Infeasible;
            }
        }

        // Check if all artificials are zero
        let rhs_col = n_cols - 1;
        let residual: f64 = (0..n_rows)
            .filter(|&i| tableau.basic_vars[i] >= art_start)
            .map(|i| tableau.data[i][rhs_col].abs())
            .sum();
        if residual > self.tolerance * tableau.scale {
            trace!(component = "simplex", residual, "Artificial residual above tolerance");
            return SimplexResult::Infeasible;
        }

        self.drive_out_artificials(tableau, iterations);

        // Restore original objective and price out the basis
        tableau.data[n_rows] = orig_obj;
        let (rows, obj) = tableau.data.split_at_mut(n_rows);
        let obj = &mut obj[0];
        for (row, &basic) in rows.iter().zip(&tableau.basic_vars) {
            let ratio = obj[basic];
            if ratio != 0.0 {
                axpy(-ratio, row, obj);
            }
        }

        SimplexResult::Optimal
    }

    /// Pivot zero-level basic artificials out on any structural or slack column.
    /// A row with no such column is redundant and keeps its artificial at zero.
    fn drive_out_artificials(&self, tableau: &mut Tableau, iterations: &mut usize) {
        let art_start = tableau.art_start();
        for row in 0..tableau.basic_vars.len() {
            if tableau.basic_vars[row] < art_start {
                continue;
            }
            let entering = (0..art_start).find(|&j| tableau.data[row][j].abs() > self.tolerance);
            match entering {
                Some(col) => {
                    trace!(component = "simplex", row, col, "Driving artificial out of basis");
                    self.pivot(tableau, row, col);
                    *iterations += 1;
                }
                None => trace!(component = "simplex", row, "Redundant row"),
            }
        }
    }

    fn phase2(&self, tableau: &mut Tableau, iterations: &mut usize) -> SimplexResult {
        self.iterate(tableau, iterations, "phase2")
    }

    fn iterate(&self, tableau: &mut Tableau, iterations: &mut usize, phase: &'static str) -> SimplexResult {
        let mut rule = self.pivot_rule;
        let mut degenerate_run = 0;

        loop {
            let Some(pivot_col) = self.find_pivot_column(tableau, rule) else {
                return SimplexResult::Optimal;
            };
            let Some((pivot_row, ratio)) = self.find_pivot_row(tableau, pivot_col, rule) else {
                return SimplexResult::Unbounded;
            };
            if *iterations >= self.max_iterations {
                warn!(
                    component = "simplex",
                    phase,
                    iterations = *iterations as u64,
                    "Iteration limit reached"
                );
                return SimplexResult::IterationLimit;
            }

            if ratio <= self.tolerance {
                degenerate_run += 1;
                if rule == PivotRule::Dantzig && degenerate_run > DEGENERATE_PIVOT_LIMIT {
                    debug!(
                        component = "simplex",
                        phase,
                        iterations = *iterations as u64,
                        "Degenerate stall, switching to Bland's rule"
                    );
                    rule = PivotRule::Bland;
                }
            } else {
                degenerate_run = 0;
            }

            trace!(
                component = "simplex",
                phase,
                iteration = *iterations as u64,
                entering = pivot_col,
                leaving = tableau.basic_vars[pivot_row],
                ratio,
                "Pivot"
            );
            self.pivot(tableau, pivot_row, pivot_col);
            *iterations += 1;
        }
    }

    /// Entering column among structural and slack columns. Artificials never re-enter.
    fn find_pivot_column(&self, tableau: &Tableau, rule: PivotRule) -> Option<usize> {
        let obj_row = &tableau.data[tableau.data.len() - 1];
        let candidates = obj_row[..tableau.art_start()].iter().enumerate();

        match rule {
            PivotRule::Bland => candidates
                .filter(|(_, v)| **v > self.tolerance)
                .map(|(j, _)| j)
                .next(),
            PivotRule::Dantzig => {
                // Most positive entry, smallest index on ties
                let mut max_val = self.tolerance;
                let mut max_col = None;
                for (j, &v) in candidates {
                    if v > max_val {
                        max_val = v;
                        max_col = Some(j);
                    }
                }
                max_col
            }
        }
    }

    /// Minimum ratio test. Ties go to the smallest row index, or to the smallest
    /// basic variable index under Bland's rule.
    fn find_pivot_row(&self, tableau: &Tableau, col: usize, rule: PivotRule) -> Option<(usize, f64)> {
        let n_rows = tableau.data.len() - 1;
        let rhs_col = tableau.data[0].len() - 1;

        let mut min_ratio = f64::INFINITY;
        let mut min_row: Option<usize> = None;

        for i in 0..n_rows {
            let val = tableau.data[i][col];
            if val > self.tolerance {
                let ratio = tableau.data[i][rhs_col].max(0.0) / val;
                let better = match min_row {
                    None => true,
                    Some(best) => {
                        ratio < min_ratio
                            || (rule == PivotRule::Bland
                                && ratio == min_ratio
                                && tableau.basic_vars[i] < tableau.basic_vars[best])
                    }
                };
                if better {
                    min_ratio = ratio;
                    min_row = Some(i);
                }
            }
        }

        min_row.map(|row| (row, min_ratio))
    }

    fn pivot(&self, tableau: &mut Tableau, row: usize, col: usize) {
        let n_rows = tableau.data.len();
        let n_cols = tableau.data[0].len();

        // Update basic variable
        tableau.basic_vars[row] = col;

        // Scale pivot row
        let pivot_val = tableau.data[row][col];
        for j in 0..n_cols {
            tableau.data[row][j] /= pivot_val;
        }
        tableau.data[row][col] = 1.0;

        // Eliminate column in other rows
        for i in 0..n_rows {
            if i != row {
                let factor = tableau.data[i][col];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..n_cols {
                    tableau.data[i][j] -= factor * tableau.data[row][j];
                }
                tableau.data[i][col] = 0.0;
            }
        }
    }

    fn extract_solution(&self, tableau: &Tableau, problem: &LpProblem, iterations: usize) -> Solution {
        let rhs_col = tableau.data[0].len() - 1;

        let mut structural = vec![0.0; tableau.n_struct];
        for (i, &basic) in tableau.basic_vars.iter().enumerate() {
            if basic < tableau.n_struct {
                structural[basic] = tableau.data[i][rhs_col];
            }
        }

        let values: Vec<f64> = tableau.columns.iter().map(|map| map.recover(&structural)).collect();
        let objective_value = problem.evaluate(&values);
        let analysis = self.analyze(tableau, problem, &values);

        Solution {
            status: SolutionStatus::Optimal,
            values,
            objective_value,
            iterations,
            nodes: 0,
            analysis,
        }
    }

    fn analyze(&self, tableau: &Tableau, problem: &LpProblem, values: &[f64]) -> Analysis {
        let obj_row = &tableau.data[tableau.data.len() - 1];
        let sign = problem.objective.sense.sign();

        // Row duals of the internal minimization, mapped back through row flips
        // and the objective sense.
        let shadow_prices: Vec<ShadowPrice> = problem
            .constraints
            .iter()
            .zip(&tableau.rows[..tableau.n_constraints])
            .map(|(c, info)| ShadowPrice {
                constraint: c.name.clone(),
                value: sign * info.flip * obj_row[info.dual_col],
            })
            .collect();

        let reduced_costs = problem
            .variables
            .iter()
            .zip(&tableau.columns)
            .zip(values)
            .map(|((var, map), &value)| {
                let is_basic = map.cols().any(|col| tableau.basic_vars.contains(&col));
                let reduced_cost = if is_basic {
                    0.0
                } else {
                    match *map {
                        ColumnMap::Shifted { col, .. } => -sign * obj_row[col],
                        ColumnMap::Reflected { col, .. } => sign * obj_row[col],
                        ColumnMap::Free { pos, .. } => -sign * obj_row[pos],
                    }
                };
                ReducedCost {
                    variable: var.name.clone(),
                    value,
                    reduced_cost,
                    is_basic,
                }
            })
            .collect();

        let binding_constraints = problem
            .constraints
            .iter()
            .filter(|c| {
                let lhs: f64 = c.coefficients.iter().zip(values).map(|(a, x)| a * x).sum();
                (lhs - c.rhs).abs() <= BINDING_TOLERANCE * (1.0 + c.rhs.abs())
            })
            .map(|c| c.name.clone())
            .collect();

        Analysis {
            shadow_prices,
            reduced_costs,
            binding_constraints,
        }
    }
}

/// Report infinite objective values in the problem's own sense.
fn with_sense(mut solution: Solution, sign: f64) -> Solution {
    if solution.objective_value.is_infinite() {
        solution.objective_value *= sign;
    }
    solution
}

/// How an original variable is expressed through non-negative tableau columns.
#[derive(Debug, Clone, Copy)]
enum ColumnMap {
    /// x = lower + y
    Shifted { col: usize, lower: f64 },
    /// x = upper - y
    Reflected { col: usize, upper: f64 },
    /// x = y_pos - y_neg
    Free { pos: usize, neg: usize },
}

impl ColumnMap {
    /// Adds `a * x` to `coefs` in column terms and returns the constant part.
    fn substitute(&self, a: f64, coefs: &mut [f64]) -> f64 {
        match *self {
            ColumnMap::Shifted { col, lower } => {
                coefs[col] += a;
                a * lower
            }
            ColumnMap::Reflected { col, upper } => {
                coefs[col] -= a;
                a * upper
            }
            ColumnMap::Free { pos, neg } => {
                coefs[pos] += a;
                coefs[neg] -= a;
                0.0
            }
        }
    }

    fn recover(&self, structural: &[f64]) -> f64 {
        match *self {
            ColumnMap::Shifted { col, lower } => lower + structural[col],
            ColumnMap::Reflected { col, upper } => upper - structural[col],
            ColumnMap::Free { pos, neg } => structural[pos] - structural[neg],
        }
    }

    fn cols(&self) -> impl Iterator<Item = usize> {
        let (first, second) = match *self {
            ColumnMap::Shifted { col, .. } | ColumnMap::Reflected { col, .. } => (col, None),
            ColumnMap::Free { pos, neg } => (pos, Some(neg)),
        };
        std::iter::once(first).chain(second)
    }
}

#[derive(Debug, Clone, Copy)]
struct RowInfo {
    /// -1 when the row was negated to make its RHS non-negative
    flip: f64,
    /// Column with a +1 in this row only (slack or artificial); its objective
    /// row entry is the row dual
    dual_col: usize,
}

struct Tableau {
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    n_struct: usize,
    n_slack: usize,
    n_artificial: usize,
    /// Rows before this index come from problem constraints, the rest are bound rows
    n_constraints: usize,
    columns: Vec<ColumnMap>,
    rows: Vec<RowInfo>,
    /// 1 + largest RHS magnitude, used to scale feasibility tests
    scale: f64,
}

impl Tableau {
    fn art_start(&self) -> usize {
        self.n_struct + self.n_slack
    }
}

enum SimplexResult {
    Optimal,
    Unbounded,
    Infeasible,
    IterationLimit,
}
