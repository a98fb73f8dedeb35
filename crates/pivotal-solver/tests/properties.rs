//! Property-based checks of optimality on randomly generated models.

use pivotal_solver::linalg::{axpy, dot, identity, mat_mul, mat_vec, transpose};
use pivotal_solver::{
    ConstraintOp, LpProblem, PivotRule, QpProblem, Sense, SolutionStatus, SolveOptions, Variable,
    solve_lp, solve_mip, solve_qp,
};
use proptest::collection::vec;
use proptest::prelude::*;

/// `max/min c'x` subject to `A x <= b` with `A >= 0`, `b > 0` and `0 <= x <= u`:
/// the origin is feasible and the box keeps it bounded.
#[derive(Debug, Clone)]
struct BoxedLp {
    a: Vec<Vec<f64>>,
    b: Vec<f64>,
    upper: Vec<f64>,
    c: Vec<f64>,
    maximize: bool,
    /// Fractions of `upper` used to sample points in the box
    samples: Vec<Vec<f64>>,
}

impl BoxedLp {
    fn problem(&self) -> LpProblem {
        let variables = self
            .upper
            .iter()
            .enumerate()
            .map(|(i, &u)| Variable {
                upper: u,
                ..Variable::continuous(format!("x{}", i))
            })
            .collect();
        let mut problem = LpProblem::with_variables(variables);
        let sense = if self.maximize { Sense::Maximize } else { Sense::Minimize };
        problem.set_objective(self.c.clone(), sense).unwrap();
        for (i, (row, &rhs)) in self.a.iter().zip(&self.b).enumerate() {
            problem
                .add_constraint(format!("row{}", i), row.clone(), ConstraintOp::Le, rhs)
                .unwrap();
        }
        problem
    }
}

fn boxed_lp() -> impl Strategy<Value = BoxedLp> {
    (2usize..6, 1usize..5, any::<bool>()).prop_flat_map(|(n, m, maximize)| {
        (
            vec(vec(0.0..5.0f64, n), m),
            vec(1.0..20.0f64, m),
            vec(1.0..10.0f64, n),
            vec(-5.0..5.0f64, n),
            vec(vec(0.0..1.0f64, n), 32),
        )
            .prop_map(move |(a, b, upper, c, samples)| BoxedLp {
                a,
                b,
                upper,
                c,
                maximize,
                samples,
            })
    })
}

/// Mixed `<=`, `>=` and `=` rows built to hold at an interior point `x0` of
/// the box `[-u, u]`. Some variables enter with one-sided or no bounds and
/// get the missing sides back as explicit rows.
#[derive(Debug, Clone)]
struct MixedLp {
    problem: LpProblem,
    x0: Vec<f64>,
}

fn mixed_lp() -> impl Strategy<Value = MixedLp> {
    (2usize..6, 1usize..6, any::<bool>()).prop_flat_map(|(n, m, maximize)| {
        (
            vec(1.0..10.0f64, n),
            vec(-0.9..0.9f64, n),
            vec(0u8..3, n),
            vec((vec(-5.0..5.0f64, n), 0u8..3, 0.0..3.0f64), m),
            vec(-5.0..5.0f64, n),
        )
            .prop_map(move |(upper, fractions, bound_modes, rows, c)| {
                let x0: Vec<f64> = fractions.iter().zip(&upper).map(|(f, u)| f * u).collect();
                let variables = upper
                    .iter()
                    .zip(&bound_modes)
                    .enumerate()
                    .map(|(i, (&u, mode))| {
                        let (lower, upper) = match mode {
                            0 => (-u, u),
                            1 => (f64::NEG_INFINITY, u),
                            _ => (f64::NEG_INFINITY, f64::INFINITY),
                        };
                        Variable {
                            lower,
                            upper,
                            ..Variable::continuous(format!("x{}", i))
                        }
                    })
                    .collect();
                let mut problem = LpProblem::with_variables(variables);
                let sense = if maximize { Sense::Maximize } else { Sense::Minimize };
                problem.set_objective(c, sense).unwrap();

                for (i, (row, op, slack)) in rows.into_iter().enumerate() {
                    let at_x0 = dot(&row, &x0);
                    let (op, rhs) = match op {
                        0 => (ConstraintOp::Le, at_x0 + slack),
                        1 => (ConstraintOp::Ge, at_x0 - slack),
                        _ => (ConstraintOp::Eq, at_x0),
                    };
                    problem.add_constraint(format!("row{}", i), row, op, rhs).unwrap();
                }
                for (j, (&u, mode)) in upper.iter().zip(&bound_modes).enumerate() {
                    let mut unit = vec![0.0; upper.len()];
                    unit[j] = 1.0;
                    if *mode >= 1 {
                        problem
                            .add_constraint(format!("floor{}", j), unit.clone(), ConstraintOp::Ge, -u)
                            .unwrap();
                    }
                    if *mode == 2 {
                        problem
                            .add_constraint(format!("ceiling{}", j), unit, ConstraintOp::Le, u)
                            .unwrap();
                    }
                }
                MixedLp { problem, x0 }
            })
    })
}

/// `min c'x` over `A x <= b, x >= 0` with a direction `d >= 0` where
/// `A d < 0` and `c'd < 0`: every point `x0 + t d` is feasible.
fn unbounded_ray() -> impl Strategy<Value = LpProblem> {
    (2usize..6, 1usize..5).prop_flat_map(|(n, m)| {
        (
            vec(0.0..1.0f64, n),
            vec(0.0..3.0f64, n),
            vec((vec(-5.0..5.0f64, n), 0.0..3.0f64), m),
            vec(-5.0..5.0f64, n),
        )
            .prop_map(|(mut d, x0, rows, mut c)| {
                d[0] = 1.0;
                let dd = dot(&d, &d);
                // Shift c and each row along d so their product with d is fixed and negative.
                let shift = (dot(&c, &d) + 1.0) / dd;
                axpy(-shift, &d, &mut c);

                let mut problem = LpProblem::new((0..d.len()).map(|i| format!("x{}", i)).collect());
                problem.set_objective(c, Sense::Minimize).unwrap();
                for (i, (mut row, slack)) in rows.into_iter().enumerate() {
                    let shift = dot(&row, &d) / dd + 0.1;
                    axpy(-shift, &d, &mut row);
                    let rhs = dot(&row, &x0) + slack;
                    problem
                        .add_constraint(format!("row{}", i), row, ConstraintOp::Le, rhs)
                        .unwrap();
                }
                problem
            })
    })
}

/// Three integer variables in `[0, 3]` under two `<=` rows with non-negative rhs.
fn small_integer_program() -> impl Strategy<Value = LpProblem> {
    (
        vec(-5i32..=5, 3),
        vec(vec(-3i32..=4, 3), 2),
        vec(0i32..=10, 2),
    )
        .prop_map(|(c, rows, rhs)| {
            let mut problem = LpProblem::with_variables(
                (0..3).map(|i| Variable::integer(format!("x{}", i), 0.0, 3.0)).collect(),
            );
            problem
                .set_objective(c.into_iter().map(f64::from).collect(), Sense::Minimize)
                .unwrap();
            for (i, (row, b)) in rows.into_iter().zip(rhs).enumerate() {
                problem
                    .add_constraint(
                        format!("row{}", i),
                        row.into_iter().map(f64::from).collect(),
                        ConstraintOp::Le,
                        f64::from(b),
                    )
                    .unwrap();
            }
            problem
        })
}

/// Strictly convex QP whose constraints all hold at a known point.
fn feasible_qp() -> impl Strategy<Value = QpProblem> {
    (2usize..5, 0usize..5, any::<bool>()).prop_flat_map(|(n, m, with_equality)| {
        (
            vec(vec(-1.0..1.0f64, n), n),
            vec(-2.0..2.0f64, n),
            vec(-1.0..1.0f64, n),
            vec(vec(-1.0..1.0f64, n), m),
            vec(0.0..1.0f64, m),
        )
            .prop_map(move |(m_factor, c, x0, rows, slack)| {
                let mut q = mat_mul(&transpose(&m_factor), &m_factor);
                for (i, row) in identity(q.len()).iter().enumerate() {
                    axpy(1.0, row, &mut q[i]);
                }
                let mut problem = QpProblem::new(q, c);
                for (i, (row, s)) in rows.into_iter().zip(slack).enumerate() {
                    let at_x0 = dot(&row, &x0);
                    if with_equality && i == 0 {
                        problem.add_equality(row, at_x0).unwrap();
                    } else {
                        problem.add_inequality(row, at_x0 - s).unwrap();
                    }
                }
                problem
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn lp_optimum_is_feasible_and_unbeaten(lp in boxed_lp()) {
        let problem = lp.problem();
        let solution = solve_lp(&problem, &SolveOptions::default()).unwrap();
        prop_assert_eq!(solution.status, SolutionStatus::Optimal);
        prop_assert!(problem.violations(&solution.values, 1e-7).is_empty());

        let sign = problem.objective.sense.sign();
        let optimum = sign * solution.objective_value;
        for fractions in &lp.samples {
            let point: Vec<f64> = fractions.iter().zip(&lp.upper).map(|(f, u)| f * u).collect();
            if problem.violations(&point, 0.0).is_empty() {
                prop_assert!(sign * problem.evaluate(&point) >= optimum - 1e-7);
            }
        }
        // The origin is always feasible.
        prop_assert!(optimum <= 1e-7);
    }

    #[test]
    fn mixed_rows_reach_a_feasible_optimum(lp in mixed_lp()) {
        let problem = &lp.problem;
        let solution = solve_lp(problem, &SolveOptions::default()).unwrap();
        prop_assert_eq!(solution.status, SolutionStatus::Optimal);
        prop_assert!(problem.violations(&solution.values, 1e-6).is_empty());

        let sign = problem.objective.sense.sign();
        let optimum = sign * solution.objective_value;
        prop_assert!(optimum <= sign * problem.evaluate(&lp.x0) + 1e-7 * (1.0 + optimum.abs()));

        let options = SolveOptions::default().with_pivot_rule(PivotRule::Bland);
        let bland = solve_lp(problem, &options).unwrap();
        prop_assert_eq!(bland.status, SolutionStatus::Optimal);
        prop_assert!(
            (bland.objective_value - solution.objective_value).abs()
                <= 1e-6 * (1.0 + solution.objective_value.abs())
        );
    }

    #[test]
    fn descending_ray_is_unbounded(problem in unbounded_ray()) {
        let solution = solve_lp(&problem, &SolveOptions::default()).unwrap();
        prop_assert_eq!(solution.status, SolutionStatus::Unbounded);
        prop_assert_eq!(solution.objective_value, f64::NEG_INFINITY);
        prop_assert!(solution.values.is_empty());
    }

    #[test]
    fn mip_matches_enumeration(problem in small_integer_program()) {
        let solution = solve_mip(&problem, &SolveOptions::default()).unwrap();
        prop_assert_eq!(solution.status, SolutionStatus::Optimal);
        prop_assert!(problem.is_integer_feasible(&solution.values, 0.0));
        prop_assert!(problem.violations(&solution.values, 1e-9).is_empty());

        let mut best = f64::INFINITY;
        for a in 0..=3 {
            for b in 0..=3 {
                for c in 0..=3 {
                    let x = [f64::from(a), f64::from(b), f64::from(c)];
                    if problem.violations(&x, 1e-9).is_empty() {
                        best = best.min(problem.evaluate(&x));
                    }
                }
            }
        }
        prop_assert!((solution.objective_value - best).abs() <= 1e-7);

        let relaxed = solve_lp(&problem, &SolveOptions::default()).unwrap();
        prop_assert!(solution.objective_value >= relaxed.objective_value - 1e-7);
    }

    #[test]
    fn qp_solution_satisfies_kkt(problem in feasible_qp()) {
        let solution = solve_qp(&problem, &SolveOptions::default()).unwrap();
        prop_assert_eq!(solution.status, SolutionStatus::Optimal);

        let tol = 1e-6;
        let x = &solution.values;
        let (rows, rhs) = problem.constraint_rows();
        let lambda: Vec<f64> = solution.analysis.shadow_prices.iter().map(|sp| sp.value).collect();
        prop_assert_eq!(lambda.len(), rows.len());

        let mut residual = mat_vec(&problem.q, x);
        axpy(1.0, &problem.c, &mut residual);
        for (i, (a, &b)) in rows.iter().zip(&rhs).enumerate() {
            let slack = dot(a, x) - b;
            if i < problem.meq() {
                prop_assert!(slack.abs() <= tol);
            } else {
                prop_assert!(slack >= -tol);
                prop_assert!(lambda[i] >= -tol);
                prop_assert!((lambda[i] * slack).abs() <= tol);
            }
            axpy(-lambda[i], a, &mut residual);
        }
        let scale = 1.0 + lambda.iter().fold(0.0f64, |m, l| m.max(l.abs()));
        for r in residual {
            prop_assert!(r.abs() <= tol * scale);
        }
    }
}
