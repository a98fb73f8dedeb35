use crate::error::SolverError;
use crate::solution::ConstraintViolation;

/// Represents a linear programming problem, optionally with integer variables
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct LpProblem {
    /// Decision variables, in column order
    pub variables: Vec<Variable>,
    /// Objective function coefficients and direction
    pub objective: Objective,
    /// Constraints
    pub constraints: Vec<Constraint>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    /// Lower bound, may be `-inf` (`null` in JSON, `0` when omitted)
    #[cfg_attr(
        feature = "serde",
        serde(default, deserialize_with = "serde_bounds::lower")
    )]
    pub lower: f64,
    /// Upper bound, may be `+inf` (`null` or omitted in JSON)
    #[cfg_attr(
        feature = "serde",
        serde(default = "serde_bounds::infinity", deserialize_with = "serde_bounds::upper")
    )]
    pub upper: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub kind: VarKind,
}

/// JSON has no infinities; serde_json writes them as `null`, so read `null` back
/// as the matching infinite bound.
#[cfg(feature = "serde")]
mod serde_bounds {
    use serde::{Deserialize, Deserializer};

    pub fn infinity() -> f64 {
        f64::INFINITY
    }

    pub fn lower<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::NEG_INFINITY))
    }

    pub fn upper<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarKind {
    #[default]
    Continuous,
    Integer,
    /// Integer restricted to `[0, 1]`
    Binary,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Whether to minimize or maximize
    pub sense: Sense,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

impl Sense {
    /// Multiplier that turns this sense into minimization.
    pub fn sign(self) -> f64 {
        match self {
            Sense::Minimize => 1.0,
            Sense::Maximize => -1.0,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    /// Name/label for the constraint (for diagnostics)
    pub name: String,
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// Comparison operator
    pub op: ConstraintOp,
    /// Right-hand side value
    pub rhs: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    #[cfg_attr(feature = "serde", serde(rename = "<="))]
    Le,
    /// Greater than or equal (>=)
    #[cfg_attr(feature = "serde", serde(rename = ">="))]
    Ge,
    /// Equal (=)
    #[cfg_attr(feature = "serde", serde(rename = "="))]
    Eq,
}

impl Variable {
    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lower: 0.0,
            upper: f64::INFINITY,
            kind: VarKind::Continuous,
        }
    }

    pub fn integer(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
            kind: VarKind::Integer,
        }
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lower: 0.0,
            upper: 1.0,
            kind: VarKind::Binary,
        }
    }

    pub fn is_integral(&self) -> bool {
        self.kind != VarKind::Continuous
    }

    /// Bounds after applying the binary restriction.
    pub fn effective_bounds(&self) -> (f64, f64) {
        match self.kind {
            VarKind::Binary => (self.lower.max(0.0), self.upper.min(1.0)),
            _ => (self.lower, self.upper),
        }
    }
}

impl LpProblem {
    /// Creates a problem with continuous, non-negative variables and a zero
    /// objective to be minimized.
    pub fn new(variables: Vec<String>) -> Self {
        let n = variables.len();
        Self {
            variables: variables.into_iter().map(Variable::continuous).collect(),
            objective: Objective {
                coefficients: vec![0.0; n],
                sense: Sense::Minimize,
            },
            constraints: Vec::new(),
        }
    }

    pub fn with_variables(variables: Vec<Variable>) -> Self {
        let n = variables.len();
        Self {
            variables,
            objective: Objective {
                coefficients: vec![0.0; n],
                sense: Sense::Minimize,
            },
            constraints: Vec::new(),
        }
    }

    pub fn set_objective(&mut self, coefficients: Vec<f64>, sense: Sense) -> Result<(), SolverError> {
        self.check_width("objective", coefficients.len())?;
        self.objective = Objective { coefficients, sense };
        Ok(())
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        coefficients: Vec<f64>,
        op: ConstraintOp,
        rhs: f64,
    ) -> Result<(), SolverError> {
        let name = name.into();
        self.check_width(&format!("constraint {}", name), coefficients.len())?;
        self.constraints.push(Constraint {
            name,
            coefficients,
            op,
            rhs,
        });
        Ok(())
    }

    /// Appends a variable with a zero coefficient in the objective and in every
    /// existing constraint. Returns its column index.
    pub fn add_variable(&mut self, variable: Variable) -> usize {
        self.variables.push(variable);
        self.objective.coefficients.push(0.0);
        for c in &mut self.constraints {
            c.coefficients.push(0.0);
        }
        self.variables.len() - 1
    }

    pub fn set_bounds(&mut self, index: usize, lower: f64, upper: f64) -> Result<(), SolverError> {
        let n = self.num_variables();
        let var = self
            .variables
            .get_mut(index)
            .ok_or_else(|| SolverError::dimension("variable index", n, index))?;
        if lower > upper || lower == f64::INFINITY || upper == f64::NEG_INFINITY {
            return Err(SolverError::InvalidBounds {
                variable: var.name.clone(),
                lower,
                upper,
            });
        }
        var.lower = lower;
        var.upper = upper;
        Ok(())
    }

    pub fn set_kind(&mut self, index: usize, kind: VarKind) -> Result<(), SolverError> {
        let n = self.num_variables();
        let var = self
            .variables
            .get_mut(index)
            .ok_or_else(|| SolverError::dimension("variable index", n, index))?;
        var.kind = kind;
        Ok(())
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn has_integer_variables(&self) -> bool {
        self.variables.iter().any(Variable::is_integral)
    }

    /// Checks every structural invariant. Models built through the mutators above
    /// already satisfy the width checks; deserialized models may not.
    pub fn validate(&self) -> Result<(), SolverError> {
        self.check_width("objective", self.objective.coefficients.len())?;
        if self.objective.coefficients.iter().any(|v| !v.is_finite()) {
            return Err(SolverError::non_finite("objective"));
        }
        for c in &self.constraints {
            self.check_width(&format!("constraint {}", c.name), c.coefficients.len())?;
            if !c.rhs.is_finite() || c.coefficients.iter().any(|v| !v.is_finite()) {
                return Err(SolverError::non_finite(format!("constraint {}", c.name)));
            }
        }
        for v in &self.variables {
            let (lower, upper) = v.effective_bounds();
            if v.lower.is_nan() || v.upper.is_nan() {
                return Err(SolverError::non_finite(format!("bounds of {}", v.name)));
            }
            if lower > upper || lower == f64::INFINITY || upper == f64::NEG_INFINITY {
                return Err(SolverError::InvalidBounds {
                    variable: v.name.clone(),
                    lower,
                    upper,
                });
            }
        }
        Ok(())
    }

    /// Objective value of `values`, in the problem's own sense.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.objective
            .coefficients
            .iter()
            .zip(values)
            .map(|(c, x)| c * x)
            .sum()
    }

    /// Lists every constraint and bound that `values` violates by more than
    /// `tolerance`, worst first.
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        for c in &self.constraints {
            let lhs: f64 = c
                .coefficients
                .iter()
                .zip(values)
                .map(|(a, x)| a * x)
                .sum();

            let violation = match c.op {
                ConstraintOp::Le if lhs > c.rhs + tolerance => Some((
                    lhs - c.rhs,
                    format!("{} exceeds maximum of {:.4} by {:.4}", c.name, c.rhs, lhs - c.rhs),
                )),
                ConstraintOp::Ge if lhs < c.rhs - tolerance => Some((
                    c.rhs - lhs,
                    format!("{} is below minimum of {:.4} by {:.4}", c.name, c.rhs, c.rhs - lhs),
                )),
                ConstraintOp::Eq if (lhs - c.rhs).abs() > tolerance => Some((
                    (lhs - c.rhs).abs(),
                    format!("{} requires exactly {:.4} but got {:.4}", c.name, c.rhs, lhs),
                )),
                _ => None,
            };

            if let Some((violation_amount, description)) = violation {
                violations.push(ConstraintViolation {
                    constraint: c.name.clone(),
                    required: c.rhs,
                    actual: lhs,
                    violation_amount,
                    description,
                });
            }
        }

        for (v, &x) in self.variables.iter().zip(values) {
            let (lower, upper) = v.effective_bounds();
            if x < lower - tolerance {
                violations.push(ConstraintViolation {
                    constraint: format!("{}.lower", v.name),
                    required: lower,
                    actual: x,
                    violation_amount: lower - x,
                    description: format!("{} is below its lower bound {:.4}", v.name, lower),
                });
            } else if x > upper + tolerance {
                violations.push(ConstraintViolation {
                    constraint: format!("{}.upper", v.name),
                    required: upper,
                    actual: x,
                    violation_amount: x - upper,
                    description: format!("{} exceeds its upper bound {:.4}", v.name, upper),
                });
            }
        }

        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));
        violations
    }

    /// True when every integer or binary variable is within `tolerance` of a whole number.
    pub fn is_integer_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        self.variables
            .iter()
            .zip(values)
            .filter(|(v, _)| v.is_integral())
            .all(|(_, x)| (x - x.round()).abs() <= tolerance)
    }

    fn check_width(&self, context: &str, found: usize) -> Result<(), SolverError> {
        let expected = self.num_variables();
        if found != expected {
            return Err(SolverError::dimension(context, expected, found));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_vars() -> LpProblem {
        LpProblem::new(vec!["x".to_string(), "y".to_string()])
    }

    #[test]
    fn test_add_constraint_checks_width() {
        let mut problem = two_vars();
        let err = problem
            .add_constraint("bad", vec![1.0], ConstraintOp::Le, 1.0)
            .unwrap_err();
        assert_eq!(
            err,
            SolverError::DimensionMismatch {
                context: "constraint bad".to_string(),
                expected: 2,
                found: 1,
            }
        );
        assert_eq!(problem.num_constraints(), 0);
    }

    #[test]
    fn test_validate_catches_deserialized_garbage() {
        let mut problem = two_vars();
        problem.constraints.push(Constraint {
            name: "short".to_string(),
            coefficients: vec![1.0, 2.0, 3.0],
            op: ConstraintOp::Eq,
            rhs: 0.0,
        });
        assert!(matches!(
            problem.validate(),
            Err(SolverError::DimensionMismatch { expected: 2, found: 3, .. })
        ));

        let mut problem = two_vars();
        problem.variables[1].lower = 5.0;
        problem.variables[1].upper = 1.0;
        assert!(matches!(problem.validate(), Err(SolverError::InvalidBounds { .. })));
    }

    #[test]
    fn test_add_variable_pads_rows() {
        let mut problem = two_vars();
        problem
            .add_constraint("sum", vec![1.0, 1.0], ConstraintOp::Le, 4.0)
            .unwrap();
        let idx = problem.add_variable(Variable::binary("z"));
        assert_eq!(idx, 2);
        assert_eq!(problem.constraints[0].coefficients, vec![1.0, 1.0, 0.0]);
        assert_eq!(problem.objective.coefficients.len(), 3);
        assert!(problem.has_integer_variables());
        assert!(problem.validate().is_ok());
    }

    #[test]
    fn test_violations_sorted_worst_first() {
        let mut problem = two_vars();
        problem
            .add_constraint("cap", vec![1.0, 1.0], ConstraintOp::Le, 4.0)
            .unwrap();
        problem
            .add_constraint("floor", vec![1.0, 0.0], ConstraintOp::Ge, 10.0)
            .unwrap();
        let v = problem.violations(&[3.0, 2.0], 1e-9);
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].constraint, "floor");
        assert_eq!(v[1].constraint, "cap");
        assert!(problem.violations(&[-1.0, 0.0], 1e-9).iter().any(|v| v.constraint == "x.lower"));
    }

    #[test]
    fn test_binary_bounds_are_clamped() {
        let mut var = Variable::binary("b");
        var.upper = 7.0;
        assert_eq!(var.effective_bounds(), (0.0, 1.0));
        var.kind = VarKind::Integer;
        assert_eq!(var.effective_bounds(), (0.0, 7.0));
    }

    #[test]
    fn test_integer_feasibility() {
        let mut problem = two_vars();
        problem.set_kind(0, VarKind::Integer).unwrap();
        assert!(problem.is_integer_feasible(&[2.0000001, 0.5], 1e-6));
        assert!(!problem.is_integer_feasible(&[2.1, 0.0], 1e-6));
    }
}
