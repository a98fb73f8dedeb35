/// The result of a solve call
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Solution status
    pub status: SolutionStatus,
    /// Values for each variable (empty when no point is available)
    pub values: Vec<f64>,
    /// Objective value in the problem's own sense
    #[cfg_attr(feature = "serde", serde(with = "serde_objective"))]
    pub objective_value: f64,
    /// Simplex pivots, or active-set changes for QP
    pub iterations: usize,
    /// Branch-and-bound nodes explored
    pub nodes: usize,
    /// Dual information at the optimum
    pub analysis: Analysis,
}

/// JSON has no infinities: non-finite objectives are written as `"inf"`,
/// `"-inf"` or `"NaN"` and read back from either a number or one of those strings.
#[cfg(feature = "serde")]
mod serde_objective {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            s.serialize_f64(*value)
        } else {
            s.serialize_str(&value.to_string())
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Repr::deserialize(d)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(text) => text
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid objective value `{}`", text))),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionStatus {
    /// An optimal solution was found
    Optimal,
    /// The problem is infeasible (no solution exists)
    Infeasible,
    /// The problem is unbounded
    Unbounded,
    /// The iteration or node cap was hit before optimality was proven
    IterationLimitExceeded,
}

/// Detailed analysis of the optimal solution
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Analysis {
    /// Shadow prices (dual values) for each constraint.
    /// Rate of change of the objective per unit increase of the right-hand side.
    pub shadow_prices: Vec<ShadowPrice>,

    /// Reduced costs for each variable
    /// For non-basic variables, indicates how much cost must change to enter solution
    pub reduced_costs: Vec<ReducedCost>,

    /// Which constraints are binding (tight) at optimum
    pub binding_constraints: Vec<String>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowPrice {
    /// Constraint name
    pub constraint: String,
    /// Shadow price value
    pub value: f64,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedCost {
    /// Variable name
    pub variable: String,
    /// Current value in solution
    pub value: f64,
    /// Reduced cost
    pub reduced_cost: f64,
    /// Is this variable in the basis?
    pub is_basic: bool,
}

/// Information about a violated constraint or bound
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintViolation {
    /// Constraint name
    pub constraint: String,
    /// Required value (from constraint RHS)
    pub required: f64,
    /// Actual value achieved
    pub actual: f64,
    /// How much the constraint is violated by
    pub violation_amount: f64,
    /// Human-readable description of what's wrong
    pub description: String,
}

impl Solution {
    pub fn infeasible(iterations: usize) -> Self {
        Self {
            status: SolutionStatus::Infeasible,
            values: Vec::new(),
            objective_value: f64::INFINITY,
            iterations,
            nodes: 0,
            analysis: Analysis::empty(),
        }
    }

    pub fn unbounded(iterations: usize) -> Self {
        Self {
            status: SolutionStatus::Unbounded,
            values: Vec::new(),
            objective_value: f64::NEG_INFINITY,
            iterations,
            nodes: 0,
            analysis: Analysis::empty(),
        }
    }

    pub fn iteration_limit(iterations: usize) -> Self {
        Self {
            status: SolutionStatus::IterationLimitExceeded,
            values: Vec::new(),
            objective_value: f64::INFINITY,
            iterations,
            nodes: 0,
            analysis: Analysis::empty(),
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolutionStatus::Optimal
    }
}

impl Analysis {
    pub fn empty() -> Self {
        Self::default()
    }
}
