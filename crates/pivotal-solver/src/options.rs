//! Solver configuration.

/// Default pivot cap for the simplex and active-set solvers.
pub const DEFAULT_LP_ITERATIONS: usize = 10_000;
/// Default node cap for branch-and-bound.
pub const DEFAULT_MIP_NODES: usize = 100_000;

/// Entering-variable selection for the simplex method.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PivotRule {
    /// Most improving reduced cost, smallest index on ties. Falls back to Bland's
    /// rule after a run of degenerate pivots.
    #[default]
    Dantzig,
    /// First improving column, first leaving row by basic index. Never cycles.
    Bland,
}

/// Options shared by all solvers.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOptions {
    /// Pivot cap (LP, QP) or node cap (MIP). `None` uses the per-solver default.
    pub iteration_limit: Option<usize>,
    /// Tolerance for floating point comparisons
    pub tolerance: f64,
    /// Distance from a whole number below which an integer variable counts as integral
    pub integrality_tolerance: f64,
    pub pivot_rule: PivotRule,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            iteration_limit: None,
            tolerance: 1e-9,
            integrality_tolerance: 1e-6,
            pivot_rule: PivotRule::Dantzig,
        }
    }
}

impl SolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.iteration_limit = Some(limit);
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_integrality_tolerance(mut self, tol: f64) -> Self {
        self.integrality_tolerance = tol;
        self
    }

    pub fn with_pivot_rule(mut self, rule: PivotRule) -> Self {
        self.pivot_rule = rule;
        self
    }

    pub(crate) fn lp_iterations(&self) -> usize {
        self.iteration_limit.unwrap_or(DEFAULT_LP_ITERATIONS)
    }

    pub(crate) fn mip_nodes(&self) -> usize {
        self.iteration_limit.unwrap_or(DEFAULT_MIP_NODES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SolveOptions::new();
        assert_eq!(options.iteration_limit, None);
        assert_eq!(options.lp_iterations(), 10_000);
        assert_eq!(options.mip_nodes(), 100_000);
        assert_eq!(options.tolerance, 1e-9);
        assert_eq!(options.integrality_tolerance, 1e-6);
        assert_eq!(options.pivot_rule, PivotRule::Dantzig);
    }

    #[test]
    fn test_builder_pattern() {
        let options = SolveOptions::new()
            .with_iteration_limit(50)
            .with_tolerance(1e-7)
            .with_integrality_tolerance(1e-4)
            .with_pivot_rule(PivotRule::Bland);
        assert_eq!(options.lp_iterations(), 50);
        assert_eq!(options.mip_nodes(), 50);
        assert_eq!(options.tolerance, 1e-7);
        assert_eq!(options.integrality_tolerance, 1e-4);
        assert_eq!(options.pivot_rule, PivotRule::Bland);
    }
}
