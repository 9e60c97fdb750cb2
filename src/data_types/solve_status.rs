
use serde::Serialize;

/// Termination status reported by a solver adapter
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, strum_macros::Display)]
pub enum SolveStatus {
    /// Proven optimal
    #[strum(serialize = "optimal")]
    Optimal,
    /// Feasible, but optimality was not proven (heuristic result or stopped at the configured gap)
    #[strum(serialize = "feasible_suboptimal")]
    FeasibleSuboptimal,
    /// The model has no feasible assignment
    #[strum(serialize = "infeasible")]
    Infeasible,
    /// The time or node budget ran out; may carry an incumbent
    #[strum(serialize = "timeout")]
    Timeout,
    /// A cancellation request stopped the search; may carry an incumbent
    #[strum(serialize = "cancelled")]
    Cancelled
}

impl SolveStatus {
    /// Returns true if this status is a proven optimum
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

/// How an assignment was found; heuristic results are never reported as optimal
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, strum_macros::Display)]
pub enum SolveMethod {
    /// Exhaustive search with bounding, optimality can be proven
    #[strum(serialize = "exact")]
    Exact,
    /// Heuristic search only
    #[strum(serialize = "heuristic")]
    Heuristic
}
