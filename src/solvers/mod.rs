/*!
# Solver adapters
Everything needed to hand a [`MilpModel`] to a combinatorial search and get an assignment back.
The [`ModelSolver`] trait is the only seam between the model builder and a concrete search, so an exact
branch-and-bound and a heuristic dive can be swapped freely.
*/
/// Exact best-first branch-and-bound
pub mod branch_bound;
/// Heuristic LP diving
pub mod diving;
/// LP relaxations through `good_lp`
pub mod lp_relaxation;

use derive_builder::Builder;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::data_types::solve_status::{SolveMethod, SolveStatus};
use crate::milp_model::MilpModel;

/// Tolerance for deciding that a binary variable is integral
pub const INTEGRALITY_TOLERANCE: f64 = 1e-6;

#[derive(thiserror::Error, Debug)]
pub enum SolverError {
    #[error("numerical failure: {message}")]
    Numerical { message: String },
    #[error("the LP relaxation is unbounded")]
    Unbounded,
    #[error("heuristic search failed: {message}")]
    HeuristicFailed { message: String },
    #[error("resources exhausted: {message}")]
    ResourceExhausted { message: String }
}

/// Limits for a single solve
#[derive(Builder, Clone, Debug, Default)]
#[builder(default)]
pub struct SolveBudget {
    /// Wall-clock limit
    time_limit: Option<Duration>,
    /// Limit on the number of LP relaxations solved
    node_limit: Option<usize>,
    /// Stop once `(incumbent - bound) <= relative_gap * |incumbent|`; 0 proves optimality
    relative_gap: f64,
    /// Shared flag, the search stops and reports its incumbent once this is set
    cancel: Option<Arc<AtomicBool>>
}

impl SolveBudget {
    /// Returns true if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref()
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Returns true if the time limit has passed since `start`
    pub fn is_timed_out(&self, start: Instant) -> bool {
        self.time_limit
            .map(|limit| start.elapsed() >= limit)
            .unwrap_or(false)
    }

    /// Returns true if `nodes` LP solves exhaust the node limit
    pub fn is_node_limited(&self, nodes: usize) -> bool {
        self.node_limit
            .map(|limit| nodes >= limit)
            .unwrap_or(false)
    }

    /// A copy with the time and node limits scaled by `fraction`, keeping at least one LP solve
    pub fn scaled(&self, fraction: f64) -> SolveBudget {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 1.0 };
        SolveBudget {
            time_limit: self.time_limit.map(|limit| limit.mul_f64(fraction)),
            node_limit: self.node_limit.map(|limit| ((limit as f64 * fraction).ceil() as usize).max(1)),
            relative_gap: self.relative_gap,
            cancel: self.cancel.clone()
        }
    }

    /// A copy with `elapsed` time and `nodes` LP solves already spent
    pub fn remaining(&self, elapsed: Duration, nodes: usize) -> SolveBudget {
        SolveBudget {
            time_limit: self.time_limit.map(|limit| limit.saturating_sub(elapsed)),
            node_limit: self.node_limit.map(|limit| limit.saturating_sub(nodes)),
            relative_gap: self.relative_gap,
            cancel: self.cancel.clone()
        }
    }

    // getters
    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    pub fn node_limit(&self) -> Option<usize> {
        self.node_limit
    }

    pub fn relative_gap(&self) -> f64 {
        self.relative_gap
    }

    pub fn cancel(&self) -> Option<&Arc<AtomicBool>> {
        self.cancel.as_ref()
    }
}

/// Free-form progress lines from a solve, kept for auditing
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SolverLog {
    lines: Vec<String>
}

impl SolverLog {
    /// Appends a line
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Appends every line of another log
    pub fn extend(&mut self, other: SolverLog) {
        self.lines.extend(other.lines);
    }

    /// The whole log as newline-terminated text
    pub fn to_text(&self) -> String {
        self.lines.iter()
            .map(|l| format!("{l}\n"))
            .collect()
    }

    // getters
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// What a solver returns for one model
#[derive(Clone, Debug)]
pub struct SolverOutcome {
    status: SolveStatus,
    method: SolveMethod,
    /// The best assignment found and its objective, if any
    incumbent: Option<(Vec<f64>, f64)>,
    /// Proven lower bound on the optimum, if one is known
    best_bound: Option<f64>,
    /// Number of LP relaxations solved
    nodes: usize,
    log: SolverLog
}

impl SolverOutcome {
    /// Constructor
    pub fn new(
        status: SolveStatus, method: SolveMethod, incumbent: Option<(Vec<f64>, f64)>,
        best_bound: Option<f64>, nodes: usize, log: SolverLog
    ) -> Self {
        Self {
            status,
            method,
            incumbent,
            best_bound,
            nodes,
            log
        }
    }

    /// Assignment of the incumbent, if any
    pub fn values(&self) -> Option<&[f64]> {
        self.incumbent.as_ref().map(|(v, _o)| v.as_slice())
    }

    /// Objective of the incumbent, if any
    pub fn objective(&self) -> Option<f64> {
        self.incumbent.as_ref().map(|(_v, o)| *o)
    }

    /// Returns true if there is an assignment to extract
    pub fn has_incumbent(&self) -> bool {
        self.incumbent.is_some()
    }

    // getters
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    pub fn method(&self) -> SolveMethod {
        self.method
    }

    pub fn best_bound(&self) -> Option<f64> {
        self.best_bound
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn log(&self) -> &SolverLog {
        &self.log
    }
}

/// Anything that can minimise a [`MilpModel`]
pub trait ModelSolver: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Solves the model within the budget.
    /// Heuristic solvers must report `SolveMethod::Heuristic` and never `SolveStatus::Optimal`.
    /// # Errors
    /// * if the underlying LP engine fails, or the search cannot produce any usable result
    fn solve(&self, model: &MilpModel, budget: &SolveBudget) -> Result<SolverOutcome, SolverError>;
}

/// Returns the lowest-index integer variable whose value is fractional
pub(crate) fn first_fractional(model: &MilpModel, values: &[f64]) -> Option<usize> {
    model.variables().iter()
        .enumerate()
        .find(|(i, def)| def.is_integer() && (values[*i] - values[*i].round()).abs() > INTEGRALITY_TOLERANCE)
        .map(|(i, _def)| i)
}

/// Rounds every integer variable to the nearest integer, continuous values are untouched
pub(crate) fn snap_integers(model: &MilpModel, values: &mut [f64]) {
    for (def, value) in model.variables().iter().zip(values.iter_mut()) {
        if def.is_integer() {
            *value = value.round();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milp_model::{ConstraintSense, LinearExpr};

    #[test]
    fn test_budget() {
        let cancel = Arc::new(AtomicBool::new(false));
        let budget = SolveBudgetBuilder::default()
            .node_limit(Some(10))
            .cancel(Some(cancel.clone()))
            .build().unwrap();
        assert!(!budget.is_cancelled());
        assert!(!budget.is_node_limited(9));
        assert!(budget.is_node_limited(10));
        assert!(!budget.is_timed_out(Instant::now()));
        cancel.store(true, Ordering::Relaxed);
        assert!(budget.is_cancelled());

        let zero_time = SolveBudgetBuilder::default()
            .time_limit(Some(Duration::ZERO))
            .build().unwrap();
        assert!(zero_time.is_timed_out(Instant::now()));
        assert_eq!(zero_time.relative_gap(), 0.0);
    }

    #[test]
    fn test_budget_split() {
        let cancel = Arc::new(AtomicBool::new(false));
        let budget = SolveBudgetBuilder::default()
            .time_limit(Some(Duration::from_secs(8)))
            .node_limit(Some(10))
            .cancel(Some(cancel.clone()))
            .build().unwrap();

        let quarter = budget.scaled(0.25);
        assert_eq!(quarter.time_limit(), Some(Duration::from_secs(2)));
        assert_eq!(quarter.node_limit(), Some(3));
        assert_eq!(budget.scaled(0.0).node_limit(), Some(1));

        let rest = budget.remaining(Duration::from_secs(3), 4);
        assert_eq!(rest.time_limit(), Some(Duration::from_secs(5)));
        assert_eq!(rest.node_limit(), Some(6));
        let spent = budget.remaining(Duration::from_secs(30), 40);
        assert_eq!(spent.time_limit(), Some(Duration::ZERO));
        assert!(spent.is_node_limited(0));

        // the cancel flag is shared, unlimited budgets stay unlimited
        cancel.store(true, Ordering::Relaxed);
        assert!(quarter.is_cancelled() && rest.is_cancelled());
        assert_eq!(SolveBudget::default().scaled(0.5).time_limit(), None);
        assert_eq!(SolveBudget::default().remaining(Duration::from_secs(1), 1).node_limit(), None);
    }

    #[test]
    fn test_fractional_helpers() {
        let mut model = MilpModel::default();
        let _c = model.add_continuous("c", 0.0, 1.0);
        let _b0 = model.add_binary("b0");
        let _b1 = model.add_binary("b1");
        model.add_constraint("sum", LinearExpr::default(), ConstraintSense::Equal, 0.0);

        assert_eq!(first_fractional(&model, &[0.5, 1.0, 0.3]), Some(2));
        assert_eq!(first_fractional(&model, &[0.5, 0.0, 1.0]), None);
        let mut values = vec![0.5, 0.9999999, 0.3];
        snap_integers(&model, &mut values);
        assert_eq!(values, vec![0.5, 1.0, 0.0]);
    }

    #[test]
    fn test_log() {
        let mut log = SolverLog::default();
        log.push("first");
        let mut other = SolverLog::default();
        other.push("second");
        log.extend(other);
        assert_eq!(log.to_text(), "first\nsecond\n");
        assert_eq!(log.lines().len(), 2);
    }
}
