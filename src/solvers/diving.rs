/*!
# Diving
LP diving: solve the relaxation, fix the first fractional integer variable to its nearest value, and repeat until
the relaxation is integral. A dive ends with one more LP over the fixed integers so the continuous part is optimal.
The same routine completes the model's warm starts, which fix every integer up front and need a single polish.

## Example usage
```rust
use strainmix::data_types::solve_status::{SolveMethod, SolveStatus};
use strainmix::milp_model::{ConstraintSense, LinearExpr, MilpModel};
use strainmix::solvers::{ModelSolver, SolveBudget};
use strainmix::solvers::diving::DivingSolver;

let mut model = MilpModel::default();
let a = model.add_binary("a");
let b = model.add_binary("b");
model.add_constraint("one", LinearExpr::default().with_term(a, 1.0).with_term(b, 1.0), ConstraintSense::Equal, 1.0);
model.set_objective(LinearExpr::default().with_term(a, 2.0).with_term(b, 1.0));

let outcome = DivingSolver.solve(&model, &SolveBudget::default()).unwrap();
assert_eq!(outcome.method(), SolveMethod::Heuristic);
assert_eq!(outcome.status(), SolveStatus::FeasibleSuboptimal);
```
*/
use log::debug;
use std::time::Instant;

use crate::data_types::solve_status::{SolveMethod, SolveStatus};
use crate::milp_model::MilpModel;
use crate::solvers::lp_relaxation::{solve_relaxation, LpSolution};
use crate::solvers::{first_fractional, snap_integers, ModelSolver, SolveBudget, SolverError, SolverLog, SolverOutcome};

/// Tolerance used when checking a dive result against the model
const FEASIBILITY_TOLERANCE: f64 = 1e-6;
/// A start must beat the current best by this much to replace it
const IMPROVEMENT_TOLERANCE: f64 = 1e-9;

/// How a single dive ended
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum DiveResult {
    /// An integral assignment and its objective
    Found(Vec<f64>, f64),
    /// The relaxation at the starting bounds is infeasible
    Infeasible,
    /// A budget limit stopped the dive
    Interrupted(SolveStatus),
    /// Both roundings of a variable were infeasible
    Stuck { variable: String }
}

/// Heuristic solver: repeatedly solves the LP relaxation and fixes the first fractional integer variable to its
/// nearest value, falling back to the other rounding if that is infeasible.
/// Results are always reported as heuristic and never as optimal.
#[derive(Clone, Copy, Debug, Default)]
pub struct DivingSolver;

impl ModelSolver for DivingSolver {
    fn name(&self) -> &'static str {
        "diving"
    }

    fn solve(&self, model: &MilpModel, budget: &SolveBudget) -> Result<SolverOutcome, SolverError> {
        let start = Instant::now();
        let mut nodes = 0;
        let mut log = SolverLog::default();
        log.push(format!("diving: {} variables ({} integer), {} constraints",
            model.num_variables(), model.integer_variables().len(), model.num_constraints()));

        let mut stuck_at = None;
        let (status, mut incumbent) = match dive(model, &model.bounds(), budget, start, &mut nodes)? {
            DiveResult::Found(values, objective) => {
                log.push(format!("dive found an assignment with objective {objective:.6} after {nodes} LP solves"));
                (SolveStatus::FeasibleSuboptimal, Some((values, objective)))
            },
            DiveResult::Infeasible => {
                log.push("root relaxation is infeasible");
                return Ok(SolverOutcome::new(SolveStatus::Infeasible, SolveMethod::Heuristic, None, None, nodes, log));
            },
            DiveResult::Interrupted(status) => {
                log.push(format!("dive stopped ({status}) after {nodes} LP solves"));
                (status, None)
            },
            DiveResult::Stuck { variable } => {
                log.push(format!("dive found no assignment, stuck at {variable}"));
                stuck_at = Some(variable);
                (SolveStatus::FeasibleSuboptimal, None)
            }
        };

        if let Some((values, objective)) = complete_starts(model, budget, start, &mut nodes, &mut log)? {
            let best = incumbent.as_ref().map(|(_v, o)| *o).unwrap_or(f64::INFINITY);
            if objective < best - IMPROVEMENT_TOLERANCE {
                incumbent = Some((values, objective));
            }
        }

        if incumbent.is_none() {
            if let Some(variable) = stuck_at {
                return Err(SolverError::HeuristicFailed { message: format!("both roundings of {variable} are infeasible") });
            }
        }

        let outcome = SolverOutcome::new(status, SolveMethod::Heuristic, incumbent, None, nodes, log);
        debug!("Diving finished with status {} in {:.3}s", outcome.status(), start.elapsed().as_secs_f64());
        Ok(outcome)
    }
}

/// Completes every warm start of the model with one LP over its fixings and returns the best result, if any.
/// Starts never branch, so they are evaluated even when the budget is spent; only cancellation skips them.
/// # Arguments
/// * `model` - the model whose starts are completed
/// * `budget` - limits, only the cancel flag is checked here
/// * `start` - when the overall solve started
/// * `nodes` - LP solve counter, incremented in place
/// * `log` - receives one line per start
/// # Errors
/// * if the LP engine fails
pub(crate) fn complete_starts(
    model: &MilpModel, budget: &SolveBudget, start: Instant, nodes: &mut usize, log: &mut SolverLog
) -> Result<Option<(Vec<f64>, f64)>, SolverError> {
    let mut best: Option<(Vec<f64>, f64)> = None;
    for (i, fixings) in model.starts().iter().enumerate() {
        if budget.is_cancelled() {
            log.push(format!("cancelled before start {i}"));
            break;
        }
        match dive(model, &model.bounds_with(fixings), budget, start, nodes)? {
            DiveResult::Found(values, objective) => {
                log.push(format!("start {i}: objective {objective:.6}"));
                let current = best.as_ref().map(|(_v, o)| *o).unwrap_or(f64::INFINITY);
                if objective < current - IMPROVEMENT_TOLERANCE {
                    best = Some((values, objective));
                }
            },
            DiveResult::Infeasible => log.push(format!("start {i}: infeasible")),
            DiveResult::Interrupted(status) => log.push(format!("start {i}: stopped ({status})")),
            DiveResult::Stuck { variable } => log.push(format!("start {i}: incomplete at {variable}"))
        };
    }
    if let Some((_v, objective)) = best.as_ref() {
        debug!("Best of {} warm starts: {objective:.6}", model.starts().len());
    }
    Ok(best)
}

/// Runs one dive from the given bounds.
/// # Arguments
/// * `model` - the model to solve
/// * `start_bounds` - bounds to dive from, e.g. a branch-and-bound node
/// * `budget` - limits, checked before every LP solve
/// * `start` - when the overall solve started
/// * `nodes` - LP solve counter, incremented in place
/// # Errors
/// * if the LP engine fails
pub(crate) fn dive(
    model: &MilpModel, start_bounds: &[(f64, f64)], budget: &SolveBudget, start: Instant, nodes: &mut usize
) -> Result<DiveResult, SolverError> {
    let mut bounds = start_bounds.to_vec();

    *nodes += 1;
    let mut current: LpSolution = match solve_relaxation(model, &bounds)? {
        Some(lp) => lp,
        None => return Ok(DiveResult::Infeasible)
    };

    while let Some(index) = first_fractional(model, current.values()) {
        if budget.is_cancelled() {
            return Ok(DiveResult::Interrupted(SolveStatus::Cancelled));
        }
        if budget.is_timed_out(start) || budget.is_node_limited(*nodes) {
            return Ok(DiveResult::Interrupted(SolveStatus::Timeout));
        }

        let value = current.values()[index];
        let preferred = value.round();
        let alternative = if preferred > value { value.floor() } else { value.ceil() };

        let mut next = None;
        for candidate in [preferred, alternative] {
            bounds[index] = (candidate, candidate);
            *nodes += 1;
            if let Some(lp) = solve_relaxation(model, &bounds)? {
                next = Some(lp);
                break;
            }
        }

        match next {
            Some(lp) => current = lp,
            None => return Ok(DiveResult::Stuck { variable: model.variables()[index].name().to_string() })
        }
    }

    // fix every integer and re-solve so the continuous part is optimal for this assignment
    let mut values = current.into_values();
    snap_integers(model, &mut values);
    for (i, def) in model.variables().iter().enumerate() {
        if def.is_integer() {
            bounds[i] = (values[i], values[i]);
        }
    }
    *nodes += 1;
    if let Some(polished) = solve_relaxation(model, &bounds)? {
        values = polished.into_values();
        snap_integers(model, &mut values);
    }

    if !model.is_feasible(&values, FEASIBILITY_TOLERANCE) {
        return Ok(DiveResult::Stuck { variable: "<final assignment>".to_string() });
    }
    let objective = model.evaluate_objective(&values);
    Ok(DiveResult::Found(values, objective))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milp_model::{ConstraintSense, LinearExpr};
    use crate::solvers::SolveBudgetBuilder;
    use approx_eq::assert_approx_eq;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    /// Pick exactly two of three items, minimising cost 3, 1, 2
    fn pick_two() -> MilpModel {
        let mut model = MilpModel::default();
        let items: Vec<_> = (0..3).map(|i| model.add_binary(format!("b{i}"))).collect();
        let total = items.iter().fold(LinearExpr::default(), |e, &b| e.with_term(b, 1.0));
        model.add_constraint("two", total, ConstraintSense::Equal, 2.0);
        model.set_objective(LinearExpr::default().with_term(items[0], 3.0).with_term(items[1], 1.0).with_term(items[2], 2.0));
        model
    }

    #[test]
    fn test_dive() {
        let model = pick_two();
        let outcome = DivingSolver.solve(&model, &SolveBudget::default()).unwrap();
        assert_eq!(outcome.method(), SolveMethod::Heuristic);
        assert_eq!(outcome.status(), SolveStatus::FeasibleSuboptimal);
        let values = outcome.values().unwrap();
        assert!(model.is_feasible(values, 1e-6));
        assert_eq!(outcome.objective(), Some(model.evaluate_objective(values)));
        assert!(!outcome.log().lines().is_empty());
    }

    #[test]
    fn test_infeasible() {
        let mut model = pick_two();
        let b0 = model.integer_variables()[0];
        model.add_constraint("impossible", LinearExpr::default().with_term(b0, 1.0), ConstraintSense::GreaterEqual, 2.0);
        let outcome = DivingSolver.solve(&model, &SolveBudget::default()).unwrap();
        assert_eq!(outcome.status(), SolveStatus::Infeasible);
        assert!(!outcome.has_incumbent());
    }

    #[test]
    fn test_stuck() {
        // x must be fractional: 2x = 1
        let mut model = MilpModel::default();
        let x = model.add_binary("x");
        model.add_constraint("half", LinearExpr::default().with_term(x, 2.0), ConstraintSense::Equal, 1.0);
        let result = DivingSolver.solve(&model, &SolveBudget::default());
        assert!(matches!(result, Err(SolverError::HeuristicFailed { .. })));
    }

    #[test]
    fn test_start_rescues_stuck_dive() {
        // the root has z = 0.6, rounding it up forces x = 0.5 and the dive sticks; z = 0 is feasible
        let mut model = MilpModel::default();
        let z = model.add_binary("z");
        let x = model.add_binary("x");
        let c = model.add_continuous("c", 0.0, 1.0);
        model.add_constraint("half", LinearExpr::default().with_term(x, 2.0).with_term(z, -1.0), ConstraintSense::Equal, 0.0);
        model.add_constraint("cover", LinearExpr::default().with_term(z, 1.0).with_term(c, 1.0), ConstraintSense::GreaterEqual, 0.6);
        model.set_objective(LinearExpr::default().with_term(c, 1.0).with_term(z, 0.1));
        assert!(matches!(DivingSolver.solve(&model, &SolveBudget::default()), Err(SolverError::HeuristicFailed { .. })));

        model.add_start(vec![(z, 0.0), (x, 0.0)]);
        let outcome = DivingSolver.solve(&model, &SolveBudget::default()).unwrap();
        assert_eq!(outcome.status(), SolveStatus::FeasibleSuboptimal);
        let values = outcome.values().unwrap();
        assert_eq!(&values[..2], &[0.0, 0.0]);
        assert_approx_eq!(values[2], 0.6);
    }

    #[test]
    fn test_complete_starts() {
        let mut model = pick_two();
        let items = model.integer_variables();
        // infeasible, then the second best pair, then the best pair
        model.add_start(vec![(items[0], 1.0), (items[1], 1.0), (items[2], 1.0)]);
        model.add_start(vec![(items[0], 1.0), (items[1], 1.0), (items[2], 0.0)]);
        model.add_start(vec![(items[0], 0.0), (items[1], 1.0), (items[2], 1.0)]);

        // a spent budget does not stop starts from being completed
        let budget = SolveBudgetBuilder::default()
            .node_limit(Some(0))
            .build().unwrap();
        let mut nodes = 0;
        let mut log = SolverLog::default();
        let (values, objective) = complete_starts(&model, &budget, Instant::now(), &mut nodes, &mut log).unwrap().unwrap();
        assert_eq!(values, vec![0.0, 1.0, 1.0]);
        assert_eq!(objective, 3.0);
        assert_eq!(log.lines().len(), 3);
        assert!(log.lines()[0].contains("infeasible"));
        assert!(nodes >= 3);
    }

    #[test]
    fn test_cancelled_before_branching() {
        // fractional root so the dive has to branch at least once
        let mut model = MilpModel::default();
        let x = model.add_binary("x");
        let y = model.add_binary("y");
        model.add_constraint("one", LinearExpr::default().with_term(x, 2.0).with_term(y, 2.0), ConstraintSense::Equal, 2.0);
        model.add_constraint("split", LinearExpr::default().with_term(x, 1.0).with_term(y, -1.0), ConstraintSense::Equal, 0.0);
        let budget = SolveBudgetBuilder::default()
            .cancel(Some(Arc::new(AtomicBool::new(true))))
            .build().unwrap();
        let outcome = DivingSolver.solve(&model, &budget).unwrap();
        assert_eq!(outcome.status(), SolveStatus::Cancelled);
        assert!(!outcome.has_incumbent());
    }
}
