/*!
# Branch-and-bound
Exact best-first branch-and-bound over LP relaxations.
Nodes carry their variable fixings and are explored lowest bound first; ties go to the deeper node, then to the
earliest created node, so the search order is fully deterministic.
The incumbent is seeded with a dive from the root relaxation and with the model's warm starts; every
`DIVE_INTERVAL` branching nodes another dive runs from the node just branched, so long searches keep improving
the incumbent instead of waiting for an integral relaxation deep in the tree.

## Example usage
```rust
use strainmix::data_types::solve_status::SolveStatus;
use strainmix::milp_model::{ConstraintSense, LinearExpr, MilpModel};
use strainmix::solvers::{ModelSolver, SolveBudget};
use strainmix::solvers::branch_bound::BranchAndBoundSolver;

// pick exactly one of two items, the second is cheaper
let mut model = MilpModel::default();
let a = model.add_binary("a");
let b = model.add_binary("b");
model.add_constraint("one", LinearExpr::default().with_term(a, 1.0).with_term(b, 1.0), ConstraintSense::Equal, 1.0);
model.set_objective(LinearExpr::default().with_term(a, 2.0).with_term(b, 1.0));

let outcome = BranchAndBoundSolver.solve(&model, &SolveBudget::default()).unwrap();
assert_eq!(outcome.status(), SolveStatus::Optimal);
assert_eq!(outcome.values().unwrap(), &[0.0, 1.0]);
```
*/

use log::{debug, trace};
use priority_queue::PriorityQueue;
use rustc_hash::FxHashMap as HashMap;
use std::cmp::{Ordering, Reverse};
use std::time::Instant;

use crate::data_types::solve_status::{SolveMethod, SolveStatus};
use crate::milp_model::MilpModel;
use crate::solvers::diving::{complete_starts, dive, DiveResult};
use crate::solvers::lp_relaxation::solve_relaxation;
use crate::solvers::{first_fractional, snap_integers, ModelSolver, SolveBudget, SolverError, SolverLog, SolverOutcome};

/// Absolute tolerance when comparing bounds against the incumbent
const PRUNE_TOLERANCE: f64 = 1e-9;
/// Branching nodes between two dives
const DIVE_INTERVAL: usize = 16;

/// An LP bound with a total order, so it can sit inside a priority
#[derive(Clone, Copy, Debug)]
struct Bound(f64);

impl PartialEq for Bound {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Bound {}

impl PartialOrd for Bound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bound {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Priority is (lowest bound, deepest, smallest node id)
type NodePriority = (Reverse<Bound>, usize, Reverse<u64>);

/// One open subproblem
#[derive(Clone, Debug)]
struct SearchNode {
    /// Unique node ID, primarily for deterministic, fixed order
    node_id: u64,
    /// (variable index, fixed value) pairs applied on top of the root bounds
    fixings: Vec<(usize, f64)>,
    /// Objective of the parent relaxation, a lower bound for this node
    bound: f64
}

impl SearchNode {
    /// Returns the priority for this node
    fn priority(&self) -> NodePriority {
        (
            Reverse(Bound(self.bound)), // lowest bound
            self.fixings.len(), // deepest
            Reverse(self.node_id) // earliest node ID
        )
    }

    /// Root bounds with this node's fixings applied
    fn bounds(&self, root_bounds: &[(f64, f64)]) -> Vec<(f64, f64)> {
        let mut bounds = root_bounds.to_vec();
        for &(index, value) in self.fixings.iter() {
            bounds[index] = (value, value);
        }
        bounds
    }
}

/// Exact solver; reports `Optimal` only when the search space is exhausted
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchAndBoundSolver;

impl ModelSolver for BranchAndBoundSolver {
    fn name(&self) -> &'static str {
        "branch_and_bound"
    }

    fn solve(&self, model: &MilpModel, budget: &SolveBudget) -> Result<SolverOutcome, SolverError> {
        let start = Instant::now();
        let root_bounds = model.bounds();
        let mut nodes = 0;
        let mut log = SolverLog::default();
        log.push(format!("branch_and_bound: {} variables ({} integer), {} constraints",
            model.num_variables(), model.integer_variables().len(), model.num_constraints()));

        // seed the incumbent with a dive
        let mut incumbent: Option<(Vec<f64>, f64)> = None;
        match dive(model, &root_bounds, budget, start, &mut nodes)? {
            DiveResult::Found(values, objective) => {
                log.push(format!("initial dive: incumbent {objective:.6}"));
                incumbent = Some((values, objective));
            },
            DiveResult::Infeasible => {
                log.push("root relaxation is infeasible");
                return Ok(SolverOutcome::new(SolveStatus::Infeasible, SolveMethod::Exact, None, None, nodes, log));
            },
            DiveResult::Interrupted(status) => {
                log.push(format!("initial dive stopped ({status})"));
            },
            DiveResult::Stuck { variable } => {
                log.push(format!("initial dive found no assignment, stuck at {variable}"));
            }
        };

        if let Some((values, objective)) = complete_starts(model, budget, start, &mut nodes, &mut log)? {
            let current = incumbent.as_ref().map(|(_v, o)| *o).unwrap_or(f64::INFINITY);
            if objective < current - PRUNE_TOLERANCE {
                log.push(format!("warm start: incumbent {objective:.6}"));
                incumbent = Some((values, objective));
            }
        }

        // put the root into the queue as our seed node
        let mut next_node_id = 0;
        let root = SearchNode { node_id: next_node_id, fixings: vec![], bound: f64::NEG_INFINITY };
        next_node_id += 1;
        let mut open_nodes: HashMap<u64, SearchNode> = Default::default();
        let mut pqueue: PriorityQueue<u64, NodePriority> = PriorityQueue::new();
        pqueue.push(root.node_id, root.priority());
        open_nodes.insert(root.node_id, root);

        let mut stop_status: Option<SolveStatus> = None;
        let mut stop_bound = f64::NEG_INFINITY;
        let mut branched_since_dive = 0;
        while let Some((node_id, _priority)) = pqueue.pop() {
            let Some(node) = open_nodes.remove(&node_id) else {
                continue;
            };
            let incumbent_objective = incumbent.as_ref().map(|(_v, o)| *o).unwrap_or(f64::INFINITY);

            if node.bound >= incumbent_objective - PRUNE_TOLERANCE {
                // best-first, so every remaining node is at least this bad
                trace!("Node {node_id} bound {:.6} cannot beat {incumbent_objective:.6}, closing search", node.bound);
                stop_bound = incumbent_objective;
                break;
            }

            if incumbent_objective.is_finite() && budget.relative_gap() > 0.0 {
                let gap = (incumbent_objective - node.bound) / incumbent_objective.abs().max(PRUNE_TOLERANCE);
                if gap <= budget.relative_gap() {
                    log.push(format!("relative gap {gap:.6} within {}", budget.relative_gap()));
                    stop_status = Some(SolveStatus::FeasibleSuboptimal);
                    stop_bound = node.bound;
                    break;
                }
            }

            if budget.is_cancelled() {
                log.push("cancelled");
                stop_status = Some(SolveStatus::Cancelled);
                stop_bound = node.bound;
                break;
            }
            if budget.is_timed_out(start) || budget.is_node_limited(nodes) {
                log.push(format!("budget exhausted after {nodes} LP solves and {:.3}s", start.elapsed().as_secs_f64()));
                stop_status = Some(SolveStatus::Timeout);
                stop_bound = node.bound;
                break;
            }

            nodes += 1;
            let bounds = node.bounds(&root_bounds);
            let lp = match solve_relaxation(model, &bounds)? {
                Some(lp) => lp,
                None => {
                    trace!("Node {node_id} is infeasible");
                    continue;
                }
            };

            if lp.objective() >= incumbent_objective - PRUNE_TOLERANCE {
                trace!("Node {node_id} pruned, relaxation {:.6} >= {incumbent_objective:.6}", lp.objective());
                continue;
            }

            match first_fractional(model, lp.values()) {
                None => {
                    // integral relaxation, new incumbent
                    let mut values = lp.into_values();
                    snap_integers(model, &mut values);
                    let objective = model.evaluate_objective(&values);
                    if objective < incumbent_objective - PRUNE_TOLERANCE {
                        debug!("New incumbent {objective:.6} at node {node_id} after {nodes} LP solves");
                        log.push(format!("node {node_id}: incumbent {objective:.6}"));
                        incumbent = Some((values, objective));
                    }
                },
                Some(index) => {
                    branched_since_dive += 1;
                    if branched_since_dive >= DIVE_INTERVAL {
                        branched_since_dive = 0;
                        // budget interruptions are picked up by the next pop
                        if let DiveResult::Found(values, objective) = dive(model, &bounds, budget, start, &mut nodes)? {
                            if objective < incumbent_objective - PRUNE_TOLERANCE {
                                debug!("New incumbent {objective:.6} from a dive at node {node_id} after {nodes} LP solves");
                                log.push(format!("node {node_id}: dive incumbent {objective:.6}"));
                                incumbent = Some((values, objective));
                            }
                        }
                    }

                    let value = lp.values()[index];
                    trace!("Node {node_id} branching on {} = {value:.6}", model.variables()[index].name());
                    // up branch first so ties favour it
                    for fixed in [value.ceil(), value.floor()] {
                        let mut fixings = node.fixings.clone();
                        fixings.push((index, fixed));
                        let child = SearchNode { node_id: next_node_id, fixings, bound: lp.objective() };
                        next_node_id += 1;
                        pqueue.push(child.node_id, child.priority());
                        open_nodes.insert(child.node_id, child);
                    }
                }
            };
        }

        let (status, best_bound) = match stop_status {
            Some(status) => {
                // the lowest open bound is the popped node's, the queue is ordered by bound
                (status, Some(stop_bound).filter(|b| b.is_finite()))
            },
            None => {
                if incumbent.is_some() {
                    let objective = incumbent.as_ref().map(|(_v, o)| *o);
                    (SolveStatus::Optimal, objective.or(Some(stop_bound)))
                } else {
                    (SolveStatus::Infeasible, None)
                }
            }
        };

        log.push(format!("finished: status {status}, {nodes} LP solves, {next_node_id} nodes created, {:.3}s",
            start.elapsed().as_secs_f64()));
        if let Some((_v, objective)) = incumbent.as_ref() {
            log.push(format!("incumbent objective {objective:.6}, best bound {:.6}", best_bound.unwrap_or(f64::NAN)));
        }
        debug!("Branch-and-bound finished with status {status} after {nodes} LP solves");

        Ok(SolverOutcome::new(status, SolveMethod::Exact, incumbent, best_bound, nodes, log))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::milp_model::{ConstraintSense, LinearExpr};
    use crate::solvers::diving::DivingSolver;
    use crate::solvers::SolveBudgetBuilder;
    use approx_eq::assert_approx_eq;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    /// Knapsack with a greedy trap: maximise value within weight 10
    /// values 10, 7, 7 with weights 6, 5, 5; best is the last two with value 14
    fn knapsack() -> MilpModel {
        let mut model = MilpModel::default();
        let items: Vec<_> = (0..3).map(|i| model.add_binary(format!("b{i}"))).collect();
        let weights = [6.0, 5.0, 5.0];
        let values = [10.0, 7.0, 7.0];
        let weight = items.iter().zip(weights.iter()).fold(LinearExpr::default(), |e, (&b, &w)| e.with_term(b, w));
        model.add_constraint("capacity", weight, ConstraintSense::LessEqual, 10.0);
        let objective = items.iter().zip(values.iter()).fold(LinearExpr::default(), |e, (&b, &v)| e.with_term(b, -v));
        model.set_objective(objective);
        model
    }

    #[test]
    fn test_knapsack() {
        let model = knapsack();
        let outcome = BranchAndBoundSolver.solve(&model, &SolveBudget::default()).unwrap();
        assert_eq!(outcome.status(), SolveStatus::Optimal);
        assert_eq!(outcome.method(), SolveMethod::Exact);
        assert_eq!(outcome.values().unwrap(), &[0.0, 1.0, 1.0]);
        assert_approx_eq!(outcome.objective().unwrap(), -14.0);
        assert_approx_eq!(outcome.best_bound().unwrap(), -14.0);
    }

    #[test]
    fn test_exact_beats_or_ties_heuristic() {
        let model = knapsack();
        let exact = BranchAndBoundSolver.solve(&model, &SolveBudget::default()).unwrap();
        let heuristic = DivingSolver.solve(&model, &SolveBudget::default()).unwrap();
        assert!(exact.objective().unwrap() <= heuristic.objective().unwrap() + 1e-9);
    }

    #[test]
    fn test_infeasible() {
        let mut model = knapsack();
        let b0 = model.integer_variables()[0];
        let b1 = model.integer_variables()[1];
        // b0 + b1 = 1 and 2 b0 + 2 b1 = 3 cannot both hold
        model.add_constraint("one", LinearExpr::default().with_term(b0, 1.0).with_term(b1, 1.0), ConstraintSense::Equal, 1.0);
        model.add_constraint("odd", LinearExpr::default().with_term(b0, 2.0).with_term(b1, 2.0), ConstraintSense::Equal, 3.0);
        let outcome = BranchAndBoundSolver.solve(&model, &SolveBudget::default()).unwrap();
        assert_eq!(outcome.status(), SolveStatus::Infeasible);
        assert!(!outcome.has_incumbent());
    }

    #[test]
    fn test_cancelled() {
        let budget = SolveBudgetBuilder::default()
            .cancel(Some(Arc::new(AtomicBool::new(true))))
            .build().unwrap();
        let outcome = BranchAndBoundSolver.solve(&knapsack(), &budget).unwrap();
        assert_eq!(outcome.status(), SolveStatus::Cancelled);
        assert_eq!(outcome.method(), SolveMethod::Exact);
    }

    #[test]
    fn test_warm_start_under_node_limit() {
        let mut model = knapsack();
        let items = model.integer_variables();
        model.add_start(vec![(items[0], 0.0), (items[1], 1.0), (items[2], 1.0)]);
        let budget = SolveBudgetBuilder::default()
            .node_limit(Some(1))
            .build().unwrap();
        let outcome = BranchAndBoundSolver.solve(&model, &budget).unwrap();
        assert_eq!(outcome.status(), SolveStatus::Timeout);
        assert_eq!(outcome.values().unwrap(), &[0.0, 1.0, 1.0]);
        assert_approx_eq!(outcome.objective().unwrap(), -14.0);
    }

    #[test]
    fn test_larger_knapsack() {
        // enough branching for the periodic dives to run
        let weights = [12.0, 7.0, 11.0, 8.0, 9.0, 6.0, 5.0, 14.0, 3.0, 10.0, 4.0, 13.0];
        let values = [24.0, 13.0, 23.0, 15.0, 16.0, 11.0, 9.0, 26.0, 5.0, 17.0, 7.0, 25.0];
        let capacity = 40.0;
        let mut model = MilpModel::default();
        let items: Vec<_> = (0..weights.len()).map(|i| model.add_binary(format!("b{i}"))).collect();
        let weight = items.iter().zip(weights.iter()).fold(LinearExpr::default(), |e, (&b, &w)| e.with_term(b, w));
        model.add_constraint("capacity", weight, ConstraintSense::LessEqual, capacity);
        let objective = items.iter().zip(values.iter()).fold(LinearExpr::default(), |e, (&b, &v)| e.with_term(b, -v));
        model.set_objective(objective);

        let best = (0..1_u32 << weights.len())
            .filter(|mask| (0..weights.len()).filter(|i| mask & (1 << i) != 0).map(|i| weights[i]).sum::<f64>() <= capacity)
            .map(|mask| (0..weights.len()).filter(|i| mask & (1 << i) != 0).map(|i| values[i]).sum::<f64>())
            .fold(0.0, f64::max);

        let outcome = BranchAndBoundSolver.solve(&model, &SolveBudget::default()).unwrap();
        assert_eq!(outcome.status(), SolveStatus::Optimal);
        assert_approx_eq!(outcome.objective().unwrap(), -best);
        assert!(model.is_feasible(outcome.values().unwrap(), 1e-6));
    }

    #[test]
    fn test_node_limit() {
        let budget = SolveBudgetBuilder::default()
            .node_limit(Some(1))
            .build().unwrap();
        let outcome = BranchAndBoundSolver.solve(&knapsack(), &budget).unwrap();
        assert_eq!(outcome.status(), SolveStatus::Timeout);
        assert!(!outcome.status().is_optimal());
    }
}
