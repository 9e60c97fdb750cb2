/*!
# LP relaxation
Solves the continuous relaxation of a [`MilpModel`] through `good_lp` and its pure-Rust `minilp` backend.
Bounds are passed per call, so branching and diving only ever tighten a copy of the model's own bounds.

## Example usage
```rust
use strainmix::milp_model::{ConstraintSense, LinearExpr, MilpModel};
use strainmix::solvers::lp_relaxation::solve_relaxation;

let mut model = MilpModel::default();
let x = model.add_binary("x");
model.add_constraint("half", LinearExpr::default().with_term(x, 2.0), ConstraintSense::Equal, 1.0);
model.set_objective(LinearExpr::default().with_term(x, 1.0));

let lp = solve_relaxation(&model, &model.bounds()).unwrap().unwrap();
assert!((lp.values()[0] - 0.5).abs() < 1e-9);
// fixing x to 1 makes the relaxation infeasible
assert!(solve_relaxation(&model, &[(1.0, 1.0)]).unwrap().is_none());
```
*/

use good_lp::solvers::minilp::minilp;
use good_lp::{variable, Expression, ProblemVariables, ResolutionError, Solution as _, SolverModel, Variable};
use log::trace;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::milp_model::{ConstraintSense, LinearExpr, MilpModel};
use crate::solvers::SolverError;

/// Optimal point of an LP relaxation
#[derive(Clone, Debug, PartialEq)]
pub struct LpSolution {
    /// One value per model variable, clamped into the provided bounds
    values: Vec<f64>,
    /// Model objective at `values`
    objective: f64
}

impl LpSolution {
    // getters
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Solves the continuous relaxation of a model with the given variable bounds.
/// Integrality is ignored; bounds replace the model's own bounds so branching can tighten them.
/// Returns `Ok(None)` when the relaxation is infeasible.
/// # Arguments
/// * `model` - the model to relax
/// * `bounds` - one (lower, upper) pair per variable
/// # Errors
/// * if the LP engine reports an unbounded problem or fails numerically
pub fn solve_relaxation(model: &MilpModel, bounds: &[(f64, f64)]) -> Result<Option<LpSolution>, SolverError> {
    if bounds.len() != model.num_variables() {
        return Err(SolverError::Numerical {
            message: format!("{} bounds provided for {} variables", bounds.len(), model.num_variables())
        });
    }
    if bounds.iter().any(|&(lower, upper)| lower > upper) {
        return Ok(None);
    }

    let mut problem = ProblemVariables::new();
    let lp_variables: Vec<Variable> = bounds.iter()
        .map(|&(lower, upper)| problem.add(variable().min(lower).max(upper)))
        .collect();

    let mut lp = problem.minimise(to_expression(model.objective(), &lp_variables)).using(minilp);
    for constraint in model.constraints().iter() {
        let expr = to_expression(constraint.expr(), &lp_variables);
        let lp_constraint = match constraint.sense() {
            ConstraintSense::LessEqual => expr.leq(constraint.rhs()),
            ConstraintSense::GreaterEqual => expr.geq(constraint.rhs()),
            ConstraintSense::Equal => expr.eq(constraint.rhs())
        };
        lp.add_constraint(lp_constraint);
    }

    // the LP engine can panic on degenerate pivots, surface that as a numerical failure
    let result = catch_unwind(AssertUnwindSafe(move || lp.solve()))
        .map_err(|_| SolverError::Numerical { message: "LP engine panicked".to_string() })?;

    match result {
        Ok(solution) => {
            let values: Vec<f64> = lp_variables.iter().zip(bounds.iter())
                .map(|(&v, &(lower, upper))| solution.value(v).clamp(lower, upper))
                .collect();
            let objective = model.evaluate_objective(&values);
            trace!("LP relaxation objective {objective}");
            Ok(Some(LpSolution { values, objective }))
        },
        Err(ResolutionError::Infeasible) => Ok(None),
        Err(ResolutionError::Unbounded) => Err(SolverError::Unbounded),
        Err(e) => Err(SolverError::Numerical { message: e.to_string() })
    }
}

/// Converts a model expression into the LP engine's expression type
fn to_expression(expr: &LinearExpr, lp_variables: &[Variable]) -> Expression {
    let mut lp_expr = Expression::with_capacity(expr.terms().len());
    for &(var, coefficient) in expr.terms().iter() {
        lp_expr.add_mul(coefficient, lp_variables[var.index()]);
    }
    lp_expr
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    /// max x + y s.t. x + 2y <= 4, 3x + y <= 6, written as a minimisation
    fn small_model() -> MilpModel {
        let mut model = MilpModel::default();
        let x = model.add_continuous("x", 0.0, 10.0);
        let y = model.add_continuous("y", 0.0, 10.0);
        model.add_constraint("c1", LinearExpr::default().with_term(x, 1.0).with_term(y, 2.0), ConstraintSense::LessEqual, 4.0);
        model.add_constraint("c2", LinearExpr::default().with_term(x, 3.0).with_term(y, 1.0), ConstraintSense::LessEqual, 6.0);
        model.set_objective(LinearExpr::default().with_term(x, -1.0).with_term(y, -1.0));
        model
    }

    #[test]
    fn test_relaxation() {
        let model = small_model();
        let solution = solve_relaxation(&model, &model.bounds()).unwrap().unwrap();
        // optimum at x = 1.6, y = 1.2
        assert_approx_eq!(solution.values()[0], 1.6);
        assert_approx_eq!(solution.values()[1], 1.2);
        assert_approx_eq!(solution.objective(), -2.8);
    }

    #[test]
    fn test_tightened_bounds() {
        let model = small_model();
        let solution = solve_relaxation(&model, &[(0.0, 1.0), (0.0, 10.0)]).unwrap().unwrap();
        assert_approx_eq!(solution.values()[0], 1.0);
        assert_approx_eq!(solution.values()[1], 1.5);
    }

    #[test]
    fn test_infeasible() {
        let mut model = small_model();
        let x = crate::milp_model::VarId::from_index(0);
        model.add_constraint("c3", LinearExpr::default().with_term(x, 1.0), ConstraintSense::GreaterEqual, 5.0);
        assert!(solve_relaxation(&model, &model.bounds()).unwrap().is_none());
        // crossed bounds are infeasible without calling the engine
        assert!(solve_relaxation(&small_model(), &[(2.0, 1.0), (0.0, 1.0)]).unwrap().is_none());
    }
}
