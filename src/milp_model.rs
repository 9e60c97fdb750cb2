/*!
# MILP model
A small solver-independent representation of a mixed-integer linear program: bounded variables that are either
continuous or binary, linear constraints, and a linear objective that is always minimised.
Solver adapters only ever see this representation.

## Example usage
```rust
use strainmix::milp_model::{ConstraintSense, LinearExpr, MilpModel};

let mut model = MilpModel::default();
let x = model.add_binary("x");
let y = model.add_continuous("y", 0.0, 1.0);
model.add_constraint("sum", LinearExpr::default().with_term(x, 1.0).with_term(y, 1.0), ConstraintSense::Equal, 1.0);
model.set_objective(LinearExpr::default().with_term(y, 2.0));

assert!(model.is_feasible(&[1.0, 0.0], 1e-9));
assert_eq!(model.evaluate_objective(&[1.0, 0.0]), 0.0);
```
*/

use serde::Serialize;

/// Index of a variable in its model
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct VarId(usize);

impl VarId {
    /// Wraps a raw index, only meaningful for the model that produced it
    pub fn from_index(index: usize) -> Self {
        VarId(index)
    }

    /// Position of this variable in a value vector
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum VariableKind {
    Continuous,
    Binary
}

/// A bounded variable
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VariableDef {
    /// Human-readable name, used in solver logs
    name: String,
    kind: VariableKind,
    lower: f64,
    upper: f64
}

impl VariableDef {
    /// Returns true for binary variables
    pub fn is_integer(&self) -> bool {
        self.kind == VariableKind::Binary
    }

    // getters
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }
}

/// A sparse linear expression
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>
}

impl LinearExpr {
    /// Adds `coefficient * var` to the expression
    pub fn add_term(&mut self, var: VarId, coefficient: f64) {
        self.terms.push((var, coefficient));
    }

    /// Builder form of [`LinearExpr::add_term`]
    pub fn with_term(mut self, var: VarId, coefficient: f64) -> Self {
        self.add_term(var, coefficient);
        self
    }

    /// Value of the expression for a full assignment
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms.iter()
            .map(|&(var, coefficient)| coefficient * values[var.index()])
            .sum()
    }

    // getters
    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ConstraintSense {
    LessEqual,
    GreaterEqual,
    Equal
}

/// `expr (sense) rhs`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinearConstraint {
    name: String,
    expr: LinearExpr,
    sense: ConstraintSense,
    rhs: f64
}

impl LinearConstraint {
    /// Returns true if the assignment satisfies this constraint within `tolerance`
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.sense {
            ConstraintSense::LessEqual => lhs <= self.rhs + tolerance,
            ConstraintSense::GreaterEqual => lhs >= self.rhs - tolerance,
            ConstraintSense::Equal => (lhs - self.rhs).abs() <= tolerance
        }
    }

    // getters
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expr(&self) -> &LinearExpr {
        &self.expr
    }

    pub fn sense(&self) -> ConstraintSense {
        self.sense
    }

    pub fn rhs(&self) -> f64 {
        self.rhs
    }
}

/// A minimisation MILP
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MilpModel {
    variables: Vec<VariableDef>,
    constraints: Vec<LinearConstraint>,
    objective: LinearExpr,
    /// Warm starts, each a set of (integer variable, value) fixings that a solver can complete with one LP
    starts: Vec<Vec<(VarId, f64)>>
}

impl MilpModel {
    /// Adds a continuous variable in `[lower, upper]`
    pub fn add_continuous(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.add_variable(name.into(), VariableKind::Continuous, lower, upper)
    }

    /// Adds a binary variable
    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.add_variable(name.into(), VariableKind::Binary, 0.0, 1.0)
    }

    fn add_variable(&mut self, name: String, kind: VariableKind, lower: f64, upper: f64) -> VarId {
        let id = VarId(self.variables.len());
        self.variables.push(VariableDef { name, kind, lower, upper });
        id
    }

    /// Adds the constraint `expr (sense) rhs`
    pub fn add_constraint(&mut self, name: impl Into<String>, expr: LinearExpr, sense: ConstraintSense, rhs: f64) {
        self.constraints.push(LinearConstraint {
            name: name.into(),
            expr,
            sense,
            rhs
        });
    }

    /// Replaces the objective
    pub fn set_objective(&mut self, objective: LinearExpr) {
        self.objective = objective;
    }

    /// Registers a warm start; fixings on continuous variables are allowed but rarely useful
    pub fn add_start(&mut self, fixings: Vec<(VarId, f64)>) {
        self.starts.push(fixings);
    }

    /// Default bounds with the given fixings applied on top
    pub fn bounds_with(&self, fixings: &[(VarId, f64)]) -> Vec<(f64, f64)> {
        let mut bounds = self.bounds();
        for &(var, value) in fixings.iter() {
            bounds[var.index()] = (value, value);
        }
        bounds
    }

    /// Objective value of a full assignment
    pub fn evaluate_objective(&self, values: &[f64]) -> f64 {
        self.objective.evaluate(values)
    }

    /// Checks bounds, integrality, and every constraint
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        if values.len() != self.variables.len() {
            return false;
        }
        let in_bounds = self.variables.iter().zip(values.iter())
            .all(|(def, &v)| {
                v >= def.lower - tolerance && v <= def.upper + tolerance &&
                    (!def.is_integer() || (v - v.round()).abs() <= tolerance)
            });
        in_bounds && self.constraints.iter().all(|c| c.is_satisfied(values, tolerance))
    }

    /// The integer variables, in creation order
    pub fn integer_variables(&self) -> Vec<VarId> {
        self.variables.iter()
            .enumerate()
            .filter(|(_i, def)| def.is_integer())
            .map(|(i, _def)| VarId(i))
            .collect()
    }

    /// Default bounds of every variable, in creation order
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.variables.iter()
            .map(|def| (def.lower, def.upper))
            .collect()
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    // getters
    pub fn variable(&self, id: VarId) -> &VariableDef {
        &self.variables[id.index()]
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn starts(&self) -> &[Vec<(VarId, f64)>] {
        &self.starts
    }
}
