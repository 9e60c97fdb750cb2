
use derive_builder::Builder;
use serde::Serialize;

use crate::data_types::solve_status::{SolveMethod, SolveStatus};
use crate::data_types::strain_variant::StrainVariant;

/// Relative weights of the four objective terms
#[derive(Builder, Clone, Copy, Debug, PartialEq, Serialize)]
#[builder(default)]
pub struct ObjectiveWeights {
    /// Weight on novel strain usage
    novel_usage: f64,
    /// Weight on the average per-position deviation
    deviation_average: f64,
    /// Weight on the maximum per-position deviation
    deviation_maximum: f64,
    /// Weight on the unphased fragment ratio
    unphased: f64
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        // plain sum of the four terms
        Self {
            novel_usage: 1.0,
            deviation_average: 1.0,
            deviation_maximum: 1.0,
            unphased: 1.0
        }
    }
}

impl ObjectiveWeights {
    /// Returns true if every weight is finite and non-negative
    pub fn is_valid(&self) -> bool {
        [self.novel_usage, self.deviation_average, self.deviation_maximum, self.unphased].iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }

    // getters
    pub fn novel_usage(&self) -> f64 {
        self.novel_usage
    }

    pub fn deviation_average(&self) -> f64 {
        self.deviation_average
    }

    pub fn deviation_maximum(&self) -> f64 {
        self.deviation_maximum
    }

    pub fn unphased(&self) -> f64 {
        self.unphased
    }
}

/// The decomposed objective.
/// Terms that are undefined for degenerate inputs (no variable positions, no phasing fragments) are `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ObjectiveTerms {
    /// Novel strain usage (NSU)
    pub novel_usage: f64,
    /// Average per-position deviation (DEV_AVG)
    pub deviation_average: Option<f64>,
    /// Largest per-position deviation (DEV_MAX)
    pub deviation_maximum: Option<f64>,
    /// Fraction of phasing fragments not explained by any strain (UNPHASED)
    pub unphased: Option<f64>
}

impl ObjectiveTerms {
    /// Weighted sum of the terms, not-applicable terms contribute 0
    pub fn weighted_sum(&self, weights: &ObjectiveWeights) -> f64 {
        weights.novel_usage() * self.novel_usage +
            weights.deviation_average() * self.deviation_average.unwrap_or(0.0) +
            weights.deviation_maximum() * self.deviation_maximum.unwrap_or(0.0) +
            weights.unphased() * self.unphased.unwrap_or(0.0)
    }
}

/// Result of one deconvolution run at a fixed strain count
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Solution {
    /// The strain count this run was solved for
    k: usize,
    /// Exactly `k` strains, ordered by abundance (descending) then genotype
    variants: Vec<StrainVariant>,
    /// Objective terms recomputed from the decoded strains
    terms: ObjectiveTerms,
    /// Weighted sum of `terms`
    objective: f64,
    /// Objective value as reported by the solver
    solver_objective: f64,
    /// Solver termination status
    status: SolveStatus,
    /// Exact or heuristic
    method: SolveMethod
}

impl Solution {
    /// Constructor
    pub fn new(
        k: usize, variants: Vec<StrainVariant>, terms: ObjectiveTerms, objective: f64,
        solver_objective: f64, status: SolveStatus, method: SolveMethod
    ) -> Self {
        Self {
            k, variants, terms, objective, solver_objective, status, method
        }
    }

    /// Sum of all strain abundances, should be 1.0
    pub fn total_abundance(&self) -> f64 {
        self.variants.iter().map(|v| v.abundance()).sum()
    }

    /// Returns true if the solver proved this solution optimal
    pub fn is_optimal(&self) -> bool {
        self.status.is_optimal() && self.method == SolveMethod::Exact
    }

    // getters
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn variants(&self) -> &[StrainVariant] {
        &self.variants
    }

    pub fn terms(&self) -> &ObjectiveTerms {
        &self.terms
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn solver_objective(&self) -> f64 {
        self.solver_objective
    }

    pub fn status(&self) -> SolveStatus {
        self.status
    }

    pub fn method(&self) -> SolveMethod {
        self.method
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;

    #[test]
    fn test_weighted_sum() {
        let terms = ObjectiveTerms {
            novel_usage: 0.4,
            deviation_average: Some(0.1),
            deviation_maximum: Some(0.2),
            unphased: None
        };
        assert_approx_eq!(terms.weighted_sum(&ObjectiveWeights::default()), 0.7);

        let weights = ObjectiveWeightsBuilder::default()
            .novel_usage(2.0)
            .deviation_average(1.0)
            .deviation_maximum(0.5)
            .unphased(10.0)
            .build().unwrap();
        assert_approx_eq!(terms.weighted_sum(&weights), 1.0);
        assert!(weights.is_valid());
    }

    #[test]
    fn test_builder_defaults() {
        // builder(default) falls back to the struct Default, i.e. all ones
        let weights = ObjectiveWeightsBuilder::default().unphased(0.0).build().unwrap();
        assert_eq!(weights.novel_usage(), 1.0);
        assert_eq!(weights.unphased(), 0.0);
    }
}
