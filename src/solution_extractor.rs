/*!
# Solution extractor
Decodes a solver assignment into typed [`StrainVariant`]s and recomputes the four objective terms directly from
the decoded strains, independently of the model.
The recomputed objective must agree with the solver's: exactly (within tolerance) for proven optima, and never
exceed it for other incumbents, since the linearised objective can only over-estimate the true one.
*/

use log::debug;
use std::cmp::Ordering;

use crate::data_types::genotype::EquivalenceClass;
use crate::data_types::position::Position;
use crate::data_types::read_fragment::ReadFragment;
use crate::data_types::solution::{ObjectiveTerms, ObjectiveWeights, Solution};
use crate::data_types::solve_status::{SolveMethod, SolveStatus};
use crate::data_types::strain_variant::{StrainClassification, StrainVariant};
use crate::model_builder::StrainModel;

/// Allowed drift of the abundance sum away from 1
pub const ABUNDANCE_TOLERANCE: f64 = 1e-6;
/// Abundances closer than this are ordered by genotype instead
const ORDER_TOLERANCE: f64 = 1e-9;

#[derive(thiserror::Error, Debug)]
pub enum ExtractionError {
    #[error("solver returned {found} values for a model with {expected} variables")]
    ValueCount { expected: usize, found: usize },
    #[error("slot {slot} has {count} symbols assigned at position index {position}, expected exactly 1")]
    InvalidAssignment { slot: usize, position: usize, count: usize },
    #[error("abundances sum to {total}, expected 1")]
    AbundanceSum { total: f64 },
    #[error("recomputed objective {recomputed} disagrees with solver objective {reported} (status {status}, tolerance {tolerance})")]
    ObjectiveMismatch { reported: f64, recomputed: f64, status: SolveStatus, tolerance: f64 }
}

/// Everything about the outcome the extractor needs besides the values
#[derive(Clone, Copy, Debug)]
pub struct ReportedResult {
    /// Objective as reported by the solver
    pub objective: f64,
    pub status: SolveStatus,
    pub method: SolveMethod
}

/// Decodes an assignment into a [`Solution`].
/// # Arguments
/// * `strain_model` - the model the assignment belongs to
/// * `positions` - retained positions the model was built from
/// * `fragments` - phasing fragments the model was built from
/// * `classes` - the equivalence classes the model was built from
/// * `values` - one value per model variable
/// * `reported` - solver objective, status, and method
/// * `weights` - objective weights
/// * `tolerance` - allowed objective discrepancy
/// # Errors
/// * if the assignment does not decode into exactly one symbol per slot and position
/// * if the abundances do not sum to 1
/// * if the recomputed objective is inconsistent with the reported one
#[allow(clippy::too_many_arguments)]
pub fn extract_solution(
    strain_model: &StrainModel, positions: &[Position], fragments: &[ReadFragment], classes: &[EquivalenceClass],
    values: &[f64], reported: ReportedResult, weights: &ObjectiveWeights, tolerance: f64
) -> Result<Solution, ExtractionError> {
    let model = strain_model.model();
    let layout = strain_model.layout();
    if values.len() != model.num_variables() {
        return Err(ExtractionError::ValueCount { expected: model.num_variables(), found: values.len() });
    }

    let mut variants = Vec::with_capacity(layout.k());
    for slot in 0..layout.k() {
        let abundance = values[layout.abundance(slot).index()].clamp(0.0, 1.0);

        let mut genotype = Vec::with_capacity(layout.num_positions());
        for position in 0..layout.num_positions() {
            let chosen: Vec<usize> = layout.assignment(slot, position).iter()
                .enumerate()
                .filter(|(_s, var)| values[var.index()] > 0.5)
                .map(|(s, _var)| s)
                .collect();
            if chosen.len() != 1 {
                return Err(ExtractionError::InvalidAssignment { slot, position, count: chosen.len() });
            }
            genotype.push(layout.symbols(position)[chosen[0]]);
        }

        let classification = match classes.iter().position(|c| c.matches(&genotype)) {
            Some(class_index) => StrainClassification::Known { class_index, label: classes[class_index].label() },
            None => StrainClassification::Novel
        };
        variants.push(StrainVariant::new(abundance, genotype, classification));
    }

    let total: f64 = variants.iter().map(|v| v.abundance()).sum();
    if (total - 1.0).abs() > ABUNDANCE_TOLERANCE {
        return Err(ExtractionError::AbundanceSum { total });
    }

    sort_variants(&mut variants);
    let terms = compute_terms(positions, fragments, &variants);
    let objective = terms.weighted_sum(weights);
    check_consistency(objective, reported, tolerance)?;

    debug!("K#{} decoded: objective {objective:.6} (solver {:.6}), status {}", layout.k(), reported.objective, reported.status);
    Ok(Solution::new(layout.k(), variants, terms, objective, reported.objective, reported.status, reported.method))
}

/// Orders strains by abundance (descending), then genotype
pub fn sort_variants(variants: &mut [StrainVariant]) {
    variants.sort_by(|a, b| {
        let by_abundance = if (a.abundance() - b.abundance()).abs() <= ORDER_TOLERANCE {
            Ordering::Equal
        } else {
            b.abundance().total_cmp(&a.abundance())
        };
        by_abundance.then_with(|| a.genotype().cmp(b.genotype()))
    });
}

/// Summed absolute deviation at one position: for each observed symbol, |observed frequency - assigned abundance|
/// # Arguments
/// * `position` - the position
/// * `position_index` - its index in the strain genotypes
/// * `variants` - the strains
pub fn position_deviation(position: &Position, position_index: usize, variants: &[StrainVariant]) -> f64 {
    position.frequencies().iter()
        .map(|&(symbol, frequency)| {
            let assigned: f64 = variants.iter()
                .filter(|v| v.genotype()[position_index] == symbol)
                .map(|v| v.abundance())
                .sum();
            (frequency - assigned).abs()
        })
        .sum()
}

/// Recomputes all four objective terms from decoded strains
pub fn compute_terms(positions: &[Position], fragments: &[ReadFragment], variants: &[StrainVariant]) -> ObjectiveTerms {
    let novel_usage = variants.iter()
        .filter(|v| v.classification().is_novel())
        .map(|v| v.abundance())
        .sum();

    let deviations: Vec<f64> = positions.iter().enumerate()
        .map(|(j, p)| position_deviation(p, j, variants))
        .collect();
    let (deviation_average, deviation_maximum) = if deviations.is_empty() {
        (None, None)
    } else {
        let average = deviations.iter().sum::<f64>() / deviations.len() as f64;
        let maximum = deviations.iter().copied().fold(0.0, f64::max);
        (Some(average), Some(maximum))
    };

    let unphased = if fragments.is_empty() {
        None
    } else {
        let unphased_count = fragments.iter()
            .filter(|f| !variants.iter().any(|v| f.is_consistent_with(v.genotype())))
            .count();
        Some(unphased_count as f64 / fragments.len() as f64)
    };

    ObjectiveTerms {
        novel_usage,
        deviation_average,
        deviation_maximum,
        unphased
    }
}

/// Proven optima must match the reported objective; other incumbents must not exceed it
fn check_consistency(recomputed: f64, reported: ReportedResult, tolerance: f64) -> Result<(), ExtractionError> {
    let proven = reported.status.is_optimal() && reported.method == SolveMethod::Exact;
    let consistent = if proven {
        (recomputed - reported.objective).abs() <= tolerance
    } else {
        recomputed <= reported.objective + tolerance
    };

    if consistent {
        Ok(())
    } else {
        Err(ExtractionError::ObjectiveMismatch {
            reported: reported.objective, recomputed, status: reported.status, tolerance
        })
    }
}
