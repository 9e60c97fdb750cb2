/*!
# Model builder
Builds the deconvolution MILP for one fixed strain count K.

For slots `k`, positions `j`, and the symbols `s` observed at each position:
* `a[k]` - slot abundance, `sum_k a[k] = 1`, and `a[k] >= a[k+1]` to remove slot permutations
* `x[k,j,s]` - binary, slot `k` carries symbol `s` at position `j`; exactly one symbol per (slot, position)
* `y[k,j,s]` - the product `a[k] * x[k,j,s]`, linearised with McCormick envelopes
* `d[j,s]` - `|f[j,s] - sum_k y[k,j,s]|`, and `dmax >= sum_s d[j,s]` for every position
* `m[k,c]` - binary, slot `k` equals equivalence class `c`; forced to 0 unless every symbol matches
* `n[k]` - novel abundance of slot `k`, `n[k] >= a[k] - sum_c m[k,c]`
* `p[r,k]` - binary, slot `k` phases fragment pattern `r`; `u[r] >= 1 - sum_k p[r,k]`

The objective is `w_nsu * sum n + w_avg / P * sum d + w_max * dmax + w_unphased / F * sum support[r] * u[r]`.
Every variable is bounded, so the model is never unbounded, and the all-novel assignment is always feasible.

Each model also carries warm starts that fix every integer variable, so a solver can turn them into incumbents
with one LP. The defaults are the best single-strain genotypes (majority calls and catalogue classes, improved one
position at a time) copied into every slot, plus mixtures of distinct candidates when K > 1. A copied genotype
scores exactly its single-strain objective, so incumbents for K > 1 never start worse than the single-strain seeds.
*/

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::data_types::genotype::EquivalenceClass;
use crate::data_types::nucleotide::Nucleotide;
use crate::data_types::position::Position;
use crate::data_types::read_fragment::ReadFragment;
use crate::data_types::solution::ObjectiveWeights;
use crate::milp_model::{ConstraintSense, LinearExpr, MilpModel, VarId};

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("the strain count must be at least 1")]
    ZeroStrains,
    #[error("objective weights must be finite and non-negative")]
    InvalidWeights,
    #[error("equivalence class {class_index} has {found} symbols, expected {expected}")]
    GenotypeLength { class_index: usize, expected: usize, found: usize },
    #[error("fragment {read_id} references position index {position_index}, only {num_positions} positions exist")]
    FragmentOutOfRange { read_id: String, position_index: usize, num_positions: usize },
    #[error("fragment {read_id} calls {symbol} at position index {position_index}, which is not an observed symbol")]
    UnobservedSymbol { read_id: String, position_index: usize, symbol: Nucleotide },
    #[error("warm start has {found} genotypes, expected {expected}")]
    StartSize { expected: usize, found: usize },
    #[error("warm start genotype for slot {slot} does not fit the positions")]
    StartGenotype { slot: usize }
}

/// Catalogue classes copied into the default warm starts, best single-strain objective first
const MAX_CLASS_STARTS: usize = 32;
/// Seeds improved by single-position search, the majority genotype plus the best classes
const MAX_SEARCH_SEEDS: usize = 4;
/// Minimum objective decrease accepted by the single-position search
const IMPROVEMENT_TOLERANCE: f64 = 1e-9;

/// Identical fragments grouped together
#[derive(Clone, Debug, PartialEq)]
pub struct PhasingPattern {
    /// (position index, symbol index) pairs
    calls: Vec<(usize, usize)>,
    /// Number of fragments with this pattern
    support: usize
}

impl PhasingPattern {
    /// Returns true if a strain with these symbol indices carries every call of the pattern
    pub fn is_phased_by(&self, genotype: &[usize]) -> bool {
        self.calls.iter().all(|&(j, s)| genotype.get(j) == Some(&s))
    }

    // getters
    pub fn calls(&self) -> &[(usize, usize)] {
        &self.calls
    }

    pub fn support(&self) -> usize {
        self.support
    }
}

/// Maps the structure of the deconvolution problem onto model variables
#[derive(Clone, Debug)]
pub struct ModelLayout {
    k: usize,
    /// Symbols observed at each position, in the order used by `assignment`
    symbols: Vec<Vec<Nucleotide>>,
    /// Observed frequencies, parallel to `symbols`
    frequencies: Vec<Vec<f64>>,
    /// a[k]
    abundance: Vec<VarId>,
    /// x[k][j][s]
    assignment: Vec<Vec<Vec<VarId>>>,
    /// y[k][j][s]
    weighted: Vec<Vec<Vec<VarId>>>,
    /// d[j][s]
    deviation: Vec<Vec<VarId>>,
    /// dmax, absent when there are no positions
    deviation_max: Option<VarId>,
    /// Class indices a slot can match, classes with an unobserved symbol are unreachable
    reachable_classes: Vec<usize>,
    /// Symbol indices of each reachable class, parallel to `reachable_classes`
    class_symbols: Vec<Vec<usize>>,
    /// m[k][c], parallel to `reachable_classes`
    class_match: Vec<Vec<VarId>>,
    /// n[k]
    novel: Vec<VarId>,
    /// Grouped fragments
    patterns: Vec<PhasingPattern>,
    /// p[r][k]
    phase: Vec<Vec<VarId>>,
    /// u[r]
    unphased: Vec<VarId>,
    /// Total fragment count, sum of the pattern supports
    num_fragments: usize
}

impl ModelLayout {
    /// Number of positions
    pub fn num_positions(&self) -> usize {
        self.symbols.len()
    }

    /// The abundance variable for a slot
    pub fn abundance(&self, slot: usize) -> VarId {
        self.abundance[slot]
    }

    /// The assignment variables for a (slot, position), parallel to `symbols(position)`
    pub fn assignment(&self, slot: usize, position: usize) -> &[VarId] {
        &self.assignment[slot][position]
    }

    /// The abundance-weighted assignment variables for a (slot, position)
    pub fn weighted(&self, slot: usize, position: usize) -> &[VarId] {
        &self.weighted[slot][position]
    }

    /// The symbols observed at a position
    pub fn symbols(&self, position: usize) -> &[Nucleotide] {
        &self.symbols[position]
    }

    /// The observed frequencies at a position, parallel to `symbols(position)`
    pub fn frequencies(&self, position: usize) -> &[f64] {
        &self.frequencies[position]
    }

    /// The class indicator variables for a slot, parallel to `reachable_classes()`
    pub fn class_match(&self, slot: usize) -> &[VarId] {
        &self.class_match[slot]
    }

    /// The phasing indicator of a (pattern, slot)
    pub fn phase(&self, pattern: usize, slot: usize) -> VarId {
        self.phase[pattern][slot]
    }

    /// Returns true if `genotype` holds one valid symbol index per position
    pub fn fits(&self, genotype: &[usize]) -> bool {
        genotype.len() == self.symbols.len() &&
            genotype.iter().zip(self.symbols.iter()).all(|(&s, syms)| s < syms.len())
    }

    /// Symbol indices carried by a slot in a full assignment, `None` unless exactly one symbol is set everywhere
    pub fn slot_genotype(&self, values: &[f64], slot: usize) -> Option<Vec<usize>> {
        self.assignment.get(slot)?.iter()
            .map(|vars| {
                let mut chosen = vars.iter().enumerate().filter(|(_s, var)| values[var.index()] > 0.5);
                match (chosen.next(), chosen.next()) {
                    (Some((s, _var)), None) => Some(s),
                    _ => None
                }
            })
            .collect()
    }

    /// Objective of a single strain carrying `genotype` at abundance 1, which is also the objective of that
    /// genotype copied into every slot
    pub fn single_strain_objective(&self, genotype: &[usize], weights: &ObjectiveWeights) -> f64 {
        let is_known = self.class_symbols.iter().any(|c| c.as_slice() == genotype);
        let mut objective = if is_known { 0.0 } else { weights.novel_usage() };

        let deviations: Vec<f64> = self.frequencies.iter().zip(genotype.iter())
            .map(|(frequencies, &chosen)| {
                frequencies.iter().enumerate()
                    .map(|(s, &f)| if s == chosen { 1.0 - f } else { f })
                    .sum()
            })
            .collect();
        if !deviations.is_empty() {
            objective += weights.deviation_average() * deviations.iter().sum::<f64>() / deviations.len() as f64;
            objective += weights.deviation_maximum() * deviations.iter().copied().fold(0.0, f64::max);
        }

        if self.num_fragments > 0 {
            let unphased: usize = self.patterns.iter()
                .filter(|p| !p.is_phased_by(genotype))
                .map(|p| p.support)
                .sum();
            objective += weights.unphased() * unphased as f64 / self.num_fragments as f64;
        }
        objective
    }

    // getters
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn deviation(&self) -> &[Vec<VarId>] {
        &self.deviation
    }

    pub fn deviation_max(&self) -> Option<VarId> {
        self.deviation_max
    }

    pub fn reachable_classes(&self) -> &[usize] {
        &self.reachable_classes
    }

    pub fn class_symbols(&self) -> &[Vec<usize>] {
        &self.class_symbols
    }

    pub fn novel(&self) -> &[VarId] {
        &self.novel
    }

    pub fn patterns(&self) -> &[PhasingPattern] {
        &self.patterns
    }

    pub fn unphased(&self) -> &[VarId] {
        &self.unphased
    }

    pub fn num_fragments(&self) -> usize {
        self.num_fragments
    }
}

/// A built model together with its layout
#[derive(Clone, Debug)]
pub struct StrainModel {
    model: MilpModel,
    layout: ModelLayout
}

impl StrainModel {
    /// Registers a warm start that gives each slot one genotype, as symbol indices per position.
    /// Class and phasing indicators are fixed to agree with the genotypes; abundances are left to the solver.
    /// # Errors
    /// * if there is not exactly one genotype per slot, or a genotype does not fit the positions
    pub fn add_genotype_start(&mut self, genotypes: &[Vec<usize>]) -> Result<(), ModelError> {
        let layout = &self.layout;
        if genotypes.len() != layout.k {
            return Err(ModelError::StartSize { expected: layout.k, found: genotypes.len() });
        }

        let mut fixings = vec![];
        for (slot, genotype) in genotypes.iter().enumerate() {
            if !layout.fits(genotype) {
                return Err(ModelError::StartGenotype { slot });
            }
            for (vars, &chosen) in layout.assignment[slot].iter().zip(genotype.iter()) {
                fixings.extend(vars.iter().enumerate().map(|(s, &x)| (x, if s == chosen { 1.0 } else { 0.0 })));
            }

            // classes are distinct, so at most one matches
            let matched = layout.class_symbols.iter().position(|c| c == genotype);
            fixings.extend(layout.class_match[slot].iter().enumerate()
                .map(|(ci, &m)| (m, if matched == Some(ci) { 1.0 } else { 0.0 })));

            fixings.extend(layout.patterns.iter().zip(layout.phase.iter())
                .map(|(pattern, phase)| (phase[slot], if pattern.is_phased_by(genotype) { 1.0 } else { 0.0 })));
        }
        self.model.add_start(fixings);
        Ok(())
    }

    // getters
    pub fn model(&self) -> &MilpModel {
        &self.model
    }

    pub fn layout(&self) -> &ModelLayout {
        &self.layout
    }
}

/// Builds the model for a fixed strain count.
/// # Arguments
/// * `positions` - retained variable positions
/// * `fragments` - phasing fragments, position indices refer to `positions`
/// * `classes` - the known identities
/// * `k` - the strain count, must be at least 1
/// * `weights` - objective weights
/// # Errors
/// * if `k` is 0 or the weights are invalid
/// * if a class or fragment is inconsistent with the positions
pub fn build_model(
    positions: &[Position], fragments: &[ReadFragment], classes: &[EquivalenceClass], k: usize, weights: &ObjectiveWeights
) -> Result<StrainModel, ModelError> {
    if k == 0 {
        return Err(ModelError::ZeroStrains);
    }
    if !weights.is_valid() {
        return Err(ModelError::InvalidWeights);
    }

    let num_positions = positions.len();
    let symbols: Vec<Vec<Nucleotide>> = positions.iter()
        .map(|p| p.symbols().collect())
        .collect();
    let frequencies: Vec<Vec<f64>> = positions.iter()
        .map(|p| p.frequencies().iter().map(|&(_s, f)| f).collect())
        .collect();

    let reachable_classes = reachable_classes(positions, classes)?;
    // reachable classes only carry observed symbols
    let class_symbols: Vec<Vec<usize>> = reachable_classes.iter()
        .map(|&c| {
            classes[c].genotype().iter().zip(positions.iter())
                .filter_map(|(&symbol, position)| position.symbol_index(symbol))
                .collect()
        })
        .collect();
    let patterns = group_patterns(positions, fragments)?;
    let num_fragments: usize = patterns.iter().map(|p| p.support).sum();

    let mut model = MilpModel::default();

    // abundances
    let abundance: Vec<VarId> = (0..k)
        .map(|slot| model.add_continuous(format!("a[{slot}]"), 0.0, 1.0))
        .collect();

    // assignments
    let assignment: Vec<Vec<Vec<VarId>>> = (0..k)
        .map(|slot| {
            symbols.iter().enumerate()
                .map(|(j, syms)| {
                    syms.iter()
                        .map(|s| model.add_binary(format!("x[{slot},{j},{s}]")))
                        .collect()
                })
                .collect()
        })
        .collect();

    // abundance-weighted assignments
    let weighted: Vec<Vec<Vec<VarId>>> = (0..k)
        .map(|slot| {
            symbols.iter().enumerate()
                .map(|(j, syms)| {
                    syms.iter()
                        .map(|s| model.add_continuous(format!("y[{slot},{j},{s}]"), 0.0, 1.0))
                        .collect()
                })
                .collect()
        })
        .collect();

    // per-symbol deviations; each is at most 1
    let deviation: Vec<Vec<VarId>> = symbols.iter().enumerate()
        .map(|(j, syms)| {
            syms.iter()
                .map(|s| model.add_continuous(format!("d[{j},{s}]"), 0.0, 1.0))
                .collect()
        })
        .collect();

    // per-position deviation sums are at most 2
    let deviation_max = if num_positions > 0 {
        Some(model.add_continuous("dmax", 0.0, 2.0))
    } else {
        None
    };

    let class_match: Vec<Vec<VarId>> = (0..k)
        .map(|slot| {
            reachable_classes.iter()
                .map(|c| model.add_binary(format!("m[{slot},{c}]")))
                .collect()
        })
        .collect();

    let novel: Vec<VarId> = (0..k)
        .map(|slot| model.add_continuous(format!("n[{slot}]"), 0.0, 1.0))
        .collect();

    let phase: Vec<Vec<VarId>> = (0..patterns.len())
        .map(|r| {
            (0..k)
                .map(|slot| model.add_binary(format!("p[{r},{slot}]")))
                .collect()
        })
        .collect();

    let unphased: Vec<VarId> = (0..patterns.len())
        .map(|r| model.add_continuous(format!("u[{r}]"), 0.0, 1.0))
        .collect();

    // abundances sum to one, ordered non-increasing
    let total = abundance.iter().fold(LinearExpr::default(), |expr, &a| expr.with_term(a, 1.0));
    model.add_constraint("abundance_sum", total, ConstraintSense::Equal, 1.0);
    for slot in 1..k {
        let expr = LinearExpr::default()
            .with_term(abundance[slot - 1], 1.0)
            .with_term(abundance[slot], -1.0);
        model.add_constraint(format!("abundance_order[{slot}]"), expr, ConstraintSense::GreaterEqual, 0.0);
    }

    for slot in 0..k {
        for j in 0..num_positions {
            // one symbol per slot and position
            let one_hot = assignment[slot][j].iter()
                .fold(LinearExpr::default(), |expr, &x| expr.with_term(x, 1.0));
            model.add_constraint(format!("one_symbol[{slot},{j}]"), one_hot, ConstraintSense::Equal, 1.0);

            // y = a * x
            for (s, (&x, &y)) in assignment[slot][j].iter().zip(weighted[slot][j].iter()).enumerate() {
                let a = abundance[slot];
                model.add_constraint(format!("mc_x[{slot},{j},{s}]"),
                    LinearExpr::default().with_term(y, 1.0).with_term(x, -1.0), ConstraintSense::LessEqual, 0.0);
                model.add_constraint(format!("mc_a[{slot},{j},{s}]"),
                    LinearExpr::default().with_term(y, 1.0).with_term(a, -1.0), ConstraintSense::LessEqual, 0.0);
                model.add_constraint(format!("mc_ax[{slot},{j},{s}]"),
                    LinearExpr::default().with_term(y, 1.0).with_term(a, -1.0).with_term(x, -1.0), ConstraintSense::GreaterEqual, -1.0);
            }
        }
    }

    // d >= |f - sum_k y|
    for j in 0..num_positions {
        for (s, &frequency) in frequencies[j].iter().enumerate() {
            let mut upper = LinearExpr::default().with_term(deviation[j][s], 1.0);
            let mut lower = LinearExpr::default().with_term(deviation[j][s], 1.0);
            for slot_weighted in weighted.iter() {
                upper.add_term(slot_weighted[j][s], 1.0);
                lower.add_term(slot_weighted[j][s], -1.0);
            }
            model.add_constraint(format!("dev_hi[{j},{s}]"), upper, ConstraintSense::GreaterEqual, frequency);
            model.add_constraint(format!("dev_lo[{j},{s}]"), lower, ConstraintSense::GreaterEqual, -frequency);
        }

        if let Some(dmax) = deviation_max {
            let expr = deviation[j].iter()
                .fold(LinearExpr::default().with_term(dmax, 1.0), |expr, &d| expr.with_term(d, -1.0));
            model.add_constraint(format!("dev_max[{j}]"), expr, ConstraintSense::GreaterEqual, 0.0);
        }
    }

    // class matching
    for slot in 0..k {
        for (ci, &class_index) in reachable_classes.iter().enumerate() {
            let m = class_match[slot][ci];
            for (j, &s) in class_symbols[ci].iter().enumerate() {
                model.add_constraint(format!("match[{slot},{class_index},{j}]"),
                    LinearExpr::default().with_term(m, 1.0).with_term(assignment[slot][j][s], -1.0),
                    ConstraintSense::LessEqual, 0.0);
            }
        }

        if !class_match[slot].is_empty() {
            let at_most_one = class_match[slot].iter()
                .fold(LinearExpr::default(), |expr, &m| expr.with_term(m, 1.0));
            model.add_constraint(format!("one_class[{slot}]"), at_most_one, ConstraintSense::LessEqual, 1.0);
        }

        let novel_expr = class_match[slot].iter()
            .fold(LinearExpr::default().with_term(novel[slot], 1.0).with_term(abundance[slot], -1.0),
                |expr, &m| expr.with_term(m, 1.0));
        model.add_constraint(format!("novel[{slot}]"), novel_expr, ConstraintSense::GreaterEqual, 0.0);
    }

    // phasing
    for (r, pattern) in patterns.iter().enumerate() {
        for slot in 0..k {
            for &(j, s) in pattern.calls.iter() {
                model.add_constraint(format!("phase[{r},{slot},{j}]"),
                    LinearExpr::default().with_term(phase[r][slot], 1.0).with_term(assignment[slot][j][s], -1.0),
                    ConstraintSense::LessEqual, 0.0);
            }
        }
        let covered = phase[r].iter()
            .fold(LinearExpr::default().with_term(unphased[r], 1.0), |expr, &p| expr.with_term(p, 1.0));
        model.add_constraint(format!("unphased[{r}]"), covered, ConstraintSense::GreaterEqual, 1.0);
    }

    // objective
    let mut objective = LinearExpr::default();
    for &n in novel.iter() {
        objective.add_term(n, weights.novel_usage());
    }
    if num_positions > 0 {
        let scale = weights.deviation_average() / num_positions as f64;
        for &d in deviation.iter().flatten() {
            objective.add_term(d, scale);
        }
    }
    if let Some(dmax) = deviation_max {
        objective.add_term(dmax, weights.deviation_maximum());
    }
    if num_fragments > 0 {
        let scale = weights.unphased() / num_fragments as f64;
        for (pattern, &u) in patterns.iter().zip(unphased.iter()) {
            objective.add_term(u, scale * pattern.support as f64);
        }
    }
    model.set_objective(objective);

    debug!("K#{k} model: {} variables ({} binary), {} constraints, {} reachable classes, {} phasing patterns",
        model.num_variables(), model.integer_variables().len(), model.num_constraints(), reachable_classes.len(), patterns.len());

    let layout = ModelLayout {
        k,
        symbols,
        frequencies,
        abundance,
        assignment,
        weighted,
        deviation,
        deviation_max,
        reachable_classes,
        class_symbols,
        class_match,
        novel,
        patterns,
        phase,
        unphased,
        num_fragments
    };
    let mut strain_model = StrainModel { model, layout };
    add_default_starts(&mut strain_model, positions, weights)?;
    Ok(strain_model)
}

/// Seeds the model with the best single-strain genotypes copied into every slot and, for K > 1, with mixtures of
/// distinct candidates: one led by catalogue classes, one led by genotypes that phase the fragment patterns
fn add_default_starts(strain_model: &mut StrainModel, positions: &[Position], weights: &ObjectiveWeights) -> Result<(), ModelError> {
    let layout = strain_model.layout();
    let k = layout.k();
    let score = |genotype: &[usize]| layout.single_strain_objective(genotype, weights);

    // Position guarantees at least two observed symbols, so the majority symbol always has an index
    let majority: Vec<usize> = positions.iter()
        .map(|p| p.symbol_index(p.majority_symbol()).unwrap_or(0))
        .collect();

    let mut ranked_classes: Vec<&Vec<usize>> = layout.class_symbols().iter().collect();
    ranked_classes.sort_by(|a, b| score(a.as_slice()).total_cmp(&score(b.as_slice())));
    ranked_classes.truncate(MAX_CLASS_STARTS);

    let mut candidates: IndexSet<Vec<usize>> = IndexSet::new();
    let search_seeds = std::iter::once(majority)
        .chain(ranked_classes.iter().take(MAX_SEARCH_SEEDS - 1).map(|c| c.to_vec()));
    for seed in search_seeds {
        candidates.insert(improve_single_strain(layout, weights, seed));
    }
    candidates.extend(ranked_classes.into_iter().cloned());
    let mut candidates: Vec<Vec<usize>> = candidates.into_iter().collect();
    candidates.sort_by(|a, b| score(a.as_slice()).total_cmp(&score(b.as_slice())));

    let mut starts: Vec<Vec<Vec<usize>>> = candidates.iter()
        .map(|genotype| vec![genotype.clone(); k])
        .collect();

    if k > 1 {
        if let Some(best) = candidates.first() {
            // the best genotype overlaid with each fragment pattern, most supported first
            let mut patterns: Vec<&PhasingPattern> = layout.patterns().iter().collect();
            patterns.sort_by_key(|p| std::cmp::Reverse(p.support));
            let mut overlays: IndexSet<Vec<usize>> = IndexSet::new();
            for pattern in patterns {
                let mut genotype = best.clone();
                for &(j, s) in pattern.calls.iter() {
                    genotype[j] = s;
                }
                if !candidates.contains(&genotype) {
                    overlays.insert(genotype);
                }
            }

            let class_led = mixture(best, candidates.iter().skip(1).chain(overlays.iter()), k);
            let pattern_led = mixture(best, overlays.iter().chain(candidates.iter().skip(1)), k);
            let mut mixtures: Vec<Vec<Vec<usize>>> = vec![];
            for slots in [class_led, pattern_led] {
                if !starts.contains(&slots) && !mixtures.contains(&slots) {
                    mixtures.push(slots);
                }
            }
            // mixtures go right after the best copied genotype
            for slots in mixtures.into_iter().rev() {
                starts.insert(1, slots);
            }
        }
    }

    let num_starts = starts.len();
    for start in starts.iter() {
        strain_model.add_genotype_start(start)?;
    }
    debug!("K#{k} seeded {num_starts} warm starts");
    Ok(())
}

/// `first` followed by the next distinct genotypes from `rest`, padded with `first` up to `k` slots
fn mixture<'a>(first: &[usize], rest: impl Iterator<Item = &'a Vec<usize>>, k: usize) -> Vec<Vec<usize>> {
    let mut slots = vec![first.to_vec()];
    for genotype in rest {
        if slots.len() >= k {
            break;
        }
        if !slots.contains(genotype) {
            slots.push(genotype.clone());
        }
    }
    slots.resize(k, first.to_vec());
    slots
}

/// Changes one position at a time while that lowers the single-strain objective
fn improve_single_strain(layout: &ModelLayout, weights: &ObjectiveWeights, mut genotype: Vec<usize>) -> Vec<usize> {
    let mut best = layout.single_strain_objective(&genotype, weights);
    let mut improved = true;
    while improved {
        improved = false;
        for j in 0..layout.num_positions() {
            let mut chosen = genotype[j];
            for s in 0..layout.symbols(j).len() {
                if s == chosen {
                    continue;
                }
                genotype[j] = s;
                let objective = layout.single_strain_objective(&genotype, weights);
                if objective < best - IMPROVEMENT_TOLERANCE {
                    best = objective;
                    chosen = s;
                    improved = true;
                }
            }
            genotype[j] = chosen;
        }
    }
    genotype
}

/// Returns the classes whose every symbol is observed at the matching position
fn reachable_classes(positions: &[Position], classes: &[EquivalenceClass]) -> Result<Vec<usize>, ModelError> {
    let mut reachable = vec![];
    for (class_index, class) in classes.iter().enumerate() {
        if class.genotype().len() != positions.len() {
            return Err(ModelError::GenotypeLength { class_index, expected: positions.len(), found: class.genotype().len() });
        }
        let observed = class.genotype().iter().zip(positions.iter())
            .all(|(&symbol, position)| position.is_observed(symbol));
        if observed {
            reachable.push(class_index);
        } else {
            debug!("Class {} carries a symbol that was not observed, it cannot be matched", class.label());
        }
    }
    Ok(reachable)
}

/// Converts fragments into symbol indices and groups identical ones, in first-seen order
fn group_patterns(positions: &[Position], fragments: &[ReadFragment]) -> Result<Vec<PhasingPattern>, ModelError> {
    let mut grouped: IndexMap<Vec<(usize, usize)>, usize> = IndexMap::new();
    for fragment in fragments.iter() {
        let mut calls = Vec::with_capacity(fragment.len());
        for &(position_index, symbol) in fragment.calls().iter() {
            let position = positions.get(position_index)
                .ok_or_else(|| ModelError::FragmentOutOfRange {
                    read_id: fragment.read_id().to_string(), position_index, num_positions: positions.len()
                })?;
            let symbol_index = position.symbol_index(symbol)
                .ok_or_else(|| ModelError::UnobservedSymbol {
                    read_id: fragment.read_id().to_string(), position_index, symbol
                })?;
            calls.push((position_index, symbol_index));
        }
        *grouped.entry(calls).or_insert(0) += 1;
    }

    Ok(grouped.into_iter()
        .map(|(calls, support)| PhasingPattern { calls, support })
        .collect())
}
