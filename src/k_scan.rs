/*!
# K-scan driver
Runs model building, solving, and extraction once per strain count K, and collects every result.
Runs share nothing but the read-only evidence and reference set, so they are solved in parallel.
A failing K is recorded and the scan moves on; K values that have not started when cancellation is requested are
recorded as cancelled.
For K > 1 the single-strain model is solved first within a quarter of the budget, and its genotype copied into
every slot becomes one more warm start, so a budget-limited run never reports worse than that single strain.

## Example usage
```rust
use strainmix::data_types::nucleotide::Nucleotide::*;
use strainmix::data_types::position::{Position, PositionId};
use strainmix::evidence_filter::FilteredEvidence;
use strainmix::k_scan::{run_k_scan, ScanConfigBuilder};
use strainmix::reference_set::CandidateReferenceSet;
use strainmix::solvers::branch_bound::BranchAndBoundSolver;

let evidence = FilteredEvidence::from_parts(
    vec![Position::new(PositionId::new("adk", 0), 100, vec![(A, 0.7), (C, 0.3)]).unwrap()],
    vec![]
);
let config = ScanConfigBuilder::default()
    .k_values(vec![1, 2])
    .build().unwrap();

let report = run_k_scan(&evidence, &CandidateReferenceSet::default(), &config, &BranchAndBoundSolver).unwrap();
assert_eq!(report.entries().len(), 2);
assert!(report.entries().iter().all(|e| e.result().is_ok()));
```
*/

use derive_builder::Builder;
use indicatif::{ParallelProgressIterator, ProgressIterator};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::time::{Duration, Instant};

use crate::data_types::solution::{ObjectiveWeights, Solution};
use crate::data_types::solve_status::SolveStatus;
use crate::evidence_filter::FilteredEvidence;
use crate::model_builder::{build_model, ModelError};
use crate::reference_set::CandidateReferenceSet;
use crate::solution_extractor::{extract_solution, ExtractionError, ReportedResult};
use crate::solvers::{ModelSolver, SolveBudget, SolverError, SolverLog};
use crate::util::progress_bar::get_progress_style;

/// Share of the per-K budget spent on the single-strain seed
const SINGLE_STRAIN_SHARE: f64 = 0.25;

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("invalid scan configuration: {message}")]
    InvalidConfig { message: String }
}

/// Why a single K produced no solution
#[derive(thiserror::Error, Debug)]
pub enum RunFailure {
    #[error("model construction failed: {0}")]
    Model(#[from] ModelError),
    #[error("solver failed: {0}")]
    Solver(#[from] SolverError),
    #[error("solution extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("the model is infeasible, which indicates a modeling error")]
    Infeasible,
    #[error("solver stopped ({status}) without a feasible assignment")]
    NoIncumbent { status: SolveStatus },
    #[error("cancelled before the run started")]
    Cancelled
}

/// Controls a scan over strain counts
#[derive(Builder, Clone, Debug)]
#[builder(default)]
pub struct ScanConfig {
    /// Strain counts to solve, in report order
    k_values: Vec<usize>,
    /// Objective weights
    weights: ObjectiveWeights,
    /// Per-K solve budget; its cancel flag also stops the scan between K values
    budget: SolveBudget,
    /// Allowed discrepancy between solver and recomputed objectives
    consistency_tolerance: f64,
    /// For K > 1, seed the search with the solved single-strain genotype
    single_strain_start: bool,
    /// Solve K values in parallel
    parallel: bool,
    /// Show a progress bar
    show_progress: bool
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            k_values: (1..=6).collect(),
            weights: ObjectiveWeights::default(),
            budget: SolveBudget::default(),
            consistency_tolerance: 1e-6,
            single_strain_start: true,
            parallel: true,
            show_progress: false
        }
    }
}

impl ScanConfig {
    /// Checks that the configuration can be run
    /// # Errors
    /// * if there are no K values, or a K value is 0
    /// * if the weights or tolerance are invalid
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.k_values.is_empty() {
            return Err(ScanError::InvalidConfig { message: "at least one K value is required".to_string() });
        }
        if self.k_values.contains(&0) {
            return Err(ScanError::InvalidConfig { message: "K values must be at least 1".to_string() });
        }
        if !self.weights.is_valid() {
            return Err(ScanError::InvalidConfig { message: "objective weights must be finite and non-negative".to_string() });
        }
        if !self.consistency_tolerance.is_finite() || self.consistency_tolerance < 0.0 {
            return Err(ScanError::InvalidConfig { message: format!("invalid consistency tolerance {}", self.consistency_tolerance) });
        }
        if !self.budget.relative_gap().is_finite() || self.budget.relative_gap() < 0.0 {
            return Err(ScanError::InvalidConfig { message: format!("invalid relative gap {}", self.budget.relative_gap()) });
        }
        Ok(())
    }

    // getters
    pub fn k_values(&self) -> &[usize] {
        &self.k_values
    }

    pub fn weights(&self) -> &ObjectiveWeights {
        &self.weights
    }

    pub fn budget(&self) -> &SolveBudget {
        &self.budget
    }

    pub fn consistency_tolerance(&self) -> f64 {
        self.consistency_tolerance
    }

    pub fn single_strain_start(&self) -> bool {
        self.single_strain_start
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    pub fn show_progress(&self) -> bool {
        self.show_progress
    }
}

/// Result of one K
#[derive(Debug)]
pub struct ScanEntry {
    k: usize,
    result: Result<Solution, RunFailure>,
    /// Diagnostic text from the solver, empty if it never ran
    solver_log: SolverLog,
    /// Solver bound, if it reported one
    best_bound: Option<f64>,
    /// LP relaxations solved
    nodes: usize,
    elapsed: Duration
}

impl ScanEntry {
    /// Objective of the solution, if there is one
    pub fn objective(&self) -> Option<f64> {
        self.result.as_ref().ok().map(|s| s.objective())
    }

    // getters
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn result(&self) -> &Result<Solution, RunFailure> {
        &self.result
    }

    pub fn solver_log(&self) -> &SolverLog {
        &self.solver_log
    }

    pub fn best_bound(&self) -> Option<f64> {
        self.best_bound
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// All entries of a scan, in configured K order
#[derive(Debug, Default)]
pub struct ScanReport {
    entries: Vec<ScanEntry>
}

impl ScanReport {
    /// Objective improvement of entry `index` over the previous entry, when both have solutions
    pub fn marginal_improvement(&self, index: usize) -> Option<f64> {
        if index == 0 || index >= self.entries.len() {
            return None;
        }
        let previous = self.entries[index - 1].objective()?;
        let current = self.entries[index].objective()?;
        Some(previous - current)
    }

    /// Successful solutions, in K order
    pub fn solutions(&self) -> impl Iterator<Item = &Solution> {
        self.entries.iter().filter_map(|e| e.result.as_ref().ok())
    }

    /// Number of failed K runs
    pub fn num_failures(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_err()).count()
    }

    // getters
    pub fn entries(&self) -> &[ScanEntry] {
        &self.entries
    }
}

/// Solves every configured K.
/// # Arguments
/// * `evidence` - the filtered evidence for one sample
/// * `reference` - the candidate reference set for the same sample
/// * `config` - scan configuration
/// * `solver` - the solver adapter to use for every K
/// # Errors
/// * if the configuration is invalid; per-K failures are recorded in the report instead
pub fn run_k_scan(
    evidence: &FilteredEvidence, reference: &CandidateReferenceSet, config: &ScanConfig, solver: &dyn ModelSolver
) -> Result<ScanReport, ScanError> {
    config.validate()?;
    info!("Scanning K in {:?} with {} solver, {} positions, {} fragments, {} classes",
        config.k_values(), solver.name(), evidence.positions().len(), evidence.fragments().len(), reference.classes().len());
    if evidence.is_degenerate() {
        warn!("The evidence has no variable positions, every K will only reflect the reference classes");
    }

    let k_values = config.k_values();
    let run = |&k: &usize| run_single_k(evidence, reference, k, config, solver);
    let entries: Vec<ScanEntry> = match (config.parallel(), config.show_progress()) {
        (true, true) => k_values.par_iter().progress_with_style(get_progress_style()).map(run).collect(),
        (true, false) => k_values.par_iter().map(run).collect(),
        (false, true) => k_values.iter().progress_with_style(get_progress_style()).map(run).collect(),
        (false, false) => k_values.iter().map(run).collect()
    };

    let report = ScanReport { entries };
    info!("Scan finished: {} of {} K values solved", report.entries().len() - report.num_failures(), report.entries().len());
    Ok(report)
}

/// Runs model building, solving, and extraction for one K, capturing any failure
fn run_single_k(
    evidence: &FilteredEvidence, reference: &CandidateReferenceSet, k: usize, config: &ScanConfig, solver: &dyn ModelSolver
) -> ScanEntry {
    let start = Instant::now();
    let mut entry = ScanEntry {
        k,
        result: Err(RunFailure::Cancelled),
        solver_log: SolverLog::default(),
        best_bound: None,
        nodes: 0,
        elapsed: Duration::ZERO
    };

    if config.budget().is_cancelled() {
        warn!("K#{k}: cancelled before start");
        return entry;
    }

    let result = solve_k(evidence, reference, k, config, solver, &mut entry);
    entry.result = result;
    entry.elapsed = start.elapsed();
    match entry.result.as_ref() {
        Ok(solution) => {
            info!("K#{k}: objective {:.6} ({}, {}) in {:.3}s", solution.objective(), solution.status(), solution.method(), entry.elapsed.as_secs_f64());
        },
        Err(RunFailure::Infeasible) => {
            error!("K#{k}: model reported infeasible, this is a modeling error");
        },
        Err(e) => {
            error!("K#{k}: run failed: {e}");
        }
    };
    entry
}

/// The fallible part of a single K run; solver diagnostics are written into `entry` as they become available
fn solve_k(
    evidence: &FilteredEvidence, reference: &CandidateReferenceSet, k: usize, config: &ScanConfig, solver: &dyn ModelSolver,
    entry: &mut ScanEntry
) -> Result<Solution, RunFailure> {
    let positions = evidence.positions();
    let fragments = evidence.fragments();
    let classes = reference.classes();

    let start = Instant::now();
    let mut strain_model = build_model(positions, fragments, classes, k, config.weights())?;
    if k > 1 && config.single_strain_start() {
        match single_strain_genotype(evidence, reference, config, solver) {
            Ok((genotype, nodes)) => {
                entry.nodes += nodes;
                if let Some(genotype) = genotype {
                    entry.solver_log.push(format!("single-strain seed after {nodes} LP solves"));
                    strain_model.add_genotype_start(&vec![genotype; k])?;
                }
            },
            Err(e) => {
                debug!("K#{k}: single-strain seed failed: {e}");
                entry.solver_log.push(format!("single-strain seed failed: {e}"));
            }
        };
    }

    debug!("K#{k}: solving with {}", solver.name());
    let budget = config.budget().remaining(start.elapsed(), entry.nodes);
    let outcome = solver.solve(strain_model.model(), &budget)?;
    entry.solver_log.extend(outcome.log().clone());
    entry.best_bound = outcome.best_bound();
    entry.nodes += outcome.nodes();

    let (values, objective) = match (outcome.values(), outcome.objective()) {
        (Some(values), Some(objective)) => (values, objective),
        _ => {
            return Err(match outcome.status() {
                SolveStatus::Infeasible => RunFailure::Infeasible,
                SolveStatus::Cancelled => RunFailure::Cancelled,
                status => RunFailure::NoIncumbent { status }
            });
        }
    };
    if !outcome.status().is_optimal() {
        warn!("K#{k}: solver returned a {} {} incumbent", outcome.status(), outcome.method());
    }

    let reported = ReportedResult {
        objective,
        status: outcome.status(),
        method: outcome.method()
    };
    let solution = extract_solution(
        &strain_model, positions, fragments, classes, values, reported, config.weights(), config.consistency_tolerance()
    )?;
    Ok(solution)
}

/// Solves the single-strain model within a share of the budget.
/// Returns the genotype as symbol indices, if the solver found one, and the LP solves it took.
fn single_strain_genotype(
    evidence: &FilteredEvidence, reference: &CandidateReferenceSet, config: &ScanConfig, solver: &dyn ModelSolver
) -> Result<(Option<Vec<usize>>, usize), RunFailure> {
    let single = build_model(evidence.positions(), evidence.fragments(), reference.classes(), 1, config.weights())?;
    let outcome = solver.solve(single.model(), &config.budget().scaled(SINGLE_STRAIN_SHARE))?;
    let genotype = outcome.values()
        .and_then(|values| single.layout().slot_genotype(values, 0));
    Ok((genotype, outcome.nodes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::genotype::KnownGenotype;
    use crate::data_types::nucleotide::Nucleotide::*;
    use crate::data_types::position::{Position, PositionId};
    use crate::data_types::read_fragment::ReadFragment;
    use crate::data_types::solve_status::SolveMethod;
    use crate::milp_model::MilpModel;
    use crate::solvers::branch_bound::BranchAndBoundSolver;
    use crate::solvers::diving::DivingSolver;
    use crate::solvers::{SolveBudgetBuilder, SolverOutcome};
    use approx_eq::assert_approx_eq;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn mixture_evidence() -> FilteredEvidence {
        FilteredEvidence::from_parts(
            vec![
                Position::new(PositionId::new("adk", 0), 100, vec![(A, 0.6), (T, 0.4)]).unwrap(),
                Position::new(PositionId::new("adk", 1), 100, vec![(G, 0.6), (C, 0.4)]).unwrap(),
            ],
            vec![
                ReadFragment::new("r1", vec![(0, A), (1, G)]).unwrap(),
                ReadFragment::new("r2", vec![(0, T), (1, C)]).unwrap(),
                ReadFragment::new("r3", vec![(0, A), (1, G)]).unwrap(),
            ]
        )
    }

    fn reference() -> CandidateReferenceSet {
        CandidateReferenceSet::from_genotypes(vec![KnownGenotype::new("ST1", vec![A, G])])
    }

    fn config(k_values: Vec<usize>) -> ScanConfig {
        ScanConfigBuilder::default()
            .k_values(k_values)
            .build().unwrap()
    }

    /// Fails with a numerical error whenever the model has exactly `fail_k` slots
    struct FailAtK {
        fail_k: usize
    }

    impl ModelSolver for FailAtK {
        fn name(&self) -> &'static str {
            "fail_at_k"
        }

        fn solve(&self, model: &MilpModel, budget: &SolveBudget) -> Result<SolverOutcome, SolverError> {
            let slots = model.variables().iter().filter(|v| v.name().starts_with("a[")).count();
            if slots == self.fail_k {
                Err(SolverError::Numerical { message: "injected".to_string() })
            } else {
                BranchAndBoundSolver.solve(model, budget)
            }
        }
    }

    #[test]
    fn test_monotonic_objective() {
        let report = run_k_scan(&mixture_evidence(), &reference(), &config(vec![1, 2, 3]), &BranchAndBoundSolver).unwrap();
        assert_eq!(report.num_failures(), 0);
        let objectives: Vec<f64> = report.entries().iter().map(|e| e.objective().unwrap()).collect();
        for pair in objectives.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-6);
        }
        assert!(report.marginal_improvement(1).unwrap() >= -1e-6);

        for solution in report.solutions() {
            assert!(solution.is_optimal());
            assert_eq!(solution.variants().len(), solution.k());
            assert!((solution.total_abundance() - 1.0).abs() <= 1e-6);
            assert!((solution.objective() - solution.solver_objective()).abs() <= 1e-6);
        }

        // K = 2 recovers the mixture exactly
        let k2 = report.entries()[1].result().as_ref().unwrap();
        assert_approx_eq!(k2.objective(), 0.4);
        assert_eq!(k2.terms().unphased, Some(0.0));
    }

    #[test]
    fn test_failure_isolation() {
        let report = run_k_scan(&mixture_evidence(), &reference(), &config(vec![1, 2, 3]), &FailAtK { fail_k: 2 }).unwrap();
        assert_eq!(report.num_failures(), 1);
        assert!(report.entries()[0].result().is_ok());
        assert!(matches!(report.entries()[1].result(), Err(RunFailure::Solver(SolverError::Numerical { .. }))));
        assert!(report.entries()[2].result().is_ok());
        assert_eq!(report.marginal_improvement(1), None);
        assert_eq!(report.marginal_improvement(2), None);
    }

    #[test]
    fn test_cancelled_scan() {
        let budget = SolveBudgetBuilder::default()
            .cancel(Some(Arc::new(AtomicBool::new(true))))
            .build().unwrap();
        let config = ScanConfigBuilder::default()
            .k_values(vec![1, 2])
            .budget(budget)
            .build().unwrap();
        let report = run_k_scan(&mixture_evidence(), &reference(), &config, &BranchAndBoundSolver).unwrap();
        assert_eq!(report.num_failures(), 2);
        assert!(report.entries().iter().all(|e| matches!(e.result(), Err(RunFailure::Cancelled))));
    }

    #[test]
    fn test_budget_limited_exact_run() {
        let single = run_k_scan(&mixture_evidence(), &reference(), &config(vec![1]), &BranchAndBoundSolver).unwrap();
        let single_objective = single.entries()[0].objective().unwrap();

        let budgets = [
            SolveBudgetBuilder::default().node_limit(Some(1)).build().unwrap(),
            SolveBudgetBuilder::default().time_limit(Some(Duration::ZERO)).build().unwrap(),
        ];
        for budget in budgets {
            let limited = ScanConfigBuilder::default()
                .k_values(vec![2, 3])
                .budget(budget)
                .build().unwrap();
            let report = run_k_scan(&mixture_evidence(), &reference(), &limited, &BranchAndBoundSolver).unwrap();
            assert_eq!(report.num_failures(), 0);
            for entry in report.entries() {
                let solution = entry.result().as_ref().unwrap();
                assert_eq!(solution.status(), SolveStatus::Timeout);
                assert_eq!(solution.method(), SolveMethod::Exact);
                assert!(!solution.is_optimal());
                assert!(solution.objective() <= solution.solver_objective() + 1e-6);
                assert!(solution.objective() <= single_objective + 1e-6);
            }
        }
    }

    #[test]
    fn test_single_strain_seed_toggle() {
        let seeded = run_k_scan(&mixture_evidence(), &reference(), &config(vec![2]), &BranchAndBoundSolver).unwrap();
        let unseeded_config = ScanConfigBuilder::default()
            .k_values(vec![2])
            .single_strain_start(false)
            .build().unwrap();
        let unseeded = run_k_scan(&mixture_evidence(), &reference(), &unseeded_config, &BranchAndBoundSolver).unwrap();

        assert!(seeded.entries()[0].solver_log().lines()[0].starts_with("single-strain seed"));
        assert!(!unseeded.entries()[0].solver_log().lines().iter().any(|l| l.contains("single-strain")));
        // both are proven optimal, so the seed cannot change the answer
        assert_approx_eq!(seeded.entries()[0].objective().unwrap(), unseeded.entries()[0].objective().unwrap());
    }

    #[test]
    fn test_heuristic_never_optimal() {
        let report = run_k_scan(&mixture_evidence(), &reference(), &config(vec![1, 2]), &DivingSolver).unwrap();
        for solution in report.solutions() {
            assert_eq!(solution.method(), SolveMethod::Heuristic);
            assert!(!solution.is_optimal());
            assert!(!solution.status().is_optimal());
        }
    }

    #[test]
    fn test_degenerate_evidence() {
        let evidence = FilteredEvidence::from_parts(vec![], vec![]);
        let report = run_k_scan(&evidence, &CandidateReferenceSet::default(), &config(vec![1]), &BranchAndBoundSolver).unwrap();
        let solution = report.entries()[0].result().as_ref().unwrap();
        assert_eq!(solution.terms().deviation_average, None);
        assert_eq!(solution.terms().unphased, None);
        assert_approx_eq!(solution.total_abundance(), 1.0);
    }

    #[test]
    fn test_no_fragments_unphased_not_applicable() {
        let evidence = FilteredEvidence::from_parts(mixture_evidence().positions().to_vec(), vec![]);
        let report = run_k_scan(&evidence, &reference(), &config(vec![2]), &BranchAndBoundSolver).unwrap();
        let solution = report.entries()[0].result().as_ref().unwrap();
        assert_eq!(solution.terms().unphased, None);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let sequential = ScanConfigBuilder::default()
            .k_values(vec![1, 2])
            .parallel(false)
            .build().unwrap();
        let a = run_k_scan(&mixture_evidence(), &reference(), &sequential, &BranchAndBoundSolver).unwrap();
        let b = run_k_scan(&mixture_evidence(), &reference(), &config(vec![1, 2]), &BranchAndBoundSolver).unwrap();
        let a_solutions: Vec<_> = a.solutions().collect();
        let b_solutions: Vec<_> = b.solutions().collect();
        assert_eq!(a_solutions, b_solutions);
    }

    #[test]
    fn test_invalid_config() {
        let evidence = mixture_evidence();
        assert!(run_k_scan(&evidence, &reference(), &config(vec![]), &BranchAndBoundSolver).is_err());
        assert!(run_k_scan(&evidence, &reference(), &config(vec![0, 1]), &BranchAndBoundSolver).is_err());
    }
}
