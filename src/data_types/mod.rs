/// Known genotypes and their equivalence classes
pub mod genotype;
/// The nucleotide alphabet for alignment columns
pub mod nucleotide;
/// Variable positions and the raw counts behind them
pub mod position;
/// Per-read phasing evidence
pub mod read_fragment;
/// Solutions and the decomposed objective
pub mod solution;
/// Solver termination status and method enumerations
pub mod solve_status;
/// A single inferred strain within a solution
pub mod strain_variant;
