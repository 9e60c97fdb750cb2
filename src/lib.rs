/// Command line interface functionality
pub mod cli;
/// Contains the shared data types: nucleotides, positions, fragments, genotypes, solutions
pub mod data_types;
/// Turns raw counts and read calls into filtered evidence
pub mod evidence_filter;
/// Runs the full pipeline over a range of strain counts
pub mod k_scan;
/// Solver-independent MILP representation
pub mod milp_model;
/// Builds the strain deconvolution model for a fixed strain count
pub mod model_builder;
/// Tooling for parsing input files into meaningful structs / data
pub mod parsing;
/// Known genotypes projected onto the retained positions
pub mod reference_set;
/// Decodes solver assignments into solutions and recomputes the objective
pub mod solution_extractor;
/// Solver adapters for the MILP model
pub mod solvers;
/// Various utility functions that tend to be very generic
pub mod util;
/// All output writers
pub mod writers;
