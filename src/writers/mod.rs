/*!
# Writers module
Contains the logic for writing the scan outputs: per-K solution tables, the scan summary, the retained positions, and solver logs.
*/
/// Lists the retained positions in genotype column order
pub mod position_table;
/// Generates the per-K scan summary file
pub mod scan_summary;
/// Generates the per-K strain tables
pub mod solution_table;
/// Writes the per-K solver diagnostic logs
pub mod solver_log;
