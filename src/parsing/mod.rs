/*!
# Parsing module
Contains the logic for parsing the per-sample input files into meaningful structs.
*/
/// Known-genotype catalogue, allele alignments, and allele coverage
pub mod catalogue;
/// Per-column nucleotide count tables
pub mod count_table;
/// Per-read call logs
pub mod fragment_log;
