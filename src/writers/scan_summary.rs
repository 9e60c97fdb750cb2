
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::data_types::solution::Solution;
use crate::k_scan::{ScanEntry, ScanReport};

/// Contains all the data written to each row of the scan summary, one per K
#[derive(Serialize)]
struct ScanSummaryRow {
    k: usize,
    /// Solver status, or "failed"
    status: String,
    /// "exact" / "heuristic", empty on failure
    method: String,
    novel_usage: String,
    deviation_average: String,
    deviation_maximum: String,
    unphased: String,
    objective: String,
    /// Objective decrease relative to the previous K
    marginal_improvement: String,
    /// LP relaxations solved
    nodes: usize,
    elapsed_seconds: f64,
    /// Failure message, empty on success
    error: String
}

/// Formats an optional value, writing "NA" when it is not applicable
fn format_optional(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.6}"),
        None => "NA".to_string()
    }
}

impl ScanSummaryRow {
    /// Creates a new row from one scan entry
    fn new(entry: &ScanEntry, marginal_improvement: Option<f64>) -> Self {
        let mut row = Self {
            k: entry.k(),
            status: "failed".to_string(),
            method: String::new(),
            novel_usage: "NA".to_string(),
            deviation_average: "NA".to_string(),
            deviation_maximum: "NA".to_string(),
            unphased: "NA".to_string(),
            objective: "NA".to_string(),
            marginal_improvement: format_optional(marginal_improvement),
            nodes: entry.nodes(),
            elapsed_seconds: entry.elapsed().as_secs_f64(),
            error: String::new()
        };
        match entry.result() {
            Ok(solution) => {
                let terms = solution.terms();
                row.status = solution.status().to_string();
                row.method = solution.method().to_string();
                row.novel_usage = format!("{:.6}", terms.novel_usage);
                row.deviation_average = format_optional(terms.deviation_average);
                row.deviation_maximum = format_optional(terms.deviation_maximum);
                row.unphased = format_optional(terms.unphased);
                row.objective = format!("{:.6}", solution.objective());
            },
            Err(e) => {
                row.error = e.to_string();
            }
        };
        row
    }
}

/// Writes the scan summary, one row per K in scan order
/// # Arguments
/// * `filename` - the filename for the output (tsv/csv)
/// * `report` - the finished scan
/// # Errors
/// * if the file cannot be opened or written
pub fn write_scan_summary(filename: &Path, report: &ScanReport) -> csv::Result<()> {
    let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
    let delimiter: u8 = if is_csv { b',' } else { b'\t' };
    let mut csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(filename)?;

    for (i, entry) in report.entries().iter().enumerate() {
        let row = ScanSummaryRow::new(entry, report.marginal_improvement(i));
        csv_writer.serialize(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Serializable view of one scan entry, used for the JSON dump
#[derive(Serialize)]
pub struct ScanRecord<'a> {
    k: usize,
    solution: Option<&'a Solution>,
    error: Option<String>,
    best_bound: Option<f64>,
    nodes: usize,
    elapsed_seconds: f64,
    solver_log: &'a [String]
}

/// Converts a report into its serializable form
pub fn scan_records(report: &ScanReport) -> Vec<ScanRecord<'_>> {
    report.entries().iter()
        .map(|entry| ScanRecord {
            k: entry.k(),
            solution: entry.result().as_ref().ok(),
            error: entry.result().as_ref().err().map(|e| e.to_string()),
            best_bound: entry.best_bound(),
            nodes: entry.nodes(),
            elapsed_seconds: entry.elapsed().as_secs_f64(),
            solver_log: entry.solver_log().lines()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::nucleotide::Nucleotide::*;
    use crate::data_types::position::{Position, PositionId};
    use crate::evidence_filter::FilteredEvidence;
    use crate::k_scan::{run_k_scan, ScanConfigBuilder};
    use crate::milp_model::MilpModel;
    use crate::reference_set::CandidateReferenceSet;
    use crate::solvers::{ModelSolver, SolveBudget, SolverError, SolverOutcome};
    use crate::solvers::branch_bound::BranchAndBoundSolver;

    /// Only solves single-strain models
    struct SingleStrainOnly;

    impl ModelSolver for SingleStrainOnly {
        fn name(&self) -> &'static str {
            "single_strain_only"
        }

        fn solve(&self, model: &MilpModel, budget: &SolveBudget) -> Result<SolverOutcome, SolverError> {
            if model.variables().iter().any(|v| v.name() == "a[1]") {
                Err(SolverError::ResourceExhausted { message: "too many strains".to_string() })
            } else {
                BranchAndBoundSolver.solve(model, budget)
            }
        }
    }

    fn report() -> ScanReport {
        let evidence = FilteredEvidence::from_parts(
            vec![Position::new(PositionId::new("adk", 0), 100, vec![(A, 0.7), (C, 0.3)]).unwrap()],
            vec![]
        );
        let config = ScanConfigBuilder::default()
            .k_values(vec![1, 2])
            .build().unwrap();
        run_k_scan(&evidence, &CandidateReferenceSet::default(), &config, &SingleStrainOnly).unwrap()
    }

    #[test]
    fn test_write_scan_summary() {
        let report = report();
        let filename = std::env::temp_dir().join("strainmix_test_scan_summary.tsv");
        write_scan_summary(&filename, &report).unwrap();

        let contents = std::fs::read_to_string(&filename).unwrap();
        let rows: Vec<Vec<&str>> = contents.lines().map(|l| l.split('\t').collect()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "k");
        assert_eq!(rows[0][11], "error");

        // K = 1 solved, no fragments so UNPHASED is not applicable
        assert_eq!(rows[1][0], "1");
        assert_eq!(rows[1][1], "optimal");
        assert_eq!(rows[1][6], "NA");
        assert_eq!(rows[1][8], "NA");

        // K = 2 failed
        assert_eq!(rows[2][1], "failed");
        assert_eq!(rows[2][7], "NA");
        assert!(rows[2][11].contains("too many strains"));
        std::fs::remove_file(&filename).unwrap();
    }

    #[test]
    fn test_scan_records() {
        let report = report();
        let records = scan_records(&report);
        assert_eq!(records.len(), 2);
        assert!(records[0].solution.is_some());
        assert!(records[0].error.is_none());
        assert!(records[1].solution.is_none());
        assert!(records[1].error.is_some());
        let json = serde_json::to_string(&records).unwrap();
        assert!(json.contains("\"k\":2"));
    }
}
