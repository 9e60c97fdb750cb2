
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::data_types::solution::Solution;
use crate::util::stats::round_significant;

/// Significant digits kept for abundances in the report
const ABUNDANCE_DIGITS: u32 = 3;

/// Contains all the data written to each row of a per-K solution file
#[derive(Serialize)]
struct SolutionRow {
    /// Slot index after sorting by abundance
    slot: usize,
    /// Abundance, rounded for display
    abundance: f64,
    /// "Novel" or the equivalence class tag
    classification: String,
    /// Symbols at every retained position, in position order
    genotype: String
}

/// Writes the strains of one solution, one row per slot
/// # Arguments
/// * `filename` - the filename for the output (tsv/csv)
/// * `solution` - the solution to write
/// # Errors
/// * if the file cannot be opened or written
pub fn write_solution(filename: &Path, solution: &Solution) -> csv::Result<()> {
    let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
    let delimiter: u8 = if is_csv { b',' } else { b'\t' };
    let mut csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(filename)?;

    for (slot, variant) in solution.variants().iter().enumerate() {
        let row = SolutionRow {
            slot,
            abundance: round_significant(variant.abundance(), ABUNDANCE_DIGITS),
            classification: variant.classification().label().to_string(),
            genotype: variant.genotype_string()
        };
        csv_writer.serialize(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::nucleotide::Nucleotide::*;
    use crate::data_types::solution::ObjectiveTerms;
    use crate::data_types::solve_status::{SolveMethod, SolveStatus};
    use crate::data_types::strain_variant::{StrainClassification, StrainVariant};

    #[test]
    fn test_write_solution() {
        let variants = vec![
            StrainVariant::new(0.61234, vec![A, G], StrainClassification::Known { class_index: 0, label: "ST1".to_string() }),
            StrainVariant::new(0.38766, vec![T, C], StrainClassification::Novel),
        ];
        let solution = Solution::new(2, variants, ObjectiveTerms::default(), 0.4, 0.4, SolveStatus::Optimal, SolveMethod::Exact);
        let filename = std::env::temp_dir().join("strainmix_test_solution_k2.tsv");
        write_solution(&filename, &solution).unwrap();

        let contents = std::fs::read_to_string(&filename).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec![
            "slot\tabundance\tclassification\tgenotype",
            "0\t0.612\tST1\tAG",
            "1\t0.388\tNovel\tTC"
        ]);
        std::fs::remove_file(&filename).unwrap();
    }
}
