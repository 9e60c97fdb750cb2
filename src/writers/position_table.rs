
use itertools::Itertools;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::data_types::position::Position;

/// Contains all the data written to each row of the retained position file
#[derive(Serialize)]
struct PositionRow {
    /// Index of the position in every genotype string
    index: usize,
    locus: String,
    column: usize,
    depth: u64,
    /// Observed symbols and their relative frequencies, e.g. "A:0.600,T:0.400"
    frequencies: String
}

/// Writes the retained positions in genotype column order
/// # Arguments
/// * `filename` - the filename for the output (tsv/csv)
/// * `positions` - the retained positions
/// # Errors
/// * if the file cannot be opened or written
pub fn write_positions(filename: &Path, positions: &[Position]) -> csv::Result<()> {
    let is_csv: bool = filename.extension().unwrap_or_default() == "csv";
    let delimiter: u8 = if is_csv { b',' } else { b'\t' };
    let mut csv_writer: csv::Writer<File> = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(filename)?;

    for (index, position) in positions.iter().enumerate() {
        let row = PositionRow {
            index,
            locus: position.id().locus().to_string(),
            column: position.id().column(),
            depth: position.depth(),
            frequencies: position.frequencies().iter()
                .map(|(symbol, frequency)| format!("{}:{frequency:.3}", symbol.to_char()))
                .join(",")
        };
        csv_writer.serialize(&row)?;
    }
    csv_writer.flush()?;
    Ok(())
}
