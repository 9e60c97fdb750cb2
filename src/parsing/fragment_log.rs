
use anyhow::Context;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

use crate::data_types::nucleotide::Nucleotide;
use crate::data_types::position::PositionId;
use crate::evidence_filter::EvidenceError;

/// Per-read alignment log: for each read, the (column, nucleotide) calls it covers.
/// Reads are kept in first-seen order so downstream fragment order is reproducible.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FragmentLog {
    reads: IndexMap<String, Vec<(PositionId, Nucleotide)>>
}

/// One row of the fragment TSV
#[derive(Debug, Deserialize)]
struct FragmentRow {
    read_id: String,
    locus: String,
    column: usize,
    nucleotide: String
}

impl FragmentLog {
    /// Adds a single call for a read; calls for the same read do not need to be contiguous
    pub fn add_call(&mut self, read_id: &str, position: PositionId, nucleotide: Nucleotide) {
        if let Some(calls) = self.reads.get_mut(read_id) {
            calls.push((position, nucleotide));
        } else {
            self.reads.insert(read_id.to_string(), vec![(position, nucleotide)]);
        }
    }

    /// Loads a fragment log from a TSV file with a header.
    /// Expected columns: `read_id`, `locus`, `column`, `nucleotide`, one row per call.
    /// # Arguments
    /// * `filename` - the TSV to load
    /// # Errors
    /// * if the file cannot be opened or a row fails to deserialize
    /// * if a nucleotide is not a valid symbol
    pub fn from_tsv(filename: &Path) -> anyhow::Result<FragmentLog> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(filename)
            .with_context(|| format!("Error while opening {filename:?}:"))?;

        let mut log = FragmentLog::default();
        for (row_index, result) in csv_reader.deserialize().enumerate() {
            let line = row_index + 2;
            let row: FragmentRow = result
                .with_context(|| format!("Error while parsing line {line} of {filename:?}:"))?;

            let nucleotide = Nucleotide::from_field(&row.nucleotide)
                .map_err(|error| EvidenceError::InvalidCall { line, read_id: row.read_id.clone(), error })?;
            log.add_call(&row.read_id, PositionId::new(row.locus, row.column), nucleotide);
        }
        Ok(log)
    }

    /// Number of reads in the log
    pub fn num_reads(&self) -> usize {
        self.reads.len()
    }

    /// Iterates over (read id, calls) in first-seen order
    pub fn reads(&self) -> impl Iterator<Item = (&str, &[(PositionId, Nucleotide)])> {
        self.reads.iter().map(|(r, c)| (r.as_str(), c.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_add_call_grouping() {
        let mut log = FragmentLog::default();
        log.add_call("r1", PositionId::new("adk", 1), Nucleotide::A);
        log.add_call("r2", PositionId::new("adk", 1), Nucleotide::C);
        log.add_call("r1", PositionId::new("adk", 5), Nucleotide::G);
        assert_eq!(log.num_reads(), 2);

        let reads: Vec<_> = log.reads().collect();
        assert_eq!(reads[0].0, "r1");
        assert_eq!(reads[0].1.len(), 2);
        assert_eq!(reads[1].0, "r2");
    }

    #[test]
    fn test_from_tsv() {
        let path = std::env::temp_dir().join(format!("strainmix_{}_fragments.tsv", std::process::id()));
        let mut fp = std::fs::File::create(&path).unwrap();
        fp.write_all(b"read_id\tlocus\tcolumn\tnucleotide\nr1\tadk\t3\tA\nr1\tadk\t9\t-\nr2\tadk\t3\tt\n").unwrap();
        drop(fp);

        let log = FragmentLog::from_tsv(&path).unwrap();
        assert_eq!(log.num_reads(), 2);
        let reads: Vec<_> = log.reads().collect();
        assert_eq!(reads[0].1, &[(PositionId::new("adk", 3), Nucleotide::A), (PositionId::new("adk", 9), Nucleotide::Gap)]);
        assert_eq!(reads[1].1, &[(PositionId::new("adk", 3), Nucleotide::T)]);
    }

    #[test]
    fn test_bad_nucleotide() {
        let path = std::env::temp_dir().join(format!("strainmix_{}_fragments_bad.tsv", std::process::id()));
        std::fs::write(&path, "read_id\tlocus\tcolumn\tnucleotide\nr1\tadk\t3\tN\n").unwrap();
        let err = FragmentLog::from_tsv(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<EvidenceError>(), Some(EvidenceError::InvalidCall { line: 2, .. })));
    }
}
