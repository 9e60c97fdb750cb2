
use anyhow::Context;
use rustc_hash::FxHashSet as HashSet;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::data_types::position::{PositionId, SymbolCounts};
use crate::evidence_filter::EvidenceError;

/// Raw counts for one alignment column
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CountRecord {
    /// Column coordinate
    id: PositionId,
    /// Per-symbol counts
    counts: SymbolCounts
}

impl CountRecord {
    /// Constructor
    pub fn new(id: PositionId, counts: SymbolCounts) -> Self {
        Self {
            id,
            counts
        }
    }

    /// Total depth at this column
    pub fn depth(&self) -> u64 {
        self.counts.total()
    }

    // getters
    pub fn id(&self) -> &PositionId {
        &self.id
    }

    pub fn counts(&self) -> &SymbolCounts {
        &self.counts
    }
}

/// Per-position nucleotide count table for one sample
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountTable {
    /// One record per (locus, column), unique
    records: Vec<CountRecord>,
    /// Per-locus depth floors carried over from a previous filtering pass, if any
    coverage_floors: Option<BTreeMap<String, f64>>
}

/// One row of the count TSV
#[derive(Debug, Deserialize)]
struct CountRow {
    locus: String,
    column: usize,
    #[serde(rename = "A")]
    a: u64,
    #[serde(rename = "C")]
    c: u64,
    #[serde(rename = "G")]
    g: u64,
    #[serde(rename = "T")]
    t: u64,
    #[serde(alias = "-")]
    gap: u64,
    /// Declared depth, must equal the sum of the symbol counts when provided
    #[serde(default)]
    depth: Option<u64>
}

impl CountTable {
    /// Creates a table from records, checking that each column appears once.
    /// # Errors
    /// * if a (locus, column) is repeated
    pub fn new(records: Vec<CountRecord>) -> Result<CountTable, EvidenceError> {
        let mut seen: HashSet<&PositionId> = Default::default();
        for record in records.iter() {
            if !seen.insert(record.id()) {
                return Err(EvidenceError::DuplicatePosition { position: record.id().clone() });
            }
        }

        Ok(CountTable {
            records,
            coverage_floors: None
        })
    }

    /// Attaches depth floors from a previous filtering pass, so a re-run uses the same coverage cut-offs
    pub fn with_coverage_floors(mut self, coverage_floors: BTreeMap<String, f64>) -> Self {
        self.coverage_floors = Some(coverage_floors);
        self
    }

    /// Loads a count table from a TSV file with a header.
    /// Expected columns: `locus`, `column`, `A`, `C`, `G`, `T`, `gap` (or `-`), and an optional `depth`.
    /// # Arguments
    /// * `filename` - the TSV to load
    /// # Errors
    /// * if the file cannot be opened or a row fails to deserialize
    /// * if a declared depth disagrees with the symbol counts, or a column is repeated
    pub fn from_tsv(filename: &Path) -> anyhow::Result<CountTable> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(filename)
            .with_context(|| format!("Error while opening {filename:?}:"))?;

        let mut records = vec![];
        for (row_index, result) in csv_reader.deserialize().enumerate() {
            // +2 accounts for the header and 1-based line numbers
            let line = row_index + 2;
            let row: CountRow = result
                .with_context(|| format!("Error while parsing line {line} of {filename:?}:"))?;

            let counts = SymbolCounts::new([row.a, row.c, row.g, row.t, row.gap]);
            let id = PositionId::new(row.locus, row.column);
            if let Some(declared) = row.depth {
                if declared != counts.total() {
                    return Err(EvidenceError::DepthMismatch {
                        line, position: id, declared, observed: counts.total()
                    }.into());
                }
            }
            records.push(CountRecord::new(id, counts));
        }

        let table = CountTable::new(records)
            .with_context(|| format!("Error while loading {filename:?}:"))?;
        Ok(table)
    }

    // getters
    pub fn records(&self) -> &[CountRecord] {
        &self.records
    }

    pub fn coverage_floors(&self) -> Option<&BTreeMap<String, f64>> {
        self.coverage_floors.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("strainmix_{}_{name}", std::process::id()));
        let mut fp = std::fs::File::create(&path).unwrap();
        fp.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_from_tsv() {
        let path = write_fixture("counts_ok.tsv",
            "locus\tcolumn\tA\tC\tG\tT\tgap\tdepth\n\
             adk\t3\t60\t0\t0\t40\t0\t100\n\
             adk\t9\t0\t0\t100\t0\t0\t100\n"
        );
        let table = CountTable::from_tsv(&path).unwrap();
        assert_eq!(table.records().len(), 2);
        assert_eq!(table.records()[0].id(), &PositionId::new("adk", 3));
        assert_eq!(table.records()[0].depth(), 100);
        assert_eq!(table.records()[1].id(), &PositionId::new("adk", 9));
        assert!(table.coverage_floors().is_none());
    }

    #[test]
    fn test_optional_depth() {
        let path = write_fixture("counts_nodepth.tsv",
            "locus\tcolumn\tA\tC\tG\tT\t-\n\
             gyrB\t0\t1\t2\t3\t4\t5\n"
        );
        let table = CountTable::from_tsv(&path).unwrap();
        assert_eq!(table.records()[0].depth(), 15);
    }

    #[test]
    fn test_depth_mismatch() {
        let path = write_fixture("counts_bad.tsv",
            "locus\tcolumn\tA\tC\tG\tT\tgap\tdepth\n\
             adk\t3\t60\t0\t0\t40\t0\t99\n"
        );
        let err = CountTable::from_tsv(&path).unwrap_err();
        let evidence_err = err.downcast_ref::<EvidenceError>().unwrap();
        assert!(matches!(evidence_err, EvidenceError::DepthMismatch { line: 2, declared: 99, observed: 100, .. }));
    }

    #[test]
    fn test_duplicate_position() {
        let records = vec![
            CountRecord::new(PositionId::new("adk", 1), SymbolCounts::new([1, 1, 0, 0, 0])),
            CountRecord::new(PositionId::new("adk", 1), SymbolCounts::new([2, 0, 0, 0, 0])),
        ];
        assert!(matches!(CountTable::new(records), Err(EvidenceError::DuplicatePosition { .. })));
    }
}
