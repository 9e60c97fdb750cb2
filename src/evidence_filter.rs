/*!
# Evidence filter
Turns a raw per-column count table and a per-read call log into the typed evidence for one sample:
the variable [`Position`]s and the phasing [`ReadFragment`]s.

Two filters are applied in order:
1. Coverage: per locus, columns with depth more than `coverage_sd_multiplier` standard deviations below the locus mean are dropped.
2. Frequency: symbols seen once, or at a relative frequency at or below `min_symbol_frequency`, are dropped; columns left with a single symbol are invariant.

## Example usage
```rust
use strainmix::data_types::nucleotide::Nucleotide;
use strainmix::data_types::position::{PositionId, SymbolCounts};
use strainmix::evidence_filter::{build_evidence, FilterConfig};
use strainmix::parsing::count_table::{CountRecord, CountTable};
use strainmix::parsing::fragment_log::FragmentLog;

let table = CountTable::new(vec![
    CountRecord::new(PositionId::new("adk", 0), SymbolCounts::new([70, 30, 0, 0, 0])),
    CountRecord::new(PositionId::new("adk", 1), SymbolCounts::new([0, 0, 100, 0, 0])),
]).unwrap();
let mut reads = FragmentLog::default();
reads.add_call("read_1", PositionId::new("adk", 0), Nucleotide::A);
reads.add_call("read_1", PositionId::new("adk", 1), Nucleotide::G);

let evidence = build_evidence(&table, &reads, &FilterConfig::default()).unwrap();
assert_eq!(evidence.positions().len(), 1);
assert_eq!(evidence.fragments().len(), 0); // only one variable position touched
```
*/

use derive_builder::Builder;
use log::{debug, info, warn};
use rustc_hash::FxHashMap as HashMap;
use rustc_hash::FxHashSet as HashSet;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::data_types::nucleotide::{Nucleotide, NucleotideError};
use crate::data_types::position::{Position, PositionError, PositionId};
use crate::data_types::read_fragment::{FragmentError, ReadFragment};
use crate::parsing::count_table::{CountRecord, CountTable};
use crate::parsing::fragment_log::FragmentLog;
use crate::util::stats::mean_and_sd;

#[derive(thiserror::Error, Debug)]
pub enum EvidenceError {
    #[error("position {position} appears more than once in the count table")]
    DuplicatePosition { position: PositionId },
    #[error("line {line}: position {position} declares depth {declared} but its counts sum to {observed}")]
    DepthMismatch { line: usize, position: PositionId, declared: u64, observed: u64 },
    #[error("line {line}: read {read_id} has an invalid nucleotide field: {error}")]
    InvalidCall { line: usize, read_id: String, error: NucleotideError },
    #[error("read {read_id} references position {position}, which is not in the count table")]
    UnknownPosition { read_id: String, position: PositionId },
    #[error("invalid filter configuration: {message}")]
    InvalidConfig { message: String },
    #[error("error while building fragment: {0}")]
    Fragment(#[from] FragmentError),
    #[error("error while building position: {0}")]
    Position(#[from] PositionError)
}

/// Controls the coverage and frequency filters
#[derive(Builder, Clone, Copy, Debug, Serialize)]
#[builder(default)]
pub struct FilterConfig {
    /// Columns with depth below `mean - coverage_sd_multiplier * sd` of their locus are dropped
    coverage_sd_multiplier: f64,
    /// Symbols with a count below this are dropped
    min_symbol_count: u64,
    /// Symbols with relative frequency at or below this are dropped
    min_symbol_frequency: f64
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            coverage_sd_multiplier: 2.0,
            min_symbol_count: 2,
            min_symbol_frequency: 0.01
        }
    }
}

impl FilterConfig {
    /// Checks that the configuration is usable
    /// # Errors
    /// * if the multiplier or frequency are negative or not finite
    pub fn validate(&self) -> Result<(), EvidenceError> {
        if !self.coverage_sd_multiplier.is_finite() || self.coverage_sd_multiplier < 0.0 {
            return Err(EvidenceError::InvalidConfig { message: format!("coverage multiplier must be >= 0, got {}", self.coverage_sd_multiplier) });
        }
        if !self.min_symbol_frequency.is_finite() || !(0.0..1.0).contains(&self.min_symbol_frequency) {
            return Err(EvidenceError::InvalidConfig { message: format!("minimum symbol frequency must be in [0, 1), got {}", self.min_symbol_frequency) });
        }
        Ok(())
    }

    // getters
    pub fn coverage_sd_multiplier(&self) -> f64 {
        self.coverage_sd_multiplier
    }

    pub fn min_symbol_count(&self) -> u64 {
        self.min_symbol_count
    }

    pub fn min_symbol_frequency(&self) -> f64 {
        self.min_symbol_frequency
    }
}

/// Bookkeeping for what the filters removed
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct FilterStats {
    /// Columns in the input table
    pub total_positions: usize,
    /// Columns removed by the coverage filter
    pub low_coverage: usize,
    /// Columns left with fewer than two symbols
    pub invariant: usize,
    /// Variable columns kept
    pub retained: usize,
    /// Reads in the input log
    pub total_reads: usize,
    /// Reads that became phasing fragments
    pub phasing_fragments: usize,
    /// Read calls on a retained column whose symbol was filtered out
    pub dropped_calls: usize
}

/// The typed, filtered evidence for one sample
#[derive(Clone, Debug)]
pub struct FilteredEvidence {
    /// Variable positions, sorted by coordinate
    positions: Vec<Position>,
    /// Fragments touching at least two variable positions, in read order
    fragments: Vec<ReadFragment>,
    /// Raw records behind each retained position, same order as `positions`
    retained_records: Vec<CountRecord>,
    /// Per-locus depth floors the coverage filter used
    coverage_floors: BTreeMap<String, f64>,
    /// Filter bookkeeping
    stats: FilterStats
}

impl FilteredEvidence {
    /// Constructor for evidence assembled directly from positions and fragments, e.g. pre-filtered inputs
    pub fn from_parts(positions: Vec<Position>, fragments: Vec<ReadFragment>) -> Self {
        let stats = FilterStats {
            total_positions: positions.len(),
            retained: positions.len(),
            total_reads: fragments.len(),
            phasing_fragments: fragments.len(),
            ..Default::default()
        };
        Self {
            positions,
            fragments,
            retained_records: vec![],
            coverage_floors: Default::default(),
            stats
        }
    }

    /// Returns true if no variable position survived, i.e. there is nothing to deconvolve
    pub fn is_degenerate(&self) -> bool {
        self.positions.is_empty()
    }

    /// Converts the retained positions back into a count table, carrying the coverage floors.
    /// Filtering this table again yields the same positions.
    pub fn to_count_table(&self) -> CountTable {
        CountTable::new(self.retained_records.clone())
            .map(|t| t.with_coverage_floors(self.coverage_floors.clone()))
            .unwrap_or_default()
    }

    // getters
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn fragments(&self) -> &[ReadFragment] {
        &self.fragments
    }

    pub fn coverage_floors(&self) -> &BTreeMap<String, f64> {
        &self.coverage_floors
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }
}

/// Entry point for building the evidence of one sample.
/// # Arguments
/// * `table` - the raw per-column counts
/// * `reads` - the per-read calls
/// * `config` - filter thresholds
/// # Errors
/// * if the configuration is invalid
/// * if a read references a column missing from the table, or reports conflicting calls at one column
pub fn build_evidence(table: &CountTable, reads: &FragmentLog, config: &FilterConfig) -> Result<FilteredEvidence, EvidenceError> {
    config.validate()?;

    let coverage_floors = match table.coverage_floors() {
        Some(floors) => floors.clone(),
        None => compute_coverage_floors(table, config.coverage_sd_multiplier())
    };

    let mut stats = FilterStats {
        total_positions: table.records().len(),
        total_reads: reads.num_reads(),
        ..Default::default()
    };

    let mut retained: Vec<(Position, CountRecord)> = vec![];
    for record in table.records().iter() {
        let locus_floor = coverage_floors.get(record.id().locus()).copied().unwrap_or(f64::NEG_INFINITY);
        if (record.depth() as f64) < locus_floor {
            debug!("Coverage filter removed {} (depth {} < {locus_floor:.2})", record.id(), record.depth());
            stats.low_coverage += 1;
            continue;
        }

        match filter_symbols(record, config)? {
            Some(position) => retained.push((position, record.clone())),
            None => stats.invariant += 1
        }
    }

    retained.sort_by(|a, b| a.0.id().cmp(b.0.id()));
    let (positions, retained_records): (Vec<Position>, Vec<CountRecord>) = retained.into_iter().unzip();
    stats.retained = positions.len();

    if positions.is_empty() {
        warn!("No variable positions survived filtering, there is no deconvolution signal in this sample");
    }

    let all_ids: HashSet<&PositionId> = table.records().iter().map(|r| r.id()).collect();
    let (fragments, dropped_calls) = build_fragments(&positions, reads, &all_ids)?;
    stats.phasing_fragments = fragments.len();
    stats.dropped_calls = dropped_calls;

    info!("Evidence filter: {} columns, {} low coverage, {} invariant, {} variable",
        stats.total_positions, stats.low_coverage, stats.invariant, stats.retained);
    info!("Evidence filter: {} reads, {} phasing fragments, {} dropped calls",
        stats.total_reads, stats.phasing_fragments, stats.dropped_calls);

    Ok(FilteredEvidence {
        positions,
        fragments,
        retained_records,
        coverage_floors,
        stats
    })
}

/// Computes the per-locus depth floor, `mean - multiplier * sd` over every column of the locus
fn compute_coverage_floors(table: &CountTable, multiplier: f64) -> BTreeMap<String, f64> {
    let mut depths: BTreeMap<&str, Vec<f64>> = Default::default();
    for record in table.records().iter() {
        depths.entry(record.id().locus()).or_default().push(record.depth() as f64);
    }

    depths.into_iter()
        .map(|(locus, values)| {
            let (mean, sd) = mean_and_sd(&values);
            let floor = mean - multiplier * sd;
            debug!("Locus {locus}: mean depth {mean:.2}, sd {sd:.2}, floor {floor:.2}");
            (locus.to_string(), floor)
        })
        .collect()
}

/// Applies the frequency filter to one record, returning a position if it is still variable.
fn filter_symbols(record: &CountRecord, config: &FilterConfig) -> Result<Option<Position>, EvidenceError> {
    let depth = record.depth();
    if depth == 0 {
        return Ok(None);
    }

    let kept: Vec<(Nucleotide, u64)> = record.counts().observed()
        .filter(|&(_n, count)| {
            let frequency = count as f64 / depth as f64;
            count >= config.min_symbol_count() && frequency > config.min_symbol_frequency()
        })
        .collect();

    if kept.len() < 2 {
        return Ok(None);
    }

    let kept_total: u64 = kept.iter().map(|&(_n, c)| c).sum();
    let frequencies = kept.into_iter()
        .map(|(n, c)| (n, c as f64 / kept_total as f64))
        .collect();
    let position = Position::new(record.id().clone(), depth, frequencies)?;
    Ok(Some(position))
}

/// Builds phasing fragments from the read log.
/// Returns the fragments and the number of calls dropped because their symbol was filtered at a retained position.
fn build_fragments(
    positions: &[Position], reads: &FragmentLog, all_ids: &HashSet<&PositionId>
) -> Result<(Vec<ReadFragment>, usize), EvidenceError> {
    let lookup: HashMap<&PositionId, usize> = positions.iter()
        .enumerate()
        .map(|(i, p)| (p.id(), i))
        .collect();

    let mut fragments = vec![];
    let mut dropped_calls = 0;
    for (read_id, calls) in reads.reads() {
        let mut kept = vec![];
        for (position_id, nucleotide) in calls.iter() {
            if !all_ids.contains(position_id) {
                return Err(EvidenceError::UnknownPosition { read_id: read_id.to_string(), position: position_id.clone() });
            }

            if let Some(&index) = lookup.get(position_id) {
                if positions[index].is_observed(*nucleotide) {
                    kept.push((index, *nucleotide));
                } else {
                    dropped_calls += 1;
                }
            }
        }

        // count distinct positions; duplicates collapse inside ReadFragment::new
        let distinct: HashSet<usize> = kept.iter().map(|&(i, _n)| i).collect();
        if distinct.len() >= 2 {
            fragments.push(ReadFragment::new(read_id, kept)?);
        }
    }

    Ok((fragments, dropped_calls))
}
