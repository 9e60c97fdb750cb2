
use serde::Serialize;

use crate::data_types::nucleotide::{Nucleotide, ALL_NUCLEOTIDES, NUM_NUCLEOTIDES};

/// Tolerance on the frequencies of a position summing to 1.0
pub const FREQUENCY_SUM_TOLERANCE: f64 = 1e-6;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PositionError {
    #[error("{position} has {count} observed symbol(s), at least 2 are required")]
    NotVariable { position: PositionId, count: usize },
    #[error("{position} has frequency {frequency} for {symbol}, frequencies must be in (0, 1]")]
    FrequencyRange { position: PositionId, symbol: Nucleotide, frequency: f64 },
    #[error("{position} lists {symbol} more than once")]
    DuplicateSymbol { position: PositionId, symbol: Nucleotide },
    #[error("{position} frequencies sum to {total}, expected 1.0")]
    FrequencySum { position: PositionId, total: f64 }
}

/// Coordinate of a single column in the reference alignment of one locus.
/// Ordering is by locus name, then column, which is the fixed column order for all outputs.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PositionId {
    /// The locus label from the typing scheme
    locus: String,
    /// 0-based column in the locus alignment
    column: usize
}

impl PositionId {
    /// Constructor
    pub fn new(locus: impl Into<String>, column: usize) -> Self {
        Self {
            locus: locus.into(),
            column
        }
    }

    // getters
    pub fn locus(&self) -> &str {
        &self.locus
    }

    pub fn column(&self) -> usize {
        self.column
    }
}

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.locus, self.column)
    }
}

/// Raw symbol counts for one alignment column
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SymbolCounts {
    counts: [u64; NUM_NUCLEOTIDES]
}

impl SymbolCounts {
    /// Constructor from counts in canonical order (A, C, G, T, gap)
    pub fn new(counts: [u64; NUM_NUCLEOTIDES]) -> Self {
        Self { counts }
    }

    /// Count for a single symbol
    pub fn get(&self, symbol: Nucleotide) -> u64 {
        self.counts[symbol.index()]
    }

    /// Total depth across all symbols
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Iterates over the symbols with a non-zero count, in canonical order
    pub fn observed(&self) -> impl Iterator<Item = (Nucleotide, u64)> + '_ {
        ALL_NUCLEOTIDES.iter()
            .map(|&n| (n, self.get(n)))
            .filter(|&(_n, c)| c > 0)
    }

    pub fn counts(&self) -> &[u64; NUM_NUCLEOTIDES] {
        &self.counts
    }
}

/// A variable alignment column in one sample.
/// Only built for columns that retained at least two symbols after filtering.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Position {
    /// Where this column lives
    id: PositionId,
    /// Depth at this column before symbol filtering
    depth: u64,
    /// Retained symbols in canonical order, paired with their relative frequency among retained symbols
    frequencies: Vec<(Nucleotide, f64)>
}

impl Position {
    /// Creates a new variable position.
    /// # Arguments
    /// * `id` - the coordinate of the column
    /// * `depth` - the raw depth at this column, informational only
    /// * `frequencies` - the observed symbols with relative frequency, any order
    /// # Errors
    /// * if fewer than two symbols are provided
    /// * if a symbol is repeated or a frequency is outside (0, 1]
    /// * if the frequencies do not sum to 1.0
    pub fn new(id: PositionId, depth: u64, mut frequencies: Vec<(Nucleotide, f64)>) -> Result<Position, PositionError> {
        if frequencies.len() < 2 {
            return Err(PositionError::NotVariable { position: id, count: frequencies.len() });
        }

        frequencies.sort_by_key(|&(n, _f)| n);
        for window in frequencies.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(PositionError::DuplicateSymbol { position: id, symbol: window[0].0 });
            }
        }

        for &(symbol, frequency) in frequencies.iter() {
            if !(frequency > 0.0 && frequency <= 1.0) {
                return Err(PositionError::FrequencyRange { position: id, symbol, frequency });
            }
        }

        let total: f64 = frequencies.iter().map(|&(_n, f)| f).sum();
        if (total - 1.0).abs() > FREQUENCY_SUM_TOLERANCE {
            return Err(PositionError::FrequencySum { position: id, total });
        }

        Ok(Position {
            id,
            depth,
            frequencies
        })
    }

    /// Number of observed symbols, always >= 2
    pub fn num_symbols(&self) -> usize {
        self.frequencies.len()
    }

    /// Observed symbols in canonical order
    pub fn symbols(&self) -> impl Iterator<Item = Nucleotide> + '_ {
        self.frequencies.iter().map(|&(n, _f)| n)
    }

    /// Relative frequency of a symbol, 0.0 when it was not observed
    pub fn frequency(&self, symbol: Nucleotide) -> f64 {
        self.frequencies.iter()
            .find(|&&(n, _f)| n == symbol)
            .map(|&(_n, f)| f)
            .unwrap_or(0.0)
    }

    /// Index of a symbol within this position's symbol table
    pub fn symbol_index(&self, symbol: Nucleotide) -> Option<usize> {
        self.frequencies.iter().position(|&(n, _f)| n == symbol)
    }

    /// Returns true if the symbol is one of the observed symbols
    pub fn is_observed(&self, symbol: Nucleotide) -> bool {
        self.symbol_index(symbol).is_some()
    }

    /// The most frequent symbol; ties go to the earliest symbol in canonical order
    pub fn majority_symbol(&self) -> Nucleotide {
        let mut best = self.frequencies[0];
        for &(n, f) in self.frequencies.iter().skip(1) {
            if f > best.1 {
                best = (n, f);
            }
        }
        best.0
    }

    // getters
    pub fn id(&self) -> &PositionId {
        &self.id
    }

    pub fn depth(&self) -> u64 {
        self.depth
    }

    pub fn frequencies(&self) -> &[(Nucleotide, f64)] {
        &self.frequencies
    }
}
