
use serde::Serialize;

/// The symbols we can observe in an alignment column.
/// Ordering here is the canonical symbol order used everywhere else (tables, tie-breaking, reports).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, strum_macros::AsRefStr, strum_macros::EnumCount)]
pub enum Nucleotide {
    #[strum(serialize = "A")]
    A = 0,
    #[strum(serialize = "C")]
    C,
    #[strum(serialize = "G")]
    G,
    #[strum(serialize = "T")]
    T,
    /// Alignment gap, written as '-' in all inputs and outputs
    #[strum(serialize = "-")]
    #[serde(rename = "-")]
    Gap
}

/// Number of symbols in our alphabet
pub const NUM_NUCLEOTIDES: usize = <Nucleotide as strum::EnumCount>::COUNT;

/// All symbols in canonical order
pub const ALL_NUCLEOTIDES: [Nucleotide; NUM_NUCLEOTIDES] = [
    Nucleotide::A, Nucleotide::C, Nucleotide::G, Nucleotide::T, Nucleotide::Gap
];

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum NucleotideError {
    #[error("unsupported nucleotide symbol {symbol:?}")]
    UnknownSymbol { symbol: String }
}

impl Nucleotide {
    /// Parses a single symbol, case-insensitive. Both '-' and '.' are accepted as a gap.
    /// # Errors
    /// * if the symbol is anything other than A, C, G, T, or a gap
    pub fn from_char(symbol: char) -> Result<Nucleotide, NucleotideError> {
        match symbol.to_ascii_uppercase() {
            'A' => Ok(Nucleotide::A),
            'C' => Ok(Nucleotide::C),
            'G' => Ok(Nucleotide::G),
            'T' => Ok(Nucleotide::T),
            '-' | '.' => Ok(Nucleotide::Gap),
            _ => Err(NucleotideError::UnknownSymbol { symbol: symbol.to_string() })
        }
    }

    /// Same as `from_char`, but for a string field that must contain exactly one symbol.
    /// # Errors
    /// * if the field is not exactly one valid symbol
    pub fn from_field(field: &str) -> Result<Nucleotide, NucleotideError> {
        let mut chars = field.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => Err(NucleotideError::UnknownSymbol { symbol: field.to_string() })
        }
    }

    /// Index into fixed-size per-symbol arrays
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Single character representation
    pub fn to_char(&self) -> char {
        match self {
            Nucleotide::A => 'A',
            Nucleotide::C => 'C',
            Nucleotide::G => 'G',
            Nucleotide::T => 'T',
            Nucleotide::Gap => '-'
        }
    }
}

impl std::fmt::Display for Nucleotide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Renders a genotype vector as a compact string, e.g. "AC-T"
pub fn genotype_string(genotype: &[Nucleotide]) -> String {
    genotype.iter().map(|n| n.to_char()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbols() {
        assert_eq!(Nucleotide::from_char('a').unwrap(), Nucleotide::A);
        assert_eq!(Nucleotide::from_char('T').unwrap(), Nucleotide::T);
        assert_eq!(Nucleotide::from_char('.').unwrap(), Nucleotide::Gap);
        assert_eq!(Nucleotide::from_field(" g ").unwrap(), Nucleotide::G);
        assert!(Nucleotide::from_char('N').is_err());
        assert!(Nucleotide::from_field("AC").is_err());
        assert!(Nucleotide::from_field("").is_err());
    }

    #[test]
    fn test_canonical_order() {
        for (i, n) in ALL_NUCLEOTIDES.iter().enumerate() {
            assert_eq!(n.index(), i);
        }
        assert!(Nucleotide::A < Nucleotide::Gap);
        assert_eq!(Nucleotide::Gap.as_ref(), "-");
        assert_eq!(genotype_string(&[Nucleotide::A, Nucleotide::Gap, Nucleotide::C]), "A-C");
    }
}
