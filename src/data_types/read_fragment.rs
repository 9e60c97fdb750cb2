
use serde::Serialize;

use crate::data_types::nucleotide::Nucleotide;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FragmentError {
    #[error("read {read_id} covers {count} variable position(s), at least 2 are required")]
    TooFewPositions { read_id: String, count: usize },
    #[error("read {read_id} reports both {first} and {second} at position index {position_index}")]
    ConflictingCall { read_id: String, position_index: usize, first: Nucleotide, second: Nucleotide }
}

/// Multi-position evidence from a single read, restricted to the variable positions it spans.
/// Positions are referenced by their index in the sample's ordered position list.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct ReadFragment {
    /// Identifier of the source read
    read_id: String,
    /// (position index, observed nucleotide), sorted by position index with no repeats
    calls: Vec<(usize, Nucleotide)>
}

impl ReadFragment {
    /// Creates a new fragment.
    /// Repeated calls at the same position are collapsed if they agree.
    /// # Arguments
    /// * `read_id` - the read identifier, used for error reporting
    /// * `calls` - the (position index, nucleotide) pairs, any order
    /// # Errors
    /// * if the same position is reported with two different nucleotides
    /// * if fewer than two distinct positions remain
    pub fn new(read_id: impl Into<String>, mut calls: Vec<(usize, Nucleotide)>) -> Result<ReadFragment, FragmentError> {
        let read_id = read_id.into();
        calls.sort();

        let mut deduped: Vec<(usize, Nucleotide)> = Vec::with_capacity(calls.len());
        for (position_index, nucleotide) in calls.into_iter() {
            match deduped.last().copied() {
                Some((prev_index, prev_nuc)) if prev_index == position_index => {
                    if prev_nuc != nucleotide {
                        return Err(FragmentError::ConflictingCall {
                            read_id, position_index, first: prev_nuc, second: nucleotide
                        });
                    }
                },
                _ => deduped.push((position_index, nucleotide))
            }
        }

        if deduped.len() < 2 {
            return Err(FragmentError::TooFewPositions { read_id, count: deduped.len() });
        }

        Ok(ReadFragment {
            read_id,
            calls: deduped
        })
    }

    /// Returns true if the genotype carries the read's nucleotide at every position the read covers
    pub fn is_consistent_with(&self, genotype: &[Nucleotide]) -> bool {
        self.calls.iter()
            .all(|&(i, n)| genotype.get(i) == Some(&n))
    }

    /// Number of positions covered
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Always false, fragments have at least two calls
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    // getters
    pub fn read_id(&self) -> &str {
        &self.read_id
    }

    pub fn calls(&self) -> &[(usize, Nucleotide)] {
        &self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::nucleotide::Nucleotide::*;

    #[test]
    fn test_new_fragment() {
        let fragment = ReadFragment::new("read_1", vec![(3, T), (0, A), (3, T)]).unwrap();
        assert_eq!(fragment.calls(), &[(0, A), (3, T)]);
        assert_eq!(fragment.len(), 2);
        assert_eq!(fragment.read_id(), "read_1");
    }

    #[test]
    fn test_fragment_errors() {
        assert_eq!(
            ReadFragment::new("read_1", vec![(3, T), (3, T)]),
            Err(FragmentError::TooFewPositions { read_id: "read_1".to_string(), count: 1 })
        );
        assert_eq!(
            ReadFragment::new("read_2", vec![(0, A), (1, C), (1, G)]),
            Err(FragmentError::ConflictingCall { read_id: "read_2".to_string(), position_index: 1, first: C, second: G })
        );
    }

    #[test]
    fn test_consistency() {
        let fragment = ReadFragment::new("read_1", vec![(0, A), (2, Gap)]).unwrap();
        assert!(fragment.is_consistent_with(&[A, C, Gap]));
        assert!(fragment.is_consistent_with(&[A, T, Gap]));
        assert!(!fragment.is_consistent_with(&[A, C, G]));
        assert!(!fragment.is_consistent_with(&[A]));
    }
}
