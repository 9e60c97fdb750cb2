/*!
# Candidate reference set
Projects the known-genotype catalogue onto the variable positions of one sample and groups the
projections into [`EquivalenceClass`]es.
A profile is a candidate only if every one of its allele calls is determined and covered by the sample's reads.

## Example usage
```rust
use std::collections::BTreeMap;
use strainmix::data_types::nucleotide::Nucleotide::*;
use strainmix::data_types::position::{Position, PositionId};
use strainmix::parsing::catalogue::{AlleleAlignments, AlleleCoverage, Profile, ProfileCatalogue};
use strainmix::reference_set::build_reference_set;

let mut alignments = AlleleAlignments::default();
alignments.add_allele("adk", "1", vec![A, G, T]).unwrap();
alignments.add_allele("adk", "2", vec![C, G, T]).unwrap();
let catalogue = ProfileCatalogue::new(vec![
    Profile::new("ST1", BTreeMap::from([("adk".to_string(), Some("1".to_string()))])),
    Profile::new("ST2", BTreeMap::from([("adk".to_string(), Some("2".to_string()))])),
]).unwrap();
let positions = vec![
    Position::new(PositionId::new("adk", 0), 100, vec![(A, 0.5), (C, 0.5)]).unwrap()
];

let reference = build_reference_set(&catalogue, &alignments, &AlleleCoverage::All, &positions).unwrap();
assert_eq!(reference.classes().len(), 2);
```
*/

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::data_types::genotype::{EquivalenceClass, KnownGenotype};
use crate::data_types::nucleotide::{Nucleotide, NucleotideError};
use crate::data_types::position::{Position, PositionId};
use crate::parsing::catalogue::{AlleleAlignments, AlleleCoverage, Profile, ProfileCatalogue};

#[derive(thiserror::Error, Debug)]
pub enum ReferenceError {
    #[error("locus {locus} has no allele alignment")]
    UnknownLocus { locus: String },
    #[error("profile table has no column for scheme locus {locus}")]
    MissingLocusColumn { locus: String },
    #[error("profile {profile_id} references allele {locus}_{allele}, which is not in the allele alignments")]
    UnknownAllele { profile_id: String, locus: String, allele: String },
    #[error("allele {locus}_{allele} has aligned length {found}, expected {expected}")]
    RaggedAlignment { locus: String, allele: String, expected: usize, found: usize },
    #[error("allele {locus}_{allele} appears more than once")]
    DuplicateAllele { locus: String, allele: String },
    #[error("profile {id} appears more than once")]
    DuplicateProfile { id: String },
    #[error("allele {locus}_{allele} has an invalid symbol: {error}")]
    InvalidSymbol { locus: String, allele: String, error: NucleotideError },
    #[error("position {position} is outside the alignment of length {length}")]
    ColumnOutOfRange { position: PositionId, length: usize }
}

/// The known identities available to one sample
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateReferenceSet {
    /// Projected catalogue entries that passed the coverage check, in catalogue order
    genotypes: Vec<KnownGenotype>,
    /// Equivalence classes in first-seen order
    classes: Vec<EquivalenceClass>,
    /// Identifiers removed because an allele was undetermined or not covered
    excluded: Vec<String>
}

impl CandidateReferenceSet {
    /// Builds a set directly from projected genotypes, grouping them into classes
    pub fn from_genotypes(genotypes: Vec<KnownGenotype>) -> Self {
        let classes = group_classes(&genotypes);
        Self {
            genotypes,
            classes,
            excluded: vec![]
        }
    }

    /// Returns the index of the class with exactly this genotype, if any
    pub fn find_class(&self, genotype: &[Nucleotide]) -> Option<usize> {
        self.classes.iter().position(|c| c.matches(genotype))
    }

    /// Returns true if there are no known identities
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    // getters
    pub fn genotypes(&self) -> &[KnownGenotype] {
        &self.genotypes
    }

    pub fn classes(&self) -> &[EquivalenceClass] {
        &self.classes
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }
}

/// Builds the candidate reference set for a sample.
/// # Arguments
/// * `catalogue` - all known profiles
/// * `alignments` - aligned allele sequences for every scheme locus
/// * `coverage` - which alleles the sample's reads fully cover
/// * `positions` - the sample's retained variable positions
/// # Errors
/// * if a position's locus has no alignment, or its column is outside the alignment
/// * if a candidate profile references an allele with no aligned sequence
pub fn build_reference_set(
    catalogue: &ProfileCatalogue, alignments: &AlleleAlignments, coverage: &AlleleCoverage, positions: &[Position]
) -> Result<CandidateReferenceSet, ReferenceError> {
    for position in positions.iter() {
        let locus = position.id().locus();
        let length = alignments.alignment_length(locus)
            .ok_or_else(|| ReferenceError::UnknownLocus { locus: locus.to_string() })?;
        if position.id().column() >= length {
            return Err(ReferenceError::ColumnOutOfRange { position: position.id().clone(), length });
        }
    }

    if matches!(coverage, AlleleCoverage::All) {
        warn!("No allele coverage provided, treating every catalogued allele as covered");
    }

    let mut genotypes = vec![];
    let mut excluded = vec![];
    for profile in catalogue.profiles().iter() {
        if !is_candidate(profile, coverage) {
            debug!("Excluding {}: undetermined or uncovered allele", profile.id());
            excluded.push(profile.id().to_string());
            continue;
        }
        genotypes.push(project_profile(profile, alignments, positions)?);
    }

    let classes = group_classes(&genotypes);
    info!("Reference set: {} candidate profiles in {} equivalence classes, {} excluded",
        genotypes.len(), classes.len(), excluded.len());
    if classes.is_empty() {
        warn!("No known genotypes are available, every strain will be classified as novel");
    }

    Ok(CandidateReferenceSet {
        genotypes,
        classes,
        excluded
    })
}

/// A profile is a candidate when all of its alleles are determined and covered
fn is_candidate(profile: &Profile, coverage: &AlleleCoverage) -> bool {
    profile.is_fully_determined() &&
        profile.alleles().iter()
            .filter_map(|(locus, allele)| allele.as_deref().map(|a| (locus, a)))
            .all(|(locus, allele)| coverage.is_covered(locus, allele))
}

/// Reads the profile's symbol at every retained position
fn project_profile(profile: &Profile, alignments: &AlleleAlignments, positions: &[Position]) -> Result<KnownGenotype, ReferenceError> {
    let mut genotype = Vec::with_capacity(positions.len());
    for position in positions.iter() {
        let locus = position.id().locus();
        let unknown_allele = || ReferenceError::UnknownAllele {
            profile_id: profile.id().to_string(),
            locus: locus.to_string(),
            allele: profile.allele(locus).unwrap_or_default().to_string()
        };
        let allele = profile.allele(locus).ok_or_else(unknown_allele)?;
        let sequence = alignments.sequence(locus, allele).ok_or_else(unknown_allele)?;
        // column range was checked against the locus length up front
        let symbol = sequence.get(position.id().column())
            .copied()
            .ok_or_else(|| ReferenceError::ColumnOutOfRange { position: position.id().clone(), length: sequence.len() })?;
        genotype.push(symbol);
    }
    Ok(KnownGenotype::new(profile.id(), genotype))
}

/// Groups genotypes by exact equality, classes appear in the order of their first member
fn group_classes(genotypes: &[KnownGenotype]) -> Vec<EquivalenceClass> {
    let mut classes: IndexMap<&[Nucleotide], EquivalenceClass> = IndexMap::new();
    for known in genotypes.iter() {
        match classes.get_mut(known.genotype()) {
            Some(class) => class.add_member(known.id().to_string()),
            None => {
                classes.insert(known.genotype(), EquivalenceClass::new(known.genotype().to_vec(), vec![known.id().to_string()]));
            }
        }
    }
    classes.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::nucleotide::Nucleotide::*;
    use rustc_hash::FxHashSet as HashSet;
    use std::collections::BTreeMap;

    fn profile(id: &str, adk: Option<&str>, gyr: Option<&str>) -> Profile {
        Profile::new(id, BTreeMap::from([
            ("adk".to_string(), adk.map(|a| a.to_string())),
            ("gyrB".to_string(), gyr.map(|a| a.to_string())),
        ]))
    }

    fn alignments() -> AlleleAlignments {
        let mut alignments = AlleleAlignments::default();
        alignments.add_allele("adk", "1", vec![A, C, G]).unwrap();
        alignments.add_allele("adk", "2", vec![T, C, G]).unwrap();
        alignments.add_allele("gyrB", "1", vec![G, G]).unwrap();
        alignments.add_allele("gyrB", "2", vec![G, C]).unwrap();
        alignments
    }

    fn positions() -> Vec<Position> {
        vec![
            Position::new(PositionId::new("adk", 0), 100, vec![(A, 0.6), (T, 0.4)]).unwrap(),
            Position::new(PositionId::new("gyrB", 1), 100, vec![(G, 0.6), (C, 0.4)]).unwrap(),
        ]
    }

    #[test]
    fn test_projection_and_grouping() {
        let catalogue = ProfileCatalogue::new(vec![
            profile("ST1", Some("1"), Some("1")),
            profile("ST2", Some("2"), Some("2")),
            profile("ST3", Some("1"), Some("1")),
            profile("ST4", Some("1"), None),
        ]).unwrap();

        let reference = build_reference_set(&catalogue, &alignments(), &AlleleCoverage::All, &positions()).unwrap();
        assert_eq!(reference.genotypes().len(), 3);
        assert_eq!(reference.excluded(), &["ST4".to_string()]);
        assert_eq!(reference.classes().len(), 2);
        assert_eq!(reference.classes()[0].genotype(), &[A, G]);
        assert_eq!(reference.classes()[0].label(), "ST1/ST3");
        assert_eq!(reference.classes()[1].genotype(), &[T, C]);
        assert_eq!(reference.find_class(&[T, C]), Some(1));
        assert_eq!(reference.find_class(&[T, G]), None);
    }

    #[test]
    fn test_coverage_check() {
        let catalogue = ProfileCatalogue::new(vec![
            profile("ST1", Some("1"), Some("1")),
            profile("ST2", Some("2"), Some("2")),
        ]).unwrap();
        let covered: HashSet<(String, String)> = [("adk", "1"), ("gyrB", "1"), ("gyrB", "2")].iter()
            .map(|(l, a)| (l.to_string(), a.to_string()))
            .collect();

        let reference = build_reference_set(&catalogue, &alignments(), &AlleleCoverage::Covered(covered), &positions()).unwrap();
        assert_eq!(reference.classes().len(), 1);
        assert_eq!(reference.classes()[0].label(), "ST1");
    }

    #[test]
    fn test_unknown_allele() {
        let catalogue = ProfileCatalogue::new(vec![profile("ST9", Some("9"), Some("1"))]).unwrap();
        let result = build_reference_set(&catalogue, &alignments(), &AlleleCoverage::All, &positions());
        assert!(matches!(result, Err(ReferenceError::UnknownAllele { .. })));
    }

    #[test]
    fn test_bad_positions() {
        let catalogue = ProfileCatalogue::default();
        let outside = vec![Position::new(PositionId::new("adk", 3), 100, vec![(A, 0.5), (T, 0.5)]).unwrap()];
        let result = build_reference_set(&catalogue, &alignments(), &AlleleCoverage::All, &outside);
        assert!(matches!(result, Err(ReferenceError::ColumnOutOfRange { length: 3, .. })));

        let unknown = vec![Position::new(PositionId::new("recA", 0), 100, vec![(A, 0.5), (T, 0.5)]).unwrap()];
        let result = build_reference_set(&catalogue, &alignments(), &AlleleCoverage::All, &unknown);
        assert!(matches!(result, Err(ReferenceError::UnknownLocus { .. })));
    }

    #[test]
    fn test_empty_catalogue() {
        let reference = build_reference_set(&ProfileCatalogue::default(), &alignments(), &AlleleCoverage::All, &positions()).unwrap();
        assert!(reference.is_empty());
    }
}
