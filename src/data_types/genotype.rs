
use itertools::Itertools;
use serde::Serialize;

use crate::data_types::nucleotide::{genotype_string, Nucleotide};

/// A catalogued strain (e.g. a sequence type) projected onto the variable positions of one sample
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct KnownGenotype {
    /// Catalogue identifier
    id: String,
    /// One symbol per retained position, in position order
    genotype: Vec<Nucleotide>
}

impl KnownGenotype {
    /// Constructor
    pub fn new(id: impl Into<String>, genotype: Vec<Nucleotide>) -> Self {
        Self {
            id: id.into(),
            genotype
        }
    }

    // getters
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn genotype(&self) -> &[Nucleotide] {
        &self.genotype
    }
}

/// Known genotypes that are indistinguishable at this sample's variable positions.
/// The engine treats the whole class as a single "known" identity.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EquivalenceClass {
    /// The shared genotype vector
    genotype: Vec<Nucleotide>,
    /// Identifiers of every member, in catalogue order
    members: Vec<String>
}

impl EquivalenceClass {
    /// Constructor, `members` should not be empty
    pub fn new(genotype: Vec<Nucleotide>, members: Vec<String>) -> Self {
        Self {
            genotype,
            members
        }
    }

    /// Adds another member with the same genotype
    pub fn add_member(&mut self, member: String) {
        self.members.push(member);
    }

    /// Tag used in reports, e.g. "ST11" or "ST11/ST4021"
    pub fn label(&self) -> String {
        self.members.iter().join("/")
    }

    /// Returns true if the provided genotype is exactly this class's genotype
    pub fn matches(&self, genotype: &[Nucleotide]) -> bool {
        self.genotype == genotype
    }

    /// Compact string form of the genotype
    pub fn genotype_string(&self) -> String {
        genotype_string(&self.genotype)
    }

    // getters
    pub fn genotype(&self) -> &[Nucleotide] {
        &self.genotype
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::nucleotide::Nucleotide::*;

    #[test]
    fn test_equivalence_class() {
        let mut class = EquivalenceClass::new(vec![A, G], vec!["ST1".to_string()]);
        assert_eq!(class.label(), "ST1");
        class.add_member("ST7".to_string());
        assert_eq!(class.label(), "ST1/ST7");
        assert!(class.matches(&[A, G]));
        assert!(!class.matches(&[A, C]));
        assert_eq!(class.genotype_string(), "AG");
    }
}
