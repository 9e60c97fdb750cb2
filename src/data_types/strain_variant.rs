
use serde::Serialize;

use crate::data_types::nucleotide::{genotype_string, Nucleotide};

/// Whether an inferred strain matches a catalogued identity
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub enum StrainClassification {
    /// Does not match any equivalence class at the variable positions
    Novel,
    /// Matches an equivalence class exactly
    Known {
        /// Index into the sample's equivalence class list
        class_index: usize,
        /// Report tag for the class
        label: String
    }
}

impl StrainClassification {
    /// Returns true for novel strains
    pub fn is_novel(&self) -> bool {
        matches!(self, StrainClassification::Novel)
    }

    /// Report string, "Novel" or the class tag
    pub fn label(&self) -> &str {
        match self {
            StrainClassification::Novel => "Novel",
            StrainClassification::Known { label, .. } => label
        }
    }
}

/// One row of a candidate solution
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StrainVariant {
    /// Relative abundance in [0, 1]
    abundance: f64,
    /// One symbol per retained position
    genotype: Vec<Nucleotide>,
    /// Novel or known
    classification: StrainClassification
}

impl StrainVariant {
    /// Constructor
    pub fn new(abundance: f64, genotype: Vec<Nucleotide>, classification: StrainClassification) -> Self {
        Self {
            abundance,
            genotype,
            classification
        }
    }

    /// Compact string form of the genotype
    pub fn genotype_string(&self) -> String {
        genotype_string(&self.genotype)
    }

    // getters
    pub fn abundance(&self) -> f64 {
        self.abundance
    }

    pub fn genotype(&self) -> &[Nucleotide] {
        &self.genotype
    }

    pub fn classification(&self) -> &StrainClassification {
        &self.classification
    }
}
