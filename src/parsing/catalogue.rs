
use anyhow::Context;
use log::warn;
use rustc_hash::FxHashSet as HashSet;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::data_types::nucleotide::Nucleotide;
use crate::reference_set::ReferenceError;

/// Allele field values that mean "allele not determined" in a profile table
const UNDETERMINED_ALLELES: [&str; 3] = ["", "N", "0"];

/// Aligned allele sequences for every locus of the scheme.
/// Every allele of a locus has the same aligned length, so column coordinates are shared.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlleleAlignments {
    /// locus -> allele -> aligned sequence
    loci: BTreeMap<String, BTreeMap<String, Vec<Nucleotide>>>
}

/// One row of the allele alignment TSV
#[derive(Debug, Deserialize)]
struct AlleleRow {
    locus: String,
    allele: String,
    sequence: String
}

impl AlleleAlignments {
    /// Adds one aligned allele sequence.
    /// # Errors
    /// * if the allele already exists for this locus
    /// * if the sequence length differs from the other alleles of the locus
    pub fn add_allele(&mut self, locus: &str, allele: &str, sequence: Vec<Nucleotide>) -> Result<(), ReferenceError> {
        let alleles = self.loci.entry(locus.to_string()).or_default();
        if let Some(expected) = alleles.values().next().map(|s| s.len()) {
            if expected != sequence.len() {
                return Err(ReferenceError::RaggedAlignment {
                    locus: locus.to_string(), allele: allele.to_string(), expected, found: sequence.len()
                });
            }
        }
        if alleles.contains_key(allele) {
            return Err(ReferenceError::DuplicateAllele { locus: locus.to_string(), allele: allele.to_string() });
        }
        alleles.insert(allele.to_string(), sequence);
        Ok(())
    }

    /// Loads the alignments from a TSV with columns `locus`, `allele`, `sequence`.
    /// # Errors
    /// * if the file cannot be opened or parsed
    /// * if a sequence contains a non-nucleotide symbol, or the rows are ragged or duplicated
    pub fn from_tsv(filename: &Path) -> anyhow::Result<AlleleAlignments> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(filename)
            .with_context(|| format!("Error while opening {filename:?}:"))?;

        let mut alignments = AlleleAlignments::default();
        for (row_index, result) in csv_reader.deserialize().enumerate() {
            let line = row_index + 2;
            let row: AlleleRow = result
                .with_context(|| format!("Error while parsing line {line} of {filename:?}:"))?;
            let sequence = row.sequence.chars()
                .map(Nucleotide::from_char)
                .collect::<Result<Vec<Nucleotide>, _>>()
                .map_err(|error| ReferenceError::InvalidSymbol { locus: row.locus.clone(), allele: row.allele.clone(), error })?;
            alignments.add_allele(&row.locus, &row.allele, sequence)
                .with_context(|| format!("Error while loading line {line} of {filename:?}:"))?;
        }
        Ok(alignments)
    }

    /// The loci in sorted order
    pub fn loci(&self) -> impl Iterator<Item = &str> {
        self.loci.keys().map(|l| l.as_str())
    }

    /// Aligned length of a locus, if known
    pub fn alignment_length(&self, locus: &str) -> Option<usize> {
        self.loci.get(locus)
            .and_then(|alleles| alleles.values().next())
            .map(|s| s.len())
    }

    /// Aligned sequence for an allele, if known
    pub fn sequence(&self, locus: &str, allele: &str) -> Option<&[Nucleotide]> {
        self.loci.get(locus)
            .and_then(|alleles| alleles.get(allele))
            .map(|s| s.as_slice())
    }
}

/// One catalogued strain: an identifier and one allele per scheme locus
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Profile {
    /// Catalogue identifier, e.g. "ST11"
    id: String,
    /// locus -> allele, `None` when the allele was not determined
    alleles: BTreeMap<String, Option<String>>
}

impl Profile {
    /// Constructor
    pub fn new(id: impl Into<String>, alleles: BTreeMap<String, Option<String>>) -> Self {
        Self {
            id: id.into(),
            alleles
        }
    }

    /// The allele at a locus, `None` if undetermined or the locus is not part of the profile
    pub fn allele(&self, locus: &str) -> Option<&str> {
        self.alleles.get(locus)
            .and_then(|a| a.as_deref())
    }

    /// Returns true if every locus has a determined allele
    pub fn is_fully_determined(&self) -> bool {
        self.alleles.values().all(|a| a.is_some())
    }

    // getters
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alleles(&self) -> &BTreeMap<String, Option<String>> {
        &self.alleles
    }
}

/// The known-genotype catalogue, profiles kept in file order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileCatalogue {
    profiles: Vec<Profile>
}

impl ProfileCatalogue {
    /// Creates a catalogue, checking that identifiers are unique
    /// # Errors
    /// * if an identifier is repeated
    pub fn new(profiles: Vec<Profile>) -> Result<ProfileCatalogue, ReferenceError> {
        let mut seen: HashSet<&str> = Default::default();
        for profile in profiles.iter() {
            if !seen.insert(profile.id()) {
                return Err(ReferenceError::DuplicateProfile { id: profile.id().to_string() });
            }
        }
        Ok(ProfileCatalogue { profiles })
    }

    /// Loads a profile table: the first column is the identifier, then one column per locus.
    /// Columns that are not scheme loci (e.g. clonal complex) are ignored.
    /// # Arguments
    /// * `filename` - the TSV to load
    /// * `scheme_loci` - the loci every profile must provide a column for
    /// # Errors
    /// * if the file cannot be opened or parsed
    /// * if a scheme locus has no column
    /// * if an identifier is repeated
    pub fn from_tsv(filename: &Path, scheme_loci: &[String]) -> anyhow::Result<ProfileCatalogue> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(filename)
            .with_context(|| format!("Error while opening {filename:?}:"))?;

        let headers = csv_reader.headers()
            .with_context(|| format!("Error while reading header of {filename:?}:"))?
            .clone();

        let mut locus_columns = vec![];
        for locus in scheme_loci.iter() {
            let column = headers.iter()
                .skip(1)
                .position(|h| h == locus)
                .ok_or_else(|| ReferenceError::MissingLocusColumn { locus: locus.clone() })?;
            // +1 because we skipped the identifier column
            locus_columns.push((locus.clone(), column + 1));
        }

        let ignored: Vec<&str> = headers.iter().skip(1)
            .filter(|h| !scheme_loci.iter().any(|l| l == h))
            .collect();
        if !ignored.is_empty() {
            warn!("Ignoring non-scheme profile columns: {ignored:?}");
        }

        let mut profiles = vec![];
        for (row_index, result) in csv_reader.records().enumerate() {
            let line = row_index + 2;
            let record = result
                .with_context(|| format!("Error while parsing line {line} of {filename:?}:"))?;
            let id = record.get(0).unwrap_or_default().trim().to_string();

            let alleles = locus_columns.iter()
                .map(|(locus, column)| {
                    let field = record.get(*column).unwrap_or_default().trim();
                    let allele = if UNDETERMINED_ALLELES.contains(&field) {
                        None
                    } else {
                        Some(field.to_string())
                    };
                    (locus.clone(), allele)
                })
                .collect();
            profiles.push(Profile::new(id, alleles));
        }

        let catalogue = ProfileCatalogue::new(profiles)
            .with_context(|| format!("Error while loading {filename:?}:"))?;
        Ok(catalogue)
    }

    // getters
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }
}

/// Which (locus, allele) pairs the sample's reads fully cover
#[derive(Clone, Debug, Default, PartialEq)]
pub enum AlleleCoverage {
    /// No coverage information, every allele is treated as covered
    #[default]
    All,
    /// Only these pairs are covered
    Covered(HashSet<(String, String)>)
}

/// One row of the covered allele TSV
#[derive(Debug, Deserialize)]
struct CoverageRow {
    locus: String,
    allele: String
}

impl AlleleCoverage {
    /// Loads covered alleles from a TSV with columns `locus`, `allele`
    /// # Errors
    /// * if the file cannot be opened or parsed
    pub fn from_tsv(filename: &Path) -> anyhow::Result<AlleleCoverage> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(filename)
            .with_context(|| format!("Error while opening {filename:?}:"))?;

        let mut covered: HashSet<(String, String)> = Default::default();
        for (row_index, result) in csv_reader.deserialize().enumerate() {
            let row: CoverageRow = result
                .with_context(|| format!("Error while parsing line {} of {filename:?}:", row_index + 2))?;
            covered.insert((row.locus, row.allele));
        }
        Ok(AlleleCoverage::Covered(covered))
    }

    /// Returns true if the allele is covered
    pub fn is_covered(&self, locus: &str, allele: &str) -> bool {
        match self {
            AlleleCoverage::All => true,
            AlleleCoverage::Covered(covered) => covered.contains(&(locus.to_string(), allele.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::nucleotide::Nucleotide::*;

    fn write_fixture(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("strainmix_{}_{name}", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_alleles_from_tsv() {
        let path = write_fixture("alleles.tsv",
            "locus\tallele\tsequence\nadk\t1\tACG-T\nadk\t2\tACGAT\ngyrB\t1\tTT\n"
        );
        let alignments = AlleleAlignments::from_tsv(&path).unwrap();
        assert_eq!(alignments.loci().collect::<Vec<_>>(), vec!["adk", "gyrB"]);
        assert_eq!(alignments.alignment_length("adk"), Some(5));
        assert_eq!(alignments.sequence("adk", "1"), Some(&[A, C, G, Gap, T][..]));
        assert_eq!(alignments.sequence("adk", "3"), None);
        assert_eq!(alignments.alignment_length("recA"), None);
    }

    #[test]
    fn test_ragged_alignment() {
        let mut alignments = AlleleAlignments::default();
        alignments.add_allele("adk", "1", vec![A, C]).unwrap();
        let result = alignments.add_allele("adk", "2", vec![A]);
        assert!(matches!(result, Err(ReferenceError::RaggedAlignment { expected: 2, found: 1, .. })));
        let result = alignments.add_allele("adk", "1", vec![A, A]);
        assert!(matches!(result, Err(ReferenceError::DuplicateAllele { .. })));
    }

    #[test]
    fn test_profiles_from_tsv() {
        let path = write_fixture("profiles.tsv",
            "ST\tadk\tgyrB\tclonal_complex\nST1\t1\t4\tCC1\nST2\t2\tN\tCC1\n"
        );
        let loci = vec!["adk".to_string(), "gyrB".to_string()];
        let catalogue = ProfileCatalogue::from_tsv(&path, &loci).unwrap();
        assert_eq!(catalogue.profiles().len(), 2);

        let st1 = &catalogue.profiles()[0];
        assert_eq!(st1.id(), "ST1");
        assert_eq!(st1.allele("adk"), Some("1"));
        assert_eq!(st1.allele("gyrB"), Some("4"));
        assert!(st1.is_fully_determined());

        let st2 = &catalogue.profiles()[1];
        assert_eq!(st2.allele("gyrB"), None);
        assert!(!st2.is_fully_determined());
    }

    #[test]
    fn test_profiles_missing_locus() {
        let path = write_fixture("profiles_missing.tsv", "ST\tadk\nST1\t1\n");
        let loci = vec!["adk".to_string(), "gyrB".to_string()];
        let err = ProfileCatalogue::from_tsv(&path, &loci).unwrap_err();
        assert!(matches!(err.downcast_ref::<ReferenceError>(), Some(ReferenceError::MissingLocusColumn { .. })));
    }

    #[test]
    fn test_coverage() {
        assert!(AlleleCoverage::All.is_covered("adk", "1"));
        let path = write_fixture("covered.tsv", "locus\tallele\nadk\t1\n");
        let coverage = AlleleCoverage::from_tsv(&path).unwrap();
        assert!(coverage.is_covered("adk", "1"));
        assert!(!coverage.is_covered("adk", "2"));
    }
}
