
use anyhow::bail;
use clap::Args;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::core::{check_optional_filename, check_required_filename, AFTER_HELP, FULL_VERSION};

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct ScanSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    strainmix_version: String,

    /// Per-position nucleotide counts (TSV: locus, column, A, C, G, T, gap, optional depth)
    #[clap(required = true)]
    #[clap(short = 'c')]
    #[clap(long = "counts")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub counts_filename: PathBuf,

    /// Per-read calls (TSV: read_id, locus, column, nucleotide)
    #[clap(required = true)]
    #[clap(short = 'f')]
    #[clap(long = "fragments")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub fragments_filename: PathBuf,

    /// Aligned allele sequences of the scheme (TSV: locus, allele, sequence)
    #[clap(required = true)]
    #[clap(short = 'a')]
    #[clap(long = "alleles")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub alleles_filename: PathBuf,

    /// Profile table, one identifier column followed by one column per locus
    #[clap(required = true)]
    #[clap(short = 'p')]
    #[clap(long = "profiles")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub profiles_filename: PathBuf,

    /// Alleles fully covered by the sample's reads (TSV: locus, allele) [default: all alleles]
    #[clap(long = "covered-alleles")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub covered_alleles_filename: Option<PathBuf>,

    /// Output directory containing the per-K solutions and the scan summary
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-folder")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_folder: PathBuf,

    /// Optional output debug folder, receives solver logs
    #[clap(long = "output-debug")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub debug_folder: Option<PathBuf>,

    /// Positions with depth more than this many standard deviations below their locus mean are dropped
    #[clap(long = "coverage-sd")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Evidence filter"))]
    #[clap(default_value = "2.0")]
    pub coverage_sd_multiplier: f64,

    /// Minimum read count for a nucleotide to be kept at a position
    #[clap(long = "min-count")]
    #[clap(value_name = "INT")]
    #[clap(help_heading = Some("Evidence filter"))]
    #[clap(default_value = "2")]
    pub min_symbol_count: u64,

    /// Nucleotides at or below this relative frequency are dropped
    #[clap(long = "min-frequency")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Evidence filter"))]
    #[clap(default_value = "0.01")]
    pub min_symbol_frequency: f64,

    /// Smallest strain count to solve
    #[clap(long = "k-min")]
    #[clap(value_name = "K")]
    #[clap(help_heading = Some("Scan parameters"))]
    #[clap(default_value = "1")]
    pub k_min: usize,

    /// Largest strain count to solve
    #[clap(long = "k-max")]
    #[clap(value_name = "K")]
    #[clap(help_heading = Some("Scan parameters"))]
    #[clap(default_value = "6")]
    pub k_max: usize,

    /// Time limit per K in seconds; runs that hit it report their best incumbent as a timeout, 0 disables the limit
    #[clap(long = "time-limit")]
    #[clap(value_name = "SECONDS")]
    #[clap(help_heading = Some("Solver parameters"))]
    #[clap(default_value = "60")]
    pub time_limit: f64,

    /// Maximum LP relaxations per K, 0 disables the limit
    #[clap(long = "node-limit")]
    #[clap(value_name = "INT")]
    #[clap(help_heading = Some("Solver parameters"))]
    #[clap(default_value = "0")]
    pub node_limit: usize,

    /// Stops the exact search once the relative gap to the bound is at most this value
    #[clap(long = "relative-gap")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Solver parameters"))]
    #[clap(default_value = "0.0")]
    pub relative_gap: f64,

    /// Uses the diving heuristic only; results are never reported as optimal
    #[clap(long = "heuristic")]
    #[clap(help_heading = Some("Solver parameters"))]
    pub heuristic: bool,

    /// Weight on novel strain usage
    #[clap(long = "weight-novel")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Objective weights"))]
    #[clap(default_value = "1.0")]
    pub weight_novel: f64,

    /// Weight on the average per-position deviation
    #[clap(long = "weight-dev-avg")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Objective weights"))]
    #[clap(default_value = "1.0")]
    pub weight_deviation_average: f64,

    /// Weight on the maximum per-position deviation
    #[clap(long = "weight-dev-max")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Objective weights"))]
    #[clap(default_value = "1.0")]
    pub weight_deviation_maximum: f64,

    /// Weight on the unphased fragment ratio
    #[clap(long = "weight-unphased")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Objective weights"))]
    #[clap(default_value = "1.0")]
    pub weight_unphased: f64,

    /// Number of threads, K values are solved in parallel
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

pub fn check_scan_settings(mut settings: ScanSettings) -> anyhow::Result<ScanSettings> {
    // hard code the version in
    settings.strainmix_version = FULL_VERSION.clone();
    info!("strainmix version: {:?}", &settings.strainmix_version);
    info!("Sub-command: scan");
    info!("Inputs:");

    check_required_filename(&settings.counts_filename, "Count table")?;
    check_required_filename(&settings.fragments_filename, "Fragment log")?;
    check_required_filename(&settings.alleles_filename, "Allele alignments")?;
    check_required_filename(&settings.profiles_filename, "Profile table")?;
    check_optional_filename(settings.covered_alleles_filename.as_deref(), "Covered alleles")?;

    info!("\tCounts: {:?}", &settings.counts_filename);
    info!("\tFragments: {:?}", &settings.fragments_filename);
    info!("\tAlleles: {:?}", &settings.alleles_filename);
    info!("\tProfiles: {:?}", &settings.profiles_filename);
    if let Some(filename) = settings.covered_alleles_filename.as_deref() {
        info!("\tCovered alleles: {filename:?}");
    } else {
        warn!("\tCovered alleles: None, every allele is treated as covered");
    }

    info!("Outputs:");
    info!("\tOutput folder: {:?}", &settings.output_folder);
    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("\tDebug folder: {debug_folder:?}");
    }

    info!("Evidence filter:");
    if !settings.coverage_sd_multiplier.is_finite() || settings.coverage_sd_multiplier < 0.0 {
        bail!("--coverage-sd must be a non-negative number");
    }
    if !(0.0..1.0).contains(&settings.min_symbol_frequency) {
        bail!("--min-frequency must be in [0, 1)");
    }
    info!("\tCoverage SD multiplier: {}", settings.coverage_sd_multiplier);
    info!("\tMinimum count: {}", settings.min_symbol_count);
    info!("\tMinimum frequency: {}", settings.min_symbol_frequency);

    info!("Scan parameters:");
    if settings.k_min == 0 {
        bail!("--k-min must be >0");
    }
    if settings.k_max < settings.k_min {
        bail!("--k-max must be >= --k-min");
    }
    info!("\tK range: {}..={}", settings.k_min, settings.k_max);

    info!("Solver parameters:");
    if !settings.time_limit.is_finite() || settings.time_limit < 0.0 {
        bail!("--time-limit must be a non-negative number of seconds");
    }
    if !settings.relative_gap.is_finite() || settings.relative_gap < 0.0 {
        bail!("--relative-gap must be a non-negative number");
    }
    info!("\tSolver: {}", if settings.heuristic { "diving heuristic" } else { "branch-and-bound" });
    if settings.time_limit > 0.0 {
        info!("\tTime limit: {}s", settings.time_limit);
    } else {
        warn!("\tTime limit: NONE, exact runs may not finish on large schemes");
    }
    info!("\tNode limit: {}", if settings.node_limit > 0 { settings.node_limit.to_string() } else { "NONE".to_string() });
    info!("\tRelative gap: {}", settings.relative_gap);

    info!("Objective weights:");
    for (label, weight) in [
        ("--weight-novel", settings.weight_novel),
        ("--weight-dev-avg", settings.weight_deviation_average),
        ("--weight-dev-max", settings.weight_deviation_maximum),
        ("--weight-unphased", settings.weight_unphased)
    ] {
        if !weight.is_finite() || weight < 0.0 {
            bail!("{label} must be a non-negative number");
        }
        info!("\t{label}: {weight}");
    }

    if settings.threads == 0 {
        settings.threads = 1;
    }
    info!("Processing threads: {}", settings.threads);

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::core::{Cli, Commands};
    use clap::Parser;

    fn settings_with_inputs() -> ScanSettings {
        let filename = std::env::temp_dir().join("strainmix_test_cli_input.tsv");
        std::fs::write(&filename, "").unwrap();
        ScanSettings {
            counts_filename: filename.clone(),
            fragments_filename: filename.clone(),
            alleles_filename: filename.clone(),
            profiles_filename: filename,
            k_min: 1,
            k_max: 6,
            min_symbol_frequency: 0.01,
            weight_novel: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_check_scan_settings() {
        let settings = check_scan_settings(settings_with_inputs()).unwrap();
        assert_eq!(settings.threads, 1);
        assert!(!settings.strainmix_version.is_empty());
    }

    #[test]
    fn test_bad_k_range() {
        let mut settings = settings_with_inputs();
        settings.k_min = 3;
        settings.k_max = 2;
        assert!(check_scan_settings(settings).is_err());

        let mut settings = settings_with_inputs();
        settings.k_min = 0;
        assert!(check_scan_settings(settings).is_err());
    }

    #[test]
    fn test_default_time_limit() {
        let cli = Cli::try_parse_from([
            "strainmix", "scan", "-c", "counts.tsv", "-f", "fragments.tsv", "-a", "alleles.tsv", "-p", "profiles.tsv", "-o", "out"
        ]).unwrap();
        let Commands::Scan(settings) = cli.command;
        assert!(settings.time_limit.is_finite() && settings.time_limit > 0.0);
        assert_eq!(settings.time_limit, 60.0);

        let mut settings = settings_with_inputs();
        settings.time_limit = -1.0;
        assert!(check_scan_settings(settings).is_err());
    }

    #[test]
    fn test_missing_input() {
        let mut settings = settings_with_inputs();
        settings.counts_filename = PathBuf::from("/this/path/does/not/exist.tsv");
        assert!(check_scan_settings(settings).is_err());
    }
}
