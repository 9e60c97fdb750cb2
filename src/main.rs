
use log::{LevelFilter, error, info, warn};
use std::time::{Duration, Instant};

use strainmix::cli::core::{Commands, get_cli};
use strainmix::cli::scan::{ScanSettings, check_scan_settings};
use strainmix::data_types::solution::ObjectiveWeightsBuilder;
use strainmix::evidence_filter::{FilterConfigBuilder, build_evidence};
use strainmix::k_scan::{ScanConfigBuilder, run_k_scan};
use strainmix::parsing::catalogue::{AlleleAlignments, AlleleCoverage, ProfileCatalogue};
use strainmix::parsing::count_table::CountTable;
use strainmix::parsing::fragment_log::FragmentLog;
use strainmix::reference_set::build_reference_set;
use strainmix::solvers::{ModelSolver, SolveBudgetBuilder};
use strainmix::solvers::branch_bound::BranchAndBoundSolver;
use strainmix::solvers::diving::DivingSolver;
use strainmix::util::json_io::save_json;
use strainmix::writers::position_table::write_positions;
use strainmix::writers::scan_summary::{scan_records, write_scan_summary};
use strainmix::writers::solution_table::write_solution;
use strainmix::writers::solver_log::write_solver_logs;

fn run_scan(settings: ScanSettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    let settings = match check_scan_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    // set up the number of threads for rayon
    match rayon::ThreadPoolBuilder::new().num_threads(settings.threads).build_global() {
        Ok(()) => {},
        Err(e) => {
            error!("Error while building thread pool: {e}");
            std::process::exit(exitcode::OSERR);
        }
    };

    // create the primary output folder
    info!("Creating output folder at {:?}...", settings.output_folder);
    match std::fs::create_dir_all(&settings.output_folder) {
        Ok(()) => {},
        Err(e) => {
            error!("Error while creating output folder: {e}");
            std::process::exit(exitcode::IOERR);
        }
    }

    // create a debug folder if specified
    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("Creating debug folder at {debug_folder:?}...");
        match std::fs::create_dir_all(debug_folder) {
            Ok(()) => {},
            Err(e) => {
                error!("Error while creating debug folder: {e}");
                std::process::exit(exitcode::IOERR);
            }
        }

        // save the CLI options
        let cli_json = debug_folder.join("cli_settings.json");
        info!("Saving CLI options to {cli_json:?}...");
        if let Err(e) = save_json(&settings, &cli_json) {
            error!("Error while saving CLI options: {e}");
            std::process::exit(exitcode::IOERR);
        }
    }

    // load the sample evidence
    info!("Loading sample evidence...");
    let count_table = match CountTable::from_tsv(&settings.counts_filename) {
        Ok(ct) => ct,
        Err(e) => {
            error!("Error while loading count table: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };
    let fragment_log = match FragmentLog::from_tsv(&settings.fragments_filename) {
        Ok(fl) => fl,
        Err(e) => {
            error!("Error while loading fragment log: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };

    let filter_config = match FilterConfigBuilder::default()
        .coverage_sd_multiplier(settings.coverage_sd_multiplier)
        .min_symbol_count(settings.min_symbol_count)
        .min_symbol_frequency(settings.min_symbol_frequency)
        .build() {
        Ok(fc) => fc,
        Err(e) => {
            error!("Error while building filter config: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    let evidence = match build_evidence(&count_table, &fragment_log, &filter_config) {
        Ok(ev) => ev,
        Err(e) => {
            error!("Error while filtering evidence: {e:#}");
            std::process::exit(exitcode::DATAERR);
        }
    };
    if evidence.is_degenerate() {
        warn!("No variable positions were retained, solutions carry no deconvolution signal");
    }

    // load the scheme and build the candidate reference set
    info!("Loading typing scheme...");
    let alignments = match AlleleAlignments::from_tsv(&settings.alleles_filename) {
        Ok(aa) => aa,
        Err(e) => {
            error!("Error while loading allele alignments: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };
    let scheme_loci: Vec<String> = alignments.loci().map(String::from).collect();
    let catalogue = match ProfileCatalogue::from_tsv(&settings.profiles_filename, &scheme_loci) {
        Ok(pc) => pc,
        Err(e) => {
            error!("Error while loading profile table: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };
    let coverage = match settings.covered_alleles_filename.as_deref() {
        Some(filename) => match AlleleCoverage::from_tsv(filename) {
            Ok(ac) => ac,
            Err(e) => {
                error!("Error while loading covered alleles: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        },
        None => AlleleCoverage::default()
    };
    let reference = match build_reference_set(&catalogue, &alignments, &coverage, evidence.positions()) {
        Ok(rs) => rs,
        Err(e) => {
            error!("Error while building candidate reference set: {e:#}");
            std::process::exit(exitcode::DATAERR);
        }
    };
    info!("Candidate reference set: {} profiles in {} classes, {} profiles excluded",
        reference.genotypes().len(), reference.classes().len(), reference.excluded().len());

    // build our scan configuration
    let weights = match ObjectiveWeightsBuilder::default()
        .novel_usage(settings.weight_novel)
        .deviation_average(settings.weight_deviation_average)
        .deviation_maximum(settings.weight_deviation_maximum)
        .unphased(settings.weight_unphased)
        .build() {
        Ok(w) => w,
        Err(e) => {
            error!("Error while building objective weights: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    let budget = match SolveBudgetBuilder::default()
        .time_limit((settings.time_limit > 0.0).then(|| Duration::from_secs_f64(settings.time_limit)))
        .node_limit((settings.node_limit > 0).then_some(settings.node_limit))
        .relative_gap(settings.relative_gap)
        .build() {
        Ok(b) => b,
        Err(e) => {
            error!("Error while building solve budget: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    let scan_config = match ScanConfigBuilder::default()
        .k_values((settings.k_min..=settings.k_max).collect())
        .weights(weights)
        .budget(budget)
        .parallel(settings.threads > 1)
        .show_progress(true)
        .build() {
        Ok(sc) => sc,
        Err(e) => {
            error!("Error while building scan config: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };
    let solver: Box<dyn ModelSolver> = if settings.heuristic {
        Box::new(DivingSolver)
    } else {
        Box::new(BranchAndBoundSolver)
    };

    info!("Solving strain mixtures...");
    let report = match run_k_scan(&evidence, &reference, &scan_config, solver.as_ref()) {
        Ok(r) => r,
        Err(e) => {
            error!("Error while running K scan: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    for (i, entry) in report.entries().iter().enumerate() {
        match entry.result() {
            Ok(solution) => {
                info!("K={}: objective {:.6}, marginal improvement {}", entry.k(), solution.objective(),
                    report.marginal_improvement(i).map(|m| format!("{m:.6}")).unwrap_or_else(|| "NA".to_string()));
                for variant in solution.variants().iter() {
                    info!("\t{:.3}\t{}\t{}", variant.abundance(), variant.classification().label(), variant.genotype_string());
                }
            },
            Err(e) => {
                warn!("K={}: no solution ({e})", entry.k());
            }
        };
    }

    // now write things
    info!("Saving outputs to {:?}...", settings.output_folder);
    let positions_fn = settings.output_folder.join("positions.tsv");
    if let Err(e) = write_positions(&positions_fn, evidence.positions()) {
        error!("Error while saving positions file: {e:#}");
        std::process::exit(exitcode::IOERR);
    }

    for entry in report.entries().iter() {
        if let Ok(solution) = entry.result() {
            let solution_fn = settings.output_folder.join(format!("solution_k{}.tsv", entry.k()));
            if let Err(e) = write_solution(&solution_fn, solution) {
                error!("Error while saving solution file: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        }
    }

    let summary_fn = settings.output_folder.join("scan_summary.tsv");
    if let Err(e) = write_scan_summary(&summary_fn, &report) {
        error!("Error while saving scan summary: {e:#}");
        std::process::exit(exitcode::IOERR);
    }

    let scan_json = settings.output_folder.join("scan.json.gz");
    if let Err(e) = save_json(&scan_records(&report), &scan_json) {
        error!("Error while saving scan JSON: {e:#}");
        std::process::exit(exitcode::IOERR);
    }

    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        let stats_json = debug_folder.join("evidence_stats.json");
        if let Err(e) = save_json(evidence.stats(), &stats_json) {
            error!("Error while saving evidence stats: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
        if let Err(e) = write_solver_logs(debug_folder, &report) {
            error!("Error while saving solver logs: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    }

    let num_solved = report.entries().len() - report.num_failures();
    info!("Solved:failed K values: {num_solved} : {}", report.num_failures());
    if num_solved == 0 {
        error!("No K value produced a solution");
        std::process::exit(exitcode::SOFTWARE);
    }

    info!("Scan completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn main() {
    let cli = get_cli();
    match cli.command {
        Commands::Scan(settings) => {
            run_scan(*settings);
        }
    }

    info!("Process finished successfully.");
}
