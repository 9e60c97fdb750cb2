
use anyhow::Context;
use std::path::{Path, PathBuf};

use crate::k_scan::ScanReport;

/// Path of the solver log for one K inside a debug folder
pub fn solver_log_path(debug_folder: &Path, k: usize) -> PathBuf {
    debug_folder.join(format!("solver_log_k{k}.txt"))
}

/// Writes one plain-text solver log per K; entries whose solver never ran get an empty file
/// # Arguments
/// * `debug_folder` - existing folder to write into
/// * `report` - the finished scan
/// # Errors
/// * if any file cannot be written
pub fn write_solver_logs(debug_folder: &Path, report: &ScanReport) -> anyhow::Result<()> {
    for entry in report.entries() {
        let filename = solver_log_path(debug_folder, entry.k());
        let mut text = entry.solver_log().to_text();
        if let Err(e) = entry.result() {
            text.push_str(&format!("run failed: {e}\n"));
        }
        std::fs::write(&filename, text)
            .with_context(|| format!("Error while writing solver log to {filename:?}:"))?;
    }
    Ok(())
}
