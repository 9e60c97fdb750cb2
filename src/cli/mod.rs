/*!
# CLI module
Command line interface functionality that is specific to strainmix.
*/

/// The main CLI module that contains the top-level CLI parser and help text
pub mod core;
/// The scan CLI subcommand
pub mod scan;
