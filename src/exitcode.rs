//! Process exit codes, a subset of BSD `sysexits.h`.
//!
//! Only the codes [`crate::cli::CliError::exit_code`] can produce are defined.

pub const OK: i32 = 0;

/// Bad command line or missing subcommand.
pub const USAGE: i32 = 64;
/// Rejected node, fragment or network document.
pub const DATAERR: i32 = 65;
/// Input file for import or import-subtree does not exist.
pub const NOINPUT: i32 = 66;
/// Failure that is neither the caller's nor the disk's fault.
pub const SOFTWARE: i32 = 70;
/// Network file, backup or export could not be written or read.
pub const IOERR: i32 = 74;
/// Invalid settings in bizgraph.toml or BIZGRAPH_* variables.
pub const CONFIG: i32 = 78;
