//! User-facing output utilities for clean, colored terminal messages
//!
//! Warnings and errors meant for the person running `pidx`, without the
//! timestamps and module paths of the `log` output.

use owo_colors::OwoColorize;

/// Display a warning message to the user in yellow with padding
///
/// # Example
/// ```ignore
/// output::warn("Incremental update not possible (not a git repository), rebuilding");
/// ```
pub fn warn(message: &str) {
    eprintln!("\n{}\n", message.yellow());
}

/// Display an error message to the user in red with padding
///
/// # Example
/// ```ignore
/// output::error("Error: no split index found at ./PROJECT_INDEX.json");
/// ```
pub fn error(message: &str) {
    eprintln!("\n{}\n", message.red());
}

/// Display an informational message to the user in default color with padding
pub fn info(message: &str) {
    eprintln!("\n{}\n", message);
}
