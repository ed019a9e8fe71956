//! Terminal output formatting utilities.

use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use prsync_core::{ErrorKind, SyncState};

static QUIET_MODE: AtomicBool = AtomicBool::new(false);

/// Set quiet mode globally. Call once at startup.
pub fn set_quiet(quiet: bool) {
    QUIET_MODE.store(quiet, Ordering::Relaxed);
}

fn is_quiet() -> bool {
    QUIET_MODE.load(Ordering::Relaxed)
}

/// Print a success message (suppressed in quiet mode).
pub fn success(msg: &str) {
    if !is_quiet() {
        println!("{} {}", "✓".green(), msg);
    }
}

/// Print an error message (always prints to stderr).
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a warning message (always prints to stderr).
pub fn warn(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Print essential machine-readable output (always prints).
///
/// Use for results that should be available for piping, like PR URLs.
pub fn essential(msg: &str) {
    println!("{msg}");
}

/// A failure kind, coloured by whether retrying the run could help.
#[must_use]
pub fn kind_label(kind: ErrorKind) -> String {
    let text = kind.as_str();
    match kind {
        ErrorKind::Transient | ErrorKind::Timeout => text.yellow().to_string(),
        ErrorKind::Validation | ErrorKind::PathInvalid => text.cyan().to_string(),
        _ => text.red().to_string(),
    }
}

/// Where a failed run stopped.
#[must_use]
pub fn stage_label(stage: SyncState) -> String {
    stage.to_string().dimmed().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_label_colors_match_retryability() {
        colored::control::set_override(true);

        assert_eq!(
            kind_label(ErrorKind::Transient),
            "transient".yellow().to_string()
        );
        assert_eq!(
            kind_label(ErrorKind::Validation),
            "validation".cyan().to_string()
        );
        assert_eq!(
            kind_label(ErrorKind::NotInstalled),
            "not_installed".red().to_string()
        );

        colored::control::set_override(false);
    }

    #[test]
    fn test_stage_label() {
        assert!(stage_label(SyncState::BranchCreated).contains("branch_created"));
    }

    #[test]
    fn test_quiet_mode_enabled() {
        set_quiet(true);
        assert!(is_quiet());
        // Reset
        set_quiet(false);
    }
}
