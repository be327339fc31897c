//! Version discovery: the running kernel and the newest `eselect kernel` entry.
//!
//! `eselect kernel list` prints something like:
//!
//! ```text
//! Available kernel symlink targets:
//!   [1]   linux-6.1.67-gentoo
//!   [2]   linux-6.6.8-gentoo *
//! ```
//!
//! The newest kernel is listed last, and `*` marks the current symlink target.
//! Parsing is kept in this module so a format change in eselect shows up in
//! these tests rather than halfway through a kernel build.

use std::fmt;

use crate::error::UpgradeError;
use crate::process::{Cmd, CommandRunner};

/// Marker eselect appends to the active selection.
pub const SELECTED_MARKER: &str = "*";

/// Release string of the running kernel, as reported by `uname -r`
/// (e.g. `6.5.0-gentoo`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningKernel(String);

impl RunningKernel {
    pub fn new(release: impl Into<String>) -> Self {
        Self(release.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunningKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One line of `eselect kernel list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelEntry {
    /// 1-based selection index, passed to `eselect kernel set`.
    pub index: u32,
    /// Symlink target, e.g. `linux-6.6.8-gentoo`.
    pub target: String,
    /// Target with the leading name segment removed, e.g. `6.6.8-gentoo`.
    pub version: String,
    /// Whether this entry is the current selection.
    pub selected: bool,
}

/// Result of version discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub current: RunningKernel,
    pub candidate: KernelEntry,
}

/// Parse one listing line.
pub fn parse_entry(line: &str) -> Result<KernelEntry, UpgradeError> {
    let err = |reason: &str| UpgradeError::ListingParse {
        line: line.trim().to_string(),
        reason: reason.to_string(),
    };

    let open = line.find('[').ok_or_else(|| err("no '[' before the index"))?;
    let close = line[open..]
        .find(']')
        .map(|pos| open + pos)
        .ok_or_else(|| err("no ']' after the index"))?;

    let index: u32 = line[open + 1..close]
        .trim()
        .parse()
        .map_err(|_| err("index is not a number"))?;
    if index == 0 {
        return Err(err("index must be positive"));
    }

    let mut tokens = line[close + 1..].split_whitespace();
    let target = tokens.next().ok_or_else(|| err("no symlink target"))?;
    let selected = tokens.any(|token| token == SELECTED_MARKER);

    let (_name, version) = target
        .split_once('-')
        .ok_or_else(|| err("symlink target has no '-' separated version"))?;
    if version.is_empty() {
        return Err(err("empty version"));
    }

    Ok(KernelEntry {
        index,
        target: target.to_string(),
        version: version.to_string(),
        selected,
    })
}

/// Parse every entry of a listing, skipping header and blank lines.
pub fn parse_listing(output: &str) -> Result<Vec<KernelEntry>, UpgradeError> {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with('['))
        .map(parse_entry)
        .collect()
}

/// Parse the newest entry, which is always the last line of the listing.
///
/// Earlier lines are never looked at.
pub fn latest_entry(output: &str) -> Result<KernelEntry, UpgradeError> {
    let last = output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| UpgradeError::ListingParse {
            line: String::new(),
            reason: "kernel listing is empty".to_string(),
        })?;
    parse_entry(last)
}

/// Query the running kernel and the newest available kernel.
pub fn discover(runner: &mut dyn CommandRunner) -> Result<VersionInfo, UpgradeError> {
    let release = runner.capture(
        &Cmd::new("uname")
            .arg("-r")
            .error_msg("Could not read the running kernel release"),
    )?;
    let current = RunningKernel::new(release);

    let listing = runner.capture(
        &Cmd::new("eselect")
            .args(["kernel", "list"])
            .error_msg("Could not list kernel sources"),
    )?;
    log_entries(&listing);
    let candidate = latest_entry(&listing)?;

    Ok(VersionInfo { current, candidate })
}

/// Debug dump of every available kernel. Only the last line decides the
/// candidate, so a line that does not parse here is logged and ignored.
fn log_entries(listing: &str) {
    match parse_listing(listing) {
        Ok(entries) => {
            for entry in entries {
                let marker = if entry.selected { SELECTED_MARKER } else { "" };
                log::debug!("  [{}] {} {}", entry.index, entry.target, marker);
            }
        }
        Err(e) => log::debug!("  Kernel listing not fully parseable: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Available kernel symlink targets:\n  \
                           [1]   linux-6.1.67-gentoo\n  \
                           [2]   linux-6.6.8-gentoo *\n  \
                           [3]   linux-6.6.13-gentoo\n";

    #[test]
    fn test_parse_entry_plain() {
        let entry = parse_entry("  [3]   linux-6.6.13-gentoo").unwrap();
        assert_eq!(entry.index, 3);
        assert_eq!(entry.target, "linux-6.6.13-gentoo");
        assert_eq!(entry.version, "6.6.13-gentoo");
        assert!(!entry.selected);
    }

    #[test]
    fn test_parse_entry_selected_marker_stripped() {
        let entry = parse_entry("[2] linux-6.6.8 *").unwrap();
        assert_eq!(entry.index, 2);
        assert_eq!(entry.version, "6.6.8");
        assert!(entry.selected);
    }

    #[test]
    fn test_latest_entry_ignores_earlier_lines() {
        let entry = latest_entry(LISTING).unwrap();
        assert_eq!(entry.index, 3);
        assert_eq!(entry.version, "6.6.13-gentoo");
        assert!(!entry.selected);

        // Garbage above the last line does not matter.
        let entry = latest_entry("not a listing\n[x] ???\n[7] linux-6.7.1").unwrap();
        assert_eq!(entry.index, 7);
        assert_eq!(entry.version, "6.7.1");
    }

    #[test]
    fn test_latest_entry_single_line() {
        let entry = latest_entry("[1] linux-6.5.0").unwrap();
        assert_eq!(entry.index, 1);
        assert_eq!(entry.version, "6.5.0");
    }

    #[test]
    fn test_latest_entry_trailing_blank_lines() {
        let entry = latest_entry("[1] linux-6.5.0\n[2] linux-6.6.8 *\n\n   \n").unwrap();
        assert_eq!(entry.index, 2);
        assert!(entry.selected);
    }

    #[test]
    fn test_latest_entry_rejects_malformed_last_line() {
        assert!(latest_entry("").is_err());
        assert!(latest_entry("Available kernel symlink targets:").is_err());
        assert!(latest_entry("[a] linux-6.6.8").is_err());
        assert!(latest_entry("[0] linux-6.6.8").is_err());
        assert!(latest_entry("[1]").is_err());
        assert!(latest_entry("[1] linux").is_err());
    }

    struct Scripted(&'static str);

    impl CommandRunner for Scripted {
        fn capture(&mut self, cmd: &Cmd) -> Result<String, UpgradeError> {
            match cmd.program() {
                "uname" => Ok("6.5.0-gentoo".to_string()),
                _ => Ok(self.0.to_string()),
            }
        }

        fn stream(&mut self, cmd: &Cmd) -> Result<(), UpgradeError> {
            panic!("discovery must not run {}", cmd.display());
        }
    }

    #[test]
    fn test_discover_tolerates_malformed_earlier_lines() {
        let mut runner = Scripted("[x] broken\n[1] linux-6.5.0\n[2] linux-6.6.8");
        let info = discover(&mut runner).unwrap();
        assert_eq!(info.current, RunningKernel::new("6.5.0-gentoo"));
        assert_eq!(info.candidate.index, 2);
        assert_eq!(info.candidate.version, "6.6.8");
    }

    #[test]
    fn test_parse_listing_skips_header() {
        let entries = parse_listing(LISTING).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries.iter().filter(|e| e.selected).count(),
            1,
            "exactly one entry should carry the marker"
        );
        assert_eq!(entries[1].version, "6.6.8-gentoo");
    }
}
