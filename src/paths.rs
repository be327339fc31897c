//! Source-tree paths derived from the two kernel identifiers.

use std::path::{Path, PathBuf};

use crate::listing::RunningKernel;

/// Paths touched by one upgrade.
///
/// With prefix `/usr/src/linux`, running kernel `6.5.0-gentoo` and candidate
/// `6.6.8-gentoo`:
///
/// | field         | path                                   |
/// |---------------|----------------------------------------|
/// | `source_root` | `/usr/src/linux`                       |
/// | `old_tree`    | `/usr/src/linux-6.5.0-gentoo`          |
/// | `new_tree`    | `/usr/src/linux-6.6.8-gentoo`          |
/// | `old_config`  | `/usr/src/linux-6.5.0-gentoo/.config`  |
/// | `new_config`  | `/usr/src/linux/.config`               |
/// | `backup_tree` | `/usr/src/linux-6.5.0-gentoo.backup`   |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePaths {
    pub source_root: PathBuf,
    pub old_tree: PathBuf,
    pub new_tree: PathBuf,
    pub old_config: PathBuf,
    pub new_config: PathBuf,
    pub backup_tree: PathBuf,
}

impl UpgradePaths {
    pub fn new(
        source_prefix: &Path,
        config_file: &str,
        current: &RunningKernel,
        candidate_version: &str,
    ) -> Self {
        let old_tree = suffixed(source_prefix, &format!("-{}", current.as_str()));
        let new_tree = suffixed(source_prefix, &format!("-{}", candidate_version));
        let backup_tree = suffixed(&old_tree, ".backup");

        Self {
            source_root: source_prefix.to_path_buf(),
            old_config: old_tree.join(config_file),
            new_config: source_prefix.join(config_file),
            old_tree,
            new_tree,
            backup_tree,
        }
    }
}

/// Append `suffix` to the last path component (`/usr/src/linux` → `/usr/src/linux-6.6.8`).
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}
