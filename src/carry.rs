//! Carry the running kernel's `.config` into the newly selected source tree.

use std::fs;
use std::path::PathBuf;

use crate::error::UpgradeError;
use crate::paths::UpgradePaths;

/// Fail with [`UpgradeError::PathNotFound`] unless the new source tree is a directory.
pub fn ensure_new_tree(paths: &UpgradePaths) -> Result<(), UpgradeError> {
    if paths.new_tree.is_dir() {
        Ok(())
    } else {
        Err(UpgradeError::PathNotFound {
            path: paths.new_tree.clone(),
        })
    }
}

/// Copy the old `.config` over `<prefix>/.config`.
///
/// Nothing is written unless the new tree exists. Returns the directory the
/// build commands must run in.
pub fn carry_forward_config(paths: &UpgradePaths) -> Result<PathBuf, UpgradeError> {
    ensure_new_tree(paths)?;

    let bytes = fs::copy(&paths.old_config, &paths.new_config).map_err(|e| {
        UpgradeError::io(
            format!(
                "copying {} to {}",
                paths.old_config.display(),
                paths.new_config.display()
            ),
            e,
        )
    })?;
    log::info!(
        "  Copied {} -> {} ({} bytes)",
        paths.old_config.display(),
        paths.new_config.display(),
        bytes
    );

    Ok(paths.source_root.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::RunningKernel;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    /// Lay out `linux-6.5.0-gentoo/` with a config and, optionally,
    /// `linux-6.6.8/` plus the `linux` symlink pointing at it.
    fn source_tree(with_new: bool) -> (TempDir, UpgradePaths) {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path().join("linux");
        let paths = UpgradePaths::new(
            &prefix,
            ".config",
            &RunningKernel::new("6.5.0-gentoo"),
            "6.6.8",
        );
        fs::create_dir_all(&paths.old_tree).unwrap();
        fs::write(&paths.old_config, "CONFIG_FOO=y\n").unwrap();
        if with_new {
            fs::create_dir_all(&paths.new_tree).unwrap();
            symlink(&paths.new_tree, &prefix).unwrap();
        }
        (temp, paths)
    }

    #[test]
    fn test_carry_forward_copies_config() {
        let (_temp, paths) = source_tree(true);

        let workdir = carry_forward_config(&paths).unwrap();

        assert_eq!(workdir, paths.source_root);
        assert_eq!(
            fs::read_to_string(paths.new_tree.join(".config")).unwrap(),
            "CONFIG_FOO=y\n"
        );
    }

    #[test]
    fn test_carry_forward_overwrites_existing_config() {
        let (_temp, paths) = source_tree(true);
        fs::write(&paths.new_config, "CONFIG_STALE=y\n").unwrap();

        carry_forward_config(&paths).unwrap();

        assert_eq!(
            fs::read_to_string(&paths.new_config).unwrap(),
            "CONFIG_FOO=y\n"
        );
    }

    #[test]
    fn test_missing_new_tree_copies_nothing() {
        let (temp, paths) = source_tree(false);

        let err = carry_forward_config(&paths).unwrap_err();

        assert!(matches!(err, UpgradeError::PathNotFound { ref path } if *path == paths.new_tree));
        assert!(!paths.new_config.exists());
        assert!(!temp.path().join("linux-6.6.8").exists());
    }

    #[test]
    fn test_missing_old_config_is_io_error() {
        let (_temp, paths) = source_tree(true);
        fs::remove_file(&paths.old_config).unwrap();

        let err = carry_forward_config(&paths).unwrap_err();
        assert!(matches!(err, UpgradeError::Io { .. }));
    }
}
