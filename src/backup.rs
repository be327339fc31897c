//! Pre-build backup of the running kernel's source tree.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::UpgradeError;

/// What [`backup_tree`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The tree was copied; `files` counts regular files and symlinks.
    Copied { files: usize },
    /// The source tree does not exist, so there was nothing to back up.
    Skipped,
}

/// Recursively copy `src` to `dst`.
///
/// `dst` must not exist yet: an old backup is never merged into or replaced.
/// Symlinks are recreated as symlinks rather than followed.
pub fn backup_tree(src: &Path, dst: &Path) -> Result<BackupOutcome, UpgradeError> {
    if !src.is_dir() {
        log::warn!(
            "  [SKIP] No source tree at {}, nothing to back up",
            src.display()
        );
        return Ok(BackupOutcome::Skipped);
    }

    let fail = |reason: String| UpgradeError::BackupFailure {
        source_tree: src.to_path_buf(),
        reason,
    };

    if dst.exists() || dst.is_symlink() {
        return Err(fail(format!("backup target {} already exists", dst.display())));
    }

    log::info!("  Backing up {} to {}...", src.display(), dst.display());

    let mut files = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| fail(format!("walking source tree: {}", e)))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| fail(format!("{}: {}", entry.path().display(), e)))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        let result = if file_type.is_dir() {
            fs::create_dir_all(&target)
        } else if file_type.is_symlink() {
            files += 1;
            fs::read_link(entry.path()).and_then(|link| symlink(link, &target))
        } else {
            files += 1;
            fs::copy(entry.path(), &target).map(|_| ())
        };
        result.map_err(|e| fail(format!("copying {}: {}", entry.path().display(), e)))?;
    }

    log::info!("  Backed up {} files", files);
    Ok(BackupOutcome::Copied { files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn old_tree() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("linux-6.5.0-gentoo");
        let dst = temp.path().join("linux-6.5.0-gentoo.backup");
        fs::create_dir_all(src.join("arch/x86/boot")).unwrap();
        fs::write(src.join(".config"), "CONFIG_FOO=y\n").unwrap();
        fs::write(src.join("arch/x86/boot/bzImage"), "kernel").unwrap();
        symlink("arch/x86/boot/bzImage", src.join("vmlinuz")).unwrap();
        (temp, src, dst)
    }

    #[test]
    fn test_backup_copies_full_tree() {
        let (_temp, src, dst) = old_tree();

        let outcome = backup_tree(&src, &dst).unwrap();

        assert_eq!(outcome, BackupOutcome::Copied { files: 3 });
        assert_eq!(
            fs::read_to_string(dst.join(".config")).unwrap(),
            "CONFIG_FOO=y\n"
        );
        assert_eq!(
            fs::read_to_string(dst.join("arch/x86/boot/bzImage")).unwrap(),
            "kernel"
        );
        assert_eq!(
            fs::read_link(dst.join("vmlinuz")).unwrap(),
            Path::new("arch/x86/boot/bzImage")
        );
        // Source untouched.
        assert!(src.join(".config").is_file());
    }

    #[test]
    fn test_backup_skipped_when_source_missing() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("linux-missing");
        let dst = temp.path().join("linux-missing.backup");

        assert_eq!(backup_tree(&src, &dst).unwrap(), BackupOutcome::Skipped);
        assert!(!dst.exists());
    }

    #[test]
    fn test_backup_refuses_existing_target() {
        let (_temp, src, dst) = old_tree();
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("keep"), "previous backup").unwrap();

        let err = backup_tree(&src, &dst).unwrap_err();

        assert!(matches!(err, UpgradeError::BackupFailure { .. }));
        assert!(err.to_string().contains("already exists"));
        assert_eq!(
            fs::read_to_string(dst.join("keep")).unwrap(),
            "previous backup"
        );
    }
}
