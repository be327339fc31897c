//! The upgrade sequence.
//!
//! Stages run strictly in order and the first error ends the run:
//!
//! 1. discover   - `uname -r`, `eselect kernel list`
//! 2. guard      - stop if the newest kernel is already selected
//! 3. activate   - `eselect kernel set <index>`
//! 4. config     - copy the running kernel's `.config` into the new tree
//! 5. backup     - optional copy of the running kernel's tree
//! 6. build      - `make olddefconfig`, `make -jN`, `make modules_install`, `make install`
//! 7. boot       - `dracut --kver <version> --force`, `grub-mkconfig -o <path>`
//!
//! Completed steps are never rolled back; the backup from stage 5 is the
//! operator's way back.

use std::path::{Path, PathBuf};

use crate::backup::{self, BackupOutcome};
use crate::carry;
use crate::error::UpgradeError;
use crate::listing::{self, VersionInfo};
use crate::paths::UpgradePaths;
use crate::process::{Cmd, CommandRunner};

pub const DEFAULT_SOURCE_PREFIX: &str = "/usr/src/linux";
pub const DEFAULT_CONFIG_FILE: &str = ".config";
pub const DEFAULT_GRUB_CONFIG: &str = "/boot/grub/grub.cfg";

/// Knobs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeOptions {
    /// Canonical source symlink; versioned trees are its `-<version>` siblings.
    pub source_prefix: PathBuf,
    /// Build configuration file name inside a source tree.
    pub config_file: String,
    /// Where `grub-mkconfig` writes.
    pub grub_config: PathBuf,
    /// `make -j` value. `None` uses every available CPU.
    pub jobs: Option<usize>,
    /// Copy the running kernel's tree to `<tree>.backup` before building.
    pub backup: bool,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            source_prefix: PathBuf::from(DEFAULT_SOURCE_PREFIX),
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            grub_config: PathBuf::from(DEFAULT_GRUB_CONFIG),
            jobs: None,
            backup: false,
        }
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The newest kernel was already selected; nothing was changed.
    AlreadyUpToDate { version: String },
    /// The newest kernel was selected, built, installed and made bootable.
    Upgraded { version: String },
}

pub struct KernelUpgrade<R: CommandRunner> {
    runner: R,
    options: UpgradeOptions,
}

impl<R: CommandRunner> KernelUpgrade<R> {
    pub fn new(runner: R, options: UpgradeOptions) -> Self {
        Self { runner, options }
    }

    #[cfg(test)]
    fn runner(&self) -> &R {
        &self.runner
    }

    pub fn run(&mut self) -> Result<UpgradeOutcome, UpgradeError> {
        log::info!("[upgrade:discover] Querying kernel versions...");
        let VersionInfo { current, candidate } = listing::discover(&mut self.runner)?;
        log::info!("  Running kernel: {}", current);
        log::info!(
            "  Newest kernel:  [{}] {}",
            candidate.index,
            candidate.target
        );

        if candidate.selected {
            log::info!(
                "[upgrade:guard] {} is already the selected kernel, nothing to do",
                candidate.version
            );
            return Ok(UpgradeOutcome::AlreadyUpToDate {
                version: candidate.version,
            });
        }

        log::info!(
            "[upgrade:activate] Selecting [{}] {}...",
            candidate.index,
            candidate.target
        );
        self.runner.stream(&activate_cmd(candidate.index))?;

        let paths = UpgradePaths::new(
            &self.options.source_prefix,
            &self.options.config_file,
            &current,
            &candidate.version,
        );

        log::info!(
            "[upgrade:config] Carrying forward {} into {}...",
            paths.old_config.display(),
            paths.new_tree.display()
        );
        let workdir = carry::carry_forward_config(&paths)?;

        if self.options.backup {
            log::info!("[upgrade:backup] Backing up {}...", paths.old_tree.display());
            if let BackupOutcome::Copied { .. } =
                backup::backup_tree(&paths.old_tree, &paths.backup_tree)?
            {
                log::info!("  Backup at {}", paths.backup_tree.display());
            }
        }

        let jobs = self.options.jobs.unwrap_or_else(host_jobs);
        log::info!(
            "[upgrade:build] Building {} in {} with {} jobs...",
            candidate.version,
            workdir.display(),
            jobs
        );
        for step in build_steps(&workdir, jobs) {
            self.runner.stream(&step)?;
        }

        log::info!("[upgrade:boot] Regenerating initramfs and bootloader config...");
        for step in boot_steps(&workdir, &candidate.version, &self.options.grub_config) {
            self.runner.stream(&step)?;
        }

        log::info!(
            "[upgrade:done] Kernel update to version {} completed successfully",
            candidate.version
        );
        Ok(UpgradeOutcome::Upgraded {
            version: candidate.version,
        })
    }
}

/// `eselect kernel set <index>`.
pub fn activate_cmd(index: u32) -> Cmd {
    Cmd::new("eselect")
        .args(["kernel", "set"])
        .arg(index.to_string())
        .error_msg("eselect rejected the kernel selection")
}

/// The four `make` invocations, in order, all inside `workdir`.
pub fn build_steps(workdir: &Path, jobs: usize) -> Vec<Cmd> {
    let make = |target: String, msg: &str| {
        Cmd::new("make")
            .arg(target)
            .current_dir(workdir)
            .error_msg(msg)
    };
    vec![
        make("olddefconfig".into(), "make olddefconfig failed"),
        make(format!("-j{}", jobs), "Kernel build failed"),
        make("modules_install".into(), "Module install failed"),
        make("install".into(), "Kernel image install failed"),
    ]
}

/// Initramfs and GRUB regeneration for `version`.
pub fn boot_steps(workdir: &Path, version: &str, grub_config: &Path) -> Vec<Cmd> {
    vec![
        Cmd::new("dracut")
            .args(["--kver", version, "--force"])
            .current_dir(workdir)
            .error_msg("dracut failed to build the initramfs"),
        Cmd::new("grub-mkconfig")
            .arg("-o")
            .arg_path(grub_config)
            .current_dir(workdir)
            .error_msg("grub-mkconfig failed"),
    ]
}

/// Number of CPUs for `make -j`.
pub fn host_jobs() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            log::warn!("  Could not detect CPU count ({}), using 1 job", e);
            1
        }
    }
}
