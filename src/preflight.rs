//! Host tool checks run before the first `eselect kernel set`.
//!
//! The upgrade shells out to five programs. If one is absent we want to know
//! while the old kernel is still the selected one, not after `make install`
//! has already replaced files under `/boot`.
//!
//! ```rust,no_run
//! kernel_upgrade::preflight::check_host_tools()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{bail, Result};

/// Whether `cmd` resolves on `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Every program the upgrade invokes, paired with the Gentoo package that ships it.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("uname", "sys-apps/coreutils"),
    ("eselect", "app-admin/eselect"),
    ("make", "dev-build/make"),
    ("dracut", "sys-kernel/dracut"),
    ("grub-mkconfig", "sys-boot/grub"),
];

/// Fail with one message naming every absent program and what to emerge for it.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (emerge: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!(
            "cannot upgrade the kernel, these programs are not on PATH:\n{}",
            msg
        );
    }

    Ok(())
}

/// Run [`check_required_tools`] over [`REQUIRED_TOOLS`].
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}
