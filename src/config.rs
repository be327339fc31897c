//! Optional TOML configuration.
//!
//! ```toml
//! # /etc/kernel-upgrade.toml
//! source_prefix = "/usr/src/linux"
//! config_file = ".config"
//! grub_config = "/boot/grub/grub.cfg"
//! jobs = 12
//! backup = true
//! lock_file = "/run/kernel-upgrade.lock"
//! ```
//!
//! Every key is optional. Command-line flags override the file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::upgrade::{
    UpgradeOptions, DEFAULT_CONFIG_FILE, DEFAULT_GRUB_CONFIG, DEFAULT_SOURCE_PREFIX,
};

/// Config file read when neither `--config` nor the env var is given.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/kernel-upgrade.toml";
/// Env var naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "KERNEL_UPGRADE_CONFIG";
pub const DEFAULT_LOCK_FILE: &str = "/run/kernel-upgrade.lock";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    source_prefix: Option<PathBuf>,
    config_file: Option<String>,
    grub_config: Option<PathBuf>,
    jobs: Option<usize>,
    backup: Option<bool>,
    lock_file: Option<PathBuf>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub upgrade: UpgradeOptions,
    pub lock_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upgrade: UpgradeOptions::default(),
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
        }
    }
}

/// Parse config text; `origin` is only used in error messages.
pub fn parse_settings(text: &str, origin: &Path) -> Result<Settings> {
    let parsed: ConfigToml = toml::from_str(text)
        .with_context(|| format!("parsing config '{}'", origin.display()))?;

    let config_file = parsed
        .config_file
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    if config_file.trim().is_empty() || config_file.contains('/') {
        bail!(
            "invalid config '{}': config_file must be a plain file name, got '{}'",
            origin.display(),
            config_file
        );
    }
    if parsed.jobs == Some(0) {
        bail!(
            "invalid config '{}': jobs must be at least 1",
            origin.display()
        );
    }

    let source_prefix = parsed
        .source_prefix
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOURCE_PREFIX));
    if source_prefix.file_name().is_none() {
        bail!(
            "invalid config '{}': source_prefix '{}' has no final path component",
            origin.display(),
            source_prefix.display()
        );
    }

    Ok(Settings {
        upgrade: UpgradeOptions {
            source_prefix,
            config_file,
            grub_config: parsed
                .grub_config
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GRUB_CONFIG)),
            jobs: parsed.jobs,
            backup: parsed.backup.unwrap_or(false),
        },
        lock_file: parsed
            .lock_file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_FILE)),
    })
}

/// Read settings from one file.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config '{}'", path.display()))?;
    parse_settings(&text, path)
}

/// Resolve settings from, in order: an explicit path, `$KERNEL_UPGRADE_CONFIG`,
/// `/etc/kernel-upgrade.toml`, built-in defaults.
///
/// An explicitly named file must exist; the system file is optional.
pub fn resolve_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return load_settings(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return load_settings(Path::new(&path))
            .with_context(|| format!("{} points at an unusable file", CONFIG_ENV_VAR));
    }

    let system = Path::new(SYSTEM_CONFIG_PATH);
    if system.is_file() {
        log::debug!("Using config {}", system.display());
        return load_settings(system);
    }

    Ok(Settings::default())
}
