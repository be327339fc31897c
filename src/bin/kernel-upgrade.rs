use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use env_logger::Env;
use kernel_upgrade::config::resolve_settings;
use kernel_upgrade::lock::RunLock;
use kernel_upgrade::preflight::check_host_tools;
use kernel_upgrade::{KernelUpgrade, SystemRunner, UpgradeOutcome};

#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    backup: bool,
    jobs: Option<usize>,
    config: Option<PathBuf>,
    skip_preflight: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Run(CliArgs),
    Help,
}

fn usage() -> &'static str {
    "Usage:\n  kernel-upgrade [--backup] [--jobs N] [--config PATH] [--skip-preflight]\n\n\
     Options:\n  \
     --backup          copy the running kernel's source tree to <tree>.backup before building\n  \
     -j, --jobs N      parallel make jobs (default: number of CPUs)\n  \
     --config PATH     settings file (default: $KERNEL_UPGRADE_CONFIG, then /etc/kernel-upgrade.toml)\n  \
     --skip-preflight  do not check for eselect/make/dracut/grub-mkconfig first\n  \
     -h, --help        show this message"
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args)? {
        Invocation::Help => {
            println!("{}", usage());
            return Ok(());
        }
        Invocation::Run(cli) => cli,
    };

    let mut settings = resolve_settings(cli.config.as_deref()).context("loading settings")?;
    if cli.backup {
        settings.upgrade.backup = true;
    }
    if cli.jobs.is_some() {
        settings.upgrade.jobs = cli.jobs;
    }

    if cli.skip_preflight {
        log::warn!("[upgrade:preflight] skipped");
    } else {
        check_host_tools().context("preflight check failed")?;
    }

    let lock = RunLock::acquire(&settings.lock_file)?;
    log::debug!("Holding run lock {}", lock.path().display());

    let outcome = KernelUpgrade::new(SystemRunner, settings.upgrade)
        .run()
        .context("kernel upgrade aborted")?;

    match outcome {
        UpgradeOutcome::AlreadyUpToDate { version } => {
            log::info!("Kernel {} is already selected; nothing to upgrade", version);
        }
        UpgradeOutcome::Upgraded { version } => {
            log::info!("Reboot to start kernel {}", version);
        }
    }

    Ok(())
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut cli = CliArgs::default();
    let mut rest = args;

    while let Some((flag, tail)) = rest.split_first() {
        rest = tail;
        match flag.as_str() {
            "-h" | "--help" => return Ok(Invocation::Help),
            "--backup" => cli.backup = true,
            "--skip-preflight" => cli.skip_preflight = true,
            "-j" | "--jobs" => {
                let (value, tail) = rest
                    .split_first()
                    .with_context(|| format!("{} requires a value\n{}", flag, usage()))?;
                rest = tail;
                cli.jobs = Some(parse_jobs(value)?);
            }
            "--config" => {
                let (value, tail) = rest
                    .split_first()
                    .with_context(|| format!("--config requires a path\n{}", usage()))?;
                rest = tail;
                cli.config = Some(PathBuf::from(value));
            }
            other => bail!("unknown argument '{}'\n{}", other, usage()),
        }
    }

    Ok(Invocation::Run(cli))
}

fn parse_jobs(value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(jobs) if jobs > 0 => Ok(jobs),
        _ => bail!("invalid job count '{}'; expected a positive integer", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_arguments_is_a_plain_run() {
        assert_eq!(
            parse_args(&[]).unwrap(),
            Invocation::Run(CliArgs::default())
        );
    }

    #[test]
    fn test_all_flags() {
        let parsed = parse_args(&args(&[
            "--backup",
            "-j",
            "16",
            "--config",
            "/tmp/ku.toml",
            "--skip-preflight",
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            Invocation::Run(CliArgs {
                backup: true,
                jobs: Some(16),
                config: Some(PathBuf::from("/tmp/ku.toml")),
                skip_preflight: true,
            })
        );
    }

    #[test]
    fn test_help_wins() {
        assert_eq!(
            parse_args(&args(&["--backup", "--help"])).unwrap(),
            Invocation::Help
        );
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse_args(&args(&["--jobs"])).is_err());
        assert!(parse_args(&args(&["--jobs", "0"])).is_err());
        assert!(parse_args(&args(&["--jobs", "many"])).is_err());
        assert!(parse_args(&args(&["--config"])).is_err());
        assert!(parse_args(&args(&["upgrade"])).is_err());
    }
}
