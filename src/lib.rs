//! Gentoo kernel upgrades, start to finish.
//!
//! Takes a host from its running kernel to the newest kernel source that
//! `eselect kernel list` knows about:
//!
//! - **Discovery** - running release from `uname -r`, newest entry from eselect
//! - **Activation** - `eselect kernel set` repoints `/usr/src/linux`
//! - **Carry-forward** - the running kernel's `.config` seeds the new build
//! - **Backup** - optional copy of the running kernel's source tree
//! - **Build and boot** - `make`, `dracut`, `grub-mkconfig`
//!
//! # Architecture
//!
//! ```text
//! kernel-upgrade (binary)
//!     │
//!     ├── config     TOML settings + CLI overrides
//!     ├── preflight  host tool checks
//!     ├── lock       one upgrade at a time
//!     │
//!     └── upgrade::KernelUpgrade
//!             ├── listing   parse eselect output
//!             ├── paths     old/new tree and config paths
//!             ├── carry     copy .config forward
//!             ├── backup    copy old tree aside
//!             └── process   Cmd + CommandRunner (capture / stream)
//! ```
//!
//! Library code never exits the process. Every failure comes back as an
//! [`UpgradeError`], so the sequence can be embedded in a larger tool.
//!
//! # Example
//!
//! ```rust,no_run
//! use kernel_upgrade::{KernelUpgrade, SystemRunner, UpgradeOptions, UpgradeOutcome};
//!
//! let options = UpgradeOptions { backup: true, ..Default::default() };
//! match KernelUpgrade::new(SystemRunner, options).run()? {
//!     UpgradeOutcome::AlreadyUpToDate { version } => println!("{} already selected", version),
//!     UpgradeOutcome::Upgraded { version } => println!("now on {}", version),
//! }
//! # Ok::<(), kernel_upgrade::UpgradeError>(())
//! ```

pub mod backup;
pub mod carry;
pub mod config;
pub mod error;
pub mod listing;
pub mod lock;
pub mod paths;
pub mod preflight;
pub mod process;
pub mod upgrade;

pub use error::UpgradeError;
pub use process::{Cmd, CommandRunner, SystemRunner};
pub use upgrade::{KernelUpgrade, UpgradeOptions, UpgradeOutcome};
