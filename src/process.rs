//! External command execution.
//!
//! [`Cmd`] describes an invocation; a [`CommandRunner`] executes it in one of
//! two shapes:
//!
//! - [`CommandRunner::capture`] for short queries (`uname -r`, `eselect kernel list`),
//!   returning trimmed stdout.
//! - [`CommandRunner::stream`] for long steps (`make`, `dracut`), forwarding each
//!   output line to the log as it arrives.
//!
//! Neither shape retries. A non-zero exit is always [`UpgradeError::CommandFailure`].
//!
//! ```rust,ignore
//! use kernel_upgrade::process::{Cmd, CommandRunner, SystemRunner};
//!
//! let mut runner = SystemRunner;
//! let release = runner.capture(&Cmd::new("uname").arg("-r"))?;
//! runner.stream(&Cmd::new("make").arg("olddefconfig").current_dir("/usr/src/linux"))?;
//! ```

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use crate::error::UpgradeError;

/// Lines of stderr kept from a streamed command for its failure report.
const STDERR_TAIL_LINES: usize = 20;

/// An external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    error_msg: Option<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().into_owned();
        self.arg(arg)
    }

    /// Run the command inside `dir` instead of the process working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Message logged when the command fails, naming the step that broke.
    pub fn error_msg(mut self, msg: &str) -> Self {
        self.error_msg = Some(msg.to_string());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// The command line as an operator would type it.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }
        command
    }

    fn failure(&self, code: Option<i32>, stderr: String) -> UpgradeError {
        if let Some(msg) = &self.error_msg {
            log::error!("{}", msg);
        }
        UpgradeError::CommandFailure {
            command: self.display(),
            code,
            stderr,
        }
    }

    fn spawn_failure(&self, err: io::Error) -> UpgradeError {
        self.failure(None, format!("failed to start '{}': {}", self.program, err))
    }
}

/// Executes [`Cmd`]s.
///
/// The orchestrator only talks to this trait, so tests can substitute a
/// recorder and embedders can add their own auditing.
pub trait CommandRunner {
    /// Run to completion and return trimmed stdout.
    fn capture(&mut self, cmd: &Cmd) -> Result<String, UpgradeError>;

    /// Run to completion, forwarding stdout/stderr line by line while it runs.
    fn stream(&mut self, cmd: &Cmd) -> Result<(), UpgradeError>;
}

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn capture(&mut self, cmd: &Cmd) -> Result<String, UpgradeError> {
        log::debug!("  $ {}", cmd.display());
        let output = cmd
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| cmd.spawn_failure(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(cmd.failure(output.status.code(), stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn stream(&mut self, cmd: &Cmd) -> Result<(), UpgradeError> {
        log::info!("  $ {}", cmd.display());
        let mut child = cmd
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| cmd.spawn_failure(e))?;

        // stderr is drained on its own thread so a chatty stderr cannot block
        // the child while we are reading stdout.
        let stderr_reader = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                forward_lines(stderr, |line| {
                    log::warn!("{}", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                });
                tail.into_iter().collect::<Vec<_>>().join("\n")
            })
        });

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, |line| log::info!("{}", line));
        }

        let status = child
            .wait()
            .map_err(|e| UpgradeError::io(format!("waiting for '{}'", cmd.display()), e))?;
        let stderr_tail = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(cmd.failure(status.code(), stderr_tail))
        }
    }
}

/// Hand every line of `reader` to `each` until EOF.
///
/// Lines are split on raw bytes and decoded lossily: compiler output is not
/// always UTF-8, and the pipe must stay open until the child exits or its
/// next write dies with SIGPIPE.
fn forward_lines(reader: impl Read, mut each: impl FnMut(String)) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                each(String::from_utf8_lossy(&buf).into_owned());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("  Stopped reading command output: {}", e);
                break;
            }
        }
    }
}
