//! External command execution for the build pipeline and deploy targets.
//!
//! Everything that shells out (git, npm, wrangler, pre-processing scripts)
//! goes through the `CommandRunner` trait so the pipeline can be driven by a
//! fake in tests. `ProcessRunner` is the real implementation: it streams the
//! child's stdout and stderr line by line into the tracing log.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{DashError, Result};

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// A single external command: program, arguments, working directory and
/// extra environment on top of the inherited one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            env: Vec::new(),
        }
    }

    /// Build from an argv-style list; the first element is the program.
    /// Returns `None` for an empty list.
    pub fn from_argv(argv: &[String], cwd: &Path) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), cwd).args(args.iter().cloned()))
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

    pub fn envs(mut self, env: &[(String, String)]) -> Self {
        self.env.extend(env.iter().cloned());
        self
    }

    /// `program arg1 arg2` for log lines and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

pub trait CommandRunner: Send + Sync {
    /// Run to completion and return the exit code. Spawn failures are
    /// errors; a non-zero exit is not.
    fn run(&self, invocation: &Invocation) -> Result<i32>;

    /// Run and turn a non-zero exit into `DashError::CommandFailed`.
    fn run_checked(&self, invocation: &Invocation) -> Result<()> {
        let code = self.run(invocation)?;
        if code != 0 {
            return Err(DashError::CommandFailed {
                command: invocation.display(),
                code,
            });
        }
        Ok(())
    }
}

/// Runs commands as child processes of the dashboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<i32> {
        let search_path = std::env::var_os("PATH");
        let program = which::which_in(&invocation.program, search_path, &invocation.cwd)
            .map_err(|e| DashError::CommandSpawnFailed {
                program: invocation.program.clone(),
                reason: e.to_string(),
            })?;

        info!(cwd = %invocation.cwd.display(), "+ {}", invocation.display());
        let mut child = Command::new(program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DashError::CommandSpawnFailed {
                program: invocation.program.clone(),
                reason: e.to_string(),
            })?;

        let label = invocation.program.clone();
        let stderr_thread = child
            .stderr
            .take()
            .map(|stderr| std::thread::spawn(move || forward_lines(stderr, &label, true)));
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, &invocation.program, false);
        }
        if let Some(handle) = stderr_thread {
            let _ = handle.join();
        }

        let status = child.wait()?;
        let code = status.code().unwrap_or(-1);
        debug!(code = code, "+ {} finished", invocation.program);
        Ok(code)
    }
}

fn forward_lines(stream: impl Read, program: &str, is_stderr: bool) {
    for line in BufReader::new(stream).lines() {
        match line {
            Ok(line) if is_stderr => warn!(program = %program, "{line}"),
            Ok(line) => info!(program = %program, "{line}"),
            Err(_) => break,
        }
    }
}
