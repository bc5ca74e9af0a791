//! Operation runner: executes one external command and reports what happened
//!
//! Commands are described structurally by [`CommandSpec`] (program plus argument list),
//! never as shell strings, so operator-supplied values such as domain names and usernames
//! are passed to the program verbatim.
//!
//! A non-zero exit and a missing binary are both ordinary [`OperationResult`]s; the runner
//! itself never fails.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

mod system;

pub use system::SystemRunner;

/// Structured description of one external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment overlay applied on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Indices into `args` that are masked when the command is displayed
    pub hidden: Vec<usize>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            hidden: Vec::new(),
        }
    }

    /// Build a spec from an argv-style list; `None` when the list is empty
    pub fn from_argv<S: AsRef<str>>(argv: &[S]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self::new(program.as_ref()).args(rest.iter().map(AsRef::as_ref)))
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Argument that never shows up in logs, prompts or error messages
    #[must_use]
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.hidden.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for (index, arg) in self.args.iter().enumerate() {
            if self.hidden.contains(&index) {
                write!(f, " ****")?;
            } else if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Outcome of a single external operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
    /// Exit code of the process, `None` if it could not be launched or was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl OperationResult {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// The operation could not be started at all
    pub fn not_launched(message: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: message.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// One-line summary of a failure for logs and error messages
    pub fn failure_summary(&self) -> String {
        let detail = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        let detail = detail.lines().last().unwrap_or_default();
        match self.exit_code {
            Some(code) if detail.is_empty() => format!("exit code {code}"),
            Some(code) => format!("exit code {code}: {detail}"),
            None if detail.is_empty() => "not started".to_string(),
            None => detail.to_string(),
        }
    }

    /// Captured stdout and stderr combined for display
    pub fn combined_output(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", "") => String::new(),
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

/// Executes external commands synchronously
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> OperationResult;
}
