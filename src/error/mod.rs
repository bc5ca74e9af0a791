//! Error types and handling for homestead
//!
//! Uses `thiserror` for error definitions and `miette` for diagnostics codes and help.
//!
//! Errors are grouped by the layer that raises them:
//! - plan: step sequencing and plan files
//! - wait: lock contention and health waits
//! - host: preflight checks and external commands
//! - config: configuration files and operator input
//! - fs: file system access

use miette::Diagnostic;
use thiserror::Error;

/// Main error type for homestead operations
#[derive(Error, Diagnostic, Debug)]
pub enum DeployError {
    // Plan errors
    #[error("Step {ordinal} '{label}' failed: {reason}")]
    #[diagnostic(
        code(homestead::plan::step_failed),
        help(
            "Steps before {ordinal} were left in place. Fix the cause, then resume with --start-at {ordinal}"
        )
    )]
    StepFailed {
        ordinal: usize,
        label: String,
        reason: String,
        diagnostics: Vec<String>,
    },

    #[error("Installation cancelled by operator during '{step}'")]
    #[diagnostic(code(homestead::plan::cancelled))]
    Cancelled { step: String },

    #[error("Step '{label}' cannot move from {from} to {to}")]
    #[diagnostic(code(homestead::plan::invalid_transition))]
    InvalidStepTransition {
        label: String,
        from: String,
        to: String,
    },

    #[error("Invalid plan: {message}")]
    #[diagnostic(
        code(homestead::plan::invalid),
        help("Each step needs a label, a kind (resilient, lock_guarded, health_polled) and a command")
    )]
    PlanInvalid { message: String },

    // Wait errors
    #[error("Timed out after {waited_secs}s waiting for the {resource} to become free")]
    #[diagnostic(
        code(homestead::wait::lock_timeout),
        help("Another agent still holds the {resource}. Blocking markers: {markers}; processes: {processes}")
    )]
    LockTimeout {
        resource: String,
        waited_secs: u64,
        markers: String,
        processes: String,
    },

    #[error("{subject} did not become ready within {waited_secs}s")]
    #[diagnostic(code(homestead::wait::health_timeout))]
    HealthTimeout { subject: String, waited_secs: u64 },

    // Host errors
    #[error("Preflight check failed: {message}")]
    #[diagnostic(code(homestead::host::preflight_failed))]
    PreflightFailed { message: String },

    #[error("Command `{command}` failed{}: {stderr}", exit_suffix(.exit_code))]
    #[diagnostic(code(homestead::host::command_failed))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    // Configuration errors
    #[error("Configuration file not found: {path}")]
    #[diagnostic(code(homestead::config::not_found))]
    ConfigNotFound { path: String },

    #[error("Failed to parse configuration file: {path}: {reason}")]
    #[diagnostic(code(homestead::config::parse_failed))]
    ConfigParseFailed { path: String, reason: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(
        code(homestead::config::invalid),
        help("Pass the value as a flag, set the HOMESTEAD_* environment variable, or add it to the config file")
    )]
    ConfigInvalid { message: String },

    #[error("Failed to render template '{name}': {reason}")]
    #[diagnostic(code(homestead::config::template_failed))]
    TemplateFailed { name: String, reason: String },

    #[error("Failed to read operator input: {message}")]
    #[diagnostic(code(homestead::config::prompt_failed))]
    PromptFailed { message: String },

    // File system errors
    #[error("Failed to read file: {path}: {reason}")]
    #[diagnostic(code(homestead::fs::read_failed))]
    FileReadFailed { path: String, reason: String },

    #[error("Failed to write file: {path}: {reason}")]
    #[diagnostic(code(homestead::fs::write_failed))]
    FileWriteFailed { path: String, reason: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(homestead::fs::io_error))]
    IoError { message: String },
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => String::new(),
    }
}

impl DeployError {
    /// Diagnostic output captured while the failing step ran
    pub fn diagnostics(&self) -> &[String] {
        match self {
            DeployError::StepFailed { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }

    /// Whether the operator ended the run
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeployError::Cancelled { .. })
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_cancelled() { 130 } else { 1 }
    }
}

impl From<std::io::Error> for DeployError {
    fn from(err: std::io::Error) -> Self {
        DeployError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for DeployError {
    fn from(err: serde_yaml::Error) -> Self {
        DeployError::ConfigParseFailed {
            path: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        DeployError::ConfigParseFailed {
            path: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<inquire::InquireError> for DeployError {
    fn from(err: inquire::InquireError) -> Self {
        DeployError::PromptFailed {
            message: err.to_string(),
        }
    }
}

impl From<handlebars::RenderError> for DeployError {
    fn from(err: handlebars::RenderError) -> Self {
        DeployError::TemplateFailed {
            name: err.template_name.clone().unwrap_or_default(),
            reason: err.to_string(),
        }
    }
}

/// Result type alias using miette for error handling
pub type Result<T> = miette::Result<T, DeployError>;
