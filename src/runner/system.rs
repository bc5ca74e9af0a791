//! Production runner backed by `std::process::Command`

use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::debug;

use super::{CommandRunner, CommandSpec, OperationResult};

/// Runs commands on the local host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> OperationResult {
        let program = match which::which(&spec.program) {
            Ok(path) => path,
            Err(_) => {
                debug!(command = %spec, "program not found on PATH");
                return OperationResult::not_launched(format!(
                    "command not found: {}",
                    spec.program
                ));
            }
        };

        let mut command = Command::new(program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());
        if let Some(ref dir) = spec.cwd {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let output = match command.output() {
            Ok(output) => output,
            Err(e) => {
                debug!(command = %spec, error = %e, "failed to launch");
                return OperationResult::not_launched(format!(
                    "failed to launch {}: {e}",
                    spec.program
                ));
            }
        };
        let elapsed = started.elapsed();

        let result = OperationResult {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed,
        };
        debug!(
            command = %spec,
            exit_code = ?result.exit_code,
            elapsed_ms = elapsed.as_millis() as u64,
            "command finished"
        );
        result
    }
}
