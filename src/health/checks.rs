//! Readiness checks that can be handed to the poller as predicates

use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::runner::{CommandRunner, CommandSpec};

/// A yes/no readiness probe against the outside world
pub trait ReadinessCheck {
    fn describe(&self) -> String;

    fn is_ready(&self, runner: &dyn CommandRunner) -> bool;
}

/// Ready when the command exits successfully
pub struct CommandSucceeds(pub CommandSpec);

impl ReadinessCheck for CommandSucceeds {
    fn describe(&self) -> String {
        format!("`{}` succeeds", self.0)
    }

    fn is_ready(&self, runner: &dyn CommandRunner) -> bool {
        runner.run(&self.0).success
    }
}

/// Ready when the command succeeds or its output says the work was already done
///
/// For commands that fail on a second run, such as account registration.
pub struct SucceedsOrAlreadyDone {
    pub command: CommandSpec,
    pub markers: Vec<String>,
}

impl ReadinessCheck for SucceedsOrAlreadyDone {
    fn describe(&self) -> String {
        format!("`{}` succeeds or reports {:?}", self.command, self.markers)
    }

    fn is_ready(&self, runner: &dyn CommandRunner) -> bool {
        let result = runner.run(&self.command);
        if result.success {
            return true;
        }
        let output = result.combined_output().to_lowercase();
        let done = self.markers.iter().any(|m| output.contains(&m.to_lowercase()));
        if done {
            debug!(command = %self.command, "already done");
        }
        done
    }
}

/// Ready when a GET on the URL answers 200
pub struct HttpOk {
    pub url: String,
    pub timeout: Duration,
}

impl HttpOk {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl ReadinessCheck for HttpOk {
    fn describe(&self) -> String {
        format!("{} answers 200", self.url)
    }

    fn is_ready(&self, _runner: &dyn CommandRunner) -> bool {
        let client = match reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                debug!(error = %e, "could not build HTTP client");
                return false;
            }
        };
        match client.get(&self.url).send() {
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "health request");
                response.status() == StatusCode::OK
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "health request failed");
                false
            }
        }
    }
}

/// Ready when the compose service is listed and neither exited nor restarting
pub struct ContainerRunning {
    pub compose_dir: PathBuf,
    pub service: String,
}

impl ContainerRunning {
    pub fn new(compose_dir: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            compose_dir: compose_dir.into(),
            service: service.into(),
        }
    }

    pub fn status_command(&self) -> CommandSpec {
        CommandSpec::new("docker-compose")
            .args(["ps", self.service.as_str()])
            .current_dir(&self.compose_dir)
    }
}

impl ReadinessCheck for ContainerRunning {
    fn describe(&self) -> String {
        format!("container {} is running", self.service)
    }

    fn is_ready(&self, runner: &dyn CommandRunner) -> bool {
        let result = runner.run(&self.status_command());
        result.success
            && result.stdout.contains(self.service.as_str())
            && !result.stdout.contains("Exit")
            && !result.stdout.contains("Restarting")
    }
}

/// Ready when every inner check is; stops at the first that is not
pub struct AllOf(pub Vec<Box<dyn ReadinessCheck>>);

impl ReadinessCheck for AllOf {
    fn describe(&self) -> String {
        self.0
            .iter()
            .map(|c| c.describe())
            .collect::<Vec<_>>()
            .join(" and ")
    }

    fn is_ready(&self, runner: &dyn CommandRunner) -> bool {
        self.0.iter().all(|check| check.is_ready(runner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::OperationResult;
    use crate::test_support::ScriptedRunner;

    const PS_HEADER: &str = "Name    Command    State    Ports\n";

    #[test]
    fn test_container_running() {
        let runner = ScriptedRunner::new();
        runner.respond(
            "docker-compose ps conduwuit",
            vec![
                OperationResult::succeeded(format!("{PS_HEADER}conduwuit   /start   Restarting\n")),
                OperationResult::succeeded(format!("{PS_HEADER}conduwuit   /start   Exit 1\n")),
                OperationResult::succeeded(format!("{PS_HEADER}conduwuit   /start   Up\n")),
            ],
        );
        let check = ContainerRunning::new("/opt/matrix", "conduwuit");

        assert!(!check.is_ready(&runner));
        assert!(!check.is_ready(&runner));
        assert!(check.is_ready(&runner));
    }

    #[test]
    fn test_container_missing_is_not_ready() {
        let runner = ScriptedRunner::new();
        runner.respond(
            "docker-compose ps",
            vec![OperationResult::succeeded(PS_HEADER)],
        );
        assert!(!ContainerRunning::new("/opt/matrix", "conduwuit").is_ready(&runner));
    }

    #[test]
    fn test_all_of_short_circuits() {
        let runner = ScriptedRunner::new();
        runner.always_fail("docker");
        let check = AllOf(vec![
            Box::new(CommandSucceeds(CommandSpec::new("docker").arg("info"))),
            Box::new(CommandSucceeds(CommandSpec::new("curl").arg("-fsS"))),
        ]);

        assert!(!check.is_ready(&runner));
        assert_eq!(runner.count("curl"), 0);
        assert_eq!(check.describe(), "`docker info` succeeds and `curl -fsS` succeeds");
    }

    #[test]
    fn test_already_done_counts_as_ready() {
        let runner = ScriptedRunner::new();
        runner.respond(
            "register_new_matrix_user",
            vec![
                OperationResult::failed(1, "connection refused"),
                OperationResult::failed(1, "User ID already taken."),
            ],
        );
        let check = SucceedsOrAlreadyDone {
            command: CommandSpec::new("register_new_matrix_user").args(["-u", "admin"]),
            markers: vec!["already taken".to_string()],
        };

        assert!(!check.is_ready(&runner));
        assert!(check.is_ready(&runner));
    }

    #[test]
    fn test_http_ok_unreachable() {
        let check = HttpOk {
            url: "http://127.0.0.1:9/_matrix/client/versions".to_string(),
            timeout: Duration::from_millis(500),
        };
        assert!(!check.is_ready(&ScriptedRunner::new()));
    }
}
