//! The built-in deployment plan
//!
//! Twelve steps take a fresh Debian or Ubuntu host to a running homeserver with a TURN relay
//! and TLS. Every step is safe to repeat, so a failed install can be resumed with
//! `--start-at`. Account creation treats an existing account as done.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};
use wax::{Glob, Pattern};

use super::preflight::{Preflight, port_in_use};
use super::secrets::Secrets;
use super::templates::{TemplateData, write_service_files};
use crate::config::{DeployConfig, Timing};
use crate::contention::PackageLockProbe;
use crate::context::RunContext;
use crate::error::{DeployError, Result};
use crate::health::{
    AllOf, CommandSucceeds, ContainerRunning, HttpOk, SucceedsOrAlreadyDone, WaitSpec,
};
use crate::plan::{
    Composite, HealthPolledWait, LockGuardedCall, ResilientCall, StepOperation, Task,
};
use crate::progress::MessageLevel;
use crate::retry::{ResilientExecutor, RetryPolicy};
use crate::runner::CommandSpec;
use crate::troubleshoot::RecoveryCatalog;

pub const BASE_PACKAGES: [&str; 9] = [
    "apt-transport-https",
    "ca-certificates",
    "curl",
    "gnupg",
    "lsb-release",
    "software-properties-common",
    "net-tools",
    "snapd",
    "psmisc",
];

pub const APT_SOURCES_DIR: &str = "/etc/apt/sources.list.d";
pub const DOCKER_INSTALL_URL: &str = "https://get.docker.com";
pub const COMPOSE_URL: &str =
    "https://github.com/docker/compose/releases/latest/download/docker-compose-Linux-x86_64";
pub const COMPOSE_BIN: &str = "/usr/local/bin/docker-compose";
pub const SERVICE: &str = "conduwuit";
pub const VERSIONS_PATH: &str = "/_matrix/client/versions";
/// Registration output when the admin account exists from an earlier run
const ACCOUNT_EXISTS_MARKERS: [&str; 2] = ["already taken", "already exists"];

/// Web servers that may hold port 80 during the ACME challenge
const PORT_80_SERVICES: [&str; 3] = ["apache2", "nginx", "httpd"];

type Steps = Vec<(String, Box<dyn StepOperation>)>;

/// Deployment plan plus the values the closing summary needs
pub struct DeployPlan {
    pub steps: Steps,
    pub secrets: Secrets,
    pub recovery: RecoveryCatalog,
}

fn apt(args: &[&str]) -> CommandSpec {
    CommandSpec::new("apt-get")
        .args(args.iter().copied())
        .env("DEBIAN_FRONTEND", "noninteractive")
}

fn systemctl(args: &[&str]) -> CommandSpec {
    CommandSpec::new("systemctl").args(args.iter().copied())
}

fn lock_guarded(command: CommandSpec, timing: &Timing) -> LockGuardedCall {
    LockGuardedCall::new(
        command,
        timing.retry.policy(),
        Box::new(PackageLockProbe::default()),
        timing.lock.settings(),
    )
}

/// Certbot's three tries five seconds apart
fn certbot_policy() -> RetryPolicy {
    RetryPolicy::fixed(3, Duration::from_secs(5))
}

pub fn recovery(config: &DeployConfig) -> RecoveryCatalog {
    let turn = config.effective_turn_domain();
    RecoveryCatalog::for_install(&config.install_dir, &[config.domain.as_str(), turn.as_str()])
}

/// Build the plan, reusing secrets from an earlier run when they exist
pub fn build(config: &DeployConfig) -> DeployPlan {
    let secrets = Secrets::recover_or_generate(&config.install_dir);
    DeployPlan {
        steps: steps(config, &secrets),
        recovery: recovery(config),
        secrets,
    }
}

pub fn steps(config: &DeployConfig, secrets: &Secrets) -> Steps {
    let timing = config.timing();
    let compose = Compose::new(&config.install_dir);
    let local_versions = format!("http://localhost:8000{VERSIONS_PATH}");

    vec![
        (
            "Preflight checks".to_string(),
            Box::new(Task::new(
                "root user, Debian host, required ports free",
                |ctx: &mut RunContext| Preflight::default().run(ctx),
            )) as Box<dyn StepOperation>,
        ),
        (
            "Refresh package index".to_string(),
            Box::new(refresh_index(&timing)),
        ),
        (
            "Install base packages".to_string(),
            Box::new(lock_guarded(
                apt(&["install", "-y"]).args(BASE_PACKAGES),
                &timing,
            )),
        ),
        (
            "Install certificate client".to_string(),
            Box::new(certificate_client(&timing)),
        ),
        (
            "Install container runtime".to_string(),
            Box::new(container_runtime(&timing)),
        ),
        (
            "Install compose".to_string(),
            Box::new(
                Composite::new()
                    .then(
                        "download docker-compose",
                        ResilientCall::new(
                            CommandSpec::new("curl").args(["-fsSL", "-o", COMPOSE_BIN, COMPOSE_URL]),
                            timing.retry.policy(),
                        ),
                    )
                    .then(
                        "make docker-compose executable",
                        ResilientCall::new(
                            CommandSpec::new("chmod").args(["755", COMPOSE_BIN]),
                            RetryPolicy::once(),
                        ),
                    ),
            ),
        ),
        (
            "Write service configuration".to_string(),
            Box::new(write_configuration(config, secrets)),
        ),
        (
            "Obtain TLS certificates".to_string(),
            Box::new(certificates(config)),
        ),
        (
            "Start services".to_string(),
            Box::new(
                Composite::new()
                    .then(
                        "pull images",
                        ResilientCall::new(compose.command(&["pull"]), timing.retry.policy()),
                    )
                    .then(
                        "start containers",
                        ResilientCall::new(compose.command(&["up", "-d"]), timing.retry.policy()),
                    )
                    .with_diagnostics(compose.logs()),
            ),
        ),
        (
            "Wait for service health".to_string(),
            Box::new(HealthPolledWait::new(
                Box::new(AllOf(vec![
                    Box::new(ContainerRunning::new(&config.install_dir, SERVICE)),
                    Box::new(CommandSucceeds(compose.command(&[
                        "exec",
                        "-T",
                        SERVICE,
                        "curl",
                        "-fs",
                        local_versions.as_str(),
                    ]))),
                ])),
                WaitSpec::new(
                    "service health",
                    timing.health.service_timeout,
                    timing.health.poll_interval,
                )
                .with_diagnostics(compose.logs()),
            )),
        ),
        (
            "Create admin account".to_string(),
            Box::new(HealthPolledWait::new(
                Box::new(SucceedsOrAlreadyDone {
                    command: compose
                        .command(&["exec", "-T", SERVICE, "register_new_matrix_user"])
                        .args(["-c", "/data/conduwuit.toml", "-u", config.admin_user.as_str(), "-p"])
                        .secret_arg(config.admin_password.clone())
                        .arg("-a"),
                    markers: ACCOUNT_EXISTS_MARKERS.iter().map(ToString::to_string).collect(),
                }),
                WaitSpec::new(
                    "admin account",
                    timing.health.account_timeout,
                    timing.health.poll_interval,
                )
                .with_diagnostics(compose.logs()),
            )),
        ),
        (
            "Verify public reachability".to_string(),
            Box::new(HealthPolledWait::new(
                Box::new(HttpOk::new(format!("https://{}{VERSIONS_PATH}", config.domain))),
                WaitSpec::new(
                    "public reachability",
                    timing.health.reachability_timeout,
                    timing.health.poll_interval,
                ),
            )),
        ),
    ]
}

/// `docker-compose` commands run from the install directory
struct Compose {
    dir: PathBuf,
}

impl Compose {
    fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn command(&self, args: &[&str]) -> CommandSpec {
        CommandSpec::new("docker-compose")
            .args(args.iter().copied())
            .current_dir(&self.dir)
    }

    fn logs(&self) -> CommandSpec {
        self.command(&["logs", "--tail=50", SERVICE])
    }
}

fn refresh_index(timing: &Timing) -> Composite {
    Composite::new()
        .then(
            "remove stale certbot package sources",
            Task::new("remove certbot-* source lists", |ctx: &mut RunContext| {
                let removed = remove_matching(Path::new(APT_SOURCES_DIR), "certbot-*")?;
                if !removed.is_empty() {
                    ctx.say(
                        MessageLevel::Detail,
                        &format!("removed {} stale certbot source list(s)", removed.len()),
                    );
                }
                Ok(())
            }),
        )
        .then(
            "apt-get update",
            lock_guarded(apt(&["update"]), timing).non_fatal(),
        )
}

/// Delete the files directly inside `dir` whose names match `pattern`
pub fn remove_matching(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let glob = Glob::new(pattern).map_err(|e| DeployError::PlanInvalid {
        message: format!("bad file pattern '{pattern}': {e}"),
    })?;
    let Ok(entries) = fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "directory missing, nothing to remove");
        return Ok(Vec::new());
    };

    let mut removed = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !entry.path().is_file() || !glob.is_match(name.as_str()) {
            continue;
        }
        fs::remove_file(entry.path()).map_err(|e| DeployError::FileWriteFailed {
            path: entry.path().display().to_string(),
            reason: e.to_string(),
        })?;
        info!(path = %entry.path().display(), "removed");
        removed.push(entry.path());
    }
    removed.sort();
    Ok(removed)
}

fn certificate_client(timing: &Timing) -> Composite {
    Composite::new()
        .then(
            "start snapd",
            ResilientCall::new(systemctl(&["enable", "--now", "snapd"]), timing.retry.policy()),
        )
        .then(
            "wait for snapd",
            HealthPolledWait::new(
                Box::new(CommandSucceeds(CommandSpec::new("snap").arg("version"))),
                WaitSpec::new(
                    "snap daemon",
                    timing.health.daemon_timeout,
                    timing.health.poll_interval,
                ),
            ),
        )
        .then(
            "remove the distribution certbot",
            lock_guarded(apt(&["remove", "-y", "certbot"]), timing).non_fatal(),
        )
        .then(
            "install the certbot snap",
            ResilientCall::new(
                CommandSpec::new("snap").args(["install", "--classic", "certbot"]),
                certbot_policy(),
            ),
        )
        .then(
            "link /usr/bin/certbot",
            ResilientCall::new(
                CommandSpec::new("ln").args(["-sf", "/snap/bin/certbot", "/usr/bin/certbot"]),
                RetryPolicy::once(),
            ),
        )
        .then(
            "verify certbot",
            Task::new("certbot is on PATH", |_ctx: &mut RunContext| {
                require_tool("certbot")
            }),
        )
}

fn require_tool(name: &str) -> Result<()> {
    match which::which(name) {
        Ok(path) => {
            debug!(tool = name, path = %path.display(), "found");
            Ok(())
        }
        Err(e) => Err(DeployError::CommandFailed {
            command: format!("which {name}"),
            exit_code: None,
            stderr: e.to_string(),
        }),
    }
}

fn container_runtime(timing: &Timing) -> Composite {
    let policy = timing.retry.policy();
    Composite::new()
        .then(
            "install docker",
            Task::new(
                format!("run {DOCKER_INSTALL_URL} unless docker is installed"),
                move |ctx: &mut RunContext| {
                    if which::which("docker").is_ok() {
                        ctx.say(MessageLevel::Detail, "docker already installed");
                        return Ok(());
                    }
                    let script = std::env::temp_dir().join("get-docker.sh").display().to_string();
                    let download = CommandSpec::new("curl").args([
                        "-fsSL",
                        DOCKER_INSTALL_URL,
                        "-o",
                        script.as_str(),
                    ]);
                    for command in [download, CommandSpec::new("sh").arg(script.as_str())] {
                        let result = ResilientExecutor::execute(ctx, &command, &policy);
                        if !result.success {
                            return Err(DeployError::CommandFailed {
                                command: command.to_string(),
                                exit_code: result.exit_code,
                                stderr: result.failure_summary(),
                            });
                        }
                    }
                    Ok(())
                },
            ),
        )
        .then(
            "start docker",
            ResilientCall::new(systemctl(&["enable", "--now", "docker"]), timing.retry.policy()),
        )
        .then(
            "wait for docker",
            HealthPolledWait::new(
                Box::new(CommandSucceeds(systemctl(&["is-active", "--quiet", "docker"]))),
                WaitSpec::new(
                    "docker daemon",
                    timing.health.daemon_timeout,
                    timing.health.poll_interval,
                )
                .with_diagnostics(CommandSpec::new("journalctl").args([
                    "-u",
                    "docker",
                    "-n",
                    "50",
                    "--no-pager",
                ])),
            ),
        )
}

fn write_configuration(config: &DeployConfig, secrets: &Secrets) -> Task {
    let install_dir = config.install_dir.clone();
    let data = TemplateData::new(config, secrets);
    Task::new(
        format!("render service files into {}", install_dir.display()),
        move |ctx: &mut RunContext| {
            for path in write_service_files(&install_dir, &data)? {
                ctx.say(MessageLevel::Detail, &format!("wrote {}", path.display()));
            }
            Ok(())
        },
    )
}

fn certificates(config: &DeployConfig) -> Composite {
    let mut composite = Composite::new();
    for service in PORT_80_SERVICES {
        composite = composite.then(
            format!("stop {service}"),
            ResilientCall::new(systemctl(&["stop", service]), RetryPolicy::once()).non_fatal(),
        );
    }
    composite = composite.then(
        "check port 80",
        Task::new("port 80 is free", |_ctx: &mut RunContext| {
            if port_in_use(80) {
                return Err(DeployError::PreflightFailed {
                    message: "port 80 is still in use; certbot needs it for the HTTP challenge"
                        .to_string(),
                });
            }
            Ok(())
        }),
    );

    let domains = [config.domain.clone(), config.effective_turn_domain()];
    for domain in &domains {
        composite = composite.then(
            format!("request a certificate for {domain}"),
            ResilientCall::new(
                CommandSpec::new("certbot").args([
                    "certonly",
                    "--standalone",
                    "--preferred-challenges",
                    "http",
                    "-d",
                    domain.as_str(),
                    "--email",
                    config.email.as_str(),
                    "--agree-tos",
                    "-n",
                ]),
                certbot_policy(),
            ),
        );
    }

    let cert_dir = config.cert_dir.clone();
    let install_dir = config.install_dir.clone();
    composite.then(
        "install certificates",
        Task::new(
            format!("copy the {} certificate into certs/", config.domain),
            move |ctx: &mut RunContext| {
                for domain in &domains {
                    certificate_files(&cert_dir, domain)?;
                }
                let copied =
                    install_certificates(&cert_dir.join(&domains[0]), &install_dir.join("certs"))?;
                ctx.say(
                    MessageLevel::Detail,
                    &format!("installed {copied} certificate files"),
                );
                Ok(())
            },
        ),
    )
}

/// Paths of the chain and key certbot left for `domain`; both must exist
pub fn certificate_files(cert_dir: &Path, domain: &str) -> Result<[PathBuf; 2]> {
    let live = cert_dir.join(domain);
    let files = [live.join("fullchain.pem"), live.join("privkey.pem")];
    if let Some(missing) = files.iter().find(|path| !path.is_file()) {
        return Err(DeployError::FileReadFailed {
            path: missing.display().to_string(),
            reason: "certbot reported success but the certificate file is missing".to_string(),
        });
    }
    Ok(files)
}

/// Copy `fullchain.pem` and `privkey.pem` from `live` into `target`
pub fn install_certificates(live: &Path, target: &Path) -> Result<usize> {
    fs::create_dir_all(target).map_err(|e| DeployError::FileWriteFailed {
        path: target.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut copied = 0;
    for name in ["fullchain.pem", "privkey.pem"] {
        let destination = target.join(name);
        // Certbot's live files are symlinks into archive/; copy follows them
        fs::copy(live.join(name), &destination).map_err(|e| DeployError::FileWriteFailed {
            path: destination.display().to_string(),
            reason: e.to_string(),
        })?;
        copied += 1;
    }
    Ok(copied)
}
