//! Automatic fix routines and the catalog the menu dispatches into

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::guidance;
use crate::contention::LOCK_MARKERS;
use crate::runner::CommandSpec;

pub const DEFAULT_INSTALL_DIR: &str = "/opt/conduwuit";

/// Kind of stall, derived from the menu's subject label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FixCategory {
    PackageManager,
    ContainerRuntime,
    CertificateClient,
    ApplicationService,
}

impl FixCategory {
    /// Match the whole words of a subject label against the known categories
    pub fn classify(subject: &str) -> Option<Self> {
        let subject = subject.to_lowercase();
        let words: Vec<&str> = subject
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |keys: &[&str]| keys.iter().any(|key| words.contains(key));

        if has(&["package", "packages", "apt", "dpkg", "unattended"]) {
            Some(FixCategory::PackageManager)
        } else if has(&["certificate", "certificates", "certbot", "snap", "snapd", "tls"]) {
            Some(FixCategory::CertificateClient)
        } else if has(&["docker", "dockerd", "runtime", "compose"]) {
            Some(FixCategory::ContainerRuntime)
        } else if has(&[
            "service",
            "services",
            "conduwuit",
            "matrix",
            "account",
            "reachability",
            "reachable",
            "health",
        ]) {
            Some(FixCategory::ApplicationService)
        } else {
            None
        }
    }
}

impl fmt::Display for FixCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FixCategory::PackageManager => "package manager",
            FixCategory::ContainerRuntime => "container runtime",
            FixCategory::CertificateClient => "certificate client",
            FixCategory::ApplicationService => "application service",
        };
        f.write_str(text)
    }
}

/// One corrective action of a fix routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixAction {
    pub description: String,
    pub command: CommandSpec,
    /// Kills processes, deletes files, prunes resources or stops services
    pub destructive: bool,
    /// The routine fails if this action fails
    pub required: bool,
}

impl FixAction {
    pub fn safe(description: &str, command: CommandSpec) -> Self {
        Self {
            description: description.to_string(),
            command,
            destructive: false,
            required: true,
        }
    }

    pub fn destructive(description: &str, command: CommandSpec) -> Self {
        Self {
            destructive: true,
            ..Self::safe(description, command)
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Fix routines and manual guidance, per category
#[derive(Debug, Clone)]
pub struct RecoveryCatalog {
    routines: BTreeMap<FixCategory, Vec<FixAction>>,
    guidance: BTreeMap<FixCategory, String>,
    general: String,
}

impl Default for RecoveryCatalog {
    fn default() -> Self {
        Self::for_install(Path::new(DEFAULT_INSTALL_DIR), &[])
    }
}

impl RecoveryCatalog {
    /// An empty catalog: no routines, no guidance
    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            routines: BTreeMap::new(),
            guidance: BTreeMap::new(),
            general: String::new(),
        }
    }

    /// Routines and guidance for a deployment living in `install_dir`
    pub fn for_install(install_dir: &Path, domains: &[&str]) -> Self {
        let compose = |args: &[&str]| {
            CommandSpec::new("docker-compose")
                .args(args.iter().copied())
                .current_dir(install_dir)
        };

        let mut routines = BTreeMap::new();
        routines.insert(
            FixCategory::PackageManager,
            vec![
                FixAction::destructive(
                    "Stop running package-manager processes",
                    CommandSpec::new("killall").args([
                        "-q",
                        "apt",
                        "apt-get",
                        "dpkg",
                        "unattended-upgr",
                    ]),
                )
                .optional(),
                FixAction::destructive(
                    "Remove stale package-manager lock files",
                    CommandSpec::new("rm").arg("-f").args(LOCK_MARKERS),
                ),
                FixAction::safe(
                    "Finish interrupted package configuration",
                    CommandSpec::new("dpkg")
                        .args(["--configure", "-a"])
                        .env("DEBIAN_FRONTEND", "noninteractive"),
                ),
            ],
        );
        routines.insert(
            FixCategory::ContainerRuntime,
            vec![
                FixAction::destructive(
                    "Restart the Docker daemon",
                    CommandSpec::new("systemctl").args(["restart", "docker"]),
                ),
                FixAction::destructive(
                    "Prune stopped containers and dangling images",
                    CommandSpec::new("docker").args(["system", "prune", "-f"]),
                )
                .optional(),
                FixAction::safe(
                    "Check that the Docker daemon answers",
                    CommandSpec::new("docker").arg("info"),
                ),
            ],
        );
        routines.insert(
            FixCategory::CertificateClient,
            vec![
                FixAction::destructive(
                    "Restart snapd",
                    CommandSpec::new("systemctl").args(["restart", "snapd"]),
                ),
                FixAction::safe(
                    "Wait for snapd to finish seeding",
                    CommandSpec::new("snap").args(["wait", "system", "seed.loaded"]),
                ),
                FixAction::safe(
                    "Refresh the certbot snap",
                    CommandSpec::new("snap").args(["refresh", "certbot"]),
                )
                .optional(),
            ],
        );
        routines.insert(
            FixCategory::ApplicationService,
            vec![
                FixAction::destructive("Stop the service containers", compose(&["down"])),
                FixAction::safe(
                    "Recreate the service containers",
                    compose(&["up", "-d", "--force-recreate"]),
                ),
            ],
        );

        let notes = [
            FixCategory::PackageManager,
            FixCategory::ContainerRuntime,
            FixCategory::CertificateClient,
            FixCategory::ApplicationService,
        ]
        .into_iter()
        .map(|category| (category, guidance::for_category(category, install_dir, domains)))
        .collect();

        Self {
            routines,
            guidance: notes,
            general: guidance::general(install_dir),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_routine(mut self, category: FixCategory, actions: Vec<FixAction>) -> Self {
        self.routines.insert(category, actions);
        self
    }

    pub fn routine(&self, category: FixCategory) -> &[FixAction] {
        self.routines
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Category-specific guidance for `subject` followed by the general notes
    pub fn guidance_for(&self, subject: &str) -> String {
        let specific = FixCategory::classify(subject)
            .and_then(|category| self.guidance.get(&category))
            .map(String::as_str)
            .unwrap_or_default();
        [specific, self.general.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
