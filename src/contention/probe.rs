//! Package-manager lock probe for Debian-family hosts

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use sysinfo::{ProcessesToUpdate, Signal, System};
use tracing::{debug, warn};

use super::{ContentionProbe, ContentionSnapshot, InterventionMode, InterventionReport};
use crate::runner::{CommandRunner, CommandSpec};

pub const LOCK_MARKERS: [&str; 4] = [
    "/var/lib/dpkg/lock-frontend",
    "/var/lib/dpkg/lock",
    "/var/lib/apt/lists/lock",
    "/var/cache/apt/archives/lock",
];

pub const BLOCKING_PROCESSES: [&str; 5] = [
    "apt",
    "apt-get",
    "dpkg",
    "unattended-upgr",
    "unattended-upgrade",
];

/// Watches the dpkg/apt lock files and the processes that take them
pub struct PackageLockProbe {
    markers: Vec<PathBuf>,
    process_names: Vec<String>,
    system: System,
}

impl Default for PackageLockProbe {
    fn default() -> Self {
        Self::new(
            LOCK_MARKERS.iter().map(PathBuf::from).collect(),
            BLOCKING_PROCESSES.iter().map(|p| (*p).to_string()).collect(),
        )
    }
}

impl PackageLockProbe {
    pub fn new(markers: Vec<PathBuf>, process_names: Vec<String>) -> Self {
        Self {
            markers,
            process_names,
            system: System::new(),
        }
    }

    /// A marker counts as held when the file exists and some process has it open
    fn is_held(runner: &dyn CommandRunner, marker: &Path) -> bool {
        if !marker.exists() {
            return false;
        }
        let result = runner.run(&CommandSpec::new("fuser").arg(marker.display().to_string()));
        if result.exit_code.is_none() {
            debug!(marker = %marker.display(), "fuser unavailable, treating lock as free");
        }
        result.success
    }

    fn matches(&self, name: &str) -> bool {
        self.process_names.iter().any(|p| p == name)
    }

    /// Send `signal` to processes matching the probe, limited to `only` when given
    fn signal_processes(&mut self, only: Option<&BTreeSet<String>>, signal: Signal) -> Vec<String> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let mut signalled = Vec::new();
        for process in self.system.processes().values() {
            let name = process.name().to_string_lossy().to_string();
            let targeted = match only {
                Some(names) => names.contains(&name),
                None => self.matches(&name),
            };
            if !targeted {
                continue;
            }
            let sent = match signal {
                Signal::Kill => process.kill(),
                other => process.kill_with(other).unwrap_or(false),
            };
            if sent {
                signalled.push(format!("{name} ({})", process.pid()));
            } else {
                warn!(process = %name, pid = %process.pid(), ?signal, "could not signal process");
            }
        }
        signalled
    }

    fn remove_markers<'a>(markers: impl Iterator<Item = &'a PathBuf>, report: &mut InterventionReport) {
        for marker in markers {
            match fs::remove_file(marker) {
                Ok(()) => report.removed.push(marker.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(marker = %marker.display(), error = %e, "could not remove lock");
                    report
                        .notes
                        .push(format!("could not remove {}: {e}", marker.display()));
                }
            }
        }
    }
}

impl ContentionProbe for PackageLockProbe {
    fn resource(&self) -> &str {
        "package manager"
    }

    fn snapshot(&mut self, runner: &dyn CommandRunner) -> ContentionSnapshot {
        let markers = self
            .markers
            .iter()
            .filter(|m| Self::is_held(runner, m))
            .cloned()
            .collect();

        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let processes = self
            .system
            .processes()
            .values()
            .map(|p| p.name().to_string_lossy().to_string())
            .filter(|name| self.matches(name))
            .collect();

        ContentionSnapshot { markers, processes }
    }

    fn intervene(
        &mut self,
        runner: &dyn CommandRunner,
        snapshot: &ContentionSnapshot,
        mode: InterventionMode,
    ) -> InterventionReport {
        let mut report = InterventionReport::default();
        match mode {
            InterventionMode::Automatic => {
                report.signalled = self.signal_processes(Some(&snapshot.processes), Signal::Term);
                Self::remove_markers(snapshot.markers.iter(), &mut report);
            }
            InterventionMode::Forced => {
                report.signalled = self.signal_processes(None, Signal::Kill);
                let all = self.markers.clone();
                Self::remove_markers(all.iter(), &mut report);

                let repair = runner.run(
                    &CommandSpec::new("dpkg")
                        .args(["--configure", "-a"])
                        .env("DEBIAN_FRONTEND", "noninteractive"),
                );
                if repair.success {
                    report.notes.push("dpkg --configure -a completed".to_string());
                } else {
                    report
                        .notes
                        .push(format!("dpkg --configure -a failed: {}", repair.failure_summary()));
                }
            }
        }
        report
    }
}
