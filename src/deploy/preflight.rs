//! Host checks run before anything is installed

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use super::templates::RELAY_MIN_PORT;
use crate::context::RunContext;
use crate::error::{DeployError, Result};
use crate::runner::CommandSpec;

/// Relay ports probed before installing; the top of the configured range stays unchecked
const RELAY_PROBED_MAX: u16 = 49251;

/// Ports the deployment binds on the host
pub fn required_ports() -> Vec<u16> {
    let mut ports = vec![80, 443, 3478];
    ports.extend(RELAY_MIN_PORT..=RELAY_PROBED_MAX);
    ports
}

/// True when something accepts connections on the local port
pub fn port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_ok()
}

pub struct Preflight {
    pub debian_marker: PathBuf,
    pub ports: Vec<u16>,
    pub require_root: bool,
}

impl Default for Preflight {
    fn default() -> Self {
        Self {
            debian_marker: PathBuf::from("/etc/debian_version"),
            ports: required_ports(),
            require_root: true,
        }
    }
}

impl Preflight {
    /// Run every check and report all problems at once
    pub fn run(&self, ctx: &mut RunContext) -> Result<()> {
        let mut problems = Vec::new();

        if self.require_root {
            let result = ctx.run(&CommandSpec::new("id").arg("-u"));
            if !(result.success && result.stdout.trim() == "0") {
                problems.push("homestead must run as root (try sudo)".to_string());
            }
        }

        if !self.debian_marker.is_file() {
            problems.push(format!(
                "{} not found; only Debian and Ubuntu hosts are supported",
                self.debian_marker.display()
            ));
        }

        let busy: Vec<u16> = self
            .ports
            .iter()
            .copied()
            .filter(|port| port_in_use(*port))
            .collect();
        debug!(checked = self.ports.len(), busy = busy.len(), "port scan");
        if !busy.is_empty() {
            let listed: Vec<_> = busy.iter().map(u16::to_string).collect();
            problems.push(format!("ports already in use: {}", listed.join(", ")));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DeployError::PreflightFailed {
                message: problems.join("; "),
            })
        }
    }
}
