//! Shared secrets for the homeserver and the TURN relay

use std::fmt;
use std::fs;
use std::path::Path;

use rand::RngCore;
use tracing::debug;

/// Length of a generated secret in hex digits
pub const SECRET_LEN: usize = 32;

#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    /// Homeserver signing key seed
    pub signing_key: String,
    /// `static-auth-secret` shared by coturn and the homeserver
    pub turn_secret: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    pub fn generate() -> Self {
        Self {
            signing_key: hex_secret(),
            turn_secret: hex_secret(),
        }
    }

    /// Secrets already written by an earlier run, so a resumed install keeps them
    pub fn recover(install_dir: &Path) -> Option<Self> {
        let coturn = fs::read_to_string(install_dir.join("coturn.conf")).ok()?;
        let server = fs::read_to_string(install_dir.join("data").join("conduwuit.toml")).ok()?;

        let turn_secret = coturn
            .lines()
            .find_map(|line| line.trim().strip_prefix("static-auth-secret="))?
            .trim()
            .to_string();
        let signing_key = server.lines().find_map(|line| {
            let (key, value) = line.split_once('=')?;
            (key.trim() == "signing_key").then(|| value.trim().trim_matches('"').to_string())
        })?;

        if !is_secret(&turn_secret) || !is_secret(&signing_key) {
            debug!(dir = %install_dir.display(), "existing secrets look malformed, ignoring");
            return None;
        }
        Some(Self {
            signing_key,
            turn_secret,
        })
    }

    pub fn recover_or_generate(install_dir: &Path) -> Self {
        Self::recover(install_dir).unwrap_or_else(Self::generate)
    }
}

fn hex_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn is_secret(value: &str) -> bool {
    value.len() == SECRET_LEN && value.chars().all(|c| c.is_ascii_hexdigit())
}
