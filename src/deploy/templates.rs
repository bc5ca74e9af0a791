//! Service configuration files rendered from built-in templates

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::secrets::Secrets;
use crate::config::DeployConfig;
use crate::error::{DeployError, Result};

/// TURN relay port range, inclusive
pub const RELAY_MIN_PORT: u16 = 49152;
pub const RELAY_MAX_PORT: u16 = 49252;

pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const COTURN_FILE: &str = "coturn.conf";
pub const SERVER_CONFIG_FILE: &str = "data/conduwuit.toml";

const COTURN_TEMPLATE: &str = "\
use-auth-secret
static-auth-secret={{turn_secret}}
realm={{turn_domain}}
# Security
no-tcp-traffic
no-multicast-peers
# TLS
cert=/certs/fullchain.pem
pkey=/certs/privkey.pem
# Ports
listening-port=3478
tls-listening-port=5349
min-port={{min_port}}
max-port={{max_port}}
# Logging
verbose
stale-nonce=0
";

const COMPOSE_TEMPLATE: &str = "\
services:
  conduwuit:
    image: ghcr.io/girlbossceo/conduwuit:latest
    restart: unless-stopped
    ports:
      - \"80:8000\"
      - \"443:8443\"
    volumes:
      - ./data:/data
      - ./certs:/certs
    environment:
      - CONDUWUIT_CONFIG=/{{server_config}}
    healthcheck:
      test: [\"CMD\", \"curl\", \"-f\", \"http://localhost:8000/_matrix/client/versions\"]
      interval: 10s
      timeout: 5s
      retries: 5
      start_period: 30s

  coturn:
    image: coturn/coturn:latest
    restart: unless-stopped
    network_mode: host
    volumes:
      - ./coturn.conf:/etc/coturn/turnserver.conf:ro
      - ./certs:/certs:ro
    depends_on:
      - conduwuit
";

const SERVER_TEMPLATE: &str = "\
# Server
server_name = \"{{domain}}\"
database_path = \"/data/conduwuit.db\"
signing_key = \"{{signing_key}}\"
enable_registration = false
report_stats = false

[turn]
uris = [
    \"turn:{{turn_domain}}:3478\",
    \"turns:{{turn_domain}}:5349\"
]
secret = \"{{turn_secret}}\"
ttl = 86400

[tls]
certs = \"/certs/fullchain.pem\"
key = \"/certs/privkey.pem\"
";

/// Values substituted into the templates
#[derive(Debug, Clone, Serialize)]
pub struct TemplateData {
    pub domain: String,
    pub turn_domain: String,
    pub signing_key: String,
    pub turn_secret: String,
    pub min_port: u16,
    pub max_port: u16,
    /// Server config path relative to the install directory
    pub server_config: String,
}

impl TemplateData {
    pub fn new(config: &DeployConfig, secrets: &Secrets) -> Self {
        Self {
            domain: config.domain.clone(),
            turn_domain: config.effective_turn_domain(),
            signing_key: secrets.signing_key.clone(),
            turn_secret: secrets.turn_secret.clone(),
            min_port: RELAY_MIN_PORT,
            max_port: RELAY_MAX_PORT,
            server_config: SERVER_CONFIG_FILE.to_string(),
        }
    }
}

/// One rendered file, relative to the install directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub contents: String,
}

pub struct ServiceTemplates {
    registry: Handlebars<'static>,
}

impl ServiceTemplates {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        register(&mut registry, COTURN_FILE, COTURN_TEMPLATE)?;
        register(&mut registry, COMPOSE_FILE, COMPOSE_TEMPLATE)?;
        register(&mut registry, SERVER_CONFIG_FILE, SERVER_TEMPLATE)?;
        Ok(Self { registry })
    }

    pub fn render(&self, data: &TemplateData) -> Result<Vec<RenderedFile>> {
        [COTURN_FILE, COMPOSE_FILE, SERVER_CONFIG_FILE]
            .into_iter()
            .map(|name| {
                Ok(RenderedFile {
                    path: PathBuf::from(name),
                    contents: self.registry.render(name, data)?,
                })
            })
            .collect()
    }
}

fn register(registry: &mut Handlebars<'static>, name: &str, source: &str) -> Result<()> {
    registry
        .register_template_string(name, source)
        .map_err(|err| DeployError::TemplateFailed {
            name: name.to_string(),
            reason: err.to_string(),
        })
}

/// Render every file and write it under `install_dir`; also creates `certs/`
pub fn write_service_files(install_dir: &Path, data: &TemplateData) -> Result<Vec<PathBuf>> {
    let files = ServiceTemplates::new()?.render(data)?;
    create_dir(&install_dir.join("certs"))?;
    files
        .into_iter()
        .map(|file| {
            let target = install_dir.join(&file.path);
            write_atomic(&target, &file.contents)?;
            Ok(target)
        })
        .collect()
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| DeployError::FileWriteFailed {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })
}

/// Write through a temporary file in the same directory, then rename into place
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let failed = |reason: String| DeployError::FileWriteFailed {
        path: path.display().to_string(),
        reason,
    };
    let parent = path
        .parent()
        .ok_or_else(|| failed("path has no parent directory".to_string()))?;
    create_dir(parent)?;

    let mut file = tempfile::NamedTempFile::new_in(parent).map_err(|e| failed(e.to_string()))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| failed(e.to_string()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| failed(e.to_string()))?;
    }
    file.persist(path).map_err(|e| failed(e.error.to_string()))?;
    debug!(path = %path.display(), "wrote file");
    Ok(())
}
