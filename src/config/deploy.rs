//! Deployment configuration (deploy.yaml)
//!
//! Values are layered: built-in defaults, then the config file, then environment variables
//! and flags, then interactive prompts for whatever is still missing. The admin password is
//! never read from the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::timing::{HealthTiming, LockTiming, RetryTiming, Timing};
use crate::error::{DeployError, Result};
use crate::troubleshoot::DEFAULT_INSTALL_DIR;

pub const DEFAULT_CERT_DIR: &str = "/etc/letsencrypt/live";
pub const DEFAULT_ADMIN_USER: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Public domain of the Matrix homeserver
    pub domain: String,

    /// Public domain of the TURN relay; `turn.<domain>` when empty
    pub turn_domain: String,

    /// Contact address for Let's Encrypt
    pub email: String,

    pub admin_user: String,

    #[serde(skip)]
    pub admin_password: String,

    pub install_dir: PathBuf,

    /// Where certbot leaves live certificates, one directory per domain
    pub cert_dir: PathBuf,

    pub retry: RetryTiming,
    pub lock: LockTiming,
    pub health: HealthTiming,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            turn_domain: String::new(),
            email: String::new(),
            admin_user: DEFAULT_ADMIN_USER.to_string(),
            admin_password: String::new(),
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
            retry: RetryTiming::default(),
            lock: LockTiming::default(),
            health: HealthTiming::default(),
        }
    }
}

/// Values supplied on the command line or through `HOMESTEAD_*` variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub domain: Option<String>,
    pub turn_domain: Option<String>,
    pub email: Option<String>,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub install_dir: Option<PathBuf>,
}

/// Operator-supplied fields that can still be missing after loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Domain,
    TurnDomain,
    Email,
    AdminUser,
    AdminPassword,
}

impl DeployConfig {
    /// Parse deployment configuration from a YAML string
    #[cfg(test)]
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Serialize the configuration (without the password) to YAML
    #[cfg(test)]
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn timing(&self) -> Timing {
        Timing {
            retry: self.retry.clone(),
            lock: self.lock.clone(),
            health: self.health.clone(),
        }
    }

    /// Load `path`; a missing file is an error
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DeployError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| DeployError::FileReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| DeployError::ConfigParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Load the explicit file, else the default file when it exists, else defaults
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Apply flag and environment values on top of the file
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        let set = |target: &mut String, value: Option<String>| {
            if let Some(value) = value.map(|v| v.trim().to_string()) {
                if !value.is_empty() {
                    *target = value;
                }
            }
        };
        set(&mut self.domain, overrides.domain);
        set(&mut self.turn_domain, overrides.turn_domain);
        set(&mut self.email, overrides.email);
        set(&mut self.admin_user, overrides.admin_user);
        if let Some(password) = overrides.admin_password.filter(|p| !p.is_empty()) {
            self.admin_password = password;
        }
        if let Some(dir) = overrides.install_dir {
            self.install_dir = dir;
        }
    }

    /// TURN domain, defaulting to `turn.<domain>`
    pub fn effective_turn_domain(&self) -> String {
        if self.turn_domain.trim().is_empty() && !self.domain.is_empty() {
            format!("turn.{}", self.domain)
        } else {
            self.turn_domain.clone()
        }
    }

    /// Fields an operator still has to provide, in prompt order
    pub fn missing(&self) -> Vec<Field> {
        let mut missing = Vec::new();
        if self.domain.trim().is_empty() {
            missing.push(Field::Domain);
        }
        if self.turn_domain.trim().is_empty() {
            missing.push(Field::TurnDomain);
        }
        if self.email.trim().is_empty() {
            missing.push(Field::Email);
        }
        if self.admin_user.trim().is_empty() {
            missing.push(Field::AdminUser);
        }
        if self.admin_password.is_empty() {
            missing.push(Field::AdminPassword);
        }
        missing
    }

    /// Check a fully resolved configuration before anything runs
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(DeployError::ConfigInvalid { message });

        if !is_domain(&self.domain) {
            return invalid(format!("'{}' is not a valid domain name", self.domain));
        }
        let turn = self.effective_turn_domain();
        if !is_domain(&turn) {
            return invalid(format!("'{turn}' is not a valid TURN domain name"));
        }
        if !self.email.contains('@') || self.email.trim() != self.email {
            return invalid(format!("'{}' is not a valid e-mail address", self.email));
        }
        if self.admin_user.is_empty()
            || !self
                .admin_user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '='))
        {
            return invalid(format!(
                "'{}' is not a valid Matrix user name",
                self.admin_user
            ));
        }
        if self.admin_password.is_empty() {
            return invalid("admin password must not be empty".to_string());
        }
        if !self.install_dir.is_absolute() {
            return invalid(format!(
                "install directory {} must be an absolute path",
                self.install_dir.display()
            ));
        }
        self.timing().validate()
    }
}

/// Default config file location: `<config dir>/homestead/deploy.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("homestead").join("deploy.yaml"))
}

/// Loose hostname check: dot-separated labels of letters, digits and hyphens
pub fn is_domain(value: &str) -> bool {
    let labels: Vec<_> = value.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> DeployConfig {
        DeployConfig {
            domain: "matrix.example.org".to_string(),
            email: "ops@example.org".to_string(),
            admin_password: "hunter2".to_string(),
            ..DeployConfig::default()
        }
    }

    #[test]
    fn test_parse_minimal_file() {
        let config = DeployConfig::from_yaml("domain: matrix.example.org\nemail: ops@example.org\n")
            .unwrap();
        assert_eq!(config.domain, "matrix.example.org");
        assert_eq!(config.admin_user, "admin");
        assert_eq!(config.install_dir, PathBuf::from("/opt/conduwuit"));
        assert_eq!(config.effective_turn_domain(), "turn.matrix.example.org");
    }

    #[test]
    fn test_parse_timing_sections() {
        let yaml = "domain: a.example.org\nlock:\n  max_wait: 20m\n";
        let config = DeployConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.lock.max_wait.as_secs(), 1200);
    }

    #[test]
    fn test_password_never_serialized_or_parsed() {
        let yaml = complete().to_yaml().unwrap();
        assert!(!yaml.contains("hunter2"));
        assert!(DeployConfig::from_yaml("admin_password: secret\n").is_err());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = DeployConfig::from_yaml("domain: file.example.org\n").unwrap();
        config.apply(ConfigOverrides {
            domain: Some("flag.example.org".to_string()),
            email: Some("  ".to_string()),
            install_dir: Some(PathBuf::from("/srv/matrix")),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.domain, "flag.example.org");
        assert!(config.email.is_empty());
        assert_eq!(config.install_dir, PathBuf::from("/srv/matrix"));
    }

    #[test]
    fn test_missing_fields_in_prompt_order() {
        let config = DeployConfig::default();
        assert_eq!(
            config.missing(),
            vec![
                Field::Domain,
                Field::TurnDomain,
                Field::Email,
                Field::AdminPassword
            ]
        );
    }

    #[test]
    fn test_validate() {
        assert!(complete().validate().is_ok());

        let mut config = complete();
        config.domain = "localhost".to_string();
        assert!(config.validate().is_err());

        let mut config = complete();
        config.admin_user = "admin; rm -rf /".to_string();
        assert!(config.validate().is_err());

        let mut config = complete();
        config.email = String::new();
        assert!(config.validate().is_err());

        let mut config = complete();
        config.retry.attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DeployConfig::load(&dir.path().join("deploy.yaml")).unwrap_err();
        assert!(matches!(err, DeployError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.yaml");
        fs::write(&path, "domain: [unclosed\n").unwrap();
        match DeployConfig::load(&path).unwrap_err() {
            DeployError::ConfigParseFailed { path: reported, .. } => {
                assert_eq!(reported, path.display().to_string());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_is_domain() {
        assert!(is_domain("matrix.example.org"));
        assert!(is_domain("turn-1.example.org"));
        assert!(!is_domain("example"));
        assert!(!is_domain("-bad.example.org"));
        assert!(!is_domain("bad..example.org"));
        assert!(!is_domain("spa ce.example.org"));
    }
}
