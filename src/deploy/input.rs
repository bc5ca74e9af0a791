//! Collects the deployment values the operator has not supplied yet

use std::net::ToSocketAddrs;

use inquire::validator::Validation;
use inquire::{Confirm, Password, PasswordDisplayMode, Text};
use tracing::{debug, warn};

use crate::config::{DeployConfig, Field, is_domain};
use crate::error::{DeployError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct InputOptions {
    /// Prompt for missing values instead of failing
    pub interactive: bool,
    /// Continue when a domain does not resolve
    pub assume_yes: bool,
}

/// Fill in missing fields, then check that both domains resolve
pub fn complete(config: &mut DeployConfig, options: InputOptions) -> Result<()> {
    for field in config.missing() {
        match field {
            // Falls back to turn.<domain>
            Field::TurnDomain if !options.interactive => {}
            _ if !options.interactive => return Err(missing(field)),
            Field::Domain => config.domain = prompt_domain("Domain name of the homeserver:", None)?,
            Field::TurnDomain => {
                let default = config.effective_turn_domain();
                config.turn_domain = prompt_domain("Domain name of the TURN relay:", Some(&default))?;
            }
            Field::Email => {
                config.email = Text::new("E-mail address for Let's Encrypt:")
                    .with_validator(|value: &str| {
                        Ok(if value.contains('@') {
                            Validation::Valid
                        } else {
                            Validation::Invalid("Enter an e-mail address".into())
                        })
                    })
                    .prompt()?
                    .trim()
                    .to_string();
            }
            Field::AdminUser => {
                config.admin_user = Text::new("Admin user name:")
                    .with_default("admin")
                    .prompt()?
                    .trim()
                    .to_string();
            }
            Field::AdminPassword => {
                config.admin_password = Password::new("Admin password:")
                    .with_display_mode(PasswordDisplayMode::Masked)
                    .with_validator(|value: &str| {
                        Ok(if value.trim().is_empty() {
                            Validation::Invalid("The password cannot be empty".into())
                        } else {
                            Validation::Valid
                        })
                    })
                    .prompt()?;
            }
        }
    }
    if config.turn_domain.trim().is_empty() {
        config.turn_domain = config.effective_turn_domain();
    }

    let unresolved = unresolved_domains(config);
    if unresolved.is_empty() || options.assume_yes {
        return Ok(());
    }
    let listed = unresolved.join(", ");
    warn!(domains = %listed, "domains do not resolve");
    if options.interactive
        && Confirm::new(&format!("{listed} does not resolve. Continue anyway?"))
            .with_default(false)
            .prompt()?
    {
        return Ok(());
    }
    Err(DeployError::PreflightFailed {
        message: format!(
            "{listed} does not resolve; point the DNS records at this host or pass --yes"
        ),
    })
}

fn prompt_domain(message: &str, default: Option<&str>) -> Result<String> {
    let mut prompt = Text::new(message).with_validator(|value: &str| {
        Ok(if is_domain(value.trim()) {
            Validation::Valid
        } else {
            Validation::Invalid("Enter a domain name such as matrix.example.org".into())
        })
    });
    if let Some(default) = default {
        prompt = prompt.with_default(default);
    }
    Ok(prompt.prompt()?.trim().to_string())
}

fn missing(field: Field) -> DeployError {
    let (what, flag, env) = match field {
        Field::Domain => ("domain", "--domain", "HOMESTEAD_DOMAIN"),
        Field::TurnDomain => ("TURN domain", "--turn-domain", "HOMESTEAD_TURN_DOMAIN"),
        Field::Email => ("e-mail address", "--email", "HOMESTEAD_EMAIL"),
        Field::AdminUser => ("admin user", "--admin-user", "HOMESTEAD_ADMIN_USER"),
        Field::AdminPassword => ("admin password", "", "HOMESTEAD_ADMIN_PASSWORD"),
    };
    let source = if flag.is_empty() {
        format!("set {env}")
    } else {
        format!("pass {flag} or set {env}")
    };
    DeployError::ConfigInvalid {
        message: format!("no {what} given; {source}"),
    }
}

/// Domains of the deployment that have no address record
pub fn unresolved_domains(config: &DeployConfig) -> Vec<String> {
    let mut domains = vec![config.domain.clone(), config.effective_turn_domain()];
    domains.dedup();
    domains.retain(|domain| !resolves(domain));
    domains
}

fn resolves(host: &str) -> bool {
    match (host, 443).to_socket_addrs() {
        Ok(mut addrs) => addrs.next().is_some(),
        Err(e) => {
            debug!(host, error = %e, "lookup failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> InputOptions {
        InputOptions {
            interactive: false,
            assume_yes: true,
        }
    }

    #[test]
    fn test_non_interactive_reports_missing_value() {
        let mut config = DeployConfig {
            domain: "matrix.example.org".to_string(),
            ..DeployConfig::default()
        };
        let err = complete(&mut config, options()).unwrap_err();
        assert!(err.to_string().contains("--email"));
    }

    #[test]
    fn test_password_only_from_environment() {
        let mut config = DeployConfig {
            domain: "matrix.example.org".to_string(),
            email: "ops@example.org".to_string(),
            ..DeployConfig::default()
        };
        let err = complete(&mut config, options()).unwrap_err();
        assert!(err.to_string().contains("HOMESTEAD_ADMIN_PASSWORD"));
        assert!(!err.to_string().contains("--admin-password"));
    }

    #[test]
    fn test_turn_domain_defaults_without_prompt() {
        let mut config = DeployConfig {
            domain: "matrix.example.org".to_string(),
            email: "ops@example.org".to_string(),
            admin_password: "hunter2".to_string(),
            ..DeployConfig::default()
        };
        complete(&mut config, options()).unwrap();
        assert_eq!(config.turn_domain, "turn.matrix.example.org");
    }

    #[test]
    fn test_unresolvable_domain_fails_without_yes() {
        let mut config = DeployConfig {
            domain: "homestead.invalid".to_string(),
            email: "ops@example.org".to_string(),
            admin_password: "hunter2".to_string(),
            ..DeployConfig::default()
        };
        let err = complete(
            &mut config,
            InputOptions {
                interactive: false,
                assume_yes: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, DeployError::PreflightFailed { .. }));
        assert!(err.to_string().contains("homestead.invalid"));
    }

    #[test]
    fn test_localhost_resolves() {
        assert!(resolves("localhost"));
        assert!(!resolves("homestead.invalid"));
    }
}
