use std::path::PathBuf;

use clap::Parser;

use crate::config::ConfigOverrides;

/// Arguments for the install command
#[derive(Parser, Debug, Default)]
#[command(after_help = "EXAMPLES:\n  \
                   Interactive install:\n    sudo homestead install\n\n\
                   Unattended install:\n    sudo HOMESTEAD_ADMIN_PASSWORD=... homestead --non-interactive install \\\n      \
                   --domain matrix.example.org --email ops@example.org --yes\n\n\
                   Resume at step 8 after fixing DNS:\n    sudo homestead install --start-at 8\n\n\
                   The admin password is read from HOMESTEAD_ADMIN_PASSWORD or prompted for; \
                   it is never accepted as a flag.")]
pub struct InstallArgs {
    /// Deployment config file (YAML); defaults to ~/.config/homestead/deploy.yaml when present
    #[arg(long, short = 'c', value_name = "FILE", env = "HOMESTEAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Public domain of the homeserver
    #[arg(long, env = "HOMESTEAD_DOMAIN")]
    pub domain: Option<String>,

    /// Public domain of the TURN relay (default: turn.<domain>)
    #[arg(long, env = "HOMESTEAD_TURN_DOMAIN")]
    pub turn_domain: Option<String>,

    /// Contact address for Let's Encrypt
    #[arg(long, env = "HOMESTEAD_EMAIL")]
    pub email: Option<String>,

    /// Name of the admin account to create
    #[arg(long, env = "HOMESTEAD_ADMIN_USER")]
    pub admin_user: Option<String>,

    /// Directory for the compose project, configs and certificates
    #[arg(long, value_name = "DIR", env = "HOMESTEAD_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    /// Skip the steps before this one (1-based)
    #[arg(long, value_name = "STEP")]
    pub start_at: Option<usize>,

    /// Continue even if the domains do not resolve yet
    #[arg(long, short = 'y')]
    pub yes: bool,
}

impl InstallArgs {
    /// Flag and environment values; the password comes from `admin_password`
    pub fn overrides(&self, admin_password: Option<String>) -> ConfigOverrides {
        ConfigOverrides {
            domain: self.domain.clone(),
            turn_domain: self.turn_domain.clone(),
            email: self.email.clone(),
            admin_user: self.admin_user.clone(),
            admin_password,
            install_dir: self.install_dir.clone(),
        }
    }
}
