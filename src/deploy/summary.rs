//! Closing summary printed after a successful install

use std::time::Duration;

use console::Style;

use super::secrets::Secrets;
use crate::config::DeployConfig;

pub struct Summary {
    domain: String,
    turn_domain: String,
    turn_secret: String,
    admin_user: String,
    install_dir: String,
    elapsed: Duration,
}

impl Summary {
    pub fn new(config: &DeployConfig, secrets: &Secrets, elapsed: Duration) -> Self {
        Self {
            domain: config.domain.clone(),
            turn_domain: config.effective_turn_domain(),
            turn_secret: secrets.turn_secret.clone(),
            admin_user: config.admin_user.clone(),
            install_dir: config.install_dir.display().to_string(),
            elapsed,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("Installation complete in {}s.", self.elapsed.as_secs()),
            format!("Homeserver: https://{}", self.domain),
            "TURN relay:".to_string(),
            format!("  turn:{}:3478 (UDP/TCP)", self.turn_domain),
            format!("  turns:{}:5349 (TLS)", self.turn_domain),
            format!("TURN secret: {}", self.turn_secret),
            String::new(),
            format!("Admin user: {}", self.admin_user),
            "Admin password: [hidden]".to_string(),
            String::new(),
            format!("Management commands (run in {}):", self.install_dir),
            "  docker-compose logs -f".to_string(),
            "  docker-compose down".to_string(),
            "  docker-compose up -d".to_string(),
            "  docker-compose restart".to_string(),
        ]
    }

    pub fn print(&self) {
        let heading = Style::new().green().bold();
        let warning = Style::new().yellow();
        let mut lines = self.lines().into_iter();
        if let Some(first) = lines.next() {
            println!("\n{}", heading.apply_to(first));
        }
        for line in lines {
            println!("{line}");
        }
        println!();
        println!(
            "{}",
            warning.apply_to("Store the TURN secret and admin credentials somewhere safe.")
        );
        println!(
            "{}",
            warning.apply_to(format!(
                "Both {} and {} must point at this server.",
                self.domain, self.turn_domain
            ))
        );
    }
}
