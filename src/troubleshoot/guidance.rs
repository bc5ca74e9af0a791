//! Static manual-intervention guidance shown by the troubleshooting menu

use std::path::Path;

use super::FixCategory;

pub fn for_category(category: FixCategory, install_dir: &Path, domains: &[&str]) -> String {
    let dir = install_dir.display();
    match category {
        FixCategory::PackageManager => "\
Package manager
  Lock files:      /var/lib/dpkg/lock-frontend, /var/lib/dpkg/lock,
                   /var/lib/apt/lists/lock, /var/cache/apt/archives/lock
  Who holds them:  fuser -v /var/lib/dpkg/lock-frontend
  Running jobs:    ps aux | grep -E 'apt|dpkg|unattended'
  Unattended:      systemctl status unattended-upgrades
  After a crash:   dpkg --configure -a && apt-get -f install"
            .to_string(),
        FixCategory::ContainerRuntime => "\
Container runtime
  Daemon status:   systemctl status docker
  Daemon logs:     journalctl -u docker --no-pager -n 100
  Restart:         systemctl restart docker
  Disk usage:      docker system df"
            .to_string(),
        FixCategory::CertificateClient => {
            let mut text = "\
Certificate client
  snapd status:    systemctl status snapd
  Installed snaps: snap list
  certbot logs:    /var/log/letsencrypt/letsencrypt.log
  Port 80 must be reachable from the internet while certbot runs."
                .to_string();
            for domain in domains {
                text.push_str(&format!(
                    "\n  {domain}: /etc/letsencrypt/live/{domain}/fullchain.pem"
                ));
            }
            text
        }
        FixCategory::ApplicationService => format!(
            "\
Application service
  Compose file:    {dir}/docker-compose.yml
  Server config:   {dir}/data/conduwuit.toml
  TURN config:     {dir}/coturn.conf
  Certificates:    {dir}/certs
  Status:          cd {dir} && docker-compose ps
  Logs:            cd {dir} && docker-compose logs --tail=100 conduwuit
  Restart:         cd {dir} && docker-compose restart"
        ),
    }
}

pub fn general(install_dir: &Path) -> String {
    format!(
        "\
Required open ports
  80/tcp, 443/tcp            HTTP (certificate challenge) and HTTPS
  3478/tcp+udp, 5349/tcp+udp TURN and TURN over TLS
  49152-49252/udp            TURN relay range

Installation directory: {}
Re-run the installer with --start-at <step> to resume after fixing the cause.",
        install_dir.display()
    )
}
