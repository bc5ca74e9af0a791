//! Version command: build details plus the defaults an install would use

use crate::config::default_config_path;
use crate::deploy::templates::{RELAY_MAX_PORT, RELAY_MIN_PORT, SERVER_CONFIG_FILE};
use crate::error::Result;
use crate::troubleshoot::DEFAULT_INSTALL_DIR;

pub fn run() -> Result<()> {
    for line in lines() {
        println!("{line}");
    }
    Ok(())
}

fn lines() -> Vec<String> {
    let config = match default_config_path() {
        Some(path) if path.is_file() => path.display().to_string(),
        Some(path) => format!("{} (not present)", path.display()),
        None => "(no config directory on this host)".to_string(),
    };
    vec![
        format!("homestead {}", env!("CARGO_PKG_VERSION")),
        String::new(),
        "Build info:".to_string(),
        format!("  Profile: {}", build_profile()),
        String::new(),
        "Defaults:".to_string(),
        format!("  Install directory: {DEFAULT_INSTALL_DIR}"),
        format!("  Server config: {DEFAULT_INSTALL_DIR}/{SERVER_CONFIG_FILE}"),
        format!("  Config file: {config}"),
        format!("  TURN relay ports: {RELAY_MIN_PORT}-{RELAY_MAX_PORT}"),
    ]
}

fn build_profile() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}
