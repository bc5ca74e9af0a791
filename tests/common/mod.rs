//! Common test utilities for homestead integration tests

use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

/// Environment variables the binary reads; cleared so the host cannot leak into a test
const HOMESTEAD_ENV: &[&str] = &[
    "HOMESTEAD_CONFIG",
    "HOMESTEAD_DOMAIN",
    "HOMESTEAD_TURN_DOMAIN",
    "HOMESTEAD_EMAIL",
    "HOMESTEAD_ADMIN_USER",
    "HOMESTEAD_ADMIN_PASSWORD",
    "HOMESTEAD_INSTALL_DIR",
    "HOMESTEAD_LOG_FILE",
    "HOMESTEAD_NON_INTERACTIVE",
    "RUST_LOG",
];

/// A scratch directory that also serves as HOME and XDG config root
pub struct TestWorkspace {
    #[allow(dead_code)]
    pub temp: TempDir,
    pub path: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let path = temp.path().to_path_buf();
        Self { temp, path }
    }

    /// Write a file in the workspace, creating parent directories
    pub fn write_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.path.join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    #[allow(dead_code)]
    pub fn file_exists(&self, path: &str) -> bool {
        self.path.join(path).exists()
    }

    /// The real binary, isolated from the caller's environment and config
    pub fn command(&self) -> Command {
        let mut cmd = homestead_cmd();
        for name in HOMESTEAD_ENV {
            cmd.env_remove(name);
        }
        cmd.env("HOME", &self.path)
            .env("XDG_CONFIG_HOME", self.path.join(".config"))
            .current_dir(&self.path);
        cmd
    }
}

// Temporary fix for deprecated cargo_bin - will be updated when build-dir issues are resolved
#[allow(deprecated)]
pub fn homestead_cmd() -> Command {
    Command::cargo_bin("homestead").unwrap()
}
