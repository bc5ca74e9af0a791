//! Configuration file handling for homestead
//!
//! This module contains data structures for:
//! - `deploy.yaml` - Deployment settings (domains, admin account, install directory)
//! - the `retry`, `lock` and `health` timing sections shared with plan files

pub mod deploy;
pub mod timing;

// Re-export commonly used types
pub use deploy::{ConfigOverrides, DeployConfig, Field, default_config_path, is_domain};
pub use timing::{BackoffKind, Timing};
