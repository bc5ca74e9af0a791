//! Command implementations for the homestead CLI

pub mod completions;
pub mod diagnose;
pub mod helpers;
pub mod install;
pub mod plan;
pub mod run;
pub mod version;
