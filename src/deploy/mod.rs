//! Deployment adapters: the concrete conduwuit + coturn install built on the plan core

pub mod input;
pub mod plan;
pub mod preflight;
pub mod secrets;
pub mod summary;
pub mod templates;

pub use input::InputOptions;
pub use plan::build;
pub use secrets::Secrets;
pub use summary::Summary;
