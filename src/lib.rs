pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod server;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::cli::Cli;

pub use crate::config::Settings;
pub use crate::core::check::{newest_candidate, rank, CandidateScanner};
pub use crate::core::upgrade::{UpgradeOrchestrator, UpgradeState};
pub use crate::domain::model::{BindAddress, Candidate, Version};
pub use crate::utils::error::{Result, UpdateError};

/// Version of this build. Release builds may stamp it through `SELF_UPDATE_VERSION`.
pub const VERSION: &str = match option_env!("SELF_UPDATE_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
