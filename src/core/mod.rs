pub mod check;
pub mod probe;
pub mod upgrade;

pub use crate::domain::model::{BindAddress, Candidate, Version};
pub use crate::domain::ports::{
    CandidateLauncher, ConfigProvider, Listener, ProcessExit, VersionProbe,
};
pub use crate::utils::error::Result;
