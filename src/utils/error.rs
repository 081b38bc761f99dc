use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("no update candidate found")]
    NoCandidate,

    #[error("invalid version \"{value}\": {reason}")]
    InvalidVersion { value: String, reason: String },

    #[error("probe {}: {reason}", .path.display())]
    ProbeFailed { path: PathBuf, reason: String },

    #[error("read upgrade directory {}: {source}", .path.display())]
    DiscoveryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid bind \"{bind}\": {reason}")]
    InvalidBind { bind: String, reason: String },

    #[error("shutdown server: {message}")]
    ShutdownError { message: String },

    #[error("start instance {}: {source}", .path.display())]
    SpawnError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("call {url}: {message}")]
    HandoffError { url: String, message: String },

    #[error("an upgrade is already in progress")]
    UpgradeInProgress,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value \"{value}\" for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Discovery,
    Upgrade,
    Configuration,
    Network,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl UpdateError {
    pub fn is_no_candidate(&self) -> bool {
        matches!(self, UpdateError::NoCandidate)
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            UpdateError::NoCandidate
            | UpdateError::InvalidVersion { .. }
            | UpdateError::ProbeFailed { .. }
            | UpdateError::DiscoveryError { .. } => ErrorCategory::Discovery,
            UpdateError::ShutdownError { .. }
            | UpdateError::SpawnError { .. }
            | UpdateError::UpgradeInProgress => ErrorCategory::Upgrade,
            UpdateError::HandoffError { .. } => ErrorCategory::Network,
            UpdateError::InvalidBind { .. }
            | UpdateError::ConfigError { .. }
            | UpdateError::ConfigValidationError { .. }
            | UpdateError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            UpdateError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            UpdateError::NoCandidate | UpdateError::ProbeFailed { .. } => ErrorSeverity::Low,
            UpdateError::DiscoveryError { .. } | UpdateError::UpgradeInProgress => {
                ErrorSeverity::Medium
            }
            UpdateError::InvalidVersion { .. }
            | UpdateError::InvalidBind { .. }
            | UpdateError::ConfigError { .. }
            | UpdateError::ConfigValidationError { .. }
            | UpdateError::InvalidConfigValueError { .. } => ErrorSeverity::High,
            // 舊的監聽已停止，服務可能已中斷
            UpdateError::ShutdownError { .. }
            | UpdateError::SpawnError { .. }
            | UpdateError::HandoffError { .. }
            | UpdateError::IoError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            UpdateError::NoCandidate => "Install a newer build into the upgrade directory",
            UpdateError::InvalidVersion { .. } => {
                "Use a semantic version such as 1.4.2 or 1.4.2-rc.1"
            }
            UpdateError::ProbeFailed { .. } => {
                "Make sure the binary is executable and prints its version for --version"
            }
            UpdateError::DiscoveryError { .. } => {
                "Check that the upgrade directory is readable by the service user"
            }
            UpdateError::InvalidBind { .. } => "Use host:port or :port, e.g. :8080",
            UpdateError::ShutdownError { .. } => {
                "Restart the service; the listener could not be drained in time"
            }
            UpdateError::SpawnError { .. } => {
                "The service is stopped; fix the candidate binary and restart manually"
            }
            UpdateError::HandoffError { .. } => {
                "The service is stopped; inspect the candidate's logs and restart manually"
            }
            UpdateError::UpgradeInProgress => "Wait for the running upgrade to finish",
            UpdateError::IoError(_) => "Check file permissions and available resources",
            UpdateError::ConfigError { .. }
            | UpdateError::ConfigValidationError { .. }
            | UpdateError::InvalidConfigValueError { .. } => {
                "Review the command line flags and the configuration file"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Discovery => format!("Update discovery failed: {}", self),
            ErrorCategory::Upgrade => format!("Upgrade failed: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Network => format!("Handoff to the new instance failed: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;
