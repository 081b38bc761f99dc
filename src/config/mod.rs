#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::core::upgrade::UpgradeTimeouts;
use crate::core::{BindAddress, ConfigProvider};
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use std::path::PathBuf;
use std::time::Duration;
use toml_config::TomlConfig;

pub const DEFAULT_BIND: &str = ":8080";
pub const DEFAULT_TEMP_BIND: &str = ":8081";
pub const DEFAULT_UPGRADE_DIR: &str = "./upgrades";

const MIN_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_TIMEOUT: Duration = Duration::from_secs(600);

/// Values given on the command line. Unset fields fall back to the
/// configuration file, then to the defaults.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub temp_bind: Option<String>,
    pub upgrade_dir: Option<PathBuf>,
    pub probe_timeout_seconds: Option<u64>,
    pub probe_concurrency: Option<usize>,
    pub startup_timeout_seconds: Option<u64>,
    pub handoff_timeout_seconds: Option<u64>,
    pub shutdown_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: BindAddress,
    pub temp_bind: BindAddress,
    pub upgrade_dir: PathBuf,
    pub probe_timeout: Duration,
    pub probe_concurrency: usize,
    pub startup_timeout: Duration,
    pub handoff_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Settings {
    /// Merges overrides over the file configuration. Bind strings are parsed
    /// here so an invalid one never reaches the server.
    pub fn resolve(overrides: Overrides, file: Option<TomlConfig>) -> Result<Self> {
        let file = file.unwrap_or_default();
        let upgrade = file.upgrade();

        let bind = overrides
            .bind
            .as_deref()
            .or(file.bind())
            .unwrap_or(DEFAULT_BIND);
        let temp_bind = overrides
            .temp_bind
            .as_deref()
            .or(file.temp_bind())
            .unwrap_or(DEFAULT_TEMP_BIND);

        let seconds = |cli: Option<u64>, file: Option<u64>, default: u64| {
            Duration::from_secs(cli.or(file).unwrap_or(default))
        };

        let settings = Self {
            bind: validation::validate_bind("bind", bind)?,
            temp_bind: validation::validate_bind("temp_bind", temp_bind)?,
            upgrade_dir: overrides
                .upgrade_dir
                .or_else(|| upgrade.dir.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPGRADE_DIR)),
            probe_timeout: seconds(overrides.probe_timeout_seconds, upgrade.probe_timeout_seconds, 5),
            probe_concurrency: overrides
                .probe_concurrency
                .or(upgrade.probe_concurrency)
                .unwrap_or(4),
            startup_timeout: seconds(
                overrides.startup_timeout_seconds,
                upgrade.startup_timeout_seconds,
                10,
            ),
            handoff_timeout: seconds(
                overrides.handoff_timeout_seconds,
                upgrade.handoff_timeout_seconds,
                10,
            ),
            shutdown_timeout: seconds(
                overrides.shutdown_timeout_seconds,
                upgrade.shutdown_timeout_seconds,
                30,
            ),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn upgrade_timeouts(&self) -> UpgradeTimeouts {
        UpgradeTimeouts {
            shutdown: self.shutdown_timeout,
            startup: self.startup_timeout,
            handoff: self.handoff_timeout,
        }
    }
}

impl ConfigProvider for Settings {
    fn bind(&self) -> &BindAddress {
        &self.bind
    }

    fn temp_bind(&self) -> &BindAddress {
        &self.temp_bind
    }

    fn upgrade_dir(&self) -> &PathBuf {
        &self.upgrade_dir
    }

    fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    fn probe_concurrency(&self) -> usize {
        self.probe_concurrency
    }

    fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    fn handoff_timeout(&self) -> Duration {
        self.handoff_timeout
    }

    fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validation::validate_distinct_binds(&self.bind, &self.temp_bind)?;
        validation::validate_path("upgrade_dir", &self.upgrade_dir)?;
        validation::validate_positive_number("probe_concurrency", self.probe_concurrency, 1)?;

        // 驗證逾時設定
        for (field, value) in [
            ("probe_timeout", self.probe_timeout),
            ("startup_timeout", self.startup_timeout),
            ("handoff_timeout", self.handoff_timeout),
            ("shutdown_timeout", self.shutdown_timeout),
        ] {
            validation::validate_timeout(field, value, MIN_TIMEOUT, MAX_TIMEOUT)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::UpdateError;

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(Overrides::default(), None).unwrap();
        assert_eq!(settings.bind.to_string(), "localhost:8080");
        assert_eq!(settings.temp_bind.to_string(), "localhost:8081");
        assert_eq!(settings.upgrade_dir, PathBuf::from("./upgrades"));
        assert_eq!(settings.probe_timeout(), Duration::from_secs(5));
        assert_eq!(settings.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let file = TomlConfig::from_toml_str(
            r#"
[server]
bind = "example.com:9090"
temp_bind = "example.com:9091"

[upgrade]
dir = "/srv/upgrades"
handoff_timeout_seconds = 20
"#,
        )
        .unwrap();

        let overrides = Overrides {
            temp_bind: Some(":7000".to_string()),
            handoff_timeout_seconds: Some(3),
            ..Default::default()
        };

        let settings = Settings::resolve(overrides, Some(file)).unwrap();
        assert_eq!(settings.bind.host(), "example.com");
        assert_eq!(settings.temp_bind.to_string(), "localhost:7000");
        assert_eq!(settings.upgrade_dir, PathBuf::from("/srv/upgrades"));
        assert_eq!(settings.handoff_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_bind_rejected() {
        let overrides = Overrides {
            bind: Some("bad::bind:1:2".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Settings::resolve(overrides, None),
            Err(UpdateError::InvalidConfigValueError { .. })
        ));
    }

    #[test]
    fn test_equal_binds_rejected() {
        let overrides = Overrides {
            bind: Some(":9000".to_string()),
            temp_bind: Some("localhost:9000".to_string()),
            ..Default::default()
        };
        assert!(Settings::resolve(overrides, None).is_err());
    }

    #[test]
    fn test_aliased_binds_rejected() {
        let overrides = Overrides {
            bind: Some("localhost:18090".to_string()),
            temp_bind: Some("127.0.0.1:18090".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Settings::resolve(overrides, None),
            Err(UpdateError::InvalidConfigValueError { ref field, .. }) if field == "temp_bind"
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let overrides = Overrides {
            probe_concurrency: Some(0),
            ..Default::default()
        };
        assert!(Settings::resolve(overrides, None).is_err());
    }
}
