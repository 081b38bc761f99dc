use crate::adapters::process::{
    BIND_FLAG, HANDOFF_TIMEOUT_FLAG, JSON_LOGS_FLAG, PROBE_CONCURRENCY_FLAG, PROBE_TIMEOUT_FLAG,
    SHUTDOWN_TIMEOUT_FLAG, STARTUP_TIMEOUT_FLAG, TAKEOVER_FLAG, TEMP_BIND_FLAG, UPGRADE_DIR_FLAG,
    VERBOSE_FLAG,
};
use crate::config::toml_config::TomlConfig;
use crate::config::{Overrides, Settings};
use crate::utils::error::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "self-update")]
#[command(about = "A network service that replaces itself with newer builds without downtime")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Print the bare version and exit
    #[arg(long = "version")]
    pub print_version: bool,

    /// Address to serve on (host:port or :port)
    #[arg(long = BIND_FLAG)]
    pub bind: Option<String>,

    /// Scratch address a new instance listens on during handoff
    #[arg(long = TEMP_BIND_FLAG)]
    pub temp_bind: Option<String>,

    /// Directory scanned for newer builds
    #[arg(long = UPGRADE_DIR_FLAG)]
    pub upgrade_dir: Option<PathBuf>,

    /// Start on the temporary bind and wait for the running instance to hand over
    #[arg(long = TAKEOVER_FLAG)]
    pub takeover: bool,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long = PROBE_TIMEOUT_FLAG)]
    pub probe_timeout_seconds: Option<u64>,

    #[arg(long = PROBE_CONCURRENCY_FLAG)]
    pub probe_concurrency: Option<usize>,

    #[arg(long = STARTUP_TIMEOUT_FLAG)]
    pub startup_timeout_seconds: Option<u64>,

    #[arg(long = HANDOFF_TIMEOUT_FLAG)]
    pub handoff_timeout_seconds: Option<u64>,

    #[arg(long = SHUTDOWN_TIMEOUT_FLAG)]
    pub shutdown_timeout_seconds: Option<u64>,

    /// Emit logs as JSON
    #[arg(long = JSON_LOGS_FLAG)]
    pub json_logs: bool,

    /// Enable verbose output
    #[arg(short, long = VERBOSE_FLAG)]
    pub verbose: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            bind: self.bind.clone(),
            temp_bind: self.temp_bind.clone(),
            upgrade_dir: self.upgrade_dir.clone(),
            probe_timeout_seconds: self.probe_timeout_seconds,
            probe_concurrency: self.probe_concurrency,
            startup_timeout_seconds: self.startup_timeout_seconds,
            handoff_timeout_seconds: self.handoff_timeout_seconds,
            shutdown_timeout_seconds: self.shutdown_timeout_seconds,
        }
    }

    /// Loads the configuration file when one is given and applies the flags over it.
    pub fn settings(&self) -> Result<Settings> {
        let file = match &self.config {
            Some(path) => Some(TomlConfig::from_file(path)?),
            None => None,
        };
        Settings::resolve(self.overrides(), file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::process::{takeover_args, TakeoverOptions};
    use crate::config::DEFAULT_BIND;
    use std::time::Duration;
    use crate::core::{Candidate, Version};

    #[test]
    fn test_version_flag() {
        let cli = Cli::try_parse_from(["self-update", "--version"]).unwrap();
        assert!(cli.print_version);
        assert!(!cli.takeover);
    }

    #[test]
    fn test_parses_launcher_arguments() {
        let candidate = Candidate::new(PathBuf::from("/opt/svc/v2"), Version::new(2, 0, 0));
        let running = Settings::resolve(
            Overrides {
                bind: Some(DEFAULT_BIND.to_string()),
                upgrade_dir: Some(PathBuf::from("/opt/svc")),
                probe_timeout_seconds: Some(7),
                probe_concurrency: Some(8),
                startup_timeout_seconds: Some(15),
                handoff_timeout_seconds: Some(25),
                shutdown_timeout_seconds: Some(120),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        let options = TakeoverOptions::from_settings(&running).with_logging(true, true);
        let args = takeover_args(&running.temp_bind, &running.bind, &options);

        let mut argv = vec![candidate.path.to_string_lossy().to_string()];
        argv.extend(args);
        let cli = Cli::try_parse_from(argv).unwrap();

        assert!(cli.takeover);
        assert!(cli.json_logs);
        assert!(cli.verbose);
        assert!(cli.config.is_none());

        let settings = cli.settings().unwrap();
        assert_eq!(settings.bind, running.bind);
        assert_eq!(settings.temp_bind, running.temp_bind);
        assert_eq!(settings.upgrade_dir, PathBuf::from("/opt/svc"));
        assert_eq!(settings.probe_timeout, Duration::from_secs(7));
        assert_eq!(settings.probe_concurrency, 8);
        assert_eq!(settings.startup_timeout, Duration::from_secs(15));
        assert_eq!(settings.handoff_timeout, Duration::from_secs(25));
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(120));
    }
}
