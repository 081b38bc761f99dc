use clap::Parser;
use self_update::adapters::process::{ProcessLauncher, StdExit, TakeoverOptions};
use self_update::core::{CandidateLauncher, ProcessExit};
use self_update::server::handoff::HandoffProtocolHandler;
use self_update::server::{self, AppState};
use self_update::utils::logger;
use self_update::{Cli, UpdateError, UpgradeOrchestrator, Version, VERSION};
use std::sync::Arc;

fn fail(e: UpdateError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    std::process::exit(e.exit_code().max(1))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 供升級探測使用，只輸出版本號
    if cli.print_version {
        println!("{}", VERSION);
        return Ok(());
    }

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    let version = Version::parse(VERSION)?;
    tracing::info!("Starting self-update {}", version);

    let settings = cli.settings().unwrap_or_else(|e| fail(e));
    if cli.verbose {
        tracing::debug!("settings: {:?}", settings);
    }

    // 新版本沿用目前解析後的設定
    let options = TakeoverOptions::from_settings(&settings).with_logging(cli.json_logs, cli.verbose);
    let launcher: Box<dyn CandidateLauncher> = Box::new(ProcessLauncher::new(options));
    let exit: Box<dyn ProcessExit> = Box::new(StdExit);
    let orchestrator = UpgradeOrchestrator::new(launcher, exit, settings.upgrade_timeouts());
    let app = Arc::new(AppState::new(version, settings, orchestrator));

    let handoff = if cli.takeover {
        let handler = Arc::new(HandoffProtocolHandler::new(Arc::clone(&app)));
        handler.listen().await.unwrap_or_else(|e| fail(e));
        Some(handler)
    } else {
        server::start_service(&app).await.unwrap_or_else(|e| fail(e));
        None
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    if let Some(handler) = handoff {
        handler.release_temp_listener().await?;
    }
    server::stop_service(&app).await?;

    Ok(())
}
