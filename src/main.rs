use anyhow::Result;
use momentum_scanner::app_config::AppConfig;
use momentum_scanner::commands::ScannerCommands;
use momentum_scanner::{config, logging};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging(config::LOG_DIR)?;

    let cfg = AppConfig::from_env()?;
    cfg.log_ci_config();

    if ScannerCommands::handle_ci_mode_override(&cfg.mode) {
        return ScannerCommands::run_scan(&cfg).await;
    }

    match cfg.mode.as_str() {
        "scan" => ScannerCommands::run_scan(&cfg).await?,
        "calendar" => ScannerCommands::run_calendar(&cfg)?,
        "server" => ScannerCommands::run_server(&cfg).await?,
        other => {
            eprintln!("Invalid mode '{}'. Use 'scan', 'calendar' or 'server'", other);
            ScannerCommands::print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
