use crate::api_server;
use crate::app_config::AppConfig;
use crate::cache::SeriesCache;
use crate::calendar::{TradingCalendar, exchange_now, exchange_today};
use crate::config;
use crate::export;
use crate::models::RebalanceKind;
use crate::pipeline::{self, ScanOutcome};
use crate::provider::FetchSummary;
use crate::universe::load_stock_list;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use colored::Colorize;
use tracing::warn;

/// Scanner command handler - encapsulates the CLI modes
pub struct ScannerCommands;

impl ScannerCommands {
    /// Fetch or reuse history, rank the universe, print and export the result
    pub async fn run_scan(cfg: &AppConfig) -> Result<()> {
        Self::banner("Momentum Scanner");

        let calendar = cfg.calendar()?;
        let cutoff_date = Self::resolve_cutoff(cfg, &calendar)?;

        println!("{} Strategy: {}", "→".cyan(), cfg.params.strategy.to_string().yellow());
        println!(
            "{} Lookback: {} months, excluding latest {}",
            "→".cyan(),
            cfg.params.lookback_months,
            cfg.params.exclude_recent_months
        );
        println!("{} Data cutoff: {}", "→".cyan(), cutoff_date.to_string().yellow());
        println!();

        // Step 1: Load the stock universe
        println!("{}", "Step 1: Loading stock list...".cyan());
        let symbols = load_stock_list(&cfg.stock_list)
            .with_context(|| format!("failed to read stock list {}", cfg.stock_list.display()))?;
        println!("{} Found {} symbols", "✓".green(), symbols.len());
        println!();

        // Step 2: Fetch price history not already cached for this cutoff
        println!("{}", "Step 2: Fetching price history...".cyan());
        let mut cache = match SeriesCache::load(&cfg.cache_file) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(error = %e, "unreadable cache, starting fresh");
                SeriesCache::default()
            }
        };

        let provider = cfg.history_source()?;
        let start_time = std::time::Instant::now();

        let summary = if config::is_ci_environment() {
            println!("{} CI timeout enabled: {} seconds", "⏱".yellow(), config::CI_FETCH_TIMEOUT_SECS);
            let timeout_duration = std::time::Duration::from_secs(config::CI_FETCH_TIMEOUT_SECS);

            match tokio::time::timeout(
                timeout_duration,
                pipeline::refresh_history(&provider, &mut cache, &symbols, &cfg.allocation, cutoff_date),
            )
            .await
            {
                Ok(summary) => Some(summary),
                Err(_) => {
                    println!(
                        "{} Timeout reached after {} seconds - scoring what was fetched",
                        "⚠".red(),
                        config::CI_FETCH_TIMEOUT_SECS
                    );
                    None
                }
            }
        } else {
            Some(pipeline::refresh_history(&provider, &mut cache, &symbols, &cfg.allocation, cutoff_date).await)
        };

        Self::display_fetch_summary(summary.as_ref(), start_time.elapsed());

        if let Err(e) = cache.save(&cfg.cache_file) {
            println!("{} Could not save cache: {}", "⚠".yellow(), e);
        }

        // Step 3: Rank
        println!("{}", "Step 3: Ranking...".cyan());
        let outcome = pipeline::score_cached(&cache, &symbols, cutoff_date, &cfg.params, &cfg.allocation)?;
        Self::display_ranking(&outcome);

        // Step 4: Export
        let file_name = export::write_scan(&cfg.output_dir, &outcome.scan, Some(&outcome.allocation), exchange_now())?;
        println!(
            "{} Saved {}",
            "✓".green(),
            cfg.output_dir.join(&file_name).display()
        );

        println!();
        println!("{}", "=".repeat(60).blue());
        println!("{}", "Done!".green().bold());
        println!("{}", "=".repeat(60).blue());

        Ok(())
    }

    /// Print upcoming rebalance dates and their data cutoffs
    pub fn run_calendar(cfg: &AppConfig) -> Result<()> {
        Self::banner("Rebalance Calendar");

        let calendar = cfg.calendar()?;
        let today = exchange_today();
        let events = calendar.rebalance_events_from(today, cfg.rebalance_months);

        println!("{} Today: {}", "→".cyan(), today.to_string().yellow());
        if let Some(next) = calendar.upcoming_rebalance(today) {
            println!(
                "{} Next rebalance: {} (data cutoff {})",
                "→".cyan(),
                next.rebalance_date.to_string().green().bold(),
                next.data_cutoff_date
            );
        }
        println!();

        println!("{:<12} {:<12} {:<14} {}", "Rebalance", "Weekday", "Type", "Data cutoff");
        println!("{}", "-".repeat(52));
        for event in &events {
            let kind = match event.kind {
                RebalanceKind::MonthStart => "Month start",
                RebalanceKind::MidMonth => "Mid month",
            };
            let row = format!(
                "{:<12} {:<12} {:<14} {}",
                event.rebalance_date,
                event.rebalance_date.format("%A"),
                kind,
                event.data_cutoff_date
            );
            if event.rebalance_date < today {
                println!("{}", row.dimmed());
            } else {
                println!("{}", row);
            }
        }
        println!();

        Ok(())
    }

    /// Run API server mode
    pub async fn run_server(cfg: &AppConfig) -> Result<()> {
        Self::banner("Momentum Scanner API Server");
        api_server::start_server(cfg.clone()).await
    }

    /// Print usage instructions
    pub fn print_usage() {
        eprintln!("Set SCANNER_MODE environment variable to control execution mode");
        eprintln!("Examples:");
        eprintln!("  SCANNER_MODE=scan cargo run                          # Rank the stock list");
        eprintln!("  SCANNER_MODE=scan SCANNER_STRATEGY=fitp cargo run    # Rank with FITP weighting");
        eprintln!("  SCANNER_MODE=calendar cargo run                      # Show rebalance dates");
        eprintln!("  SCANNER_MODE=server SCANNER_PORT=8501 cargo run      # Start API server");
        eprintln!("Note: GitHub Actions only supports 'scan' mode");
    }

    /// Handle CI environment mode switching
    pub fn handle_ci_mode_override(mode: &str) -> bool {
        if config::is_ci_environment() && mode != "scan" {
            println!("{} GitHub Actions only supports scan mode, running scan instead", "ℹ".blue());
            true
        } else {
            false
        }
    }

    fn resolve_cutoff(cfg: &AppConfig, calendar: &TradingCalendar) -> Result<NaiveDate> {
        if let Some(cutoff) = cfg.cutoff_date {
            return Ok(cutoff);
        }
        Ok(calendar.default_cutoff(exchange_today())?)
    }

    fn banner(title: &str) {
        println!("{}", "=".repeat(60).blue());
        println!("{}", title.green().bold());
        println!("{}", "=".repeat(60).blue());
        println!();
    }

    /// Display fetch summary
    fn display_fetch_summary(summary: Option<&FetchSummary>, elapsed: std::time::Duration) {
        let Some(summary) = summary else {
            println!("{} Time taken: {:.2}s", "⏱".yellow(), elapsed.as_secs_f64());
            println!();
            return;
        };

        println!("{} Fetched: {}", "✓".green(), summary.fetched);
        println!("{} Reused from cache: {}", "ℹ".blue(), summary.reused);
        println!("{} Failed: {}", "✗".red(), summary.failed.len());
        println!("{} Time taken: {:.2}s", "⏱".yellow(), elapsed.as_secs_f64());
        println!();

        if !summary.failed.is_empty() {
            println!("{}", "Failed Symbols:".red());
            for (symbol, error) in summary.failed.iter().take(10) {
                println!("  {} {} → {}", "✗".red(), symbol.yellow(), error.chars().take(80).collect::<String>());
            }
            if summary.failed.len() > 10 {
                println!("  ... and {} more", summary.failed.len() - 10);
            }
            println!();
        }
    }

    /// Display ranked table and allocation
    fn display_ranking(outcome: &ScanOutcome) {
        let scan = &outcome.scan;

        println!("{}", "=".repeat(60).blue());
        println!("{}", "Top Ranked".cyan().bold());
        println!("{}", "=".repeat(60).blue());
        println!(
            "{} Scored {} symbols, skipped {}",
            "ℹ".blue(),
            scan.scored,
            scan.skipped.len()
        );
        println!();

        println!(
            "{:>4}  {:<14} {:>10} {:>10} {:>8} {:>10}",
            "Rank", "Symbol", "Momentum", "Volatility", "FITP", "Score"
        );
        for (i, r) in scan.records.iter().enumerate() {
            let fmt_opt = |v: Option<f64>| v.map(|x| format!("{:.4}", x)).unwrap_or_else(|| "-".to_string());
            let momentum = format!("{:>9.2}%", r.momentum * 100.0);
            println!(
                "{:>4}  {:<14} {} {:>10} {:>8} {:>10.4}",
                i + 1,
                r.symbol.yellow(),
                if r.momentum >= 0.0 { momentum.green() } else { momentum.red() },
                fmt_opt(r.volatility),
                fmt_opt(r.fitp),
                r.score
            );
        }
        println!();

        let allocation = &outcome.allocation;
        let pct = |v: Option<f64>| v.map(|x| format!("{:.2}%", x * 100.0)).unwrap_or_else(|| "n/a".to_string());
        println!(
            "{} {} {} vs {} {}",
            "→".cyan(),
            allocation.defensive_symbol,
            pct(allocation.defensive_return),
            allocation.benchmark_symbol,
            pct(allocation.benchmark_return)
        );
        if allocation.include_defensive {
            println!(
                "{} Allocating {:.0}% to {}",
                "⚠".yellow(),
                (1.0 - allocation.equity_weight) * 100.0,
                allocation.defensive_symbol.yellow()
            );
        } else {
            println!("{} Fully invested in ranked equities", "✓".green());
        }
        if let Some(note) = &allocation.note {
            println!("{} {}", "ℹ".blue(), note);
        }
        println!();
    }
}
