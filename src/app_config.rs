use crate::calendar::{HolidaySet, TradingCalendar, exchange_today};
use crate::config;
use crate::error::ScanError;
use crate::models::Strategy;
use crate::provider::{HistorySource, HttpCandleProvider, JsonDirProvider};
use crate::ranking::{AllocationRule, ScanParams};
use chrono::{Datelike, NaiveDate};
use colored::Colorize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Application configuration handler
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: String,
    pub port: u16,
    pub params: ScanParams,
    pub stock_list: PathBuf,
    pub data_dir: PathBuf,
    /// Candle endpoint; when unset, history is read from `data_dir`.
    pub history_url: Option<String>,
    pub access_token: Option<String>,
    pub symbol_template: String,
    pub holidays_file: Option<PathBuf>,
    pub cache_file: PathBuf,
    pub output_dir: PathBuf,
    pub cutoff_date: Option<NaiveDate>,
    pub allocation: AllocationRule,
    pub rebalance_months: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: "scan".to_string(),
            port: config::DEFAULT_PORT,
            params: ScanParams::default(),
            stock_list: PathBuf::from(config::STOCK_LIST_FILE),
            data_dir: PathBuf::from(config::DATA_DIR),
            history_url: None,
            access_token: None,
            symbol_template: config::DEFAULT_SYMBOL_TEMPLATE.to_string(),
            holidays_file: None,
            cache_file: PathBuf::from(config::CACHE_FILE),
            output_dir: PathBuf::from(config::OUTPUT_DIR),
            cutoff_date: None,
            allocation: AllocationRule::default(),
            rebalance_months: config::DEFAULT_REBALANCE_MONTHS,
        }
    }
}

impl AppConfig {
    /// Create new configuration from `SCANNER_*` environment variables
    pub fn from_env() -> Result<Self, ScanError> {
        Self::from_lookup(config::env_opt)
    }

    /// Build from any key lookup. Unset keys keep their defaults, malformed
    /// values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ScanError> {
        let defaults = Self::default();

        let strategy = match lookup("SCANNER_STRATEGY") {
            Some(raw) => raw.parse::<Strategy>()?,
            None => defaults.params.strategy,
        };
        let params = ScanParams::try_new(
            strategy,
            parse_int(&lookup, "SCANNER_NUM_STOCKS", defaults.params.num_stocks as i64)?,
            parse_int(&lookup, "SCANNER_LOOKBACK_MONTHS", defaults.params.lookback_months as i64)?,
            parse_int(&lookup, "SCANNER_EXCLUDE_MONTHS", defaults.params.exclude_recent_months as i64)?,
        )?;

        let port = match lookup("SCANNER_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ScanError::InvalidConfig(format!("SCANNER_PORT must be a port number, got '{}'", raw)))?,
            None => defaults.port,
        };

        let cutoff_date = lookup("SCANNER_CUTOFF_DATE")
            .map(|raw| {
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                    ScanError::InvalidConfig(format!("SCANNER_CUTOFF_DATE must be YYYY-MM-DD, got '{}'", raw))
                })
            })
            .transpose()?;

        let rebalance_months = parse_int(&lookup, "SCANNER_REBALANCE_MONTHS", defaults.rebalance_months as i64)?;
        if !(1..=config::MAX_REBALANCE_MONTHS as i64).contains(&rebalance_months) {
            return Err(ScanError::InvalidConfig(format!(
                "SCANNER_REBALANCE_MONTHS must be between 1 and {}, got {}",
                config::MAX_REBALANCE_MONTHS,
                rebalance_months
            )));
        }

        let allocation = AllocationRule {
            defensive_symbol: lookup("SCANNER_DEFENSIVE_SYMBOL").unwrap_or(defaults.allocation.defensive_symbol),
            benchmark_symbol: lookup("SCANNER_BENCHMARK_SYMBOL").unwrap_or(defaults.allocation.benchmark_symbol),
            lookback_months: defaults.allocation.lookback_months,
        };

        let app_config = Self {
            mode: lookup("SCANNER_MODE").unwrap_or(defaults.mode),
            port,
            params,
            stock_list: lookup("SCANNER_STOCK_LIST").map(PathBuf::from).unwrap_or(defaults.stock_list),
            data_dir: lookup("SCANNER_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            history_url: lookup("SCANNER_HISTORY_URL"),
            access_token: lookup("SCANNER_ACCESS_TOKEN"),
            symbol_template: lookup("SCANNER_SYMBOL_TEMPLATE").unwrap_or(defaults.symbol_template),
            holidays_file: lookup("SCANNER_HOLIDAYS_FILE").map(PathBuf::from),
            cache_file: lookup("SCANNER_CACHE_FILE").map(PathBuf::from).unwrap_or(defaults.cache_file),
            output_dir: lookup("SCANNER_OUTPUT_DIR").map(PathBuf::from).unwrap_or(defaults.output_dir),
            cutoff_date,
            allocation,
            rebalance_months: rebalance_months as u32,
        };
        app_config.validate()?;
        Ok(app_config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ScanError> {
        self.params.validate()?;
        if !self.symbol_template.contains("{symbol}") {
            return Err(ScanError::InvalidConfig(format!(
                "symbol template '{}' has no {{symbol}} placeholder",
                self.symbol_template
            )));
        }
        if self.allocation.defensive_symbol == self.allocation.benchmark_symbol {
            return Err(ScanError::InvalidConfig(
                "defensive and benchmark symbols must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Calendar with the configured holiday file, or the embedded list.
    pub fn calendar(&self) -> Result<TradingCalendar, ScanError> {
        let holidays = match &self.holidays_file {
            Some(path) => {
                let set = HolidaySet::from_json_file(path)?;
                info!(path = %path.display(), count = set.len(), "holidays loaded");
                set
            }
            None => {
                if let Some(year) = self.uncovered_holiday_year(exchange_today()) {
                    warn!(
                        year,
                        "embedded NSE holidays do not cover this year, only weekends are closed; set SCANNER_HOLIDAYS_FILE"
                    );
                }
                HolidaySet::embedded()
            }
        };
        Ok(TradingCalendar::new(holidays))
    }

    /// Year of `today` when it falls outside the embedded holiday list and
    /// no holiday file is configured.
    fn uncovered_holiday_year(&self, today: NaiveDate) -> Option<i32> {
        let year = today.year();
        (self.holidays_file.is_none() && !config::embedded_holidays_cover(year)).then_some(year)
    }

    pub fn history_source(&self) -> Result<HistorySource, ScanError> {
        match &self.history_url {
            Some(url) => Ok(HistorySource::Http(HttpCandleProvider::new(
                url.clone(),
                self.symbol_template.clone(),
                self.access_token.clone(),
            )?)),
            None => Ok(HistorySource::Dir(JsonDirProvider::new(self.data_dir.clone()))),
        }
    }

    /// Log configuration details for CI environments
    pub fn log_ci_config(&self) {
        if config::is_ci_environment() {
            println!("{}", "Running in CI environment (GitHub Actions)".blue().bold());
            println!("{} Mode: {}", "→".cyan(), self.mode.yellow());

            if self.mode != "scan" {
                println!("{} Only scan mode is supported in CI - switching to scan", "⚠".yellow());
            }
            println!();
        }
    }
}

fn parse_int(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: i64) -> Result<i64, ScanError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ScanError::InvalidConfig(format!("{} must be an integer, got '{}'", key, raw))),
        None => Ok(default),
    }
}
