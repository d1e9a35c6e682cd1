use chrono::NaiveDate;
use chrono_tz::Tz;
use std::time::Duration;

// -----------------------------------------------
// EXCHANGE
// -----------------------------------------------
pub const EXCHANGE_TZ: Tz = chrono_tz::Asia::Kolkata;

/// NSE trading holidays falling on weekdays, 2025 and 2026.
pub const NSE_HOLIDAYS: &[(i32, u32, u32)] = &[
    (2025, 2, 26),  // Mahashivratri
    (2025, 3, 14),  // Holi
    (2025, 3, 31),  // Id-Ul-Fitr
    (2025, 4, 10),  // Shri Mahavir Jayanti
    (2025, 4, 14),  // Dr. Baba Saheb Ambedkar Jayanti
    (2025, 4, 18),  // Good Friday
    (2025, 5, 1),   // Maharashtra Day
    (2025, 8, 15),  // Independence Day
    (2025, 8, 27),  // Ganesh Chaturthi
    (2025, 10, 2),  // Gandhi Jayanti / Dussehra
    (2025, 10, 21), // Diwali Laxmi Pujan
    (2025, 10, 22), // Diwali Balipratipada
    (2025, 11, 5),  // Prakash Gurpurb
    (2025, 12, 25), // Christmas
    (2026, 1, 26),  // Republic Day
    (2026, 3, 3),   // Holi
    (2026, 3, 26),  // Shri Ram Navami
    (2026, 3, 31),  // Shri Mahavir Jayanti
    (2026, 4, 3),   // Good Friday
    (2026, 4, 14),  // Dr. Baba Saheb Ambedkar Jayanti
    (2026, 5, 1),   // Maharashtra Day
    (2026, 5, 28),  // Bakri Id
    (2026, 6, 26),  // Muharram
    (2026, 9, 14),  // Ganesh Chaturthi
    (2026, 10, 2),  // Mahatma Gandhi Jayanti
    (2026, 10, 20), // Dussehra
    (2026, 11, 10), // Diwali Balipratipada
    (2026, 11, 24), // Prakash Gurpurb
    (2026, 12, 25), // Christmas
];

pub fn embedded_holidays() -> Vec<NaiveDate> {
    NSE_HOLIDAYS
        .iter()
        .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
        .collect()
}

/// Whether the embedded list has entries for `year`.
pub fn embedded_holidays_cover(year: i32) -> bool {
    NSE_HOLIDAYS.iter().any(|&(y, _, _)| y == year)
}

// -----------------------------------------------
// CALENDAR
// -----------------------------------------------
pub const MAX_TRADING_DAY_SEARCH_DAYS: u32 = 30;
pub const REBALANCE_SEARCH_DAYS: u32 = 10;
pub const MONTH_START_DAY: u32 = 1;
pub const MID_MONTH_DAY: u32 = 15;
pub const DEFAULT_REBALANCE_MONTHS: u32 = 3;
pub const MAX_REBALANCE_MONTHS: u32 = 24;

// -----------------------------------------------
// SCORING DEFAULTS
// -----------------------------------------------
pub const DEFAULT_LOOKBACK_MONTHS: u32 = 12;
pub const DEFAULT_EXCLUDE_RECENT_MONTHS: u32 = 0;
pub const DEFAULT_NUM_STOCKS: usize = 20;
pub const MAX_LOOKBACK_MONTHS: i64 = 60;
pub const MAX_EXCLUDE_RECENT_MONTHS: i64 = 12;
pub const MAX_NUM_STOCKS: i64 = 500;

// -----------------------------------------------
// DEFENSIVE ALLOCATION
// -----------------------------------------------
pub const DEFENSIVE_SYMBOL: &str = "GOLDBEES";
pub const BENCHMARK_SYMBOL: &str = "NIFTY50";
pub const ALLOCATION_LOOKBACK_MONTHS: u32 = 3;

// -----------------------------------------------
// FILES
// -----------------------------------------------
pub const STOCK_LIST_FILE: &str = "ind_niftysmallcap250list.csv";
pub const CACHE_FILE: &str = "stock_data_cache.json";
pub const DATA_DIR: &str = "price_data";
pub const OUTPUT_DIR: &str = "data";
pub const LOG_DIR: &str = "./logs";
pub const HISTORY_WINDOW_DAYS: i64 = 730;

// -----------------------------------------------
// HISTORY ENDPOINT
// -----------------------------------------------
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                               AppleWebKit/537.36 (KHTML, like Gecko) \
                               Chrome/131.0.0.0 Safari/537.36";

pub const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "en-IN,en;q=0.9",
];

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(20);
pub const HISTORY_CHUNK_DAYS: i64 = 365;
pub const REQUEST_DELAY_MS: u64 = 500;
pub const DEFAULT_SYMBOL_TEMPLATE: &str = "NSE:{symbol}-EQ";

pub fn history_url(base: &str, symbol: &str, from: NaiveDate, to: NaiveDate) -> String {
    format!(
        "{}/history?symbol={}&resolution=D&date_format=1&range_from={}&range_to={}&cont_flag=1",
        base.trim_end_matches('/'),
        urlencoding::encode(symbol),
        from.format("%Y-%m-%d"),
        to.format("%Y-%m-%d"),
    )
}

// -----------------------------------------------
// RETRY CONFIG
// -----------------------------------------------
pub const RETRY_BASE_DELAY_MS: u64 = 100;
pub const RETRY_FACTOR: u64 = 2;
pub const RETRY_MAX_DELAY_SECS: u64 = 3;
pub const RETRY_MAX_ATTEMPTS: usize = 3;

// -----------------------------------------------
// CI
// -----------------------------------------------
pub const CI_FETCH_TIMEOUT_SECS: u64 = 750;

// -----------------------------------------------
// SERVER
// -----------------------------------------------
pub const DEFAULT_PORT: u16 = 8501;
pub const MAX_MEMOIZED_SCANS: usize = 64;

// -----------------------------------------------
// RUNTIME CONFIGURATION
// -----------------------------------------------

/// Get the execution mode from environment or default to scan
pub fn get_execution_mode() -> String {
    std::env::var("SCANNER_MODE").unwrap_or_else(|_| "scan".to_string())
}

/// Check if running in CI/automated environment
pub fn is_ci_environment() -> bool {
    std::env::var("CI").is_ok() || std::env::var("GITHUB_ACTIONS").is_ok()
}

/// Read a variable, treating empty values as unset
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}
