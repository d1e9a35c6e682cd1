use chrono::NaiveDate;
use std::fmt;

/// Why a single symbol could not be scored. Never fatal to a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// Not enough history to cover the lookback window.
    InsufficientData(String),
    /// Resolved start date is on or after the resolved end date.
    DegenerateWindow { start: NaiveDate, end: NaiveDate },
}

impl fmt::Display for ScoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScoreError::InsufficientData(msg) => write!(f, "Insufficient data: {}", msg),
            ScoreError::DegenerateWindow { start, end } => {
                write!(f, "Degenerate window: start {} is not before end {}", start, end)
            }
        }
    }
}

impl std::error::Error for ScoreError {}

/// Errors that stop an operation outright.
#[derive(Debug)]
pub enum ScanError {
    InvalidConfig(String),
    InvalidSeries(String),
    NoTradingDay { from: NaiveDate, searched_days: u32 },
    MissingAuxiliarySeries(String),
    EmptyHistory(String),
    Request(String),
    Parse(String),
    Io(String),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScanError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            ScanError::InvalidSeries(msg) => write!(f, "Invalid price series: {}", msg),
            ScanError::NoTradingDay { from, searched_days } => write!(
                f,
                "No trading day found within {} days before {}",
                searched_days, from
            ),
            ScanError::MissingAuxiliarySeries(symbol) => {
                write!(f, "Auxiliary series unavailable: {}", symbol)
            }
            ScanError::EmptyHistory(symbol) => write!(f, "No price history returned for {}", symbol),
            ScanError::Request(msg) => write!(f, "Request error: {}", msg),
            ScanError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ScanError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        ScanError::Request(err.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Parse(err.to_string())
    }
}

impl From<chrono::ParseError> for ScanError {
    fn from(err: chrono::ParseError) -> Self {
        ScanError::Parse(err.to_string())
    }
}

impl From<csv::Error> for ScanError {
    fn from(err: csv::Error) -> Self {
        ScanError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::Io(err.to_string())
    }
}
