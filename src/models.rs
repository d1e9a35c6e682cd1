use crate::error::ScanError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One daily candle, dated in exchange-local time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Bar where every price equals `close`. Handy for close-only sources.
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }
}

/// Daily bars for one symbol, strictly increasing by date.
///
/// The invariant is checked on construction, so the scorer can index by date
/// without re-validating. Closes must be finite and positive because every
/// return is a ratio against a previous close.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, ScanError> {
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(ScanError::InvalidSeries(format!(
                    "dates must be strictly increasing ({} followed by {})",
                    pair[0].date, pair[1].date
                )));
            }
        }

        if let Some(bad) = bars.iter().find(|b| !b.close.is_finite() || b.close <= 0.0) {
            return Err(ScanError::InvalidSeries(format!(
                "close on {} must be a positive number, got {}",
                bad.date, bad.close
            )));
        }

        Ok(Self { bars })
    }

    /// Sorts and de-duplicates raw bars before validating. A later bar for
    /// the same date replaces an earlier one.
    pub fn from_unsorted(mut bars: Vec<PriceBar>) -> Result<Self, ScanError> {
        bars.sort_by_key(|b| b.date);

        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }

        Self::new(deduped)
    }

    /// Series from `(date, close)` pairs.
    pub fn from_closes(points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Result<Self, ScanError> {
        Self::new(
            points
                .into_iter()
                .map(|(date, close)| PriceBar::from_close(date, close))
                .collect(),
        )
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Index of the bar dated exactly `date`.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    /// Index of the latest bar dated on or before `date`.
    pub fn position_on_or_before(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.bars.partition_point(|b| b.date <= date);
        idx.checked_sub(1)
    }

    /// Index of the earliest bar dated on or after `date`.
    pub fn position_on_or_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.bars.partition_point(|b| b.date < date);
        (idx < self.bars.len()).then_some(idx)
    }
}

impl<'de> Deserialize<'de> for PriceSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bars = Vec::<PriceBar>::deserialize(deserializer)?;
        PriceSeries::new(bars).map_err(serde::de::Error::custom)
    }
}

/// A symbol paired with its history, in universe order.
#[derive(Debug, Clone)]
pub struct SymbolSeries {
    pub symbol: String,
    pub series: PriceSeries,
}

impl SymbolSeries {
    pub fn new(symbol: impl Into<String>, series: PriceSeries) -> Self {
        Self {
            symbol: symbol.into(),
            series,
        }
    }
}

/// How the momentum score is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Strategy {
    #[serde(rename = "momentum")]
    RawMomentum,
    #[default]
    #[serde(rename = "volatility")]
    VolatilityAdjusted,
    #[serde(rename = "fitp")]
    FitpWeighted,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::VolatilityAdjusted,
        Strategy::FitpWeighted,
        Strategy::RawMomentum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RawMomentum => "momentum",
            Strategy::VolatilityAdjusted => "volatility",
            Strategy::FitpWeighted => "fitp",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "momentum" | "raw" => Ok(Strategy::RawMomentum),
            "volatility" | "vol" => Ok(Strategy::VolatilityAdjusted),
            "fitp" => Ok(Strategy::FitpWeighted),
            other => {
                let known: Vec<&str> = Strategy::ALL.iter().map(|s| s.as_str()).collect();
                Err(ScanError::InvalidConfig(format!(
                    "unknown strategy '{}' (expected one of: {})",
                    other,
                    known.join(", ")
                )))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceKind {
    MonthStart,
    MidMonth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceEvent {
    pub rebalance_date: NaiveDate,
    /// Last trading day strictly before `rebalance_date`.
    pub data_cutoff_date: NaiveDate,
    pub kind: RebalanceKind,
}

/// Resolved lookback window and the raw metrics computed over it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumMetrics {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_close: f64,
    pub end_close: f64,
    pub trading_days: usize,
    pub momentum: f64,
    pub volatility: Option<f64>,
    pub fitp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub symbol: String,
    pub momentum: f64,
    pub volatility: Option<f64>,
    pub fitp: Option<f64>,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_rejects_unordered_dates() {
        let err = PriceSeries::from_closes([(d(2024, 1, 3), 10.0), (d(2024, 1, 2), 11.0)]);
        assert!(matches!(err, Err(ScanError::InvalidSeries(_))));

        let dup = PriceSeries::from_closes([(d(2024, 1, 2), 10.0), (d(2024, 1, 2), 11.0)]);
        assert!(dup.is_err());
    }

    #[test]
    fn test_rejects_non_positive_close() {
        assert!(PriceSeries::from_closes([(d(2024, 1, 2), 0.0)]).is_err());
        assert!(PriceSeries::from_closes([(d(2024, 1, 2), f64::NAN)]).is_err());
    }

    #[test]
    fn test_from_unsorted_keeps_last_duplicate() {
        let series = PriceSeries::from_unsorted(vec![
            PriceBar::from_close(d(2024, 1, 3), 12.0),
            PriceBar::from_close(d(2024, 1, 2), 10.0),
            PriceBar::from_close(d(2024, 1, 3), 13.0),
        ])
        .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.bars()[1].close, 13.0);
    }

    #[test]
    fn test_positions() {
        let series = PriceSeries::from_closes([
            (d(2024, 1, 2), 10.0),
            (d(2024, 1, 4), 11.0),
            (d(2024, 1, 8), 12.0),
        ])
        .unwrap();

        assert_eq!(series.position(d(2024, 1, 4)), Some(1));
        assert_eq!(series.position(d(2024, 1, 5)), None);
        assert_eq!(series.position_on_or_before(d(2024, 1, 5)), Some(1));
        assert_eq!(series.position_on_or_before(d(2024, 1, 1)), None);
        assert_eq!(series.position_on_or_after(d(2024, 1, 5)), Some(2));
        assert_eq!(series.position_on_or_after(d(2024, 1, 9)), None);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("volatility".parse::<Strategy>().unwrap(), Strategy::VolatilityAdjusted);
        assert_eq!("FITP".parse::<Strategy>().unwrap(), Strategy::FitpWeighted);
        assert_eq!("momentum".parse::<Strategy>().unwrap(), Strategy::RawMomentum);
        let err = "sharpe".parse::<Strategy>().unwrap_err().to_string();
        assert!(err.contains("volatility, fitp, momentum"), "{}", err);
        assert_eq!(Strategy::default(), Strategy::VolatilityAdjusted);
    }
}
