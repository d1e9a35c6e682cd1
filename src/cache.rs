use crate::error::ScanError;
use crate::models::{PriceSeries, Strategy, SymbolSeries};
use crate::pipeline::ScanOutcome;
use crate::ranking::ScanParams;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use crate::config;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use tracing::{debug, info};

/// Price histories fetched for one cutoff date.
///
/// Entries are only handed out for the cutoff they were fetched for, so a
/// cache written yesterday never leaks into today's scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesCache {
    cutoff_date: Option<NaiveDate>,
    series: HashMap<String, PriceSeries>,
}

impl SeriesCache {
    pub fn new(cutoff_date: NaiveDate) -> Self {
        Self {
            cutoff_date: Some(cutoff_date),
            series: HashMap::new(),
        }
    }

    pub fn cutoff_date(&self) -> Option<NaiveDate> {
        self.cutoff_date
    }

    pub fn is_valid_for(&self, cutoff_date: NaiveDate) -> bool {
        self.cutoff_date == Some(cutoff_date)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn get(&self, symbol: &str, cutoff_date: NaiveDate) -> Option<&PriceSeries> {
        if !self.is_valid_for(cutoff_date) {
            return None;
        }
        self.series.get(symbol)
    }

    /// Store a series. Switching cutoff dates discards everything held so far.
    pub fn insert(&mut self, symbol: impl Into<String>, cutoff_date: NaiveDate, series: PriceSeries) {
        if !self.is_valid_for(cutoff_date) {
            self.series.clear();
            self.cutoff_date = Some(cutoff_date);
        }
        self.series.insert(symbol.into(), series);
    }

    /// Symbols from `symbols` with no entry for `cutoff_date`.
    pub fn missing(&self, symbols: &[String], cutoff_date: NaiveDate) -> Vec<String> {
        symbols
            .iter()
            .filter(|s| self.get(s, cutoff_date).is_none())
            .cloned()
            .collect()
    }

    /// Move every entry of `other` in. An empty `other` changes nothing.
    pub fn merge(&mut self, other: SeriesCache) {
        let Some(cutoff_date) = other.cutoff_date else {
            return;
        };
        for (symbol, series) in other.series {
            self.insert(symbol, cutoff_date, series);
        }
    }

    /// Cached symbols from `symbols`, in the order given. Missing ones are skipped.
    pub fn universe(&self, symbols: &[String], cutoff_date: NaiveDate) -> Vec<SymbolSeries> {
        symbols
            .iter()
            .filter_map(|s| self.get(s, cutoff_date).map(|series| SymbolSeries::new(s.clone(), series.clone())))
            .collect()
    }

    /// Read a cache file. A missing file is an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no cache file");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let cache: Self = serde_json::from_str(&raw)?;
        info!(path = %path.display(), symbols = cache.len(), cutoff = ?cache.cutoff_date, "cache loaded");
        Ok(cache)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ScanError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }
}

/// Memo key for a finished scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanKey {
    pub cutoff_date: NaiveDate,
    pub strategy: Strategy,
    pub lookback_months: u32,
    pub exclude_recent_months: u32,
    pub num_stocks: usize,
}

impl ScanKey {
    pub fn new(cutoff_date: NaiveDate, params: &ScanParams) -> Self {
        Self {
            cutoff_date,
            strategy: params.strategy,
            lookback_months: params.lookback_months,
            exclude_recent_months: params.exclude_recent_months,
            num_stocks: params.num_stocks,
        }
    }
}

/// A scan kept for reuse along with the file it was exported to.
#[derive(Debug, Clone)]
pub struct MemoizedScan {
    pub outcome: ScanOutcome,
    pub file_name: String,
}

/// Finished scans keyed by their inputs.
///
/// Only scans for the most recent cutoff are kept, at most
/// [`config::MAX_MEMOIZED_SCANS`] of them, oldest evicted first.
#[derive(Debug, Default)]
pub struct ScanCache {
    entries: HashMap<ScanKey, MemoizedScan>,
    order: VecDeque<ScanKey>,
}

impl ScanCache {
    pub fn get(&self, key: &ScanKey) -> Option<&MemoizedScan> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, outcome: ScanOutcome, file_name: impl Into<String>) {
        let key = ScanKey::new(outcome.scan.cutoff_date, &outcome.scan.params);

        self.entries.retain(|k, _| k.cutoff_date == key.cutoff_date);
        self.order.retain(|k| k.cutoff_date == key.cutoff_date);

        let memo = MemoizedScan {
            outcome,
            file_name: file_name.into(),
        };
        if self.entries.insert(key, memo).is_none() {
            self.order.push_back(key);
        }

        while self.entries.len() > config::MAX_MEMOIZED_SCANS {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            debug!(cutoff = %oldest.cutoff_date, strategy = %oldest.strategy, "evicting memoized scan");
            self.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
