use crate::cache::SeriesCache;
use crate::error::ScanError;
use crate::provider::{FetchSummary, PriceHistoryProvider, fill_cache};
use crate::ranking::{AllocationDecision, AllocationRule, RankedScan, ScanParams, rank_universe};
use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::RwLock;

/// A finished ranking with the allocation already applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub scan: RankedScan,
    pub allocation: AllocationDecision,
}

/// Universe symbols followed by the allocation rule's auxiliary symbols.
pub fn tracked_symbols(universe: &[String], rule: &AllocationRule) -> Vec<String> {
    let mut symbols = universe.to_vec();
    for aux in [&rule.defensive_symbol, &rule.benchmark_symbol] {
        if !symbols.contains(aux) {
            symbols.push(aux.clone());
        }
    }
    symbols
}

/// Make sure the cache holds history for the universe and both auxiliary
/// symbols at `cutoff_date`.
pub async fn refresh_history<P: PriceHistoryProvider>(
    provider: &P,
    cache: &mut SeriesCache,
    universe: &[String],
    rule: &AllocationRule,
    cutoff_date: NaiveDate,
) -> FetchSummary {
    let symbols = tracked_symbols(universe, rule);
    fill_cache(provider, cache, &symbols, cutoff_date).await
}

/// [`refresh_history`] for a cache shared between tasks. Missing symbols are
/// read under a read lock and fetched with no lock held. The write lock is
/// only taken to merge what arrived.
pub async fn refresh_shared<P: PriceHistoryProvider>(
    provider: &P,
    cache: &RwLock<SeriesCache>,
    universe: &[String],
    rule: &AllocationRule,
    cutoff_date: NaiveDate,
) -> FetchSummary {
    let symbols = tracked_symbols(universe, rule);
    let pending = cache.read().await.missing(&symbols, cutoff_date);

    let mut fetched = SeriesCache::new(cutoff_date);
    let mut summary = fill_cache(provider, &mut fetched, &pending, cutoff_date).await;
    summary.reused = symbols.len() - pending.len();

    if summary.fetched > 0 {
        cache.write().await.merge(fetched);
    }
    summary
}

/// Rank the cached universe and apply the allocation rule. Auxiliary series
/// only enter the ranking when they are part of `universe`.
pub fn score_cached(
    cache: &SeriesCache,
    universe: &[String],
    cutoff_date: NaiveDate,
    params: &ScanParams,
    rule: &AllocationRule,
) -> Result<ScanOutcome, ScanError> {
    let series = cache.universe(universe, cutoff_date);
    let mut scan = rank_universe(&series, cutoff_date, params)?;

    let allocation = rule.apply(
        &mut scan,
        cache.get(&rule.defensive_symbol, cutoff_date),
        cache.get(&rule.benchmark_symbol, cutoff_date),
    );

    Ok(ScanOutcome { scan, allocation })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PriceSeries, Strategy};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn two_point(start: f64, end: f64) -> PriceSeries {
        PriceSeries::from_closes([(d(2025, 9, 1), start), (d(2025, 12, 12), end)]).unwrap()
    }

    #[test]
    fn test_tracked_symbols_appends_aux_once() {
        let rule = AllocationRule::default();
        let universe = vec!["TCS".to_string(), "GOLDBEES".to_string()];
        assert_eq!(tracked_symbols(&universe, &rule), vec!["TCS", "GOLDBEES", "NIFTY50"]);
    }

    #[test]
    fn test_score_cached_keeps_aux_out_of_ranking() {
        let cutoff = d(2025, 12, 12);
        let mut cache = SeriesCache::new(cutoff);
        cache.insert("TCS", cutoff, two_point(100.0, 110.0));
        cache.insert("GOLDBEES", cutoff, two_point(100.0, 130.0));
        cache.insert("NIFTY50", cutoff, two_point(100.0, 105.0));

        let params = ScanParams {
            strategy: Strategy::RawMomentum,
            lookback_months: 3,
            ..ScanParams::default()
        };
        let universe = vec!["TCS".to_string()];
        let outcome = score_cached(&cache, &universe, cutoff, &params, &AllocationRule::default()).unwrap();

        assert_eq!(outcome.scan.scored, 1);
        assert!(outcome.allocation.include_defensive);
        let symbols: Vec<_> = outcome.scan.records.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["TCS", "GOLDBEES"]);
    }

    /// Signals when a fetch starts, then waits to be released.
    #[derive(Default)]
    struct GatedProvider {
        started: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    impl PriceHistoryProvider for GatedProvider {
        async fn fetch(&self, _symbol: &str, _start: NaiveDate, end: NaiveDate) -> Result<PriceSeries, ScanError> {
            self.started.notify_one();
            self.release.notified().await;
            PriceSeries::from_closes([(end, 10.0)])
        }
    }

    #[tokio::test]
    async fn test_refresh_shared_holds_no_lock_while_fetching() {
        let cutoff = d(2025, 12, 12);
        let cache = RwLock::new(SeriesCache::default());
        let provider = GatedProvider::default();
        let universe = vec!["TCS".to_string()];
        let rule = AllocationRule::default();

        let refresh = refresh_shared(&provider, &cache, &universe, &rule, cutoff);
        let observe = async {
            // TCS, GOLDBEES and NIFTY50 are fetched one after another
            for _ in 0..3 {
                provider.started.notified().await;
                assert!(cache.try_write().is_ok());
                provider.release.notify_one();
            }
        };
        let (summary, ()) = tokio::join!(refresh, observe);

        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.reused, 0);
        assert_eq!(cache.read().await.len(), 3);

        let again = refresh_shared(&provider, &cache, &universe, &rule, cutoff).await;
        assert_eq!(again.fetched, 0);
        assert_eq!(again.reused, 3);
    }
}
