use momentum_scanner::cache::SeriesCache;
use momentum_scanner::pipeline::{refresh_history, score_cached};
use momentum_scanner::provider::JsonDirProvider;
use momentum_scanner::{AllocationRule, PriceBar, PriceSeries, ScanParams, Strategy, SymbolSeries, rank_universe};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series(points: &[(NaiveDate, f64)]) -> PriceSeries {
        PriceSeries::from_closes(points.iter().copied()).unwrap()
    }

    fn raw_params(num_stocks: usize) -> ScanParams {
        ScanParams {
            strategy: Strategy::RawMomentum,
            num_stocks,
            lookback_months: 3,
            exclude_recent_months: 0,
        }
    }

    fn universe() -> Vec<SymbolSeries> {
        let cutoff = d(2025, 12, 12);
        vec![
            SymbolSeries::new("SLOW", series(&[(d(2025, 9, 1), 100.0), (cutoff, 105.0)])),
            // history starts after the cutoff
            SymbolSeries::new("NEWLIST", series(&[(d(2025, 12, 15), 50.0), (d(2025, 12, 16), 55.0)])),
            SymbolSeries::new("FAST", series(&[(d(2025, 9, 1), 100.0), (cutoff, 140.0)])),
            // single bar, start and end coincide
            SymbolSeries::new("THIN", series(&[(cutoff, 10.0)])),
            SymbolSeries::new("FALLING", series(&[(d(2025, 9, 1), 100.0), (cutoff, 90.0)])),
        ]
    }

    #[test]
    fn test_rank_skips_unscorable_and_sorts_descending() {
        let scan = rank_universe(&universe(), d(2025, 12, 12), &raw_params(20)).unwrap();

        assert_eq!(scan.records.len(), 3);
        assert_eq!(scan.scored, 3);
        let order: Vec<_> = scan.records.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["FAST", "SLOW", "FALLING"]);
        for pair in scan.records.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }

        let skipped: Vec<_> = scan.skipped.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(skipped, vec!["NEWLIST", "THIN"]);
    }

    #[test]
    fn test_rank_truncates_to_num_stocks() {
        let scan = rank_universe(&universe(), d(2025, 12, 12), &raw_params(2)).unwrap();
        assert_eq!(scan.records.len(), 2);
        assert_eq!(scan.scored, 3);
        assert_eq!(scan.records[0].symbol, "FAST");
    }

    #[test]
    fn test_empty_universe_is_not_an_error() {
        let scan = rank_universe(&[], d(2025, 12, 12), &raw_params(20)).unwrap();
        assert!(scan.records.is_empty());
    }

    #[test]
    fn test_negative_lookback_fails_fast() {
        assert!(ScanParams::try_new(Strategy::VolatilityAdjusted, 20, -12, 0).is_err());
    }

    #[tokio::test]
    async fn test_pipeline_from_json_directory() {
        let dir = tempfile::tempdir().unwrap();
        let write = |symbol: &str, start: f64, end: f64| {
            let bars = vec![
                PriceBar::from_close(d(2025, 9, 1), start),
                PriceBar::from_close(d(2025, 12, 12), end),
            ];
            std::fs::write(dir.path().join(format!("{}.json", symbol)), serde_json::to_string(&bars).unwrap())
                .unwrap();
        };
        write("ANGELONE", 100.0, 120.0);
        write("AARTIIND", 100.0, 130.0);
        write("GOLDBEES", 100.0, 101.0);
        write("NIFTY50", 100.0, 104.0);

        let provider = JsonDirProvider::new(dir.path());
        let rule = AllocationRule::default();
        let cutoff = d(2025, 12, 12);
        let symbols = vec!["ANGELONE".to_string(), "AARTIIND".to_string(), "MISSING".to_string()];

        let mut cache = SeriesCache::default();
        let summary = refresh_history(&provider, &mut cache, &symbols, &rule, cutoff).await;
        assert_eq!(summary.fetched, 4);
        assert_eq!(summary.failed.len(), 1);

        let outcome = score_cached(&cache, &symbols, cutoff, &raw_params(20), &rule).unwrap();
        let order: Vec<_> = outcome.scan.records.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["AARTIIND", "ANGELONE"]);
        assert!(!outcome.allocation.include_defensive);
        assert_eq!(outcome.allocation.equity_weight, 1.0);
    }
}
