use crate::config;
use crate::error::{ScanError, ScoreError};
use crate::models::{PriceSeries, ScoreRecord, Strategy, SymbolSeries};
use crate::scorer::MomentumScorer;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Validated parameters for one ranking pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanParams {
    pub strategy: Strategy,
    pub num_stocks: usize,
    pub lookback_months: u32,
    pub exclude_recent_months: u32,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            num_stocks: config::DEFAULT_NUM_STOCKS,
            lookback_months: config::DEFAULT_LOOKBACK_MONTHS,
            exclude_recent_months: config::DEFAULT_EXCLUDE_RECENT_MONTHS,
        }
    }
}

impl ScanParams {
    /// Build from untrusted integers (env vars, query strings), rejecting
    /// negative or out-of-range values.
    pub fn try_new(
        strategy: Strategy,
        num_stocks: i64,
        lookback_months: i64,
        exclude_recent_months: i64,
    ) -> Result<Self, ScanError> {
        let params = Self {
            strategy,
            num_stocks: checked_range("num_stocks", num_stocks, 1, config::MAX_NUM_STOCKS)? as usize,
            lookback_months: checked_range("lookback_months", lookback_months, 1, config::MAX_LOOKBACK_MONTHS)?
                as u32,
            exclude_recent_months: checked_range(
                "exclude_recent_months",
                exclude_recent_months,
                0,
                config::MAX_EXCLUDE_RECENT_MONTHS,
            )? as u32,
        };
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        Self::try_new(
            self.strategy,
            self.num_stocks as i64,
            self.lookback_months as i64,
            self.exclude_recent_months as i64,
        )
        .map(|_| ())
    }

    pub fn scorer(&self) -> MomentumScorer {
        MomentumScorer::new(self.lookback_months, self.exclude_recent_months, self.strategy)
    }
}

fn checked_range(name: &str, value: i64, min: i64, max: i64) -> Result<i64, ScanError> {
    if value < 0 {
        return Err(ScanError::InvalidConfig(format!("{} must not be negative, got {}", name, value)));
    }
    if value < min || value > max {
        return Err(ScanError::InvalidConfig(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(value)
}

/// A symbol left out of the ranking and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedScan {
    pub cutoff_date: NaiveDate,
    pub params: ScanParams,
    /// Best first, at most `params.num_stocks` entries.
    pub records: Vec<ScoreRecord>,
    pub scored: usize,
    pub skipped: Vec<SkippedSymbol>,
}

/// Score every symbol, drop failures, sort by score descending and keep the
/// top `num_stocks`. Equal scores keep universe order.
pub fn rank_universe(
    universe: &[SymbolSeries],
    cutoff_date: NaiveDate,
    params: &ScanParams,
) -> Result<RankedScan, ScanError> {
    params.validate()?;
    let scorer = params.scorer();

    let outcomes: Vec<Result<ScoreRecord, ScoreError>> = universe
        .par_iter()
        .map(|item| scorer.score(&item.symbol, &item.series, cutoff_date))
        .collect();

    let mut records = Vec::with_capacity(outcomes.len());
    let mut skipped = Vec::new();

    for (item, outcome) in universe.iter().zip(outcomes) {
        match outcome {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!(symbol = %item.symbol, reason = %e, "symbol skipped");
                skipped.push(SkippedSymbol {
                    symbol: item.symbol.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let scored = records.len();
    records.sort_by(|a, b| b.score.total_cmp(&a.score));
    records.truncate(params.num_stocks);

    info!(
        %cutoff_date,
        strategy = %params.strategy,
        universe = universe.len(),
        scored,
        skipped = skipped.len(),
        "ranking complete"
    );

    Ok(RankedScan {
        cutoff_date,
        params: *params,
        records,
        scored,
        skipped,
    })
}

// -----------------------------------------------
// DEFENSIVE ALLOCATION
// -----------------------------------------------

/// Compares a defensive asset with a benchmark index over a short window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRule {
    pub defensive_symbol: String,
    pub benchmark_symbol: String,
    pub lookback_months: u32,
}

impl Default for AllocationRule {
    fn default() -> Self {
        Self {
            defensive_symbol: config::DEFENSIVE_SYMBOL.to_string(),
            benchmark_symbol: config::BENCHMARK_SYMBOL.to_string(),
            lookback_months: config::ALLOCATION_LOOKBACK_MONTHS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationDecision {
    pub defensive_symbol: String,
    pub benchmark_symbol: String,
    pub defensive_return: Option<f64>,
    pub benchmark_return: Option<f64>,
    pub include_defensive: bool,
    /// Share of capital for the ranked equities.
    pub equity_weight: f64,
    /// Set when the comparison could not be made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Defensive asset's record under the scan strategy, when included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defensive_record: Option<ScoreRecord>,
}

impl AllocationRule {
    fn scorer(&self, strategy: Strategy) -> MomentumScorer {
        MomentumScorer::new(self.lookback_months, 0, strategy)
    }

    /// Trailing return for one auxiliary series.
    fn trailing_return(
        &self,
        symbol: &str,
        series: Option<&PriceSeries>,
        cutoff_date: NaiveDate,
    ) -> Result<ScoreRecord, ScanError> {
        let series = series.ok_or_else(|| ScanError::MissingAuxiliarySeries(symbol.to_string()))?;
        self.scorer(Strategy::RawMomentum)
            .score(symbol, series, cutoff_date)
            .map_err(|e| ScanError::MissingAuxiliarySeries(format!("{} ({})", symbol, e)))
    }

    /// Add the defensive asset when it beat the benchmark strictly. Any
    /// missing input means "stay in equities".
    pub fn evaluate(
        &self,
        defensive: Option<&PriceSeries>,
        benchmark: Option<&PriceSeries>,
        cutoff_date: NaiveDate,
        strategy: Strategy,
    ) -> AllocationDecision {
        let mut decision = AllocationDecision {
            defensive_symbol: self.defensive_symbol.clone(),
            benchmark_symbol: self.benchmark_symbol.clone(),
            defensive_return: None,
            benchmark_return: None,
            include_defensive: false,
            equity_weight: 1.0,
            note: None,
            defensive_record: None,
        };

        let defensive_rec = self.trailing_return(&self.defensive_symbol, defensive, cutoff_date);
        let benchmark_rec = self.trailing_return(&self.benchmark_symbol, benchmark, cutoff_date);

        decision.defensive_return = defensive_rec.as_ref().ok().map(|r| r.momentum);
        decision.benchmark_return = benchmark_rec.as_ref().ok().map(|r| r.momentum);

        match (defensive_rec, benchmark_rec) {
            (Ok(def), Ok(bench)) => {
                if def.momentum > bench.momentum {
                    decision.include_defensive = true;
                    decision.equity_weight = 0.5;
                    decision.defensive_record = defensive
                        .and_then(|s| self.scorer(strategy).score(&self.defensive_symbol, s, cutoff_date).ok());
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                info!(error = %e, "allocation comparison unavailable, staying in equities");
                decision.note = Some(e.to_string());
            }
        }

        decision
    }

    /// Evaluate and append the defensive record to `scan` when it qualifies.
    pub fn apply(
        &self,
        scan: &mut RankedScan,
        defensive: Option<&PriceSeries>,
        benchmark: Option<&PriceSeries>,
    ) -> AllocationDecision {
        let decision = self.evaluate(defensive, benchmark, scan.cutoff_date, scan.params.strategy);

        if let Some(record) = &decision.defensive_record {
            let already_ranked = scan.records.iter().any(|r| r.symbol == record.symbol);
            if !already_ranked {
                scan.records.push(record.clone());
            }
        }

        decision
    }
}
