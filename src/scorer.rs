use crate::calendar::months_before;
use crate::config;
use crate::error::ScoreError;
use crate::models::{MomentumMetrics, PriceSeries, ScoreRecord, Strategy};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Lookback parameters for one scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MomentumScorer {
    pub lookback_months: u32,
    pub exclude_recent_months: u32,
    pub strategy: Strategy,
}

impl Default for MomentumScorer {
    fn default() -> Self {
        Self {
            lookback_months: config::DEFAULT_LOOKBACK_MONTHS,
            exclude_recent_months: config::DEFAULT_EXCLUDE_RECENT_MONTHS,
            strategy: Strategy::default(),
        }
    }
}

impl MomentumScorer {
    pub fn new(lookback_months: u32, exclude_recent_months: u32, strategy: Strategy) -> Self {
        Self {
            lookback_months,
            exclude_recent_months,
            strategy,
        }
    }

    /// Compute momentum, volatility and FITP for `series` as of `cutoff_date`.
    pub fn compute_metrics(
        &self,
        series: &PriceSeries,
        cutoff_date: NaiveDate,
    ) -> Result<MomentumMetrics, ScoreError> {
        let end_idx = self.resolve_end(series, cutoff_date)?;
        let bars = series.bars();
        let end_date = bars[end_idx].date;

        let start_idx = self.resolve_start(series, end_date)?;
        let start_date = bars[start_idx].date;

        if start_date >= end_date {
            return Err(ScoreError::DegenerateWindow {
                start: start_date,
                end: end_date,
            });
        }

        let window = &bars[start_idx..=end_idx];
        if window.len() < 2 {
            return Err(ScoreError::InsufficientData(format!(
                "{} price point(s) between {} and {}",
                window.len(),
                start_date,
                end_date
            )));
        }

        let start_close = bars[start_idx].close;
        let end_close = bars[end_idx].close;
        let momentum = (end_close - start_close) / start_close;

        let returns: Vec<f64> = window
            .windows(2)
            .map(|pair| (pair[1].close - pair[0].close) / pair[0].close)
            .collect();

        let (volatility, fitp) = if returns.is_empty() {
            (None, None)
        } else {
            (sample_std(&returns), Some(fitp(momentum, &returns)))
        };

        Ok(MomentumMetrics {
            start_date,
            end_date,
            start_close,
            end_close,
            trading_days: window.len(),
            momentum,
            volatility,
            fitp,
        })
    }

    /// Score one symbol.
    pub fn score(
        &self,
        symbol: &str,
        series: &PriceSeries,
        cutoff_date: NaiveDate,
    ) -> Result<ScoreRecord, ScoreError> {
        let metrics = self.compute_metrics(series, cutoff_date)?;
        Ok(ScoreRecord {
            symbol: symbol.to_string(),
            momentum: metrics.momentum,
            volatility: metrics.volatility,
            fitp: metrics.fitp,
            score: strategy_score(self.strategy, &metrics),
        })
    }

    /// End of window: the cutoff (less any excluded months), or the latest
    /// bar on or before it.
    fn resolve_end(&self, series: &PriceSeries, cutoff_date: NaiveDate) -> Result<usize, ScoreError> {
        let target = if self.exclude_recent_months == 0 {
            cutoff_date
        } else {
            months_before(cutoff_date, self.exclude_recent_months).ok_or_else(|| {
                ScoreError::InsufficientData(format!(
                    "cannot exclude {} months from {}",
                    self.exclude_recent_months, cutoff_date
                ))
            })?
        };

        series
            .position(target)
            .or_else(|| series.position_on_or_before(target))
            .ok_or_else(|| ScoreError::InsufficientData(format!("no prices on or before {}", target)))
    }

    /// Start of window: the first bar on or after the first day of the month
    /// `lookback_months` before `end_date`. Falls back to the latest bar on
    /// or before that day, which is the opposite direction to the end-date
    /// fallback.
    fn resolve_start(&self, series: &PriceSeries, end_date: NaiveDate) -> Result<usize, ScoreError> {
        let month_start = months_before(end_date, self.lookback_months)
            .and_then(|target| target.with_day(1))
            .ok_or_else(|| {
                ScoreError::InsufficientData(format!(
                    "cannot look back {} months from {}",
                    self.lookback_months, end_date
                ))
            })?;

        series
            .position_on_or_after(month_start)
            .or_else(|| series.position_on_or_before(month_start))
            .ok_or_else(|| {
                ScoreError::InsufficientData(format!("no prices around month start {}", month_start))
            })
    }
}

/// Combine metrics into a ranking score.
pub fn strategy_score(strategy: Strategy, metrics: &MomentumMetrics) -> f64 {
    match strategy {
        Strategy::RawMomentum => metrics.momentum,
        Strategy::VolatilityAdjusted => match metrics.volatility {
            Some(vol) if vol > 0.0 => metrics.momentum / vol,
            _ => metrics.momentum,
        },
        Strategy::FitpWeighted => match metrics.fitp {
            Some(fitp) => metrics.momentum * fitp,
            None => metrics.momentum,
        },
    }
}

/// Sample standard deviation (N-1). Undefined below two observations.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Fraction of returns that share the sign of `momentum`; 0.5 when flat.
pub fn fitp(momentum: f64, returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.5;
    }
    let matching = if momentum > 0.0 {
        returns.iter().filter(|r| **r > 0.0).count()
    } else if momentum < 0.0 {
        returns.iter().filter(|r| **r < 0.0).count()
    } else {
        return 0.5;
    };
    matching as f64 / returns.len() as f64
}
