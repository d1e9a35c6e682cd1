use crate::config;
use crate::error::ScanError;
use crate::models::{RebalanceEvent, RebalanceKind};
use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// Dates on which the exchange is closed despite being weekdays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolidaySet(BTreeSet<NaiveDate>);

impl HolidaySet {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self(dates.into_iter().collect())
    }

    /// The NSE holidays compiled into the binary.
    pub fn embedded() -> Self {
        Self::new(config::embedded_holidays())
    }

    /// Load a JSON array of `YYYY-MM-DD` strings.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let dates: Vec<NaiveDate> = serde_json::from_str(&raw)?;
        Ok(Self::new(dates))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.0.contains(&date)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Weekday/holiday calendar used to place rebalance dates and data cutoffs.
#[derive(Debug, Clone, Default)]
pub struct TradingCalendar {
    holidays: HolidaySet,
}

impl TradingCalendar {
    pub fn new(holidays: HolidaySet) -> Self {
        Self { holidays }
    }

    pub fn holidays(&self) -> &HolidaySet {
        &self.holidays
    }

    /// Monday to Friday and not a listed holiday.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        date.weekday().num_days_from_monday() < 5 && !self.holidays.contains(date)
    }

    /// Last trading day strictly before `date`, searching back at most
    /// [`config::MAX_TRADING_DAY_SEARCH_DAYS`] calendar days.
    pub fn previous_trading_day(&self, date: NaiveDate) -> Result<NaiveDate, ScanError> {
        let mut candidate = date;
        for _ in 0..config::MAX_TRADING_DAY_SEARCH_DAYS {
            candidate = match candidate.pred_opt() {
                Some(prev) => prev,
                None => break,
            };
            if self.is_trading_day(candidate) {
                return Ok(candidate);
            }
        }

        Err(ScanError::NoTradingDay {
            from: date,
            searched_days: config::MAX_TRADING_DAY_SEARCH_DAYS,
        })
    }

    /// First trading day on or after `date`, looking at `max_days` candidates.
    pub fn first_trading_day_on_or_after(&self, date: NaiveDate, max_days: u32) -> Option<NaiveDate> {
        date.iter_days()
            .take(max_days as usize)
            .find(|d| self.is_trading_day(*d))
    }

    /// Trading days in `[start, end]`, ascending. Recomputed on every call.
    pub fn trading_days_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Iterator<Item = NaiveDate> + '_ {
        start
            .iter_days()
            .take_while(move |d| *d <= end)
            .filter(move |d| self.is_trading_day(*d))
    }

    /// Month-start and mid-month rebalance events for `count` months from
    /// the current month on the exchange's clock.
    pub fn next_rebalance_events(&self, count: u32) -> Vec<RebalanceEvent> {
        self.rebalance_events_from(exchange_today(), count)
    }

    /// Same as [`Self::next_rebalance_events`] with an explicit reference date.
    ///
    /// A half-month with no trading day in its first
    /// [`config::REBALANCE_SEARCH_DAYS`] days yields no event. `count` is
    /// capped at [`config::MAX_REBALANCE_MONTHS`].
    pub fn rebalance_events_from(&self, today: NaiveDate, count: u32) -> Vec<RebalanceEvent> {
        let Some(first_of_month) = today.with_day(1) else {
            return Vec::new();
        };

        let count = count.min(config::MAX_REBALANCE_MONTHS);
        let mut events = Vec::with_capacity(count as usize * 2);

        for offset in 0..count {
            let Some(month) = first_of_month.checked_add_months(Months::new(offset)) else {
                break;
            };

            for (day, kind) in [
                (config::MONTH_START_DAY, RebalanceKind::MonthStart),
                (config::MID_MONTH_DAY, RebalanceKind::MidMonth),
            ] {
                let Some(anchor) = month.with_day(day) else {
                    continue;
                };

                let Some(rebalance_date) =
                    self.first_trading_day_on_or_after(anchor, config::REBALANCE_SEARCH_DAYS)
                else {
                    debug!(%anchor, ?kind, "no trading day near anchor, skipping rebalance");
                    continue;
                };

                match self.previous_trading_day(rebalance_date) {
                    Ok(data_cutoff_date) => events.push(RebalanceEvent {
                        rebalance_date,
                        data_cutoff_date,
                        kind,
                    }),
                    Err(e) => warn!(%rebalance_date, error = %e, "dropping rebalance event"),
                }
            }
        }

        events.sort_by_key(|e| e.rebalance_date);
        events
    }

    /// First rebalance event on or after `today`, looking two months ahead.
    pub fn upcoming_rebalance(&self, today: NaiveDate) -> Option<RebalanceEvent> {
        self.rebalance_events_from(today, 2)
            .into_iter()
            .find(|e| e.rebalance_date >= today)
    }

    /// Cutoff to score against when no rebalance date is given: the cutoff of
    /// the upcoming rebalance, else the trading day before `today`.
    pub fn default_cutoff(&self, today: NaiveDate) -> Result<NaiveDate, ScanError> {
        match self.upcoming_rebalance(today) {
            Some(event) => Ok(event.data_cutoff_date),
            None => self.previous_trading_day(today),
        }
    }
}

/// Today's date in the exchange timezone.
pub fn exchange_today() -> NaiveDate {
    Utc::now().with_timezone(&config::EXCHANGE_TZ).date_naive()
}

/// Wall-clock time in the exchange timezone.
pub fn exchange_now() -> NaiveDateTime {
    Utc::now().with_timezone(&config::EXCHANGE_TZ).naive_local()
}

/// `date` shifted back by whole calendar months, clamped to month end.
pub fn months_before(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_sub_months(Months::new(months))
}

/// `date` shifted back by calendar days.
pub fn days_before(date: NaiveDate, days: u64) -> Option<NaiveDate> {
    date.checked_sub_days(Days::new(days))
}
