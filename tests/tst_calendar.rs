use momentum_scanner::calendar::months_before;
use momentum_scanner::{HolidaySet, RebalanceKind, ScanError, TradingCalendar};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, Weekday};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_weekends_and_holidays_are_closed() {
        let holidays = HolidaySet::new([d(2025, 10, 2), d(2025, 10, 21)]);
        let calendar = TradingCalendar::new(holidays.clone());

        let mut date = d(2025, 10, 1);
        while date <= d(2025, 10, 31) {
            let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
            let expected = !weekend && !holidays.contains(date);
            assert_eq!(calendar.is_trading_day(date), expected, "{}", date);
            date = date.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_previous_trading_day_skips_weekend_and_holiday() {
        // Mon 2025-10-20, holiday Tue 2025-10-21
        let calendar = TradingCalendar::new(HolidaySet::new([d(2025, 10, 21)]));
        assert_eq!(calendar.previous_trading_day(d(2025, 10, 22)).unwrap(), d(2025, 10, 20));
        assert_eq!(calendar.previous_trading_day(d(2025, 10, 20)).unwrap(), d(2025, 10, 17));
    }

    #[test]
    fn test_previous_trading_day_gives_up() {
        let closed = (1..=31).map(|day| d(2025, 12, day));
        let calendar = TradingCalendar::new(HolidaySet::new(closed));
        let err = calendar.previous_trading_day(d(2026, 1, 1)).unwrap_err();
        assert!(matches!(err, ScanError::NoTradingDay { .. }));
    }

    #[test]
    fn test_events_sorted_with_cutoffs_strictly_before() {
        let calendar = TradingCalendar::new(HolidaySet::embedded());
        let events = calendar.rebalance_events_from(d(2025, 1, 10), 12);

        assert_eq!(events.len(), 24);
        for pair in events.windows(2) {
            assert!(pair[0].rebalance_date < pair[1].rebalance_date);
        }
        for event in &events {
            assert!(calendar.is_trading_day(event.rebalance_date));
            assert!(calendar.is_trading_day(event.data_cutoff_date));
            assert!(event.data_cutoff_date < event.rebalance_date);
        }
    }

    #[test]
    fn test_next_rebalance_events_from_exchange_clock() {
        let calendar = TradingCalendar::new(HolidaySet::embedded());
        let events = calendar.next_rebalance_events(3);

        assert_eq!(events.len(), 6);
        assert!(events.windows(2).all(|p| p[0].rebalance_date < p[1].rebalance_date));
        assert!(events.iter().all(|e| e.data_cutoff_date < e.rebalance_date));
        assert_eq!(events[0].kind, RebalanceKind::MonthStart);
    }

    #[test]
    fn test_event_count_is_capped() {
        let calendar = TradingCalendar::new(HolidaySet::embedded());
        let events = calendar.rebalance_events_from(d(2025, 1, 10), u32::MAX);

        assert_eq!(events.len(), 48);
        assert_eq!(events.last().unwrap().rebalance_date, d(2026, 12, 15));
    }

    #[test]
    fn test_holiday_moves_rebalance_forward() {
        // 2025-10-01 is a Wednesday, made a holiday here
        let calendar = TradingCalendar::new(HolidaySet::new([d(2025, 10, 1)]));
        let events = calendar.rebalance_events_from(d(2025, 10, 1), 1);

        assert_eq!(events[0].kind, RebalanceKind::MonthStart);
        assert_eq!(events[0].rebalance_date, d(2025, 10, 2));
        assert_eq!(events[0].data_cutoff_date, d(2025, 9, 30));
        // 2025-10-15 is a Wednesday
        assert_eq!(events[1].kind, RebalanceKind::MidMonth);
        assert_eq!(events[1].rebalance_date, d(2025, 10, 15));
        assert_eq!(events[1].data_cutoff_date, d(2025, 10, 14));
    }

    #[test]
    fn test_default_cutoff_follows_upcoming_rebalance() {
        let calendar = TradingCalendar::default();
        // Mon 2025-12-08: next is Mon 2025-12-15, cutoff Fri 2025-12-12
        assert_eq!(calendar.default_cutoff(d(2025, 12, 8)).unwrap(), d(2025, 12, 12));
    }

    #[test]
    fn test_months_before_clamps_to_month_end() {
        assert_eq!(months_before(d(2025, 3, 31), 1), Some(d(2025, 2, 28)));
        assert_eq!(months_before(d(2024, 3, 31), 1), Some(d(2024, 2, 29)));
        assert_eq!(months_before(d(2025, 12, 15), 12), Some(d(2024, 12, 15)));
    }
}
