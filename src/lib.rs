pub mod api_server;
pub mod app_config;
pub mod cache;
pub mod calendar;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod ranking;
pub mod scorer;
pub mod universe;

// Re-exports for convenience
pub use calendar::{HolidaySet, TradingCalendar};
pub use error::{ScanError, ScoreError};
pub use models::{
    MomentumMetrics, PriceBar, PriceSeries, RebalanceEvent, RebalanceKind, ScoreRecord, Strategy, SymbolSeries,
};
pub use ranking::{AllocationDecision, AllocationRule, RankedScan, ScanParams, rank_universe};
pub use scorer::MomentumScorer;
