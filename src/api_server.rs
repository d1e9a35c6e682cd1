use crate::app_config::AppConfig;
use crate::cache::{ScanCache, ScanKey, SeriesCache};
use crate::calendar::{TradingCalendar, exchange_now, exchange_today};
use crate::config;
use crate::error::ScanError;
use crate::export::{self, ScanFile};
use crate::models::{RebalanceEvent, ScoreRecord, Strategy};
use crate::pipeline::{self, ScanOutcome};
use crate::provider::HistorySource;
use crate::ranking::{AllocationDecision, ScanParams, SkippedSymbol};
use crate::universe::load_stock_list;
use anyhow::Result;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

// -----------------------------------------------
// API REQUEST/RESPONSE MODELS
// -----------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RebalanceQuery {
    pub count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanQuery {
    pub strategy: Option<String>,
    pub num_stocks: Option<i64>,
    pub lookback_months: Option<i64>,
    pub exclude_months: Option<i64>,
    pub cutoff_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub processing_time_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T, start_time: Instant) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            processing_time_ms: Some(start_time.elapsed().as_millis() as u64),
        })
    }

    fn err(error: impl ToString, start_time: Instant) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            processing_time_ms: Some(start_time.elapsed().as_millis() as u64),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub symbols: usize,
    pub cached_series: usize,
    pub cache_cutoff: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RebalanceResponse {
    pub today: NaiveDate,
    pub upcoming: Option<RebalanceEvent>,
    pub events: Vec<RebalanceEvent>,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub cutoff_date: NaiveDate,
    pub strategy: Strategy,
    pub lookback_months: u32,
    pub exclude_months: u32,
    pub results: Vec<ScoreRecord>,
    pub count: usize,
    pub scored: usize,
    pub skipped: Vec<SkippedSymbol>,
    pub allocation: AllocationDecision,
    pub filename: String,
    pub cached: bool,
}

impl ScanResponse {
    fn new(outcome: ScanOutcome, filename: String, cached: bool) -> Self {
        let ScanOutcome { scan, allocation } = outcome;
        Self {
            cutoff_date: scan.cutoff_date,
            strategy: scan.params.strategy,
            lookback_months: scan.params.lookback_months,
            exclude_months: scan.params.exclude_recent_months,
            count: scan.records.len(),
            results: scan.records,
            scored: scan.scored,
            skipped: scan.skipped,
            allocation,
            filename,
            cached,
        }
    }
}

// -----------------------------------------------
// APPLICATION STATE
// -----------------------------------------------

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    calendar: Arc<TradingCalendar>,
    symbols: Arc<Vec<String>>,
    provider: Arc<HistorySource>,
    series: Arc<RwLock<SeriesCache>>,
    scans: Arc<RwLock<ScanCache>>,
}

impl AppState {
    pub fn new(cfg: AppConfig) -> Result<Self> {
        let calendar = cfg.calendar()?;
        let symbols = load_stock_list(&cfg.stock_list)?;
        let provider = cfg.history_source()?;
        let series = SeriesCache::load(&cfg.cache_file).unwrap_or_else(|e| {
            warn!(error = %e, "unreadable cache, starting fresh");
            SeriesCache::default()
        });

        info!(symbols = symbols.len(), cached = series.len(), "api state ready");

        Ok(Self {
            config: Arc::new(cfg),
            calendar: Arc::new(calendar),
            symbols: Arc::new(symbols),
            provider: Arc::new(provider),
            series: Arc::new(RwLock::new(series)),
            scans: Arc::new(RwLock::new(ScanCache::default())),
        })
    }

    fn scan_params(&self, query: &ScanQuery) -> Result<ScanParams, ScanError> {
        let defaults = self.config.params;
        let strategy = match &query.strategy {
            Some(raw) => raw.parse::<Strategy>()?,
            None => defaults.strategy,
        };
        ScanParams::try_new(
            strategy,
            query.num_stocks.unwrap_or(defaults.num_stocks as i64),
            query.lookback_months.unwrap_or(defaults.lookback_months as i64),
            query.exclude_months.unwrap_or(defaults.exclude_recent_months as i64),
        )
    }

    fn cutoff_date(&self, query: &ScanQuery) -> Result<NaiveDate, ScanError> {
        match &query.cutoff_date {
            Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| ScanError::InvalidConfig(format!("cutoff_date must be YYYY-MM-DD, got '{}'", raw))),
            None => match self.config.cutoff_date {
                Some(cutoff) => Ok(cutoff),
                None => self.calendar.default_cutoff(exchange_today()),
            },
        }
    }

    async fn run_scan(&self, query: &ScanQuery) -> Result<ScanResponse, ScanError> {
        let params = self.scan_params(query)?;
        let cutoff_date = self.cutoff_date(query)?;
        let key = ScanKey::new(cutoff_date, &params);

        {
            let scans = self.scans.read().await;
            if let Some(memo) = scans.get(&key) {
                return Ok(ScanResponse::new(memo.outcome.clone(), memo.file_name.clone(), true));
            }
        }

        let summary = pipeline::refresh_shared(
            self.provider.as_ref(),
            &self.series,
            &self.symbols,
            &self.config.allocation,
            cutoff_date,
        )
        .await;

        let outcome = {
            let series = self.series.read().await;
            if summary.fetched > 0 {
                if let Err(e) = series.save(&self.config.cache_file) {
                    warn!(error = %e, "failed to save series cache");
                }
            }
            pipeline::score_cached(&series, &self.symbols, cutoff_date, &params, &self.config.allocation)?
        };

        let file_name = export::write_scan(
            &self.config.output_dir,
            &outcome.scan,
            Some(&outcome.allocation),
            exchange_now(),
        )?;

        self.scans.write().await.insert(outcome.clone(), file_name.clone());
        Ok(ScanResponse::new(outcome, file_name, false))
    }
}

// -----------------------------------------------
// API HANDLERS
// -----------------------------------------------

/// GET /api/health - Universe and cache status
async fn get_health(State(app_state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let start_time = Instant::now();
    let series = app_state.series.read().await;

    ApiResponse::ok(
        HealthResponse {
            status: "ok".to_string(),
            symbols: app_state.symbols.len(),
            cached_series: series.len(),
            cache_cutoff: series.cutoff_date(),
        },
        start_time,
    )
}

/// GET /api/rebalance-dates?count=3 - Rebalance events for the next `count` months
async fn get_rebalance_dates(
    Query(query): Query<RebalanceQuery>,
    State(app_state): State<AppState>,
) -> Json<ApiResponse<RebalanceResponse>> {
    let start_time = Instant::now();
    let count = query.count.unwrap_or(app_state.config.rebalance_months);

    if !(1..=config::MAX_REBALANCE_MONTHS).contains(&count) {
        return ApiResponse::err(
            format!("count must be between 1 and {}, got {}", config::MAX_REBALANCE_MONTHS, count),
            start_time,
        );
    }

    let today = exchange_today();
    ApiResponse::ok(
        RebalanceResponse {
            today,
            upcoming: app_state.calendar.upcoming_rebalance(today),
            events: app_state.calendar.rebalance_events_from(today, count),
        },
        start_time,
    )
}

/// GET /api/scan?strategy=volatility&num_stocks=20 - Rank the universe
async fn get_scan(
    Query(query): Query<ScanQuery>,
    State(app_state): State<AppState>,
) -> Json<ApiResponse<ScanResponse>> {
    let start_time = Instant::now();

    match app_state.run_scan(&query).await {
        Ok(response) => ApiResponse::ok(response, start_time),
        Err(e) => {
            warn!(error = %e, "scan request failed");
            ApiResponse::err(e, start_time)
        }
    }
}

/// GET /api/files - Saved scans, newest first
async fn get_files(State(app_state): State<AppState>) -> Json<ApiResponse<Vec<ScanFile>>> {
    let start_time = Instant::now();

    match export::list_scan_files(&app_state.config.output_dir) {
        Ok(files) => ApiResponse::ok(files, start_time),
        Err(e) => ApiResponse::err(e, start_time),
    }
}

/// GET /data/{file} - Raw contents of a saved scan
async fn get_data_file(Path(file): Path<String>, State(app_state): State<AppState>) -> Response {
    match export::read_scan_file(&app_state.config.output_dir, &file) {
        Ok(Some(body)) => {
            let content_type = if file.ends_with(".json") {
                "application/json"
            } else {
                "text/csv; charset=utf-8"
            };
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "file not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(get_health))
        .route("/api/rebalance-dates", get(get_rebalance_dates))
        .route("/api/scan", get(get_scan))
        .route("/api/files", get(get_files))
        .route("/data/{file}", get(get_data_file))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub async fn start_server(cfg: AppConfig) -> Result<()> {
    let port = cfg.port;
    let app = router(AppState::new(cfg)?);

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("🚀 Momentum Scanner API running on http://{}", addr);
    println!("📋 Available endpoints:");
    println!("   GET  /api/health");
    println!("   GET  /api/rebalance-dates?count=3");
    println!("   GET  /api/scan?strategy=volatility&num_stocks=20&lookback_months=12&exclude_months=0");
    println!("   GET  /api/files");
    println!("   GET  /data/{{file}}");
    println!();

    info!(%addr, "api server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
