use super::bias::BiasRow;
use super::call_log::{Call, CallLogSummary, summarize};
use super::config::{EngineConfig, InstrumentProfile};
use super::models::{Instrument, SecurityType};
use super::state::{InstrumentSnapshot, SharedState, TradeLogEntry};
use crate::export::{self, ExportKind};

use anyhow::Result;
use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::info;

// -----------------------------------------------
// API REQUEST/RESPONSE MODELS
// -----------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    pub symbol: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub processing_time_ms: Option<u64>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T, start: Instant) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            processing_time_ms: Some(start.elapsed().as_millis() as u64),
        }
    }

    fn err(error: impl Into<String>, start: Instant) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            processing_time_ms: Some(start.elapsed().as_millis() as u64),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

#[derive(Debug, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub symbol: String,
    pub security_type: SecurityType,
    #[serde(flatten)]
    pub profile: InstrumentProfile,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallLogResponse {
    pub calls: Vec<Call>,
    pub summary: CallLogSummary,
}

// -----------------------------------------------
// APPLICATION STATE
// -----------------------------------------------

#[derive(Clone)]
pub struct AppState {
    store: SharedState,
    config: Arc<EngineConfig>,
}

impl AppState {
    pub fn new(store: SharedState, config: Arc<EngineConfig>) -> Self {
        Self { store, config }
    }

    /// Snapshot for `symbol`, or the status and message to answer with
    async fn snapshot(&self, symbol: &str) -> Result<InstrumentSnapshot, (StatusCode, String)> {
        let instrument: Instrument = symbol
            .parse()
            .map_err(|e: crate::error::AnalysisError| (StatusCode::BAD_REQUEST, e.to_string()))?;

        self.store
            .read()
            .await
            .snapshot(instrument)
            .ok_or_else(|| (StatusCode::NOT_FOUND, format!("{} is not tracked", instrument)))
    }
}

// -----------------------------------------------
// API HANDLERS
// -----------------------------------------------

/// Runs `project` over the snapshot for `symbol`
async fn with_snapshot<T, F>(app_state: &AppState, symbol: &str, project: F) -> ApiResult<T>
where
    F: FnOnce(InstrumentSnapshot) -> T,
{
    let start = Instant::now();
    match app_state.snapshot(symbol).await {
        Ok(snapshot) => (StatusCode::OK, Json(ApiResponse::ok(project(snapshot), start))),
        Err((status, message)) => (status, Json(ApiResponse::err(message, start))),
    }
}

/// GET /api/instruments
async fn get_instruments(State(app_state): State<AppState>) -> ApiResult<Vec<InstrumentInfo>> {
    let start = Instant::now();
    let tracked = app_state.store.read().await.instruments();

    let list = tracked
        .into_iter()
        .map(|i| InstrumentInfo {
            symbol: i.symbol().to_string(),
            security_type: i.security_type(),
            profile: app_state.config.profile(i),
        })
        .collect();

    (StatusCode::OK, Json(ApiResponse::ok(list, start)))
}

/// GET /api/state?symbol=NIFTY
async fn get_state(
    Query(query): Query<SymbolQuery>,
    State(app_state): State<AppState>,
) -> ApiResult<InstrumentSnapshot> {
    with_snapshot(&app_state, &query.symbol, |s| s).await
}

/// GET /api/bias?symbol=NIFTY
async fn get_bias(
    Query(query): Query<SymbolQuery>,
    State(app_state): State<AppState>,
) -> ApiResult<Vec<BiasRow>> {
    with_snapshot(&app_state, &query.symbol, |s| s.bias_table).await
}

/// GET /api/trade-log?symbol=NIFTY
async fn get_trade_log(
    Query(query): Query<SymbolQuery>,
    State(app_state): State<AppState>,
) -> ApiResult<Vec<TradeLogEntry>> {
    with_snapshot(&app_state, &query.symbol, |s| s.trade_log).await
}

/// GET /api/call-log?symbol=NIFTY
async fn get_call_log(
    Query(query): Query<SymbolQuery>,
    State(app_state): State<AppState>,
) -> ApiResult<CallLogResponse> {
    with_snapshot(&app_state, &query.symbol, |s| CallLogResponse {
        summary: summarize(&s.call_log),
        calls: s.call_log,
    })
    .await
}

async fn export_csv(app_state: &AppState, symbol: &str, kind: ExportKind) -> Response {
    let start = Instant::now();
    let snapshot = match app_state.snapshot(symbol).await {
        Ok(snapshot) => snapshot,
        Err((status, message)) => {
            return (status, Json(ApiResponse::<()>::err(message, start))).into_response();
        }
    };

    match export::render(&snapshot, kind) {
        Ok(csv) => ([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::<()>::err(format!("{:#}", e), start)),
        )
            .into_response(),
    }
}

/// GET /api/export/bias.csv?symbol=NIFTY
async fn export_bias(Query(query): Query<SymbolQuery>, State(app_state): State<AppState>) -> Response {
    export_csv(&app_state, &query.symbol, ExportKind::Bias).await
}

/// GET /api/export/trade-log.csv?symbol=NIFTY
async fn export_trade_log(Query(query): Query<SymbolQuery>, State(app_state): State<AppState>) -> Response {
    export_csv(&app_state, &query.symbol, ExportKind::TradeLog).await
}

/// GET /api/export/call-log.csv?symbol=NIFTY
async fn export_call_log(Query(query): Query<SymbolQuery>, State(app_state): State<AppState>) -> Response {
    export_csv(&app_state, &query.symbol, ExportKind::CallLog).await
}

// -----------------------------------------------
// SERVER SETUP
// -----------------------------------------------

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/instruments", get(get_instruments))
        .route("/api/state", get(get_state))
        .route("/api/bias", get(get_bias))
        .route("/api/trade-log", get(get_trade_log))
        .route("/api/call-log", get(get_call_log))
        .route("/api/export/bias.csv", get(export_bias))
        .route("/api/export/trade-log.csv", get(export_trade_log))
        .route("/api/export/call-log.csv", get(export_call_log))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub async fn start_server(port: u16, app_state: AppState) -> Result<()> {
    let app = router(app_state);

    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API server listening on http://{}", addr);
    println!("🚀 NSE Bias API running on http://{}", addr);
    println!("📋 Available endpoints:");
    println!("   GET  /api/instruments");
    println!("   GET  /api/state?symbol=NIFTY");
    println!("   GET  /api/bias?symbol=NIFTY");
    println!("   GET  /api/trade-log?symbol=NIFTY");
    println!("   GET  /api/call-log?symbol=NIFTY");
    println!("   GET  /api/export/bias.csv?symbol=NIFTY");
    println!("   GET  /api/export/trade-log.csv?symbol=NIFTY");
    println!("   GET  /api/export/call-log.csv?symbol=NIFTY");
    println!();

    axum::serve(listener, app).await?;
    Ok(())
}
