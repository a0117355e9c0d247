use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_core::stream::Stream;
use macrodash_core::calendar::CalendarSnapshot;
use macrodash_core::candles::CandleSnapshot;
use macrodash_core::events::RefreshReason;
use macrodash_core::intraday::IntradaySeries;
use macrodash_core::tabs::RefreshOutcome;
use macrodash_core::{DashboardStatus, TabConfig, TabTiles, Timeframe};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    config::Config,
    error::{ApiError, ApiResult},
    events::event_name,
    main_lib::AppState,
};

pub async fn healthz() -> &'static str {
    "ok"
}

#[derive(Deserialize, Default)]
struct TimeframeQuery {
    timeframe: Option<Timeframe>,
}

#[derive(Deserialize, Default)]
struct ForceQuery {
    #[serde(default)]
    force: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActiveTabRequest {
    tab: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActiveTabResponse {
    active_tab: String,
    refresh_triggered: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[serde(default)]
    force: bool,
    #[serde(default)]
    all_tabs: bool,
}

#[derive(Deserialize)]
struct VisibilityRequest {
    visible: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearCacheResponse {
    removed: usize,
}

async fn list_tabs(State(state): State<Arc<AppState>>) -> Json<Vec<TabConfig>> {
    Json(state.dashboard.tabs().to_vec())
}

async fn get_tiles(
    Path(tab): Path<String>,
    Query(query): Query<TimeframeQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<TabTiles>> {
    let timeframe = query.timeframe.unwrap_or_default();
    Ok(Json(state.dashboard.tiles(&tab, timeframe)?))
}

async fn get_candles(
    Path((tab, symbol)): Path<(String, String)>,
    Query(query): Query<TimeframeQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<CandleSnapshot>> {
    let timeframe = query.timeframe.unwrap_or_default();
    Ok(Json(state.dashboard.candles(&tab, &symbol, timeframe)?))
}

async fn open_detail(
    Path((tab, symbol)): Path<(String, String)>,
    Query(query): Query<TimeframeQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Option<IntradaySeries>>> {
    let range = query.timeframe.unwrap_or_default();
    Ok(Json(state.dashboard.open_detail(&tab, &symbol, range).await?))
}

async fn close_detail(State(state): State<Arc<AppState>>) -> StatusCode {
    state.dashboard.close_detail();
    StatusCode::NO_CONTENT
}

async fn set_active_tab(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ActiveTabRequest>,
) -> ApiResult<Json<ActiveTabResponse>> {
    if body.tab.trim().is_empty() {
        return Err(ApiError::BadRequest("tab is required".to_string()));
    }
    let refresh_triggered = state.dashboard.set_active_tab(body.tab.trim())?;
    Ok(Json(ActiveTabResponse {
        active_tab: state.dashboard.status().active_tab,
        refresh_triggered,
    }))
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RefreshRequest>>,
) -> ApiResult<Json<RefreshOutcome>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let outcome = if request.all_tabs {
        state
            .dashboard
            .refresh_all(request.force, RefreshReason::Manual)
            .await?
    } else {
        state
            .dashboard
            .refresh_active_tab(request.force, RefreshReason::Manual)
            .await?
    };
    Ok(Json(outcome))
}

async fn set_visibility(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VisibilityRequest>,
) -> StatusCode {
    state.dashboard.set_visibility(body.visible);
    StatusCode::NO_CONTENT
}

/// Drops the candle tiers and discovery table, then force-refreshes the
/// active tab in the background.
async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<ClearCacheResponse> {
    let removed = state.dashboard.clear_macro_cache();
    let dashboard = state.dashboard.clone();
    tokio::spawn(async move {
        if let Err(e) = dashboard
            .refresh_active_tab(true, RefreshReason::Manual)
            .await
        {
            tracing::warn!("Refresh after cache clear failed: {}", e);
        }
    });
    Json(ClearCacheResponse { removed })
}

async fn get_calendar(
    Query(query): Query<ForceQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<CalendarSnapshot>> {
    Ok(Json(state.dashboard.calendar(query.force).await?))
}

async fn reset_calendar(State(state): State<Arc<AppState>>) -> StatusCode {
    state.dashboard.reset_calendar_cache();
    StatusCode::NO_CONTENT
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<DashboardStatus> {
    Json(state.dashboard.status())
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = BroadcastStream::new(state.event_bus.subscribe());
    let stream = tokio_stream::StreamExt::filter_map(receiver, |event| match event {
        Ok(evt) => match SseEvent::default().event(event_name(&evt)).json_data(&evt) {
            Ok(sse_event) => Some(Ok(sse_event)),
            Err(err) => {
                tracing::error!("Failed to serialize SSE payload: {}", err);
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(_)) => None,
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

pub fn app_router(state: Arc<AppState>, config: &Config) -> Router {
    let cors = if config.cors_allow.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = config
            .cors_allow
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(origins)
    };

    let api = Router::new()
        .route("/healthz", get(healthz))
        .route("/tabs", get(list_tabs))
        .route("/tabs/active", post(set_active_tab))
        .route("/tabs/{id}/tiles", get(get_tiles))
        .route("/tabs/{id}/candles/{symbol}", get(get_candles))
        .route("/tabs/{id}/detail/{symbol}", get(open_detail))
        .route("/detail", axum::routing::delete(close_detail))
        .route("/refresh", post(refresh))
        .route("/visibility", post(set_visibility))
        .route("/cache/clear", post(clear_cache))
        .route("/calendar", get(get_calendar).delete(reset_calendar))
        .route("/status", get(get_status))
        .route("/events/stream", get(stream_events));

    Router::new()
        .nest("/api", api)
        .with_state(state)
        .layer(cors)
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
}
