// HTTP request handlers
use crate::application::aggregation_service::SeriesRequest;
use crate::application::selection_store::Selection;
use crate::domain::resolution::Resolution;
use crate::presentation::app_state::AppState;
use crate::presentation::dto::{
    cache_stats_to_dto, consumption_to_dto, merged_to_dto, series_to_dto, CacheStatsResponse,
    ConsumptionResponse, InvalidateResponse, MergedResponse, SeriesResponse,
};
use crate::presentation::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    /// Comma-separated entity ids, in display order.
    pub entities: String,
    pub metric: String,
    /// Comma-separated `YYYY-MM-DD` dates.
    pub dates: String,
    pub resolution: Option<String>,
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConsumptionQuery {
    pub metric: String,
    pub start: i64,
    pub end: i64,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn get_series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<SeriesResponse>> {
    let request = series_request(&query)?;
    let aggregated = state.aggregation_service.get_aggregated_series(&request).await?;
    Ok(Json(series_to_dto(aggregated)))
}

pub async fn get_merged_series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<MergedResponse>> {
    let request = series_request(&query)?;
    let merged = state.aggregation_service.get_merged_view(&request).await?;
    Ok(Json(merged_to_dto(merged)))
}

pub async fn get_consumption(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Query(query): Query<ConsumptionQuery>,
) -> ApiResult<Json<ConsumptionResponse>> {
    let period = state
        .aggregation_service
        .get_period_consumption(&entity_id, &query.metric, query.start, query.end)
        .await?;
    Ok(Json(consumption_to_dto(period)))
}

pub async fn invalidate_entity(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Json<InvalidateResponse> {
    let removed = state.aggregation_service.invalidate(&entity_id);
    tracing::info!("Invalidated {} cached queries for {}", removed, entity_id);
    Json(InvalidateResponse { entity_id, removed })
}

pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStatsResponse> {
    Json(cache_stats_to_dto(state.aggregation_service.cache_stats()))
}

pub async fn get_selection(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> ApiResult<Json<Selection>> {
    state
        .selection_service
        .load(&key)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("selection {}", key)))
}

pub async fn put_selection(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(selection): Json<Selection>,
) -> ApiResult<StatusCode> {
    state.selection_service.save(&key, &selection).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_selection(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> StatusCode {
    if state.selection_service.clear(&key).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

fn series_request(query: &SeriesQuery) -> Result<SeriesRequest, ApiError> {
    let entity_ids = split_list(&query.entities);
    if entity_ids.is_empty() {
        return Err(ApiError::BadRequest("no entities selected".to_string()));
    }

    let dates = split_list(&query.dates)
        .iter()
        .map(|d| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| ApiError::BadRequest(format!("invalid date '{}'", d)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let resolution = query
        .resolution
        .as_deref()
        .map(|r| r.parse::<Resolution>().map_err(|_| ApiError::BadRequest(format!("invalid resolution '{}'", r))))
        .transpose()?;

    Ok(SeriesRequest::new(entity_ids, query.metric.clone(), dates)
        .with_resolution(resolution)
        .strict(query.strict))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
