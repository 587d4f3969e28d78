//! Endpoint handlers and their query parameters.

use std::sync::Arc;

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::response::ApiResponse;
use super::AppState;
use crate::analytics::{
    ChannelActivity, ChannelActivityQuery, DashboardData, DetectionSummary, TopProduct, TopProductsQuery,
};
use crate::models::{Channel, DateRange, MessageSearch, StoredDetection};
use crate::reports::{ReportService, SearchResult};
use crate::validation::InputValidator;

type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

// --- Query structs ---

const fn default_limit() -> i64 {
    10
}
const fn default_days() -> i64 {
    30
}
const fn default_min_mentions() -> i64 {
    3
}
const fn default_true() -> bool {
    true
}
const fn default_page() -> i64 {
    1
}
const fn default_page_size() -> i64 {
    20
}
const fn default_detection_limit() -> i64 {
    50
}
const fn default_dashboard_days() -> i64 {
    7
}

/// Query of `GET /api/reports/top-products`
#[derive(Debug, Deserialize)]
pub struct TopProductsParams {
    #[serde(default = "default_limit")]
    limit: i64,
    channel: Option<String>,
    #[serde(default = "default_days")]
    days: i64,
    #[serde(default = "default_min_mentions")]
    min_mentions: i64,
}

/// Query of `GET /api/channels/{name}/activity`
#[derive(Debug, Deserialize)]
pub struct ActivityParams {
    #[serde(default = "default_days")]
    days: i64,
    #[serde(default = "default_true")]
    include_keywords: bool,
    #[serde(default = "default_limit")]
    keyword_limit: i64,
}

/// Query of `GET /api/search/messages`
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    query: Option<String>,
    channel: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    has_media: Option<bool>,
    min_views: Option<i64>,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

/// Query of `GET /api/channels/{name}/detections`
#[derive(Debug, Deserialize)]
pub struct DetectionParams {
    #[serde(default = "default_detection_limit")]
    limit: i64,
}

/// Query of `GET /api/analytics/dashboard`
#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    #[serde(default = "default_dashboard_days")]
    days: i64,
}

// --- Helpers ---

/// Check `min..=max` and narrow to `u32`
fn bounded(field: &str, value: i64, min: i64, max: i64) -> Result<u32, ApiError> {
    InputValidator::validate_range(field, value, min, max)?;
    u32::try_from(value).map_err(|_| ApiError::Validation(format!("{field} is out of range")))
}

fn at_least(field: &str, value: i64, min: i64) -> Result<u32, ApiError> {
    InputValidator::validate_min(field, value, min)?;
    u32::try_from(value).map_err(|_| ApiError::Validation(format!("{field} is too large")))
}

fn channel_param(channel: Option<String>) -> Result<Option<String>, ApiError> {
    match channel {
        Some(name) if !name.is_empty() => {
            InputValidator::validate_channel_name(&name)?;
            Ok(Some(name))
        }
        _ => Ok(None),
    }
}

/// Run a blocking report on the blocking pool
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ReportService) -> crate::error::Result<T> + Send + 'static,
{
    let reports = state.reports.clone();
    let result = tokio::task::spawn_blocking(move || f(&reports)).await?;
    Ok(result?)
}

// --- Handlers ---

/// `GET /health`
pub async fn health() -> ApiResponse<serde_json::Value> {
    ApiResponse::ok(
        "API is healthy",
        json!({ "status": "ok", "timestamp": Utc::now() }),
    )
}

/// `GET /api/reports/top-products`
pub async fn top_products(
    State(state): State<Arc<AppState>>,
    params: Result<Query<TopProductsParams>, QueryRejection>,
) -> ApiResult<Vec<TopProduct>> {
    let Query(params) = params?;
    let query = TopProductsQuery {
        limit: bounded("limit", params.limit, 1, 100)? as usize,
        days: bounded("days", params.days, 1, 365)?,
        min_mentions: at_least("min_mentions", params.min_mentions, 1)? as usize,
        channel: channel_param(params.channel)?,
    };

    let products = blocking(&state, move |reports| reports.top_products(&query)).await?;
    let count = products.len();
    Ok(ApiResponse::ok(format!("Retrieved top {count} products"), products).with_total(count))
}

/// `GET /api/channels/{name}/activity`
pub async fn channel_activity(
    State(state): State<Arc<AppState>>,
    channel: Result<Path<String>, PathRejection>,
    params: Result<Query<ActivityParams>, QueryRejection>,
) -> ApiResult<ChannelActivity> {
    let Path(channel) = channel?;
    let Query(params) = params?;
    InputValidator::validate_channel_name(&channel)?;
    let query = ChannelActivityQuery {
        days: bounded("days", params.days, 1, 365)?,
        include_keywords: params.include_keywords,
        keyword_limit: bounded("keyword_limit", params.keyword_limit, 1, 50)? as usize,
    };

    let name = channel.clone();
    let activity = blocking(&state, move |reports| reports.channel_activity(&name, &query)).await?;
    Ok(ApiResponse::ok(format!("Retrieved activity for channel {channel}"), activity))
}

/// `GET /api/search/messages`
pub async fn search_messages(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<SearchResult> {
    let Query(params) = params?;

    let query = params.query.unwrap_or_default();
    InputValidator::validate_search_query(&query)?;
    let start = params
        .start_date
        .as_deref()
        .map(|v| InputValidator::parse_date("start_date", v))
        .transpose()?;
    let end = params
        .end_date
        .as_deref()
        .map(|v| InputValidator::parse_date("end_date", v))
        .transpose()?;
    InputValidator::validate_date_range(start, end)?;
    if let Some(min_views) = params.min_views {
        InputValidator::validate_min("min_views", min_views, 0)?;
    }

    let search = MessageSearch {
        query,
        channel: channel_param(params.channel)?,
        date_range: DateRange { start, end },
        has_media: params.has_media,
        min_views: params.min_views,
        page: at_least("page", params.page, 1)?,
        page_size: bounded("page_size", params.page_size, 1, 100)?,
    };

    let result = blocking(&state, move |reports| reports.search_messages(&search)).await?;
    Ok(ApiResponse::ok(
        format!("Found {} messages matching query", result.total_count),
        result,
    ))
}

/// `GET /api/channels`
pub async fn list_channels(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Channel>> {
    let channels = blocking(&state, ReportService::list_channels).await?;
    let count = channels.len();
    Ok(ApiResponse::ok(format!("Retrieved {count} channels"), channels).with_total(count))
}

/// `GET /api/detections/summary`
pub async fn detection_summary(State(state): State<Arc<AppState>>) -> ApiResult<DetectionSummary> {
    let summary = blocking(&state, ReportService::detection_summary).await?;
    Ok(ApiResponse::ok("Retrieved detection summary", summary))
}

/// `GET /api/channels/{name}/detections`
pub async fn channel_detections(
    State(state): State<Arc<AppState>>,
    channel: Result<Path<String>, PathRejection>,
    params: Result<Query<DetectionParams>, QueryRejection>,
) -> ApiResult<Vec<StoredDetection>> {
    let Path(channel) = channel?;
    let Query(params) = params?;
    InputValidator::validate_channel_name(&channel)?;
    let limit = bounded("limit", params.limit, 1, 200)?;

    let name = channel.clone();
    let detections = blocking(&state, move |reports| reports.channel_detections(&name, limit)).await?;
    let count = detections.len();
    Ok(
        ApiResponse::ok(format!("Retrieved {count} detections for {channel}"), detections)
            .with_total(count),
    )
}

/// `GET /api/analytics/dashboard`
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    params: Result<Query<DashboardParams>, QueryRejection>,
) -> ApiResult<DashboardData> {
    let Query(params) = params?;
    let days = bounded("days", params.days, 1, 90)?;

    let data = blocking(&state, move |reports| reports.dashboard(days)).await?;
    Ok(ApiResponse::ok("Retrieved dashboard data", data))
}

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Resource not found".to_string())
}
