use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::db::models::{
    CheckIn, CheckInFilter, CheckInStatistics, CreateCheckInInput, EscalateInput, FeedEntry,
    FeedFilter, RespondInput, SkipInput, StatsScope,
};
use crate::db::repos::{checkins, stats};
use crate::error::AppError;
use crate::http::AppState;

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<CheckInFilter>,
) -> Result<Json<Vec<CheckIn>>, AppError> {
    Ok(Json(checkins::list(&state.pool, &filter)?))
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub user_id: Option<String>,
    pub task_id: Option<String>,
}

pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<CheckIn>>, AppError> {
    let filter = CheckInFilter {
        status: Some("pending".into()),
        user_id: query.user_id,
        task_id: query.task_id,
        ..Default::default()
    };
    Ok(Json(checkins::list(&state.pool, &filter)?))
}

pub async fn statistics(
    State(state): State<Arc<AppState>>,
    Query(scope): Query<StatsScope>,
) -> Result<Json<CheckInStatistics>, AppError> {
    Ok(Json(stats::statistics(&state.pool, &scope)?))
}

pub async fn feed(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<FeedFilter>,
) -> Result<Json<Vec<FeedEntry>>, AppError> {
    let now = Utc::now().to_rfc3339();
    Ok(Json(stats::manager_feed(&state.pool, &filter, &now)?))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CheckIn>, AppError> {
    Ok(Json(checkins::get_by_id(&state.pool, &id)?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCheckInInput>,
) -> Result<(StatusCode, Json<CheckIn>), AppError> {
    let created = state.engine.create(&input, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn respond(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<RespondInput>,
) -> Result<Json<CheckIn>, AppError> {
    Ok(Json(state.engine.respond(&id, &input, Utc::now()).await?))
}

pub async fn skip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<SkipInput>,
) -> Result<Json<CheckIn>, AppError> {
    Ok(Json(state.engine.skip(&id, &input, Utc::now()).await?))
}

pub async fn escalate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<EscalateInput>,
) -> Result<Json<CheckIn>, AppError> {
    Ok(Json(state.engine.escalate(&id, &input, Utc::now()).await?))
}
