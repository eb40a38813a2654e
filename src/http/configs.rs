use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::db::models::{CheckInConfig, CreateConfigInput, UpdateConfigInput};
use crate::db::repos::configs;
use crate::error::AppError;
use crate::http::AppState;

#[derive(Debug, Deserialize)]
pub struct OrgQuery {
    pub org_id: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrgQuery>,
) -> Result<Json<Vec<CheckInConfig>>, AppError> {
    let org_id = query.org_id.unwrap_or_else(|| state.org_id.clone());
    Ok(Json(configs::list(&state.pool, &org_id)?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(mut input): Json<CreateConfigInput>,
) -> Result<(StatusCode, Json<CheckInConfig>), AppError> {
    if input.org_id.trim().is_empty() {
        input.org_id = state.org_id.clone();
    }
    let created = configs::create(&state.pool, input)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CheckInConfig>, AppError> {
    Ok(Json(configs::get_by_id(&state.pool, &id)?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<UpdateConfigInput>,
) -> Result<Json<CheckInConfig>, AppError> {
    Ok(Json(configs::update(&state.pool, &id, input)?))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if configs::delete(&state.pool, &id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Config {id}")))
    }
}
