use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};
use chrono::NaiveDate;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_admin;

use crate::models::{CreateTimeBlockRequest, UpdateSettingsRequest, UpsertBusinessHoursRequest};
use crate::services::{AvailabilityService, ScheduleService};

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub duration_minutes: i64,
    pub available_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TimeBlockQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let mut slots = availability_service
        .compute_slots(query.date, query.duration_minutes)
        .await?;

    let total_slots = slots.len();
    let available_slots = slots.iter().filter(|slot| slot.available).count();

    if query.available_only.unwrap_or(false) {
        slots.retain(|slot| slot.available);
    }

    Ok(Json(json!({
        "date": query.date,
        "duration_minutes": query.duration_minutes,
        "slots": slots,
        "total_slots": total_slots,
        "available_slots": available_slots
    })))
}

#[axum::debug_handler]
pub async fn list_business_hours(
    State(state): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let schedule_service = ScheduleService::new(&state);

    let business_hours = schedule_service
        .list_business_hours(state.service_key())
        .await?;

    Ok(Json(json!({
        "business_hours": business_hours
    })))
}

#[axum::debug_handler]
pub async fn get_settings(
    State(state): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let settings = availability_service.get_settings().await?;

    Ok(Json(json!(settings)))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn upsert_business_hours(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(day_of_week): Path<i32>,
    Json(request): Json<UpsertBusinessHoursRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let schedule_service = ScheduleService::new(&state);
    let business_hours = schedule_service
        .upsert_business_hours(day_of_week, request, auth.token())
        .await?;

    Ok(Json(json!(business_hours)))
}

#[axum::debug_handler]
pub async fn update_settings(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let current = AvailabilityService::new(&state).get_settings().await?;
    let settings = ScheduleService::new(&state)
        .update_settings(current, request, auth.token())
        .await?;

    Ok(Json(json!(settings)))
}

#[axum::debug_handler]
pub async fn list_time_blocks(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<TimeBlockQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let blocks = ScheduleService::new(&state)
        .list_time_blocks(query.from, query.to, auth.token())
        .await?;

    Ok(Json(json!({
        "time_blocks": blocks,
        "total": blocks.len()
    })))
}

#[axum::debug_handler]
pub async fn create_time_block(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateTimeBlockRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let block = ScheduleService::new(&state)
        .create_time_block(request, auth.token())
        .await?;

    Ok(Json(json!(block)))
}

#[axum::debug_handler]
pub async fn delete_time_block(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(block_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    ScheduleService::new(&state)
        .delete_time_block(block_id, auth.token())
        .await?;

    Ok(Json(json!({
        "deleted": true,
        "id": block_id
    })))
}
