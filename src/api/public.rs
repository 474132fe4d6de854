//! Unauthenticated booking surface used by the salon's booking page.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use ulid::Ulid;

use crate::engine::{BookingDraft, DaySlots, SlotQuery};

use super::AppState;
use super::error::{ApiError, ApiResult, booked};
use super::views::{AppointmentView, AvailabilityView, SlotView};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/public/{slug}/book", post(book))
        .route("/api/v1/public/{slug}/availability", get(availability))
}

/// Unwrap a JSON body, reporting unparseable input as `INVALID_FIELD`.
pub(super) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::invalid_field("body", e.body_text()))
}

/// POST /api/v1/public/{slug}/book
async fn book(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    payload: Result<Json<BookingDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AppointmentView>)> {
    let draft = json_body(payload)?;
    let engine = state.salons.by_slug(&slug).await?;
    let appointment = booked(engine.book(draft).await?)?;
    Ok((StatusCode::CREATED, Json(appointment.into())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityParams {
    service_id: Option<String>,
    staff_id: Option<String>,
    location_id: Option<String>,
    date: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// GET /api/v1/public/{slug}/availability?serviceId&staffId&locationId&date
async fn availability(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<AvailabilityParams>,
) -> ApiResult<Json<AvailabilityView>> {
    let missing: Vec<&'static str> = [
        ("serviceId", &params.service_id),
        ("staffId", &params.staff_id),
        ("date", &params.date),
    ]
    .into_iter()
    .filter(|(_, value)| present(value).is_none())
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        return Err(ApiError::MissingFields(missing));
    }

    let engine = state.salons.by_slug(&slug).await?;
    let service_id = present(&params.service_id)
        .and_then(|s| Ulid::from_string(s).ok())
        .ok_or(ApiError::InvalidService)?;
    let staff_id = present(&params.staff_id)
        .and_then(|s| Ulid::from_string(s).ok())
        .ok_or_else(|| ApiError::NotFound("staff member not found".into()))?;
    let location_id = match present(&params.location_id) {
        Some(raw) => Some(Ulid::from_string(raw).map_err(|_| ApiError::NotFound("location not found".into()))?),
        None => None,
    };
    let date = present(&params.date)
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .ok_or_else(|| ApiError::invalid_field("date", "must be YYYY-MM-DD"))?;

    let DaySlots {
        calendar,
        location_id,
        slots,
    } = engine
        .available_slots(&SlotQuery {
            staff_id,
            service_id,
            location_id,
            date,
        })
        .await?;

    Ok(Json(AvailabilityView {
        date: date.format("%Y-%m-%d").to_string(),
        staff_id,
        service_id,
        location_id,
        slots: slots.map(|start| SlotView::new(&calendar, start)).collect(),
    }))
}
