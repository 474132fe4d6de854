//! Management API for salon staff. Every route sits behind [`super::auth::require_admin`].

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use ulid::Ulid;

use crate::engine::{AppointmentFilter, BookingDraft, RescheduleDraft};
use crate::model::AppointmentStatus;

use super::AppState;
use super::error::{ApiError, ApiResult, booked};
use super::events::staff_events;
use super::public::json_body;
use super::views::AppointmentView;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/salons/{slug}/appointments", get(list).post(create))
        .route("/api/v1/salons/{slug}/appointments/{id}", get(get_by_id))
        .route("/api/v1/salons/{slug}/appointments/{id}/complete", post(complete))
        .route("/api/v1/salons/{slug}/appointments/{id}/no-show", post(no_show))
        .route("/api/v1/salons/{slug}/appointments/{id}/cancel", post(cancel))
        .route("/api/v1/salons/{slug}/appointments/{id}/reschedule", put(reschedule))
        .route("/api/v1/salons/{slug}/staff/{staff_id}/events", get(staff_events))
}

fn appointment_id(raw: &str) -> ApiResult<Ulid> {
    Ulid::from_string(raw).map_err(|_| ApiError::NotFound("appointment not found".into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    staff_id: Option<String>,
    date: Option<String>,
    status: Option<String>,
}

fn parse_status(raw: &str) -> Option<AppointmentStatus> {
    match raw {
        "confirmed" => Some(AppointmentStatus::Confirmed),
        "completed" => Some(AppointmentStatus::Completed),
        "cancelled" => Some(AppointmentStatus::Cancelled),
        "no_show" => Some(AppointmentStatus::NoShow),
        _ => None,
    }
}

impl ListParams {
    fn filter(&self) -> ApiResult<AppointmentFilter> {
        let staff_id = self
            .staff_id
            .as_deref()
            .map(|raw| Ulid::from_string(raw).map_err(|_| ApiError::invalid_field("staffId", "must be an id")))
            .transpose()?;
        let date = self
            .date
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ApiError::invalid_field("date", "must be YYYY-MM-DD"))
            })
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .map(|raw| {
                parse_status(raw)
                    .ok_or_else(|| ApiError::invalid_field("status", "must be confirmed, completed, cancelled or no_show"))
            })
            .transpose()?;
        Ok(AppointmentFilter { staff_id, date, status })
    }
}

/// GET /api/v1/salons/{slug}/appointments?staffId&date&status
async fn list(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<AppointmentView>>> {
    let filter = params.filter()?;
    let engine = state.salons.by_slug(&slug).await?;
    let appointments = engine.list(&filter).await?;
    Ok(Json(appointments.into_iter().map(AppointmentView::from).collect()))
}

/// POST /api/v1/salons/{slug}/appointments
async fn create(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    payload: Result<Json<BookingDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AppointmentView>)> {
    let draft = json_body(payload)?;
    let engine = state.salons.by_slug(&slug).await?;
    let appointment = booked(engine.book(draft).await?)?;
    Ok((StatusCode::CREATED, Json(appointment.into())))
}

/// GET /api/v1/salons/{slug}/appointments/{id}
async fn get_by_id(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
) -> ApiResult<Json<AppointmentView>> {
    let engine = state.salons.by_slug(&slug).await?;
    let appointment = engine.get(appointment_id(&id)?).await?;
    Ok(Json(appointment.into()))
}

async fn transition(state: AppState, slug: String, id: String, status: AppointmentStatus) -> ApiResult<Json<AppointmentView>> {
    let engine = state.salons.by_slug(&slug).await?;
    let appointment = engine.transition(appointment_id(&id)?, status).await?;
    Ok(Json(appointment.into()))
}

/// POST /api/v1/salons/{slug}/appointments/{id}/complete
async fn complete(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
) -> ApiResult<Json<AppointmentView>> {
    transition(state, slug, id, AppointmentStatus::Completed).await
}

/// POST /api/v1/salons/{slug}/appointments/{id}/no-show
async fn no_show(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
) -> ApiResult<Json<AppointmentView>> {
    transition(state, slug, id, AppointmentStatus::NoShow).await
}

/// POST /api/v1/salons/{slug}/appointments/{id}/cancel
async fn cancel(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
) -> ApiResult<Json<AppointmentView>> {
    transition(state, slug, id, AppointmentStatus::Cancelled).await
}

/// PUT /api/v1/salons/{slug}/appointments/{id}/reschedule
async fn reschedule(
    State(state): State<AppState>,
    Path((slug, id)): Path<(String, String)>,
    payload: Result<Json<RescheduleDraft>, JsonRejection>,
) -> ApiResult<Json<AppointmentView>> {
    let draft = json_body(payload)?;
    let engine = state.salons.by_slug(&slug).await?;
    let appointment = booked(engine.reschedule(appointment_id(&id)?, draft).await?)?;
    Ok(Json(appointment.into()))
}
