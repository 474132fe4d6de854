use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::AppointmentStatus;
use crate::notify::StaffChange;

use super::AppState;
use super::error::{ApiError, ApiResult};
use super::views::iso;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StaffEvent {
    appointment_id: Ulid,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_id: Option<Ulid>,
    status: AppointmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<String>,
}

impl From<&StaffChange> for StaffEvent {
    fn from(change: &StaffChange) -> Self {
        Self {
            appointment_id: change.appointment_id,
            previous_id: change.previous_id,
            status: change.status,
            start_time: change.span.map(|s| iso(s.start)),
            end_time: change.span.map(|s| iso(s.end)),
        }
    }
}

fn to_sse(change: &StaffChange) -> SseEvent {
    let data = serde_json::to_string(&StaffEvent::from(change)).unwrap_or_else(|_| "{}".to_string());
    SseEvent::default().event(change.kind.as_str()).data(data)
}

/// GET /api/v1/salons/{slug}/staff/{staff_id}/events
///
/// Appointment changes for one staff member. Slow subscribers skip what
/// they missed.
pub async fn staff_events(
    State(state): State<AppState>,
    Path((slug, staff_id)): Path<(String, String)>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let engine = state.salons.by_slug(&slug).await?;
    let not_found = || ApiError::NotFound("staff member not found".into());
    let staff_id = Ulid::from_string(&staff_id).map_err(|_| not_found())?;
    state
        .salons
        .catalog()
        .staff(engine.salon_id, staff_id)
        .await
        .map_err(EngineError::from)?
        .ok_or_else(not_found)?;

    let rx = engine.notify.subscribe(staff_id);
    tracing::debug!(salon = %engine.salon_id, staff = %staff_id, "event stream opened");
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(change) => Some(Ok(to_sse(&change))),
        Err(lagged) => {
            tracing::warn!(staff = %staff_id, "event stream lagging: {lagged}");
            None
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
