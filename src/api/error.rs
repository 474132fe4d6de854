use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::engine::{Alternative, BookingOutcome, EngineError, InvalidReason, UnavailableReason};
use crate::model::Appointment;

use super::views::AlternativeView;

/// Every failure the HTTP layer can return. The body is always
/// `{"error": CODE, "message": text, ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("service is not available for this staff member")]
    InvalidService,

    #[error("{field} {problem}")]
    InvalidField { field: String, problem: String },

    #[error("the requested time is no longer available")]
    TimeConflict { alternatives: Vec<AlternativeView> },

    #[error("{reason}")]
    SlotUnavailable {
        reason: UnavailableReason,
        alternatives: Vec<AlternativeView>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("service temporarily unavailable, retry shortly")]
    ServiceUnavailable,

    #[error("internal error")]
    Internal,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingFields(_) => "MISSING_FIELDS",
            ApiError::InvalidService => "INVALID_SERVICE",
            ApiError::InvalidField { .. } => "INVALID_FIELD",
            ApiError::TimeConflict { .. } => "TIME_CONFLICT",
            ApiError::SlotUnavailable { .. } => "SLOT_UNAVAILABLE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InvalidTransition(_) => "INVALID_TRANSITION",
            ApiError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ApiError::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields(_)
            | ApiError::InvalidService
            | ApiError::InvalidField { .. }
            | ApiError::TimeConflict { .. }
            | ApiError::SlotUnavailable { .. }
            | ApiError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidTransition(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn invalid_field(field: impl Into<String>, problem: impl Into<String>) -> Self {
        ApiError::InvalidField {
            field: field.into(),
            problem: problem.into(),
        }
    }

    fn body(&self) -> Value {
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        match self {
            ApiError::MissingFields(fields) => body["fields"] = json!(fields),
            ApiError::InvalidField { field, .. } => body["field"] = json!(field),
            ApiError::TimeConflict { alternatives } => body["alternatives"] = json!(alternatives),
            ApiError::SlotUnavailable { reason, alternatives } => {
                body["reason"] = json!(reason_code(reason));
                body["alternatives"] = json!(alternatives);
            }
            _ => {}
        }
        body
    }
}

fn reason_code(reason: &UnavailableReason) -> &'static str {
    match reason {
        UnavailableReason::BookingDisabled => "booking_disabled",
        UnavailableReason::TooSoon { .. } => "too_soon",
        UnavailableReason::TooFarAhead { .. } => "too_far_ahead",
        UnavailableReason::OutsideHours => "outside_hours",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotFound(kind) => ApiError::NotFound(kind.to_string()),
            EngineError::InvalidService => ApiError::InvalidService,
            e @ EngineError::InvalidTransition { .. } => ApiError::InvalidTransition(e.to_string()),
            EngineError::LimitExceeded(what) => ApiError::LimitExceeded(what),
            e if e.is_retryable() => {
                tracing::warn!(error = %e, "retryable engine failure");
                ApiError::ServiceUnavailable
            }
            e => {
                tracing::error!(error = %e, "engine failure");
                ApiError::Internal
            }
        }
    }
}

/// The created appointment, or the rejection as an API error.
pub fn booked(outcome: BookingOutcome) -> ApiResult<Appointment> {
    let alternatives = |alts: Vec<Alternative>| -> Vec<AlternativeView> { alts.iter().map(AlternativeView::from).collect() };
    match outcome {
        BookingOutcome::Booked(appointment) => Ok(appointment),
        BookingOutcome::Conflict { alternatives: alts } => Err(ApiError::TimeConflict {
            alternatives: alternatives(alts),
        }),
        BookingOutcome::Unavailable { reason, alternatives: alts } => Err(ApiError::SlotUnavailable {
            reason,
            alternatives: alternatives(alts),
        }),
        BookingOutcome::Invalid(InvalidReason::MissingFields(fields)) => Err(ApiError::MissingFields(fields)),
        BookingOutcome::Invalid(InvalidReason::InvalidService) => Err(ApiError::InvalidService),
        BookingOutcome::Invalid(InvalidReason::MalformedField { field, problem }) => {
            Err(ApiError::invalid_field(field, problem))
        }
        BookingOutcome::NotFound(kind) => Err(ApiError::NotFound(kind.to_string())),
    }
}
