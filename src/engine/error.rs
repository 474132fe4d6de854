use ulid::Ulid;

use crate::catalog::CatalogError;
use crate::model::AppointmentStatus;

/// Which reference failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Salon,
    Staff,
    Location,
    /// The staff member exists but does not work at the location.
    StaffLocation,
    Appointment,
}

impl std::fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NotFoundKind::Salon => "salon not found",
            NotFoundKind::Staff => "staff member not found",
            NotFoundKind::Location => "location not found",
            NotFoundKind::StaffLocation => "staff member does not work at this location",
            NotFoundKind::Appointment => "appointment not found",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{0}")]
    NotFound(NotFoundKind),
    #[error("service is not offered by this staff member")]
    InvalidService,
    #[error("appointment {id} is {from}; cannot become {to}")]
    InvalidTransition {
        id: Ulid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("timed out waiting for the staff calendar")]
    Timeout,
    #[error("WAL error: {0}")]
    WalError(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl EngineError {
    /// Failures of the machinery rather than of the request. Retrying later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Timeout | EngineError::Catalog(CatalogError::Unavailable(_)))
    }
}
