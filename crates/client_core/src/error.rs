use shared::{domain::TripId, error::ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TripServiceError {
    #[error("trip service responded {status} ({code:?}): {message}")]
    Status {
        status: u16,
        code: ErrorCode,
        message: String,
    },
    #[error("trip service returned a record without an id")]
    MissingRecordId,
    #[error("trip service is unavailable")]
    Unavailable,
}

impl TripServiceError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            code: ErrorCode::from_status(status),
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self.code(), Some(ErrorCode::Unauthorized))
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to upload {failed} of {total} local trips; local copies kept")]
    Upload { failed: usize, total: usize },
    #[error("uploaded {uploaded} local trips but could not clear the local store: {error}")]
    ClearLocal {
        uploaded: usize,
        error: anyhow::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("tour bundle has no days to insert")]
    EmptyBundle,
    #[error("tour of {duration_days} days starting on day {start_day} is out of range")]
    TourOutOfRange { start_day: u32, duration_days: u32 },
    #[error("trip {0} is not in the trip list")]
    UnknownTrip(TripId),
}
