use thiserror::Error;

use crate::Reservation;

/// Failures surfaced by the booking protocol.
///
/// `LookupFailure` and `CommitFailure` carry no detail on purpose: the store
/// diagnostics are logged where they happen and never reach the caller.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid `{field}`: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("requested window conflicts with {} existing reservation(s)", .0.len())]
    Conflict(Vec<Reservation>),

    #[error("the reservation store could not be read")]
    LookupFailure,

    #[error("the reservation could not be committed")]
    CommitFailure,

    #[error("{entity} `{id}` not found")]
    NotFound { entity: &'static str, id: String },
}

impl BookingError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Store outages may succeed on a later attempt; everything else needs
    /// the caller to change the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LookupFailure | Self::CommitFailure)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status `{0}`")]
pub struct UnknownStatus(pub String);
