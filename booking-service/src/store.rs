use anyhow::Result;
use async_trait::async_trait;
use shared::*;
use std::future::Future;
use std::time::Duration;
use tokio::time;
use tracing::error;
use uuid::Uuid;

/// Upper bounds on store calls. A call that runs past its bound is
/// reported as a failure, never waited on.
#[derive(Debug, Clone, Copy)]
pub struct StoreTimeouts {
    pub lookup: Duration,
    pub commit: Duration,
}

/// Result of the atomic check-and-insert.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Committed(Reservation),
    Conflict(Vec<Reservation>),
}

/// State of a payment and its reservation after a transition was applied.
#[derive(Debug, Clone)]
pub struct PaymentTransition {
    pub payment: PaymentRecord,
    pub reservation: Option<Reservation>,
}

/// Durable storage for reservations, payment records and inquiries.
///
/// Status writes are set-to-value and guarded by
/// `ReservationStatus::can_transition_to` / `PaymentStatus::can_transition_to`;
/// a write that changes nothing emits no notification.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Active reservations on `resource_id` that may overlap `window`. The
    /// caller still applies the overlap predicate.
    async fn active_reservations(
        &self,
        resource_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> Result<Vec<Reservation>>;

    /// Re-validates availability and inserts a pending reservation as a
    /// single atomic unit. Never inserts when conflicts exist.
    async fn commit_reservation(&self, new: NewReservation) -> Result<CommitOutcome>;

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>>;

    /// Newest first.
    async fn reservations_for_account(&self, account_id: Uuid) -> Result<Vec<Reservation>>;

    /// Returns the reservation as stored after the write, `None` when the id
    /// is unknown.
    async fn transition_reservation(
        &self,
        id: Uuid,
        target: ReservationStatus,
    ) -> Result<Option<Reservation>>;

    async fn insert_payment(&self, new: NewPaymentRecord) -> Result<PaymentRecord>;

    async fn find_payment(&self, provider_reference: &str) -> Result<Option<PaymentRecord>>;

    /// Applies both halves of a payment event in one atomic unit.
    async fn apply_payment_transition(
        &self,
        payment_id: Uuid,
        transition: Transition,
    ) -> Result<PaymentTransition>;

    async fn insert_inquiry(&self, inquiry: NewInquiry) -> Result<()>;
}

/// Read-only service catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_resource(&self, id: Uuid) -> Result<Option<Resource>>;

    async fn list_resources(&self) -> Result<Vec<Resource>>;
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Account behind a session token, `None` when the token is unknown or
    /// expired.
    async fn resolve_identity(&self, token: &str) -> Result<Option<Uuid>>;

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>>;

    /// Remembers the payment provider's customer for later attempts.
    async fn save_customer_ref(&self, account_id: Uuid, customer_ref: &str) -> Result<()>;
}

/// Runs a read against the store with an upper bound. Failures and timeouts
/// are logged here and surface as the opaque `LookupFailure`.
pub async fn bounded_lookup<T>(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T, BookingError> {
    match time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("Store lookup `{}` failed: {:#}", what, e);
            Err(BookingError::LookupFailure)
        }
        Err(_) => {
            error!("Store lookup `{}` timed out after {:?}", what, limit);
            Err(BookingError::LookupFailure)
        }
    }
}

/// Same as [`bounded_lookup`] for writes and payment provider calls,
/// surfacing `CommitFailure`.
pub async fn bounded_commit<T>(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T, BookingError> {
    match time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("Write `{}` failed: {:#}", what, e);
            Err(BookingError::CommitFailure)
        }
        Err(_) => {
            error!("Write `{}` timed out after {:?}", what, limit);
            Err(BookingError::CommitFailure)
        }
    }
}
