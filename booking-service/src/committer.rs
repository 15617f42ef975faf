use shared::*;
use std::sync::Arc;
use tracing::info;

use crate::store::{bounded_commit, bounded_lookup, Catalog, CommitOutcome, ReservationStore, StoreTimeouts};

/// Turns a validated request into a durable `pending` reservation.
///
/// The availability check and the insert run as one unit inside
/// `ReservationStore::commit_reservation`; nothing here reads and then
/// writes on its own.
pub struct ReservationCommitter {
    store: Arc<dyn ReservationStore>,
    catalog: Arc<dyn Catalog>,
    timeouts: StoreTimeouts,
}

impl ReservationCommitter {
    pub fn new(store: Arc<dyn ReservationStore>, catalog: Arc<dyn Catalog>, timeouts: StoreTimeouts) -> Self {
        Self {
            store,
            catalog,
            timeouts,
        }
    }

    pub async fn commit_reservation(&self, request: ReservationRequest) -> Result<Reservation, BookingError> {
        let new = request.validate()?;

        let resource = bounded_lookup(
            self.timeouts.lookup,
            "get_resource",
            self.catalog.get_resource(new.resource_id),
        )
        .await?;
        if resource.is_none() {
            return Err(BookingError::not_found("service", new.resource_id));
        }

        let outcome = bounded_commit(
            self.timeouts.commit,
            "commit_reservation",
            self.store.commit_reservation(new),
        )
        .await?;

        match outcome {
            CommitOutcome::Committed(reservation) => {
                info!(
                    "Reservation {} committed on service {} for [{}, {})",
                    reservation.id, reservation.resource_id, reservation.start, reservation.end
                );
                Ok(reservation)
            }
            CommitOutcome::Conflict(conflicts) => {
                info!("Reservation rejected: {} conflicting reservation(s)", conflicts.len());
                Err(BookingError::Conflict(conflicts))
            }
        }
    }
}
