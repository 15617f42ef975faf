use shared::*;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{bounded_commit, bounded_lookup, PaymentTransition, ReservationStore, StoreTimeouts};

#[derive(Debug, Clone)]
pub enum Reconciled {
    /// Informational event, nothing written.
    Ignored,
    Applied(PaymentTransition),
}

/// Applies provider payment events to payment records and their
/// reservations. Events may arrive late, out of order or more than once;
/// every write is set-to-value, so replays leave state unchanged.
pub struct StatusReconciler {
    store: Arc<dyn ReservationStore>,
    timeouts: StoreTimeouts,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn ReservationStore>, timeouts: StoreTimeouts) -> Self {
        Self { store, timeouts }
    }

    pub async fn apply_payment_event(
        &self,
        provider_reference: &str,
        kind: PaymentEventKind,
    ) -> Result<Reconciled, BookingError> {
        let payment = bounded_lookup(
            self.timeouts.lookup,
            "find_payment",
            self.store.find_payment(provider_reference),
        )
        .await?;
        let Some(payment) = payment else {
            warn!("Payment event {:?} for unknown reference {}", kind, provider_reference);
            return Err(BookingError::not_found("payment", provider_reference));
        };

        let Some(transition) = kind.transition() else {
            info!("Payment {} reported {:?}, nothing to apply", payment.id, kind);
            return Ok(Reconciled::Ignored);
        };

        let applied = bounded_commit(
            self.timeouts.commit,
            "apply_payment_transition",
            self.store.apply_payment_transition(payment.id, transition),
        )
        .await?;

        info!(
            "Payment {} is {} after {:?}; reservation {} is {}",
            applied.payment.id,
            applied.payment.status,
            kind,
            applied.payment.reservation_id,
            applied
                .reservation
                .as_ref()
                .map(|r| r.status.as_str())
                .unwrap_or("unchanged")
        );
        Ok(Reconciled::Applied(applied))
    }

    /// Explicit cancellation by the requester. Cancelling twice is a no-op;
    /// a completed stay cannot be cancelled.
    pub async fn cancel_reservation(&self, id: Uuid, caller: Option<Uuid>) -> Result<Reservation, BookingError> {
        bounded_lookup(self.timeouts.lookup, "get_reservation", self.store.get_reservation(id))
            .await?
            .filter(|r| r.identity.permits(caller))
            .ok_or_else(|| BookingError::not_found("booking", id))?;

        let reservation = bounded_commit(
            self.timeouts.commit,
            "transition_reservation",
            self.store.transition_reservation(id, ReservationStatus::Cancelled),
        )
        .await?
        .ok_or_else(|| BookingError::not_found("booking", id))?;

        if reservation.status != ReservationStatus::Cancelled {
            return Err(BookingError::validation(
                "booking_id",
                format!("booking is {} and cannot be cancelled", reservation.status),
            ));
        }
        info!("Reservation {} cancelled by its requester", id);
        Ok(reservation)
    }
}
