use serde::Serialize;
use shared::*;
use std::sync::Arc;
use uuid::Uuid;

use crate::store::{bounded_lookup, ReservationStore, StoreTimeouts};

#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub available: bool,
    pub conflicts: Vec<Reservation>,
}

/// Answers whether a window on a resource is free. Reads only.
pub struct AvailabilityChecker {
    store: Arc<dyn ReservationStore>,
    timeouts: StoreTimeouts,
}

impl AvailabilityChecker {
    pub fn new(store: Arc<dyn ReservationStore>, timeouts: StoreTimeouts) -> Self {
        Self { store, timeouts }
    }

    /// `exclude` lets an existing reservation re-check its own window
    /// against everyone else. A failed read is a `LookupFailure`, never
    /// "available".
    pub async fn check_availability(
        &self,
        resource_id: Uuid,
        window: TimeWindow,
        exclude: Option<Uuid>,
    ) -> Result<Availability, BookingError> {
        let candidates = bounded_lookup(
            self.timeouts.lookup,
            "active_reservations",
            self.store.active_reservations(resource_id, window, exclude),
        )
        .await?;

        let conflicts = find_conflicts(&candidates, resource_id, &window, exclude);
        Ok(Availability {
            available: conflicts.is_empty(),
            conflicts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::testing::*;
    use std::time::Duration;

    fn checker_with(store: Arc<MemoryStore>) -> AvailabilityChecker {
        AvailabilityChecker::new(store, test_timeouts())
    }

    #[tokio::test]
    async fn window_after_a_confirmed_stay_is_available() {
        let store = Arc::new(MemoryStore::new());
        let resource = store.add_resource("Overnight boarding", 45).await;
        store
            .seed_reservation(stay(resource.id, window_at(10, 18), ReservationStatus::Confirmed))
            .await;

        let checker = checker_with(store);
        let result = checker
            .check_availability(resource.id, window_at(18, 20), None)
            .await
            .unwrap();
        assert!(result.available);
        assert!(result.conflicts.is_empty());
    }

    #[tokio::test]
    async fn overlapping_pending_stay_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let resource = store.add_resource("Overnight boarding", 45).await;
        let existing = stay(resource.id, window_at(10, 18), ReservationStatus::Pending);
        store.seed_reservation(existing.clone()).await;

        let checker = checker_with(store);
        let result = checker
            .check_availability(resource.id, window_at(12, 14), None)
            .await
            .unwrap();
        assert!(!result.available);
        assert_eq!(result.conflicts, vec![existing]);
    }

    #[tokio::test]
    async fn reservation_does_not_conflict_with_itself() {
        let store = Arc::new(MemoryStore::new());
        let resource = store.add_resource("Day care", 30).await;
        let existing = stay(resource.id, window_at(10, 18), ReservationStatus::Confirmed);
        store.seed_reservation(existing.clone()).await;

        let checker = checker_with(store);
        let result = checker
            .check_availability(resource.id, window_at(9, 12), Some(existing.id))
            .await
            .unwrap();
        assert!(result.available);
    }

    #[tokio::test]
    async fn cancelled_and_completed_stays_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let resource = store.add_resource("Overnight boarding", 45).await;
        store
            .seed_reservation(stay(resource.id, window_at(10, 18), ReservationStatus::Cancelled))
            .await;
        store
            .seed_reservation(stay(resource.id, window_at(10, 18), ReservationStatus::Completed))
            .await;

        let checker = checker_with(store);
        let result = checker
            .check_availability(resource.id, window_at(10, 18), None)
            .await
            .unwrap();
        assert!(result.available);
    }

    #[tokio::test]
    async fn unreachable_store_is_never_treated_as_available() {
        let store = Arc::new(MemoryStore::new());
        let resource = store.add_resource("Overnight boarding", 45).await;
        store.set_unavailable(true);

        let checker = checker_with(store);
        let err = checker
            .check_availability(resource.id, window_at(10, 18), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::LookupFailure));
    }

    #[tokio::test]
    async fn slow_store_times_out_as_lookup_failure() {
        let store = Arc::new(MemoryStore::new());
        let resource = store.add_resource("Overnight boarding", 45).await;
        store.set_latency(Some(Duration::from_millis(500)));

        let checker = AvailabilityChecker::new(
            store,
            StoreTimeouts {
                lookup: Duration::from_millis(20),
                commit: Duration::from_millis(20),
            },
        );
        let err = checker
            .check_availability(resource.id, window_at(10, 18), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::LookupFailure));
    }
}
